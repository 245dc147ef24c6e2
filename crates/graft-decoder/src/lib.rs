//! Partial-evaluation decoding: rebuilds a method graph from its encoded
//! form while inlining calls, expanding invocation plugins and exploding
//! loops on the fly.
//!
//! Encoded method graphs come from a [`GraphCache`], which builds each one
//! at most once per [`GraphProvider`] miss and shares it between decodes.
//! A [`PeDecoder`] walks the fixed nodes of the root method in order,
//! materializes floating nodes on demand and folds branches whose condition
//! became constant, so dead code is never copied.

mod cache;
mod decoder;
mod error;
mod explode;
mod finish;
mod invoke;
mod options;
mod plugins;
mod scope;
mod site;
mod stats;
mod values;

pub use cache::{GraphCache, GraphProvider};
pub use decoder::{Decoded, PeDecoder};
pub use error::{BailoutReason, CompileError};
pub use options::DecoderOptions;
pub use plugins::{
    InlineInfo, InlineInvokePlugin, InvocationPlugin, InvocationPlugins, LoopExplosionKind,
    LoopExplosionPlugin, PluginContext, PluginError,
};
pub use site::{CallSite, devirtualize};
pub use stats::DecodeStats;
