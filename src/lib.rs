//! graft: a graph-rewriting core for a just-in-time compiler.
//!
//! The crate re-exports the graph model, the template engine and the
//! partial-evaluation decoder under one roof.

pub use graft_decoder as decoder;
pub use graft_ir as ir;
pub use graft_template as template;

pub mod prelude {
    pub use graft_decoder::{
        CompileError, Decoded, DecoderOptions, GraphCache, GraphProvider, InlineInfo,
        InlineInvokePlugin, InvocationPlugin, InvocationPlugins, LoopExplosionKind,
        LoopExplosionPlugin, PeDecoder, PluginContext, PluginError,
    };
    pub use graft_ir::*;
    pub use graft_template::{
        GuardsStage, LoweringStage, TemplateEngine, TemplateLowerer, TemplateMethod,
        TemplateParam, TemplateRegistry,
    };
}
