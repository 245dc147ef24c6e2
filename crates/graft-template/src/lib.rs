//! Snippet templates: parameterized graph fragments that are specialized,
//! cached and spliced into a target graph in place of a single node.
//!
//! A [`TemplateMethod`] is registered once in a [`TemplateRegistry`]. For each
//! distinct [`CacheKey`] the [`TemplateEngine`] builds one [`Template`] by
//! binding constant parameters, unrolling explode loops and lowering the
//! body. [`Template::instantiate`] then copies the fragment into a graph.

mod args;
mod engine;
mod error;
mod instantiate;
mod lower;
mod lowering;
mod method;
mod template;

pub use args::{ArgValue, Arguments, CacheKey, GuardsStage, KeyValue, LoweringStage};
pub use engine::{TemplateEngine, TemplateOptions};
pub use error::TemplateError;
pub use lower::{NodeLowering, TemplateLowerer};
pub use lowering::{LoweringProvider, NoLowering};
pub use method::{ParamMode, TemplateMethod, TemplateParam, TemplateRegistry};
pub use template::Template;
