use graft_ir::{Graph, MethodId};

use crate::args::LoweringStage;
use crate::error::TemplateError;

/// VM specific lowering applied to a fragment before it is cached.
pub trait LoweringProvider: Send + Sync {
    /// Lowers the fragment of template `method` in place, up to `stage`.
    fn lower(
        &self,
        method: MethodId,
        graph: &mut Graph,
        stage: LoweringStage,
    ) -> Result<(), TemplateError>;
}

/// Leaves fragments as they are.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLowering;

impl LoweringProvider for NoLowering {
    fn lower(&self, _: MethodId, _: &mut Graph, _: LoweringStage) -> Result<(), TemplateError> {
        Ok(())
    }
}
