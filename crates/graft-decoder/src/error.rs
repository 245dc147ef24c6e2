use graft_template::TemplateError;

/// Why a compilation unit was abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BailoutReason {
    /// An exploded loop did not terminate within its iteration bound.
    LoopExplosion,
    /// The inlining depth limit was exceeded.
    InliningTooDeep,
    /// A plugin or the runtime met a construct it cannot compile.
    Unsupported,
}

impl std::fmt::Display for BailoutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BailoutReason::LoopExplosion => "loop explosion",
            BailoutReason::InliningTooDeep => "inlining too deep",
            BailoutReason::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// Failure of a decode. No partial graph is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The unit cannot be compiled; the caller keeps interpreting it.
    #[error("bailout ({reason}): {message}")]
    Bailout {
        reason: BailoutReason,
        message: String,
    },
    /// A loop explosion failure promoted to a hard error.
    #[error("fatal: {0}")]
    Fatal(String),
    /// Lowering macro nodes through templates failed.
    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl CompileError {
    pub fn bailout(reason: BailoutReason, message: impl Into<String>) -> Self {
        CompileError::Bailout {
            reason,
            message: message.into(),
        }
    }

    pub fn is_bailout(&self) -> bool {
        matches!(self, CompileError::Bailout { .. })
    }

    pub fn reason(&self) -> Option<BailoutReason> {
        match self {
            CompileError::Bailout { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}
