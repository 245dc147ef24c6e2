use graft_ir::MethodId;

/// Failure while building a template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// No template method is registered under this id.
    #[error("no template registered for {0}")]
    UnknownTemplate(MethodId),
    /// The lowering provider rejected the fragment.
    #[error("lowering of template {method} failed: {message}")]
    Lowering { method: MethodId, message: String },
}

impl TemplateError {
    pub fn lowering(method: MethodId, message: impl Into<String>) -> Self {
        TemplateError::Lowering {
            method,
            message: message.into(),
        }
    }
}
