/// Limits of a decode.
#[derive(Clone, Debug, bon::Builder)]
pub struct DecoderOptions {
    /// Inlining depth above which the decode bails out.
    #[builder(default = 1000)]
    pub max_inlining_depth: usize,
    /// Iterations after which an exploded loop is considered divergent.
    #[builder(default = 10_000)]
    pub max_loop_explosion_count: usize,
    /// Report a divergent loop explosion as [`CompileError::Fatal`] instead
    /// of a bailout.
    ///
    /// [`CompileError::Fatal`]: crate::CompileError::Fatal
    #[builder(default)]
    pub failed_loop_explosion_is_fatal: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}
