/// Kernel lifecycle state.
///
/// State machine: Configuring -> Running -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    /// Modules may be added; the retry consumer is not running.
    Configuring,
    /// The retry consumer is running; registration is closed.
    Running,
    /// Shutdown requested; waiting for the consumer and in-flight dispatches.
    Draining,
    /// The consumer has exited.
    Stopped,
}

impl KernelState {
    /// Whether modules may still be registered.
    #[must_use]
    pub fn accepts_modules(self) -> bool {
        matches!(self, KernelState::Configuring)
    }
}
