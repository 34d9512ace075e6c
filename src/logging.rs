//! The logger the debug collector writes through.

/// Narrow logging interface.
///
/// The client's own diagnostics go through `tracing` directly; this trait
/// only receives the per-call debug block produced by
/// [`DebugConfig`](crate::DebugConfig).
pub trait Logger: Send + Sync {
    /// Receives the debug block of a successful call.
    fn debug(&self, message: &str);
    /// Informational messages.
    fn info(&self, message: &str);
    /// Recoverable problems.
    fn warn(&self, message: &str);
    /// Receives the debug block of a failed call.
    fn error(&self, message: &str);
}

/// Forwards to the `tracing` macros under the `wirecall::debug` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "wirecall::debug", "{}", message);
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "wirecall::debug", "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "wirecall::debug", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "wirecall::debug", "{}", message);
    }
}
