use serde_json::Value;

/// Where the resolver reports what happened while resolving flags.
///
/// Logging never changes a resolution outcome. Use [`NoopLogger`] when nothing
/// should be reported.
pub trait FlagLogger: Send + Sync {
    fn log_info(&self, message: &str, metadata: &Value);
    fn log_warn(&self, message: &str, metadata: &Value);
    fn log_error(&self, message: &str, metadata: &Value);
}

/// Emits resolver events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl FlagLogger for TracingLogger {
    fn log_info(&self, message: &str, metadata: &Value) {
        tracing::info!(target: "flag_resolver", metadata = %metadata, "{}", message);
    }

    fn log_warn(&self, message: &str, metadata: &Value) {
        tracing::warn!(target: "flag_resolver", metadata = %metadata, "{}", message);
    }

    fn log_error(&self, message: &str, metadata: &Value) {
        tracing::error!(target: "flag_resolver", metadata = %metadata, "{}", message);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl FlagLogger for NoopLogger {
    fn log_info(&self, _message: &str, _metadata: &Value) {}

    fn log_warn(&self, _message: &str, _metadata: &Value) {}

    fn log_error(&self, _message: &str, _metadata: &Value) {}
}
