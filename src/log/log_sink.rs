use crate::log::log_level::LogLevel;

/// A destination for log messages: console, a file, a test collector.
///
/// Must be `Send + Sync` — the receive thread and any caller querying
/// the monitoring ring may both log through the same sink.
pub trait LogSink: Send + Sync {
    /// Dispatches one message. `target` is the emitting module path.
    fn log(&self, level: LogLevel, msg: &str, target: &'static str);
}

/// A sink that discards everything, for callers that don't care about
/// diagnostics.
#[derive(Debug, Clone, Default)]
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    #[inline]
    fn log(&self, _level: LogLevel, _msg: &str, _target: &'static str) {}
}
