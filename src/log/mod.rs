pub mod log_level;
pub mod log_macros;
pub mod log_sink;

pub use log_sink::NoopLogSink;
