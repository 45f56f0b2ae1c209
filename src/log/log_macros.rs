//! Leveled logging macros dispatching to a `LogSink`.
//!
//! # Feature flags
//! Specific log levels are controlled by cargo features:
//! `log-debug`, `log-info`, `log-warn`, `log-error`.
//!
//! If a feature is disabled, the corresponding macro expands to `()`,
//! removing all formatting and allocation overhead at compile time.

#[macro_export]
/// Logs a message to any type that implements `LogSink`.
macro_rules! sink_log {
    ($sink:expr, $lvl:expr, $($arg:tt)*) => {{
        let __msg = format!($($arg)*);
        $sink.log($lvl, &__msg, module_path!());
    }};
}

// ---------------------- DEBUG ----------------------
#[cfg(feature = "log-debug")]
#[macro_export]
macro_rules! sink_debug { ($sink:expr, $($arg:tt)*) => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Debug, $($arg)*) } }
#[cfg(not(feature = "log-debug"))]
#[macro_export]
macro_rules! sink_debug { ($($arg:tt)*) => { () }; }

// ---------------------- INFO ----------------------
#[cfg(feature = "log-info")]
#[macro_export]
macro_rules! sink_info { ($sink:expr, $($arg:tt)*) => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Info, $($arg)*) } }
#[cfg(not(feature = "log-info"))]
#[macro_export]
macro_rules! sink_info { ($($arg:tt)*) => { () }; }

// ---------------------- WARN ----------------------
#[cfg(feature = "log-warn")]
#[macro_export]
macro_rules! sink_warn { ($sink:expr, $($arg:tt)*) => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Warn, $($arg)*) } }
#[cfg(not(feature = "log-warn"))]
#[macro_export]
macro_rules! sink_warn { ($($arg:tt)*) => { () }; }

// ---------------------- ERROR ----------------------
#[cfg(feature = "log-error")]
#[macro_export]
macro_rules! sink_error { ($sink:expr, $($arg:tt)*) => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Error, $($arg)*) } }
#[cfg(not(feature = "log-error"))]
#[macro_export]
macro_rules! sink_error { ($($arg:tt)*) => { () }; }
