//! Error kinds surfaced by the public API (`spec.md` §7).

use thiserror::Error;

/// Failure returned from constructors, the receive loop's startup phase,
/// and the monitoring query.
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// Null/out-of-range input to a constructor or query.
    #[error("bad parameters: {0}")]
    BadParameters(&'static str),
    /// Allocation failure during construction.
    #[error("allocation failure")]
    Alloc,
    /// `delete` called before both thread flags were clear.
    #[error("receiver busy: receive thread has not quiesced")]
    Busy,
    /// Socket bind/configuration failure. Only ever raised from
    /// construction-time validation or socket setup; the running receive
    /// loop treats bind failure as terminal-but-logged, not an error return
    /// (`spec.md` §7).
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReceiverError>;
