//! The consumer callback contract (`spec.md` §4.2), modeled as a trait
//! rather than a `cause` discriminator plus an overloaded return value: a
//! handle (the staging buffer) is transferred back and forth between the
//! assembler and the sink at each event, never aliased.

/// Per-NALU metadata delivered alongside a completed NALU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NaluMeta {
    pub rtp_timestamp_micros: u64,
    pub is_first_in_au: bool,
    pub is_last_in_au: bool,
    pub missed_packets: u32,
}

/// Destination for assembled NALUs and buffer-lifecycle events.
///
/// Implementations own the staging buffer passed between calls; the
/// assembler never retains a buffer it has handed off.
pub trait NaluSink: Send {
    /// The assembler needs a buffer of at least `needed` bytes. Return
    /// `None` to drop the NALU currently in progress.
    fn buffer_too_small(&mut self, needed: usize) -> Option<Vec<u8>>;

    /// The previous buffer is no longer referenced by the assembler and
    /// may be freed or recycled.
    fn copy_complete(&mut self, old_buffer: Vec<u8>);

    /// A full NALU has been assembled in `buffer[..nal_size]`. Returns the
    /// buffer to use for the next NALU (the same one, reset, or a fresh
    /// allocation).
    fn nalu_complete(&mut self, meta: NaluMeta, buffer: Vec<u8>, nal_size: usize) -> Vec<u8>;

    /// Emitted once during shutdown; the buffer's ownership returns to
    /// the sink. Return value is not expected.
    fn cancel(&mut self, buffer: Vec<u8>);
}
