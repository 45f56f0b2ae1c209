//! An RTP/UDP depacketizing receiver core for H.264 video streams.
//!
//! Reassembles NAL units from a UDP datagram stream (single NALU,
//! STAP-A aggregation, FU-A fragmentation), tracks access-unit
//! boundaries, and hands completed NALUs to a consumer-supplied sink.
//! A bounded circular ring of per-packet reception metadata supports
//! windowed throughput/jitter/loss queries from any thread.

/// Receiver configuration.
pub mod config;
/// Error kinds returned by the public API.
pub mod error;
/// Logging utilities.
pub mod log;
/// The bounded circular reception-metadata ring and its windowed query.
pub mod monitor;
/// The NALU assembler, access-unit tracker, and consumer sink contract.
pub mod nalu;
/// The receive loop and reader lifecycle.
pub mod receiver;
/// The fixed wire-header codec.
pub mod wire;

pub use config::ReceiverConfig;
pub use error::{ReceiverError, Result};
pub use monitor::{MonitoringRing, MonitoringStats, PacketRecord};
pub use nalu::{NaluMeta, NaluSink};
pub use receiver::Reader;
