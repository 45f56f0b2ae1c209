//! Receive loop (C5) and lifecycle (C6), `spec.md` §4.5, §5, §6.

use std::sync::{Arc, Mutex, OnceLock};

use crate::config::ReceiverConfig;
use crate::error::{ReceiverError, Result};
use crate::log::log_sink::LogSink;
use crate::monitor::ring::{MonitoringRing, MonitoringStats, PacketRecord};
use crate::nalu::{Assembler, NaluSink};
use crate::receiver::socket;
use crate::wire::header;
use crate::{sink_error, sink_info, sink_warn};

/// Owns the socket, the assembler, and the cooperative lifecycle flags.
/// Meant to be shared via `Arc` between the controlling thread (which
/// calls `stop`/`get_monitoring`/`get_custom`/`delete`) and the single
/// receive thread (which calls `run_receive`, normally once, at
/// startup).
pub struct Reader<S: NaluSink, U: Send + Sync + 'static> {
    config: ReceiverConfig,
    log: Arc<dyn LogSink>,
    monitoring: Arc<MonitoringRing>,
    assembler: Mutex<Assembler<S>>,
    user_ctx: Arc<U>,
    should_stop: Mutex<bool>,
    thread_started: Mutex<bool>,
}

impl<S: NaluSink, U: Send + Sync + 'static> Reader<S, U> {
    /// Validates `recv_port > 0`, `recv_timeout_secs > 0`, and that the
    /// staging buffer is non-empty (`spec.md` §6).
    pub fn new(
        config: ReceiverConfig,
        initial_buffer: Vec<u8>,
        sink: S,
        user_ctx: Arc<U>,
        log: Arc<dyn LogSink>,
    ) -> Result<Self> {
        config.validate()?;
        if initial_buffer.is_empty() {
            return Err(ReceiverError::BadParameters(
                "staging buffer capacity must be > 0",
            ));
        }
        let assembler = Assembler::new(
            initial_buffer,
            sink,
            log.clone(),
            config.nalu_types,
            config.insert_start_codes,
        );
        Ok(Self {
            config,
            log,
            monitoring: Arc::new(MonitoringRing::new()),
            assembler: Mutex::new(assembler),
            user_ctx,
            should_stop: Mutex::new(false),
            thread_started: Mutex::new(false),
        })
    }

    /// Enters the receive loop. Intended to run on a dedicated thread;
    /// returns once `stop()` has been observed at a socket-timeout poll
    /// point. Binding failure is terminal but not an error return —
    /// it is logged and the thread exits with its started-flag clear.
    pub fn run_receive(&self) {
        let socket = match socket::bind(&self.config) {
            Ok(s) => s,
            Err(e) => {
                sink_error!(self.log, "bind failed, receive thread exiting: {e}");
                return;
            }
        };

        *self.thread_started.lock().unwrap() = true;

        let payload_cap = self.config.payload_buffer_size(header::HEADER_SIZE);
        let mut buf = vec![0u8; header::HEADER_SIZE + payload_cap.max(1)];

        loop {
            if *self.should_stop.lock().unwrap() {
                break;
            }

            let (len, _src) = match socket.recv_from(&mut buf) {
                Ok(v) => v,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    // Socket timeout: the cancellation-poll point, not an error.
                    continue;
                }
                Err(e) => {
                    sink_warn!(self.log, "transient receive error: {e}");
                    continue;
                }
            };

            if len < header::HEADER_SIZE {
                sink_warn!(self.log, "short datagram ({len} bytes), dropped");
                continue;
            }

            let Ok((hdr, payload)) = header::decode(&buf[..len]) else {
                continue;
            };

            self.monitoring.append(PacketRecord {
                recv_timestamp_micros: monotonic_micros(),
                rtp_timestamp: hdr.timestamp,
                seq_num: hdr.seq_num,
                marker_bit: hdr.marker(),
                byte_count: len as u32,
            });

            self.assembler.lock().unwrap().process(hdr, payload);
        }

        self.assembler.lock().unwrap().cancel();
        *self.thread_started.lock().unwrap() = false;
        sink_info!(self.log, "receive thread stopped");
    }

    /// Idempotent cooperative cancellation.
    pub fn stop(&self) {
        *self.should_stop.lock().unwrap() = true;
    }

    /// Succeeds only when the receive thread has drained.
    pub fn delete(&self) -> Result<()> {
        if *self.thread_started.lock().unwrap() {
            return Err(ReceiverError::Busy);
        }
        Ok(())
    }

    pub fn get_monitoring(
        &self,
        window_micros: u64,
        want_jitter: bool,
        want_size_stddev: bool,
    ) -> Result<MonitoringStats> {
        self.monitoring
            .query(window_micros, want_jitter, want_size_stddev)
    }

    pub fn get_custom(&self) -> Arc<U> {
        self.user_ctx.clone()
    }
}

/// Monotonic microsecond clock, immune to wall-clock jumps (`spec.md`
/// §9: "reception timestamps must come from a monotonic source").
fn monotonic_micros() -> u64 {
    static EPOCH: OnceLock<std::time::Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(std::time::Instant::now);
    epoch.elapsed().as_micros() as u64
}
