//! Fixed-capacity circular monitoring ring (C4, `spec.md` §4.4).
//!
//! Appended from the receive thread after each decoded packet, queried
//! for windowed statistics from any thread. The mutex is held for O(1)
//! on append and O(N) for the duration of a full query; never across a
//! consumer-callback invocation.

use std::sync::Mutex;

use crate::error::{ReceiverError, Result};

/// Ring capacity (`spec.md` §3: "fixed capacity N = 2048 records").
pub const CAPACITY: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketRecord {
    pub recv_timestamp_micros: u64,
    pub rtp_timestamp: u32,
    pub seq_num: u16,
    pub marker_bit: bool,
    pub byte_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitoringStats {
    pub real_time_interval_micros: u64,
    pub bytes_received: u64,
    pub mean_packet_size: f64,
    pub packets_received: u32,
    pub packets_missed: i64,
    /// `None` unless jitter was requested (`spec.md` §4.4's pass 2).
    pub reception_time_jitter: Option<f64>,
    /// `None` unless packet-size standard deviation was requested.
    pub packet_size_std_dev: Option<f64>,
}

struct RingState {
    records: Vec<PacketRecord>,
    write_index: usize,
    count: usize,
    first_rtp_timestamp: Option<u32>,
}

impl RingState {
    fn new() -> Self {
        Self {
            records: vec![
                PacketRecord {
                    recv_timestamp_micros: 0,
                    rtp_timestamp: 0,
                    seq_num: 0,
                    marker_bit: false,
                    byte_count: 0,
                };
                CAPACITY
            ],
            write_index: CAPACITY - 1,
            count: 0,
            first_rtp_timestamp: None,
        }
    }
}

pub struct MonitoringRing {
    state: Mutex<RingState>,
}

impl Default for MonitoringRing {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitoringRing {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RingState::new()),
        }
    }

    /// Appends one packet record. `write_index` strictly advances
    /// (mod N); `count` saturates at N.
    pub fn append(&self, record: PacketRecord) {
        let mut state = self.state.lock().unwrap();
        if state.first_rtp_timestamp.is_none() {
            state.first_rtp_timestamp = Some(record.rtp_timestamp);
        }
        state.write_index = (state.write_index + 1) % CAPACITY;
        let idx = state.write_index;
        state.records[idx] = record;
        state.count = (state.count + 1).min(CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Windowed statistical query (`spec.md` §4.4). Fails with
    /// `BadParameters` if `window_micros == 0` or the ring is empty.
    pub fn query(
        &self,
        window_micros: u64,
        want_jitter: bool,
        want_size_stddev: bool,
    ) -> Result<MonitoringStats> {
        if window_micros == 0 {
            return Err(ReceiverError::BadParameters("window_micros must be > 0"));
        }

        let state = self.state.lock().unwrap();
        if state.count == 0 {
            return Err(ReceiverError::BadParameters("monitoring ring is empty"));
        }

        let newest = &state.records[state.write_index];
        let newest_recv_ts = newest.recv_timestamp_micros;
        let first_rtp_ts = state.first_rtp_timestamp.unwrap_or(newest.rtp_timestamp);

        // Pass 1: walk backward from write_index, collecting indices
        // within the window, and the running seq-gap count.
        let mut included = Vec::with_capacity(state.count.min(CAPACITY));
        let mut idx = state.write_index;
        for _ in 0..state.count {
            let rec = &state.records[idx];
            if !included.is_empty() && newest_recv_ts - rec.recv_timestamp_micros > window_micros {
                break;
            }
            included.push(idx);
            idx = (idx + CAPACITY - 1) % CAPACITY;
        }

        let mut bytes_sum: u64 = 0;
        let mut reception_time_sum: i64 = 0;
        let mut gaps_in_seq: i64 = 0;
        let mut oldest_recv_ts = newest_recv_ts;
        let mut prev_seq: Option<u16> = None;

        // `included` is ordered newest-first; walk it oldest-first so
        // gap deltas are computed in arrival order, matching §4.3.
        for &i in included.iter().rev() {
            let rec = &state.records[i];
            bytes_sum += u64::from(rec.byte_count);
            oldest_recv_ts = oldest_recv_ts.min(rec.recv_timestamp_micros);

            let rtp_since_first = rec.rtp_timestamp.wrapping_sub(first_rtp_ts);
            let ts_micros = crate::wire::header::ts90_to_micros(rtp_since_first);
            reception_time_sum += rec.recv_timestamp_micros as i64 - ts_micros as i64;

            if let Some(prev) = prev_seq {
                let mut d = i64::from(rec.seq_num) - i64::from(prev);
                if d < -32768 {
                    d += 65536;
                }
                gaps_in_seq += d - 1;
            }
            prev_seq = Some(rec.seq_num);
        }

        let packet_count = included.len() as u32;
        let mean_packet_size = bytes_sum as f64 / f64::from(packet_count);
        let mean_reception_time = reception_time_sum as f64 / f64::from(packet_count);

        let mut reception_time_jitter = None;
        let mut packet_size_std_dev = None;

        if want_jitter || want_size_stddev {
            let mut reception_time_var_sum = 0.0f64;
            let mut packet_size_var_sum = 0.0f64;
            for &i in &included {
                let rec = &state.records[i];
                if want_jitter {
                    let rtp_since_first = rec.rtp_timestamp.wrapping_sub(first_rtp_ts);
                    let ts_micros = crate::wire::header::ts90_to_micros(rtp_since_first);
                    let rt = rec.recv_timestamp_micros as f64 - ts_micros as f64;
                    reception_time_var_sum += (rt - mean_reception_time).powi(2);
                }
                if want_size_stddev {
                    let size = f64::from(rec.byte_count);
                    packet_size_var_sum += (size - mean_packet_size).powi(2);
                }
            }
            if want_jitter {
                reception_time_jitter = Some((reception_time_var_sum / f64::from(packet_count)).sqrt());
            }
            if want_size_stddev {
                packet_size_std_dev = Some((packet_size_var_sum / f64::from(packet_count)).sqrt());
            }
        }

        Ok(MonitoringStats {
            real_time_interval_micros: newest_recv_ts - oldest_recv_ts,
            bytes_received: bytes_sum,
            mean_packet_size,
            packets_received: packet_count,
            packets_missed: gaps_in_seq,
            reception_time_jitter,
            packet_size_std_dev,
        })
    }
}
