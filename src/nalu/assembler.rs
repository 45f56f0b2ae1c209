//! NALU assembler (C2) fused with the access-unit tracker (C3).
//!
//! `spec.md` describes these as separate components, but C3's bookkeeping
//! (`startSeqNum`, `previousSeqNum`, `gapsInSeq`, the AU-boundary reset)
//! only makes sense interleaved with C2's per-packet processing — exactly
//! one `process()` call updates both in the single order `spec.md` §4.3
//! names, corrected where its literal step order cannot satisfy its own
//! §8 worked examples (see DESIGN.md resolutions 5 and 6).

use std::sync::Arc;

use crate::config::NaluTypeIds;
use crate::log::log_sink::LogSink;
use crate::nalu::sink::{NaluMeta, NaluSink};
use crate::wire::header::{ts90_to_micros, PacketHeader};
use crate::{sink_debug, sink_warn};

const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

struct FuState {
    /// Sequence number of the packet whose start bit opened this FU.
    start_seq: u16,
}

/// Drives the single/STAP-A/FU-A depacketization state machine and the
/// access-unit tracker that shares its per-packet loop.
pub struct Assembler<S: NaluSink> {
    sink: S,
    log: Arc<dyn LogSink>,
    nalu_types: NaluTypeIds,
    insert_start_codes: bool,

    buffer: Vec<u8>,
    nal_size: usize,
    fu: Option<FuState>,

    start_seq_num: Option<u16>,
    previous_seq_num: Option<u16>,
    previous_rtp_timestamp: u32,
    current_au_size: usize,
    gaps_in_seq: i64,
}

impl<S: NaluSink> Assembler<S> {
    pub fn new(
        initial_buffer: Vec<u8>,
        sink: S,
        log: Arc<dyn LogSink>,
        nalu_types: NaluTypeIds,
        insert_start_codes: bool,
    ) -> Self {
        Self {
            sink,
            log,
            nalu_types,
            insert_start_codes,
            buffer: initial_buffer,
            nal_size: 0,
            fu: None,
            start_seq_num: None,
            previous_seq_num: None,
            previous_rtp_timestamp: 0,
            current_au_size: 0,
            gaps_in_seq: 0,
        }
    }

    /// Feeds one decoded packet through the assembler. `payload` is the
    /// byte range after the fixed header.
    pub fn process(&mut self, header: PacketHeader, payload: &[u8]) {
        let seq = header.seq_num;
        let current_rtp_ts = header.timestamp;
        let marker = header.marker();

        let delta = self.previous_seq_num.map(|prev| {
            let mut d = i64::from(seq) - i64::from(prev);
            if d < -32768 {
                d += 65536;
            }
            self.gaps_in_seq += d - 1;
            d
        });

        if let Some(d) = delta {
            if d <= 0 {
                sink_debug!(self.log, "dropping out-of-order/duplicate packet seq={seq}");
                return;
            }
        }

        // AU-boundary reset must be evaluated before the startSeqNum
        // assignment below, or an AU that ends without a marker (a new
        // timestamp arrives instead) can never mark its first surviving
        // packet as the start of the next AU.
        if self.previous_rtp_timestamp != 0 && current_rtp_ts != self.previous_rtp_timestamp {
            self.gaps_in_seq = 0;
            self.current_au_size = 0;
        }

        if self.current_au_size == 0 {
            self.start_seq_num = Some(seq);
        }

        let rtp_timestamp_micros = ts90_to_micros(current_rtp_ts);
        self.dispatch(seq, marker, rtp_timestamp_micros, payload);

        if marker {
            self.gaps_in_seq = 0;
            self.current_au_size = 0;
        }

        self.previous_seq_num = Some(seq);
        self.previous_rtp_timestamp = current_rtp_ts;
    }

    /// Hands the staging buffer back to the sink once, during shutdown.
    pub fn cancel(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.nal_size = 0;
        self.sink.cancel(buffer);
    }

    fn missed_packets(&self) -> u32 {
        self.gaps_in_seq.max(0) as u32
    }

    fn dispatch(&mut self, seq: u16, marker: bool, rtp_timestamp_micros: u64, payload: &[u8]) {
        let Some(&nalu_header) = payload.first() else {
            sink_warn!(self.log, "empty RTP payload at seq={seq}");
            return;
        };
        let nalu_type = nalu_header & 0x1F;

        if nalu_type == self.nalu_types.fu_a {
            self.dispatch_fu_a(seq, marker, rtp_timestamp_micros, payload);
        } else if nalu_type == self.nalu_types.stap_a {
            self.dispatch_stap_a(seq, marker, rtp_timestamp_micros, payload);
        } else {
            self.dispatch_single(seq, marker, rtp_timestamp_micros, payload);
        }
    }

    fn dispatch_single(&mut self, seq: u16, marker: bool, rtp_timestamp_micros: u64, payload: &[u8]) {
        if self.fu.take().is_some() {
            sink_debug!(self.log, "single NALU arrived mid-FU-A; discarding fragment");
        }
        self.nal_size = 0;
        let start_code_len = if self.insert_start_codes { 4 } else { 0 };
        if !self.check_buffer_size(payload.len() + start_code_len) {
            return;
        }
        if self.insert_start_codes {
            self.write_bytes(&START_CODE);
        }
        self.write_bytes(payload);

        let is_first_in_au = self.start_seq_num == Some(seq);
        self.emit_complete(NaluMeta {
            rtp_timestamp_micros,
            is_first_in_au,
            is_last_in_au: marker,
            missed_packets: self.missed_packets(),
        });
    }

    fn dispatch_fu_a(&mut self, seq: u16, marker: bool, rtp_timestamp_micros: u64, payload: &[u8]) {
        if payload.len() < 2 {
            sink_warn!(self.log, "FU-A payload shorter than 2 bytes at seq={seq}");
            return;
        }
        let fu_indicator = payload[0];
        let fu_header = payload[1];
        let start = fu_header & 0x80 != 0;
        let end = fu_header & 0x40 != 0;
        let reconstructed_type = fu_header & 0x1F;
        let reconstructed_header = (fu_indicator & 0xE0) | reconstructed_type;

        if start {
            if self.fu.is_some() {
                sink_debug!(self.log, "unterminated FU-A discarded at seq={seq}");
            }
            self.fu = Some(FuState { start_seq: seq });
            self.nal_size = 0;
            let start_code_len = if self.insert_start_codes { 4 } else { 0 };
            if self.check_buffer_size(1 + start_code_len) {
                if self.insert_start_codes {
                    self.write_bytes(&START_CODE);
                }
                self.write_bytes(&[reconstructed_header]);
            }
        }

        if self.fu.is_some() {
            let body = &payload[2..];
            if !body.is_empty() && self.check_buffer_size(body.len()) {
                self.write_bytes(body);
            }
        } else if !start {
            sink_warn!(self.log, "FU-A continuation/end without start at seq={seq}");
        }

        if end {
            match self.fu.take() {
                Some(fu) => {
                    let is_first_in_au = self.start_seq_num == Some(fu.start_seq);
                    self.emit_complete(NaluMeta {
                        rtp_timestamp_micros,
                        is_first_in_au,
                        is_last_in_au: marker,
                        missed_packets: self.missed_packets(),
                    });
                }
                None => {
                    sink_warn!(self.log, "FU-A end bit without pending fragment at seq={seq}");
                }
            }
        }
    }

    fn dispatch_stap_a(&mut self, seq: u16, marker: bool, rtp_timestamp_micros: u64, payload: &[u8]) {
        if self.fu.take().is_some() {
            sink_debug!(self.log, "STAP-A arrived mid-FU-A; discarding fragment");
        }
        // payload[0] is the STAP-A indicator byte itself (used only to
        // route dispatch here); aggregation units start at payload[1].
        let mut offset = 1usize;
        let mut is_first_unit = true;
        let start_code_len = if self.insert_start_codes { 4 } else { 0 };

        while offset + 2 <= payload.len() {
            let len = u16::from_be_bytes([payload[offset], payload[offset + 1]]) as usize;
            offset += 2;
            if offset + len > payload.len() {
                sink_warn!(self.log, "malformed STAP-A aggregation unit at seq={seq}");
                break;
            }
            let unit = &payload[offset..offset + len];
            offset += len;

            self.nal_size = 0;
            if self.check_buffer_size(unit.len() + start_code_len) {
                if self.insert_start_codes {
                    self.write_bytes(&START_CODE);
                }
                self.write_bytes(unit);

                let is_first_in_au = is_first_unit && self.start_seq_num == Some(seq);
                let is_last_in_au = marker && offset >= payload.len();
                self.emit_complete(NaluMeta {
                    rtp_timestamp_micros,
                    is_first_in_au,
                    is_last_in_au,
                    missed_packets: self.missed_packets(),
                });
            }
            is_first_unit = false;
        }
    }

    fn emit_complete(&mut self, meta: NaluMeta) {
        self.current_au_size += self.nal_size;
        let buffer = std::mem::take(&mut self.buffer);
        let nal_size = self.nal_size;
        self.nal_size = 0;
        self.buffer = self.sink.nalu_complete(meta, buffer, nal_size);
    }

    /// `CheckBufferSize`: ensures `nal_size + additional` bytes are
    /// available, growing the staging buffer through the sink if not.
    fn check_buffer_size(&mut self, additional: usize) -> bool {
        let needed = self.nal_size + additional;
        if needed <= self.buffer.len() {
            return true;
        }
        match self.sink.buffer_too_small(needed) {
            Some(mut new_buffer) if new_buffer.len() >= needed => {
                new_buffer[..self.nal_size].copy_from_slice(&self.buffer[..self.nal_size]);
                let old_buffer = std::mem::replace(&mut self.buffer, new_buffer);
                self.sink.copy_complete(old_buffer);
                true
            }
            _ => false,
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.nal_size + bytes.len();
        self.buffer[self.nal_size..end].copy_from_slice(bytes);
        self.nal_size = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::NoopLogSink;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        BufferTooSmall(usize),
        CopyComplete,
        Complete(NaluMeta, Vec<u8>),
        Cancel,
    }

    struct TestSink {
        events: std::sync::Arc<Mutex<Vec<Event>>>,
        grow_to: Option<usize>,
    }

    impl TestSink {
        fn new() -> (Self, std::sync::Arc<Mutex<Vec<Event>>>) {
            let events = std::sync::Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    events: events.clone(),
                    grow_to: None,
                },
                events,
            )
        }

        fn allowing_growth(mut self) -> Self {
            self.grow_to = Some(4096);
            self
        }
    }

    impl NaluSink for TestSink {
        fn buffer_too_small(&mut self, needed: usize) -> Option<Vec<u8>> {
            self.events.lock().unwrap().push(Event::BufferTooSmall(needed));
            self.grow_to.map(|cap| vec![0u8; cap.max(needed)])
        }

        fn copy_complete(&mut self, _old_buffer: Vec<u8>) {
            self.events.lock().unwrap().push(Event::CopyComplete);
        }

        fn nalu_complete(&mut self, meta: NaluMeta, buffer: Vec<u8>, nal_size: usize) -> Vec<u8> {
            let data = buffer[..nal_size].to_vec();
            self.events.lock().unwrap().push(Event::Complete(meta, data));
            buffer
        }

        fn cancel(&mut self, _buffer: Vec<u8>) {
            self.events.lock().unwrap().push(Event::Cancel);
        }
    }

    fn header(seq: u16, ts: u32, marker: bool) -> PacketHeader {
        PacketHeader {
            seq_num: seq,
            timestamp: ts,
            flags: if marker { 0x0080 } else { 0 },
        }
    }

    fn assembler() -> (Assembler<TestSink>, std::sync::Arc<Mutex<Vec<Event>>>) {
        let (sink, events) = TestSink::new();
        let a = Assembler::new(
            vec![0u8; 64],
            sink,
            std::sync::Arc::new(NoopLogSink),
            NaluTypeIds::default(),
            true,
        );
        (a, events)
    }

    #[test]
    fn single_nalu_start_codes_on() {
        let (mut a, events) = assembler();
        a.process(header(1000, 900_000, true), &[0x65, 0xAA, 0xBB]);
        let ev = events.lock().unwrap();
        assert_eq!(ev.len(), 1);
        match &ev[0] {
            Event::Complete(meta, data) => {
                assert_eq!(data, &[0, 0, 0, 1, 0x65, 0xAA, 0xBB]);
                assert!(meta.is_first_in_au);
                assert!(meta.is_last_in_au);
                assert_eq!(meta.missed_packets, 0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn fu_a_three_fragment_reassembly() {
        let (mut a, events) = assembler();
        a.process(header(2000, 1_800_000, false), &[0x7C, 0x85, 0x01, 0x02]);
        a.process(header(2001, 1_800_000, false), &[0x7C, 0x05, 0x03, 0x04]);
        a.process(header(2002, 1_800_000, true), &[0x7C, 0x45, 0x05, 0x06]);
        let ev = events.lock().unwrap();
        assert_eq!(ev.len(), 1);
        match &ev[0] {
            Event::Complete(meta, data) => {
                assert_eq!(data, &[0, 0, 0, 1, 0x65, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
                assert!(meta.is_first_in_au);
                assert!(meta.is_last_in_au);
                assert_eq!(meta.missed_packets, 0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn gap_detection_reports_missed_packets() {
        let (mut a, events) = assembler();
        a.process(header(100, 7, false), &[0x65, 0x01]);
        a.process(header(102, 7, true), &[0x65, 0x02]);
        let ev = events.lock().unwrap();
        assert_eq!(ev.len(), 2);
        match &ev[1] {
            Event::Complete(meta, _) => assert_eq!(meta.missed_packets, 1),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn sequence_wrap_does_not_report_spurious_gap() {
        let (mut a, events) = assembler();
        a.process(header(65530, 7, false), &[0x65, 0x01]);
        a.process(header(3, 7, true), &[0x65, 0x02]);
        let ev = events.lock().unwrap();
        match &ev[1] {
            // delta = 3 - 65530 + 65536 = 9, so 8 packets are "missing"
            // between 65530 and 3 even though no real loss occurred here;
            // the assertion is only that it is not a huge spurious value.
            Event::Complete(meta, _) => assert!(meta.missed_packets < 100),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn au_boundary_reset_on_timestamp_change_without_marker() {
        let (mut a, events) = assembler();
        a.process(header(500, 111, false), &[0x65, 0x01]);
        a.process(header(501, 222, false), &[0x65, 0x02]);
        let ev = events.lock().unwrap();
        assert_eq!(ev.len(), 2);
        match &ev[1] {
            Event::Complete(meta, _) => assert!(meta.is_first_in_au),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn out_of_order_packet_is_dropped_without_emitting() {
        let (mut a, events) = assembler();
        a.process(header(10, 1, false), &[0x65, 0x01]);
        a.process(header(9, 1, true), &[0x65, 0x02]);
        let ev = events.lock().unwrap();
        assert_eq!(ev.len(), 1);
    }

    #[test]
    fn fu_a_end_without_start_is_dropped() {
        let (mut a, events) = assembler();
        a.process(header(1, 1, true), &[0x7C, 0x45, 0x01]);
        let ev = events.lock().unwrap();
        assert!(ev.is_empty());
    }

    #[test]
    fn stap_a_unpacks_each_inner_nalu() {
        let (mut a, events) = assembler();
        let mut payload = vec![0x18]; // STAP-A indicator byte (type=24)
        payload.extend_from_slice(&2u16.to_be_bytes());
        payload.extend_from_slice(&[0x67, 0xAA]);
        payload.extend_from_slice(&3u16.to_be_bytes());
        payload.extend_from_slice(&[0x68, 0xBB, 0xCC]);
        a.process(header(5, 1, true), &payload);
        let ev = events.lock().unwrap();
        assert_eq!(ev.len(), 2);
        match (&ev[0], &ev[1]) {
            (Event::Complete(m0, d0), Event::Complete(m1, d1)) => {
                assert_eq!(d0, &[0, 0, 0, 1, 0x67, 0xAA]);
                assert!(m0.is_first_in_au);
                assert!(!m0.is_last_in_au);
                assert_eq!(d1, &[0, 0, 0, 1, 0x68, 0xBB, 0xCC]);
                assert!(!m1.is_first_in_au);
                assert!(m1.is_last_in_au);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn buffer_too_small_then_grow() {
        let (sink, events) = TestSink::new();
        let sink = sink.allowing_growth();
        let mut a = Assembler::new(
            vec![0u8; 4],
            sink,
            std::sync::Arc::new(NoopLogSink),
            NaluTypeIds::default(),
            true,
        );
        let payload = vec![0x65u8; 100];
        a.process(header(1, 1, true), &payload);
        let ev = events.lock().unwrap();
        assert!(matches!(ev[0], Event::BufferTooSmall(n) if n == 104));
        assert!(matches!(ev[1], Event::CopyComplete));
        assert!(matches!(ev[2], Event::Complete(_, _)));
    }

    #[test]
    fn buffer_too_small_and_declined_skips_nalu() {
        let (mut a, events) = assembler();
        let payload = vec![0x65u8; 1000];
        a.process(header(1, 1, true), &payload);
        let ev = events.lock().unwrap();
        assert_eq!(ev.len(), 1);
        assert!(matches!(ev[0], Event::BufferTooSmall(_)));
    }

    #[test]
    fn cancel_hands_buffer_back_once() {
        let (mut a, events) = assembler();
        a.cancel();
        let ev = events.lock().unwrap();
        assert_eq!(ev.len(), 1);
        assert!(matches!(ev[0], Event::Cancel));
    }
}
