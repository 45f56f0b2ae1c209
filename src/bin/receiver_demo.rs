//! Thin CLI entry point: binds a receiver on a port and writes completed
//! NALUs to stdout as Annex-B bytes. No RTCP, no file I/O, no display —
//! just enough wiring to exercise the library against a real socket.

use std::io::Write;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::{env, process};

use h264_rtp_receiver::config::ReceiverConfig;
use h264_rtp_receiver::log::log_level::LogLevel;
use h264_rtp_receiver::log::log_sink::LogSink;
use h264_rtp_receiver::nalu::{NaluMeta, NaluSink};
use h264_rtp_receiver::receiver::Reader;

struct StderrLogSink;
impl LogSink for StderrLogSink {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str) {
        eprintln!("[{level:?}] {target}: {msg}");
    }
}

struct StdoutSink;
impl NaluSink for StdoutSink {
    fn buffer_too_small(&mut self, needed: usize) -> Option<Vec<u8>> {
        Some(vec![0u8; needed])
    }

    fn copy_complete(&mut self, _old_buffer: Vec<u8>) {}

    fn nalu_complete(&mut self, _meta: NaluMeta, buffer: Vec<u8>, nal_size: usize) -> Vec<u8> {
        let _ = std::io::stdout().write_all(&buffer[..nal_size]);
        buffer
    }

    fn cancel(&mut self, _buffer: Vec<u8>) {}
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let port: u16 = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5004);

    let config = match ReceiverConfig::new(port, 1) {
        Ok(c) => c.with_recv_addr(Ipv4Addr::UNSPECIFIED),
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            process::exit(1);
        }
    };

    let log: Arc<dyn LogSink> = Arc::new(StderrLogSink);
    let reader = match Reader::new(
        config,
        vec![0u8; 4096],
        StdoutSink,
        Arc::new(()),
        log.clone(),
    ) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            eprintln!("failed to construct receiver: {e}");
            process::exit(1);
        }
    };

    eprintln!("listening on 0.0.0.0:{port}");
    reader.run_receive();
}
