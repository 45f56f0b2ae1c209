//! Receiver configuration (`spec.md` §3, §6).

use crate::error::{ReceiverError, Result};

/// NALU-type values recognized by the assembler (`spec.md` §4.1).
///
/// Any payload whose low-5-bit type does not match either of these is
/// treated as a single NALU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NaluTypeIds {
    pub stap_a: u8,
    pub fu_a: u8,
}

impl Default for NaluTypeIds {
    fn default() -> Self {
        // RFC 6184 §5.2/§5.8 default values.
        Self {
            stap_a: 24,
            fu_a: 28,
        }
    }
}

/// Immutable receiver configuration (`spec.md` §3: "Config (immutable
/// after construction)").
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Unicast bind address or multicast group. `None` binds `INADDR_ANY`.
    pub recv_addr: Option<std::net::Ipv4Addr>,
    /// Interface address for bind/multicast join. `None` means `INADDR_ANY`.
    pub iface_addr: Option<std::net::Ipv4Addr>,
    pub recv_port: u16,
    pub recv_timeout_secs: u32,
    /// If `Some`, the receive buffer is sized to
    /// `max_packet_size - header_size - UDP_OVERHEAD - IP_OVERHEAD`.
    pub max_packet_size: Option<usize>,
    pub insert_start_codes: bool,
    pub nalu_types: NaluTypeIds,
}

/// UDP+IP overhead subtracted from `max_packet_size` (`spec.md` §6).
pub const UDP_OVERHEAD: usize = 8;
pub const IP_OVERHEAD: usize = 20;

/// Default RTP payload size used when `max_packet_size` is absent.
const DEFAULT_PAYLOAD_SIZE: usize = 1460;

impl ReceiverConfig {
    pub fn new(recv_port: u16, recv_timeout_secs: u32) -> Result<Self> {
        let cfg = Self {
            recv_addr: None,
            iface_addr: None,
            recv_port,
            recv_timeout_secs,
            max_packet_size: None,
            insert_start_codes: true,
            nalu_types: NaluTypeIds::default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_recv_addr(mut self, addr: std::net::Ipv4Addr) -> Self {
        self.recv_addr = Some(addr);
        self
    }

    pub fn with_iface_addr(mut self, addr: std::net::Ipv4Addr) -> Self {
        self.iface_addr = Some(addr);
        self
    }

    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = Some(size);
        self
    }

    pub fn with_insert_start_codes(mut self, insert: bool) -> Self {
        self.insert_start_codes = insert;
        self
    }

    pub fn with_nalu_types(mut self, types: NaluTypeIds) -> Self {
        self.nalu_types = types;
        self
    }

    /// Validates `recvPort > 0`, `recvTimeoutSec > 0` per `spec.md` §6.
    pub fn validate(&self) -> Result<()> {
        if self.recv_port == 0 {
            return Err(ReceiverError::BadParameters("recv_port must be > 0"));
        }
        if self.recv_timeout_secs == 0 {
            return Err(ReceiverError::BadParameters(
                "recv_timeout_secs must be > 0",
            ));
        }
        Ok(())
    }

    /// True if `recv_addr`'s first octet is in `[224, 239]` (`spec.md` §6).
    pub fn is_multicast(&self) -> bool {
        self.recv_addr
            .is_some_and(|a| (224..=239).contains(&a.octets()[0]))
    }

    /// Receive-buffer size derived from `max_packet_size`, or the default.
    pub fn payload_buffer_size(&self, header_size: usize) -> usize {
        match self.max_packet_size {
            Some(max) => max.saturating_sub(header_size + UDP_OVERHEAD + IP_OVERHEAD),
            None => DEFAULT_PAYLOAD_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_port() {
        assert!(matches!(
            ReceiverConfig::new(0, 5),
            Err(ReceiverError::BadParameters(_))
        ));
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(matches!(
            ReceiverConfig::new(5004, 0),
            Err(ReceiverError::BadParameters(_))
        ));
    }

    #[test]
    fn accepts_valid_config() {
        assert!(ReceiverConfig::new(5004, 1).is_ok());
    }

    #[test]
    fn detects_multicast_range() {
        let cfg = ReceiverConfig::new(5004, 1)
            .unwrap()
            .with_recv_addr("239.1.2.3".parse().unwrap());
        assert!(cfg.is_multicast());

        let cfg = ReceiverConfig::new(5004, 1)
            .unwrap()
            .with_recv_addr("10.0.0.1".parse().unwrap());
        assert!(!cfg.is_multicast());
    }

    #[test]
    fn payload_buffer_size_subtracts_overhead() {
        let cfg = ReceiverConfig::new(5004, 1)
            .unwrap()
            .with_max_packet_size(1500);
        assert_eq!(
            cfg.payload_buffer_size(8),
            1500 - 8 - UDP_OVERHEAD - IP_OVERHEAD
        );
    }

    #[test]
    fn payload_buffer_size_defaults_without_max_packet_size() {
        let cfg = ReceiverConfig::new(5004, 1).unwrap();
        assert_eq!(cfg.payload_buffer_size(8), DEFAULT_PAYLOAD_SIZE);
    }
}
