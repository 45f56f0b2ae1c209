//! UDP socket plumbing (external collaborator, `spec.md` §6).
//!
//! Out of scope as *logic* per `spec.md` §1, but still implemented here
//! so the crate is runnable end to end: bind, `SO_REUSEADDR`,
//! `SO_RCVTIMEO`, `SO_RCVBUF`, and `IP_ADD_MEMBERSHIP` for multicast.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::ReceiverConfig;
use crate::error::Result;

/// Advisory receive-buffer size (`spec.md` §6: "SO_RCVBUF ≈ 600 KiB").
const RECV_BUFFER_BYTES: usize = 600 * 1024;

pub fn bind(config: &ReceiverConfig) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_read_timeout(Some(Duration::from_secs(u64::from(
        config.recv_timeout_secs,
    ))))?;
    socket.set_recv_buffer_size(RECV_BUFFER_BYTES)?;

    let bind_addr = config.iface_addr.unwrap_or(Ipv4Addr::UNSPECIFIED);
    let bind_sock_addr = SocketAddrV4::new(bind_addr, config.recv_port);
    socket.bind(&bind_sock_addr.into())?;

    if config.is_multicast() {
        if let Some(group) = config.recv_addr {
            let iface = config.iface_addr.unwrap_or(Ipv4Addr::UNSPECIFIED);
            socket.join_multicast_v4(&group, &iface)?;
        }
    }

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_successfully_on_a_free_port() {
        let config = ReceiverConfig::new(39812, 1).unwrap();
        let socket = bind(&config);
        assert!(socket.is_ok());
    }
}
