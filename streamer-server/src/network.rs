//! UDP sender sockets.
//!
//! Every replay worker owns exactly one of these. The socket is built with
//! socket2 (non-blocking, bound to an ephemeral port) and then handed to
//! tokio, the same way the rest of our socket code does it.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::{lookup_host, UdpSocket};

/// Create a non-blocking IPv4 UDP socket bound to an ephemeral port.
///
/// Must be called from within a tokio runtime.
pub fn create_udp_sender() -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    socket.bind(&bind_addr.into())?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// Resolve `host:port` to the first IPv4 address.
pub async fn resolve_destination(host: &str, port: u16) -> io::Result<SocketAddr> {
    lookup_host((host, port))
        .await?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("No IPv4 address for {}:{}", host, port),
            )
        })
}
