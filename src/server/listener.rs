// Reusable listener module
// Binds the edge server socket with SO_REUSEADDR / SO_REUSEPORT

use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Pending-connection queue length handed to `listen(2)`
pub const DEFAULT_BACKLOG: i32 = 128;

/// Create a `TcpListener` with `SO_REUSEADDR` (and `SO_REUSEPORT` on unix).
///
/// Port reuse lets a replacement process bind before the old one exits, so
/// a redeploy does not refuse connections in between.
pub fn create_reusable_listener(addr: SocketAddr, backlog: i32) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_binds_ephemeral_port() {
        let listener =
            create_reusable_listener("127.0.0.1:0".parse().unwrap(), DEFAULT_BACKLOG).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_second_listener_shares_port() {
        let first =
            create_reusable_listener("127.0.0.1:0".parse().unwrap(), DEFAULT_BACKLOG).unwrap();
        let addr = first.local_addr().unwrap();
        let second = create_reusable_listener(addr, DEFAULT_BACKLOG).unwrap();
        assert_eq!(second.local_addr().unwrap(), addr);
    }
}
