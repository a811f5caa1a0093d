//! Self-address detection
//!
//! Used only to keep a node from dialing or announcing itself.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use tokio::net::lookup_host;

/// Check whether `ip` belongs to this host
///
/// Loopback and unspecified addresses always count, as does the listener's
/// own IP. Anything else is local if a socket can be bound to it.
pub fn is_local_ip(ip: IpAddr, listener_ip: Option<IpAddr>) -> bool {
    ip.is_loopback()
        || ip.is_unspecified()
        || listener_ip == Some(ip)
        || UdpSocket::bind(SocketAddr::new(ip, 0)).is_ok()
}

/// Check whether `address` (`host:port`) points back at our own listener
///
/// The port must match the bound port and the host must resolve to a local
/// IP. Unresolvable addresses are never self.
pub async fn is_self_address(address: &str, listener: SocketAddr) -> bool {
    let Some((_, port)) = address.rsplit_once(':') else {
        return false;
    };

    if port.parse::<u16>().ok() != Some(listener.port()) {
        return false;
    }

    match lookup_host(address).await {
        Ok(mut resolved) => resolved.any(|addr| is_local_ip(addr.ip(), Some(listener.ip()))),
        Err(_) => false,
    }
}
