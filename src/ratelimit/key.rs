//! Client identity derived from a peer address.

use std::net::{IpAddr, SocketAddr};

/// Identifies a client for rate limiting purposes.
///
/// Only the host portion of the peer address is used, so every connection
/// from the same host shares one bucket regardless of its source port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a key from an already-extracted host string.
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into())
    }

    /// The host string this key wraps.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for ClientKey {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }
}

impl From<&SocketAddr> for ClientKey {
    fn from(addr: &SocketAddr) -> Self {
        Self::from(addr.ip())
    }
}

impl From<SocketAddr> for ClientKey {
    fn from(addr: SocketAddr) -> Self {
        Self::from(&addr)
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
