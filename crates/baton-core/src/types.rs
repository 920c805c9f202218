//! Common types used throughout Baton

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a listener's connections are served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Plain TCP
    Plain,
    /// TLS-wrapped TCP
    #[serde(alias = "secure_transport", alias = "tls")]
    Secure,
}

impl Default for TransportMode {
    fn default() -> Self {
        Self::Plain
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Secure => write!(f, "secure"),
        }
    }
}

/// Socket network a listener is opened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// TCP over IPv4 or IPv6, whichever the address resolves to
    Tcp,
    /// TCP restricted to IPv4
    Tcp4,
    /// TCP restricted to IPv6
    Tcp6,
}

impl Default for Network {
    fn default() -> Self {
        Self::Tcp
    }
}

impl Network {
    /// Whether an address family is allowed on this network
    pub fn accepts(&self, addr: &std::net::SocketAddr) -> bool {
        match self {
            Self::Tcp => true,
            Self::Tcp4 => addr.is_ipv4(),
            Self::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Tcp4 => write!(f, "tcp4"),
            Self::Tcp6 => write!(f, "tcp6"),
        }
    }
}

impl FromStr for Network {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "tcp" => Ok(Self::Tcp),
            "tcp4" => Ok(Self::Tcp4),
            "tcp6" => Ok(Self::Tcp6),
            other => Err(crate::Error::Config(format!(
                "Unsupported network: {other} (must be tcp, tcp4 or tcp6)"
            ))),
        }
    }
}

/// A logical listening address declared by a server component
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerDescriptor {
    /// Transport the component expects on this listener
    #[serde(default)]
    pub mode: TransportMode,

    /// Logical address, e.g. `127.0.0.1:8080`
    pub address: String,
}

impl ListenerDescriptor {
    /// Create a new descriptor
    pub fn new(mode: TransportMode, address: impl Into<String>) -> Self {
        Self {
            mode,
            address: address.into(),
        }
    }

    /// Create a plain-mode descriptor
    pub fn plain(address: impl Into<String>) -> Self {
        Self::new(TransportMode::Plain, address)
    }

    /// Create a secure-mode descriptor
    pub fn secure(address: impl Into<String>) -> Self {
        Self::new(TransportMode::Secure, address)
    }
}

impl fmt::Display for ListenerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.mode, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing() {
        assert_eq!("tcp".parse::<Network>().unwrap(), Network::Tcp);
        assert_eq!("".parse::<Network>().unwrap(), Network::Tcp);
        assert_eq!("TCP6".parse::<Network>().unwrap(), Network::Tcp6);
        assert!("udp".parse::<Network>().is_err());
    }

    #[test]
    fn test_network_accepts_family() {
        let v4: std::net::SocketAddr = "127.0.0.1:80".parse().unwrap();
        let v6: std::net::SocketAddr = "[::1]:80".parse().unwrap();
        assert!(Network::Tcp.accepts(&v4));
        assert!(Network::Tcp.accepts(&v6));
        assert!(Network::Tcp4.accepts(&v4));
        assert!(!Network::Tcp4.accepts(&v6));
        assert!(!Network::Tcp6.accepts(&v4));
    }

    #[test]
    fn test_descriptor_display() {
        assert_eq!(
            ListenerDescriptor::plain("127.0.0.1:8080").to_string(),
            "plain://127.0.0.1:8080"
        );
        assert_eq!(
            ListenerDescriptor::secure("0.0.0.0:8443").to_string(),
            "secure://0.0.0.0:8443"
        );
    }

    #[test]
    fn test_mode_deserialize_aliases() {
        let mode: TransportMode = serde_json::from_str("\"secure_transport\"").unwrap();
        assert_eq!(mode, TransportMode::Secure);
        let mode: TransportMode = serde_json::from_str("\"plain\"").unwrap();
        assert_eq!(mode, TransportMode::Plain);
    }
}
