//! Node data models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Proxy protocol carried by a node link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    VMess,
    #[serde(rename = "ss", alias = "shadowsocks")]
    ShadowSocks,
    Trojan,
    VLess,
}

impl Protocol {
    /// All supported protocols, in prefix-matching order
    pub const ALL: [Protocol; 4] = [
        Protocol::VMess,
        Protocol::ShadowSocks,
        Protocol::Trojan,
        Protocol::VLess,
    ];

    /// URI prefix including the scheme separator
    pub fn prefix(&self) -> &'static str {
        match self {
            Protocol::VMess => "vmess://",
            Protocol::ShadowSocks => "ss://",
            Protocol::Trojan => "trojan://",
            Protocol::VLess => "vless://",
        }
    }

    /// Detect the protocol of a link from its prefix
    pub fn detect(line: &str) -> Option<Protocol> {
        let line = line.trim_start();
        Self::ALL.into_iter().find(|p| line.starts_with(p.prefix()))
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::VMess => write!(f, "vmess"),
            Protocol::ShadowSocks => write!(f, "ss"),
            Protocol::Trojan => write!(f, "trojan"),
            Protocol::VLess => write!(f, "vless"),
        }
    }
}

impl FromStr for Protocol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vmess" => Ok(Protocol::VMess),
            "ss" | "shadowsocks" => Ok(Protocol::ShadowSocks),
            "trojan" => Ok(Protocol::Trojan),
            "vless" => Ok(Protocol::VLess),
            _ => Err(anyhow::anyhow!(
                "Invalid protocol: {}. Use: vmess, ss, trojan, vless",
                s
            )),
        }
    }
}

/// A parsed node link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// The link exactly as it appeared in the input
    pub raw: String,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl NodeDescriptor {
    pub fn new(raw: String, protocol: Protocol, host: String, port: u16) -> Self {
        Self {
            raw,
            protocol,
            host,
            port,
        }
    }

    /// Get the dial address in HOST:PORT format
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.protocol, self.address())
    }
}

/// Why a line could not be turned into a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ParseError {
    #[error("malformed {protocol} link: {reason}")]
    Malformed { protocol: Protocol, reason: String },
    #[error("unsupported protocol")]
    UnsupportedProtocol,
}

impl ParseError {
    pub(crate) fn malformed(protocol: Protocol, reason: impl Into<String>) -> Self {
        ParseError::Malformed {
            protocol,
            reason: reason.into(),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ParseError::Malformed { .. })
    }
}

/// Outcome of parsing a single line
pub type ParseOutcome = std::result::Result<NodeDescriptor, ParseError>;

/// Why a probe failed
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ProbeError {
    #[error("connection timed out")]
    Timeout,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("name resolution failed: {0}")]
    DnsFailure(String),
    #[error("{0}")]
    Unknown(String),
}

impl From<std::io::Error> for ProbeError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::ConnectionRefused => ProbeError::ConnectionRefused,
            std::io::ErrorKind::TimedOut => ProbeError::Timeout,
            _ => ProbeError::Unknown(e.to_string()),
        }
    }
}

/// Reachability of a probed node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProbeStatus {
    Alive,
    Dead(ProbeError),
}

/// Result of probing a single node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub descriptor: NodeDescriptor,
    pub status: ProbeStatus,
    /// Connect latency, present only for alive nodes
    pub latency_ms: Option<f64>,
}

impl ProbeResult {
    pub fn alive(descriptor: NodeDescriptor, latency_ms: f64) -> Self {
        Self {
            descriptor,
            status: ProbeStatus::Alive,
            latency_ms: Some(latency_ms.max(0.0)),
        }
    }

    pub fn dead(descriptor: NodeDescriptor, error: ProbeError) -> Self {
        Self {
            descriptor,
            status: ProbeStatus::Dead(error),
            latency_ms: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.status, ProbeStatus::Alive)
    }

    pub fn error(&self) -> Option<&ProbeError> {
        match &self.status {
            ProbeStatus::Dead(e) => Some(e),
            ProbeStatus::Alive => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(
            "trojan://pw@example.com:443#hk".to_string(),
            Protocol::Trojan,
            "example.com".to_string(),
            443,
        )
    }

    #[test]
    fn test_protocol_detect() {
        assert_eq!(Protocol::detect("vmess://abc"), Some(Protocol::VMess));
        assert_eq!(Protocol::detect("ss://abc"), Some(Protocol::ShadowSocks));
        assert_eq!(Protocol::detect("trojan://abc"), Some(Protocol::Trojan));
        assert_eq!(Protocol::detect("vless://abc"), Some(Protocol::VLess));
        assert_eq!(Protocol::detect("ssr://abc"), None);
        assert_eq!(Protocol::detect("http://1.2.3.4:80"), None);
    }

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("VMess".parse::<Protocol>().unwrap(), Protocol::VMess);
        assert_eq!(
            "shadowsocks".parse::<Protocol>().unwrap(),
            Protocol::ShadowSocks
        );
        assert_eq!(" vless ".parse::<Protocol>().unwrap(), Protocol::VLess);
        assert!("hysteria2".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_protocol_display_matches_prefix() {
        for protocol in Protocol::ALL {
            assert_eq!(format!("{}://", protocol), protocol.prefix());
        }
    }

    #[test]
    fn test_descriptor_address() {
        assert_eq!(descriptor().address(), "example.com:443");

        let v6 = NodeDescriptor::new(
            "ss://a:b@[::1]:8388".to_string(),
            Protocol::ShadowSocks,
            "::1".to_string(),
            8388,
        );
        assert_eq!(v6.address(), "[::1]:8388");
    }

    #[test]
    fn test_probe_result() {
        let result = ProbeResult::alive(descriptor(), 12.5);
        assert!(result.is_alive());
        assert_eq!(result.latency_ms, Some(12.5));
        assert!(result.error().is_none());

        let result = ProbeResult::dead(descriptor(), ProbeError::ConnectionRefused);
        assert!(!result.is_alive());
        assert!(result.latency_ms.is_none());
        assert_eq!(result.error(), Some(&ProbeError::ConnectionRefused));
    }

    #[test]
    fn test_probe_error_from_io() {
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert_eq!(ProbeError::from(refused), ProbeError::ConnectionRefused);

        let other = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(ProbeError::from(other), ProbeError::Unknown("boom".to_string()));
    }
}
