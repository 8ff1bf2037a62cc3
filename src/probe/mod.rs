//! Probe module for TCP reachability monitoring.
//!
//! Turns target descriptors into typed tasks, keeps their addresses fresh
//! and runs connect-only probes against them.

mod dns;
mod params;
mod task;
mod tcp;

pub use dns::*;
pub use params::*;
pub use task::*;
pub use tcp::*;

#[cfg(test)]
pub(crate) use dns::testing;

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("probe cancelled")]
    Cancelled,
    #[error("network error: {0}")]
    Network(String),
}

/// Kind of task, selected by the descriptor scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    RawIpv4,
    RawIpv6,
    DnsIpv4,
    DnsIpv6,
    HttpIpv4,
    HttpIpv6,
    HttpsIpv4,
    HttpsIpv6,
}

impl ProbeKind {
    /// Map a descriptor scheme to a kind.
    ///
    /// Only the TCP-connect kinds are accepted; the HTTP(S) schemes are
    /// reserved and rejected here like any other unknown scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "ipv4" => Some(Self::RawIpv4),
            "ipv6" => Some(Self::RawIpv6),
            "dns+ipv4" => Some(Self::DnsIpv4),
            "dns+ipv6" => Some(Self::DnsIpv6),
            _ => None,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::RawIpv4 => "ipv4",
            Self::RawIpv6 => "ipv6",
            Self::DnsIpv4 => "dns+ipv4",
            Self::DnsIpv6 => "dns+ipv6",
            Self::HttpIpv4 => "http+ipv4",
            Self::HttpIpv6 => "http+ipv6",
            Self::HttpsIpv4 => "https+ipv4",
            Self::HttpsIpv6 => "https+ipv6",
        }
    }

    /// Raw kinds carry a literal address and never re-resolve.
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::RawIpv4 | Self::RawIpv6)
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self, Self::RawIpv4 | Self::DnsIpv4)
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, Self::RawIpv6 | Self::DnsIpv6)
    }

    /// Address family used when resolving the host of this kind.
    pub fn family(&self) -> AddressFamily {
        match self {
            Self::RawIpv6 | Self::DnsIpv6 | Self::HttpIpv6 | Self::HttpsIpv6 => AddressFamily::Ipv6,
            _ => AddressFamily::Ipv4,
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// IP address family of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => f.write_str("IPv4"),
            Self::Ipv6 => f.write_str("IPv6"),
        }
    }
}

/// Network mode used to open probe sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    /// Family follows the target address.
    Tcp,
    Tcp4,
    Tcp6,
}

impl NetworkMode {
    pub fn from_flags(ipv4: bool, ipv6: bool) -> Self {
        if ipv4 {
            Self::Tcp4
        } else if ipv6 {
            Self::Tcp6
        } else {
            Self::Tcp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_mapping() {
        assert_eq!(ProbeKind::from_scheme("ipv4"), Some(ProbeKind::RawIpv4));
        assert_eq!(ProbeKind::from_scheme("ipv6"), Some(ProbeKind::RawIpv6));
        assert_eq!(ProbeKind::from_scheme("dns+ipv4"), Some(ProbeKind::DnsIpv4));
        assert_eq!(ProbeKind::from_scheme("dns+ipv6"), Some(ProbeKind::DnsIpv6));
        assert_eq!(ProbeKind::from_scheme("http+ipv4"), None);
        assert_eq!(ProbeKind::from_scheme("tcp"), None);
    }

    #[test]
    fn test_kind_flags() {
        assert!(ProbeKind::RawIpv4.is_raw());
        assert!(!ProbeKind::DnsIpv4.is_raw());
        assert!(ProbeKind::DnsIpv4.is_ipv4());
        assert!(ProbeKind::DnsIpv6.is_ipv6());
        assert!(!ProbeKind::HttpIpv4.is_ipv4());
        assert_eq!(ProbeKind::HttpsIpv6.family(), AddressFamily::Ipv6);
    }

    #[test]
    fn test_network_mode() {
        assert_eq!(NetworkMode::from_flags(true, false), NetworkMode::Tcp4);
        assert_eq!(NetworkMode::from_flags(false, true), NetworkMode::Tcp6);
        assert_eq!(NetworkMode::from_flags(false, false), NetworkMode::Tcp);
    }
}
