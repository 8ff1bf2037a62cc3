//! Target descriptor parsing.
//!
//! A descriptor looks like `dns+ipv4://host:443?probe_interval=2`: the
//! scheme picks the [`ProbeKind`], the authority names the target and the
//! query string carries [`ProbeParams`].

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::Url;

use super::{resolve, AddressFamily, DnsError, NetworkMode, ProbeKind, ProbeParams, Resolver};

/// Task construction error types.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("invalid task URL: {0}")]
    InvalidUrl(#[source] url::ParseError),
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),
    #[error("invalid port in {0}")]
    InvalidPort(String),
    #[error("invalid {family} address: {host}")]
    InvalidAddress { host: String, family: AddressFamily },
    #[error("unknown hostname {host}: {source}")]
    UnknownHostname {
        host: String,
        #[source]
        source: DnsError,
    },
}

/// Immutable description of one probe task.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    /// Descriptor as configured.
    pub raw: String,
    pub kind: ProbeKind,
    /// Host as written, without brackets.
    pub hostname: String,
    pub port: u16,
    pub params: ProbeParams,
    /// Literal address for raw kinds.
    literal: Option<IpAddr>,
}

impl TaskDefinition {
    /// Parse a descriptor without touching the network.
    pub fn parse(raw: &str) -> Result<Self, TaskError> {
        let url = Url::parse(raw).map_err(|e| match e {
            url::ParseError::InvalidPort => TaskError::InvalidPort(raw.to_string()),
            other => TaskError::InvalidUrl(other),
        })?;

        let kind = ProbeKind::from_scheme(url.scheme())
            .ok_or_else(|| TaskError::UnknownTaskType(url.scheme().to_string()))?;

        let hostname = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .unwrap_or_default();

        let port = url
            .port()
            .ok_or_else(|| TaskError::InvalidPort(raw.to_string()))?;

        let literal = if kind.is_raw() {
            Some(parse_literal(&hostname, kind.family())?)
        } else {
            None
        };

        let params = ProbeParams::from_query(url.query_pairs().into_owned());

        Ok(Self {
            raw: raw.to_string(),
            kind,
            hostname,
            port,
            params,
            literal,
        })
    }

    /// Address to start probing: the literal for raw kinds, a fresh
    /// resolution otherwise.
    pub async fn initial_address<R: Resolver>(&self, resolver: &R) -> Result<IpAddr, TaskError> {
        if let Some(ip) = self.literal {
            return Ok(ip);
        }
        resolve(resolver, &self.hostname, self.kind.family())
            .await
            .map_err(|source| TaskError::UnknownHostname {
                host: self.hostname.clone(),
                source,
            })
    }

    pub fn is_ipv4(&self) -> bool {
        self.kind.is_ipv4()
    }

    pub fn is_ipv6(&self) -> bool {
        self.kind.is_ipv6()
    }

    pub fn network_mode(&self) -> NetworkMode {
        NetworkMode::from_flags(self.is_ipv4(), self.is_ipv6())
    }

    /// `host:port` as written in the descriptor.
    pub fn host(&self) -> String {
        match self.kind.family() {
            AddressFamily::Ipv6 if self.hostname.contains(':') => {
                format!("[{}]:{}", self.hostname, self.port)
            }
            _ => format!("{}:{}", self.hostname, self.port),
        }
    }
}

fn parse_literal(host: &str, family: AddressFamily) -> Result<IpAddr, TaskError> {
    let parsed = match family {
        AddressFamily::Ipv4 => host.parse::<Ipv4Addr>().map(IpAddr::V4).ok(),
        AddressFamily::Ipv6 => host.parse::<Ipv6Addr>().map(IpAddr::V6).ok(),
    };
    parsed.ok_or_else(|| TaskError::InvalidAddress {
        host: host.to_string(),
        family,
    })
}
