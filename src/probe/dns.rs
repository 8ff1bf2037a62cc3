//! Hostname resolution and the DNS refresh policy.

use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use thiserror::Error;

use super::AddressFamily;

/// Upper bound on a single lookup, independent of the probe timeout.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);

/// DNS resolution error types.
#[derive(Error, Debug)]
pub enum DnsError {
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("lookup failed: {0}")]
    Lookup(#[from] io::Error),
    #[error("no {family} address found for {host}")]
    NoAddress { host: String, family: AddressFamily },
}

/// Source of hostname lookups.
pub trait Resolver: Send + Sync + 'static {
    /// Return every address the name maps to, of any family.
    fn lookup(&self, host: &str) -> impl Future<Output = io::Result<Vec<IpAddr>>> + Send;
}

/// Resolver backed by the system's `getaddrinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|sa| sa.ip()).collect())
    }
}

/// Resolve `host` to one address of `family`.
///
/// When several addresses qualify one is picked uniformly at random, which
/// spreads probes across every address the name publishes.
pub async fn resolve<R: Resolver>(
    resolver: &R,
    host: &str,
    family: AddressFamily,
) -> Result<IpAddr, DnsError> {
    let ips = tokio::time::timeout(RESOLVE_TIMEOUT, resolver.lookup(host))
        .await
        .map_err(|_| DnsError::Timeout(RESOLVE_TIMEOUT))??;

    select_address(&ips, family).ok_or_else(|| DnsError::NoAddress {
        host: host.to_string(),
        family,
    })
}

/// Pick a random address of `family`, unmapping IPv4-mapped IPv6 first.
pub fn select_address(ips: &[IpAddr], family: AddressFamily) -> Option<IpAddr> {
    let candidates: Vec<IpAddr> = ips
        .iter()
        .map(|ip| ip.to_canonical())
        .filter(|ip| match family {
            AddressFamily::Ipv4 => ip.is_ipv4(),
            AddressFamily::Ipv6 => ip.is_ipv6(),
        })
        .collect();

    candidates.choose(&mut rand::thread_rng()).copied()
}

/// Whether the address must be re-resolved before `attempt`.
pub fn refresh_due(attempt: u64, dns_interval: u8) -> bool {
    dns_interval > 0 && attempt > 1 && attempt % u64::from(dns_interval) == 1
}

/// Result of applying the refresh policy to one attempt.
#[derive(Debug)]
pub enum DnsRefresh {
    /// No lookup was performed.
    NotRequired,
    Updated {
        previous: IpAddr,
        current: IpAddr,
        latency: Duration,
    },
    /// Lookup failed; the previous address stays in use.
    Failed {
        previous: IpAddr,
        latency: Duration,
        error: DnsError,
    },
}

impl DnsRefresh {
    pub fn required(&self) -> bool {
        !matches!(self, Self::NotRequired)
    }
}

/// Apply the refresh policy for `attempt`, returning the address to probe
/// alongside what happened.
pub async fn refresh_for_attempt<R: Resolver>(
    resolver: &R,
    host: &str,
    family: AddressFamily,
    raw: bool,
    current: IpAddr,
    attempt: u64,
    dns_interval: u8,
) -> (IpAddr, DnsRefresh) {
    if raw || !refresh_due(attempt, dns_interval) {
        return (current, DnsRefresh::NotRequired);
    }

    let start = Instant::now();
    let result = resolve(resolver, host, family).await;
    let latency = start.elapsed();

    match result {
        Ok(ip) => (
            ip,
            DnsRefresh::Updated {
                previous: current,
                current: ip,
                latency,
            },
        ),
        Err(error) => (
            current,
            DnsRefresh::Failed {
                previous: current,
                latency,
                error,
            },
        ),
    }
}
