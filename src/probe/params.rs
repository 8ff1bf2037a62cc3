//! Probe parameters resolved from a descriptor's query string.

use std::collections::BTreeMap;
use std::time::Duration;

pub const PARAM_INTERVAL: &str = "probe_interval";
pub const PARAM_TIMEOUT: &str = "probe_timeout";
pub const PARAM_USE_TLS: &str = "use_tls";
pub const PARAM_DNS_INTERVAL: &str = "dns_interval";
pub const PARAM_LOG_SIZE: &str = "log_size";
pub const PARAM_STATS_INTERVAL: &str = "stats_interval";
pub const PARAM_OUTPUT_FORMAT: &str = "output_format";

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_DNS_INTERVAL: u8 = 10;
const DEFAULT_STATS_INTERVAL: u8 = 10;
const DEFAULT_LOG_SIZE: u16 = 255;
const DEFAULT_OUTPUT_FORMAT: &str = "json";

/// Tunables of one task. Immutable once the task is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeParams {
    /// Time between probe ticks.
    pub interval: Duration,
    /// Bound on a single connect attempt.
    pub timeout: Duration,
    /// Reserved for TLS-aware probing; the connect probe ignores it.
    pub use_tls: bool,
    /// Attempts between DNS refreshes.
    pub dns_interval: u8,
    /// Size of the latency history window.
    pub log_size: u16,
    /// Attempts between statistics snapshots.
    pub stats_interval: u8,
    pub output_format: String,
    /// Unrecognized options, handed to the event sink untouched.
    pub sink_options: BTreeMap<String, String>,
}

impl Default for ProbeParams {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            use_tls: false,
            dns_interval: DEFAULT_DNS_INTERVAL,
            log_size: DEFAULT_LOG_SIZE,
            stats_interval: DEFAULT_STATS_INTERVAL,
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            sink_options: BTreeMap::new(),
        }
    }
}

impl ProbeParams {
    /// Resolve parameters from decoded query pairs.
    ///
    /// Each option is read on its own: a malformed value falls back to that
    /// option's default without affecting the others. Zero values are treated
    /// as malformed. When a key repeats, the first occurrence wins.
    pub fn from_query<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut query: BTreeMap<String, String> = BTreeMap::new();
        for (k, v) in pairs {
            query.entry(k.into()).or_insert_with(|| v.into());
        }

        let mut params = Self::default();

        if let Some(secs) = non_zero::<u64>(query.remove(PARAM_INTERVAL)) {
            params.interval = Duration::from_secs(secs);
        }
        if let Some(ms) = non_zero::<u64>(query.remove(PARAM_TIMEOUT)) {
            params.timeout = Duration::from_millis(ms);
        }
        if let Some(v) = query.remove(PARAM_USE_TLS) {
            params.use_tls = parse_bool(&v).unwrap_or(false);
        }
        if let Some(n) = non_zero::<u8>(query.remove(PARAM_DNS_INTERVAL)) {
            params.dns_interval = n;
        }
        if let Some(n) = non_zero::<u16>(query.remove(PARAM_LOG_SIZE)) {
            params.log_size = n;
        }
        if let Some(n) = non_zero::<u8>(query.remove(PARAM_STATS_INTERVAL)) {
            params.stats_interval = n;
        }
        if let Some(format) = query.remove(PARAM_OUTPUT_FORMAT) {
            if !format.is_empty() {
                params.output_format = format;
            }
        }

        params.sink_options = query;
        params
    }

    pub fn sink_option(&self, key: &str) -> Option<&str> {
        self.sink_options.get(key).map(String::as_str)
    }
}

fn non_zero<T>(value: Option<String>) -> Option<T>
where
    T: std::str::FromStr + PartialEq + Default,
{
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|n| *n != T::default())
}

/// Parse a boolean the way command-line style flags are usually spelled.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
