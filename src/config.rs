use std::net::SocketAddr;
use std::time::Duration;

use tracing::warn;

use crate::dns::{LookupMode, NameServer};

/// Engine configuration.
///
/// Every field can be overridden from the environment via `HUGINN_*`
/// variables; malformed values fall back to the default with a warning.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DiscoveryConfig {
    /// Transport the lookup backend starts in.
    pub lookup_mode: LookupMode,

    /// Local address the backend binds to.
    pub bind_address: SocketAddr,

    /// Interval between unicast re-queries of every active service type.
    pub unicast_lookup_interval: Duration,

    /// Consecutive missed refresh cycles before an instance is pruned
    /// (unicast only).
    pub unicast_error_threshold: u32,

    /// Interval of the network watchdog's configuration refresh.
    pub watchdog_interval: Duration,

    /// Nameservers pushed to the backend in unicast mode. Empty means fall
    /// back to the system-provided list.
    pub name_servers: Vec<NameServer>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            lookup_mode: LookupMode::Multicast,
            bind_address: "0.0.0.0:5353"
                .parse()
                .expect("default bind address is valid"),
            unicast_lookup_interval: Duration::from_millis(5000),
            unicast_error_threshold: 2,
            watchdog_interval: Duration::from_secs(3),
            name_servers: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// Build a configuration from `HUGINN_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("HUGINN_LOOKUP_MODE") {
            match value.parse() {
                Ok(mode) => config.lookup_mode = mode,
                Err(_) => warn!("Ignoring invalid HUGINN_LOOKUP_MODE: {}", value),
            }
        }

        if let Ok(value) = std::env::var("HUGINN_BIND_ADDR") {
            match value.parse() {
                Ok(addr) => config.bind_address = addr,
                Err(_) => warn!("Ignoring invalid HUGINN_BIND_ADDR: {}", value),
            }
        }

        if let Some(interval) = parse_millis_var("HUGINN_UNICAST_INTERVAL_MS") {
            config.unicast_lookup_interval = interval;
        }

        if let Ok(value) = std::env::var("HUGINN_UNICAST_ERROR_THRESHOLD") {
            match value.parse() {
                Ok(threshold) => config.unicast_error_threshold = threshold,
                Err(_) => warn!("Ignoring invalid HUGINN_UNICAST_ERROR_THRESHOLD: {}", value),
            }
        }

        if let Some(interval) = parse_millis_var("HUGINN_WATCHDOG_INTERVAL_MS") {
            config.watchdog_interval = interval;
        }

        if let Ok(value) = std::env::var("HUGINN_NAME_SERVERS") {
            config.name_servers = parse_name_servers(&value);
        }

        config
    }
}

/// Parse a comma-separated nameserver list, skipping malformed entries.
pub fn parse_name_servers(value: &str) -> Vec<NameServer> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse::<NameServer>() {
            Ok(ns) => Some(ns),
            Err(_) => {
                warn!("Ignoring invalid name server entry: {}", entry);
                None
            }
        })
        .collect()
}

fn parse_millis_var(var: &str) -> Option<Duration> {
    let value = std::env::var(var).ok()?;
    match value.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            warn!("Ignoring invalid {}: {}", var, value);
            None
        }
    }
}
