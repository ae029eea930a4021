//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (FERRY_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use ferry_core::RouterConfig;
use ferry_delivery::{DeliveryConfig, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Push delivery.
    #[serde(default)]
    pub delivery: DeliverySection,

    /// Duplicate push suppression.
    #[serde(default)]
    pub dedup: DedupSection,

    /// Live routes of in-progress journeys.
    #[serde(default)]
    pub live_routes: LiveRoutesSection,

    /// Heartbeat and termination sweep.
    #[serde(default)]
    pub heartbeat: HeartbeatSection,

    /// Event routing.
    #[serde(default)]
    pub router: RouterSection,

    /// Stop topology.
    #[serde(default)]
    pub topology: TopologySection,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Push delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySection {
    /// Maximum number of pushes in progress at once.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Consecutive failed pushes tolerated before removal.
    #[serde(default = "default_max_failed_pushes")]
    pub max_failed_pushes: u32,
}

/// Dedup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSection {
    /// How long a sent push suppresses identical ones, in seconds.
    #[serde(default = "default_dedup_ttl")]
    pub ttl_secs: u64,

    /// How often expired entries are evicted, in seconds.
    #[serde(default = "default_evict_interval")]
    pub evict_interval_secs: u64,
}

/// Live route configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveRoutesSection {
    /// How long a journey's route is kept after its last update, in seconds.
    #[serde(default = "default_live_route_ttl")]
    pub ttl_secs: u64,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSection {
    /// Sweep interval in milliseconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// Minimum time between termination checks, in seconds.
    #[serde(default = "default_termination_check_interval")]
    pub termination_check_interval_secs: u64,
}

/// Router configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterSection {
    /// Producers whose events are routed. Empty accepts all.
    #[serde(default)]
    pub accepted_producers: BTreeSet<String>,
}

/// Topology configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologySection {
    /// JSON file mapping station refs to their quay refs.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("FERRY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    env_or("FERRY_PORT", 8080)
}

fn default_workers() -> usize {
    env_or("FERRY_DELIVERY_WORKERS", 50)
}

fn default_request_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_max_failed_pushes() -> u32 {
    3
}

fn default_dedup_ttl() -> u64 {
    24 * 60 * 60
}

fn default_evict_interval() -> u64 {
    300
}

fn default_live_route_ttl() -> u64 {
    24 * 60 * 60
}

fn default_sweep_interval() -> u64 {
    60_000 // 1 minute
}

fn default_termination_check_interval() -> u64 {
    3 * 60 * 60
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    env_or("FERRY_METRICS_PORT", 9090)
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            delivery: DeliverySection::default(),
            dedup: DedupSection::default(),
            live_routes: LiveRoutesSection::default(),
            heartbeat: HeartbeatSection::default(),
            router: RouterSection::default(),
            topology: TopologySection::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            request_timeout_ms: default_request_timeout(),
            max_failed_pushes: default_max_failed_pushes(),
        }
    }
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_dedup_ttl(),
            evict_interval_secs: default_evict_interval(),
        }
    }
}

impl Default for LiveRoutesSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_live_route_ttl(),
        }
    }
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval(),
            termination_check_interval_secs: default_termination_check_interval(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("FERRY_CONFIG") {
            return Self::from_file(shellexpand::tilde(&path).as_ref());
        }

        let config_paths = [
            "ferry.toml",
            "/etc/ferry/ferry.toml",
            "~/.config/ferry/ferry.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }

    /// Router settings.
    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            dedup_ttl: Duration::from_secs(self.dedup.ttl_secs),
            accepted_producers: self.router.accepted_producers.clone(),
        }
    }

    /// Delivery settings.
    #[must_use]
    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            workers: self.delivery.workers,
            request_timeout: Duration::from_millis(self.delivery.request_timeout_ms),
            max_failed_pushes: self.delivery.max_failed_pushes,
        }
    }

    /// Scheduler settings.
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sweep_interval: Duration::from_millis(self.heartbeat.sweep_interval_ms),
            termination_check_interval: Duration::from_secs(
                self.heartbeat.termination_check_interval_secs,
            ),
        }
    }

    /// How often expired dedup entries are evicted.
    #[must_use]
    pub fn evict_interval(&self) -> Duration {
        Duration::from_secs(self.dedup.evict_interval_secs)
    }

    /// How long a live route outlives its last update.
    #[must_use]
    pub fn live_route_ttl(&self) -> Duration {
        Duration::from_secs(self.live_routes.ttl_secs)
    }
}
