//! DDNS Server Configuration
//!
//! Listener addresses, zone management API credentials, job polling and
//! update processing parameters. Every section has defaults so a config
//! file only needs to name what it changes (usually just the API token).

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use super::DnsError;

/// Default zone management API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.dns-platform.jp/dpf/v1";

/// Description attached to zone apply requests
pub const DEFAULT_APPLY_DESCRIPTION: &str = "update by DDNS server";

/// Main DDNS server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DdnsConfig {
    /// UDP listen address (default: 0.0.0.0:53)
    pub udp_addr: SocketAddr,

    /// TCP listen address (default: 0.0.0.0:53)
    pub tcp_addr: SocketAddr,

    /// Zone management API access
    pub api: ApiConfig,

    /// Job polling
    pub jobs: JobConfig,

    /// Update processing
    pub update: UpdateConfig,

    /// TCP connection limits (DoS protection)
    pub tcp_limits: TcpLimitConfig,
}

impl Default for DdnsConfig {
    fn default() -> Self {
        let listen = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 53));
        Self {
            udp_addr: listen,
            tcp_addr: listen,
            api: ApiConfig::default(),
            jobs: JobConfig::default(),
            update: UpdateConfig::default(),
            tcp_limits: TcpLimitConfig::default(),
        }
    }
}

impl DdnsConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen on the same address for UDP and TCP
    pub fn set_listen(&mut self, addr: SocketAddr) {
        self.udp_addr = addr;
        self.tcp_addr = addr;
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), DnsError> {
        if self.api.endpoint.trim().is_empty() {
            return Err(DnsError::ConfigError("api.endpoint must be set".to_string()));
        }

        if self.api.token.trim().is_empty() {
            return Err(DnsError::ConfigError("api.token must be set".to_string()));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(DnsError::ConfigError(
                "api.request_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.jobs.poll_interval_ms == 0 {
            return Err(DnsError::ConfigError(
                "jobs.poll_interval_ms must be > 0".to_string(),
            ));
        }

        if self.jobs.wait_timeout_secs == 0 {
            return Err(DnsError::ConfigError(
                "jobs.wait_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.update.timeout_secs == 0 {
            return Err(DnsError::ConfigError(
                "update.timeout_secs must be > 0".to_string(),
            ));
        }

        if self.update.page_size == 0 {
            return Err(DnsError::ConfigError(
                "update.page_size must be > 0".to_string(),
            ));
        }

        if self.tcp_limits.max_connections == 0 {
            return Err(DnsError::ConfigError(
                "tcp_limits.max_connections must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from TOML file
    pub fn from_toml(content: &str) -> Result<Self, DnsError> {
        toml::from_str(content).map_err(|e| DnsError::ConfigError(format!("TOML parse error: {}", e)))
    }

    /// Load configuration from YAML file
    pub fn from_yaml(content: &str) -> Result<Self, DnsError> {
        serde_yaml::from_str(content)
            .map_err(|e| DnsError::ConfigError(format!("YAML parse error: {}", e)))
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, DnsError> {
        toml::to_string_pretty(self)
            .map_err(|e| DnsError::ConfigError(format!("TOML serialize error: {}", e)))
    }
}

/// Zone management API access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the API
    pub endpoint: String,
    /// Bearer token
    pub token: String,
    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Job polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Delay between job status polls in milliseconds
    pub poll_interval_ms: u64,
    /// Give up waiting on a single job after this many seconds
    pub wait_timeout_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            wait_timeout_secs: 300,
        }
    }
}

impl JobConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

/// Update processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Upper bound on handling one UPDATE message, in seconds
    pub timeout_secs: u64,
    /// Description sent with zone apply requests
    pub apply_description: String,
    /// Records fetched per listing request
    pub page_size: usize,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            apply_description: DEFAULT_APPLY_DESCRIPTION.to_string(),
            page_size: 100,
        }
    }
}

impl UpdateConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// TCP connection limits for DoS protection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpLimitConfig {
    /// Maximum concurrent TCP connections
    pub max_connections: usize,
    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,
}

impl Default for TcpLimitConfig {
    fn default() -> Self {
        Self {
            max_connections: 256,
            idle_timeout_secs: 10,
        }
    }
}

impl TcpLimitConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
