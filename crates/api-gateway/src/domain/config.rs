//! Gateway configuration with validation.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Public HTTP/WebSocket server
    pub http: HttpConfig,
    /// Admin server (localhost only by default)
    pub admin: AdminConfig,
    /// Registry storage
    pub storage: StorageConfig,
    /// Bus agent selection
    pub bus: BusConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Streaming session configuration
    pub websocket: WebSocketConfig,
    /// Request validation limits
    pub limits: LimitsConfig,
    /// CORS configuration
    pub cors: CorsConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin.enabled
            && self.http.port == self.admin.port
            && self.http.host == self.admin.host
        {
            return Err(ConfigError::DuplicatePorts);
        }

        if self.limits.max_request_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_request_size cannot be 0".into(),
            ));
        }

        if self.websocket.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "websocket max_message_size cannot be 0".into(),
            ));
        }

        if self.websocket.channel_buffer == 0 {
            return Err(ConfigError::InvalidLimit(
                "websocket channel_buffer cannot be 0".into(),
            ));
        }

        if self.timeouts.call.is_zero() {
            return Err(ConfigError::InvalidTimeout("call timeout cannot be 0".into()));
        }

        if self.timeouts.call > MAX_CALL_TIMEOUT {
            return Err(ConfigError::InvalidTimeout(format!(
                "call timeout cannot exceed {}s",
                MAX_CALL_TIMEOUT.as_secs()
            )));
        }

        if self.storage.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage path cannot be empty".into()));
        }

        if self.bus.agent.trim().is_empty() {
            return Err(ConfigError::Invalid("bus agent address cannot be empty".into()));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Get Admin server bind address
    pub fn admin_addr(&self) -> SocketAddr {
        SocketAddr::new(self.admin.host, self.admin.port)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 2222)
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 2222,
        }
    }
}

/// Admin server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bind address (localhost only by default for security)
    pub host: IpAddr,
    /// Port (default: 2223)
    pub port: u16,
    /// Enable admin server
    pub enabled: bool,
    /// Required API key (None = no auth required, only localhost check)
    pub api_key: Option<String>,
    /// Allow non-localhost connections (DANGER)
    pub allow_external: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 2223,
            enabled: true,
            api_key: None,
            allow_external: false,
        }
    }
}

/// Registry storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the registry database and its lock file
    pub path: PathBuf,
    /// fsync every write
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./.registry.db"),
            sync_writes: true,
        }
    }
}

/// Bus agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Agent address (`local` selects the in-process router)
    pub agent: String,
    /// Per-subscriber buffer of the in-process router
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            agent: shared_bus::LOCAL_AGENT_ADDRESS.to_string(),
            channel_capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Upper bound for `timeouts.call`
pub const MAX_CALL_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for single-result calls (`/call`)
    #[serde(with = "humantime_serde")]
    pub call: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            call: Duration::from_secs(10),
        }
    }
}

/// Streaming session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Max inbound frame size in bytes
    pub max_message_size: usize,
    /// Buffer between a subscription task and the socket writer
    pub channel_buffer: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 1024 * 1024, // 1MB
            channel_buffer: 256,
        }
    }
}

/// Request limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Max request body size in bytes (default: 1MB)
    pub max_request_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 1024 * 1024, // 1MB
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec!["Content-Type".to_string()],
            max_age: 86400, // 24 hours
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Public and admin servers on the same address
    #[error("duplicate ports configured")]
    DuplicatePorts,
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Parse a duration like `10s`, `500ms` or `2m`. Bare numbers are seconds.
pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
    humantime_serde::parse_duration(s)
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map_err(|_| "invalid minutes")?
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or("minutes out of range")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
