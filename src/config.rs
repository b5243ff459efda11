//! Configuration loading and management.
//!
//! One TOML file, one [`Config`] record. Values are read-only after process
//! start; tests construct the server with an explicit record instead of a
//! file.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server identity and logging.
    #[serde(default)]
    pub server: ServerSection,
    /// Network listeners.
    #[serde(default)]
    pub listen: ListenSection,
    /// Protocol limits advertised in SERVER_CONFIG.
    #[serde(default)]
    pub limits: LimitsSection,
    /// Timeouts.
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    /// Message retention.
    #[serde(default)]
    pub retention: RetentionSection,
    /// Federated directory behavior.
    #[serde(default)]
    pub directory: DirectorySection,
    /// Nicknames granted the admin flag on authentication.
    #[serde(default)]
    pub admin_users: Vec<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "defaults::server_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus HTTP port. 0 disables the endpoint (used by tests).
    #[serde(default = "defaults::metrics_port")]
    pub metrics_port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: defaults::server_name(),
            description: String::new(),
            log_format: LogFormat::Pretty,
            metrics_port: defaults::metrics_port(),
        }
    }
}

/// `[listen]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenSection {
    /// Primary TCP listener.
    #[serde(default = "defaults::tcp_addr")]
    pub tcp: SocketAddr,
    /// Optional WebSocket listener.
    #[serde(default)]
    pub websocket: Option<SocketAddr>,
    /// Optional SSH listener.
    #[serde(default)]
    pub ssh: Option<SocketAddr>,
    /// Path to the SSH host key; generated ephemerally when absent.
    #[serde(default)]
    pub ssh_host_key: Option<String>,
}

impl Default for ListenSection {
    fn default() -> Self {
        Self {
            tcp: defaults::tcp_addr(),
            websocket: None,
            ssh: None,
            ssh_host_key: None,
        }
    }
}

/// `[limits]` section. These surface verbatim in SERVER_CONFIG.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LimitsSection {
    /// Messages per minute per user-or-session.
    #[serde(default = "defaults::max_message_rate")]
    pub max_message_rate: u16,
    /// Channel creations per hour per user-or-session.
    #[serde(default = "defaults::max_channel_creates")]
    pub max_channel_creates: u16,
    /// Maximum message content length in bytes.
    #[serde(default = "defaults::max_message_length")]
    pub max_message_length: u32,
    /// Thread subscriptions per session.
    #[serde(default = "defaults::max_thread_subs")]
    pub max_thread_subs: u16,
    /// Channel subscriptions per session.
    #[serde(default = "defaults::max_channel_subs")]
    pub max_channel_subs: u16,
    /// Concurrent connections per source IP.
    #[serde(default = "defaults::max_connections_per_ip")]
    pub max_connections_per_ip: u8,
    /// Days of inactivity before anonymous-user cleanup.
    #[serde(default = "defaults::inactive_cleanup_days")]
    pub inactive_cleanup_days: u16,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_message_rate: defaults::max_message_rate(),
            max_channel_creates: defaults::max_channel_creates(),
            max_message_length: defaults::max_message_length(),
            max_thread_subs: defaults::max_thread_subs(),
            max_channel_subs: defaults::max_channel_subs(),
            max_connections_per_ip: defaults::max_connections_per_ip(),
            inactive_cleanup_days: defaults::inactive_cleanup_days(),
        }
    }
}

/// `[timeouts]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeoutsSection {
    /// Seconds without a PING before the session is closed.
    #[serde(default = "defaults::idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Grace window for flushing writers on shutdown.
    #[serde(default = "defaults::shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: defaults::idle_timeout_secs(),
            shutdown_grace_secs: defaults::shutdown_grace_secs(),
        }
    }
}

/// `[retention]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetentionSection {
    /// Default retention for new channels, hours. 0 = keep forever.
    #[serde(default = "defaults::retention_hours")]
    pub default_hours: u32,
    /// Sweeper period, seconds.
    #[serde(default = "defaults::sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Maximum messages purged per sweep batch.
    #[serde(default = "defaults::sweep_batch")]
    pub sweep_batch: usize,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            default_hours: defaults::retention_hours(),
            sweep_interval_secs: defaults::sweep_interval_secs(),
            sweep_batch: defaults::sweep_batch(),
        }
    }
}

/// `[directory]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DirectorySection {
    /// Directory-enabled vs chat-only. Chat-only ignores REGISTER_SERVER
    /// and serves an empty SERVER_LIST.
    #[serde(default)]
    pub enabled: bool,
    /// Hostname to announce to other directories.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Port to announce; defaults to the TCP listener's port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Whether to appear in public listings when announcing.
    #[serde(default = "defaults::yes")]
    pub is_public: bool,
    /// Advertised capacity when announcing.
    #[serde(default = "defaults::max_users")]
    pub max_users: u32,
    /// Directories to announce ourselves to at startup (`host:port`).
    #[serde(default)]
    pub announce: Vec<String>,
    /// Whether the gossip loop also announces to discovered directories.
    #[serde(default = "defaults::yes")]
    pub gossip_announce: bool,
}

mod defaults {
    use std::net::SocketAddr;

    pub fn server_name() -> String {
        "SuperChat".to_string()
    }
    pub fn metrics_port() -> u16 {
        9090
    }
    pub fn tcp_addr() -> SocketAddr {
        "0.0.0.0:6465".parse().expect("static address")
    }
    pub fn max_message_rate() -> u16 {
        10
    }
    pub fn max_channel_creates() -> u16 {
        5
    }
    pub fn max_message_length() -> u32 {
        4096
    }
    pub fn max_thread_subs() -> u16 {
        50
    }
    pub fn max_channel_subs() -> u16 {
        20
    }
    pub fn max_connections_per_ip() -> u8 {
        10
    }
    pub fn inactive_cleanup_days() -> u16 {
        90
    }
    pub fn idle_timeout_secs() -> u64 {
        60
    }
    pub fn shutdown_grace_secs() -> u64 {
        5
    }
    pub fn retention_hours() -> u32 {
        168
    }
    pub fn sweep_interval_secs() -> u64 {
        3600
    }
    pub fn sweep_batch() -> usize {
        500
    }
    pub fn yes() -> bool {
        true
    }
    pub fn max_users() -> u32 {
        500
    }
}

impl Config {
    /// Load and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Validate cross-field constraints. Returns every violation found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.limits.max_message_length == 0 {
            errors.push("limits.max_message_length must be positive".to_string());
        }
        if self.limits.max_message_length as usize > superchat_proto::MAX_FRAME_SIZE {
            errors.push(format!(
                "limits.max_message_length {} exceeds the frame cap {}",
                self.limits.max_message_length,
                superchat_proto::MAX_FRAME_SIZE
            ));
        }
        if self.limits.max_message_rate == 0 {
            errors.push("limits.max_message_rate must be positive".to_string());
        }
        if self.timeouts.idle_timeout_secs == 0 {
            errors.push("timeouts.idle_timeout_secs must be positive".to_string());
        }
        if self.retention.sweep_batch == 0 {
            errors.push("retention.sweep_batch must be positive".to_string());
        }
        if self.directory.enabled && self.directory.hostname.is_none() && !self.directory.announce.is_empty()
        {
            errors.push(
                "directory.hostname is required when announcing to other directories".to_string(),
            );
        }
        for addr in &self.directory.announce {
            if addr.rsplit_once(':').and_then(|(_, p)| p.parse::<u16>().ok()).is_none() {
                errors.push(format!("directory.announce entry '{addr}' is not host:port"));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeouts.idle_timeout_secs, 60);
        assert_eq!(config.limits.max_message_length, 4096);
    }

    #[test]
    fn parses_minimal_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            name = "test"

            [limits]
            max_message_rate = 1000

            [directory]
            enabled = true
            hostname = "chat.example.org"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.name, "test");
        assert_eq!(config.limits.max_message_rate, 1000);
        assert!(config.directory.enabled);
        // Untouched sections keep their defaults.
        assert_eq!(config.limits.max_thread_subs, 50);
    }

    #[test]
    fn bad_announce_entry_rejected() {
        let mut config = Config::default();
        config.directory.announce = vec!["no-port".into()];
        config.directory.hostname = Some("h".into());
        assert!(config.validate().is_err());
    }
}
