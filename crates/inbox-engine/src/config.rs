use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{InboxError, Result};

/// Inbox engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxConfig {
    /// General service settings
    pub general: GeneralConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Assignment engine configuration
    pub assignment: AssignmentSettings,

    /// Queue statistics configuration
    pub stats: StatsConfig,

    /// Mass re-engagement configuration
    pub reengagement: ReengagementConfig,

    /// Bulk transfer policy
    pub transfer: TransferConfig,

    /// Team registry cache configuration
    pub registry: RegistryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// General service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Service name used in logs
    pub service_name: String,

    /// HTTP bind address
    pub bind_address: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL (`sqlite://inbox.db?mode=rwc`, `sqlite::memory:`)
    pub url: String,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// How long a writer waits on a locked database (milliseconds)
    pub busy_timeout_ms: u64,
}

/// Assignment engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentSettings {
    /// Run the periodic assignment loop
    pub periodic_enabled: bool,

    /// Interval between periodic assignment passes (milliseconds)
    pub interval_ms: u64,

    /// Upper bound on sessions examined per team per pass
    pub max_sessions_per_pass: usize,
}

/// Queue statistics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Default lookback window for wait/resolution statistics (hours)
    pub lookback_hours: u32,
}

/// Mass re-engagement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReengagementConfig {
    /// Template sent when the caller does not name one
    pub default_template_id: String,

    /// Inactivity after which a session counts as expired, per channel (hours)
    pub channel_thresholds_hours: HashMap<String, u32>,

    /// Threshold for channels without an explicit entry (hours)
    pub fallback_threshold_hours: u32,
}

/// Bulk transfer policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Organisation policy: every transfer must carry a reason
    pub require_reason: bool,
}

/// Team registry cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Time-to-live for cached team configuration and membership (seconds, 0 disables)
    pub cache_ttl_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,

    /// Emit JSON formatted logs
    pub json: bool,
}

impl InboxConfig {
    /// Load configuration: built-in defaults, then an optional TOML file,
    /// then `INBOX__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&InboxConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: InboxConfig = builder
            .add_source(
                config::Environment::with_prefix("INBOX")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(InboxError::configuration("database.url cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(InboxError::configuration("database.max_connections must be greater than 0"));
        }

        if self.assignment.interval_ms == 0 {
            return Err(InboxError::configuration("assignment.interval_ms must be greater than 0"));
        }

        if self.assignment.max_sessions_per_pass == 0 {
            return Err(InboxError::configuration("assignment.max_sessions_per_pass must be greater than 0"));
        }

        if self.stats.lookback_hours == 0 {
            return Err(InboxError::configuration("stats.lookback_hours must be greater than 0"));
        }

        if self.reengagement.default_template_id.trim().is_empty() {
            return Err(InboxError::configuration("reengagement.default_template_id cannot be empty"));
        }

        if self.reengagement.fallback_threshold_hours == 0 {
            return Err(InboxError::configuration("reengagement.fallback_threshold_hours must be greater than 0"));
        }

        if let Some((channel, _)) = self.reengagement.channel_thresholds_hours.iter().find(|(_, h)| **h == 0) {
            return Err(InboxError::configuration(format!(
                "reengagement threshold for channel '{}' must be greater than 0",
                channel
            )));
        }

        Ok(())
    }
}

impl ReengagementConfig {
    /// Inactivity threshold for a channel
    pub fn threshold_for(&self, channel: &str) -> chrono::Duration {
        let hours = self
            .channel_thresholds_hours
            .get(channel)
            .copied()
            .unwrap_or(self.fallback_threshold_hours);
        chrono::Duration::hours(i64::from(hours))
    }
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            database: DatabaseConfig::default(),
            assignment: AssignmentSettings::default(),
            stats: StatsConfig::default(),
            reengagement: ReengagementConfig::default(),
            transfer: TransferConfig::default(),
            registry: RegistryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            service_name: "inbox-engine".to_string(),
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://inbox.db?mode=rwc".to_string(),
            max_connections: 10,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self {
            periodic_enabled: true,
            interval_ms: 2000,
            max_sessions_per_pass: 500,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { lookback_hours: 24 }
    }
}

impl Default for ReengagementConfig {
    fn default() -> Self {
        // WhatsApp only allows free-form replies inside its 24h customer care window
        let mut channel_thresholds_hours = HashMap::new();
        channel_thresholds_hours.insert("whatsapp".to_string(), 24);

        Self {
            default_template_id: "reengagement_default".to_string(),
            channel_thresholds_hours,
            fallback_threshold_hours: 24,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { require_reason: false }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: 5 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
