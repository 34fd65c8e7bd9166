use crate::error::{MailError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variables with this prefix override file settings,
/// e.g. `MAILBOX__RETENTION__MAX_MESSAGES=100`.
const ENV_PREFIX: &str = "MAILBOX";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub retention: RetentionConfig,
    pub tagging: TaggingConfig,
    pub webhook: WebhookConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file. `None` allocates an ephemeral file that is removed on shutdown.
    pub data_file: Option<PathBuf>,
    /// Use the message's own Date header as its creation time
    pub use_message_dates: bool,
    /// zstd level used for raw payloads
    pub compression_level: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: None,
            use_message_dates: false,
            compression_level: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Keep at most this many messages (0 = unlimited)
    pub max_messages: usize,
    /// Delete messages older than this many hours
    pub max_age_hours: Option<u64>,
    /// How often the retention loop wakes up
    pub interval_secs: u64,
    /// Inactivity period after which deferred maintenance runs
    pub idle_after_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_messages: 500,
            max_age_hours: None,
            interval_secs: 60,
            idle_after_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TaggingConfig {
    pub rules: Vec<TagRule>,
}

/// Applies `tags` to every message whose raw content matches `pattern`
/// (case-insensitive regular expression; `^` and `$` match at line
/// boundaries, so a rule can anchor on a header line).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TagRule {
    pub pattern: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then apply
    /// `MAILBOX__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| MailError::Config(e.to_string()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MailError::Config(e.to_string()))
    }

    /// Configuration for an ephemeral store with retention disabled.
    pub fn ephemeral() -> Self {
        let mut config = Config::default();
        config.retention.max_messages = 0;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.storage.data_file.is_none());
        assert_eq!(config.storage.compression_level, 3);
        assert_eq!(config.retention.max_messages, 500);
        assert_eq!(config.retention.interval_secs, 60);
        assert!(config.tagging.rules.is_empty());
        assert!(config.webhook.url.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            data_file = "/var/lib/mailbox/mail.db"
            use_message_dates = true

            [retention]
            max_age_hours = 48

            [[tagging.rules]]
            pattern = "invoice"
            tags = ["Billing"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.storage.data_file,
            Some(PathBuf::from("/var/lib/mailbox/mail.db"))
        );
        assert!(config.storage.use_message_dates);
        assert_eq!(config.storage.compression_level, 3);
        assert_eq!(config.retention.max_age_hours, Some(48));
        assert_eq!(config.retention.max_messages, 500);
        assert_eq!(config.tagging.rules.len(), 1);
        assert_eq!(config.tagging.rules[0].tags, vec!["Billing".to_string()]);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml_str("[storage\nbroken");
        assert!(matches!(result, Err(MailError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailbox.toml");
        std::fs::write(&path, "[retention]\nmax_messages = 25\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.retention.max_messages, 25);
        assert_eq!(config.retention.idle_after_secs, 300);
    }

    #[test]
    fn test_ephemeral_disables_retention() {
        let config = Config::ephemeral();
        assert_eq!(config.retention.max_messages, 0);
        assert!(config.storage.data_file.is_none());
    }
}
