use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cursor::FileCursorStore;
use crate::delivery::RetryPolicy;
use crate::error::ConfigError;
use crate::forwarder::{FanoutMode, ForwardSettings};
use crate::platform::RecipientId;

pub const DEFAULT_CONFIG_PATH: &str = "tgforward.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    /// Numeric account id; the session token must belong to it
    #[serde(default)]
    pub api_id: i64,
    #[serde(default)]
    pub api_hash: String,
    /// Pre-established session token (`<api_id>:<secret>`)
    #[serde(default)]
    pub session: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForwardConfig {
    #[serde(default)]
    pub source_chat: i64,
    /// Delivery targets, in the order they are served
    #[serde(default, deserialize_with = "deserialize_recipients")]
    pub recipients: Vec<String>,
    /// Number of most recent source messages inspected per run
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_cursor_file")]
    pub cursor_file: PathBuf,
    #[serde(default)]
    pub fanout: FanoutMode,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
}

fn default_window() -> usize {
    20
}

fn default_cursor_file() -> PathBuf {
    PathBuf::from("last_message_id.txt")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    2
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            source_chat: 0,
            recipients: Vec::new(),
            window: default_window(),
            cursor_file: default_cursor_file(),
            fanout: FanoutMode::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
        }
    }
}

/// Recipients may be written as numbers or strings in TOML.
fn deserialize_recipients<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Id(i64),
        Name(String),
    }

    let raw: Vec<Raw> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|r| match r {
            Raw::Id(id) => id.to_string(),
            Raw::Name(name) => name,
        })
        .collect())
}

/// Split a comma-separated recipient list, ignoring blanks.
pub fn parse_recipient_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{:?} is not a valid number", value),
    })
}

fn missing(key: &str) -> ConfigError {
    ConfigError::MissingRequired {
        key: key.to_string(),
    }
}

impl Config {
    /// Load from `path` (if given) or the default path, then apply environment
    /// overrides. A missing default file is fine; a missing explicit one is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Config::default()
                }
            }
        };

        config
            .apply_overrides(|key| std::env::var(key).ok())
            .context("Invalid environment override")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlay values from the environment. Unset and empty variables leave the
    /// file value alone.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("API_ID") {
            self.telegram.api_id = parse_env("API_ID", &v)?;
        }
        if let Some(v) = get("API_HASH") {
            self.telegram.api_hash = v;
        }
        if let Some(v) = get("SESSION_STRING") {
            self.telegram.session = v;
        }
        if let Some(v) = get("SOURCE_CHAT_ID") {
            self.forward.source_chat = parse_env("SOURCE_CHAT_ID", &v)?;
        }
        if let Some(v) = get("RECIPIENT_IDS") {
            self.forward.recipients = parse_recipient_list(&v);
        }
        if let Some(v) = get("CURSOR_FILE") {
            self.forward.cursor_file = PathBuf::from(v);
        }
        Ok(())
    }

    /// Credentials only; enough for the diagnostic tools.
    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        let tg = &self.telegram;
        if tg.api_id == 0 {
            return Err(missing("telegram.api_id"));
        }
        if tg.api_hash.trim().is_empty() {
            return Err(missing("telegram.api_hash"));
        }
        if tg.session.trim().is_empty() {
            return Err(missing("telegram.session"));
        }
        let owner = tg.session.split_once(':').map(|(id, _)| id);
        if owner != Some(tg.api_id.to_string().as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "telegram.session".to_string(),
                message: format!("session does not belong to api_id {}", tg.api_id),
            });
        }
        Ok(())
    }

    /// Everything a run needs must be present before one is attempted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_credentials()?;

        if self.forward.source_chat == 0 {
            return Err(missing("forward.source_chat"));
        }
        if self.forward.recipients.is_empty() {
            return Err(missing("forward.recipients"));
        }
        if self.forward.window == 0 {
            return Err(ConfigError::InvalidValue {
                key: "forward.window".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.forward.cursor_file.as_os_str().is_empty() {
            return Err(missing("forward.cursor_file"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry.max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_secs(self.retry.base_delay_secs),
        }
    }

    pub fn forward_settings(&self, dry_run: bool) -> ForwardSettings {
        ForwardSettings {
            source_chat: self.forward.source_chat,
            recipients: self
                .forward
                .recipients
                .iter()
                .map(|r| RecipientId::new(r.as_str()))
                .collect(),
            window: self.forward.window,
            retry: self.retry_policy(),
            fanout: self.forward.fanout,
            dry_run,
        }
    }

    pub fn cursor_store(&self) -> FileCursorStore {
        FileCursorStore::new(&self.forward.cursor_file)
    }
}
