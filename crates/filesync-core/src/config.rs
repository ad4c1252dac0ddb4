//! Configuration module for filesync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::RetryPolicy;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for filesync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Worker pool and transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Number of concurrent sync workers.
    pub workers: usize,
    /// Upper bound (ms) on how long an idle worker sleeps before re-checking
    /// the queue for expired backoffs.
    pub poll_interval_ms: u64,
    /// Timeout (s) applied to every individual remote call.
    pub call_timeout_secs: u64,
    /// Maximum encoded size of one `push_blocks` batch, in bytes.
    pub push_batch_bytes: usize,
    /// Maximum number of addresses per existence check.
    pub exists_batch_size: usize,
}

/// Retry / backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Failed attempts after which a task is dead-lettered.
    pub max_attempts: u32,
    /// Delay (ms) after the first failure; doubles on each further failure.
    pub base_delay_ms: u64,
    /// Cap (ms) for any single backoff delay.
    pub max_delay_ms: u64,
    /// Keep persisted backoff deadlines across a restart instead of
    /// retrying immediately.
    pub honor_backoff_on_restart: bool,
}

/// Local persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding the task queue and the local block store.
    pub database: PathBuf,
}

/// Remote file service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the file service API.
    pub base_url: String,
    /// Bearer token sent with every request, if the service requires one.
    pub api_token: Option<String>,
    /// HTTP-level request timeout (s).
    pub request_timeout_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/filesync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("filesync")
            .join("config.yaml")
    }

    /// Backoff policy derived from the `retry` section.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval_ms: 1000,
            call_timeout_secs: 60,
            push_batch_bytes: 1024 * 1024,
            exists_batch_size: 500,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            honor_backoff_on_restart: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("filesync")
                .join("filesync.db"),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/v1".to_string(),
            api_token: None,
            request_timeout_secs: 30,
        }
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

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.workers"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for `sync.workers`; bandwidth, not CPU, is the bottleneck.
const MAX_WORKERS: usize = 64;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, ok: bool| {
            if !ok {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        // --- sync ---
        positive("sync.poll_interval_ms", self.sync.poll_interval_ms > 0);
        positive("sync.call_timeout_secs", self.sync.call_timeout_secs > 0);
        positive("sync.push_batch_bytes", self.sync.push_batch_bytes > 0);
        positive("sync.exists_batch_size", self.sync.exists_batch_size > 0);

        // --- retry ---
        positive("retry.max_attempts", self.retry.max_attempts > 0);
        positive("retry.base_delay_ms", self.retry.base_delay_ms > 0);

        // --- remote ---
        positive(
            "remote.request_timeout_secs",
            self.remote.request_timeout_secs > 0,
        );

        if self.sync.workers == 0 || self.sync.workers > MAX_WORKERS {
            errors.push(ValidationError {
                field: "sync.workers".into(),
                message: format!("must be in range 1..={MAX_WORKERS}"),
            });
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            errors.push(ValidationError {
                field: "retry.max_delay_ms".into(),
                message: format!(
                    "max_delay_ms ({}) must not be below base_delay_ms ({})",
                    self.retry.max_delay_ms, self.retry.base_delay_ms
                ),
            });
        }

        if !(self.remote.base_url.starts_with("http://")
            || self.remote.base_url.starts_with("https://"))
        {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("not an http(s) URL: '{}'", self.remote.base_url),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use filesync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .sync_workers(4)
///     .retry_max_attempts(8)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_workers(mut self, n: usize) -> Self {
        self.config.sync.workers = n;
        self
    }

    pub fn sync_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.sync.poll_interval_ms = ms;
        self
    }

    pub fn sync_call_timeout_secs(mut self, secs: u64) -> Self {
        self.config.sync.call_timeout_secs = secs;
        self
    }

    pub fn sync_push_batch_bytes(mut self, bytes: usize) -> Self {
        self.config.sync.push_batch_bytes = bytes;
        self
    }

    pub fn sync_exists_batch_size(mut self, n: usize) -> Self {
        self.config.sync.exists_batch_size = n;
        self
    }

    // --- retry ---

    pub fn retry_max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self
    }

    pub fn retry_max_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.max_delay_ms = ms;
        self
    }

    pub fn retry_honor_backoff_on_restart(mut self, honor: bool) -> Self {
        self.config.retry.honor_backoff_on_restart = honor;
        self
    }

    // --- storage / remote ---

    pub fn storage_database(mut self, path: PathBuf) -> Self {
        self.config.storage.database = path;
        self
    }

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_api_token(mut self, token: impl Into<String>) -> Self {
        self.config.remote.api_token = Some(token.into());
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
