//! Configuration loading for the repository synchronization service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `REPO_SYNC_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Prefix every recognized environment key carries.
pub const ENV_PREFIX: &str = "REPO_SYNC_";

/// Application configuration derived from `REPO_SYNC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,
    /// Bearer token for the GitHub API; unauthenticated calls get a much smaller rate budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    /// Repository registered at startup when present (e.g. `rust-lang/rust`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_repository: Option<String>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retry_policy: RetryPolicyConfig,
}

/// Parameters of the backfill and reconciliation loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncConfig {
    /// Delay between reconciliation ticks for one repository (default: 3600)
    ///
    /// Environment variable: `REPO_SYNC_FETCH_INTERVAL` (`1h`, `30m`, `45s` or bare seconds)
    #[serde(default = "default_fetch_interval_seconds")]
    pub fetch_interval_seconds: u64,

    /// Page size requested from the provider (default: 50, max: 100)
    #[serde(default = "default_commits_per_page")]
    pub commits_per_page: u32,

    /// Lower bound of the backfill window; defaults to ten months before the backfill starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_start_date: Option<DateTime<Utc>>,

    /// Upper bound of the backfill window; defaults to the moment the backfill starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_end_date: Option<DateTime<Utc>>,

    /// Number of fetch passes allowed to run at the same time across all repositories
    #[serde(default = "default_max_concurrent_passes")]
    pub max_concurrent_passes: usize,

    /// Resume unfinished backfills on startup instead of switching straight to reconciliation
    #[serde(default = "default_resume_incomplete_backfill")]
    pub resume_incomplete_backfill: bool,

    /// How long shutdown waits for background tasks to finish
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
}

/// Retry policy for failed provider calls inside the background loops
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RetryPolicyConfig {
    /// Base retry interval in milliseconds (default: 1000)
    ///
    /// Subsequent retries use exponential backoff: base_ms * 2^attempt.
    ///
    /// Environment variable: `REPO_SYNC_RETRY_BASE_MS`
    #[serde(default = "default_retry_base_ms")]
    #[schema(example = 1000)]
    pub base_ms: u64,

    /// Maximum retry interval in milliseconds (default: 60000). Must be >= base_ms.
    ///
    /// Environment variable: `REPO_SYNC_RETRY_MAX_MS`
    #[serde(default = "default_retry_max_ms")]
    #[schema(example = 60000)]
    pub max_ms: u64,

    /// Jitter factor (default: 0.1, range: 0.0-1.0)
    ///
    /// Environment variable: `REPO_SYNC_RETRY_JITTER_FACTOR`
    #[serde(default = "default_retry_jitter_factor")]
    #[schema(example = 0.1, minimum = 0.0, maximum = 1.0)]
    pub jitter_factor: f64,

    /// Failed attempts on the same page before the repository is marked stuck (default: 5)
    ///
    /// Environment variable: `REPO_SYNC_RETRY_MAX_ATTEMPTS`
    #[serde(default = "default_retry_max_attempts")]
    #[schema(example = 5, minimum = 1)]
    pub max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            github_api_base: default_github_api_base(),
            github_token: None,
            default_repository: None,
            sync: SyncConfig::default(),
            retry_policy: RetryPolicyConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_interval_seconds: default_fetch_interval_seconds(),
            commits_per_page: default_commits_per_page(),
            default_start_date: None,
            default_end_date: None,
            max_concurrent_passes: default_max_concurrent_passes(),
            resume_incomplete_backfill: default_resume_incomplete_backfill(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
        }
    }
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            base_ms: default_retry_base_ms(),
            max_ms: default_retry_max_ms(),
            jitter_factor: default_retry_jitter_factor(),
            max_attempts: default_retry_max_attempts(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();

        if config.github_token.is_some() {
            config.github_token = Some("[REDACTED]".to_string());
        }

        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(source) = url::Url::parse(&self.github_api_base) {
            return Err(ConfigError::InvalidGitHubApiBase {
                value: self.github_api_base.clone(),
                source,
            });
        }

        if let Some(name) = &self.default_repository {
            if !crate::sync::is_valid_repository_name(name) {
                return Err(ConfigError::InvalidDefaultRepository {
                    value: name.clone(),
                });
            }
        }

        self.sync.validate()?;
        self.retry_policy.validate()?;

        Ok(())
    }
}

impl SyncConfig {
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Validate sync loop bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_interval_seconds == 0 {
            return Err(ConfigError::InvalidFetchInterval {
                value: self.fetch_interval_seconds,
            });
        }

        if !(1..=100).contains(&self.commits_per_page) {
            return Err(ConfigError::InvalidCommitsPerPage {
                value: self.commits_per_page,
            });
        }

        if let (Some(start), Some(end)) = (self.default_start_date, self.default_end_date) {
            if start >= end {
                return Err(ConfigError::InvalidBackfillWindow { start, end });
            }
        }

        if self.max_concurrent_passes == 0 || self.max_concurrent_passes > 64 {
            return Err(ConfigError::InvalidConcurrency {
                value: self.max_concurrent_passes,
            });
        }

        Ok(())
    }
}

impl RetryPolicyConfig {
    /// Validate retry policy configuration bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_ms > self.max_ms {
            return Err(ConfigError::InvalidRetryBounds {
                base: self.base_ms,
                max: self.max_ms,
            });
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidRetryJitter {
                value: self.jitter_factor,
            });
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts {
                value: self.max_attempts,
            });
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://repo-sync.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_fetch_interval_seconds() -> u64 {
    3600 // 1 hour
}

fn default_commits_per_page() -> u32 {
    50
}

fn default_max_concurrent_passes() -> usize {
    4
}

fn default_resume_incomplete_backfill() -> bool {
    true
}

fn default_shutdown_grace_seconds() -> u64 {
    10
}

fn default_retry_base_ms() -> u64 {
    1_000
}

fn default_retry_max_ms() -> u64 {
    60_000
}

fn default_retry_jitter_factor() -> f64 {
    0.1 // 10% jitter
}

fn default_retry_max_attempts() -> u32 {
    5
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid duration for {key}: '{value}' (expected e.g. 1h, 30m, 45s or seconds)")]
    InvalidDuration { key: String, value: String },
    #[error("invalid RFC 3339 timestamp for {key}: '{value}'")]
    InvalidTimestamp { key: String, value: String },
    #[error("invalid GitHub API base URL '{value}': {source}")]
    InvalidGitHubApiBase {
        value: String,
        source: url::ParseError,
    },
    #[error("default repository must look like owner/repo, got '{value}'")]
    InvalidDefaultRepository { value: String },
    #[error("fetch interval must be at least one second, got {value}")]
    InvalidFetchInterval { value: u64 },
    #[error("commits per page must be between 1 and 100, got {value}")]
    InvalidCommitsPerPage { value: u32 },
    #[error("backfill start date {start} must be before end date {end}")]
    InvalidBackfillWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("max concurrent passes must be between 1 and 64, got {value}")]
    InvalidConcurrency { value: usize },
    #[error("retry base ({base}ms) cannot be greater than retry max ({max}ms)")]
    InvalidRetryBounds { base: u64, max: u64 },
    #[error("retry jitter factor must be between 0.0 and 1.0, got {value}")]
    InvalidRetryJitter { value: f64 },
    #[error("retry max attempts must be at least 1, got {value}")]
    InvalidRetryAttempts { value: u32 },
}

/// Parses `1h`, `30m`, `45s`, compound forms such as `1h30m`, or bare seconds.
pub fn parse_duration_secs(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for ch in value.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let amount: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match ch {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        total = total.checked_add(amount.checked_mul(unit)?)?;
    }

    // Trailing digits without a unit are ambiguous
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}

/// Loads configuration using layered `.env` files and `REPO_SYNC_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.{profile}`, `.env.{profile}.local`, then the process environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);

        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);

        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);

        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);

        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);

        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);

        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let github_api_base = layered
            .remove("GITHUB_API_BASE")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_github_api_base);

        let github_token = non_blank(layered.remove("GITHUB_TOKEN"));
        let default_repository = non_blank(layered.remove("DEFAULT_REPOSITORY"));

        let fetch_interval_seconds = match non_blank(layered.remove("FETCH_INTERVAL")) {
            Some(raw) => {
                parse_duration_secs(&raw).ok_or_else(|| ConfigError::InvalidDuration {
                    key: format!("{ENV_PREFIX}FETCH_INTERVAL"),
                    value: raw.clone(),
                })?
            }
            None => default_fetch_interval_seconds(),
        };

        let sync = SyncConfig {
            fetch_interval_seconds,
            commits_per_page: layered
                .remove("COMMITS_PER_PAGE")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_commits_per_page),
            default_start_date: parse_timestamp(&mut layered, "DEFAULT_START_DATE")?,
            default_end_date: parse_timestamp(&mut layered, "DEFAULT_END_DATE")?,
            max_concurrent_passes: layered
                .remove("MAX_CONCURRENT_PASSES")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_concurrent_passes),
            resume_incomplete_backfill: layered
                .remove("RESUME_INCOMPLETE_BACKFILL")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or_else(default_resume_incomplete_backfill),
            shutdown_grace_seconds: layered
                .remove("SHUTDOWN_GRACE_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_shutdown_grace_seconds),
        };

        let retry_policy = RetryPolicyConfig {
            base_ms: layered
                .remove("RETRY_BASE_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_base_ms),
            max_ms: layered
                .remove("RETRY_MAX_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_max_ms),
            jitter_factor: layered
                .remove("RETRY_JITTER_FACTOR")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_jitter_factor),
            max_attempts: layered
                .remove("RETRY_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_retry_max_attempts),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            github_api_base,
            github_token,
            default_repository,
            sync,
            retry_policy,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_timestamp(
    layered: &mut BTreeMap<String, String>,
    key: &str,
) -> Result<Option<DateTime<Utc>>, ConfigError> {
    match non_blank(layered.remove(key)) {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|_| ConfigError::InvalidTimestamp {
                key: format!("{ENV_PREFIX}{key}"),
                value: raw,
            }),
        None => Ok(None),
    }
}
