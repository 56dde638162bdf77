//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::{AppError, Result};

/// Session pool sizing and startup behavior.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Number of sessions to start.
    #[serde(default = "default_session_count")]
    pub count: usize,
    /// Pause between consecutive session startups.
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
    /// Upper bound on how long a session may take to become ready.
    #[serde(default = "default_ready_timeout_seconds")]
    pub ready_timeout_seconds: u64,
    /// Maximum in-flight checks per session.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            count: default_session_count(),
            stagger_ms: default_stagger_ms(),
            ready_timeout_seconds: default_ready_timeout_seconds(),
            concurrency: default_concurrency(),
        }
    }
}

impl SessionConfig {
    /// Stagger delay as a [`Duration`].
    #[must_use]
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    /// Ready timeout as a [`Duration`].
    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_seconds)
    }
}

/// Per-session throughput ceiling.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Maximum checks one session may start inside a window.
    #[serde(default = "default_max_per_window")]
    pub max_per_window: u32,
    /// Length of the rolling window.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_window: default_max_per_window(),
            window_seconds: default_window_seconds(),
        }
    }
}

impl RateLimitConfig {
    /// Window length as a [`Duration`].
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Jittered pacing between checks and periodic rest breaks.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct DelayConfig {
    /// Nominal pause between two checks on the same session.
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,
    /// Lower jitter multiplier applied to `base_ms`.
    #[serde(default = "default_jitter_min")]
    pub jitter_min: f64,
    /// Upper jitter multiplier applied to `base_ms`.
    #[serde(default = "default_jitter_max")]
    pub jitter_max: f64,
    /// Completed checks between short rest breaks.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Short rest break length.
    #[serde(default = "default_break_ms")]
    pub break_ms: u64,
    /// Random extra added to each rest break, drawn from `0..=break_jitter_ms`.
    #[serde(default = "default_break_jitter_ms")]
    pub break_jitter_ms: u64,
    /// Completed checks between extended rest breaks; a multiple of `batch_size`.
    #[serde(default = "default_extended_batch_size")]
    pub extended_batch_size: u64,
    /// Extended rest break length.
    #[serde(default = "default_extended_break_ms")]
    pub extended_break_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            jitter_min: default_jitter_min(),
            jitter_max: default_jitter_max(),
            batch_size: default_batch_size(),
            break_ms: default_break_ms(),
            break_jitter_ms: default_break_jitter_ms(),
            extended_batch_size: default_extended_batch_size(),
            extended_break_ms: default_extended_break_ms(),
        }
    }
}

/// Retry budget and fatal-error signatures.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Extra attempts allowed for a transient transport failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff step; attempt `n` waits `n * backoff_ms`.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Case-insensitive regexes identifying a banned or blocked account.
    #[serde(default = "default_ban_patterns")]
    pub ban_patterns: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            ban_patterns: default_ban_patterns(),
        }
    }
}

impl RetryConfig {
    /// Backoff step as a [`Duration`].
    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Checkpoint cadence.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CheckpointConfig {
    /// Completed items between checkpoint saves and result flushes.
    #[serde(default = "default_checkpoint_every")]
    pub every: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            every: default_checkpoint_every(),
        }
    }
}

/// Where validation results are written.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Append-only JSON lines file at `results_path`.
    #[default]
    Jsonl,
    /// `validation_result` table in the progress database.
    Sqlite,
}

/// Output locations.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct OutputConfig {
    /// `SQLite` database holding checkpoints (and results for the sqlite sink).
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Result sink selection.
    #[serde(default)]
    pub sink: SinkKind,
    /// JSONL results file for the jsonl sink.
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            sink: SinkKind::default(),
            results_path: default_results_path(),
        }
    }
}

/// Session bridge connectivity for the HTTP transport.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TransportConfig {
    /// Base URL of the session bridge.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-request timeout.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Interval between readiness probes while a session authenticates.
    #[serde(default = "default_ready_poll_ms")]
    pub ready_poll_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_seconds: default_request_timeout_seconds(),
            ready_poll_ms: default_ready_poll_ms(),
        }
    }
}

impl TransportConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Readiness poll interval as a [`Duration`].
    #[must_use]
    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }
}

fn default_session_count() -> usize {
    1
}

fn default_stagger_ms() -> u64 {
    5_000
}

fn default_ready_timeout_seconds() -> u64 {
    120
}

fn default_concurrency() -> usize {
    1
}

fn default_max_per_window() -> u32 {
    300
}

fn default_window_seconds() -> u64 {
    3_600
}

fn default_base_ms() -> u64 {
    4_000
}

fn default_jitter_min() -> f64 {
    0.8
}

fn default_jitter_max() -> f64 {
    1.2
}

fn default_batch_size() -> u64 {
    50
}

fn default_break_ms() -> u64 {
    60_000
}

fn default_break_jitter_ms() -> u64 {
    2_000
}

fn default_extended_batch_size() -> u64 {
    500
}

fn default_extended_break_ms() -> u64 {
    300_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    1_000
}

fn default_ban_patterns() -> Vec<String> {
    vec![
        r"\bbann?ed\b".into(),
        r"\bblocked\b".into(),
        r"account\s+(is\s+)?(suspended|disabled|restricted)".into(),
        r"\bspam\b".into(),
    ]
}

fn default_checkpoint_every() -> usize {
    10
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".regcheck/progress.db")
}

fn default_results_path() -> PathBuf {
    PathBuf::from(".regcheck/results.jsonl")
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8085".into()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_ready_poll_ms() -> u64 {
    1_000
}

fn default_country_prefix() -> String {
    "962".into()
}

fn default_true() -> bool {
    true
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Country calling code every number is normalized into.
    #[serde(default = "default_country_prefix")]
    pub country_prefix: String,
    /// When `false`, registered numbers also fetch profile metadata.
    #[serde(default = "default_true")]
    pub safe_mode: bool,
    /// Stable key for checkpoints and results; defaults to the input path.
    #[serde(default)]
    pub run_name: Option<String>,
    /// Session pool settings.
    #[serde(default)]
    pub sessions: SessionConfig,
    /// Per-session window ceiling.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Inter-check pacing.
    #[serde(default)]
    pub delay: DelayConfig,
    /// Retry budget and ban detection.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Checkpoint cadence.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Output locations.
    #[serde(default)]
    pub output: OutputConfig,
    /// HTTP transport settings.
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            country_prefix: default_country_prefix(),
            safe_mode: true,
            run_name: None,
            sessions: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            delay: DelayConfig::default(),
            retry: RetryConfig::default(),
            checkpoint: CheckpointConfig::default(),
            output: OutputConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot operate with.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.country_prefix.is_empty()
            || !self.country_prefix.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AppError::Config(
                "country_prefix must be a non-empty digit string".into(),
            ));
        }
        if self.sessions.count == 0 {
            return Err(AppError::Config("sessions.count must be at least 1".into()));
        }
        if self.sessions.concurrency == 0 {
            return Err(AppError::Config(
                "sessions.concurrency must be at least 1".into(),
            ));
        }
        if self.rate_limit.max_per_window == 0 || self.rate_limit.window_seconds == 0 {
            return Err(AppError::Config(
                "rate_limit.max_per_window and rate_limit.window_seconds must be positive".into(),
            ));
        }
        let delay = &self.delay;
        if !(delay.jitter_min.is_finite() && delay.jitter_max.is_finite()) {
            return Err(AppError::Config(
                "delay.jitter_min and delay.jitter_max must be finite".into(),
            ));
        }
        if !(delay.jitter_min > 0.0 && delay.jitter_min <= delay.jitter_max) {
            return Err(AppError::Config(
                "delay.jitter_min must be positive and not exceed delay.jitter_max".into(),
            ));
        }
        if delay.batch_size == 0 || delay.extended_batch_size == 0 {
            return Err(AppError::Config(
                "delay.batch_size and delay.extended_batch_size must be positive".into(),
            ));
        }
        if delay.extended_batch_size % delay.batch_size != 0
            || delay.extended_batch_size <= delay.batch_size
        {
            return Err(AppError::Config(
                "delay.extended_batch_size must be a larger multiple of delay.batch_size".into(),
            ));
        }
        if self.checkpoint.every == 0 {
            return Err(AppError::Config("checkpoint.every must be at least 1".into()));
        }
        for pattern in &self.retry.ban_patterns {
            Regex::new(pattern).map_err(|err| {
                AppError::Config(format!("invalid ban pattern '{pattern}': {err}"))
            })?;
        }
        Ok(())
    }

    /// Resolve the run key, falling back to the input path.
    #[must_use]
    pub fn run_key(&self, input: &Path) -> String {
        self.run_name
            .clone()
            .unwrap_or_else(|| input.to_string_lossy().into_owned())
    }
}
