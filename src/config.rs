//! Provider and engine configuration
//!
//! Configuration is an explicit value handed to [`ProviderPool`](crate::ProviderPool)
//! and [`Pipeline`](crate::Pipeline) at construction. Every struct
//! deserializes from a partial document; missing fields take the defaults
//! below.

use crate::error::{NntpError, Result};
use crate::yenc::{DEFAULT_LINE_LENGTH, MAX_LINE_LENGTH, MIN_LINE_LENGTH};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One upstream NNTP server
///
/// # Example
///
/// ```
/// use nntp_courier::ProviderConfig;
///
/// let primary = ProviderConfig::tls("news.example.com", "user", "pass")
///     .with_priority(0)
///     .with_max_connections(8);
/// let backup = ProviderConfig::plain("backup.example.com").with_priority(10);
/// assert!(primary.priority < backup.priority);
/// ```
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Label used in logs and stats; defaults to the host
    #[serde(default)]
    pub name: String,

    /// Server hostname (e.g., "news.example.com")
    pub host: String,

    /// Server port (typically 119 for plain, 563 for TLS)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Use implicit TLS
    #[serde(default)]
    pub tls: bool,

    /// Accept any server certificate
    ///
    /// **Security Warning:** disables certificate validation. Only for
    /// servers you trust on a secure network.
    #[serde(default)]
    pub allow_insecure_tls: bool,

    /// Username for AUTHINFO; `None` skips authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for AUTHINFO
    #[serde(default)]
    pub password: Option<String>,

    /// Lower values are tried first
    #[serde(default)]
    pub priority: u32,

    /// Maximum concurrent connections lent from this provider
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Try to negotiate compressed multiline responses
    #[serde(default = "default_true")]
    pub compression: bool,

    /// Issue GROUP before article operations scoped to a newsgroup
    #[serde(default = "default_true")]
    pub join_group: bool,

    /// Disabled providers are ignored by the pool
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TCP connect + greeting timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-command response timeout in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_port() -> u16 {
    119
}

fn default_max_connections() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_command_timeout() -> u64 {
    60
}

impl ProviderConfig {
    /// Create a provider configuration
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        let host = host.into();
        Self {
            name: host.clone(),
            host,
            port,
            tls,
            allow_insecure_tls: false,
            username: None,
            password: None,
            priority: 0,
            max_connections: default_max_connections(),
            compression: true,
            join_group: true,
            enabled: true,
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
        }
    }

    /// TLS provider on the standard secure port (563) with credentials
    pub fn tls(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(host, 563, true).with_credentials(username, password)
    }

    /// Plain provider on the standard port (119) without credentials
    ///
    /// **Warning:** plain connections transmit credentials in clear text.
    pub fn plain(host: impl Into<String>) -> Self {
        Self::new(host, 119, false)
    }

    /// Set AUTHINFO credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the failover priority (lower first)
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the concurrent connection cap
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Display label, falling back to host:port
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("{}:{}", self.host, self.port)
        } else {
            self.name.clone()
        }
    }

    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Command timeout as a `Duration`
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Check the fields the pool depends on
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(NntpError::Config("provider host is empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(NntpError::Config(format!(
                "provider {} has max_connections = 0",
                self.label()
            )));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(NntpError::Config(format!(
                "provider {} needs both username and password",
                self.label()
            )));
        }
        Ok(())
    }
}

/// Failover cooldown tuning
///
/// After `failure_threshold` consecutive connect/auth failures a provider
/// is skipped for `min(base * 2^(trips - 1), max)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Consecutive failures before a provider cools down
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// First cooldown window in milliseconds
    #[serde(default = "default_cooldown_base_ms")]
    pub base_ms: u64,
    /// Upper bound on a cooldown window in milliseconds
    #[serde(default = "default_cooldown_max_ms")]
    pub max_ms: u64,
    /// Randomize windows by up to 25%
    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_cooldown_base_ms() -> u64 {
    5_000
}

fn default_cooldown_max_ms() -> u64 {
    300_000
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            base_ms: default_cooldown_base_ms(),
            max_ms: default_cooldown_max_ms(),
            jitter: true,
        }
    }
}

impl CooldownConfig {
    /// Cooldown window for the given trip count (1-based)
    pub fn window(&self, trips: u32) -> Duration {
        let exp = trips.saturating_sub(1).min(32);
        let ms = self
            .base_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_ms);
        let ms = if self.jitter && ms > 0 {
            use rand::Rng;
            let spread = ms / 4;
            ms - spread + rand::thread_rng().gen_range(0..=spread)
        } else {
            ms
        };
        Duration::from_millis(ms)
    }
}

/// Provider pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Longest `acquire` waits for capacity, in milliseconds
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Idle connections are closed after this many seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Failover cooldown
    #[serde(default)]
    pub cooldown: CooldownConfig,
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

fn default_idle_timeout() -> u64 {
    300
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: default_acquire_timeout_ms(),
            idle_timeout_secs: default_idle_timeout(),
            cooldown: CooldownConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Acquire timeout as a `Duration`
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Idle timeout as a `Duration`
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Raw bytes per segment
    #[serde(default = "default_part_size")]
    pub part_size: u64,
    /// yEnc output line width
    #[serde(default = "default_line_length")]
    pub line_length: usize,
    /// Worker count; defaults to the sum of provider caps
    #[serde(default)]
    pub workers: Option<usize>,
    /// Rows fetched from the ledger per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Attempts per segment within one upload pass
    ///
    /// The default of 1 leaves a segment that hit a transient failure
    /// `encoded` until the next pass. Larger values retry it in the same
    /// pass, each attempt on a provider it has not failed on yet; this
    /// departs from strict pass-at-a-time scheduling and is opt-in.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// From header for posted articles
    #[serde(default = "default_poster")]
    pub poster: String,
    /// Subject template; `{name}`, `{part}` and `{total}` are substituted
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Right-hand side of generated message-ids
    #[serde(default = "default_message_id_domain")]
    pub message_id_domain: String,
    /// Directory receiving per-job staged article bodies
    #[serde(default = "default_stage_root")]
    pub stage_root: PathBuf,
    /// Directory for manifests; defaults to the source's parent directory
    #[serde(default)]
    pub manifest_dir: Option<PathBuf>,
    /// Extra `<meta>` entries written to manifests (e.g. category)
    #[serde(default)]
    pub manifest_meta: Vec<(String, String)>,
}

fn default_part_size() -> u64 {
    750_000
}

fn default_line_length() -> usize {
    DEFAULT_LINE_LENGTH
}

fn default_batch_size() -> u32 {
    256
}

fn default_max_attempts() -> u32 {
    1
}

fn default_poster() -> String {
    "nntp-courier <nntp-courier@localhost>".to_string()
}

fn default_subject() -> String {
    "\"{name}\" yEnc ({part}/{total})".to_string()
}

fn default_message_id_domain() -> String {
    "nntp-courier.local".to_string()
}

fn default_stage_root() -> PathBuf {
    std::env::temp_dir().join("nntp-courier")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            line_length: default_line_length(),
            workers: None,
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            poster: default_poster(),
            subject: default_subject(),
            message_id_domain: default_message_id_domain(),
            stage_root: default_stage_root(),
            manifest_dir: None,
            manifest_meta: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Check segment sizing and batching values
    pub fn validate(&self) -> Result<()> {
        if self.part_size == 0 {
            return Err(NntpError::Config("part_size must be > 0".to_string()));
        }
        if !(MIN_LINE_LENGTH..=MAX_LINE_LENGTH).contains(&self.line_length) {
            return Err(NntpError::Config(format!(
                "line_length must be within {MIN_LINE_LENGTH}..={MAX_LINE_LENGTH}, got {}",
                self.line_length
            )));
        }
        if self.batch_size == 0 || self.max_attempts == 0 {
            return Err(NntpError::Config(
                "batch_size and max_attempts must be > 0".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(NntpError::Config("workers must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Everything the engine needs, bundled for the process entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Providers in any order; the pool sorts by priority
    pub providers: Vec<ProviderConfig>,
    /// Pool settings
    #[serde(default)]
    pub pool: PoolConfig,
    /// Pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// SQLite ledger location
    pub ledger_path: PathBuf,
}

impl EngineConfig {
    /// Validate providers and pipeline settings
    pub fn validate(&self) -> Result<()> {
        if !self.providers.iter().any(|p| p.enabled) {
            return Err(NntpError::Config("no enabled providers".to_string()));
        }
        for provider in &self.providers {
            provider.validate()?;
        }
        self.pipeline.validate()
    }
}
