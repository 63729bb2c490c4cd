//! Configuration for quorumkv components

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::Result;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "quorumkv.toml";

/// Environment variable prefix, e.g. `QUORUMKV__COORDINATOR__BIND_ADDR`
pub const ENV_PREFIX: &str = "QUORUMKV";

pub const PRIMARY_PORT: u16 = 12345;
pub const BACKUP_PORT: u16 = 12346;

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub slave: SlaveConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from the optional config file, then `QUORUMKV__*` environment variables.
    ///
    /// A missing file is not an error; command-line flags are applied on top by the binaries.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let mut loaded: Config = settings.try_deserialize()?;
        if loaded.log_level.is_empty() {
            loaded.log_level = default_log_level();
        }
        loaded.coordinator.validate()?;
        loaded.slave.validate()?;
        Ok(loaded)
    }
}

/// Which coordinator variant this process runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorRole {
    #[default]
    Primary,
    Backup,
}

impl CoordinatorRole {
    pub fn default_port(&self) -> u16 {
        match self {
            CoordinatorRole::Primary => PRIMARY_PORT,
            CoordinatorRole::Backup => BACKUP_PORT,
        }
    }

    pub fn is_backup(&self) -> bool {
        matches!(self, CoordinatorRole::Backup)
    }
}

impl std::fmt::Display for CoordinatorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorRole::Primary => write!(f, "primary"),
            CoordinatorRole::Backup => write!(f, "backup"),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// TCP listener for clients, slaves and peer coordinators
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    #[serde(default)]
    pub role: CoordinatorRole,

    /// Append-only operation log (backup only), relative to the working directory
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Deadline for one request/response exchange with a slave
    #[serde(default = "default_slave_timeout")]
    pub slave_timeout_ms: u64,

    /// Deadline for the handshake and for writing a response to a client
    #[serde(default = "default_client_timeout")]
    pub client_timeout_ms: u64,

    /// How long a client session may sit idle between commands
    #[serde(default = "default_client_idle_timeout")]
    pub client_idle_timeout_secs: u64,

    /// Log watcher polling interval
    #[serde(default = "default_watch_interval")]
    pub watch_interval_ms: u64,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], PRIMARY_PORT))
}
fn default_log_path() -> PathBuf {
    PathBuf::from("kv_store.log")
}
fn default_slave_timeout() -> u64 {
    3_000
}
fn default_client_timeout() -> u64 {
    10_000
}
fn default_client_idle_timeout() -> u64 {
    300
}
fn default_watch_interval() -> u64 {
    1_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            role: CoordinatorRole::default(),
            log_path: default_log_path(),
            slave_timeout_ms: default_slave_timeout(),
            client_timeout_ms: default_client_timeout(),
            client_idle_timeout_secs: default_client_idle_timeout(),
            watch_interval_ms: default_watch_interval(),
        }
    }
}

impl CoordinatorConfig {
    /// Defaults for the given role, listening on that role's default port
    pub fn for_role(role: CoordinatorRole) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], role.default_port())),
            role,
            ..Default::default()
        }
    }

    pub fn slave_timeout(&self) -> Duration {
        Duration::from_millis(self.slave_timeout_ms)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    pub fn client_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.client_idle_timeout_secs)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.slave_timeout_ms == 0 || self.client_timeout_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "timeouts must be greater than zero".into(),
            ));
        }
        if self.watch_interval_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "watch_interval_ms must be greater than zero".into(),
            ));
        }
        if self.role.is_backup() && self.log_path.as_os_str().is_empty() {
            return Err(crate::Error::InvalidConfig(
                "backup coordinator needs a log_path".into(),
            ));
        }
        Ok(())
    }
}

/// Storage slave configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveConfig {
    /// Coordinators in preference order: primary first, then backups
    #[serde(default = "default_coordinators")]
    pub coordinators: Vec<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Idle time before the slave pings its coordinator
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_ms: u64,

    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_coordinators() -> Vec<String> {
    (PRIMARY_PORT..=PRIMARY_PORT + 3)
        .map(|port| format!("127.0.0.1:{}", port))
        .collect()
}
fn default_connect_timeout() -> u64 {
    5_000
}
fn default_idle_timeout() -> u64 {
    30_000
}
fn default_reply_timeout() -> u64 {
    5_000
}
fn default_base_backoff() -> u64 {
    5_000
}
fn default_max_backoff() -> u64 {
    120_000
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            coordinators: default_coordinators(),
            connect_timeout_ms: default_connect_timeout(),
            idle_timeout_ms: default_idle_timeout(),
            reply_timeout_ms: default_reply_timeout(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl SlaveConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.coordinators.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "slave needs at least one coordinator address".into(),
            ));
        }
        if self.idle_timeout_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "idle_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(crate::Error::InvalidConfig(format!(
                "base backoff {}ms exceeds max backoff {}ms",
                self.base_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }
}
