//! Settings resolution for tenyks.
//!
//! Implements hierarchical settings resolution:
//! 1. Built-in defaults
//! 2. Global settings (`$XDG_CONFIG_HOME/tenyks/settings.toml`)
//! 3. Explicit settings file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (applied by the binary, highest priority)
//!
//! Files are merged table by table, so an explicit file only needs to carry
//! the keys it changes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_BROADCAST_TO_SERVICES_CHANNEL: &str = "tenyks.services.broadcast_to";
pub const DEFAULT_BROADCAST_TO_ROBOT_CHANNEL: &str = "tenyks.robot.broadcast_to";

/// Complete tenyks settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub channels: BusChannels,
    #[serde(default)]
    pub robot: RobotSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// Scratch directory created at startup.
    pub working_dir: Option<PathBuf>,
    /// Data directory created at startup.
    pub data_working_dir: Option<PathBuf>,
    /// Connection name → connection settings.
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
}

/// Where the bus lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: u8,
    pub password: Option<String>,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

/// Bus channel names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusChannels {
    /// Relay → services.
    pub broadcast_to_services: String,
    /// Services → relay.
    pub broadcast_to_robot: String,
}

impl Default for BusChannels {
    fn default() -> Self {
        Self {
            broadcast_to_services: DEFAULT_BROADCAST_TO_SERVICES_CHANNEL.to_string(),
            broadcast_to_robot: DEFAULT_BROADCAST_TO_ROBOT_CHANNEL.to_string(),
        }
    }
}

/// Timing and shutdown behaviour of the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotSettings {
    /// Line sent with `QUIT` on shutdown.
    pub quit_message: String,
    /// How long to wait for the first bytes after connecting.
    pub greeting_timeout_secs: u64,
    /// Silence after which a connection is considered stale.
    pub stale_after_secs: u64,
    /// Bounded wait on a connection's inbound queue.
    pub read_wait_secs: u64,
    /// How long shutdown waits for supervising tasks before aborting them.
    pub shutdown_grace_secs: u64,
    pub reconnect: ReconnectSettings,
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            quit_message: "I'm out!".to_string(),
            greeting_timeout_secs: 5,
            stale_after_secs: 5 * 60,
            read_wait_secs: 5,
            shutdown_grace_secs: 10,
            reconnect: ReconnectSettings::default(),
        }
    }
}

/// Backoff between failed re-establishment attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

/// Transform pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineSettings {
    /// Named stages appended after the base stages, in order.
    pub extra_stages: Vec<String>,
}

/// One configured protocol endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Unique key, filled from the settings table key.
    #[serde(skip)]
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    pub nick: String,
    #[serde(default)]
    pub ident: String,
    #[serde(default)]
    pub realname: String,
    #[serde(default)]
    pub admins: BTreeSet<String>,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub channels: Vec<ChannelJoin>,
}

const fn default_port() -> u16 {
    6667
}

impl ConnectionConfig {
    /// The password, if one is set and non-empty.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// `host:port` for logging and dialing.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A channel to join, optionally protected by a secret.
///
/// Written in settings as `"#chan"` or `"#chan, secret"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelJoin {
    pub channel: String,
    pub secret: Option<String>,
}

impl TryFrom<String> for ChannelJoin {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let (channel, secret) = match value.split_once(',') {
            Some((channel, secret)) => (channel.trim(), Some(secret.trim())),
            None => (value.trim(), None),
        };
        if channel.is_empty() {
            return Err(format!("invalid channel entry {value:?}"));
        }
        Ok(Self {
            channel: channel.to_string(),
            secret: secret.filter(|s| !s.is_empty()).map(str::to_string),
        })
    }
}

impl From<ChannelJoin> for String {
    fn from(join: ChannelJoin) -> Self {
        match join.secret {
            Some(secret) => format!("{}, {}", join.channel, secret),
            None => join.channel,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text and validate them.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(text).map_err(|e| Error::Config(format!("Invalid settings: {e}")))?;
        settings.validated()
    }

    /// Fill derived fields and reject unusable connection entries.
    pub fn validated(mut self) -> Result<Self> {
        for (name, conn) in &mut self.connections {
            if name.trim().is_empty() {
                return Err(Error::Config("Connection name must not be empty".into()));
            }
            if conn.host.trim().is_empty() {
                return Err(Error::Config(format!("Connection {name}: host is required")));
            }
            if conn.nick.trim().is_empty() {
                return Err(Error::Config(format!("Connection {name}: nick is required")));
            }
            conn.name.clone_from(name);
            if conn.ident.is_empty() {
                conn.ident.clone_from(&conn.nick);
            }
            if conn.realname.is_empty() {
                conn.realname.clone_from(&conn.nick);
            }
        }
        Ok(self)
    }
}

impl Settings {
    /// Create `working_dir` and `data_working_dir` if they are set and
    /// missing.
    pub fn prepare_dirs(&self) -> Result<()> {
        for dir in [&self.working_dir, &self.data_working_dir].into_iter().flatten() {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::Config(format!("Failed to create directory {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

/// Load settings with hierarchical resolution.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let mut merged = toml::Table::new();

    if let Some(global_path) = global_settings_path() {
        if global_path.exists() {
            debug!(path = %global_path.display(), "Merging global settings");
            merge_tables(&mut merged, read_table(&global_path)?);
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Settings file {} does not exist",
                path.display()
            )));
        }
        debug!(path = %path.display(), "Merging settings file");
        merge_tables(&mut merged, read_table(path)?);
    }

    let mut settings: Settings = toml::Value::Table(merged)
        .try_into()
        .map_err(|e| Error::Config(format!("Invalid settings: {e}")))?;

    apply_env_overrides(&mut settings);

    let settings = settings.validated()?;
    if settings.connections.is_empty() {
        return Err(Error::Config("No connections configured".into()));
    }
    Ok(settings)
}

/// Get the global settings file path.
pub fn global_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tenyks").join("settings.toml"))
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read settings file {}: {}", path.display(), e))
    })?;
    content.parse::<toml::Table>().map_err(|e| {
        Error::Config(format!("Failed to parse settings file {}: {}", path.display(), e))
    })
}

/// Overlay `overlay` onto `base`, descending into nested tables.
///
/// The `connections` table is replaced wholesale so that a connection
/// defined only in the global file does not leak into an explicit one.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming))
                if key != "connections" =>
            {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("TENYKS_REDIS_HOST") {
        settings.redis.host = val;
    }
    if let Ok(val) = std::env::var("TENYKS_REDIS_PORT") {
        if let Ok(n) = val.parse() {
            settings.redis.port = n;
        }
    }
    if let Ok(val) = std::env::var("TENYKS_REDIS_DB") {
        if let Ok(n) = val.parse() {
            settings.redis.db = n;
        }
    }
    if let Ok(val) = std::env::var("TENYKS_REDIS_PASSWORD") {
        settings.redis.password = Some(val);
    }
    if let Ok(val) = std::env::var("TENYKS_BROADCAST_TO_SERVICES_CHANNEL") {
        settings.channels.broadcast_to_services = val;
    }
    if let Ok(val) = std::env::var("TENYKS_BROADCAST_TO_ROBOT_CHANNEL") {
        settings.channels.broadcast_to_robot = val;
    }
}
