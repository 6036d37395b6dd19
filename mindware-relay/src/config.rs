//! Configuration system for the Mindware chat relay.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/mindware-relay/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::rooms::DEFAULT_MAX_IDLE_ROOMS;
use crate::router::DEFAULT_MAX_PAYLOAD_SIZE;

/// Default bound on each connection's outbound queue.
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Default number of messages returned by `GET /api/history/{room_id}`.
pub const DEFAULT_HTTP_HISTORY_LIMIT: usize = 50;

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the relay.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RelayConfigFile {
    server: ServerFileConfig,
    chat: ChatFileConfig,
    log: LogFileConfig,
}

/// `[server]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
}

/// `[chat]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    history_capacity: Option<usize>,
    max_idle_rooms: Option<usize>,
    outbound_queue_capacity: Option<usize>,
    http_history_limit: Option<usize>,
    plain_text_fallback: Option<bool>,
}

/// `[log]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LogFileConfig {
    file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the relay server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Mindware chat relay server")]
pub struct RelayCliArgs {
    /// Address to bind the relay server to.
    #[arg(short, long, env = "MINDWARE_RELAY_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/mindware-relay/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum inbound frame size in bytes.
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// Messages kept per room for history replay.
    #[arg(long)]
    pub history_capacity: Option<usize>,

    /// Member-less rooms that keep their history before the oldest is dropped.
    #[arg(long)]
    pub max_idle_rooms: Option<usize>,

    /// Outbound messages queued per connection before it is evicted.
    #[arg(long)]
    pub outbound_queue_capacity: Option<usize>,

    /// Broadcast frames that are not JSON as plain text.
    #[arg(long)]
    pub plain_text_fallback: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "MINDWARE_RELAY_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:8001`).
    pub bind_addr: String,
    /// Maximum accepted inbound frame size in bytes.
    pub max_payload_size: usize,
    /// Messages kept per room. At least 1.
    pub history_capacity: usize,
    /// Member-less rooms retained with their history.
    pub max_idle_rooms: usize,
    /// Per-connection outbound queue bound. At least 1.
    pub outbound_queue_capacity: usize,
    /// Messages returned by the HTTP history endpoint.
    pub http_history_limit: usize,
    /// Broadcast non-JSON frames as plain text.
    pub plain_text_fallback: bool,
    /// Optional log file; stderr when `None`.
    pub log_file: Option<PathBuf>,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8001".to_string(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_idle_rooms: DEFAULT_MAX_IDLE_ROOMS,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            http_history_limit: DEFAULT_HTTP_HISTORY_LIMIT,
            plain_text_fallback: false,
            log_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `RelayConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Zero capacities are raised to 1.
    #[must_use]
    fn resolve(cli: &RelayCliArgs, file: &RelayConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            max_payload_size: cli
                .max_payload_size
                .or(file.server.max_payload_size)
                .unwrap_or(defaults.max_payload_size),
            history_capacity: cli
                .history_capacity
                .or(file.chat.history_capacity)
                .unwrap_or(defaults.history_capacity)
                .max(1),
            max_idle_rooms: cli
                .max_idle_rooms
                .or(file.chat.max_idle_rooms)
                .unwrap_or(defaults.max_idle_rooms),
            outbound_queue_capacity: cli
                .outbound_queue_capacity
                .or(file.chat.outbound_queue_capacity)
                .unwrap_or(defaults.outbound_queue_capacity)
                .max(1),
            http_history_limit: file
                .chat
                .http_history_limit
                .unwrap_or(defaults.http_history_limit),
            plain_text_fallback: cli.plain_text_fallback
                || file
                    .chat
                    .plain_text_fallback
                    .unwrap_or(defaults.plain_text_fallback),
            log_file: cli.log_file.clone().or_else(|| file.log.file.clone()),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the relay.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<RelayConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(RelayConfigFile::default());
    };
    let path = config_dir.join("mindware-relay").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
