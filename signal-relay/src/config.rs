//! Configuration system for the signaling relay.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/signal-relay/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use crate::client::DEFAULT_MAILBOX_CAPACITY;
use crate::hub::HubConfig;
use crate::origin::OriginPolicy;
use crate::relay::ServerOptions;

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
    origins: OriginsFileConfig,
}

/// `[server]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    mailbox_capacity: Option<usize>,
    max_message_size: Option<usize>,
    web_dir: Option<PathBuf>,
}

/// `[origins]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct OriginsFileConfig {
    allow_all: bool,
    allowed: Vec<String>,
}

impl OriginsFileConfig {
    fn policy(&self) -> Option<OriginPolicy> {
        if self.allow_all {
            Some(OriginPolicy::AllowAll)
        } else if self.allowed.is_empty() {
            None
        } else {
            Some(OriginPolicy::AllowList(self.allowed.clone()))
        }
    }
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the relay server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "WebRTC signaling relay")]
pub struct RelayCliArgs {
    /// Address to bind the relay server to.
    #[arg(short, long, env = "ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/signal-relay/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Allowed WebSocket origins: `*` for any, or a comma-separated list.
    /// Unset means loopback origins only.
    #[arg(long, env = "WS_ALLOWED_ORIGINS")]
    pub allowed_origins: Option<String>,

    /// Outbound messages buffered per connection.
    #[arg(long)]
    pub mailbox_capacity: Option<usize>,

    /// Maximum inbound WebSocket message size in bytes.
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Directory of static files to serve at `/`.
    #[arg(long)]
    pub web_dir: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "SIGNAL_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:8080`).
    pub bind_addr: String,
    /// Which origins may open a signaling connection.
    pub origin_policy: OriginPolicy,
    /// Outbound messages buffered per connection.
    pub mailbox_capacity: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Static file directory served at `/`, if it exists.
    pub web_dir: Option<PathBuf>,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            origin_policy: OriginPolicy::Loopback,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            max_message_size: 64 * 1024,
            web_dir: Some(PathBuf::from("web")),
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
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &RelayCliArgs, file: &RelayConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: normalize_bind_addr(
                cli.bind
                    .clone()
                    .or_else(|| file.server.bind_addr.clone())
                    .unwrap_or(defaults.bind_addr),
            ),
            origin_policy: cli
                .allowed_origins
                .as_deref()
                .map(OriginPolicy::from_setting)
                .or_else(|| file.origins.policy())
                .unwrap_or(defaults.origin_policy),
            mailbox_capacity: cli
                .mailbox_capacity
                .or(file.server.mailbox_capacity)
                .unwrap_or(defaults.mailbox_capacity)
                .max(1),
            max_message_size: cli
                .max_message_size
                .or(file.server.max_message_size)
                .unwrap_or(defaults.max_message_size),
            web_dir: cli
                .web_dir
                .clone()
                .or_else(|| file.server.web_dir.clone())
                .or(defaults.web_dir),
            log_level: cli.log_level.clone(),
        }
    }

    /// Settings for the [`Hub`](crate::hub::Hub).
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            mailbox_capacity: self.mailbox_capacity,
            origin_policy: self.origin_policy.clone(),
        }
    }

    /// Settings for the HTTP/WebSocket surface.
    #[must_use]
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            max_message_size: self.max_message_size,
            web_dir: self.web_dir.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Accepts the `:8080` shorthand for "all interfaces".
fn normalize_bind_addr(addr: String) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr
    }
}

/// Load and parse a TOML config file for the relay.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<RelayConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(RelayConfigFile::default());
        };
        config_dir.join("signal-relay").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
