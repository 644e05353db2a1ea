//! Configuration module for the speedtest server.
//!
//! Supports command-line arguments, a handful of environment variables and a
//! TOML configuration file. CLI values take precedence over environment
//! values, which take precedence over config file values and then built-in
//! defaults.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Largest body served by a single download request (25 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// Size of the generated payload block and the internal transfer chunk (30 MiB).
pub const DEFAULT_READ_BUFFER_SIZE: u64 = 30 * 1024 * 1024;

/// Environment variable holding the listen address
pub const ENV_LISTEN_ADDR: &str = "LISTEN_ADDR";

/// Environment variable holding the static files directory
pub const ENV_STATIC_DIR: &str = "STATIC_DIR";

/// Environment variable enabling request logging when set to `true`
pub const ENV_HTTP_LOGGING: &str = "HTTP_LOGGING";

/// Command-line arguments for the speedtest server
#[derive(Parser, Debug)]
#[command(name = "fastclone")]
#[command(author = "fastclone authors")]
#[command(version = "0.1.0")]
#[command(about = "A self-hosted bandwidth test server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8080 or :8080)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Maximum number of concurrent connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Directory holding the webapp static files
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Largest download served by a single request, in bytes
    #[arg(long)]
    pub max_payload_bytes: Option<u64>,

    /// Size of the generated payload block, in bytes
    #[arg(long)]
    pub read_buffer_size: Option<u64>,

    /// Log every HTTP request
    #[arg(long)]
    pub http_logging: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Settings taken from the process environment
#[derive(Debug, Default, PartialEq)]
pub struct EnvConfig {
    pub listen: Option<String>,
    pub static_dir: Option<PathBuf>,
    pub http_logging: Option<bool>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// Request logging is on only for the exact value `true`; any other value
    /// turns it off rather than failing startup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());
        Self {
            listen: non_empty(ENV_LISTEN_ADDR),
            static_dir: non_empty(ENV_STATIC_DIR).map(PathBuf::from),
            http_logging: non_empty(ENV_HTTP_LOGGING).map(|value| value == "true"),
        }
    }
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub payload: PayloadTomlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Static files directory
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
            max_connections: default_max_connections(),
            static_dir: default_static_dir(),
        }
    }
}

/// Payload-related configuration
#[derive(Debug, Deserialize)]
pub struct PayloadTomlConfig {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: u64,
}

impl Default for PayloadTomlConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log one line per HTTP request
    #[serde(default)]
    pub http_requests: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            http_requests: false,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("original-webapp")
}

fn default_max_payload_bytes() -> u64 {
    DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_read_buffer_size() -> u64 {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved payload settings
#[derive(Debug, Clone)]
pub struct PayloadConfig {
    pub max_payload_bytes: u64,
    pub read_buffer_size: u64,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub workers: Option<usize>,
    pub max_connections: usize,
    pub static_dir: PathBuf,
    pub payload: PayloadConfig,
    pub log_level: String,
    pub http_logging: bool,
}

impl Config {
    /// Load configuration from CLI args, environment and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, EnvConfig::from_env(), toml_config)
    }

    /// Merge CLI args, environment and TOML values, then validate the result.
    fn merge(cli: CliArgs, env: EnvConfig, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen = cli
            .listen
            .or(env.listen)
            .unwrap_or(toml_config.server.listen);

        let config = Config {
            listen: normalize_listen(&listen),
            workers: cli.workers.or(toml_config.server.workers),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            static_dir: cli
                .static_dir
                .or(env.static_dir)
                .unwrap_or(toml_config.server.static_dir),
            payload: PayloadConfig {
                max_payload_bytes: cli
                    .max_payload_bytes
                    .unwrap_or(toml_config.payload.max_payload_bytes),
                read_buffer_size: cli
                    .read_buffer_size
                    .unwrap_or(toml_config.payload.read_buffer_size),
            },
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
            http_logging: cli.http_logging
                || env
                    .http_logging
                    .unwrap_or(toml_config.logging.http_requests),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let payload = &self.payload;
        if payload.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_payload_bytes must be greater than zero".to_string(),
            ));
        }
        if payload.read_buffer_size < payload.max_payload_bytes {
            return Err(ConfigError::Invalid(format!(
                "read_buffer_size ({}) must be at least max_payload_bytes ({})",
                payload.read_buffer_size, payload.max_payload_bytes
            )));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid(
                "workers must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Accept the `:8080` shorthand for all interfaces.
fn normalize_listen(listen: &str) -> String {
    if listen.starts_with(':') {
        format!("0.0.0.0{}", listen)
    } else {
        listen.to_string()
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
