use crate::error::{CatalogError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogConfig {
    /// tracing-subscriber filter, overridden by RUST_LOG
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[database]
path = "training-catalog.db"

[log]
filter = "info"

[server]
bind = "0.0.0.0:3000"
"#;

/// Parse a configuration document
pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents)?;
    if config.database.path.trim().is_empty() {
        return Err(CatalogError::Config("database.path must not be empty".to_string()));
    }
    Ok(config)
}

/// Load configuration
///
/// Search order:
/// 1. The explicit path, when given (must exist)
/// 2. config.toml next to the executable
/// 3. Falls back to embedded default config
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        return parse_config(&contents);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let config_path = exe_dir.join("config.toml");

            if config_path.exists() {
                tracing::info!("Loading config from: {}", config_path.display());
                let contents = std::fs::read_to_string(&config_path)?;
                return parse_config(&contents);
            } else {
                tracing::debug!("config.toml not found at: {}", config_path.display());
            }
        }
    }

    tracing::info!("Using default embedded configuration");
    parse_config(DEFAULT_CONFIG)
}

/// Install the global tracing subscriber (stderr, RUST_LOG wins over config)
pub fn init_logging(log: &LogConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| log.filter.clone());

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Get the database file path from configuration
/// Relative paths resolve against the current directory
pub fn get_database_path(config: &Config) -> PathBuf {
    PathBuf::from(&config.database.path)
}
