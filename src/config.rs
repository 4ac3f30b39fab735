//! Configuration
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. TOML file: `STANZAFLOW_CONFIG_PATH`, else `stanzaflow.toml` in the working
//!    directory (optional)
//! 3. Environment variables prefixed `STANZAFLOW_`, nested with `__`
//!    (e.g. `STANZAFLOW_LOGGING__FILTER`)
//! 4. Explicit builder overrides
//!
//! Configuration only shapes the command-line harness. The compiler itself
//! never reads it, so it cannot change what a workflow compiles to.

use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Environment, File, FileFormat};
use serde::Deserialize;

pub const CONFIG_PATH_ENV: &str = "STANZAFLOW_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "stanzaflow.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "warn".to_string()
}

impl Config {
    /// Load from the default file location and the environment.
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    log_filter: Option<String>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn log_filter(mut self, filter: Option<String>) -> Self {
        self.log_filter = filter;
        self
    }

    pub fn build(self) -> Result<Config> {
        let explicit_path = self
            .config_path
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let file_source = match &explicit_path {
            // An explicitly named file has to exist
            Some(path) => File::from(path.as_path()).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let settings = config::Config::builder()
            .set_default("logging.filter", default_log_filter())
            .context("Failed to set configuration defaults")?
            .add_source(file_source)
            .add_source(
                Environment::with_prefix("STANZAFLOW")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| match &explicit_path {
                Some(path) => format!("Failed to load configuration from {}", path.display()),
                None => "Failed to load configuration".to_string(),
            })?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        if let Some(filter) = self.log_filter {
            config.logging.filter = filter;
        }

        Ok(config)
    }
}
