//! Runtime configuration
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. `rewind.toml` in the working directory, or the file given explicitly
//! 3. `REWIND_*` environment variables (a `.env` file is loaded by the binary)
//! 4. Overrides set on the builder, usually from command line flags

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::script::DEFAULT_MAX_CALL_DEPTH;

/// Looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "rewind";

pub const ENV_PREFIX: &str = "REWIND";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Function a script run starts from
    pub entry: String,
    /// Default tracing filter, used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Log every continuation host call
    pub trace_host: bool,
    /// Deepest script call nesting before a run is aborted
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entry: "main".to_string(),
            log_filter: "warn".to_string(),
            trace_host: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Render as TOML, the same shape the config file takes
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    entry: Option<String>,
    trace_host: Option<bool>,
    use_env: bool,
}

impl ConfigBuilder {
    /// Config file to read instead of `rewind.toml`. The file must exist.
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn entry(mut self, entry: Option<String>) -> Self {
        self.entry = entry;
        self
    }

    pub fn trace_host(mut self, trace_host: Option<bool>) -> Self {
        self.trace_host = trace_host;
        self
    }

    /// Read `REWIND_*` environment variables
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let defaults = Config::default();

        let mut builder = config::Config::builder()
            .set_default("entry", defaults.entry)?
            .set_default("log_filter", defaults.log_filter)?
            .set_default("trace_host", defaults.trace_host)?
            .set_default("max_call_depth", defaults.max_call_depth as i64)?;

        let file = match &self.config_path {
            Some(path) => config::File::from(path.as_path()).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        builder = builder.add_source(file);

        if self.use_env {
            builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));
        }

        if let Some(entry) = self.entry {
            builder = builder.set_override("entry", entry)?;
        }
        if let Some(trace_host) = self.trace_host {
            builder = builder.set_override("trace_host", trace_host)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }
}
