///
/// # Runtime Configuration
///
/// `RuntimeConfig` describes how a host binds to one native module: how
/// per-type exports are named, what the module's runtime exports are
/// called, how strings are decoded, and how logging is set up.
///
/// ## Example tether.toml
///
/// ```toml
/// [abi]
/// rename = "icu4x_{0}_mv1"
/// destructor = "destroy"
///
/// [exports]
/// alloc = "diplomat_alloc"
/// free = "diplomat_free"
///
/// [strings]
/// utf8 = "lossy"
/// write_capacity = 64
///
/// [logging]
/// level = "debug"
/// ```
///
/// Every table and key is optional. The rename template is applied to the
/// `{Type}_{method}` name of each API export; `{0}` stands for that name.
///

use std::path::Path;
use std::str::FromStr;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use tether_abi::RuntimeExports;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("{0}")]
    #[diagnostic(code(tether::config::io))]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    #[diagnostic(code(tether::config::toml))]
    Toml(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    #[diagnostic(code(tether::config::invalid))]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub abi: AbiConfig,
    pub exports: RuntimeExports,
    pub strings: StringsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AbiConfig {
    pub rename: String,
    pub destructor: String,
}

impl Default for AbiConfig {
    fn default() -> Self {
        AbiConfig {
            rename: "{0}".to_string(),
            destructor: "destroy".to_string(),
        }
    }
}

impl AbiConfig {
    pub fn export_name(&self, type_name: &str, method: &str) -> String {
        self.rename.replace("{0}", &format!("{}_{}", type_name, method))
    }

    pub fn destructor_name(&self, type_name: &str) -> String {
        self.export_name(type_name, &self.destructor)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Utf8Policy {
    /// Malformed UTF-8 from the module is an error.
    #[default]
    Strict,
    /// Malformed sequences become U+FFFD.
    Lossy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StringsConfig {
    pub utf8: Utf8Policy,
    /// Initial capacity handed to the write-buffer create export.
    pub write_capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "warn".to_string(),
            ansi: false,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.abi.rename.contains("{0}") {
            return Err(ConfigError::Invalid(format!(
                "rename template '{}' must contain {{0}}",
                self.abi.rename
            )));
        }
        if self.abi.destructor.is_empty() {
            return Err(ConfigError::Invalid("destructor method name is empty".to_string()));
        }
        if self.exports.all().iter().any(|name| name.is_empty()) {
            return Err(ConfigError::Invalid("runtime export names must not be empty".to_string()));
        }
        self.logging.level_filter()?;
        Ok(())
    }
}

pub fn parse_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<RuntimeConfig, ConfigError> {
    let config: RuntimeConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}
