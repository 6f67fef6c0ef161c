//! Configuration parsing and management for xcreport.
//!
//! This crate provides:
//! - The `xcreport.toml` file model (`Config`)
//! - TOML parsing, validation and upward discovery
//! - Precedence handling (CLI > config file > defaults)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xcreport_types::{RenderOptions, SchemaVersion};

/// File name searched for by [`discover_config`].
pub const CONFIG_FILE_NAME: &str = "xcreport.toml";

/// Default ceiling for captured tool output, in MiB.
pub const DEFAULT_MAX_OUTPUT_MB: u32 = 50;

/// Largest accepted `max_output_mb`.
pub const MAX_OUTPUT_MB_LIMIT: u32 = 1024;

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// How the result schema is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaChoice {
    /// Detect from the installed Xcode version.
    #[default]
    Auto,
    /// Always use the legacy object graph.
    Legacy,
    /// Always use the modern summary.
    Modern,
}

impl SchemaChoice {
    /// The forced schema, or `None` when the schema should be detected.
    pub fn forced(self) -> Option<SchemaVersion> {
        match self {
            SchemaChoice::Auto => None,
            SchemaChoice::Legacy => Some(SchemaVersion::Legacy),
            SchemaChoice::Modern => Some(SchemaVersion::Modern),
        }
    }
}

/// Contents of `xcreport.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Show passing test cases in the listing.
    #[serde(default)]
    pub show_passed_tests: Option<bool>,

    /// Render the coverage section.
    #[serde(default)]
    pub show_code_coverage: Option<bool>,

    /// Schema selection.
    #[serde(default)]
    pub schema: Option<SchemaChoice>,

    /// Ceiling for captured tool output, in MiB (1..=1024).
    #[serde(default)]
    pub max_output_mb: Option<u32>,

    /// Optional document title, rendered as a top-level heading.
    #[serde(default)]
    pub title: Option<String>,
}

// ============================================================================
// Effective Configuration
// ============================================================================

/// Effective configuration with all values resolved.
///
/// This represents the final configuration after applying:
/// 1. Defaults
/// 2. Config file values
/// 3. CLI overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub show_passed_tests: bool,
    pub show_code_coverage: bool,
    pub schema: SchemaChoice,
    pub max_output_mb: u32,
    pub title: Option<String>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            show_passed_tests: true,
            show_code_coverage: true,
            schema: SchemaChoice::Auto,
            max_output_mb: DEFAULT_MAX_OUTPUT_MB,
            title: None,
        }
    }
}

impl EffectiveConfig {
    /// The rendering flags.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            show_passed_tests: self.show_passed_tests,
            show_code_coverage: self.show_code_coverage,
        }
    }

    /// The output ceiling in bytes.
    pub fn max_output_bytes(&self) -> usize {
        self.max_output_mb as usize * 1024 * 1024
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if let Some(mb) = config.max_output_mb
        && !(1..=MAX_OUTPUT_MB_LIMIT).contains(&mb)
    {
        return Err(ConfigError::InvalidValue(format!(
            "max_output_mb must be between 1 and {}, got {}",
            MAX_OUTPUT_MB_LIMIT, mb
        )));
    }
    if let Some(title) = &config.title
        && title.trim().is_empty()
    {
        return Err(ConfigError::InvalidValue(
            "title must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Find `xcreport.toml` in `start` or one of its ancestors and load it.
///
/// Returns `Ok(None)` when no file exists. A file that exists but does not
/// parse is an error.
pub fn discover_config_from(start: &Path) -> Result<Option<(PathBuf, Config)>, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            let config = load_config(&config_path)?;
            return Ok(Some((config_path, config)));
        }

        if !current.pop() {
            break;
        }
    }

    Ok(None)
}

/// Find and load `xcreport.toml` starting at the current directory.
pub fn discover_config() -> Result<Option<(PathBuf, Config)>, ConfigError> {
    let current = std::env::current_dir()?;
    discover_config_from(&current)
}

// ============================================================================
// Precedence Resolution
// ============================================================================

/// CLI override options.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub show_passed_tests: Option<bool>,
    pub show_code_coverage: Option<bool>,
    pub schema: Option<SchemaChoice>,
}

/// Resolve effective configuration from config file and CLI overrides.
///
/// Precedence: CLI > config file > defaults
pub fn resolve_config(config: Option<&Config>, cli: &CliOverrides) -> EffectiveConfig {
    let mut effective = EffectiveConfig::default();

    if let Some(config) = config {
        if let Some(show) = config.show_passed_tests {
            effective.show_passed_tests = show;
        }
        if let Some(show) = config.show_code_coverage {
            effective.show_code_coverage = show;
        }
        if let Some(schema) = config.schema {
            effective.schema = schema;
        }
        if let Some(mb) = config.max_output_mb {
            effective.max_output_mb = mb;
        }
        effective.title = config.title.clone();
    }

    if let Some(show) = cli.show_passed_tests {
        effective.show_passed_tests = show;
    }
    if let Some(show) = cli.show_code_coverage {
        effective.show_code_coverage = show;
    }
    if let Some(schema) = cli.schema {
        effective.schema = schema;
    }

    effective
}

// ============================================================================
// Tests
// ============================================================================
