//! Production configuration system
//!
//! Provides centralized configuration management with:
//! - Environment variable support
//! - Config file loading (optional, `basic` feature)
//! - Runtime defaults
//! - Validation and type safety

use crate::adapters::sim_api::{SimApi, DEFAULT_BASE_URL, DEFAULT_HOST};
use crate::identity::DEFAULT_GROUP_SUFFIX;
use crate::report::TIMESTAMP_FORMAT;
use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::env;
#[cfg(feature = "basic")]
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// File locations
    pub paths: PathsConfig,

    /// Accounting tool commands
    pub accounting: AccountingConfig,

    /// User directory and group policy
    pub identity: IdentityConfig,

    /// Output configuration
    pub output: OutputConfig,

    /// Report defaults
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub database: PathBuf,
    pub output_directory: PathBuf,
    pub log_directory: PathBuf,
    pub netrc_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountingConfig {
    pub sacct_command: String,
    pub sreport_command: String,
    pub id_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub api_base_url: String,
    pub api_host: String,
    pub group_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub json_pretty: bool,
    pub timestamp_format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Users left out of `report total`
    pub ignore_users: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "ERROR".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("output").join("usage.db"),
            output_directory: PathBuf::from("output"),
            log_directory: PathBuf::from("logs"),
            netrc_file: SimApi::default_netrc(),
        }
    }
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            sacct_command: "sacct".to_string(),
            sreport_command: "sreport".to_string(),
            id_command: "id".to_string(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            api_host: DEFAULT_HOST.to_string(),
            group_suffix: DEFAULT_GROUP_SUFFIX.to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json_pretty: false,
            timestamp_format: TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        // Try to load from config file if it exists
        let config_paths = [
            PathBuf::from("usage-report.toml"),
            PathBuf::from(".usage-report.toml"),
            dirs::config_dir()
                .map(|d| d.join("usage-report").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.is_file() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        // Override with environment variables
        config.apply_env_overrides()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    #[cfg(feature = "basic")]
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    #[cfg(not(feature = "basic"))]
    pub fn load_from_file(path: &Path) -> Result<Self> {
        warn!(
            config_file = %path.display(),
            "Config file support not compiled in, using defaults"
        );
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // Path overrides
        if let Ok(val) = env::var("USAGE_REPORT_DB") {
            self.paths.database = PathBuf::from(val);
        }
        if let Ok(val) = env::var("USAGE_REPORT_OUTPUT_DIR") {
            self.paths.output_directory = PathBuf::from(val);
        }
        if let Ok(val) = env::var("USAGE_REPORT_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }
        if let Ok(val) = env::var("USAGE_REPORT_NETRC") {
            self.paths.netrc_file = PathBuf::from(val);
        }

        // Accounting overrides
        if let Ok(val) = env::var("USAGE_REPORT_SACCT") {
            self.accounting.sacct_command = val;
        }
        if let Ok(val) = env::var("USAGE_REPORT_SREPORT") {
            self.accounting.sreport_command = val;
        }
        if let Ok(val) = env::var("USAGE_REPORT_ID") {
            self.accounting.id_command = val;
        }

        // Identity overrides
        if let Ok(val) = env::var("USAGE_REPORT_API_URL") {
            self.identity.api_base_url = val;
        }
        if let Ok(val) = env::var("USAGE_REPORT_GROUP_SUFFIX") {
            self.identity.group_suffix = val;
        }

        // Output overrides
        if let Ok(val) = env::var("USAGE_REPORT_JSON_PRETTY") {
            self.output.json_pretty = val
                .parse()
                .context("Invalid USAGE_REPORT_JSON_PRETTY")?;
        }

        if let Ok(val) = env::var("USAGE_REPORT_IGNORE_USERS") {
            self.report.ignore_users = val
                .split(',')
                .map(str::trim)
                .filter(|user| !user.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        const LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !LEVELS.contains(&self.logging.level.to_uppercase().as_str()) {
            return Err(anyhow::anyhow!(
                "Log level must be one of {}, got {}",
                LEVELS.join(", "),
                self.logging.level
            ));
        }

        if !["console", "file", "both"].contains(&self.logging.output.as_str()) {
            return Err(anyhow::anyhow!(
                "Log output must be console, file or both, got {}",
                self.logging.output
            ));
        }

        if self.identity.group_suffix.is_empty() {
            return Err(anyhow::anyhow!("Group suffix must not be empty"));
        }

        if !self.identity.api_base_url.ends_with('/') {
            warn!(
                api_base_url = %self.identity.api_base_url,
                "API base URL does not end with '/', user ids will be appended directly"
            );
        }

        if self.output.timestamp_format.trim().is_empty()
            || StrftimeItems::new(&self.output.timestamp_format).any(|item| matches!(item, Item::Error))
        {
            return Err(anyhow::anyhow!(
                "Invalid timestamp format: {:?}",
                self.output.timestamp_format
            ));
        }

        Ok(())
    }

    /// Save current configuration to file
    #[cfg(feature = "basic")]
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }
}

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration instance
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::load().unwrap_or_else(|err| {
            warn!(error = %err, "Failed to load configuration, using defaults");
            Config::default()
        })
    })
}
