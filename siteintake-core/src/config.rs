//! Configuration loading and management
//!
//! Configuration is loaded once at startup from `~/.config/siteintake/config.toml`
//! and passed around by reference afterwards; nothing mutates it at runtime.
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/siteintake/` (~/.config/siteintake/)
//! - Data: `$XDG_DATA_HOME/siteintake/` (~/.local/share/siteintake/)
//! - State/Logs: `$XDG_STATE_HOME/siteintake/` (~/.local/state/siteintake/)

use crate::error::{Error, Result};
use crate::types::ColorScheme;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Plan pricing shown on the marketing pages
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Product brand colors
    #[serde(default)]
    pub brand: BrandConfig,

    /// Public API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Remote site generation service (optional)
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Intake flow settings
    #[serde(default)]
    pub intake: IntakeConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Flat monthly pricing
#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    /// Plan display name
    #[serde(default = "default_plan_name")]
    pub plan_name: String,

    /// Monthly price in the smallest currency unit
    #[serde(default = "default_monthly_price_cents")]
    pub monthly_price_cents: u32,

    /// ISO 4217 currency code
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            plan_name: default_plan_name(),
            monthly_price_cents: default_monthly_price_cents(),
            currency: default_currency(),
        }
    }
}

impl PricingConfig {
    /// Human-readable price, e.g. `$30/month`
    pub fn display_price(&self) -> String {
        let symbol = match self.currency.as_str() {
            "USD" | "CAD" | "AUD" => "$",
            "EUR" => "€",
            "GBP" => "£",
            _ => "",
        };
        let whole = self.monthly_price_cents / 100;
        let cents = self.monthly_price_cents % 100;
        let amount = if cents == 0 {
            whole.to_string()
        } else {
            format!("{}.{:02}", whole, cents)
        };

        if symbol.is_empty() {
            format!("{} {}/month", amount, self.currency)
        } else {
            format!("{}{}/month", symbol, amount)
        }
    }
}

fn default_plan_name() -> String {
    "Everything included".to_string()
}

fn default_monthly_price_cents() -> u32 {
    3000
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Brand palette, also the fallback palette for generated sites
#[derive(Debug, Deserialize, Clone)]
pub struct BrandConfig {
    #[serde(default = "default_brand_primary")]
    pub primary: String,
    #[serde(default = "default_brand_secondary")]
    pub secondary: String,
    #[serde(default = "default_brand_accent")]
    pub accent: String,
    #[serde(default = "default_brand_background")]
    pub background: String,
    #[serde(default = "default_brand_text")]
    pub text: String,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            primary: default_brand_primary(),
            secondary: default_brand_secondary(),
            accent: default_brand_accent(),
            background: default_brand_background(),
            text: default_brand_text(),
        }
    }
}

impl BrandConfig {
    /// The palette as a site color scheme
    pub fn color_scheme(&self) -> ColorScheme {
        ColorScheme {
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
            accent: self.accent.clone(),
            background: self.background.clone(),
            text: self.text.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("primary", &self.primary),
            ("secondary", &self.secondary),
            ("accent", &self.accent),
            ("background", &self.background),
            ("text", &self.text),
        ] {
            if !is_hex_color(value) {
                return Err(Error::Config(format!(
                    "brand.{} must be a hex color like #1d4ed8, got {:?}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

fn default_brand_primary() -> String {
    "#2563eb".to_string()
}

fn default_brand_secondary() -> String {
    "#0f172a".to_string()
}

fn default_brand_accent() -> String {
    "#f97316".to_string()
}

fn default_brand_background() -> String {
    "#ffffff".to_string()
}

fn default_brand_text() -> String {
    "#1e293b".to_string()
}

/// Whether `value` is `#rgb` or `#rrggbb`
pub fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Public API settings
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Path prefix for every versioned endpoint
    #[serde(default = "default_api_prefix")]
    pub version_prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            version_prefix: default_api_prefix(),
        }
    }
}

impl ApiConfig {
    /// Join the version prefix with an endpoint path
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.version_prefix.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

/// Remote site generation service configuration
///
/// When enabled, generation and deployment are delegated to an HTTP
/// service instead of the built-in template generator.
#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    /// Enable/disable the remote service
    #[serde(default)]
    pub enabled: bool,

    /// Service base URL (e.g., `https://builder.example.com`)
    pub server_url: Option<String>,

    /// API key sent as a bearer token
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_generator_max_retries")]
    pub max_retries: usize,

    /// Domain used by the local deployer for site URLs
    #[serde(default = "default_site_domain")]
    pub site_domain: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: None,
            api_key: None,
            timeout_secs: default_generator_timeout(),
            max_retries: default_generator_max_retries(),
            site_domain: default_site_domain(),
        }
    }
}

impl GeneratorConfig {
    /// Check if the remote service is enabled and configured
    pub fn is_ready(&self) -> bool {
        self.enabled && self.server_url.is_some() && self.api_key.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.site_domain.trim().is_empty() {
            return Err(Error::Config(
                "generator.site_domain must not be empty".to_string(),
            ));
        }

        if !self.enabled {
            return Ok(());
        }

        if self.server_url.is_none() {
            return Err(Error::Config(
                "generator.server_url is required when generator is enabled".to_string(),
            ));
        }
        if self.api_key.is_none() {
            return Err(Error::Config(
                "generator.api_key is required when generator is enabled".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "generator.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_generator_timeout() -> u64 {
    60
}

fn default_generator_max_retries() -> usize {
    3
}

fn default_site_domain() -> String {
    "sites.siteintake.app".to_string()
}

/// Intake flow settings
#[derive(Debug, Deserialize, Clone)]
pub struct IntakeConfig {
    /// Minutes a session may stay in `generating` before the watchdog fails it
    #[serde(default = "default_generation_timeout_minutes")]
    pub generation_timeout_minutes: u32,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            generation_timeout_minutes: default_generation_timeout_minutes(),
        }
    }
}

impl IntakeConfig {
    pub fn generation_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.generation_timeout_minutes))
    }
}

fn default_generation_timeout_minutes() -> u32 {
    30
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.brand.validate()?;
        self.generator.validate()?;

        if !self.api.version_prefix.starts_with('/') {
            return Err(Error::Config(format!(
                "api.version_prefix must start with '/', got {:?}",
                self.api.version_prefix
            )));
        }
        if self.pricing.monthly_price_cents == 0 {
            return Err(Error::Config(
                "pricing.monthly_price_cents must be positive".to_string(),
            ));
        }
        if self.intake.generation_timeout_minutes == 0 {
            return Err(Error::Config(
                "intake.generation_timeout_minutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/siteintake/config.toml` (~/.config/siteintake/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("siteintake").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/siteintake/` (~/.local/share/siteintake/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("siteintake")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/siteintake/` (~/.local/state/siteintake/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("siteintake")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/siteintake/data.db` (~/.local/share/siteintake/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/siteintake/siteintake.log` (~/.local/state/siteintake/siteintake.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("siteintake.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
