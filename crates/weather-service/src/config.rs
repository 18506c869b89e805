//! Server configuration.
//!
//! Loaded from TOML, then overridden by environment variables
//! (`OPENWEATHER_API_KEY`, `CORS_ALLOWED_ORIGINS`, `PORT`) and finally by
//! command-line flags in the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use weather_core::OpenWeatherConfig;
use weather_core::openweather::{DEFAULT_BASE_URL, DEFAULT_LATITUDE, DEFAULT_LONGITUDE};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Upstream weather API settings.
    pub weather: WeatherConfig,
    /// Weather cache settings.
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Empty values are ignored.
    /// - `OPENWEATHER_API_KEY` replaces `weather.api_key`
    /// - `CORS_ALLOWED_ORIGINS` (comma-separated) replaces `server.cors_allowed_origins`
    /// - `PORT` binds all interfaces on that port
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENWEATHER_API_KEY") {
            self.weather.api_key = key;
        }
        if let Some(origins) = get("CORS_ALLOWED_ORIGINS") {
            self.server.cors_allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(port) = get("PORT") {
            self.server.bind = format!("0.0.0.0:{}", port.trim());
        }
    }

    /// Validate the configuration and return any errors.
    ///
    /// # Example
    ///
    /// ```
    /// use weather_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.weather.validate());
        errors.extend(self.cache.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
    /// Origins allowed by CORS. `*` allows any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
        } else {
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError::new(
                    "server.bind",
                    format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                )),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                    Err(_) => errors.push(ValidationError::new(
                        "server.bind",
                        format!("invalid port '{}': must be a number 1-65535", port),
                    )),
                    Ok(_) => {}
                },
            }
        }

        if self.cors_allowed_origins.is_empty() {
            errors.push(ValidationError::new(
                "server.cors_allowed_origins",
                "at least one origin is required (use \"*\" to allow any)",
            ));
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: weather_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Maximum upstream request timeout in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 120;

/// Upstream weather API configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// OpenWeather API key.
    pub api_key: String,
    /// API root, without trailing slash.
    pub base_url: String,
    /// Latitude of the reported location.
    pub latitude: f64,
    /// Longitude of the reported location.
    pub longitude: f64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for WeatherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("latitude", &self.latitude)
            .field("longitude", &self.longitude)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl WeatherConfig {
    /// Validate weather API configuration.
    ///
    /// An empty API key is allowed; upstream calls will then fail with 401.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            errors.push(ValidationError::new(
                "weather.base_url",
                format!(
                    "base URL '{}' must start with http:// or https://",
                    self.base_url
                ),
            ));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            errors.push(ValidationError::new(
                "weather.latitude",
                format!("latitude {} must be between -90 and 90", self.latitude),
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            errors.push(ValidationError::new(
                "weather.longitude",
                format!("longitude {} must be between -180 and 180", self.longitude),
            ));
        }
        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            errors.push(ValidationError::new(
                "weather.timeout_secs",
                format!(
                    "timeout {} must be between 1 and {} seconds",
                    self.timeout_secs, MAX_TIMEOUT_SECS
                ),
            ));
        }

        errors
    }

    /// Settings for the upstream client.
    pub fn client_config(&self) -> OpenWeatherConfig {
        OpenWeatherConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Longest accepted cache TTL (30 days).
pub const MAX_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Weather cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds a cached reading stays valid.
    pub ttl_secs: u64,
    /// Seconds between expired-entry sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            sweep_interval_secs: 300,
        }
    }
}

impl CacheConfig {
    /// Validate cache configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.ttl_secs == 0 {
            errors.push(ValidationError::new(
                "cache.ttl_secs",
                "cache TTL must be at least 1 second",
            ));
        } else if self.ttl_secs > MAX_CACHE_TTL_SECS {
            errors.push(ValidationError::new(
                "cache.ttl_secs",
                format!(
                    "cache TTL {} exceeds the maximum of {} seconds",
                    self.ttl_secs, MAX_CACHE_TTL_SECS
                ),
            ));
        }
        if self.sweep_interval_secs == 0 {
            errors.push(ValidationError::new(
                "cache.sweep_interval_secs",
                "sweep interval must be at least 1 second",
            ));
        }

        errors
    }

    /// Cache TTL as a duration.
    pub fn ttl(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.ttl_secs.min(MAX_CACHE_TTL_SECS)).unwrap_or(0))
    }

    /// Sweep interval as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `cache.ttl_secs`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("weather-report")
        .join("server.toml")
}
