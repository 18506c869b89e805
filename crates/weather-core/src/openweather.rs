//! HTTP client for the OpenWeather One Call 3.0 API.
//!
//! # Example
//!
//! ```no_run
//! use weather_core::{OpenWeatherClient, OpenWeatherConfig, WeatherSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenWeatherClient::new(OpenWeatherConfig {
//!     api_key: "your-api-key".to_string(),
//!     ..Default::default()
//! })?;
//!
//! let reading = client.current().await?;
//! println!("{:.1} °C, {} % clouds", reading.temperature, reading.cloud_cover);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::debug;

use weather_types::WeatherReading;

use crate::error::{Error, Result};
use crate::source::WeatherSource;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/3.0";

/// Changi Airport, Singapore.
pub const DEFAULT_LATITUDE: f64 = 1.3586;
pub const DEFAULT_LONGITUDE: f64 = 103.9899;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for [`OpenWeatherClient`].
#[derive(Clone)]
pub struct OpenWeatherConfig {
    pub api_key: String,
    pub base_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timeout: Duration,
}

impl Default for OpenWeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for OpenWeatherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("latitude", &self.latitude)
            .field("longitude", &self.longitude)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ==========================================================================
// Response Types
// ==========================================================================

/// Measurements shared by the current and time-machine payloads.
#[derive(Debug, Deserialize)]
struct Conditions {
    temp: f64,
    pressure: f64,
    humidity: f64,
    clouds: f64,
}

impl From<Conditions> for WeatherReading {
    fn from(c: Conditions) -> Self {
        WeatherReading::new(c.temp, c.pressure, c.humidity, c.clouds)
    }
}

#[derive(Debug, Deserialize)]
struct OneCallResponse {
    current: Conditions,
}

#[derive(Debug, Deserialize)]
struct TimeMachineResponse {
    #[serde(default)]
    data: Vec<Conditions>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ==========================================================================
// OpenWeatherClient Implementation
// ==========================================================================

/// [`WeatherSource`] backed by the OpenWeather HTTP API.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    config: OpenWeatherConfig,
}

impl OpenWeatherClient {
    /// Create a client. Fails if the base URL is not http(s).
    pub fn new(config: OpenWeatherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Self::with_client(config, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(mut config: OpenWeatherConfig, client: Client) -> Result<Self> {
        config.base_url = config.base_url.trim_end_matches('/').to_string();

        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "base URL must start with http:// or https://, got: {}",
                config.base_url
            )));
        }

        Ok(Self { client, config })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, extra: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.config.base_url, path);
        debug!(%url, "Requesting weather data");

        let mut query = vec![
            ("lat", self.config.latitude.to_string()),
            ("lon", self.config.longitude.to_string()),
            ("appid", self.config.api_key.clone()),
            ("units", "metric".to_string()),
        ];
        query.extend(extra.iter().map(|(k, v)| (*k, v.clone())));

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                url: url.clone(),
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::UpstreamUnavailable {
            url: url.clone(),
            message: e.without_url().to_string(),
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or(body);
            return Err(Error::UpstreamBadStatus {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::UpstreamDecodeError(e.to_string()))
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn current(&self) -> Result<WeatherReading> {
        let response: OneCallResponse = self.get("/onecall", &[]).await?;
        Ok(response.current.into())
    }

    async fn historical(&self, at: OffsetDateTime) -> Result<WeatherReading> {
        let dt = at.unix_timestamp();
        let response: TimeMachineResponse = self
            .get("/onecall/timemachine", &[("dt", dt.to_string())])
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(WeatherReading::from)
            .ok_or(Error::NoHistoricalData(dt))
    }
}
