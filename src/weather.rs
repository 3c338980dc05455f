use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::WeatherConfig;
use crate::error::LookupError;

/// Anything that can turn a city name into a one-line temperature report.
#[async_trait]
pub trait WeatherLookup: Send + Sync {
    async fn lookup(&self, city: &str) -> Result<String, LookupError>;
}

#[derive(Debug, Default, Deserialize)]
struct WeatherResponse {
    #[serde(default)]
    current: Current,
    #[serde(default)]
    location: Location,
}

#[derive(Debug, Default, Deserialize)]
struct Current {
    #[serde(default)]
    temperature: i64,
}

#[derive(Debug, Default, Deserialize)]
struct Location {
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
}

/// A single temperature reading, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherResult {
    pub location: String,
    pub country: String,
    pub temperature: i64,
}

impl std::fmt::Display for WeatherResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Temperature in {}, {}: {}°C",
            self.location, self.country, self.temperature
        )
    }
}

/// Weatherstack `current` endpoint client.
pub struct WeatherClient {
    client: reqwest::Client,
    config: WeatherConfig,
}

impl WeatherClient {
    pub fn new(client: reqwest::Client, config: WeatherConfig) -> Self {
        Self { client, config }
    }

    /// Fetch the current reading. `city` is embedded in the query string as given,
    /// so callers pass it already joined (e.g. `Cape+Town`).
    pub async fn current(&self, city: &str) -> Result<WeatherResult, LookupError> {
        if self.config.api_key.is_empty() {
            return Err(LookupError::Config);
        }

        let url = format!(
            "{}/current?access_key={}&query={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_key,
            city
        );

        debug!("Requesting current weather for {}", city);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Upstream(status));
        }

        let body = response.text().await?;
        let parsed: WeatherResponse =
            serde_json::from_str(&body).map_err(|e| LookupError::Data(e.to_string()))?;

        if parsed.location.name.is_empty() {
            return Err(LookupError::Data(format!("no location named in response for {}", city)));
        }

        Ok(WeatherResult {
            location: parsed.location.name,
            country: parsed.location.country,
            temperature: parsed.current.temperature,
        })
    }
}

#[async_trait]
impl WeatherLookup for WeatherClient {
    async fn lookup(&self, city: &str) -> Result<String, LookupError> {
        Ok(self.current(city).await?.to_string())
    }
}
