use reqwest::StatusCode;
use thiserror::Error;

/// Why a weather lookup failed.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("WEATHER_API_KEY is not set")]
    Config,

    #[error("weather request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("weather API returned status {0}")]
    Upstream(StatusCode),

    /// The provider answered but the body did not name a location.
    #[error("could not find location data in weather response: {0}")]
    Data(String),
}

/// Why a persona question could not be answered.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("GEMINI_API_KEY is not set")]
    Config,

    #[error("Gemini request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Gemini API error ({status}): {body}")]
    Upstream { status: StatusCode, body: String },

    #[error("received empty response from Gemini API")]
    EmptyResponse,
}
