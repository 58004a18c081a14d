//! FRED series-observations client.

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::series::{DateRange, Observation, RawSeries};

pub const FRED_OBSERVATIONS_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
const FRED_MISSING_VALUE: &str = ".";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited while fetching {series_id}: {message}")]
    RateLimited { series_id: String, message: String },
    #[error("HTTP request failed for {series_id}: {message}")]
    Http { series_id: String, message: String },
    #[error("API error for {series_id} (status {status}): {message}")]
    Api {
        series_id: String,
        status: u16,
        message: String,
    },
    #[error("failed to decode response for {series_id}: {message}")]
    Decode { series_id: String, message: String },
    #[error("HTTP client build error: {0}")]
    ClientBuild(String),
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Remote source of raw series. Implementations distinguish throttling
/// from every other failure through [`FetchError::RateLimited`].
pub trait SeriesSource {
    fn fetch_series(&self, series_id: &str, range: &DateRange) -> Result<RawSeries, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FredConfig {
    pub api_key: String,
    pub base_url: String,
    pub http_timeout_ms: u64,
}

impl FredConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: FRED_OBSERVATIONS_URL.to_string(),
            http_timeout_ms: 15_000,
        }
    }
}

pub struct FredClient {
    client: reqwest::blocking::Client,
    cfg: FredConfig,
}

impl FredClient {
    pub fn new(cfg: FredConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.http_timeout_ms))
            .build()
            .map_err(|err| FetchError::ClientBuild(err.to_string()))?;
        Ok(Self { client, cfg })
    }

    fn observations_url(&self, series_id: &str, range: &DateRange) -> String {
        format!(
            "{}?series_id={series_id}&api_key={}&file_type=json&observation_start={}&observation_end={}",
            self.cfg.base_url,
            self.cfg.api_key,
            range.start(),
            range.end()
        )
    }
}

impl SeriesSource for FredClient {
    fn fetch_series(&self, series_id: &str, range: &DateRange) -> Result<RawSeries, FetchError> {
        let url = self.observations_url(series_id, range);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| FetchError::Http {
                series_id: series_id.to_string(),
                message: err.without_url().to_string(),
            })?;

        let status = response.status();
        let body = response.bytes().map_err(|err| FetchError::Http {
            series_id: series_id.to_string(),
            message: err.without_url().to_string(),
        })?;

        debug!(
            component = "fred",
            event = "fred.response",
            series_id,
            status = status.as_u16(),
            bytes = body.len()
        );

        if !status.is_success() {
            return Err(classify_error_response(series_id, status.as_u16(), &body));
        }

        parse_observations(series_id, &body)
    }
}

#[derive(Debug, Deserialize)]
struct FredResponse {
    #[serde(default)]
    observations: Vec<FredObservation>,
}

#[derive(Debug, Deserialize)]
struct FredObservation {
    date: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct FredErrorBody {
    #[serde(default)]
    error_message: Option<String>,
}

pub(crate) fn parse_observations(series_id: &str, body: &[u8]) -> Result<RawSeries, FetchError> {
    let decoded: FredResponse =
        serde_json::from_slice(body).map_err(|err| FetchError::Decode {
            series_id: series_id.to_string(),
            message: err.to_string(),
        })?;

    let mut observations = Vec::with_capacity(decoded.observations.len());
    for raw in decoded.observations {
        if raw.value.trim() == FRED_MISSING_VALUE {
            continue;
        }
        let date = NaiveDate::parse_from_str(&raw.date, "%Y-%m-%d").map_err(|_| {
            FetchError::Decode {
                series_id: series_id.to_string(),
                message: format!("invalid observation date '{}'", raw.date),
            }
        })?;
        let value = raw
            .value
            .trim()
            .parse::<f64>()
            .map_err(|_| FetchError::Decode {
                series_id: series_id.to_string(),
                message: format!("invalid observation value '{}'", raw.value),
            })?;
        observations.push(Observation::new(date, value));
    }

    Ok(RawSeries::from_observations(observations))
}

pub(crate) fn classify_error_response(series_id: &str, status: u16, body: &[u8]) -> FetchError {
    let message = serde_json::from_slice::<FredErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error_message)
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    if status == 429 || mentions_rate_limit(&message) {
        FetchError::RateLimited {
            series_id: series_id.to_string(),
            message,
        }
    } else {
        FetchError::Api {
            series_id: series_id.to_string(),
            status,
            message,
        }
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("too many requests") || lowered.contains("rate limit")
}
