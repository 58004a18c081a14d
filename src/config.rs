//! Run configuration passed explicitly into the pipeline.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use crate::acquire::AcquisitionConfig;
use crate::backoff::BackoffPolicy;
use crate::features::FeatureConfig;
use crate::series::{default_series_catalog, DateRange, DateRangeError, SeriesSpec};

pub const FRED_API_KEY_ENV: &str = "FRED_API_KEY";
const DEFAULT_SERIES_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingApiKey(&'static str),
    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
    #[error(transparent)]
    DateRange(#[from] DateRangeError),
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub root: PathBuf,
    pub cache_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub summary_dir: PathBuf,
}

impl OutputPaths {
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cache_dir: root.join("data_outputs").join("cache"),
            processed_dir: root.join("data_outputs").join("processed_data"),
            summary_dir: root.join("results").join("summary_tables"),
            root,
        }
    }

    pub fn monthly_csv(&self) -> PathBuf {
        self.processed_dir.join("monthly_data.csv")
    }

    pub fn features_csv(&self) -> PathBuf {
        self.processed_dir.join("features.csv")
    }

    pub fn summary_json(&self) -> PathBuf {
        self.summary_dir.join("run_summary.json")
    }

    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.cache_dir, &self.processed_dir, &self.summary_dir] {
            create_dir(dir)?;
        }
        Ok(())
    }
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self::under(".")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub series: Vec<SeriesSpec>,
    pub series_limit: Option<usize>,
    pub range: DateRange,
    pub backoff: BackoffPolicy,
    pub request_delay: Duration,
    pub paths: OutputPaths,
    pub features: FeatureConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            series: default_series_catalog(),
            series_limit: Some(DEFAULT_SERIES_LIMIT),
            range: default_range(),
            backoff: BackoffPolicy::default(),
            request_delay: Duration::from_millis(250),
            paths: OutputPaths::default(),
            features: FeatureConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Requested series after applying `series_limit`.
    pub fn requested_series(&self) -> &[SeriesSpec] {
        match self.series_limit {
            Some(limit) => &self.series[..limit.min(self.series.len())],
            None => &self.series,
        }
    }

    pub fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            backoff: self.backoff,
            request_delay: self.request_delay,
        }
    }
}

pub fn pipeline_config_from_env() -> Result<PipelineConfig, ConfigError> {
    let mut config = PipelineConfig::default();

    let start = match read_env("SENTIMENT_START_DATE") {
        Some(raw) => parse_date("SENTIMENT_START_DATE", &raw)?,
        None => config.range.start(),
    };
    let end = match read_env("SENTIMENT_END_DATE") {
        Some(raw) => parse_date("SENTIMENT_END_DATE", &raw)?,
        None => config.range.end(),
    };
    config.range = DateRange::new(start, end)?;

    if let Some(raw) = read_env("SENTIMENT_SERIES") {
        config.series = parse_series_list(&raw);
        if config.series.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "SENTIMENT_SERIES",
                value: raw,
            });
        }
    }

    if let Some(raw) = read_env("SENTIMENT_SERIES_LIMIT") {
        config.series_limit = match raw.to_ascii_lowercase().as_str() {
            "all" | "none" | "0" => None,
            _ => Some(parse_number("SENTIMENT_SERIES_LIMIT", &raw)?),
        };
    }

    if let Some(raw) = read_env("SENTIMENT_REQUEST_DELAY_MS") {
        config.request_delay =
            Duration::from_millis(parse_number("SENTIMENT_REQUEST_DELAY_MS", &raw)?);
    }
    if let Some(raw) = read_env("SENTIMENT_BACKOFF_BASE_MS") {
        config.backoff.base_delay =
            Duration::from_millis(parse_number("SENTIMENT_BACKOFF_BASE_MS", &raw)?);
    }
    if let Some(raw) = read_env("SENTIMENT_MAX_ATTEMPTS") {
        let attempts: u32 = parse_number("SENTIMENT_MAX_ATTEMPTS", &raw)?;
        if attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SENTIMENT_MAX_ATTEMPTS",
                value: raw,
            });
        }
        config.backoff.max_attempts = attempts;
    }

    if let Some(raw) = read_env("SENTIMENT_OUTPUT_ROOT") {
        config.paths = OutputPaths::under(raw);
    }
    if let Some(raw) = read_env("SENTIMENT_TARGET") {
        config.features.target_column = raw;
    }
    if let Some(raw) = read_env("SENTIMENT_LAGS") {
        config.features.lags = parse_lags(&raw)?;
    }

    Ok(config)
}

pub fn fred_api_key_from_env() -> Result<String, ConfigError> {
    read_env(FRED_API_KEY_ENV).ok_or(ConfigError::MissingApiKey(FRED_API_KEY_ENV))
}

fn default_range() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(1990, 1, 1).expect("valid default start date"),
        NaiveDate::from_ymd_opt(2025, 5, 31).expect("valid default end date"),
    )
    .expect("default range should be ordered")
}

fn read_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_date(name: &'static str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ConfigError::InvalidValue {
        name,
        value: raw.to_string(),
    })
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        name,
        value: raw.to_string(),
    })
}

/// `ID` or `ID=Description`, comma separated. Repeated ids keep the first entry.
fn parse_series_list(raw: &str) -> Vec<SeriesSpec> {
    let catalog = default_series_catalog();
    let mut seen = HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once('=') {
            Some((id, description)) => SeriesSpec::new(id.trim(), description.trim()),
            None => {
                let description = catalog
                    .iter()
                    .find(|spec| spec.id == item)
                    .map(|spec| spec.description.clone())
                    .unwrap_or_else(|| item.to_string());
                SeriesSpec::new(item, description)
            }
        })
        .filter(|spec| seen.insert(spec.id.clone()))
        .collect()
}

fn parse_lags(raw: &str) -> Result<Vec<u32>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_number("SENTIMENT_LAGS", item))
        .collect()
}

fn create_dir(path: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(path).map_err(|source| ConfigError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}
