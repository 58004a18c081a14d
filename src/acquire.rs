//! Cache-first acquisition of every requested series with per-series
//! outcome bookkeeping. One series failing never aborts the batch.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backoff::{fetch_with_backoff, BackoffPolicy, Sleeper};
use crate::cache::{compute_cache_key, SeriesCache};
use crate::fred::SeriesSource;
use crate::series::{DateRange, RawSeries, SeriesSpec};

pub const NO_DATA_REASON: &str = "No data in date range";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionConfig {
    pub backoff: BackoffPolicy,
    /// Pause before each live call once one live call has succeeded.
    pub request_delay: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            request_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesOrigin {
    Cached,
    Fetched,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredSeries {
    pub id: String,
    pub description: String,
    pub origin: SeriesOrigin,
    pub series: RawSeries,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    NoData,
    FetchFailed(String),
}

impl FailureReason {
    pub fn message(&self) -> &str {
        match self {
            Self::NoData => NO_DATA_REASON,
            Self::FetchFailed(message) => message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesFailure {
    pub id: String,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionReport {
    pub requested: usize,
    pub series: Vec<AcquiredSeries>,
    pub failures: Vec<SeriesFailure>,
    pub cache_hits: u64,
    pub api_calls: u64,
}

impl AcquisitionReport {
    pub fn get(&self, id: &str) -> Option<&RawSeries> {
        self.series
            .iter()
            .find(|acquired| acquired.id == id)
            .map(|acquired| &acquired.series)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.series.len()
    }

    /// Identifier/series pairs in request order.
    pub fn columns(&self) -> Vec<(&str, &RawSeries)> {
        self.series
            .iter()
            .map(|acquired| (acquired.id.as_str(), &acquired.series))
            .collect()
    }
}

pub fn acquire_series(
    specs: &[SeriesSpec],
    range: &DateRange,
    cfg: &AcquisitionConfig,
    cache: &SeriesCache,
    source: &dyn SeriesSource,
    sleeper: &dyn Sleeper,
) -> AcquisitionReport {
    let total = specs.len();
    let mut report = AcquisitionReport {
        requested: total,
        ..AcquisitionReport::default()
    };

    info!(
        component = "acquire",
        event = "acquire.start",
        requested = total,
        range = %range,
        cache_dir = %cache.dir().display()
    );

    for (idx, spec) in specs.iter().enumerate() {
        let position = idx + 1;
        let key = compute_cache_key(&spec.id, range);

        if let Some(series) = cache.load(&key) {
            report.cache_hits += 1;
            info!(
                component = "acquire",
                event = "acquire.series.cached",
                position,
                total,
                series_id = %spec.id,
                description = %spec.description,
                observations = series.len()
            );
            report.series.push(AcquiredSeries {
                id: spec.id.clone(),
                description: spec.description.clone(),
                origin: SeriesOrigin::Cached,
                series,
            });
            continue;
        }

        if report.api_calls > 0 && !cfg.request_delay.is_zero() {
            sleeper.sleep(cfg.request_delay);
        }

        match fetch_with_backoff(source, &spec.id, range, &cfg.backoff, sleeper) {
            Ok(series) => {
                report.api_calls += 1;
                if series.is_empty() {
                    warn!(
                        component = "acquire",
                        event = "acquire.series.empty",
                        position,
                        total,
                        series_id = %spec.id,
                        description = %spec.description
                    );
                    report.failures.push(SeriesFailure {
                        id: spec.id.clone(),
                        reason: FailureReason::NoData,
                    });
                    continue;
                }

                let cached = cache.save(&key, &series);
                info!(
                    component = "acquire",
                    event = "acquire.series.fetched",
                    position,
                    total,
                    series_id = %spec.id,
                    description = %spec.description,
                    observations = series.len(),
                    cached
                );
                report.series.push(AcquiredSeries {
                    id: spec.id.clone(),
                    description: spec.description.clone(),
                    origin: SeriesOrigin::Fetched,
                    series,
                });
            }
            Err(err) => {
                warn!(
                    component = "acquire",
                    event = "acquire.series.failed",
                    position,
                    total,
                    series_id = %spec.id,
                    description = %spec.description,
                    error = %err
                );
                report.failures.push(SeriesFailure {
                    id: spec.id.clone(),
                    reason: FailureReason::FetchFailed(err.to_string()),
                });
            }
        }
    }

    info!(
        component = "acquire",
        event = "acquire.finish",
        requested = report.requested,
        succeeded = report.succeeded(),
        failed = report.failures.len(),
        cache_hits = report.cache_hits,
        api_calls = report.api_calls
    );

    report
}
