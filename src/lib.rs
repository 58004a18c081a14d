//! Consumer-sentiment data pipeline.
//!
//! Current implemented scope:
//! - cache-first FRED acquisition with exponential backoff on throttling
//! - month-end alignment of mixed-frequency series
//! - pct-change / YoY / moving-average / spread / lag feature matrix
//! - CSV and JSON run artifacts

mod acquire;
mod backoff;
mod cache;
mod config;
mod export;
mod features;
mod fred;
mod observability;
mod panel;
mod pipeline;
mod series;

pub use acquire::{
    acquire_series, AcquiredSeries, AcquisitionConfig, AcquisitionReport, FailureReason,
    SeriesFailure, SeriesOrigin, NO_DATA_REASON,
};
pub use backoff::{fetch_with_backoff, BackoffPolicy, Sleeper, ThreadSleeper};
pub use cache::{compute_cache_key, CacheError, CacheKey, CacheLookup, SeriesCache};
pub use config::{
    fred_api_key_from_env, pipeline_config_from_env, ConfigError, OutputPaths, PipelineConfig,
    FRED_API_KEY_ENV,
};
pub use export::{
    write_features_csv, write_panel_csv, write_summary_json, CorrelationEntry, ExportError,
    FetchErrorEntry, RunSummary,
};
pub use features::{
    build_feature_matrix, target_correlations, FeatureColumn, FeatureConfig, FeatureError,
    FeatureKind, FeatureMatrix, FeatureRow, FeatureSchema, SpreadSpec, FEATURE_SCHEMA_VERSION,
};
pub use fred::{FetchError, FredClient, FredConfig, SeriesSource, FRED_OBSERVATIONS_URL};
pub use observability::{
    init_logging, log_run_finish, log_run_start, logging_config_from_env, LogFormat,
    LoggingConfig, LoggingInitError,
};
pub use panel::{
    average_gap_days, build_monthly_panel, classify_frequency, month_end, month_end_index,
    MonthlyPanel, PanelError, SeriesFrequency, HIGH_FREQUENCY_MAX_GAP_DAYS,
    MIN_COLUMN_OBSERVATIONS,
};
pub use pipeline::{ensure_any_acquired, run_pipeline, PipelineError, PipelineOutcome};
pub use series::{
    default_series_catalog, DateRange, DateRangeError, Observation, RawSeries, SeriesSpec,
    DEFAULT_TARGET_SERIES,
};
