use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use sentiment_pipeline::{
    acquire_series, compute_cache_key, run_pipeline, AcquisitionConfig, BackoffPolicy, DateRange,
    FeatureConfig, FetchError, OutputPaths, PipelineConfig, PipelineError, RawSeries,
    SeriesCache, SeriesOrigin, SeriesSource, SeriesSpec, Sleeper,
};
use tempfile::tempdir;

#[derive(Default)]
struct RecordingSleeper {
    slept: RefCell<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

#[derive(Default)]
struct ScriptedSource {
    responses: HashMap<String, RawSeries>,
    rate_limited: RefCell<HashMap<String, u32>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedSource {
    fn with(mut self, id: &str, series: RawSeries) -> Self {
        self.responses.insert(id.to_string(), series);
        self
    }

    fn rate_limited_first(self, id: &str, times: u32) -> Self {
        self.rate_limited.borrow_mut().insert(id.to_string(), times);
        self
    }

    fn calls_for(&self, id: &str) -> usize {
        self.calls.borrow().iter().filter(|call| *call == id).count()
    }
}

impl SeriesSource for ScriptedSource {
    fn fetch_series(&self, series_id: &str, _range: &DateRange) -> Result<RawSeries, FetchError> {
        self.calls.borrow_mut().push(series_id.to_string());

        if let Some(remaining) = self.rate_limited.borrow_mut().get_mut(series_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FetchError::RateLimited {
                    series_id: series_id.to_string(),
                    message: "Too Many Requests".to_string(),
                });
            }
        }

        self.responses
            .get(series_id)
            .cloned()
            .ok_or_else(|| FetchError::Api {
                series_id: series_id.to_string(),
                status: 400,
                message: "Bad Request. The series does not exist.".to_string(),
            })
    }
}

fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn first_half_2020() -> DateRange {
    DateRange::new(d(2020, 1, 1), d(2020, 6, 30)).expect("ordered range")
}

fn month_end_series(start: NaiveDate, months: usize, value_at: impl Fn(usize) -> f64) -> RawSeries {
    RawSeries::from_pairs((0..months).map(|idx| {
        let month0 = start.month0() as usize + idx;
        let year = start.year() + (month0 / 12) as i32;
        let month = (month0 % 12) as u32 + 1;
        let next = if month == 12 {
            d(year + 1, 1, 1)
        } else {
            d(year, month + 1, 1)
        };
        (next.pred_opt().expect("previous day"), value_at(idx))
    }))
}

#[test]
fn cached_series_and_throttled_series_are_both_acquired() {
    let temp = tempdir().expect("temp dir");
    let cache = SeriesCache::new(temp.path().join("cache"));
    let range = first_half_2020();

    let a = month_end_series(d(2020, 1, 1), 6, |idx| 90.0 + idx as f64);
    let b = month_end_series(d(2020, 1, 1), 6, |idx| 1.5 + idx as f64 * 0.1);
    assert!(cache.save(&compute_cache_key("A", &range), &a));

    let source = ScriptedSource::default()
        .with("A", a.clone())
        .with("B", b.clone())
        .rate_limited_first("B", 1);
    let sleeper = RecordingSleeper::default();
    let specs = vec![SeriesSpec::new("A", "alpha"), SeriesSpec::new("B", "beta")];

    let report = acquire_series(
        &specs,
        &range,
        &AcquisitionConfig::default(),
        &cache,
        &source,
        &sleeper,
    );

    assert_eq!(report.cache_hits, 1);
    assert_eq!(report.api_calls, 1);
    assert!(report.failures.is_empty());
    assert_eq!(report.get("A"), Some(&a));
    assert_eq!(report.get("B"), Some(&b));
    assert_eq!(report.series[0].origin, SeriesOrigin::Cached);
    assert_eq!(report.series[1].origin, SeriesOrigin::Fetched);

    assert_eq!(source.calls_for("A"), 0);
    assert_eq!(source.calls_for("B"), 2);
    assert_eq!(*sleeper.slept.borrow(), vec![Duration::from_secs(1)]);
    assert_eq!(cache.load(&compute_cache_key("B", &range)), Some(b));
}

#[test]
fn exhausted_throttling_is_recorded_and_the_loop_continues() {
    let temp = tempdir().expect("temp dir");
    let cache = SeriesCache::new(temp.path());
    let range = first_half_2020();
    let c = month_end_series(d(2020, 1, 1), 6, |idx| idx as f64 + 1.0);

    let source = ScriptedSource::default()
        .with("B", RawSeries::empty())
        .with("C", c)
        .rate_limited_first("B", 10);
    let sleeper = RecordingSleeper::default();
    let specs = vec![SeriesSpec::new("B", "beta"), SeriesSpec::new("C", "gamma")];

    let report = acquire_series(
        &specs,
        &range,
        &AcquisitionConfig::default(),
        &cache,
        &source,
        &sleeper,
    );

    assert_eq!(source.calls_for("B"), 5);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].id, "B");
    assert!(report.failures[0].reason.message().contains("rate limited"));
    assert!(report.contains("C"));
    assert_eq!(report.api_calls, 1);
}

#[test]
fn run_pipeline_writes_artifacts_and_summary() {
    let temp = tempdir().expect("temp dir");
    let range = DateRange::new(d(2018, 1, 1), d(2019, 12, 31)).expect("ordered range");
    let source = ScriptedSource::default()
        .with(
            "A",
            month_end_series(d(2018, 1, 1), 24, |idx| 80.0 + (idx % 5) as f64),
        )
        .with(
            "B",
            month_end_series(d(2018, 1, 1), 24, |idx| 3.0 + idx as f64 * 0.25),
        );
    let sleeper = RecordingSleeper::default();

    let cfg = PipelineConfig {
        series: vec![
            SeriesSpec::new("A", "alpha"),
            SeriesSpec::new("B", "beta"),
            SeriesSpec::new("MISSING", "not served"),
        ],
        series_limit: None,
        range,
        backoff: BackoffPolicy {
            base_delay: Duration::from_millis(1),
            max_attempts: 5,
        },
        request_delay: Duration::ZERO,
        paths: OutputPaths::under(temp.path()),
        features: FeatureConfig {
            target_column: "A".to_string(),
            lags: vec![1, 3],
            ..FeatureConfig::default()
        },
    };

    let outcome = run_pipeline(&cfg, &source, &sleeper).expect("pipeline should succeed");

    assert_eq!(outcome.panel.shape(), (24, 2));
    assert_eq!(outcome.matrix.rows.len(), 12);
    assert_eq!(outcome.summary.indicators_requested, 3);
    assert_eq!(outcome.summary.indicators_fetched, 2);
    assert_eq!(outcome.summary.fetch_errors.len(), 1);
    assert_eq!(outcome.summary.fetch_errors[0].series_id, "MISSING");
    assert_eq!(outcome.summary.top_correlations.len(), 1);
    assert_eq!(outcome.summary.top_correlations[0].series_id, "B");

    assert!(cfg.paths.monthly_csv().is_file());
    assert!(cfg.paths.features_csv().is_file());
    let summary: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(cfg.paths.summary_json()).expect("summary file"),
    )
    .expect("summary json");
    assert_eq!(summary["api_calls"], 2);
    assert_eq!(summary["cache_hits"], 0);
    assert_eq!(summary["monthly_data_shape"], serde_json::json!([24, 2]));
    assert_eq!(
        summary["date_range"],
        serde_json::json!(["2018-01-31", "2019-12-31"])
    );

    let rerun = run_pipeline(&cfg, &source, &sleeper).expect("rerun should succeed");
    assert_eq!(rerun.report.cache_hits, 2);
    assert_eq!(rerun.report.api_calls, 0);
    assert_eq!(rerun.matrix, outcome.matrix);
}

#[test]
fn pipeline_fails_when_nothing_is_acquired() {
    let temp = tempdir().expect("temp dir");
    let source = ScriptedSource::default();
    let sleeper = RecordingSleeper::default();
    let cfg = PipelineConfig {
        series: vec![SeriesSpec::new("X", "x"), SeriesSpec::new("Y", "y")],
        series_limit: None,
        range: first_half_2020(),
        paths: OutputPaths::under(temp.path()),
        ..PipelineConfig::default()
    };

    let err = run_pipeline(&cfg, &source, &sleeper).expect_err("nothing acquired");
    assert!(matches!(err, PipelineError::NothingAcquired { requested: 2 }));
    assert!(!cfg.paths.features_csv().exists());
}
