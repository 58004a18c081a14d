#![cfg(feature = "live-fred-tests")]

use chrono::NaiveDate;
use sentiment_pipeline::{
    fetch_with_backoff, fred_api_key_from_env, BackoffPolicy, DateRange, FredClient, FredConfig,
    SeriesSource, ThreadSleeper,
};

fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn live_client() -> FredClient {
    let api_key = fred_api_key_from_env().expect("FRED_API_KEY must be set for live tests");
    FredClient::new(FredConfig::new(api_key)).expect("client should build")
}

#[test]
fn live_fred_returns_monthly_sentiment_observations() {
    let client = live_client();
    let range = DateRange::new(d(2020, 1, 1), d(2020, 12, 31)).expect("ordered range");

    let series = fetch_with_backoff(
        &client,
        "UMCSENT",
        &range,
        &BackoffPolicy::default(),
        &ThreadSleeper,
    )
    .expect("UMCSENT should be served");

    assert_eq!(series.len(), 12);
    assert_eq!(series.first_date(), Some(d(2020, 1, 1)));
    assert_eq!(series.last_date(), Some(d(2020, 12, 1)));
    assert!(series.is_well_formed());
    assert!(series
        .observations()
        .iter()
        .all(|obs| range.contains(obs.date)));
}

#[test]
fn live_fred_rejects_unknown_series() {
    let client = live_client();
    let range = DateRange::new(d(2020, 1, 1), d(2020, 3, 31)).expect("ordered range");

    let err = client
        .fetch_series("NOT_A_REAL_SERIES_ID", &range)
        .expect_err("unknown series should fail");
    assert!(!err.is_rate_limited());
}
