use sentiment_pipeline::{
    fred_api_key_from_env, init_logging, logging_config_from_env, pipeline_config_from_env,
    run_pipeline, FredClient, FredConfig, ThreadSleeper,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;

    let cfg = pipeline_config_from_env()?;
    let client = FredClient::new(FredConfig::new(fred_api_key_from_env()?))?;

    println!(
        "Consumer sentiment pipeline | series={} range={} output_root={}",
        cfg.requested_series().len(),
        cfg.range,
        cfg.paths.root.display()
    );

    let outcome = run_pipeline(&cfg, &client, &ThreadSleeper)?;
    let summary = &outcome.summary;

    println!(
        "\nData fetching complete: {}/{} successful (cache hits={}, API calls={})",
        summary.indicators_fetched,
        summary.indicators_requested,
        summary.cache_hits,
        summary.api_calls
    );
    for failure in &summary.fetch_errors {
        println!("  failed {} | {}", failure.series_id, failure.reason);
    }
    println!(
        "Monthly panel: {} rows x {} columns",
        summary.monthly_data_shape[0], summary.monthly_data_shape[1]
    );
    println!(
        "Feature matrix: {} rows x {} columns",
        summary.features_shape[0], summary.features_shape[1]
    );
    if !summary.top_correlations.is_empty() {
        println!("Top correlations with {}:", cfg.features.target_column);
        for entry in &summary.top_correlations {
            println!("  {:<14} {:+.4}", entry.series_id, entry.correlation);
        }
    }
    println!("Summary written to {}", cfg.paths.summary_json().display());

    Ok(())
}
