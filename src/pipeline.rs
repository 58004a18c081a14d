//! End-to-end run: acquire, align, build features, write artifacts.

use chrono::Local;
use thiserror::Error;
use tracing::error;

use crate::acquire::{acquire_series, AcquisitionReport};
use crate::backoff::Sleeper;
use crate::cache::SeriesCache;
use crate::config::{ConfigError, PipelineConfig};
use crate::export::{
    write_features_csv, write_panel_csv, write_summary_json, ExportError, RunSummary,
};
use crate::features::{build_feature_matrix, target_correlations, FeatureError, FeatureMatrix};
use crate::fred::SeriesSource;
use crate::observability::{log_run_finish, log_run_start};
use crate::panel::{build_monthly_panel, MonthlyPanel, PanelError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no series acquired out of {requested} requested")]
    NothingAcquired { requested: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("panel construction failed: {0}")]
    Panel(#[from] PanelError),
    #[error("feature construction failed: {0}")]
    Features(#[from] FeatureError),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub report: AcquisitionReport,
    pub panel: MonthlyPanel,
    pub matrix: FeatureMatrix,
    pub summary: RunSummary,
}

pub fn ensure_any_acquired(report: &AcquisitionReport) -> Result<(), PipelineError> {
    if report.is_empty() {
        error!(
            component = "pipeline",
            event = "pipeline.nothing_acquired",
            requested = report.requested,
            failed = report.failures.len()
        );
        return Err(PipelineError::NothingAcquired {
            requested: report.requested,
        });
    }
    Ok(())
}

pub fn run_pipeline(
    cfg: &PipelineConfig,
    source: &dyn SeriesSource,
    sleeper: &dyn Sleeper,
) -> Result<PipelineOutcome, PipelineError> {
    log_run_start(cfg);
    cfg.paths.ensure_dirs()?;

    let cache = SeriesCache::new(&cfg.paths.cache_dir);
    let report = acquire_series(
        cfg.requested_series(),
        &cfg.range,
        &cfg.acquisition(),
        &cache,
        source,
        sleeper,
    );
    ensure_any_acquired(&report)?;

    let panel = build_monthly_panel(&report.columns())?;
    let matrix = build_feature_matrix(&panel, &cfg.features)?;
    let correlations = target_correlations(&panel, &cfg.features.target_column);

    write_panel_csv(&cfg.paths.monthly_csv(), &panel)?;
    write_features_csv(&cfg.paths.features_csv(), &matrix)?;

    let summary = RunSummary::build(
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        &report,
        &panel,
        &matrix,
        &correlations,
    );
    write_summary_json(&cfg.paths.summary_json(), &summary)?;
    log_run_finish(&summary);

    Ok(PipelineOutcome {
        report,
        panel,
        matrix,
        summary,
    })
}
