//! CSV tables and the JSON run summary.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::acquire::AcquisitionReport;
use crate::features::FeatureMatrix;
use crate::panel::MonthlyPanel;

const TOP_CORRELATIONS: usize = 10;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchErrorEntry {
    pub series_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationEntry {
    pub series_id: String,
    pub correlation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub execution_time: String,
    pub indicators_requested: usize,
    pub indicators_fetched: usize,
    pub cache_hits: u64,
    pub api_calls: u64,
    pub fetch_errors: Vec<FetchErrorEntry>,
    pub monthly_data_shape: [usize; 2],
    pub features_shape: [usize; 2],
    pub date_range: Option<[NaiveDate; 2]>,
    pub feature_schema_fingerprint: String,
    pub top_correlations: Vec<CorrelationEntry>,
}

impl RunSummary {
    pub fn build(
        execution_time: String,
        report: &AcquisitionReport,
        panel: &MonthlyPanel,
        matrix: &FeatureMatrix,
        correlations: &[(String, f64)],
    ) -> Self {
        let (panel_rows, panel_cols) = panel.shape();
        let (feature_rows, feature_cols) = matrix.shape();
        Self {
            execution_time,
            indicators_requested: report.requested,
            indicators_fetched: report.succeeded(),
            cache_hits: report.cache_hits,
            api_calls: report.api_calls,
            fetch_errors: report
                .failures
                .iter()
                .map(|failure| FetchErrorEntry {
                    series_id: failure.id.clone(),
                    reason: failure.reason.message().to_string(),
                })
                .collect(),
            monthly_data_shape: [panel_rows, panel_cols],
            features_shape: [feature_rows, feature_cols],
            date_range: panel.date_range().map(|(start, end)| [start, end]),
            feature_schema_fingerprint: matrix.schema.fingerprint.clone(),
            top_correlations: correlations
                .iter()
                .take(TOP_CORRELATIONS)
                .map(|(series_id, correlation)| CorrelationEntry {
                    series_id: series_id.clone(),
                    correlation: *correlation,
                })
                .collect(),
        }
    }
}

pub fn write_panel_csv(path: &Path, panel: &MonthlyPanel) -> Result<(), ExportError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["date".to_string()];
    header.extend(panel.columns().iter().cloned());
    writer.write_record(&header)?;

    for (row_idx, date) in panel.index().iter().enumerate() {
        let mut record = vec![date.to_string()];
        if let Some(values) = panel.row(row_idx) {
            record.extend(values.iter().map(f64::to_string));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(
        component = "export",
        event = "export.panel.written",
        path = %path.display(),
        rows = panel.index().len()
    );
    Ok(())
}

pub fn write_features_csv(path: &Path, matrix: &FeatureMatrix) -> Result<(), ExportError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["date".to_string()];
    header.extend(matrix.schema.columns.iter().map(|column| column.name.clone()));
    writer.write_record(&header)?;

    for row in &matrix.rows {
        let mut record = vec![row.date.to_string()];
        record.extend(row.values.iter().map(f64::to_string));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(
        component = "export",
        event = "export.features.written",
        path = %path.display(),
        rows = matrix.rows.len()
    );
    Ok(())
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<(), ExportError> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;

    info!(
        component = "export",
        event = "export.summary.written",
        path = %path.display()
    );
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{build_feature_matrix, FeatureConfig};
    use crate::panel::build_monthly_panel;
    use crate::series::RawSeries;
    use tempfile::tempdir;

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn sample_panel() -> MonthlyPanel {
        let a = RawSeries::from_pairs(vec![
            (d(2020, 1, 31), 1.0),
            (d(2020, 2, 29), 2.0),
            (d(2020, 3, 31), 4.0),
        ]);
        let b = RawSeries::from_pairs(vec![
            (d(2020, 1, 31), 10.0),
            (d(2020, 2, 29), 20.0),
            (d(2020, 3, 31), 25.0),
        ]);
        build_monthly_panel(&[("A", &a), ("B", &b)]).unwrap()
    }

    #[test]
    fn panel_csv_has_date_column_and_one_row_per_month() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("monthly.csv");
        write_panel_csv(&path, &sample_panel()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date,A,B");
        assert_eq!(lines[1], "2020-01-31,1,10");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn features_csv_matches_schema_order() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("features.csv");
        let cfg = FeatureConfig {
            target_column: "A".to_string(),
            lags: vec![1],
            yoy_periods: 1,
            ..FeatureConfig::default()
        };
        let matrix = build_feature_matrix(&sample_panel(), &cfg).unwrap();
        write_features_csv(&path, &matrix).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), matrix.schema.columns.len() + 1);
        assert_eq!(&headers[0], "date");
        assert_eq!(&headers[headers.len() - 1], "A_lag1");
        assert_eq!(reader.records().count(), matrix.rows.len());
    }
}
