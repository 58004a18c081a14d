//! Monthly panel to feature matrix transform.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::panel::MonthlyPanel;
use crate::series::DEFAULT_TARGET_SERIES;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadSpec {
    pub name: String,
    pub long: String,
    pub short: String,
}

impl SpreadSpec {
    pub fn new(name: impl Into<String>, long: impl Into<String>, short: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            long: long.into(),
            short: short.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub target_column: String,
    pub lags: Vec<u32>,
    pub moving_average_window: usize,
    pub yoy_periods: usize,
    pub spreads: Vec<SpreadSpec>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            target_column: DEFAULT_TARGET_SERIES.to_string(),
            lags: vec![1, 3, 6, 12],
            moving_average_window: 3,
            yoy_periods: 12,
            spreads: vec![SpreadSpec::new("yield_curve_spread", "GS10", "FEDFUNDS")],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    Level,
    PctChange,
    YearOverYear,
    MovingAverage,
    Spread,
    Lag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: FeatureKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub schema: FeatureSchema,
    pub rows: Vec<FeatureRow>,
    pub dropped_rows: usize,
}

impl FeatureMatrix {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema
            .columns
            .iter()
            .position(|column| column.name == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row.values[idx]).collect())
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|row| row.date).collect()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.schema.columns.len())
    }
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("invalid feature config: {0}")]
    InvalidConfig(String),
    #[error("monthly panel has no rows")]
    EmptyPanel,
}

pub fn build_feature_matrix(
    panel: &MonthlyPanel,
    cfg: &FeatureConfig,
) -> Result<FeatureMatrix, FeatureError> {
    validate_config(cfg)?;
    let (row_count, _) = panel.shape();
    if row_count == 0 {
        return Err(FeatureError::EmptyPanel);
    }

    let mut columns: Vec<FeatureColumn> = Vec::new();
    let mut values: Vec<Vec<Option<f64>>> = Vec::new();
    let mut push = |name: String, kind: FeatureKind, column: Vec<Option<f64>>| {
        columns.push(FeatureColumn { name, kind });
        values.push(column);
    };

    let levels: Vec<(&str, &[f64])> = panel
        .columns()
        .iter()
        .filter_map(|name| Some((name.as_str(), panel.column(name)?)))
        .collect();

    for (name, column) in &levels {
        push(
            name.to_string(),
            FeatureKind::Level,
            column.iter().copied().map(Some).collect(),
        );
    }
    for (name, column) in &levels {
        push(format!("{name}_pct"), FeatureKind::PctChange, pct_change(column, 1));
    }
    for (name, column) in &levels {
        push(
            format!("{name}_yoy"),
            FeatureKind::YearOverYear,
            pct_change(column, cfg.yoy_periods),
        );
    }
    for (name, column) in &levels {
        push(
            format!("{name}_ma{}", cfg.moving_average_window),
            FeatureKind::MovingAverage,
            trailing_mean(column, cfg.moving_average_window),
        );
    }
    for spread in &cfg.spreads {
        if let (Some(long), Some(short)) = (panel.column(&spread.long), panel.column(&spread.short))
        {
            push(
                spread.name.clone(),
                FeatureKind::Spread,
                long.iter().zip(short).map(|(l, s)| Some(l - s)).collect(),
            );
        }
    }
    match panel.column(&cfg.target_column) {
        Some(target) => {
            for lag in &cfg.lags {
                push(
                    format!("{}_lag{lag}", cfg.target_column),
                    FeatureKind::Lag,
                    shift(target, *lag as usize),
                );
            }
        }
        None => warn!(
            component = "features",
            event = "features.target.missing",
            target = %cfg.target_column
        ),
    }

    let mut rows = Vec::with_capacity(row_count);
    for (row_idx, date) in panel.index().iter().enumerate() {
        let row: Option<Vec<f64>> = values.iter().map(|column| column[row_idx]).collect();
        if let Some(row_values) = row {
            rows.push(FeatureRow {
                date: *date,
                values: row_values,
            });
        }
    }

    let fingerprint = schema_fingerprint(cfg, &columns);
    let dropped_rows = row_count - rows.len();
    if rows.is_empty() {
        warn!(
            component = "features",
            event = "features.matrix.empty",
            panel_rows = row_count,
            column_count = columns.len()
        );
    }

    info!(
        component = "features",
        event = "features.matrix.built",
        version = FEATURE_SCHEMA_VERSION,
        panel_rows = row_count,
        output_rows = rows.len(),
        dropped_rows,
        column_count = columns.len(),
        fingerprint = %fingerprint
    );

    Ok(FeatureMatrix {
        schema: FeatureSchema {
            version: FEATURE_SCHEMA_VERSION,
            fingerprint,
            columns,
        },
        rows,
        dropped_rows,
    })
}

/// Pearson correlation of every other panel column with `target`, highest
/// first. Constant columns are left out.
pub fn target_correlations(panel: &MonthlyPanel, target: &str) -> Vec<(String, f64)> {
    let Some(target_values) = panel.column(target) else {
        return Vec::new();
    };

    let mut out: Vec<(String, f64)> = panel
        .columns()
        .iter()
        .filter(|name| name.as_str() != target)
        .filter_map(|name| {
            let column = panel.column(name)?;
            pearson(column, target_values).map(|corr| (name.clone(), corr))
        })
        .collect();
    out.sort_by(|a, b| b.1.total_cmp(&a.1));
    out
}

fn pct_change(values: &[f64], periods: usize) -> Vec<Option<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(idx, value)| {
            let base = values[idx.checked_sub(periods)?];
            if base == 0.0 {
                return None;
            }
            Some((value / base - 1.0) * 100.0)
        })
        .collect()
}

fn trailing_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|idx| {
            let start = (idx + 1).saturating_sub(window);
            let slice = &values[start..=idx];
            Some(slice.iter().sum::<f64>() / slice.len() as f64)
        })
        .collect()
}

fn shift(values: &[f64], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|idx| idx.checked_sub(lag).map(|src| values[src]))
        .collect()
}

fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

fn validate_config(cfg: &FeatureConfig) -> Result<(), FeatureError> {
    if cfg.target_column.trim().is_empty() {
        return Err(FeatureError::InvalidConfig(
            "target_column must not be empty".to_string(),
        ));
    }
    if cfg.moving_average_window == 0 {
        return Err(FeatureError::InvalidConfig(
            "moving_average_window must be > 0".to_string(),
        ));
    }
    if cfg.yoy_periods == 0 {
        return Err(FeatureError::InvalidConfig(
            "yoy_periods must be > 0".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for lag in &cfg.lags {
        if *lag == 0 {
            return Err(FeatureError::InvalidConfig(
                "lags entries must be > 0".to_string(),
            ));
        }
        if !seen.insert(*lag) {
            return Err(FeatureError::InvalidConfig(
                "lags entries must be unique".to_string(),
            ));
        }
    }

    let mut spread_names = HashSet::new();
    for spread in &cfg.spreads {
        if spread.name.trim().is_empty() || !spread_names.insert(spread.name.as_str()) {
            return Err(FeatureError::InvalidConfig(
                "spread names must be non-empty and unique".to_string(),
            ));
        }
    }

    Ok(())
}

fn schema_fingerprint(cfg: &FeatureConfig, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{FEATURE_SCHEMA_VERSION};"));
    hasher.update(format!("target:{};", cfg.target_column));
    hasher.update(format!("ma:{};yoy:{};", cfg.moving_average_window, cfg.yoy_periods));
    hasher.update("lags:");
    for lag in &cfg.lags {
        hasher.update(format!("{lag},"));
    }
    hasher.update(";columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(format!(":{:?};", column.kind));
    }
    hex::encode(hasher.finalize())
}
