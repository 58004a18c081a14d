//! Alignment of mixed-frequency series onto a dense month-end calendar.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::series::RawSeries;

/// Columns whose mean spacing is below this many days are averaged per month.
pub const HIGH_FREQUENCY_MAX_GAP_DAYS: f64 = 15.0;

/// Shorter series still widen the index but never become columns.
pub const MIN_COLUMN_OBSERVATIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesFrequency {
    HighFrequency,
    LowFrequency,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PanelError {
    #[error("no observations to align")]
    EmptyInput,
    #[error("no month-end falls between {min} and {max}")]
    EmptyIndex { min: NaiveDate, max: NaiveDate },
    #[error("duplicate column {0}")]
    DuplicateColumn(String),
}

/// Column-major month-end table; every cell is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPanel {
    index: Vec<NaiveDate>,
    columns: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl MonthlyPanel {
    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .position(|column| column == name)
            .map(|idx| self.values[idx].as_slice())
    }

    pub fn row(&self, row: usize) -> Option<Vec<f64>> {
        if row >= self.index.len() {
            return None;
        }
        Some(self.values.iter().map(|column| column[row]).collect())
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.index.len(), self.columns.len())
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.index.first()?, *self.index.last()?))
    }
}

pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

/// Every month-end `m` with `min <= m <= max`.
pub fn month_end_index(min: NaiveDate, max: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut cursor = month_end(min);
    while cursor <= max {
        out.push(cursor);
        match cursor.succ_opt() {
            Some(next_day) => cursor = month_end(next_day),
            None => break,
        }
    }
    out
}

pub fn average_gap_days(series: &RawSeries) -> Option<f64> {
    let first = series.first_date()?;
    let last = series.last_date()?;
    if series.len() < 2 {
        return None;
    }
    Some((last - first).num_days() as f64 / (series.len() - 1) as f64)
}

pub fn classify_frequency(series: &RawSeries) -> SeriesFrequency {
    match average_gap_days(series) {
        Some(gap) if gap < HIGH_FREQUENCY_MAX_GAP_DAYS => SeriesFrequency::HighFrequency,
        _ => SeriesFrequency::LowFrequency,
    }
}

pub fn build_monthly_panel(columns: &[(&str, &RawSeries)]) -> Result<MonthlyPanel, PanelError> {
    let mut min_date: Option<NaiveDate> = None;
    let mut max_date: Option<NaiveDate> = None;
    for (_, series) in columns {
        if let (Some(first), Some(last)) = (series.first_date(), series.last_date()) {
            min_date = Some(min_date.map_or(first, |current| current.min(first)));
            max_date = Some(max_date.map_or(last, |current| current.max(last)));
        }
    }
    let (Some(min), Some(max)) = (min_date, max_date) else {
        return Err(PanelError::EmptyInput);
    };

    let index = month_end_index(min, max);
    if index.is_empty() {
        return Err(PanelError::EmptyIndex { min, max });
    }

    let mut names: Vec<String> = Vec::with_capacity(columns.len());
    let mut values: Vec<Vec<f64>> = Vec::with_capacity(columns.len());
    for (name, series) in columns {
        if names.iter().any(|existing| existing == name) {
            return Err(PanelError::DuplicateColumn((*name).to_string()));
        }
        if series.is_empty() {
            continue;
        }
        if series.len() < MIN_COLUMN_OBSERVATIONS {
            warn!(
                component = "panel",
                event = "panel.column.skipped",
                series_id = *name,
                observations = series.len(),
                min_observations = MIN_COLUMN_OBSERVATIONS
            );
            continue;
        }

        let frequency = classify_frequency(series);
        let mut resampled = resample_to_index(series, frequency, &index);
        fill_forward_backward(&mut resampled);

        let Some(filled) = resampled.into_iter().collect::<Option<Vec<f64>>>() else {
            warn!(
                component = "panel",
                event = "panel.column.unaligned",
                series_id = *name,
                first = %series.first_date().unwrap_or(min),
                last_month_end = %index[index.len() - 1]
            );
            continue;
        };

        debug!(
            component = "panel",
            event = "panel.column.resampled",
            series_id = *name,
            frequency = ?frequency,
            avg_gap_days = average_gap_days(series).unwrap_or(f64::NAN)
        );
        names.push((*name).to_string());
        values.push(filled);
    }

    info!(
        component = "panel",
        event = "panel.built",
        rows = index.len(),
        columns = names.len(),
        start = %index[0],
        end = %index[index.len() - 1]
    );

    Ok(MonthlyPanel {
        index,
        columns: names,
        values,
    })
}

fn resample_to_index(
    series: &RawSeries,
    frequency: SeriesFrequency,
    index: &[NaiveDate],
) -> Vec<Option<f64>> {
    // month-end -> (sum, count, last)
    let mut buckets: BTreeMap<NaiveDate, (f64, usize, f64)> = BTreeMap::new();
    for obs in series.observations() {
        let bucket = buckets
            .entry(month_end(obs.date))
            .or_insert((0.0, 0, obs.value));
        bucket.0 += obs.value;
        bucket.1 += 1;
        bucket.2 = obs.value;
    }

    index
        .iter()
        .map(|date| {
            buckets.get(date).map(|(sum, count, last)| match frequency {
                SeriesFrequency::HighFrequency => sum / *count as f64,
                SeriesFrequency::LowFrequency => *last,
            })
        })
        .collect()
}

pub(crate) fn fill_forward_backward(values: &mut [Option<f64>]) {
    let mut carry = None;
    for slot in values.iter_mut() {
        match slot {
            Some(value) => carry = Some(*value),
            None => *slot = carry,
        }
    }

    let mut carry = None;
    for slot in values.iter_mut().rev() {
        match slot {
            Some(value) => carry = Some(*value),
            None => *slot = carry,
        }
    }
}
