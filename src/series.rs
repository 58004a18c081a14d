//! Series identifiers, date ranges and raw observation sequences.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TARGET_SERIES: &str = "UMCSENT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub id: String,
    pub description: String,
}

impl SeriesSpec {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Inclusive calendar range used for every request in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("end date {end} is before start date {start}")]
    Inverted { start: NaiveDate, end: NaiveDate },
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if end < start {
            return Err(DateRangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Observations ordered by strictly increasing date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    observations: Vec<Observation>,
}

impl RawSeries {
    /// Sorts by date, keeps the last value for a repeated date and drops
    /// non-finite values.
    pub fn from_observations(observations: impl IntoIterator<Item = Observation>) -> Self {
        let mut sorted: Vec<Observation> = observations
            .into_iter()
            .filter(|obs| obs.value.is_finite())
            .collect();
        sorted.sort_by_key(|obs| obs.date);

        let mut deduped: Vec<Observation> = Vec::with_capacity(sorted.len());
        for obs in sorted {
            match deduped.last_mut() {
                Some(last) if last.date == obs.date => *last = obs,
                _ => deduped.push(obs),
            }
        }

        Self {
            observations: deduped,
        }
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self::from_observations(
            pairs
                .into_iter()
                .map(|(date, value)| Observation::new(date, value)),
        )
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|obs| obs.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|obs| obs.date)
    }

    /// Deserialized entries bypass the constructor, so callers reading
    /// untrusted data check this before use.
    pub fn is_well_formed(&self) -> bool {
        self.observations
            .windows(2)
            .all(|pair| pair[0].date < pair[1].date)
            && self.observations.iter().all(|obs| obs.value.is_finite())
    }
}

/// Indicator set of the consumer-sentiment study, target first.
pub fn default_series_catalog() -> Vec<SeriesSpec> {
    const CATALOG: [(&str, &str); 44] = [
        ("UMCSENT", "Consumer Sentiment Index"),
        ("CPIAUCSL", "Consumer Price Index (All Urban)"),
        ("UNRATE", "Unemployment Rate"),
        ("GASREGW", "Regular Gasoline Prices (Weekly)"),
        ("RSAFS", "Retail Sales and Food Services"),
        ("DSPIC96", "Real Disposable Personal Income"),
        ("AHETPI", "Average Hourly Earnings (Production Workers)"),
        ("CPIUFDSL", "Consumer Price Index for Food"),
        ("CUSR0000SEHA", "Consumer Price Index for Shelter"),
        ("HOUST", "Housing Starts"),
        ("SP500", "S&P 500 Index"),
        ("PSAVERT", "Personal Savings Rate"),
        ("TCMDO", "Total Consumer Debt Outstanding"),
        ("M1SL", "M1 Money Supply"),
        ("INDPRO", "Industrial Production Index"),
        ("CSUSHPINSA", "Case-Shiller Home Price Index"),
        ("PCE", "Personal Consumption Expenditures"),
        ("FEDFUNDS", "Effective Federal Funds Rate"),
        ("CC4WSA", "Consumer Credit Outstanding"),
        ("VIXCLS", "CBOE Volatility Index (VIX)"),
        ("GS10", "10-Year Treasury Yield"),
        ("FMNHSHPSIUS", "Home Purchase Sentiment Index"),
        ("HPIPONM226S", "FHFA House Price Index"),
        ("PERMIT", "Building Permits"),
        ("MORTGAGE30US", "30-Year Mortgage Rate"),
        ("DGORDER", "Durable Goods Orders"),
        ("BUSINV", "Total Business Inventories"),
        ("ICSA", "Initial Jobless Claims"),
        ("PAYEMS", "Total Nonfarm Payrolls"),
        ("CIVPART", "Labor Force Participation Rate"),
        ("U6RATE", "Underemployment Rate (U6)"),
        ("T10Y2Y", "10-Year/2-Year Treasury Spread"),
        ("BAMLH0A0HYM2", "High Yield Bond Spread"),
        ("TEDRATE", "TED Spread (Financial Stress)"),
        ("ANFCI", "Chicago Fed Financial Conditions Index"),
        ("UMEXPINF1YR", "1-Year Expected Inflation (Michigan)"),
        ("MICH", "Consumer Expectations Index (Michigan)"),
        ("CPILFESL", "Core CPI (ex Food & Energy)"),
        ("NAPMPMI", "ISM Manufacturing PMI"),
        ("NEWORDER", "Manufacturers New Orders"),
        ("AWHMAN", "Average Weekly Hours - Manufacturing"),
        ("DCOILWTICO", "WTI Crude Oil Prices"),
        ("DEXUSEU", "US Dollar/Euro Exchange Rate"),
        ("USEPUINDXD", "Economic Policy Uncertainty Index"),
    ];

    CATALOG
        .iter()
        .map(|(id, description)| SeriesSpec::new(*id, *description))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        let err = DateRange::new(d(2020, 6, 30), d(2020, 1, 1)).unwrap_err();
        assert!(matches!(err, DateRangeError::Inverted { .. }));

        let same_day = DateRange::new(d(2020, 1, 1), d(2020, 1, 1)).unwrap();
        assert!(same_day.contains(d(2020, 1, 1)));
        assert_eq!(same_day.to_string(), "2020-01-01..2020-01-01");
    }

    #[test]
    fn raw_series_sorts_dedupes_and_drops_non_finite() {
        let series = RawSeries::from_pairs(vec![
            (d(2020, 3, 1), 3.0),
            (d(2020, 1, 1), 1.0),
            (d(2020, 2, 1), f64::NAN),
            (d(2020, 3, 1), 3.5),
        ]);

        let dates: Vec<NaiveDate> = series.observations().iter().map(|o| o.date).collect();
        assert_eq!(dates, vec![d(2020, 1, 1), d(2020, 3, 1)]);
        assert_eq!(series.observations()[1].value, 3.5);
        assert!(series.is_well_formed());
    }

    #[test]
    fn catalog_starts_with_target_and_has_unique_ids() {
        let catalog = default_series_catalog();
        assert_eq!(catalog[0].id, DEFAULT_TARGET_SERIES);

        let mut ids: Vec<&str> = catalog.iter().map(|spec| spec.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len());
    }
}
