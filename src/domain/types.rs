//! Shared domain types.
//!
//! These types are kept small and serializable so they can be:
//!
//! - passed between the load / normalize / aggregate / merge stages
//! - exported to CSV/JSON
//! - queried by the presentation layer without re-running the pipeline

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::period::Period;

/// Public snapshot of the FIND COVID-19 tracker.
pub const DEFAULT_SOURCE_URL: &str =
    "https://raw.githubusercontent.com/finddx/FINDCov19TrackerData/master/processed/data_all.csv";

/// Maximum number of countries the presentation layer will display at once.
pub const MAX_COUNTRIES: usize = 6;

/// The fixed set of numeric fields read from the daily dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    NewTests,
    NewCases,
    NewDeaths,
    CapNewTests,
    CapNewCases,
    CapNewDeaths,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::NewTests,
        Field::NewCases,
        Field::NewDeaths,
        Field::CapNewTests,
        Field::CapNewCases,
        Field::CapNewDeaths,
    ];

    /// Raw daily counts (counted as "days reporting").
    pub const COUNTS: [Field; 3] = [Field::NewTests, Field::NewCases, Field::NewDeaths];

    /// Per-capita daily rates (averaged per period).
    pub const RATES: [Field; 3] = [Field::CapNewTests, Field::CapNewCases, Field::CapNewDeaths];

    pub fn name(self) -> &'static str {
        match self {
            Field::NewTests => "new_tests",
            Field::NewCases => "new_cases",
            Field::NewDeaths => "new_deaths",
            Field::CapNewTests => "cap_new_tests",
            Field::CapNewCases => "cap_new_cases",
            Field::CapNewDeaths => "cap_new_deaths",
        }
    }

    /// Column header in the source CSV.
    ///
    /// The raw counts come from the `*_orig` columns, which hold what each
    /// country actually reported (before any smoothing by the tracker).
    pub fn column(self) -> &'static str {
        match self {
            Field::NewTests => "new_tests_orig",
            Field::NewCases => "new_cases_orig",
            Field::NewDeaths => "new_deaths_orig",
            Field::CapNewTests => "cap_new_tests",
            Field::CapNewCases => "cap_new_cases",
            Field::CapNewDeaths => "cap_new_deaths",
        }
    }
}

/// Aggregation bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Monthly,
    Quarterly,
}

impl Granularity {
    pub const ALL: [Granularity; 2] = [Granularity::Monthly, Granularity::Quarterly];

    pub fn months(self) -> u32 {
        match self {
            Granularity::Monthly => 1,
            Granularity::Quarterly => 3,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Granularity::Monthly => "Monthly",
            Granularity::Quarterly => "Quarterly",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Granularity::Monthly => Granularity::Quarterly,
            Granularity::Quarterly => Granularity::Monthly,
        }
    }
}

/// Missing-value substitution applied before aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// A reported zero counts as "no report": `0 -> missing`.
    Presence,
    /// An unreported day contributes zero to a mean: `missing -> 0`.
    Rate,
}

/// How the records of one (country, period) group are reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Number of records whose value is present.
    CountPresent,
    /// Arithmetic mean of the present values.
    Mean,
}

/// A derived metric shown by the dashboard: one field under one reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[value(name = "days-tests")]
    DaysReportingTests,
    #[value(name = "days-cases")]
    DaysReportingCases,
    #[value(name = "days-deaths")]
    DaysReportingDeaths,
    #[value(name = "test-rate")]
    MeanTestRate,
    #[value(name = "case-rate")]
    MeanCaseRate,
    #[value(name = "death-rate")]
    MeanDeathRate,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::DaysReportingTests,
        Metric::DaysReportingCases,
        Metric::DaysReportingDeaths,
        Metric::MeanTestRate,
        Metric::MeanCaseRate,
        Metric::MeanDeathRate,
    ];

    pub const COUNTS: [Metric; 3] = [
        Metric::DaysReportingTests,
        Metric::DaysReportingCases,
        Metric::DaysReportingDeaths,
    ];

    pub const RATES: [Metric; 3] = [Metric::MeanTestRate, Metric::MeanCaseRate, Metric::MeanDeathRate];

    pub fn field(self) -> Field {
        match self {
            Metric::DaysReportingTests => Field::NewTests,
            Metric::DaysReportingCases => Field::NewCases,
            Metric::DaysReportingDeaths => Field::NewDeaths,
            Metric::MeanTestRate => Field::CapNewTests,
            Metric::MeanCaseRate => Field::CapNewCases,
            Metric::MeanDeathRate => Field::CapNewDeaths,
        }
    }

    pub fn reduction(self) -> Reduction {
        match self {
            Metric::DaysReportingTests | Metric::DaysReportingCases | Metric::DaysReportingDeaths => {
                Reduction::CountPresent
            }
            Metric::MeanTestRate | Metric::MeanCaseRate | Metric::MeanDeathRate => Reduction::Mean,
        }
    }

    /// The metric that reduces `field` with `reduction`, if the dashboard defines one.
    pub fn from_parts(field: Field, reduction: Reduction) -> Option<Metric> {
        Metric::ALL
            .into_iter()
            .find(|m| m.field() == field && m.reduction() == reduction)
    }

    /// Human-readable label for tables and charts.
    pub fn label(self) -> &'static str {
        match self {
            Metric::DaysReportingTests => "# of days reporting tests",
            Metric::DaysReportingCases => "# of days reporting cases",
            Metric::DaysReportingDeaths => "# of days reporting deaths",
            Metric::MeanTestRate => "Mean test rate per 1000 people",
            Metric::MeanCaseRate => "Mean case rate per 1000 people",
            Metric::MeanDeathRate => "Mean death rate per 1000 people",
        }
    }

    /// Column header used in exports.
    pub fn column(self) -> &'static str {
        match self {
            Metric::DaysReportingTests => "days_reporting_tests",
            Metric::DaysReportingCases => "days_reporting_cases",
            Metric::DaysReportingDeaths => "days_reporting_deaths",
            Metric::MeanTestRate => "mean_test_rate",
            Metric::MeanCaseRate => "mean_case_rate",
            Metric::MeanDeathRate => "mean_death_rate",
        }
    }
}

/// Which derived table a query reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// Days reporting (presence policy, count reduction).
    Presence,
    /// Mean per-capita rates (rate policy, mean reduction).
    Rates,
    /// Both of the above joined on (country, period).
    Merged,
}

impl TableKind {
    pub fn metrics(self) -> &'static [Metric] {
        match self {
            TableKind::Presence => &Metric::COUNTS,
            TableKind::Rates => &Metric::RATES,
            TableKind::Merged => &Metric::ALL,
        }
    }

    pub fn carries(self, metric: Metric) -> bool {
        self.metrics().contains(&metric)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            TableKind::Presence => "Reporting days",
            TableKind::Rates => "Mean rates",
            TableKind::Merged => "Merged",
        }
    }
}

/// Field values of one record; `None` is a missing value.
pub type FieldValues = BTreeMap<Field, Option<f64>>;

/// One country-level row of the daily dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub country: String,
    pub date: NaiveDate,
    pub values: FieldValues,
}

/// A raw record after a missing-value [`Policy`] was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub country: String,
    pub date: NaiveDate,
    pub policy: Policy,
    pub values: FieldValues,
}

/// One reduced result per (country, period).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub country: String,
    pub period: Period,
    pub values: BTreeMap<Field, f64>,
}

impl AggregateRow {
    pub fn get(&self, field: Field) -> Option<f64> {
        self.values.get(&field).copied()
    }
}

/// Output of the periodic aggregator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTable {
    pub granularity: Granularity,
    pub reduction: Reduction,
    pub rows: Vec<AggregateRow>,
}

/// An aggregate row joined with a second aggregate over the same key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRow {
    pub country: String,
    pub period: Period,
    /// Metrics absent from the map had no row on their side of the join.
    pub values: BTreeMap<Metric, f64>,
}

impl MergedRow {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedTable {
    pub granularity: Granularity,
    pub rows: Vec<MergedRow>,
}

/// One (country, period) cell of a query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub country: String,
    pub period: Period,
    pub value: Option<f64>,
}

/// Query result: a single metric for a set of countries at one granularity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub granularity: Granularity,
    pub metric: Metric,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Present values for one country, in period order.
    pub fn values_for(&self, country: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter(|r| r.country == country)
            .filter_map(|r| r.value)
            .collect()
    }
}

/// Where the daily dataset is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Url(String),
    Path(PathBuf),
}

impl DataSource {
    /// `http(s)://...` is fetched over the network; anything else is a local path.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            DataSource::Url(raw.to_string())
        } else {
            DataSource::Path(PathBuf::from(raw))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DataSource::Url(url) => url.clone(),
            DataSource::Path(path) => path.display().to_string(),
        }
    }
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Url(DEFAULT_SOURCE_URL.to_string())
    }
}

/// Resolved run configuration (environment + CLI flags + defaults).
#[derive(Debug, Clone)]
pub struct DashConfig {
    pub source: DataSource,
    pub granularity: Granularity,
    /// Initially selected countries.
    pub countries: Vec<String>,
    pub max_countries: usize,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            source: DataSource::default(),
            granularity: Granularity::Monthly,
            countries: vec!["Switzerland".to_string()],
            max_countries: MAX_COUNTRIES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_parts_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(Metric::from_parts(metric.field(), metric.reduction()), Some(metric));
        }
        assert_eq!(Metric::from_parts(Field::NewTests, Reduction::Mean), None);
    }

    #[test]
    fn table_kinds_split_metrics_by_reduction() {
        assert!(TableKind::Presence.metrics().iter().all(|m| m.reduction() == Reduction::CountPresent));
        assert!(TableKind::Rates.metrics().iter().all(|m| m.reduction() == Reduction::Mean));
        assert_eq!(TableKind::Merged.metrics().len(), 6);
        assert!(!TableKind::Presence.carries(Metric::MeanCaseRate));
    }

    #[test]
    fn data_source_detects_urls() {
        assert_eq!(
            DataSource::parse("https://example.org/data.csv"),
            DataSource::Url("https://example.org/data.csv".to_string())
        );
        assert_eq!(
            DataSource::parse("data/all.csv"),
            DataSource::Path(PathBuf::from("data/all.csv"))
        );
    }
}
