//! Shared pipeline used by both CLI and TUI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! fetch -> ingest -> normalize (presence / rate) -> aggregate -> merge
//!
//! The pipeline runs once per `load()` / `refresh()`. Front-ends only call
//! [`Pipeline::get_aggregate`], which re-reads the cached tables.

use std::time::Instant;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::data::SourceClient;
use crate::domain::{
    AggregateTable, DataSource, Field, Granularity, MergedTable, Metric, Policy, RawRecord, Reduction, Table,
    TableKind, TableRow,
};
use crate::error::AppError;
use crate::io::ingest::{IngestedData, load_records};
use crate::transform::{JoinPolicy, aggregate, merge, normalize};

/// One value per granularity.
#[derive(Debug, Clone)]
pub struct ByGranularity<T> {
    pub monthly: T,
    pub quarterly: T,
}

impl<T> ByGranularity<T> {
    pub fn get(&self, granularity: Granularity) -> &T {
        match granularity {
            Granularity::Monthly => &self.monthly,
            Granularity::Quarterly => &self.quarterly,
        }
    }

    fn try_build(mut f: impl FnMut(Granularity) -> Result<T, AppError>) -> Result<Self, AppError> {
        Ok(Self {
            monthly: f(Granularity::Monthly)?,
            quarterly: f(Granularity::Quarterly)?,
        })
    }
}

/// The three derived tables at both granularities.
#[derive(Debug, Clone)]
pub struct DerivedTables {
    /// Days reporting each raw count (presence policy, count reduction).
    pub presence: ByGranularity<AggregateTable>,
    /// Mean per-capita rates (rate policy, mean reduction).
    pub rates: ByGranularity<AggregateTable>,
    /// `presence` joined with `rates` on (country, period).
    pub merged: ByGranularity<MergedTable>,
}

/// Build every derived table from the raw records.
pub fn build_tables(records: &[RawRecord]) -> Result<DerivedTables, AppError> {
    let presence_view = normalize(records, &Field::COUNTS, Policy::Presence)?;
    let rate_view = normalize(records, &Field::RATES, Policy::Rate)?;

    let presence = ByGranularity::try_build(|g| {
        Ok(aggregate(&presence_view, &Field::COUNTS, g, Reduction::CountPresent))
    })?;
    let rates = ByGranularity::try_build(|g| Ok(aggregate(&rate_view, &Field::RATES, g, Reduction::Mean)))?;

    // Both aggregates group the same records, so their key sets agree.
    let merged = ByGranularity::try_build(|g| merge(presence.get(g), rates.get(g), JoinPolicy::Strict))?;

    Ok(DerivedTables {
        presence,
        rates,
        merged,
    })
}

/// A loaded dataset and everything derived from it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub ingest: IngestedData,
    pub tables: DerivedTables,
    pub loaded_at: DateTime<Local>,
}

impl Snapshot {
    pub fn from_ingested(ingest: IngestedData) -> Result<Self, AppError> {
        let tables = build_tables(&ingest.records)?;
        Ok(Self {
            ingest,
            tables,
            loaded_at: Local::now(),
        })
    }

    pub fn countries(&self) -> &[String] {
        &self.ingest.countries
    }

    pub fn has_country(&self, country: &str) -> bool {
        self.ingest
            .countries
            .binary_search_by(|c| c.as_str().cmp(country))
            .is_ok()
    }
}

/// Owns the data source and the current snapshot.
pub struct Pipeline {
    source: DataSource,
    client: SourceClient,
    snapshot: Option<Snapshot>,
}

impl Pipeline {
    pub fn new(source: DataSource) -> Result<Self, AppError> {
        Ok(Self {
            source,
            client: SourceClient::new()?,
            snapshot: None,
        })
    }

    /// A pipeline over records that are already in memory.
    pub fn from_ingested(source: DataSource, ingest: IngestedData) -> Result<Self, AppError> {
        let mut pipeline = Self::new(source)?;
        pipeline.snapshot = Some(Snapshot::from_ingested(ingest)?);
        Ok(pipeline)
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Load the dataset unless a snapshot is already present.
    pub fn load(&mut self) -> Result<&Snapshot, AppError> {
        if self.snapshot.is_none() {
            self.snapshot = Some(self.fetch_and_build()?);
        }
        self.current()
    }

    /// Re-fetch the source and rebuild every derived table.
    ///
    /// On failure the previous snapshot stays in place.
    pub fn refresh(&mut self) -> Result<&Snapshot, AppError> {
        match self.fetch_and_build() {
            Ok(snapshot) => self.snapshot = Some(snapshot),
            Err(err) => {
                warn!(error = %err, "Refresh failed; keeping previous snapshot");
                return Err(err);
            }
        }
        self.current()
    }

    fn current(&self) -> Result<&Snapshot, AppError> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| AppError::query("Dataset not loaded."))
    }

    #[tracing::instrument(skip(self), fields(source = %self.source.describe()))]
    fn fetch_and_build(&self) -> Result<Snapshot, AppError> {
        let started = Instant::now();
        let ingest = load_records(&self.client, &self.source)?;
        let snapshot = Snapshot::from_ingested(ingest)?;
        info!(
            countries = snapshot.ingest.countries.len(),
            records = snapshot.ingest.rows_used,
            monthly_rows = snapshot.tables.merged.monthly.rows.len(),
            quarterly_rows = snapshot.tables.merged.quarterly.rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline built"
        );
        Ok(snapshot)
    }

    /// Select one metric for `countries` from a derived table.
    ///
    /// This never re-runs normalization or aggregation. An empty country list
    /// yields an empty table.
    pub fn get_aggregate(
        &self,
        granularity: Granularity,
        kind: TableKind,
        countries: &[String],
        metric: Metric,
    ) -> Result<Table, AppError> {
        query(self.current()?, granularity, kind, countries, metric)
    }
}

/// Query a snapshot directly (see [`Pipeline::get_aggregate`]).
pub fn query(
    snapshot: &Snapshot,
    granularity: Granularity,
    kind: TableKind,
    countries: &[String],
    metric: Metric,
) -> Result<Table, AppError> {
    if !kind.carries(metric) {
        return Err(AppError::query(format!(
            "The {} table has no '{}' column.",
            kind.display_name(),
            metric.label()
        )));
    }
    if let Some(unknown) = countries.iter().find(|c| !snapshot.has_country(c)) {
        return Err(AppError::query(format!("Unknown country '{unknown}'.")));
    }

    let wanted = |country: &str| countries.iter().any(|c| c == country);
    let tables = &snapshot.tables;

    let rows: Vec<TableRow> = match kind {
        TableKind::Presence | TableKind::Rates => {
            let table = if kind == TableKind::Presence {
                tables.presence.get(granularity)
            } else {
                tables.rates.get(granularity)
            };
            table
                .rows
                .iter()
                .filter(|r| wanted(&r.country))
                .map(|r| TableRow {
                    country: r.country.clone(),
                    period: r.period,
                    value: r.get(metric.field()),
                })
                .collect()
        }
        TableKind::Merged => tables
            .merged
            .get(granularity)
            .rows
            .iter()
            .filter(|r| wanted(&r.country))
            .map(|r| TableRow {
                country: r.country.clone(),
                period: r.period,
                value: r.get(metric),
            })
            .collect(),
    };

    debug!(
        kind = kind.display_name(),
        granularity = ?granularity,
        metric = metric.label(),
        countries = countries.len(),
        rows = rows.len(),
        "Aggregate queried"
    );

    Ok(Table {
        granularity,
        metric,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ingest::parse_records;

    const DATA: &str = "\
set,name,time,new_tests_orig,new_cases_orig,new_deaths_orig,cap_new_tests,cap_new_cases,cap_new_deaths
country,Switzerland,2021-03-01,0,1,,0.1,,
country,Switzerland,2021-03-02,5,0,,,,
country,Switzerland,2021-03-03,,2,,0.3,,
country,Switzerland,2021-03-04,10,0,1,,,
country,Switzerland,2021-04-01,7,0,0,0.4,0.2,0
country,Peru,2021-03-01,1,1,1,0.2,0.2,0.2
region,Americas,2021-03-01,1,1,1,1,1,1
";

    fn pipeline() -> Pipeline {
        let ingest = parse_records(DATA.as_bytes()).unwrap();
        Pipeline::from_ingested(DataSource::Path("fixture.csv".into()), ingest).unwrap()
    }

    fn swiss() -> Vec<String> {
        vec!["Switzerland".to_string()]
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn queries_are_logged_with_their_shape() {
        let p = pipeline();
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            p.get_aggregate(Granularity::Quarterly, TableKind::Merged, &swiss(), Metric::MeanTestRate)
                .unwrap();
        });

        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line = text
            .lines()
            .find(|l| l.contains("Aggregate queried"))
            .unwrap_or_else(|| panic!("no query log in:\n{text}"));
        assert!(line.contains("DEBUG"), "{line}");
        assert!(line.contains("granularity=Quarterly"), "{line}");
        assert!(line.contains("countries=1"), "{line}");
        assert!(line.contains("rows=2"), "{line}");
    }

    #[test]
    fn presence_counts_skip_zero_and_missing() {
        let p = pipeline();
        let table = p
            .get_aggregate(Granularity::Monthly, TableKind::Presence, &swiss(), Metric::DaysReportingTests)
            .unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].period.display_label(), "March 2021");
        assert_eq!(table.rows[0].value, Some(2.0));
        assert_eq!(table.rows[1].value, Some(1.0));
    }

    #[test]
    fn rate_means_count_missing_days_as_zero() {
        let p = pipeline();
        let table = p
            .get_aggregate(Granularity::Monthly, TableKind::Rates, &swiss(), Metric::MeanTestRate)
            .unwrap();

        // (0.1 + 0 + 0.3 + 0) / 4 days in March.
        let march = table.rows[0].value.unwrap();
        assert!((march - 0.1).abs() < 1e-12, "got {march}");
    }

    #[test]
    fn merged_table_carries_both_metric_families() {
        let p = pipeline();
        let days = p
            .get_aggregate(Granularity::Quarterly, TableKind::Merged, &swiss(), Metric::DaysReportingCases)
            .unwrap();
        let rates = p
            .get_aggregate(Granularity::Quarterly, TableKind::Merged, &swiss(), Metric::MeanCaseRate)
            .unwrap();

        let labels: Vec<String> = days.rows.iter().map(|r| r.period.label()).collect();
        assert_eq!(labels, vec!["2021-Q1", "2021-Q2"]);
        assert_eq!(days.rows[0].value, Some(2.0));
        assert_eq!(rates.rows[1].value, Some(0.2));
    }

    #[test]
    fn filters_by_country_and_rejects_unknown_ones() {
        let p = pipeline();
        let both = vec!["Peru".to_string(), "Switzerland".to_string()];
        let table = p
            .get_aggregate(Granularity::Monthly, TableKind::Presence, &both, Metric::DaysReportingDeaths)
            .unwrap();
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0].country, "Peru");

        let empty = p
            .get_aggregate(Granularity::Monthly, TableKind::Presence, &[], Metric::DaysReportingDeaths)
            .unwrap();
        assert!(empty.is_empty());

        let err = p
            .get_aggregate(
                Granularity::Monthly,
                TableKind::Presence,
                &["Americas".to_string()],
                Metric::DaysReportingDeaths,
            )
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Query);
    }

    #[test]
    fn metric_must_belong_to_the_table() {
        let p = pipeline();
        let err = p
            .get_aggregate(Granularity::Monthly, TableKind::Presence, &swiss(), Metric::MeanTestRate)
            .unwrap_err();
        assert!(err.message().contains("Mean test rate"));
    }

    #[test]
    fn queries_before_load_fail() {
        let p = Pipeline::new(DataSource::Path("unused.csv".into())).unwrap();
        assert!(p.snapshot().is_none());
        assert!(
            p.get_aggregate(Granularity::Monthly, TableKind::Presence, &swiss(), Metric::DaysReportingTests)
                .is_err()
        );
    }
}
