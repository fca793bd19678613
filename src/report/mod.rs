//! Presentation-side reshaping of query results.
//!
//! The pipeline returns long tables (one row per country and period); the
//! dashboard shows them wide, one column per selected country.

use std::collections::BTreeMap;

use crate::domain::{Metric, Period, Table};

pub mod boxplot;
pub mod format;

pub use boxplot::BoxStats;
pub use format::*;

/// One metric laid out as periods x countries.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTable {
    pub metric: Metric,
    /// Column order.
    pub countries: Vec<String>,
    pub rows: Vec<PivotRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    pub period: Period,
    /// One cell per entry of [`PivotTable::countries`].
    pub cells: Vec<Option<f64>>,
}

impl PivotTable {
    /// Pivot `table` with columns in `countries` order.
    ///
    /// Periods are the union over all countries, ascending; a country without
    /// a row for a period gets an empty cell.
    pub fn from_table(table: &Table, countries: &[String]) -> Self {
        let column: BTreeMap<&str, usize> = countries
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let mut by_period: BTreeMap<Period, Vec<Option<f64>>> = BTreeMap::new();
        for row in &table.rows {
            let Some(&col) = column.get(row.country.as_str()) else {
                continue;
            };
            let cells = by_period
                .entry(row.period)
                .or_insert_with(|| vec![None; countries.len()]);
            cells[col] = row.value;
        }

        Self {
            metric: table.metric,
            countries: countries.to_vec(),
            rows: by_period
                .into_iter()
                .map(|(period, cells)| PivotRow { period, cells })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Box statistics per country, in `countries` order; countries without values are skipped.
pub fn box_stats_by_country(table: &Table, countries: &[String]) -> Vec<(String, BoxStats)> {
    countries
        .iter()
        .filter_map(|c| BoxStats::from_values(&table.values_for(c)).map(|s| (c.clone(), s)))
        .collect()
}
