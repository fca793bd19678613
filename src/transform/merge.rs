//! Keyed join of two aggregate tables on (country, period).

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::domain::{AggregateRow, AggregateTable, Metric, MergedRow, MergedTable, Period};
use crate::error::AppError;

/// What to do with keys that only one side of the join has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Both tables must enumerate the same (country, period) keys.
    Strict,
    /// Keep every key; metrics of the side without a row are absent.
    Outer,
}

/// Join `left` and `right` on (country, period).
///
/// Output follows `left`'s row order; with [`JoinPolicy::Outer`], keys only
/// `right` has are appended in `right`'s order.
pub fn merge(left: &AggregateTable, right: &AggregateTable, policy: JoinPolicy) -> Result<MergedTable, AppError> {
    if left.granularity != right.granularity {
        return Err(AppError::merge(format!(
            "Cannot merge a {:?} table with a {:?} table.",
            left.granularity, right.granularity
        )));
    }

    let right_index: HashMap<(&str, Period), &AggregateRow> = right
        .rows
        .iter()
        .map(|r| ((r.country.as_str(), r.period), r))
        .collect();

    let mut rows = Vec::with_capacity(left.rows.len().max(right.rows.len()));
    let mut matched: HashSet<(&str, Period)> = HashSet::with_capacity(left.rows.len());

    for row in &left.rows {
        let key = (row.country.as_str(), row.period);
        let mut values = metric_values(row, left)?;
        match right_index.get(&key) {
            Some(other) => {
                values.extend(metric_values(other, right)?);
                matched.insert(key);
            }
            None if policy == JoinPolicy::Strict => {
                return Err(unmatched_key(row, "second"));
            }
            None => {}
        }
        rows.push(MergedRow {
            country: row.country.clone(),
            period: row.period,
            values,
        });
    }

    for row in &right.rows {
        if matched.contains(&(row.country.as_str(), row.period)) {
            continue;
        }
        if policy == JoinPolicy::Strict {
            return Err(unmatched_key(row, "first"));
        }
        rows.push(MergedRow {
            country: row.country.clone(),
            period: row.period,
            values: metric_values(row, right)?,
        });
    }

    debug!(
        rows = rows.len(),
        left = left.rows.len(),
        right = right.rows.len(),
        ?policy,
        "Tables merged"
    );

    Ok(MergedTable {
        granularity: left.granularity,
        rows,
    })
}

fn metric_values(row: &AggregateRow, table: &AggregateTable) -> Result<BTreeMap<Metric, f64>, AppError> {
    row.values
        .iter()
        .map(|(&field, &value)| {
            let metric = Metric::from_parts(field, table.reduction).ok_or_else(|| {
                AppError::merge(format!(
                    "No metric reduces `{}` with {:?}.",
                    field.name(),
                    table.reduction
                ))
            })?;
            Ok((metric, value))
        })
        .collect()
}

fn unmatched_key(row: &AggregateRow, missing_from: &str) -> AppError {
    AppError::merge(format!(
        "Aggregate key sets differ: {} {} has no row in the {missing_from} table.",
        row.country,
        row.period.label()
    ))
}
