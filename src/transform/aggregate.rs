//! Periodic aggregation of normalized daily records.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::{
    AggregateRow, AggregateTable, Field, Granularity, NormalizedRecord, Period, Reduction,
};

/// Running totals for one field within one (country, period) group.
#[derive(Debug, Default, Clone, Copy)]
struct FieldAcc {
    present: usize,
    sum: f64,
}

#[derive(Debug, Default)]
struct GroupAcc {
    fields: BTreeMap<Field, FieldAcc>,
}

/// Group `records` by (country, period) and reduce each group.
///
/// - `CountPresent`: number of records whose value is present.
/// - `Mean`: mean of the present values. Rate-normalized input has no missing
///   values, so every record of the group lands in the denominator.
///
/// Rows come out ordered by country, then period. A field with no present
/// value in a group has no mean and is left out of that row.
pub fn aggregate(
    records: &[NormalizedRecord],
    fields: &[Field],
    granularity: Granularity,
    reduction: Reduction,
) -> AggregateTable {
    let mut groups: BTreeMap<(&str, Period), GroupAcc> = BTreeMap::new();

    for record in records {
        let period = Period::containing(record.date, granularity);
        let group = groups.entry((record.country.as_str(), period)).or_default();
        for &field in fields {
            let acc = group.fields.entry(field).or_default();
            if let Some(v) = record.values.get(&field).copied().flatten() {
                acc.present += 1;
                acc.sum += v;
            }
        }
    }

    let rows: Vec<AggregateRow> = groups
        .into_iter()
        .map(|((country, period), group)| AggregateRow {
            country: country.to_string(),
            period,
            values: group
                .fields
                .into_iter()
                .filter_map(|(field, acc)| reduce(acc, reduction).map(|v| (field, v)))
                .collect(),
        })
        .collect();

    debug!(
        rows = rows.len(),
        records = records.len(),
        ?granularity,
        ?reduction,
        "Records aggregated"
    );

    AggregateTable {
        granularity,
        reduction,
        rows,
    }
}

fn reduce(acc: FieldAcc, reduction: Reduction) -> Option<f64> {
    match reduction {
        Reduction::CountPresent => Some(acc.present as f64),
        Reduction::Mean if acc.present == 0 => None,
        Reduction::Mean => Some(acc.sum / acc.present as f64),
    }
}
