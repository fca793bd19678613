//! Missing-value policies applied before aggregation.

use tracing::debug;

use crate::domain::{Field, FieldValues, NormalizedRecord, Policy, RawRecord};
use crate::error::AppError;

/// Apply `policy` to `fields` of every record.
///
/// The output keeps the input order and carries only the requested fields.
/// Each call builds a fresh set of records, so the presence and rate views of
/// the same raw data never share state.
pub fn normalize(records: &[RawRecord], fields: &[Field], policy: Policy) -> Result<Vec<NormalizedRecord>, AppError> {
    let mut out = Vec::with_capacity(records.len());

    for record in records {
        let mut values = FieldValues::new();
        for &field in fields {
            let raw = record.values.get(&field).ok_or_else(|| {
                AppError::normalize(format!(
                    "Field `{}` is missing from the record for {} on {}.",
                    field.name(),
                    record.country,
                    record.date
                ))
            })?;
            values.insert(field, apply(policy, *raw));
        }

        out.push(NormalizedRecord {
            country: record.country.clone(),
            date: record.date,
            policy,
            values,
        });
    }

    debug!(records = out.len(), fields = fields.len(), ?policy, "Records normalized");
    Ok(out)
}

/// Substitute one value according to `policy`.
pub fn apply(policy: Policy, value: Option<f64>) -> Option<f64> {
    match policy {
        Policy::Presence => value.filter(|v| *v != 0.0),
        Policy::Rate => Some(value.unwrap_or(0.0)),
    }
}
