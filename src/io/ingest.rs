//! CSV ingest of the daily country-level dataset.
//!
//! This module turns the tracker CSV into an ordered list of [`RawRecord`]s.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors, exit code 2)
//! - **Row-level validation** (drop bad rows, but report what happened)
//! - **Deterministic output** (sorted by country, then date)
//! - **Separation of concerns**: no missing-value policy or aggregation here

use std::collections::{BTreeSet, HashMap};
use std::io::Read;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use tracing::{debug, info, warn};

use crate::data::SourceClient;
use crate::domain::{DataSource, Field, FieldValues, RawRecord};
use crate::error::AppError;

/// Scope marker value of country-level rows (the `set` column).
const COUNTRY_SCOPE: &str = "country";

const COL_NAME: &str = "name";
const COL_SET: &str = "set";
const COL_TIME: &str = "time";

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub country: Option<String>,
    pub message: String,
}

/// Ingest output: sorted records + bookkeeping about what was dropped.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub records: Vec<RawRecord>,
    /// Distinct country names, sorted.
    pub countries: Vec<String>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    /// Rows skipped because they describe a region or the whole world.
    pub rows_out_of_scope: usize,
    pub rows_used: usize,
}

/// Fetch `source` and parse it.
pub fn load_records(client: &SourceClient, source: &DataSource) -> Result<IngestedData, AppError> {
    let bytes = client.fetch(source)?;
    parse_records(bytes.as_slice())
}

/// Parse the tracker CSV from any reader.
pub fn parse_records<R: Read>(reader: R) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::load(format!("Failed to read CSV headers: {e}")))?
        .clone();

    let header_map = build_header_map(&headers);
    ensure_required_columns_exist(&header_map)?;

    let mut records = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_out_of_scope = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header line, and lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    country: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        if !is_country_scope(&record, &header_map) {
            rows_out_of_scope += 1;
            continue;
        }

        match parse_row(&record, &header_map) {
            Ok(row) => records.push((line, row)),
            Err(message) => row_errors.push(RowError {
                line,
                country: get_optional(&record, &header_map, COL_NAME).map(str::to_string),
                message,
            }),
        }
    }

    // Stable sort keeps file order among duplicates, so the first one wins.
    records.sort_by(|(_, a), (_, b)| (&a.country, a.date).cmp(&(&b.country, b.date)));

    let mut deduped: Vec<RawRecord> = Vec::with_capacity(records.len());
    for (line, row) in records {
        if let Some(prev) = deduped.last() {
            if prev.country == row.country && prev.date == row.date {
                row_errors.push(RowError {
                    line,
                    country: Some(row.country.clone()),
                    message: format!("Duplicate record for {} on {}.", row.country, row.date),
                });
                continue;
            }
        }
        deduped.push(row);
    }

    row_errors.sort_by_key(|e| e.line);
    for err in &row_errors {
        debug!(
            line = err.line,
            country = err.country.as_deref().unwrap_or("-"),
            reason = %err.message,
            "Dropped dataset row"
        );
    }
    if let Some(first) = row_errors.first() {
        warn!(
            dropped = row_errors.len(),
            first_line = first.line,
            first_reason = %first.message,
            "Dataset rows dropped; run `cov summary` for details"
        );
    }

    let countries: Vec<String> = deduped
        .iter()
        .map(|r| r.country.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let rows_used = deduped.len();
    info!(
        rows_read,
        rows_used,
        rows_out_of_scope,
        row_errors = row_errors.len(),
        countries = countries.len(),
        "Dataset parsed"
    );

    Ok(IngestedData {
        records: deduped,
        countries,
        row_errors,
        rows_read,
        rows_out_of_scope,
        rows_used,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM;
    // left in place it makes the `name` column look missing.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn ensure_required_columns_exist(header_map: &HashMap<String, usize>) -> Result<(), AppError> {
    let missing: Vec<&str> = [COL_NAME, COL_SET, COL_TIME]
        .into_iter()
        .chain(Field::ALL.iter().map(|f| f.column()))
        .filter(|col| !header_map.contains_key(*col))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    let list = missing
        .iter()
        .map(|c| format!("`{c}`"))
        .collect::<Vec<_>>()
        .join(", ");
    Err(AppError::load(format!("Missing required column(s): {list}")))
}

fn is_country_scope(record: &StringRecord, header_map: &HashMap<String, usize>) -> bool {
    get_optional(record, header_map, COL_SET)
        .is_some_and(|s| s == COUNTRY_SCOPE)
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<RawRecord, String> {
    let country = get_required(record, header_map, COL_NAME)?.to_string();
    let date = parse_date(get_required(record, header_map, COL_TIME)?)?;

    let values: FieldValues = Field::ALL
        .iter()
        .map(|&field| (field, parse_opt_f64(get_optional(record, header_map, field.column()))))
        .collect();

    Ok(RawRecord {
        country,
        date,
        values,
    })
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    // The tracker publishes ISO dates; a timestamp suffix or slashes show up
    // when the file has been round-tripped through other tools.
    const DATE_FMTS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
    const DATETIME_FMTS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    for fmt in DATE_FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    for fmt in DATETIME_FMTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }
    Err(format!(
        "Invalid date '{s}'. Expected one of: YYYY-MM-DD, YYYY/MM/DD, YYYY-MM-DD HH:MM:SS, YYYY-MM-DDTHH:MM:SS."
    ))
}

/// Empty cells, `NA`, `NaN`, and infinities are all missing.
fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let s = s?;
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "set,name,time,new_tests_orig,new_cases_orig,new_deaths_orig,cap_new_tests,cap_new_cases,cap_new_deaths";

    fn csv(rows: &[&str]) -> String {
        let mut out = HEADER.to_string();
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn keeps_only_country_rows_sorted_by_country_then_date() {
        let data = csv(&[
            "country,Switzerland,2021-03-02,5,1,0,0.5,0.1,0",
            "region,Africa,2021-03-01,5,1,0,0.5,0.1,0",
            "country,Austria,2021-03-01,1,1,1,0.1,0.1,0.1",
            "country,Switzerland,2021-03-01,0,,NaN,,0.2,",
        ]);

        let ingested = parse_records(data.as_bytes()).unwrap();
        assert_eq!(ingested.rows_read, 4);
        assert_eq!(ingested.rows_out_of_scope, 1);
        assert_eq!(ingested.rows_used, 3);
        assert_eq!(ingested.countries, vec!["Austria", "Switzerland"]);

        let keys: Vec<(&str, String)> = ingested
            .records
            .iter()
            .map(|r| (r.country.as_str(), r.date.to_string()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Austria", "2021-03-01".to_string()),
                ("Switzerland", "2021-03-01".to_string()),
                ("Switzerland", "2021-03-02".to_string()),
            ]
        );
    }

    #[test]
    fn blank_and_nan_cells_are_missing_but_zero_is_kept() {
        let data = csv(&["country,Switzerland,2021-03-01,0,,NaN,,0.2,inf"]);
        let ingested = parse_records(data.as_bytes()).unwrap();
        let values = &ingested.records[0].values;

        assert_eq!(values[&Field::NewTests], Some(0.0));
        assert_eq!(values[&Field::NewCases], None);
        assert_eq!(values[&Field::NewDeaths], None);
        assert_eq!(values[&Field::CapNewTests], None);
        assert_eq!(values[&Field::CapNewCases], Some(0.2));
        assert_eq!(values[&Field::CapNewDeaths], None);
    }

    #[test]
    fn bad_dates_drop_the_row_and_are_reported() {
        let data = csv(&[
            "country,Switzerland,not-a-date,1,1,1,1,1,1",
            "country,Switzerland,2021-03-01 00:00:00,1,1,1,1,1,1",
        ]);
        let ingested = parse_records(data.as_bytes()).unwrap();

        assert_eq!(ingested.rows_used, 1);
        assert_eq!(ingested.row_errors.len(), 1);
        assert_eq!(ingested.row_errors[0].line, 2);
        assert_eq!(ingested.row_errors[0].country.as_deref(), Some("Switzerland"));
        assert_eq!(ingested.records[0].date, NaiveDate::from_ymd_opt(2021, 3, 1).unwrap());
    }

    #[test]
    fn slash_dates_and_timestamps_parse_to_the_day() {
        let data = csv(&[
            "country,Chile,2021/03/05,1,1,1,0.1,0.1,0.1",
            "country,Chile,2021-03-06T12:30:00,1,1,1,0.1,0.1,0.1",
        ]);
        let ingested = parse_records(data.as_bytes()).unwrap();

        let dates: Vec<NaiveDate> = ingested.records.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2021, 3, 5).unwrap(),
                NaiveDate::from_ymd_opt(2021, 3, 6).unwrap(),
            ]
        );
        assert!(ingested.row_errors.is_empty());
    }

    #[test]
    fn na_cells_are_missing() {
        let data = csv(&["country,Chile,2021/03/05,NA,1,1,0.1,NA,0.1"]);
        let ingested = parse_records(data.as_bytes()).unwrap();
        let values = &ingested.records[0].values;

        assert_eq!(values[&Field::NewTests], None);
        assert_eq!(values[&Field::NewCases], Some(1.0));
        assert_eq!(values[&Field::CapNewCases], None);
        assert_eq!(values[&Field::CapNewDeaths], Some(0.1));
    }

    #[test]
    fn scope_marker_must_be_lowercase_country() {
        let data = csv(&[
            "Country,Peru,2021-03-01,1,1,1,0.1,0.1,0.1",
            "country,Chile,2021-03-01,1,1,1,0.1,0.1,0.1",
        ]);
        let ingested = parse_records(data.as_bytes()).unwrap();

        assert_eq!(ingested.countries, vec!["Chile"]);
        assert_eq!(ingested.rows_out_of_scope, 1);
    }

    #[test]
    fn bad_date_message_lists_accepted_formats() {
        let err = parse_date("5 March 2021").unwrap_err();
        for fmt in ["YYYY-MM-DD", "YYYY/MM/DD", "YYYY-MM-DD HH:MM:SS", "YYYY-MM-DDTHH:MM:SS"] {
            assert!(err.contains(fmt), "{err}");
        }
    }

    #[test]
    fn duplicate_country_dates_keep_the_first_row() {
        let data = csv(&[
            "country,Switzerland,2021-03-01,1,1,1,1,1,1",
            "country,Switzerland,2021-03-01,9,9,9,9,9,9",
        ]);
        let ingested = parse_records(data.as_bytes()).unwrap();

        assert_eq!(ingested.records.len(), 1);
        assert_eq!(ingested.records[0].values[&Field::NewTests], Some(1.0));
        assert_eq!(ingested.row_errors.len(), 1);
        assert_eq!(ingested.row_errors[0].line, 3);
    }

    #[test]
    fn missing_columns_fail_with_load_error() {
        let data = "set,name,time,new_tests_orig\ncountry,Switzerland,2021-03-01,1";
        let err = parse_records(data.as_bytes()).unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Load);
        assert!(err.message().contains("`new_cases_orig`"));
        assert!(err.message().contains("`cap_new_deaths`"));
    }

    #[test]
    fn header_matching_ignores_case_and_bom() {
        let data = format!(
            "\u{feff}SET,Name,TIME,new_tests_orig,new_cases_orig,new_deaths_orig,cap_new_tests,cap_new_cases,cap_new_deaths\ncountry,Chile,2021-01-05,1,2,3,0.1,0.2,0.3"
        );
        let ingested = parse_records(data.as_bytes()).unwrap();
        assert_eq!(ingested.countries, vec!["Chile"]);
    }
}
