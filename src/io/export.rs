//! Export the merged table to CSV or JSON.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts:
//! one row per (country, period), one column per metric, blank where absent.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::domain::{MergedTable, Metric};
use crate::error::AppError;

/// Write the merged table as CSV.
pub fn write_merged_csv(path: &Path, table: &MergedTable) -> Result<(), AppError> {
    let file = create(path)?;
    write_merged_csv_to(file, table)
        .map_err(|e| AppError::export(format!("Failed to write export CSV '{}': {e}", path.display())))
}

/// Write the merged table as CSV to any writer.
pub fn write_merged_csv_to<W: Write>(writer: W, table: &MergedTable) -> Result<(), csv::Error> {
    let mut w = csv::Writer::from_writer(writer);

    let mut header = vec!["country", "period", "period_start", "timeframe"];
    header.extend(Metric::ALL.iter().map(|m| m.column()));
    w.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![
            row.country.clone(),
            row.period.label(),
            row.period.start().to_string(),
            row.period.display_label(),
        ];
        record.extend(
            Metric::ALL
                .iter()
                .map(|m| row.get(*m).map(|v| v.to_string()).unwrap_or_default()),
        );
        w.write_record(&record)?;
    }

    w.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct MergedExport<'a> {
    generated_at: String,
    #[serde(flatten)]
    table: &'a MergedTable,
}

/// Write the merged table as pretty JSON.
pub fn write_merged_json(path: &Path, table: &MergedTable) -> Result<(), AppError> {
    let file = create(path)?;
    let payload = MergedExport {
        generated_at: chrono::Local::now().to_rfc3339(),
        table,
    };
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &payload)
        .map_err(|e| AppError::export(format!("Failed to write export JSON '{}': {e}", path.display())))?;
    writer
        .flush()
        .map_err(|e| AppError::export(format!("Failed to flush export JSON '{}': {e}", path.display())))
}

fn create(path: &Path) -> Result<File, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::export(format!("Failed to create directory '{}': {e}", parent.display()))
        })?;
    }
    File::create(path).map_err(|e| AppError::export(format!("Failed to create '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Granularity, MergedRow, Period};

    fn table() -> MergedTable {
        MergedTable {
            granularity: Granularity::Quarterly,
            rows: vec![MergedRow {
                country: "Peru".to_string(),
                period: Period::from_parts(Granularity::Quarterly, 2021, 2).unwrap(),
                values: [(Metric::DaysReportingTests, 12.0), (Metric::MeanTestRate, 0.25)]
                    .into_iter()
                    .collect(),
            }],
        }
    }

    #[test]
    fn csv_has_one_column_per_metric_and_blank_absent_cells() {
        let mut buf = Vec::new();
        write_merged_csv_to(&mut buf, &table()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "country,period,period_start,timeframe,days_reporting_tests,days_reporting_cases,\
             days_reporting_deaths,mean_test_rate,mean_case_rate,mean_death_rate"
        );
        assert_eq!(lines[1], "Peru,2021-Q2,2021-04-01,2021-Q2,12,,,0.25,,");
    }

    #[test]
    fn json_export_uses_period_labels() {
        let dir = std::env::temp_dir().join(format!("cov-export-test-{}", std::process::id()));
        let path = dir.join("merged.json");
        write_merged_json(&path, &table()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["granularity"], "quarterly");
        assert_eq!(value["rows"][0]["period"], "2021-Q2");
        assert_eq!(value["rows"][0]["values"]["mean_test_rate"], 0.25);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
