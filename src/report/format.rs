//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the pipeline code stays clean and testable
//! - output changes are localized (CLI and TUI share the cell formatting)

use crate::app::pipeline::Snapshot;
use crate::domain::{Metric, Reduction};
use crate::report::{BoxStats, PivotTable};

/// Header of the period column.
pub const TIMEFRAME_HEADER: &str = "Timeframe";

const MIN_CELL_WIDTH: usize = 12;

/// Format one cell: day counts as integers, rates in exponent notation.
pub fn fmt_value(metric: Metric, value: Option<f64>) -> String {
    match (value, metric.reduction()) {
        (None, _) => String::new(),
        (Some(v), Reduction::CountPresent) => format!("{v:.0}"),
        (Some(v), Reduction::Mean) => format!("{v:.5e}"),
    }
}

/// Render a pivot as a fixed-width text table.
pub fn format_pivot(pivot: &PivotTable) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", pivot.metric.label()));

    if pivot.is_empty() {
        out.push_str("(no rows)\n");
        return out;
    }

    let labels: Vec<String> = pivot.rows.iter().map(|r| r.period.display_label()).collect();
    let label_width = labels
        .iter()
        .map(|l| l.chars().count())
        .chain(std::iter::once(TIMEFRAME_HEADER.len()))
        .max()
        .unwrap_or(MIN_CELL_WIDTH);
    let widths: Vec<usize> = pivot
        .countries
        .iter()
        .map(|c| c.chars().count().max(MIN_CELL_WIDTH))
        .collect();

    let mut line = format!("{TIMEFRAME_HEADER:<label_width$}");
    for (country, w) in pivot.countries.iter().zip(widths.iter().copied()) {
        line.push_str(&format!(" {country:>w$}"));
    }
    out.push_str(line.trim_end());
    out.push('\n');

    let mut rule = "-".repeat(label_width);
    for w in &widths {
        rule.push(' ');
        rule.push_str(&"-".repeat(*w));
    }
    out.push_str(&rule);
    out.push('\n');

    for (row, label) in pivot.rows.iter().zip(&labels) {
        let mut line = format!("{label:<label_width$}");
        for (cell, w) in row.cells.iter().zip(widths.iter().copied()) {
            line.push_str(&format!(" {:>w$}", fmt_value(pivot.metric, *cell)));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out
}

/// Render per-country box statistics.
pub fn format_box_stats(metric: Metric, stats: &[(String, BoxStats)]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", metric.label()));
    if stats.is_empty() {
        out.push_str("(no values)\n");
        return out;
    }

    let name_width = stats
        .iter()
        .map(|(c, _)| c.chars().count())
        .max()
        .unwrap_or(0)
        .max("country".len());

    out.push_str(
        format!(
            "{:<name_width$} {:>4} {:>12} {:>12} {:>12} {:>12} {:>12} {:>8}\n",
            "country", "n", "lo whisker", "q1", "median", "q3", "hi whisker", "outliers"
        )
        .trim_end(),
    );
    out.push('\n');

    for (country, s) in stats {
        let v = |x: f64| fmt_value(metric, Some(x));
        out.push_str(
            format!(
                "{country:<name_width$} {:>4} {:>12} {:>12} {:>12} {:>12} {:>12} {:>8}\n",
                s.n,
                v(s.lower_whisker),
                v(s.q1),
                v(s.median),
                v(s.q3),
                v(s.upper_whisker),
                s.outliers.len()
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Load report: what the source held and what the pipeline kept.
pub fn format_load_summary(snapshot: &Snapshot, source: &str) -> String {
    let ingest = &snapshot.ingest;
    let tables = &snapshot.tables;
    let mut out = String::new();

    out.push_str("=== cov - COVID-19 reporting by period ===\n");
    out.push_str(&format!("Source: {source}\n"));
    out.push_str(&format!("Loaded: {}\n", snapshot.loaded_at.format("%Y-%m-%d %H:%M:%S")));
    out.push_str(&format!(
        "Rows: read={} | used={} | out of scope={} | dropped={}\n",
        ingest.rows_read,
        ingest.rows_used,
        ingest.rows_out_of_scope,
        ingest.row_errors.len()
    ));
    out.push_str(&format!("Countries: {}\n", ingest.countries.len()));

    if let (Some(first), Some(last)) = (
        ingest.records.iter().map(|r| r.date).min(),
        ingest.records.iter().map(|r| r.date).max(),
    ) {
        out.push_str(&format!("Dates: {first} .. {last}\n"));
    }

    out.push_str(&format!(
        "Aggregates: monthly={} rows | quarterly={} rows\n",
        tables.merged.monthly.rows.len(),
        tables.merged.quarterly.rows.len()
    ));

    if !ingest.row_errors.is_empty() {
        out.push_str("\nDropped rows:\n");
        for err in ingest.row_errors.iter().take(20) {
            out.push_str(&format!(
                "  line {:>7} {:<24} {}\n",
                err.line,
                truncate(err.country.as_deref().unwrap_or("-"), 24),
                err.message
            ));
        }
        if ingest.row_errors.len() > 20 {
            out.push_str(&format!("  ... and {} more\n", ingest.row_errors.len() - 20));
        }
    }

    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
