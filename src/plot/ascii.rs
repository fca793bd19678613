//! ASCII box plots for terminal output.
//!
//! This is intentionally "dumb" (one text row per country on a shared axis),
//! optimized for:
//! - quick visual comparison between countries in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - whiskers: `|---` ... `---|`
//! - box (q1..q3): `[===]`
//! - median: `#`
//! - outliers: `o`

use crate::domain::Metric;
use crate::report::{BoxStats, fmt_value};

/// Render one horizontal box per country on a common value axis.
pub fn render_ascii_boxplot(metric: Metric, stats: &[(String, BoxStats)], width: usize) -> String {
    let width = width.max(10);
    let mut out = String::new();
    out.push_str(&format!("Boxplot: {}\n", metric.label()));

    let Some((lo, hi)) = value_range(stats) else {
        out.push_str("(no values)\n");
        return out;
    };
    let (lo, hi) = pad_range(lo, hi, 0.02);

    let name_width = stats.iter().map(|(c, _)| c.chars().count()).max().unwrap_or(0);

    for (country, s) in stats {
        let mut row = vec![' '; width];
        let x = |v: f64| map_x(v, lo, hi, width);

        let (wl, q1, med, q3, wh) = (x(s.lower_whisker), x(s.q1), x(s.median), x(s.q3), x(s.upper_whisker));
        fill(&mut row, wl, q1, '-');
        fill(&mut row, q3, wh, '-');
        fill(&mut row, q1, q3, '=');
        row[wl] = '|';
        row[wh] = '|';
        row[q1] = '[';
        row[q3] = ']';
        row[med] = '#';
        for &o in &s.outliers {
            row[x(o)] = 'o';
        }

        let line: String = row.into_iter().collect();
        out.push_str(format!("{country:<name_width$} {line}").trim_end());
        out.push('\n');
    }

    let left = fmt_value(metric, Some(lo));
    let right = fmt_value(metric, Some(hi));
    let gap = width.saturating_sub(left.len() + right.len()).max(1);
    out.push_str(&format!("{:name_width$} {left}{}{right}\n", "", " ".repeat(gap)));

    out
}

fn value_range(stats: &[(String, BoxStats)]) -> Option<(f64, f64)> {
    let lo = stats.iter().map(|(_, s)| s.min).fold(f64::INFINITY, f64::min);
    let hi = stats.iter().map(|(_, s)| s.max).fold(f64::NEG_INFINITY, f64::max);
    if !(lo.is_finite() && hi.is_finite()) {
        return None;
    }
    if hi > lo { Some((lo, hi)) } else { Some((lo - 0.5, hi + 0.5)) }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(v: f64, lo: f64, hi: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn fill(row: &mut [char], from: usize, to: usize, ch: char) {
    let (a, b) = if from <= to { (from, to) } else { (to, from) };
    for cell in &mut row[a..=b] {
        *cell = ch;
    }
}
