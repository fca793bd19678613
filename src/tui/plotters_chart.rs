//! Plotters-powered box plot widget for Ratatui.
//!
//! We render Plotters output into the Ratatui buffer using `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

use crate::report::BoxStats;

/// Half the width of a box, in category units.
const BOX_HALF_WIDTH: f64 = 0.3;

const PALETTE: [RGBColor; 6] = [
    RGBColor(0, 255, 255),
    RGBColor(255, 165, 0),
    RGBColor(0, 255, 0),
    RGBColor(255, 0, 255),
    RGBColor(255, 255, 0),
    RGBColor(135, 206, 250),
];

/// One box per country, countries along the x axis.
///
/// Bounds are computed by the caller (see [`y_bounds`]); `render()` only draws.
pub struct BoxPlotChart<'a> {
    pub boxes: &'a [(String, BoxStats)],
    pub y_bounds: [f64; 2],
    pub y_label: &'a str,
    pub fmt_y: fn(f64) -> String,
}

impl<'a> Widget for BoxPlotChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let [y0, y1] = self.y_bounds;
        if self.boxes.is_empty() || !(y0.is_finite() && y1.is_finite()) || y1 <= y0 {
            return;
        }
        let x0 = -0.5;
        let x1 = self.boxes.len() as f64 - 0.5;

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                .set_label_area_size(LabelAreaPosition::Left, 10)
                .set_label_area_size(LabelAreaPosition::Bottom, 2)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            let names: Vec<&str> = self.boxes.iter().map(|(c, _)| c.as_str()).collect();
            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .y_desc(self.y_label)
                .x_labels(names.len())
                .y_labels(5)
                .x_label_formatter(&|v| category_label(&names, *v))
                .y_label_formatter(&|v| (self.fmt_y)(*v))
                .label_style(("sans-serif", 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .draw()?;

            for (i, (_, stats)) in self.boxes.iter().enumerate() {
                let color = PALETTE[i % PALETTE.len()];
                for segment in box_segments(i as f64, stats) {
                    chart.draw_series(LineSeries::new(segment, &color))?;
                }
                // `Circle` radii come out far too large on this backend; pixels stay crisp.
                chart.draw_series(stats.outliers.iter().map(|&y| Pixel::new((i as f64, y), color)))?;
            }

            Ok(())
        });

        widget.render(area, buf);
    }
}

/// Polylines for one box centered at `x`: outline, median, and both whiskers with caps.
pub fn box_segments(x: f64, s: &BoxStats) -> Vec<Vec<(f64, f64)>> {
    let (l, r) = (x - BOX_HALF_WIDTH, x + BOX_HALF_WIDTH);
    let cap = BOX_HALF_WIDTH / 2.0;
    vec![
        vec![(l, s.q1), (r, s.q1), (r, s.q3), (l, s.q3), (l, s.q1)],
        vec![(l, s.median), (r, s.median)],
        vec![(x, s.q1), (x, s.lower_whisker)],
        vec![(x - cap, s.lower_whisker), (x + cap, s.lower_whisker)],
        vec![(x, s.q3), (x, s.upper_whisker)],
        vec![(x - cap, s.upper_whisker), (x + cap, s.upper_whisker)],
    ]
}

/// Value bounds covering every box and outlier, padded by 5%.
pub fn y_bounds(boxes: &[(String, BoxStats)]) -> [f64; 2] {
    let lo = boxes.iter().map(|(_, s)| s.min).fold(f64::INFINITY, f64::min);
    let hi = boxes.iter().map(|(_, s)| s.max).fold(f64::NEG_INFINITY, f64::max);
    if !(lo.is_finite() && hi.is_finite()) {
        return [0.0, 1.0];
    }
    if hi <= lo {
        let pad = lo.abs().max(1.0) * 0.1;
        return [lo - pad, hi + pad];
    }
    let pad = (hi - lo) * 0.05;
    [lo - pad, hi + pad]
}

fn category_label(names: &[&str], v: f64) -> String {
    let idx = v.round();
    if (v - idx).abs() > 0.05 || idx < 0.0 {
        return String::new();
    }
    names.get(idx as usize).map(|n| n.to_string()).unwrap_or_default()
}
