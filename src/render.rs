//! ### Render
//! Draws a [`Figure`] to a PNG: stacked step areas per stack group and
//! plain lines for unstacked traces, one panel per grid cell.

use crate::compute::Sign;
use crate::graph::{Figure, LineShape, Trace, XValues};
use plotters::backend::BitMapBackend;
use plotters::chart::{ChartBuilder, SeriesLabelPosition};
use plotters::coord::Shift;
use plotters::drawing::{DrawingArea, IntoDrawingArea};
use plotters::element::{Polygon, Rectangle};
use plotters::series::LineSeries;
use plotters::style::{Color, Palette, Palette99, RGBColor, BLACK, WHITE};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

pub struct Graphing<'a> {
    path: &'a Path,
}

struct Band<'t> {
    trace: &'t Trace,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl<'a> Graphing<'a> {
    const CHART_COLOR: RGBColor = WHITE;
    const PANEL_SIZE: (u32, u32) = (720, 360);

    pub fn new(path: &'a Path) -> Self {
        Graphing { path }
    }

    pub fn figure(&self, figure: &Figure) -> anyhow::Result<()> {
        let rows = figure.layout.rows.max(1);
        let cols = figure.layout.cols.max(1);
        let size = (
            Self::PANEL_SIZE.0 * cols as u32,
            Self::PANEL_SIZE.1 * rows as u32,
        );

        let root = BitMapBackend::new(self.path, size).into_drawing_area();
        root.fill(&Self::CHART_COLOR)?;
        let root = match &figure.title {
            Some(title) => root.titled(title, ("sans-serif", 30))?,
            None => root,
        };

        for (idx, area) in root.split_evenly((rows, cols)).iter().enumerate() {
            let (row, col) = (idx / cols + 1, idx % cols + 1);
            let traces: Vec<&Trace> = figure
                .visible_traces()
                .filter(|t| t.row == row && t.col == col)
                .collect();
            if !traces.is_empty() {
                Self::panel(area, &traces, figure.show_legend)?;
            }
        }

        root.present()?;
        debug!(path = %self.path.display(), "figure rendered");
        Ok(())
    }

    fn panel(
        area: &DrawingArea<BitMapBackend<'_>, Shift>,
        traces: &[&Trace],
        show_legend: bool,
    ) -> anyhow::Result<()> {
        let len = traces.iter().map(|t| t.y.len()).max().unwrap_or(0);
        let x_max = len.max(1) as f64;

        // stack each group on top of the running total of that group
        let mut tops: HashMap<Sign, Vec<f64>> = HashMap::new();
        let mut bands = Vec::new();
        let mut lines = Vec::new();
        for &trace in traces {
            match trace.stack_group {
                Some(sign) => {
                    let top = tops.entry(sign).or_insert_with(|| vec![0.; len]);
                    let lower = top.clone();
                    for (acc, y) in top.iter_mut().zip(&trace.y) {
                        *acc += y;
                    }
                    bands.push(Band {
                        trace,
                        lower,
                        upper: top.clone(),
                    });
                }
                None => lines.push(trace),
            }
        }

        let primary = bands
            .iter()
            .flat_map(|b| b.lower.iter().chain(&b.upper))
            .chain(lines.iter().filter(|t| !t.secondary_y).flat_map(|t| &t.y));
        let (y_min, y_max) = padded_range(primary);
        let secondary = lines.iter().filter(|t| t.secondary_y).flat_map(|t| &t.y);
        let (y2_min, y2_max) = padded_range(secondary);
        let has_secondary = lines.iter().any(|t| t.secondary_y);

        let x_labels = category_labels(traces[0]);
        let mut chart = ChartBuilder::on(area)
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(50)
            .right_y_label_area_size(if has_secondary { 50 } else { 0 })
            .build_cartesian_2d(0f64..x_max, y_min..y_max)?
            .set_secondary_coord(0f64..x_max, y2_min..y2_max);

        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .x_label_formatter(&|x| match &x_labels {
                Some(labels) => labels.get(*x as usize).cloned().unwrap_or_default(),
                None => format!("{x:.0}"),
            })
            .x_label_style(("sans-serif", 12))
            .y_label_style(("sans-serif", 12))
            .draw()?;
        if has_secondary {
            chart
                .configure_secondary_axes()
                .label_style(("sans-serif", 12))
                .draw()?;
        }

        for (idx, band) in bands.iter().enumerate() {
            let color = trace_color(band.trace, idx);
            let mut points = step_points(&band.upper, band.trace.line_shape);
            points.extend(step_points(&band.lower, band.trace.line_shape).into_iter().rev());
            let anno = chart.draw_series(std::iter::once(Polygon::new(
                points,
                color.mix(0.85).filled(),
            )))?;
            if show_legend && band.trace.show_legend {
                anno.label(band.trace.name.as_str()).legend(move |(x, y)| {
                    Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled())
                });
            }
        }

        for (idx, trace) in lines.iter().enumerate() {
            let color = trace_color(trace, bands.len() + idx);
            let style = color.stroke_width(trace.line_width.max(1.) as u32);
            let series = LineSeries::new(step_points(&trace.y, trace.line_shape), style);
            let anno = if trace.secondary_y {
                chart.draw_secondary_series(series)?
            } else {
                chart.draw_series(series)?
            };
            if show_legend && trace.show_legend {
                anno.label(trace.name.as_str()).legend(move |(x, y)| {
                    Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled())
                });
            }
        }

        if show_legend {
            chart
                .configure_series_labels()
                .border_style(BLACK)
                .background_style(WHITE.mix(0.8))
                .position(SeriesLabelPosition::UpperRight)
                .label_font(("sans-serif", 12))
                .draw()?;
        }
        Ok(())
    }
}

/// Y range covering every value, including zero, with a little headroom.
fn padded_range<'v>(values: impl Iterator<Item = &'v f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((0f64, 0f64), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let pad = ((hi - lo) * 0.05).max(1e-9);
    (lo - pad, hi + pad)
}

/// Points of a series at integer x positions. Step shapes hold each value
/// until the next position.
fn step_points(values: &[f64], shape: LineShape) -> Vec<(f64, f64)> {
    match shape {
        LineShape::Linear => values
            .iter()
            .enumerate()
            .map(|(i, &y)| (i as f64, y))
            .collect(),
        LineShape::StepAfter => values
            .iter()
            .enumerate()
            .flat_map(|(i, &y)| [(i as f64, y), ((i + 1) as f64, y)])
            .collect(),
    }
}

/// Period labels at the first position of each period on two-level axes.
fn category_labels(trace: &Trace) -> Option<Vec<String>> {
    let XValues::Periods { periods, .. } = &trace.x else {
        return None;
    };
    Some(
        periods
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if i == 0 || periods[i - 1] != *p {
                    p.clone()
                } else {
                    String::new()
                }
            })
            .collect(),
    )
}

fn trace_color(trace: &Trace, fallback_idx: usize) -> RGBColor {
    let fallback = || {
        let c = Palette99::pick(fallback_idx).to_rgba();
        RGBColor(c.0, c.1, c.2)
    };
    match trace.color.as_deref() {
        None => fallback(),
        Some(raw) => parse_color(raw).unwrap_or_else(|| {
            warn!(color = raw, trace = %trace.name, "unrecognised color, using palette");
            fallback()
        }),
    }
}

/// Accepts `#rrggbb`, `#rgb` and `rgb(r, g, b)` / `rgba(r, g, b, a)`.
pub fn parse_color(raw: &str) -> Option<RGBColor> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix('#') {
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        return match hex.len() {
            6 => Some(RGBColor(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(RGBColor(
                channel(&hex[0..1])? * 17,
                channel(&hex[1..2])? * 17,
                channel(&hex[2..3])? * 17,
            )),
            _ => None,
        };
    }
    let inner = raw
        .strip_prefix("rgba(")
        .or_else(|| raw.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let mut parts = inner.split(',').map(|p| p.trim().parse::<u8>().ok());
    Some(RGBColor(parts.next()??, parts.next()??, parts.next()??))
}
