//! ### Graph
//! Assembles chart descriptors from reconstructed profiles. A [`Figure`]
//! is a grid of panels plus a flat list of traces; `render` draws it to
//! PNG and the CLI can also export it as JSON for a web renderer.

use crate::compute::{isolate_by_sign, Sign};
use crate::error::{ProfileError, ProfileResult};
use crate::profile::build_full_profile;
use crate::session::Pipeline;
use crate::table::PeriodTable;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument};

/// Stacking priority. Columns containing an earlier substring are stacked
/// first; anything unmatched follows in its original order.
pub const STACK_PRIORITY: [&str; 21] = [
    "emand",
    "nterconnector",
    "ic_",
    "uclear",
    "HINKLEY",
    "SIZEWELL",
    "EV",
    "Thermal",
    "ccgt",
    "CCGT",
    "iomass",
    "DRAX",
    "H2",
    "h2",
    "ydrogen",
    "enewable",
    "Wind",
    "PV",
    "V2G",
    "storage",
    "Backstop",
];

const DASHBOARD_LEGEND_GROUP: &str = "group1";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum XValues {
    Steps(Vec<u32>),
    /// Two-level axis of (assembled period label, timestep).
    Periods { periods: Vec<String>, steps: Vec<u32> },
}

impl XValues {
    fn of_table(table: &PeriodTable) -> Self {
        let (periods, steps): (Vec<String>, Vec<u32>) = table
            .blocks()
            .iter()
            .flat_map(|b| b.steps.iter().map(move |s| (b.label.clone(), *s)))
            .unzip();
        XValues::Periods { periods, steps }
    }

    pub fn len(&self) -> usize {
        match self {
            XValues::Steps(steps) => steps.len(),
            XValues::Periods { steps, .. } => steps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FillMode {
    #[serde(rename = "tonexty")]
    ToNextY,
    #[serde(rename = "none")]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineShape {
    /// Each value holds until the next x.
    StepAfter,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    /// 1-based grid position.
    pub row: usize,
    pub col: usize,
    pub x: XValues,
    pub y: Vec<f64>,
    pub name: String,
    pub color: Option<String>,
    pub stack_group: Option<Sign>,
    pub fill: FillMode,
    pub line_shape: LineShape,
    pub line_width: f64,
    pub show_legend: bool,
    pub legend_group: Option<String>,
    pub secondary_y: bool,
    /// Year the trace belongs to, for the year selector.
    pub tag: Option<i32>,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridLayout {
    pub rows: usize,
    pub cols: usize,
    pub shared_x: bool,
    pub shared_y: bool,
    pub row_heights: Option<Vec<f64>>,
    /// Rows whose panels carry a secondary y-axis.
    pub secondary_y_rows: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectorOption {
    pub label: String,
    pub year: i32,
    pub visible: Vec<bool>,
}

/// Drop-down of years; each option carries the full trace visibility mask.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSelector {
    pub options: Vec<SelectorOption>,
    pub active: usize,
}

impl YearSelector {
    /// One option per year, visible where the trace tag equals the year.
    pub fn from_tags(traces: &[Trace], years: &[i32]) -> Self {
        let options = years
            .iter()
            .map(|&year| SelectorOption {
                label: year.to_string(),
                year,
                visible: traces.iter().map(|t| t.tag == Some(year)).collect(),
            })
            .collect();
        Self { options, active: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub title: Option<String>,
    pub height: Option<u32>,
    pub layout: GridLayout,
    pub show_legend: bool,
    pub traces: Vec<Trace>,
    pub selector: Option<YearSelector>,
}

impl Figure {
    /// Makes the selector option for `year` active and applies its mask.
    /// Returns false if the figure has no such option.
    pub fn select_year(&mut self, year: i32) -> bool {
        let Some(selector) = self.selector.as_mut() else {
            return false;
        };
        let Some(idx) = selector.options.iter().position(|o| o.year == year) else {
            return false;
        };
        selector.active = idx;
        for (trace, &visible) in self.traces.iter_mut().zip(&selector.options[idx].visible) {
            trace.visible = visible;
        }
        true
    }

    pub fn visible_traces(&self) -> impl Iterator<Item = &Trace> {
        self.traces.iter().filter(|t| t.visible)
    }
}

/// Orders columns for stacking by [`STACK_PRIORITY`], without duplicates.
pub fn column_order(columns: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    STACK_PRIORITY
        .iter()
        .flat_map(|key| columns.iter().filter(move |c| c.contains(key)))
        .chain(columns.iter())
        .filter(|c| seen.insert(*c))
        .cloned()
        .collect()
}

/// Dashboard column bucket of a representative period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Summer,
    Winter,
    Other,
}

impl Season {
    pub fn of(period: &str) -> Self {
        if period.contains("ummer") {
            Season::Summer
        } else if period.contains("inter") {
            Season::Winter
        } else {
            Season::Other
        }
    }

    pub fn column(self) -> usize {
        match self {
            Season::Summer => 1,
            Season::Winter => 2,
            Season::Other => 3,
        }
    }
}

/// Positive and negative stacks of every column, in stacking order.
fn sign_traces(
    table: &PeriodTable,
    colors: &BTreeMap<String, String>,
    (row, col): (usize, usize),
    x: &XValues,
    scale: f64,
) -> ProfileResult<Vec<Trace>> {
    let mut traces = Vec::new();
    for sign in Sign::BOTH {
        let part = isolate_by_sign(table, sign);
        for column in column_order(part.columns()) {
            let Some(idx) = part.column_index(&column) else {
                continue;
            };
            let color = colors
                .get(&column)
                .ok_or_else(|| ProfileError::UnresolvedGroup {
                    group: column.clone(),
                })?;
            traces.push(Trace {
                row,
                col,
                x: x.clone(),
                y: part
                    .blocks()
                    .iter()
                    .flat_map(|b| b.column(idx))
                    .map(|v| v / scale)
                    .collect(),
                name: column,
                color: Some(color.clone()),
                stack_group: Some(sign),
                fill: FillMode::ToNextY,
                line_shape: LineShape::StepAfter,
                line_width: 0.,
                show_legend: true,
                legend_group: None,
                secondary_y: false,
                tag: None,
                visible: true,
            });
        }
    }
    Ok(traces)
}

/// One stacked panel per node over the whole reconstructed horizon.
#[instrument(skip(pipeline))]
pub fn plot_full_period(pipeline: &Pipeline, granularity: u32) -> ProfileResult<Figure> {
    let nodes = pipeline.nodes();
    let mut traces = Vec::new();

    for (idx, node) in nodes.iter().enumerate() {
        let grouped = pipeline.grouped(node, granularity)?;
        let colors = pipeline.tech_map().resolve_colors(&grouped)?;
        let full = build_full_profile(&grouped, pipeline.patterns(), granularity)?;
        let x = XValues::of_table(&full);
        traces.extend(sign_traces(&full, &colors, (idx + 1, 1), &x, 1.)?);
    }

    debug!(traces = traces.len(), "assembled full-period figure");
    Ok(Figure {
        title: None,
        height: None,
        layout: GridLayout {
            rows: nodes.len(),
            cols: 1,
            shared_x: true,
            shared_y: false,
            row_heights: None,
            secondary_y_rows: Vec::new(),
        },
        show_legend: true,
        traces,
        selector: None,
    })
}

/// One column per representative period of `year`, one row per node.
#[instrument(skip(pipeline))]
pub fn plot_year(pipeline: &Pipeline, year: i32, granularity: u32) -> ProfileResult<Figure> {
    let periods = pipeline.patterns().names_in_year(year);
    if periods.is_empty() {
        return Err(ProfileError::UnknownYear { year });
    }
    let nodes = pipeline.nodes();
    let mut traces = Vec::new();

    for (row_idx, node) in nodes.iter().enumerate() {
        let grouped = pipeline.grouped(node, granularity)?;
        let colors = pipeline.tech_map().resolve_colors(&grouped)?;
        for (col_idx, period) in periods.iter().enumerate() {
            let season = grouped.select_period(period)?;
            let x = XValues::Steps(season.blocks()[0].steps.clone());
            traces.extend(
                sign_traces(&season, &colors, (row_idx + 1, col_idx + 1), &x, 1.)?
                    .into_iter()
                    .map(|t| Trace {
                        show_legend: false,
                        ..t
                    }),
            );
        }
    }

    Ok(Figure {
        title: None,
        height: None,
        layout: GridLayout {
            rows: nodes.len(),
            cols: periods.len(),
            shared_x: true,
            shared_y: true,
            row_heights: None,
            secondary_y_rows: Vec::new(),
        },
        show_legend: false,
        traces,
        selector: None,
    })
}

/// 3x3 dashboard: supply/demand of the first node in row 1, storage
/// levels in row 2 and the second node in row 3, with seasons as columns
/// and a year selector. More than two nodes is an error, since row 3
/// would stack unrelated nodes together.
#[instrument(skip(pipeline))]
pub fn plot_selectable_year(pipeline: &Pipeline, granularity: u32) -> ProfileResult<Figure> {
    let count = pipeline.nodes().len();
    if count > 2 {
        return Err(ProfileError::DashboardNodes { count });
    }
    let config = pipeline.config();
    let scale = config.dashboard_scale;

    let mut grouped = Vec::new();
    for node in pipeline.nodes() {
        let table = pipeline.grouped(node, granularity)?;
        let colors = pipeline.tech_map().resolve_colors(&table)?;
        grouped.push((table, colors));
    }
    let storage = pipeline.storage();

    let years = pipeline.patterns().years();
    let mut traces = Vec::new();
    for &year in &years {
        for period in pipeline.patterns().names_in_year(year) {
            let col = Season::of(period).column();

            for (node_idx, (table, colors)) in grouped.iter().enumerate() {
                let row = if node_idx == 0 { 1 } else { 3 };
                let season = table.select_period(period)?;
                let x = XValues::Steps(season.blocks()[0].steps.clone());
                traces.extend(
                    sign_traces(&season, colors, (row, col), &x, scale)?
                        .into_iter()
                        .map(|t| Trace {
                            legend_group: Some(DASHBOARD_LEGEND_GROUP.to_string()),
                            tag: Some(year),
                            ..t
                        }),
                );
            }

            let levels = storage.period(period)?;
            let window = levels.len().min(config.storage_window);
            let x = XValues::Steps((0..window as u32).collect());
            for (idx, column) in storage.columns().iter().enumerate() {
                traces.push(Trace {
                    row: 2,
                    col,
                    x: x.clone(),
                    y: levels.column(idx).take(window).map(|v| v / scale).collect(),
                    name: column.clone(),
                    color: None,
                    stack_group: None,
                    fill: FillMode::None,
                    line_shape: LineShape::Linear,
                    line_width: 1.,
                    show_legend: true,
                    legend_group: Some(DASHBOARD_LEGEND_GROUP.to_string()),
                    secondary_y: column.contains(&config.secondary_axis_marker),
                    tag: Some(year),
                    visible: true,
                });
            }
        }
    }

    // one legend entry per (year, name), so the selected year shows each
    // series exactly once
    let mut listed = HashSet::new();
    for trace in traces.iter_mut() {
        trace.show_legend = listed.insert((trace.tag, trace.name.clone()));
    }

    let selector = YearSelector::from_tags(&traces, &years);
    let mut figure = Figure {
        title: Some("Displaying values per year".to_string()),
        height: Some(500),
        layout: GridLayout {
            rows: 3,
            cols: 3,
            shared_x: true,
            shared_y: false,
            row_heights: Some(vec![0.4, 0.2, 0.4]),
            secondary_y_rows: vec![2],
        },
        show_legend: true,
        traces,
        selector: Some(selector),
    };
    if let Some(&first) = years.first() {
        figure.select_year(first);
    }

    debug!(traces = figure.traces.len(), years = years.len(), "assembled dashboard");
    Ok(figure)
}
