//! ### Table
//! In-memory tables keyed by (period, timestep). Flow tables, grouped
//! tables, storage levels and reconstructed full profiles all share the
//! same shape: a fixed list of value columns and one block of rows per
//! period label.

use crate::convert::PATTERNS_TABLE;
use crate::error::{ProfileError, ProfileResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// All rows belonging to one period label, ascending by timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodBlock {
    pub label: String,
    pub steps: Vec<u32>,
    pub rows: Vec<Vec<f64>>,
}

impl PeriodBlock {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |row| row[idx])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodTable {
    name: String,
    columns: Vec<String>,
    blocks: Vec<PeriodBlock>,
}

impl PeriodTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            blocks: Vec::new(),
        }
    }

    /// Builds a table from loose `(period, timestep, values)` rows. Periods
    /// keep the order they first appear in; rows inside a period are
    /// sorted by timestep. A (period, timestep) pair may appear only once.
    pub fn from_rows(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: impl IntoIterator<Item = (String, u32, Vec<f64>)>,
    ) -> ProfileResult<Self> {
        let mut table = Self::new(name, columns);
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (label, step, values) in rows {
            if values.len() != table.columns.len() {
                return Err(ProfileError::load(
                    &table.name,
                    format!(
                        "row ({label}, {step}) has {} values, expected {}",
                        values.len(),
                        table.columns.len()
                    ),
                ));
            }
            let pos = *positions.entry(label.clone()).or_insert_with(|| {
                table.blocks.push(PeriodBlock {
                    label,
                    steps: Vec::new(),
                    rows: Vec::new(),
                });
                table.blocks.len() - 1
            });
            table.blocks[pos].steps.push(step);
            table.blocks[pos].rows.push(values);
        }

        for block in table.blocks.iter_mut() {
            let mut order: Vec<usize> = (0..block.steps.len()).collect();
            order.sort_by_key(|&i| block.steps[i]);
            block.steps = order.iter().map(|&i| block.steps[i]).collect();
            block.rows = order.iter().map(|&i| block.rows[i].clone()).collect();

            if let Some(pair) = block.steps.windows(2).find(|w| w[0] == w[1]) {
                return Err(ProfileError::load(
                    &table.name,
                    format!(
                        "period `{}` has more than one row at timestep {}",
                        block.label, pair[0]
                    ),
                ));
            }
        }

        Ok(table)
    }

    pub(crate) fn push_block(&mut self, block: PeriodBlock) {
        debug_assert!(block.rows.iter().all(|r| r.len() == self.columns.len()));
        self.blocks.push(block);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn blocks(&self) -> &[PeriodBlock] {
        &self.blocks
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Rows of one period, or [`ProfileError::MissingPeriod`].
    pub fn period(&self, label: &str) -> ProfileResult<&PeriodBlock> {
        self.blocks
            .iter()
            .find(|b| b.label == label)
            .ok_or_else(|| ProfileError::missing_period(label, &self.name))
    }

    /// Total row count over every period.
    pub fn len(&self) -> usize {
        self.blocks.iter().map(PeriodBlock::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies `f` to every cell, keeping the index and columns.
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            name: self.name.clone(),
            columns: self.columns.clone(),
            blocks: self
                .blocks
                .iter()
                .map(|b| PeriodBlock {
                    label: b.label.clone(),
                    steps: b.steps.clone(),
                    rows: b
                        .rows
                        .iter()
                        .map(|row| row.iter().map(|&v| f(v)).collect())
                        .collect(),
                })
                .collect(),
        }
    }

    /// A table holding only the given period, used by per-period views.
    pub fn select_period(&self, label: &str) -> ProfileResult<Self> {
        let block = self.period(label)?.clone();
        Ok(Self {
            name: self.name.clone(),
            columns: self.columns.clone(),
            blocks: vec![block],
        })
    }
}

/// One representative period's place in the planning horizon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    pub order: i64,
    pub reps: u32,
    pub year: i32,
}

/// Patterns sorted by ascending `order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTable {
    patterns: Vec<Pattern>,
}

impl PatternTable {
    pub fn new(mut patterns: Vec<Pattern>) -> ProfileResult<Self> {
        patterns.sort_by_key(|p| p.order);
        for pair in patterns.windows(2) {
            if pair[0].order == pair[1].order {
                return Err(ProfileError::load(
                    PATTERNS_TABLE,
                    format!(
                        "order {} is used by both `{}` and `{}`",
                        pair[0].order, pair[0].name, pair[1].name
                    ),
                ));
            }
        }
        if let Some(p) = patterns.iter().find(|p| p.reps == 0) {
            return Err(ProfileError::load(
                PATTERNS_TABLE,
                format!("pattern `{}` at order {} has zero reps", p.name, p.order),
            ));
        }
        Ok(Self { patterns })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Distinct years in assembly order.
    pub fn years(&self) -> Vec<i32> {
        let mut seen = HashSet::new();
        self.patterns
            .iter()
            .filter(|p| seen.insert(p.year))
            .map(|p| p.year)
            .collect()
    }

    /// Distinct period names used in `year`, in assembly order.
    pub fn names_in_year(&self, year: i32) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.patterns
            .iter()
            .filter(|p| p.year == year && seen.insert(p.name.as_str()))
            .map(|p| p.name.as_str())
            .collect()
    }
}
