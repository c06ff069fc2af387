//! ### Tech map
//! Technology grouping and coloring. Raw actor columns are folded into
//! coarser technology groups, and each group gets a display color.

use crate::error::{ProfileError, ProfileResult};
use crate::table::{PeriodBlock, PeriodTable};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Column of the technology map holding raw actor names.
pub const ACTORS_COLUMN: &str = "actors";

/// One line of the technology map after the grouping and coloring
/// columns have been selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TechRow {
    pub actor: String,
    pub group: String,
    pub color: String,
}

/// Actor → group and group → color lookups, validated once at load.
#[derive(Debug, Clone, Default)]
pub struct TechMap {
    groups: HashMap<String, String>,
    colors: HashMap<String, String>,
}

impl TechMap {
    /// Builds the lookups, rejecting blank cells, actors listed under two
    /// groups and groups listed with two colors.
    pub fn from_rows(rows: impl IntoIterator<Item = TechRow>) -> ProfileResult<Self> {
        let mut map = TechMap::default();
        for (idx, row) in rows.into_iter().enumerate() {
            if row.actor.is_empty() || row.group.is_empty() || row.color.is_empty() {
                return Err(ProfileError::TechMap {
                    detail: format!("row {idx} has a blank actor, group or color"),
                });
            }
            if let Some(prev) = map.groups.get(&row.actor) {
                if *prev != row.group {
                    return Err(ProfileError::TechMap {
                        detail: format!(
                            "actor `{}` maps to both `{prev}` and `{}`",
                            row.actor, row.group
                        ),
                    });
                }
            }
            if let Some(prev) = map.colors.get(&row.group) {
                if *prev != row.color {
                    return Err(ProfileError::TechMap {
                        detail: format!(
                            "group `{}` is colored both `{prev}` and `{}`",
                            row.group, row.color
                        ),
                    });
                }
            }
            map.colors.insert(row.group.clone(), row.color);
            map.groups.insert(row.actor, row.group);
        }
        Ok(map)
    }

    /// Reads a technology map CSV, taking group ids from `grouping_column`
    /// and colors from `coloring_column`.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub fn load_csv(
        path: &Path,
        grouping_column: &str,
        coloring_column: &str,
    ) -> ProfileResult<Self> {
        let table = path.display().to_string();
        let mut reader = csv::Reader::from_path(path).map_err(|source| ProfileError::Csv {
            table: table.clone(),
            source,
        })?;
        let headers = reader
            .headers()
            .map_err(|source| ProfileError::Csv {
                table: table.clone(),
                source,
            })?
            .clone();
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| ProfileError::TechMap {
                    detail: format!("{table} has no `{name}` column"),
                })
        };
        let (actor_idx, group_idx, color_idx) =
            (find(ACTORS_COLUMN)?, find(grouping_column)?, find(coloring_column)?);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| ProfileError::Csv {
                table: table.clone(),
                source,
            })?;
            let cell = |idx: usize| record.get(idx).unwrap_or_default().trim().to_string();
            rows.push(TechRow {
                actor: cell(actor_idx),
                group: cell(group_idx),
                color: cell(color_idx),
            });
        }

        let map = Self::from_rows(rows)?;
        info!(
            actors = map.groups.len(),
            groups = map.colors.len(),
            "loaded technology map"
        );
        Ok(map)
    }

    pub fn group_of(&self, actor: &str) -> Option<&str> {
        self.groups.get(actor).map(String::as_str)
    }

    pub fn color_of(&self, group: &str) -> Option<&str> {
        self.colors.get(group).map(String::as_str)
    }

    /// Columns with no grouping entry. These pass through [`TechMap::group`]
    /// under their own name.
    pub fn unmapped<'a>(&self, columns: &'a [String]) -> Vec<&'a str> {
        columns
            .iter()
            .filter(|c| !self.groups.contains_key(*c))
            .map(String::as_str)
            .collect()
    }

    /// Renames every column to its group and sums columns that land in
    /// the same group. Group columns keep first-appearance order.
    #[instrument(skip_all, fields(table = table.name()))]
    pub fn group(&self, table: &PeriodTable) -> PeriodTable {
        let unmapped = self.unmapped(table.columns());
        if !unmapped.is_empty() {
            warn!(?unmapped, "actors without a group pass through unchanged");
        }

        let mut columns: Vec<String> = Vec::new();
        let targets: Vec<usize> = table
            .columns()
            .iter()
            .map(|actor| {
                let group = self.group_of(actor).unwrap_or(actor.as_str());
                match columns.iter().position(|c| c == group) {
                    Some(pos) => pos,
                    None => {
                        columns.push(group.to_string());
                        columns.len() - 1
                    }
                }
            })
            .collect();

        let mut out = PeriodTable::new(table.name(), columns);
        let width = out.columns().len();
        for block in table.blocks() {
            let rows = block
                .rows
                .iter()
                .map(|row| {
                    let mut grouped = vec![0.; width];
                    for (val, &target) in row.iter().zip(&targets) {
                        grouped[target] += val;
                    }
                    grouped
                })
                .collect();
            out.push_block(PeriodBlock {
                label: block.label.clone(),
                steps: block.steps.clone(),
                rows,
            });
        }

        debug!(
            actors = table.columns().len(),
            groups = width,
            "grouped actor columns"
        );
        out
    }

    /// Display color for every column of `table`.
    pub fn resolve_colors(&self, table: &PeriodTable) -> ProfileResult<BTreeMap<String, String>> {
        table
            .columns()
            .iter()
            .map(|group| {
                self.color_of(group)
                    .map(|color| (group.clone(), color.to_string()))
                    .ok_or_else(|| ProfileError::UnresolvedGroup {
                        group: group.clone(),
                    })
            })
            .collect()
    }
}
