//! ### Compute
//! Reshaping of flow tables loaded through the `convert` module:
//! time bucketing and sign isolation for stacked charts.

use crate::error::{ProfileError, ProfileResult};
use crate::table::{PeriodBlock, PeriodTable};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

/// Averages rows into buckets of `granularity` base timesteps.
///
/// Each row's timestep becomes `floor(step / granularity) * granularity`
/// and rows sharing (period, bucket) are replaced by their column-wise
/// mean. A granularity of 1 returns the table unchanged.
#[instrument(skip(table), fields(table = table.name()))]
pub fn granularise(table: &PeriodTable, granularity: u32) -> ProfileResult<PeriodTable> {
    if granularity == 0 {
        return Err(ProfileError::InvalidGranularity { granularity });
    }

    let mut out = PeriodTable::new(table.name(), table.columns().to_vec());
    for block in table.blocks() {
        let mut buckets: BTreeMap<u32, (Vec<f64>, usize)> = BTreeMap::new();
        for (step, row) in block.steps.iter().zip(&block.rows) {
            let bucket = (step / granularity) * granularity;
            match buckets.get_mut(&bucket) {
                Some((sums, count)) => {
                    for (acc, val) in sums.iter_mut().zip(row) {
                        *acc += val;
                    }
                    *count += 1;
                }
                None => {
                    buckets.insert(bucket, (row.clone(), 1));
                }
            }
        }

        let (steps, rows): (Vec<u32>, Vec<Vec<f64>>) = buckets
            .into_iter()
            .map(|(bucket, (mut sums, count))| {
                if count > 1 {
                    for val in sums.iter_mut() {
                        *val /= count as f64;
                    }
                }
                (bucket, sums)
            })
            .unzip();
        out.push_block(PeriodBlock {
            label: block.label.clone(),
            steps,
            rows,
        });
    }

    debug!(rows_in = table.len(), rows_out = out.len(), "granularised");
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sign {
    Pos,
    Neg,
}

impl Sign {
    pub const BOTH: [Sign; 2] = [Sign::Pos, Sign::Neg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sign::Pos => "pos",
            Sign::Neg => "neg",
        }
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sign {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pos" => Ok(Sign::Pos),
            "neg" => Ok(Sign::Neg),
            other => Err(ProfileError::InvalidSign {
                sign: other.to_string(),
            }),
        }
    }
}

/// Keeps only the non-negative (`Pos`) or non-positive (`Neg`) part of
/// every cell; the other part becomes zero. Summing both results gives
/// back the input.
pub fn isolate_by_sign(table: &PeriodTable, sign: Sign) -> PeriodTable {
    match sign {
        Sign::Pos => table.map_values(|v| if v >= 0. { v } else { 0. }),
        Sign::Neg => table.map_values(|v| if v <= 0. { v } else { 0. }),
    }
}
