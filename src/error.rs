//! ### Error
//! Failures raised while loading results artifacts and reshaping them
//! into chartable profiles. Every variant names the table, period, or
//! group that caused it.

use std::path::PathBuf;

pub type ProfileResult<T> = Result<T, ProfileError>;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// A required table or column is absent, or a cell cannot be typed.
    #[error("cannot load table `{table}`: {detail}")]
    Load { table: String, detail: String },

    #[error("cannot read {path}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed csv in table `{table}`")]
    Csv { table: String, source: csv::Error },

    #[error("sqlite error reading table `{table}`")]
    Sqlite {
        table: String,
        source: rusqlite::Error,
    },

    /// The technology map is ambiguous or missing required entries.
    #[error("invalid technology map: {detail}")]
    TechMap { detail: String },

    #[error("period `{period}` has no rows in table `{table}`")]
    MissingPeriod { period: String, table: String },

    #[error("group `{group}` has no color mapping")]
    UnresolvedGroup { group: String },

    #[error("sign must be either 'pos' or 'neg', got '{sign}'")]
    InvalidSign { sign: String },

    #[error("granularity must be at least 1, got {granularity}")]
    InvalidGranularity { granularity: u32 },

    #[error("no representative periods belong to year {year}")]
    UnknownYear { year: i32 },

    /// The dashboard has one row for the first node and one for the rest.
    #[error("the year dashboard takes one or two nodes, got {count}")]
    DashboardNodes { count: usize },
}

impl ProfileError {
    pub(crate) fn load(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Load {
            table: table.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn missing_period(period: impl Into<String>, table: impl Into<String>) -> Self {
        Self::MissingPeriod {
            period: period.into(),
            table: table.into(),
        }
    }
}
