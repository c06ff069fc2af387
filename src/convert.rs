//! ### Convert
//! Reads results artifacts (a directory of CSV sheets or a SQLite
//! database of named tables) into typed tables, and writes reconstructed
//! profiles back out as CSV.

use crate::error::{ProfileError, ProfileResult};
use crate::table::{Pattern, PatternTable, PeriodBlock, PeriodTable};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub const PATTERNS_TABLE: &str = "df_patterns";
pub const STORAGE_TABLE: &str = "storage_lvl";
pub const PERIOD_COLUMN: &str = "p";
pub const FLOW_STEP_COLUMN: &str = "start";
pub const STORAGE_STEP_COLUMN: &str = "w";

pub fn flows_table(node: &str) -> String {
    format!("flows_by_w__name_{node}")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Cell::Missing;
        }
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Number(v),
            Ok(_) => Cell::Missing,
            Err(_) => Cell::Text(raw.to_string()),
        }
    }

    fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    fn as_integer(&self) -> Option<i64> {
        match self {
            Cell::Number(v) if v.fract() == 0. => Some(*v as i64),
            Cell::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Period ids may be stored as numbers; integral ones print without a
    /// trailing `.0`.
    fn as_label(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Number(v) if v.fract() == 0. => Some(format!("{}", *v as i64)),
            Cell::Number(v) => Some(v.to_string()),
            Cell::Text(s) => Some(s.clone()),
        }
    }
}

/// A raw named table: header row plus untyped cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn column(&self, header: &str) -> ProfileResult<usize> {
        self.headers
            .iter()
            .position(|h| h == header)
            .ok_or_else(|| ProfileError::load(&self.name, format!("missing column `{header}`")))
    }

    /// Replaces every missing cell with the nearest value above it in the
    /// same column. Cells with nothing above stay missing.
    pub fn forward_fill(&mut self) {
        let mut last: Vec<Cell> = vec![Cell::Missing; self.headers.len()];
        for row in self.rows.iter_mut() {
            for (cell, prev) in row.iter_mut().zip(last.iter_mut()) {
                if cell.is_missing() {
                    *cell = prev.clone();
                } else {
                    *prev = cell.clone();
                }
            }
        }
    }
}

/// Anything that can hand out named sheets of a results artifact.
pub trait TableSource {
    fn describe(&self) -> String;

    fn read_sheet(&self, name: &str) -> ProfileResult<Sheet>;
}

/// A directory holding one `<table>.csv` per sheet.
pub struct CsvDirSource {
    dir: PathBuf,
}

impl CsvDirSource {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

impl TableSource for CsvDirSource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn read_sheet(&self, name: &str) -> ProfileResult<Sheet> {
        let path = self.dir.join(format!("{name}.csv"));
        if !path.is_file() {
            return Err(ProfileError::load(
                name,
                format!("no {} in {}", path.display(), self.dir.display()),
            ));
        }
        let csv_err = |source| ProfileError::Csv {
            table: name.to_string(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(csv_err)?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let mut row: Vec<Cell> = record.iter().map(Cell::parse).collect();
            row.resize(headers.len(), Cell::Missing);
            rows.push(row);
        }

        Ok(Sheet {
            name: name.to_string(),
            headers,
            rows,
        })
    }
}

/// A SQLite database holding one table per sheet.
pub struct SqliteSource {
    path: PathBuf,
    conn: Connection,
}

impl SqliteSource {
    pub fn open(path: &Path) -> ProfileResult<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(
            |source| ProfileError::Sqlite {
                table: path.display().to_string(),
                source,
            },
        )?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }
}

impl TableSource for SqliteSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_sheet(&self, name: &str) -> ProfileResult<Sheet> {
        let sql_err = |source| ProfileError::Sqlite {
            table: name.to_string(),
            source,
        };

        let exists: i64 = self
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        if exists == 0 {
            return Err(ProfileError::load(
                name,
                format!("no such table in {}", self.path.display()),
            ));
        }

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM \"{}\"", name.replace('"', "\"\"")))
            .map_err(sql_err)?;
        let headers: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = headers.len();

        let mut rows = Vec::new();
        let mut query = stmt.query([]).map_err(sql_err)?;
        while let Some(row) = query.next().map_err(sql_err)? {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                let cell = match row.get_ref(idx).map_err(sql_err)? {
                    ValueRef::Null => Cell::Missing,
                    ValueRef::Integer(v) => Cell::Number(v as f64),
                    ValueRef::Real(v) if v.is_finite() => Cell::Number(v),
                    ValueRef::Real(_) => Cell::Missing,
                    ValueRef::Text(raw) => Cell::parse(&String::from_utf8_lossy(raw)),
                    ValueRef::Blob(_) => {
                        return Err(ProfileError::load(
                            name,
                            format!("blob in column `{}`", headers[idx]),
                        ))
                    }
                };
                cells.push(cell);
            }
            rows.push(cells);
        }

        Ok(Sheet {
            name: name.to_string(),
            headers,
            rows,
        })
    }
}

/// Directories are read as CSV sheets, files as SQLite databases.
pub fn open_source(path: &Path) -> ProfileResult<Box<dyn TableSource>> {
    if path.is_dir() {
        Ok(Box::new(CsvDirSource::new(path)))
    } else if path.is_file() {
        Ok(Box::new(SqliteSource::open(path)?))
    } else {
        Err(ProfileError::load(
            path.display().to_string(),
            "results artifact not found",
        ))
    }
}

/// Types a forward-filled sheet indexed by (`p`, `step_column`). Every
/// other non-blank header becomes a value column.
pub fn period_table(mut sheet: Sheet, step_column: &str) -> ProfileResult<PeriodTable> {
    sheet.forward_fill();
    let period_idx = sheet.column(PERIOD_COLUMN)?;
    let step_idx = sheet.column(step_column)?;
    let value_idx: Vec<usize> = (0..sheet.headers.len())
        .filter(|&i| i != period_idx && i != step_idx && !sheet.headers[i].is_empty())
        .collect();
    let columns = value_idx.iter().map(|&i| sheet.headers[i].clone()).collect();

    let mut defaulted = 0usize;
    let mut rows = Vec::with_capacity(sheet.rows.len());
    for (row_idx, row) in sheet.rows.iter().enumerate() {
        let period = row[period_idx].as_label().ok_or_else(|| {
            ProfileError::load(&sheet.name, format!("row {row_idx} has no period id"))
        })?;
        let step = row[step_idx]
            .as_integer()
            .and_then(|s| u32::try_from(s).ok())
            .ok_or_else(|| {
                ProfileError::load(
                    &sheet.name,
                    format!("row {row_idx} has invalid timestep {:?}", row[step_idx]),
                )
            })?;
        let mut values = Vec::with_capacity(value_idx.len());
        for &i in &value_idx {
            values.push(match &row[i] {
                Cell::Number(v) => *v,
                Cell::Missing => {
                    defaulted += 1;
                    0.
                }
                Cell::Text(s) => {
                    return Err(ProfileError::load(
                        &sheet.name,
                        format!("non-numeric value `{s}` in column `{}`", sheet.headers[i]),
                    ))
                }
            });
        }
        rows.push((period, step, values));
    }

    if defaulted > 0 {
        debug!(table = %sheet.name, defaulted, "leading missing cells set to zero");
    }
    PeriodTable::from_rows(sheet.name.clone(), columns, rows)
}

pub fn pattern_table(sheet: &Sheet) -> ProfileResult<PatternTable> {
    let name_idx = sheet.column("name")?;
    let order_idx = sheet.column("order")?;
    let reps_idx = sheet.column("reps")?;
    let year_idx = sheet.column("year")?;

    let integer = |cell: &Cell, idx: usize, row_idx: usize| {
        cell.as_integer().ok_or_else(|| {
            ProfileError::load(
                &sheet.name,
                format!(
                    "row {row_idx}: `{}` is not an integer: {cell:?}",
                    sheet.headers[idx]
                ),
            )
        })
    };

    let mut patterns = Vec::with_capacity(sheet.rows.len());
    for (row_idx, row) in sheet.rows.iter().enumerate() {
        let name = row[name_idx].as_label().ok_or_else(|| {
            ProfileError::load(&sheet.name, format!("row {row_idx} has no name"))
        })?;
        let reps = integer(&row[reps_idx], reps_idx, row_idx)?;
        let year = integer(&row[year_idx], year_idx, row_idx)?;
        patterns.push(Pattern {
            name,
            order: integer(&row[order_idx], order_idx, row_idx)?,
            reps: u32::try_from(reps).map_err(|_| {
                ProfileError::load(&sheet.name, format!("row {row_idx}: reps {reps} out of range"))
            })?,
            year: i32::try_from(year).map_err(|_| {
                ProfileError::load(&sheet.name, format!("row {row_idx}: year {year} out of range"))
            })?,
        });
    }
    PatternTable::new(patterns)
}

/// Every table of one results artifact, loaded once and then read-only.
#[derive(Debug, Clone)]
pub struct ResultsSet {
    pub source: String,
    pub patterns: PatternTable,
    pub flows: Vec<(String, PeriodTable)>,
    pub storage: PeriodTable,
}

impl ResultsSet {
    #[instrument(skip(source), fields(artifact = %source.describe()))]
    pub fn load(source: &dyn TableSource, nodes: &[String]) -> ProfileResult<Self> {
        let patterns = pattern_table(&source.read_sheet(PATTERNS_TABLE)?)?;

        let mut flows = Vec::with_capacity(nodes.len());
        for node in nodes {
            let sheet = source.read_sheet(&flows_table(node))?;
            flows.push((node.clone(), period_table(sheet, FLOW_STEP_COLUMN)?));
        }

        let storage = period_table(source.read_sheet(STORAGE_TABLE)?, STORAGE_STEP_COLUMN)?;

        info!(
            patterns = patterns.len(),
            nodes = flows.len(),
            storage_columns = storage.columns().len(),
            "loaded results"
        );
        Ok(Self {
            source: source.describe(),
            patterns,
            flows,
            storage,
        })
    }

    pub fn flows(&self, node: &str) -> ProfileResult<&PeriodTable> {
        self.flows
            .iter()
            .find(|(n, _)| n == node)
            .map(|(_, table)| table)
            .ok_or_else(|| ProfileError::load(flows_table(node), "node was not loaded"))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.flows.iter().map(|(n, _)| n.as_str())
    }
}

/// Writes a profile as `p,start,<columns...>`.
pub fn write_profile_csv(output: &Path, table: &PeriodTable) -> ProfileResult<()> {
    let csv_err = |source| ProfileError::Csv {
        table: table.name().to_string(),
        source,
    };
    let mut out_csv = csv::Writer::from_path(output).map_err(csv_err)?;

    let mut header = vec![PERIOD_COLUMN.to_string(), FLOW_STEP_COLUMN.to_string()];
    header.extend(table.columns().iter().cloned());
    out_csv.write_record(&header).map_err(csv_err)?;

    for PeriodBlock { label, steps, rows } in table.blocks() {
        for (step, row) in steps.iter().zip(rows) {
            let mut record = vec![label.clone(), step.to_string()];
            record.extend(row.iter().map(|v| v.to_string()));
            out_csv.write_record(&record).map_err(csv_err)?;
        }
    }
    out_csv.flush().map_err(|source| ProfileError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Candidate results artifacts in `dir`: sub-directories and SQLite files,
/// sorted by path.
pub fn list_artifacts(dir: &Path) -> ProfileResult<Vec<PathBuf>> {
    let io_err = |source| ProfileError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_db = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e, "db" | "sqlite" | "sqlite3"));
        if path.is_dir() || is_db {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}
