//! Dataset loading
//!
//! Parses uploaded CSV bytes into an immutable in-memory table. The first
//! row is the header. Cells are kept as strings; each column carries an
//! inferred kind used for display and for the numeric operations in
//! [`stats`].

pub mod stats;

use std::collections::HashMap;

use csv::ReaderBuilder;
use serde::Serialize;
use tracing::{debug, info};

use crate::types::{AppError, AppResult};

pub use stats::{ColumnSummary, DescribeRow};

/// Cell values treated as missing.
pub const MISSING_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "#N/A",
    "#NA", "<NA>",
];

pub fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    #[serde(rename = "int64")]
    Integer,
    #[serde(rename = "float64")]
    Float,
    #[serde(rename = "bool")]
    Boolean,
    #[serde(rename = "object")]
    Text,
}

impl ColumnKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }

    pub fn dtype(self) -> &'static str {
        match self {
            ColumnKind::Integer => "int64",
            ColumnKind::Float => "float64",
            ColumnKind::Boolean => "bool",
            ColumnKind::Text => "object",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
    size_bytes: usize,
}

/// Row/column counts plus column metadata, sent to the page after upload.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    pub size_bytes: usize,
    pub schema: Vec<Column>,
}

/// A window of rows for the preview and raw-data views.
#[derive(Debug, Clone, Serialize)]
pub struct RowsPage {
    pub offset: usize,
    pub total_rows: usize,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Parse comma-separated bytes with a header row.
    pub fn from_csv_bytes(name: &str, bytes: &[u8]) -> AppResult<Self> {
        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(AppError::FileParse("No columns to parse from file".to_string()));
        }

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(body);

        let raw_headers: Vec<String> = rdr
            .headers()
            .map_err(|e| AppError::FileParse(describe_csv_error(&e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let headers = dedupe_headers(&raw_headers);
        let width = headers.len();

        let mut rows = Vec::new();
        for (idx, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| AppError::FileParse(describe_csv_error(&e)))?;
            if record.len() > width {
                // header is line 1
                let line = record
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(idx as u64 + 2);
                return Err(AppError::FileParse(format!(
                    "Error tokenizing data. Expected {} fields in line {}, saw {}",
                    width,
                    line,
                    record.len()
                )));
            }
            // csv yields a single empty field for blank lines
            if record.len() == 1 && width > 1 && record.get(0).is_some_and(|c| c.is_empty()) {
                continue;
            }
            let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        let columns = headers
            .into_iter()
            .enumerate()
            .map(|(idx, name)| Column {
                kind: infer_kind(rows.iter().map(|r| r[idx].as_str())),
                name,
            })
            .collect();

        let dataset = Self {
            name: name.to_string(),
            columns,
            rows,
            size_bytes: bytes.len(),
        };
        info!(
            name = %dataset.name,
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Dataset loaded"
        );
        Ok(dataset)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.row_count(), self.column_count())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Like [`Dataset::column_index`], but reports the available columns on a miss.
    pub fn require_column(&self, name: &str) -> Result<usize, String> {
        self.column_index(name).ok_or_else(|| {
            format!(
                "Column '{}' not found. Available columns: {}",
                name,
                self.headers().join(", ")
            )
        })
    }

    /// Iterate one column's cells in row order.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(move |r| r[idx].as_str())
    }

    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            name: self.name.clone(),
            rows: self.row_count(),
            columns: self.column_count(),
            size_bytes: self.size_bytes,
            schema: self.columns.clone(),
        }
    }

    pub fn slice(&self, offset: usize, limit: usize) -> RowsPage {
        let start = offset.min(self.rows.len());
        let end = start.saturating_add(limit).min(self.rows.len());
        RowsPage {
            offset: start,
            total_rows: self.rows.len(),
            headers: self.headers(),
            rows: self.rows[start..end].to_vec(),
        }
    }

    pub fn head(&self, n: usize) -> RowsPage {
        self.slice(0, n)
    }

    pub fn tail(&self, n: usize) -> RowsPage {
        self.slice(self.rows.len().saturating_sub(n), n)
    }

    /// Fixed-width text rendering of a page, used in prompts and observations.
    pub fn render(page: &RowsPage) -> String {
        let mut widths: Vec<usize> = page.headers.iter().map(|h| h.chars().count()).collect();
        for row in &page.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
        let index_width = (page.offset + page.rows.len()).to_string().len();
        let mut out = String::new();
        out.push_str(&" ".repeat(index_width));
        for (h, w) in page.headers.iter().zip(&widths) {
            out.push_str(&format!("  {:>width$}", h, width = *w));
        }
        out.push('\n');
        for (n, row) in page.rows.iter().enumerate() {
            out.push_str(&format!("{:<width$}", page.offset + n, width = index_width));
            for (cell, w) in row.iter().zip(&widths) {
                let cell = if is_missing(cell) { "NaN" } else { cell.as_str() };
                out.push_str(&format!("  {:>width$}", cell, width = *w));
            }
            out.push('\n');
        }
        out
    }
}

fn describe_csv_error(err: &csv::Error) -> String {
    match err.kind() {
        csv::ErrorKind::Utf8 { pos, .. } => match pos {
            Some(pos) => format!("File is not valid UTF-8 text (line {})", pos.line()),
            None => "File is not valid UTF-8 text".to_string(),
        },
        _ => err.to_string(),
    }
}

/// Blank names become `Unnamed: i`; repeats get `.1`, `.2`, ... suffixes.
fn dedupe_headers(raw: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for (idx, name) in raw.iter().enumerate() {
        let base = if name.is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            name.clone()
        };
        let mut candidate = base.clone();
        while let Some(count) = seen.get(&candidate).copied() {
            seen.insert(candidate.clone(), count + 1);
            candidate = format!("{}.{}", base, count);
        }
        seen.insert(candidate.clone(), 1);
        out.push(candidate);
    }
    out
}

fn infer_kind<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnKind {
    let mut all_int = true;
    let mut all_float = true;
    let mut all_bool = true;
    let mut present = 0usize;
    let mut missing = 0usize;

    for cell in cells {
        if is_missing(cell) {
            missing += 1;
            continue;
        }
        present += 1;
        let cell = cell.trim();
        if all_int && cell.parse::<i64>().is_err() {
            all_int = false;
        }
        if all_float && cell.parse::<f64>().is_err() {
            all_float = false;
        }
        if all_bool && parse_bool(cell).is_none() {
            all_bool = false;
        }
        if !all_int && !all_float && !all_bool {
            break;
        }
    }

    let kind = if present == 0 {
        ColumnKind::Float
    } else if all_int && missing == 0 {
        ColumnKind::Integer
    } else if all_int || all_float {
        ColumnKind::Float
    } else if all_bool && missing == 0 {
        ColumnKind::Boolean
    } else {
        ColumnKind::Text
    };
    debug!(present, missing, kind = kind.dtype(), "Inferred column kind");
    kind
}

pub fn parse_bool(cell: &str) -> Option<bool> {
    match cell {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Numeric value of a cell, `None` when missing or non-numeric.
pub fn parse_number(cell: &str) -> Option<f64> {
    if is_missing(cell) {
        return None;
    }
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
