//! In-memory sheet table and the cleaning transform applied before any
//! spreadsheet output is written.
//!
//! ## Order of operations
//!
//! ```text
//! drop empty rows/cols ─▶ sanitise strings ─▶ infer column kinds
//!        ─▶ fill nulls ─▶ normalise dates ─▶ dedup rows ─▶ normalise headers
//! ```
//!
//! Empty rows and columns are dropped *before* nulls are filled; otherwise a
//! blank trailing row would survive as a line of zeros.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NON_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]").unwrap());

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text form used by CSV and Markdown output.
    pub fn render(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(n) => format_number(*n),
            Cell::Text(s) => s.clone(),
            Cell::Bool(b) => b.to_string(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// JSON form: numbers and booleans keep their type.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Number(n) if is_integral(*n) => serde_json::Value::from(*n as i64),
            Cell::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Cell::Bool(b) => serde_json::Value::Bool(*b),
            other => serde_json::Value::String(other.render()),
        }
    }
}

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15
}

/// Integral floats print without a trailing `.0`.
fn format_number(n: f64) -> String {
    if is_integral(n) {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// `YYYY-MM-DD`, optionally followed by a time part (`T…` or ` …`).
fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let date_part = s.get(..10)?;
    let rest = &s[10..];
    if !(rest.is_empty() || rest.starts_with('T') || rest.starts_with(' ')) {
        return None;
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Numeric,
    Date,
    Text,
}

/// A sheet: one header row plus data rows, all of equal width after
/// [`Table::from_rows`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build from raw rows. Leading empty rows are skipped; the first
    /// non-empty row becomes the header.
    pub fn from_rows(raw: Vec<Vec<Cell>>) -> Self {
        let mut rows = raw.into_iter().skip_while(|r| r.iter().all(Cell::is_empty));
        let Some(header_row) = rows.next() else {
            return Table::default();
        };
        let data: Vec<Vec<Cell>> = rows.collect();
        let width = data
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(header_row.len()))
            .max()
            .unwrap_or(0);

        let mut headers: Vec<String> = header_row
            .iter()
            .map(|c| c.render().trim().to_string())
            .collect();
        headers.resize(width, String::new());
        let rows = data
            .into_iter()
            .map(|mut r| {
                r.resize(width, Cell::Empty);
                r
            })
            .collect();
        Table { headers, rows }
    }

    /// No data rows (or no columns) left.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.headers.is_empty()
    }

    /// Apply the full cleaning transform in place.
    pub fn clean(&mut self) {
        self.drop_empty();
        self.sanitise_strings();
        let kinds = self.infer_kinds();
        self.fill_and_normalise(&kinds);
        self.dedup_rows();
        self.headers = normalise_headers(&self.headers);
    }

    fn drop_empty(&mut self) {
        self.rows.retain(|r| !r.iter().all(Cell::is_empty));

        let keep: Vec<bool> = (0..self.headers.len())
            .map(|col| self.rows.iter().any(|r| !r[col].is_empty()))
            .collect();
        let mut it = keep.iter();
        self.headers.retain(|_| *it.next().unwrap_or(&false));
        for row in &mut self.rows {
            let mut it = keep.iter();
            row.retain(|_| *it.next().unwrap_or(&false));
        }
    }

    fn sanitise_strings(&mut self) {
        for cell in self.rows.iter_mut().flatten() {
            if let Cell::Text(s) = cell {
                let cleaned: String = s.chars().filter(|c| !c.is_control()).collect();
                let cleaned = cleaned.trim();
                *cell = if cleaned.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(cleaned.to_string())
                };
            }
        }
    }

    fn infer_kinds(&self) -> Vec<ColumnKind> {
        (0..self.headers.len())
            .map(|col| {
                let values: Vec<&Cell> = self
                    .rows
                    .iter()
                    .map(|r| &r[col])
                    .filter(|c| !c.is_empty())
                    .collect();
                if values.is_empty() {
                    ColumnKind::Text
                } else if values.iter().all(|c| matches!(c, Cell::Number(_))) {
                    ColumnKind::Numeric
                } else if values.iter().all(|c| match c {
                    Cell::Date(_) => true,
                    Cell::Text(s) => parse_iso_date(s).is_some(),
                    _ => false,
                }) {
                    ColumnKind::Date
                } else {
                    ColumnKind::Text
                }
            })
            .collect()
    }

    fn fill_and_normalise(&mut self, kinds: &[ColumnKind]) {
        for row in &mut self.rows {
            for (cell, kind) in row.iter_mut().zip(kinds) {
                let replacement = match (kind, &*cell) {
                    (ColumnKind::Numeric, Cell::Empty) => Some(Cell::Number(0.0)),
                    (_, Cell::Empty) => Some(Cell::Text(String::new())),
                    (ColumnKind::Date, Cell::Text(s)) => parse_iso_date(s).map(Cell::Date),
                    _ => None,
                };
                if let Some(value) = replacement {
                    *cell = value;
                }
            }
        }
    }

    fn dedup_rows(&mut self) {
        let mut seen = HashSet::new();
        self.rows
            .retain(|r| seen.insert(r.iter().map(Cell::render).collect::<Vec<_>>()));
    }
}

/// Lowercase, whitespace runs to `_`, drop anything outside `[a-z0-9_]`.
/// Blank results become `column_<n>` (1-based); repeats get `_<n>`.
pub fn normalise_headers(headers: &[String]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(headers.len());

    for (i, raw) in headers.iter().enumerate() {
        let lowered = raw.trim().to_lowercase();
        let underscored = WHITESPACE_RUN.replace_all(&lowered, "_");
        let mut name = NON_IDENT.replace_all(&underscored, "").into_owned();
        if name.is_empty() {
            name = format!("column_{}", i + 1);
        }

        let mut candidate = name.clone();
        let mut n = 1;
        while used.contains(&candidate) {
            candidate = format!("{name}_{n}");
            n += 1;
        }
        used.insert(candidate.clone());
        out.push(candidate);
    }
    out
}
