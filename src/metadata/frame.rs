//! Dynamically typed result sets
//!
//! Catalog queries come back with driver-dependent header spelling, so rows
//! are kept as headers plus loosely typed cells and resolved by name later.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row};
use std::fmt;

/// A single value from a result row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Integer view; numeric text is parsed, everything else is None
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            Cell::Float(v) => Some(*v as i64),
            Cell::Text(s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
            }
            _ => None,
        }
    }

    /// Text view; None only for NULL
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Decode one column of a MySQL row into the widest matching cell
    pub fn from_row(row: &MySqlRow, idx: usize) -> Cell {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map_or(Cell::Null, Cell::Int);
        }
        if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
            return v.map_or(Cell::Null, |n| Cell::Int(i64::try_from(n).unwrap_or(i64::MAX)));
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map_or(Cell::Null, Cell::Float);
        }
        if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return v.map_or(Cell::Null, Cell::DateTime);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map_or(Cell::Null, Cell::Text);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map_or(Cell::Null, |b| Cell::Text(String::from_utf8_lossy(&b).into_owned()));
        }
        // DECIMAL and friends decode fine as text
        row.try_get_unchecked::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map_or(Cell::Null, Cell::Text)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Int(v) => write!(f, "{}", v),
            Cell::Float(v) => write!(f, "{}", v),
            Cell::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

/// Headers plus rows of cells, the shape every catalog query returns
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataFrame {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl MetadataFrame {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Build a frame from literal headers and rows; handy for fixtures
    pub fn from_rows<H, R>(headers: &[H], rows: Vec<R>) -> Self
    where
        H: AsRef<str>,
        R: IntoIterator,
        R::Item: Into<Cell>,
    {
        Self {
            headers: headers.iter().map(|h| h.as_ref().to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// Build a frame from driver rows; an empty result yields an empty frame
    pub fn from_mysql(rows: &[MySqlRow]) -> Self {
        let Some(first) = rows.first() else {
            return Self::default();
        };
        let headers = first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>();
        let width = headers.len();
        let rows = rows
            .iter()
            .map(|row| (0..width).map(|idx| Cell::from_row(row, idx)).collect())
            .collect();
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a header, compared case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
    }

    /// Cell at (row, column); out-of-range reads as NULL
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        static NULL: Cell = Cell::Null;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&NULL)
    }

    /// Overwrite (or append) a column holding the same value on every row
    pub fn set_constant(&mut self, name: &str, value: &str) {
        let idx = match self.column_index(name) {
            Some(idx) => idx,
            None => {
                self.headers.push(name.to_string());
                for row in &mut self.rows {
                    row.push(Cell::Null);
                }
                self.headers.len() - 1
            }
        };
        for row in &mut self.rows {
            if row.len() <= idx {
                row.resize(idx + 1, Cell::Null);
            }
            row[idx] = Cell::Text(value.to_string());
        }
    }

    /// Append another frame's rows, aligning columns by header name
    pub fn append(&mut self, other: MetadataFrame) {
        if other.headers.is_empty() {
            return;
        }
        if self.headers.is_empty() {
            *self = other;
            return;
        }
        let mapping: Vec<Option<usize>> = self
            .headers
            .iter()
            .map(|h| other.column_index(h))
            .collect();
        for row in other.rows {
            let aligned = mapping
                .iter()
                .map(|m| m.and_then(|i| row.get(i).cloned()).unwrap_or(Cell::Null))
                .collect();
            self.rows.push(aligned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_constant_overwrites_existing_column() {
        let mut frame = MetadataFrame::from_rows(&["SCHEMA", "table_name"], vec![vec!["x", "users"]]);
        frame.set_constant("schema", "app");
        assert_eq!(frame.headers, vec!["SCHEMA", "table_name"]);
        assert_eq!(frame.cell(0, 0), &Cell::from("app"));
    }

    #[test]
    fn test_set_constant_appends_missing_column() {
        let mut frame = MetadataFrame::from_rows(&["table_name"], vec![vec!["users"], vec!["orders"]]);
        frame.set_constant("child_schema", "app");
        assert_eq!(frame.headers.len(), 2);
        assert_eq!(frame.cell(1, 1), &Cell::from("app"));
    }

    #[test]
    fn test_append_aligns_by_header() {
        let mut a = MetadataFrame::from_rows(&["schema", "table_name"], vec![vec!["s1", "t1"]]);
        let b = MetadataFrame::from_rows(&["table_name", "schema"], vec![vec!["t2", "s2"]]);
        a.append(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.cell(1, 0), &Cell::from("s2"));
        assert_eq!(a.cell(1, 1), &Cell::from("t2"));
    }

    #[test]
    fn test_cell_numeric_views() {
        assert_eq!(Cell::from("42").as_i64(), Some(42));
        assert_eq!(Cell::from("12.0").as_i64(), Some(12));
        assert_eq!(Cell::Null.as_i64(), None);
        assert_eq!(Cell::Null.as_text(), None);
        assert_eq!(Cell::Int(7).as_text().as_deref(), Some("7"));
    }
}
