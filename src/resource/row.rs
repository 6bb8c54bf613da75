//! Row normalization
//!
//! Projects a resource document into the declared column set of a table.

use super::registry::{ColumnDef, ColumnType, TableDef};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single typed column value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_none(),
            Cell::String(s) => serializer.serialize_str(s),
            Cell::Int(n) => serializer.serialize_i64(*n),
            Cell::Double(n) => serializer.serialize_f64(*n),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Timestamp(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            Cell::Json(v) => v.serialize(serializer),
        }
    }
}

/// One output row, cells in schema order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: Vec<(&'static str, Cell)>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, cell)| cell)
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.cells.iter().map(|(name, _)| *name)
    }

    pub fn cells(&self) -> &[(&'static str, Cell)] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, cell) in &self.cells {
            map.serialize_entry(name, cell)?;
        }
        map.end()
    }
}

/// Build a row from a resource document.
///
/// Columns bound to a qualifier take their value from `quals` instead of the
/// document.
pub fn to_row(table: &'static TableDef, document: &Value, quals: &BTreeMap<String, String>) -> Row {
    let cells = table
        .columns
        .iter()
        .map(|column| {
            let cell = match &column.from_qual {
                Some(qual) => quals
                    .get(qual)
                    .map(|v| normalize(column, Some(&Value::String(v.clone()))))
                    .unwrap_or(Cell::Null),
                None => normalize(column, extract_path(document, column.path())),
            };
            (column.name.as_str(), cell)
        })
        .collect();

    Row { cells }
}

/// Extract a value by dot path. Numeric segments index into arrays.
pub fn extract_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Convert one raw value to the column's type, applying the zero-value policy
pub fn normalize(column: &ColumnDef, value: Option<&Value>) -> Cell {
    let Some(value) = value else {
        return Cell::Null;
    };
    if value.is_null() {
        return Cell::Null;
    }
    if column.column_type != ColumnType::Bool && !column.keep_zero && is_zero(value) {
        return Cell::Null;
    }

    match column.column_type {
        ColumnType::String => match value {
            Value::String(s) => Cell::String(s.clone()),
            Value::Number(n) => Cell::String(n.to_string()),
            Value::Bool(b) => Cell::String(b.to_string()),
            other => Cell::String(other.to_string()),
        },
        ColumnType::Int => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Cell::Int)
                .unwrap_or(Cell::Null),
            Value::String(s) => s.trim().parse().map(Cell::Int).unwrap_or(Cell::Null),
            _ => Cell::Null,
        },
        ColumnType::Double => match value {
            Value::Number(n) => n.as_f64().map(Cell::Double).unwrap_or(Cell::Null),
            Value::String(s) => s.trim().parse().map(Cell::Double).unwrap_or(Cell::Null),
            _ => Cell::Null,
        },
        ColumnType::Bool => match value {
            Value::Bool(b) => Cell::Bool(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Cell::Bool(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Cell::Bool(false),
            Value::Number(n) => Cell::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
            _ => Cell::Null,
        },
        ColumnType::Timestamp => match value {
            Value::String(s) => parse_timestamp(s).map(Cell::Timestamp).unwrap_or(Cell::Null),
            Value::Number(n) => n
                .as_i64()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .map(Cell::Timestamp)
                .unwrap_or(Cell::Null),
            _ => Cell::Null,
        },
        ColumnType::Json => Cell::Json(value.clone()),
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Parse the timestamp formats Rackspace services emit.
///
/// Accepts RFC 3339, `+0000`-style offsets and naive timestamps, which are
/// taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
