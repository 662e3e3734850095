use std::fmt::Formatter;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::Cell;

/// Ordered mapping of column name to cell.
///
/// Column names are case-sensitive. Inserting an existing name replaces its cell in
/// place and keeps the original position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Cell)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, cell: impl Into<Cell>) {
        let name = name.into();
        let cell = cell.into();
        match self.columns.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = cell,
            None => self.columns.push((name, cell)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, cell: impl Into<Cell>) -> Self {
        self.insert(name, cell);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.columns
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, cell)| cell)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.columns.iter().map(|(key, cell)| (key.as_str(), cell))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let mut row = Self::with_capacity(object.len());
        for (key, value) in object {
            row.insert(key.clone(), Cell::from_json(value));
        }
        row
    }
}

impl From<Cell> for Row {
    fn from(cell: Cell) -> Self {
        Self::new().with("value", cell)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (key, cell) in &self.columns {
            map.serialize_entry(key, cell)?;
        }
        map.end()
    }
}

struct RowVisitor;

impl<'de> Visitor<'de> for RowVisitor {
    type Value = Row;

    fn expecting(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("a map of column names to cells")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut row = Row::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, cell)) = access.next_entry::<String, Cell>()? {
            row.insert(key, cell);
        }
        Ok(row)
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RowVisitor)
    }
}

/// Ordered rows plus the distinct column names of the first row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    /// Builds a dataset whose headers are the natural column order of the first row.
    pub fn new(rows: Vec<Row>) -> Self {
        let headers = rows
            .first()
            .map(|row| row.keys().map(str::to_owned).collect())
            .unwrap_or_default();
        Self { headers, rows }
    }

    pub fn with_headers(headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self { headers, rows }
    }

    /// Normalises decoded JSON into rows.
    ///
    /// An array yields one row per element (objects map column-wise, anything else
    /// becomes a single `value` column); an object yields one row; a bare scalar
    /// yields one `value` row; `null` yields an empty dataset.
    pub fn from_json(value: &Value) -> Self {
        let rows = match value {
            Value::Null => Vec::new(),
            Value::Array(items) => items.iter().map(row_from_json).collect(),
            other => vec![row_from_json(other)],
        };
        Self::new(rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn row_from_json(value: &Value) -> Row {
    match value {
        Value::Object(object) => Row::from_json_object(object),
        other => Row::from(Cell::from_json(other)),
    }
}
