//! Pure transforms applied to fetched data: root extraction, column selection and sort.
//!
//! Nothing here performs I/O. Headers end up in a deterministic order: natural order of
//! the first row, re-ordered by the include list when one is given, then the exclude list
//! applied last.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data_source::FetchError;
use crate::domain::{Cell, Dataset, Row};
use crate::ValidationError;

/// Dot-separated path into nested JSON, e.g. `data.items`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RootPath {
    segments: Vec<String>,
}

impl RootPath {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let trimmed = value.trim();
        let segments: Vec<String> = trimmed.split('.').map(|s| s.trim().to_owned()).collect();
        if trimmed.is_empty() || segments.iter().any(String::is_empty) {
            return Err(ValidationError::InvalidRootPath {
                value: value.to_owned(),
            });
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walks `value` segment by segment. Objects are indexed by key; arrays accept a
    /// numeric segment. The first segment that cannot be followed is reported.
    pub fn extract<'v>(&self, value: &'v Value) -> Result<&'v Value, FetchError> {
        let mut current = value;
        for segment in &self.segments {
            let next = match current {
                Value::Object(object) => object.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            current = next.ok_or_else(|| FetchError::path_extraction(segment.as_str()))?;
        }
        Ok(current)
    }
}

impl Display for RootPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for RootPath {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// One entry of an include list: `key` or `key:Alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnToken {
    pub key: String,
    pub alias: Option<String>,
}

impl FromStr for ColumnToken {
    type Err = ValidationError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let (key, alias) = match token.split_once(':') {
            Some((key, alias)) => (key.trim(), Some(alias.trim())),
            None => (token.trim(), None),
        };
        if key.is_empty() || alias.is_some_and(str::is_empty) {
            return Err(ValidationError::InvalidColumnToken {
                token: token.to_owned(),
            });
        }
        Ok(Self {
            key: key.to_owned(),
            alias: alias.map(str::to_owned),
        })
    }
}

/// Include / exclude configuration supplied by the rendering collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSelection {
    include: Vec<ColumnToken>,
    exclude: Vec<String>,
}

impl ColumnSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses comma-separated lists. Blank entries are skipped.
    pub fn parse(include: Option<&str>, exclude: Option<&str>) -> Result<Self, ValidationError> {
        let include = include
            .map(|list| {
                list.split(',')
                    .filter(|token| !token.trim().is_empty())
                    .map(str::parse::<ColumnToken>)
                    .collect::<Result<Vec<ColumnToken>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        let exclude = exclude
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self { include, exclude })
    }

    pub fn include(mut self, token: ColumnToken) -> Self {
        self.include.push(token);
        self
    }

    pub fn exclude(mut self, key: impl Into<String>) -> Self {
        self.exclude.push(key.into());
        self
    }

    /// Resolves headers and aliases against `dataset`.
    ///
    /// Include entries naming a column the dataset does not have are ignored.
    pub fn apply(&self, dataset: &Dataset) -> TableView {
        let mut headers = Vec::new();
        let mut header_alias_map = BTreeMap::new();

        if self.include.is_empty() {
            headers.extend(dataset.headers.iter().cloned());
        } else {
            for token in &self.include {
                if !dataset.headers.contains(&token.key) || headers.contains(&token.key) {
                    continue;
                }
                headers.push(token.key.clone());
                if let Some(alias) = &token.alias {
                    header_alias_map.insert(token.key.clone(), alias.clone());
                }
            }
        }

        headers.retain(|header| !self.exclude.contains(header));
        header_alias_map.retain(|key, _| headers.contains(key));

        let rows = dataset
            .rows
            .iter()
            .map(|row| {
                let mut projected = Row::with_capacity(headers.len());
                for header in &headers {
                    projected.insert(header.clone(), row.get(header).cloned().unwrap_or_default());
                }
                projected
            })
            .collect();

        TableView {
            headers,
            header_alias_map,
            rows,
        }
    }
}

/// Shape handed to the renderer downstream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableView {
    pub headers: Vec<String>,
    pub header_alias_map: BTreeMap<String, String>,
    pub rows: Vec<Row>,
}

impl TableView {
    /// Display label for `header`: its alias when one was given.
    pub fn label<'a>(&'a self, header: &'a str) -> &'a str {
        self.header_alias_map
            .get(header)
            .map_or(header, String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(ValidationError::InvalidSortDirection {
                value: value.to_owned(),
            }),
        }
    }
}

/// Sorts `rows` in place by `field`. Stable, so ties keep source order in both
/// directions.
pub fn sort_rows(rows: &mut [Row], field: &str, direction: SortDirection) {
    rows.sort_by(|left, right| {
        let ordering = compare_cells(left.get(field), right.get(field));
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

/// Numeric when both sides parse as numbers, otherwise case-insensitive text. A missing
/// cell counts as empty text, which reads as zero when compared against a number.
fn compare_cells(left: Option<&Cell>, right: Option<&Cell>) -> Ordering {
    let null = Cell::Null;
    let left = left.unwrap_or(&null);
    let right = right.unwrap_or(&null);

    let left_number = numeric_value(left);
    let right_number = numeric_value(right);
    if let (Some(l), Some(r)) = (left_number, right_number) {
        return l.total_cmp(&r);
    }

    left.as_text()
        .to_lowercase()
        .cmp(&right.as_text().to_lowercase())
}

fn numeric_value(cell: &Cell) -> Option<f64> {
    if cell.is_null() || cell.as_text().trim().is_empty() {
        return Some(0.0);
    }
    cell.as_number()
}
