use std::sync::Arc;

use crate::data_source::{AdapterFuture, FetchError, SourceAdapter, SourceFamily};
use crate::domain::{Cell, Dataset, Row, SourceDescriptor};
use crate::engine::{BodyExpectation, RequestEngine, RequestOptions, RequestProfile};
use crate::postprocess::RootPath;

const BOM: char = '\u{feff}';

/// Fetches CSV exports, including spreadsheet share links rewritten to their export URL.
#[derive(Clone)]
pub struct CsvAdapter {
    engine: Arc<RequestEngine>,
    profile: RequestProfile,
    max_retries: Option<u32>,
}

impl CsvAdapter {
    pub fn new(engine: Arc<RequestEngine>) -> Self {
        Self {
            engine,
            profile: RequestProfile::DataFetch,
            max_retries: None,
        }
    }

    /// Timeout and retry tier used for every request this adapter issues.
    pub fn with_profile(mut self, profile: RequestProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn options(&self) -> RequestOptions {
        let options = RequestOptions::new(self.profile)
            .with_header("accept", "text/csv")
            .expecting(BodyExpectation::Raw);
        match self.max_retries {
            Some(retries) => options.with_max_retries(retries),
            None => options,
        }
    }
}

impl SourceAdapter for CsvAdapter {
    fn family(&self) -> SourceFamily {
        SourceFamily::Csv
    }

    fn fetch<'a>(
        &'a self,
        descriptor: &'a SourceDescriptor,
        _root: Option<&'a RootPath>,
    ) -> AdapterFuture<'a> {
        Box::pin(async move {
            let url = match descriptor {
                SourceDescriptor::RemoteCsv { url } => url.to_string(),
                SourceDescriptor::GoogleSheet { sheet_id, gid } => {
                    spreadsheet_export_url(sheet_id, gid.as_deref())
                }
                other => {
                    return Err(FetchError::invalid_source(format!(
                        "CSV adapter cannot fetch a {} source",
                        other.family()
                    )))
                }
            };

            let response = self.engine.request(&url, &self.options()).await?;
            parse_csv(&response.body.into_text())
        })
    }
}

/// CSV export endpoint for a spreadsheet, keeping the tab id when one was given.
pub fn spreadsheet_export_url(sheet_id: &str, gid: Option<&str>) -> String {
    let mut url = format!(
        "https://docs.google.com/spreadsheets/d/{}/export?format=csv",
        urlencoding::encode(sheet_id)
    );
    if let Some(gid) = gid.filter(|gid| !gid.is_empty()) {
        url.push_str("&gid=");
        url.push_str(&urlencoding::encode(gid));
    }
    url
}

/// Parses CSV text whose first record is the header row.
///
/// A leading byte-order mark is dropped from the first header. Records whose field count
/// differs from the header count are skipped. Duplicate header names keep their first
/// position; the later column's value wins.
pub fn parse_csv(input: &str) -> Result<Dataset, FetchError> {
    let input = input.strip_prefix(BOM).unwrap_or(input);
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input.as_bytes());

    let mut records = reader.records();
    let Some(header_record) = records.next() else {
        return Ok(Dataset::default());
    };
    let header_record =
        header_record.map_err(|e| FetchError::csv_parse(format!("header row: {e}")))?;
    let columns: Vec<String> = header_record.iter().map(str::to_owned).collect();

    let mut headers: Vec<String> = Vec::with_capacity(columns.len());
    for column in &columns {
        if !headers.contains(column) {
            headers.push(column.clone());
        }
    }

    let mut rows = Vec::new();
    for (index, record) in records.enumerate() {
        let record = record.map_err(|e| FetchError::csv_parse(format!("record {}: {e}", index + 1)))?;
        if record.len() != columns.len() {
            tracing::trace!(record = index + 1, fields = record.len(), expected = columns.len(), "dropping ragged CSV record");
            continue;
        }
        let mut row = Row::with_capacity(columns.len());
        for (column, field) in columns.iter().zip(record.iter()) {
            row.insert(column.as_str(), Cell::text(field));
        }
        rows.push(row);
    }

    Ok(Dataset::with_headers(headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_row_names_columns() {
        let dataset = parse_csv("name,age\nAda,36\nGrace,45\n").expect("parses");

        assert_eq!(dataset.headers, vec!["name", "age"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows[1].get("name"), Some(&Cell::text("Grace")));
    }

    #[test]
    fn bom_is_stripped_from_first_header() {
        let dataset = parse_csv("\u{feff}id,value\n1,x\n").expect("parses");
        assert_eq!(dataset.headers, vec!["id", "value"]);
        assert!(dataset.rows[0].contains("id"));
    }

    #[test]
    fn quoted_fields_keep_commas_and_quotes() {
        let dataset = parse_csv("title,note\n\"Hello, world\",\"say \"\"hi\"\"\"\n").expect("parses");
        assert_eq!(dataset.rows[0].get("title"), Some(&Cell::text("Hello, world")));
        assert_eq!(dataset.rows[0].get("note"), Some(&Cell::text("say \"hi\"")));
    }

    #[test]
    fn ragged_rows_are_dropped_silently() {
        let dataset = parse_csv("a,b\n1,2\n3\n4,5,6\n7,8\n").expect("parses");
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows[1].get("a"), Some(&Cell::text("7")));
    }

    #[test]
    fn parsing_is_deterministic() {
        let input = "x,y\n1,2\n3,4\n";
        assert_eq!(parse_csv(input), parse_csv(input));
    }

    #[test]
    fn empty_input_is_an_empty_dataset() {
        let dataset = parse_csv("").expect("parses");
        assert!(dataset.is_empty());
        assert!(dataset.headers.is_empty());
    }

    #[test]
    fn export_url_keeps_tab_identifier() {
        assert_eq!(
            spreadsheet_export_url("abc123", Some("42")),
            "https://docs.google.com/spreadsheets/d/abc123/export?format=csv&gid=42"
        );
        assert_eq!(
            spreadsheet_export_url("abc123", None),
            "https://docs.google.com/spreadsheets/d/abc123/export?format=csv"
        );
    }
}
