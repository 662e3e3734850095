mod csv;
mod json;
mod local_file;
mod paginated;

pub use self::csv::{parse_csv, spreadsheet_export_url, CsvAdapter};
pub use self::json::JsonAdapter;
pub use self::local_file::LocalFileAdapter;
pub use self::paginated::{normalize_record, PaginatedApiAdapter};
