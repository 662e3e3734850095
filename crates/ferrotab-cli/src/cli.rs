//! CLI argument definitions for ferrotab.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Fetch a source and print it as a table view |
//! | `check-url` | Run the SSRF guard against a URL |
//! | `describe` | Show how a source string is interpreted |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--verbose` | `false` | Log full failure detail to stderr |
//!
//! # Examples
//!
//! ```bash
//! ferrotab fetch https://example.com/data.json --root data.items --include "name:Full Name,age"
//! ferrotab fetch "https://docs.google.com/spreadsheets/d/abc/edit#gid=0" --sort-field price
//! ferrotab check-url http://169.254.169.254/latest/meta-data
//! ferrotab describe "airtable://appXXXX/Contacts?token=pat..."
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use ferrotab_core::{RequestProfile, SortDirection};

/// Fetch tabular data from JSON, CSV, spreadsheet and record-API sources.
#[derive(Debug, Parser)]
#[command(
    name = "ferrotab",
    author,
    version,
    about = "Safe tabular data fetching with caching",
    long_about = "ferrotab validates a data source, fetches it with retry and backoff, \
normalizes it into rows and columns, and prints the result.\n\
\n\
Configuration is read from FERROTAB_* environment variables; logging follows RUST_LOG."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Log full failure detail (hosts, attempts, upstream messages) to stderr.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table for terminal display.
    Table,
    /// Single JSON object.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a source and print the selected columns.
    ///
    ///   ferrotab fetch https://example.com/people.json --include "name:Full Name,age"
    ///   ferrotab fetch ./data/prices.csv --sort-field price --sort-direction desc
    Fetch(FetchArgs),

    /// Check whether a URL would be allowed as a fetch target.
    CheckUrl(CheckUrlArgs),

    /// Parse a source string and show its family without fetching it.
    Describe(DescribeArgs),
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Source string: URL, spreadsheet link, airtable:// URI or local path.
    pub source: String,

    /// Dot-separated path to the rows inside a JSON document.
    #[arg(long)]
    pub root: Option<String>,

    /// Comma-separated columns to keep, `key` or `key:Alias`.
    #[arg(long)]
    pub include: Option<String>,

    /// Comma-separated columns to drop.
    #[arg(long)]
    pub exclude: Option<String>,

    /// Column to sort rows by.
    #[arg(long)]
    pub sort_field: Option<String>,

    #[arg(long, default_value = "asc", value_parser = parse_sort_direction)]
    pub sort_direction: SortDirection,

    /// Always fetch upstream, skipping the cache.
    #[arg(long, default_value_t = false)]
    pub no_cache: bool,

    /// Allow-listed directory for local sources; repeatable.
    #[arg(long = "local-root")]
    pub local_roots: Vec<std::path::PathBuf>,
}

#[derive(Debug, Args)]
pub struct CheckUrlArgs {
    pub url: String,

    /// Also resolve the host and check every address it maps to.
    #[arg(long, default_value_t = false)]
    pub resolve: bool,
}

#[derive(Debug, Args)]
pub struct DescribeArgs {
    pub source: String,

    /// Request profile whose timeout and retry budget to report. Defaults to the
    /// configured profile.
    #[arg(long, value_parser = parse_profile)]
    pub profile: Option<RequestProfile>,
}

fn parse_sort_direction(value: &str) -> Result<SortDirection, String> {
    value.parse().map_err(|error: ferrotab_core::ValidationError| error.to_string())
}

fn parse_profile(value: &str) -> Result<RequestProfile, String> {
    value.parse().map_err(|error: ferrotab_core::ValidationError| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_arguments_parse() {
        let cli = Cli::try_parse_from([
            "ferrotab",
            "fetch",
            "https://example.com/a.json",
            "--include",
            "name:Full Name,age",
            "--sort-field",
            "age",
            "--sort-direction",
            "DESC",
            "--no-cache",
        ])
        .expect("arguments parse");

        let Command::Fetch(args) = cli.command else {
            panic!("expected fetch command");
        };
        assert_eq!(args.include.as_deref(), Some("name:Full Name,age"));
        assert_eq!(args.sort_direction, SortDirection::Desc);
        assert!(args.no_cache);
    }

    #[test]
    fn unknown_profile_is_rejected() {
        let result = Cli::try_parse_from(["ferrotab", "describe", "x.csv", "--profile", "turbo"]);
        assert!(result.is_err());
    }
}
