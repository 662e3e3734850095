use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use url::Url;

use crate::data_source::SourceFamily;
use crate::ValidationError;

/// Custom scheme naming a paginated record API table:
/// `airtable://{baseId}/{tableName}?token={pat}&view={optional}`.
pub const PAGINATED_API_SCHEME: &str = "airtable";

const SPREADSHEET_HOST: &str = "docs.google.com";

/// Parsed form of an opaque source string. Parsed per call; never cached itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Local {
        path: PathBuf,
    },
    RemoteJson {
        url: Url,
    },
    RemoteCsv {
        url: Url,
    },
    GoogleSheet {
        sheet_id: String,
        gid: Option<String>,
    },
    PaginatedApi {
        base_id: String,
        table_name: String,
        token: String,
        view: Option<String>,
    },
}

impl SourceDescriptor {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        Self::parse_with(input, &LocalMounts::default())
    }

    /// Parses `input`, first mapping any mounted URL prefix onto its local directory.
    pub fn parse_with(input: &str, mounts: &LocalMounts) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySource);
        }

        if let Some(path) = mounts.resolve(trimmed) {
            return Ok(Self::Local { path });
        }

        if !trimmed.contains("://") {
            return Ok(Self::Local {
                path: PathBuf::from(trimmed),
            });
        }

        let url = Url::parse(trimmed).map_err(|error| ValidationError::MalformedUrl {
            value: trimmed.to_owned(),
            reason: error.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => parse_http(url),
            "file" => url
                .to_file_path()
                .map(|path| Self::Local { path })
                .map_err(|()| ValidationError::MalformedUrl {
                    value: trimmed.to_owned(),
                    reason: String::from("file URL has no local path"),
                }),
            PAGINATED_API_SCHEME => parse_paginated(&url),
            other => Err(ValidationError::UnsupportedScheme {
                scheme: other.to_owned(),
            }),
        }
    }

    pub const fn family(&self) -> SourceFamily {
        match self {
            Self::Local { .. } => SourceFamily::Local,
            Self::RemoteJson { .. } => SourceFamily::Json,
            Self::RemoteCsv { .. } | Self::GoogleSheet { .. } => SourceFamily::Csv,
            Self::PaginatedApi { .. } => SourceFamily::PaginatedApi,
        }
    }

    /// Stable text identifying this source for cache fingerprints. Includes the token,
    /// so it must only ever be hashed, never logged.
    pub fn fingerprint_input(&self) -> String {
        match self {
            Self::Local { path } => format!("local|{}", path.display()),
            Self::RemoteJson { url } => format!("json|{url}"),
            Self::RemoteCsv { url } => format!("csv|{url}"),
            Self::GoogleSheet { sheet_id, gid } => {
                format!("sheet|{sheet_id}|{}", gid.as_deref().unwrap_or(""))
            }
            Self::PaginatedApi {
                base_id,
                table_name,
                token,
                view,
            } => format!(
                "paginated|{base_id}|{table_name}|{token}|{}",
                view.as_deref().unwrap_or("")
            ),
        }
    }
}

impl FromStr for SourceDescriptor {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Redacted rendering, safe for logs and CLI output.
impl Display for SourceDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { path } => write!(f, "local:{}", path.display()),
            Self::RemoteJson { url } | Self::RemoteCsv { url } => {
                write!(f, "{}", url.host_str().unwrap_or("<no host>"))?;
                f.write_str(url.path())
            }
            Self::GoogleSheet { sheet_id, gid } => {
                write!(f, "sheet:{sheet_id}")?;
                match gid {
                    Some(gid) => write!(f, "#gid={gid}"),
                    None => Ok(()),
                }
            }
            Self::PaginatedApi {
                base_id,
                table_name,
                view,
                ..
            } => {
                write!(f, "{PAGINATED_API_SCHEME}://{base_id}/{table_name}?token=***")?;
                match view {
                    Some(view) => write!(f, "&view={view}"),
                    None => Ok(()),
                }
            }
        }
    }
}

fn parse_http(url: Url) -> Result<SourceDescriptor, ValidationError> {
    if url.host_str() == Some(SPREADSHEET_HOST) {
        let mut segments = url.path_segments().into_iter().flatten();
        if segments.next() == Some("spreadsheets") && segments.next() == Some("d") {
            let sheet_id = segments
                .next()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| ValidationError::MissingSheetId {
                    value: url.to_string(),
                })?;
            return Ok(SourceDescriptor::GoogleSheet {
                sheet_id: sheet_id.to_owned(),
                gid: sheet_gid(&url),
            });
        }
    }

    if looks_like_csv(&url) {
        Ok(SourceDescriptor::RemoteCsv { url })
    } else {
        Ok(SourceDescriptor::RemoteJson { url })
    }
}

fn sheet_gid(url: &Url) -> Option<String> {
    let from_query = url
        .query_pairs()
        .find(|(key, _)| key == "gid")
        .map(|(_, value)| value.into_owned());
    let from_fragment = || {
        url.fragment()?
            .split('&')
            .find_map(|pair| pair.strip_prefix("gid="))
            .map(str::to_owned)
    };
    from_query
        .or_else(from_fragment)
        .filter(|gid| !gid.is_empty())
}

fn looks_like_csv(url: &Url) -> bool {
    if url.path().to_ascii_lowercase().ends_with(".csv") {
        return true;
    }
    url.query_pairs().any(|(key, value)| {
        matches!(
            (&*key, &*value),
            ("format", "csv") | ("output", "csv") | ("tqx", "out:csv")
        )
    })
}

fn parse_paginated(url: &Url) -> Result<SourceDescriptor, ValidationError> {
    let base_id = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or(ValidationError::MissingBaseId)?;
    if !base_id.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidBaseId {
            value: base_id.to_owned(),
        });
    }

    let raw_table = url.path().trim_matches('/');
    let table_name = urlencoding::decode(raw_table)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw_table.to_owned());
    if table_name.trim().is_empty() {
        return Err(ValidationError::MissingTableName);
    }

    let mut token = None;
    let mut view = None;
    for (key, value) in url.query_pairs() {
        match &*key {
            "token" => token = Some(value.into_owned()),
            "view" => view = Some(value.into_owned()),
            _ => {}
        }
    }

    let token = token
        .filter(|token| !token.trim().is_empty())
        .ok_or(ValidationError::MissingToken)?;

    Ok(SourceDescriptor::PaginatedApi {
        base_id: base_id.to_owned(),
        table_name,
        token,
        view: view.filter(|view| !view.is_empty()),
    })
}

/// URL prefixes whose files are read from local directories instead of the network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalMounts {
    mounts: Vec<(String, PathBuf)>,
}

impl LocalMounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mount(mut self, prefix: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        self.mounts.push((prefix.into(), directory.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    pub fn directories(&self) -> impl Iterator<Item = &Path> {
        self.mounts.iter().map(|(_, directory)| directory.as_path())
    }

    fn resolve(&self, input: &str) -> Option<PathBuf> {
        self.mounts.iter().find_map(|(prefix, directory)| {
            let rest = input.strip_prefix(prefix.as_str())?;
            let rest = rest.split(['?', '#']).next().unwrap_or_default();
            let rest = urlencoding::decode(rest).ok()?;
            Some(directory.join(rest.trim_start_matches('/')))
        })
    }
}
