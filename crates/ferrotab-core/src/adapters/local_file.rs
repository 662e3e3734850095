use std::path::{Path, PathBuf};

use crate::adapters::csv::parse_csv;
use crate::data_source::{AdapterFuture, FetchError, SourceAdapter, SourceFamily};
use crate::domain::{Dataset, SourceDescriptor};
use crate::postprocess::RootPath;

/// Reads JSON or CSV files that live under an allow-listed directory.
///
/// Paths are canonicalized before the allow-list check, so `..` segments and symlinks
/// cannot step outside a root. With no roots configured every read is refused.
#[derive(Debug, Clone, Default)]
pub struct LocalFileAdapter {
    roots: Vec<PathBuf>,
}

impl LocalFileAdapter {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    async fn resolve(&self, path: &Path) -> Result<PathBuf, FetchError> {
        if self.roots.is_empty() {
            return Err(FetchError::security(format!(
                "local file '{}' refused: no directories are allowed",
                file_label(path)
            )));
        }

        let candidates: Vec<PathBuf> = if path.is_absolute() {
            vec![path.to_path_buf()]
        } else {
            self.roots.iter().map(|root| root.join(path)).collect()
        };

        for candidate in candidates {
            let Ok(resolved) = tokio::fs::canonicalize(&candidate).await else {
                continue;
            };
            for root in &self.roots {
                let Ok(root) = tokio::fs::canonicalize(root).await else {
                    continue;
                };
                if resolved.starts_with(&root) {
                    return Ok(resolved);
                }
            }
            return Err(FetchError::security(format!(
                "local file '{}' is outside the allowed directories",
                file_label(path)
            )));
        }

        Err(FetchError::local_file(format!(
            "local file '{}' was not found",
            file_label(path)
        )))
    }
}

impl SourceAdapter for LocalFileAdapter {
    fn family(&self) -> SourceFamily {
        SourceFamily::Local
    }

    fn fetch<'a>(
        &'a self,
        descriptor: &'a SourceDescriptor,
        root: Option<&'a RootPath>,
    ) -> AdapterFuture<'a> {
        Box::pin(async move {
            let SourceDescriptor::Local { path } = descriptor else {
                return Err(FetchError::invalid_source(format!(
                    "local file adapter cannot fetch a {} source",
                    descriptor.family()
                )));
            };

            let resolved = self.resolve(path).await?;
            let extension = resolved
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase);

            let contents = tokio::fs::read_to_string(&resolved).await.map_err(|error| {
                FetchError::local_file(format!(
                    "failed to read '{}': {error}",
                    file_label(&resolved)
                ))
            })?;

            match extension.as_deref() {
                Some("json") => {
                    let value: serde_json::Value = serde_json::from_str(&contents)
                        .map_err(|e| FetchError::json_parse(format!("local JSON file: {e}")))?;
                    let value = match root {
                        Some(root) => root.extract(&value)?,
                        None => &value,
                    };
                    Ok(Dataset::from_json(value))
                }
                Some("csv") => parse_csv(&contents),
                _ => Err(FetchError::local_file(format!(
                    "'{}' is neither a .json nor a .csv file",
                    file_label(&resolved)
                ))),
            }
        })
    }
}

// File name only; full paths reveal the host layout.
fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("<unnamed>"))
}
