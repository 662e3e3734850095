use thiserror::Error;

/// Validation errors raised while parsing source strings and caller options.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("source cannot be empty")]
    EmptySource,
    #[error("source '{value}' is not a valid URL: {reason}")]
    MalformedUrl { value: String, reason: String },
    #[error("scheme '{scheme}' is not supported, expected http, https, file or airtable")]
    UnsupportedScheme { scheme: String },

    #[error("spreadsheet link does not contain a document id: '{value}'")]
    MissingSheetId { value: String },

    #[error("paginated API source must name a base id")]
    MissingBaseId,
    #[error("base id '{value}' may only contain ASCII letters and digits")]
    InvalidBaseId { value: String },
    #[error("paginated API source must name a table")]
    MissingTableName,
    #[error("paginated API source must carry a non-empty token parameter")]
    MissingToken,

    #[error("column token '{token}' is malformed, expected 'key' or 'key:Alias'")]
    InvalidColumnToken { token: String },
    #[error("invalid sort direction '{value}', expected asc or desc")]
    InvalidSortDirection { value: String },
    #[error("invalid request profile '{value}', expected data-fetch, health-check or cache-warmup")]
    InvalidRequestProfile { value: String },
    #[error("root path cannot contain empty segments: '{value}'")]
    InvalidRootPath { value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let error = ValidationError::InvalidSortDirection {
            value: String::from("sideways"),
        };
        assert!(error.to_string().contains("sideways"));

        let error = ValidationError::UnsupportedScheme {
            scheme: String::from("gopher"),
        };
        assert!(error.to_string().contains("gopher"));
    }
}
