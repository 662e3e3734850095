use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::config::DEFAULT_PAGINATED_API_BASE;
use crate::data_source::{
    AdapterFuture, FetchError, PaginatedApiFailure, SourceAdapter, SourceFamily,
};
use crate::domain::{Cell, Dataset, Row, SourceDescriptor};
use crate::engine::{RequestEngine, RequestOptions, RequestProfile};
use crate::postprocess::RootPath;
use crate::throttle::PagePacer;

#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    records: Vec<Value>,
    #[serde(default)]
    offset: Option<String>,
}

/// Walks an offset-cursored record API page by page.
///
/// Pagination stops when a page carries no cursor or after `max_pages` pages, whichever
/// comes first, so an upstream that always returns a cursor cannot keep us looping.
#[derive(Clone)]
pub struct PaginatedApiAdapter {
    engine: Arc<RequestEngine>,
    base_url: String,
    max_pages: u32,
    page_size: u32,
    profile: RequestProfile,
    max_retries: Option<u32>,
    pacer: PagePacer,
}

impl PaginatedApiAdapter {
    pub fn new(engine: Arc<RequestEngine>) -> Self {
        Self {
            engine,
            base_url: String::from(DEFAULT_PAGINATED_API_BASE),
            max_pages: 50,
            page_size: 100,
            profile: RequestProfile::DataFetch,
            max_retries: None,
            pacer: PagePacer::per_second(5),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
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

    pub fn with_pacer(mut self, pacer: PagePacer) -> Self {
        self.pacer = pacer;
        self
    }

    fn page_url(
        &self,
        base_id: &str,
        table_name: &str,
        view: Option<&str>,
        offset: Option<&str>,
    ) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| FetchError::invalid_source(format!("paginated API base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| FetchError::invalid_source("paginated API base URL cannot take a path"))?
            .pop_if_empty()
            .push(base_id)
            .push(table_name);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", &self.page_size.to_string());
            if let Some(view) = view {
                query.append_pair("view", view);
            }
            if let Some(offset) = offset {
                query.append_pair("offset", offset);
            }
        }
        Ok(url)
    }

    fn options(&self, token: &str) -> RequestOptions {
        let options = RequestOptions::new(self.profile).with_bearer_token(token);
        match self.max_retries {
            Some(retries) => options.with_max_retries(retries),
            None => options,
        }
    }
}

impl SourceAdapter for PaginatedApiAdapter {
    fn family(&self) -> SourceFamily {
        SourceFamily::PaginatedApi
    }

    fn fetch<'a>(
        &'a self,
        descriptor: &'a SourceDescriptor,
        _root: Option<&'a RootPath>,
    ) -> AdapterFuture<'a> {
        Box::pin(async move {
            let SourceDescriptor::PaginatedApi {
                base_id,
                table_name,
                token,
                view,
            } = descriptor
            else {
                return Err(FetchError::invalid_source(format!(
                    "paginated API adapter cannot fetch a {} source",
                    descriptor.family()
                )));
            };

            let options = self.options(token);
            let mut rows = Vec::new();
            let mut offset: Option<String> = None;

            for page in 0..self.max_pages {
                self.pacer.until_ready().await;
                let url = self.page_url(base_id, table_name, view.as_deref(), offset.as_deref())?;
                let response = self
                    .engine
                    .request(url.as_str(), &options)
                    .await
                    .map_err(classify_failure)?;
                let body = response.body.into_json()?;
                let page_body: RecordPage = serde_json::from_value(body)
                    .map_err(|e| FetchError::json_parse(format!("record page: {e}")))?;

                rows.extend(page_body.records.iter().map(normalize_record));

                offset = page_body.offset.filter(|cursor| !cursor.is_empty());
                if offset.is_none() {
                    break;
                }
                if page + 1 == self.max_pages {
                    tracing::warn!(
                        pages = self.max_pages,
                        "pagination stopped at the page ceiling with a cursor outstanding"
                    );
                }
            }

            Ok(Dataset::new(rows))
        })
    }
}

fn classify_failure(error: FetchError) -> FetchError {
    match error.status() {
        Some(code) => FetchError::paginated_api(
            PaginatedApiFailure::from_status(code),
            format!("record API returned status {code}"),
        ),
        None => error,
    }
}

/// Flattens one API record into a row: `_id` first, then every field in upstream order.
///
/// Arrays of attachment-like objects (`{url: ...}`) collapse to the first URL; other
/// arrays join their items with `", "`. Objects collapse to their `name`, then `email`,
/// falling back to compact JSON.
pub fn normalize_record(record: &Value) -> Row {
    let mut row = Row::new();
    let id = record.get("id").and_then(Value::as_str).unwrap_or_default();
    row.insert("_id", Cell::text(id));

    if let Some(fields) = record.get("fields").and_then(Value::as_object) {
        for (name, value) in fields {
            row.insert(name.as_str(), flatten_field(value));
        }
    }
    row
}

fn flatten_field(value: &Value) -> Cell {
    match value {
        Value::Array(items) => {
            if let Some(url) = items.first().and_then(attachment_url) {
                return Cell::text(url);
            }
            let joined = items
                .iter()
                .map(item_text)
                .collect::<Vec<_>>()
                .join(", ");
            Cell::text(joined)
        }
        Value::Object(object) => Cell::text(object_text(object)),
        other => Cell::from_json(other),
    }
}

fn attachment_url(item: &Value) -> Option<&str> {
    item.as_object()?.get("url")?.as_str()
}

fn item_text(item: &Value) -> String {
    match item {
        Value::String(text) => text.clone(),
        Value::Object(object) => object_text(object),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn object_text(object: &Map<String, Value>) -> String {
    ["name", "email"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
        .unwrap_or_else(|| Value::Object(object.clone()).to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::http_client::{HttpResponse, MockHttpClient};
    use crate::retry::Backoff;
    use crate::url_guard::UrlValidator;
    use crate::FetchErrorKind;

    fn adapter(client: &MockHttpClient) -> PaginatedApiAdapter {
        let engine = RequestEngine::new(Arc::new(client.clone()), UrlValidator::new())
            .with_backoff(Backoff::none());
        PaginatedApiAdapter::new(Arc::new(engine)).with_pacer(PagePacer::unpaced())
    }

    fn source() -> SourceDescriptor {
        SourceDescriptor::parse("airtable://appABC123/My%20Table?token=patXYZ&view=Grid")
            .expect("valid source")
    }

    #[test]
    fn record_flattens_tags_and_leads_with_id() {
        let row = normalize_record(&json!({"id": "rec1", "fields": {"Name": "x", "Tags": ["a", "b"]}}));

        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["_id", "Name", "Tags"]);
        assert_eq!(row.get("_id"), Some(&Cell::text("rec1")));
        assert_eq!(row.get("Name"), Some(&Cell::text("x")));
        assert_eq!(row.get("Tags"), Some(&Cell::text("a, b")));
    }

    #[test]
    fn attachments_collapse_to_first_url() {
        let row = normalize_record(&json!({
            "id": "rec2",
            "fields": {"Photo": [{"url": "https://cdn.example.com/1.png"}, {"url": "https://cdn.example.com/2.png"}]}
        }));
        assert_eq!(row.get("Photo"), Some(&Cell::text("https://cdn.example.com/1.png")));
    }

    #[test]
    fn collaborators_collapse_to_name_then_email() {
        let row = normalize_record(&json!({
            "id": "rec3",
            "fields": {
                "Owner": {"id": "usr1", "name": "Ada"},
                "Reviewer": {"id": "usr2", "email": "g@example.com"},
                "Meta": {"k": 1}
            }
        }));
        assert_eq!(row.get("Owner"), Some(&Cell::text("Ada")));
        assert_eq!(row.get("Reviewer"), Some(&Cell::text("g@example.com")));
        assert_eq!(row.get("Meta"), Some(&Cell::text(r#"{"k":1}"#)));
    }

    #[tokio::test]
    async fn follows_cursor_and_sends_bearer_token() {
        let client = MockHttpClient::with_responses([
            HttpResponse::ok_json(r#"{"records":[{"id":"r1","fields":{"n":1}}],"offset":"next1"}"#),
            HttpResponse::ok_json(r#"{"records":[{"id":"r2","fields":{"n":2}}]}"#),
        ]);

        let dataset = adapter(&client)
            .fetch(&source(), None)
            .await
            .expect("fetch succeeds");

        assert_eq!(dataset.len(), 2);
        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].url.starts_with("https://api.airtable.com/v0/appABC123/My%20Table?"));
        assert!(requests[0].url.contains("view=Grid"));
        assert!(!requests[0].url.contains("offset="));
        assert!(requests[1].url.contains("offset=next1"));
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Bearer patXYZ")
        );
    }

    #[tokio::test]
    async fn endless_cursor_stops_at_page_ceiling() {
        let client = MockHttpClient::with_responses([HttpResponse::ok_json(
            r#"{"records":[{"id":"r","fields":{}}],"offset":"again"}"#,
        )]);

        let dataset = adapter(&client)
            .with_max_pages(4)
            .fetch(&source(), None)
            .await
            .expect("fetch succeeds");

        assert_eq!(client.request_count(), 4);
        assert_eq!(dataset.len(), 4);
    }

    #[tokio::test]
    async fn status_codes_map_to_api_failures() {
        for (status, failure) in [
            (401, PaginatedApiFailure::AuthFailed),
            (403, PaginatedApiFailure::PermissionDenied),
            (404, PaginatedApiFailure::NotFound),
            (422, PaginatedApiFailure::InvalidRequest),
        ] {
            let client = MockHttpClient::with_responses([HttpResponse::new(status, "{}")]);
            let error = adapter(&client)
                .fetch(&source(), None)
                .await
                .expect_err("status is an error");
            assert_eq!(error.kind(), &FetchErrorKind::PaginatedApi(failure));
            assert!(!error.message().contains("patXYZ"));
        }
    }

    #[tokio::test]
    async fn persistent_rate_limit_is_reported_after_retries() {
        let client = MockHttpClient::with_responses([HttpResponse::new(429, "")]);

        let error = adapter(&client)
            .with_max_retries(Some(1))
            .fetch(&source(), None)
            .await
            .expect_err("rate limited");

        assert_eq!(
            error.kind(),
            &FetchErrorKind::PaginatedApi(PaginatedApiFailure::RateLimited)
        );
        assert!(error.retryable());
        assert_eq!(client.request_count(), 2);
    }
}
