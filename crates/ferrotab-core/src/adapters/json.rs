use std::sync::Arc;

use crate::data_source::{AdapterFuture, FetchError, SourceAdapter, SourceFamily};
use crate::domain::{Dataset, SourceDescriptor};
use crate::engine::{RequestEngine, RequestOptions, RequestProfile};
use crate::postprocess::RootPath;

/// Fetches a remote JSON document through the request engine.
#[derive(Clone)]
pub struct JsonAdapter {
    engine: Arc<RequestEngine>,
    profile: RequestProfile,
    max_retries: Option<u32>,
}

impl JsonAdapter {
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
            .with_header("accept", "application/json");
        match self.max_retries {
            Some(retries) => options.with_max_retries(retries),
            None => options,
        }
    }
}

impl SourceAdapter for JsonAdapter {
    fn family(&self) -> SourceFamily {
        SourceFamily::Json
    }

    fn fetch<'a>(
        &'a self,
        descriptor: &'a SourceDescriptor,
        root: Option<&'a RootPath>,
    ) -> AdapterFuture<'a> {
        Box::pin(async move {
            let SourceDescriptor::RemoteJson { url } = descriptor else {
                return Err(FetchError::invalid_source(format!(
                    "JSON adapter cannot fetch a {} source",
                    descriptor.family()
                )));
            };

            let response = self.engine.request(url.as_str(), &self.options()).await?;
            let value = response.body.into_json()?;
            let value = match root {
                Some(root) => root.extract(&value)?,
                None => &value,
            };
            Ok(Dataset::from_json(value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpResponse, MockHttpClient};
    use crate::retry::Backoff;
    use crate::url_guard::UrlValidator;
    use crate::FetchErrorKind;

    fn adapter(client: &MockHttpClient) -> JsonAdapter {
        let engine = RequestEngine::new(Arc::new(client.clone()), UrlValidator::new())
            .with_backoff(Backoff::none());
        JsonAdapter::new(Arc::new(engine))
    }

    fn source() -> SourceDescriptor {
        SourceDescriptor::parse("https://api.example.com/v1/items").expect("valid source")
    }

    #[tokio::test]
    async fn extracts_rows_under_the_root_path() {
        let client = MockHttpClient::with_responses([HttpResponse::ok_json(
            r#"{"data":{"items":[{"a":1},{"a":2}]}}"#,
        )]);
        let root = RootPath::parse("data.items").expect("valid path");

        let dataset = adapter(&client)
            .fetch(&source(), Some(&root))
            .await
            .expect("fetch succeeds");

        assert_eq!(dataset.headers, vec!["a"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(
            client.requests()[0].headers.get("accept").map(String::as_str),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn html_body_is_a_json_parse_error() {
        let client = MockHttpClient::with_responses([
            HttpResponse::new(200, "<html></html>").with_content_type("text/html"),
        ]);

        let error = adapter(&client)
            .fetch(&source(), None)
            .await
            .expect_err("HTML is not JSON");

        assert_eq!(error.kind(), &FetchErrorKind::JsonParse);
    }

    #[tokio::test]
    async fn foreign_descriptor_is_invalid_source() {
        let client = MockHttpClient::new();
        let descriptor = SourceDescriptor::parse("https://example.com/a.csv").expect("valid");

        let error = adapter(&client)
            .fetch(&descriptor, None)
            .await
            .expect_err("CSV belongs elsewhere");

        assert_eq!(error.kind(), &FetchErrorKind::InvalidSource);
        assert_eq!(client.request_count(), 0);
    }
}
