//! End-to-end fetch behaviour through the production wiring with a scripted transport.

use std::fs;
use std::sync::Arc;

use ferrotab_core::{
    Backoff, CacheStatus, CallerIdentity, Cell, FetchConfig, FetchErrorKind, FetchOptions,
    Fetcher, HttpError, HttpResponse, InMemoryStore, MockHttpClient, RateLimitPolicy,
    RequestProfile, RootPath, SourceFamily,
};

fn config() -> FetchConfig {
    let mut config = FetchConfig::default().with_backoff(Backoff::none());
    config.pages_per_second = 0;
    config
}

fn fetcher_with(config: &FetchConfig, client: &MockHttpClient) -> Fetcher {
    Fetcher::from_config(config, Arc::new(client.clone()), Arc::new(InMemoryStore::new()))
}

#[tokio::test]
async fn when_json_endpoint_returns_array_then_rows_follow_its_order() {
    // given
    let client = MockHttpClient::with_responses([HttpResponse::ok_json(
        r#"[{"name":"Ada","age":36},{"name":"Grace","age":85}]"#,
    )]);
    let fetcher = fetcher_with(&config(), &client);

    // when
    let response = fetcher
        .fetch("https://data.example.com/people.json", &FetchOptions::default())
        .await
        .expect("fetch succeeds");

    // then
    assert_eq!(response.cache, CacheStatus::Miss);
    assert_eq!(response.dataset.headers, vec!["name", "age"]);
    let names: Vec<_> = response
        .dataset
        .rows
        .iter()
        .map(|row| row.get("name").map(Cell::as_text).unwrap_or_default().into_owned())
        .collect();
    assert_eq!(names, vec!["Ada", "Grace"]);
}

#[tokio::test]
async fn when_root_path_is_given_then_only_the_nested_value_is_tabulated() {
    // given
    let client = MockHttpClient::with_responses([HttpResponse::ok_json(
        r#"{"data":{"items":[{"a":1},{"a":2}]}}"#,
    )]);
    let fetcher = fetcher_with(&config(), &client);
    let options =
        FetchOptions::default().with_root_path(RootPath::parse("data.items").expect("valid root"));

    // when
    let response = fetcher
        .fetch("https://data.example.com/nested.json", &options)
        .await
        .expect("fetch succeeds");

    // then
    assert_eq!(response.dataset.len(), 2);
    assert_eq!(response.dataset.headers, vec!["a"]);
}

#[tokio::test]
async fn when_root_path_segment_is_missing_then_error_names_the_segment() {
    // given
    let client = MockHttpClient::with_responses([HttpResponse::ok_json(r#"{"data":{}}"#)]);
    let fetcher = fetcher_with(&config(), &client);
    let options =
        FetchOptions::default().with_root_path(RootPath::parse("data.items").expect("valid root"));

    // when
    let error = fetcher
        .fetch("https://data.example.com/nested.json", &options)
        .await
        .expect_err("missing segment");

    // then
    assert_eq!(
        error.kind(),
        &FetchErrorKind::PathExtraction {
            segment: String::from("items")
        }
    );
}

#[tokio::test]
async fn when_csv_export_has_ragged_rows_then_they_are_dropped() {
    // given
    let client = MockHttpClient::with_responses([HttpResponse::ok_text(
        "name,age\nAda,36\nbroken\nGrace,85\n",
    )
    .with_content_type("text/csv")]);
    let fetcher = fetcher_with(&config(), &client);

    // when
    let response = fetcher
        .fetch("https://data.example.com/people.csv", &FetchOptions::default())
        .await
        .expect("fetch succeeds");

    // then
    assert_eq!(response.dataset.headers, vec!["name", "age"]);
    assert_eq!(response.dataset.len(), 2);
    assert_eq!(
        response.dataset.rows[1].get("age"),
        Some(&Cell::text("85"))
    );
}

#[tokio::test]
async fn when_same_csv_is_fetched_twice_uncached_then_datasets_are_identical() {
    // given
    let client = MockHttpClient::with_responses([HttpResponse::ok_text("x,y\n1,2\n3,4\n")]);
    let fetcher = fetcher_with(&config(), &client);
    let source = "https://data.example.com/grid.csv";

    // when
    let first = fetcher.fetch(source, &FetchOptions::uncached()).await.expect("fetch");
    let second = fetcher.fetch(source, &FetchOptions::uncached()).await.expect("fetch");

    // then
    assert_eq!(first.dataset, second.dataset);
    assert_eq!(client.request_count(), 2);
}

#[tokio::test]
async fn when_sheet_link_is_fetched_then_the_csv_export_is_requested() {
    // given
    let client = MockHttpClient::with_responses([HttpResponse::ok_text("a\n1\n")]);
    let fetcher = fetcher_with(&config(), &client);

    // when
    fetcher
        .fetch(
            "https://docs.google.com/spreadsheets/d/sheet123/edit#gid=42",
            &FetchOptions::default(),
        )
        .await
        .expect("fetch succeeds");

    // then
    let requests = client.requests();
    assert_eq!(
        requests[0].url,
        "https://docs.google.com/spreadsheets/d/sheet123/export?format=csv&gid=42"
    );
}

#[tokio::test]
async fn when_record_api_paginates_forever_then_fetch_stops_at_the_page_ceiling() {
    // given
    let mut config = config();
    config.max_pages = 3;
    let client = MockHttpClient::with_responses([HttpResponse::ok_json(
        r#"{"records":[{"id":"rec1","fields":{"Name":"x","Tags":["a","b"]}}],"offset":"more"}"#,
    )]);
    let fetcher = fetcher_with(&config, &client);

    // when
    let response = fetcher
        .fetch("airtable://appABC/Tasks?token=patSECRET", &FetchOptions::default())
        .await
        .expect("fetch succeeds");

    // then
    assert_eq!(client.request_count(), 3);
    assert_eq!(response.dataset.len(), 3);
    let first = &response.dataset.rows[0];
    assert_eq!(first.keys().collect::<Vec<_>>(), vec!["_id", "Name", "Tags"]);
    assert_eq!(first.get("Tags"), Some(&Cell::text("a, b")));
}

#[tokio::test]
async fn when_upstream_fails_transiently_then_request_is_retried() {
    // given
    let client = MockHttpClient::new();
    client.push(Err(HttpError::new("connection reset")));
    client.push(Ok(HttpResponse::new(503, "")));
    client.push(Ok(HttpResponse::ok_json(r#"[{"ok":true}]"#)));
    let fetcher = fetcher_with(&config(), &client);

    // when
    let response = fetcher
        .fetch("https://data.example.com/flaky.json", &FetchOptions::default())
        .await
        .expect("third attempt succeeds");

    // then
    assert_eq!(response.dataset.len(), 1);
    assert_eq!(client.request_count(), 3);
    let stats = fetcher.engine_stats().expect("engine is wired");
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.succeeded, 1);
}

#[tokio::test]
async fn when_cache_warmup_profile_is_configured_then_its_timeout_and_retry_ceiling_apply() {
    // given
    let config = config().with_request_profile(RequestProfile::CacheWarmup);
    let client = MockHttpClient::with_responses([HttpResponse::new(503, "")]);
    let fetcher = fetcher_with(&config, &client);

    // when
    let error = fetcher
        .fetch("https://data.example.com/warm.json", &FetchOptions::uncached())
        .await
        .expect_err("upstream keeps failing");

    // then
    assert_eq!(error.status(), Some(503));
    assert_eq!(client.request_count(), 3);
    assert!(client
        .requests()
        .iter()
        .all(|request| request.timeout == std::time::Duration::from_secs(10)));
}

#[tokio::test]
async fn when_health_check_profile_is_configured_then_every_family_uses_it() {
    // given
    let mut config = config().with_request_profile(RequestProfile::HealthCheck);
    config.max_pages = 1;
    let client = MockHttpClient::with_responses([HttpResponse::new(500, "")]);
    let fetcher = fetcher_with(&config, &client);

    // when
    for source in [
        "https://data.example.com/probe.csv",
        "airtable://appABC/Tasks?token=patSECRET",
    ] {
        fetcher
            .fetch(source, &FetchOptions::uncached())
            .await
            .expect_err("upstream is down");
    }

    // then
    let requests = client.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests
        .iter()
        .all(|request| request.timeout == std::time::Duration::from_secs(10)));
}

#[tokio::test]
async fn when_upstream_returns_not_found_then_no_retry_happens() {
    // given
    let client = MockHttpClient::with_responses([HttpResponse::new(404, "gone")]);
    let fetcher = fetcher_with(&config(), &client);

    // when
    let error = fetcher
        .fetch("https://data.example.com/missing.json", &FetchOptions::default())
        .await
        .expect_err("404 is terminal");

    // then
    assert_eq!(error.status(), Some(404));
    assert!(!error.retryable());
    assert_eq!(client.request_count(), 1);
}

#[tokio::test]
async fn when_local_file_is_under_a_root_then_it_is_read_without_network() {
    // given
    let root = tempfile::tempdir().expect("tempdir");
    let path = root.path().join("inventory.csv");
    fs::write(&path, "sku,qty\nA1,4\n").expect("write fixture");
    let client = MockHttpClient::new();
    let fetcher = fetcher_with(&config().with_local_root(root.path()), &client);

    // when
    let response = fetcher
        .fetch(path.to_str().expect("utf-8 path"), &FetchOptions::default())
        .await
        .expect("fetch succeeds");

    // then
    assert_eq!(response.dataset.len(), 1);
    assert_eq!(response.dataset.rows[0].get("qty"), Some(&Cell::text("4")));
    assert_eq!(client.request_count(), 0);
}

#[tokio::test]
async fn when_caller_exceeds_quota_then_further_fetches_are_refused() {
    // given
    let mut config = config();
    config.rate_limit = RateLimitPolicy {
        max_requests: 2,
        window: std::time::Duration::from_secs(60),
    };
    let client = MockHttpClient::with_responses([HttpResponse::ok_json("[]")]);
    let fetcher = fetcher_with(&config, &client);
    let caller = CallerIdentity::User(String::from("u-1"));
    let source = "https://data.example.com/quota.json";

    // when
    let first = fetcher.fetch_as(&caller, source, &FetchOptions::default()).await;
    let second = fetcher.fetch_as(&caller, source, &FetchOptions::default()).await;
    let third = fetcher.fetch_as(&caller, source, &FetchOptions::default()).await;

    // then
    assert!(first.is_ok());
    assert!(second.is_ok());
    let error = third.expect_err("quota exhausted");
    assert_eq!(error.kind(), &FetchErrorKind::CallerRateLimited);
}

#[test]
fn when_built_from_config_then_every_family_has_an_adapter() {
    let fetcher = fetcher_with(&config(), &MockHttpClient::new());

    assert_eq!(
        fetcher.families(),
        vec![
            SourceFamily::Csv,
            SourceFamily::Json,
            SourceFamily::Local,
            SourceFamily::PaginatedApi
        ]
    );
}
