//! HttpFetcher against a local mock server

mod helpers;

use europatch_common::config::ScraperConfig;
use europatch_common::db::{init_memory_database, Provenance};
use europatch_server::scraper::{FetchError, HttpFetcher, PageFetcher};
use europatch_server::services::RackParser;
use helpers::{plaits_detail_page, plaits_rack_page};
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8")
}

fn config(base_url: &str) -> ScraperConfig {
    ScraperConfig {
        base_url: base_url.to_string(),
        user_agent: "europatch-test/1.0".to_string(),
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn test_fetch_returns_body_and_sends_user_agent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("user-agent", "europatch-test/1.0"))
        .respond_with(html("<html><body>hello</body></html>".to_string()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&config(&mock_server.uri())).unwrap();
    let body = fetcher.fetch(&format!("{}/page", mock_server.uri())).await.unwrap();
    assert!(body.contains("hello"));
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&config(&mock_server.uri())).unwrap();
    let err = fetcher.fetch(&format!("{}/broken", mock_server.uri())).await.unwrap_err();
    assert!(matches!(err, FetchError::Status(500)));
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let fetcher = HttpFetcher::new(&config("http://127.0.0.1:9")).unwrap();
    let err = fetcher.fetch("http://127.0.0.1:9/nothing").await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
}

#[tokio::test]
async fn test_rack_import_over_http() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/e/racks/view/555"))
        .respond_with(html(plaits_rack_page()))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/e/mutable-instruments-plaits"))
        .respond_with(html(plaits_detail_page()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let base = mock_server.uri();
    let fetcher = HttpFetcher::new(&config(&base)).unwrap();
    let parser = RackParser::new(Arc::new(fetcher), base.clone());
    let pool = init_memory_database().await.unwrap();

    let rack_url = format!("{}/e/racks/view/555", base);
    let result = parser.parse_rack_url(&pool, &rack_url).await.unwrap();
    assert_eq!(result.provenance, Provenance::Extracted);
    assert_eq!(result.modulargrid_id.as_deref(), Some("555"));
    assert_eq!(result.modules[0].module.module_type.as_deref(), Some("Oscillator"));

    // Served from the store; the mocks' expect(1) verifies no refetch
    let again = parser.parse_rack_url(&pool, &rack_url).await.unwrap();
    assert!(again.cached);
}
