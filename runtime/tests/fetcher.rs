//! Orchestrator behavior: remote rendering service and auto escalation.

mod common;

use common::TableRenderer;
use pagefetch_runtime::renderer::PageRenderer;
use pagefetch_runtime::{FetchConfig, FetchError, FetchMode, FetchRequest, Fetcher, RenderFailure};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROFILE: &str = "https://www.pixnoy.com/profile/xlisa_olivex/";

fn service_config(server: &MockServer) -> FetchConfig {
    FetchConfig {
        retry_budget: 0,
        render_service_url: Some(format!("{}/render", server.uri())),
        ..FetchConfig::default()
    }
}

#[tokio::test]
async fn test_remote_service_returns_first_data_element() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/render"))
        .and(query_param("url", PROFILE))
        .and(query_param("selector", ".post_box"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": ["<div class=\"post_box\">post</div>", "ignored"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(service_config(&server)).unwrap();
    let html = fetcher.fetch_page(PROFILE, ".post_box").await;

    assert_eq!(html, "<div class=\"post_box\">post</div>");
}

#[tokio::test]
async fn test_remote_service_empty_data_is_empty_content() {
    let server = MockServer::start().await;
    Mock::given(path("/render"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(service_config(&server)).unwrap();
    let request = fetcher.page_request(PROFILE, ".post_box");
    let result = fetcher.fetch(&request).await;

    assert!(result.succeeded);
    assert_eq!(result.content, "");
}

#[tokio::test]
async fn test_remote_service_failure_collapses_to_empty() {
    let server = MockServer::start().await;
    Mock::given(path("/render"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(service_config(&server)).unwrap();
    let request = fetcher.page_request(PROFILE, ".post_box");

    let err = fetcher.try_fetch(&request).await.unwrap_err();
    assert!(matches!(err, FetchError::Render(RenderFailure::Service(_))));
    assert_eq!(fetcher.fetch_page(PROFILE, ".post_box").await, "");
}

#[tokio::test]
async fn test_slow_remote_render_outlives_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(path("/render"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": ["<html>ok</html>"]}))
                .set_delay(Duration::from_millis(1_500)),
        )
        .mount(&server)
        .await;

    let config = FetchConfig {
        timeout_ms: 1_000,
        render_service_url: Some(format!("{}/render", server.uri())),
        ..FetchConfig::default()
    };
    let fetcher = Fetcher::new(config).unwrap();
    let request = fetcher.page_request(PROFILE, ".post_box");

    let html = fetcher.try_fetch(&request).await.unwrap();

    assert_eq!(html, "<html>ok</html>");
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remote_render_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(path("/render"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = FetchConfig {
        retry_budget: 2,
        ..service_config(&server)
    };
    let fetcher = Fetcher::new(config).unwrap();
    let request = fetcher.page_request(PROFILE, ".post_box");

    let err = fetcher.try_fetch(&request).await.unwrap_err();

    assert!(matches!(err, FetchError::Render(RenderFailure::Service(_))));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remote_service_takes_precedence_over_local_browser() {
    let server = MockServer::start().await;
    Mock::given(path("/render"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": ["remote"]})))
        .mount(&server)
        .await;

    let config = FetchConfig {
        browser_executable_path: Some("/nonexistent/chromium".into()),
        ..service_config(&server)
    };
    let fetcher = Fetcher::new(config).unwrap();

    assert_eq!(fetcher.fetch_page(PROFILE, "body").await, "remote");
}

#[tokio::test]
async fn test_plain_mode_returns_body() {
    let server = MockServer::start().await;
    Mock::given(path("/static"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>static</p>"))
        .mount(&server)
        .await;

    let fetcher = Fetcher::http_only(FetchConfig::default()).unwrap();
    let request = FetchRequest::new(
        format!("{}/static", server.uri()),
        FetchMode::Plain,
        Duration::from_secs(10),
    );

    assert_eq!(fetcher.try_fetch(&request).await.unwrap(), "<p>static</p>");
}

fn auto_request(url: String) -> FetchRequest {
    FetchRequest::new(url, FetchMode::Auto, Duration::from_secs(30)).with_selector(".post_box")
}

#[tokio::test]
async fn test_auto_serves_ready_static_page_without_browser() {
    let server = MockServer::start().await;
    Mock::given(path("/profile"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<div class=\"post_box\">static</div>"),
        )
        .mount(&server)
        .await;

    let url = format!("{}/profile", server.uri());
    let renderer = Arc::new(TableRenderer::default().with_page(&url, "rendered"));
    let shared: Arc<dyn PageRenderer> = renderer.clone();
    let fetcher = Fetcher::with_renderer(FetchConfig::default(), shared).unwrap();

    let html = fetcher.try_fetch(&auto_request(url)).await.unwrap();

    assert!(html.contains("static"));
    assert_eq!(renderer.total_calls(), 0);
}

#[tokio::test]
async fn test_auto_escalates_when_selector_missing() {
    let server = MockServer::start().await;
    Mock::given(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<div id=\"app\"></div>"))
        .mount(&server)
        .await;

    let url = format!("{}/profile", server.uri());
    let renderer = Arc::new(
        TableRenderer::default().with_page(&url, "<div class=\"post_box\">rendered</div>"),
    );
    let shared: Arc<dyn PageRenderer> = renderer.clone();
    let fetcher = Fetcher::with_renderer(FetchConfig::default(), shared).unwrap();

    let html = fetcher.try_fetch(&auto_request(url.clone())).await.unwrap();

    assert!(html.contains("rendered"));
    assert_eq!(renderer.calls(&url), 1);
}

#[tokio::test]
async fn test_auto_escalates_on_challenge_page() {
    let server = MockServer::start().await;
    Mock::given(path("/profile"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cf-mitigated", "challenge")
                .set_body_string("<html><title>Just a moment...</title></html>"),
        )
        .mount(&server)
        .await;

    let url = format!("{}/profile", server.uri());
    let renderer = Arc::new(TableRenderer::default().with_page(&url, "<p>past it</p>"));
    let shared: Arc<dyn PageRenderer> = renderer.clone();
    let fetcher = Fetcher::with_renderer(FetchConfig::default(), shared).unwrap();
    // No selector: only the challenge makes the static page unusable.
    let request = FetchRequest::new(url.clone(), FetchMode::Auto, Duration::from_secs(30));

    let html = fetcher.try_fetch(&request).await.unwrap();

    assert_eq!(html, "<p>past it</p>");
    assert_eq!(renderer.calls(&url), 1);
}

#[tokio::test]
async fn test_auto_escalates_when_static_fetch_fails() {
    let server = MockServer::start().await;
    Mock::given(path("/profile"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let url = format!("{}/profile", server.uri());
    let renderer = Arc::new(
        TableRenderer::default().with_page(&url, "<div class=\"post_box\">rendered</div>"),
    );
    let shared: Arc<dyn PageRenderer> = renderer.clone();
    let fetcher = Fetcher::with_renderer(FetchConfig::default(), shared).unwrap();

    let html = fetcher.try_fetch(&auto_request(url.clone())).await.unwrap();

    assert!(html.contains("rendered"));
    assert_eq!(renderer.calls(&url), 1);
}

#[tokio::test]
async fn test_auto_does_not_escalate_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(path("/profile"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "60"))
        .mount(&server)
        .await;

    let url = format!("{}/profile", server.uri());
    let renderer = Arc::new(TableRenderer::default());
    let shared: Arc<dyn PageRenderer> = renderer.clone();
    let fetcher = Fetcher::with_renderer(FetchConfig::default(), shared).unwrap();

    let err = fetcher.try_fetch(&auto_request(url)).await.unwrap_err();

    assert_eq!(err.rate_limit_wait(), Some(Duration::from_secs(60)));
    assert_eq!(renderer.total_calls(), 0);
}

#[tokio::test]
async fn test_auto_without_renderer_returns_static_body() {
    let server = MockServer::start().await;
    Mock::given(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<div id=\"app\"></div>"))
        .mount(&server)
        .await;

    let fetcher = Fetcher::http_only(FetchConfig::default()).unwrap();
    let html = fetcher
        .try_fetch(&auto_request(format!("{}/profile", server.uri())))
        .await
        .unwrap();

    assert_eq!(html, "<div id=\"app\"></div>");
}

#[tokio::test]
async fn test_request_timeout_bounds_whole_fetch() {
    let renderer: Arc<dyn PageRenderer> =
        Arc::new(TableRenderer::default().with_delay(Duration::from_secs(5)));
    let fetcher = Fetcher::with_renderer(FetchConfig::default(), renderer).unwrap();
    let request = FetchRequest::new(PROFILE, FetchMode::Browser, Duration::from_millis(100));

    let err = fetcher.try_fetch(&request).await.unwrap_err();

    assert!(matches!(err, FetchError::Timeout { .. }));
}
