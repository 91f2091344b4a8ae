//! Integration tests for HttpFetcher using wiremock
//!
//! These tests validate retries, redirect handling and content-type
//! detection against mock servers.

mod common;

use sitemapper::crawler::fetcher::PageFetcher;
use sitemapper::crawler::links::LinkExtractor;
use sitemapper::crawler::url::SitePolicy;
use sitemapper::utils::error::FetchError;
use futures::future::join_all;
use std::time::{Duration, Instant};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    fetcher_with, html_page, mount_page, mount_page_delayed, mount_redirect, mount_status, url_of,
};

fn parse(url: &str) -> Url {
    Url::parse(url).unwrap()
}

/// Test successful fetch from mock server
#[tokio::test]
async fn test_fetch_success() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/page", html_page("Serviços", &["/a"])).await;

    let fetcher = fetcher_with(|_| {});
    let result = fetcher.fetch(&parse(&url_of(&mock_server, "/page"))).await;

    assert_eq!(result.attempts, 1);
    let page = result.outcome.expect("fetch should succeed");
    assert_eq!(page.status, 200);
    assert!(page.is_html());
    assert!(!page.was_redirected());
    assert!(page.body.unwrap().contains("Serviços"));
}

/// Test that server errors trigger retries
#[tokio::test]
async fn test_server_error_retry() {
    let mock_server = MockServer::start().await;

    // Return 500 three times, then succeed
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, "/flaky", html_page("ok", &[])).await;

    let fetcher = fetcher_with(|_| {});
    let result = fetcher.fetch(&parse(&url_of(&mock_server, "/flaky"))).await;

    assert!(result.outcome.is_ok(), "Should succeed after retries");
    assert_eq!(result.attempts, 4);
}

/// Test max retries exceeded
#[tokio::test]
async fn test_max_retries_exceeded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_with(|_| {});
    let result = fetcher.fetch(&parse(&url_of(&mock_server, "/down"))).await;

    assert_eq!(result.attempts, 4);
    assert!(matches!(result.outcome, Err(FetchError::Status(503))));
}

/// Every retry waits for its own limiter token
#[tokio::test]
async fn test_retries_consume_limiter_tokens() {
    let mock_server = MockServer::start().await;
    mount_status(&mock_server, "/down", 500).await;

    // burst of two, then one token every 500ms
    let fetcher = fetcher_with(|c| c.requests_per_second = 2.0);
    let started = Instant::now();
    let result = fetcher.fetch(&parse(&url_of(&mock_server, "/down"))).await;

    assert_eq!(result.attempts, 4);
    assert!(matches!(result.outcome, Err(FetchError::Status(500))));
    assert!(
        started.elapsed() >= Duration::from_millis(900),
        "four attempts took {:?}",
        started.elapsed()
    );
}

/// The gate caps simultaneous requests across concurrent callers
#[tokio::test]
async fn test_gate_bounds_concurrent_fetches() {
    let mock_server = MockServer::start().await;
    mount_page_delayed(
        &mock_server,
        "/slow",
        html_page("Lento", &[]),
        Duration::from_millis(200),
    )
    .await;

    let fetcher = fetcher_with(|c| c.max_concurrent = 2);
    let url = parse(&url_of(&mock_server, "/slow"));
    let started = Instant::now();
    let results = join_all((0..6).map(|_| fetcher.fetch(&url))).await;

    assert!(results.iter().all(|r| r.outcome.is_ok()));
    // six requests through two slots need three rounds
    assert!(
        started.elapsed() >= Duration::from_millis(550),
        "six fetches took {:?}",
        started.elapsed()
    );
}

/// Test 404 does not retry
#[tokio::test]
async fn test_404_no_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notfound"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1) // Should only be called once (no retry)
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_with(|_| {});
    let result = fetcher
        .fetch(&parse(&url_of(&mock_server, "/notfound")))
        .await;

    assert_eq!(result.attempts, 1);
    assert!(matches!(result.outcome, Err(FetchError::Status(404))));
}

/// Non-HTML responses succeed without a body
#[tokio::test]
async fn test_non_html_has_no_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(b"%PDF-1.4".to_vec()),
        )
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_with(|_| {});
    let page = fetcher
        .fetch(&parse(&url_of(&mock_server, "/report.pdf")))
        .await
        .outcome
        .unwrap();

    assert!(!page.is_html());
    assert_eq!(page.content_type.as_deref(), Some("application/pdf"));
}

/// Legacy charsets are decoded from the content type
#[tokio::test]
async fn test_latin1_body_decoded() {
    let mock_server = MockServer::start().await;

    // "Ação" in ISO-8859-1
    let body = b"<html><head><title>A\xe7\xe3o</title></head></html>".to_vec();
    Mock::given(method("GET"))
        .and(path("/latin"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=iso-8859-1")
                .set_body_bytes(body),
        )
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_with(|_| {});
    let page = fetcher
        .fetch(&parse(&url_of(&mock_server, "/latin")))
        .await
        .outcome
        .unwrap();

    assert!(page.body.unwrap().contains("Ação"));
}

/// Without a header charset the `<meta>` declaration picks the decoder
#[tokio::test]
async fn test_meta_charset_body_decoded() {
    let mock_server = MockServer::start().await;

    // "Serviços" in ISO-8859-1, declared only in the document
    let body = b"<html><head><meta charset=\"iso-8859-1\"><title>Servi\xe7os</title></head></html>"
        .to_vec();
    Mock::given(method("GET"))
        .and(path("/servicos"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_bytes(body),
        )
        .mount(&mock_server)
        .await;

    let url = parse(&url_of(&mock_server, "/servicos"));
    let fetcher = fetcher_with(|_| {});
    let page = fetcher.fetch(&url).await.outcome.unwrap();

    let body = page.body.unwrap();
    let links = LinkExtractor::new().extract(&body, &page.final_url);
    assert_eq!(links.title.as_deref(), Some("Serviços"));
}

/// Redirect chains are followed and the final URL reported
#[tokio::test]
async fn test_redirect_chain_followed() {
    let mock_server = MockServer::start().await;
    mount_redirect(&mock_server, "/old", "/middle").await;
    mount_redirect(&mock_server, "/middle", "new").await;
    mount_page(&mock_server, "/new", html_page("New", &[])).await;

    let fetcher = fetcher_with(|_| {});
    let requested = parse(&url_of(&mock_server, "/old"));
    let page = fetcher.fetch(&requested).await.outcome.unwrap();

    assert!(page.was_redirected());
    assert_eq!(page.requested_url, requested);
    assert_eq!(page.final_url.as_str(), url_of(&mock_server, "/new"));
}

/// A redirect cycle ends with RedirectLoop after the hop limit
#[tokio::test]
async fn test_redirect_loop_detected() {
    let mock_server = MockServer::start().await;
    mount_redirect(&mock_server, "/a", "/b").await;
    mount_redirect(&mock_server, "/b", "/a").await;

    let fetcher = fetcher_with(|c| c.max_redirects = 5);
    let result = fetcher.fetch(&parse(&url_of(&mock_server, "/a"))).await;

    assert_eq!(result.attempts, 1);
    assert!(matches!(
        result.outcome,
        Err(FetchError::RedirectLoop { hops: 5 })
    ));
}

/// Redirects leaving the site are reported, not followed
#[tokio::test]
async fn test_external_redirect_not_followed() {
    let mock_server = MockServer::start().await;
    mount_redirect(&mock_server, "/away", "https://elsewhere.test/landing").await;

    let seed = parse(&url_of(&mock_server, "/"));
    let fetcher = fetcher_with(|_| {}).with_scope(SitePolicy::from_root(&seed, false));
    let result = fetcher.fetch(&parse(&url_of(&mock_server, "/away"))).await;

    match result.outcome {
        Err(FetchError::ExternalRedirect(target)) => {
            assert_eq!(target, "https://elsewhere.test/landing");
        }
        other => panic!("expected external redirect, got {other:?}"),
    }
}

/// A redirect without Location is an invalid redirect
#[tokio::test]
async fn test_redirect_without_location() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(302))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_with(|_| {});
    let result = fetcher.fetch(&parse(&url_of(&mock_server, "/broken"))).await;

    assert!(matches!(result.outcome, Err(FetchError::InvalidRedirect(_))));
}

/// Test timeout handling
#[tokio::test]
async fn test_timeout_handling() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("slow")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let fetcher = fetcher_with(|c| {
        c.request_timeout_secs = 1;
        c.max_retries = 0;
    });
    let result = fetcher.fetch(&parse(&url_of(&mock_server, "/slow"))).await;

    assert_eq!(result.attempts, 1);
    assert!(matches!(result.outcome, Err(FetchError::Timeout)));
}

/// Connection failures are retried, then reported
#[tokio::test]
async fn test_connection_refused() {
    let fetcher = fetcher_with(|c| c.max_retries = 1);
    let result = fetcher.fetch(&parse("http://127.0.0.1:1/")).await;

    assert_eq!(result.attempts, 2);
    assert!(matches!(
        result.outcome,
        Err(FetchError::Connect(_) | FetchError::Http(_))
    ));
}
