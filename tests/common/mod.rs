//! Common test utilities

use sitemapper::config::CrawlerConfig;
use sitemapper::crawler::fetcher::HttpFetcher;
use sitemapper::crawler::limiter::{ConcurrencyGate, RateLimiter};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Crawler settings with short backoff and a generous rate limit
pub fn fast_config() -> CrawlerConfig {
    CrawlerConfig {
        max_concurrent: 4,
        requests_per_second: 1000.0,
        request_timeout_secs: 5,
        retry_base_delay_ms: 5,
        retry_max_delay_ms: 20,
        retry_jitter_ms: 0,
        ..Default::default()
    }
}

/// HTTP fetcher built from [`fast_config`] adjusted by `tweak`
#[allow(dead_code)]
pub fn fetcher_with(tweak: impl FnOnce(&mut CrawlerConfig)) -> HttpFetcher {
    let mut config = fast_config();
    tweak(&mut config);
    let limiter = RateLimiter::new(config.requests_per_second).unwrap();
    let gate = ConcurrencyGate::new(config.max_concurrent).unwrap();
    HttpFetcher::new(&config, limiter, gate).unwrap()
}

/// HTML document with a title and one anchor per link
#[allow(dead_code)]
pub fn html_page(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{href}">{href}</a>"#))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head>\n<body>\n{anchors}\n</body></html>"
    )
}

/// Serve `body` as HTML at `route`
#[allow(dead_code)]
pub async fn mount_page(server: &MockServer, route: &str, body: String) {
    mount_page_delayed(server, route, body, Duration::ZERO).await;
}

/// Serve `body` as HTML at `route` after `delay`
#[allow(dead_code)]
pub async fn mount_page_delayed(server: &MockServer, route: &str, body: String, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body, "text/html; charset=utf-8")
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Serve a status-only response at `route`
#[allow(dead_code)]
pub async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Serve a redirect from `route` to `location`
#[allow(dead_code)]
pub async fn mount_redirect(server: &MockServer, route: &str, location: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(301).insert_header("location", location))
        .mount(server)
        .await;
}

/// Absolute URL of `route` on the mock server
#[allow(dead_code)]
pub fn url_of(server: &MockServer, route: &str) -> String {
    format!("{}{}", server.uri(), route)
}
