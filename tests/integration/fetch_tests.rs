use crate::common::fast_settings;
use gallery_harvest::crawler::{Fetcher, HeaderProfile};
use gallery_harvest::FetchError;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}

#[tokio::test]
async fn test_rate_limit_does_not_consume_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;

    let mut settings = fast_settings(&server);
    // A single attempt would be used up by the first 429 if it counted
    settings.max_retries = 1;
    let fetcher = Fetcher::new(settings).unwrap();

    let body = fetcher
        .fetch_text(&format!("{}/page", server.uri()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(body, "hello");
    assert_eq!(requests_to(&server, "/page").await, 3);
}

#[tokio::test]
async fn test_server_errors_exhaust_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(fast_settings(&server)).unwrap();
    let result = fetcher
        .fetch_text(&format!("{}/broken", server.uri()), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(FetchError::Status { status: 500, .. })));
    assert_eq!(requests_to(&server, "/broken").await, 3);
}

#[tokio::test]
async fn test_persistent_rate_limit_is_capped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let mut settings = fast_settings(&server);
    settings.rate_limit_retries = 2;
    let fetcher = Fetcher::new(settings).unwrap();

    let result = fetcher
        .fetch_text(&format!("{}/busy", server.uri()), &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(FetchError::RateLimited { cooldowns: 2, .. })
    ));
    assert_eq!(requests_to(&server, "/busy").await, 3);
}

#[tokio::test]
async fn test_not_found_is_retried_then_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(fast_settings(&server)).unwrap();
    let result = fetcher
        .fetch_text(&format!("{}/missing", server.uri()), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
}

#[tokio::test]
async fn test_fetch_to_file_streams_body() {
    let server = MockServer::start().await;
    let body = vec![7u8; 10_000];

    Mock::given(method("GET"))
        .and(path("/img/27a01.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("27a01.jpg");
    let fetcher = Fetcher::new(fast_settings(&server))
        .unwrap()
        .with_profile(HeaderProfile::Image);

    let written = fetcher
        .fetch_to_file(
            &format!("{}/img/27a01.jpg", server.uri()),
            &target,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(written, 10_000);
    assert_eq!(std::fs::read(&target).unwrap(), body);
    assert!(!dir.path().join("27a01.jpg.part").exists());
}

#[tokio::test]
async fn test_failed_download_leaves_no_file() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("27a01.jpg");
    let fetcher = Fetcher::new(fast_settings(&server)).unwrap();

    let result = fetcher
        .fetch_to_file(
            &format!("{}/img/27a01.jpg", server.uri()),
            &target,
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_err());
    assert!(!target.exists());
    assert!(!dir.path().join("27a01.jpg.part").exists());
}

#[tokio::test]
async fn test_cancellation_interrupts_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(fast_settings(&server)).unwrap();
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
    }

    let started = Instant::now();
    let result = fetcher
        .fetch_text(&format!("{}/slow", server.uri()), &cancel)
        .await;

    assert!(matches!(result, Err(FetchError::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(10));
    // Cancelled requests are never retried
    assert!(requests_to(&server, "/slow").await <= 1);
}

#[tokio::test]
async fn test_page_requests_send_host_header() {
    let server = MockServer::start().await;
    let settings = fast_settings(&server);
    let host = settings.host.clone();

    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("host", host.as_str()))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(settings).unwrap();
    let body = fetcher
        .fetch_text(&format!("{}/page", server.uri()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_image_requests_send_referer() {
    let server = MockServer::start().await;
    let referer = format!("{}/", server.uri());

    Mock::given(method("GET"))
        .and(path("/img/27a01.jpg"))
        .and(header("referer", referer.as_str()))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("27a01.jpg");
    let fetcher = Fetcher::new(fast_settings(&server))
        .unwrap()
        .with_profile(HeaderProfile::Image);

    let written = fetcher
        .fetch_to_file(
            &format!("{}/img/27a01.jpg", server.uri()),
            &target,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(written, 3);
}

#[tokio::test]
async fn test_server_error_retries_without_cooldown() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let mut settings = fast_settings(&server);
    // Only a 429 waits out the cooldown
    settings.retry_cooldown = Duration::from_secs(5);
    let fetcher = Fetcher::new(settings).unwrap();

    let started = Instant::now();
    let body = fetcher
        .fetch_text(&format!("{}/flaky", server.uri()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(body, "ok");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(requests_to(&server, "/flaky").await, 2);
}

#[tokio::test]
async fn test_timeout_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("slow")
                .set_delay(Duration::from_secs(3)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fast"))
        .mount(&server)
        .await;

    let mut settings = fast_settings(&server);
    settings.timeout = Duration::from_millis(500);
    let fetcher = Fetcher::new(settings).unwrap();

    let body = fetcher
        .fetch_text(&format!("{}/slow", server.uri()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(body, "fast");
    assert_eq!(requests_to(&server, "/slow").await, 2);
}
