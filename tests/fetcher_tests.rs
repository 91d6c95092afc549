//! Concurrency-limited fetching: ceiling, ordering and failure isolation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::mocks::CountingFetcher;
use rstest::rstest;
use sokrat::pipeline::fetcher::{BoundedFetcher, TRUNCATION_MARKER};
use sokrat::tools::{HttpPageFetcher, PageFetcher};
use sokrat::utils::toml_config::FetchConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("https://site{}.example/page", i)).collect()
}

#[rstest]
#[case(1, 6)]
#[case(2, 6)]
#[case(3, 10)]
#[tokio::test]
async fn test_in_flight_fetches_never_exceed_ceiling(#[case] k: usize, #[case] n: usize) {
    let double = Arc::new(CountingFetcher::new(Duration::from_millis(50)));
    let fetcher = BoundedFetcher::new(double.clone(), FetchConfig::default().with_concurrency(k));

    let documents = fetcher.fetch_all(&urls(n)).await;

    assert_eq!(documents.len(), n);
    assert_eq!(double.started(), n);
    assert!(double.max_in_flight() <= k);
    assert_eq!(double.max_in_flight(), k);
}

#[tokio::test]
async fn test_ceiling_holds_across_concurrent_batches() {
    let double = Arc::new(CountingFetcher::new(Duration::from_millis(50)));
    let fetcher = BoundedFetcher::new(double.clone(), FetchConfig::default().with_concurrency(2));

    let first = urls(4);
    let second = urls(4);
    let (a, b) = tokio::join!(fetcher.fetch_all(&first), fetcher.fetch_all(&second));

    assert_eq!(a.len() + b.len(), 8);
    assert!(double.max_in_flight() <= 2);
}

#[tokio::test]
async fn test_output_keeps_input_order() {
    let double = Arc::new(CountingFetcher::new(Duration::from_millis(10)));
    let fetcher = BoundedFetcher::new(double, FetchConfig::default().with_concurrency(3));
    let input = urls(7);

    let documents = fetcher.fetch_all(&input).await;

    let order: Vec<_> = documents.iter().map(|d| d.url.clone()).collect();
    assert_eq!(order, input);
}

#[tokio::test]
async fn test_failures_are_dropped_and_the_rest_survive() {
    let double = Arc::new(CountingFetcher::new(Duration::from_millis(10)));
    let fetcher = BoundedFetcher::new(
        double.clone(),
        FetchConfig::default()
            .with_concurrency(2)
            .with_request_timeout(Duration::from_millis(300)),
    );
    let input: Vec<String> = [
        "https://a.example/ok",
        "https://b.example/fail",
        "https://c.example/report.pdf",
        "https://d.example/slow",
        "https://e.example/ok",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let documents = fetcher.fetch_all(&input).await;

    let order: Vec<_> = documents.iter().map(|d| d.url.as_str()).collect();
    assert_eq!(order, vec!["https://a.example/ok", "https://e.example/ok"]);
    assert_eq!(double.started(), 5);
}

#[tokio::test]
async fn test_duplicates_fetched_per_occurrence() {
    let double = Arc::new(CountingFetcher::new(Duration::from_millis(5)));
    let fetcher = BoundedFetcher::new(double.clone(), FetchConfig::default());
    let same = "https://same.example/".to_string();

    let documents = fetcher.fetch_all(&[same.clone(), same]).await;

    assert_eq!(documents.len(), 2);
    assert_eq!(double.started(), 2);
}

#[tokio::test]
async fn test_empty_input_yields_empty_output() {
    let double = Arc::new(CountingFetcher::new(Duration::from_millis(5)));
    let fetcher = BoundedFetcher::new(double.clone(), FetchConfig::default());

    assert!(fetcher.fetch_all(&[]).await.is_empty());
    assert_eq!(double.started(), 0);
}

#[tokio::test]
async fn test_zero_concurrency_is_treated_as_one() {
    let double = Arc::new(CountingFetcher::new(Duration::from_millis(10)));
    let fetcher = BoundedFetcher::new(double.clone(), FetchConfig::default().with_concurrency(0));

    assert_eq!(fetcher.concurrency(), 1);
    assert_eq!(fetcher.fetch_all(&urls(3)).await.len(), 3);
    assert_eq!(double.max_in_flight(), 1);
}

#[tokio::test]
async fn test_long_text_is_truncated_with_marker() {
    let body = "слово ".repeat(100);
    let double = Arc::new(CountingFetcher::new(Duration::from_millis(1)).with_body(&body));
    let fetcher = BoundedFetcher::new(double, FetchConfig::default().with_max_text_chars(30));

    let documents = fetcher.fetch_all(&urls(1)).await;

    let text = &documents[0].cleaned_text;
    assert!(text.ends_with(TRUNCATION_MARKER));
    assert_eq!(text.chars().count(), 30 + TRUNCATION_MARKER.chars().count());
    assert_eq!(documents[0].word_count, text.split_whitespace().count());
}

// ============= HTTP fetcher =============

const ARTICLE: &str = r#"<html>
<head><title>Wave energy</title></head>
<body>
  <header>Site header</header>
  <article>
    <p>Pelamis converters reached 45% efficiency.</p>
    <script>track()</script>
  </article>
  <footer>Footer text</footer>
</body>
</html>"#;

#[tokio::test]
async fn test_http_fetcher_extracts_html_and_skips_other_types() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(ARTICLE),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(vec![0x25, 0x50, 0x44, 0x46]),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::new(&FetchConfig::default()).unwrap();

    let page = fetcher
        .fetch(&format!("{}/article", server.uri()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(page.title, "Wave energy");
    assert_eq!(page.text, "Pelamis converters reached 45% efficiency.");
    assert!(page.raw_content.contains("<article>"));

    let pdf = fetcher
        .fetch(&format!("{}/report.pdf", server.uri()))
        .await
        .unwrap();
    assert!(pdf.is_none());

    assert!(fetcher
        .fetch(&format!("{}/missing", server.uri()))
        .await
        .is_err());
}

#[tokio::test]
async fn test_bounded_http_fetch_drops_failed_urls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(ARTICLE),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = FetchConfig::default();
    let fetcher = BoundedFetcher::new(Arc::new(HttpPageFetcher::new(&config).unwrap()), config);

    let documents = fetcher
        .fetch_all(&[
            format!("{}/down", server.uri()),
            format!("{}/ok", server.uri()),
        ])
        .await;

    assert_eq!(documents.len(), 1);
    assert!(documents[0].url.ends_with("/ok"));
    assert_eq!(documents[0].title, "Wave energy");
}

#[tokio::test]
async fn test_http_fetcher_stops_reading_at_body_cap() {
    let server = MockServer::start().await;
    let filler = "<p>filler paragraph</p>".repeat(10_000);
    let page = format!(
        "<html><head><title>Big page</title></head><body><p>Opening words.</p>{}<p>TAIL MARKER</p></body></html>",
        filler
    );
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(page),
        )
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::new(&FetchConfig::default().with_max_body_bytes(4096)).unwrap();

    let page = fetcher
        .fetch(&format!("{}/big", server.uri()))
        .await
        .unwrap()
        .unwrap();

    assert!(page.raw_content.len() <= 4096);
    assert_eq!(page.title, "Big page");
    assert!(page.text.starts_with("Opening words."));
    assert!(!page.text.contains("TAIL MARKER"));
}
