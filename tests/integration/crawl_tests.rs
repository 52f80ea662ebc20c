//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock catalog servers and run the full
//! crawl cycle end-to-end against a SQLite database in a temporary directory.

use catalog_crawler::config::Config;
use catalog_crawler::crawler::crawl;
use catalog_crawler::extract::StructuredRecord;
use catalog_crawler::storage::{open_storage, AuditOutcome, Storage, TargetKind};
use catalog_crawler::url::canonical_id;
use catalog_crawler::{CrawlError, RunPhase};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, db_path: &Path, skip_existing: bool) -> Config {
    let toml = format!(
        r#"
        [crawler]
        start-url = "{base_url}/catalog?page={{page}}"
        max-pages = 10
        skip-existing = {skip_existing}
        concurrency-limit = 3
        min-spacing-ms = 0

        [retry]
        max-retries = 3
        base-delay-ms = 10
        max-delay-ms = 50
        jitter-ms = 0

        [fetch]
        timeout-secs = 5
        connect-timeout-secs = 2
        transport-retries = 0

        [user-agent]
        crawler-name = "TestBot"
        crawler-version = "1.0.0"
        contact-url = "https://example.com/contact"
        contact-email = "test@example.com"

        [output]
        database-path = "{db_path}"
        "#,
        base_url = base_url,
        skip_existing = skip_existing,
        db_path = db_path.display(),
    );
    toml::from_str(&toml).expect("Failed to parse test config")
}

fn listing_html(paths: &[&str]) -> String {
    let links: String = paths
        .iter()
        .map(|p| format!(r#"<li><a class="item-link" href="{}">Item</a></li>"#, p))
        .collect();
    format!("<html><body><ul>{}</ul></body></html>", links)
}

fn detail_html(title: &str) -> String {
    format!(
        r#"<html><head><title>{0}</title></head><body>
        <h1>{0}</h1>
        <span class="price">19.99</span>
        <span class="sku">SKU-{0}</span>
        </body></html>"#,
        title
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

async fn mount_listing(server: &MockServer, page: u32, paths: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .and(query_param("page", page.to_string()))
        .respond_with(html(listing_html(paths)))
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, item_path: &str, title: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(item_path))
        .respond_with(html(detail_html(title)))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_skips_items_already_stored() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");

    mount_listing(&mock_server, 1, &["/item/1", "/item/2", "/item/3"]).await;
    mount_listing(&mock_server, 2, &[]).await;
    mount_detail(&mock_server, "/item/1", "One", 1).await;
    mount_detail(&mock_server, "/item/2", "Two", 0).await;
    mount_detail(&mock_server, "/item/3", "Three", 1).await;

    // Item 2 was stored by an earlier run
    {
        let storage = open_storage(&db_path).unwrap();
        let earlier = storage.create_run("earlier").unwrap();
        let url = format!("{}/item/2", base_url);
        storage
            .save(
                &StructuredRecord {
                    canonical_id: canonical_id(&url).unwrap(),
                    url,
                    title: "Two".to_string(),
                    fields: BTreeMap::new(),
                    strategy: "catalog-v2".to_string(),
                },
                earlier,
            )
            .unwrap();
    }

    let config = create_test_config(&base_url, &db_path, true);
    let summary = crawl(config, "test-hash", CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(summary.phase, RunPhase::Done);
    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped_existing, 1);
    assert_eq!(summary.failed, 0);

    let storage = open_storage(&db_path).unwrap();
    let audits = storage.get_audit_records(summary.run_id).unwrap();

    let detail: Vec<_> = audits
        .iter()
        .filter(|a| a.kind == TargetKind::Detail)
        .collect();
    assert_eq!(detail.len(), 3);
    assert_eq!(
        detail
            .iter()
            .filter(|a| a.outcome == AuditOutcome::Skipped)
            .count(),
        1
    );
    assert!(audits.iter().all(|a| a.outcome != AuditOutcome::Failed));

    let item = storage
        .get_item(&canonical_id(&format!("{}/item/3", base_url)).unwrap())
        .unwrap()
        .expect("Item 3 should be stored");
    assert_eq!(item.title, "Three");
    assert_eq!(item.fields.get("price").map(String::as_str), Some("19.99"));
    assert_eq!(item.run_id, summary.run_id);

    mock_server.verify().await;
}

#[tokio::test]
async fn test_rate_limited_detail_is_retried() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");

    mount_listing(&mock_server, 1, &["/item/1"]).await;
    mount_listing(&mock_server, 2, &[]).await;

    // Two 429s, then the page
    Mock::given(method("GET"))
        .and(path("/item/1"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_detail(&mock_server, "/item/1", "One", 1).await;

    let config = create_test_config(&base_url, &db_path, false);
    let summary = crawl(config, "test-hash", CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);

    let storage = open_storage(&db_path).unwrap();
    let item_audits: Vec<_> = storage
        .get_audit_records(summary.run_id)
        .unwrap()
        .into_iter()
        .filter(|a| a.url.ends_with("/item/1"))
        .collect();

    assert_eq!(item_audits.len(), 1);
    assert_eq!(item_audits[0].outcome, AuditOutcome::Success);
    assert_eq!(item_audits[0].items_extracted, 1);
    assert_eq!(item_audits[0].http_status, Some(200));

    mock_server.verify().await;
}

#[tokio::test]
async fn test_robots_disallowed_item_is_never_fetched() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin/*\n"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    mount_listing(&mock_server, 1, &["/item/1", "/admin/item/2"]).await;
    mount_listing(&mock_server, 2, &[]).await;
    mount_detail(&mock_server, "/item/1", "One", 1).await;
    mount_detail(&mock_server, "/admin/item/2", "Hidden", 0).await;

    let config = create_test_config(&base_url, &db_path, false);
    let summary = crawl(config, "test-hash", CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped_policy, 1);
    assert_eq!(summary.failed, 0);

    let storage = open_storage(&db_path).unwrap();
    let audits = storage.get_audit_records(summary.run_id).unwrap();
    let admin = audits
        .iter()
        .find(|a| a.url.contains("/admin/"))
        .expect("Policy skip should be audited");
    assert_eq!(admin.outcome, AuditOutcome::Skipped);
    assert_eq!(admin.http_status, None);

    mock_server.verify().await;
}

#[tokio::test]
async fn test_first_listing_page_failure_fails_run() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");

    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&base_url, &db_path, false);
    let err = crawl(config, "test-hash", CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::DiscoveryFailed { page: 1, .. }));

    let storage = open_storage(&db_path).unwrap();
    let run = storage.get_latest_run().unwrap().expect("Run should be recorded");
    assert_eq!(run.status, RunPhase::Failed);
    assert!(run.finished_at.is_some());
    // robots.txt (404, not retried), then one attempt plus three retries
    assert_eq!(run.counts.total_fetches, 5);
}

#[tokio::test]
async fn test_pagination_stops_at_empty_page() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");

    mount_listing(&mock_server, 1, &["/item/1", "/item/2"]).await;
    mount_listing(&mock_server, 2, &["/item/2", "/item/3"]).await;
    mount_listing(&mock_server, 3, &[]).await;
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .and(query_param("page", "4"))
        .respond_with(html(listing_html(&["/item/4"])))
        .expect(0)
        .mount(&mock_server)
        .await;

    for (i, title) in ["One", "Two", "Three"].iter().enumerate() {
        mount_detail(&mock_server, &format!("/item/{}", i + 1), title, 1).await;
    }

    let config = create_test_config(&base_url, &db_path, false);
    let summary = crawl(config, "test-hash", CancellationToken::new())
        .await
        .expect("Crawl failed");

    assert_eq!(summary.listing_pages, 3);
    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.processed, 3);

    let storage = open_storage(&db_path).unwrap();
    assert_eq!(storage.count_items().unwrap(), 3);

    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.status, RunPhase::Done);
    assert_eq!(run.counts.processed, 3);

    mock_server.verify().await;
}

#[tokio::test]
async fn test_second_run_with_skip_existing_fetches_nothing_new() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");

    mount_listing(&mock_server, 1, &["/item/1", "/item/2"]).await;
    mount_listing(&mock_server, 2, &[]).await;
    mount_detail(&mock_server, "/item/1", "One", 1).await;
    mount_detail(&mock_server, "/item/2", "Two", 1).await;

    let first = crawl(
        create_test_config(&base_url, &db_path, true),
        "test-hash",
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(first.processed, 2);

    let second = crawl(
        create_test_config(&base_url, &db_path, true),
        "test-hash",
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped_existing, 2);
    assert_ne!(first.run_id, second.run_id);

    let storage = open_storage(&db_path).unwrap();
    assert_eq!(storage.count_runs().unwrap(), 2);
    assert_eq!(storage.count_items().unwrap(), 2);

    mock_server.verify().await;
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");

    Mock::given(method("GET"))
        .respond_with(html(listing_html(&["/item/1"])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = crawl(create_test_config(&base_url, &db_path, false), "test-hash", cancel)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.phase, RunPhase::Done);
    assert_eq!(summary.total_fetches, 0);

    mock_server.verify().await;
}
