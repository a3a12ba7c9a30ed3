//! Crawl pipeline tests against mock sites

use crate::{
    mount_html, open_store, orchestrator, orchestrator_with, policy_html, target,
    test_crawler_config,
};
use chrono::{Datelike, TimeZone, Utc};
use policy_pulse::config::CrawlerConfig;
use policy_pulse::sites::{parse_tree, Category};
use policy_pulse::storage::{Collection, DocumentStore, SqliteStore};
use policy_pulse::PageStatus;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_second_run_saves_nothing_and_skips_stored_pages() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Stored pages are skipped before fetching, so each is fetched once overall
    mount_html(&mock_server, "/notice/1", policy_html("Notice 1", "First notice"), 1).await;
    mount_html(&mock_server, "/notice/2", policy_html("Notice 2", "Second notice"), 1).await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("pulse.db"));
    let orchestrator = orchestrator(store.clone());

    let targets = vec![
        target(
            "gov_0",
            vec![format!("{}/notice/1", base_url), format!("{}/missing", base_url)],
        ),
        target("gov_1", vec![format!("{}/notice/2", base_url)]),
    ];

    let first = orchestrator.run_batch(&targets).await;
    assert!(first.success);
    assert_eq!(first.total_sites, 2);
    assert_eq!(first.saved, 2);
    assert_eq!(first.errors, 1);

    let second = orchestrator.run_batch(&targets).await;
    assert!(second.success);
    assert_eq!(second.saved, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.errors, 1);

    assert_eq!(store.lock().unwrap().count(Collection::RawPages).unwrap(), 2);
}

#[tokio::test]
async fn test_url_shared_by_two_targets_is_fetched_once() {
    let mock_server = MockServer::start().await;
    let url = format!("{}/shared", mock_server.uri());

    mount_html(&mock_server, "/shared", policy_html("Shared", "Shared notice"), 1).await;

    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(open_store(&dir.path().join("pulse.db")));

    let targets = vec![target("gov_0", vec![url.clone()]), target("gov_1", vec![url])];
    let summary = orchestrator.run_batch(&targets).await;

    assert_eq!(summary.saved, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.outcomes[0].saved, 1);
    assert_eq!(summary.outcomes[1].skipped, 1);
}

#[tokio::test]
async fn test_missing_and_non_html_pages_are_permanent_errors() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notice.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("%PDF-1.4", "application/pdf"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("pulse.db"));
    let orchestrator = orchestrator(store.clone());

    let targets = vec![target(
        "gov_0",
        vec![format!("{}/gone", base_url), format!("{}/notice.pdf", base_url)],
    )];
    let summary = orchestrator.run_batch(&targets).await;

    assert!(summary.success);
    assert_eq!(summary.saved, 0);
    assert_eq!(summary.errors, 2);
    assert!(!summary.transient_errors);
    assert_eq!(store.lock().unwrap().count(Collection::RawPages).unwrap(), 0);
}

#[tokio::test]
async fn test_unreachable_host_is_a_transient_error() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(open_store(&dir.path().join("pulse.db")));

    // Nothing listens on port 1
    let targets = vec![target("gov_0", vec!["http://127.0.0.1:1/".to_string()])];
    let summary = orchestrator.run_batch(&targets).await;

    assert!(summary.success);
    assert_eq!(summary.errors, 1);
    assert!(summary.transient_errors);
}

#[tokio::test]
async fn test_concurrent_runs_store_exactly_one_document() {
    let mock_server = MockServer::start().await;
    let url = format!("{}/race", mock_server.uri());

    Mock::given(method("GET"))
        .and(path("/race"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(policy_html("Race", "Contested notice"), "text/html"),
        )
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("pulse.db");

    // Two workers, two connections, no shared in-memory state
    let first = orchestrator(open_store(&db_path));
    let second = orchestrator(open_store(&db_path));
    let targets = vec![target("gov_0", vec![url.clone()])];

    let (a, b) = tokio::join!(first.run_batch(&targets), second.run_batch(&targets));

    assert_eq!(a.saved + b.saved, 1);
    assert_eq!(a.skipped + b.skipped, 1);
    assert_eq!(a.errors + b.errors, 0);

    let store = SqliteStore::new(&db_path).unwrap();
    assert_eq!(store.count(Collection::RawPages).unwrap(), 1);
    assert!(store.find_one(Collection::RawPages, &url).unwrap().is_some());
}

#[tokio::test]
async fn test_tree_targets_crawl_into_raw_pages() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/province",
        policy_html("Provincial notice on subsidies", "Applications open in April."),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/city"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><body><p>Opaque page body</p></body></html>",
            "text/html",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let tree = format!(
        r#"{{
            "id": "province",
            "name": "Test Province",
            "website": "{base_url}/province",
            "children": [
                {{"name": "Test City", "website": "{base_url}/city"}},
                {{"id": "empty", "name": "No Website", "website": ""}}
            ]
        }}"#
    );
    let targets = parse_tree(&tree, 5).unwrap();
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[1].id, "gov_1");

    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("pulse.db"));
    let summary = orchestrator(store.clone()).run_batch(&targets).await;
    assert_eq!(summary.saved, 2);

    let store = store.lock().unwrap();
    let province = store
        .find_one(Collection::RawPages, &format!("{}/province", base_url))
        .unwrap()
        .unwrap();
    assert_eq!(province.title, "Provincial notice on subsidies");
    assert_eq!(province.region, "Test Province");
    assert_eq!(province.status, PageStatus::Pending);
    assert_eq!(
        (province.publish_date.year(), province.publish_date.month(), province.publish_date.day()),
        (2024, 3, 15)
    );
    assert!(province.content.contains("Applications open in April."));

    // No selector matches, so the body text and the fetch time stand in
    let city = store
        .find_one(Collection::RawPages, &format!("{}/city", base_url))
        .unwrap()
        .unwrap();
    assert_eq!(city.source, "Test City");
    assert!(city.content.contains("Opaque page body"));
    assert_eq!(city.publish_date, city.crawl_date);
    assert!(city.crawl_date > Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
}

#[tokio::test]
async fn test_target_stops_at_page_cap() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(&mock_server, "/notice/1", policy_html("Notice 1", "First"), 1).await;
    mount_html(&mock_server, "/notice/2", policy_html("Notice 2", "Second"), 1).await;
    // Beyond the cap: never fetched
    mount_html(&mock_server, "/notice/3", policy_html("Notice 3", "Third"), 0).await;
    mount_html(&mock_server, "/notice/4", policy_html("Notice 4", "Fourth"), 0).await;

    let crawler = CrawlerConfig {
        max_pages_per_target: 2,
        ..test_crawler_config()
    };
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("pulse.db"));
    let orchestrator = orchestrator_with(store.clone(), &crawler);

    let targets = vec![target(
        "gov_0",
        (1..=4).map(|i| format!("{}/notice/{}", base_url, i)).collect(),
    )];
    let summary = orchestrator.run_batch(&targets).await;

    assert_eq!(summary.saved, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.errors, 0);
    assert_eq!(store.lock().unwrap().count(Collection::RawPages).unwrap(), 2);
}

#[tokio::test]
async fn test_bid_targets_are_stored_as_raw_bids() {
    let mock_server = MockServer::start().await;
    let url = format!("{}/tender/42", mock_server.uri());

    mount_html(&mock_server, "/tender/42", policy_html("Tender 42", "Road resurfacing bid"), 1).await;

    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("pulse.db"));
    let orchestrator = orchestrator(store.clone());

    let mut bids = target("bids_0", vec![url.clone()]);
    bids.category = Category::Bid;
    let summary = orchestrator.run_batch(&[bids]).await;
    assert_eq!(summary.saved, 1);

    let store = store.lock().unwrap();
    assert_eq!(store.count(Collection::RawBids).unwrap(), 1);
    assert_eq!(store.count(Collection::RawPages).unwrap(), 0);
    let bid = store.find_one(Collection::RawBids, &url).unwrap().unwrap();
    assert_eq!(bid.title, "Tender 42");
    assert!(store.find_one(Collection::RawPages, &url).unwrap().is_none());
}
