//! End-to-end tests for resource resolution
//!
//! Drives the orchestrator against a mock HTTP upstream with the on-disk
//! store, using a manual clock to step through the freshness window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use paddock::cache::{FileStore, ResourceStore};
use paddock::clock::{Clock, ManualClock};
use paddock::data::HttpFetcher;
use paddock::{CacheConfig, CacheKey, Orchestrator, ResourceType, Source};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Setup {
    orchestrator: Orchestrator,
    store: Arc<FileStore>,
    clock: ManualClock,
    _temp_dir: TempDir,
}

fn setup(server: &MockServer) -> Setup {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = Arc::new(FileStore::with_dir(temp_dir.path().to_path_buf()));
    let clock = ManualClock::new(Utc::now());
    let config = CacheConfig {
        base_url: server.uri(),
        freshness_hours: 24.0,
        fetch_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let upstream = HttpFetcher::new(config.fetch_timeout).expect("HTTP client");
    let orchestrator = Orchestrator::with_clock(
        &config,
        store.clone(),
        Arc::new(upstream),
        Arc::new(clock.clone()),
    );
    Setup {
        orchestrator,
        store,
        clock,
        _temp_dir: temp_dir,
    }
}

fn schedule_body() -> serde_json::Value {
    json!({
        "MRData": {
            "RaceTable": {
                "season": "2025",
                "Races": [{ "round": "1", "raceName": "Australian Grand Prix" }]
            }
        }
    })
}

#[tokio::test]
async fn test_fetch_then_fresh_then_stale_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2025.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(schedule_body()))
        .expect(1)
        .mount(&server)
        .await;

    let s = setup(&server);
    let key = CacheKey::season(ResourceType::Schedule, 2025);

    // Cold: one network call, record created.
    let first = s.orchestrator.resolve(&key, false).await.expect("first resolve");
    assert_eq!(first.source, Source::Network);
    assert_eq!(*first.payload, schedule_body());
    let stored = s.store.get(&key).await.unwrap().expect("record should be stored");
    assert_eq!(stored.fetched_at, s.clock.now());

    // Within the window: no network call.
    s.clock.advance(chrono::Duration::hours(2));
    let second = s.orchestrator.resolve(&key, false).await.expect("second resolve");
    assert_eq!(second.source, Source::Store);
    assert_eq!(*second.payload, schedule_body());
    server.verify().await;

    // Window elapsed and upstream is down: old payload, no store write.
    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    s.clock.advance(chrono::Duration::hours(23));

    let third = s.orchestrator.resolve(&key, false).await.expect("stale fallback");
    assert_eq!(third.source, Source::Stale);
    assert_eq!(*third.payload, schedule_body());

    let after = s.store.get(&key).await.unwrap().unwrap();
    assert_eq!(after.fetched_at, stored.fetched_at, "Failed fetch must not write the store");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_issue_one_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2025/driverStandings.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "MRData": { "StandingsTable": {} } }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let s = setup(&server);
    let key = CacheKey::season(ResourceType::DriverStandings, 2025);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let orchestrator = s.orchestrator.clone();
            let key = key.clone();
            tokio::spawn(async move { orchestrator.resolve(&key, false).await })
        })
        .collect();

    let results = join_all(handles).await;
    for result in results {
        let resolved = result.expect("task panicked").expect("resolve failed");
        assert_eq!(resolved.payload["MRData"]["StandingsTable"], json!({}));
    }
    server.verify().await;
}

#[tokio::test]
async fn test_force_refresh_hits_upstream_with_fresh_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2025/3/results.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(2)
        .mount(&server)
        .await;

    let s = setup(&server);
    let key = CacheKey::round(ResourceType::Results, 2025, 3);

    s.orchestrator.resolve(&key, false).await.unwrap();
    assert!(s.orchestrator.is_fresh(&key).await);
    let forced = s.orchestrator.resolve(&key, true).await.unwrap();

    assert_eq!(forced.source, Source::Network);
    server.verify().await;
}

#[tokio::test]
async fn test_purge_season_survives_restart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "MRData": {} })))
        .mount(&server)
        .await;

    let s = setup(&server);
    let old = CacheKey::season(ResourceType::Schedule, 2024);
    let current = CacheKey::season(ResourceType::Schedule, 2025);
    s.orchestrator.resolve(&old, false).await.unwrap();
    s.orchestrator.resolve(&current, false).await.unwrap();

    assert_eq!(s.orchestrator.purge_season(2024).await.unwrap(), 1);

    // A second orchestrator over the same directory sees the same records.
    let config = CacheConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    let restarted = Orchestrator::with_clock(
        &config,
        s.store.clone(),
        Arc::new(HttpFetcher::new(Duration::from_secs(2)).unwrap()),
        Arc::new(s.clock.clone()),
    );
    assert!(!restarted.is_fresh(&old).await);
    assert!(restarted.is_fresh(&current).await);

    let reloaded = restarted.resolve(&current, false).await.unwrap();
    assert_eq!(reloaded.source, Source::Store);
}

#[tokio::test]
async fn test_cold_key_unavailable_upstream_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let s = setup(&server);
    let key = CacheKey::round(ResourceType::Qualifying, 2025, 9);

    let err = s.orchestrator.resolve(&key, false).await.unwrap_err();

    assert!(err.to_string().contains("502"), "Unexpected error: {}", err);
    assert!(s.store.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_malformed_json_falls_back_like_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("upstream maintenance"))
        .mount(&server)
        .await;

    let s = setup(&server);
    let key = CacheKey::season(ResourceType::Constructors, 2025);
    s.store
        .upsert(&paddock::CacheRecord {
            key: key.clone(),
            payload: json!({ "cached": true }),
            fetched_at: s.clock.now() - chrono::Duration::days(3),
        })
        .await
        .unwrap();

    let resolved = s.orchestrator.resolve(&key, false).await.unwrap();

    assert!(resolved.is_stale());
    assert_eq!(resolved.payload["cached"], true);
}
