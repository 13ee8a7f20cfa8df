//! End-to-end collection tests against mock engines

use serpscope::collector::CollectionScheduler;
use serpscope::config::{CollectorConfig, Config, EngineConfig};
use serpscope::state::{RunStatus, Stage};
use serpscope::storage::{shared, MemoryStorage, Storage, StorageHandle};
use serpscope::tracker::PipelineRunTracker;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with the given engines
fn create_test_config(engines: BTreeMap<String, EngineConfig>, queries: Vec<&str>) -> Arc<Config> {
    Arc::new(Config {
        collector: CollectorConfig {
            respect_robots: true,
            robots_cache_ttl_ms: 60_000,
            user_agent: "SerpscopeTest/1.0".to_string(),
            proxy_url: None,
            max_results_per_query: 10,
            request_timeout_ms: 5_000,
            run_deadline_ms: None,
        },
        queries: queries.into_iter().map(String::from).collect(),
        engines,
    })
}

fn engine(endpoint: String, concurrency: u32, delay_ms: u64) -> EngineConfig {
    EngineConfig {
        enabled: true,
        concurrency,
        delay_ms,
        endpoint,
    }
}

struct Harness {
    scheduler: CollectionScheduler,
    tracker: Arc<PipelineRunTracker>,
    storage: StorageHandle,
    config: Arc<Config>,
}

fn harness(config: Arc<Config>) -> Harness {
    let storage = shared(MemoryStorage::new());
    let tracker = Arc::new(PipelineRunTracker::new(storage.clone()));
    let scheduler = CollectionScheduler::new(config.clone(), storage.clone(), tracker.clone())
        .expect("failed to build scheduler");
    Harness {
        scheduler,
        tracker,
        storage,
        config,
    }
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_serp(server: &MockServer, serp_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(serp_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "application/json"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_collection_across_engines() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_serp(&server, "/serp/alpha", r#"[{"rank": 1}, {"rank": 2}]"#).await;
    mount_serp(&server, "/serp/beta", r#"[{"rank": 1}]"#).await;

    let mut engines = BTreeMap::new();
    engines.insert(
        "alpha".to_string(),
        engine(format!("{}/serp/alpha?q={{query}}", server.uri()), 2, 0),
    );
    engines.insert(
        "beta".to_string(),
        engine(format!("{}/serp/beta?q={{query}}", server.uri()), 2, 0),
    );
    let h = harness(create_test_config(engines, vec!["first query", "second query"]));

    let run = h.tracker.create_run(Default::default()).unwrap();
    let summary = h.scheduler.run(run.id, &h.config.queries).await.unwrap();

    // 2 queries x 2 engines, all persisted
    assert_eq!(summary.persisted, 4);
    assert_eq!(summary.denied, 0);
    assert_eq!(summary.failed, 0);
    assert!(summary.exhausted_engines.is_empty());

    let records = h
        .storage
        .lock()
        .unwrap()
        .fetch_collection_results(run.id)
        .unwrap();
    assert_eq!(records.len(), 4);
    let alpha_record = records.iter().find(|r| r.engine == "alpha").unwrap();
    assert_eq!(alpha_record.results.len(), 2);
    assert_eq!(alpha_record.status_code, 200);

    let stage = h.tracker.get_stage(run.id, Stage::Collector).unwrap();
    assert_eq!(stage.status, RunStatus::Completed);
    assert_eq!(stage.attempts, 1);
    assert!(stage.completed_at.is_some());

    // The run itself stays open for downstream stages
    assert_eq!(h.tracker.get_run(run.id).unwrap().status, RunStatus::Running);
}

#[tokio::test]
async fn test_robots_disallow_skips_pair_without_failing_run() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private").await;
    mount_serp(&server, "/serp", r#"[{"rank": 1}]"#).await;

    // The disallowed endpoint must never be fetched
    Mock::given(method("GET"))
        .and(path("/private/serp"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(0)
        .mount(&server)
        .await;

    let mut engines = BTreeMap::new();
    engines.insert(
        "blocked".to_string(),
        engine(format!("{}/private/serp?q={{query}}", server.uri()), 1, 0),
    );
    engines.insert(
        "open".to_string(),
        engine(format!("{}/serp?q={{query}}", server.uri()), 1, 0),
    );
    let h = harness(create_test_config(engines, vec!["a query"]));

    let run = h.tracker.create_run(Default::default()).unwrap();
    let summary = h.scheduler.run(run.id, &h.config.queries).await.unwrap();

    assert_eq!(summary.denied, 1);
    assert_eq!(summary.persisted, 1);
    assert_eq!(summary.failed, 0);

    let denied = summary
        .outcomes
        .iter()
        .find(|o| o.engine == "blocked")
        .unwrap();
    match &denied.status {
        serpscope::collector::PairStatus::Denied { reason } => {
            assert!(reason.contains("disallows"));
        }
        other => panic!("expected denial, got {:?}", other),
    }

    // Denials never fail the stage
    let stage = h.tracker.get_stage(run.id, Stage::Collector).unwrap();
    assert_eq!(stage.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_missing_robots_permits_collection() {
    let server = MockServer::start().await;
    // No robots.txt mounted: wiremock answers 404
    mount_serp(&server, "/serp", r#"[{"rank": 1}]"#).await;

    let mut engines = BTreeMap::new();
    engines.insert(
        "alpha".to_string(),
        engine(format!("{}/serp?q={{query}}", server.uri()), 1, 0),
    );
    let h = harness(create_test_config(engines, vec!["a query"]));

    let run = h.tracker.create_run(Default::default()).unwrap();
    let summary = h.scheduler.run(run.id, &h.config.queries).await.unwrap();

    assert_eq!(summary.persisted, 1);
    assert_eq!(summary.denied, 0);
}

#[tokio::test]
async fn test_engine_failure_leaves_other_engine_intact() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_serp(&server, "/serp/good", r#"[{"rank": 1}]"#).await;
    Mock::given(method("GET"))
        .and(path("/serp/bad"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut engines = BTreeMap::new();
    engines.insert(
        "good".to_string(),
        engine(format!("{}/serp/good?q={{query}}", server.uri()), 1, 0),
    );
    engines.insert(
        "bad".to_string(),
        engine(format!("{}/serp/bad?q={{query}}", server.uri()), 1, 0),
    );
    let h = harness(create_test_config(engines, vec!["q1", "q2"]));

    let run = h.tracker.create_run(Default::default()).unwrap();
    let summary = h.scheduler.run(run.id, &h.config.queries).await.unwrap();

    assert_eq!(summary.persisted, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.exhausted_engines, vec!["bad".to_string()]);

    // The healthy engine's records survived the other engine's failures
    let records = h
        .storage
        .lock()
        .unwrap()
        .fetch_collection_results(run.id)
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.engine == "good"));

    // Reduced coverage still counts as a completed stage
    let stage = h.tracker.get_stage(run.id, Stage::Collector).unwrap();
    assert_eq!(stage.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_total_failure_fails_stage_and_retry_increments_attempts() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/serp"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut engines = BTreeMap::new();
    engines.insert(
        "flaky".to_string(),
        engine(format!("{}/serp?q={{query}}", server.uri()), 1, 0),
    );
    let h = harness(create_test_config(engines, vec!["q1", "q2"]));

    let run = h.tracker.create_run(Default::default()).unwrap();

    let first = h.scheduler.run(run.id, &h.config.queries).await.unwrap();
    assert_eq!(first.persisted, 0);
    assert_eq!(first.failed, 2);

    let stage = h.tracker.get_stage(run.id, Stage::Collector).unwrap();
    assert_eq!(stage.status, RunStatus::Failed);
    assert_eq!(stage.attempts, 1);
    let error = stage.error.unwrap();
    assert!(error.contains("HTTP 503"), "unexpected digest: {}", error);

    // External retry: re-invoking run() is the retry loop
    let second = h.scheduler.run(run.id, &h.config.queries).await.unwrap();
    assert_eq!(second.persisted, 0);

    let stage = h.tracker.get_stage(run.id, Stage::Collector).unwrap();
    assert_eq!(stage.status, RunStatus::Failed);
    assert_eq!(stage.attempts, 2);

    // The storage mirror saw the same attempts
    let stored = h
        .storage
        .lock()
        .unwrap()
        .fetch_pipeline_stages(run.id)
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].attempts, 2);
}

#[tokio::test]
async fn test_results_capped_at_configured_maximum() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    let entries: Vec<serde_json::Value> =
        (0..20).map(|i| serde_json::json!({ "rank": i })).collect();
    mount_serp(&server, "/serp", &serde_json::to_string(&entries).unwrap()).await;

    let mut engines = BTreeMap::new();
    engines.insert(
        "alpha".to_string(),
        engine(format!("{}/serp?q={{query}}", server.uri()), 1, 0),
    );
    let mut config = create_test_config(engines, vec!["a query"]);
    Arc::get_mut(&mut config).unwrap().collector.max_results_per_query = 5;
    let h = harness(config);

    let run = h.tracker.create_run(Default::default()).unwrap();
    h.scheduler.run(run.id, &h.config.queries).await.unwrap();

    let records = h
        .storage
        .lock()
        .unwrap()
        .fetch_collection_results(run.id)
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].results.len(), 5);
}

#[tokio::test]
async fn test_cancellation_drains_in_flight_and_fails_run() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/serp"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"[{"rank": 1}]"#)
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let mut engines = BTreeMap::new();
    // concurrency 1: one pair in flight, the rest queued behind the throttle
    engines.insert(
        "slow".to_string(),
        engine(format!("{}/serp?q={{query}}", server.uri()), 1, 0),
    );
    let h = harness(create_test_config(engines, vec!["q1", "q2", "q3"]));

    let run = h.tracker.create_run(Default::default()).unwrap();
    let cancel = h.scheduler.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let summary = h.scheduler.run(run.id, &h.config.queries).await.unwrap();

    // The in-flight pair drained to completion; queued pairs were cancelled
    assert!(summary.was_cancelled());
    assert_eq!(summary.persisted, 1);
    assert_eq!(summary.cancelled, 2);

    let stage = h.tracker.get_stage(run.id, Stage::Collector).unwrap();
    assert_eq!(stage.status, RunStatus::Failed);

    let run_state = h.tracker.get_run(run.id).unwrap();
    assert_eq!(run_state.status, RunStatus::Failed);
    assert!(run_state.error.unwrap().contains("cancelled"));
    assert!(run_state.completed_at.is_some());
}

#[tokio::test]
async fn test_run_deadline_stops_admissions() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/serp"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"[{"rank": 1}]"#)
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let mut engines = BTreeMap::new();
    engines.insert(
        "slow".to_string(),
        engine(format!("{}/serp?q={{query}}", server.uri()), 1, 0),
    );
    let mut config = create_test_config(engines, vec!["q1", "q2", "q3"]);
    Arc::get_mut(&mut config).unwrap().collector.run_deadline_ms = Some(100);
    let h = harness(config);

    let run = h.tracker.create_run(Default::default()).unwrap();
    let summary = h.scheduler.run(run.id, &h.config.queries).await.unwrap();

    assert!(summary.was_cancelled());
    assert!(summary.persisted < 3);
    assert_eq!(h.tracker.get_run(run.id).unwrap().status, RunStatus::Failed);
}

#[tokio::test]
async fn test_external_stage_collaborators_share_tracker() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_serp(&server, "/serp", r#"[{"rank": 1}]"#).await;

    let mut engines = BTreeMap::new();
    engines.insert(
        "alpha".to_string(),
        engine(format!("{}/serp?q={{query}}", server.uri()), 1, 0),
    );
    let h = harness(create_test_config(engines, vec!["a query"]));

    let run = h.tracker.create_run(Default::default()).unwrap();
    h.scheduler.run(run.id, &h.config.queries).await.unwrap();

    // Downstream collaborators drive their own stages through the tracker
    h.tracker.begin_stage(run.id, Stage::Annotation).unwrap();
    h.tracker
        .complete_stage(run.id, Stage::Annotation, RunStatus::Completed, None)
        .unwrap();
    h.tracker.begin_stage(run.id, Stage::Metrics).unwrap();
    h.tracker
        .complete_stage(run.id, Stage::Metrics, RunStatus::Completed, None)
        .unwrap();
    h.tracker
        .transition_run(run.id, RunStatus::Completed, None)
        .unwrap();

    let stages = h
        .storage
        .lock()
        .unwrap()
        .fetch_pipeline_stages(run.id)
        .unwrap();
    assert_eq!(stages.len(), 3);
    assert!(stages.iter().all(|s| s.status == RunStatus::Completed));
    assert_eq!(
        stages.iter().map(|s| s.stage).collect::<Vec<_>>(),
        vec![Stage::Collector, Stage::Annotation, Stage::Metrics]
    );

    let run_state = h.tracker.get_run(run.id).unwrap();
    assert_eq!(run_state.status, RunStatus::Completed);
    assert!(run_state.completed_at.is_some());
}
