use chrono::{Duration, TimeZone, Utc};
use qualimetry::error::{ConfigurationError, QualityError};
use qualimetry::goals::{GapReason, Goal};
use qualimetry::metrics::{Metric, MetricsService, StockFormula};
use qualimetry::progress::RecordingProgressTracker;
use qualimetry::service::QualityAssessmentService;
use qualimetry::telemetry::{
    DataFormat, FileTelemetryStore, InMemoryTelemetryStore, TelemetryDataSourceConfig, TelemetryRecord,
    TelemetryStore,
};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

fn failure_events() -> Vec<TelemetryRecord> {
    // Three failures spanning ten days.
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    [0, 4, 10]
        .iter()
        .map(|d| TelemetryRecord::new("failure_event", start + Duration::days(*d), "collector"))
        .collect()
}

fn mtbf() -> Arc<Metric> {
    Arc::new(
        StockFormula::MeanTimeBetween
            .build("MTBF", "mean time between failures")
            .with_acronym("MTBF")
            .requires("failure_event"),
    )
}

fn reliability() -> Goal {
    Goal::new("Reliability", "system keeps running", 0.5).with_metric(mtbf())
}

async fn configured(store: Arc<dyn TelemetryStore>, goals: Vec<Goal>) -> (QualityAssessmentService, RecordingProgressTracker) {
    let tracker = RecordingProgressTracker::new();
    let service = QualityAssessmentService::new();
    service.set_progress_tracker(Arc::new(tracker.clone()));
    service.set_context(store, goals).await;
    (service, tracker)
}

#[tokio::test]
async fn test_reliability_scenario_is_deterministic() {
    let store = Arc::new(InMemoryTelemetryStore::with_records(failure_events()));
    let (service, tracker) = configured(store, vec![reliability()]).await;

    let first = service.assess_quality_goals().await.unwrap();
    let second = service.assess_quality_goals().await.unwrap();

    let history = second[0].assessments();
    assert_eq!(first[0].assessments().len(), 1);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].goal_name(), "Reliability");
    assert!(history[0].details()["MTBF"] > 0.0);
    assert_eq!(history[0].details()["MTBF"], 120.0);
    assert_eq!(history[0].global_score(), history[1].global_score());

    let messages = tracker.messages();
    assert_eq!(messages.first().map(String::as_str), Some("Quality Assessment Service: Starting quality goal assessment..."));
    assert_eq!(messages.last().map(String::as_str), Some("Quality Assessment Service: Quality goal assessment completed."));
}

#[tokio::test]
async fn test_history_is_append_only() {
    let store = Arc::new(InMemoryTelemetryStore::with_records(failure_events()));
    let (service, _) = configured(store, vec![reliability()]).await;

    let first = service.assess_quality_goals().await.unwrap()[0].assessments()[0].clone();
    for _ in 0..4 {
        service.assess_quality_goals().await.unwrap();
    }

    let goals = service.goals().await;
    let history = goals[0].assessments();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0], first);
    assert!(history.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    let ids: std::collections::HashSet<_> = history.iter().map(|a| a.id()).collect();
    assert_eq!(ids.len(), 5);
}

#[tokio::test]
async fn test_missing_tracker_fails_without_state_change() {
    let store = Arc::new(InMemoryTelemetryStore::with_records(failure_events()));
    let service = QualityAssessmentService::new();
    service.set_context(store, vec![reliability()]).await;

    let err = service.assess_quality_goals().await.unwrap_err();
    assert!(matches!(err, QualityError::NotConfigured(ConfigurationError::ProgressTracker)));
    assert!(service.goals().await[0].assessments().is_empty());
}

#[tokio::test]
async fn test_missing_source_or_goals_is_not_configured() {
    let service = QualityAssessmentService::new();
    service.set_progress_tracker(Arc::new(RecordingProgressTracker::new()));
    let err = service.assess_quality_goals().await.unwrap_err();
    assert!(matches!(err, QualityError::NotConfigured(ConfigurationError::TelemetrySource)));

    service.set_context(Arc::new(InMemoryTelemetryStore::new()), Vec::new()).await;
    let err = service.assess_quality_goals().await.unwrap_err();
    assert!(matches!(err, QualityError::NotConfigured(ConfigurationError::Goals)));
}

#[tokio::test]
async fn test_new_metrics_without_goals_is_skipped() {
    let service = QualityAssessmentService::new();
    service.set_progress_tracker(Arc::new(RecordingProgressTracker::new()));
    let notified = Arc::new(Mutex::new(0));
    {
        let notified = Arc::clone(&notified);
        service.on_assessment_updated(move |_| *notified.lock().unwrap() += 1);
    }

    let assessments = service.handle_new_metrics(&[]).await.unwrap();
    assert!(assessments.is_empty());
    assert_eq!(*notified.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_listeners_receive_updated_goals() {
    let store = Arc::new(InMemoryTelemetryStore::with_records(failure_events()));
    let (service, _) = configured(store, vec![reliability(), Goal::new("Security", "", 0.5)]).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        service.on_assessment_updated(move |goals| {
            let counts: Vec<_> = goals.iter().map(|g| (g.name().to_string(), g.assessments().len())).collect();
            seen.lock().unwrap().push(counts);
        });
    }

    service.assess_quality_goals().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0],
        vec![("Reliability".to_string(), 1), ("Security".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_goal_with_unfed_metric_records_gap() {
    // No telemetry at all: MTBF fails, the goal is still assessed.
    let (service, _) = configured(Arc::new(InMemoryTelemetryStore::new()), vec![reliability()]).await;

    let goals = service.assess_quality_goals().await.unwrap();
    let assessment = goals[0].latest_assessment().unwrap();
    assert_eq!(assessment.global_score(), 0.0);
    assert_eq!(assessment.details()["MTBF"], 0.0);
    assert!(matches!(assessment.gaps()[0].reason, GapReason::Failed(_)));
}

#[tokio::test]
async fn test_ingest_stores_then_reassesses() {
    let dir = tempfile::tempdir().unwrap();
    let config = TelemetryDataSourceConfig::new(dir.path().join("t.json").to_string_lossy(), DataFormat::Json);
    let store: Arc<dyn TelemetryStore> = Arc::new(FileTelemetryStore::new(&config).unwrap());
    let (service, _) = configured(Arc::clone(&store), vec![reliability()]).await;
    service.set_persist_assessments(true);

    let goals = service.ingest_telemetry(failure_events()).await.unwrap();
    assert_eq!(goals[0].latest_assessment().unwrap().details()["MTBF"], 120.0);

    let snapshot = store.read().await.unwrap();
    assert_eq!(snapshot.telemetry_data.len(), 3);
    assert_eq!(snapshot.assessments.len(), 1);
    assert_eq!(snapshot.assessments[0].goal.name, "Reliability");
}

#[tokio::test]
async fn test_follow_scores_external_metric_updates() {
    let store = Arc::new(InMemoryTelemetryStore::with_records(failure_events()));
    let (service, _) = configured(store.clone(), vec![reliability()]).await;
    let service = Arc::new(service);

    let external = MetricsService::new();
    external.set_progress_tracker(Arc::new(RecordingProgressTracker::new()));

    let cancel = CancellationToken::new();
    let handle = service.follow(external.updates(), cancel.clone());

    let goals = service.goals().await;
    let metrics: Vec<_> = goals[0].metrics().cloned().collect();
    external.compute_metrics(store.as_ref(), &metrics).await.unwrap();

    // Wait until the follower has attached the assessment.
    for _ in 0..100 {
        if !service.goals().await[0].assessments().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    cancel.cancel();
    handle.await.unwrap();

    let goals = service.goals().await;
    assert_eq!(goals[0].assessments().len(), 1);
    assert_eq!(goals[0].assessments()[0].details()["MTBF"], 120.0);
}

#[tokio::test]
async fn test_concurrent_cycles_are_serialized() {
    let store = Arc::new(InMemoryTelemetryStore::with_records(failure_events()));
    let (service, _) = configured(store, vec![reliability()]).await;
    let service = Arc::new(service);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.assess_quality_goals().await.map(|_| ()) })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let goals = service.goals().await;
    let history = goals[0].assessments();
    assert_eq!(history.len(), 8);
    assert!(history.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
}

#[tokio::test]
async fn test_panicking_listener_does_not_fail_the_cycle() {
    let store = Arc::new(InMemoryTelemetryStore::with_records(failure_events()));
    let (service, _) = configured(store, vec![reliability()]).await;

    let calls = Arc::new(Mutex::new(0));
    service.on_assessment_updated(|_| panic!("listener failure"));
    {
        let calls = Arc::clone(&calls);
        service.on_assessment_updated(move |_| *calls.lock().unwrap() += 1);
    }

    let goals = service.assess_quality_goals().await.unwrap();
    assert_eq!(goals[0].assessments().len(), 1);
    assert_eq!(*calls.lock().unwrap(), 1);
}
