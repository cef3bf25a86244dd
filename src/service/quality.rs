use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::session::Session;
use crate::assessment::AssessmentEngine;
use crate::error::{ConfigurationError, Result};
use crate::events::EventChannel;
use crate::goals::{Assessment, Goal};
use crate::metrics::{MetricResult, MetricsService};
use crate::progress::ProgressTracker;
use crate::telemetry::{TelemetryRecord, TelemetryStore};

/// Drives the recompute cycle: telemetry -> metrics -> assessments -> goal history.
///
/// The session sits behind an async mutex held for a whole cycle, so overlapping
/// triggers queue up and assessment history stays in timestamp order.
pub struct QualityAssessmentService {
    engine: AssessmentEngine,
    metrics: MetricsService,
    session: Mutex<Session>,
    progress: RwLock<Option<Arc<dyn ProgressTracker>>>,
    updates: EventChannel<Vec<Goal>>,
    persist_assessments: AtomicBool,
}

impl Default for QualityAssessmentService {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityAssessmentService {
    pub fn new() -> Self {
        Self {
            engine: AssessmentEngine::new(),
            metrics: MetricsService::new(),
            session: Mutex::new(Session::default()),
            progress: RwLock::new(None),
            updates: EventChannel::new("assessment-updated"),
            persist_assessments: AtomicBool::new(false),
        }
    }

    pub fn set_progress_tracker(&self, tracker: Arc<dyn ProgressTracker>) {
        self.metrics.set_progress_tracker(Arc::clone(&tracker));
        *self.progress.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(tracker);
    }

    /// Points the service at a new source and goal selection. Waits for any running cycle.
    pub async fn set_context(&self, source: Arc<dyn TelemetryStore>, goals: Vec<Goal>) {
        let mut session = self.session.lock().await;
        info!(store = %source.describe(), goals = goals.len(), "quality assessment context set");
        *session = Session::new(source, goals);
    }

    /// When on, each cycle's assessments are also written through `store_assessments`.
    pub fn set_persist_assessments(&self, enabled: bool) {
        self.persist_assessments.store(enabled, Ordering::Relaxed);
    }

    pub fn metrics_service(&self) -> &MetricsService {
        &self.metrics
    }

    /// Listeners receive the updated goals after every cycle. Append-only.
    pub fn on_assessment_updated<F>(&self, listener: F)
    where
        F: Fn(&Vec<Goal>) + Send + Sync + 'static,
    {
        self.updates.subscribe(listener);
    }

    pub fn assessment_updates(&self) -> &EventChannel<Vec<Goal>> {
        &self.updates
    }

    /// Snapshot of the selected goals and their history.
    pub async fn goals(&self) -> Vec<Goal> {
        self.session.lock().await.goals().to_vec()
    }

    fn progress_tracker(&self) -> Result<Arc<dyn ProgressTracker>> {
        self.progress
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| ConfigurationError::ProgressTracker.into())
    }

    /// Computes the metrics the selected goals reference, scores every goal and appends
    /// the assessments to their history. Fails before touching any state when the
    /// tracker, source or goals are missing.
    #[instrument(skip(self))]
    pub async fn assess_quality_goals(&self) -> Result<Vec<Goal>> {
        let progress = self.progress_tracker()?;
        let mut session = self.session.lock().await;
        self.run_cycle(&mut session, progress.as_ref()).await
    }

    /// Appends `records` to the current source, then reassesses.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn ingest_telemetry(&self, records: Vec<TelemetryRecord>) -> Result<Vec<Goal>> {
        let progress = self.progress_tracker()?;
        let mut session = self.session.lock().await;
        let source = session.require_ready()?;

        progress.notify_progress(&format!(
            "Quality Assessment Service: storing {} new telemetry record(s)...",
            records.len()
        ));
        source.store_all(records).await?;

        self.run_cycle(&mut session, progress.as_ref()).await
    }

    async fn run_cycle(&self, session: &mut Session, progress: &dyn ProgressTracker) -> Result<Vec<Goal>> {
        let source = session.require_ready()?;

        progress.notify_progress("Quality Assessment Service: Starting quality goal assessment...");

        let selected = session.referenced_metrics();
        let computed = self.metrics.compute_metrics(source.as_ref(), &selected).await?;

        let assessments = self.engine.assess_goals(session.goals(), &computed);
        session.attach(&assessments);
        info!(cycle = session.cycles, assessments = assessments.len(), "assessment cycle attached");
        self.persist(source.as_ref(), &assessments).await;

        self.notify_assessment_updated(session.goals());
        progress.notify_progress("Quality Assessment Service: Quality goal assessment completed.");
        Ok(session.goals().to_vec())
    }

    /// Reactive path: scores the selected goals against metrics computed elsewhere.
    ///
    /// With no goals selected this is a no-op that only warns.
    #[instrument(skip_all, fields(metrics = metrics.len()))]
    pub async fn handle_new_metrics(&self, metrics: &[MetricResult]) -> Result<Vec<Assessment>> {
        let progress = self.progress_tracker()?;
        let mut session = self.session.lock().await;

        if !session.has_goals() {
            warn!("no goals set for assessment, skipping new metrics");
            return Ok(Vec::new());
        }

        progress.notify_progress("Quality Assessment Service: Computing new assessments...");
        let assessments = self.engine.assess_goals(session.goals(), metrics);
        session.attach(&assessments);
        if let Some(source) = session.source().cloned() {
            self.persist(source.as_ref(), &assessments).await;
        }

        self.notify_assessment_updated(session.goals());
        Ok(assessments)
    }

    /// Feeds every metrics-updated event published on `channel` into `handle_new_metrics`
    /// until `cancel` fires or the channel goes away.
    ///
    /// Do not point this at the service's own metrics channel: explicit cycles would then
    /// be scored twice.
    pub fn follow(
        self: &Arc<Self>,
        channel: &EventChannel<Vec<MetricResult>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = channel.subscribe_stream();
        let service = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(metrics) => {
                            if let Err(e) = service.handle_new_metrics(&metrics).await {
                                error!(error = %e, "failed to assess new metrics");
                            }
                        }
                        None => break,
                    },
                }
            }
            info!("stopped following metrics updates");
        })
    }

    async fn persist(&self, source: &dyn TelemetryStore, assessments: &[Assessment]) {
        if !self.persist_assessments.load(Ordering::Relaxed) || assessments.is_empty() {
            return;
        }
        if let Err(e) = source.store_assessments(assessments, None).await {
            error!(store = %source.describe(), error = %e, "failed to persist assessments");
        }
    }

    fn notify_assessment_updated(&self, goals: &[Goal]) {
        info!(
            goals = goals.len(),
            listeners = self.updates.listener_count(),
            "new assessments available, notifying listeners"
        );
        self.updates.publish(goals.to_vec());
    }
}
