use std::fmt;
use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::goals::{Assessment, Goal};
use crate::metrics::Metric;
use crate::telemetry::TelemetryStore;

/// What the orchestrator is currently pointed at: a telemetry source and the selected goals.
///
/// Owned by a single orchestrator and only mutated while its cycle lock is held.
#[derive(Default)]
pub struct Session {
    source: Option<Arc<dyn TelemetryStore>>,
    goals: Vec<Goal>,
    /// Completed recompute cycles since the last context change.
    pub cycles: u64,
}

impl Session {
    pub fn new(source: Arc<dyn TelemetryStore>, goals: Vec<Goal>) -> Self {
        Self {
            source: Some(source),
            goals,
            cycles: 0,
        }
    }

    pub fn source(&self) -> Option<&Arc<dyn TelemetryStore>> {
        self.source.as_ref()
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn has_goals(&self) -> bool {
        !self.goals.is_empty()
    }

    /// Source and goals, or the first missing piece.
    pub fn require_ready(&self) -> Result<Arc<dyn TelemetryStore>, ConfigurationError> {
        let source = self.source.clone().ok_or(ConfigurationError::TelemetrySource)?;
        if self.goals.is_empty() {
            return Err(ConfigurationError::Goals);
        }
        Ok(source)
    }

    /// Every metric the selected goals reference, in goal order.
    pub fn referenced_metrics(&self) -> Vec<Arc<Metric>> {
        self.goals.iter().flat_map(|g| g.metrics().cloned()).collect()
    }

    /// Appends each assessment to the goal it was scored for. `assessments` is in goal
    /// order, as the engine returns it.
    pub fn attach(&mut self, assessments: &[Assessment]) {
        for (goal, assessment) in self.goals.iter_mut().zip(assessments) {
            goal.add_assessment(assessment.clone());
        }
        self.cycles += 1;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("source", &self.source.as_ref().map(|s| s.describe()))
            .field("goals", &self.goals.iter().map(Goal::name).collect::<Vec<_>>())
            .field("cycles", &self.cycles)
            .finish()
    }
}
