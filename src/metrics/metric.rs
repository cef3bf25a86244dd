use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use super::value::MetricValue;
use crate::error::MetricError;
use crate::telemetry::{TelemetryRecord, TelemetryType};

/// The math behind a metric. Must be deterministic for a given batch and only read
/// record kinds the owning metric declares.
pub trait MetricFormula: Send + Sync {
    fn compute(&self, data: &[TelemetryRecord]) -> Result<MetricValue, MetricError>;
}

impl<F> MetricFormula for F
where
    F: Fn(&[TelemetryRecord]) -> Result<MetricValue, MetricError> + Send + Sync,
{
    fn compute(&self, data: &[TelemetryRecord]) -> Result<MetricValue, MetricError> {
        self(data)
    }
}

/// A named computation over telemetry.
///
/// Stateless between computations apart from the last value, which is kept for
/// display only.
pub struct Metric {
    name: String,
    acronym: String,
    description: String,
    unit: Option<String>,
    required_telemetry: BTreeSet<TelemetryType>,
    formula: Arc<dyn MetricFormula>,
    last_value: Mutex<Option<MetricValue>>,
}

impl Metric {
    pub fn new(name: impl Into<String>, description: impl Into<String>, formula: impl MetricFormula + 'static) -> Self {
        Self {
            name: name.into(),
            acronym: String::new(),
            description: description.into(),
            unit: None,
            required_telemetry: BTreeSet::new(),
            formula: Arc::new(formula),
            last_value: Mutex::new(None),
        }
    }

    pub fn with_acronym(mut self, acronym: impl Into<String>) -> Self {
        self.acronym = acronym.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn requires(mut self, kind: impl Into<TelemetryType>) -> Self {
        self.required_telemetry.insert(kind.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn acronym(&self) -> &str {
        &self.acronym
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn required_telemetry(&self) -> &BTreeSet<TelemetryType> {
        &self.required_telemetry
    }

    pub fn has_required_telemetry(&self, kind: &TelemetryType) -> bool {
        self.required_telemetry.contains(kind)
    }

    /// Set union; kinds already declared are ignored.
    pub fn set_required_telemetry<I>(&mut self, kinds: I)
    where
        I: IntoIterator<Item = TelemetryType>,
    {
        self.required_telemetry.extend(kinds);
    }

    /// Whether `record` is one of the kinds this metric reads.
    pub fn reads(&self, record: &TelemetryRecord) -> bool {
        record.kind().map_or(false, |kind| self.required_telemetry.contains(&kind))
    }

    /// Runs the formula over `data` and caches the result.
    ///
    /// A panicking formula is reported as a computation error. Non-finite numbers
    /// are rejected as invalid.
    pub fn compute_value(&self, data: &[TelemetryRecord]) -> Result<MetricValue, MetricError> {
        let formula = Arc::clone(&self.formula);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| formula.compute(data)))
            .unwrap_or_else(|_| Err(MetricError::Computation("formula panicked".to_string())));

        let checked = outcome.and_then(|value| match value {
            MetricValue::Number(x) if !x.is_finite() => Err(MetricError::InvalidValue(format!("{} is not finite", x))),
            value => Ok(value),
        });

        let mut last = self.last_value.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = checked.as_ref().ok().cloned();
        checked
    }

    /// Last successfully computed value, if the latest computation succeeded.
    pub fn value(&self) -> Option<MetricValue> {
        self.last_value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("name", &self.name)
            .field("acronym", &self.acronym)
            .field("required_telemetry", &self.required_telemetry)
            .field("value", &self.value())
            .finish()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<&str> = self.required_telemetry.iter().map(TelemetryType::as_str).collect();
        write!(
            f,
            "name: {}, acronym: {}, description: {}, value: ",
            self.name, self.acronym, self.description
        )?;
        match self.value() {
            Some(value) => write!(f, "{}", value)?,
            None => f.write_str("-")?,
        }
        write!(f, ", required telemetry: [{}]", kinds.join(", "))
    }
}
