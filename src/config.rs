//! TOML configuration: where telemetry lives, which metrics exist, which goals to score.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::goals::Goal;
use crate::metrics::{Metric, StockFormula};
use crate::telemetry::{TelemetryDataSourceConfig, TelemetryType};

pub const CONFIG_ENV: &str = "QUALIMETRY_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "qualimetry.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: TelemetryDataSourceConfig,
    #[serde(default)]
    pub persist_assessments: bool,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
    #[serde(default)]
    pub goals: Vec<GoalConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    #[serde(default)]
    pub acronym: String,
    #[serde(default)]
    pub description: String,
    pub formula: StockFormula,
    pub telemetry: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoalConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub weight: f64,
    pub metrics: Vec<GoalMetricConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoalMetricConfig {
    pub metric: String,
    #[serde(default = "default_metric_weight")]
    pub weight: f64,
}

fn default_metric_weight() -> f64 {
    1.0
}

impl AppConfig {
    /// `--config` flag, else `QUALIMETRY_CONFIG`, else `qualimetry.toml` in the working directory.
    pub fn resolve_path(flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("in config {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.source.uri().trim().is_empty() {
            bail!("source.storageEndpoint.uri is empty");
        }

        let mut known = HashSet::new();
        for metric in &self.metrics {
            if metric.name.trim().is_empty() {
                bail!("metric with empty name");
            }
            if metric.telemetry.is_empty() {
                bail!("metric {} declares no telemetry", metric.name);
            }
            if !known.insert(metric.name.as_str()) {
                bail!("metric {} defined twice", metric.name);
            }
        }

        for goal in &self.goals {
            if goal.name.trim().is_empty() {
                bail!("goal with empty name");
            }
            if !(0.0..=1.0).contains(&goal.weight) {
                bail!("goal {} weight {} is outside [0, 1]", goal.name, goal.weight);
            }
            for gm in &goal.metrics {
                if !known.contains(gm.metric.as_str()) {
                    bail!("goal {} references unknown metric {}", goal.name, gm.metric);
                }
                if !(gm.weight.is_finite() && gm.weight >= 0.0) {
                    bail!("goal {} gives metric {} a negative weight", goal.name, gm.metric);
                }
            }
        }
        Ok(())
    }

    /// Builds the goals, sharing one metric instance between goals that reference it.
    pub fn build_goals(&self) -> Vec<Goal> {
        let metrics: HashMap<&str, Arc<Metric>> = self
            .metrics
            .iter()
            .map(|mc| {
                let mut metric = mc
                    .formula
                    .build(mc.name.clone(), mc.description.clone())
                    .with_acronym(mc.acronym.clone());
                metric.set_required_telemetry(mc.telemetry.iter().map(|t| TelemetryType::new(t.as_str())));
                (mc.name.as_str(), Arc::new(metric))
            })
            .collect();

        self.goals
            .iter()
            .map(|gc| {
                gc.metrics.iter().fold(
                    Goal::new(gc.name.clone(), gc.description.clone(), gc.weight),
                    |goal, gm| match metrics.get(gm.metric.as_str()) {
                        Some(metric) => goal.with_weighted_metric(Arc::clone(metric), gm.weight),
                        None => goal,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::DataFormat;

    const SAMPLE: &str = r#"
persist_assessments = true

[source]
storageEndpoint = { uri = "data/telemetry.json" }
dataFormat = "JSON"

[[metrics]]
name = "MTBF"
acronym = "MTBF"
description = "mean time between failures"
formula = "mean_time_between"
telemetry = ["failure_event"]

[[metrics]]
name = "Failures"
formula = "event_count"
telemetry = ["failure_event"]

[[goals]]
name = "Reliability"
weight = 0.5
metrics = [{ metric = "MTBF" }, { metric = "Failures", weight = 0.5 }]

[[goals]]
name = "Stability"
weight = 0.5
metrics = [{ metric = "Failures" }]
"#;

    #[test]
    fn parses_and_builds_goals() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert!(config.persist_assessments);
        assert_eq!(config.source.data_format, DataFormat::Json);

        let goals = config.build_goals();
        assert_eq!(goals.len(), 2);
        assert_eq!(goals[0].goal_metrics().len(), 2);
        assert_eq!(goals[0].goal_metrics()[0].weight, 1.0);
        assert_eq!(goals[0].goal_metrics()[1].weight, 0.5);

        // Same metric instance in both goals.
        let a = &goals[0].goal_metrics()[1].metric;
        let b = &goals[1].goal_metrics()[0].metric;
        assert!(Arc::ptr_eq(a, b));
        assert!(a.has_required_telemetry(&TelemetryType::from("failure_event")));
    }

    #[test]
    fn rejects_unknown_metric() {
        let broken = SAMPLE.replace(r#"{ metric = "MTBF" }"#, r#"{ metric = "Latency" }"#);
        let err = AppConfig::from_toml(&broken).unwrap_err();
        assert!(err.to_string().contains("unknown metric Latency"));
    }

    #[test]
    fn rejects_out_of_range_goal_weight() {
        let broken = SAMPLE.replacen("weight = 0.5\nmetrics = [{ metric = \"Failures\" }]", "weight = 2.0\nmetrics = [{ metric = \"Failures\" }]", 1);
        assert!(AppConfig::from_toml(&broken).is_err());
    }

    #[test]
    fn flag_wins_over_default() {
        let path = AppConfig::resolve_path(Some(PathBuf::from("custom.toml")));
        assert_eq!(path, PathBuf::from("custom.toml"));
    }
}
