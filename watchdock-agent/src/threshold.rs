//! Per-metric threshold checks with time-based debounce
//!
//! A metric above its threshold alerts, then stays quiet for `duration`
//! minutes even if it remains elevated. Without a duration it alerts on every
//! evaluation above the threshold.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Built-in metrics that carry thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cpu,
    Memory,
    Disk,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Cpu, Metric::Memory, Metric::Disk];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cpu => "cpu",
            Metric::Memory => "memory",
            Metric::Disk => "disk",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threshold configuration for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    /// Percentage (load average for cpu) above which the metric alerts
    pub value: f64,
    /// Minimum minutes between two alerts for this metric
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub notify: bool,
}

impl ThresholdRule {
    pub fn new(value: f64) -> Self {
        Self { value, duration: None, notify: true }
    }

    pub fn with_duration(mut self, minutes: f64) -> Self {
        self.duration = Some(minutes);
        self
    }

    /// Negative or NaN durations mean no window; oversized ones never reopen
    fn window(&self) -> Option<Duration> {
        let minutes = self.duration.filter(|m| *m >= 0.0)?;
        let millis = minutes * 60_000.0;
        if millis >= i64::MAX as f64 {
            return Some(Duration::max_value());
        }
        Some(Duration::try_milliseconds(millis as i64).unwrap_or_else(Duration::max_value))
    }
}

/// Debounce state machine over the configured rules.
///
/// Rules are read-only; the only mutable state is the time of the last
/// alert per metric.
#[derive(Debug, Default)]
pub struct ThresholdEvaluator {
    rules: HashMap<Metric, ThresholdRule>,
    last_alert: HashMap<Metric, DateTime<Utc>>,
}

impl ThresholdEvaluator {
    pub fn new<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = (Metric, ThresholdRule)>,
    {
        Self {
            rules: rules.into_iter().collect(),
            last_alert: HashMap::new(),
        }
    }

    pub fn rule(&self, metric: Metric) -> Option<&ThresholdRule> {
        self.rules.get(&metric)
    }

    pub fn last_alert(&self, metric: Metric) -> Option<DateTime<Utc>> {
        self.last_alert.get(&metric).copied()
    }

    /// Decide whether `value` should raise an alert for `metric` at `now`.
    ///
    /// Records `now` as the metric's last alert when it returns true. A metric
    /// that never alerted before behaves as if its last alert was at the epoch.
    pub fn should_notify(&mut self, metric: Metric, value: f64, now: DateTime<Utc>) -> bool {
        let Some(rule) = self.rules.get(&metric) else {
            return false;
        };
        if !rule.notify || value <= rule.value {
            return false;
        }

        let window_elapsed = match (rule.window(), self.last_alert.get(&metric)) {
            (None, _) | (Some(_), None) => true,
            (Some(window), Some(last)) => now - *last >= window,
        };
        if !window_elapsed {
            debug!(metric = %metric, value, "Alert suppressed inside debounce window");
            return false;
        }

        self.last_alert.insert(metric, now);
        true
    }
}
