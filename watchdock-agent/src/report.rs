//! Metrics report produced once per monitoring cycle
//!
//! The report is an immutable snapshot: channels receive it by reference and
//! custom rules only ever see a preliminary copy of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::status::HealthStatus;

/// Complete report for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub errors: Vec<String>,
    pub system: SystemMetrics,
    #[serde(default)]
    pub application: ApplicationMetrics,
}

/// Host and process figures sampled at the start of a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub disk: DiskSnapshot,
    pub process: ProcessMetrics,
}

/// CPU figures. `usage` is the one-minute load average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub usage: f64,
    pub count: usize,
    pub load_avg: [f64; 3], // [1min, 5min, 15min]
}

/// Memory totals in bytes, plus the agent process footprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub process_rss: u64,
    pub process_virtual: u64,
}

impl MemoryMetrics {
    /// Used memory as a percentage of total; 0 when total is unknown
    pub fn used_percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.total.saturating_sub(self.free)) as f64 / self.total as f64 * 100.0
    }
}

/// Filesystem usage for one path.
///
/// Either `used + free == total`, or every field is zero (see
/// [`DiskSnapshot::unavailable`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskSnapshot {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub used_percentage: f64,
}

impl DiskSnapshot {
    /// Sentinel returned when disk usage could not be determined
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_unavailable(&self) -> bool {
        *self == Self::unavailable()
    }
}

/// Agent process information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub uptime_secs: u64,
    pub pid: u32,
    pub version: String,
}

/// Primitive value carried by an application metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Bool(v) => write!(f, "{}", v),
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{}", v),
            MetricValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

/// Caller-supplied application metrics, keyed by metric name
pub type ApplicationMetrics = BTreeMap<String, MetricValue>;
