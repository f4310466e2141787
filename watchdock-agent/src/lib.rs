//! Watchdock - host health monitoring with alert fan-out
//!
//! Each cycle samples the host (CPU load, memory, disk usage, process
//! footprint), checks configured thresholds with per-metric debounce,
//! applies caller-defined rules, classifies overall health and notifies
//! the configured channels when something needs attention.

pub mod channels;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod execution;
pub mod metrics;
pub mod report;
pub mod scheduler;
pub mod status;
pub mod threshold;

pub use channels::{ChannelError, NotificationChannel, ProviderConfig};
pub use clock::{Clock, SystemClock};
pub use config::{
    ApplicationIdentity, CustomMetrics, CustomRule, MonitorConfig, NotificationRules, StatusRule,
};
pub use dispatch::NotificationDispatcher;
pub use engine::MonitorEngine;
pub use metrics::{HostProbe, SysinfoProbe};
pub use report::{ApplicationMetrics, DiskSnapshot, MetricValue, MetricsReport, SystemMetrics};
pub use scheduler::{CronScheduler, ScheduledTask, Scheduler, SchedulerError};
pub use status::HealthStatus;
pub use threshold::{Metric, ThresholdEvaluator, ThresholdRule};
