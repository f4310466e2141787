//! Monitoring cycle orchestration
//!
//! One cycle samples the host, checks thresholds, applies custom rules,
//! classifies the result and dispatches it when it is alert-worthy. Cycles
//! are serialised: the debounce state is held for the whole cycle.

use anyhow::Result;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::channels::ChannelError;
use crate::clock::{Clock, SystemClock};
use crate::config::MonitorConfig;
use crate::dispatch::NotificationDispatcher;
use crate::metrics::{HostProbe, SysinfoProbe};
use crate::report::{ApplicationMetrics, MetricsReport, SystemMetrics};
use crate::scheduler::{ScheduledTask, Scheduler, SchedulerError};
use crate::status::HealthStatus;
use crate::threshold::{Metric, ThresholdEvaluator};

pub struct MonitorEngine {
    config: MonitorConfig,
    dispatcher: NotificationDispatcher,
    probe: Arc<dyn HostProbe>,
    clock: Arc<dyn Clock>,
    debounce: Mutex<ThresholdEvaluator>,
}

impl MonitorEngine {
    /// Build an engine sampling the local host, with one channel per provider
    pub fn new(config: MonitorConfig) -> Result<Self, ChannelError> {
        let dispatcher = NotificationDispatcher::from_providers(&config.providers)?;
        Ok(Self::with_dispatcher(config, dispatcher))
    }

    pub fn with_dispatcher(config: MonitorConfig, dispatcher: NotificationDispatcher) -> Self {
        let debounce = Mutex::new(ThresholdEvaluator::new(config.notifications.thresholds()));
        Self {
            config,
            dispatcher,
            probe: Arc::new(SysinfoProbe::default()),
            clock: Arc::new(SystemClock),
            debounce,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn HostProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run one full cycle and return its report.
    ///
    /// Waits for a cycle already in progress. Channel failures never surface
    /// here; a host sampling failure does.
    pub async fn run_cycle(&self) -> Result<MetricsReport> {
        let mut debounce = self.debounce.lock().await;
        self.cycle(&mut debounce).await
    }

    /// Scheduled entry point: never fails, skips when a cycle is in flight
    pub async fn tick(&self) {
        let Ok(mut debounce) = self.debounce.try_lock() else {
            warn!("Previous monitoring cycle still running, skipping tick");
            return;
        };
        if let Err(e) = self.cycle(&mut debounce).await {
            error!("Monitor error: {:#}", e);
        }
    }

    /// Register [`tick`](Self::tick) with `scheduler` on the configured interval
    pub async fn start(self: &Arc<Self>, scheduler: &dyn Scheduler) -> Result<(), SchedulerError> {
        let engine = Arc::clone(self);
        let task: ScheduledTask = Arc::new(move || {
            let engine = Arc::clone(&engine);
            async move { engine.tick().await }.boxed()
        });
        scheduler.schedule(&self.config.interval, task).await?;
        info!(
            interval = %self.config.interval,
            channels = self.dispatcher.len(),
            "Monitoring started"
        );
        Ok(())
    }

    async fn cycle(&self, debounce: &mut ThresholdEvaluator) -> Result<MetricsReport> {
        let system = self.probe.sample(&self.config.disk_path).await?;
        let application = self.collect_application_metrics().await;
        let timestamp = self.clock.now();

        let mut errors = Vec::new();
        for metric in Metric::ALL {
            let value = current_value(&system, metric);
            if !debounce.should_notify(metric, value, timestamp) {
                continue;
            }
            // should_notify only fires for configured metrics
            let Some(rule) = self.config.notifications.threshold(metric) else {
                continue;
            };
            errors.push(threshold_message(metric, value, rule.value));
        }

        let mut report = MetricsReport {
            timestamp,
            status: HealthStatus::classify(errors.len()),
            errors,
            system,
            application,
        };

        let custom_errors: Vec<String> = self
            .config
            .notifications
            .custom
            .iter()
            .filter(|rule| rule.matches(&report))
            .map(|rule| rule.message.clone())
            .collect();
        report.errors.extend(custom_errors);
        report.status = HealthStatus::classify(report.errors.len());

        debug!(status = %report.status, errors = report.errors.len(), "Cycle evaluated");

        if !report.errors.is_empty() || self.config.notifications.notifies_on(report.status) {
            self.dispatcher
                .send_all(&report, self.config.application.as_ref())
                .await;
        }
        Ok(report)
    }

    async fn collect_application_metrics(&self) -> ApplicationMetrics {
        let Some(custom) = &self.config.custom_metrics else {
            return ApplicationMetrics::new();
        };
        match custom.collect().await {
            Ok(metrics) => metrics,
            Err(e) => {
                error!("Failed to collect custom metrics: {:#}", e);
                ApplicationMetrics::new()
            }
        }
    }
}

fn current_value(system: &SystemMetrics, metric: Metric) -> f64 {
    match metric {
        Metric::Cpu => system.cpu.usage,
        Metric::Memory => system.memory.used_percentage(),
        Metric::Disk => system.disk.used_percentage,
    }
}

fn threshold_message(metric: Metric, value: f64, threshold: f64) -> String {
    match metric {
        Metric::Cpu => format!("CPU usage ({:.2}) exceeds threshold of {}", value, threshold),
        Metric::Memory => {
            format!("Memory usage ({:.1}%) exceeds threshold of {}%", value, threshold)
        }
        Metric::Disk => format!("Disk usage ({}%) exceeds threshold of {}%", value, threshold),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_messages() {
        assert_eq!(
            threshold_message(Metric::Cpu, 1.5, 1.0),
            "CPU usage (1.50) exceeds threshold of 1"
        );
        assert_eq!(
            threshold_message(Metric::Memory, 50.0, 40.0),
            "Memory usage (50.0%) exceeds threshold of 40%"
        );
        assert_eq!(
            threshold_message(Metric::Disk, 93.0, 90.0),
            "Disk usage (93%) exceeds threshold of 90%"
        );
    }
}
