/*!
Test harness for the monitoring engine

Wires a [`MonitorEngine`] to a static probe, a manual clock and a recording
channel so a cycle can be driven and inspected deterministically.
*/

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use watchdock_agent::report::{CpuMetrics, MemoryMetrics, ProcessMetrics};
use watchdock_agent::{
    Clock, DiskSnapshot, HostProbe, MetricsReport, MonitorConfig, MonitorEngine,
    NotificationChannel, NotificationDispatcher, ScheduledTask, Scheduler, SchedulerError,
    SystemMetrics,
};

use crate::channel_stub::RecordingChannel;

const GB: u64 = 1_000_000_000;

/// Host figures with the given cpu load and memory/disk usage percentages
pub fn system_metrics(cpu_load: f64, memory_pct: f64, disk_pct: f64) -> SystemMetrics {
    let memory_total = 16 * GB;
    let memory_used = (memory_total as f64 * memory_pct / 100.0) as u64;
    let disk_total = 1_000 * GB;
    let disk_used = (disk_total as f64 * disk_pct / 100.0) as u64;

    SystemMetrics {
        cpu: CpuMetrics { usage: cpu_load, count: 4, load_avg: [cpu_load, cpu_load, cpu_load] },
        memory: MemoryMetrics {
            total: memory_total,
            free: memory_total - memory_used,
            used: memory_used,
            process_rss: 64 * 1024 * 1024,
            process_virtual: 256 * 1024 * 1024,
        },
        disk: DiskSnapshot {
            total: disk_total,
            free: disk_total - disk_used,
            used: disk_used,
            used_percentage: disk_pct,
        },
        process: ProcessMetrics { uptime_secs: 60, pid: 1, version: "test".to_string() },
    }
}

/// Probe returning preset figures, or failing while `fail` is set
#[derive(Default)]
pub struct StaticProbe {
    metrics: Mutex<Option<SystemMetrics>>,
}

impl StaticProbe {
    pub fn new(metrics: SystemMetrics) -> Self {
        Self { metrics: Mutex::new(Some(metrics)) }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn set(&self, metrics: SystemMetrics) {
        *self.metrics.lock().unwrap_or_else(|e| e.into_inner()) = Some(metrics);
    }

    pub fn fail(&self) {
        *self.metrics.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[async_trait]
impl HostProbe for StaticProbe {
    async fn sample(&self, _disk_path: &str) -> Result<SystemMetrics> {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| anyhow!("host probe unavailable"))
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap_or_default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Scheduler that keeps tasks until [`fire`](Self::fire) is called
#[derive(Default)]
pub struct ManualScheduler {
    jobs: Mutex<Vec<(String, ScheduledTask)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expressions(&self) -> Vec<String> {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(expression, _)| expression.clone())
            .collect()
    }

    /// Run every registered task once, in registration order
    pub async fn fire(&self) {
        let tasks: Vec<ScheduledTask> = self
            .jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, task)| task.clone())
            .collect();
        for task in tasks {
            task().await;
        }
    }
}

#[async_trait]
impl Scheduler for ManualScheduler {
    async fn schedule(&self, expression: &str, task: ScheduledTask) -> Result<(), SchedulerError> {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((expression.to_string(), task));
        Ok(())
    }
}

/// Engine wired to test doubles
pub struct TestHarness {
    pub engine: Arc<MonitorEngine>,
    pub probe: Arc<StaticProbe>,
    pub clock: Arc<ManualClock>,
    pub channel: RecordingChannel,
}

impl TestHarness {
    /// Harness with one recording channel and a quiet host
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_channels(config, Vec::new())
    }

    /// Harness whose dispatcher holds `extra` followed by the recording channel
    pub fn with_channels(config: MonitorConfig, extra: Vec<Box<dyn NotificationChannel>>) -> Self {
        init_logging();

        let channel = RecordingChannel::new("recording");
        let mut channels = extra;
        channels.push(channel.boxed());

        let probe = Arc::new(StaticProbe::new(system_metrics(0.1, 10.0, 10.0)));
        let clock = Arc::new(ManualClock::default());
        let engine = MonitorEngine::with_dispatcher(config, NotificationDispatcher::new(channels))
            .with_probe(probe.clone())
            .with_clock(clock.clone());

        Self { engine: Arc::new(engine), probe, clock, channel }
    }

    pub async fn cycle(&self) -> Result<MetricsReport> {
        self.engine.run_cycle().await
    }

    pub fn send_count(&self) -> usize {
        self.channel.send_count()
    }
}

fn init_logging() {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();
}
