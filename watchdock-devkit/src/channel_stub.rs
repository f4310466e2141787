/*!
In-memory notification channels

Record every report they receive so tests can assert on dispatch without
any webhook or SMTP server.
*/

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use watchdock_agent::{ApplicationIdentity, ChannelError, MetricsReport, NotificationChannel};

#[derive(Debug, Clone)]
pub struct RecordedSend {
    pub report: MetricsReport,
    pub application: Option<ApplicationIdentity>,
}

/// Channel that accepts and keeps every report
#[derive(Clone, Default)]
pub struct RecordingChannel {
    name: String,
    sends: Arc<Mutex<Vec<RecordedSend>>>,
}

impl RecordingChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), sends: Arc::default() }
    }

    pub fn boxed(&self) -> Box<dyn NotificationChannel> {
        Box::new(self.clone())
    }

    pub fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn last_report(&self) -> Option<MetricsReport> {
        self.sends().pop().map(|send| send.report)
    }

    /// Last report as the JSON a webhook would receive
    pub fn last_json(&self) -> Option<Value> {
        self.last_report()
            .and_then(|report| serde_json::to_value(report).ok())
    }

    pub fn clear(&self) {
        self.sends.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(
        &self,
        report: &MetricsReport,
        app: Option<&ApplicationIdentity>,
    ) -> Result<(), ChannelError> {
        tracing::info!("[MOCK] {} received {} report", self.name, report.status);
        self.sends
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedSend { report: report.clone(), application: app.cloned() });
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Channel whose every send fails, counting attempts
#[derive(Clone, Default)]
pub struct FailingChannel {
    attempts: Arc<AtomicUsize>,
}

impl FailingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn NotificationChannel> {
        Box::new(self.clone())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for FailingChannel {
    async fn send(
        &self,
        _report: &MetricsReport,
        _app: Option<&ApplicationIdentity>,
    ) -> Result<(), ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ChannelError::InvalidConfig {
            channel: "failing",
            reason: "Network error".to_string(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}
