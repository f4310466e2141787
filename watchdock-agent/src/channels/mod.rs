//! Notification channels
//!
//! Every channel implements [`NotificationChannel::send`]: it must not
//! mutate the report, succeeds with `Ok(())` and fails with a
//! message-bearing [`ChannelError`]. Wire formats are channel-private.

pub mod discord;
pub mod email;
pub mod telegram;
pub mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ApplicationIdentity;
use crate::report::{ApplicationMetrics, MetricValue, MetricsReport};
use crate::status::HealthStatus;

pub use discord::{DiscordChannel, DiscordConfig};
pub use email::{EmailAuth, EmailChannel, EmailConfig};
pub use telegram::{TelegramChannel, TelegramConfig};
pub use webhook::{WebhookChannel, WebhookConfig};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to send {channel} notification: {source}")]
    Http {
        channel: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to send {channel} notification: server answered {status}")]
    Status {
        channel: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("Failed to send email notification: {0}")]
    Email(String),
    #[error("Invalid {channel} configuration: {reason}")]
    InvalidConfig {
        channel: &'static str,
        reason: String,
    },
}

/// Destination for finished reports
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(
        &self,
        report: &MetricsReport,
        app: Option<&ApplicationIdentity>,
    ) -> Result<(), ChannelError>;

    /// Channel name used in logs
    fn name(&self) -> &str;
}

/// Channel configuration, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Telegram(TelegramConfig),
    Discord(DiscordConfig),
    Email(EmailConfig),
    Webhook(WebhookConfig),
}

/// Build the channel described by `config`
pub fn build_channel(
    config: &ProviderConfig,
) -> Result<Box<dyn NotificationChannel>, ChannelError> {
    Ok(match config {
        ProviderConfig::Telegram(c) => Box::new(TelegramChannel::new(c.clone())),
        ProviderConfig::Discord(c) => Box::new(DiscordChannel::new(c.clone())),
        ProviderConfig::Email(c) => Box::new(EmailChannel::new(c.clone())?),
        ProviderConfig::Webhook(c) => Box::new(WebhookChannel::new(c.clone())?),
    })
}

/// Map a non-2xx response to [`ChannelError::Status`]
pub(crate) fn check_status(
    channel: &'static str,
    response: reqwest::Response,
) -> Result<(), ChannelError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ChannelError::Status { channel, status })
    }
}

/// Human-readable byte count with two decimals (B, KB, MB, GB, TB)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

/// Escape text for channels that render HTML
pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn status_emoji(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "✅",
        HealthStatus::Degraded => "⚠️",
        HealthStatus::Unhealthy => "❌",
    }
}

/// Well-known application metrics with their display labels
const KNOWN_METRICS: [(&str, &str, &str); 4] = [
    ("activeConnections", "Active Connections", ""),
    ("requestCount", "Request Count", ""),
    ("errorCount", "Error Count", ""),
    ("averageResponseTime", "Avg Response Time", "ms"),
];

/// `Label: value` lines for the application metrics, `N/A` when absent
pub fn application_lines(metrics: &ApplicationMetrics) -> Vec<String> {
    let mut lines: Vec<String> = KNOWN_METRICS
        .iter()
        .map(|(key, label, unit)| match metrics.get(*key) {
            Some(value) => format!("{}: {}{}", label, value, unit),
            None => format!("{}: N/A", label),
        })
        .collect();

    lines.extend(
        metrics
            .iter()
            .filter(|(key, _)| !KNOWN_METRICS.iter().any(|(known, _, _)| known == key))
            .map(|(key, value)| format!("{}: {}", key, value)),
    );
    lines
}

/// Only the application metrics that are present and non-empty
pub fn present_application_lines(metrics: &ApplicationMetrics) -> Vec<String> {
    let present: ApplicationMetrics = metrics
        .iter()
        .filter(|(_, value)| !matches!(value, MetricValue::Text(t) if t.is_empty() || t == "N/A"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    application_lines(&present)
        .into_iter()
        .filter(|line| !line.ends_with(": N/A"))
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::report::*;
    use chrono::TimeZone;

    pub fn sample_report(status: HealthStatus, errors: &[&str]) -> MetricsReport {
        MetricsReport {
            timestamp: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            status,
            errors: errors.iter().map(|e| e.to_string()).collect(),
            system: SystemMetrics {
                cpu: CpuMetrics { usage: 1.5, count: 4, load_avg: [1.5, 1.0, 0.5] },
                memory: MemoryMetrics {
                    total: 16_000_000_000,
                    free: 8_000_000_000,
                    used: 8_000_000_000,
                    process_rss: 300_000_000,
                    process_virtual: 900_000_000,
                },
                disk: DiskSnapshot {
                    total: 1_000_000_000_000,
                    free: 500_000_000_000,
                    used: 500_000_000_000,
                    used_percentage: 50.0,
                },
                process: ProcessMetrics {
                    uptime_secs: 3_725,
                    pid: 4242,
                    version: "watchdock-agent 1.0.0".into(),
                },
            },
            application: ApplicationMetrics::from([
                ("activeConnections".to_string(), MetricValue::Int(100)),
                ("requestCount".to_string(), MetricValue::Int(1000)),
            ]),
        }
    }
}
