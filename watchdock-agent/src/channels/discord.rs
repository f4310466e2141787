use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    check_status, format_bytes, present_application_lines, ChannelError, NotificationChannel,
};
use crate::config::ApplicationIdentity;
use crate::report::MetricsReport;
use crate::status::HealthStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Discord webhook channel, one embed per report
pub struct DiscordChannel {
    config: DiscordConfig,
    client: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn status_color(status: HealthStatus) -> u32 {
        match status {
            HealthStatus::Healthy => 0x00ff00,
            HealthStatus::Degraded => 0xffa500,
            HealthStatus::Unhealthy => 0xff0000,
        }
    }

    pub(crate) fn build_message(
        &self,
        report: &MetricsReport,
        app: Option<&ApplicationIdentity>,
    ) -> Value {
        let system = &report.system;
        let load_avg = system
            .cpu
            .load_avg
            .iter()
            .map(|v| format!("{:.2}", v))
            .collect::<Vec<_>>()
            .join(", ");

        let mut fields = vec![
            json!({
                "name": "💻 CPU",
                "value": format!(
                    "Usage: {:.2}%\nCores: {}\nLoad Average: {}",
                    system.cpu.usage, system.cpu.count, load_avg
                ),
                "inline": true,
            }),
            json!({
                "name": "🧠 Memory",
                "value": format!(
                    "Used: {}\nFree: {}\nTotal: {}",
                    format_bytes(system.memory.used),
                    format_bytes(system.memory.free),
                    format_bytes(system.memory.total)
                ),
                "inline": true,
            }),
            json!({
                "name": "💾 Disk",
                "value": format!(
                    "Used: {}%\nFree: {}\nTotal: {}",
                    system.disk.used_percentage,
                    format_bytes(system.disk.free),
                    format_bytes(system.disk.total)
                ),
                "inline": true,
            }),
        ];

        if let Some(app) = app.filter(|a| !a.metadata.is_empty()) {
            let info = app
                .metadata
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join("\n");
            fields.push(json!({ "name": "📌 Application Info", "value": info, "inline": false }));
        }

        let app_lines = present_application_lines(&report.application);
        if !app_lines.is_empty() {
            fields.push(json!({
                "name": "📊 Application Metrics",
                "value": app_lines.join("\n"),
                "inline": false,
            }));
        }

        if !report.errors.is_empty() {
            fields.push(json!({
                "name": "⚠️ Errors",
                "value": report.errors.join("\n"),
                "inline": false,
            }));
        }

        let uptime = system.process.uptime_secs;
        let app_name = ApplicationIdentity::display_name(app);
        let title = format!("🔍 System Health Report: {}", app_name);
        json!({
            "username": self.config.username.as_deref().unwrap_or("System Monitor"),
            "avatar_url": self.config.avatar_url.as_deref().unwrap_or(""),
            "embeds": [{
                "title": title,
                "color": Self::status_color(report.status),
                "description": format!("**Status:** {}", report.status.as_str().to_uppercase()),
                "timestamp": report.timestamp.to_rfc3339(),
                "fields": fields,
                "footer": {
                    "text": format!(
                        "Process ID: {} | Uptime: {}h {}m",
                        system.process.pid,
                        uptime / 3600,
                        (uptime % 3600) / 60
                    ),
                },
            }],
        })
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    async fn send(
        &self,
        report: &MetricsReport,
        app: Option<&ApplicationIdentity>,
    ) -> Result<(), ChannelError> {
        let body = self.build_message(report, app);
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|source| ChannelError::Http { channel: "Discord", source })?;

        check_status("Discord", response)
    }

    fn name(&self) -> &str {
        "discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::fixtures::sample_report;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(url: String) -> DiscordChannel {
        DiscordChannel::new(DiscordConfig {
            webhook_url: url,
            username: Some("Test Bot".into()),
            avatar_url: None,
        })
    }

    #[test]
    fn test_embed_layout() {
        let report =
            sample_report(HealthStatus::Degraded, &["CPU usage (1.50) exceeds threshold of 1"]);
        let mut app = ApplicationIdentity::new("Test App");
        app.metadata.insert("environment".into(), "production".into());

        let message = channel("http://unused".into()).build_message(&report, Some(&app));
        let embed = &message["embeds"][0];

        assert_eq!(message["username"], "Test Bot");
        assert_eq!(embed["title"], "🔍 System Health Report: Test App");
        assert_eq!(embed["color"], 0xffa500);
        assert_eq!(embed["description"], "**Status:** DEGRADED");
        assert_eq!(embed["footer"]["text"], "Process ID: 4242 | Uptime: 1h 2m");

        let fields = embed["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 6);
        assert!(fields[0]["value"].as_str().unwrap().contains("Load Average: 1.50, 1.00, 0.50"));
        assert!(fields[2]["value"].as_str().unwrap().starts_with("Used: 50%"));
        assert_eq!(fields[3]["value"], "environment: production");
        assert_eq!(fields[4]["value"], "Active Connections: 100\nRequest Count: 1000");
        assert_eq!(fields[5]["value"], "CPU usage (1.50) exceeds threshold of 1");
    }

    #[test]
    fn test_defaults_without_identity() {
        let mut report = sample_report(HealthStatus::Healthy, &[]);
        report.application.clear();
        let message = DiscordChannel::new(DiscordConfig {
            webhook_url: "http://unused".into(),
            username: None,
            avatar_url: None,
        })
        .build_message(&report, None);

        assert_eq!(message["username"], "System Monitor");
        assert_eq!(message["embeds"][0]["title"], "🔍 System Health Report: Watchdock");
        assert_eq!(message["embeds"][0]["fields"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_send_posts_to_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let report = sample_report(HealthStatus::Healthy, &[]);
        channel(format!("{}/hook", server.uri())).send(&report, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_webhook_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let report = sample_report(HealthStatus::Healthy, &[]);
        let err = channel(server.uri()).send(&report, None).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to send Discord notification"));
    }
}
