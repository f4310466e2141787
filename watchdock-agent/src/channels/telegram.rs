use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    application_lines, check_status, escape_html, format_megabytes, status_emoji, ChannelError,
    NotificationChannel,
};
use crate::config::ApplicationIdentity;
use crate::report::MetricsReport;

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// Bot API base URL, defaults to the public endpoint
    #[serde(default)]
    pub api_base: Option<String>,
}

pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        let base = self.config.api_base.as_deref().unwrap_or(TELEGRAM_API);
        format!("{}/bot{}/sendMessage", base.trim_end_matches('/'), self.config.bot_token)
    }

    /// Message body in Telegram's HTML parse mode
    pub(crate) fn format_message(
        &self,
        report: &MetricsReport,
        app: Option<&ApplicationIdentity>,
    ) -> String {
        let system = &report.system;
        let mut text = format!(
            "🔍 System Health Report: {}\n📅 {}\nStatus: {} {}\n\n",
            escape_html(ApplicationIdentity::display_name(app)),
            report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            status_emoji(report.status),
            report.status.as_str().to_uppercase(),
        );
        text.push_str(&format!(
            "💻 System Metrics:\nCPU: {:.2}%\nMemory: {}\nProcess RSS: {}\nDisk: {}%\n\n",
            system.cpu.usage,
            format_megabytes(system.memory.used),
            format_megabytes(system.memory.process_rss),
            system.disk.used_percentage,
        ));
        text.push_str("📊 Application Metrics:\n");
        text.push_str(&escape_html(&application_lines(&report.application).join("\n")));

        if !report.errors.is_empty() {
            text.push_str("\n\n⚠️ Errors:\n");
            text.push_str(&escape_html(&report.errors.join("\n")));
        }
        text
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn send(
        &self,
        report: &MetricsReport,
        app: Option<&ApplicationIdentity>,
    ) -> Result<(), ChannelError> {
        let body = json!({
            "chat_id": self.config.chat_id,
            "text": self.format_message(report, app),
            "parse_mode": "HTML",
        });

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|source| ChannelError::Http { channel: "Telegram", source })?;

        check_status("Telegram", response)
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::fixtures::sample_report;
    use crate::status::HealthStatus;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(api_base: Option<String>) -> TelegramChannel {
        TelegramChannel::new(TelegramConfig {
            bot_token: "token".into(),
            chat_id: "chat".into(),
            api_base,
        })
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(channel(None).endpoint(), "https://api.telegram.org/bottoken/sendMessage");
        assert_eq!(
            channel(Some("http://localhost:8081/".into())).endpoint(),
            "http://localhost:8081/bottoken/sendMessage"
        );
    }

    #[test]
    fn test_message_text() {
        let report = sample_report(HealthStatus::Unhealthy, &["Disk full", "Queue stalled"]);
        let text = channel(None).format_message(&report, None);

        assert!(text.contains("Status: ❌ UNHEALTHY"));
        assert!(text.contains("CPU: 1.50%"));
        assert!(text.contains("Disk: 50%"));
        assert!(text.contains("Active Connections: 100"));
        assert!(text.contains("Error Count: N/A"));
        assert!(text.ends_with("⚠️ Errors:\nDisk full\nQueue stalled"));
    }

    #[test]
    fn test_message_escapes_html() {
        let report = sample_report(HealthStatus::Degraded, &["Disk <90%> & rising"]);
        let app = ApplicationIdentity::new("R&D <beta>");
        let text = channel(None).format_message(&report, Some(&app));

        assert!(text.contains("System Health Report: R&amp;D &lt;beta&gt;"));
        assert!(text.ends_with("Disk &lt;90%&gt; &amp; rising"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_message_without_errors() {
        let report = sample_report(HealthStatus::Healthy, &[]);
        let text = channel(None).format_message(&report, None);
        assert!(!text.contains("Errors"));
        assert!(text.contains("✅ HEALTHY"));
    }

    #[tokio::test]
    async fn test_send_uses_bot_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottoken/sendMessage"))
            .and(body_partial_json(serde_json::json!({ "chat_id": "chat", "parse_mode": "HTML" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let report = sample_report(HealthStatus::Degraded, &["CPU"]);
        channel(Some(server.uri())).send(&report, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let report = sample_report(HealthStatus::Degraded, &["CPU"]);
        let err = channel(Some(server.uri())).send(&report, None).await.unwrap_err();
        assert!(matches!(err, ChannelError::Status { channel: "Telegram", .. }));
    }
}
