use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

use super::{
    application_lines, escape_html, format_megabytes, ChannelError, NotificationChannel,
};
use crate::config::ApplicationIdentity;
use crate::report::MetricsReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    /// Implicit TLS when true, STARTTLS otherwise
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub auth: Option<EmailAuth>,
    pub from: String,
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAuth {
    pub user: String,
    pub pass: String,
}

/// SMTP channel sending an HTML report
pub struct EmailChannel {
    from: Mailbox,
    to: Vec<Mailbox>,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Result<Self, ChannelError> {
        let from = parse_mailbox(&config.from)?;
        let to = config
            .to
            .iter()
            .map(|address| parse_mailbox(address))
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(invalid("no recipients".to_string()));
        }

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| invalid(e.to_string()))?
        .port(config.port);

        let mailer = match config.auth {
            Some(auth) => builder.credentials(Credentials::new(auth.user, auth.pass)).build(),
            None => builder.build(),
        };

        Ok(Self { from, to, mailer })
    }

    pub(crate) fn subject(report: &MetricsReport) -> String {
        format!("System Health Report - {}", report.status.as_str().to_uppercase())
    }

    pub(crate) fn format_html(report: &MetricsReport, app: Option<&ApplicationIdentity>) -> String {
        let system = &report.system;
        let app_items: String = application_lines(&report.application)
            .iter()
            .map(|line| format!("<li>{}</li>", escape_html(line)))
            .collect();

        let mut html = format!(
            "<h2>System Health Report: {}</h2>\n\
             <p><strong>Time:</strong> {}</p>\n\
             <p><strong>Status:</strong> {}</p>\n\
             <h3>System Metrics</h3>\n\
             <ul><li>CPU: {:.2}%</li><li>Memory: {}</li>\
             <li>Process RSS: {}</li><li>Disk: {}%</li></ul>\n\
             <h3>Application Metrics</h3>\n\
             <ul>{}</ul>\n",
            escape_html(ApplicationIdentity::display_name(app)),
            report.timestamp.to_rfc2822(),
            report.status.as_str().to_uppercase(),
            system.cpu.usage,
            format_megabytes(system.memory.used),
            format_megabytes(system.memory.process_rss),
            system.disk.used_percentage,
            app_items,
        );

        if !report.errors.is_empty() {
            let items: String = report
                .errors
                .iter()
                .map(|e| format!("<li>{}</li>", escape_html(e)))
                .collect();
            html.push_str(&format!("<h3>Errors</h3>\n<ul>{}</ul>\n", items));
        }
        html
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, ChannelError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| invalid(format!("address {}: {}", address, e)))
}

fn invalid(reason: String) -> ChannelError {
    ChannelError::InvalidConfig { channel: "email", reason }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    async fn send(
        &self,
        report: &MetricsReport,
        app: Option<&ApplicationIdentity>,
    ) -> Result<(), ChannelError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(Self::subject(report))
            .header(ContentType::TEXT_HTML);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        let email = builder
            .body(Self::format_html(report, app))
            .map_err(|e| ChannelError::Email(e.to_string()))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| ChannelError::Email(e.to_string()))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::fixtures::sample_report;
    use crate::status::HealthStatus;

    fn config() -> EmailConfig {
        EmailConfig {
            host: "smtp.test.com".into(),
            port: 587,
            secure: false,
            auth: Some(EmailAuth { user: "test".into(), pass: "pass".into() }),
            from: "from@test.com".into(),
            to: vec!["to@test.com".into(), "ops@test.com".into()],
        }
    }

    #[test]
    fn test_subject_and_body() {
        let report = sample_report(HealthStatus::Unhealthy, &["Disk <90%> & rising"]);
        assert_eq!(EmailChannel::subject(&report), "System Health Report - UNHEALTHY");

        let html = EmailChannel::format_html(&report, Some(&ApplicationIdentity::new("billing")));
        assert!(html.contains("<h2>System Health Report: billing</h2>"));
        assert!(html.contains("<li>CPU: 1.50%</li>"));
        assert!(html.contains("<li>Disk: 50%</li>"));
        assert!(html.contains("<li>Request Count: 1000</li>"));
        assert!(html.contains("<li>Disk &lt;90%&gt; &amp; rising</li>"));
    }

    #[test]
    fn test_body_without_errors_has_no_error_section() {
        let report = sample_report(HealthStatus::Healthy, &[]);
        assert!(!EmailChannel::format_html(&report, None).contains("<h3>Errors</h3>"));
    }

    #[tokio::test]
    async fn test_channel_builds_from_config() {
        let channel = EmailChannel::new(config()).unwrap();
        assert_eq!(channel.to.len(), 2);
        assert_eq!(channel.name(), "email");
    }

    #[tokio::test]
    async fn test_invalid_addresses_rejected() {
        let mut bad_from = config();
        bad_from.from = "not an address".into();
        assert!(matches!(EmailChannel::new(bad_from), Err(ChannelError::InvalidConfig { .. })));

        let mut no_recipients = config();
        no_recipients.to.clear();
        assert!(matches!(
            EmailChannel::new(no_recipients),
            Err(ChannelError::InvalidConfig { .. })
        ));
    }
}
