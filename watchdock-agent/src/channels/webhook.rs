use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

use super::{check_status, ChannelError, NotificationChannel};
use crate::config::ApplicationIdentity;
use crate::report::MetricsReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

/// Generic JSON webhook: `{ "application": ..., "report": ... }`
pub struct WebhookChannel {
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> Result<Self, ChannelError> {
        let mut headers = HeaderMap::new();
        for (key, value) in config.headers.iter().flatten() {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| invalid(format!("header {}: {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| invalid(format!("header {}: {}", key, e)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self { url: config.url, client })
    }
}

fn invalid(reason: String) -> ChannelError {
    ChannelError::InvalidConfig { channel: "webhook", reason }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(
        &self,
        report: &MetricsReport,
        app: Option<&ApplicationIdentity>,
    ) -> Result<(), ChannelError> {
        let body = json!({ "application": app, "report": report });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|source| ChannelError::Http { channel: "webhook", source })?;

        check_status("webhook", response)
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
