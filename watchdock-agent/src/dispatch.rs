//! Fan-out of a report to every configured channel

use futures::future::join_all;
use tracing::{debug, error};

use crate::channels::{build_channel, ChannelError, NotificationChannel, ProviderConfig};
use crate::config::ApplicationIdentity;
use crate::report::MetricsReport;

/// Sends one report to all channels concurrently.
///
/// A failing channel is logged and never affects the others.
#[derive(Default)]
pub struct NotificationDispatcher {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn from_providers(providers: &[ProviderConfig]) -> Result<Self, ChannelError> {
        let channels = providers
            .iter()
            .map(build_channel)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(channels))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Returns once every send has settled
    pub async fn send_all(&self, report: &MetricsReport, app: Option<&ApplicationIdentity>) {
        let sends = self.channels.iter().map(|channel| async move {
            (channel.name(), channel.send(report, app).await)
        });

        for (name, result) in join_all(sends).await {
            match result {
                Ok(()) => debug!(channel = name, "Notification sent"),
                Err(e) => error!(channel = name, "Failed to send notification: {}", e),
            }
        }
    }
}
