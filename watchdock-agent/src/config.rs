//! Monitor configuration
//!
//! Handles:
//! - TOML loading from an OS-specific location (or `WATCHDOCK_CONFIG`)
//! - Threshold, status and custom alert rules
//! - Callback options attached in code (custom metrics, custom rules)

use anyhow::Result as AnyResult;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::channels::ProviderConfig;
use crate::report::{ApplicationMetrics, MetricsReport};
use crate::status::HealthStatus;
use crate::threshold::{Metric, ThresholdRule};

pub const CONFIG_ENV_VAR: &str = "WATCHDOCK_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find config directory")]
    NoConfigDir,
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Cron expression handed to the scheduler as-is
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_disk_path")]
    pub disk_path: String,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub application: Option<ApplicationIdentity>,
    #[serde(default)]
    pub notifications: NotificationRules,
    #[serde(skip)]
    pub custom_metrics: Option<CustomMetrics>,
}

fn default_interval() -> String {
    "*/5 * * * *".to_string()
}

fn default_disk_path() -> String {
    "/".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            disk_path: default_disk_path(),
            providers: Vec::new(),
            application: None,
            notifications: NotificationRules::default(),
            custom_metrics: None,
        }
    }
}

impl MonitorConfig {
    /// Load config from `WATCHDOCK_CONFIG` or the OS-specific location.
    ///
    /// A missing file yields the default config.
    pub async fn load() -> Result<Self, ConfigError> {
        let config_path = match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => PathBuf::from(path),
            Err(_) => Self::config_file_path()?,
        };
        Self::load_from(&config_path).await
    }

    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml_str(&content)?;
        info!(
            "Loaded config from {} ({} provider(s))",
            path.display(),
            config.providers.len()
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push("watchdock");
        path.push("config.toml");
        Ok(path)
    }

    pub fn with_custom_metrics(mut self, metrics: CustomMetrics) -> Self {
        self.custom_metrics = Some(metrics);
        self
    }

    pub fn with_custom_rule(mut self, rule: CustomRule) -> Self {
        self.notifications.custom.push(rule);
        self
    }
}

/// Identity of the monitored application, passed to every channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationIdentity {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ApplicationIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Name shown in reports, `Watchdock` when no identity is configured
    pub fn display_name(app: Option<&ApplicationIdentity>) -> &str {
        app.map(|a| a.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or("Watchdock")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationRules {
    #[serde(default)]
    pub cpu: Option<ThresholdRule>,
    #[serde(default)]
    pub memory: Option<ThresholdRule>,
    #[serde(default)]
    pub disk: Option<ThresholdRule>,
    #[serde(default)]
    pub status: Option<StatusRule>,
    #[serde(skip)]
    pub custom: Vec<CustomRule>,
}

impl NotificationRules {
    pub fn threshold(&self, metric: Metric) -> Option<&ThresholdRule> {
        match metric {
            Metric::Cpu => self.cpu.as_ref(),
            Metric::Memory => self.memory.as_ref(),
            Metric::Disk => self.disk.as_ref(),
        }
    }

    /// Configured thresholds, for building a
    /// [`ThresholdEvaluator`](crate::threshold::ThresholdEvaluator)
    pub fn thresholds(&self) -> impl Iterator<Item = (Metric, ThresholdRule)> + '_ {
        Metric::ALL
            .into_iter()
            .filter_map(|metric| self.threshold(metric).map(|rule| (metric, rule.clone())))
    }

    /// Whether `status` alone warrants a dispatch
    pub fn notifies_on(&self, status: HealthStatus) -> bool {
        self.status
            .as_ref()
            .map(|rule| rule.notify_on.contains(&status))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusRule {
    #[serde(default)]
    pub notify_on: Vec<HealthStatus>,
}

type Condition = dyn Fn(&MetricsReport) -> bool + Send + Sync;

/// Caller-defined alert: `message` is recorded when `condition` holds.
///
/// Conditions see the preliminary report of the cycle and must be free of
/// side effects.
#[derive(Clone)]
pub struct CustomRule {
    condition: Arc<Condition>,
    pub message: String,
}

impl CustomRule {
    pub fn new<F>(message: impl Into<String>, condition: F) -> Self
    where
        F: Fn(&MetricsReport) -> bool + Send + Sync + 'static,
    {
        Self {
            condition: Arc::new(condition),
            message: message.into(),
        }
    }

    pub fn matches(&self, report: &MetricsReport) -> bool {
        (self.condition)(report)
    }
}

impl fmt::Debug for CustomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRule")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

type MetricsFn = dyn Fn() -> BoxFuture<'static, AnyResult<ApplicationMetrics>> + Send + Sync;

/// Application metrics callback.
///
/// Synchronous and asynchronous callbacks are both adapted to one async
/// contract at construction time.
#[derive(Clone)]
pub struct CustomMetrics {
    collect: Arc<MetricsFn>,
}

impl CustomMetrics {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> AnyResult<ApplicationMetrics> + Send + Sync + 'static,
    {
        Self {
            collect: Arc::new(move || {
                let result = f();
                async move { result }.boxed()
            }),
        }
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AnyResult<ApplicationMetrics>> + Send + 'static,
    {
        Self {
            collect: Arc::new(move || f().boxed()),
        }
    }

    pub async fn collect(&self) -> AnyResult<ApplicationMetrics> {
        (self.collect)().await
    }
}

impl fmt::Debug for CustomMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMetrics").finish_non_exhaustive()
    }
}
