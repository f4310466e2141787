//! Cron-driven invocation of the monitoring cycle

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

/// Work run on every tick
pub type ScheduledTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid schedule '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },
    #[error("scheduler failure: {0}")]
    Backend(String),
}

/// Registers a task against a cron expression
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule(&self, expression: &str, task: ScheduledTask) -> Result<(), SchedulerError>;
}

/// Scheduler on top of `tokio-cron-scheduler`
pub struct CronScheduler {
    inner: JobScheduler,
}

impl CronScheduler {
    pub async fn new() -> Result<Self, SchedulerError> {
        let inner = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::Backend(e.to_string()))?;
        Ok(Self { inner })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.inner
            .start()
            .await
            .map_err(|e| SchedulerError::Backend(e.to_string()))
    }

    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| SchedulerError::Backend(e.to_string()))
    }
}

/// Accept classic five-field crontab lines by prepending a seconds field
pub fn normalize_expression(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl Scheduler for CronScheduler {
    async fn schedule(&self, expression: &str, task: ScheduledTask) -> Result<(), SchedulerError> {
        let normalized = normalize_expression(expression);
        let job = Job::new_async(normalized.as_str(), move |_uuid, _lock| {
            let task = task.clone();
            Box::pin(async move { task().await })
        })
        .map_err(|e| SchedulerError::InvalidExpression {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;

        self.inner
            .add(job)
            .await
            .map_err(|e| SchedulerError::Backend(e.to_string()))?;
        info!(schedule = %normalized, "Monitoring job scheduled");
        Ok(())
    }
}
