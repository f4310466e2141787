//! External command execution for metric probes
//!
//! Probes never spawn processes directly: they go through a [`CommandRunner`]
//! so parsing can be tested against canned output.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Captured output of a successful command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
}

/// Runs an external program and captures its standard output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Fails when the program cannot be spawned or exits non-zero
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Runner backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    timeout: Option<Duration>,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every command by `timeout`; an expired command is killed and
    /// reported as an error
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let start_time = Instant::now();
        debug!("Executing command: {} {:?} (timeout: {:?})", program, args, self.timeout);

        let mut command = AsyncCommand::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = command.output();

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child)
                .await
                .with_context(|| format!("Command {} timed out", program))?,
            None => child.await,
        }
        .with_context(|| format!("Failed to execute {}", program))?;

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            "Command {} finished with code {} in {}ms",
            program,
            exit_code,
            start_time.elapsed().as_millis()
        );
        if !output.status.success() {
            return Err(anyhow!(
                "{} exited with code {}: {}",
                program,
                exit_code,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
