//! Host metrics sampling for Watchdock
//!
//! Provides the figures a monitoring cycle evaluates:
//! - CPU load averages and core count
//! - Memory totals
//! - Disk usage for a configured path (see [`disk`])
//! - Agent process footprint and uptime

pub mod disk;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Instant;
use sysinfo::System;
use tracing::debug;

use crate::report::{CpuMetrics, MemoryMetrics, ProcessMetrics, SystemMetrics};
use disk::DiskInfoProbe;

/// Source of host figures for one cycle
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn sample(&self, disk_path: &str) -> Result<SystemMetrics>;
}

/// Probe backed by `sysinfo` and the platform disk command
pub struct SysinfoProbe {
    sys: Mutex<System>,
    disk: DiskInfoProbe,
    started: Instant,
}

impl SysinfoProbe {
    pub fn new(disk: DiskInfoProbe) -> Self {
        Self {
            sys: Mutex::new(System::new()),
            disk,
            started: Instant::now(),
        }
    }

    fn sample_cpu_and_memory(&self) -> Result<(CpuMetrics, MemoryMetrics)> {
        let mut sys = self
            .sys
            .lock()
            .map_err(|_| anyhow!("system info lock poisoned"))?;
        sys.refresh_cpu();
        sys.refresh_memory();

        // Load averages are 0 where the OS does not expose them (Windows)
        let load = System::load_average();
        let load_avg = [load.one, load.five, load.fifteen];
        let cpu = CpuMetrics {
            usage: load_avg[0],
            count: sys.cpus().len(),
            load_avg,
        };

        let total = sys.total_memory();
        let free = sys.available_memory();

        let (process_rss, process_virtual) = match sysinfo::get_current_pid() {
            Ok(pid) => {
                sys.refresh_process(pid);
                sys.process(pid)
                    .map(|p| (p.memory(), p.virtual_memory()))
                    .unwrap_or((0, 0))
            }
            Err(e) => {
                debug!("Current pid unavailable: {}", e);
                (0, 0)
            }
        };

        let memory = MemoryMetrics {
            total,
            free,
            used: total.saturating_sub(free),
            process_rss,
            process_virtual,
        };

        Ok((cpu, memory))
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new(DiskInfoProbe::system())
    }
}

#[async_trait]
impl HostProbe for SysinfoProbe {
    async fn sample(&self, disk_path: &str) -> Result<SystemMetrics> {
        debug!("Collecting system metrics...");

        let (cpu, memory) = self.sample_cpu_and_memory()?;
        let disk = self.disk.get_disk_info(disk_path).await;

        let process = ProcessMetrics {
            uptime_secs: self.started.elapsed().as_secs(),
            pid: std::process::id(),
            version: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        };

        Ok(SystemMetrics {
            cpu,
            memory,
            disk,
            process,
        })
    }
}
