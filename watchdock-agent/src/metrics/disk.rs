//! Disk usage acquisition through the platform's own tooling
//!
//! - POSIX: `df -kP <path>`, 1-KiB blocks, tool-reported percentage
//! - Windows: `wmic logicaldisk get size,freespace,caption`, bytes
//!
//! Any failure collapses to [`DiskSnapshot::unavailable`]; a bad disk read
//! never aborts a monitoring cycle.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::execution::{CommandRunner, SystemCommandRunner};
use crate::report::DiskSnapshot;

/// Host platform family, selects the command and the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Posix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }
}

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("disk command failed: {0}")]
    Command(String),
    #[error("unexpected df output: {0} line(s), expected at least 2")]
    InsufficientLines(usize),
    #[error("invalid df output format: got {0} columns, expected at least 5")]
    InsufficientColumns(usize),
    #[error("invalid numeric value for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("filesystem reports a total size of zero")]
    ZeroTotal,
    #[error("used blocks ({used}) exceed total ({total})")]
    UsedExceedsTotal { used: u64, total: u64 },
    #[error("{field} of {kib} KiB does not fit in a byte count")]
    OutOfRange { field: &'static str, kib: u64 },
    #[error("no valid disk information found")]
    NoValidRow,
}

/// Parse the table printed by `df -kP`.
///
/// The second line must hold filesystem, total, used, available and use%
/// columns. Block counts are KiB; the percentage is kept as the tool
/// rounded it. `free` is derived as `total - used` so the snapshot always
/// balances.
pub fn parse_df_output(stdout: &str) -> Result<DiskSnapshot, DiskError> {
    let lines: Vec<&str> = stdout.trim().lines().collect();
    if lines.len() < 2 {
        return Err(DiskError::InsufficientLines(lines.len()));
    }

    let columns: Vec<&str> = lines[1].split_whitespace().collect();
    if columns.len() < 5 {
        return Err(DiskError::InsufficientColumns(columns.len()));
    }

    let total_kib = parse_integer("total", columns[1])?;
    let used_kib = parse_integer("used", columns[2])?;
    let _available_kib = parse_integer("available", columns[3])?;
    let used_percentage = parse_integer("use%", columns[4].trim_end_matches('%'))?;

    if total_kib == 0 {
        return Err(DiskError::ZeroTotal);
    }
    if used_kib > total_kib {
        return Err(DiskError::UsedExceedsTotal { used: used_kib, total: total_kib });
    }

    let total = kib_to_bytes("total", total_kib)?;
    let used = kib_to_bytes("used", used_kib)?;

    Ok(DiskSnapshot {
        total,
        free: total - used,
        used,
        used_percentage: used_percentage as f64,
    })
}

/// Parse `wmic logicaldisk get size,freespace,caption` output.
///
/// Rows are `caption freeSpace size` in bytes. The first row with both
/// numbers present, parseable and a non-zero size wins.
pub fn parse_wmic_output(stdout: &str) -> Result<DiskSnapshot, DiskError> {
    for line in stdout.trim().lines().skip(1) {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() < 3 {
            continue;
        }

        let (Ok(free), Ok(size)) = (columns[1].parse::<u64>(), columns[2].parse::<u64>()) else {
            debug!("Skipping wmic row with non-numeric sizes: {}", line.trim());
            continue;
        };
        if size == 0 || free > size {
            continue;
        }

        let used = size - free;
        return Ok(DiskSnapshot {
            total: size,
            free,
            used,
            used_percentage: used as f64 / size as f64 * 100.0,
        });
    }

    Err(DiskError::NoValidRow)
}

/// Dispatch to the parser for `platform`
pub fn parse_disk_output(platform: Platform, stdout: &str) -> Result<DiskSnapshot, DiskError> {
    match platform {
        Platform::Posix => parse_df_output(stdout),
        Platform::Windows => parse_wmic_output(stdout),
    }
}

fn parse_integer(field: &'static str, value: &str) -> Result<u64, DiskError> {
    value.parse::<u64>().map_err(|_| DiskError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn kib_to_bytes(field: &'static str, kib: u64) -> Result<u64, DiskError> {
    kib.checked_mul(1024).ok_or(DiskError::OutOfRange { field, kib })
}

/// Reads disk usage for a path by running the platform command
#[derive(Clone)]
pub struct DiskInfoProbe {
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
}

impl DiskInfoProbe {
    pub fn new(platform: Platform, runner: Arc<dyn CommandRunner>) -> Self {
        Self { platform, runner }
    }

    /// Probe for the running host
    pub fn system() -> Self {
        Self::new(Platform::current(), Arc::new(SystemCommandRunner::new()))
    }

    /// Disk usage for `path`, or the all-zero sentinel on any failure
    pub async fn get_disk_info(&self, path: &str) -> DiskSnapshot {
        match self.try_get_disk_info(path).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(path = %path, error = %e, "Error getting disk info");
                DiskSnapshot::unavailable()
            }
        }
    }

    async fn try_get_disk_info(&self, path: &str) -> Result<DiskSnapshot, DiskError> {
        let output = match self.platform {
            Platform::Posix => self.runner.run("df", &["-kP", path]).await,
            Platform::Windows => {
                self.runner
                    .run("wmic", &["logicaldisk", "get", "size,freespace,caption"])
                    .await
            }
        }
        .map_err(|e| DiskError::Command(format!("{:#}", e)))?;

        parse_disk_output(self.platform, &output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::CommandOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const DF_ROOT: &str = "Filesystem     1024-blocks      Used Available Capacity Mounted on
/dev/sda1        244277768 187088784  44604220      81% /";

    const WMIC: &str = "Caption  FreeSpace    Size
C:       104074125312 499037585408";

    /// Replays canned stdout and records invocations
    struct CannedRunner {
        stdout: Result<String, String>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl CannedRunner {
        fn ok(stdout: &str) -> Arc<Self> {
            Arc::new(Self { stdout: Ok(stdout.to_string()), calls: Mutex::new(Vec::new()) })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self { stdout: Err(message.to_string()), calls: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl CommandRunner for CannedRunner {
        async fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.iter().map(|a| a.to_string()).collect()));
            match &self.stdout {
                Ok(stdout) => Ok(CommandOutput { stdout: stdout.clone() }),
                Err(message) => Err(anyhow::anyhow!(message.clone())),
            }
        }
    }

    #[test]
    fn test_df_parsing() {
        let disk = parse_df_output(DF_ROOT).unwrap();
        assert_eq!(disk.total, 244277768 * 1024);
        assert_eq!(disk.used, 187088784 * 1024);
        assert_eq!(disk.used + disk.free, disk.total);
        assert_eq!(disk.used_percentage, 81.0);
    }

    #[test]
    fn test_df_percentage_taken_verbatim() {
        // 50/200 would be 25%; the tool's value wins
        let out =
            "Filesystem 1K-blocks Used Available Use% Mounted on\n/dev/sdb1 200 50 150 26% /home";
        assert_eq!(parse_df_output(out).unwrap().used_percentage, 26.0);

        let no_sign = "Filesystem 1K-blocks Used Available Use%\n/dev/sdb1 200 50 150 26";
        assert_eq!(parse_df_output(no_sign).unwrap().used_percentage, 26.0);
    }

    #[test]
    fn test_df_rejects_short_or_malformed_output() {
        assert!(matches!(parse_df_output(""), Err(DiskError::InsufficientLines(_))));
        assert!(matches!(
            parse_df_output("Filesystem 1K-blocks Used Available Use% Mounted on"),
            Err(DiskError::InsufficientLines(1))
        ));
        assert!(matches!(
            parse_df_output("Filesystem 1K-blocks Used\n/dev/sda1 100 50 50"),
            Err(DiskError::InsufficientColumns(4))
        ));
        assert!(matches!(
            parse_df_output("Filesystem 1K-blocks Used Available Use%\n/dev/sda1 abc 50 50 50%"),
            Err(DiskError::InvalidNumber { field: "total", .. })
        ));
        assert!(matches!(
            parse_df_output("Filesystem 1K-blocks Used Available Use%\n/dev/sda1 100 50 - 50%"),
            Err(DiskError::InvalidNumber { field: "available", .. })
        ));
        assert!(matches!(
            parse_df_output("Filesystem 1K-blocks Used Available Use%\n/dev/sda1 100 150 0 100%"),
            Err(DiskError::UsedExceedsTotal { used: 150, total: 100 })
        ));
        assert!(matches!(
            parse_df_output("Filesystem 1K-blocks Used Available Use%\n/dev/sda1 100 50 50 n/a"),
            Err(DiskError::InvalidNumber { field: "use%", .. })
        ));
    }

    #[test]
    fn test_df_block_counts_too_large_for_bytes() {
        let huge_total = "Filesystem 1K-blocks Used Available Use% Mounted on\n\
                          /dev/sda1 18014398509481984 10 10 1% /";
        assert!(matches!(
            parse_df_output(huge_total),
            Err(DiskError::OutOfRange { field: "total", .. })
        ));

        let max = u64::MAX;
        let huge_both =
            format!("Filesystem 1K-blocks Used Available Use%\n/dev/sda1 {max} {max} 0 100%");
        assert!(parse_df_output(&huge_both).is_err());
    }

    #[test]
    fn test_df_zero_total_is_invalid() {
        let out = "Filesystem 1K-blocks Used Available Use% Mounted on\n/dev/sda1 0 0 0 0% /";
        assert!(matches!(parse_df_output(out), Err(DiskError::ZeroTotal)));
    }

    #[test]
    fn test_wmic_parsing() {
        let disk = parse_wmic_output(WMIC).unwrap();
        assert_eq!(disk.total, 499037585408);
        assert_eq!(disk.free, 104074125312);
        assert_eq!(disk.used, 394963460096);
        assert_eq!(disk.used_percentage, 394963460096f64 / 499037585408f64 * 100.0);
        assert!((disk.used_percentage - 79.1447966780).abs() < 1e-6);
    }

    #[test]
    fn test_wmic_skips_unusable_rows() {
        let out = "Caption  FreeSpace    Size\r\r\nA:\r\r\n\
                   D:  invalid  notanumber\r\r\nE:  0  0\r\r\nF:  1000  4000\r\r\n";
        let disk = parse_wmic_output(out).unwrap();
        assert_eq!(disk.total, 4000);
        assert_eq!(disk.used, 3000);
        assert_eq!(disk.used_percentage, 75.0);
    }

    #[test]
    fn test_wmic_without_valid_rows() {
        assert!(matches!(parse_wmic_output(""), Err(DiskError::NoValidRow)));
        assert!(matches!(parse_wmic_output("Invalid Output"), Err(DiskError::NoValidRow)));
        assert!(matches!(
            parse_wmic_output("\nCaption  FreeSpace    Size\nC:      invalid     notanumber\n"),
            Err(DiskError::NoValidRow)
        ));
    }

    #[tokio::test]
    async fn test_probe_runs_df_against_path() {
        let runner = CannedRunner::ok(DF_ROOT);
        let probe = DiskInfoProbe::new(Platform::Posix, runner.clone());

        let disk = probe.get_disk_info("/home").await;
        assert_eq!(disk.used_percentage, 81.0);

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].0, "df");
        assert_eq!(calls[0].1, vec!["-kP".to_string(), "/home".to_string()]);
    }

    #[tokio::test]
    async fn test_probe_runs_wmic_on_windows() {
        let runner = CannedRunner::ok(WMIC);
        let probe = DiskInfoProbe::new(Platform::Windows, runner.clone());

        let disk = probe.get_disk_info("/").await;
        assert_eq!(disk.total, 499037585408);
        assert_eq!(runner.calls.lock().unwrap()[0].0, "wmic");
    }

    #[tokio::test]
    async fn test_probe_failures_yield_sentinel() {
        let failing = DiskInfoProbe::new(Platform::Posix, CannedRunner::failing("Command failed"));
        assert!(failing.get_disk_info("/").await.is_unavailable());

        let garbage = DiskInfoProbe::new(Platform::Posix, CannedRunner::ok("Invalid Output"));
        assert!(garbage.get_disk_info("/").await.is_unavailable());

        let windows = DiskInfoProbe::new(Platform::Windows, CannedRunner::ok(""));
        assert!(windows.get_disk_info("/").await.is_unavailable());

        let oversized_df = "Filesystem 1K-blocks Used Available Use%\n\
                            /dev/sda1 18014398509481984 10 10 1%";
        let oversized = DiskInfoProbe::new(Platform::Posix, CannedRunner::ok(oversized_df));
        assert!(oversized.get_disk_info("/").await.is_unavailable());
    }
}
