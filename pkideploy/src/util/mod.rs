use crate::params::DeployMode;
use crate::types::Subsystem;
use chrono::{DateTime, Local};
use pkideploy_shared::errors::{DeployError, DeployResult};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// `pki-<subsystem>-<spawn|destroy>.<YYYYMMDDHHMMSS>.log`
pub fn log_file_name(subsystem: Subsystem, mode: DeployMode, at: DateTime<Local>) -> String {
    format!(
        "pki-{}-{}.{}.log",
        subsystem.dir_name(),
        mode.as_str(),
        at.format("%Y%m%d%H%M%S")
    )
}

/// Open this run's log file and install the global subscriber.
///
/// Returns the guard that keeps the background writer alive, and the log
/// file path.
pub fn init_logging(
    log_dir: &Path,
    subsystem: Subsystem,
    mode: DeployMode,
    env_filter: EnvFilter,
) -> DeployResult<(WorkerGuard, PathBuf)> {
    std::fs::create_dir_all(log_dir).map_err(|e| DeployError::fs(log_dir, e))?;
    let name = log_file_name(subsystem, mode, Local::now());
    let path = log_dir.join(&name);

    let file_appender = tracing_appender::rolling::never(log_dir, &name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    register_to_tracing(non_blocking, env_filter);

    Ok((guard, path))
}

pub fn register_to_tracing(non_blocking: NonBlocking, env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_name() {
        let at = Local.with_ymd_and_hms(2026, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(
            log_file_name(Subsystem::Kra, DeployMode::Destroy, at),
            "pki-kra-destroy.20260307090501.log"
        );
    }
}
