//! Git branch detection for checkpoint provenance.
//!
//! Outbound git invocations are bounded: 5000 ms by default, overridden
//! via `GIT_COMMAND_TIMEOUT_MS`.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use mnemo_core::constants::DEFAULT_GIT_TIMEOUT_MS;

fn git_timeout() -> Duration {
    let ms = std::env::var("GIT_COMMAND_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_GIT_TIMEOUT_MS);
    Duration::from_millis(ms)
}

/// The current branch of the repository containing `dir`, or `None`
/// when git is absent, the directory is not a repository, or the call
/// times out. Never an error; branch provenance is best-effort.
pub async fn detect_branch(dir: &Path) -> Option<String> {
    let invocation = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(dir)
        .output();

    let output = match tokio::time::timeout(git_timeout(), invocation).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            debug!(status = ?output.status, "git rev-parse failed");
            return None;
        }
        Ok(Err(e)) => {
            debug!(error = %e, "git invocation failed");
            return None;
        }
        Err(_) => {
            debug!("git invocation timed out");
            return None;
        }
    };

    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if branch.is_empty() {
        None
    } else {
        Some(branch)
    }
}
