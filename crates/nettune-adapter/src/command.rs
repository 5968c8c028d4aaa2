//! External command execution
//!
//! All drivers shell out through here so errors carry the command line and
//! stderr, and permission failures are distinguishable from other faults.

use nettune_core::{NettuneError, Result};
use tokio::process::Command;

/// Run a command, returning trimmed stdout. A non-zero exit maps stderr into
/// an adapter error.
pub async fn run(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| {
            NettuneError::adapter(format!("failed to spawn {program}: {e}"))
        })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.contains("Operation not permitted") || stderr.contains("Permission denied") {
            return Err(NettuneError::permission_denied(format!(
                "{program} {} (root required)",
                args.join(" ")
            )));
        }
        Err(NettuneError::adapter(format!(
            "{program} {} exited with {}: {}",
            args.join(" "),
            output.status,
            stderr
        )))
    }
}

/// Run a command where failure is expected and ignorable (e.g. `tc qdisc
/// del` on an interface with no root qdisc). Returns whether it succeeded.
pub async fn run_ignore_failure(program: &str, args: &[&str]) -> bool {
    match Command::new(program).args(args).output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Check whether a tool is available on PATH.
pub async fn available(program: &str) -> bool {
    run_ignore_failure("which", &[program]).await
}
