use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, WifiError};

/// Runs `program args...` to completion and returns its standard output.
///
/// A non-zero exit becomes `WifiError::Transport` carrying stderr (or
/// stdout when stderr is empty).
pub(crate) async fn run(program: &str, args: &[&str]) -> Result<String> {
    debug!("$ {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| WifiError::Transport(format!("Failed to execute {}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let error_msg = if stderr.trim().is_empty() { stdout } else { stderr };
        return Err(WifiError::Transport(format!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            error_msg.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
