//! Operator supplied shell commands, run before publishing or bundling.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{DeployError, Result};

fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: Option<R>, command: &str, stderr: bool) {
    let Some(reader) = reader else { return };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if stderr {
            warn!(command = %command, "{line}");
        } else {
            info!(command = %command, "{line}");
        }
    }
}

/// run `command` through the platform shell in `work_dir`, streaming its output into the log.
pub async fn run_command(command: &str, work_dir: &Path) -> Result<()> {
    let failed = |message: String| DeployError::Command { command: command.to_string(), message };
    info!(command = %command, dir = %work_dir.display(), "Running command");
    let mut child = shell(command)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| failed(format!("failed to start: {e}")))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (_, _, status) = tokio::join!(
        forward_lines(stdout, command, false),
        forward_lines(stderr, command, true),
        child.wait(),
    );
    let status = status.map_err(|e| failed(e.to_string()))?;
    if !status.success() {
        return Err(failed(match status.code() {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        }));
    }
    Ok(())
}
