// SPDX-License-Identifier: MIT
//
// Helper-process execution.
//
// The Windows helpers and the CUPS print command are all external
// binaries; their stdout becomes the success detail shown to the caller
// and their stderr the failure detail.

use std::process::Output;

use tokio::process::Command;
use tracing::{debug, warn};

use etikett_core::error::{EtikettError, Result};

/// Captured output of a finished helper process.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run an external command to completion, capturing stdout and stderr.
///
/// A non-zero exit status is an error carrying the trimmed stderr (or the
/// exit status itself when stderr is empty). Spawn failures, such as a
/// missing helper binary, surface the same way.
pub async fn run_command(program: &str, args: &[String]) -> Result<ExecOutput> {
    run_command_env(program, args, &[]).await
}

/// Like [`run_command`], with extra environment variables set on the
/// child. Callers that parse the child's output use this to pin its
/// locale.
pub async fn run_command_env(
    program: &str,
    args: &[String],
    env: &[(&str, &str)],
) -> Result<ExecOutput> {
    debug!(program, ?args, "running print command");

    let mut command = Command::new(program);
    command.args(args);
    for (key, value) in env {
        command.env(key, value);
    }

    let output = command
        .output()
        .await
        .map_err(|e| EtikettError::Exec(format!("spawn {program}: {e}")))?;

    capture_output(program, output)
}

/// Turn raw process output into an `ExecOutput`, failing on non-zero exit.
fn capture_output(program: &str, output: Output) -> Result<ExecOutput> {
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        warn!(program, status = %output.status, stderr = %stderr, "print command failed");
        let detail = if stderr.is_empty() {
            format!("{program} exited with {}", output.status)
        } else {
            stderr
        };
        return Err(EtikettError::Exec(detail));
    }

    debug!(program, stdout_bytes = stdout.len(), "print command succeeded");
    Ok(ExecOutput { stdout, stderr })
}
