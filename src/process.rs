use std::{ffi::OsString, process::Stdio, time::Duration};

use tokio::process::Command;
use tracing::{event, Level};

use crate::error::ProcessError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the child was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs `program` to completion and collects its output. When `timeout` is
/// set and expires the child is killed.
pub async fn run(
    program: &str,
    args: &[OsString],
    timeout: Option<Duration>,
) -> Result<CommandOutput, ProcessError> {
    event!(
        Level::DEBUG,
        cmd = %shell_words::join(
            std::iter::once(program.to_owned())
                .chain(args.iter().map(|arg| arg.to_string_lossy().into_owned()))
        ),
        "EXEC"
    );

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match timeout {
        Some(after) => tokio::time::timeout(after, output)
            .await
            .map_err(|_| ProcessError::Timeout {
                program: program.to_owned(),
                after,
            })?,
        None => output.await,
    }
    .map_err(|source| ProcessError::Spawn {
        program: program.to_owned(),
        source,
    })?;

    let output = CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    event!(Level::DEBUG, status = ?output.status, stdout = %output.stdout.trim_end(), "EXIT");
    Ok(output)
}
