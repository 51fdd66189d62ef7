use std::{ffi::OsString, fmt, path::PathBuf, time::Duration};

use tracing::{event, Level};

use crate::process;

/// Status reported when the transfer program could not be run at all.
pub const STATUS_NOT_RUN: i32 = -1;

/// `user@host:location`, the remote end of a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub user: String,
    pub host: String,
    pub location: String,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.location)
    }
}

#[allow(async_fn_in_trait)]
pub trait FileTransferer {
    /// Copies the whole batch in one go and returns the exit status, `0` on
    /// success. Never called with an empty batch.
    async fn transfer(&self, paths: &[PathBuf], destination: &Destination) -> i32;
}

/// Hands the batch to an external `scp`.
#[derive(Debug, Clone)]
pub struct ScpTransferer {
    program: String,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
}

impl Default for ScpTransferer {
    fn default() -> Self {
        Self::new("scp")
    }
}

impl ScpTransferer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
            timeout: None,
        }
    }

    /// Options placed before the file list, e.g. `-P 2222`.
    pub fn extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn args(&self, paths: &[PathBuf], destination: &Destination) -> Vec<OsString> {
        self.extra_args
            .iter()
            .map(OsString::from)
            .chain(paths.iter().map(|path| path.as_os_str().to_owned()))
            .chain(std::iter::once(OsString::from(destination.to_string())))
            .collect()
    }
}

impl FileTransferer for ScpTransferer {
    #[tracing::instrument(skip_all, fields(files = paths.len(), destination = %destination))]
    async fn transfer(&self, paths: &[PathBuf], destination: &Destination) -> i32 {
        let output = match process::run(
            &self.program,
            &self.args(paths, destination),
            self.timeout,
        )
        .await
        {
            Ok(output) => output,
            Err(error) => {
                event!(Level::ERROR, %error, "transfer failed");
                return STATUS_NOT_RUN;
            }
        };

        let status = output.status.unwrap_or(STATUS_NOT_RUN);
        if status != 0 {
            event!(Level::ERROR, status, "shell cmd failed");
            event!(Level::ERROR, stderr = %output.stderr.trim_end(), "error msg");
        }

        status
    }
}
