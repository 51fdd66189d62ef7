use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use glob::Pattern;
use tracing::{event, Level};
use walkdir::WalkDir;

use crate::{epoch_to_system_time, error::DiscoveryError, process, DEB_PATTERN};

#[allow(async_fn_in_trait)]
pub trait FileDiscoverer {
    /// Package files under `directory`. With `since`, only the ones modified
    /// strictly after that unix second.
    async fn discover(
        &self,
        directory: &Path,
        since: Option<i64>,
    ) -> Result<Vec<PathBuf>, DiscoveryError>;
}

/// Runs `find <dir> -type f -name '*.deb' [-newermt @<since>]`.
#[derive(Debug, Clone)]
pub struct FindDiscoverer {
    program: String,
    timeout: Option<Duration>,
}

impl Default for FindDiscoverer {
    fn default() -> Self {
        Self::new("find")
    }
}

impl FindDiscoverer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn args(directory: &Path, since: Option<i64>) -> Vec<OsString> {
        let mut args = vec![
            directory.as_os_str().to_owned(),
            OsString::from("-type"),
            OsString::from("f"),
            OsString::from("-name"),
            OsString::from(DEB_PATTERN),
        ];

        if let Some(since) = since {
            args.push(OsString::from("-newermt"));
            args.push(OsString::from(format!("@{since}")));
        }

        args
    }
}

impl FileDiscoverer for FindDiscoverer {
    /// A non-zero exit still yields whatever `find` printed: the apt cache
    /// usually holds a `partial/` directory the user cannot read, and that
    /// must not hide every other package.
    async fn discover(
        &self,
        directory: &Path,
        since: Option<i64>,
    ) -> Result<Vec<PathBuf>, DiscoveryError> {
        let output =
            process::run(&self.program, &Self::args(directory, since), self.timeout).await?;

        if !output.success() {
            event!(Level::ERROR, status = ?output.status, "shell cmd failed");
            event!(Level::ERROR, stderr = %output.stderr.trim_end(), "error msg");
        }

        Ok(output
            .stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}

/// In-process walk of the directory tree, sorted by file name.
#[derive(Debug, Clone)]
pub struct WalkDiscoverer {
    pattern: String,
}

impl Default for WalkDiscoverer {
    fn default() -> Self {
        Self {
            pattern: DEB_PATTERN.to_owned(),
        }
    }
}

impl WalkDiscoverer {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl FileDiscoverer for WalkDiscoverer {
    async fn discover(
        &self,
        directory: &Path,
        since: Option<i64>,
    ) -> Result<Vec<PathBuf>, DiscoveryError> {
        let pattern = Pattern::new(&self.pattern)?;
        let since = since.map(epoch_to_system_time);
        let mut files = vec![];

        for entry in WalkDir::new(directory).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    event!(Level::WARN, %error, "skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let Some(name) = entry.file_name().to_str() else {
                continue;
            };

            if !pattern.matches(name) {
                continue;
            }

            if let Some(since) = since {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|metadata| metadata.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);

                if modified <= since {
                    continue;
                }
            }

            files.push(entry.into_path());
        }

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::discover::FindDiscoverer;

    #[test]
    fn test_find_args() {
        let args = |since| {
            FindDiscoverer::args(Path::new("/var/cache/apt/archives"), since)
                .into_iter()
                .map(|arg| arg.into_string().unwrap())
                .collect::<Vec<_>>()
        };

        assert_eq!(
            args(None),
            ["/var/cache/apt/archives", "-type", "f", "-name", "*.deb"]
        );
        assert_eq!(
            args(Some(1_700_000_000)),
            [
                "/var/cache/apt/archives",
                "-type",
                "f",
                "-name",
                "*.deb",
                "-newermt",
                "@1700000000"
            ]
        );
    }
}
