use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use tracing::{event, Level};

use crate::{
    config::ConfigStore,
    discover::FileDiscoverer,
    error::SyncError,
    system_time_to_epoch,
    transfer::{Destination, FileTransferer},
};

/// What a run does after comparing the directory mtime with the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Never synced: every package file.
    Full,
    /// Only packages modified after the stored watermark.
    Incremental(i64),
    NoOp,
}

impl ScanMode {
    pub fn decide(directory_mtime: i64, last_modified: Option<i64>) -> Self {
        match last_modified {
            None => Self::Full,
            Some(last) if directory_mtime > last => Self::Incremental(last),
            Some(_) => Self::NoOp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    UpToDate,
    NothingFound,
    Transferred { files: usize, last_modified: i64 },
    /// Files found but not sent; the watermark is left alone.
    DryRun { files: usize },
    Failed { files: usize, status: i32 },
}

impl SyncOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

pub fn get_directory_modification_time(path: &Path) -> io::Result<i64> {
    Ok(system_time_to_epoch(fs::metadata(path)?.modified()?))
}

pub struct SyncOrchestrator<D, T> {
    store: ConfigStore,
    discoverer: D,
    transferer: T,
    dry_run: bool,
}

impl<D: FileDiscoverer, T: FileTransferer> SyncOrchestrator<D, T> {
    pub fn new(store: ConfigStore, discoverer: D, transferer: T) -> Self {
        Self {
            store,
            discoverer,
            transferer,
            dry_run: false,
        }
    }

    /// Lists what would be sent without running the transfer program or
    /// touching the watermark.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Enumeration failures are logged and read as "nothing new": the
    /// watermark stays put, so the next run looks again.
    pub async fn discover_new_files(&self, directory: &Path, since: Option<i64>) -> Vec<PathBuf> {
        match self.discoverer.discover(directory, since).await {
            Ok(files) => {
                event!(Level::INFO, count = files.len(), "num debs");
                files
            }
            Err(error) => {
                event!(Level::ERROR, %error, "file discovery failed");
                vec![]
            }
        }
    }

    pub async fn transfer_files(&self, paths: &[PathBuf], destination: &Destination) -> i32 {
        if self.dry_run {
            event!(Level::INFO, files = paths.len(), %destination, "DRY RUN");
            return 0;
        }

        self.transferer.transfer(paths, destination).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn run(&mut self) -> Result<SyncOutcome, SyncError> {
        let config = self.store.config().clone();
        let directory = &config.settings.local_archive_dir;

        // Captured before the transfer: packages landing while scp runs stay
        // newer than the stored watermark and go out with the next batch.
        let directory_mtime = get_directory_modification_time(directory).map_err(|source| {
            SyncError::ModificationTime {
                path: directory.clone(),
                source,
            }
        })?;

        let local = DateTime::from_timestamp(directory_mtime, 0)
            .map(|utc| utc.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        event!(Level::INFO, mtime = directory_mtime, local = %local, "mod time");

        let files = match ScanMode::decide(directory_mtime, config.last_modified) {
            ScanMode::NoOp => {
                event!(Level::INFO, "no new files");
                return Ok(SyncOutcome::UpToDate);
            }
            ScanMode::Full => self.discover_new_files(directory, None).await,
            ScanMode::Incremental(since) => self.discover_new_files(directory, Some(since)).await,
        };

        if files.is_empty() {
            return Ok(SyncOutcome::NothingFound);
        }

        let status = self.transfer_files(&files, &config.destination()).await;
        if self.dry_run {
            return Ok(SyncOutcome::DryRun { files: files.len() });
        }

        if status != 0 {
            event!(
                Level::ERROR,
                status,
                files = files.len(),
                "batch not transferred, keeping watermark"
            );
            return Ok(SyncOutcome::Failed {
                files: files.len(),
                status,
            });
        }

        self.store.update_last_modified(directory_mtime)?;
        event!(Level::INFO, files = files.len(), "all good");

        Ok(SyncOutcome::Transferred {
            files: files.len(),
            last_modified: directory_mtime,
        })
    }
}
