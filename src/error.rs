use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::parser::ParseIniError;

/// Anything that stops the configuration from being loaded. All of these are
/// fatal: no sync is attempted once one of them shows up.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config `{path}`, {source}")]
    Syntax {
        path: PathBuf,
        #[source]
        source: ParseIniError,
    },

    #[error("missing [{section}] {key}")]
    MissingKey {
        section: &'static str,
        key: &'static str,
    },

    #[error("[{section}] {key} is empty")]
    EmptyValue {
        section: &'static str,
        key: &'static str,
    },

    #[error("LastModified `{value}` is not a unix timestamp")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("unknown log level `{0}`")]
    InvalidLogLevel(String),

    #[error("created template config `{0}`: edit it before the first sync")]
    Bootstrapped(PathBuf),
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` did not finish within {after:?}")]
    Timeout { program: String, after: Duration },
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to read modification time of `{path}`: {source}")]
    ModificationTime {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to persist sync state: {0}")]
    Persist(#[from] ConfigError),
}
