pub mod config;
pub mod discover;
pub mod error;
pub mod logging;
pub mod options;
pub mod parser;
pub mod process;
pub mod sync;
pub mod transfer;

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

pub const CONFIG_DIR: &str = ".sync_tool";
pub const CONFIG_FILE: &str = "sync_tool.ini";

/// Overrides the log level stored in the config file.
pub const LOG_LEVEL_ENV: &str = "LOGLEVEL";

pub const DEB_PATTERN: &str = "*.deb";

/// Whole unix seconds, truncated towards the past.
pub fn system_time_to_epoch(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

/// Falls back to the epoch for seconds chrono cannot represent.
pub fn epoch_to_system_time(seconds: i64) -> SystemTime {
    DateTime::from_timestamp(seconds, 0)
        .map(SystemTime::from)
        .unwrap_or(UNIX_EPOCH)
}
