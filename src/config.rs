use std::{
    fmt,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use tracing::{event, level_filters::LevelFilter, Level};
use uuid::Uuid;

use crate::{error::ConfigError, parser::IniDocument, transfer::Destination};

pub const SETTINGS_SECTION: &str = "SYNC_SETTINGS";
pub const STATE_SECTION: &str = "SYNC_STATE";

const LOG_LEVEL: &str = "LogLevel";
const REMOTE_HOST: &str = "RemoteHost";
const REMOTE_USER: &str = "RemoteUser";
const REMOTE_LOCATION: &str = "RemoteLocation";
const LOCAL_ARCHIVE_DIR: &str = "LocalArchiveDir";
const LAST_MODIFIED: &str = "LastModified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warning => LevelFilter::WARN,
            Self::Error => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            _ => Err(ConfigError::InvalidLogLevel(s.to_owned())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub log_level: LogLevel,
    pub remote_host: String,
    pub remote_user: String,
    pub remote_location: String,
    pub local_archive_dir: PathBuf,
}

/// Placeholders written to a freshly created config. They are never used for a
/// sync: creating the file always ends the run.
impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            remote_host: String::from("192.168.1.100"),
            remote_user: String::from("user"),
            remote_location: String::from("/opt/apt-mirror/raspbian/stretch"),
            local_archive_dir: PathBuf::from("/var/cache/apt/archives"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Configuration {
    pub settings: SyncSettings,
    /// Unix seconds of the last fully transferred batch, `None` before the first one.
    pub last_modified: Option<i64>,
}

impl Configuration {
    pub fn destination(&self) -> Destination {
        Destination {
            user: self.settings.remote_user.clone(),
            host: self.settings.remote_host.clone(),
            location: self.settings.remote_location.clone(),
        }
    }

    fn to_document(&self) -> IniDocument {
        let settings = &self.settings;
        let mut document = IniDocument::new();
        document.set(SETTINGS_SECTION, LOG_LEVEL, settings.log_level.to_string());
        document.set(SETTINGS_SECTION, REMOTE_HOST, settings.remote_host.as_str());
        document.set(SETTINGS_SECTION, REMOTE_USER, settings.remote_user.as_str());
        document.set(SETTINGS_SECTION, REMOTE_LOCATION, settings.remote_location.as_str());
        document.set(
            SETTINGS_SECTION,
            LOCAL_ARCHIVE_DIR,
            settings.local_archive_dir.to_string_lossy(),
        );
        document.set(
            STATE_SECTION,
            LAST_MODIFIED,
            self.last_modified.map(|t| t.to_string()).unwrap_or_default(),
        );
        document
    }
}

fn required<'a>(
    document: &'a IniDocument,
    section: &'static str,
    key: &'static str,
) -> Result<&'a str, ConfigError> {
    match document.get(section, key) {
        None => Err(ConfigError::MissingKey { section, key }),
        Some("") => Err(ConfigError::EmptyValue { section, key }),
        Some(value) => {
            event!(Level::INFO, "{key} set to {value}");
            Ok(value)
        }
    }
}

/// The on-disk config together with the path it was loaded from.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Configuration,
}

impl ConfigStore {
    /// Loads `<home>/<config_dir>/<config_file>`, creating the directory when
    /// needed. A missing file is replaced by a template and reported as
    /// [`ConfigError::Bootstrapped`], which callers must treat as fatal.
    #[tracing::instrument(skip_all)]
    pub fn setup(home: &Path, config_dir: &str, config_file: &str) -> Result<Self, ConfigError> {
        let dir = home.join(config_dir);
        let path = dir.join(config_file);

        let result = Self::setup_at(&dir, &path);
        if let Err(ref error) = result {
            event!(Level::ERROR, ?path, %error, "CONFIG");
        }

        result
    }

    fn setup_at(dir: &Path, path: &Path) -> Result<Self, ConfigError> {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        if path.exists() {
            return Ok(Self {
                config: Self::read(path)?,
                path: path.to_path_buf(),
            });
        }

        Self::create(path, &SyncSettings::default(), None)?;
        Err(ConfigError::Bootstrapped(path.to_path_buf()))
    }

    pub fn read(path: &Path) -> Result<Configuration, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let document = IniDocument::parse(&content).map_err(|source| ConfigError::Syntax {
            path: path.to_path_buf(),
            source,
        })?;

        let log_level = match document.get(SETTINGS_SECTION, LOG_LEVEL) {
            Some(value) if !value.is_empty() => {
                let level = value.parse()?;
                event!(Level::INFO, "{LOG_LEVEL} set to {level}");
                level
            }
            _ => {
                let level = LogLevel::default();
                event!(Level::WARN, "{LOG_LEVEL} is not set, defaulting to {level}");
                level
            }
        };

        let settings = SyncSettings {
            log_level,
            remote_host: required(&document, SETTINGS_SECTION, REMOTE_HOST)?.to_owned(),
            remote_user: required(&document, SETTINGS_SECTION, REMOTE_USER)?.to_owned(),
            remote_location: required(&document, SETTINGS_SECTION, REMOTE_LOCATION)?.to_owned(),
            local_archive_dir: PathBuf::from(required(
                &document,
                SETTINGS_SECTION,
                LOCAL_ARCHIVE_DIR,
            )?),
        };

        let last_modified = match document.get(STATE_SECTION, LAST_MODIFIED) {
            None => {
                return Err(ConfigError::MissingKey {
                    section: STATE_SECTION,
                    key: LAST_MODIFIED,
                })
            }
            Some("") => None,
            Some(value) => {
                let timestamp =
                    value
                        .parse::<i64>()
                        .map_err(|source| ConfigError::InvalidTimestamp {
                            value: value.to_owned(),
                            source,
                        })?;
                event!(Level::INFO, "{LAST_MODIFIED} set to {timestamp}");
                Some(timestamp)
            }
        };

        Ok(Configuration {
            settings,
            last_modified,
        })
    }

    /// Writes the whole document. The new content goes to a sibling temporary
    /// file first, is flushed to disk and renamed over `path`, so readers see
    /// the old or the new document and never a truncated one. An existing
    /// file keeps its permissions.
    pub fn create(
        path: &Path,
        settings: &SyncSettings,
        last_modified: Option<i64>,
    ) -> Result<(), ConfigError> {
        let config = Configuration {
            settings: settings.clone(),
            last_modified,
        };

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = path.with_file_name(format!(".{file_name}.{}", Uuid::new_v4()));

        let written = replace_file(path, &tmp_path, &config.to_document().to_string());
        if let Err(source) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }

        match last_modified {
            None => event!(
                Level::WARN,
                ?path,
                "created new config file, edit it with the correct settings"
            ),
            Some(timestamp) => event!(Level::INFO, timestamp, "updated LastModified"),
        }

        Ok(())
    }

    /// Persists a new sync watermark. Only call once every file of the batch
    /// made it to the remote.
    pub fn update_last_modified(&mut self, timestamp: i64) -> Result<(), ConfigError> {
        Self::create(&self.path, &self.config.settings, Some(timestamp))?;
        self.config.last_modified = Some(timestamp);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }
}

fn replace_file(path: &Path, tmp_path: &Path, content: &str) -> io::Result<()> {
    let mut file = File::create(tmp_path)?;
    file.write_all(content.as_bytes())?;
    if let Ok(metadata) = fs::metadata(path) {
        file.set_permissions(metadata.permissions())?;
    }
    file.sync_all()?;
    drop(file);

    fs::rename(tmp_path, path)
}
