use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{CONFIG_DIR, CONFIG_FILE};

/// Prefix of the environment variables mapped onto [`RunOptions`].
pub const ENV_PREFIX: &str = "DEBSYNC_";

#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Discovery {
    /// External `find`
    #[default]
    Find,
    /// Built-in directory walk
    Native,
}

#[derive(Parser, Serialize, Debug, Default)]
#[clap(author, version, about)]
pub struct Args {
    /// Base directory holding the config directory [default: $HOME]
    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,

    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<String>,

    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,

    #[clap(long, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<Discovery>,

    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scp_program: Option<String>,

    /// Extra scp options, shell quoted, e.g. "-P 2222"
    #[clap(long, allow_hyphen_values = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scp_args: Option<String>,

    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub find_program: Option<String>,

    /// Kill find/scp after this many seconds
    #[clap(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Walk through the whole run without copying anything
    #[clap(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,

    /// Exit non-zero when the transfer fails
    #[clap(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub strict: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RunOptions {
    pub home: Option<PathBuf>,
    pub config_dir: String,
    pub config_file: String,
    pub discovery: Discovery,
    pub scp_program: String,
    pub scp_args: String,
    pub find_program: String,
    pub timeout: Option<u64>,
    pub dry_run: bool,
    pub strict: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            home: None,
            config_dir: CONFIG_DIR.to_owned(),
            config_file: CONFIG_FILE.to_owned(),
            discovery: Discovery::default(),
            scp_program: String::from("scp"),
            scp_args: String::new(),
            find_program: String::from("find"),
            timeout: None,
            dry_run: false,
            strict: false,
        }
    }
}

impl RunOptions {
    /// Defaults, then `DEBSYNC_*` variables, then command line flags.
    pub fn figment(args: &Args) -> Figment {
        Figment::from(Serialized::defaults(RunOptions::default()))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(args))
    }

    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        Self::figment(args).extract()
    }

    pub fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone().or_else(dirs::home_dir)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs)
    }

    pub fn scp_args(&self) -> Result<Vec<String>, shell_words::ParseError> {
        shell_words::split(&self.scp_args)
    }
}
