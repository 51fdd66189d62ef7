//! End-to-end runs against a temporary apt cache with known modification times.

use std::{
    fs,
    path::{Path, PathBuf},
};

use debsynclib::{
    config::{ConfigStore, SyncSettings},
    discover::{FileDiscoverer, FindDiscoverer, WalkDiscoverer},
    error::ConfigError,
    sync::{SyncOrchestrator, SyncOutcome},
    transfer::ScpTransferer,
    CONFIG_DIR, CONFIG_FILE,
};
use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

const SINCE: i64 = 1_700_000_000;

struct TestEnv {
    home: TempDir,
    archives: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let home = TempDir::new().expect("Failed to create temp dir");
        let archives = home.path().join("archives");
        fs::create_dir_all(archives.join("partial")).expect("Failed to create archives");

        Self { home, archives }
    }

    fn write_file(&self, name: &str, mtime: i64) -> PathBuf {
        let path = self.archives.join(name);
        fs::write(&path, name).expect("Failed to write file");
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).expect("Failed to set mtime");
        path
    }

    /// old.deb, edge.deb (exactly at SINCE), new.deb, partial/nested.deb and a
    /// non-package file.
    fn populate(&self) -> Vec<PathBuf> {
        self.write_file("old.deb", SINCE - 100_000_000);
        self.write_file("edge.deb", SINCE);
        self.write_file("lock", SINCE + 50);
        let new = self.write_file("new.deb", SINCE + 1);
        let nested = self.write_file("partial/nested.deb", SINCE + 60);
        self.set_archive_mtime(SINCE + 100);

        vec![new, nested]
    }

    fn set_archive_mtime(&self, mtime: i64) {
        set_file_mtime(&self.archives, FileTime::from_unix_time(mtime, 0))
            .expect("Failed to set directory mtime");
    }

    fn write_config(&self, last_modified: Option<i64>) -> PathBuf {
        let dir = self.home.path().join(CONFIG_DIR);
        fs::create_dir_all(&dir).expect("Failed to create config dir");
        let path = dir.join(CONFIG_FILE);

        let settings = SyncSettings {
            remote_host: String::from("mirror.lan"),
            remote_user: String::from("pi"),
            remote_location: String::from("/srv/mirror"),
            local_archive_dir: self.archives.clone(),
            ..SyncSettings::default()
        };
        ConfigStore::create(&path, &settings, last_modified).expect("Failed to write config");
        path
    }

    fn store(&self) -> ConfigStore {
        ConfigStore::setup(self.home.path(), CONFIG_DIR, CONFIG_FILE)
            .expect("Failed to load config")
    }
}

async fn discovered(
    discoverer: &impl FileDiscoverer,
    dir: &Path,
    since: Option<i64>,
) -> Vec<PathBuf> {
    let mut files = discoverer.discover(dir, since).await.unwrap();
    files.sort();
    files
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_walk_filters_strictly_newer() {
    let env = TestEnv::new();
    let mut expected = env.populate();
    expected.sort();

    assert_eq!(
        discovered(&WalkDiscoverer::default(), &env.archives, Some(SINCE)).await,
        expected
    );
}

#[tokio::test]
async fn test_walk_without_since_returns_every_package() {
    let env = TestEnv::new();
    env.populate();

    let files = discovered(&WalkDiscoverer::default(), &env.archives, None).await;
    assert_eq!(files.len(), 4);
    assert!(files.iter().all(|file| file.extension().unwrap() == "deb"));
}

#[tokio::test]
async fn test_find_filters_strictly_newer() {
    let env = TestEnv::new();
    let mut expected = env.populate();
    expected.sort();

    assert_eq!(
        discovered(&FindDiscoverer::default(), &env.archives, Some(SINCE)).await,
        expected
    );
}

#[tokio::test]
async fn test_find_without_since_returns_every_package() {
    let env = TestEnv::new();
    env.populate();

    assert_eq!(
        discovered(&FindDiscoverer::default(), &env.archives, None).await,
        discovered(&WalkDiscoverer::default(), &env.archives, None).await
    );
}

#[tokio::test]
async fn test_find_on_missing_directory_finds_nothing() {
    let env = TestEnv::new();

    assert!(discovered(&FindDiscoverer::default(), &env.archives.join("gone"), None)
        .await
        .is_empty());
}

// ============================================================================
// Full runs
// ============================================================================

#[test]
fn test_first_run_only_writes_template() {
    let env = TestEnv::new();

    let error = ConfigStore::setup(env.home.path(), CONFIG_DIR, CONFIG_FILE).unwrap_err();
    assert!(matches!(error, ConfigError::Bootstrapped(_)));

    let written = fs::read_to_string(env.home.path().join(CONFIG_DIR).join(CONFIG_FILE)).unwrap();
    assert!(written.contains("RemoteHost = 192.168.1.100"));
    assert!(written.trim_end().ends_with("LastModified ="));
}

#[tokio::test]
async fn test_successful_run_then_noop() {
    let env = TestEnv::new();
    env.populate();
    let config = env.write_config(Some(SINCE));

    let mut sync = SyncOrchestrator::new(
        env.store(),
        WalkDiscoverer::default(),
        ScpTransferer::new("true"),
    );
    assert_eq!(
        sync.run().await.unwrap(),
        SyncOutcome::Transferred {
            files: 2,
            last_modified: SINCE + 100
        }
    );
    assert_eq!(ConfigStore::read(&config).unwrap().last_modified, Some(SINCE + 100));

    let mut sync = SyncOrchestrator::new(
        env.store(),
        WalkDiscoverer::default(),
        ScpTransferer::new("false"),
    );
    assert_eq!(sync.run().await.unwrap(), SyncOutcome::UpToDate);
    assert_eq!(ConfigStore::read(&config).unwrap().last_modified, Some(SINCE + 100));
}

#[tokio::test]
async fn test_failed_run_is_retried() {
    let env = TestEnv::new();
    env.populate();
    let config = env.write_config(Some(SINCE));

    let mut sync = SyncOrchestrator::new(
        env.store(),
        FindDiscoverer::default(),
        ScpTransferer::new("false"),
    );
    assert_eq!(
        sync.run().await.unwrap(),
        SyncOutcome::Failed { files: 2, status: 1 }
    );
    assert_eq!(ConfigStore::read(&config).unwrap().last_modified, Some(SINCE));

    let mut sync = SyncOrchestrator::new(
        env.store(),
        FindDiscoverer::default(),
        ScpTransferer::new("true"),
    );
    assert!(matches!(
        sync.run().await.unwrap(),
        SyncOutcome::Transferred { files: 2, .. }
    ));
    assert_eq!(ConfigStore::read(&config).unwrap().last_modified, Some(SINCE + 100));
}

#[tokio::test]
async fn test_never_synced_sends_everything() {
    let env = TestEnv::new();
    env.populate();
    let config = env.write_config(None);

    let mut sync = SyncOrchestrator::new(
        env.store(),
        WalkDiscoverer::default(),
        ScpTransferer::new("true"),
    );
    assert!(matches!(
        sync.run().await.unwrap(),
        SyncOutcome::Transferred { files: 4, .. }
    ));
    assert_eq!(ConfigStore::read(&config).unwrap().last_modified, Some(SINCE + 100));
}
