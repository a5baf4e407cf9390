//! Test configuration helpers: a scratch folder layout with fast timings

use debridarr::Config;
use debridarr::config::{CatalogConfig, PersistenceConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Scratch folder layout for one test
pub struct Layout {
    /// Keeps the directory alive for the test's duration
    pub dir: TempDir,
}

impl Layout {
    /// Create an empty layout
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Root of the descriptor folders
    pub fn torrents(&self) -> PathBuf {
        self.dir.path().join("torrents")
    }

    /// Root of the delivery folders
    pub fn downloads(&self) -> PathBuf {
        self.dir.path().join("downloads")
    }

    /// Root of the arrival tree
    pub fn sync(&self) -> PathBuf {
        self.dir.path().join("sync")
    }

    /// Database file
    pub fn database(&self) -> PathBuf {
        self.dir.path().join("debridarr.db")
    }

    /// Configuration with Radarr and Sonarr enabled and sub-second timings
    pub fn config(&self) -> Config {
        let catalog = CatalogConfig {
            enabled: true,
            url: "http://127.0.0.1:1".to_string(),
            api_key: "test".to_string(),
            history_page_size: 50,
        };

        let mut config = Config::default();
        config.paths.descriptor_root = self.torrents();
        config.paths.download_root = self.downloads();
        config.paths.arrival_root = self.sync();
        config.catalogs.sonarr = catalog.clone();
        config.catalogs.radarr = catalog;
        config.acquisition.api_token = "test".to_string();
        config.acquisition.poll_interval = Duration::from_millis(20);
        config.reconcile.idle_delay = Duration::from_millis(50);
        config.reconcile.snapshot_interval = Duration::from_millis(200);
        config.transfer.retry_delay = Duration::from_millis(10);
        config.intake.delete_delay = Duration::from_millis(10);
        config.intake.settle_delay = Duration::from_millis(10);
        config.persistence = PersistenceConfig {
            database_path: self.database(),
        };
        config
    }

    /// Write a magnet descriptor into a category folder
    pub fn write_magnet(&self, category: &str, name: &str) -> PathBuf {
        let folder = self.torrents().join(category);
        std::fs::create_dir_all(&folder).unwrap();
        let path = folder.join(name);
        std::fs::write(
            &path,
            "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=test",
        )
        .unwrap();
        path
    }

    /// Place a file in the arrival tree in one step
    ///
    /// The content is written next to the tree and renamed in, so the worker
    /// never sees a partial file.
    pub fn arrive(&self, relative: impl AsRef<Path>, content: &[u8]) -> PathBuf {
        let dest = self.sync().join(relative);
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        let staging = self.dir.path().join(".staging");
        std::fs::write(&staging, content).unwrap();
        std::fs::rename(&staging, &dest).unwrap();
        dest
    }
}
