//! Configuration for TallyDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a TallyDB instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for everything TallyDB owns
    /// Internal structure:
    ///   {root_dir}/
    ///     ├── settings.props   (property store: id counters, retention)
    ///     ├── data/            (live dataset, one subdirectory per table)
    ///     └── backups/         (one subdirectory per backed up version)
    pub root_dir: PathBuf,

    /// Max records held by a single partition file
    pub max_partition_size: usize,

    // -------------------------------------------------------------------------
    // Integrity Configuration
    // -------------------------------------------------------------------------
    /// How the integrity test decides whether to recompute a checksum
    pub integrity_mode: IntegrityMode,

    // -------------------------------------------------------------------------
    // Backup Configuration
    // -------------------------------------------------------------------------
    /// Number of backup versions kept when the property store has no override
    pub backup_retention: usize,
}

/// Checksum policy for `Local::data_integrity_test`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityMode {
    /// Skip the checksum when the file timestamp matches the manifest.
    /// Compatible with existing manifests, blind to in-place edits that
    /// preserve the timestamp and length.
    #[default]
    TrustTimestamps,

    /// Recompute every checksum on every check
    AlwaysChecksum,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./tally_data"),
            max_partition_size: 512,
            integrity_mode: IntegrityMode::TrustTimestamps,
            backup_retention: 10,
        }
    }
}

impl Config {
    const DATASET_DIR: &'static str = "data";
    const BACKUP_DIR: &'static str = "backups";
    const PROPERTIES_FILE: &'static str = "settings.props";

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Directory holding the live dataset
    pub fn dataset_dir(&self) -> PathBuf {
        self.root_dir.join(Self::DATASET_DIR)
    }

    /// Directory holding version-named backup snapshots
    pub fn backup_dir(&self) -> PathBuf {
        self.root_dir.join(Self::BACKUP_DIR)
    }

    /// File backing the property store
    pub fn properties_path(&self) -> PathBuf {
        self.root_dir.join(Self::PROPERTIES_FILE)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the root directory
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root_dir = path.into();
        self
    }

    /// Set the maximum number of records per partition
    pub fn max_partition_size(mut self, size: usize) -> Self {
        self.config.max_partition_size = size;
        self
    }

    /// Set the integrity check mode
    pub fn integrity_mode(mut self, mode: IntegrityMode) -> Self {
        self.config.integrity_mode = mode;
        self
    }

    /// Set the default backup retention length
    pub fn backup_retention(mut self, count: usize) -> Self {
        self.config.backup_retention = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
