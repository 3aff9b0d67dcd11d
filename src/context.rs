//! Application Context
//!
//! The root object owning configuration, settings, the live dataset and
//! the backup manager. Everything the storage core needs is passed from
//! here; there is no global state.

use std::fs;
use std::sync::Arc;

use crate::backup::{BackupManager, RecoveryChoice, RecoveryFlow};
use crate::codec::RecordSerializer;
use crate::config::Config;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::index::{ClusteredIndex, ClusteredIndexWithPk, IdClusteredIndex, PropertyCounter};
use crate::props::{FileProperties, PropertyStore};
use crate::sync::Version;

/// Everything a running application holds open
pub struct AppContext {
    config: Config,
    properties: Arc<FileProperties>,
    dataset: Dataset,
    backups: BackupManager,
}

impl AppContext {
    /// Open or create all state under `config.root_dir`
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.root_dir)?;

        let properties = Arc::new(FileProperties::open(&config.properties_path())?);
        let dataset = Dataset::open(&config.dataset_dir(), config.integrity_mode)?;
        let backups = BackupManager::new(
            &config.backup_dir(),
            Arc::clone(&properties) as Arc<dyn PropertyStore>,
            config.backup_retention,
            config.integrity_mode,
        )?;

        Ok(Self {
            config,
            properties,
            dataset,
            backups,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn properties(&self) -> Arc<dyn PropertyStore> {
        Arc::clone(&self.properties) as Arc<dyn PropertyStore>
    }

    /// The live dataset
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn dataset_mut(&mut self) -> &mut Dataset {
        &mut self.dataset
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Clustered table without a primary key
    pub fn open_table(
        &self,
        name: &str,
        serializer: RecordSerializer,
        sort_key: usize,
    ) -> Result<ClusteredIndex> {
        let storage = self.dataset.open_storage(name, Arc::new(serializer))?;
        ClusteredIndex::new(Box::new(storage), self.config.max_partition_size, sort_key)
    }

    /// Clustered table with ids from the persisted counter `<name>.maxId`
    pub fn open_pk_table(
        &self,
        name: &str,
        serializer: RecordSerializer,
        sort_key: usize,
        id_column: usize,
    ) -> Result<ClusteredIndexWithPk> {
        let index = self.open_table(name, serializer, sort_key)?;
        let counter = PropertyCounter::new(self.properties(), format!("{}.maxId", name));
        Ok(ClusteredIndexWithPk::new(index, id_column, Box::new(counter)))
    }

    /// Table clustered on, and numbered by, its id column
    pub fn open_id_table(
        &self,
        name: &str,
        serializer: RecordSerializer,
        id_column: usize,
    ) -> Result<IdClusteredIndex> {
        let storage = self.dataset.open_storage(name, Arc::new(serializer))?;
        IdClusteredIndex::new(Box::new(storage), self.config.max_partition_size, id_column)
    }

    /// Bring the manifest in line with the tables after a batch of writes.
    ///
    /// Writes made after the last commit read as corruption on the next
    /// `open`, and a corrupted dataset refuses to commit until
    /// `solve_corrupt` has restored it.
    pub fn commit(&mut self) -> Result<Version> {
        self.dataset.current_version()
    }

    /// Run one backup cycle against the live dataset
    pub fn backup(&mut self) -> Result<Option<Version>> {
        self.backups.run_cycle(&mut self.dataset)
    }

    /// Recover a corrupted live dataset through `flow`
    pub fn solve_corrupt(&mut self, flow: &mut dyn RecoveryFlow) -> Result<RecoveryChoice> {
        self.backups.solve_corrupt(&mut self.dataset, flow)
    }
}
