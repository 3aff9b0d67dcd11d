//! Backup Manager
//!
//! Version-keyed snapshots of the live dataset with bounded retention.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::IntegrityMode;
use crate::dataset::Dataset;
use crate::error::{Result, TallyError};
use crate::props::{PropertyStore, PropertyValue};
use crate::sync::Version;

/// Property key overriding the configured retention length
pub const RETENTION_KEY: &str = "backup.retention";

/// Where a corrupted dataset should be restored from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    /// Replace the live dataset with this backup version
    Backup(Version),
    /// The flow restored the data itself (e.g. from a remote copy)
    Handled,
    /// Leave the dataset as it is
    Cancelled,
}

/// Recovery decision made outside the storage core (typically a user prompt)
pub trait RecoveryFlow {
    fn choose(&mut self, corrupted: &Dataset, backups: &[Arc<Dataset>]) -> Result<RecoveryChoice>;
}

impl<F> RecoveryFlow for F
where
    F: FnMut(&Dataset, &[Arc<Dataset>]) -> Result<RecoveryChoice>,
{
    fn choose(&mut self, corrupted: &Dataset, backups: &[Arc<Dataset>]) -> Result<RecoveryChoice> {
        self(corrupted, backups)
    }
}

/// Manages `<backup_root>/<version>/` snapshots
///
/// ## Concurrency:
/// - `cache`: RwLock, loaded datasets shared as `Arc`
/// - Backup, eviction and restore are blocking filesystem walks; callers
///   that need them off-thread use `BackupWorker`
pub struct BackupManager {
    root: PathBuf,
    properties: Arc<dyn PropertyStore>,
    default_retention: usize,
    mode: IntegrityMode,

    /// Backups already opened, by version
    cache: RwLock<BTreeMap<Version, Arc<Dataset>>>,
}

impl BackupManager {
    const STAGING_PREFIX: &'static str = ".staging-";
    const RESTORE_PREFIX: &'static str = ".restore-";

    pub fn new(
        root: &Path,
        properties: Arc<dyn PropertyStore>,
        default_retention: usize,
        mode: IntegrityMode,
    ) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            properties,
            default_retention,
            mode,
            cache: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of versions kept, from the property store or the default
    pub fn retention_length(&self) -> Result<usize> {
        match self.properties.get_long(RETENTION_KEY)? {
            Some(n) if n >= 1 => Ok(n as usize),
            Some(n) => Err(TallyError::Config(format!(
                "{} must be at least 1, found {}",
                RETENTION_KEY, n
            ))),
            None => Ok(self.default_retention),
        }
    }

    /// Persist a new retention length. Shrinking it evicts gradually, one
    /// version per backup cycle.
    pub fn set_retention_length(&self, length: usize) -> Result<()> {
        if length == 0 {
            return Err(TallyError::InvalidArgument(
                "retention length must be at least 1".to_string(),
            ));
        }
        self.properties
            .set(RETENTION_KEY, PropertyValue::Long(length as i64))
    }

    /// Backup versions present on disk, ascending
    pub fn versions(&self) -> Result<Vec<Version>> {
        Ok(self.scan()?.into_iter().map(|(version, _)| version).collect())
    }

    /// Snapshot the live dataset under its current version.
    ///
    /// Returns the version written, or `None` when a backup of that version
    /// already exists or the dataset is corrupted.
    pub fn execute_backup(&self, dataset: &mut Dataset) -> Result<Option<Version>> {
        if dataset.is_corrupted() {
            warn!(root = %dataset.root().display(), "skipping backup of corrupted dataset");
            return Ok(None);
        }

        let version = dataset.current_version()?;
        let target = self.root.join(version.to_string());
        if target.exists() {
            info!(%version, "backup already exists, skipping");
            return Ok(None);
        }

        // Copy into a staging directory first so a crash never leaves a
        // partial snapshot under a version name
        let staging = self
            .root
            .join(format!("{}{}", Self::STAGING_PREFIX, version));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        copy_dir(dataset.root(), &staging)?;
        fs::rename(&staging, &target)?;

        info!(%version, path = %target.display(), "backup created");
        Ok(Some(version))
    }

    /// Every backup opened as a dataset, newest version first
    pub fn get_all_backups(&self) -> Result<Vec<Arc<Dataset>>> {
        let present = self.scan()?;

        let mut cache = self.cache.write();
        cache.retain(|version, _| present.iter().any(|(v, _)| v == version));

        let mut backups = Vec::with_capacity(present.len());
        for (version, path) in present.into_iter().rev() {
            let dataset = match cache.get(&version) {
                Some(dataset) => Arc::clone(dataset),
                None => {
                    let dataset = Arc::new(Dataset::open(&path, self.mode)?);
                    cache.insert(version, Arc::clone(&dataset));
                    dataset
                }
            };
            backups.push(dataset);
        }
        Ok(backups)
    }

    /// Delete the oldest backup when more versions exist than the
    /// retention length allows. At most one version per call.
    pub fn remove_old_backup_if_needed(&self) -> Result<Option<Version>> {
        let present = self.scan()?;
        if present.len() <= self.retention_length()? {
            return Ok(None);
        }

        let (oldest, path) = &present[0];
        fs::remove_dir_all(path)?;
        self.cache.write().remove(oldest);

        info!(version = %oldest, remaining = present.len() - 1, "old backup removed");
        Ok(Some(*oldest))
    }

    /// One scheduled cycle: back up, then evict at most one old version
    pub fn run_cycle(&self, dataset: &mut Dataset) -> Result<Option<Version>> {
        let created = self.execute_backup(dataset)?;
        self.remove_old_backup_if_needed()?;
        Ok(created)
    }

    /// Replace the live dataset with the backup of `version`
    pub fn restore_backup(&self, version: Version, dataset: &mut Dataset) -> Result<()> {
        let source = self
            .scan()?
            .into_iter()
            .find(|(v, _)| *v == version)
            .map(|(_, path)| path)
            .ok_or_else(|| {
                TallyError::InvalidArgument(format!("no backup for version {}", version))
            })?;

        let live = dataset.root().to_path_buf();
        let staging = self
            .root
            .join(format!("{}{}", Self::RESTORE_PREFIX, version));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        copy_dir(&source, &staging)?;
        if live.exists() {
            fs::remove_dir_all(&live)?;
        }
        fs::rename(&staging, &live)?;

        *dataset = Dataset::open(&live, self.mode)?;
        info!(%version, root = %live.display(), "backup restored");
        Ok(())
    }

    /// Hand a corrupted dataset to a recovery flow and apply its choice.
    ///
    /// Fails with `InvalidArgument` when the dataset is not corrupted.
    pub fn solve_corrupt(
        &self,
        dataset: &mut Dataset,
        flow: &mut dyn RecoveryFlow,
    ) -> Result<RecoveryChoice> {
        if !dataset.is_corrupted() {
            return Err(TallyError::InvalidArgument(
                "dataset is not flagged corrupted".to_string(),
            ));
        }

        let backups = self.get_all_backups()?;
        let choice = flow.choose(dataset, &backups)?;
        match choice {
            RecoveryChoice::Backup(version) => self.restore_backup(version, dataset)?,
            RecoveryChoice::Handled => {
                let root = dataset.root().to_path_buf();
                *dataset = Dataset::open(&root, self.mode)?;
            }
            RecoveryChoice::Cancelled => {
                warn!(root = %dataset.root().display(), "corruption recovery cancelled");
            }
        }
        Ok(choice)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Version-named subdirectories, ascending. Staging directories and
    /// anything else that does not parse as a version are ignored.
    fn scan(&self) -> Result<Vec<(Version, PathBuf)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Ok(version) = name.parse::<Version>() {
                found.push((version, entry.path()));
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }
}

/// Recursive copy of `src` into a new directory `dst`.
/// In-flight `.tmp` files are left behind.
fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(".tmp") {
            continue;
        }

        let file_type = entry.file_type()?;
        let target = dst.join(&name);
        if file_type.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
