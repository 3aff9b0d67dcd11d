//! Sync manifest
//!
//! The versioned file list shared by local and remote repositories.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::props::{PropertyStore, PropertyValue};

use super::FileInfo;

/// Amount a version grows by on every regeneration
pub const VERSION_STEP: f64 = 1.0;

const KEY_FILES: &str = "index.files";
const KEY_VERSION: &str = "index.version";
const KEY_BRANCH_VERSION: &str = "index.branchVersion";
const KEY_LAST_MODIFIED: &str = "index.lastModified";

/// Manifest version, totally ordered
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Version(f64);

impl Version {
    pub const ZERO: Version = Version(0.0);

    pub fn new(value: f64) -> Self {
        Version(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// The version following this one
    pub fn next(self) -> Self {
        Version(self.0 + VERSION_STEP)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        let value: f64 = s
            .parse()
            .map_err(|_| TallyError::InvalidArgument(format!("not a version: {:?}", s)))?;
        if !value.is_finite() || value < 0.0 {
            return Err(TallyError::InvalidArgument(format!(
                "version out of range: {}",
                s
            )));
        }
        Ok(Version(value))
    }
}

/// How a local manifest relates to its remote counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    /// Nothing to transfer
    InSync,
    /// Local changes not yet published, remote unchanged
    LocalAhead,
    /// Remote moved on, no local changes
    RemoteAhead,
    /// Both sides changed since the last publish
    Diverged,
}

/// Manifest of a dataset directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Index {
    files: Vec<FileInfo>,
    version: Version,
    branch_version: Version,
    /// Unix millis of the last regeneration
    last_modified: u64,
}

impl Index {
    pub fn files(&self) -> &[FileInfo] {
        &self.files
    }

    pub fn file(&self, name: &str) -> Option<&FileInfo> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Version last known to match the remote
    pub fn branch_version(&self) -> Version {
        self.branch_version
    }

    pub fn last_modified(&self) -> u64 {
        self.last_modified
    }

    /// True until the manifest has been created
    pub fn is_empty(&self) -> bool {
        self.last_modified == 0 && self.files.is_empty() && self.version == Version::ZERO
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        self.version != self.branch_version
    }

    /// Classify this (local) manifest against a remote one
    pub fn drift(&self, remote: &Index) -> Drift {
        let remote_moved = remote.version != self.branch_version;
        match (self.has_uncommitted_changes(), remote_moved) {
            (false, false) => Drift::InSync,
            (true, false) => Drift::LocalAhead,
            (false, true) => Drift::RemoteAhead,
            (true, true) => Drift::Diverged,
        }
    }

    /// Files of this manifest that `other` lacks or holds different content for
    pub fn changed_files<'a>(&'a self, other: &Index) -> Vec<&'a FileInfo> {
        self.files
            .iter()
            .filter(|mine| {
                other.file(&mine.name).map_or(true, |theirs| {
                    theirs.checksum != mine.checksum || theirs.len != mine.len
                })
            })
            .collect()
    }

    /// Names present in `other` but not in this manifest
    pub fn missing_files<'a>(&self, other: &'a Index) -> Vec<&'a str> {
        other
            .files
            .iter()
            .filter(|theirs| self.file(&theirs.name).is_none())
            .map(|theirs| theirs.name.as_str())
            .collect()
    }

    // =========================================================================
    // Mutation (crate-internal)
    // =========================================================================

    pub(crate) fn replace_files(&mut self, files: Vec<FileInfo>) {
        self.files = files;
        self.last_modified = now_millis();
    }

    pub(crate) fn bump(&mut self) {
        self.version = self.version.next();
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub(crate) fn set_branch_version(&mut self, version: Version) {
        self.branch_version = version;
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Load from a resource page; a page without a manifest yields an empty one
    pub fn load(page: &dyn PropertyStore) -> Result<Self> {
        let files = match page.get_bytes(KEY_FILES)? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => Vec::new(),
        };
        Ok(Self {
            files,
            version: Version(page.get_double(KEY_VERSION)?.unwrap_or(0.0)),
            branch_version: Version(page.get_double(KEY_BRANCH_VERSION)?.unwrap_or(0.0)),
            last_modified: page.get_long(KEY_LAST_MODIFIED)?.unwrap_or(0) as u64,
        })
    }

    /// Store every field in one page write
    pub fn save(&self, page: &dyn PropertyStore) -> Result<()> {
        page.set_many(vec![
            (
                KEY_FILES.to_string(),
                PropertyValue::Bytes(bincode::serialize(&self.files)?),
            ),
            (
                KEY_VERSION.to_string(),
                PropertyValue::Double(self.version.value()),
            ),
            (
                KEY_BRANCH_VERSION.to_string(),
                PropertyValue::Double(self.branch_version.value()),
            ),
            (
                KEY_LAST_MODIFIED.to_string(),
                PropertyValue::Long(self.last_modified as i64),
            ),
        ])
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
