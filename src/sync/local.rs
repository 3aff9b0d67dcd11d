//! Local repository
//!
//! Manifest of a dataset directory on this machine, with drift detection
//! and integrity verification.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::IntegrityMode;
use crate::error::{Result, TallyError};
use crate::props::FileProperties;

use super::file_info::{checksum_of, list_files, modified_millis};
use super::{FileInfo, Index, Version};

/// A dataset directory and its persisted manifest
///
/// The manifest lives in the dot-file [`Local::MANIFEST_FILE`] inside the
/// directory, so it travels with backups but never fingerprints itself.
pub struct Local {
    root: PathBuf,
    page: FileProperties,
    index: Index,
    mode: IntegrityMode,
}

impl Local {
    pub const MANIFEST_FILE: &'static str = ".manifest";

    /// Open a dataset directory, creating it if needed
    pub fn open(root: &Path, mode: IntegrityMode) -> Result<Self> {
        fs::create_dir_all(root)?;
        let page = FileProperties::open(&root.join(Self::MANIFEST_FILE))?;
        let index = Index::load(&page)?;

        Ok(Self {
            root: root.to_path_buf(),
            page,
            index,
            mode,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn manifest_path(&self) -> &Path {
        self.page.path()
    }

    pub fn version(&self) -> Version {
        self.index.version()
    }

    pub fn branch_version(&self) -> Version {
        self.index.branch_version()
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        self.index.has_uncommitted_changes()
    }

    /// Build the first manifest from the current directory listing.
    ///
    /// Starts at version 0 and steps once when any file is present.
    pub fn create_index(&mut self) -> Result<()> {
        if !self.index.is_empty() {
            return Err(TallyError::InvalidArgument(format!(
                "{} already has an index at version {}",
                self.root.display(),
                self.index.version()
            )));
        }

        let mut files = Vec::new();
        for name in list_files(&self.root)? {
            files.push(FileInfo::fingerprint(&self.root, &name)?);
        }

        let mut index = Index::default();
        let populated = !files.is_empty();
        index.replace_files(files);
        if populated {
            index.bump();
        }
        index.save(&self.page)?;

        info!(
            root = %self.root.display(),
            files = index.files().len(),
            version = %index.version(),
            "index created"
        );
        self.index = index;
        Ok(())
    }

    /// Verify the directory against the manifest.
    ///
    /// Fails with `InvalidData` on a file-count mismatch, a file missing
    /// from the manifest, a length change or a checksum mismatch. With
    /// [`IntegrityMode::TrustTimestamps`] the checksum is only recomputed
    /// when the timestamp moved.
    pub fn data_integrity_test(&self) -> Result<()> {
        let names = list_files(&self.root)?;
        if names.len() != self.index.files().len() {
            return Err(self.corrupt(format!(
                "{} files on disk, {} in manifest",
                names.len(),
                self.index.files().len()
            )));
        }

        for name in &names {
            let recorded = self
                .index
                .file(name)
                .ok_or_else(|| self.corrupt(format!("{} is not in the manifest", name)))?;

            let path = self.root.join(name);
            let metadata = fs::metadata(&path)?;
            if metadata.len() != recorded.len {
                return Err(self.corrupt(format!(
                    "{}: length {} differs from recorded {}",
                    name,
                    metadata.len(),
                    recorded.len
                )));
            }

            let timestamp_moved = modified_millis(&metadata)? != recorded.last_modified;
            if self.mode == IntegrityMode::AlwaysChecksum || timestamp_moved {
                let checksum = checksum_of(&path)?;
                if checksum != recorded.checksum {
                    return Err(self.corrupt(format!(
                        "{}: checksum {:08x} differs from recorded {:08x}",
                        name, checksum, recorded.checksum
                    )));
                }
            }
        }

        Ok(())
    }

    /// Rescan the directory and step the version if any file's content
    /// changed.
    ///
    /// Fingerprints whose timestamp and length still match are reused.
    /// Timestamp-only moves are recorded without a version step.
    /// Returns whether the version stepped.
    pub fn update_index(&mut self) -> Result<bool> {
        let mut files = Vec::new();
        for name in list_files(&self.root)? {
            let metadata = fs::metadata(self.root.join(&name))?;
            let timestamp = modified_millis(&metadata)?;
            let reusable = self.index.file(&name).filter(|previous| {
                self.mode == IntegrityMode::TrustTimestamps
                    && previous.last_modified == timestamp
                    && previous.len == metadata.len()
            });
            match reusable {
                Some(previous) => files.push(previous.clone()),
                None => files.push(FileInfo::fingerprint(&self.root, &name)?),
            }
        }

        if files == self.index.files() {
            return Ok(false);
        }

        let previous = self.index.files();
        let content_changed = files.len() != previous.len()
            || files.iter().zip(previous).any(|(a, b)| !a.same_content(b));

        self.index.replace_files(files);
        if content_changed {
            self.index.bump();
        }
        self.index.save(&self.page)?;
        Ok(content_changed)
    }

    /// Record `version` as the one last published to the remote
    pub fn mark_published(&mut self, version: Version) -> Result<()> {
        self.index.set_branch_version(version);
        self.index.save(&self.page)
    }

    /// Take over a remote manifest after its files were copied in.
    /// Fingerprints are refreshed from disk; both versions follow the remote.
    pub fn adopt(&mut self, remote: &Index) -> Result<()> {
        let mut files = Vec::new();
        for name in list_files(&self.root)? {
            files.push(FileInfo::fingerprint(&self.root, &name)?);
        }
        self.index.replace_files(files);
        self.index.set_version(remote.version());
        self.index.set_branch_version(remote.version());
        self.index.save(&self.page)
    }

    fn corrupt(&self, detail: String) -> TallyError {
        warn!(root = %self.root.display(), %detail, "integrity check failed");
        TallyError::InvalidData(detail)
    }
}
