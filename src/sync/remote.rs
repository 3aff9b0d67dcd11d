//! Remote repository
//!
//! A peer copy of a dataset reached through a pluggable [`Transport`].

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, TallyError};
use crate::props::FileProperties;

use super::{Drift, Index, Local};

/// Moves files between this machine and a remote store
pub trait Transport: Send + Sync {
    /// Copy remote `name` to local `dest`
    fn download_file(&self, name: &str, dest: &Path) -> Result<()>;

    /// Copy local `src` to remote `name`
    fn upload_file(&self, src: &Path, name: &str) -> Result<()>;

    fn remove_file(&self, name: &str) -> Result<()>;

    fn is_reachable(&self) -> bool;
}

/// Transport over a plain directory, standing in for a cloud folder
pub struct DirectoryTransport {
    root: PathBuf,
}

impl DirectoryTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Transport for DirectoryTransport {
    fn download_file(&self, name: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(self.root.join(name), dest)?;
        Ok(())
    }

    fn upload_file(&self, src: &Path, name: &str) -> Result<()> {
        let dest = self.root.join(name);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dest)?;
        Ok(())
    }

    fn remove_file(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.root.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_reachable(&self) -> bool {
        self.root.is_dir()
    }
}

/// Remote dataset: a transport plus the last fetched manifest
pub struct Remote<T: Transport> {
    transport: T,
    index: Index,
}

impl<T: Transport> Remote<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            index: Index::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Manifest as of the last `fetch_index`
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Download the remote manifest; a remote without one reads as empty.
    /// `scratch` is a local directory for the downloaded page.
    pub fn fetch_index(&mut self, scratch: &Path) -> Result<&Index> {
        self.ensure_reachable()?;

        let page_path = scratch.join("remote.manifest");
        match fs::remove_file(&page_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.index = match self.transport.download_file(Local::MANIFEST_FILE, &page_path) {
            Ok(()) => Index::load(&FileProperties::open(&page_path)?)?,
            Err(TallyError::Io(e)) if e.kind() == ErrorKind::NotFound => Index::default(),
            Err(e) => return Err(e),
        };
        Ok(&self.index)
    }

    /// Classify `local` against the last fetched manifest
    pub fn drift(&self, local: &Local) -> Drift {
        local.index().drift(&self.index)
    }

    /// Mirror local changes to the remote and publish the local version.
    /// Returns the number of files uploaded.
    pub fn push(&mut self, local: &mut Local) -> Result<usize> {
        self.ensure_reachable()?;

        let uploads: Vec<String> = local
            .index()
            .changed_files(&self.index)
            .into_iter()
            .map(|f| f.name.clone())
            .collect();
        for name in &uploads {
            self.transport.upload_file(&local.root().join(name), name)?;
        }
        for name in local.index().missing_files(&self.index) {
            self.transport.remove_file(name)?;
        }

        local.mark_published(local.version())?;
        self.transport
            .upload_file(local.manifest_path(), Local::MANIFEST_FILE)?;
        self.index = local.index().clone();

        info!(uploaded = uploads.len(), version = %local.version(), "pushed to remote");
        Ok(uploads.len())
    }

    /// Mirror the remote into `local` and adopt its manifest.
    /// Returns the number of files downloaded.
    pub fn pull(&mut self, local: &mut Local) -> Result<usize> {
        self.ensure_reachable()?;

        let downloads: Vec<String> = self
            .index
            .changed_files(local.index())
            .into_iter()
            .map(|f| f.name.clone())
            .collect();
        for name in &downloads {
            self.transport
                .download_file(name, &local.root().join(name))?;
        }
        for name in self.index.missing_files(local.index()) {
            match fs::remove_file(local.root().join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        local.adopt(&self.index)?;

        info!(downloaded = downloads.len(), version = %self.index.version(), "pulled from remote");
        Ok(downloads.len())
    }

    fn ensure_reachable(&self) -> Result<()> {
        if !self.transport.is_reachable() {
            return Err(TallyError::Io(io::Error::new(
                ErrorKind::NotConnected,
                "remote is not reachable",
            )));
        }
        Ok(())
    }
}
