//! File fingerprints
//!
//! Name, modification time, length and CRC32 of one file in a dataset.

use std::fs::{self, File, Metadata};
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Fingerprint of one file at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Path relative to the dataset root, `/`-separated
    pub name: String,
    /// Modification time in unix millis
    pub last_modified: u64,
    /// Length in bytes
    pub len: u64,
    /// CRC32 of the content
    pub checksum: u32,
}

impl FileInfo {
    /// Same name and bytes, whatever the timestamps say
    pub fn same_content(&self, other: &FileInfo) -> bool {
        self.name == other.name && self.len == other.len && self.checksum == other.checksum
    }

    /// Fingerprint `root/name` from disk
    pub fn fingerprint(root: &Path, name: &str) -> Result<Self> {
        let path = root.join(name);
        let metadata = fs::metadata(&path)?;
        Ok(Self {
            name: name.to_string(),
            last_modified: modified_millis(&metadata)?,
            len: metadata.len(),
            checksum: checksum_of(&path)?,
        })
    }
}

/// Modification time of a file in unix millis
pub fn modified_millis(metadata: &Metadata) -> Result<u64> {
    let modified = metadata.modified()?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Ok(millis)
}

/// CRC32 of a file's content, streamed
pub fn checksum_of(path: &Path) -> Result<u32> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = crc32fast::Hasher::new();
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }
    Ok(hasher.finalize())
}

/// Relative names of every regular file under `root`, sorted.
///
/// Entries whose name starts with `.` (manifests, staging areas) and
/// in-flight `.tmp` files are skipped at every level.
pub fn list_files(root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if root.is_dir() {
        collect(root, "", &mut names)?;
    }
    names.sort();
    Ok(names)
}

fn collect(dir: &Path, prefix: &str, names: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.starts_with('.') || file_name.ends_with(".tmp") {
            continue;
        }

        let relative = if prefix.is_empty() {
            file_name
        } else {
            format!("{}/{}", prefix, file_name)
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect(&entry.path(), &relative, names)?;
        } else if file_type.is_file() {
            names.push(relative);
        }
    }
    Ok(())
}
