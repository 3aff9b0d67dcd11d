//! Sync Module
//!
//! Versioned manifests over a dataset directory and its remote copy.
//!
//! ## Responsibilities
//! - Fingerprint every file of a dataset (timestamp, length, CRC32)
//! - Step the manifest version when the directory content changes
//! - Detect corruption by comparing the directory against its manifest
//! - Compare local and remote manifests to decide what must move
//!
//! ## Versions
//! ```text
//!   version        ── steps on every content change
//!   branch_version ── version last published to the remote
//!   uncommitted    ⇔ version != branch_version
//! ```

mod file_info;
mod index;
mod local;
mod remote;

pub use file_info::{checksum_of, list_files, FileInfo};
pub use index::{Drift, Index, Version, VERSION_STEP};
pub use local::Local;
pub use remote::{DirectoryTransport, Remote, Transport};
