//! Backup Module
//!
//! Snapshots of the live dataset keyed by manifest version.
//!
//! ## Layout
//! ```text
//! {backup_root}/
//!   ├── 3/                 (verbatim copy of the data directory at version 3)
//!   ├── 4/
//!   └── .staging-5/        (copy in progress, renamed to 5/ when complete)
//! ```
//!
//! ## Lifecycle
//! - Created by `execute_backup`, never overwritten
//! - Listed newest first by `get_all_backups`
//! - Evicted oldest first by `remove_old_backup_if_needed`, one per cycle

mod manager;
mod worker;

pub use manager::{BackupManager, RecoveryChoice, RecoveryFlow, RETENTION_KEY};
pub use worker::{BackupWorker, CycleResult};
