//! # TallyDB
//!
//! An embedded record store with:
//! - Typed records framed by a null bitmap
//! - Clustered tables spread over bounded partition files
//! - Counter-backed and self-numbering primary keys
//! - Versioned manifests with integrity checks and remote sync
//! - Version-keyed backups with bounded retention
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        AppContext                            │
//! │           (config, properties, dataset, backups)             │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌────────────────────────┐      ┌───────────────────────┐
//!   │   Primary-Key Tables   │      │    Backup Manager     │
//!   │ (counter / self-number)│      │ (snapshot, retention) │
//!   └───────────┬────────────┘      └───────────┬───────────┘
//!               ▼                               ▼
//!   ┌────────────────────────┐      ┌───────────────────────┐
//!   │    Clustered Index     │      │   Sync (Local/Remote) │
//!   │ (order, repartition)   │      │  (manifest, versions) │
//!   └───────────┬────────────┘      └───────────┬───────────┘
//!               ▼                               │
//!   ┌────────────────────────┐                  │
//!   │  Partitioned Storage   │◄─────────────────┘
//!   │  + Record Codec        │   same partition files
//!   └────────────────────────┘
//! ```
//!
//! All operations are synchronous and blocking; callers serialize writers.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod storage;
pub mod index;
pub mod props;
pub mod sync;
pub mod dataset;
pub mod backup;
pub mod context;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{TallyError, Result};
pub use config::Config;
pub use codec::{Record, Value};
pub use context::AppContext;
pub use dataset::Dataset;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TallyDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
