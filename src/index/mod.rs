//! Index Module
//!
//! Sorted ("clustered") tables over partitioned storage.
//!
//! ## Responsibilities
//! - Keep one global order by a designated sort column
//! - Bound every partition to `max_partition_size` records
//! - Rebalance partitions on overflow or on request
//! - Assign primary keys (counter-backed or self-numbering)
//!
//! ## Layout
//! ```text
//!   partition 0        partition 1        partition 2
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │ 1  3  3  4  │ ≤  │ 4  7  9     │ ≤  │ 12 15       │
//! └─────────────┘    └─────────────┘    └─────────────┘
//! ```

mod clustered;
mod counter;
mod iter;
mod primary;
mod search;

pub use clustered::ClusteredIndex;
pub use counter::{IdCounter, MemoryCounter, PropertyCounter};
pub use iter::{ClusteredIter, Direction};
pub use primary::{ClusteredIndexWithPk, ClusteredTable, IdClusteredIndex};
pub use search::{binary_search_last, insertion_point};
