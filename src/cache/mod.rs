//! Content Cache
//!
//! In-memory read model served to capability and discovery requests:
//!
//! - [`ContentCache`]: concurrently writable indexed containers, filled by
//!   one rebuild pass and then frozen behind [`ReadableCache`]
//! - [`CacheMerger`]: idempotent, order-independent field-wise merge used to
//!   combine per-instance results and auxiliary caches
//! - [`SnapshotHandle`]: atomic publish of the next complete snapshot
//!
//! ## Configuration
//!
//! Rebuild behavior is controlled via the `[cache]` table:
//!
//! ```toml
//! [cache]
//! threads = 5
//! task_deadline_seconds = 120
//! degraded_policy = "publish"
//! # ... see config.rs for all options
//! ```

mod config;
mod consistency;
mod containers;
mod content;
mod image;
pub(crate) mod lock;
mod merge;
mod readable;
mod relation;
mod snapshot;

pub use config::{CacheConfig, DegradedPolicy};
pub use consistency::{ConsistencyReport, DanglingReference, enforce_referential_completeness};
pub use containers::{
    Extent, ExtentMap, IdSet, NameMap, RelationMap, ScalarMap, SridEnvelopes, ValueSet,
};
pub use content::ContentCache;
pub use image::{CacheImage, CacheSummary, KindSummary, RelationImage};
pub use merge::CacheMerger;
pub use readable::ReadableCache;
pub use relation::{Relation, Relations};
pub use snapshot::{CacheSnapshot, SnapshotHandle};
