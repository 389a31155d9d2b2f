// crates/core/src/lib.rs
//! Job model, in-memory job store and on-disk persistence for jobwatch.

pub mod error;
pub mod paths;
pub mod persistence;
pub mod store;
pub mod types;

pub use error::*;
pub use persistence::{RetryPolicy, SnapshotStore};
pub use store::{JobCounts, JobStore};
pub use types::*;
