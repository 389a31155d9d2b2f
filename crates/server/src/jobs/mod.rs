// crates/server/src/jobs/mod.rs
//! Background job system.
//!
//! Provides:
//! - `JobRunner` - creates jobs and schedules one cancellable task per job
//! - `JobWork` - the per-tick unit of work (`SimulatedCrawl` by default)
//! - `RunnerConfig` - tick interval, progress step and artifact milestone

pub mod runner;
pub mod types;
pub mod work;

pub use runner::JobRunner;
pub use types::{CancelError, RunnerConfig, StartError};
pub use work::{JobWork, SimulatedCrawl};
