//! Test helpers shared across Strata crates.

pub mod files;
pub mod loaders;

pub use files::{MemoryFileLoader, write_json};
pub use loaders::{EventLog, FailingLoader, FixedLoader, RecordingLoader};
