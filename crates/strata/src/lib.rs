//! Public surface for Strata.
//!
//! Re-exports the configuration engine and provides a small logging
//! initialization helper to keep consumer setup consistent.

/// Re-export for convenience.
pub use strata_config as config;

pub use strata_config::{
    AsyncLoader, ConfigError, ConfigStore, EnvSource, ErrorKind, FileLoader, Format,
    OutputFormat, Result, Schema, StoreOptions, WriteOptions,
};

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// This is a no-op if the feature is not enabled.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
    log::debug!("strata logging initialised");
}
