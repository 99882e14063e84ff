//! Typed, layered configuration resolution.
//!
//! A schema declares every property with its format, optional environment
//! binding and default. A [`ConfigStore`] layers defaults, a file, the
//! environment and runtime loaders on top of each other, converts every raw
//! value into its declared type, and serves leaf, group and whole-tree reads.

mod convert;
mod env;
mod error;
pub mod loader;
pub mod schema;
mod store;

/// Conversion of raw values into declared formats.
pub use convert::{can_convert, convert};
pub use env::EnvSource;
/// Public error type returned by every fallible API.
pub use error::{ConfigError, ErrorKind, Result};
#[cfg(feature = "http")]
pub use loader::HttpLoader;
/// Source contracts and bundled loaders.
pub use loader::{AsyncLoader, FileLoader, FlatMap, JsonFileLoader, StaticLoader, flatten};
pub use schema::{Format, ParsedSchema, PropertyDefinition, Schema};
/// The store and its construction and persistence options.
pub use store::{ConfigStore, Origin, OutputFormat, StoreOptions, WriteOptions};
