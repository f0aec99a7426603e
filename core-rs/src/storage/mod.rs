//! Filesystem layout of the configuration data root

mod files;

pub use files::{ConfigFileStore, ItemRef};
