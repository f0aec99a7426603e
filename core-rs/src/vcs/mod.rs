//! Version control for the configuration data root
//!
//! - `VcsBackend`: porcelain operations (git implementation in `GitBackend`)
//! - `RevisionStore`: what the engine persists through
//!   (`VersionedStore` with a background push loop, or `NullStore`)

mod backend;
mod git;
mod store;

pub use backend::VcsBackend;
pub use git::GitBackend;
pub use store::{open_store, open_store_with, NullStore, RevisionStore, VersionedStore};
