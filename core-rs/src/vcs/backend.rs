//! Version control backend interface
//!
//! The store only needs a handful of porcelain operations. Connectivity
//! failures (pull/push) must come back as [`CfgError::TransientVcs`] so the
//! store can retry them; structural problems (not a repository, no branch) as
//! [`CfgError::StructuralVcs`].
//!
//! [`CfgError::TransientVcs`]: crate::errors::CfgError::TransientVcs
//! [`CfgError::StructuralVcs`]: crate::errors::CfgError::StructuralVcs

use crate::errors::Result;
use std::path::Path;

pub trait VcsBackend: Send + Sync {
    /// Whether the working copy root is under version control
    fn is_repository(&self) -> bool;

    /// Currently checked-out branch
    fn current_branch(&self) -> Result<String>;

    /// Stage a file or directory (new, modified or deleted contents)
    fn add(&self, path: &Path) -> Result<()>;

    /// Remove a file or directory from version control and from disk
    fn remove(&self, path: &Path) -> Result<()>;

    /// Commit staged changes; `Ok(None)` when nothing was staged
    fn commit(&self, message: &str) -> Result<Option<String>>;

    fn pull(&self) -> Result<()>;

    fn push(&self) -> Result<()>;
}
