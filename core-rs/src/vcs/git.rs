//! Git backend for the configuration store
//!
//! Shells out to the `git` CLI in the data root. Paths handed to git are made
//! relative to the root so the same pathspecs work wherever the root lives.
//!
//! ## Usage
//!
//! ```no_run
//! use blockcfg_core::vcs::{GitBackend, VcsBackend};
//! use std::path::{Path, PathBuf};
//!
//! let git = GitBackend::new(PathBuf::from("/instrument/settings/config"));
//! git.add(Path::new("/instrument/settings/config/configurations/Demo")).unwrap();
//! git.commit("Saved Demo").unwrap();
//! ```

use crate::errors::{CfgError, Result};
use crate::vcs::backend::VcsBackend;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Git driver for the configuration data root
#[derive(Debug, Clone)]
pub struct GitBackend {
    root: PathBuf,
}

impl GitBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Initialize a repository on the given branch if not already initialized
    pub fn init(&self, branch: &str) -> Result<()> {
        if self.root.join(".git").exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.root)?;

        self.run_local("init", &["init", "-q"])?;
        self.run_local(
            "symbolic-ref",
            &["symbolic-ref", "HEAD", &format!("refs/heads/{}", branch)],
        )?;

        // Set initial config
        self.run_local("config", &["config", "user.name", "blockcfg"])?;
        self.run_local("config", &["config", "user.email", "blockcfg@localhost"])?;

        Ok(())
    }

    fn git(&self, args: &[&str]) -> std::io::Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
    }

    /// Run a local command; failures are not retryable
    fn run_local(&self, what: &str, args: &[&str]) -> Result<String> {
        let output = self
            .git(args)
            .map_err(|e| CfgError::Unexpected(format!("Failed to run git {}: {}", what, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CfgError::Unexpected(format!(
                "git {} failed: {}",
                what,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a command talking to the remote; failures are retryable
    fn run_remote(&self, what: &str, args: &[&str]) -> Result<()> {
        let output = self
            .git(args)
            .map_err(|e| CfgError::TransientVcs(format!("Failed to run git {}: {}", what, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CfgError::TransientVcs(format!(
                "git {} failed: {}",
                what,
                stderr.trim()
            )));
        }

        Ok(())
    }

    fn relative(&self, path: &Path) -> PathBuf {
        if path.is_relative() {
            return path.to_path_buf();
        }
        pathdiff::diff_paths(path, &self.root).unwrap_or_else(|| path.to_path_buf())
    }

    fn has_remote(&self) -> bool {
        self.run_local("remote", &["remote"])
            .map(|out| !out.is_empty())
            .unwrap_or(false)
    }

    fn has_upstream(&self) -> bool {
        self.git(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Whether the index differs from HEAD (works on an unborn branch too)
    fn has_staged_changes(&self) -> Result<bool> {
        let output = self
            .git(&["status", "--porcelain"])
            .map_err(|e| CfgError::Unexpected(format!("Failed to run git status: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CfgError::Unexpected(format!(
                "git status failed: {}",
                stderr.trim()
            )));
        }
        // first column is the index state; leading whitespace is significant
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .any(|line| !matches!(line.chars().next(), Some(' ') | Some('?') | None)))
    }

    /// Check if there are uncommitted changes under `path`
    #[cfg(test)]
    fn has_changes(&self, path: &Path) -> Result<bool> {
        let rel = self.relative(path);
        let rel = rel.to_string_lossy();
        let out = self.run_local("status", &["status", "--porcelain", "--", &rel])?;
        Ok(!out.is_empty())
    }
}

impl VcsBackend for GitBackend {
    fn is_repository(&self) -> bool {
        self.git(&["rev-parse", "--is-inside-work-tree"])
            .map(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).trim() == "true")
            .unwrap_or(false)
    }

    fn current_branch(&self) -> Result<String> {
        let output = self
            .git(&["symbolic-ref", "--short", "HEAD"])
            .map_err(|e| CfgError::StructuralVcs(format!("Failed to run git: {}", e)))?;
        if !output.status.success() {
            return Err(CfgError::StructuralVcs(
                "HEAD is detached; the configuration store needs a branch".to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn add(&self, path: &Path) -> Result<()> {
        let rel = self.relative(path);
        let rel = rel.to_string_lossy();
        self.run_local("add", &["add", "-A", "--", &rel])?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let rel = self.relative(path);
        let rel = rel.to_string_lossy();
        self.run_local("rm", &["rm", "-r", "-q", "-f", "--ignore-unmatch", "--", &rel])?;

        // untracked leftovers
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<Option<String>> {
        if !self.has_staged_changes()? {
            return Ok(None);
        }
        self.run_local("commit", &["commit", "-q", "-m", message])?;
        let hash = self.run_local("rev-parse", &["rev-parse", "HEAD"])?;
        Ok(Some(hash))
    }

    fn pull(&self) -> Result<()> {
        if !self.has_remote() || !self.has_upstream() {
            tracing::debug!("[Git] No upstream configured, skipping pull");
            return Ok(());
        }
        self.run_remote("pull", &["pull", "-q", "--no-edit"])
    }

    fn push(&self) -> Result<()> {
        if !self.has_remote() {
            return Ok(());
        }
        self.run_remote("push", &["push", "-q", "origin", "HEAD"])
    }
}
