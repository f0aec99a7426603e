//! Pause/resume switch between the queue consumer and the file watcher
//!
//! The consumer pauses the watcher around every unit so the engine's own
//! writes are not mistaken for hand-edits. Filesystem events can trail the
//! write that caused them, so events arriving within the settle window after
//! a resume are ignored as well.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct GuardState {
    /// Nesting depth of pause() calls
    paused: AtomicUsize,
    resumed_at: Mutex<Option<Instant>>,
    settle: Duration,
}

#[derive(Debug, Clone)]
pub struct FileWatcherGuard {
    state: Arc<GuardState>,
}

impl Default for FileWatcherGuard {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl FileWatcherGuard {
    pub fn new(settle: Duration) -> Self {
        Self {
            state: Arc::new(GuardState {
                paused: AtomicUsize::new(0),
                resumed_at: Mutex::new(None),
                settle,
            }),
        }
    }

    pub fn pause(&self) {
        self.state.paused.fetch_add(1, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        let previous = self
            .state
            .paused
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        if previous <= 1 {
            let mut resumed_at = self
                .state
                .resumed_at
                .lock()
                .unwrap_or_else(|p| p.into_inner());
            *resumed_at = Some(Instant::now());
        }
    }

    /// Pause until the returned scope is dropped
    pub fn paused(&self) -> PauseScope {
        self.pause();
        PauseScope { guard: self.clone() }
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst) > 0
    }

    pub fn is_settling(&self) -> bool {
        let resumed_at = self
            .state
            .resumed_at
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        matches!(*resumed_at, Some(at) if at.elapsed() < self.state.settle)
    }

    /// Whether an event seen right now can be a hand-edit
    pub fn accepts_events(&self) -> bool {
        !self.is_paused() && !self.is_settling()
    }
}

/// Resumes the watcher when dropped, including on unwind
pub struct PauseScope {
    guard: FileWatcherGuard,
}

impl Drop for PauseScope {
    fn drop(&mut self) {
        self.guard.resume();
    }
}
