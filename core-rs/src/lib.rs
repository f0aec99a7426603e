//! # blockcfg - Configuration Management & Activation Engine
//!
//! Manages the configurations and components of an instrument control system:
//! named sets of blocks, groups and IOCs stored as JSON documents under a
//! data root that is kept under git.
//!
//! ## Core Principle
//!
//! **One writer**: every mutation is a unit on a FIFO queue, executed by a
//! single consumer with the file watcher paused. Readers only ever see the
//! published metadata snapshot.
//!
//! ## Key Features
//!
//! - Catalogue of configurations and components with derived identifiers
//! - Component dependency tracking and delete guards
//! - Activation with a minimal process start/stop/restart diff
//! - Versioned persistence with a background push loop and a filesystem fallback
//! - Hand-edit detection on the data root
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  enqueue   ┌─────────────┐  execute  ┌──────────────────────┐
//! │  callers   │ ─────────▶ │ WriteQueue  │ ────────▶ │ catalogue / holder   │
//! └────────────┘            └─────────────┘           │ files / store / ext  │
//!       ▲                          ▲                   └──────────┬───────────┘
//!       │ snapshot                 │ hand edits                   │ publish
//!       │                   ┌──────┴──────┐                       ▼
//!       └────────────────── │ FileWatcher │            ┌──────────────────────┐
//!                           └─────────────┘            │    MetadataBoard     │
//!                                                      └──────────────────────┘
//! ```

pub mod errors;
pub mod settings;
pub mod model;
pub mod naming;
pub mod dependency;
pub mod vcs;
pub mod storage;
pub mod catalogue;
pub mod activation;
pub mod extensions;
pub mod publish;
pub mod queue;
pub mod engine;
pub mod sim;

pub use errors::{CfgError, ErrorKind};
pub use settings::{EngineSettings, SETTINGS_FILE};
pub use model::{Block, ConfigDetails, ConfigMeta, Configuration, Group, Ioc, RunControlSpec};
pub use dependency::DependencyTracker;
pub use vcs::{GitBackend, NullStore, RevisionStore, VcsBackend, VersionedStore};
pub use storage::{ConfigFileStore, ItemRef};
pub use catalogue::ConfigListManager;
pub use activation::{ActivationReport, ActiveConfigHolder, ProcessControl, ProcessDiff, ProcessSupervisor};
pub use extensions::{ExtensionKind, ExtensionRegistry, ReadableExtension, WritableExtension};
pub use publish::{MetadataBoard, MetadataSnapshot, Topic};
pub use queue::{FileWatcher, FileWatcherGuard, Operation, Outcome, QueueHandle, Ticket};
pub use engine::{Collaborators, Engine};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
