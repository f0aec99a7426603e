//! Activation of configurations
//!
//! - `holder`: the live and staged configuration
//! - `diff`: process set transitions between configurations
//! - `process`: bounded process control on top of [`ProcessControl`]
//! - `runcontrol`: per-block threshold synchronisation

mod diff;
mod holder;
mod process;
mod runcontrol;

pub use diff::ProcessDiff;
pub use holder::{ActivationReport, ActiveConfigHolder};
pub use process::{ProcessAction, ProcessControl, ProcessReport, ProcessStatus, ProcessSupervisor};
pub use runcontrol::{RunControlManager, RunControlTransport};
