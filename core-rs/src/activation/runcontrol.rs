//! Run-control threshold synchronisation
//!
//! Each block owns three keys on the control network:
//! `<prefix><BLOCK>:RC:LOW`, `<prefix><BLOCK>:RC:HIGH` and
//! `<prefix><BLOCK>:RC:ENABLE`. Writes are best-effort per block.

use crate::errors::{CfgError, Result};
use crate::model::{Configuration, RunControlSpec};
use std::sync::Arc;
use tracing::{debug, warn};

/// External key/value transport for run-control settings
pub trait RunControlTransport: Send + Sync {
    fn get(&self, key: &str) -> Result<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

pub struct RunControlManager {
    transport: Arc<dyn RunControlTransport>,
    prefix: String,
}

impl RunControlManager {
    pub fn new(transport: Arc<dyn RunControlTransport>, prefix: impl Into<String>) -> Self {
        Self {
            transport,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, block: &str, field: &str) -> String {
        format!("{}{}:RC:{}", self.prefix, block.to_uppercase(), field)
    }

    fn write_spec(&self, block: &str, spec: &RunControlSpec) -> Result<()> {
        if let Some(low) = spec.low_limit {
            self.transport.set(&self.key(block, "LOW"), &low.to_string())?;
        }
        if let Some(high) = spec.high_limit {
            self.transport.set(&self.key(block, "HIGH"), &high.to_string())?;
        }
        self.transport.set(
            &self.key(block, "ENABLE"),
            if spec.enabled { "1" } else { "0" },
        )
    }

    /// Push the thresholds of every block; returns the number of failed blocks
    pub fn sync(&self, config: &Configuration) -> usize {
        let mut failures = 0;
        for block in config.blocks() {
            let result = match &block.runcontrol {
                Some(spec) => self.write_spec(&block.name, spec),
                None => self.transport.set(&self.key(&block.name, "ENABLE"), "0"),
            };
            if let Err(e) = result {
                warn!("[RunControl] Could not set thresholds for {}: {}", block.name, e);
                failures += 1;
            }
        }
        debug!(
            "[RunControl] Synchronised {} block(s), {} failure(s)",
            config.blocks().len(),
            failures
        );
        failures
    }

    /// Current live thresholds of one block
    pub fn read(&self, block: &str) -> Result<RunControlSpec> {
        let parse = |field: &str| -> Result<Option<f64>> {
            let raw = self.transport.get(&self.key(block, field))?;
            if raw.trim().is_empty() {
                return Ok(None);
            }
            raw.trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|e| CfgError::Validation(format!("{} {} is not a number: {}", block, field, e)))
        };
        let enabled = self.transport.get(&self.key(block, "ENABLE"))?;
        Ok(RunControlSpec {
            enabled: matches!(enabled.trim(), "1" | "YES" | "true"),
            low_limit: parse("LOW")?,
            high_limit: parse("HIGH")?,
        })
    }

    /// Copy live thresholds into the configuration's own blocks
    ///
    /// Component blocks are left alone since they are saved with their
    /// component. Blocks whose values cannot be read keep their stored spec.
    pub fn capture(&self, config: &mut Configuration) {
        let own: Vec<_> = config
            .blocks()
            .iter()
            .filter(|b| b.component.is_none())
            .cloned()
            .collect();
        for mut block in own {
            match self.read(&block.name) {
                Ok(spec) => {
                    let disabled_default =
                        !spec.enabled && spec.low_limit.is_none() && spec.high_limit.is_none();
                    block.runcontrol = if disabled_default { None } else { Some(spec) };
                    if let Err(e) = config.edit_block(block) {
                        warn!("[RunControl] Could not record thresholds: {}", e);
                    }
                }
                Err(e) => debug!("[RunControl] Keeping stored thresholds for {}: {}", block.name, e),
            }
        }
    }
}
