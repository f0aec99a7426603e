//! Blocks: user-facing aliases for a single PV

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_log_rate() -> f64 {
    5.0
}

/// Run-control thresholds for one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunControlSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_limit: Option<f64>,
}

impl RunControlSpec {
    pub fn new(enabled: bool, low_limit: f64, high_limit: f64) -> Self {
        Self {
            enabled,
            low_limit: Some(low_limit),
            high_limit: Some(high_limit),
        }
    }
}

/// A named alias for one PV, optionally run-controlled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub name: String,

    /// Underlying PV address
    pub pv: String,

    /// Local blocks have the instrument prefix prepended to `pv`
    #[serde(default = "default_true")]
    pub local: bool,

    #[serde(default = "default_true")]
    pub visible: bool,

    /// Owning component, `None` when defined directly in a configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runcontrol: Option<RunControlSpec>,

    #[serde(default)]
    pub log_periodic: bool,

    #[serde(default = "default_log_rate")]
    pub log_rate: f64,

    #[serde(default)]
    pub log_deadband: f64,
}

impl Block {
    pub fn new(name: impl Into<String>, pv: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pv: pv.into(),
            local: true,
            visible: true,
            component: None,
            runcontrol: None,
            log_periodic: false,
            log_rate: default_log_rate(),
            log_deadband: 0.0,
        }
    }

    pub fn with_runcontrol(mut self, spec: RunControlSpec) -> Self {
        self.runcontrol = Some(spec);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn remote(mut self) -> Self {
        self.local = false;
        self
    }

    /// Case-insensitive name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Full PV address given the instrument prefix
    pub fn resolved_pv(&self, instrument_prefix: &str) -> String {
        if self.local {
            format!("{}{}", instrument_prefix, self.pv)
        } else {
            self.pv.clone()
        }
    }
}
