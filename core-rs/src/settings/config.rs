/**
 * config.rs
 * Parser for blockcfg.yaml engine settings (YAML format)
 *
 * Format:
 * ```yaml
 * apiVersion: blockcfg/v1
 * kind: EngineSettings
 * layout:
 *   configurationsDir: configurations
 *   componentsDir: components
 *   lastConfigFile: last_config.txt
 * vcs:
 *   enabled: true
 *   pushIntervalMs: 5000
 *   retryIntervalMs: 60000
 *   ignorePatterns: ["^zz_test_"]
 *   disallowedBranches: [master, main]
 *   hostBranchPattern: "^ND[XHE]"
 * watcher:
 *   enabled: true
 *   debounceMs: 400
 *   settleMs: 500
 * process:
 *   pollIntervalMs: 500
 *   maxPolls: 20
 *   protected: [INSTETC_01, ALARM]
 * runControl:
 *   prefix: "CS:SB:"
 * ```
 *
 * Every section is optional; missing fields take their defaults.
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{CfgError, Result};

pub const API_VERSION: &str = "blockcfg/v1";
pub const SETTINGS_KIND: &str = "EngineSettings";

/// Default settings file name inside the data root
pub const SETTINGS_FILE: &str = "blockcfg.yaml";

/// blockcfg.yaml file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub layout: LayoutSettings,
    #[serde(default)]
    pub vcs: VcsSettings,
    #[serde(default)]
    pub watcher: WatcherSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub process: ProcessSettings,
    #[serde(default)]
    pub run_control: RunControlSettings,
}

/// On-disk layout below the data root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutSettings {
    pub configurations_dir: String,
    pub components_dir: String,
    pub last_config_file: String,
    pub synoptics_dir: String,
    pub devices_dir: String,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            configurations_dir: "configurations".to_string(),
            components_dir: "components".to_string(),
            last_config_file: "last_config.txt".to_string(),
            synoptics_dir: "synoptics".to_string(),
            devices_dir: "devices".to_string(),
        }
    }
}

/// Version control behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct VcsSettings {
    pub enabled: bool,
    pub push_interval_ms: u64,
    pub retry_interval_ms: u64,
    /// Regexes matched against item/file names; matches bypass version control
    pub ignore_patterns: Vec<String>,
    pub disallowed_branches: Vec<String>,
    /// Branches matching this pattern are host branches and must equal the host name
    pub host_branch_pattern: Option<String>,
    /// Overrides the host name read from the environment
    pub host_name: Option<String>,
}

impl Default for VcsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            push_interval_ms: 5_000,
            retry_interval_ms: 60_000,
            ignore_patterns: vec!["^zz_test_".to_string()],
            disallowed_branches: vec!["master".to_string(), "main".to_string()],
            host_branch_pattern: Some("^ND[XHE]".to_string()),
            host_name: None,
        }
    }
}

impl VcsSettings {
    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Host name used for host-branch checks
    ///
    /// Settings take precedence over `HOSTNAME` / `COMPUTERNAME`.
    pub fn resolved_host_name(&self) -> Option<String> {
        self.host_name
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .or_else(|| std::env::var("COMPUTERNAME").ok())
            .filter(|h| !h.trim().is_empty())
    }
}

/// Filesystem watcher behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WatcherSettings {
    pub enabled: bool,
    /// Quiet period before a burst of events for one item is acted on
    pub debounce_ms: u64,
    /// Events arriving this soon after the engine resumes the watcher are its own writes
    pub settle_ms: u64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 400,
            settle_ms: 500,
        }
    }
}

impl WatcherSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueSettings {
    pub idle_sleep_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { idle_sleep_ms: 100 }
    }
}

impl QueueSettings {
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}

/// Managed process (IOC) control
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessSettings {
    pub poll_interval_ms: u64,
    /// Status polls before a start/stop/restart is abandoned
    pub max_polls: u32,
    /// Processes never stopped by an activation diff
    pub protected: Vec<String>,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            max_polls: 20,
            protected: Vec::new(),
        }
    }
}

impl ProcessSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.iter().any(|p| p.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RunControlSettings {
    /// Prefix prepended to `<block>:RC:<field>` keys
    pub prefix: String,
}

impl Default for RunControlSettings {
    fn default() -> Self {
        Self {
            prefix: "CS:SB:".to_string(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: SETTINGS_KIND.to_string(),
            layout: LayoutSettings::default(),
            vcs: VcsSettings::default(),
            watcher: WatcherSettings::default(),
            queue: QueueSettings::default(),
            process: ProcessSettings::default(),
            run_control: RunControlSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Load settings from the specified path
    ///
    /// # Example
    /// ```no_run
    /// use blockcfg_core::settings::EngineSettings;
    ///
    /// let settings = EngineSettings::load("/instrument/settings/blockcfg.yaml").unwrap();
    /// assert!(settings.vcs.push_interval_ms > 0);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(CfgError::NotFound(format!(
                "settings file {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        let settings: EngineSettings = serde_yaml::from_str(&content).map_err(|e| {
            CfgError::Validation(format!("Invalid {} YAML: {}", path.display(), e))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Load `blockcfg.yaml` from the data root, or defaults when absent
    pub fn load_from_root<P: AsRef<Path>>(root: P) -> Result<Self> {
        let path = root.as_ref().join(SETTINGS_FILE);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate settings structure
    pub fn validate(&self) -> Result<()> {
        if self.api_version != API_VERSION {
            return Err(CfgError::Validation(format!(
                "Invalid apiVersion: expected '{}', got '{}'",
                API_VERSION, self.api_version
            )));
        }

        if self.kind != SETTINGS_KIND {
            return Err(CfgError::Validation(format!(
                "Invalid kind: expected '{}', got '{}'",
                SETTINGS_KIND, self.kind
            )));
        }

        let layout = &self.layout;
        for (field, value) in [
            ("layout.configurationsDir", &layout.configurations_dir),
            ("layout.componentsDir", &layout.components_dir),
            ("layout.lastConfigFile", &layout.last_config_file),
        ] {
            if value.trim().is_empty() {
                return Err(CfgError::Validation(format!("{} cannot be empty", field)));
            }
        }

        if layout.configurations_dir == layout.components_dir {
            return Err(CfgError::Validation(
                "configurations and components must live in different directories".to_string(),
            ));
        }

        if self.process.max_polls == 0 {
            return Err(CfgError::Validation(
                "process.maxPolls must be at least 1".to_string(),
            ));
        }

        for pattern in self
            .vcs
            .ignore_patterns
            .iter()
            .chain(self.vcs.host_branch_pattern.iter())
        {
            regex::Regex::new(pattern)?;
        }

        Ok(())
    }

    /// Save settings to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path.as_ref(), yaml)?;
        Ok(())
    }

    pub fn configurations_root(&self, root: &Path) -> PathBuf {
        root.join(&self.layout.configurations_dir)
    }

    pub fn components_root(&self, root: &Path) -> PathBuf {
        root.join(&self.layout.components_dir)
    }
}
