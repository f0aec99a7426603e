//! Engine settings (blockcfg.yaml)

mod config;

pub use config::{
    EngineSettings, LayoutSettings, ProcessSettings, QueueSettings, RunControlSettings,
    VcsSettings, WatcherSettings, API_VERSION, SETTINGS_FILE, SETTINGS_KIND,
};
