//! blockcfg - configuration engine CLI
//!
//! `serve` runs the engine on a data root until interrupted; the other
//! commands inspect a data root without activating anything.

use anyhow::{bail, Context, Result};
use blockcfg_core::catalogue::{ConfigListManager, ImportReport};
use blockcfg_core::model::StructuralValidator;
use blockcfg_core::naming::{self, DEFAULT_COMPONENT_TOKEN, DEFAULT_CONFIG_TOKEN};
use blockcfg_core::publish::MetadataBoard;
use blockcfg_core::settings::EngineSettings;
use blockcfg_core::storage::ConfigFileStore;
use blockcfg_core::vcs::NullStore;
use blockcfg_core::{Collaborators, Engine};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blockcfg")]
#[command(version)]
#[command(about = "Configuration management and activation engine", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine until Ctrl+C
    Serve {
        /// Data root holding configurations/ and components/
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Settings file (default: <root>/blockcfg.yaml)
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Use in-memory process control and run-control
        #[arg(long)]
        simulate: bool,
    },
    /// List stored configurations (or components) with their identifiers
    List {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        components: bool,
    },
    /// Validate every item under the data root
    Check {
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Print the identifier a name would get
    DerivePv {
        name: String,
        /// Identifiers already taken
        #[arg(long = "existing", short = 'e')]
        existing: Vec<String>,
        #[arg(long)]
        component: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Catalogue over the data root without version control or activation
fn offline_catalogue(root: &Path) -> Result<(ConfigListManager, ImportReport)> {
    let settings = EngineSettings::load_from_root(root)
        .with_context(|| format!("Failed to load settings from {}", root.display()))?;
    let files = Arc::new(ConfigFileStore::new(
        root.to_path_buf(),
        settings.layout,
        Arc::new(StructuralValidator),
    ));
    let mut catalogue = ConfigListManager::new(files, Arc::new(NullStore), Arc::new(MetadataBoard::new()));
    let report = catalogue.import_all()?;
    Ok((catalogue, report))
}

fn serve(root: PathBuf, settings_path: Option<PathBuf>, simulate: bool) -> Result<()> {
    if !simulate {
        bail!("no process-control service is configured; run with --simulate");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        eprintln!("[Engine] Received SIGTERM/SIGINT, shutting down gracefully...");
        shutdown_clone.store(true, Ordering::SeqCst);
    })?;

    let settings = match &settings_path {
        Some(path) => EngineSettings::load(path),
        None => EngineSettings::load_from_root(&root),
    }
    .context("Failed to load settings")?;
    let engine = Engine::open(root.clone(), settings, Collaborators::simulated())
        .with_context(|| format!("Failed to open {}", root.display()))?;
    engine.start()?;

    let active = engine.active_name();
    println!(
        "Serving {} (active: {})",
        root.display(),
        if active.is_empty() { "<blank>" } else { active.as_str() }
    );

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    engine.stop();
    engine.flush();
    if let Err(e) = engine.flush_push() {
        eprintln!("[Engine] Final push failed: {}", e);
    }
    eprintln!("[Engine] Shutdown complete");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve {
            root,
            settings,
            simulate,
        } => serve(root, settings, simulate)?,

        Commands::List { root, components } => {
            let (catalogue, _) = offline_catalogue(&root)?;
            let items = catalogue.list(components);
            if items.is_empty() {
                println!("No {} found", if components { "components" } else { "configurations" });
            }
            for meta in items {
                let marker = if meta.protected { " (protected)" } else { "" };
                println!("{:<32} {}{}", meta.name, meta.pv, marker);
                if components {
                    let dependents = catalogue.dependents(&meta.name);
                    if !dependents.is_empty() {
                        println!("{:<32}   used by: {}", "", dependents.join(", "));
                    }
                }
            }
        }

        Commands::Check { root } => {
            let (_, report) = offline_catalogue(&root)?;
            println!(
                "✓ {} configurations, {} components",
                report.configurations, report.components
            );
            for (item, reason) in &report.skipped {
                println!("✗ {}: {}", item, reason);
            }
            if !report.skipped.is_empty() {
                std::process::exit(1);
            }
        }

        Commands::DerivePv {
            name,
            existing,
            component,
        } => {
            let token = if component {
                DEFAULT_COMPONENT_TOKEN
            } else {
                DEFAULT_CONFIG_TOKEN
            };
            let taken: HashSet<String> = existing.into_iter().collect();
            println!("{}", naming::derive(&name, &taken, token));
        }
    }

    Ok(())
}
