//! # vprj CLI
//!
//! Command-line host for the projected filesystem dispatcher.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use vprj_config::logging::{init_logging, LogLevel};
use vprj_config::{log_cli_debug, Config};
use vprj_dispatch::{MountIdentity, VirtualFile};

mod hydrate;

/// vprj - projected filesystem over a content-addressable store
#[derive(Parser)]
#[command(name = "vprj")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Content store root (overrides [storage] cas_root)
    #[arg(long = "cas-root", env = "VPRJ_CAS_ROOT")]
    cas_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Print the `.vprj/config` file served to processes inside the projection
    Show {
        /// Repository root to report (defaults to [mount] root)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Ingest SOURCE and write out its projection by driving the dispatcher
    Hydrate {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        #[arg(value_name = "TARGET")]
        target: PathBuf,

        /// Directory entries accepted per enumeration callback
        #[arg(long, default_value_t = hydrate::DEFAULT_BATCH)]
        batch: usize,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the global config file location
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load configuration")?;
    init_logging(config.logging.level.parse().unwrap_or(LogLevel::Warn));
    if let Some(cas_root) = cli.cas_root {
        config.storage.cas_root = cas_root;
    }
    log_cli_debug!("Configuration loaded", cas_root = %config.storage.cas_root.display());

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                print!("{}", config.to_toml());
                Ok(())
            }
            ConfigCommands::Path => {
                match Config::global_config_path() {
                    Some(path) => println!("{}", path.display()),
                    None => anyhow::bail!("No home directory"),
                }
                Ok(())
            }
        },
        Commands::Show { root } => cmd_show(&config, root),
        Commands::Hydrate { source, target, batch } => {
            let report = hydrate::run(&config, &source, &target, batch)?;
            println!("Hydrated {} into {}", source.display(), target.display());
            println!("  Files:       {}", report.files);
            println!("  Directories: {}", report.directories);
            println!("  Bytes:       {}", report.bytes);
            println!("  Callbacks:   {}", report.callbacks);
            Ok(())
        }
    }
}

fn cmd_show(config: &Config, root: Option<PathBuf>) -> Result<()> {
    let mut mount = MountIdentity::from(&config.mount);
    if let Some(root) = root {
        mount.root = root;
    }
    let file = VirtualFile::synthesize(&mount).context("Failed to render virtual file")?;
    print!("{}", String::from_utf8_lossy(file.content()));
    Ok(())
}
