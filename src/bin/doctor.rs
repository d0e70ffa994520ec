//! Diagnostics CLI: validate a deployment's configuration and persistent
//! store without starting the frame/websocket servers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vxl_core::config::CoreConfig;
use vxl_core::store::Store;

#[derive(Parser)]
#[command(name = "vxl-doctor", version, about)]
struct Cli {
    /// Path to the TOML configuration file (defaults to the standard location).
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run every check (default).
    Check,
    /// Print the resolved configuration, with secrets redacted.
    ShowConfig,
    /// Open the store and report table counts.
    CheckStore,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vxl_doctor=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::load_or_default()?,
    };

    match cli.command.unwrap_or(Command::Check) {
        Command::Check => run_all_checks(&config),
        Command::ShowConfig => show_config(&config),
        Command::CheckStore => check_store(&config),
    }
}

fn run_all_checks(config: &CoreConfig) -> anyhow::Result<()> {
    let mut failures = 0usize;

    println!("config: loaded from {}", CoreConfig::default_path().display());

    match config.agent.api_key.resolve() {
        Ok(Some(_)) => println!("agent api key: resolved"),
        Ok(None) => println!("agent api key: none configured"),
        Err(e) => {
            println!("agent api key: FAILED ({e})");
            failures += 1;
        }
    }

    match Store::open(&config.store) {
        Ok(_) => println!("store: opened {} and applied schema", config.store.db_path.display()),
        Err(e) => {
            println!("store: FAILED ({e})");
            failures += 1;
        }
    }

    if failures == 0 {
        println!("\nall checks passed");
        Ok(())
    } else {
        anyhow::bail!("{failures} check(s) failed");
    }
}

fn show_config(config: &CoreConfig) -> anyhow::Result<()> {
    let mut redacted = config.clone();
    redacted.agent.api_key = vxl_core::config::SecretRef::None;
    println!("{}", toml::to_string_pretty(&redacted)?);
    Ok(())
}

fn check_store(config: &CoreConfig) -> anyhow::Result<()> {
    let store = Store::open(&config.store)?;
    let gallery = store.load_gallery()?;
    println!("faces: {}", gallery.len());
    Ok(())
}
