use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use toolcrib_kiosk::api::{HttpApi, KioskApi};
use toolcrib_kiosk::config::{self, KioskConfig};
use toolcrib_kiosk::logging::{LogTarget, init_logging};
use toolcrib_kiosk::{Error, Result};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the kiosk in this terminal
    Run {
        /// Path to the kiosk config TOML
        #[arg(long, default_value = "kiosk.toml")]
        config: PathBuf,
    },
    /// Query card reader and active session status once and print them
    Status {
        /// Path to the kiosk config TOML
        #[arg(long, default_value = "kiosk.toml")]
        config: PathBuf,
    },
    /// Print the effective config (after imports/extends and defaults)
    Resolve {
        /// Path to the kiosk config TOML
        #[arg(long, default_value = "kiosk.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    match args.cmd {
        Command::Run { config } => cmd_run(&config),
        Command::Status { config } => cmd_status(&config),
        Command::Resolve { config } => cmd_resolve(&config),
    }
}

fn cmd_run(path: &Path) -> Result<()> {
    let cfg = config::load_or_default(path)?;
    init_logging(&cfg.log, LogTarget::FileOnly)?;
    let api = HttpApi::new(&cfg)?;
    tracing::info!(base_url = api.base_url(), "kiosk starting");
    toolcrib_kiosk::ui::run_kiosk(Arc::new(api), cfg)
}

fn cmd_status(path: &Path) -> Result<()> {
    let cfg = config::load_or_default(path)?;
    init_logging(&cfg.log, LogTarget::Console)?;
    let api = HttpApi::new(&cfg)?;

    println!("server: {}", api.base_url());
    let card = api
        .card_status()
        .map_err(|e| Error::msg(format!("card status query failed: {e}")))?;
    println!("card reader: {card:?}");
    let active = api
        .active_session()
        .map_err(|e| Error::msg(format!("active session query failed: {e}")))?;
    match active.session {
        Some(s) => println!("active session: {s} ({})", cfg.routes.panel_for(&s)),
        None => println!("active session: none"),
    }
    Ok(())
}

fn cmd_resolve(path: &Path) -> Result<()> {
    let cfg: KioskConfig = config::load_or_default(path)?;
    let s = toml::to_string_pretty(&cfg)
        .map_err(|e| Error::msg(format!("failed to render config: {e}")))?;
    print!("{s}");
    Ok(())
}
