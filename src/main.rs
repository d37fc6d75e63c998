mod cmd;
mod config;
mod error;
mod hardware;
mod lsblk;
mod pipeline;
mod planner;
mod session;
mod settings;
mod shell;
mod steps;
mod ui;
mod validate;

use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use error::InstallerError;
use session::Session;
use settings::Settings;
use steps::preflight::SystemPreflight;
use validate::SystemInventory;

/// Guided Arch Linux installer for a single UEFI disk.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Print every command instead of running it; nothing is written to disk.
    #[arg(long)]
    dry_run: bool,

    /// TOML file overriding the engine settings.
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Configuration preset to start the menu from.
    #[arg(long, value_name = "FILE")]
    preset: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_name = "FILE", default_value = "/tmp/arch-installer.log")]
    log_file: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check a preset against this machine without installing anything.
    Validate { preset: PathBuf },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_file);

    let result = match &cli.command {
        Some(Command::Validate { preset }) => validate_preset(&cli, preset),
        None => run(&cli),
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        println!();
        ui::print_error(&e.to_string());
        match &e {
            InstallerError::StageFailure { stage, .. } => {
                ui::print_info(&format!(
                    "Stage '{stage}' did not complete and mounts were released. \
                     Fix the cause and run the installer again; the disk will be repartitioned from scratch."
                ));
                ui::print_info(&format!("Details are in {}", cli.log_file.display()));
            }
            InstallerError::Interrupted { after: Some(_) } => {
                ui::print_info("Mounts were released. The disk holds a partial install; run the installer again.");
            }
            _ => {}
        }
        std::process::exit(e.exit_code());
    }
}

/// Logs go to a file so they never tear up the interactive prompts.
fn init_logging(level: &str, path: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match File::create(path) {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init(),
        Err(e) => {
            ui::print_warning(&format!("Cannot open log file {}: {}", path.display(), e));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::sink)
                .init();
        }
    }
}

fn run(cli: &Cli) -> Result<(), InstallerError> {
    ui::print_banner();
    if cli.dry_run {
        ui::print_warning("DRY-RUN MODE: no disk will be touched, no command will run.");
    }
    tracing::info!(dry_run = cli.dry_run, version = env!("CARGO_PKG_VERSION"), "installer started");

    SystemPreflight { dry_run: cli.dry_run }.check_environment()?;

    // Ctrl-C only raises the flag; the pipeline stops at the next stage boundary.
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupt);
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!("cannot install Ctrl-C handler: {e}");
    }

    let settings = Settings::load(cli.settings.as_deref())?;
    let mut session = Session::new(settings, Box::new(SystemInventory::load()), cli.dry_run);
    if let Some(preset) = &cli.preset {
        shell::apply_preset(&mut session, preset)?;
    }

    ui::print_info("Configure the installation, review it, then start it from the menu.");
    match shell::run(&mut session, &interrupt)? {
        shell::Outcome::Installed => tracing::info!("installation finished"),
        shell::Outcome::Exited => tracing::info!("operator left the menu"),
    }
    Ok(())
}

/// `validate <preset>`: field checks and layout only, no system preconditions.
fn validate_preset(cli: &Cli, path: &Path) -> Result<(), InstallerError> {
    let settings = Settings::load(cli.settings.as_deref())?;
    let inventory = SystemInventory::load();

    let mut config = session::load_preset(path)?;
    config.refresh_disk(&inventory);
    let reasons = config.validate_all(&settings, &inventory);
    if !reasons.is_empty() {
        return Err(InstallerError::Incomplete(reasons));
    }

    let extents = config.plan(&settings)?;
    ui::print_kv_box("Partition layout", &shell::extent_rows(&extents));
    ui::print_success(&format!("{} is valid for this machine.", path.display()));
    Ok(())
}
