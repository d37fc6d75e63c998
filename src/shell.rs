//! Interactive menu driving configuration edits and the install pipeline.
//!
//! Every edit goes through the matching `Configuration` setter; a rejected
//! value is reported inline and the same field is asked again.

use std::{fmt::Display, path::PathBuf, sync::atomic::AtomicBool};

use dialoguer::{Confirm, Input, Password, Select};

use crate::{
    cmd::SystemRunner,
    config::{Bootloader, Configuration, Filesystem, GpuDriver, KernelVariant, Microcode},
    error::InstallerError,
    lsblk,
    pipeline::{InstallPipeline, InstallPlan},
    planner::{HomeSize, PartitionExtent},
    session::{self, Session},
    steps::preflight::SystemPreflight,
    ui,
};

/// How the menu loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Installed,
    Exited,
}

const MAIN_MENU: [&str; 8] = [
    "Disk",
    "Partitioning",
    "System settings",
    "Hardware",
    "Review",
    "Start installation",
    "Save preset",
    "Exit",
];

pub fn run(session: &mut Session, interrupt: &AtomicBool) -> Result<Outcome, InstallerError> {
    loop {
        println!();
        let choice = Select::new()
            .with_prompt("Main menu")
            .items(&MAIN_MENU)
            .default(0)
            .interact()?;

        match choice {
            0 => disk_menu(session)?,
            1 => partition_menu(session)?,
            2 => system_menu(session)?,
            3 => hardware_menu(session)?,
            4 => review(session),
            5 => {
                if start(session, interrupt)? {
                    return Ok(Outcome::Installed);
                }
            }
            6 => save_preset(session)?,
            _ => return Ok(Outcome::Exited),
        }
    }
}

// ── Field prompts ─────────────────────────────────────────────────────────────

/// Asks for a text value until `apply` accepts it.
fn ask_text<F>(prompt: &str, current: &str, mut apply: F) -> Result<(), InstallerError>
where
    F: FnMut(&str) -> Result<(), InstallerError>,
{
    loop {
        let value: String = Input::new()
            .with_prompt(prompt)
            .with_initial_text(current)
            .allow_empty(true)
            .interact_text()?;
        match apply(value.trim()) {
            Ok(()) => return Ok(()),
            Err(e) => ui::print_error(&e.to_string()),
        }
    }
}

/// Asks for a size in GiB until `apply` accepts it.
fn ask_gib<F>(prompt: &str, current: u64, mut apply: F) -> Result<(), InstallerError>
where
    F: FnMut(u64) -> Result<(), InstallerError>,
{
    loop {
        let value: u64 = Input::new()
            .with_prompt(prompt)
            .default(current)
            .interact_text()?;
        match apply(value) {
            Ok(()) => return Ok(()),
            Err(e) => ui::print_error(&e.to_string()),
        }
    }
}

/// Single choice among the fixed values of an enum.
fn choose<T: Copy + PartialEq + Display>(
    prompt: &str,
    options: &[T],
    current: T,
) -> Result<T, InstallerError> {
    let labels: Vec<String> = options.iter().map(T::to_string).collect();
    let default = options.iter().position(|o| *o == current).unwrap_or(0);
    let idx = Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(default)
        .interact()?;
    Ok(options[idx])
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(unset)"
    } else {
        value
    }
}

// ── Disk ──────────────────────────────────────────────────────────────────────

fn disk_menu(session: &mut Session) -> Result<(), InstallerError> {
    ui::print_section("Disk selection");

    let disks = lsblk::list_disks();
    let path = if disks.is_empty() {
        ui::print_warning("No disks reported by lsblk; enter the device path by hand.");
        Input::<String>::new()
            .with_prompt("Target disk")
            .default("/dev/sda".to_string())
            .interact_text()?
    } else {
        let labels: Vec<String> = disks.iter().map(|d| d.display()).collect();
        let idx = Select::new()
            .with_prompt("Target disk (it will be erased entirely)")
            .items(&labels)
            .default(0)
            .interact()?;
        disks[idx].path.clone()
    };

    let Session { config, inventory, .. } = session;
    if let Err(e) = config.set_disk(&path, &**inventory) {
        ui::print_error(&e.to_string());
        return Ok(());
    }
    ui::print_success(&format!("Target disk: {}", path));

    // Sizes picked for another disk may no longer fit.
    if session.config.root_size_gib > 0 {
        if let Err(e) = session.config.plan(&session.settings) {
            ui::print_warning(&format!("{} Adjust the partition sizes.", e));
        }
    }
    Ok(())
}

// ── Partitioning ──────────────────────────────────────────────────────────────

fn partition_menu(session: &mut Session) -> Result<(), InstallerError> {
    ui::print_section("Partitioning");
    if session.config.disk.is_none() {
        ui::print_info("No disk selected yet; sizes are checked against it once one is.");
    }

    let Session { config, settings, .. } = session;
    let min_root = settings.min_root_gib.max(config.root_size_gib);
    ask_gib("Root size (GiB)", min_root, |gib| config.set_root_size(gib, settings))?;
    ask_gib("Swap size (GiB, 0 for none)", config.swap_size_gib, |gib| {
        config.set_swap_size(gib, settings)
    })?;

    loop {
        let remaining = Confirm::new()
            .with_prompt("Give /home all remaining space?")
            .default(config.home_size == HomeSize::Remaining)
            .interact()?;
        let home = if remaining {
            HomeSize::Remaining
        } else {
            let gib: u64 = Input::new()
                .with_prompt("Home size (GiB)")
                .interact_text()?;
            HomeSize::Explicit(gib)
        };
        match config.set_home_size(home, settings) {
            Ok(()) => break,
            Err(e) => ui::print_error(&e.to_string()),
        }
    }

    config.filesystem = choose("Filesystem for root and home", &Filesystem::ALL, config.filesystem)?;

    match session.config.plan(&session.settings) {
        Ok(_) => ui::print_success("Layout fits the disk."),
        Err(InstallerError::Validation { .. }) => {}
        Err(e) => ui::print_warning(&e.to_string()),
    }
    Ok(())
}

// ── System settings ───────────────────────────────────────────────────────────

fn system_menu(session: &mut Session) -> Result<(), InstallerError> {
    loop {
        let c = &session.config;
        let items = [
            format!("Hostname       {}", or_unset(&c.hostname)),
            format!("Timezone       {}", or_unset(&c.timezone)),
            format!("Locale         {}", or_unset(&c.locale)),
            format!("Keymap         {}", or_unset(&c.keymap)),
            format!("Kernel         {}", c.kernel.display_name()),
            format!("Bootloader     {}", c.bootloader),
            format!("Root password  {}", if c.root_password.is_some() { "set" } else { "(unset)" }),
            format!("User account   {}", or_unset(&c.username)),
            "Back".to_string(),
        ];
        let choice = Select::new()
            .with_prompt("System settings")
            .items(&items)
            .default(0)
            .interact()?;

        let Session { config, inventory, .. } = session;
        let inv = &**inventory;
        match choice {
            0 => {
                let current = config.hostname.clone();
                ask_text("Hostname", &current, |v| config.set_hostname(v))?;
            }
            1 => {
                let current = config.timezone.clone();
                ask_text("Timezone (e.g. Europe/Berlin)", &current, |v| config.set_timezone(v, inv))?;
            }
            2 => {
                let current = config.locale.clone();
                ask_text("Locale (e.g. en_US.UTF-8)", &current, |v| config.set_locale(v, inv))?;
            }
            3 => {
                let current = config.keymap.clone();
                ask_text("Console keymap (e.g. us)", &current, |v| config.set_keymap(v, inv))?;
            }
            4 => config.kernel = choose("Kernel", &KernelVariant::ALL, config.kernel)?,
            5 => config.bootloader = choose("Bootloader", &Bootloader::ALL, config.bootloader)?,
            6 => config.root_password = ask_password("Root password")?,
            7 => user_menu(config)?,
            _ => return Ok(()),
        }
    }
}

fn user_menu(config: &mut Configuration) -> Result<(), InstallerError> {
    let current = config.username.clone();
    ask_text("Username (empty for none)", &current, |v| config.set_username(v))?;
    if config.username.is_empty() {
        config.sudo_enabled = false;
        return Ok(());
    }
    config.user_password = ask_password(&format!("Password for {}", config.username))?;
    config.sudo_enabled = Confirm::new()
        .with_prompt("Grant sudo through the wheel group?")
        .default(true)
        .interact()?;
    Ok(())
}

/// An empty password leaves the account without one.
fn ask_password(prompt: &str) -> Result<Option<String>, InstallerError> {
    let password = Password::new()
        .with_prompt(prompt)
        .with_confirmation("Confirm password", "Passwords do not match")
        .allow_empty_password(true)
        .interact()?;
    Ok(Some(password).filter(|p| !p.is_empty()))
}

// ── Hardware ──────────────────────────────────────────────────────────────────

fn hardware_menu(session: &mut Session) -> Result<(), InstallerError> {
    ui::print_section("Hardware");
    let hw = session.hardware();
    ui::print_info(&format!("Detected: {}", hw));
    ui::print_info(&format!(
        "auto resolves to microcode '{}' and GPU driver '{}'",
        Microcode::Auto.resolve(&hw),
        GpuDriver::Auto.resolve(&hw)
    ));

    let config = &mut session.config;
    config.microcode = choose("CPU microcode", &Microcode::ALL, config.microcode)?;
    config.gpu_driver = choose("GPU driver", &GpuDriver::ALL, config.gpu_driver)?;
    Ok(())
}

// ── Review ────────────────────────────────────────────────────────────────────

fn summary_rows(config: &Configuration) -> Vec<(String, String)> {
    let disk = match (&config.disk, config.disk_capacity_mib) {
        (Some(p), Some(mib)) => format!("{} ({} GiB)", p.display(), mib / 1024),
        (Some(p), None) => p.display().to_string(),
        (None, _) => "(unset)".to_string(),
    };
    let user = if config.username.is_empty() {
        "(none)".to_string()
    } else if config.sudo_enabled {
        format!("{} (sudo)", config.username)
    } else {
        config.username.clone()
    };
    vec![
        ("Disk".into(), disk),
        ("Root".into(), format!("{} GiB", config.root_size_gib)),
        ("Swap".into(), format!("{} GiB", config.swap_size_gib)),
        ("Home".into(), config.home_size.to_string()),
        ("Filesystem".into(), config.filesystem.to_string()),
        ("Hostname".into(), or_unset(&config.hostname).to_string()),
        ("Timezone".into(), or_unset(&config.timezone).to_string()),
        ("Locale".into(), or_unset(&config.locale).to_string()),
        ("Keymap".into(), or_unset(&config.keymap).to_string()),
        ("User".into(), user),
        ("Kernel".into(), config.kernel.display_name().to_string()),
        ("Bootloader".into(), config.bootloader.to_string()),
        ("Microcode".into(), config.microcode.to_string()),
        ("GPU driver".into(), config.gpu_driver.to_string()),
    ]
}

fn layout_rows(plan: &InstallPlan) -> Vec<(String, String)> {
    plan.partitions
        .iter()
        .map(|p| {
            (
                format!("{} {}", p.extent.role, p.device),
                format!(
                    "{} – {} MiB  {}",
                    p.extent.start_mib, p.extent.end_mib, p.extent.format
                ),
            )
        })
        .collect()
}

/// Layout rows for a plan that has no device names yet.
pub fn extent_rows(extents: &[PartitionExtent]) -> Vec<(String, String)> {
    extents
        .iter()
        .map(|e| (e.role.to_string(), format!("{} – {} MiB  {}", e.start_mib, e.end_mib, e.format)))
        .collect()
}

fn review(session: &Session) {
    ui::print_kv_box("Configuration", &summary_rows(&session.config));

    match session.config.plan(&session.settings) {
        Ok(extents) => ui::print_kv_box("Partition layout", &extent_rows(&extents)),
        Err(e) => ui::print_warning(&format!("No layout yet: {}", e)),
    }

    let reasons = session.config.validate_all(&session.settings, session.inventory());
    if reasons.is_empty() {
        ui::print_success("Configuration is complete.");
    } else {
        for r in reasons {
            ui::print_warning(&r);
        }
    }
}

// ── Start ─────────────────────────────────────────────────────────────────────

/// Validates, asks for the typed confirmation and runs the pipeline.
///
/// `Ok(false)` means the operator is back at the menu with nothing written:
/// validation rejected the configuration or the wipe was not confirmed.
fn start(session: &mut Session, interrupt: &AtomicBool) -> Result<bool, InstallerError> {
    let hw = session.hardware();
    let preflight = SystemPreflight {
        dry_run: session.dry_run,
    };
    let mut pipeline = InstallPipeline::new();

    let Session {
        config,
        settings,
        inventory,
        dry_run,
        ..
    } = session;

    let plan = match pipeline.validate(config, settings, &**inventory, &hw, &preflight) {
        Ok(plan) => plan,
        Err(InstallerError::Incomplete(reasons)) => {
            ui::print_error("The configuration cannot be installed yet:");
            for r in reasons {
                ui::print_warning(&r);
            }
            return Ok(false);
        }
        Err(e @ (InstallerError::Validation { .. } | InstallerError::Capacity(_))) => {
            ui::print_error(&e.to_string());
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    ui::print_kv_box("Install summary", &summary_rows(config));
    ui::print_kv_box("Partition layout", &layout_rows(plan));
    let disk = plan.disk_str();

    println!();
    ui::print_warning(&format!("ALL DATA ON {} WILL BE DESTROYED.", disk));
    let answer: String = Input::new()
        .with_prompt("Type YES to continue")
        .allow_empty(true)
        .interact_text()?;
    let accepted = answer.trim() == "YES";
    pipeline.confirm(accepted)?;
    if !accepted {
        ui::print_info("Cancelled. Nothing was written.");
        return Ok(false);
    }
    tracing::info!(disk = %disk, "operator confirmed wipe");

    let mut runner = SystemRunner::new(*dry_run);
    pipeline.execute(config, settings, &mut runner, interrupt)?;

    println!();
    ui::print_success("Installation complete.");
    ui::print_info(&format!(
        "The new system is still mounted at {}; unmount it with 'umount -R {}' before rebooting.",
        settings.target_root.display(),
        settings.target_root.display()
    ));
    Ok(true)
}

// ── Presets ───────────────────────────────────────────────────────────────────

fn save_preset(session: &Session) -> Result<(), InstallerError> {
    let path: String = Input::new()
        .with_prompt("Preset file")
        .default("arch-installer.toml".to_string())
        .interact_text()?;
    match session::save_preset(&session.config, &PathBuf::from(path.trim())) {
        Ok(()) => ui::print_success("Preset saved (passwords are never stored)."),
        Err(e) => ui::print_error(&e.to_string()),
    }
    Ok(())
}

/// Loads `path` into the session and reports what still needs attention.
pub fn apply_preset(session: &mut Session, path: &std::path::Path) -> Result<(), InstallerError> {
    let config = session::load_preset(path)?;
    let reasons = session.apply_preset(config);
    ui::print_success(&format!("Loaded preset {}", path.display()));
    for r in reasons {
        ui::print_warning(&r);
    }
    Ok(())
}
