use std::path::PathBuf;

use crate::{cmd::CommandRunner, config::Configuration, error::InstallerError, settings::Settings, ui};

const SUDOERS_DROP_IN: &str = "etc/sudoers.d/10-wheel";

/// Runs `program args…` inside the new root via `arch-chroot`.
fn in_root(
    runner: &mut dyn CommandRunner,
    settings: &Settings,
    program: &str,
    args: &[&str],
) -> Result<(), InstallerError> {
    let target = settings.target_path("");
    let mut full: Vec<&str> = vec![target.as_str(), program];
    full.extend_from_slice(args);
    runner.run("arch-chroot", &full)
}

fn write(
    runner: &mut dyn CommandRunner,
    settings: &Settings,
    rel: &str,
    contents: &str,
    append: bool,
) -> Result<(), InstallerError> {
    runner.write_file(&PathBuf::from(settings.target_path(rel)), contents, append)
}

/// Charset column for `locale.gen`: `en_US.UTF-8` → `UTF-8`. Locales without
/// an explicit codeset are the legacy ISO-8859-1 ones.
fn charset(locale: &str) -> &str {
    locale
        .split_once('.')
        .map(|(_, cs)| cs.split('@').next().unwrap_or(cs))
        .unwrap_or("ISO-8859-1")
}

/// Applies system settings inside the new root, in this order: timezone,
/// locale, keymap, hostname, accounts (users, sudo, passwords), network.
pub fn configure(
    runner: &mut dyn CommandRunner,
    config: &Configuration,
    settings: &Settings,
) -> Result<(), InstallerError> {
    // Timezone
    let zone = format!("/usr/share/zoneinfo/{}", config.timezone);
    in_root(runner, settings, "ln", &["-sf", &zone, "/etc/localtime"])?;
    in_root(runner, settings, "hwclock", &["--systohc"])?;
    ui::print_success(&format!("Timezone set to {}.", config.timezone));

    // Locale
    let entry = format!("{} {}\n", config.locale, charset(&config.locale));
    write(runner, settings, "etc/locale.gen", &entry, true)?;
    in_root(runner, settings, "locale-gen", &[])?;
    write(runner, settings, "etc/locale.conf", &format!("LANG={}\n", config.locale), false)?;
    ui::print_success(&format!("Locale {} generated.", config.locale));

    // Keymap
    write(runner, settings, "etc/vconsole.conf", &format!("KEYMAP={}\n", config.keymap), false)?;
    ui::print_success(&format!("Console keymap set to {}.", config.keymap));

    // Hostname
    write(runner, settings, "etc/hostname", &format!("{}\n", config.hostname), false)?;
    let hosts = format!(
        "127.0.0.1\tlocalhost\n::1\t\tlocalhost\n127.0.1.1\t{0}.localdomain\t{0}\n",
        config.hostname
    );
    write(runner, settings, "etc/hosts", &hosts, true)?;
    ui::print_success(&format!("Hostname set to {}.", config.hostname));

    // Accounts
    if let Some(pw) = &config.root_password {
        runner.run_with_stdin("arch-chroot", &[&settings.target_path(""), "chpasswd"], &format!("root:{}\n", pw))?;
    } else {
        ui::print_warning("No root password set; root login stays locked.");
    }

    if !config.username.is_empty() {
        let user = config.username.as_str();
        if config.sudo_enabled {
            in_root(runner, settings, "useradd", &["-m", "-G", "wheel", "-s", "/bin/bash", user])?;
            write(runner, settings, SUDOERS_DROP_IN, "%wheel ALL=(ALL:ALL) ALL\n", false)?;
            runner.run("chmod", &["0440", &settings.target_path(SUDOERS_DROP_IN)])?;
        } else {
            in_root(runner, settings, "useradd", &["-m", "-s", "/bin/bash", user])?;
        }
        if let Some(pw) = &config.user_password {
            runner.run_with_stdin(
                "arch-chroot",
                &[&settings.target_path(""), "chpasswd"],
                &format!("{}:{}\n", user, pw),
            )?;
        }
        let sudo = if config.sudo_enabled { " with sudo" } else { "" };
        ui::print_success(&format!("User '{}' created{}.", user, sudo));
    }

    // Network
    in_root(runner, settings, "systemctl", &["enable", "NetworkManager"])?;
    ui::print_success("NetworkManager enabled.");

    Ok(())
}
