use std::path::PathBuf;

use crate::{
    cmd::CommandRunner,
    config::{Bootloader, Configuration, KernelVariant, Microcode},
    error::InstallerError,
    pipeline::InstallPlan,
    planner::PartitionRole,
    settings::Settings,
    ui,
};

const LOADER_CONF: &str = "default arch.conf\ntimeout 3\nconsole-mode max\neditor no\n";

/// Renders the systemd-boot entry. The microcode image, when there is one,
/// comes before the main initramfs so the CPU is patched first.
pub fn render_entry(kernel: KernelVariant, microcode: Microcode, root_partuuid: &str) -> String {
    let mut entry = format!("title   Arch Linux ({})\nlinux   {}\n", kernel, kernel.image());
    if let Some(ucode) = microcode.early_image() {
        entry.push_str(&format!("initrd  {}\n", ucode));
    }
    entry.push_str(&format!("initrd  {}\n", kernel.initramfs()));
    entry.push_str(&format!("options root=PARTUUID={} rw\n", root_partuuid));
    entry
}

/// Installs and configures the chosen bootloader on the mounted ESP.
pub fn install(
    runner: &mut dyn CommandRunner,
    config: &Configuration,
    plan: &InstallPlan,
    settings: &Settings,
) -> Result<(), InstallerError> {
    let target = settings.target_path("");

    match config.bootloader {
        Bootloader::Grub => {
            runner.run(
                "arch-chroot",
                &[
                    &target,
                    "grub-install",
                    "--target=x86_64-efi",
                    "--efi-directory=/boot",
                    "--bootloader-id=GRUB",
                ],
            )?;
            runner.run("arch-chroot", &[&target, "grub-mkconfig", "-o", "/boot/grub/grub.cfg"])?;
        }
        Bootloader::SystemdBoot => {
            runner.run("arch-chroot", &[&target, "bootctl", "install"])?;

            let root = plan.device(PartitionRole::Root)?;
            let partuuid = runner.capture("blkid", &["-s", "PARTUUID", "-o", "value", root])?;
            if partuuid.is_empty() {
                return Err(InstallerError::CommandFailed {
                    program: "blkid".to_string(),
                    code: 0,
                    detail: format!(": no PARTUUID reported for {}", root),
                });
            }

            let entry = render_entry(config.kernel, plan.microcode, &partuuid);
            runner.write_file(&PathBuf::from(settings.target_path("boot/loader/loader.conf")), LOADER_CONF, false)?;
            runner.write_file(
                &PathBuf::from(settings.target_path("boot/loader/entries/arch.conf")),
                &entry,
                false,
            )?;
        }
    }

    ui::print_success(&format!("Bootloader {} installed.", config.bootloader));
    Ok(())
}
