use crate::{
    cmd::CommandRunner,
    config::Configuration,
    error::InstallerError,
    pipeline::InstallPlan,
    settings::Settings,
    ui,
};

// ── Package selection ─────────────────────────────────────────────────────────

/// Full `pacstrap` package list: base set, kernel, resolved microcode and
/// GPU packages, then bootloader packages. Duplicates are dropped.
pub fn package_list(config: &Configuration, plan: &InstallPlan, settings: &Settings) -> Vec<String> {
    let mut pkgs: Vec<String> = settings.base_packages.clone();
    pkgs.push(config.kernel.package_name().to_string());
    pkgs.extend(plan.microcode.package().map(String::from));
    pkgs.extend(plan.gpu.packages().iter().map(|p| p.to_string()));
    pkgs.extend(config.bootloader.packages().iter().map(|p| p.to_string()));

    let mut seen = std::collections::HashSet::new();
    pkgs.retain(|p| seen.insert(p.clone()));
    pkgs
}

// ── Base system ───────────────────────────────────────────────────────────────

/// Installs the package list into the target root via `pacstrap`.
pub fn install_base(
    runner: &mut dyn CommandRunner,
    packages: &[String],
    settings: &Settings,
) -> Result<(), InstallerError> {
    // Package signature checks need a correct clock.
    runner.run_best_effort("timedatectl", &["set-ntp", "true"]);

    let target = settings.target_path("");
    ui::print_kv_box("Packages to install", &[("pacstrap", packages.join(" "))]);
    println!();

    let mut args: Vec<&str> = vec!["-K", target.as_str()];
    args.extend(packages.iter().map(String::as_str));

    // pacstrap shows download progress, so it streams to the terminal.
    runner.run_streaming("pacstrap", &args)?;

    ui::print_success("Base system installed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cmd::testing::RecordingRunner,
        config::{Bootloader, GpuDriver, KernelVariant, Microcode},
        pipeline::tests::sample_plan,
    };

    #[test]
    fn list_includes_resolved_hardware_packages() {
        let mut config = Configuration::default();
        config.kernel = KernelVariant::Lts;
        config.bootloader = Bootloader::Grub;

        let mut plan = sample_plan(2);
        plan.microcode = Microcode::Intel;
        plan.gpu = GpuDriver::Amdgpu;

        let pkgs = package_list(&config, &plan, &Settings::default());
        assert_eq!(&pkgs[..4], ["base", "linux-firmware", "networkmanager", "sudo"]);
        for p in ["linux-lts", "intel-ucode", "mesa", "vulkan-radeon", "grub", "efibootmgr"] {
            assert!(pkgs.iter().any(|x| x == p), "missing {p}");
        }
    }

    #[test]
    fn none_choices_add_nothing() {
        let mut config = Configuration::default();
        config.bootloader = Bootloader::SystemdBoot;
        let mut plan = sample_plan(0);
        plan.microcode = Microcode::None;
        plan.gpu = GpuDriver::None;

        let pkgs = package_list(&config, &plan, &Settings::default());
        assert_eq!(pkgs, ["base", "linux-firmware", "networkmanager", "sudo", "linux"]);
    }

    #[test]
    fn pacstrap_targets_root() {
        let mut runner = RecordingRunner::default();
        let pkgs = vec!["base".to_string(), "linux".to_string()];
        install_base(&mut runner, &pkgs, &Settings::default()).unwrap();
        assert!(runner.ran("pacstrap -K /mnt base linux"));
    }
}
