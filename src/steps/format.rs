use crate::{
    cmd::CommandRunner,
    error::InstallerError,
    pipeline::InstallPlan,
    planner::ExtentFormat,
    ui,
};

/// Creates a filesystem on every planned partition: FAT32 for EFI, a swap
/// signature for SWAP, and the configured filesystem for ROOT and HOME.
pub fn run(runner: &mut dyn CommandRunner, plan: &InstallPlan) -> Result<(), InstallerError> {
    for part in &plan.partitions {
        let dev = part.device.as_str();
        let label = part.extent.role.label();

        match part.extent.format {
            ExtentFormat::Fat32 => runner.run("mkfs.fat", &["-F", "32", "-n", "EFI", dev])?,
            ExtentFormat::Swap => runner.run("mkswap", &["-L", label, dev])?,
            ExtentFormat::Fs(fs) => runner.run(fs.mkfs(), &[fs.force_flag(), "-L", label, dev])?,
        }

        ui::print_success(&format!(
            "{} formatted as {} ({}).",
            dev, part.extent.format, part.extent.role
        ));
    }
    Ok(())
}
