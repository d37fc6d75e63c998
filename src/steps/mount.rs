use crate::{
    cmd::CommandRunner,
    error::InstallerError,
    pipeline::InstallPlan,
    planner::PartitionRole,
    settings::Settings,
    ui,
};

/// Everything the pipeline mounted or activated so far, in order.
/// [`MountTracker::release`] undoes it all.
#[derive(Debug, Default)]
pub struct MountTracker {
    mounts: Vec<String>,
    swaps: Vec<String>,
}

impl MountTracker {
    pub fn mounted(&self) -> &[String] {
        &self.mounts
    }

    pub fn swaps(&self) -> &[String] {
        &self.swaps
    }

    /// Deactivates swap, then unmounts in reverse mount order (children
    /// before the root they live under). Failures are logged, not raised.
    pub fn release(&mut self, runner: &mut dyn CommandRunner) {
        for swap in self.swaps.drain(..).rev() {
            tracing::info!(device = %swap, "deactivating swap");
            runner.run_best_effort("swapoff", &[&swap]);
        }
        for target in self.mounts.drain(..).rev() {
            tracing::info!(target = %target, "unmounting");
            runner.run_best_effort("umount", &[&target]);
        }
    }
}

/// Mounts the new system under the target root.
///
/// Mount order:
///   1. ROOT  → target
///   2. EFI   → target/boot
///   3. HOME  → target/home
///   4. SWAP  → swapon
pub fn run(
    runner: &mut dyn CommandRunner,
    plan: &InstallPlan,
    settings: &Settings,
    tracker: &mut MountTracker,
) -> Result<(), InstallerError> {
    let target = settings.target_path("");

    let root = plan.device(PartitionRole::Root)?;
    runner.run("mount", &[root, &target])?;
    tracker.mounts.push(target.clone());
    ui::print_success(&format!("{} mounted at {}.", root, target));

    for (role, dir) in [(PartitionRole::Efi, "boot"), (PartitionRole::Home, "home")] {
        let dev = plan.device(role)?;
        let mountpoint = settings.target_path(dir);
        runner.run("mkdir", &["-p", &mountpoint])?;
        runner.run("mount", &[dev, &mountpoint])?;
        tracker.mounts.push(mountpoint.clone());
        ui::print_success(&format!("{} mounted at {}.", dev, mountpoint));
    }

    if let Ok(swap) = plan.device(PartitionRole::Swap) {
        runner.run("swapon", &[swap])?;
        tracker.swaps.push(swap.to_string());
        ui::print_success(&format!("Swap on {} activated.", swap));
    }

    Ok(())
}
