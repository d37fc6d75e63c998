//! Install pipeline state machine.
//!
//! ```text
//! Idle → Validating → Confirmed → Partitioning → Formatting → Mounting
//!      → BootstrappingBase → ConfiguringSystem → InstallingBootloader → Done
//!
//! (any non-terminal state → Aborted; Validating → Idle when the operator declines)
//! ```
//!
//! A pipeline value serves one install attempt. Stages run strictly in order,
//! none is retried, and the first failure aborts the run. From `Confirmed`
//! onward every abort goes through [`InstallPipeline::abort`], which releases
//! every mount and swap the run created.

use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    cmd::CommandRunner,
    config::{Configuration, GpuDriver, Microcode},
    error::InstallerError,
    hardware::HardwareSuggestion,
    planner::{PartitionExtent, PartitionRole},
    settings::Settings,
    steps::{self, mount::MountTracker, preflight::Preflight},
    ui,
    validate::Inventory,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Validating,
    Confirmed,
    Partitioning,
    Formatting,
    Mounting,
    BootstrappingBase,
    ConfiguringSystem,
    InstallingBootloader,
    Done,
    Aborted,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted)
    }
}

/// One ordered, side-effecting unit of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub name: &'static str,
    pub state: PipelineState,
    pub destructive: bool,
}

pub const STAGES: [Stage; 6] = [
    Stage { name: "Partitioning", state: PipelineState::Partitioning, destructive: true },
    Stage { name: "Formatting", state: PipelineState::Formatting, destructive: true },
    Stage { name: "Mounting", state: PipelineState::Mounting, destructive: false },
    Stage { name: "Bootstrapping base system", state: PipelineState::BootstrappingBase, destructive: false },
    Stage { name: "Configuring system", state: PipelineState::ConfiguringSystem, destructive: false },
    Stage { name: "Installing bootloader", state: PipelineState::InstallingBootloader, destructive: false },
];

// ── Plan ──────────────────────────────────────────────────────────────────────

/// An extent bound to its partition number and device node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPartition {
    pub number: usize,
    pub device: String,
    pub extent: PartitionExtent,
}

/// Everything the stages need that is derived from the configuration at
/// validation time: the layout and the resolved hardware choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub disk: PathBuf,
    pub capacity_mib: u64,
    pub partitions: Vec<PlannedPartition>,
    pub microcode: Microcode,
    pub gpu: GpuDriver,
}

impl InstallPlan {
    pub fn new(
        disk: PathBuf,
        capacity_mib: u64,
        extents: Vec<PartitionExtent>,
        microcode: Microcode,
        gpu: GpuDriver,
    ) -> Self {
        let disk_str = disk.to_string_lossy().into_owned();
        let partitions = extents
            .into_iter()
            .enumerate()
            .map(|(i, extent)| PlannedPartition {
                number: i + 1,
                device: steps::partition::part_path(&disk_str, i + 1),
                extent,
            })
            .collect();
        Self {
            disk,
            capacity_mib,
            partitions,
            microcode,
            gpu,
        }
    }

    pub fn disk_str(&self) -> String {
        self.disk.to_string_lossy().into_owned()
    }

    /// Device node of the partition with `role`.
    pub fn device(&self, role: PartitionRole) -> Result<&str, InstallerError> {
        self.partitions
            .iter()
            .find(|p| p.extent.role == role)
            .map(|p| p.device.as_str())
            .ok_or_else(|| InstallerError::validation("layout", format!("no {} partition planned", role)))
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct InstallPipeline {
    state: PipelineState,
    plan: Option<InstallPlan>,
    mounts: MountTracker,
}

impl Default for InstallPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallPipeline {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            plan: None,
            mounts: MountTracker::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn plan(&self) -> Option<&InstallPlan> {
        self.plan.as_ref()
    }

    fn transition(&mut self, to: PipelineState) {
        tracing::info!(from = ?self.state, to = ?to, "pipeline transition");
        self.state = to;
    }

    fn expect_state(&self, expected: PipelineState, to: PipelineState) -> Result<(), InstallerError> {
        if self.state != expected {
            return Err(InstallerError::Transition { from: self.state, to });
        }
        Ok(())
    }

    /// `Idle → Validating`. Re-validates every field, re-runs the planner on
    /// the combined sizes and checks preconditions. Nothing touches the disk.
    ///
    /// On success the pipeline waits in `Validating` for [`confirm`](Self::confirm);
    /// on any failure it is `Aborted`.
    pub fn validate(
        &mut self,
        config: &Configuration,
        settings: &Settings,
        inventory: &dyn Inventory,
        hardware: &HardwareSuggestion,
        preflight: &dyn Preflight,
    ) -> Result<&InstallPlan, InstallerError> {
        self.expect_state(PipelineState::Idle, PipelineState::Validating)?;
        self.transition(PipelineState::Validating);

        match build_plan(config, settings, inventory, hardware, preflight) {
            Ok(plan) => Ok(&*self.plan.insert(plan)),
            Err(e) => {
                tracing::warn!("validation failed: {e}");
                self.transition(PipelineState::Aborted);
                Err(e)
            }
        }
    }

    /// `Validating → Confirmed` when the operator acknowledged the wipe,
    /// `Validating → Idle` (plan discarded) when they declined.
    pub fn confirm(&mut self, accepted: bool) -> Result<(), InstallerError> {
        let to = if accepted {
            PipelineState::Confirmed
        } else {
            PipelineState::Idle
        };
        self.expect_state(PipelineState::Validating, to)?;
        if !accepted {
            self.plan = None;
        }
        self.transition(to);
        Ok(())
    }

    /// Runs every stage in order from `Confirmed`. The interrupt flag is
    /// honoured between stages only.
    pub fn execute(
        &mut self,
        config: &Configuration,
        settings: &Settings,
        runner: &mut dyn CommandRunner,
        interrupt: &AtomicBool,
    ) -> Result<(), InstallerError> {
        self.expect_state(PipelineState::Confirmed, PipelineState::Partitioning)?;
        let Some(plan) = self.plan.take() else {
            return Err(InstallerError::Transition {
                from: self.state,
                to: PipelineState::Partitioning,
            });
        };

        let mut completed = None;
        for (i, stage) in STAGES.iter().enumerate() {
            if interrupt.load(Ordering::SeqCst) {
                tracing::warn!(after = ?completed, "interrupt received");
                return Err(self.abort(runner, InstallerError::Interrupted { after: completed }));
            }

            self.transition(stage.state);
            tracing::info!(stage = stage.name, destructive = stage.destructive, "stage started");
            ui::print_step(i + 1, STAGES.len(), stage.name);

            if let Err(e) = self.run_stage(stage.state, config, &plan, settings, runner) {
                let failure = InstallerError::StageFailure {
                    stage: stage.name,
                    source: Box::new(e),
                };
                return Err(self.abort(runner, failure));
            }
            completed = Some(stage.name);
        }

        self.transition(PipelineState::Done);
        Ok(())
    }

    fn run_stage(
        &mut self,
        state: PipelineState,
        config: &Configuration,
        plan: &InstallPlan,
        settings: &Settings,
        runner: &mut dyn CommandRunner,
    ) -> Result<(), InstallerError> {
        match state {
            PipelineState::Partitioning => steps::partition::run(runner, plan, &settings.target_path("")),
            PipelineState::Formatting => steps::format::run(runner, plan),
            PipelineState::Mounting => steps::mount::run(runner, plan, settings, &mut self.mounts),
            PipelineState::BootstrappingBase => {
                let packages = steps::packages::package_list(config, plan, settings);
                steps::packages::install_base(runner, &packages, settings)
            }
            PipelineState::ConfiguringSystem => {
                steps::fstab::generate(runner, settings)?;
                steps::chroot::configure(runner, config, settings)
            }
            PipelineState::InstallingBootloader => steps::bootloader::install(runner, config, plan, settings),
            other => Err(InstallerError::Transition {
                from: self.state,
                to: other,
            }),
        }
    }

    /// The one cleanup path: moves to `Aborted`, releases swap and mounts, and
    /// hands `cause` back to the caller.
    fn abort(&mut self, runner: &mut dyn CommandRunner, cause: InstallerError) -> InstallerError {
        tracing::error!(state = ?self.state, "aborting: {cause}");
        if !self.state.is_terminal() {
            self.transition(PipelineState::Aborted);
            tracing::info!(mounts = ?self.mounts.mounted(), swaps = ?self.mounts.swaps(), "releasing");
            self.mounts.release(runner);
        }
        cause
    }
}

/// Validation body of `Idle → Validating`: collects every field failure into
/// one list, then checks capacity atomically, then preconditions.
fn build_plan(
    config: &Configuration,
    settings: &Settings,
    inventory: &dyn Inventory,
    hardware: &HardwareSuggestion,
    preflight: &dyn Preflight,
) -> Result<InstallPlan, InstallerError> {
    let reasons = config.validate_all(settings, inventory);
    if !reasons.is_empty() {
        return Err(InstallerError::Incomplete(reasons));
    }

    // Re-read the capacity: the disk could have changed since it was picked.
    let disk = config
        .disk
        .clone()
        .ok_or_else(|| InstallerError::validation("disk", "not set"))?;
    let capacity_mib = inventory
        .block_device(&disk.to_string_lossy())
        .map(|d| d.size_mib)
        .ok_or_else(|| InstallerError::validation("disk", "no longer present"))?;
    let mut current = config.clone();
    current.disk_capacity_mib = Some(capacity_mib);
    let extents = current.plan(settings)?;

    let plan = InstallPlan::new(
        disk,
        capacity_mib,
        extents,
        config.microcode.resolve(hardware),
        config.gpu_driver.resolve(hardware),
    );
    preflight.check(config, &plan)?;
    Ok(plan)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        cmd::testing::RecordingRunner,
        config::Filesystem,
        hardware::{CpuVendor, GpuVendor},
        planner::{self, HomeSize, PlanRequest},
        validate::tests::FakeInventory,
    };

    pub(crate) fn sample_plan_with(swap_gib: u64, filesystem: Filesystem) -> InstallPlan {
        let extents = planner::plan(&PlanRequest {
            disk_capacity_mib: 102_400,
            efi_size_mib: 1024,
            root_size_gib: 20,
            swap_size_gib: swap_gib,
            home_size: HomeSize::Remaining,
            filesystem,
        })
        .unwrap();
        InstallPlan::new(PathBuf::from("/dev/sda"), 102_400, extents, Microcode::None, GpuDriver::None)
    }

    pub(crate) fn sample_plan(swap_gib: u64) -> InstallPlan {
        sample_plan_with(swap_gib, Filesystem::Ext4)
    }

    struct Passing;
    impl Preflight for Passing {
        fn check(&self, _: &Configuration, _: &InstallPlan) -> Result<(), InstallerError> {
            Ok(())
        }
    }

    struct Failing;
    impl Preflight for Failing {
        fn check(&self, _: &Configuration, _: &InstallPlan) -> Result<(), InstallerError> {
            Err(InstallerError::Precondition("pacstrap not found".into()))
        }
    }

    const HW: HardwareSuggestion = HardwareSuggestion {
        cpu: CpuVendor::Intel,
        gpu: GpuVendor::Unknown,
    };

    fn valid_config(inv: &FakeInventory) -> Configuration {
        let settings = Settings::default();
        let mut c = Configuration::default();
        c.set_disk("/dev/sda", inv).unwrap();
        c.set_root_size(20, &settings).unwrap();
        c.set_swap_size(2, &settings).unwrap();
        c.set_hostname("web-01").unwrap();
        c.set_username("alice").unwrap();
        c.set_timezone("UTC", inv).unwrap();
        c.set_locale("en_US.UTF-8", inv).unwrap();
        c.set_keymap("us", inv).unwrap();
        c
    }

    fn confirmed(inv: &FakeInventory, config: &Configuration) -> InstallPipeline {
        let mut p = InstallPipeline::new();
        p.validate(config, &Settings::default(), inv, &HW, &Passing).unwrap();
        p.confirm(true).unwrap();
        p
    }

    #[test]
    fn full_run_reaches_done_in_stage_order() {
        let inv = FakeInventory::with_disk("/dev/sda", 102_400);
        let config = valid_config(&inv);
        let mut p = confirmed(&inv, &config);
        let mut runner = RecordingRunner::default();

        p.execute(&config, &Settings::default(), &mut runner, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(p.state(), PipelineState::Done);

        let order = [
            "sgdisk --zap-all",
            "mkfs.fat",
            "mount /dev/sda2 /mnt",
            "swapon /dev/sda3",
            "pacstrap",
            "genfstab",
            "arch-chroot /mnt locale-gen",
            "arch-chroot /mnt grub-install",
        ];
        let positions: Vec<_> = order.iter().map(|p| runner.position(p).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", runner.calls);
        // Success leaves the target mounted for inspection.
        assert!(!runner.ran("umount /mnt"));
    }

    #[test]
    fn auto_microcode_resolves_at_planning_time() {
        let inv = FakeInventory::with_disk("/dev/sda", 102_400);
        let config = valid_config(&inv);
        let mut p = InstallPipeline::new();
        let plan = p.validate(&config, &Settings::default(), &inv, &HW, &Passing).unwrap();
        assert_eq!(plan.microcode, Microcode::Intel);
        assert_eq!(plan.gpu, GpuDriver::None);
        assert_eq!(config.microcode, Microcode::Auto);
    }

    #[test]
    fn invalid_config_aborts_before_any_disk_command() {
        let inv = FakeInventory::with_disk("/dev/sda", 102_400);
        let mut config = valid_config(&inv);
        config.hostname.clear();
        config.timezone = "Mars/Olympus".into();

        let mut p = InstallPipeline::new();
        let err = p
            .validate(&config, &Settings::default(), &inv, &HW, &Passing)
            .unwrap_err();
        match err {
            InstallerError::Incomplete(reasons) => assert_eq!(reasons.len(), 2),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(p.state(), PipelineState::Aborted);

        // Aborted is absorbing: no way to reach the disk from here.
        let mut runner = RecordingRunner::default();
        assert!(p.confirm(true).is_err());
        assert!(p
            .execute(&config, &Settings::default(), &mut runner, &AtomicBool::new(false))
            .is_err());
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn compound_edits_are_rechecked_against_capacity() {
        let inv = FakeInventory::with_disk("/dev/sda", 102_400);
        let mut config = valid_config(&inv);
        // Bypass the setters, as a hand-edited preset would.
        config.root_size_gib = 90;
        config.swap_size_gib = 20;

        let mut p = InstallPipeline::new();
        let err = p
            .validate(&config, &Settings::default(), &inv, &HW, &Passing)
            .unwrap_err();
        assert!(matches!(err, InstallerError::Capacity(_)));
        assert_eq!(p.state(), PipelineState::Aborted);
    }

    #[test]
    fn failed_precondition_aborts() {
        let inv = FakeInventory::with_disk("/dev/sda", 102_400);
        let config = valid_config(&inv);
        let mut p = InstallPipeline::new();
        let err = p
            .validate(&config, &Settings::default(), &inv, &HW, &Failing)
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert_eq!(p.state(), PipelineState::Aborted);
    }

    #[test]
    fn declining_returns_to_idle_without_side_effects() {
        let inv = FakeInventory::with_disk("/dev/sda", 102_400);
        let config = valid_config(&inv);
        let mut p = InstallPipeline::new();
        p.validate(&config, &Settings::default(), &inv, &HW, &Passing).unwrap();
        p.confirm(false).unwrap();
        assert_eq!(p.state(), PipelineState::Idle);
        assert!(p.plan().is_none());

        let mut runner = RecordingRunner::default();
        assert!(p
            .execute(&config, &Settings::default(), &mut runner, &AtomicBool::new(false))
            .is_err());
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn bootstrap_failure_aborts_and_cleans_up() {
        let inv = FakeInventory::with_disk("/dev/sda", 102_400);
        let config = valid_config(&inv);
        let mut p = confirmed(&inv, &config);
        let mut runner = RecordingRunner::failing_on("pacstrap");

        let err = p
            .execute(&config, &Settings::default(), &mut runner, &AtomicBool::new(false))
            .unwrap_err();
        assert_eq!(p.state(), PipelineState::Aborted);
        match &err {
            InstallerError::StageFailure { stage, source } => {
                assert_eq!(*stage, "Bootstrapping base system");
                assert!(matches!(**source, InstallerError::CommandFailed { .. }));
            }
            other => panic!("unexpected error {other}"),
        }

        let pacstrap = runner.position("pacstrap").unwrap();
        let tail = &runner.calls[pacstrap + 1..];
        assert_eq!(
            tail,
            ["swapoff /dev/sda3", "umount /mnt/home", "umount /mnt/boot", "umount /mnt"]
        );
        assert!(!runner.ran("genfstab"));
        assert!(!runner.ran("arch-chroot"));
    }

    #[test]
    fn partitioning_failure_has_nothing_to_unmount() {
        let inv = FakeInventory::with_disk("/dev/sda", 102_400);
        let config = valid_config(&inv);
        let mut p = confirmed(&inv, &config);
        let mut runner = RecordingRunner::failing_on("sgdisk -n 1:");

        let err = p
            .execute(&config, &Settings::default(), &mut runner, &AtomicBool::new(false))
            .unwrap_err();
        assert!(err.to_string().contains("Partitioning"));
        assert!(!runner.ran("mkfs"));
        assert!(!runner.ran("umount /mnt/"));
    }

    #[test]
    fn interrupt_is_honoured_at_stage_boundary() {
        let inv = FakeInventory::with_disk("/dev/sda", 102_400);
        let config = valid_config(&inv);
        let mut p = confirmed(&inv, &config);
        let mut runner = RecordingRunner::default();

        let err = p
            .execute(&config, &Settings::default(), &mut runner, &AtomicBool::new(true))
            .unwrap_err();
        assert_eq!(err.exit_code(), 130);
        assert!(matches!(err, InstallerError::Interrupted { after: None }));
        assert!(err.to_string().contains("before Partitioning"));
        assert_eq!(p.state(), PipelineState::Aborted);
        assert!(!runner.ran("sgdisk"));
    }

    #[test]
    fn interrupt_after_mounting_releases_before_bootstrap() {
        let inv = FakeInventory::with_disk("/dev/sda", 102_400);
        let config = valid_config(&inv);
        let mut p = confirmed(&inv, &config);
        let interrupt = Arc::new(AtomicBool::new(false));
        // Ctrl-C arrives while swap is being activated, the last Mounting step.
        let mut runner = RecordingRunner::raising_on("swapon", Arc::clone(&interrupt));

        let err = p
            .execute(&config, &Settings::default(), &mut runner, &interrupt)
            .unwrap_err();
        assert_eq!(p.state(), PipelineState::Aborted);
        assert_eq!(err.exit_code(), 130);
        assert!(matches!(err, InstallerError::Interrupted { after: Some("Mounting") }));
        assert!(!runner.ran("pacstrap"));
        assert!(!runner.ran("timedatectl"));

        let swapon = runner.position("swapon").unwrap();
        assert_eq!(
            &runner.calls[swapon + 1..],
            ["swapoff /dev/sda3", "umount /mnt/home", "umount /mnt/boot", "umount /mnt"]
        );
    }

    #[test]
    fn stage_table_is_in_pipeline_order() {
        let states: Vec<_> = STAGES.iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            [
                PipelineState::Partitioning,
                PipelineState::Formatting,
                PipelineState::Mounting,
                PipelineState::BootstrappingBase,
                PipelineState::ConfiguringSystem,
                PipelineState::InstallingBootloader,
            ]
        );
        assert!(STAGES.iter().take(2).all(|s| s.destructive));
        assert!(PipelineState::Aborted.is_terminal());
        assert!(!PipelineState::Confirmed.is_terminal());
    }
}
