//! Precondition checks. A failed check means the pipeline never starts.

use std::{
    net::{TcpStream, ToSocketAddrs},
    path::Path,
    time::Duration,
};

use crate::{
    config::{Bootloader, Configuration},
    error::InstallerError,
    pipeline::InstallPlan,
    planner::PartitionRole,
};

const EFIVARS: &str = "/sys/firmware/efi/efivars";
const REACHABILITY_PROBE: &str = "archlinux.org:443";

/// Seam between the pipeline and the live system's precondition checks.
pub trait Preflight {
    fn check(&self, config: &Configuration, plan: &InstallPlan) -> Result<(), InstallerError>;
}

/// Every external program the plan will invoke.
pub fn required_tools(config: &Configuration, plan: &InstallPlan) -> Vec<&'static str> {
    let mut tools = vec![
        "sgdisk",
        "partprobe",
        "mkfs.fat",
        config.filesystem.mkfs(),
        "mount",
        "umount",
        "pacstrap",
        "genfstab",
        "arch-chroot",
    ];
    if plan.device(PartitionRole::Swap).is_ok() {
        tools.extend(["mkswap", "swapon", "swapoff"]);
    }
    if config.bootloader == Bootloader::SystemdBoot {
        tools.push("blkid");
    }
    tools
}

fn is_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

fn is_uefi() -> bool {
    Path::new(EFIVARS).exists()
}

fn is_online() -> bool {
    let addrs = match REACHABILITY_PROBE.to_socket_addrs() {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!("cannot resolve {REACHABILITY_PROBE}: {e}");
            return false;
        }
    };
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, Duration::from_secs(5)).is_ok())
}

/// Checks the live system: root privileges, UEFI firmware, network, and
/// every tool from [`required_tools`].
///
/// In dry-run mode unmet preconditions are only warnings.
pub struct SystemPreflight {
    pub dry_run: bool,
}

impl SystemPreflight {
    /// Checks that do not depend on the plan, run once at startup.
    pub fn check_environment(&self) -> Result<(), InstallerError> {
        let mut missing = Vec::new();
        if !is_root() {
            missing.push("this installer must be run as root".to_string());
        }
        if !is_uefi() {
            missing.push(format!("no UEFI firmware interface ({EFIVARS} not found)"));
        }
        if !is_online() {
            missing.push(format!("network unreachable ({REACHABILITY_PROBE})"));
        }
        self.verdict(missing)
    }

    fn verdict(&self, missing: Vec<String>) -> Result<(), InstallerError> {
        if missing.is_empty() {
            return Ok(());
        }
        if self.dry_run {
            for m in &missing {
                tracing::warn!("precondition not met (dry-run): {m}");
                crate::ui::print_warning(&format!("{m} (ignored in dry-run)"));
            }
            return Ok(());
        }
        Err(InstallerError::Precondition(missing.join("; ")))
    }
}

impl Preflight for SystemPreflight {
    fn check(&self, config: &Configuration, plan: &InstallPlan) -> Result<(), InstallerError> {
        let missing = required_tools(config, plan)
            .into_iter()
            .filter(|tool| which::which(tool).is_err())
            .map(|tool| format!("required tool '{tool}' not found on PATH"))
            .collect();
        self.verdict(missing)
    }
}
