use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::InstallerError,
    hardware::{CpuVendor, GpuVendor, HardwareSuggestion},
    planner::{self, HomeSize, PartitionExtent, PlanRequest},
    settings::Settings,
    validate::{self, Inventory},
};

// ── Enumerations ──────────────────────────────────────────────────────────────

/// Filesystem used for ROOT and HOME.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filesystem {
    #[default]
    Ext4,
    Btrfs,
    Xfs,
}

impl Filesystem {
    pub const ALL: [Filesystem; 3] = [Filesystem::Ext4, Filesystem::Btrfs, Filesystem::Xfs];

    /// The `mkfs.*` program for this filesystem.
    pub fn mkfs(self) -> &'static str {
        match self {
            Filesystem::Ext4 => "mkfs.ext4",
            Filesystem::Btrfs => "mkfs.btrfs",
            Filesystem::Xfs => "mkfs.xfs",
        }
    }

    /// Flag that makes `mkfs` overwrite an existing signature.
    pub fn force_flag(self) -> &'static str {
        match self {
            Filesystem::Ext4 => "-F",
            Filesystem::Btrfs | Filesystem::Xfs => "-f",
        }
    }
}

/// CPU microcode package choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Microcode {
    #[default]
    Auto,
    Intel,
    Amd,
    None,
}

impl Microcode {
    pub const ALL: [Microcode; 4] = [Microcode::Auto, Microcode::Intel, Microcode::Amd, Microcode::None];

    /// Replaces `Auto` with the probed suggestion. Unknown vendors resolve to `None`.
    pub fn resolve(self, hw: &HardwareSuggestion) -> Microcode {
        match self {
            Microcode::Auto => match hw.cpu {
                CpuVendor::Intel => Microcode::Intel,
                CpuVendor::Amd => Microcode::Amd,
                CpuVendor::Unknown => Microcode::None,
            },
            explicit => explicit,
        }
    }

    pub fn package(self) -> Option<&'static str> {
        match self {
            Microcode::Intel => Some("intel-ucode"),
            Microcode::Amd => Some("amd-ucode"),
            Microcode::Auto | Microcode::None => None,
        }
    }

    /// Early-boot image dropped into `/boot` by the microcode package.
    pub fn early_image(self) -> Option<&'static str> {
        self.package().map(|p| match p {
            "intel-ucode" => "/intel-ucode.img",
            _ => "/amd-ucode.img",
        })
    }
}

/// GPU driver package choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuDriver {
    #[default]
    Auto,
    Nvidia,
    Amdgpu,
    I915,
    None,
}

impl GpuDriver {
    pub const ALL: [GpuDriver; 5] = [
        GpuDriver::Auto,
        GpuDriver::Nvidia,
        GpuDriver::Amdgpu,
        GpuDriver::I915,
        GpuDriver::None,
    ];

    /// Replaces `Auto` with the probed suggestion. Unknown vendors resolve to `None`.
    pub fn resolve(self, hw: &HardwareSuggestion) -> GpuDriver {
        match self {
            GpuDriver::Auto => match hw.gpu {
                GpuVendor::Nvidia => GpuDriver::Nvidia,
                GpuVendor::Amd => GpuDriver::Amdgpu,
                GpuVendor::Intel => GpuDriver::I915,
                GpuVendor::Unknown => GpuDriver::None,
            },
            explicit => explicit,
        }
    }

    pub fn packages(self) -> &'static [&'static str] {
        match self {
            GpuDriver::Nvidia => &["nvidia", "nvidia-utils"],
            GpuDriver::Amdgpu => &["mesa", "vulkan-radeon", "xf86-video-amdgpu"],
            GpuDriver::I915 => &["mesa", "vulkan-intel", "intel-media-driver"],
            GpuDriver::Auto | GpuDriver::None => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bootloader {
    #[default]
    Grub,
    SystemdBoot,
}

impl Bootloader {
    pub const ALL: [Bootloader; 2] = [Bootloader::Grub, Bootloader::SystemdBoot];

    /// Extra packages the bootstrap step must install for this bootloader.
    pub fn packages(self) -> &'static [&'static str] {
        match self {
            Bootloader::Grub => &["grub", "efibootmgr"],
            Bootloader::SystemdBoot => &[],
        }
    }
}

/// Which Linux kernel variant to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelVariant {
    #[default]
    Stable,
    Lts,
    Zen,
}

impl KernelVariant {
    pub const ALL: [KernelVariant; 3] = [KernelVariant::Stable, KernelVariant::Lts, KernelVariant::Zen];

    /// The `pacstrap` package name for this variant.
    pub fn package_name(self) -> &'static str {
        match self {
            KernelVariant::Stable => "linux",
            KernelVariant::Lts => "linux-lts",
            KernelVariant::Zen => "linux-zen",
        }
    }

    /// Human-readable label shown to the user.
    pub fn display_name(self) -> &'static str {
        match self {
            KernelVariant::Stable => "Linux stable",
            KernelVariant::Lts => "Linux LTS (long-term support)",
            KernelVariant::Zen => "Linux Zen (performance-optimized)",
        }
    }

    /// Kernel image path relative to the ESP mounted at `/boot`.
    pub fn image(self) -> String {
        format!("/vmlinuz-{}", self.package_name())
    }

    pub fn initramfs(self) -> String {
        format!("/initramfs-{}.img", self.package_name())
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Filesystem::Ext4 => "ext4",
            Filesystem::Btrfs => "btrfs",
            Filesystem::Xfs => "xfs",
        })
    }
}

impl fmt::Display for Microcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Microcode::Auto => "auto",
            Microcode::Intel => "intel",
            Microcode::Amd => "amd",
            Microcode::None => "none",
        })
    }
}

impl fmt::Display for GpuDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GpuDriver::Auto => "auto",
            GpuDriver::Nvidia => "nvidia",
            GpuDriver::Amdgpu => "amdgpu",
            GpuDriver::I915 => "i915",
            GpuDriver::None => "none",
        })
    }
}

impl fmt::Display for Bootloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bootloader::Grub => "grub",
            Bootloader::SystemdBoot => "systemd-boot",
        })
    }
}

impl fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.package_name())
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Disk selected for installation together with its size at selection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDisk {
    pub path: PathBuf,
    pub capacity_mib: u64,
}

/// Every installation parameter the operator edits in the menu.
///
/// Empty strings and `None` are the "unset" state. Setters only store a value
/// after it passed its validator, so an unset field is the only way a field
/// can be invalid, apart from the inventory changing underneath us; hence
/// [`Configuration::validate_all`] re-checks everything before an install.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub disk: Option<PathBuf>,
    #[serde(skip)]
    pub disk_capacity_mib: Option<u64>,
    pub root_size_gib: u64,
    pub swap_size_gib: u64,
    pub home_size: HomeSize,
    pub filesystem: Filesystem,
    pub hostname: String,
    pub username: String,
    pub timezone: String,
    pub locale: String,
    pub keymap: String,
    pub sudo_enabled: bool,
    pub microcode: Microcode,
    pub gpu_driver: GpuDriver,
    pub bootloader: Bootloader,
    pub kernel: KernelVariant,
    #[serde(skip)]
    pub root_password: Option<String>,
    #[serde(skip)]
    pub user_password: Option<String>,
}

impl Configuration {
    // ── Validated setters ─────────────────────────────────────────────────────

    /// Selects the target disk and records its capacity.
    pub fn set_disk(&mut self, path: &str, inventory: &dyn Inventory) -> Result<(), InstallerError> {
        let disk = validate::disk(path, inventory)?;
        self.disk = Some(disk.path);
        self.disk_capacity_mib = Some(disk.capacity_mib);
        Ok(())
    }

    pub fn set_root_size(&mut self, gib: u64, settings: &Settings) -> Result<(), InstallerError> {
        validate::root_size(gib, settings.min_root_gib)?;
        self.check_fit(|c| c.root_size_gib = gib, settings)?;
        self.root_size_gib = gib;
        Ok(())
    }

    pub fn set_swap_size(&mut self, gib: u64, settings: &Settings) -> Result<(), InstallerError> {
        self.check_fit(|c| c.swap_size_gib = gib, settings)?;
        self.swap_size_gib = gib;
        Ok(())
    }

    pub fn set_home_size(&mut self, home: HomeSize, settings: &Settings) -> Result<(), InstallerError> {
        self.check_fit(|c| c.home_size = home, settings)?;
        self.home_size = home;
        Ok(())
    }

    pub fn set_hostname(&mut self, value: &str) -> Result<(), InstallerError> {
        validate::hostname(value)?;
        self.hostname = value.to_string();
        Ok(())
    }

    pub fn set_username(&mut self, value: &str) -> Result<(), InstallerError> {
        validate::username(value)?;
        self.username = value.to_string();
        if value.is_empty() {
            self.user_password = None;
        }
        Ok(())
    }

    pub fn set_timezone(&mut self, value: &str, inventory: &dyn Inventory) -> Result<(), InstallerError> {
        validate::timezone(value, inventory)?;
        self.timezone = value.to_string();
        Ok(())
    }

    pub fn set_locale(&mut self, value: &str, inventory: &dyn Inventory) -> Result<(), InstallerError> {
        validate::locale(value, inventory)?;
        self.locale = value.to_string();
        Ok(())
    }

    pub fn set_keymap(&mut self, value: &str, inventory: &dyn Inventory) -> Result<(), InstallerError> {
        validate::keymap(value, inventory)?;
        self.keymap = value.to_string();
        Ok(())
    }

    /// Applies a candidate edit to a scratch copy and runs the planner on it,
    /// so an edit that would make the layout overflow is rejected right away.
    /// Without a disk there is nothing to check against yet.
    fn check_fit(&self, edit: impl FnOnce(&mut Configuration), settings: &Settings) -> Result<(), InstallerError> {
        let mut candidate = self.clone();
        edit(&mut candidate);
        match candidate.plan_request(settings) {
            Some(req) if candidate.root_size_gib > 0 => {
                planner::plan(&req)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ── Whole-record checks ───────────────────────────────────────────────────

    /// Re-validates every field the pipeline reads and returns one
    /// human-readable reason per failing field. An empty list means valid.
    pub fn validate_all(&self, settings: &Settings, inventory: &dyn Inventory) -> Vec<String> {
        let mut reasons = Vec::new();
        let mut check = |r: Result<(), InstallerError>| {
            if let Err(e) = r {
                reasons.push(e.to_string());
            }
        };

        match &self.disk {
            None => check(Err(InstallerError::validation("disk", "not set"))),
            Some(path) => check(validate::disk(&path.to_string_lossy(), inventory).map(|_| ())),
        }
        check(validate::root_size(self.root_size_gib, settings.min_root_gib));
        check(validate::hostname(&self.hostname));
        check(validate::username(&self.username));
        check(validate::timezone(&self.timezone, inventory));
        check(validate::locale(&self.locale, inventory));
        check(validate::keymap(&self.keymap, inventory));
        if self.sudo_enabled && self.username.is_empty() {
            check(Err(InstallerError::validation(
                "sudo",
                "enabled but no user account is configured",
            )));
        }

        reasons
    }

    /// Planner input for the current values, or `None` while no disk is set.
    pub fn plan_request(&self, settings: &Settings) -> Option<PlanRequest> {
        Some(PlanRequest {
            disk_capacity_mib: self.disk_capacity_mib?,
            efi_size_mib: settings.efi_size_mib,
            root_size_gib: self.root_size_gib,
            swap_size_gib: self.swap_size_gib,
            home_size: self.home_size,
            filesystem: self.filesystem,
        })
    }

    /// Runs the planner against the current values.
    pub fn plan(&self, settings: &Settings) -> Result<Vec<PartitionExtent>, InstallerError> {
        let req = self
            .plan_request(settings)
            .ok_or_else(|| InstallerError::validation("disk", "not set"))?;
        Ok(planner::plan(&req)?)
    }

    /// Refreshes `disk_capacity_mib` from the inventory, e.g. after a preset
    /// was loaded (capacity is never read from a preset file).
    pub fn refresh_disk(&mut self, inventory: &dyn Inventory) {
        self.disk_capacity_mib = self
            .disk
            .as_ref()
            .and_then(|p| inventory.block_device(&p.to_string_lossy()))
            .map(|d| d.size_mib);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::tests::FakeInventory;

    fn settings() -> Settings {
        Settings::default()
    }

    fn configured() -> (Configuration, FakeInventory) {
        let inv = FakeInventory::with_disk("/dev/sda", 102_400);
        let mut c = Configuration::default();
        c.set_disk("/dev/sda", &inv).unwrap();
        c.set_root_size(20, &settings()).unwrap();
        c.set_swap_size(2, &settings()).unwrap();
        c.set_hostname("web-01").unwrap();
        c.set_username("alice").unwrap();
        c.set_timezone("Europe/Berlin", &inv).unwrap();
        c.set_locale("en_US.UTF-8", &inv).unwrap();
        c.set_keymap("us", &inv).unwrap();
        (c, inv)
    }

    #[test]
    fn fully_configured_record_validates() {
        let (c, inv) = configured();
        assert!(c.validate_all(&settings(), &inv).is_empty());
        assert_eq!(c.disk_capacity_mib, Some(102_400));
        assert_eq!(c.plan(&settings()).unwrap().len(), 4);
    }

    #[test]
    fn default_record_reports_every_required_field() {
        let inv = FakeInventory::default();
        let reasons = Configuration::default().validate_all(&settings(), &inv);
        for field in ["disk", "root size", "hostname", "timezone", "locale", "keymap"] {
            assert!(
                reasons.iter().any(|r| r.contains(field)),
                "missing reason for {field}: {reasons:?}"
            );
        }
    }

    #[test]
    fn rejected_edit_keeps_previous_value() {
        let (mut c, _) = configured();
        assert!(c.set_hostname("my_host!").is_err());
        assert_eq!(c.hostname, "web-01");

        let err = c.set_root_size(100, &settings()).unwrap_err();
        assert!(matches!(err, InstallerError::Capacity(_)));
        assert_eq!(c.root_size_gib, 20);
    }

    #[test]
    fn swap_edit_that_overflows_is_rejected() {
        let (mut c, _) = configured();
        c.set_root_size(70, &settings()).unwrap();
        assert!(matches!(
            c.set_swap_size(40, &settings()),
            Err(InstallerError::Capacity(_))
        ));
        assert_eq!(c.swap_size_gib, 2);
    }

    #[test]
    fn sudo_without_user_is_reported() {
        let (mut c, inv) = configured();
        c.set_username("").unwrap();
        c.sudo_enabled = true;
        let reasons = c.validate_all(&settings(), &inv);
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("sudo"));
    }

    #[test]
    fn auto_choices_resolve_against_probe_and_fall_back_to_none() {
        let hw = HardwareSuggestion {
            cpu: CpuVendor::Amd,
            gpu: GpuVendor::Unknown,
        };
        assert_eq!(Microcode::Auto.resolve(&hw), Microcode::Amd);
        assert_eq!(Microcode::Intel.resolve(&hw), Microcode::Intel);
        assert_eq!(GpuDriver::Auto.resolve(&hw), GpuDriver::None);
        assert_eq!(GpuDriver::Nvidia.resolve(&hw), GpuDriver::Nvidia);
        assert_eq!(Microcode::Amd.early_image(), Some("/amd-ucode.img"));
        assert_eq!(Microcode::None.package(), None);
    }
}
