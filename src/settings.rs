use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::InstallerError;

/// Engine constants for one run. They are not edited from the menu; an
/// operator can override them with `--settings <file.toml>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Size of the EFI system partition.
    pub efi_size_mib: u64,
    /// Smallest ROOT size accepted from the operator.
    pub min_root_gib: u64,
    /// Where the new system is assembled.
    pub target_root: PathBuf,
    /// Always passed to `pacstrap`, before kernel, microcode and GPU packages.
    pub base_packages: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            efi_size_mib: 1024,
            min_root_gib: 20,
            target_root: PathBuf::from("/mnt"),
            base_packages: ["base", "linux-firmware", "networkmanager", "sudo"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl Settings {
    /// Reads settings from `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, InstallerError> {
        let Some(path) = path else {
            return Ok(Settings::default());
        };
        let text = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&text)?;
        tracing::info!(path = %path.display(), ?settings, "loaded settings");

        if settings.efi_size_mib == 0 {
            return Err(InstallerError::validation("efi_size_mib", "must be greater than zero"));
        }
        if !settings.target_root.is_absolute() {
            return Err(InstallerError::validation("target_root", "must be an absolute path"));
        }
        Ok(settings)
    }

    /// `<target_root>/<rel>` rendered as a string for command arguments.
    pub fn target_path(&self, rel: &str) -> String {
        let rel = rel.trim_start_matches('/');
        if rel.is_empty() {
            self.target_root.to_string_lossy().into_owned()
        } else {
            self.target_root.join(rel).to_string_lossy().into_owned()
        }
    }
}
