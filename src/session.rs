use std::{fs, path::Path};

use crate::{
    config::Configuration,
    error::InstallerError,
    hardware::{self, HardwareSuggestion},
    settings::Settings,
    validate::Inventory,
};

// ── Session state ─────────────────────────────────────────────────────────────

/// State of one interactive session: the configuration being edited, the
/// engine settings, and the read-only views of the machine.
pub struct Session {
    pub config: Configuration,
    pub settings: Settings,
    pub dry_run: bool,
    pub(crate) inventory: Box<dyn Inventory>,
    probe: fn() -> HardwareSuggestion,
    hardware: Option<HardwareSuggestion>,
}

impl Session {
    pub fn new(settings: Settings, inventory: Box<dyn Inventory>, dry_run: bool) -> Self {
        Self {
            config: Configuration::default(),
            settings,
            dry_run,
            inventory,
            probe: hardware::detect,
            hardware: None,
        }
    }

    pub fn inventory(&self) -> &dyn Inventory {
        self.inventory.as_ref()
    }

    /// Hardware probe result, detected on first use and cached afterwards.
    pub fn hardware(&mut self) -> HardwareSuggestion {
        *self.hardware.get_or_insert_with(self.probe)
    }

    /// Replaces the configuration with a preset and re-derives the disk
    /// capacity from the live system. Returns the reasons the loaded values
    /// would not pass validation yet, for display.
    pub fn apply_preset(&mut self, config: Configuration) -> Vec<String> {
        self.config = config;
        self.config.refresh_disk(self.inventory.as_ref());
        self.config.validate_all(&self.settings, self.inventory.as_ref())
    }
}

// ── Presets ───────────────────────────────────────────────────────────────────

/// Reads a configuration preset. Passwords and disk capacity are never
/// stored in a preset, so they come back unset.
pub fn load_preset(path: &Path) -> Result<Configuration, InstallerError> {
    let text = fs::read_to_string(path)?;
    let config = toml::from_str(&text)?;
    tracing::info!(path = %path.display(), "preset loaded");
    Ok(config)
}

pub fn save_preset(config: &Configuration, path: &Path) -> Result<(), InstallerError> {
    let text = toml::to_string_pretty(config)?;
    fs::write(path, text)?;
    tracing::info!(path = %path.display(), "preset saved");
    Ok(())
}
