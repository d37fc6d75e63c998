//! Per-field validators.
//!
//! Every validator is a pure predicate over a candidate value. The ones that
//! need a system enumeration (timezones, locales, keymaps, block devices) get
//! it through [`Inventory`], which is only ever read.

use std::{
    collections::HashSet,
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};

use crate::{
    config::TargetDisk,
    error::InstallerError,
    lsblk::{self, Disk},
};

const HOSTNAME_MAX: usize = 63;
const USERNAME_MAX: usize = 32;

/// Read-only view of what the live system offers.
pub trait Inventory {
    fn block_device(&self, path: &str) -> Option<Disk>;
    fn has_timezone(&self, name: &str) -> bool;
    fn has_locale(&self, name: &str) -> bool;
    fn has_keymap(&self, name: &str) -> bool;
}

// ── Validators ────────────────────────────────────────────────────────────────

pub fn disk(path: &str, inventory: &dyn Inventory) -> Result<TargetDisk, InstallerError> {
    if path.is_empty() {
        return Err(InstallerError::validation("disk", "not set"));
    }
    if !path.starts_with("/dev/") {
        return Err(InstallerError::validation("disk", format!("{path} is not a /dev path")));
    }
    let Some(dev) = inventory.block_device(path) else {
        return Err(InstallerError::validation(
            "disk",
            format!("{path} is not a whole-disk block device"),
        ));
    };
    if dev.mounted {
        return Err(InstallerError::validation(
            "disk",
            format!("{path} (or one of its partitions) is mounted"),
        ));
    }
    if dev.size_mib == 0 {
        return Err(InstallerError::validation("disk", format!("{path} reports zero size")));
    }
    Ok(TargetDisk {
        path: PathBuf::from(path),
        capacity_mib: dev.size_mib,
    })
}

pub fn root_size(gib: u64, min_gib: u64) -> Result<(), InstallerError> {
    if gib == 0 {
        return Err(InstallerError::validation("root size", "not set"));
    }
    if gib < min_gib {
        return Err(InstallerError::validation(
            "root size",
            format!("{gib} GiB is below the minimum of {min_gib} GiB"),
        ));
    }
    Ok(())
}

/// 1–63 characters, ASCII letters, digits and hyphens.
pub fn hostname(value: &str) -> Result<(), InstallerError> {
    if value.is_empty() {
        return Err(InstallerError::validation("hostname", "not set"));
    }
    if value.len() > HOSTNAME_MAX {
        return Err(InstallerError::validation(
            "hostname",
            format!("longer than {HOSTNAME_MAX} characters"),
        ));
    }
    if let Some(bad) = value.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-')) {
        return Err(InstallerError::validation(
            "hostname",
            format!("character '{bad}' is not allowed (letters, digits and '-' only)"),
        ));
    }
    Ok(())
}

/// Empty means "no secondary user". Otherwise a lowercase letter followed by
/// lowercase letters, digits, '_' or '-'.
pub fn username(value: &str) -> Result<(), InstallerError> {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return Ok(());
    };
    if !first.is_ascii_lowercase() {
        return Err(InstallerError::validation("username", "must start with a lowercase letter"));
    }
    if value.len() > USERNAME_MAX {
        return Err(InstallerError::validation(
            "username",
            format!("longer than {USERNAME_MAX} characters"),
        ));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')) {
        return Err(InstallerError::validation(
            "username",
            format!("character '{bad}' is not allowed"),
        ));
    }
    Ok(())
}

pub fn timezone(value: &str, inventory: &dyn Inventory) -> Result<(), InstallerError> {
    known("timezone", value, |v| inventory.has_timezone(v))
}

pub fn locale(value: &str, inventory: &dyn Inventory) -> Result<(), InstallerError> {
    known("locale", value, |v| inventory.has_locale(v))
}

pub fn keymap(value: &str, inventory: &dyn Inventory) -> Result<(), InstallerError> {
    known("keymap", value, |v| inventory.has_keymap(v))
}

fn known(field: &'static str, value: &str, lookup: impl Fn(&str) -> bool) -> Result<(), InstallerError> {
    if value.is_empty() {
        return Err(InstallerError::validation(field, "not set"));
    }
    if !lookup(value) {
        return Err(InstallerError::validation(field, format!("'{value}' is not known to this system")));
    }
    Ok(())
}

// ── Live system inventory ─────────────────────────────────────────────────────

const ZONEINFO: &str = "/usr/share/zoneinfo";
const TZDATA: &str = "tzdata.zi";
const SUPPORTED_LOCALES: &str = "/usr/share/i18n/SUPPORTED";
const KEYMAPS: &str = "/usr/share/kbd/keymaps";

/// [`Inventory`] backed by the running system. Zone, locale and keymap lists
/// are read once when constructed.
pub struct SystemInventory {
    zoneinfo: PathBuf,
    /// Zone and link names from `tzdata.zi`; empty when it is unreadable.
    zones: HashSet<String>,
    locales: HashSet<String>,
    keymaps: HashSet<String>,
}

impl SystemInventory {
    pub fn load() -> Self {
        let zoneinfo = PathBuf::from(ZONEINFO);
        let zones = fs::read_to_string(zoneinfo.join(TZDATA))
            .map(|text| parse_tzdata(&text))
            .unwrap_or_else(|e| {
                tracing::warn!("cannot read {ZONEINFO}/{TZDATA}: {e}; checking TZif headers instead");
                HashSet::new()
            });

        let locales = fs::read_to_string(SUPPORTED_LOCALES)
            .map(|text| parse_supported_locales(&text))
            .unwrap_or_else(|e| {
                tracing::warn!("cannot read {SUPPORTED_LOCALES}: {e}");
                HashSet::new()
            });

        let mut keymaps = HashSet::new();
        collect_keymaps(Path::new(KEYMAPS), &mut keymaps);
        if keymaps.is_empty() {
            tracing::warn!("no keymaps found under {KEYMAPS}");
        }

        tracing::debug!(
            zones = zones.len(),
            locales = locales.len(),
            keymaps = keymaps.len(),
            "inventory loaded"
        );
        Self {
            zoneinfo,
            zones,
            locales,
            keymaps,
        }
    }
}

impl Inventory for SystemInventory {
    fn block_device(&self, path: &str) -> Option<Disk> {
        lsblk::list_disks().into_iter().find(|d| d.path == path)
    }

    fn has_timezone(&self, name: &str) -> bool {
        // Reject anything that could walk out of the zoneinfo tree.
        if name.starts_with('/') || name.split('/').any(|part| part == ".." || part.is_empty()) {
            return false;
        }
        if !self.zones.is_empty() {
            return self.zones.contains(name);
        }
        // Without tzdata.zi, only compiled zone files count; this keeps out
        // zone.tab, leap-seconds.list and the other tables next to them.
        is_tzif(&self.zoneinfo.join(name))
    }

    fn has_locale(&self, name: &str) -> bool {
        self.locales.contains(name)
    }

    fn has_keymap(&self, name: &str) -> bool {
        self.keymaps.contains(name)
    }
}

/// Zone names (`Z Europe/Berlin ...`) and link names (`L Etc/UTC UTC`) from
/// the compact `tzdata.zi` source. Rule lines are skipped.
fn parse_tzdata(text: &str) -> HashSet<String> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match fields.next()? {
                "Z" | "Zone" => fields.next(),
                "L" | "Link" => fields.nth(1),
                _ => None,
            }
        })
        .map(String::from)
        .collect()
}

fn is_tzif(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .is_ok()
        && &magic == b"TZif"
}

/// First column of each non-comment line, e.g. `en_US.UTF-8 UTF-8` → `en_US.UTF-8`.
fn parse_supported_locales(text: &str) -> HashSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_whitespace().next())
        .map(String::from)
        .collect()
}

fn collect_keymaps(dir: &Path, out: &mut HashSet<String>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_keymaps(&path, out);
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if let Some(stem) = name.strip_suffix(".map.gz").or_else(|| name.strip_suffix(".map")) {
                out.insert(stem.to_string());
            }
        }
    }
}
