use std::collections::{HashMap, HashSet};

use crate::{cmd, planner::bytes_to_mib};

// ── Data types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub path: String, // /dev/sda
    pub size_mib: u64,
    pub model: String, // SAMSUNG SSD 870
    /// The disk itself or anything on it (partition, swap, LVM) is in use.
    pub mounted: bool,
}

impl Disk {
    /// One-line label shown in the arrow-key selector.
    pub fn display(&self) -> String {
        let size = format!("{:.1}G", self.size_mib as f64 / 1024.0);
        let state = if self.mounted { "  (in use)" } else { "" };
        format!("{:<14}  {:>9}   {}{}", self.path, size, self.model, state)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Returns all block devices of type `disk` visible to the system.
/// Falls back to an empty list if `lsblk` is unavailable.
pub fn list_disks() -> Vec<Disk> {
    match cmd::query(
        "lsblk",
        &[
            "--bytes",
            "--pairs",
            "--output",
            "NAME,SIZE,TYPE,MODEL,MOUNTPOINT,PKNAME",
        ],
    ) {
        Ok(output) => parse_disks(&output),
        Err(e) => {
            tracing::warn!("disk listing failed: {e}");
            vec![]
        }
    }
}

/// Builds the disk list from `lsblk --pairs` output that includes children.
/// A disk counts as mounted when any descendant has a mountpoint
/// (`[SWAP]` included).
fn parse_disks(output: &str) -> Vec<Disk> {
    let rows: Vec<HashMap<String, String>> = output.lines().map(parse_pairs).collect();
    let field = |row: &HashMap<String, String>, key: &str| row.get(key).cloned().unwrap_or_default();

    let parent_of: HashMap<String, String> = rows
        .iter()
        .map(|r| (field(r, "NAME"), field(r, "PKNAME")))
        .filter(|(_, parent)| !parent.is_empty())
        .collect();

    let mut busy = HashSet::new();
    for row in rows.iter().filter(|r| !field(r, "MOUNTPOINT").is_empty()) {
        let mut name = field(row, "NAME");
        // Walk up to the owning disk; the depth guard stops malformed cycles.
        for _ in 0..16 {
            busy.insert(name.clone());
            match parent_of.get(&name) {
                Some(parent) => name = parent.clone(),
                None => break,
            }
        }
    }

    rows.iter()
        .filter(|r| field(r, "TYPE") == "disk")
        .map(|r| {
            let name = field(r, "NAME");
            let model = field(r, "MODEL");
            Disk {
                path: format!("/dev/{}", name),
                size_mib: field(r, "SIZE").parse().map(bytes_to_mib).unwrap_or(0),
                model: if model.is_empty() { "—".to_string() } else { model },
                mounted: busy.contains(&name),
            }
        })
        .collect()
}

// ── lsblk --pairs parser ──────────────────────────────────────────────────────
//
// Each line looks like:   NAME="sda1" SIZE="536870912" TYPE="part" MOUNTPOINT="" PKNAME="sda"

fn parse_pairs(line: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut rest = line.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].split_whitespace().last().unwrap_or("").to_string();
        rest = &rest[eq + 1..];

        if !rest.starts_with('"') {
            break;
        }
        rest = &rest[1..]; // skip opening "

        let Some(close) = rest.find('"') else { break };
        let value = rest[..close].to_string();
        rest = &rest[close + 1..]; // skip closing "

        if !key.is_empty() {
            map.insert(key, value);
        }
    }

    map
}
