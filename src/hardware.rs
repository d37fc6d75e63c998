//! CPU and GPU vendor detection.
//!
//! Both classifiers are ordered `(needle, vendor)` tables evaluated top to
//! bottom; the first needle found in the lowercased input wins. No match is
//! the `Unknown` vendor, never an error.

use std::{fmt, fs};

use crate::cmd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuVendor {
    Intel,
    Amd,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Unknown,
}

/// Probe result. `Auto` choices in the configuration resolve against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareSuggestion {
    pub cpu: CpuVendor,
    pub gpu: GpuVendor,
}

impl fmt::Display for HardwareSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU: {:?}, GPU: {:?}", self.cpu, self.gpu)
    }
}

const CPU_RULES: &[(&str, CpuVendor)] = &[
    ("genuineintel", CpuVendor::Intel),
    ("authenticamd", CpuVendor::Amd),
    ("intel", CpuVendor::Intel),
    ("amd", CpuVendor::Amd),
];

const GPU_RULES: &[(&str, GpuVendor)] = &[
    ("nvidia", GpuVendor::Nvidia),
    ("advanced micro devices", GpuVendor::Amd),
    ("amd/ati", GpuVendor::Amd),
    ("radeon", GpuVendor::Amd),
    ("intel", GpuVendor::Intel),
];

fn first_match<T: Copy>(rules: &[(&str, T)], haystack: &str, fallback: T) -> T {
    let haystack = haystack.to_lowercase();
    rules
        .iter()
        .find(|(needle, _)| haystack.contains(needle))
        .map_or(fallback, |&(_, vendor)| vendor)
}

/// Classifies a CPU vendor string such as `/proc/cpuinfo`'s `vendor_id`.
pub fn classify_cpu(vendor: &str) -> CpuVendor {
    first_match(CPU_RULES, vendor, CpuVendor::Unknown)
}

/// Classifies one GPU descriptor line (e.g. from `lspci`).
pub fn classify_gpu(descriptor: &str) -> GpuVendor {
    first_match(GPU_RULES, descriptor, GpuVendor::Unknown)
}

/// Reads `/proc/cpuinfo` and `lspci` and classifies both. Unreadable
/// sources yield `Unknown`.
pub fn detect() -> HardwareSuggestion {
    let cpu = fs::read_to_string("/proc/cpuinfo")
        .ok()
        .and_then(|text| {
            text.lines()
                .find(|l| l.starts_with("vendor_id"))
                .and_then(|l| l.split(':').nth(1))
                .map(|v| classify_cpu(v.trim()))
        })
        .unwrap_or(CpuVendor::Unknown);

    let gpu = match cmd::query("lspci", &[]) {
        Ok(out) => gpu_from_lspci(&out),
        Err(e) => {
            tracing::warn!("GPU detection skipped: {e}");
            GpuVendor::Unknown
        }
    };

    let hw = HardwareSuggestion { cpu, gpu };
    tracing::info!(%hw, "hardware probed");
    hw
}

/// First display controller line that classifies to a known vendor.
fn gpu_from_lspci(output: &str) -> GpuVendor {
    output
        .lines()
        .filter(|l| {
            let l = l.to_lowercase();
            l.contains("vga") || l.contains("3d controller") || l.contains("display controller")
        })
        .map(classify_gpu)
        .find(|v| *v != GpuVendor::Unknown)
        .unwrap_or(GpuVendor::Unknown)
}
