use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Filesystem;

/// Offset of the first partition. Keeps the customary 1 MiB alignment gap.
pub const ALIGNMENT_MIB: u64 = 1;

const MIB_PER_GIB: u64 = 1024;

// ── Data types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionRole {
    Efi,
    Root,
    Swap,
    Home,
}

impl PartitionRole {
    /// GPT type code understood by `sgdisk -t`.
    pub fn type_code(self) -> &'static str {
        match self {
            PartitionRole::Efi => "ef00",
            PartitionRole::Root => "8304",
            PartitionRole::Swap => "8200",
            PartitionRole::Home => "8302",
        }
    }

    /// GPT partition name written by `sgdisk -c`.
    pub fn label(self) -> &'static str {
        match self {
            PartitionRole::Efi => "EFI",
            PartitionRole::Root => "root",
            PartitionRole::Swap => "swap",
            PartitionRole::Home => "home",
        }
    }
}

impl fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartitionRole::Efi => "EFI",
            PartitionRole::Root => "ROOT",
            PartitionRole::Swap => "SWAP",
            PartitionRole::Home => "HOME",
        };
        f.write_str(name)
    }
}

/// What a partition is formatted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentFormat {
    Fat32,
    Swap,
    Fs(Filesystem),
}

impl fmt::Display for ExtentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtentFormat::Fat32 => f.write_str("fat32"),
            ExtentFormat::Swap => f.write_str("swap"),
            ExtentFormat::Fs(fs) => write!(f, "{}", fs),
        }
    }
}

/// One planned partition, as a half-open `[start, end)` range in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionExtent {
    pub role: PartitionRole,
    pub start_mib: u64,
    pub end_mib: u64,
    pub format: ExtentFormat,
}

impl PartitionExtent {
    pub fn len_mib(&self) -> u64 {
        self.end_mib - self.start_mib
    }
}

/// How large the HOME partition should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "gib")]
pub enum HomeSize {
    /// Consume everything after ROOT/SWAP.
    #[default]
    Remaining,
    Explicit(u64),
}

impl fmt::Display for HomeSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HomeSize::Remaining => f.write_str("remaining space"),
            HomeSize::Explicit(gib) => write!(f, "{} GiB", gib),
        }
    }
}

/// Inputs to [`plan`], all sizes as entered by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanRequest {
    pub disk_capacity_mib: u64,
    pub efi_size_mib: u64,
    pub root_size_gib: u64,
    pub swap_size_gib: u64,
    pub home_size: HomeSize,
    pub filesystem: Filesystem,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("{role} would end at {end_mib} MiB but the disk holds only {capacity_mib} MiB")]
    Exceeded {
        role: PartitionRole,
        end_mib: u64,
        capacity_mib: u64,
    },

    #[error("{role} would have no space left (starts at {start_mib} MiB)")]
    Empty { role: PartitionRole, start_mib: u64 },
}

// ── Planner ───────────────────────────────────────────────────────────────────

/// Lays out EFI, ROOT, optional SWAP and HOME back to back on the disk.
///
/// Extents come out in that fixed order and are contiguous; SWAP is only
/// emitted when a non-zero swap size was requested. Any extent that would
/// cross the end of the disk, or that would be empty, is a [`CapacityError`].
pub fn plan(req: &PlanRequest) -> Result<Vec<PartitionExtent>, CapacityError> {
    let capacity = req.disk_capacity_mib;
    let mut extents = Vec::with_capacity(4);
    let mut cursor = ALIGNMENT_MIB;

    let mut push = |role, len_mib: u64, format, extents: &mut Vec<PartitionExtent>| {
        let start = cursor;
        let end = start.saturating_add(len_mib);
        if len_mib == 0 {
            return Err(CapacityError::Empty {
                role,
                start_mib: start,
            });
        }
        if end > capacity {
            return Err(CapacityError::Exceeded {
                role,
                end_mib: end,
                capacity_mib: capacity,
            });
        }
        extents.push(PartitionExtent {
            role,
            start_mib: start,
            end_mib: end,
            format,
        });
        cursor = end;
        Ok(())
    };

    push(PartitionRole::Efi, req.efi_size_mib, ExtentFormat::Fat32, &mut extents)?;
    push(
        PartitionRole::Root,
        gib_to_mib(req.root_size_gib),
        ExtentFormat::Fs(req.filesystem),
        &mut extents,
    )?;
    if req.swap_size_gib > 0 {
        push(
            PartitionRole::Swap,
            gib_to_mib(req.swap_size_gib),
            ExtentFormat::Swap,
            &mut extents,
        )?;
    }

    let home_start = extents.last().map_or(ALIGNMENT_MIB, |e| e.end_mib);
    let home_len = match req.home_size {
        HomeSize::Remaining => capacity.saturating_sub(home_start),
        HomeSize::Explicit(gib) => gib_to_mib(gib),
    };
    push(
        PartitionRole::Home,
        home_len,
        ExtentFormat::Fs(req.filesystem),
        &mut extents,
    )?;

    Ok(extents)
}

fn gib_to_mib(gib: u64) -> u64 {
    gib.saturating_mul(MIB_PER_GIB)
}

/// Converts a byte count reported by `lsblk` to whole MiB, rounding down.
pub fn bytes_to_mib(bytes: u64) -> u64 {
    bytes / (1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn request(root: u64, swap: u64, home: HomeSize) -> PlanRequest {
        PlanRequest {
            disk_capacity_mib: 102_400,
            efi_size_mib: 1024,
            root_size_gib: root,
            swap_size_gib: swap,
            home_size: home,
            filesystem: Filesystem::Ext4,
        }
    }

    fn ranges(extents: &[PartitionExtent]) -> Vec<(PartitionRole, u64, u64)> {
        extents
            .iter()
            .map(|e| (e.role, e.start_mib, e.end_mib))
            .collect()
    }

    #[test]
    fn hundred_gib_disk_with_swap_uses_remaining_for_home() {
        let extents = plan(&request(20, 2, HomeSize::Remaining)).unwrap();
        assert_eq!(
            ranges(&extents),
            vec![
                (PartitionRole::Efi, 1, 1025),
                (PartitionRole::Root, 1025, 21505),
                (PartitionRole::Swap, 21505, 23553),
                (PartitionRole::Home, 23553, 102_400),
            ]
        );
        assert_eq!(extents[0].format, ExtentFormat::Fat32);
        assert_eq!(extents[2].format, ExtentFormat::Swap);
        assert_eq!(extents[3].format, ExtentFormat::Fs(Filesystem::Ext4));
    }

    #[test]
    fn oversized_root_and_swap_fail_before_home() {
        let err = plan(&request(90, 20, HomeSize::Remaining)).unwrap_err();
        assert!(matches!(
            err,
            CapacityError::Exceeded {
                role: PartitionRole::Swap,
                ..
            }
        ));
    }

    #[test]
    fn swap_zero_gives_three_extents_and_one_gives_four() {
        let without = plan(&request(20, 0, HomeSize::Remaining)).unwrap();
        assert_eq!(without.len(), 3);
        assert!(without.iter().all(|e| e.role != PartitionRole::Swap));
        assert_eq!(without[2].start_mib, without[1].end_mib);

        let with = plan(&request(20, 1, HomeSize::Remaining)).unwrap();
        assert_eq!(with.len(), 4);
        assert_eq!(with[2].role, PartitionRole::Swap);
        assert_eq!(with[2].len_mib(), 1024);
    }

    #[test]
    fn explicit_home_that_fits_is_honoured() {
        let extents = plan(&request(20, 0, HomeSize::Explicit(10))).unwrap();
        let home = extents.last().unwrap();
        assert_eq!(home.start_mib, 21505);
        assert_eq!(home.end_mib, 21505 + 10 * 1024);
    }

    #[test]
    fn explicit_home_that_overflows_is_rejected_not_truncated() {
        let err = plan(&request(20, 2, HomeSize::Explicit(80))).unwrap_err();
        assert!(matches!(
            err,
            CapacityError::Exceeded {
                role: PartitionRole::Home,
                ..
            }
        ));
    }

    #[test]
    fn home_without_space_left_is_an_error() {
        // 1 + 1024 + 99 * 1024 = 102401 > capacity already for root.
        let err = plan(&request(99, 0, HomeSize::Remaining)).unwrap_err();
        assert!(matches!(err, CapacityError::Exceeded { role: PartitionRole::Root, .. }));

        let mut req = request(0, 0, HomeSize::Remaining);
        req.disk_capacity_mib = 1 + 1024 + 20 * 1024;
        req.root_size_gib = 20;
        let err = plan(&req).unwrap_err();
        assert_eq!(
            err,
            CapacityError::Empty {
                role: PartitionRole::Home,
                start_mib: 1 + 1024 + 20 * 1024,
            }
        );
    }

    #[test]
    fn zero_root_or_zero_explicit_home_is_empty() {
        assert!(matches!(
            plan(&request(0, 0, HomeSize::Remaining)),
            Err(CapacityError::Empty { role: PartitionRole::Root, .. })
        ));
        assert!(matches!(
            plan(&request(20, 0, HomeSize::Explicit(0))),
            Err(CapacityError::Empty { role: PartitionRole::Home, .. })
        ));
    }

    #[test]
    fn planning_is_deterministic() {
        let req = request(30, 4, HomeSize::Remaining);
        assert_eq!(plan(&req), plan(&req));
    }

    proptest! {
        #[test]
        fn layouts_are_ordered_contiguous_and_in_bounds(
            capacity in 2_048u64..4_000_000,
            efi in 256u64..2_048,
            root in 1u64..200,
            swap in 0u64..64,
            home in prop_oneof![Just(None), (1u64..500).prop_map(Some)],
        ) {
            let req = PlanRequest {
                disk_capacity_mib: capacity,
                efi_size_mib: efi,
                root_size_gib: root,
                swap_size_gib: swap,
                home_size: home.map_or(HomeSize::Remaining, HomeSize::Explicit),
                filesystem: Filesystem::Btrfs,
            };
            let fixed = ALIGNMENT_MIB + efi + (root + swap) * 1024;

            match plan(&req) {
                Ok(extents) => {
                    let roles: Vec<_> = extents.iter().map(|e| e.role).collect();
                    let mut expected = vec![PartitionRole::Efi, PartitionRole::Root];
                    if swap > 0 {
                        expected.push(PartitionRole::Swap);
                    }
                    expected.push(PartitionRole::Home);
                    prop_assert_eq!(roles, expected);

                    prop_assert_eq!(extents[0].start_mib, ALIGNMENT_MIB);
                    for pair in extents.windows(2) {
                        prop_assert_eq!(pair[0].end_mib, pair[1].start_mib);
                    }
                    for e in &extents {
                        prop_assert!(e.start_mib < e.end_mib);
                    }
                    prop_assert!(extents.last().unwrap().end_mib <= capacity);
                }
                Err(_) => {
                    let needed = match home {
                        Some(h) => fixed + h * 1024,
                        None => fixed + 1,
                    };
                    prop_assert!(needed > capacity);
                }
            }
        }

        #[test]
        fn explicit_home_overflow_never_yields_a_layout(
            root in 1u64..50,
            swap in 0u64..10,
            home in 1u64..200,
        ) {
            let req = PlanRequest {
                disk_capacity_mib: 102_400,
                efi_size_mib: 1024,
                root_size_gib: root,
                swap_size_gib: swap,
                home_size: HomeSize::Explicit(home),
                filesystem: Filesystem::Xfs,
            };
            let total = ALIGNMENT_MIB + 1024 + (root + swap + home) * 1024;
            prop_assert_eq!(plan(&req).is_err(), total > 102_400);
        }
    }
}
