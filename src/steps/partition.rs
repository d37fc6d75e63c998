use crate::{cmd::CommandRunner, error::InstallerError, pipeline::InstallPlan, planner::PartitionRole, ui};

/// Kernel device name of partition `n` on `disk`.
///
/// Devices whose name ends in a digit (`nvme0n1`, `mmcblk0`, `loop0`) get a
/// `p` separator: `/dev/nvme0n1p2`, but `/dev/sda2`.
pub fn part_path(disk: &str, n: usize) -> String {
    if disk.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{}p{}", disk, n)
    } else {
        format!("{}{}", disk, n)
    }
}

/// Writes a fresh GPT label and creates one partition per planned extent.
///
/// Each partition is its own `sgdisk` call, so the first failure stops the
/// stage with nothing after it attempted.
pub fn run(runner: &mut dyn CommandRunner, plan: &InstallPlan, target: &str) -> Result<(), InstallerError> {
    let disk = plan.disk_str();

    // Release anything a previous run left on this disk before wiping. Swap
    // on other disks stays active.
    runner.run_best_effort("umount", &["-R", target]);
    if let Ok(swap) = plan.device(PartitionRole::Swap) {
        runner.run_best_effort("swapoff", &[swap]);
    }

    runner.run("sgdisk", &["--zap-all", &disk])?;
    ui::print_success(&format!("Partition table on {} cleared.", disk));

    for part in &plan.partitions {
        let e = &part.extent;
        let n = part.number;
        // An extent reaching the end of the disk lets sgdisk pick the last
        // usable sector, which sits before the backup GPT header.
        let end = if e.end_mib >= plan.capacity_mib {
            "0".to_string()
        } else {
            format!("+{}M", e.len_mib())
        };
        let new = format!("{}:{}M:{}", n, e.start_mib, end);
        let kind = format!("{}:{}", n, e.role.type_code());
        let name = format!("{}:{}", n, e.role.label());

        runner.run("sgdisk", &["-n", &new, "-t", &kind, "-c", &name, &disk])?;
        ui::print_success(&format!(
            "{} created: {} ({} MiB)",
            e.role,
            part.device,
            e.len_mib()
        ));
    }

    runner.run("partprobe", &[&disk])?;
    runner.run_best_effort("udevadm", &["settle"]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cmd::testing::RecordingRunner, pipeline::tests::sample_plan};

    #[test]
    fn partition_names_follow_kernel_convention() {
        assert_eq!(part_path("/dev/sda", 1), "/dev/sda1");
        assert_eq!(part_path("/dev/vdb", 3), "/dev/vdb3");
        assert_eq!(part_path("/dev/nvme0n1", 2), "/dev/nvme0n1p2");
        assert_eq!(part_path("/dev/mmcblk0", 1), "/dev/mmcblk0p1");
    }

    #[test]
    fn one_sgdisk_call_per_extent_with_last_filling_disk() {
        let plan = sample_plan(2);
        let mut runner = RecordingRunner::default();
        run(&mut runner, &plan, "/mnt").unwrap();

        let sgdisk: Vec<_> = runner.calls.iter().filter(|c| c.starts_with("sgdisk")).collect();
        assert_eq!(sgdisk.len(), 5);
        assert_eq!(sgdisk[0], "sgdisk --zap-all /dev/sda");
        assert_eq!(sgdisk[1], "sgdisk -n 1:1M:+1024M -t 1:ef00 -c 1:EFI /dev/sda");
        assert_eq!(sgdisk[2], "sgdisk -n 2:1025M:+20480M -t 2:8304 -c 2:root /dev/sda");
        assert_eq!(sgdisk[3], "sgdisk -n 3:21505M:+2048M -t 3:8200 -c 3:swap /dev/sda");
        assert_eq!(sgdisk[4], "sgdisk -n 4:23553M:0 -t 4:8302 -c 4:home /dev/sda");
        assert!(runner.ran("partprobe /dev/sda"));
    }

    #[test]
    fn leftover_swap_release_stays_on_target_disk() {
        let mut runner = RecordingRunner::default();
        run(&mut runner, &sample_plan(2), "/mnt").unwrap();
        let swapoff: Vec<_> = runner.calls.iter().filter(|c| c.starts_with("swapoff")).collect();
        assert_eq!(swapoff, ["swapoff /dev/sda3"]);
        assert!(runner.position("swapoff").unwrap() < runner.position("sgdisk --zap-all").unwrap());

        let mut runner = RecordingRunner::default();
        run(&mut runner, &sample_plan(0), "/mnt").unwrap();
        assert!(!runner.ran("swapoff"));
    }

    #[test]
    fn stops_at_first_failing_partition() {
        let plan = sample_plan(2);
        let mut runner = RecordingRunner::failing_on("sgdisk -n 2:");
        assert!(run(&mut runner, &plan, "/mnt").is_err());
        assert!(!runner.ran("sgdisk -n 3:"));
        assert!(!runner.ran("partprobe"));
    }
}
