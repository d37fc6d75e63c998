use std::path::PathBuf;

use crate::{cmd::CommandRunner, error::InstallerError, settings::Settings, ui};

/// Generates `<target>/etc/fstab` using UUIDs via `genfstab`.
///
/// Equivalent to: `genfstab -U /mnt >> /mnt/etc/fstab`
pub fn generate(runner: &mut dyn CommandRunner, settings: &Settings) -> Result<(), InstallerError> {
    let target = settings.target_path("");
    let fstab = PathBuf::from(settings.target_path("etc/fstab"));

    runner.append_output("genfstab", &["-U", &target], &fstab)?;
    ui::print_success(&format!("fstab written to {}.", fstab.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::testing::RecordingRunner;

    #[test]
    fn appends_uuid_entries_to_target_fstab() {
        let mut runner = RecordingRunner::default();
        generate(&mut runner, &Settings::default()).unwrap();
        assert_eq!(runner.calls, ["genfstab -U /mnt"]);
        assert!(runner.file("/mnt/etc/fstab").is_some());
    }
}
