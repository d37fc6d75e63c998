//! One module per external collaborator the install pipeline drives.

pub mod bootloader;
pub mod chroot;
pub mod format;
pub mod fstab;
pub mod mount;
pub mod packages;
pub mod partition;
pub mod preflight;
