//! fwflash-uefi - UEFI system firmware discovery
//!
//! Reads the EFI System Resource Table the kernel publishes in sysfs and
//! turns each entry into a [`fwflash_core::Device`], and reports whether
//! Secure Boot is enabled. Capsule delivery itself is not handled here.

mod efivar;
mod error;
mod esrt;
pub mod sysfs;

pub use efivar::{
    read_variable, secure_boot_enabled, variable_path, EFI_GLOBAL_VARIABLE, SYSFS_EFIVARS,
};
pub use error::{EsrtError, Result};
pub use esrt::{
    entry_paths, read_entries, EsrtEntry, FwType, LastAttemptStatus, SYSFS_ESRT,
    UEFI_CAPSULE_PROTOCOL,
};
