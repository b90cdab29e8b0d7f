//! EFI variables through efivarfs

use std::path::{Path, PathBuf};

use crate::error::{EsrtError, Result};

/// Default efivarfs mount point
pub const SYSFS_EFIVARS: &str = "/sys/firmware/efi/efivars";

/// EFI_GLOBAL_VARIABLE vendor GUID
pub const EFI_GLOBAL_VARIABLE: &str = "8be4df61-93ca-11d2-aa0d-00e098032b8c";

/// Size of the attribute word efivarfs puts before the variable data
const ATTRIBUTES_LEN: usize = 4;

/// Path of variable `name` in the `vendor` namespace
pub fn variable_path(efivars: &Path, name: &str, vendor: &str) -> PathBuf {
    efivars.join(format!("{}-{}", name, vendor))
}

/// Data of an EFI variable, without the attribute prefix
pub fn read_variable(efivars: &Path, name: &str, vendor: &str) -> Result<Vec<u8>> {
    let path = variable_path(efivars, name, vendor);
    let mut data = std::fs::read(&path).map_err(|source| EsrtError::ReadFailed {
        path: path.clone(),
        source,
    })?;
    data.drain(..ATTRIBUTES_LEN.min(data.len()));
    Ok(data)
}

/// Whether the firmware booted with Secure Boot enforced
///
/// A missing or unreadable variable means disabled.
pub fn secure_boot_enabled(efivars: &Path) -> bool {
    match read_variable(efivars, "SecureBoot", EFI_GLOBAL_VARIABLE) {
        Ok(data) => data.first().is_some_and(|b| b & 1 != 0),
        Err(e) => {
            log::debug!("uefi: {}", e);
            false
        }
    }
}
