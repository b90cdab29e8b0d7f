//! UEFI ESRT listing

use std::path::Path;

use fwflash_uefi::{read_entries, secure_boot_enabled};

use super::print_device;

pub fn run(esrt: &Path, efivars: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "Secure Boot: {}",
        if secure_boot_enabled(efivars) {
            "enabled"
        } else {
            "disabled"
        }
    );

    let entries = read_entries(esrt)?;
    if entries.is_empty() {
        println!("No ESRT entries");
    }
    for entry in &entries {
        println!();
        print_device(&entry.to_device());
        println!("  Type:         {}", entry.fw_type.as_str());
        println!(
            "  Lowest:       {}",
            entry.lowest_supported_fw_version
        );
        println!("  Capsule:      0x{:08x}", entry.capsule_flags);
        println!(
            "  Last attempt: {} ({:?})",
            entry.last_attempt_version, entry.last_attempt_status
        );
    }
    Ok(())
}
