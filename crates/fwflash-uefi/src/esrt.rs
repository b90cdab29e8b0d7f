//! EFI System Resource Table entries from sysfs
//!
//! The kernel exposes each ESRT entry as a directory of attribute files
//! under `/sys/firmware/efi/esrt/entries/`.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use fwflash_core::{Device, DeviceFlags};

use crate::error::{EsrtError, Result};
use crate::sysfs::read_u64;

/// Default ESRT location
pub const SYSFS_ESRT: &str = "/sys/firmware/efi/esrt";

/// Protocol ID of capsule updates
pub const UEFI_CAPSULE_PROTOCOL: &str = "org.uefi.capsule";

/// ESRT firmware type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FwType {
    Unknown,
    SystemFirmware,
    DeviceFirmware,
    UefiDriver,
}

impl FwType {
    pub fn from_raw(value: u64) -> Self {
        match value {
            1 => FwType::SystemFirmware,
            2 => FwType::DeviceFirmware,
            3 => FwType::UefiDriver,
            _ => FwType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FwType::Unknown => "unknown",
            FwType::SystemFirmware => "system-firmware",
            FwType::DeviceFirmware => "device-firmware",
            FwType::UefiDriver => "uefi-driver",
        }
    }
}

/// Result of the last capsule update attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastAttemptStatus {
    Success,
    Unsuccessful,
    InsufficientResources,
    IncorrectVersion,
    InvalidFormat,
    AuthError,
    PowerEventAc,
    PowerEventBattery,
    Other(u64),
}

impl LastAttemptStatus {
    pub fn from_raw(value: u64) -> Self {
        match value {
            0 => LastAttemptStatus::Success,
            1 => LastAttemptStatus::Unsuccessful,
            2 => LastAttemptStatus::InsufficientResources,
            3 => LastAttemptStatus::IncorrectVersion,
            4 => LastAttemptStatus::InvalidFormat,
            5 => LastAttemptStatus::AuthError,
            6 => LastAttemptStatus::PowerEventAc,
            7 => LastAttemptStatus::PowerEventBattery,
            other => LastAttemptStatus::Other(other),
        }
    }
}

/// One ESRT entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsrtEntry {
    pub path: PathBuf,
    pub fw_class: Uuid,
    pub fw_type: FwType,
    pub fw_version: u64,
    pub lowest_supported_fw_version: u64,
    pub capsule_flags: u64,
    pub last_attempt_version: u64,
    pub last_attempt_status: LastAttemptStatus,
}

impl EsrtEntry {
    /// Read one entry directory
    pub fn read(path: &Path) -> Result<Self> {
        let class_path = path.join("fw_class");
        let value = fs::read_to_string(&class_path).map_err(|source| EsrtError::ReadFailed {
            path: class_path.clone(),
            source,
        })?;
        let fw_class = Uuid::parse_str(value.trim()).map_err(|_| EsrtError::InvalidClass {
            path: class_path,
            value: value.trim().to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            fw_class,
            fw_type: FwType::from_raw(read_u64(path, "fw_type")),
            fw_version: read_u64(path, "fw_version"),
            lowest_supported_fw_version: read_u64(path, "lowest_supported_fw_version"),
            capsule_flags: read_u64(path, "capsule_flags"),
            last_attempt_version: read_u64(path, "last_attempt_version"),
            last_attempt_status: LastAttemptStatus::from_raw(read_u64(
                path,
                "last_attempt_status",
            )),
        })
    }

    /// Build the device this entry describes
    pub fn to_device(&self) -> Device {
        let mut device = Device::new(self.path.display().to_string());
        device.add_guid(self.fw_class);
        device.set_version(self.fw_version.to_string());
        device.set_protocol(UEFI_CAPSULE_PROTOCOL);
        match self.fw_type {
            FwType::SystemFirmware => {
                device.set_name("System Firmware");
                device.add_flag(DeviceFlags::INTERNAL | DeviceFlags::UPDATABLE);
            }
            FwType::DeviceFirmware => {
                device.set_name("Device Firmware");
                device.add_flag(DeviceFlags::UPDATABLE);
            }
            FwType::UefiDriver | FwType::Unknown => {
                device.set_name(format!("UEFI {}", self.fw_type.as_str()));
            }
        }
        device
    }
}

/// Paths of all ESRT entries below `esrt`, sorted by name
pub fn entry_paths(esrt: &Path) -> Result<Vec<PathBuf>> {
    let entries = esrt.join("entries");
    let list_err = |source| EsrtError::ListFailed {
        path: entries.clone(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(&entries).map_err(list_err)? {
        paths.push(entry.map_err(list_err)?.path());
    }
    paths.sort();
    Ok(paths)
}

/// Read every ESRT entry below `esrt`
pub fn read_entries(esrt: &Path) -> Result<Vec<EsrtEntry>> {
    let entries = entry_paths(esrt)?
        .iter()
        .map(|path| EsrtEntry::read(path))
        .collect::<Result<Vec<_>>>()?;
    log::debug!("uefi: {} ESRT entries in {}", entries.len(), esrt.display());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SYSTEM_CLASS: &str = "ddc0ee61-e7f0-4e7d-acc5-c070a398838e";
    const DEVICE_CLASS: &str = "671d19d0-d43c-4852-98d9-1ce16f9967e4";

    fn add_entry(root: &TempDir, name: &str, attrs: &[(&str, &str)]) {
        let dir = root.path().join("entries").join(name);
        fs::create_dir_all(&dir).unwrap();
        for (attr, value) in attrs {
            fs::write(dir.join(attr), format!("{}\n", value)).unwrap();
        }
    }

    #[test]
    fn test_entries_sorted_and_parsed() {
        let root = TempDir::new().unwrap();
        add_entry(
            &root,
            "entry1",
            &[("fw_class", DEVICE_CLASS), ("fw_type", "2"), ("fw_version", "7")],
        );
        add_entry(
            &root,
            "entry0",
            &[
                ("fw_class", SYSTEM_CLASS),
                ("fw_type", "1"),
                ("fw_version", "0x00010203"),
                ("lowest_supported_fw_version", "65536"),
                ("capsule_flags", "0x8010"),
                ("last_attempt_version", "0x00010202"),
                ("last_attempt_status", "3"),
            ],
        );

        let entries = read_entries(root.path()).unwrap();
        assert_eq!(entries.len(), 2);

        let system = &entries[0];
        assert!(system.path.ends_with("entry0"));
        assert_eq!(system.fw_class, Uuid::parse_str(SYSTEM_CLASS).unwrap());
        assert_eq!(system.fw_type, FwType::SystemFirmware);
        assert_eq!(system.fw_version, 0x0001_0203);
        assert_eq!(system.lowest_supported_fw_version, 65536);
        assert_eq!(system.capsule_flags, 0x8010);
        assert_eq!(system.last_attempt_version, 0x0001_0202);
        assert_eq!(
            system.last_attempt_status,
            LastAttemptStatus::IncorrectVersion
        );

        let device = &entries[1];
        assert_eq!(device.fw_type, FwType::DeviceFirmware);
        assert_eq!(device.lowest_supported_fw_version, 0);
        assert_eq!(device.last_attempt_status, LastAttemptStatus::Success);
    }

    #[test]
    fn test_missing_entries_dir() {
        let root = TempDir::new().unwrap();
        let err = read_entries(root.path()).unwrap_err();
        assert!(matches!(err, EsrtError::ListFailed { .. }));
        let err: fwflash_core::Error = err.into();
        assert_eq!(err.kind(), fwflash_core::ErrorKind::Transport);
    }

    #[test]
    fn test_invalid_class() {
        let root = TempDir::new().unwrap();
        add_entry(&root, "entry0", &[("fw_class", "not-a-guid")]);
        assert!(matches!(
            read_entries(root.path()),
            Err(EsrtError::InvalidClass { .. })
        ));
    }

    #[test]
    fn test_entry_to_device() {
        let root = TempDir::new().unwrap();
        add_entry(
            &root,
            "entry0",
            &[("fw_class", SYSTEM_CLASS), ("fw_type", "1"), ("fw_version", "42")],
        );
        add_entry(&root, "entry1", &[("fw_class", DEVICE_CLASS), ("fw_type", "3")]);
        let entries = read_entries(root.path()).unwrap();

        let system = entries[0].to_device();
        assert!(system.has_guid(&Uuid::parse_str(SYSTEM_CLASS).unwrap()));
        assert_eq!(system.version(), Some("42"));
        assert!(system.has_flag(DeviceFlags::INTERNAL));
        assert!(system.has_flag(DeviceFlags::UPDATABLE));
        assert_eq!(system.protocol(), Some(UEFI_CAPSULE_PROTOCOL));

        let driver = entries[1].to_device();
        assert!(!driver.has_flag(DeviceFlags::UPDATABLE));
        assert!(!driver.has_flag(DeviceFlags::INTERNAL));
    }
}
