//! DisplayPort AUX channel access to DPCD
//!
//! The LSPCON's firmware version is not readable over I2C; it is published
//! in the branch device fields of the DPCD, read through the kernel's
//! `drm_dp_aux_dev` character devices.

use std::fs::{self, File};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use fwflash_core::{Error, Result};

/// Branch device IEEE OUI, 3 bytes big-endian
pub const DPCD_BRANCH_OUI: u64 = 0x500;
/// Branch device firmware major and minor revision
pub const DPCD_BRANCH_FW_REVISION: u64 = 0x50a;
/// OUI of Parade Technologies
pub const PARADE_OUI: u32 = 0x001c_f8;

/// Default sysfs class directory of AUX devices
pub const SYSFS_AUX_CLASS: &str = "/sys/class/drm_dp_aux_dev";

/// Random access to one DPCD
pub trait AuxChannel {
    /// Fill `buf` from DPCD address `offset`
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

/// Looks up AUX channels by their kernel name
pub trait AuxProvider {
    type Channel: AuxChannel;

    fn open(&mut self, name: &str) -> Result<Self::Channel>;
}

/// Read and check the branch OUI, then return the firmware revision as `major.minor`
pub fn read_branch_version<A: AuxChannel + ?Sized>(aux: &mut A) -> Result<String> {
    let mut oui = [0u8; 3];
    aux.read_at(DPCD_BRANCH_OUI, &mut oui)?;
    let oui = u32::from_be_bytes([0, oui[0], oui[1], oui[2]]);
    if oui != PARADE_OUI {
        return Err(Error::NotSupported(format!(
            "device OUI {:06X} does not match expected value for Parade",
            oui
        )));
    }

    let mut revision = [0u8; 2];
    aux.read_at(DPCD_BRANCH_FW_REVISION, &mut revision)?;
    Ok(format!("{}.{}", revision[0], revision[1]))
}

/// Errors finding and reading AUX devices
#[derive(Debug, Error)]
pub enum AuxError {
    #[error("No DP AUX device named \"{0}\"")]
    NotFound(String),

    #[error("Found {count} DP AUX devices named \"{name}\"")]
    Ambiguous { name: String, count: usize },

    #[error("Failed to scan {path}: {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("DPCD read of {len} bytes at 0x{offset:05x} failed: {source}")]
    ReadFailed {
        offset: u64,
        len: usize,
        #[source]
        source: std::io::Error,
    },
}

impl From<AuxError> for Error {
    fn from(e: AuxError) -> Self {
        let message = e.to_string();
        match e {
            AuxError::NotFound(_) | AuxError::Ambiguous { .. } => Error::NotSupported(message),
            AuxError::ScanFailed { source, .. }
            | AuxError::OpenFailed { source, .. }
            | AuxError::ReadFailed { source, .. } => Error::transport_io(message, source),
        }
    }
}

/// AUX devices discovered through sysfs
#[derive(Debug, Clone)]
pub struct SysfsAux {
    class_dir: PathBuf,
    dev_dir: PathBuf,
}

impl Default for SysfsAux {
    fn default() -> Self {
        Self {
            class_dir: PathBuf::from(SYSFS_AUX_CLASS),
            dev_dir: PathBuf::from("/dev"),
        }
    }
}

impl SysfsAux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look devices up under `class_dir` and open them from `dev_dir`
    pub fn with_roots(class_dir: impl Into<PathBuf>, dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            class_dir: class_dir.into(),
            dev_dir: dev_dir.into(),
        }
    }

    /// Device node of the only AUX device whose `name` attribute is `name`
    pub fn find(&self, name: &str) -> std::result::Result<PathBuf, AuxError> {
        let scan_err = |source| AuxError::ScanFailed {
            path: self.class_dir.clone(),
            source,
        };

        let mut matches = Vec::new();
        for entry in fs::read_dir(&self.class_dir).map_err(scan_err)? {
            let entry = entry.map_err(scan_err)?;
            // Entries without a readable name are not AUX channels
            let Ok(attr) = fs::read_to_string(entry.path().join("name")) else {
                continue;
            };
            if attr.trim_end() == name {
                matches.push(entry.file_name());
            }
        }

        match matches.as_slice() {
            [] => Err(AuxError::NotFound(name.to_string())),
            [node] => Ok(self.dev_dir.join(node)),
            _ => Err(AuxError::Ambiguous {
                name: name.to_string(),
                count: matches.len(),
            }),
        }
    }
}

impl AuxProvider for SysfsAux {
    type Channel = AuxDev;

    fn open(&mut self, name: &str) -> Result<AuxDev> {
        let path = self.find(name)?;
        log::debug!("lspcon: using AUX device {}", path.display());
        Ok(AuxDev::open(&path)?)
    }
}

/// An open `/dev/drm_dp_auxN` node
#[derive(Debug)]
pub struct AuxDev {
    file: File,
}

impl AuxDev {
    pub fn open(path: &Path) -> std::result::Result<Self, AuxError> {
        let file = File::open(path).map_err(|source| AuxError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { file })
    }
}

impl AuxChannel for AuxDev {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file
            .read_exact_at(buf, offset)
            .map_err(|source| AuxError::ReadFailed {
                offset,
                len: buf.len(),
                source,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwflash_core::ErrorKind;
    use tempfile::TempDir;

    fn dpcd(oui: [u8; 3], major: u8, minor: u8) -> Vec<u8> {
        let mut data = vec![0u8; 0x600];
        data[0x500..0x503].copy_from_slice(&oui);
        data[0x50a] = major;
        data[0x50b] = minor;
        data
    }

    fn add_aux(root: &TempDir, node: &str, name: &str, contents: &[u8]) {
        let class = root.path().join("class").join(node);
        fs::create_dir_all(&class).unwrap();
        fs::write(class.join("name"), format!("{}\n", name)).unwrap();
        let dev = root.path().join("dev");
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join(node), contents).unwrap();
    }

    fn sysfs(root: &TempDir) -> SysfsAux {
        SysfsAux::with_roots(root.path().join("class"), root.path().join("dev"))
    }

    #[test]
    fn test_version_from_sysfs_device() {
        let root = TempDir::new().unwrap();
        add_aux(&root, "drm_dp_aux0", "AUX A/DDI A/PHY A", &[]);
        add_aux(
            &root,
            "drm_dp_aux1",
            "AUX B/DDI B/PHY B",
            &dpcd([0x00, 0x1c, 0xf8], 3, 7),
        );

        let mut aux = sysfs(&root).open("AUX B/DDI B/PHY B").unwrap();
        assert_eq!(read_branch_version(&mut aux).unwrap(), "3.7");
    }

    #[test]
    fn test_wrong_oui() {
        let root = TempDir::new().unwrap();
        add_aux(&root, "drm_dp_aux0", "AUX", &dpcd([0x00, 0x90, 0x4c], 1, 0));
        let mut aux = sysfs(&root).open("AUX").unwrap();
        let err = read_branch_version(&mut aux).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn test_not_found_and_ambiguous() {
        let root = TempDir::new().unwrap();
        add_aux(&root, "drm_dp_aux0", "AUX", &[]);
        add_aux(&root, "drm_dp_aux1", "AUX", &[]);

        let aux = sysfs(&root);
        assert!(matches!(aux.find("missing"), Err(AuxError::NotFound(_))));
        assert!(matches!(
            aux.find("AUX"),
            Err(AuxError::Ambiguous { count: 2, .. })
        ));
        let err: Error = aux.find("AUX").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn test_short_device_is_transport_error() {
        let root = TempDir::new().unwrap();
        add_aux(&root, "drm_dp_aux0", "AUX", &[0u8; 0x100]);
        let mut aux = sysfs(&root).open("AUX").unwrap();
        let err = read_branch_version(&mut aux).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
