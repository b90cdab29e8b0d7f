//! Linux i2c-dev backend
//!
//! Talks to `/dev/i2c-N` with plain read/write calls; the target address
//! is switched with the `I2C_SLAVE` ioctl.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use thiserror::Error;

use fwflash_core::transport::{Connector, I2cBus};

/// ioctl from <linux/i2c-dev.h>
mod ioctl {
    const I2C_SLAVE: u16 = 0x0703;

    nix::ioctl_write_int_bad!(i2c_slave, I2C_SLAVE);
}

/// Errors from the i2c-dev character device
#[derive(Debug, Error)]
pub enum I2cDevError {
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to set I2C target address 0x{address:02x}: {source}")]
    SetAddressFailed {
        address: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("I2C write of {len} bytes failed: {source}")]
    WriteFailed {
        len: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("I2C read of {len} bytes failed: {source}")]
    ReadFailed {
        len: usize,
        #[source]
        source: std::io::Error,
    },
}

impl From<I2cDevError> for fwflash_core::Error {
    fn from(e: I2cDevError) -> Self {
        let message = e.to_string();
        match e {
            I2cDevError::OpenFailed { source, .. }
            | I2cDevError::SetAddressFailed { source, .. }
            | I2cDevError::WriteFailed { source, .. }
            | I2cDevError::ReadFailed { source, .. } => {
                fwflash_core::Error::transport_io(message, source)
            }
        }
    }
}

/// An open `/dev/i2c-N` adapter
#[derive(Debug)]
pub struct I2cDev {
    file: File,
    path: PathBuf,
}

impl I2cDev {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, I2cDevError> {
        let path = path.as_ref();
        log::debug!("lspcon: opening {}", path.display());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| I2cDevError::OpenFailed {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl I2cBus for I2cDev {
    fn set_address(&mut self, address: u8) -> fwflash_core::Result<()> {
        let fd = self.file.as_raw_fd();
        unsafe {
            ioctl::i2c_slave(fd, libc::c_int::from(address)).map_err(|e| {
                I2cDevError::SetAddressFailed {
                    address,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> fwflash_core::Result<()> {
        self.file
            .write_all(data)
            .map_err(|source| I2cDevError::WriteFailed {
                len: data.len(),
                source,
            })?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> fwflash_core::Result<()> {
        self.file
            .read_exact(buf)
            .map_err(|source| I2cDevError::ReadFailed {
                len: buf.len(),
                source,
            })?;
        Ok(())
    }
}

/// Opens an i2c-dev adapter by path
#[derive(Debug, Clone)]
pub struct I2cDevConnector {
    pub path: PathBuf,
}

impl I2cDevConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Connector for I2cDevConnector {
    type Handle = I2cDev;

    fn connect(&mut self) -> fwflash_core::Result<I2cDev> {
        Ok(I2cDev::open(&self.path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwflash_core::ErrorKind;

    #[test]
    fn test_open_missing_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let err = I2cDevConnector::new(dir.path().join("i2c-99"))
            .connect()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("i2c-99"));
    }

    #[test]
    fn test_set_address_on_regular_file_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut dev = I2cDev::open(file.path()).unwrap();
        let err = dev.set_address(0x4a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("0x4a"));
    }
}
