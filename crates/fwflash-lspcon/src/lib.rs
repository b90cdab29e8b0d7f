//! fwflash-lspcon - Parade LSPCON firmware update support
//!
//! The Parade PS175 level shifter / protocol converter keeps its firmware in
//! an SPI NOR flash that the host can only reach over I2C, through a
//! register-mapped SPI bridge and a 256-byte flash window.
//!
//! # Flash Layout
//!
//! ```text
//! 0x00000  boot flag   55 AA <partition> <1 - partition>
//! 0x10000  partition 1
//! 0x20000  partition 2
//! ```
//!
//! An update always writes the partition that is not running, verifies it,
//! and then rewrites the boot flag. The firmware version is read from the
//! DPCD of the DisplayPort AUX channel named by the
//! `ParadeLspconAuxDeviceName` quirk.
//!
//! # Example
//!
//! ```no_run
//! use fwflash_core::clock::SystemClock;
//! use fwflash_core::{Context, Device, Firmware, Session};
//! use fwflash_lspcon::{I2cDevConnector, LspconDevice, SysfsAux, QUIRK_AUX_DEVICE_NAME};
//!
//! let ctx = Context::new()
//!     .with_quirk("PARADE-LSPCON\\NAME_1AF80175:00", "Name", "PS175")
//!     .with_quirk("PARADE-LSPCON\\NAME_1AF80175:00", QUIRK_AUX_DEVICE_NAME, "AUX B/DDI B/PHY B");
//!
//! let ops = LspconDevice::new(
//!     I2cDevConnector::new("/dev/i2c-7"),
//!     SysfsAux::new(),
//!     "1AF80175:00",
//!     SystemClock::new(),
//! );
//! let mut session = Session::new(ops, Device::new("i2c-7-004a"));
//! session.probe(&ctx)?;
//! session.install(&Firmware::new(std::fs::read("ps175.bin")?))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
pub mod dpcd;
pub mod flash;
mod i2c_dev;
pub mod regs;
pub mod update;

pub use device::{LspconDevice, LspconQuirks, DEVICE_NAME, QUIRK_AUX_DEVICE_NAME};
pub use dpcd::{AuxChannel, AuxDev, AuxError, AuxProvider, SysfsAux};
pub use flash::{FlashTiming, PagedFlash};
pub use i2c_dev::{I2cDev, I2cDevConnector, I2cDevError};
