//! fwflash-core - Device lifecycle and protocol building blocks
//!
//! This crate holds everything the device-specific crates share:
//!
//! - [`lifecycle`]: the [`DeviceOps`] hooks every device variant implements,
//!   and the [`Session`] state machine that runs them in order
//! - [`device`]: the [`Device`] data model, flags, status and progress
//! - [`quirks`]: quirk lookup by instance ID and typed resolution at probe time
//! - [`firmware`]: the [`Firmware`] container and its image layout
//! - [`transport`]: USB bulk and I2C traits implemented by backends
//! - [`chunk`], [`checksum`], [`guard`], [`clock`], [`dump`]: small
//!   utilities used by the protocol engines
//!
//! # Example
//!
//! ```no_run
//! use fwflash_core::{Context, Device, DeviceOps, Firmware, InstallOutcome, Result, Session};
//!
//! struct Blinker;
//!
//! impl DeviceOps for Blinker {
//!     fn probe(&mut self, device: &mut Device, _ctx: &Context) -> Result<()> {
//!         device.add_instance_id("BLINKER\\MODEL_1");
//!         Ok(())
//!     }
//!
//!     fn write_firmware(&mut self, _device: &mut Device, _fw: &Firmware) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let mut session = Session::new(Blinker, Device::new("blinker-0"));
//! session.probe(&Context::new())?;
//! assert_eq!(
//!     session.install(&Firmware::new(vec![0; 64]))?,
//!     InstallOutcome::Complete
//! );
//! # Ok::<(), fwflash_core::Error>(())
//! ```

pub mod checksum;
pub mod chunk;
pub mod clock;
pub mod device;
pub mod dump;
pub mod error;
pub mod firmware;
pub mod guard;
pub mod lifecycle;
pub mod quirks;
pub mod transport;

pub use device::{Device, DeviceFlags, DeviceStatus, NoProgress, Progress, ProgressObserver};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use firmware::{Firmware, Image, UnvalidatedFirmware};
pub use lifecycle::{DeviceLocker, DeviceOps, InstallOutcome, LifecycleState, Session};
pub use quirks::{Context, FromQuirks, QuirkSet};
