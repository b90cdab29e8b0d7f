//! fwflash-goodixfp - Goodix fingerprint sensor support
//!
//! Goodix match-on-chip sensors take firmware over a pair of USB bulk
//! endpoints using a small framed protocol.
//!
//! # Protocol Overview
//!
//! Every request is a 5-byte header (`len` little-endian, `cmd0`, `cmd1`,
//! package flag), the payload, and a CRC-32 over header and payload. The
//! host sends a zero-length packet before each frame. The sensor answers
//! with an ACK and, for requests that carry data back, a second frame with
//! the reply body.
//!
//! An update is `UPGRADE/INIT`, then the image in 1000-byte `UPGRADE/DATA`
//! blocks with the last one marked end-of-package, then `RESET`. The sensor
//! re-enumerates after the reset.
//!
//! # Example
//!
//! ```no_run
//! use fwflash_core::{Context, Device, Firmware, Session};
//! use fwflash_goodixfp::{list_devices, GoodixFpDevice, NusbConnector};
//!
//! let info = list_devices()?.into_iter().next().expect("no sensor");
//! let connector = NusbConnector { bus: info.bus, address: info.address };
//! let ops = GoodixFpDevice::new(connector, info.vendor_id, info.product_id);
//!
//! let mut session = Session::new(ops, Device::new(info.physical_id()));
//! session.probe(&Context::new())?;
//! session.install(&Firmware::new(std::fs::read("sensor.bin")?))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod engine;
#[cfg(feature = "usb")]
mod error;
pub mod protocol;
#[cfg(feature = "usb")]
mod usb;

pub use device::GoodixFpDevice;
pub use engine::{PacketConfig, PacketEngine, DEFAULT_MAX_ZERO_LENGTH_READS, DEFAULT_TIMEOUT};
pub use protocol::{Request, Response, VersionInfo, GOODIX_USB_VENDOR};

#[cfg(feature = "usb")]
pub use error::GoodixUsbError;
#[cfg(feature = "usb")]
pub use usb::{list_devices, NusbConnector, NusbTransport, UsbDeviceInfo};
