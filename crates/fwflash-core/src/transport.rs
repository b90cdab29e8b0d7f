//! Transport traits
//!
//! Protocol engines talk to hardware only through these traits. Backends
//! (nusb, Linux i2c-dev) implement them; tests implement them with
//! in-memory device models.

use std::time::Duration;

use crate::error::Result;

/// Synchronous USB bulk transfers
pub trait BulkTransport {
    /// Send `data` to an OUT endpoint, returning the number of bytes sent
    fn bulk_out(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Receive into `buf` from an IN endpoint, returning the number of bytes received
    ///
    /// A return of 0 is a zero-length packet, not an error.
    fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

/// An I2C bus with a selectable target address
pub trait I2cBus {
    /// Select the 7-bit target address for subsequent transfers
    fn set_address(&mut self, address: u8) -> Result<()>;

    fn write(&mut self, data: &[u8]) -> Result<()>;

    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write a single byte register at the current address
    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        self.write(&[register, value])
    }

    /// Read a single byte register at the current address
    fn read_register(&mut self, register: u8) -> Result<u8> {
        self.write(&[register])?;
        let mut value = [0u8; 1];
        self.read(&mut value)?;
        Ok(value[0])
    }
}

impl<B: I2cBus + ?Sized> I2cBus for &mut B {
    fn set_address(&mut self, address: u8) -> Result<()> {
        (**self).set_address(address)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read(buf)
    }
}

/// Produces a hardware handle when a device is opened
pub trait Connector {
    type Handle;

    fn connect(&mut self) -> Result<Self::Handle>;
}
