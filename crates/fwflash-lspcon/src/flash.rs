//! SPI flash behind the LSPCON register window
//!
//! The chip has no direct SPI path to the host. Commands are pushed through
//! a 16-byte FIFO on page 2, and flash contents are read and written through
//! the 256-byte page 7 window, whose position is set by two address
//! registers.

use std::time::Duration;

use fwflash_core::chunk::split;
use fwflash_core::clock::{Clock, Poll, Polled};
use fwflash_core::guard::Guard;
use fwflash_core::transport::I2cBus;
use fwflash_core::{Error, Progress, Result};

use crate::regs::{self, opcodes, FLASH_BLOCK_SIZE, PAGE_SIZE};

/// Upper bound of every hardware wait
pub const POLL_DEADLINE: Duration = Duration::from_secs(10);

/// Size of the 24-bit flash address space
const ADDRESS_SPACE: u64 = 1 << 24;

/// Poll intervals, deadlines and fixed delays used by [`PagedFlash`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashTiming {
    /// SPI_CTL trigger and SPI_STATUS polls
    pub register_poll: Poll,
    /// Status register busy-bit polls
    pub ready_poll: Poll,
    /// Delay between asserting and releasing CLT2SPI
    pub clt2spi_settle: Duration,
}

impl Default for FlashTiming {
    fn default() -> Self {
        Self {
            register_poll: Poll::new(Duration::ZERO, POLL_DEADLINE),
            ready_poll: Poll::new(Duration::from_millis(1), POLL_DEADLINE),
            clt2spi_settle: Duration::from_millis(100),
        }
    }
}

impl FlashTiming {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_register_poll(mut self, poll: Poll) -> Self {
        self.register_poll = poll;
        self
    }

    pub fn with_ready_poll(mut self, poll: Poll) -> Self {
        self.ready_poll = poll;
        self
    }

    pub fn with_clt2spi_settle(mut self, settle: Duration) -> Self {
        self.clt2spi_settle = settle;
        self
    }
}

/// Bus borrowed with a non-default page selected
///
/// Page 2 is selected again when the guard is dropped. A failure to do so
/// is logged; there is nobody left to return it to.
pub type AddressGuard<'a, B> = Guard<'a, B, fn(&mut B)>;

fn restore_default_page<B: I2cBus>(bus: &mut B) {
    if let Err(e) = bus.set_address(regs::PAGE2) {
        log::warn!(
            "lspcon: failed to restore I2C page 0x{:02x}: {}",
            regs::PAGE2,
            e
        );
    }
}

/// Select `page` until the returned guard is dropped
pub fn select_page<B: I2cBus>(bus: &mut B, page: u8) -> Result<AddressGuard<'_, B>> {
    log::trace!("lspcon: select page 0x{:02x}", page);
    Guard::acquire(
        bus,
        |bus| bus.set_address(page),
        restore_default_page::<B> as fn(&mut B),
    )
}

/// Partition to write when the firmware is running from `active`
///
/// Never the running one. From the boot partition either user partition
/// would do; the first is preferred.
pub fn target_partition(active: u8) -> u8 {
    if active == 1 {
        2
    } else {
        1
    }
}

/// Accept only the partitions the boot ROM can run from (1..=3)
pub fn check_active_partition(active: u8) -> Result<u8> {
    if !(1..=3).contains(&active) {
        return Err(Error::NotSupported(format!(
            "unexpected active flash partition: {}",
            active
        )));
    }
    Ok(active)
}

/// Flash address of a partition
pub fn partition_address(partition: u8) -> u32 {
    u32::from(partition) * FLASH_BLOCK_SIZE
}

/// Paged access to the flash attached to an LSPCON
///
/// Assumes page 2 is selected whenever no [`AddressGuard`] is alive.
pub struct PagedFlash<B, K> {
    bus: B,
    clock: K,
    timing: FlashTiming,
}

impl<B: I2cBus, K: Clock> PagedFlash<B, K> {
    pub fn new(bus: B, clock: K, timing: FlashTiming) -> Self {
        Self { bus, clock, timing }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    pub fn timing(&self) -> &FlashTiming {
        &self.timing
    }

    pub fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        log::trace!("lspcon: reg 0x{:02x} <- 0x{:02x}", register, value);
        self.bus.write_register(register, value)
    }

    pub fn read_register(&mut self, register: u8) -> Result<u8> {
        let value = self.bus.read_register(register)?;
        log::trace!("lspcon: reg 0x{:02x} -> 0x{:02x}", register, value);
        Ok(value)
    }

    /// Position the page 7 window over the 256 bytes containing `address`
    pub fn map_page(&mut self, address: u32) -> Result<()> {
        self.write_register(regs::FLASH_ADDR_HI, (address >> 16) as u8)?;
        self.write_register(regs::FLASH_ADDR_LO, (address >> 8) as u8)
    }

    /// Wait until `(register & mask) == expected`
    pub fn poll_register(&mut self, register: u8, mask: u8, expected: u8) -> Result<()> {
        poll_register(
            &mut self.bus,
            &self.clock,
            &self.timing.register_poll,
            register,
            mask,
            expected,
        )
    }

    /// Run a write-only SPI command of 1 to 16 bytes
    pub fn transmit_command(&mut self, command: &[u8]) -> Result<()> {
        if command.is_empty() || command.len() > regs::FIFO_DEPTH {
            return Err(Error::Internal(format!(
                "SPI command of {} bytes does not fit the {}-byte FIFO",
                command.len(),
                regs::FIFO_DEPTH
            )));
        }
        for &byte in command {
            self.write_register(regs::WR_FIFO, byte)?;
        }
        self.write_register(regs::SPI_LEN, (command.len() - 1) as u8)?;
        self.write_register(regs::SPI_CTL, regs::SPI_CTL_NOREAD | regs::SPI_CTL_TRIGGER)
    }

    /// Set the write enable latch for the next program, erase or WRSR
    pub fn enable_write(&mut self) -> Result<()> {
        self.transmit_command(&[opcodes::WREN])
    }

    /// Read the flash status register
    pub fn read_status(&mut self) -> Result<u8> {
        read_status(&mut self.bus, &self.clock, &self.timing.register_poll)
    }

    /// Wait for the flash busy bit to clear
    pub fn wait_ready(&mut self) -> Result<()> {
        let bus = &mut self.bus;
        let clock = &self.clock;
        let timing = &self.timing;
        let polled = timing.ready_poll.until(
            clock,
            || read_status(bus, clock, &timing.register_poll),
            |status| status & regs::SR_BUSY == 0,
        )?;
        match polled {
            Polled::Ready(_) => Ok(()),
            Polled::Expired { last, elapsed } => Err(Error::Timeout(format!(
                "flash still busy after {:?} (status 0x{:02x})",
                elapsed, last
            ))),
        }
    }

    /// Fill `buf` from flash starting at `address`
    ///
    /// The window always returns a whole page, so unaligned starts and ends
    /// read the full page and keep only the requested part.
    pub fn read(
        &mut self,
        address: u32,
        buf: &mut [u8],
        progress: &mut dyn Progress,
    ) -> Result<()> {
        check_range(address, buf.len())?;
        let total = buf.len();
        let mut address = address;
        let mut done = 0;
        let mut page = [0u8; PAGE_SIZE];

        while done < total {
            let start = address as usize % PAGE_SIZE;
            let take = (total - done).min(PAGE_SIZE - start);

            self.map_page(address)?;
            {
                let mut bus = select_page(&mut self.bus, regs::PAGE7)?;
                bus.read(&mut page)?;
            }

            buf[done..done + take].copy_from_slice(&page[start..start + take]);
            done += take;
            address += take as u32;
            progress.set_progress(done, total);
        }
        Ok(())
    }

    /// Program `data` starting at the page-aligned `address`
    ///
    /// The target range must already be erased.
    pub fn write(
        &mut self,
        address: u32,
        data: &[u8],
        progress: &mut dyn Progress,
    ) -> Result<()> {
        if address as usize % PAGE_SIZE != 0 {
            return Err(Error::NotSupported(format!(
                "write address 0x{:06x} is not {}-byte aligned",
                address, PAGE_SIZE
            )));
        }
        check_range(address, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        log::debug!(
            "lspcon: flash write {} bytes at 0x{:06x}",
            data.len(),
            address
        );

        for &byte in &regs::MAP_WRITE_UNLOCK {
            self.write_register(regs::MAP_WRITE, byte)?;
        }
        self.write_register(regs::CLT2SPI, regs::CLT2SPI_RESET)?;
        self.clock.sleep(self.timing.clt2spi_settle);
        self.write_register(regs::CLT2SPI, 0)?;

        // Window writes carry a one-byte offset into the page; always 0
        let mut frame = Vec::with_capacity(PAGE_SIZE + 1);
        for chunk in split(data, PAGE_SIZE).with_base_address(address) {
            self.map_page(chunk.address)?;
            frame.clear();
            frame.push(0);
            frame.extend_from_slice(chunk.data);
            {
                let mut bus = select_page(&mut self.bus, regs::PAGE7)?;
                bus.write(&frame)?;
            }
            progress.set_progress(chunk.offset + chunk.len(), data.len());
        }

        self.write_register(regs::MAP_WRITE, regs::MAP_WRITE_LOCK)
    }

    /// Erase the 64 KiB block at `address`
    pub fn erase_block(&mut self, address: u32, size: u32) -> Result<()> {
        if address % FLASH_BLOCK_SIZE != 0 {
            return Err(Error::NotSupported(format!(
                "erase address 0x{:06x} is not block aligned",
                address
            )));
        }
        if size != FLASH_BLOCK_SIZE {
            return Err(Error::NotSupported(format!(
                "erase size 0x{:x} is not one block (0x{:x})",
                size, FLASH_BLOCK_SIZE
            )));
        }
        check_range(address, size as usize)?;
        log::debug!("lspcon: erase block at 0x{:06x}", address);

        self.enable_write()?;
        self.transmit_command(&[
            opcodes::BE,
            (address >> 16) as u8,
            (address >> 8) as u8,
            address as u8,
        ])?;
        self.poll_register(regs::SPI_STATUS, regs::SPI_STATUS_SE_MASK, 0)?;
        self.wait_ready()
    }

    /// Partition the firmware is currently running from
    pub fn active_partition(&mut self) -> Result<u8> {
        let mut bus = select_page(&mut self.bus, regs::PAGE5)?;
        let partition = bus.read_register(regs::ACTIVE_PARTITION)?;
        Ok(partition)
    }

    /// Reset the MPU and leave it running or halted
    pub fn set_mpu_running(&mut self, running: bool) -> Result<()> {
        self.write_register(regs::MPU, regs::MPU_RESET)?;
        let state = if running {
            regs::MPU_RUNNING
        } else {
            regs::MPU_STOPPED
        };
        self.write_register(regs::MPU, state)
    }

    /// Drive the flash /WP line
    pub fn set_write_protect(&mut self, asserted: bool) -> Result<()> {
        let value = if asserted {
            0
        } else {
            regs::WR_PROTECT_DISABLE
        };
        self.write_register(regs::WR_PROTECT, value)
    }

    /// Set or clear the block protection bits until the next power cycle
    pub fn set_block_protection(&mut self, enabled: bool) -> Result<()> {
        let status = if enabled {
            regs::SR_PROTECTED
        } else {
            regs::SR_UNPROTECTED
        };
        self.transmit_command(&[opcodes::EWSR])?;
        self.transmit_command(&[opcodes::WRSR, status, 0x00])
    }
}

fn check_range(address: u32, len: usize) -> Result<()> {
    if u64::from(address) + len as u64 > ADDRESS_SPACE {
        return Err(Error::NotSupported(format!(
            "range 0x{:06x}+0x{:x} is outside the 24-bit flash",
            address, len
        )));
    }
    Ok(())
}

fn poll_register<B, K>(
    bus: &mut B,
    clock: &K,
    poll: &Poll,
    register: u8,
    mask: u8,
    expected: u8,
) -> Result<()>
where
    B: I2cBus,
    K: Clock,
{
    let polled = poll.until(
        clock,
        || bus.read_register(register),
        |value| value & mask == expected,
    )?;
    match polled {
        Polled::Ready(_) => Ok(()),
        Polled::Expired { last, elapsed } => Err(Error::RegisterTimeout {
            register,
            mask,
            expected,
            last,
            elapsed,
        }),
    }
}

fn read_status<B: I2cBus, K: Clock>(bus: &mut B, clock: &K, poll: &Poll) -> Result<u8> {
    bus.write_register(regs::WR_FIFO, opcodes::RDSR)?;
    bus.write_register(regs::SPI_LEN, 0)?;
    bus.write_register(regs::SPI_CTL, regs::SPI_CTL_TRIGGER)?;
    poll_register(bus, clock, poll, regs::SPI_CTL, regs::SPI_CTL_TRIGGER, 0)?;
    bus.read_register(regs::RD_FIFO)
}
