//! Register map
//!
//! The register file is split into pages, each answering on its own I2C
//! address. Page 2 is the default; code that selects another page does so
//! through an [`AddressGuard`](crate::flash::AddressGuard).

/// Default page: SPI bridge and control registers
pub const PAGE2: u8 = 0x4a;
/// Status page
pub const PAGE5: u8 = 0x4d;
/// 256-byte window into flash, positioned by FLASH_ADDR_HI/LO
pub const PAGE7: u8 = 0x4f;

pub const CLT2SPI: u8 = 0x82;
/// Written to CLT2SPI and released before mapped writes
pub const CLT2SPI_RESET: u8 = 0x20;
/// Bits 15..8 of the flash address mapped into page 7
pub const FLASH_ADDR_LO: u8 = 0x8e;
/// Bits 23..16 of the flash address mapped into page 7
pub const FLASH_ADDR_HI: u8 = 0x8f;

/// 16-deep SPI FIFOs
pub const WR_FIFO: u8 = 0x90;
pub const RD_FIFO: u8 = 0x91;
/// Low nibble: write length minus one
pub const SPI_LEN: u8 = 0x92;

pub const SPI_CTL: u8 = 0x93;
/// Write-only transaction
pub const SPI_CTL_NOREAD: u8 = 0x04;
/// Start executing; cleared by hardware on completion
pub const SPI_CTL_TRIGGER: u8 = 0x01;

/// Per-operation progress fields, zero when idle
pub const SPI_STATUS: u8 = 0x9e;
/// Sector erase in progress
pub const SPI_STATUS_SE_MASK: u8 = 0x0c;

pub const WR_PROTECT: u8 = 0xb3;
/// Deasserts the flash /WP line
pub const WR_PROTECT_DISABLE: u8 = 0x10;

/// MPU reset and run control
pub const MPU: u8 = 0xbc;
pub const MPU_RESET: u8 = 0xc0;
pub const MPU_STOPPED: u8 = 0x40;
pub const MPU_RUNNING: u8 = 0x00;

/// Enables writes through page 7 when fed [`MAP_WRITE_UNLOCK`]
pub const MAP_WRITE: u8 = 0xda;
pub const MAP_WRITE_UNLOCK: [u8; 6] = [0xaa, 0x55, 0x50, 0x41, 0x52, 0x44];
pub const MAP_WRITE_LOCK: u8 = 0x00;

/// On page 5: partition the firmware is running from
pub const ACTIVE_PARTITION: u8 = 0x0e;

/// Erase block and partition size
pub const FLASH_BLOCK_SIZE: u32 = 0x10000;
/// Size of the page 7 window
pub const PAGE_SIZE: usize = 256;
/// Depth of the SPI write FIFO
pub const FIFO_DEPTH: usize = 16;

/// SPI flash opcodes
pub mod opcodes {
    /// Write status register
    pub const WRSR: u8 = 0x01;
    /// Read status register
    pub const RDSR: u8 = 0x05;
    /// Write enable
    pub const WREN: u8 = 0x06;
    /// Enable volatile status register write
    pub const EWSR: u8 = 0x50;
    /// 64 KiB block erase
    pub const BE: u8 = 0xd8;
}

/// Status register: busy
pub const SR_BUSY: u8 = 0x01;
/// Status register: /WP controls writes, no block protection
pub const SR_UNPROTECTED: u8 = 0x80;
/// Status register: /WP controls writes, BP0|BP1 set
pub const SR_PROTECTED: u8 = 0x8c;
