//! Dual-partition firmware update
//!
//! Flash layout: block 0 holds the boot flag, blocks 1 and 2 hold the two
//! user partitions. An update writes the partition that is not running,
//! verifies it, then rewrites the flag so the next boot uses it.

use fwflash_core::clock::Clock;
use fwflash_core::transport::I2cBus;
use fwflash_core::{Device, DeviceStatus, Error, NoProgress, Progress, Result, ResultExt};

use crate::flash::{check_active_partition, partition_address, target_partition, PagedFlash};
use crate::regs::FLASH_BLOCK_SIZE;

/// Boot flag selecting `partition`
pub fn flag_record(partition: u8) -> [u8; 4] {
    [0x55, 0xaa, partition, 1u8.wrapping_sub(partition)]
}

/// Write `image` to the inactive partition and switch the boot flag to it
///
/// Returns the partition written. Once write protection has been released
/// it is always put back, also when a later step fails; in that case the
/// original error is returned and a restore failure is only logged.
pub fn write_image<B, K>(
    flash: &mut PagedFlash<B, K>,
    device: &mut Device,
    image: &[u8],
) -> Result<u8>
where
    B: I2cBus,
    K: Clock,
{
    if image.len() != FLASH_BLOCK_SIZE as usize {
        return Err(Error::NotSupported(format!(
            "invalid image size 0x{:x}, expected 0x{:x}",
            image.len(),
            FLASH_BLOCK_SIZE
        )));
    }

    let active = flash
        .active_partition()
        .context("read active partition")?;
    let active = check_active_partition(active)?;
    let target = target_partition(active);
    log::info!(
        "lspcon: running from partition {}, updating partition {}",
        active,
        target
    );

    flash
        .set_write_protect(false)
        .context("deassert write protect")?;

    let programmed = program(flash, device, image, target);
    let restored = restore_protection(flash);
    match programmed {
        Ok(()) => restored.map(|()| target),
        Err(e) => {
            if let Err(restore_err) = restored {
                log::warn!("lspcon: flash protection not restored: {}", restore_err);
            }
            Err(e)
        }
    }
}

fn program<B, K>(
    flash: &mut PagedFlash<B, K>,
    device: &mut Device,
    image: &[u8],
    target: u8,
) -> Result<()>
where
    B: I2cBus,
    K: Clock,
{
    flash
        .set_block_protection(false)
        .context("disable block protection")?;
    flash.wait_ready().context("disable block protection")?;

    let address = partition_address(target);
    device.set_status(DeviceStatus::DeviceErase);
    flash
        .erase_block(address, FLASH_BLOCK_SIZE)
        .with_context(|| format!("erase partition {}", target))?;

    device.set_status(DeviceStatus::DeviceWrite);
    flash
        .write(address, image, &mut *device)
        .with_context(|| format!("write partition {}", target))?;

    device.set_status(DeviceStatus::DeviceVerify);
    verify(flash, address, image, &mut *device)
        .with_context(|| format!("verify partition {}", target))?;

    let flag = flag_record(target);
    device.set_status(DeviceStatus::DeviceErase);
    flash
        .erase_block(0, FLASH_BLOCK_SIZE)
        .context("erase flag partition")?;
    device.set_status(DeviceStatus::DeviceWrite);
    flash
        .write(0, &flag, &mut NoProgress)
        .context("write flag partition")?;
    device.set_status(DeviceStatus::DeviceVerify);
    verify(flash, 0, &flag, &mut NoProgress).context("verify flag partition")
}

/// Re-enable block protection and reassert /WP, attempting both
fn restore_protection<B: I2cBus, K: Clock>(flash: &mut PagedFlash<B, K>) -> Result<()> {
    let block = flash
        .set_block_protection(true)
        .context("enable block protection");
    let wp = flash
        .set_write_protect(true)
        .context("assert write protect");
    block.and(wp)
}

/// Read back `expected` from `address` and compare
pub fn verify<B, K>(
    flash: &mut PagedFlash<B, K>,
    address: u32,
    expected: &[u8],
    progress: &mut dyn Progress,
) -> Result<()>
where
    B: I2cBus,
    K: Clock,
{
    let mut actual = vec![0u8; expected.len()];
    flash.read(address, &mut actual, progress)?;
    match expected.iter().zip(&actual).position(|(e, a)| e != a) {
        None => Ok(()),
        Some(i) => Err(Error::VerifyMismatch {
            address: address + i as u32,
            expected: expected[i],
            actual: actual[i],
        }),
    }
}

/// Read a whole partition
pub fn read_partition<B, K>(
    flash: &mut PagedFlash<B, K>,
    partition: u8,
    progress: &mut dyn Progress,
) -> Result<Vec<u8>>
where
    B: I2cBus,
    K: Clock,
{
    let mut data = vec![0u8; FLASH_BLOCK_SIZE as usize];
    flash.read(partition_address(partition), &mut data, progress)?;
    Ok(data)
}
