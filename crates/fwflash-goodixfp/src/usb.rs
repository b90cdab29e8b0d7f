//! nusb-backed bulk transport

use std::time::Duration;

use fwflash_core::transport::{BulkTransport, Connector};
use nusb::transfer::{Buffer, Bulk, In, Out};
use nusb::{Endpoint, MaybeFuture};

use crate::error::{GoodixUsbError, Result};
use crate::protocol::{EP_IN, EP_OUT, GOODIX_USB_VENDOR, USB_INTERFACE};

/// A Goodix sensor found on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbDeviceInfo {
    /// Stable physical ID for a [`fwflash_core::Device`]
    pub fn physical_id(&self) -> String {
        format!("usb:{:02x}:{:02x}", self.bus, self.address)
    }
}

/// List every device with the Goodix vendor ID
pub fn list_devices() -> Result<Vec<UsbDeviceInfo>> {
    let devices = nusb::list_devices()
        .wait()
        .map_err(|e| GoodixUsbError::OpenFailed(e.to_string()))?
        .filter(|d| d.vendor_id() == GOODIX_USB_VENDOR)
        .map(|d| UsbDeviceInfo {
            bus: d.busnum(),
            address: d.device_address(),
            vendor_id: d.vendor_id(),
            product_id: d.product_id(),
        })
        .collect();
    Ok(devices)
}

/// Claimed bulk endpoints of one sensor
pub struct NusbTransport {
    out_ep: Endpoint<Bulk, Out>,
    in_ep: Endpoint<Bulk, In>,
}

impl NusbTransport {
    /// Open the sensor at `bus`/`address` and claim its interface
    pub fn open(bus: u8, address: u8) -> Result<Self> {
        let info = nusb::list_devices()
            .wait()
            .map_err(|e| GoodixUsbError::OpenFailed(e.to_string()))?
            .find(|d| {
                d.vendor_id() == GOODIX_USB_VENDOR
                    && d.busnum() == bus
                    && d.device_address() == address
            })
            .ok_or(GoodixUsbError::DeviceNotFound {
                vendor_id: GOODIX_USB_VENDOR,
                product_id: 0,
            })?;

        log::info!(
            "goodixfp: opening {:04X}:{:04X} at bus {} address {}",
            info.vendor_id(),
            info.product_id(),
            bus,
            address
        );

        let device = info
            .open()
            .wait()
            .map_err(|e| GoodixUsbError::OpenFailed(e.to_string()))?;

        let interface = device
            .detach_and_claim_interface(USB_INTERFACE)
            .wait()
            .map_err(|e| GoodixUsbError::ClaimFailed {
                interface: USB_INTERFACE,
                message: e.to_string(),
            })?;
        let out_ep = interface
            .endpoint::<Bulk, Out>(EP_OUT)
            .map_err(|e| GoodixUsbError::ClaimFailed {
                interface: USB_INTERFACE,
                message: e.to_string(),
            })?;
        let in_ep = interface
            .endpoint::<Bulk, In>(EP_IN)
            .map_err(|e| GoodixUsbError::ClaimFailed {
                interface: USB_INTERFACE,
                message: e.to_string(),
            })?;

        Ok(Self { out_ep, in_ep })
    }
}

impl BulkTransport for NusbTransport {
    fn bulk_out(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> fwflash_core::Result<usize> {
        if endpoint != EP_OUT {
            return Err(GoodixUsbError::UnknownEndpoint(endpoint).into());
        }
        let mut buf = Buffer::new(data.len());
        buf.extend_from_slice(data);

        let completion = self.out_ep.transfer_blocking(buf, timeout);
        let actual = completion.actual_len;
        completion
            .status
            .map_err(|e| GoodixUsbError::TransferFailed {
                endpoint,
                message: e.to_string(),
            })?;

        log::trace!("goodixfp: USB write {}/{} bytes", actual, data.len());
        Ok(actual)
    }

    fn bulk_in(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> fwflash_core::Result<usize> {
        if endpoint != EP_IN {
            return Err(GoodixUsbError::UnknownEndpoint(endpoint).into());
        }
        let max_packet_size = self.in_ep.max_packet_size();
        // Request length must be multiple of max packet size
        let request_len = buf.len().div_ceil(max_packet_size) * max_packet_size;
        let mut in_buf = Buffer::new(request_len);
        in_buf.set_requested_len(request_len);

        let completion = self.in_ep.transfer_blocking(in_buf, timeout);
        let data = completion
            .into_result()
            .map_err(|e| GoodixUsbError::TransferFailed {
                endpoint,
                message: e.to_string(),
            })?;

        let received = std::cmp::min(data.len(), buf.len());
        buf[..received].copy_from_slice(&data[..received]);

        log::trace!("goodixfp: USB read {} bytes", received);
        Ok(received)
    }
}

/// Opens the sensor at a fixed bus position
#[derive(Debug, Clone, Copy)]
pub struct NusbConnector {
    pub bus: u8,
    pub address: u8,
}

impl Connector for NusbConnector {
    type Handle = NusbTransport;

    fn connect(&mut self) -> fwflash_core::Result<NusbTransport> {
        Ok(NusbTransport::open(self.bus, self.address)?)
    }
}
