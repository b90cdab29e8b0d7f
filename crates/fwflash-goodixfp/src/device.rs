//! Goodix match-on-chip fingerprint sensor

use std::time::Duration;

use fwflash_core::chunk::split;
use fwflash_core::transport::{BulkTransport, Connector};
use fwflash_core::{
    Context, Device, DeviceFlags, DeviceOps, Error, Firmware, Progress, Result, ResultExt,
};

use crate::engine::{PacketConfig, PacketEngine};
use crate::protocol::{Request, Response, GOODIX_USB_VENDOR, RESULT_SUCCESS};

/// Time the sensor needs to re-enumerate after a reset
const REMOVE_DELAY: Duration = Duration::from_millis(5000);

/// Goodix fingerprint sensor device variant
///
/// Holds the packet engine while the device is open. `C` supplies the
/// bulk transport when [`DeviceOps::open`] runs.
pub struct GoodixFpDevice<C>
where
    C: Connector,
    C::Handle: BulkTransport,
{
    connector: C,
    vendor_id: u16,
    product_id: u16,
    config: PacketConfig,
    engine: Option<PacketEngine<C::Handle>>,
}

impl<C> GoodixFpDevice<C>
where
    C: Connector,
    C::Handle: BulkTransport,
{
    pub fn new(connector: C, vendor_id: u16, product_id: u16) -> Self {
        Self {
            connector,
            vendor_id,
            product_id,
            config: PacketConfig::default(),
            engine: None,
        }
    }

    pub fn with_config(mut self, config: PacketConfig) -> Self {
        self.config = config;
        self
    }

    fn engine(&mut self) -> Result<&mut PacketEngine<C::Handle>> {
        self.engine
            .as_mut()
            .ok_or_else(|| Error::Internal("goodixfp: device is not open".into()))
    }

    /// Read the firmware version string
    pub fn read_version(&mut self) -> Result<String> {
        match self.engine()?.exchange(&Request::version())? {
            Response::Version(info) => Ok(info.version_string()),
            other => Err(Error::Protocol(format!(
                "expected version reply, got {:?}",
                other
            ))),
        }
    }

    fn update_init(&mut self) -> Result<()> {
        let response = self.engine()?.exchange(&Request::update_init())?;
        if response.result() != RESULT_SUCCESS {
            return Err(Error::Protocol(format!(
                "update init rejected with result 0x{:02X}",
                response.result()
            )));
        }
        Ok(())
    }
}

impl<C> DeviceOps for GoodixFpDevice<C>
where
    C: Connector,
    C::Handle: BulkTransport,
{
    fn probe(&mut self, device: &mut Device, ctx: &Context) -> Result<()> {
        if self.vendor_id != GOODIX_USB_VENDOR {
            return Err(Error::NotSupported(format!(
                "USB vendor 0x{:04X} is not Goodix",
                self.vendor_id
            )));
        }

        device.set_name("Fingerprint Sensor");
        device.set_summary("Match-On-Chip Fingerprint Sensor");
        device.set_vendor("Goodix");
        device.set_protocol("com.goodix.goodixfp");
        device.add_vendor_id(format!("USB:0x{:04X}", self.vendor_id));
        device.add_flag(DeviceFlags::UPDATABLE | DeviceFlags::CAN_VERIFY);
        device.set_remove_delay(REMOVE_DELAY);

        device.add_instance_id_quirks_only(format!("USB\\VID_{:04X}", self.vendor_id));
        device.add_instance_id(format!(
            "USB\\VID_{:04X}&PID_{:04X}",
            self.vendor_id, self.product_id
        ));

        ctx.resolve::<()>(device)
    }

    fn open(&mut self, _device: &mut Device) -> Result<()> {
        let transport = self.connector.connect().context("claim USB interface")?;
        self.engine = Some(PacketEngine::new(transport, self.config.clone()));
        Ok(())
    }

    fn close(&mut self, _device: &mut Device) -> Result<()> {
        self.engine = None;
        Ok(())
    }

    fn setup(&mut self, device: &mut Device) -> Result<()> {
        let version = self.read_version().context("read version")?;
        log::debug!("goodixfp: firmware version {}", version);
        device.set_version(version);
        Ok(())
    }

    fn write_firmware(&mut self, device: &mut Device, firmware: &Firmware) -> Result<()> {
        let data = firmware.default_image_bytes()?;
        let block_size = self.config.transfer_size;

        self.update_init().context("init update")?;

        let chunks = split(data, block_size);
        let total = chunks.total();
        for chunk in chunks {
            let response = self
                .engine()?
                .exchange(&Request::update_data(&chunk))
                .with_context(|| format!("write block {}/{}", chunk.index + 1, total))?;
            if chunk.is_last && response.result() != RESULT_SUCCESS {
                return Err(Error::Protocol(format!(
                    "update rejected with result 0x{:02X}",
                    response.result()
                )));
            }
            device.set_progress(chunk.index + 1, total);
        }
        Ok(())
    }

    fn attach(&mut self, device: &mut Device) -> Result<()> {
        let response = self
            .engine()?
            .exchange(&Request::reset())
            .context("reset")?;
        if response.result() != RESULT_SUCCESS {
            return Err(Error::Protocol(format!(
                "reset rejected with result 0x{:02X}",
                response.result()
            )));
        }
        device.add_flag(DeviceFlags::WAIT_FOR_REPLUG);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::MockSensor;
    use crate::protocol::{decode_frame, CMD1_UPGRADE_DATA, CMD_UPGRADE, PKG_EOP, PKG_NORMAL};
    use fwflash_core::{ErrorKind, InstallOutcome, LifecycleState, Session};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Hands out a shared mock sensor so tests can inspect it afterwards
    #[derive(Clone)]
    struct SharedSensor(Rc<RefCell<MockSensor>>);

    impl BulkTransport for SharedSensor {
        fn bulk_out(&mut self, ep: u8, data: &[u8], timeout: Duration) -> Result<usize> {
            self.0.borrow_mut().bulk_out(ep, data, timeout)
        }

        fn bulk_in(&mut self, ep: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
            self.0.borrow_mut().bulk_in(ep, buf, timeout)
        }
    }

    impl Connector for SharedSensor {
        type Handle = SharedSensor;

        fn connect(&mut self) -> Result<SharedSensor> {
            Ok(self.clone())
        }
    }

    fn session(sensor: &SharedSensor) -> Session<GoodixFpDevice<SharedSensor>> {
        let ops = GoodixFpDevice::new(sensor.clone(), GOODIX_USB_VENDOR, 0x6A94);
        let mut session = Session::new(ops, Device::new("usb:01:04"));
        session.probe(&Context::new()).unwrap();
        session
    }

    #[test]
    fn test_probe_identity() {
        let sensor = SharedSensor(Rc::new(RefCell::new(MockSensor::new())));
        let session = session(&sensor);
        let device = session.device();
        assert_eq!(device.vendor(), Some("Goodix"));
        assert_eq!(device.instance_ids()[1], "USB\\VID_27C6&PID_6A94");
        assert_eq!(device.guids().len(), 1);
        assert!(device.has_flag(DeviceFlags::UPDATABLE));
    }

    #[test]
    fn test_probe_other_vendor() {
        let sensor = SharedSensor(Rc::new(RefCell::new(MockSensor::new())));
        let ops = GoodixFpDevice::new(sensor, 0x1234, 0x5678);
        let mut session = Session::new(ops, Device::new("usb:01:05"));
        let err = session.probe(&Context::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert_eq!(session.state(), LifecycleState::Created);
    }

    #[test]
    fn test_install_writes_all_blocks() {
        let sensor = SharedSensor(Rc::new(RefCell::new(MockSensor::new())));
        let mut session = session(&sensor);
        let image: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();

        let outcome = session.install(&Firmware::new(image.clone())).unwrap();
        assert_eq!(outcome, InstallOutcome::WaitForReplug);
        assert_eq!(session.device().version(), Some("01.00.07"));
        assert!(session.device().has_flag(DeviceFlags::WAIT_FOR_REPLUG));
        assert!(session.is_awaiting_replug());

        let mock = sensor.0.borrow();
        assert_eq!(mock.firmware, image);
        assert_eq!(mock.reset_count, 1);

        let data_frames: Vec<_> = mock
            .sent
            .iter()
            .filter(|f| !f.is_empty())
            .filter_map(|f| decode_frame(f).ok().map(|(h, _)| h))
            .filter(|h| h.cmd0 == CMD_UPGRADE && h.cmd1 == CMD1_UPGRADE_DATA)
            .map(|h| h.eop)
            .collect();
        assert_eq!(data_frames, [PKG_NORMAL, PKG_NORMAL, PKG_EOP]);
    }

    #[test]
    fn test_write_reports_progress_per_block() {
        let sensor = SharedSensor(Rc::new(RefCell::new(MockSensor::new())));
        let mut ops = GoodixFpDevice::new(sensor.clone(), GOODIX_USB_VENDOR, 0x6A94);
        let mut device = Device::new("usb:01:04");
        ops.open(&mut device).unwrap();
        ops.write_firmware(&mut device, &Firmware::new(vec![0x5A; 1500]))
            .unwrap();
        assert_eq!(device.progress(), 1.0);
    }

    #[test]
    fn test_update_init_rejected() {
        let sensor = SharedSensor(Rc::new(RefCell::new(MockSensor::new())));
        sensor.0.borrow_mut().fail_init = true;
        let mut session = session(&sensor);
        let err = session.install(&Firmware::new(vec![0; 10])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(sensor.0.borrow().firmware.is_empty());
        assert_eq!(session.state(), LifecycleState::Error);
    }

    #[test]
    fn test_setup_failure_keeps_device_usable() {
        let sensor = SharedSensor(Rc::new(RefCell::new(MockSensor::new())));
        sensor.0.borrow_mut().mute = true;
        let mut session = session(&sensor);
        let mut locker = session.open().unwrap();
        locker.setup().unwrap();
        assert_eq!(locker.state(), LifecycleState::Ready);
        assert_eq!(locker.device().version(), None);
    }
}
