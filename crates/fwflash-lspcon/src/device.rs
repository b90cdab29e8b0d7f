//! Parade PS175 LSPCON device variant

use fwflash_core::clock::{Clock, SystemClock};
use fwflash_core::quirks::HWID_FAMILY;
use fwflash_core::transport::{Connector, I2cBus};
use fwflash_core::{
    Context, Device, DeviceFlags, DeviceOps, DeviceStatus, Error, FromQuirks, Firmware,
    QuirkSet, Result, ResultExt,
};

use crate::dpcd::{read_branch_version, AuxProvider};
use crate::flash::{check_active_partition, FlashTiming, PagedFlash};
use crate::regs::{self, FLASH_BLOCK_SIZE};
use crate::update;

/// Only model handled
pub const DEVICE_NAME: &str = "PS175";

/// Quirk naming the DP AUX channel wired to the LSPCON
pub const QUIRK_AUX_DEVICE_NAME: &str = "ParadeLspconAuxDeviceName";

/// Typed quirks of an LSPCON
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LspconQuirks {
    pub aux_device_name: Option<String>,
}

impl FromQuirks for LspconQuirks {
    const KEYS: &'static [&'static str] = &[QUIRK_AUX_DEVICE_NAME];

    fn from_quirks(quirks: &QuirkSet) -> Result<Self> {
        Ok(Self {
            aux_device_name: quirks.get(QUIRK_AUX_DEVICE_NAME).map(str::to_owned),
        })
    }
}

/// Parade LSPCON on an I2C bus
///
/// `C` opens the I2C adapter, `A` finds the AUX channel the version is
/// read from, `K` times the flash polls.
pub struct LspconDevice<C, A, K = SystemClock>
where
    C: Connector,
    C::Handle: I2cBus,
{
    connector: C,
    aux: A,
    clock: K,
    timing: FlashTiming,
    sysfs_name: String,
    aux_device_name: Option<String>,
    active_partition: Option<u8>,
    flash: Option<PagedFlash<C::Handle, K>>,
}

impl<C, A, K> LspconDevice<C, A, K>
where
    C: Connector,
    C::Handle: I2cBus,
    A: AuxProvider,
    K: Clock + Clone,
{
    /// `sysfs_name` is the I2C client's `name` attribute
    pub fn new(connector: C, aux: A, sysfs_name: impl Into<String>, clock: K) -> Self {
        Self {
            connector,
            aux,
            clock,
            timing: FlashTiming::default(),
            sysfs_name: sysfs_name.into(),
            aux_device_name: None,
            active_partition: None,
            flash: None,
        }
    }

    pub fn with_timing(mut self, timing: FlashTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Partition reported by the last successful setup
    pub fn active_partition(&self) -> Option<u8> {
        self.active_partition
    }

    fn flash(&mut self) -> Result<&mut PagedFlash<C::Handle, K>> {
        self.flash
            .as_mut()
            .ok_or_else(|| Error::Internal("lspcon: device is not open".into()))
    }
}

impl<C, A, K> DeviceOps for LspconDevice<C, A, K>
where
    C: Connector,
    C::Handle: I2cBus,
    A: AuxProvider,
    K: Clock + Clone,
{
    fn probe(&mut self, device: &mut Device, ctx: &Context) -> Result<()> {
        device.set_vendor("Parade Technologies");
        device.add_vendor_id("PCI:0x1AF8");
        device.set_protocol("com.paradetech.ps176");
        device.add_flag(
            DeviceFlags::INTERNAL
                | DeviceFlags::UPDATABLE
                | DeviceFlags::DUAL_IMAGE
                | DeviceFlags::CAN_VERIFY,
        );
        device.set_firmware_size(FLASH_BLOCK_SIZE as usize);

        // the family-specific ID goes last so its quirks override the generic ones
        let instance_id = format!("PARADE-LSPCON\\NAME_{}", self.sysfs_name);
        device.add_instance_id(instance_id.clone());
        if let Some(family) = ctx.hwid(HWID_FAMILY) {
            device.add_instance_id_quirks_only(format!("{}&FAMILY_{}", instance_id, family));
        }

        let quirks: LspconQuirks = ctx.resolve(device)?;
        if device.name() != Some(DEVICE_NAME) {
            return Err(Error::NotSupported(format!(
                "device name {} is not supported",
                device.name().unwrap_or("(none)")
            )));
        }
        let aux_device_name = quirks.aux_device_name.ok_or_else(|| {
            Error::NotSupported(format!("{} must be specified", QUIRK_AUX_DEVICE_NAME))
        })?;
        self.aux_device_name = Some(aux_device_name);
        Ok(())
    }

    fn open(&mut self, _device: &mut Device) -> Result<()> {
        let mut bus = self.connector.connect().context("open I2C adapter")?;
        // Everything outside an address guard assumes page 2
        bus.set_address(regs::PAGE2).context("select page 2")?;
        self.flash = Some(PagedFlash::new(bus, self.clock.clone(), self.timing));
        Ok(())
    }

    fn close(&mut self, _device: &mut Device) -> Result<()> {
        self.flash = None;
        Ok(())
    }

    fn setup(&mut self, device: &mut Device) -> Result<()> {
        let active = self
            .flash()?
            .active_partition()
            .context("read active partition")?;
        log::debug!("lspcon: device reports running from partition {}", active);
        self.active_partition = Some(check_active_partition(active)?);

        let name = self
            .aux_device_name
            .as_deref()
            .ok_or_else(|| Error::NotSupported("no DP AUX device specified".into()))?;
        let mut aux = self.aux.open(name)?;
        let version = read_branch_version(&mut aux).context("read DPCD version")?;
        log::info!("lspcon: firmware version {}", version);
        device.set_version(version);
        Ok(())
    }

    fn detach(&mut self, _device: &mut Device) -> Result<()> {
        self.flash()?.set_mpu_running(false).context("stop MPU")
    }

    fn write_firmware(&mut self, device: &mut Device, firmware: &Firmware) -> Result<()> {
        let image = firmware.default_image_bytes()?;
        let partition = update::write_image(self.flash()?, device, image)?;
        log::info!("lspcon: partition {} written and selected for boot", partition);
        Ok(())
    }

    fn attach(&mut self, _device: &mut Device) -> Result<()> {
        self.flash()?.set_mpu_running(true).context("start MPU")
    }

    fn dump_firmware(&mut self, device: &mut Device) -> Result<Vec<u8>> {
        let partition = match self.active_partition {
            Some(partition) => partition,
            None => self.flash()?.active_partition()?,
        };
        device.set_status(DeviceStatus::DeviceRead);
        update::read_partition(self.flash()?, partition, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dpcd::AuxChannel;
    use crate::flash::tests::{test_timing, MockLspcon};
    use fwflash_core::clock::VirtualClock;
    use fwflash_core::{ErrorKind, InstallOutcome, LifecycleState, Session};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct SharedLspcon(Rc<RefCell<MockLspcon>>);

    impl I2cBus for SharedLspcon {
        fn set_address(&mut self, address: u8) -> Result<()> {
            self.0.borrow_mut().set_address(address)
        }

        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.0.borrow_mut().write(data)
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<()> {
            self.0.borrow_mut().read(buf)
        }
    }

    impl Connector for SharedLspcon {
        type Handle = SharedLspcon;

        fn connect(&mut self) -> Result<SharedLspcon> {
            Ok(self.clone())
        }
    }

    /// In-memory DPCD behind a single named AUX channel
    struct MockAux {
        name: &'static str,
        dpcd: Vec<u8>,
    }

    struct MockAuxChannel(Vec<u8>);

    impl AuxChannel for MockAuxChannel {
        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
            let start = offset as usize;
            let data = self
                .0
                .get(start..start + buf.len())
                .ok_or_else(|| Error::transport("DPCD read out of range"))?;
            buf.copy_from_slice(data);
            Ok(())
        }
    }

    impl AuxProvider for MockAux {
        type Channel = MockAuxChannel;

        fn open(&mut self, name: &str) -> Result<MockAuxChannel> {
            if name != self.name {
                return Err(Error::NotSupported(format!("no AUX device {}", name)));
            }
            Ok(MockAuxChannel(self.dpcd.clone()))
        }
    }

    const AUX_NAME: &str = "AUX B/DDI B/PHY B";

    fn mock_aux(oui: [u8; 3]) -> MockAux {
        let mut dpcd = vec![0u8; 0x600];
        dpcd[0x500..0x503].copy_from_slice(&oui);
        dpcd[0x50a] = 5;
        dpcd[0x50b] = 12;
        MockAux {
            name: AUX_NAME,
            dpcd,
        }
    }

    fn context() -> Context {
        Context::new()
            .with_hwid(HWID_FAMILY, "Google_Hatch")
            .with_quirk("PARADE-LSPCON\\NAME_1AF80175:00", "Name", "PS175")
            .with_quirk(
                "PARADE-LSPCON\\NAME_1AF80175:00&FAMILY_Google_Hatch",
                QUIRK_AUX_DEVICE_NAME,
                AUX_NAME,
            )
    }

    type TestDevice = LspconDevice<SharedLspcon, MockAux, VirtualClock>;

    fn ops(bus: &SharedLspcon, aux: MockAux) -> TestDevice {
        LspconDevice::new(bus.clone(), aux, "1AF80175:00", VirtualClock::new())
            .with_timing(test_timing())
    }

    fn probed(bus: &SharedLspcon) -> Session<TestDevice> {
        let mut session = Session::new(
            ops(bus, mock_aux([0x00, 0x1c, 0xf8])),
            Device::new("i2c-7-004a"),
        );
        session.probe(&context()).unwrap();
        session
    }

    fn bus() -> SharedLspcon {
        SharedLspcon(Rc::new(RefCell::new(MockLspcon::new())))
    }

    #[test]
    fn test_probe_identity() {
        let bus = bus();
        let session = probed(&bus);
        let device = session.device();
        assert_eq!(device.name(), Some("PS175"));
        assert_eq!(device.vendor(), Some("Parade Technologies"));
        assert_eq!(device.firmware_size(), Some(0x10000));
        assert!(device.has_flag(DeviceFlags::DUAL_IMAGE | DeviceFlags::INTERNAL));
        assert_eq!(device.guids().len(), 1);
        assert!(device
            .instance_ids()
            .iter()
            .any(|id| id == "PARADE-LSPCON\\NAME_1AF80175:00"));
        assert_eq!(bus.0.borrow().transfers, 0);
    }

    #[test]
    fn test_probe_rejects_other_names() {
        let bus = bus();
        let ctx = Context::new().with_quirk("PARADE-LSPCON\\NAME_1AF80175:00", "Name", "PS176");
        let mut session = Session::new(ops(&bus, mock_aux([0; 3])), Device::new("i2c-7-004a"));
        let err = session.probe(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert!(err.to_string().contains("PS176"));
        assert_eq!(session.state(), LifecycleState::Created);
    }

    #[test]
    fn test_probe_requires_aux_quirk() {
        let bus = bus();
        let ctx = Context::new().with_quirk("PARADE-LSPCON\\NAME_1AF80175:00", "Name", "PS175");
        let mut session = Session::new(ops(&bus, mock_aux([0; 3])), Device::new("i2c-7-004a"));
        let err = session.probe(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert!(err.to_string().contains(QUIRK_AUX_DEVICE_NAME));
    }

    #[test]
    fn test_setup_reads_partition_and_version() {
        let bus = bus();
        bus.0.borrow_mut().active_partition = 2;
        let mut session = probed(&bus);
        let mut locker = session.open().unwrap();
        locker.setup().unwrap();
        assert_eq!(locker.device().version(), Some("5.12"));
        assert_eq!(locker.ops().active_partition(), Some(2));
    }

    #[test]
    fn test_family_quirk_overrides_generic_aux_name() {
        let bus = bus();
        let ctx = Context::new()
            .with_hwid(HWID_FAMILY, "Google_Hatch")
            .with_quirk("PARADE-LSPCON\\NAME_1AF80175:00", "Name", "PS175")
            .with_quirk(
                "PARADE-LSPCON\\NAME_1AF80175:00",
                QUIRK_AUX_DEVICE_NAME,
                "GENERIC",
            )
            .with_quirk(
                "PARADE-LSPCON\\NAME_1AF80175:00&FAMILY_Google_Hatch",
                QUIRK_AUX_DEVICE_NAME,
                AUX_NAME,
            );
        let mut session = Session::new(
            ops(&bus, mock_aux([0x00, 0x1c, 0xf8])),
            Device::new("i2c-7-004a"),
        );
        session.probe(&ctx).unwrap();
        let mut locker = session.open().unwrap();
        locker.setup().unwrap();
        assert_eq!(locker.device().version(), Some("5.12"));
    }

    #[test]
    fn test_setup_rejects_unknown_partition() {
        let bus = bus();
        bus.0.borrow_mut().active_partition = 0;
        let mut session = probed(&bus);
        let mut locker = session.open().unwrap();
        let err = locker.setup().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn test_setup_with_foreign_oui_leaves_version_unset() {
        let bus = bus();
        let mut session = Session::new(
            ops(&bus, mock_aux([0x00, 0x90, 0x4c])),
            Device::new("i2c-7-004a"),
        );
        session.probe(&context()).unwrap();
        let mut locker = session.open().unwrap();
        locker.setup().unwrap();
        assert_eq!(locker.state(), LifecycleState::Ready);
        assert_eq!(locker.device().version(), None);
    }

    #[test]
    fn test_install_end_to_end() {
        let bus = bus();
        let image: Vec<u8> = (0..0x10000u32).map(|i| (i * 13 % 256) as u8).collect();
        let mut session = probed(&bus);

        let outcome = session.install(&Firmware::new(image.clone())).unwrap();
        assert_eq!(outcome, InstallOutcome::Complete);
        assert_eq!(session.state(), LifecycleState::Closed);

        let mock = bus.0.borrow();
        assert_eq!(mock.flash[0x20_000..0x30_000], image[..]);
        assert_eq!(mock.flash[..4], [0x55, 0xaa, 0x02, 0xff]);
        assert_eq!(mock.mpu, vec![0xc0, 0x40, 0xc0, 0x00]);
        assert_eq!(mock.wp_writes.last(), Some(&0));
        assert_eq!(mock.status_register, regs::SR_PROTECTED);
        assert_eq!(mock.address, regs::PAGE2);
    }

    #[test]
    fn test_install_wrong_size() {
        let bus = bus();
        let mut session = probed(&bus);
        let err = session.install(&Firmware::new(vec![0; 0x100])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert!(bus.0.borrow().wp_writes.is_empty());
        assert_eq!(session.state(), LifecycleState::Error);
    }

    #[test]
    fn test_dump_active_partition() {
        let bus = bus();
        bus.0.borrow_mut().flash[0x10_000..0x10_004].copy_from_slice(b"PS17");
        let mut session = probed(&bus);
        let mut locker = session.open().unwrap();
        locker.setup().unwrap();
        let data = locker.dump_firmware().unwrap();
        assert_eq!(data.len(), 0x10000);
        assert_eq!(&data[..4], b"PS17");
    }
}
