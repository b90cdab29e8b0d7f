//! Device data model
//!
//! A [`Device`] carries everything known about one enumerated piece of
//! hardware: identity, relationships, capability flags and the status and
//! progress of whatever operation is currently running on it. Hardware
//! handles are not stored here; they belong to the device variant (see
//! [`crate::lifecycle::DeviceOps`]).

use std::fmt;
use std::time::Duration;

use bitflags::bitflags;
use uuid::Uuid;

bitflags! {
    /// Device capability and state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFlags: u32 {
        /// Built into the system, cannot be removed
        const INTERNAL = 1 << 0;
        /// Firmware can be written
        const UPDATABLE = 1 << 1;
        /// Has two firmware partitions and boots the newest
        const DUAL_IMAGE = 1 << 2;
        /// Firmware can be read back and compared
        const CAN_VERIFY = 1 << 3;
        /// The device will re-enumerate; wait for it before continuing
        const WAIT_FOR_REPLUG = 1 << 4;
        /// Currently running its bootloader
        const IS_BOOTLOADER = 1 << 5;
    }
}

impl DeviceFlags {
    /// Parse a single flag by its lowercase quirk name, e.g. `dual-image`
    pub fn from_quirk_name(name: &str) -> Option<Self> {
        let flag = match name {
            "internal" => Self::INTERNAL,
            "updatable" => Self::UPDATABLE,
            "dual-image" => Self::DUAL_IMAGE,
            "can-verify" => Self::CAN_VERIFY,
            "wait-for-replug" => Self::WAIT_FOR_REPLUG,
            "is-bootloader" => Self::IS_BOOTLOADER,
            _ => return None,
        };
        Some(flag)
    }
}

/// What the device is busy with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceStatus {
    #[default]
    Idle,
    DeviceRestart,
    DeviceWrite,
    DeviceVerify,
    DeviceErase,
    DeviceRead,
    DeviceBusy,
    WaitingForUser,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Idle => "idle",
            DeviceStatus::DeviceRestart => "restarting",
            DeviceStatus::DeviceWrite => "writing",
            DeviceStatus::DeviceVerify => "verifying",
            DeviceStatus::DeviceErase => "erasing",
            DeviceStatus::DeviceRead => "reading",
            DeviceStatus::DeviceBusy => "busy",
            DeviceStatus::WaitingForUser => "waiting for user",
        };
        f.write_str(s)
    }
}

/// Receives status and progress changes as they happen
pub trait ProgressObserver {
    fn status_changed(&mut self, status: DeviceStatus);
    /// `fraction` is in `[0, 1]`
    fn progress_changed(&mut self, fraction: f64);
}

/// Sink for "done out of total" progress reports from protocol engines
pub trait Progress {
    fn set_progress(&mut self, done: usize, total: usize);
}

/// Progress sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn set_progress(&mut self, _done: usize, _total: usize) {}
}

/// Derive the GUID of an instance ID (RFC 4122 v5, DNS namespace)
pub fn guid_from_instance_id(instance_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, instance_id.as_bytes())
}

/// One enumerated device
pub struct Device {
    physical_id: String,
    parent_id: Option<String>,
    name: Option<String>,
    vendor: Option<String>,
    vendor_ids: Vec<String>,
    summary: Option<String>,
    protocol: Option<String>,
    instance_ids: Vec<String>,
    guids: Vec<Uuid>,
    version: Option<String>,
    flags: DeviceFlags,
    status: DeviceStatus,
    progress: f64,
    firmware_size: Option<usize>,
    remove_delay: Duration,
    children: Vec<Device>,
    observer: Option<Box<dyn ProgressObserver>>,
}

impl Device {
    /// Create a device identified by its physical location (sysfs path, bus/address)
    pub fn new(physical_id: impl Into<String>) -> Self {
        Self {
            physical_id: physical_id.into(),
            parent_id: None,
            name: None,
            vendor: None,
            vendor_ids: Vec::new(),
            summary: None,
            protocol: None,
            instance_ids: Vec::new(),
            guids: Vec::new(),
            version: None,
            flags: DeviceFlags::empty(),
            status: DeviceStatus::Idle,
            progress: 0.0,
            firmware_size: None,
            remove_delay: Duration::ZERO,
            children: Vec::new(),
            observer: None,
        }
    }

    pub fn physical_id(&self) -> &str {
        &self.physical_id
    }

    /// Physical ID of the parent, if this device is a child
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn vendor(&self) -> Option<&str> {
        self.vendor.as_deref()
    }

    pub fn set_vendor(&mut self, vendor: impl Into<String>) {
        self.vendor = Some(vendor.into());
    }

    pub fn vendor_ids(&self) -> &[String] {
        &self.vendor_ids
    }

    /// Add a vendor ID such as `USB:0x27C6`
    pub fn add_vendor_id(&mut self, vendor_id: impl Into<String>) {
        let vendor_id = vendor_id.into();
        if !self.vendor_ids.contains(&vendor_id) {
            self.vendor_ids.push(vendor_id);
        }
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn set_protocol(&mut self, protocol: impl Into<String>) {
        self.protocol = Some(protocol.into());
    }

    /// All instance IDs, including quirk-only ones, in insertion order
    pub fn instance_ids(&self) -> &[String] {
        &self.instance_ids
    }

    /// Add an instance ID and the GUID derived from it
    pub fn add_instance_id(&mut self, instance_id: impl Into<String>) {
        let instance_id = instance_id.into();
        self.add_guid(guid_from_instance_id(&instance_id));
        self.add_instance_id_quirks_only(instance_id);
    }

    /// Add an instance ID used for quirk matching only; no GUID is derived
    pub fn add_instance_id_quirks_only(&mut self, instance_id: impl Into<String>) {
        let instance_id = instance_id.into();
        if !self.instance_ids.contains(&instance_id) {
            log::trace!("device {}: instance ID {}", self.physical_id, instance_id);
            self.instance_ids.push(instance_id);
        }
    }

    pub fn guids(&self) -> &[Uuid] {
        &self.guids
    }

    pub fn add_guid(&mut self, guid: Uuid) {
        if !self.guids.contains(&guid) {
            self.guids.push(guid);
        }
    }

    pub fn has_guid(&self, guid: &Uuid) -> bool {
        self.guids.contains(guid)
    }

    /// True if both devices share at least one GUID
    pub fn same_logical_device(&self, other: &Device) -> bool {
        self.guids.iter().any(|g| other.has_guid(g))
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }

    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: DeviceFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn add_flag(&mut self, flag: DeviceFlags) {
        self.flags.insert(flag);
    }

    pub fn remove_flag(&mut self, flag: DeviceFlags) {
        self.flags.remove(flag);
    }

    pub fn firmware_size(&self) -> Option<usize> {
        self.firmware_size
    }

    pub fn set_firmware_size(&mut self, size: usize) {
        self.firmware_size = Some(size);
    }

    /// How long the orchestrator should wait for a replug
    pub fn remove_delay(&self) -> Duration {
        self.remove_delay
    }

    pub fn set_remove_delay(&mut self, delay: Duration) {
        self.remove_delay = delay;
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// Change status; progress restarts from zero when the status changes
    pub fn set_status(&mut self, status: DeviceStatus) {
        if self.status == status {
            return;
        }
        log::debug!("device {}: {} -> {}", self.physical_id, self.status, status);
        self.status = status;
        self.progress = 0.0;
        if let Some(observer) = self.observer.as_mut() {
            observer.status_changed(status);
        }
    }

    /// Progress of the current status, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn set_observer(&mut self, observer: Box<dyn ProgressObserver>) {
        self.observer = Some(observer);
    }

    pub fn take_observer(&mut self) -> Option<Box<dyn ProgressObserver>> {
        self.observer.take()
    }

    pub fn children(&self) -> &[Device] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Device] {
        &mut self.children
    }

    /// Take ownership of `child`, pointing its back-reference at this device
    pub fn add_child(&mut self, mut child: Device) {
        child.parent_id = Some(self.physical_id.clone());
        self.children.push(child);
    }
}

impl Progress for Device {
    /// Within one status, progress never goes backwards; stale reports are dropped
    fn set_progress(&mut self, done: usize, total: usize) {
        let fraction = if total == 0 {
            1.0
        } else {
            (done.min(total) as f64) / (total as f64)
        };
        if fraction < self.progress {
            log::debug!(
                "device {}: ignoring progress regression {:.3} -> {:.3}",
                self.physical_id,
                self.progress,
                fraction
            );
            return;
        }
        self.progress = fraction;
        if let Some(observer) = self.observer.as_mut() {
            observer.progress_changed(fraction);
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("physical_id", &self.physical_id)
            .field("parent_id", &self.parent_id)
            .field("name", &self.name)
            .field("vendor", &self.vendor)
            .field("instance_ids", &self.instance_ids)
            .field("guids", &self.guids)
            .field("version", &self.version)
            .field("flags", &self.flags)
            .field("status", &self.status)
            .field("progress", &self.progress)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name.as_deref().unwrap_or("Unknown device"))?;
        writeln!(f, "  Physical ID:  {}", self.physical_id)?;
        if let Some(vendor) = &self.vendor {
            writeln!(f, "  Vendor:       {}", vendor)?;
        }
        if let Some(summary) = &self.summary {
            writeln!(f, "  Summary:      {}", summary)?;
        }
        writeln!(
            f,
            "  Version:      {}",
            self.version.as_deref().unwrap_or("unknown")
        )?;
        for id in &self.instance_ids {
            writeln!(f, "  Instance ID:  {}", id)?;
        }
        for guid in &self.guids {
            writeln!(f, "  GUID:         {}", guid)?;
        }
        write!(f, "  Flags:        {:?}", self.flags)
    }
}
