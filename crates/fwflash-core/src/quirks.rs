//! Quirk lookup and typed resolution
//!
//! The daemon context supplies string key/value pairs keyed by instance ID
//! plus a few hardware-identity values (HWIDs). Device variants never read
//! those strings directly: they declare a [`FromQuirks`] type and
//! [`Context::resolve`] turns the matching entries into it once, at probe
//! time. Keys that nothing claims, and values that do not parse, are
//! rejected there rather than surfacing later in the middle of an update.

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::device::{Device, DeviceFlags};
use crate::error::{Error, Result};

/// Keys applied directly to the [`Device`] by [`Context::resolve`]
pub const BASE_KEYS: &[&str] = &["Name", "Vendor", "Summary", "Protocol", "Flags", "Guid"];

/// Well-known HWID key for the hardware family
pub const HWID_FAMILY: &str = "Family";

/// Quirk values and hardware IDs supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct Context {
    quirks: HashMap<String, BTreeMap<String, String>>,
    hwids: HashMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key = value` for devices matching `instance_id`
    pub fn add_quirk(
        &mut self,
        instance_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.quirks
            .entry(instance_id.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn with_quirk(
        mut self,
        instance_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.add_quirk(instance_id, key, value);
        self
    }

    pub fn set_hwid(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.hwids.insert(key.into(), value.into());
    }

    pub fn with_hwid(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_hwid(key, value);
        self
    }

    pub fn hwid(&self, key: &str) -> Option<&str> {
        self.hwids.get(key).map(String::as_str)
    }

    /// Merge the quirks of every instance ID of `device`
    ///
    /// Instance IDs are visited in the order they were added; a later
    /// (more specific) instance ID overrides an earlier one.
    pub fn quirks_for(&self, device: &Device) -> QuirkSet {
        let mut entries = BTreeMap::new();
        for id in device.instance_ids() {
            if let Some(values) = self.quirks.get(id) {
                for (key, value) in values {
                    entries.insert(key.clone(), value.clone());
                }
            }
        }
        QuirkSet { entries }
    }

    /// Apply base quirks to `device` and build the variant's typed config
    pub fn resolve<T: FromQuirks>(&self, device: &mut Device) -> Result<T> {
        let set = self.quirks_for(device);

        let known = |key: &str| BASE_KEYS.iter().chain(T::KEYS).any(|k| *k == key);
        if let Some(key) = set.keys().find(|k| !known(*k)) {
            return Err(Error::NotSupported(format!("unknown quirk key {}", key)));
        }

        if let Some(name) = set.get("Name") {
            device.set_name(name);
        }
        if let Some(vendor) = set.get("Vendor") {
            device.set_vendor(vendor);
        }
        if let Some(summary) = set.get("Summary") {
            device.set_summary(summary);
        }
        if let Some(protocol) = set.get("Protocol") {
            device.set_protocol(protocol);
        }
        if let Some(flags) = set.get("Flags") {
            for name in flags.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let flag = DeviceFlags::from_quirk_name(name)
                    .ok_or_else(|| Error::NotSupported(format!("unknown device flag {}", name)))?;
                device.add_flag(flag);
            }
        }
        if let Some(guids) = set.get("Guid") {
            for guid in guids.split(',').map(str::trim) {
                let guid = Uuid::parse_str(guid)
                    .map_err(|e| Error::NotSupported(format!("invalid GUID {}: {}", guid, e)))?;
                device.add_guid(guid);
            }
        }

        T::from_quirks(&set)
    }
}

/// Quirk entries matching one device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuirkSet {
    entries: BTreeMap<String, String>,
}

impl QuirkSet {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Value of `key`, or NotSupported if it is absent
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::NotSupported(format!("no {} quirk", key)))
    }

    /// Parse `key` as a hex (`0x` prefix) or decimal integer
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        self.get(key)
            .map(|value| {
                parse_integer(value).ok_or_else(|| {
                    Error::NotSupported(format!("quirk {} has invalid value {}", key, value))
                })
            })
            .transpose()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_integer(value: &str) -> Option<u64> {
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

/// Typed configuration built from a device's quirks
pub trait FromQuirks: Sized {
    /// Variant-specific keys this type understands
    const KEYS: &'static [&'static str];

    fn from_quirks(quirks: &QuirkSet) -> Result<Self>;
}

impl FromQuirks for () {
    const KEYS: &'static [&'static str] = &[];

    fn from_quirks(_quirks: &QuirkSet) -> Result<Self> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug, PartialEq)]
    struct BlockSize(u64);

    impl FromQuirks for BlockSize {
        const KEYS: &'static [&'static str] = &["BlockSize"];

        fn from_quirks(quirks: &QuirkSet) -> Result<Self> {
            Ok(BlockSize(quirks.get_u64("BlockSize")?.unwrap_or(1000)))
        }
    }

    fn device() -> Device {
        let mut device = Device::new("test");
        device.add_instance_id("TEST\\NAME_A");
        device.add_instance_id_quirks_only("TEST\\NAME_A&FAMILY_B");
        device
    }

    #[test]
    fn test_resolve_typed_and_base() {
        let ctx = Context::new()
            .with_quirk("TEST\\NAME_A", "Name", "Widget")
            .with_quirk("TEST\\NAME_A", "BlockSize", "0x400")
            .with_quirk("TEST\\NAME_A&FAMILY_B", "Flags", "updatable, can-verify");
        let mut device = device();
        let config: BlockSize = ctx.resolve(&mut device).unwrap();
        assert_eq!(config, BlockSize(0x400));
        assert_eq!(device.name(), Some("Widget"));
        assert!(device.has_flag(DeviceFlags::UPDATABLE | DeviceFlags::CAN_VERIFY));
    }

    #[test]
    fn test_specific_instance_overrides() {
        let ctx = Context::new()
            .with_quirk("TEST\\NAME_A", "BlockSize", "16")
            .with_quirk("TEST\\NAME_A&FAMILY_B", "BlockSize", "32");
        let config: BlockSize = ctx.resolve(&mut device()).unwrap();
        assert_eq!(config, BlockSize(32));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let ctx = Context::new().with_quirk("TEST\\NAME_A", "BlokSize", "16");
        let err = ctx.resolve::<BlockSize>(&mut device()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn test_malformed_values_rejected() {
        let ctx = Context::new().with_quirk("TEST\\NAME_A", "BlockSize", "lots");
        assert!(ctx.resolve::<BlockSize>(&mut device()).is_err());

        let ctx = Context::new().with_quirk("TEST\\NAME_A", "Flags", "sparkly");
        assert!(ctx.resolve::<()>(&mut device()).is_err());

        let ctx = Context::new().with_quirk("TEST\\NAME_A", "Guid", "not-a-guid");
        assert!(ctx.resolve::<()>(&mut device()).is_err());
    }

    #[test]
    fn test_require_missing() {
        let set = QuirkSet::default();
        assert!(set.require("AuxDeviceName").unwrap_err().is_not_supported());
    }
}
