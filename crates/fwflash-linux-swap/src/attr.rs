//! The `Kernel.Swap` host security attribute

use std::fmt;
use std::path::Path;

use bitflags::bitflags;

use crate::swaps::LinuxSwap;

/// Attribute ID reported for swap encryption
pub const ATTR_ID_KERNEL_SWAP: &str = "org.fwupd.hsi.Kernel.Swap";
/// Name of the plugin that owns the attribute
pub const PLUGIN_NAME: &str = "linux_swap";
/// Kernel list of active swap areas
pub const PROC_SWAPS: &str = "/proc/swaps";

bitflags! {
    /// Security attribute flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SecurityAttrFlags: u32 {
        /// The platform meets the requirement
        const SUCCESS = 1 << 0;
        /// The state can change without a reboot
        const RUNTIME_ISSUE = 1 << 1;
    }
}

/// Outcome of evaluating an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityAttrResult {
    #[default]
    Unknown,
    NotValid,
    NotEnabled,
    NotEncrypted,
    Encrypted,
}

impl fmt::Display for SecurityAttrResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecurityAttrResult::Unknown => "unknown",
            SecurityAttrResult::NotValid => "not-valid",
            SecurityAttrResult::NotEnabled => "not-enabled",
            SecurityAttrResult::NotEncrypted => "not-encrypted",
            SecurityAttrResult::Encrypted => "encrypted",
        };
        f.write_str(s)
    }
}

/// One evaluated host security attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityAttr {
    pub id: &'static str,
    pub plugin: &'static str,
    pub flags: SecurityAttrFlags,
    pub result: SecurityAttrResult,
}

impl SecurityAttr {
    fn new(id: &'static str) -> Self {
        Self {
            id,
            plugin: PLUGIN_NAME,
            flags: SecurityAttrFlags::RUNTIME_ISSUE,
            result: SecurityAttrResult::Unknown,
        }
    }

    pub fn is_success(&self) -> bool {
        self.flags.contains(SecurityAttrFlags::SUCCESS)
    }
}

/// Classify already parsed swap areas
pub fn classify(swap: &LinuxSwap) -> SecurityAttr {
    let mut attr = SecurityAttr::new(ATTR_ID_KERNEL_SWAP);
    if !swap.enabled() {
        attr.flags |= SecurityAttrFlags::SUCCESS;
        attr.result = SecurityAttrResult::NotEnabled;
    } else if !swap.encrypted() {
        attr.result = SecurityAttrResult::NotEncrypted;
    } else {
        attr.flags |= SecurityAttrFlags::SUCCESS;
        attr.result = SecurityAttrResult::Encrypted;
    }
    attr
}

/// Read the swaps file at `path` and classify it
///
/// Never fails: an unreadable or unparsable file is reported as
/// [`SecurityAttrResult::NotValid`].
pub fn evaluate(path: &Path) -> SecurityAttr {
    match LinuxSwap::from_path(path) {
        Ok(swap) => {
            let attr = classify(&swap);
            log::debug!("linux_swap: {} -> {}", path.display(), attr.result);
            attr
        }
        Err(e) => {
            log::warn!("linux_swap: {}", e);
            let mut attr = SecurityAttr::new(ATTR_ID_KERNEL_SWAP);
            attr.result = SecurityAttrResult::NotValid;
            attr
        }
    }
}
