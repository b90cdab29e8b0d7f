//! fwflash-linux-swap - Swap encryption host security attribute
//!
//! Reports whether the pages the kernel swaps out can be read from disk by
//! someone with physical access. Swap areas on device-mapper targets or
//! zram count as protected; anything else is not.
//!
//! The result can change at runtime (`swapon`/`swapoff`), so a
//! [`FileMonitor`] watches `/proc/swaps` and asks for re-evaluation.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::mpsc;
//! use fwflash_linux_swap::{evaluate, FileMonitor, DEFAULT_POLL_INTERVAL, PROC_SWAPS};
//!
//! println!("{}", evaluate(Path::new(PROC_SWAPS)).result);
//!
//! let (tx, rx) = mpsc::channel();
//! let _monitor = FileMonitor::spawn(PROC_SWAPS, DEFAULT_POLL_INTERVAL, tx)?;
//! for change in rx {
//!     println!("{}", evaluate(&change.path).result);
//! }
//! # Ok::<(), fwflash_linux_swap::SwapError>(())
//! ```

mod attr;
mod error;
mod monitor;
mod swaps;

pub use attr::{
    classify, evaluate, SecurityAttr, SecurityAttrFlags, SecurityAttrResult, ATTR_ID_KERNEL_SWAP,
    PLUGIN_NAME, PROC_SWAPS,
};
pub use error::{Result, SwapError};
pub use monitor::{FileMonitor, SecurityChanged, DEFAULT_POLL_INTERVAL};
pub use swaps::{LinuxSwap, SwapEntry, SwapKind};
