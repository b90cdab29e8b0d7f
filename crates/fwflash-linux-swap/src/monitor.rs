//! Polling file monitor
//!
//! procfs files do not deliver inotify events, so the monitor re-reads the
//! file at a fixed interval and compares a CRC32 of the contents.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use fwflash_core::checksum::crc32;

use crate::error::{Result, SwapError};

/// Default interval between reads
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Sent when the monitored file changed and its attribute must be re-evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityChanged {
    pub path: PathBuf,
}

/// Contents summary; `None` while the file is unreadable
type Fingerprint = Option<(usize, u32)>;

fn fingerprint(path: &Path) -> Fingerprint {
    std::fs::read(path)
        .ok()
        .map(|data| (data.len(), crc32(&data)))
}

/// Watches one file on a background thread until dropped
#[derive(Debug)]
pub struct FileMonitor {
    path: PathBuf,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl FileMonitor {
    /// Start watching `path`, sending a [`SecurityChanged`] to `events` on every change
    ///
    /// The initial contents are the baseline and are not reported. The
    /// monitor exits on its own once the receiving side is dropped.
    pub fn spawn(
        path: impl Into<PathBuf>,
        interval: Duration,
        events: Sender<SecurityChanged>,
    ) -> Result<Self> {
        let path = path.into();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let watched = path.clone();
        let mut last = fingerprint(&watched);

        let thread = thread::Builder::new()
            .name("swap-monitor".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                let current = fingerprint(&watched);
                if current == last {
                    continue;
                }
                last = current;
                log::debug!("linux_swap: {} changed", watched.display());
                let event = SecurityChanged {
                    path: watched.clone(),
                };
                if events.send(event).is_err() {
                    break;
                }
            })
            .map_err(SwapError::MonitorFailed)?;

        log::debug!(
            "linux_swap: monitoring {} every {:?}",
            path.display(),
            interval
        );
        Ok(Self {
            path,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        // Dropping the sender wakes the thread immediately
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("linux_swap: monitor thread for {} panicked", self.path.display());
            }
        }
    }
}
