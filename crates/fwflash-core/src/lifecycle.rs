//! Device lifecycle state machine
//!
//! Every device variant implements [`DeviceOps`], overriding only the hooks
//! it needs. A [`Session`] pairs the variant with its [`Device`] and
//! enforces the fixed order in which the hooks may run:
//!
//! ```text
//! Created -> Probed -> Opened -> Ready -> Detached -> Writing -> Verifying -> Attached -> Closed
//! ```
//!
//! Any hook failure (other than a `NotSupported` probe or a failed setup)
//! moves the session to `Error`, which is absorbing: only closing the
//! handle is still allowed. Calls made in the wrong state are refused with
//! an `Internal` error and leave the state unchanged.
//!
//! The hardware handle is held by a [`DeviceLocker`] returned from
//! [`Session::open`]. Dropping the locker closes the device, so the handle
//! is released on every exit path.

use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::device::{Device, DeviceFlags, DeviceStatus};
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::firmware::Firmware;
use crate::guard::Guard;
use crate::quirks::Context;

/// Per-variant device behaviour
///
/// Default implementations do nothing and succeed, except
/// [`DeviceOps::dump_firmware`], which reports `NotSupported`.
pub trait DeviceOps {
    /// Check identity and resolve configuration; must not touch hardware
    fn probe(&mut self, _device: &mut Device, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    /// Claim the hardware handle
    fn open(&mut self, _device: &mut Device) -> Result<()> {
        Ok(())
    }

    /// Release the hardware handle
    fn close(&mut self, _device: &mut Device) -> Result<()> {
        Ok(())
    }

    /// Query version and other metadata
    fn setup(&mut self, _device: &mut Device) -> Result<()> {
        Ok(())
    }

    /// Refresh metadata after an update that did not need a replug
    fn reload(&mut self, device: &mut Device) -> Result<()> {
        self.setup(device)
    }

    /// Switch into update mode
    fn detach(&mut self, _device: &mut Device) -> Result<()> {
        Ok(())
    }

    /// Write `firmware` to the device
    fn write_firmware(&mut self, device: &mut Device, firmware: &Firmware) -> Result<()>;

    /// Check what was just written
    fn verify(&mut self, _device: &mut Device, _firmware: &Firmware) -> Result<()> {
        Ok(())
    }

    /// Return to normal run mode
    fn attach(&mut self, _device: &mut Device) -> Result<()> {
        Ok(())
    }

    /// Read back the current firmware
    fn dump_firmware(&mut self, _device: &mut Device) -> Result<Vec<u8>> {
        Err(Error::NotSupported("reading firmware back".into()))
    }
}

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    Probed,
    Opened,
    Ready,
    Detached,
    Writing,
    Verifying,
    Attached,
    Closed,
    Error,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Probed => "probed",
            Self::Opened => "opened",
            Self::Ready => "ready",
            Self::Detached => "detached",
            Self::Writing => "writing",
            Self::Verifying => "verifying",
            Self::Attached => "attached",
            Self::Closed => "closed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// What the orchestrator has to do after [`Session::install`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The update finished
    Complete,
    /// The device is re-enumerating; hand the new instance to
    /// [`Session::replug`] and call [`Session::install`] again
    WaitForReplug,
}

/// A device variant together with the device it drives
pub struct Session<D: DeviceOps> {
    ops: D,
    device: Device,
    state: LifecycleState,
    handle_open: bool,
    /// Phase to resume in after the device comes back from a replug
    resume: Option<LifecycleState>,
    awaiting_replug: bool,
}

impl<D: DeviceOps> Session<D> {
    pub fn new(ops: D, device: Device) -> Self {
        Self {
            ops,
            device,
            state: LifecycleState::Created,
            handle_open: false,
            resume: None,
            awaiting_replug: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    pub fn ops(&self) -> &D {
        &self.ops
    }

    pub fn into_parts(self) -> (D, Device) {
        (self.ops, self.device)
    }

    /// True between a detach/attach that requested a replug and [`Session::replug`]
    pub fn is_awaiting_replug(&self) -> bool {
        self.awaiting_replug
    }

    fn expect(&self, operation: &str, allowed: &[LifecycleState]) -> Result<()> {
        if self.state == LifecycleState::Error {
            return Err(Error::Internal(format!(
                "cannot {}: device {} is in the error state",
                operation,
                self.device.physical_id()
            )));
        }
        if !allowed.contains(&self.state) {
            return Err(Error::Internal(format!(
                "cannot {} in state {}",
                operation, self.state
            )));
        }
        Ok(())
    }

    fn fail(&mut self, operation: &str, err: Error) -> Error {
        log::error!(
            "device {}: {} failed in state {}: {}",
            self.device.physical_id(),
            operation,
            self.state,
            err
        );
        self.state = LifecycleState::Error;
        self.device.set_status(DeviceStatus::Idle);
        Error::Context {
            operation: operation.to_string(),
            source: Box::new(err),
        }
    }

    /// Identify the device and resolve its configuration
    ///
    /// `NotSupported` means this variant does not handle the device; the
    /// session stays in `Created` and the error is returned unchanged.
    pub fn probe(&mut self, ctx: &Context) -> Result<()> {
        self.expect("probe", &[LifecycleState::Created])?;
        match self.ops.probe(&mut self.device, ctx) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotSupported => {
                log::debug!("device {}: not handled: {}", self.device.physical_id(), e);
                return Err(e);
            }
            Err(e) => return Err(self.fail("probe", e)),
        }
        if self.device.guids().is_empty() {
            let err = Error::Internal("probe succeeded but device has no GUIDs".into());
            return Err(self.fail("probe", err));
        }
        self.state = LifecycleState::Probed;
        Ok(())
    }

    /// Claim the hardware handle
    ///
    /// The returned locker closes the device when dropped.
    pub fn open(&mut self) -> Result<DeviceLocker<'_, D>> {
        self.expect("open", &[LifecycleState::Probed, LifecycleState::Closed])?;
        if self.awaiting_replug {
            return Err(Error::Internal(format!(
                "device {} is waiting for replug",
                self.device.physical_id()
            )));
        }
        if let Err(e) = self.ops.open(&mut self.device) {
            return Err(self.fail("open", e));
        }
        self.handle_open = true;
        self.state = LifecycleState::Opened;
        log::debug!("device {}: opened", self.device.physical_id());
        Ok(DeviceLocker {
            guard: Guard::new(self, close_on_drop::<D> as fn(&mut Session<D>)),
        })
    }

    /// Hand over the re-enumerated instance of a device that asked for a replug
    ///
    /// `device` is probed with `ops` and must share a GUID with the
    /// device that went away.
    pub fn replug(&mut self, mut ops: D, mut device: Device, ctx: &Context) -> Result<()> {
        self.expect("replug", &[LifecycleState::Closed])?;
        if !self.awaiting_replug {
            return Err(Error::Internal("no replug was requested".into()));
        }
        ops.probe(&mut device, ctx).context("probe replugged device")?;
        if !self.device.same_logical_device(&device) {
            return Err(Error::NotSupported(format!(
                "device {} is not the device that was detached",
                device.physical_id()
            )));
        }
        log::info!(
            "device {} replugged as {}",
            self.device.physical_id(),
            device.physical_id()
        );
        if let Some(observer) = self.device.take_observer() {
            device.set_observer(observer);
        }
        device.remove_flag(DeviceFlags::WAIT_FOR_REPLUG);
        self.ops = ops;
        self.device = device;
        self.awaiting_replug = false;
        Ok(())
    }

    /// Run a complete update: open, setup, detach, write, attach, close
    ///
    /// When the device has to re-enumerate this returns
    /// [`InstallOutcome::WaitForReplug`]; after [`Session::replug`] call it
    /// again to continue from where it stopped.
    pub fn install(&mut self, firmware: &Firmware) -> Result<InstallOutcome> {
        let mut locker = self.open()?;
        locker.setup()?;

        if locker.state() == LifecycleState::Ready {
            locker.detach()?;
            if locker.device().has_flag(DeviceFlags::WAIT_FOR_REPLUG) {
                locker.close()?;
                return Ok(InstallOutcome::WaitForReplug);
            }
        }

        if locker.state() == LifecycleState::Detached {
            locker.write_firmware(firmware)?;
            locker.attach()?;
            if locker.device().has_flag(DeviceFlags::WAIT_FOR_REPLUG) {
                locker.close()?;
                return Ok(InstallOutcome::WaitForReplug);
            }
        }

        locker.reload()?;
        locker.close()?;
        Ok(InstallOutcome::Complete)
    }

    fn close_handle(&mut self) -> Result<()> {
        if !self.handle_open {
            return Ok(());
        }
        self.handle_open = false;
        let result = self.ops.close(&mut self.device);
        if self.device.has_flag(DeviceFlags::WAIT_FOR_REPLUG) && self.resume.is_some() {
            self.awaiting_replug = true;
        }
        if self.state != LifecycleState::Error {
            self.state = LifecycleState::Closed;
        }
        self.device.set_status(DeviceStatus::Idle);
        log::debug!("device {}: closed", self.device.physical_id());
        result
    }
}

fn close_on_drop<D: DeviceOps>(session: &mut Session<D>) {
    if let Err(e) = session.close_handle() {
        log::warn!(
            "device {}: failed to close: {}",
            session.device.physical_id(),
            e
        );
    }
}

/// Exclusive access to an open device
///
/// All hardware operations go through the locker. Dropping it closes the
/// device; use [`DeviceLocker::close`] to observe the close result.
pub struct DeviceLocker<'s, D: DeviceOps> {
    guard: Guard<'s, Session<D>, fn(&mut Session<D>)>,
}

impl<D: DeviceOps> DeviceLocker<'_, D> {
    /// Query version and metadata; failure is logged, not returned
    ///
    /// After a replug this also returns the session to the phase it was in
    /// when the device went away.
    pub fn setup(&mut self) -> Result<()> {
        let s = &mut *self.guard;
        s.expect("setup", &[LifecycleState::Opened])?;
        if let Err(e) = s.ops.setup(&mut s.device) {
            log::warn!(
                "device {}: setup failed, continuing without version: {}",
                s.device.physical_id(),
                e
            );
        }
        s.state = s.resume.take().unwrap_or(LifecycleState::Ready);
        Ok(())
    }

    /// Switch the device into update mode
    pub fn detach(&mut self) -> Result<()> {
        let s = &mut *self.guard;
        s.expect("detach", &[LifecycleState::Ready])?;
        s.device.set_status(DeviceStatus::DeviceRestart);
        if let Err(e) = s.ops.detach(&mut s.device) {
            return Err(s.fail("detach", e));
        }
        s.state = LifecycleState::Detached;
        if s.device.has_flag(DeviceFlags::WAIT_FOR_REPLUG) {
            s.resume = Some(LifecycleState::Detached);
        }
        s.device.set_status(DeviceStatus::Idle);
        Ok(())
    }

    /// Write and then verify `firmware`
    pub fn write_firmware(&mut self, firmware: &Firmware) -> Result<()> {
        let s = &mut *self.guard;
        s.expect("write firmware", &[LifecycleState::Detached])?;

        s.state = LifecycleState::Writing;
        s.device.set_status(DeviceStatus::DeviceWrite);
        log::info!(
            "device {}: writing {} bytes",
            s.device.physical_id(),
            firmware.len()
        );
        if let Err(e) = s.ops.write_firmware(&mut s.device, firmware) {
            return Err(s.fail("write firmware", e));
        }

        s.state = LifecycleState::Verifying;
        s.device.set_status(DeviceStatus::DeviceVerify);
        if let Err(e) = s.ops.verify(&mut s.device, firmware) {
            return Err(s.fail("verify", e));
        }
        s.device.set_status(DeviceStatus::Idle);
        Ok(())
    }

    /// Return the device to normal run mode
    pub fn attach(&mut self) -> Result<()> {
        let s = &mut *self.guard;
        s.expect("attach", &[LifecycleState::Verifying])?;
        s.device.set_status(DeviceStatus::DeviceRestart);
        if let Err(e) = s.ops.attach(&mut s.device) {
            return Err(s.fail("attach", e));
        }
        s.state = LifecycleState::Attached;
        if s.device.has_flag(DeviceFlags::WAIT_FOR_REPLUG) {
            s.resume = Some(LifecycleState::Attached);
        }
        s.device.set_status(DeviceStatus::Idle);
        Ok(())
    }

    /// Refresh metadata after attach; failure is logged, not returned
    pub fn reload(&mut self) -> Result<()> {
        let s = &mut *self.guard;
        s.expect("reload", &[LifecycleState::Attached])?;
        if let Err(e) = s.ops.reload(&mut s.device) {
            log::warn!("device {}: reload failed: {}", s.device.physical_id(), e);
        }
        Ok(())
    }

    /// Read back the current firmware
    pub fn dump_firmware(&mut self) -> Result<Vec<u8>> {
        let s = &mut *self.guard;
        s.expect(
            "dump firmware",
            &[
                LifecycleState::Opened,
                LifecycleState::Ready,
                LifecycleState::Detached,
            ],
        )?;
        s.device.set_status(DeviceStatus::DeviceRead);
        let result = s.ops.dump_firmware(&mut s.device);
        s.device.set_status(DeviceStatus::Idle);
        match result {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.is_not_supported() => Err(e),
            Err(e) => Err(s.fail("dump firmware", e)),
        }
    }

    /// Close the device now and report the result
    pub fn close(mut self) -> Result<()> {
        self.guard.disarm();
        self.guard.close_handle()
    }

    pub fn state(&self) -> LifecycleState {
        self.guard.state
    }
}

impl<D: DeviceOps> Deref for DeviceLocker<'_, D> {
    type Target = Session<D>;

    fn deref(&self) -> &Session<D> {
        &self.guard
    }
}

impl<D: DeviceOps> DerefMut for DeviceLocker<'_, D> {
    fn deref_mut(&mut self) -> &mut Session<D> {
        &mut self.guard
    }
}
