//! CLI command implementations
//!
//! Each device family gets its own module. They all build a
//! [`fwflash_core::Context`] from the command line, drive a
//! [`fwflash_core::Session`] and report progress through [`BarObserver`].

#[cfg(feature = "uefi")]
pub mod esrt;
#[cfg(feature = "goodixfp")]
pub mod goodixfp;
#[cfg(feature = "lspcon")]
pub mod lspcon;
#[cfg(feature = "linux-swap")]
pub mod swap;

use fwflash_core::quirks::HWID_FAMILY;
use fwflash_core::{Context, Device, DeviceStatus, ProgressObserver};
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::QuirkArgs;

/// Progress bar resolution
const BAR_STEPS: u64 = 1000;

/// Shows device status and progress on a progress bar
pub struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    /// Create the observer and a handle to its bar for finishing it later
    pub fn new() -> Result<(Self, ProgressBar), Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(BAR_STEPS);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")?
                .progress_chars("#>-"),
        );
        Ok((Self { bar: bar.clone() }, bar))
    }
}

impl ProgressObserver for BarObserver {
    fn status_changed(&mut self, status: DeviceStatus) {
        if status == DeviceStatus::Idle {
            return;
        }
        self.bar.set_message(status.to_string());
        self.bar.set_position(0);
    }

    fn progress_changed(&mut self, fraction: f64) {
        self.bar
            .set_position((fraction.clamp(0.0, 1.0) * BAR_STEPS as f64).round() as u64);
    }
}

/// Context holding `defaults` and the command-line quirks for `instance_id`
///
/// Command-line quirks override defaults with the same key.
pub fn build_context(instance_id: &str, defaults: &[(&str, &str)], args: &QuirkArgs) -> Context {
    let mut ctx = Context::new();
    for (key, value) in defaults {
        ctx.add_quirk(instance_id, *key, *value);
    }
    for (key, value) in &args.quirks {
        ctx.add_quirk(instance_id, key, value);
    }
    if let Some(family) = &args.family {
        ctx.set_hwid(HWID_FAMILY, family);
    }
    ctx
}

/// Print the identity and state of a probed device
pub fn print_device(device: &Device) {
    println!("{}", device.name().unwrap_or("Unknown device"));
    println!("  Physical ID:  {}", device.physical_id());
    if let Some(vendor) = device.vendor() {
        println!("  Vendor:       {}", vendor);
    }
    if let Some(summary) = device.summary() {
        println!("  Summary:      {}", summary);
    }
    if let Some(protocol) = device.protocol() {
        println!("  Protocol:     {}", protocol);
    }
    println!(
        "  Version:      {}",
        device.version().unwrap_or("(unknown)")
    );
    for vendor_id in device.vendor_ids() {
        println!("  Vendor ID:    {}", vendor_id);
    }
    for instance_id in device.instance_ids() {
        println!("  Instance ID:  {}", instance_id);
    }
    for guid in device.guids() {
        println!("  GUID:         {}", guid);
    }
    if let Some(size) = device.firmware_size() {
        println!("  Firmware:     {} bytes", size);
    }
    println!("  Flags:        {:?}", device.flags());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_context() {
        let args = QuirkArgs {
            quirks: vec![("Vendor".into(), "Acme".into())],
            family: Some("Latitude".into()),
        };
        let defaults = [("Vendor", "Default"), ("Name", "Widget")];
        let ctx = build_context("TEST\\DEV_1", &defaults, &args);
        assert_eq!(ctx.hwid(HWID_FAMILY), Some("Latitude"));

        let mut device = Device::new("test");
        device.add_instance_id("TEST\\DEV_1");
        let quirks = ctx.quirks_for(&device);
        assert_eq!(quirks.get("Vendor"), Some("Acme"));
        assert_eq!(quirks.get("Name"), Some("Widget"));
    }

    #[test]
    fn test_observer_tracks_fraction() {
        let (mut observer, bar) = BarObserver::new().unwrap();
        observer.status_changed(DeviceStatus::DeviceWrite);
        observer.progress_changed(0.5);
        assert_eq!(bar.position(), BAR_STEPS / 2);
        observer.progress_changed(2.0);
        assert_eq!(bar.position(), BAR_STEPS);
        assert_eq!(bar.message(), "writing");
    }
}
