//! Goodix fingerprint sensor commands

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use fwflash_core::{Context, Device, Firmware, InstallOutcome, Session};
use fwflash_goodixfp::{list_devices, GoodixFpDevice, NusbConnector, PacketConfig, UsbDeviceInfo};

use super::{build_context, print_device, BarObserver};
use crate::cli::{GoodixCommands, QuirkArgs};

type GoodixSession = Session<GoodixFpDevice<NusbConnector>>;

/// Times to look for the sensor after it asked to be replugged
const REPLUG_ATTEMPTS: u32 = 10;
/// Pause between replug lookups
const REPLUG_POLL: Duration = Duration::from_millis(500);

pub fn run(command: &GoodixCommands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        GoodixCommands::List => cmd_list(),
        GoodixCommands::Info { device, quirks } => cmd_info(*device, quirks),
        GoodixCommands::Write {
            device,
            input,
            trace,
            quirks,
        } => cmd_write(*device, input, *trace, quirks),
    }
}

fn cmd_list() -> Result<(), Box<dyn std::error::Error>> {
    let devices = list_devices()?;
    if devices.is_empty() {
        println!("No Goodix sensors found");
    }
    for info in devices {
        println!(
            "{:03}:{:03}  {:04x}:{:04x}",
            info.bus, info.address, info.vendor_id, info.product_id
        );
    }
    Ok(())
}

/// Sensor at `position`, or the first one found
fn select(position: Option<(u8, u8)>) -> Result<UsbDeviceInfo, Box<dyn std::error::Error>> {
    let devices = list_devices()?;
    let found = match position {
        Some((bus, address)) => devices
            .into_iter()
            .find(|d| d.bus == bus && d.address == address),
        None => devices.into_iter().next(),
    };
    found.ok_or_else(|| "No matching Goodix sensor found".into())
}

fn context_for(info: &UsbDeviceInfo, quirks: &QuirkArgs) -> Context {
    let instance_id = format!(
        "USB\\VID_{:04X}&PID_{:04X}",
        info.vendor_id, info.product_id
    );
    build_context(&instance_id, &[], quirks)
}

fn instantiate(info: &UsbDeviceInfo, config: &PacketConfig) -> (GoodixFpDevice<NusbConnector>, Device) {
    let connector = NusbConnector {
        bus: info.bus,
        address: info.address,
    };
    let ops = GoodixFpDevice::new(connector, info.vendor_id, info.product_id)
        .with_config(config.clone());
    (ops, Device::new(info.physical_id()))
}

fn probe(
    info: &UsbDeviceInfo,
    config: &PacketConfig,
    ctx: &Context,
) -> Result<GoodixSession, Box<dyn std::error::Error>> {
    let (ops, device) = instantiate(info, config);
    let mut session = Session::new(ops, device);
    session.probe(ctx)?;
    Ok(session)
}

fn cmd_info(
    position: Option<(u8, u8)>,
    quirks: &QuirkArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let info = select(position)?;
    let ctx = context_for(&info, quirks);
    let mut session = probe(&info, &PacketConfig::default(), &ctx)?;

    let mut locker = session.open()?;
    locker.setup()?;
    print_device(locker.device());
    locker.close()?;
    Ok(())
}

/// Wait for a sensor with the same IDs to come back and hand it to `session`
fn replug(
    session: &mut GoodixSession,
    before: &UsbDeviceInfo,
    config: &PacketConfig,
    ctx: &Context,
) -> Result<(), Box<dyn std::error::Error>> {
    thread::sleep(session.device().remove_delay());
    for attempt in 1..=REPLUG_ATTEMPTS {
        let found = list_devices()?.into_iter().find(|d| {
            d.vendor_id == before.vendor_id && d.product_id == before.product_id
        });
        if let Some(info) = found {
            let (ops, device) = instantiate(&info, config);
            session.replug(ops, device, ctx)?;
            return Ok(());
        }
        log::debug!(
            "goodixfp: sensor not back yet ({}/{})",
            attempt,
            REPLUG_ATTEMPTS
        );
        thread::sleep(REPLUG_POLL);
    }
    Err("Sensor did not come back after reset".into())
}

fn cmd_write(
    position: Option<(u8, u8)>,
    input: &Path,
    trace: bool,
    quirks: &QuirkArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let firmware = Firmware::new(fs::read(input)?);
    let config = PacketConfig::default().with_trace(trace);
    let info = select(position)?;
    let ctx = context_for(&info, quirks);
    let mut session = probe(&info, &config, &ctx)?;

    println!(
        "Writing {} bytes from {} to {}",
        firmware.len(),
        input.display(),
        session.device().physical_id()
    );

    let (observer, bar) = BarObserver::new()?;
    session.device_mut().set_observer(Box::new(observer));

    loop {
        let outcome = session.install(&firmware);
        match outcome {
            Ok(InstallOutcome::Complete) => break,
            Ok(InstallOutcome::WaitForReplug) => {
                bar.set_message("waiting for replug");
                log::info!("goodixfp: waiting for sensor to re-enumerate");
                if let Err(e) = replug(&mut session, &info, &config, &ctx) {
                    bar.finish_and_clear();
                    return Err(e);
                }
            }
            Err(e) => {
                bar.finish_and_clear();
                return Err(e.into());
            }
        }
    }
    bar.finish_and_clear();

    println!(
        "Update complete, version {}",
        session.device().version().unwrap_or("(unknown)")
    );
    Ok(())
}
