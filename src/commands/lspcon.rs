//! Parade LSPCON commands

use std::fs;
use std::path::Path;

use fwflash_core::clock::SystemClock;
use fwflash_core::{Device, Firmware, InstallOutcome, Session};
use fwflash_lspcon::{I2cDevConnector, LspconDevice, SysfsAux, DEVICE_NAME, QUIRK_AUX_DEVICE_NAME};

use super::{build_context, print_device, BarObserver};
use crate::cli::{LspconCommands, QuirkArgs};

type LspconSession = Session<LspconDevice<I2cDevConnector, SysfsAux>>;

/// Probe the converter described on the command line
fn probe(
    dev: &Path,
    name: &str,
    aux: Option<&str>,
    quirks: &QuirkArgs,
) -> Result<LspconSession, Box<dyn std::error::Error>> {
    let instance_id = format!("PARADE-LSPCON\\NAME_{}", name);
    let mut defaults = vec![("Name", DEVICE_NAME)];
    if let Some(aux) = aux {
        defaults.push((QUIRK_AUX_DEVICE_NAME, aux));
    }
    let ctx = build_context(&instance_id, &defaults, quirks);

    let ops = LspconDevice::new(
        I2cDevConnector::new(dev),
        SysfsAux::new(),
        name,
        SystemClock::new(),
    );
    let mut session = Session::new(ops, Device::new(dev.display().to_string()));
    session.probe(&ctx)?;
    Ok(session)
}

pub fn run(
    dev: &Path,
    name: &str,
    aux: Option<&str>,
    quirks: &QuirkArgs,
    command: &LspconCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = probe(dev, name, aux, quirks)?;
    match command {
        LspconCommands::Info => cmd_info(&mut session),
        LspconCommands::Write { input } => cmd_write(&mut session, input),
        LspconCommands::Dump { output } => cmd_dump(&mut session, output),
    }
}

fn cmd_info(session: &mut LspconSession) -> Result<(), Box<dyn std::error::Error>> {
    let mut locker = session.open()?;
    locker.setup()?;
    print_device(locker.device());
    match locker.ops().active_partition() {
        Some(partition) => println!("  Partition:    {}", partition),
        None => println!("  Partition:    (unknown)"),
    }
    locker.close()?;
    Ok(())
}

fn cmd_write(session: &mut LspconSession, input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let firmware = Firmware::new(fs::read(input)?);
    println!(
        "Writing {} bytes from {} to {}",
        firmware.len(),
        input.display(),
        session.device().physical_id()
    );

    let (observer, bar) = BarObserver::new()?;
    session.device_mut().set_observer(Box::new(observer));
    let outcome = session.install(&firmware);
    bar.finish_and_clear();

    match outcome? {
        InstallOutcome::Complete => {
            println!(
                "Update complete, version {}",
                session.device().version().unwrap_or("(unknown)")
            );
        }
        InstallOutcome::WaitForReplug => {
            println!("Update written; the converter must be power cycled to finish");
        }
    }
    Ok(())
}

fn cmd_dump(session: &mut LspconSession, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (observer, bar) = BarObserver::new()?;
    session.device_mut().set_observer(Box::new(observer));

    let mut locker = session.open()?;
    locker.setup()?;
    let data = locker.dump_firmware();
    locker.close()?;
    bar.finish_and_clear();

    let data = data?;
    fs::write(output, &data)?;
    println!("Wrote {} bytes to {}", data.len(), output.display());
    Ok(())
}
