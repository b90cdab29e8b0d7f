//! Swap encryption attribute command

use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use fwflash_linux_swap::{evaluate, FileMonitor, SecurityAttr};

fn print_attr(attr: &SecurityAttr) {
    println!(
        "{}: {}{}",
        attr.id,
        attr.result,
        if attr.is_success() { "" } else { " (failed)" }
    );
}

pub fn run(path: &Path, watch: bool, interval: Duration) -> Result<(), Box<dyn std::error::Error>> {
    print_attr(&evaluate(path));
    if !watch {
        return Ok(());
    }

    let (tx, rx) = mpsc::channel();
    let _monitor = FileMonitor::spawn(path, interval, tx)?;
    log::info!("Watching {} for changes", path.display());
    for change in rx {
        print_attr(&evaluate(&change.path));
    }
    Ok(())
}
