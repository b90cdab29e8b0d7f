//! fwflash - Peripheral firmware updater
//!
//! Drives firmware updates of a few peripheral families through the shared
//! device lifecycle in `fwflash-core`:
//!
//! - **lspcon**: Parade PS175 DisplayPort to HDMI converters, flashed over
//!   I2C through their SPI bridge
//! - **goodixfp**: Goodix match-on-chip fingerprint sensors on USB
//! - **swap**: reports whether swap is encrypted
//! - **esrt**: lists UEFI firmware resources and the Secure Boot state

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let result = match cli.command {
        #[cfg(feature = "lspcon")]
        Commands::Lspcon {
            dev,
            name,
            aux,
            quirks,
            command,
        } => commands::lspcon::run(&dev, &name, aux.as_deref(), &quirks, &command),
        #[cfg(feature = "goodixfp")]
        Commands::Goodixfp(command) => commands::goodixfp::run(&command),
        #[cfg(feature = "linux-swap")]
        Commands::Swap {
            path,
            watch,
            interval,
        } => commands::swap::run(&path, watch, interval),
        #[cfg(feature = "uefi")]
        Commands::Esrt { path, efivars } => commands::esrt::run(&path, &efivars),
    };

    result
}
