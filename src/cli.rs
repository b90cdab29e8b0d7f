//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;
#[cfg(feature = "linux-swap")]
use std::time::Duration;

/// Parse `KEY=VALUE`
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected KEY=VALUE, got \"{}\"", s))?;
    if key.is_empty() {
        return Err("Quirk key must not be empty".into());
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parse a USB position as `BUS:ADDRESS` (decimal)
#[cfg(feature = "goodixfp")]
fn parse_usb_position(s: &str) -> Result<(u8, u8), String> {
    let (bus, address) = s
        .split_once(':')
        .ok_or_else(|| format!("Expected BUS:ADDRESS, got \"{}\"", s))?;
    let bus = bus.parse().map_err(|e| format!("Invalid bus: {}", e))?;
    let address = address
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;
    Ok((bus, address))
}

/// Parse a duration given in seconds
#[cfg(feature = "linux-swap")]
fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("Invalid seconds: {}", e))?;
    if !(secs > 0.0 && secs.is_finite()) {
        return Err("Interval must be positive".into());
    }
    Ok(Duration::from_secs_f64(secs))
}

#[derive(Parser)]
#[command(name = "fwflash")]
#[command(author, version, about = "Peripheral firmware updater", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Quirk and HWID overrides shared by device commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct QuirkArgs {
    /// Extra quirk for the device (repeatable)
    #[arg(long = "quirk", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub quirks: Vec<(String, String)>,

    /// Hardware family HWID
    #[arg(long)]
    pub family: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parade LSPCON (PS175) on an I2C bus
    #[cfg(feature = "lspcon")]
    Lspcon {
        /// i2c-dev adapter node
        #[arg(long, default_value = "/dev/i2c-7")]
        dev: PathBuf,

        /// I2C client name as shown in sysfs
        #[arg(long, default_value = "1AF80175:00")]
        name: String,

        /// DP AUX channel carrying the DPCD of this converter
        #[arg(long)]
        aux: Option<String>,

        #[command(flatten)]
        quirks: QuirkArgs,

        #[command(subcommand)]
        command: LspconCommands,
    },

    /// Goodix fingerprint sensors on USB
    #[cfg(feature = "goodixfp")]
    #[command(subcommand)]
    Goodixfp(GoodixCommands),

    /// Check whether swap is encrypted
    #[cfg(feature = "linux-swap")]
    Swap {
        /// Swaps file to evaluate
        #[arg(long, default_value = fwflash_linux_swap::PROC_SWAPS)]
        path: PathBuf,

        /// Keep running and re-evaluate when the file changes
        #[arg(long)]
        watch: bool,

        /// Poll interval in seconds for --watch
        #[arg(long, default_value = "5", value_parser = parse_seconds)]
        interval: Duration,
    },

    /// List UEFI ESRT entries
    #[cfg(feature = "uefi")]
    Esrt {
        /// ESRT sysfs directory
        #[arg(long, default_value = fwflash_uefi::SYSFS_ESRT)]
        path: PathBuf,

        /// efivarfs mount point
        #[arg(long, default_value = fwflash_uefi::SYSFS_EFIVARS)]
        efivars: PathBuf,
    },
}

/// LSPCON operations
#[cfg(feature = "lspcon")]
#[derive(Subcommand)]
pub enum LspconCommands {
    /// Show device identity, version and active partition
    Info,

    /// Flash a firmware image to the inactive partition
    Write {
        /// Firmware image (64 KiB)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Save the running partition to a file
    Dump {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Goodix sensor operations
#[cfg(feature = "goodixfp")]
#[derive(Subcommand)]
pub enum GoodixCommands {
    /// List attached sensors
    List,

    /// Show the identity and firmware version of a sensor
    Info {
        /// Sensor position as BUS:ADDRESS (first sensor if omitted)
        #[arg(short, long, value_parser = parse_usb_position)]
        device: Option<(u8, u8)>,

        #[command(flatten)]
        quirks: QuirkArgs,
    },

    /// Flash a firmware image
    Write {
        /// Sensor position as BUS:ADDRESS (first sensor if omitted)
        #[arg(short, long, value_parser = parse_usb_position)]
        device: Option<(u8, u8)>,

        /// Firmware image
        #[arg(short, long)]
        input: PathBuf,

        /// Dump every USB frame at trace level
        #[arg(long)]
        trace: bool,

        #[command(flatten)]
        quirks: QuirkArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("Name=PS175").unwrap(),
            ("Name".to_string(), "PS175".to_string())
        );
        assert_eq!(
            parse_key_value("Flags=a=b").unwrap(),
            ("Flags".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("NoValue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[cfg(feature = "goodixfp")]
    #[test]
    fn test_parse_usb_position() {
        assert_eq!(parse_usb_position("3:17").unwrap(), (3, 17));
        assert!(parse_usb_position("3").is_err());
        assert!(parse_usb_position("x:1").is_err());
    }

    #[cfg(feature = "lspcon")]
    #[test]
    fn test_lspcon_quirk_overrides() {
        let cli = Cli::try_parse_from([
            "fwflash",
            "lspcon",
            "--aux",
            "AUX B",
            "--quirk",
            "Vendor=Acme",
            "--family",
            "Latitude",
            "info",
        ])
        .unwrap();
        let Commands::Lspcon { aux, quirks, .. } = cli.command else {
            panic!("expected lspcon");
        };
        assert_eq!(aux.as_deref(), Some("AUX B"));
        assert_eq!(quirks.quirks, vec![("Vendor".into(), "Acme".into())]);
        assert_eq!(quirks.family.as_deref(), Some("Latitude"));
    }
}
