//! Numeric sysfs attributes

use std::path::Path;

/// Read `dir/name` as an unsigned integer
///
/// A `0x` prefix selects hex, anything else is decimal. Parsing stops at
/// the first invalid digit; a missing or unreadable file reads as 0.
pub fn read_u64(dir: &Path, name: &str) -> u64 {
    match std::fs::read_to_string(dir.join(name)) {
        Ok(data) => parse_u64(&data),
        Err(e) => {
            log::trace!("uefi: {}/{}: {}", dir.display(), name, e);
            0
        }
    }
}

/// Parse the leading number of `data`, saturating on overflow
pub fn parse_u64(data: &str) -> u64 {
    let data = data.trim_start();
    let (digits, radix) = match data.strip_prefix("0x") {
        Some(hex) => (hex, 16),
        None => (data, 10),
    };
    digits
        .chars()
        .map_while(|c| c.to_digit(radix))
        .fold(0u64, |acc, d| {
            acc.saturating_mul(u64::from(radix))
                .saturating_add(u64::from(d))
        })
}
