//! Hex dump formatting for trace output

use std::fmt::Write;

/// Format `data` as 16-byte rows of offset, hex and ASCII
pub fn hexdump(title: &str, data: &[u8]) -> String {
    let mut out = format!("{} ({} bytes):", title, data.len());
    for (row, bytes) in data.chunks(16).enumerate() {
        let _ = write!(out, "\n  {:04x}:", row * 16);
        for b in bytes {
            let _ = write!(out, " {:02x}", b);
        }
        for _ in bytes.len()..16 {
            out.push_str("   ");
        }
        out.push_str("  ");
        out.extend(bytes.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump() {
        let out = hexdump("tx", b"\x10\x00AB");
        assert_eq!(
            out,
            "tx (4 bytes):\n  0000: 10 00 41 42                                      ..AB"
        );
        assert_eq!(hexdump("empty", &[]), "empty (0 bytes):");
    }
}
