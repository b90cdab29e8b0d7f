//! `/proc/swaps` parser

use std::path::Path;

use crate::error::{Result, SwapError};

/// Column headers the kernel prints on the first line
const HEADER: [&str; 5] = ["Filename", "Type", "Size", "Used", "Priority"];

/// Device-mapper nodes; swap on these sits below an encryption layer
const ENCRYPTED_PREFIXES: &[&str] = &["/dev/dm-", "/dev/mapper/"];
/// Compressed RAM; never reaches a disk
const RAM_PREFIXES: &[&str] = &["/dev/zram"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapKind {
    Partition,
    File,
    Other,
}

impl SwapKind {
    fn parse(s: &str) -> Self {
        match s {
            "partition" => SwapKind::Partition,
            "file" => SwapKind::File,
            _ => SwapKind::Other,
        }
    }
}

/// One active swap area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapEntry {
    pub filename: String,
    pub kind: SwapKind,
    /// Size in KiB
    pub size: u64,
    /// Used in KiB
    pub used: u64,
    pub priority: i32,
}

impl SwapEntry {
    /// Whether pages written here are protected at rest
    ///
    /// Device-mapper targets count as encrypted; zram never leaves memory.
    pub fn is_encrypted(&self) -> bool {
        ENCRYPTED_PREFIXES
            .iter()
            .chain(RAM_PREFIXES)
            .any(|prefix| self.filename.starts_with(prefix))
    }
}

/// Parsed contents of `/proc/swaps`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinuxSwap {
    entries: Vec<SwapEntry>,
}

impl LinuxSwap {
    pub fn parse(contents: &str) -> Result<Self> {
        let mut lines = contents.lines().enumerate();

        let header: Vec<&str> = match lines.next() {
            Some((_, line)) => line.split_whitespace().collect(),
            None => return Err(SwapError::MissingHeader),
        };
        if header != HEADER {
            return Err(SwapError::MissingHeader);
        }

        let mut entries = Vec::new();
        for (index, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let line_no = index + 1;
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [filename, kind, size, used, priority] = fields[..] else {
                return Err(SwapError::Malformed {
                    line: line_no,
                    content: line.to_string(),
                });
            };
            entries.push(SwapEntry {
                filename: unescape(filename),
                kind: SwapKind::parse(kind),
                size: number(line_no, "Size", size)?,
                used: number(line_no, "Used", used)?,
                priority: number(line_no, "Priority", priority)?,
            });
        }

        log::debug!("linux_swap: {} swap areas", entries.len());
        Ok(Self { entries })
    }

    /// Read and parse a swaps file
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| SwapError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn entries(&self) -> &[SwapEntry] {
        &self.entries
    }

    /// Any swap area active
    pub fn enabled(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Every active swap area is encrypted
    pub fn encrypted(&self) -> bool {
        self.enabled() && self.entries.iter().all(SwapEntry::is_encrypted)
    }
}

fn number<T: std::str::FromStr>(line: usize, field: &'static str, value: &str) -> Result<T> {
    value.parse().map_err(|_| SwapError::InvalidNumber {
        line,
        field,
        value: value.to_string(),
    })
}

/// Undo the kernel's octal escaping of whitespace and backslashes in paths
fn unescape(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits.iter().fold(0u16, |acc, d| acc * 8 + u16::from(d - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_LINE: &str = "Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority\n";

    #[test]
    fn test_parse_entries() {
        let contents = format!(
            "{}/dev/nvme0n1p3                         partition\t16777212\t1024\t-2\n\
             /swap\\040file                           file\t\t4194300\t\t0\t\t-3\n",
            HEADER_LINE
        );
        let swap = LinuxSwap::parse(&contents).unwrap();
        assert_eq!(swap.entries().len(), 2);
        assert_eq!(swap.entries()[0].filename, "/dev/nvme0n1p3");
        assert_eq!(swap.entries()[0].kind, SwapKind::Partition);
        assert_eq!(swap.entries()[0].size, 16777212);
        assert_eq!(swap.entries()[0].priority, -2);
        assert_eq!(swap.entries()[1].filename, "/swap file");
        assert_eq!(swap.entries()[1].kind, SwapKind::File);
        assert!(swap.enabled());
        assert!(!swap.encrypted());
    }

    #[test]
    fn test_header_only_is_disabled() {
        let swap = LinuxSwap::parse(HEADER_LINE).unwrap();
        assert!(!swap.enabled());
        assert!(!swap.encrypted());
    }

    #[test]
    fn test_encrypted_devices() {
        let contents = format!(
            "{}/dev/dm-1 partition 8388604 0 -2\n/dev/zram0 partition 4096 0 100\n",
            HEADER_LINE
        );
        let swap = LinuxSwap::parse(&contents).unwrap();
        assert!(swap.encrypted());

        let mapper = format!("{}/dev/mapper/cryptswap partition 1024 0 -2\n", HEADER_LINE);
        assert!(LinuxSwap::parse(&mapper).unwrap().encrypted());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            LinuxSwap::parse(""),
            Err(SwapError::MissingHeader)
        ));
        assert!(matches!(
            LinuxSwap::parse("garbage\n"),
            Err(SwapError::MissingHeader)
        ));

        let short = format!("{}/dev/sda2 partition 1024\n", HEADER_LINE);
        assert!(matches!(
            LinuxSwap::parse(&short),
            Err(SwapError::Malformed { line: 2, .. })
        ));

        let bad_size = format!("{}/dev/sda2 partition lots 0 -2\n", HEADER_LINE);
        assert!(matches!(
            LinuxSwap::parse(&bad_size),
            Err(SwapError::InvalidNumber { field: "Size", .. })
        ));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("/a\\040b"), "/a b");
        assert_eq!(unescape("/a\\134b"), "/a\\b");
        assert_eq!(unescape("/trailing\\04"), "/trailing\\04");
    }
}
