//! Goodix fingerprint sensor packet protocol
//!
//! Every packet in either direction is
//!
//! ```text
//! [len:u16 LE][cmd0:u8][cmd1:u8][eop:u8] payload[len] [crc32:u32 LE]
//! ```
//!
//! where the CRC32 covers the 5-byte header and the payload. Replies to a
//! command that produces data arrive as an ACK packet followed by a data
//! packet carrying the same `cmd0`.

use fwflash_core::checksum::crc32;
use fwflash_core::chunk::Chunk;
use fwflash_core::{Error, Result};

/// Goodix USB vendor ID
pub const GOODIX_USB_VENDOR: u16 = 0x27C6;

/// Bulk IN endpoint
pub const EP_IN: u8 = 0x83;
/// Bulk OUT endpoint
pub const EP_OUT: u8 = 0x01;
/// USB interface carrying the bulk endpoints
pub const USB_INTERFACE: u8 = 0;

/// Bytes per firmware data packet, and size of each IN read
pub const TRANSFER_BLOCK_SIZE: usize = 1000;

pub const HEADER_SIZE: usize = 5;
pub const CRC_SIZE: usize = 4;

// cmd0 values
pub const CMD_UPGRADE: u8 = 0x80;
pub const CMD_ACK: u8 = 0xAA;
pub const CMD_RESET: u8 = 0xB4;
pub const CMD_VERSION: u8 = 0xD0;

// cmd1 values
pub const CMD1_DEFAULT: u8 = 0x00;
pub const CMD1_UPGRADE_INIT: u8 = 0x00;
pub const CMD1_UPGRADE_DATA: u8 = 0x01;
/// Reset into the newly written firmware
pub const CMD1_RESET_DEVICE: u8 = 0x03;

/// More packets of this transfer follow
pub const PKG_NORMAL: u8 = 0x80;
/// Final packet of a transfer
pub const PKG_EOP: u8 = 0x00;

/// Result code for success
pub const RESULT_SUCCESS: u8 = 0x00;

/// Parsed packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Payload length, excluding header and CRC
    pub len: u16,
    pub cmd0: u8,
    pub cmd1: u8,
    pub eop: u8,
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let len = self.len.to_le_bytes();
        [len[0], len[1], self.cmd0, self.cmd1, self.eop]
    }

    /// Parse the header at the start of `buf`
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "packet of {} bytes is shorter than its header",
                buf.len()
            )));
        }
        Ok(Self {
            len: u16::from_le_bytes([buf[0], buf[1]]),
            cmd0: buf[2],
            cmd1: buf[3],
            eop: buf[4],
        })
    }
}

/// A command to send to the sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub cmd0: u8,
    pub cmd1: u8,
    pub eop: u8,
    pub payload: Vec<u8>,
    /// Keep reading after the ACK until the data packet arrives
    pub wait_data_reply: bool,
}

impl Request {
    /// Query firmware version
    pub fn version() -> Self {
        Self {
            cmd0: CMD_VERSION,
            cmd1: CMD1_DEFAULT,
            eop: PKG_EOP,
            payload: vec![0],
            wait_data_reply: true,
        }
    }

    /// Prepare the sensor for a firmware upgrade
    pub fn update_init() -> Self {
        Self {
            cmd0: CMD_UPGRADE,
            cmd1: CMD1_UPGRADE_INIT,
            eop: PKG_EOP,
            payload: Vec::new(),
            wait_data_reply: true,
        }
    }

    /// One block of firmware; only the last block waits for a data reply
    pub fn update_data(chunk: &Chunk<'_>) -> Self {
        Self {
            cmd0: CMD_UPGRADE,
            cmd1: CMD1_UPGRADE_DATA,
            eop: if chunk.is_last { PKG_EOP } else { PKG_NORMAL },
            payload: chunk.data.to_vec(),
            wait_data_reply: chunk.is_last,
        }
    }

    /// Reset the sensor; it re-enumerates afterwards
    pub fn reset() -> Self {
        Self {
            cmd0: CMD_RESET,
            cmd1: CMD1_RESET_DEVICE,
            eop: PKG_EOP,
            payload: Vec::new(),
            wait_data_reply: false,
        }
    }

    /// Serialize as header, payload and CRC32 trailer
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_frame(self.cmd0, self.cmd1, self.eop, &self.payload)
    }
}

/// Build a complete packet
pub fn encode_frame(cmd0: u8, cmd1: u8, eop: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(payload.len()).map_err(|_| {
        Error::NotSupported(format!("payload of {} bytes does not fit a packet", payload.len()))
    })?;
    let header = Header {
        len,
        cmd0,
        cmd1,
        eop,
    };
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(payload);
    let crc = crc32(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Check a received packet and split it into header and payload
///
/// The CRC is verified before the payload is returned.
pub fn decode_frame(buf: &[u8]) -> Result<(Header, &[u8])> {
    let header = Header::parse(buf)?;
    let body_end = HEADER_SIZE + header.len as usize;
    if buf.len() < body_end + CRC_SIZE {
        return Err(Error::Protocol(format!(
            "packet truncated: header declares {} payload bytes, received {} bytes in total",
            header.len,
            buf.len()
        )));
    }
    let expected = u32::from_le_bytes([
        buf[body_end],
        buf[body_end + 1],
        buf[body_end + 2],
        buf[body_end + 3],
    ]);
    let actual = crc32(&buf[..body_end]);
    if expected != actual {
        return Err(Error::Checksum { expected, actual });
    }
    Ok((header, &buf[HEADER_SIZE..body_end]))
}

/// Firmware identification returned by [`CMD_VERSION`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub result: u8,
    pub format: [u8; 2],
    pub fw_type: [u8; 8],
    /// ASCII, NUL padded
    pub fw_version: [u8; 8],
}

impl VersionInfo {
    const MIN_LEN: usize = 1 + 2 + 8 + 8;

    fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < Self::MIN_LEN {
            return Err(Error::Protocol(format!(
                "version reply of {} bytes, need at least {}",
                body.len(),
                Self::MIN_LEN
            )));
        }
        let mut info = Self {
            result: body[0],
            format: [0; 2],
            fw_type: [0; 8],
            fw_version: [0; 8],
        };
        info.format.copy_from_slice(&body[1..3]);
        info.fw_type.copy_from_slice(&body[3..11]);
        info.fw_version.copy_from_slice(&body[11..19]);
        Ok(info)
    }

    /// The firmware version as text, up to the first NUL
    pub fn version_string(&self) -> String {
        let end = self
            .fw_version
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.fw_version.len());
        String::from_utf8_lossy(&self.fw_version[..end])
            .trim()
            .to_string()
    }
}

/// A parsed reply body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Intermediate acknowledgement of `command`
    Ack { result: u8, command: u8 },
    Version(VersionInfo),
    /// Completion of an upgrade or reset command
    Status { command: u8, result: u8 },
}

impl Response {
    pub fn result(&self) -> u8 {
        match self {
            Response::Ack { result, .. } | Response::Status { result, .. } => *result,
            Response::Version(info) => info.result,
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Response::Ack { .. })
    }
}

/// Parse the body of a reply according to its `cmd0`
pub fn parse_body(cmd0: u8, body: &[u8]) -> Result<Response> {
    match cmd0 {
        CMD_ACK => match body {
            [result, command, ..] => Ok(Response::Ack {
                result: *result,
                command: *command,
            }),
            _ => Err(Error::Protocol(format!(
                "ACK body of {} bytes is too short",
                body.len()
            ))),
        },
        CMD_VERSION => VersionInfo::parse(body).map(Response::Version),
        CMD_UPGRADE | CMD_RESET => match body.first() {
            Some(&result) => Ok(Response::Status {
                command: cmd0,
                result,
            }),
            None => Err(Error::Protocol(format!(
                "empty reply body for command 0x{:02X}",
                cmd0
            ))),
        },
        other => Err(Error::Protocol(format!(
            "unexpected reply command 0x{:02X}",
            other
        ))),
    }
}
