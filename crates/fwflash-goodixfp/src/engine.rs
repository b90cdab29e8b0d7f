//! Request/response exchange over USB bulk endpoints

use std::time::Duration;

use fwflash_core::dump::hexdump;
use fwflash_core::transport::BulkTransport;
use fwflash_core::{Error, Result, ResultExt};

use crate::protocol::{
    decode_frame, parse_body, Request, Response, EP_IN, EP_OUT, TRANSFER_BLOCK_SIZE,
};

/// Default per-transfer timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default number of zero-length reads tolerated while waiting for one packet
pub const DEFAULT_MAX_ZERO_LENGTH_READS: u32 = 32;

/// Packet engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketConfig {
    pub in_endpoint: u8,
    pub out_endpoint: u8,
    /// Timeout of each individual bulk transfer
    pub timeout: Duration,
    /// Size of each IN read
    pub transfer_size: usize,
    /// Zero-length reads allowed per received packet before giving up
    pub max_zero_length_reads: u32,
    /// Hex dump every packet at trace level
    pub trace: bool,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            in_endpoint: EP_IN,
            out_endpoint: EP_OUT,
            timeout: DEFAULT_TIMEOUT,
            transfer_size: TRANSFER_BLOCK_SIZE,
            max_zero_length_reads: DEFAULT_MAX_ZERO_LENGTH_READS,
            trace: false,
        }
    }
}

impl PacketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_zero_length_reads(mut self, max: u32) -> Self {
        self.max_zero_length_reads = max;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

/// Frames requests and collects replies on one transport
///
/// Methods take `&mut self`, so one exchange always completes before the
/// next begins.
pub struct PacketEngine<T: BulkTransport> {
    transport: T,
    config: PacketConfig,
}

impl<T: BulkTransport> PacketEngine<T> {
    pub fn new(transport: T, config: PacketConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &PacketConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Send one request
    ///
    /// A zero-length packet is sent first to resynchronize the endpoint.
    pub fn send(&mut self, request: &Request) -> Result<()> {
        let frame = request.encode()?;
        let ep = self.config.out_endpoint;
        let timeout = self.config.timeout;

        self.transport
            .bulk_out(ep, &[], timeout)
            .context("send zero-length packet")?;

        if self.config.trace {
            log::trace!("{}", hexdump("REQST", &frame));
        }

        let sent = self
            .transport
            .bulk_out(ep, &frame, timeout)
            .context("send request")?;
        if sent != frame.len() {
            return Err(Error::ShortWrite {
                expected: frame.len(),
                actual: sent,
            });
        }
        Ok(())
    }

    /// Read packets until a reply is complete
    ///
    /// Zero-length packets are part of normal framing and are skipped, up
    /// to `max_zero_length_reads` per packet. With `wait_data_reply` an ACK
    /// is followed by a data packet, which is the one returned.
    pub fn receive(&mut self, wait_data_reply: bool) -> Result<Response> {
        let mut buf = vec![0u8; self.config.transfer_size];
        let mut zero_length_reads = 0u32;
        loop {
            let received = self
                .transport
                .bulk_in(self.config.in_endpoint, &mut buf, self.config.timeout)
                .context("receive reply")?;

            if received == 0 {
                zero_length_reads += 1;
                if zero_length_reads > self.config.max_zero_length_reads {
                    return Err(Error::Timeout(format!(
                        "no reply after {} zero-length packets",
                        zero_length_reads
                    )));
                }
                continue;
            }
            zero_length_reads = 0;

            let packet = &buf[..received];
            if self.config.trace {
                log::trace!("{}", hexdump("REPLY", packet));
            }

            let (header, body) = decode_frame(packet)?;
            let response = parse_body(header.cmd0, body)?;
            log::debug!("goodixfp: reply {:?}", response);

            if response.is_ack() && wait_data_reply {
                continue;
            }
            return Ok(response);
        }
    }

    /// Send `request` and wait for its reply
    pub fn exchange(&mut self, request: &Request) -> Result<Response> {
        log::debug!(
            "goodixfp: cmd 0x{:02X}/0x{:02X}, {} bytes",
            request.cmd0,
            request.cmd1,
            request.payload.len()
        );
        self.send(request)?;
        self.receive(request.wait_data_reply)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::*;
    use fwflash_core::ErrorKind;
    use std::collections::VecDeque;

    /// Simulated sensor answering requests the way the hardware does
    #[derive(Default)]
    pub(crate) struct MockSensor {
        pub(crate) sent: Vec<Vec<u8>>,
        pub(crate) replies: VecDeque<Vec<u8>>,
        pub(crate) version: Vec<u8>,
        pub(crate) firmware: Vec<u8>,
        pub(crate) short_write: bool,
        pub(crate) fail_init: bool,
        pub(crate) reset_count: usize,
        pub(crate) mute: bool,
    }

    impl MockSensor {
        pub(crate) fn new() -> Self {
            Self {
                version: b"01.00.07".to_vec(),
                ..Default::default()
            }
        }

        fn reply(&mut self, cmd0: u8, body: &[u8]) {
            self.replies.push_back(Vec::new());
            self.replies
                .push_back(encode_frame(cmd0, 0, PKG_EOP, body).unwrap());
        }

        fn ack(&mut self, command: u8) {
            self.reply(CMD_ACK, &[RESULT_SUCCESS, command]);
        }

        fn handle(&mut self, frame: &[u8]) {
            let (header, body) = decode_frame(frame).unwrap();
            match (header.cmd0, header.cmd1) {
                (CMD_VERSION, _) => {
                    self.ack(CMD_VERSION);
                    let mut data = vec![RESULT_SUCCESS, 0x01, 0x00];
                    data.extend_from_slice(b"APP\0\0\0\0\0");
                    let mut version = self.version.clone();
                    version.resize(8, 0);
                    data.extend_from_slice(&version);
                    data.extend_from_slice(&[0u8; 40]);
                    self.reply(CMD_VERSION, &data);
                }
                (CMD_UPGRADE, CMD1_UPGRADE_INIT) => {
                    self.ack(CMD_UPGRADE);
                    let result = if self.fail_init { 0x01 } else { RESULT_SUCCESS };
                    self.reply(CMD_UPGRADE, &[result]);
                }
                (CMD_UPGRADE, CMD1_UPGRADE_DATA) => {
                    self.firmware.extend_from_slice(body);
                    self.ack(CMD_UPGRADE);
                    if header.eop == PKG_EOP {
                        self.reply(CMD_UPGRADE, &[RESULT_SUCCESS]);
                    }
                }
                (CMD_RESET, CMD1_RESET_DEVICE) => {
                    self.reset_count += 1;
                    self.ack(CMD_RESET);
                }
                other => panic!("unexpected request {:?}", other),
            }
        }
    }

    impl BulkTransport for MockSensor {
        fn bulk_out(&mut self, endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
            assert_eq!(endpoint, EP_OUT);
            self.sent.push(data.to_vec());
            if data.is_empty() {
                return Ok(0);
            }
            if self.short_write {
                return Ok(data.len() - 1);
            }
            if !self.mute {
                self.handle(data);
            }
            Ok(data.len())
        }

        fn bulk_in(&mut self, endpoint: u8, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            assert_eq!(endpoint, EP_IN);
            let packet = self.replies.pop_front().unwrap_or_default();
            buf[..packet.len()].copy_from_slice(&packet);
            Ok(packet.len())
        }
    }

    fn engine(sensor: MockSensor) -> PacketEngine<MockSensor> {
        PacketEngine::new(sensor, PacketConfig::default().with_trace(true))
    }

    #[test]
    fn test_send_primes_with_zero_length_packet() {
        let mut engine = engine(MockSensor::new());
        engine.send(&Request::reset()).unwrap();
        let sent = &engine.transport().sent;
        assert_eq!(sent.len(), 2);
        assert!(sent[0].is_empty());
        assert_eq!(sent[1], Request::reset().encode().unwrap());
    }

    #[test]
    fn test_short_write_is_internal() {
        let mut sensor = MockSensor::new();
        sensor.short_write = true;
        let err = engine(sensor).send(&Request::version()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(matches!(err, Error::ShortWrite { .. }));
    }

    #[test]
    fn test_version_waits_for_data_after_ack() {
        let mut engine = engine(MockSensor::new());
        let response = engine.exchange(&Request::version()).unwrap();
        match response {
            Response::Version(info) => assert_eq!(info.version_string(), "01.00.07"),
            other => panic!("expected version, got {:?}", other),
        }
        assert!(engine.transport().replies.is_empty());
    }

    #[test]
    fn test_ack_returned_without_data_reply() {
        let mut engine = engine(MockSensor::new());
        let response = engine.exchange(&Request::reset()).unwrap();
        assert_eq!(
            response,
            Response::Ack {
                result: RESULT_SUCCESS,
                command: CMD_RESET
            }
        );
    }

    #[test]
    fn test_checksum_error_not_retried() {
        let mut sensor = MockSensor::new();
        let mut bad = encode_frame(CMD_ACK, 0, 0, &[0, CMD_RESET]).unwrap();
        bad[5] ^= 0x01;
        sensor.replies.push_back(bad);
        sensor.replies.push_back(encode_frame(CMD_ACK, 0, 0, &[0, CMD_RESET]).unwrap());
        let mut engine = engine(sensor);
        let err = engine.receive(false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(engine.transport().replies.len(), 1);
    }

    #[test]
    fn test_zero_length_reads_bounded() {
        let mut sensor = MockSensor::new();
        sensor.mute = true;
        let mut engine = PacketEngine::new(
            sensor,
            PacketConfig::default().with_max_zero_length_reads(4),
        );
        let err = engine.exchange(&Request::version()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_zero_length_reads_within_bound() {
        let mut sensor = MockSensor::new();
        for _ in 0..3 {
            sensor.replies.push_back(Vec::new());
        }
        sensor
            .replies
            .push_back(encode_frame(CMD_RESET, 0, 0, &[RESULT_SUCCESS]).unwrap());
        let mut engine = PacketEngine::new(
            sensor,
            PacketConfig::default().with_max_zero_length_reads(3),
        );
        assert_eq!(engine.receive(false).unwrap().result(), RESULT_SUCCESS);
    }
}
