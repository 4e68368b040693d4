//! The DFU state machine: the core algorithm this crate exists to
//! implement. Drives MTU negotiation, then streams the init packet as one
//! or more Command objects and the firmware image as a sequence of Data
//! objects, verifying a server-side CRC32 after every burst and retrying
//! on mismatch.
//!
//! ```text
//! Idle -> Probing -> Prepared -> Streaming(type) -> Verifying(type) -> Executed(type)
//!                                     ^_______retry_______|
//! Executed(Command) -> Streaming(Data) -> ... -> Executed(Data) -> Done
//! ```

use crate::error::{DfuError, Result};
use crate::payload::Payload;
use crate::protocol::{self, CrcResult, ObjectType, SelectResult};
use crate::transport::Transport;
use std::collections::VecDeque;
use std::time::Duration;

/// Ping attempts before giving up on bootloader responsiveness.
const MAX_PING_ATTEMPTS: u32 = 3;

/// CRC-mismatch retries per object before the session fails.
const MAX_RETRIES: u32 = 3;

/// Default PRN: server-initiated Packet Receipt Notifications disabled,
/// so the client polls CRC itself after each burst.
pub const DEFAULT_PRN: u16 = 0;

/// Emitted after each committed object so the driver can report progress.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub object_type: ObjectType,
    pub bytes_sent: u32,
    pub total_bytes: u32,
}

/// Per-object state mirrored between client and server: the offset and
/// running CRC of bytes accepted for the object currently under
/// construction. Reset on every `Create`, per spec's data model.
#[derive(Debug, Clone, Copy, Default)]
struct ObjectSlot {
    offset: u32,
    crc32: u32,
}

/// Wraps a `Payload` with a small staging buffer so the engine can push
/// back bytes it consumed speculatively (resume-prefix CRC checks) and
/// have them served again on the next `read`, without requiring the
/// underlying `Payload` to support rewinding.
struct StagedPayload<'p> {
    inner: &'p mut dyn Payload,
    staged: VecDeque<u8>,
}

impl<'p> StagedPayload<'p> {
    fn new(inner: &'p mut dyn Payload) -> Self {
        Self {
            inner,
            staged: VecDeque::new(),
        }
    }

    fn len(&self) -> u32 {
        self.inner.len()
    }

    fn push_back(&mut self, bytes: &[u8]) {
        for &b in bytes.iter().rev() {
            self.staged.push_front(b);
        }
    }

    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(max_bytes);
        while out.len() < max_bytes {
            match self.staged.pop_front() {
                Some(b) => out.push(b),
                None => break,
            }
        }
        if out.len() < max_bytes {
            let remaining = max_bytes - out.len();
            out.extend(self.inner.read(remaining)?);
        }
        Ok(out)
    }
}

pub struct DfuEngine<'t, T: Transport> {
    transport: &'t mut T,
    timeout: Duration,
    prn: u16,
    mtu: u16,
    chunk: usize,
}

impl<'t, T: Transport> DfuEngine<'t, T> {
    pub fn new(transport: &'t mut T) -> Self {
        Self {
            transport,
            timeout: crate::transport::DEFAULT_TIMEOUT,
            prn: DEFAULT_PRN,
            mtu: 0,
            chunk: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_prn(mut self, prn: u16) -> Self {
        self.prn = prn;
        self
    }

    /// Drives a complete upgrade: probes the bootloader, streams `init` as
    /// Command objects, then `firmware` as Data objects. Consumes both
    /// payloads exactly once, in order.
    pub fn run(
        &mut self,
        init: &mut dyn Payload,
        firmware: &mut dyn Payload,
        mut progress: impl FnMut(Progress),
    ) -> Result<()> {
        if init.len() == 0 {
            return Err(DfuError::Package("init packet is empty".into()));
        }

        self.probe()?;
        self.send_object_stream(ObjectType::Command, init, &mut progress)?;
        self.send_object_stream(ObjectType::Data, firmware, &mut progress)?;
        Ok(())
    }

    fn request_response(&mut self, bytes: Vec<u8>) -> Result<protocol::Response> {
        self.transport.write_control(&bytes)?;
        self.transport.read_control(self.timeout)
    }

    /// Confirms the bootloader is responsive (up to `MAX_PING_ATTEMPTS`
    /// tries), disables PRN, and negotiates the session MTU / chunk size.
    fn probe(&mut self) -> Result<()> {
        self.ping()?;

        let response = self.request_response(protocol::encode_set_prn(self.prn))?;
        protocol::parse_set_prn(&response)?;

        let (mtu, chunk) = self.transport.negotiate_mtu(self.timeout)?;
        log::debug!("negotiated mtu={} chunk={}", mtu, chunk);
        self.mtu = mtu;
        self.chunk = chunk;
        Ok(())
    }

    fn ping(&mut self) -> Result<()> {
        for attempt in 0..MAX_PING_ATTEMPTS {
            match self.request_response(protocol::encode_ping(attempt as u8)) {
                Ok(response) => {
                    protocol::parse_ping(&response)?;
                    return Ok(());
                }
                Err(DfuError::Timeout) if attempt + 1 < MAX_PING_ATTEMPTS => {
                    log::warn!("ping attempt {} timed out, retrying", attempt + 1);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(DfuError::Timeout)
    }

    fn select(&mut self, object_type: ObjectType) -> Result<SelectResult> {
        let response = self.request_response(protocol::encode_select(object_type))?;
        protocol::parse_select(&response)
    }

    fn create(&mut self, object_type: ObjectType, size: u32) -> Result<()> {
        let response = self.request_response(protocol::encode_create(object_type, size))?;
        protocol::parse_create(&response)
    }

    fn calc_crc(&mut self) -> Result<CrcResult> {
        let response = self.request_response(protocol::encode_calc_crc())?;
        protocol::parse_calc_crc(&response)
    }

    fn execute(&mut self) -> Result<()> {
        let response = self.request_response(protocol::encode_execute())?;
        protocol::parse_execute(&response)
    }

    /// Writes `bytes` to the data channel in `self.chunk`-sized pieces.
    /// All chunks of a burst are pipelined (no per-chunk acknowledgement);
    /// no control request may be issued until every chunk has been handed
    /// to the transport.
    fn burst(&mut self, bytes: &[u8]) -> Result<()> {
        for piece in bytes.chunks(self.chunk.max(1)) {
            self.transport.write_data(piece)?;
        }
        Ok(())
    }

    /// Streams one object type (Command or Data) end to end: selects it,
    /// resumes if the bootloader already has a partial object staged,
    /// then creates/bursts/verifies/executes objects until the payload is
    /// exhausted.
    fn send_object_stream(
        &mut self,
        object_type: ObjectType,
        payload: &mut dyn Payload,
        progress: &mut impl FnMut(Progress),
    ) -> Result<()> {
        let total = payload.len();
        let select = self.select(object_type)?;
        let mut staged = StagedPayload::new(payload);

        let mut object_base = self.resume(object_type, &select, &mut staged, total)?;

        while object_base < total {
            let remaining = total - object_base;
            let object_len = remaining.min(select.max_size);
            let object_bytes = staged.read(object_len as usize)?;
            if object_bytes.len() as u32 != object_len {
                return Err(DfuError::Package(
                    "payload ended before reaching its declared length".into(),
                ));
            }

            self.stream_object_with_retry(object_type, &object_bytes)?;
            object_base += object_len;
            progress(Progress {
                object_type,
                bytes_sent: object_base,
                total_bytes: total,
            });
        }

        Ok(())
    }

    /// Checks whether the bootloader already has a partial object staged
    /// for this type from a prior session, and if the client's CRC over
    /// that prefix matches, skips ahead in the payload cursor instead of
    /// resending it. A mismatch (or a fresh session) pushes any
    /// speculatively-read prefix back into `staged` and starts at 0.
    fn resume(
        &mut self,
        _object_type: ObjectType,
        select: &SelectResult,
        staged: &mut StagedPayload<'_>,
        total: u32,
    ) -> Result<u32> {
        if select.offset == 0 || select.offset > total {
            return Ok(0);
        }

        let prefix = staged.read(select.offset as usize)?;
        if prefix.len() as u32 != select.offset {
            staged.push_back(&prefix);
            return Ok(0);
        }

        let local_crc = crc32fast::hash(&prefix);
        if local_crc == select.crc {
            log::info!("resuming at offset {} (crc matched)", select.offset);
            Ok(select.offset)
        } else {
            log::warn!("resume CRC mismatch, restarting object from 0");
            staged.push_back(&prefix);
            Ok(0)
        }
    }

    /// Runs one Create/burst/CalcCrc/Execute cycle for `object_bytes`,
    /// always re-creating the object before a retry (the conservative
    /// behavior spec.md's Open Question resolves on), and failing with
    /// `CrcMismatch` after `MAX_RETRIES`.
    fn stream_object_with_retry(&mut self, object_type: ObjectType, object_bytes: &[u8]) -> Result<()> {
        let slot = ObjectSlot {
            offset: object_bytes.len() as u32,
            crc32: crc32fast::hash(object_bytes),
        };

        // MAX_RETRIES total attempts are allowed for this object; the
        // bootloader requires a fresh Create before every attempt,
        // including retries (spec's resolved Open Question).
        for attempt in 0..MAX_RETRIES {
            self.create(object_type, object_bytes.len() as u32)?;
            self.burst(object_bytes)?;

            let crc = self.calc_crc()?;
            if crc.offset == slot.offset && crc.crc == slot.crc32 {
                self.execute()?;
                return Ok(());
            }

            if attempt + 1 == MAX_RETRIES {
                return Err(DfuError::CrcMismatch {
                    expected_offset: slot.offset,
                    expected_crc: slot.crc32,
                    actual_offset: crc.offset,
                    actual_crc: crc.crc,
                });
            }

            log::warn!(
                "crc mismatch on attempt {}: expected (offset={}, crc={:08x}), got (offset={}, crc={:08x}); retrying",
                attempt + 1,
                slot.offset,
                slot.crc32,
                crc.offset,
                crc.crc
            );
        }

        unreachable!("loop always returns on success or on the final attempt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::BufferPayload;
    use crate::protocol::Response;
    use std::collections::VecDeque as Deque;

    /// A literal stubbed bootloader: answers each request according to a
    /// scripted sequence, asserting it is only asked for what it expects.
    struct StubTransport {
        script: Deque<StubStep>,
        mtu: u16,
    }

    enum StubStep {
        Response(Response),
        Timeout,
    }

    impl StubTransport {
        fn new(mtu: u16) -> Self {
            Self {
                script: Deque::new(),
                mtu,
            }
        }

        fn expect_response(mut self, response: Response) -> Self {
            self.script.push_back(StubStep::Response(response));
            self
        }

        fn expect_timeout(mut self) -> Self {
            self.script.push_back(StubStep::Timeout);
            self
        }
    }

    fn ok(opcode: u8) -> Response {
        Response {
            opcode,
            result: 0x01,
            payload: vec![],
        }
    }

    fn select_response(max_size: u32, offset: u32, crc: u32) -> Response {
        let mut payload = Vec::new();
        payload.extend_from_slice(&max_size.to_le_bytes());
        payload.extend_from_slice(&offset.to_le_bytes());
        payload.extend_from_slice(&crc.to_le_bytes());
        Response {
            opcode: protocol::Opcode::Select as u8,
            result: 0x01,
            payload,
        }
    }

    fn crc_response(offset: u32, crc: u32) -> Response {
        let mut payload = Vec::new();
        payload.extend_from_slice(&offset.to_le_bytes());
        payload.extend_from_slice(&crc.to_le_bytes());
        Response {
            opcode: protocol::Opcode::CalcCrc as u8,
            result: 0x01,
            payload,
        }
    }

    impl Transport for StubTransport {
        fn write_control(&mut self, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }

        fn read_control(&mut self, _timeout: Duration) -> Result<Response> {
            match self.script.pop_front() {
                Some(StubStep::Response(r)) => Ok(r),
                Some(StubStep::Timeout) => Err(DfuError::Timeout),
                None => panic!("stub transport script exhausted"),
            }
        }

        fn write_data(&mut self, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn negotiate_mtu(&mut self, _timeout: Duration) -> Result<(u16, usize)> {
            Ok((self.mtu, crate::transport::serial_chunk_size(self.mtu)))
        }
    }

    #[test]
    fn happy_path_one_command_two_data_objects() {
        let init = vec![0xAAu8; 120];
        let firmware = vec![0xBBu8; 600];
        let init_crc = crc32fast::hash(&init);
        let first_data_crc = crc32fast::hash(&firmware[0..400]);
        let second_data_crc = crc32fast::hash(&firmware[400..600]);

        let mut transport = StubTransport::new(64)
            .expect_response(ok(protocol::Opcode::Ping as u8))
            .expect_response(ok(protocol::Opcode::SetPrn as u8))
            // Command object
            .expect_response(select_response(256, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(120, init_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8))
            // Data object 1
            .expect_response(select_response(400, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(400, first_data_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8))
            // Data object 2
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(200, second_data_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8));

        let mut init_payload = BufferPayload::new(init);
        let mut fw_payload = BufferPayload::new(firmware);
        let mut engine = DfuEngine::new(&mut transport);
        let mut events = Vec::new();
        engine
            .run(&mut init_payload, &mut fw_payload, |p| events.push(p))
            .unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[2].bytes_sent, 600);
    }

    #[test]
    fn single_crc_mismatch_then_success_retries_same_object() {
        let init = vec![0xAAu8; 10];
        let firmware = vec![0xCCu8; 50];
        let init_crc = crc32fast::hash(&init);
        let fw_crc = crc32fast::hash(&firmware);

        let mut transport = StubTransport::new(64)
            .expect_response(ok(protocol::Opcode::Ping as u8))
            .expect_response(ok(protocol::Opcode::SetPrn as u8))
            .expect_response(select_response(64, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(10, init_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8))
            .expect_response(select_response(64, 0, 0))
            // first attempt: wrong crc
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(50, 0xdead_beef))
            // retry: re-create then succeed
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(50, fw_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8));

        let mut init_payload = BufferPayload::new(init);
        let mut fw_payload = BufferPayload::new(firmware);
        let mut engine = DfuEngine::new(&mut transport);
        engine.run(&mut init_payload, &mut fw_payload, |_| {}).unwrap();
    }

    #[test]
    fn three_consecutive_mismatches_fail_with_no_execute() {
        let init = vec![0xAAu8; 4];
        let firmware = vec![0xDDu8; 20];
        let init_crc = crc32fast::hash(&init);

        let mut transport = StubTransport::new(64)
            .expect_response(ok(protocol::Opcode::Ping as u8))
            .expect_response(ok(protocol::Opcode::SetPrn as u8))
            .expect_response(select_response(64, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(4, init_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8))
            .expect_response(select_response(64, 0, 0));

        for _ in 0..MAX_RETRIES {
            transport = transport
                .expect_response(ok(protocol::Opcode::Create as u8))
                .expect_response(crc_response(20, 0xbad));
        }

        let mut init_payload = BufferPayload::new(init);
        let mut fw_payload = BufferPayload::new(firmware);
        let mut engine = DfuEngine::new(&mut transport);
        let err = engine.run(&mut init_payload, &mut fw_payload, |_| {}).unwrap_err();
        assert!(matches!(err, DfuError::CrcMismatch { .. }));
    }

    #[test]
    fn resume_skips_already_committed_prefix() {
        let init = vec![0xAAu8; 4];
        let firmware = vec![0xEEu8; 560];
        let init_crc = crc32fast::hash(&init);
        let prefix_crc = crc32fast::hash(&firmware[0..160]);
        let object_crc = crc32fast::hash(&firmware[160..560]);

        let mut transport = StubTransport::new(64)
            .expect_response(ok(protocol::Opcode::Ping as u8))
            .expect_response(ok(protocol::Opcode::SetPrn as u8))
            .expect_response(select_response(64, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(4, init_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8))
            // Select reports 160 bytes already staged, matching crc
            .expect_response(select_response(400, 160, prefix_crc))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(400, object_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8));

        let mut init_payload = BufferPayload::new(init);
        let mut fw_payload = BufferPayload::new(firmware);
        let mut engine = DfuEngine::new(&mut transport);
        let mut events = Vec::new();
        engine
            .run(&mut init_payload, &mut fw_payload, |p| events.push(p))
            .unwrap();
        assert_eq!(events.last().unwrap().bytes_sent, 560);
    }

    #[test]
    fn opcode_mismatch_aborts_with_protocol_desync() {
        let init = vec![0xAAu8; 4];
        let firmware = vec![0xEEu8; 10];
        let init_crc = crc32fast::hash(&init);

        let mut transport = StubTransport::new(64)
            .expect_response(ok(protocol::Opcode::Ping as u8))
            .expect_response(ok(protocol::Opcode::SetPrn as u8))
            .expect_response(select_response(64, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(4, init_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8))
            .expect_response(select_response(64, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            // CalcCrc response echoes the wrong opcode (Execute's).
            .expect_response(ok(protocol::Opcode::Execute as u8));

        let mut init_payload = BufferPayload::new(init);
        let mut fw_payload = BufferPayload::new(firmware);
        let mut engine = DfuEngine::new(&mut transport);
        let err = engine.run(&mut init_payload, &mut fw_payload, |_| {}).unwrap_err();
        assert!(matches!(err, DfuError::ProtocolDesync { .. }));
    }

    #[test]
    fn ping_timeout_then_success_proceeds() {
        let init = vec![0xAAu8; 4];
        let firmware = vec![0xEEu8; 4];
        let init_crc = crc32fast::hash(&init);
        let fw_crc = crc32fast::hash(&firmware);

        let mut transport = StubTransport::new(64)
            .expect_timeout()
            .expect_response(ok(protocol::Opcode::Ping as u8))
            .expect_response(ok(protocol::Opcode::SetPrn as u8))
            .expect_response(select_response(64, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(4, init_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8))
            .expect_response(select_response(64, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(4, fw_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8));

        let mut init_payload = BufferPayload::new(init);
        let mut fw_payload = BufferPayload::new(firmware);
        let mut engine = DfuEngine::new(&mut transport);
        engine.run(&mut init_payload, &mut fw_payload, |_| {}).unwrap();
    }

    #[test]
    fn boundary_payload_equal_to_max_size_makes_one_object() {
        let init = vec![0xAAu8; 4];
        let firmware = vec![0x11u8; 256];
        let init_crc = crc32fast::hash(&init);
        let fw_crc = crc32fast::hash(&firmware);

        let mut transport = StubTransport::new(64)
            .expect_response(ok(protocol::Opcode::Ping as u8))
            .expect_response(ok(protocol::Opcode::SetPrn as u8))
            .expect_response(select_response(64, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(4, init_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8))
            .expect_response(select_response(256, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(256, fw_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8));

        let mut init_payload = BufferPayload::new(init);
        let mut fw_payload = BufferPayload::new(firmware);
        let mut engine = DfuEngine::new(&mut transport);
        let mut events = Vec::new();
        engine
            .run(&mut init_payload, &mut fw_payload, |p| events.push(p))
            .unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn boundary_payload_one_byte_over_max_size_makes_two_objects() {
        let init = vec![0xAAu8; 4];
        let firmware = vec![0x22u8; 257]; // max_size + 1
        let init_crc = crc32fast::hash(&init);
        let first_crc = crc32fast::hash(&firmware[0..256]);
        let second_crc = crc32fast::hash(&firmware[256..257]);

        let mut transport = StubTransport::new(64)
            .expect_response(ok(protocol::Opcode::Ping as u8))
            .expect_response(ok(protocol::Opcode::SetPrn as u8))
            .expect_response(select_response(64, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(4, init_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8))
            .expect_response(select_response(256, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(256, first_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(1, second_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8));

        let mut init_payload = BufferPayload::new(init);
        let mut fw_payload = BufferPayload::new(firmware);
        let mut engine = DfuEngine::new(&mut transport);
        let mut events = Vec::new();
        engine
            .run(&mut init_payload, &mut fw_payload, |p| events.push(p))
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].bytes_sent, 256);
        assert_eq!(events[1].bytes_sent, 257);
    }

    #[test]
    fn slow_path_with_chunk_size_one_still_transfers() {
        let init = vec![0xAAu8; 2];
        let firmware = vec![0x33u8; 3];
        let init_crc = crc32fast::hash(&init);
        let fw_crc = crc32fast::hash(&firmware);

        // mtu=2 drives serial_chunk_size down to its floor of 1 byte per
        // data-channel write.
        let mut transport = StubTransport::new(2)
            .expect_response(ok(protocol::Opcode::Ping as u8))
            .expect_response(ok(protocol::Opcode::SetPrn as u8))
            .expect_response(select_response(64, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(2, init_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8))
            .expect_response(select_response(64, 0, 0))
            .expect_response(ok(protocol::Opcode::Create as u8))
            .expect_response(crc_response(3, fw_crc))
            .expect_response(ok(protocol::Opcode::Execute as u8));

        let mut init_payload = BufferPayload::new(init);
        let mut fw_payload = BufferPayload::new(firmware);
        let mut engine = DfuEngine::new(&mut transport);
        engine.run(&mut init_payload, &mut fw_payload, |_| {}).unwrap();
    }

    #[test]
    fn zero_length_init_is_rejected() {
        let mut transport = StubTransport::new(64);
        let mut init_payload = BufferPayload::new(Vec::new());
        let mut fw_payload = BufferPayload::new(vec![1, 2, 3]);
        let mut engine = DfuEngine::new(&mut transport);
        let err = engine.run(&mut init_payload, &mut fw_payload, |_| {}).unwrap_err();
        assert!(matches!(err, DfuError::Package(_)));
    }
}
