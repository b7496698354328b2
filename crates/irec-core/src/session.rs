//! Device session and upload protocol engine.
//!
//! A [`Session`] owns one opened device and drives the bootloader's
//! control-transfer protocol over it: short textual commands, status
//! polling, chunked image uploads with a per-chunk handshake, the
//! asynchronous output stream, and the identity/environment queries.
//!
//! The protocol is timing-sensitive and entirely synchronous; every
//! operation blocks until its transfers complete or time out. A session
//! is not safe for concurrent use from multiple threads.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::hooks::{ReceiveSink, SendFilter};
use crate::protocol::{
    BULK_IN_ENDPOINT, CHUNK_SIZE, COMMAND_TIMEOUT, DRAIN_POLLS, ECID_DESCRIPTOR_INDEX,
    ENV_BUFFER_SIZE, ENV_TIMEOUT, MAX_COMMAND_LEN, Mode, RECEIVE_BUFFER_SIZE, RECEIVE_TIMEOUT,
    REQUEST_COMMAND, REQUEST_STATUS, REQUEST_TYPE_COMMAND, REQUEST_TYPE_ENV, REQUEST_TYPE_STATUS,
    REQUEST_TYPE_UPLOAD, REQUEST_UPLOAD, STATUS_BYTE_INDEX, STATUS_LEN, STATUS_READY,
    STATUS_TIMEOUT, UPLOAD_TIMEOUT,
};
use crate::transport::{NusbTransport, UsbTransport};

/// One session with a device in a recognized bootloader mode.
pub struct Session<T: UsbTransport> {
    transport: T,
    mode: Mode,
    /// Last configuration value successfully applied.
    config: Option<u8>,
    /// Claimed (interface, alt setting), if any.
    claimed: Option<(u8, u8)>,
    debug_level: u8,
    filter: Option<Box<dyn SendFilter>>,
    sink: Option<Box<dyn ReceiveSink>>,
    closed: bool,
}

impl Session<NusbTransport> {
    /// Scan the bus for a device in a recognized mode and open a session
    /// on the first match.
    pub fn discover() -> Result<Self, Error> {
        let (transport, mode) =
            NusbTransport::open_first().map_err(|_| Error::UnableToConnect)?;
        Self::open(transport, mode)
    }
}

impl<T: UsbTransport> Session<T> {
    /// Open a session over a caller-constructed transport. Applies USB
    /// configuration 1, which the protocol requires before any other
    /// traffic.
    pub fn open(transport: T, mode: Mode) -> Result<Self, Error> {
        let mut session = Session {
            transport,
            mode,
            config: None,
            claimed: None,
            debug_level: 0,
            filter: None,
            sink: None,
            closed: false,
        };
        session.set_configuration(1)?;
        info!(mode = %session.mode, "session opened");
        Ok(session)
    }

    /// The bootloader mode captured at open time.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Last configuration value applied, if any.
    pub fn config(&self) -> Option<u8> {
        self.config
    }

    /// Currently claimed (interface, alt setting), if any.
    pub fn interface(&self) -> Option<(u8, u8)> {
        self.claimed
    }

    pub fn debug_level(&self) -> u8 {
        self.debug_level
    }

    /// Install the outbound command filter.
    pub fn set_sender<F: SendFilter + 'static>(&mut self, filter: F) {
        self.filter = Some(Box::new(filter));
    }

    /// Install the inbound output sink.
    pub fn set_receiver<S: ReceiveSink + 'static>(&mut self, sink: S) {
        self.sink = Some(Box::new(sink));
    }

    /// Forward a verbosity level to the transport and keep it for local
    /// log gating.
    pub fn set_debug(&mut self, level: u8) {
        self.transport.set_debug(level);
        self.debug_level = level;
    }

    /// Request a transport-level device reset.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.transport.reset().map_err(|_| Error::Unknown)
    }

    /// Close the session, releasing the claimed interface and the device
    /// handle. Dropping the session does the same; a second release is
    /// unrepresentable.
    pub fn close(self) {}

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some((interface, _)) = self.claimed.take() {
            if let Err(e) = self.transport.release_interface(interface) {
                warn!(interface, error = %e, "failed to release interface");
            }
        }
    }

    // ------------------------------------------------------------------
    // Configuration negotiation
    // ------------------------------------------------------------------

    /// Ensure the device's active configuration matches `value`. Reads
    /// the current configuration first; a matching value issues no
    /// transfer, since a redundant SET_CONFIGURATION behaves like a
    /// lightweight reset on this bootloader.
    pub fn set_configuration(&mut self, value: u8) -> Result<(), Error> {
        let current = self.transport.active_configuration().ok();
        if current != Some(value) {
            debug!(configuration = value, "setting configuration");
            self.transport
                .set_configuration(value)
                .map_err(|_| Error::UsbConfiguration)?;
        }
        self.config = Some(value);
        Ok(())
    }

    /// Claim `interface` and select `alt`. A session claims each
    /// interface number at most once; if `interface` is already claimed
    /// this is a no-op, even when the alt setting differs (kept from the
    /// original protocol behavior).
    pub fn set_interface(&mut self, interface: u8, alt: u8) -> Result<(), Error> {
        if let Some((claimed, _)) = self.claimed {
            if claimed == interface {
                return Ok(());
            }
        }

        debug!(interface, alt, "claiming interface");
        self.transport
            .claim_interface(interface)
            .map_err(|_| Error::UsbInterface)?;
        self.transport
            .set_alt_setting(interface, alt)
            .map_err(|_| Error::UsbInterface)?;
        self.claimed = Some((interface, alt));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Command channel
    // ------------------------------------------------------------------

    /// Send one command to the device. Commands longer than 255 bytes
    /// are silently truncated; an empty command is a silent no-op. One
    /// terminator byte is transferred after the command text.
    pub fn send_command(&mut self, command: &[u8]) -> Result<(), Error> {
        self.set_interface(1, 1)?;

        let length = command.len().min(MAX_COMMAND_LEN);
        if length == 0 {
            return Ok(());
        }

        let mut wire = Vec::with_capacity(length + 1);
        wire.extend_from_slice(&command[..length]);
        wire.push(0);

        debug!(bytes = length, "sending command");
        // Commands that reboot the device never complete their status
        // stage, so the transfer result carries no information.
        let _ = self.transport.control_out(
            REQUEST_TYPE_COMMAND,
            REQUEST_COMMAND,
            0,
            0,
            &wire,
            COMMAND_TIMEOUT,
        );
        Ok(())
    }

    /// Send a command through the outbound filter, if one is installed.
    /// The filter sees the capped command and returns how many of its
    /// leading bytes to send; 0 aborts the send without error.
    pub fn send(&mut self, command: &[u8]) -> Result<(), Error> {
        let mut length = command.len().min(MAX_COMMAND_LEN);
        if let Some(filter) = self.filter.as_mut() {
            length = filter.filter(&command[..length]).min(length);
        }
        if length > 0 {
            self.send_command(&command[..length])?;
        }
        Ok(())
    }

    /// Read the file at `path` and upload it through the upload engine.
    pub fn send_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        let buffer = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => Error::FileNotFound,
            io::ErrorKind::OutOfMemory => Error::OutOfMemory,
            _ => Error::Unknown,
        })?;
        info!(path = %path.display(), bytes = buffer.len(), "loaded image");
        self.send_buffer(&buffer)
    }

    // ------------------------------------------------------------------
    // Status oracle
    // ------------------------------------------------------------------

    /// Fetch the device's 6-byte status block and return the status
    /// byte. Anything other than an exactly 6-byte response is
    /// [`Error::UsbStatus`].
    pub fn get_status(&mut self) -> Result<u8, Error> {
        self.set_interface(1, 1)?;

        let block = self
            .transport
            .control_in(
                REQUEST_TYPE_STATUS,
                REQUEST_STATUS,
                0,
                0,
                STATUS_LEN,
                STATUS_TIMEOUT,
            )
            .map_err(|_| Error::UsbStatus)?;
        if block.len() != STATUS_LEN {
            return Err(Error::UsbStatus);
        }

        let status = block[STATUS_BYTE_INDEX];
        debug!(status, "status");
        Ok(status)
    }

    // ------------------------------------------------------------------
    // Upload engine
    // ------------------------------------------------------------------

    /// Upload `buffer` in 0x800-byte chunks. The device acknowledges
    /// each chunk only through the status oracle: after every chunk the
    /// status must read 5 before the next chunk may be sent. A
    /// zero-length transfer terminates the upload, followed by three
    /// status polls whose values are not validated (drain, not a
    /// correctness check).
    pub fn send_buffer(&mut self, buffer: &[u8]) -> Result<(), Error> {
        self.set_interface(1, 1)?;

        let total = buffer.len().div_ceil(CHUNK_SIZE);
        for (i, chunk) in buffer.chunks(CHUNK_SIZE).enumerate() {
            let sent = self
                .transport
                .control_out(
                    REQUEST_TYPE_UPLOAD,
                    REQUEST_UPLOAD,
                    0,
                    0,
                    chunk,
                    UPLOAD_TIMEOUT,
                )
                .map_err(|_| Error::UsbUpload)?;
            if sent != chunk.len() {
                return Err(Error::UsbUpload);
            }
            debug!(chunk = i + 1, total, bytes = sent, "sent chunk");

            let status = self.get_status()?;
            if status != STATUS_READY {
                warn!(status, "device refused chunk");
                return Err(Error::UsbUpload);
            }
        }

        self.transport
            .control_out(REQUEST_TYPE_UPLOAD, REQUEST_UPLOAD, 0, 0, &[], UPLOAD_TIMEOUT)
            .map_err(|_| Error::UsbUpload)?;

        for _ in 0..DRAIN_POLLS {
            self.get_status()?;
        }

        info!(bytes = buffer.len(), chunks = total, "upload complete");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Receive loop
    // ------------------------------------------------------------------

    /// Poll the bulk IN endpoint and feed non-empty payloads to the
    /// installed sink until the stream ends. A zero-byte read or any
    /// bulk transfer error ends the stream (success); a sink consuming
    /// fewer bytes than offered aborts with [`Error::Unknown`].
    pub fn receive(&mut self) -> Result<(), Error> {
        self.set_interface(1, 1)?;

        loop {
            let data = match self.transport.bulk_in(
                BULK_IN_ENDPOINT,
                RECEIVE_BUFFER_SIZE,
                RECEIVE_TIMEOUT,
            ) {
                Ok(data) if data.is_empty() => break,
                Ok(data) => data,
                Err(_) => break,
            };

            if let Some(sink) = self.sink.as_mut() {
                if sink.receive(&data) != data.len() {
                    return Err(Error::Unknown);
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Identity / environment
    // ------------------------------------------------------------------

    /// Fetch the device environment variable buffer. The returned buffer
    /// is always [`ENV_BUFFER_SIZE`] bytes; ownership moves to the
    /// caller.
    pub fn get_env(&mut self) -> Result<Vec<u8>, Error> {
        self.set_interface(1, 1)?;

        let mut buffer = self
            .transport
            .control_in(
                REQUEST_TYPE_ENV,
                REQUEST_COMMAND,
                0,
                0,
                ENV_BUFFER_SIZE,
                ENV_TIMEOUT,
            )
            .map_err(|_| Error::Unknown)?;
        buffer.resize(ENV_BUFFER_SIZE, 0);
        Ok(buffer)
    }

    /// Read the device's unique chip identifier out of string descriptor
    /// index 3, which carries an `ECID:<hex>` field among other text.
    /// Resets the device afterwards; the bootloader expects the reset
    /// following this query.
    pub fn get_ecid(&mut self) -> Result<u64, Error> {
        let info = self
            .transport
            .string_descriptor_ascii(ECID_DESCRIPTOR_INDEX)
            .map_err(|_| Error::Unknown)?;
        debug!(len = info.len(), descriptor = %info, "serial descriptor");

        let (_, tail) = info.split_once("ECID:").ok_or(Error::Unknown)?;
        let end = tail
            .as_bytes()
            .iter()
            .position(|b| !b.is_ascii_hexdigit())
            .unwrap_or(tail.len());
        let ecid = u64::from_str_radix(&tail[..end], 16).map_err(|_| Error::Unknown)?;

        if let Err(e) = self.reset() {
            warn!(error = %e, "post-query reset failed");
        }
        Ok(ecid)
    }
}

impl<T: UsbTransport> Drop for Session<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RECOVERY_MODE_2_PID;
    use crate::transport::mock::{MockCall, MockTransport};
    use std::sync::{Arc, Mutex};

    fn open_session(mock: &MockTransport) -> Session<&MockTransport> {
        let mode = Mode::from_product_id(mock.product_id()).expect("recognized pid");
        let session = Session::open(mock, mode).expect("open");
        mock.clear_calls();
        session
    }

    fn transfers(mock: &MockTransport) -> Vec<MockCall> {
        mock.calls()
            .into_iter()
            .filter(|call| {
                matches!(call, MockCall::ControlOut { .. } | MockCall::ControlIn { .. })
            })
            .collect()
    }

    #[test]
    fn test_open_tags_mode_and_sets_configuration() {
        let mock = MockTransport::with_ids(0x05AC, RECOVERY_MODE_2_PID);
        let mode = Mode::from_product_id(mock.product_id()).unwrap();
        let session = Session::open(&mock, mode).unwrap();

        assert_eq!(session.mode(), Mode::Recovery2);
        assert_eq!(session.config(), Some(1));
        assert_eq!(
            mock.calls(),
            vec![MockCall::GetConfiguration, MockCall::SetConfiguration(1)]
        );
    }

    #[test]
    fn test_matching_configuration_is_not_reapplied() {
        let mock = MockTransport::new();
        mock.set_active_configuration(1);
        let session = Session::open(&mock, Mode::Recovery2).unwrap();

        assert_eq!(session.config(), Some(1));
        // Only the read went out; no redundant SET_CONFIGURATION.
        assert_eq!(mock.calls(), vec![MockCall::GetConfiguration]);
    }

    #[test]
    fn test_open_surfaces_configuration_failure() {
        let mock = MockTransport::new();
        mock.fail_set_configuration(true);
        let err = Session::open(&mock, Mode::Dfu).err().unwrap();
        assert_eq!(err, Error::UsbConfiguration);
    }

    #[test]
    fn test_first_command_claims_interface_1_alt_1() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        session.send_command(b"printenv").unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0], MockCall::ClaimInterface(1));
        assert_eq!(calls[1], MockCall::SetAltSetting { interface: 1, alt: 1 });
        assert_eq!(session.interface(), Some((1, 1)));

        // Second command: interface already claimed, no renegotiation.
        mock.clear_calls();
        session.send_command(b"printenv").unwrap();
        assert!(
            !mock
                .calls()
                .iter()
                .any(|c| matches!(c, MockCall::ClaimInterface(_)))
        );
    }

    #[test]
    fn test_claim_failure_is_usb_interface() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);
        mock.fail_claim(true);
        assert_eq!(session.send_command(b"go"), Err(Error::UsbInterface));
    }

    #[test]
    fn test_alt_setting_failure_is_usb_interface() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);
        mock.fail_alt_setting(true);
        assert_eq!(session.get_status(), Err(Error::UsbInterface));
    }

    #[test]
    fn test_command_carries_terminator() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        session.send_command(b"setenv auto-boot true").unwrap();

        let outs = mock.control_outs();
        assert_eq!(outs.len(), 1);
        let (request_type, request, data) = &outs[0];
        assert_eq!((*request_type, *request), (0x40, 0));
        assert_eq!(data.as_slice(), b"setenv auto-boot true\0");
    }

    #[test]
    fn test_long_command_is_truncated_to_255() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        let long = vec![b'x'; 300];
        session.send_command(&long).unwrap();

        let outs = mock.control_outs();
        assert_eq!(outs[0].2.len(), 256); // 255 bytes + terminator
        assert_eq!(outs[0].2[255], 0);
        assert!(outs[0].2[..255].iter().all(|&b| b == b'x'));
    }

    #[test]
    fn test_empty_command_is_a_no_op() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        session.send_command(b"").unwrap();
        assert!(mock.control_outs().is_empty());
    }

    #[test]
    fn test_filter_can_abort_send() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);
        session.set_sender(|_cmd: &[u8]| 0usize);

        session.send(b"reboot").unwrap();
        assert!(mock.control_outs().is_empty());
    }

    #[test]
    fn test_filter_can_shorten_send() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);
        session.set_sender(|_cmd: &[u8]| 5usize);

        session.send(b"printenv").unwrap();

        let outs = mock.control_outs();
        assert_eq!(outs[0].2.as_slice(), b"print\0");
    }

    #[test]
    fn test_send_without_filter_passes_through() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        session.send(b"go").unwrap();
        assert_eq!(mock.control_outs()[0].2.as_slice(), b"go\0");
    }

    #[test]
    fn test_status_byte_is_index_4() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        mock.queue_control_in(&[9, 9, 9, 9, 42, 9]);
        assert_eq!(session.get_status().unwrap(), 42);
    }

    #[test]
    fn test_short_status_block_is_usb_status() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        mock.queue_control_in(&[0, 0, 0, 0, 5]);
        assert_eq!(session.get_status(), Err(Error::UsbStatus));
    }

    #[test]
    fn test_upload_5000_bytes_interleaves_chunks_and_polls() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        for _ in 0..3 {
            mock.queue_status(STATUS_READY);
        }
        for _ in 0..DRAIN_POLLS {
            mock.queue_status(0); // drain values are not validated
        }

        let buffer = vec![0xAB; 5000];
        session.send_buffer(&buffer).unwrap();

        let seq = transfers(&mock);
        assert_eq!(seq.len(), 10); // 3 chunks + 3 polls + terminator + 3 drains

        let chunk_sizes: Vec<usize> = seq
            .iter()
            .filter_map(|call| match call {
                MockCall::ControlOut { request, data, .. } if *request == 1 => Some(data.len()),
                _ => None,
            })
            .collect();
        assert_eq!(chunk_sizes, vec![2048, 2048, 904, 0]);

        // Strict interleave: chunk, poll, chunk, poll, chunk, poll,
        // terminator, then the three drain polls.
        for (i, call) in seq.iter().enumerate() {
            match (i, call) {
                (0 | 2 | 4 | 6, MockCall::ControlOut { request_type, .. }) => {
                    assert_eq!(*request_type, 0x21)
                }
                (1 | 3 | 5 | 7 | 8 | 9, MockCall::ControlIn { request_type, .. }) => {
                    assert_eq!(*request_type, 0xA1)
                }
                _ => panic!("unexpected transfer at {i}: {call:?}"),
            }
        }
    }

    #[test]
    fn test_upload_exact_multiple_has_no_short_chunk() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        for _ in 0..2 + DRAIN_POLLS {
            mock.queue_status(STATUS_READY);
        }

        session.send_buffer(&vec![0u8; 4096]).unwrap();

        let chunk_sizes: Vec<usize> = mock
            .control_outs()
            .iter()
            .map(|(_, _, data)| data.len())
            .collect();
        assert_eq!(chunk_sizes, vec![2048, 2048, 0]);
    }

    #[test]
    fn test_upload_empty_buffer_still_terminates_and_drains() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        for _ in 0..DRAIN_POLLS {
            mock.queue_status(STATUS_READY);
        }

        session.send_buffer(&[]).unwrap();

        let seq = transfers(&mock);
        assert_eq!(seq.len(), 1 + DRAIN_POLLS);
        assert!(matches!(&seq[0], MockCall::ControlOut { data, .. } if data.is_empty()));
    }

    #[test]
    fn test_upload_aborts_on_not_ready_status() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        mock.queue_status(STATUS_READY);
        mock.queue_status(4); // device refuses the second chunk

        let err = session.send_buffer(&vec![0u8; 5000]).unwrap_err();
        assert_eq!(err, Error::UsbUpload);

        // Two chunks went out, nothing after the refusal.
        let outs = mock.control_outs();
        assert_eq!(outs.len(), 2);
        assert_eq!(outs[1].2.len(), 2048);
    }

    #[test]
    fn test_upload_aborts_on_short_chunk_write() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        mock.queue_control_out_result(Ok(100));

        let err = session.send_buffer(&vec![0u8; 3000]).unwrap_err();
        assert_eq!(err, Error::UsbUpload);

        // No status poll follows a failed chunk.
        assert_eq!(transfers(&mock).len(), 1);
    }

    #[test]
    fn test_upload_propagates_drain_poll_failure() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        mock.queue_status(STATUS_READY);
        mock.queue_status(0);
        // Second and third drain polls left unscripted: the mock times out.

        let err = session.send_buffer(&vec![0u8; 2048]).unwrap_err();
        assert_eq!(err, Error::UsbStatus);
    }

    #[test]
    fn test_receive_feeds_sink_until_quiet() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        session.set_receiver(move |data: &[u8]| {
            sink_seen.lock().unwrap().extend_from_slice(data);
            data.len()
        });

        mock.queue_bulk_in(b"Apple Mobile Device\n");
        mock.queue_bulk_in(b"=> ");
        // Queue exhausted: next poll times out and ends the stream.

        session.receive().unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), b"Apple Mobile Device\n=> ");

        let bulk: Vec<_> = mock
            .calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::BulkIn { .. }))
            .collect();
        assert_eq!(bulk.len(), 3);
        assert!(
            bulk.iter()
                .all(|c| *c == MockCall::BulkIn { endpoint: 0x81, max_len: 0x1000 })
        );
    }

    #[test]
    fn test_receive_ends_on_zero_length_read() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        mock.queue_bulk_in(&[]);
        mock.queue_bulk_in(b"late");

        session.receive().unwrap();

        // Stream ended at the empty read; the second payload stays queued.
        let bulk_count = mock
            .calls()
            .iter()
            .filter(|c| matches!(c, MockCall::BulkIn { .. }))
            .count();
        assert_eq!(bulk_count, 1);
    }

    #[test]
    fn test_receive_aborts_on_sink_length_mismatch() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);
        session.set_receiver(|data: &[u8]| data.len() - 1);

        mock.queue_bulk_in(b"output");
        assert_eq!(session.receive(), Err(Error::Unknown));
    }

    #[test]
    fn test_get_env_requests_and_returns_256_bytes() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        mock.queue_control_in(b"auto-boot=false");
        let env = session.get_env().unwrap();
        assert_eq!(env.len(), 256);
        assert!(env.starts_with(b"auto-boot=false"));

        let ins: Vec<_> = mock
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::ControlIn { request_type, request, length, .. } => {
                    Some((request_type, request, length))
                }
                _ => None,
            })
            .collect();
        assert_eq!(ins, vec![(0xC0, 0, 256)]);
    }

    #[test]
    fn test_get_ecid_parses_hex_and_resets() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        mock.set_string_descriptor(
            3,
            "Apple Mobile Device (Recovery Mode) CPID:8920 ECID:000012AB34CD56EF IBFL:03",
        );

        assert_eq!(session.get_ecid().unwrap(), 0x000012AB34CD56EF);
        assert_eq!(mock.reset_count(), 1);
    }

    #[test]
    fn test_get_ecid_without_marker_is_unknown() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);

        mock.set_string_descriptor(3, "Apple Mobile Device (Recovery Mode)");

        assert_eq!(session.get_ecid(), Err(Error::Unknown));
        assert_eq!(mock.reset_count(), 0);
    }

    #[test]
    fn test_close_releases_claimed_interface_once() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);
        session.send_command(b"printenv").unwrap();

        session.close();
        assert_eq!(mock.released(), vec![1]);
    }

    #[test]
    fn test_drop_without_claim_releases_nothing() {
        let mock = MockTransport::new();
        let session = open_session(&mock);
        drop(session);
        assert!(mock.released().is_empty());
    }

    #[test]
    fn test_reset_is_forwarded() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);
        session.reset().unwrap();
        assert_eq!(mock.reset_count(), 1);
    }

    #[test]
    fn test_set_debug_is_stored_and_forwarded() {
        let mock = MockTransport::new();
        let mut session = open_session(&mock);
        session.set_debug(3);
        assert_eq!(session.debug_level(), 3);
        assert!(mock.calls().contains(&MockCall::SetDebug(3)));
    }
}
