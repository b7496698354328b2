//! Mock USB transport for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::{TransportError, UsbTransport};
use crate::protocol::{APPLE_VENDOR_ID, RECOVERY_MODE_2_PID, STATUS_BYTE_INDEX, STATUS_LEN};

/// One recorded call against the mock, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ControlOut {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: Vec<u8>,
    },
    ControlIn {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    },
    BulkIn {
        endpoint: u8,
        max_len: usize,
    },
    GetConfiguration,
    SetConfiguration(u8),
    ClaimInterface(u8),
    ReleaseInterface(u8),
    SetAltSetting {
        interface: u8,
        alt: u8,
    },
    Reset,
    SetDebug(u8),
}

#[derive(Default)]
struct MockInner {
    /// Scripted replies for control IN transfers, popped in order.
    control_in_queue: VecDeque<Result<Vec<u8>, TransportError>>,
    /// Scripted outcomes for control OUT transfers; empty means echo the
    /// full length back.
    control_out_queue: VecDeque<Result<usize, TransportError>>,
    /// Scripted replies for bulk IN reads, popped in order.
    bulk_queue: VecDeque<Result<Vec<u8>, TransportError>>,
    /// Everything the session did, in order.
    calls: Vec<MockCall>,
    /// Device-side active configuration, as `GET_CONFIGURATION` reports it.
    active_config: Option<u8>,
    string_descriptors: HashMap<u8, String>,
    fail_claim: bool,
    fail_alt_setting: bool,
    fail_set_configuration: bool,
    reset_count: usize,
}

/// Scripted transport for unit testing the session engine.
pub struct MockTransport {
    inner: Mutex<MockInner>,
    vid: u16,
    pid: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_ids(APPLE_VENDOR_ID, RECOVERY_MODE_2_PID)
    }

    pub fn with_ids(vid: u16, pid: u16) -> Self {
        Self {
            inner: Mutex::new(MockInner::default()),
            vid,
            pid,
        }
    }

    /// Queue a raw control IN reply.
    pub fn queue_control_in(&self, data: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .control_in_queue
            .push_back(Ok(data.to_vec()));
    }

    /// Queue a control IN failure.
    pub fn fail_control_in(&self, error: TransportError) {
        self.inner
            .lock()
            .unwrap()
            .control_in_queue
            .push_back(Err(error));
    }

    /// Queue a well-formed 6-byte status block carrying `status`.
    pub fn queue_status(&self, status: u8) {
        let mut block = [0u8; STATUS_LEN];
        block[STATUS_BYTE_INDEX] = status;
        self.queue_control_in(&block);
    }

    /// Queue an explicit control OUT outcome (short write or failure).
    pub fn queue_control_out_result(&self, result: Result<usize, TransportError>) {
        self.inner
            .lock()
            .unwrap()
            .control_out_queue
            .push_back(result);
    }

    /// Queue a bulk IN payload.
    pub fn queue_bulk_in(&self, data: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .bulk_queue
            .push_back(Ok(data.to_vec()));
    }

    /// Queue a bulk IN failure.
    pub fn fail_bulk_in(&self, error: TransportError) {
        self.inner.lock().unwrap().bulk_queue.push_back(Err(error));
    }

    pub fn set_active_configuration(&self, value: u8) {
        self.inner.lock().unwrap().active_config = Some(value);
    }

    pub fn set_string_descriptor(&self, index: u8, value: &str) {
        self.inner
            .lock()
            .unwrap()
            .string_descriptors
            .insert(index, value.to_string());
    }

    pub fn fail_claim(&self, fail: bool) {
        self.inner.lock().unwrap().fail_claim = fail;
    }

    pub fn fail_alt_setting(&self, fail: bool) {
        self.inner.lock().unwrap().fail_alt_setting = fail;
    }

    pub fn fail_set_configuration(&self, fail: bool) {
        self.inner.lock().unwrap().fail_set_configuration = fail;
    }

    /// All recorded calls so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn reset_count(&self) -> usize {
        self.inner.lock().unwrap().reset_count
    }

    /// Interfaces released, in order.
    pub fn released(&self) -> Vec<u8> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::ReleaseInterface(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Recorded control OUT transfers only, in order.
    pub fn control_outs(&self) -> Vec<(u8, u8, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::ControlOut {
                    request_type,
                    request,
                    data,
                    ..
                } => Some((request_type, request, data)),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn control_out(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall::ControlOut {
            request_type,
            request,
            value,
            index,
            data: data.to_vec(),
        });
        match inner.control_out_queue.pop_front() {
            Some(result) => result,
            None => Ok(data.len()),
        }
    }

    fn control_in(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall::ControlIn {
            request_type,
            request,
            value,
            index,
            length,
        });
        match inner.control_in_queue.pop_front() {
            Some(Ok(mut data)) => {
                data.truncate(length);
                Ok(data)
            }
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Timeout { timeout_ms: 1000 }),
        }
    }

    fn bulk_in(
        &self,
        endpoint: u8,
        max_len: usize,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall::BulkIn { endpoint, max_len });
        match inner.bulk_queue.pop_front() {
            Some(Ok(mut data)) => {
                data.truncate(max_len);
                Ok(data)
            }
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Timeout { timeout_ms: 100 }),
        }
    }

    fn active_configuration(&self) -> Result<u8, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall::GetConfiguration);
        inner
            .active_config
            .ok_or_else(|| TransportError::ConfigurationFailed("unconfigured".into()))
    }

    fn set_configuration(&self, value: u8) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall::SetConfiguration(value));
        if inner.fail_set_configuration {
            return Err(TransportError::ConfigurationFailed("scripted failure".into()));
        }
        inner.active_config = Some(value);
        Ok(())
    }

    fn claim_interface(&self, interface: u8) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall::ClaimInterface(interface));
        if inner.fail_claim {
            return Err(TransportError::ClaimInterfaceFailed {
                interface,
                message: "scripted failure".into(),
            });
        }
        Ok(())
    }

    fn release_interface(&self, interface: u8) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall::ReleaseInterface(interface));
        Ok(())
    }

    fn set_alt_setting(&self, interface: u8, alt: u8) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall::SetAltSetting { interface, alt });
        if inner.fail_alt_setting {
            return Err(TransportError::ClaimInterfaceFailed {
                interface,
                message: "scripted failure".into(),
            });
        }
        Ok(())
    }

    fn reset(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(MockCall::Reset);
        inner.reset_count += 1;
        Ok(())
    }

    fn string_descriptor_ascii(&self, index: u8) -> Result<String, TransportError> {
        let inner = self.inner.lock().unwrap();
        inner
            .string_descriptors
            .get(&index)
            .cloned()
            .ok_or_else(|| TransportError::DescriptorFailed(format!("no descriptor {index}")))
    }

    fn set_debug(&self, level: u8) {
        self.inner.lock().unwrap().calls.push(MockCall::SetDebug(level));
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
