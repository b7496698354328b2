//! USB transport layer abstraction.
//!
//! Defines the `UsbTransport` trait over an already-opened device,
//! allowing different implementations (nusb, mock, etc.). The session
//! core only ever talks to this trait; all bus-level details live
//! behind it.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("device not found: VID={vid:04X}")]
    DeviceNotFound { vid: u16 },

    #[error("failed to open device: {0}")]
    OpenFailed(String),

    #[error("failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("no claimed interface for an interface-recipient transfer")]
    NoInterface,

    #[error("unsupported bmRequestType {0:#04X}")]
    UnsupportedRequestType(u8),

    #[error("control transfer failed: {0}")]
    ControlFailed(String),

    #[error("bulk read failed: {0}")]
    BulkFailed(String),

    #[error("configuration access failed: {0}")]
    ConfigurationFailed(String),

    #[error("descriptor read failed: {0}")]
    DescriptorFailed(String),

    #[error("device reset failed: {0}")]
    ResetFailed(String),

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("device disconnected")]
    Disconnected,
}

/// Abstract interface to one opened USB device.
///
/// `request_type` parameters carry the raw USB `bmRequestType` byte;
/// backends decode direction, type, and recipient from its bit fields.
/// Every transfer blocks until completion or the given timeout.
pub trait UsbTransport: Send + Sync {
    /// Host-to-device control transfer. Returns bytes transferred.
    fn control_out(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Device-to-host control transfer requesting up to `length` bytes.
    fn control_in(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// Bulk IN read of up to `max_len` bytes.
    fn bulk_in(
        &self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;

    /// Currently active configuration value on the device side.
    fn active_configuration(&self) -> Result<u8, TransportError>;

    /// Select a configuration.
    fn set_configuration(&self, value: u8) -> Result<(), TransportError>;

    /// Claim an interface.
    fn claim_interface(&self, interface: u8) -> Result<(), TransportError>;

    /// Release a previously claimed interface.
    fn release_interface(&self, interface: u8) -> Result<(), TransportError>;

    /// Select an alternate setting on a claimed interface.
    fn set_alt_setting(&self, interface: u8, alt: u8) -> Result<(), TransportError>;

    /// Request a device-level reset.
    fn reset(&self) -> Result<(), TransportError>;

    /// Fetch a string descriptor decoded to ASCII.
    fn string_descriptor_ascii(&self, index: u8) -> Result<String, TransportError>;

    /// Forward a verbosity level to the backend. Side channel only.
    fn set_debug(&self, _level: u8) {}

    /// Vendor ID of the opened device.
    fn vendor_id(&self) -> u16;

    /// Product ID of the opened device.
    fn product_id(&self) -> u16;
}

/// Every method takes `&self`, so a shared reference is itself a usable
/// transport. Lets a session borrow a transport the caller keeps.
impl<T: UsbTransport + ?Sized> UsbTransport for &T {
    fn control_out(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        (**self).control_out(request_type, request, value, index, data, timeout)
    }

    fn control_in(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).control_in(request_type, request, value, index, length, timeout)
    }

    fn bulk_in(
        &self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).bulk_in(endpoint, max_len, timeout)
    }

    fn active_configuration(&self) -> Result<u8, TransportError> {
        (**self).active_configuration()
    }

    fn set_configuration(&self, value: u8) -> Result<(), TransportError> {
        (**self).set_configuration(value)
    }

    fn claim_interface(&self, interface: u8) -> Result<(), TransportError> {
        (**self).claim_interface(interface)
    }

    fn release_interface(&self, interface: u8) -> Result<(), TransportError> {
        (**self).release_interface(interface)
    }

    fn set_alt_setting(&self, interface: u8, alt: u8) -> Result<(), TransportError> {
        (**self).set_alt_setting(interface, alt)
    }

    fn reset(&self) -> Result<(), TransportError> {
        (**self).reset()
    }

    fn string_descriptor_ascii(&self, index: u8) -> Result<String, TransportError> {
        (**self).string_descriptor_ascii(index)
    }

    fn set_debug(&self, level: u8) {
        (**self).set_debug(level)
    }

    fn vendor_id(&self) -> u16 {
        (**self).vendor_id()
    }

    fn product_id(&self) -> u16 {
        (**self).product_id()
    }
}
