//! nusb-based USB transport implementation.

use std::num::NonZeroU8;
use std::sync::Mutex;
use std::time::Duration;

use nusb::transfer::{Bulk, ControlIn, ControlOut, ControlType, In, Recipient};
use nusb::{Device, Interface, MaybeFuture, list_devices};
use std::io::Read;
use tracing::{debug, info};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::{APPLE_VENDOR_ID, Mode};

/// nusb-based transport over one opened device.
pub struct NusbTransport {
    device: Device,
    /// Claimed interface, if any. Interface-recipient transfers and bulk
    /// reads require one.
    interface: Mutex<Option<Interface>>,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Scan the bus for the first device with the known vendor ID and a
    /// recognized product ID, open it, and return the transport together
    /// with the mode the product ID maps to.
    pub fn open_first() -> Result<(Self, Mode), TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        for device_info in devices {
            if device_info.vendor_id() != APPLE_VENDOR_ID {
                continue;
            }
            let Some(mode) = Mode::from_product_id(device_info.product_id()) else {
                continue;
            };

            info!(
                vid = %format!("{:04X}", device_info.vendor_id()),
                pid = %format!("{:04X}", device_info.product_id()),
                mode = %mode,
                "Found device"
            );

            let vid = device_info.vendor_id();
            let pid = device_info.product_id();
            let device = device_info
                .open()
                .wait()
                .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

            let transport = Self {
                device,
                interface: Mutex::new(None),
                vid,
                pid,
            };
            return Ok((transport, mode));
        }

        Err(TransportError::DeviceNotFound {
            vid: APPLE_VENDOR_ID,
        })
    }

    fn with_interface<R>(
        &self,
        f: impl FnOnce(&Interface) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let guard = self.interface.lock().unwrap();
        let interface = guard.as_ref().ok_or(TransportError::NoInterface)?;
        f(interface)
    }
}

/// Decode a raw `bmRequestType` byte into nusb's control-type and
/// recipient fields. The direction bit is implied by the calling method.
fn split_request_type(request_type: u8) -> Result<(ControlType, Recipient), TransportError> {
    let control_type = match (request_type >> 5) & 0x03 {
        0 => ControlType::Standard,
        1 => ControlType::Class,
        2 => ControlType::Vendor,
        _ => return Err(TransportError::UnsupportedRequestType(request_type)),
    };
    let recipient = match request_type & 0x1F {
        0 => Recipient::Device,
        1 => Recipient::Interface,
        2 => Recipient::Endpoint,
        3 => Recipient::Other,
        _ => return Err(TransportError::UnsupportedRequestType(request_type)),
    };
    Ok((control_type, recipient))
}

impl UsbTransport for NusbTransport {
    fn control_out(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let (control_type, recipient) = split_request_type(request_type)?;
        let transfer = ControlOut {
            control_type,
            recipient,
            request,
            value,
            index,
            data,
        };

        match recipient {
            Recipient::Interface => self.with_interface(|interface| {
                interface
                    .control_out(transfer, timeout)
                    .wait()
                    .map_err(|e| TransportError::ControlFailed(e.to_string()))
            })?,
            _ => self
                .device
                .control_out(transfer, timeout)
                .wait()
                .map_err(|e| TransportError::ControlFailed(e.to_string()))?,
        };

        debug!(request_type, request, len = data.len(), "control OUT complete");
        Ok(data.len())
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
        let (control_type, recipient) = split_request_type(request_type)?;
        let transfer = ControlIn {
            control_type,
            recipient,
            request,
            value,
            index,
            length: length as u16,
        };

        let data = match recipient {
            Recipient::Interface => self.with_interface(|interface| {
                interface
                    .control_in(transfer, timeout)
                    .wait()
                    .map_err(|e| TransportError::ControlFailed(e.to_string()))
            })?,
            _ => self
                .device
                .control_in(transfer, timeout)
                .wait()
                .map_err(|e| TransportError::ControlFailed(e.to_string()))?,
        };

        debug!(request_type, request, len = data.len(), "control IN complete");
        Ok(data)
    }

    fn bulk_in(
        &self,
        endpoint: u8,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.with_interface(|interface| {
            let ep = interface
                .endpoint::<Bulk, In>(endpoint)
                .map_err(|e| TransportError::BulkFailed(e.to_string()))?;

            let mut reader = ep.reader(4096);
            reader.set_read_timeout(timeout);

            let mut buf = vec![0u8; max_len];
            let n = reader
                .read(&mut buf)
                .map_err(|e| TransportError::BulkFailed(e.to_string()))?;
            buf.truncate(n);

            debug!(endpoint, bytes_read = n, "bulk IN complete");
            Ok(buf)
        })
    }

    fn active_configuration(&self) -> Result<u8, TransportError> {
        self.device
            .active_configuration()
            .map(|config| config.configuration_value())
            .map_err(|e| TransportError::ConfigurationFailed(e.to_string()))
    }

    fn set_configuration(&self, value: u8) -> Result<(), TransportError> {
        self.device
            .set_configuration(value)
            .wait()
            .map_err(|e| TransportError::ConfigurationFailed(e.to_string()))
    }

    fn claim_interface(&self, interface: u8) -> Result<(), TransportError> {
        let claimed = self.device.claim_interface(interface).wait().map_err(|e| {
            TransportError::ClaimInterfaceFailed {
                interface,
                message: e.to_string(),
            }
        })?;
        *self.interface.lock().unwrap() = Some(claimed);
        Ok(())
    }

    fn release_interface(&self, _interface: u8) -> Result<(), TransportError> {
        // Dropping the handle releases the claim.
        *self.interface.lock().unwrap() = None;
        Ok(())
    }

    fn set_alt_setting(&self, _interface: u8, alt: u8) -> Result<(), TransportError> {
        self.with_interface(|interface| {
            interface.set_alt_setting(alt).wait().map_err(|e| {
                TransportError::ClaimInterfaceFailed {
                    interface: interface.interface_number(),
                    message: e.to_string(),
                }
            })
        })
    }

    fn reset(&self) -> Result<(), TransportError> {
        self.device
            .reset()
            .wait()
            .map_err(|e| TransportError::ResetFailed(e.to_string()))
    }

    fn string_descriptor_ascii(&self, index: u8) -> Result<String, TransportError> {
        let index = NonZeroU8::new(index)
            .ok_or_else(|| TransportError::DescriptorFailed("descriptor index 0".into()))?;

        let timeout = Duration::from_millis(1000);
        let language = self
            .device
            .get_string_descriptor_supported_languages(timeout)
            .wait()
            .map_err(|e| TransportError::DescriptorFailed(e.to_string()))?
            .next()
            .unwrap_or(nusb::descriptors::language_id::US_ENGLISH);

        let raw = self
            .device
            .get_string_descriptor(index, language, timeout)
            .wait()
            .map_err(|e| TransportError::DescriptorFailed(e.to_string()))?;

        // The blob mixes printable text with padding; keep ASCII only.
        Ok(raw.chars().filter(|c| c.is_ascii()).collect())
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
