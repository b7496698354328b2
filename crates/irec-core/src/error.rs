//! Session error vocabulary.
//!
//! Every fallible operation on a session returns one of these kinds.
//! The display strings are stable; callers and scripts key on them.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The session has no usable device handle.
    #[error("Unable to find device")]
    NoDevice,

    /// Buffer allocation failed (surfaced from file reads).
    #[error("Out of memory")]
    OutOfMemory,

    /// No device in a recognized mode was found, or opening one failed.
    #[error("Unable to connect to device")]
    UnableToConnect,

    #[error("Invalid input")]
    InvalidInput,

    #[error("File not found")]
    FileNotFound,

    /// A chunk transfer failed, transferred short, or the post-chunk
    /// status was not the ready code.
    #[error("Unable to upload data to device")]
    UsbUpload,

    /// The status block read failed or was not exactly 6 bytes.
    #[error("Unable to get device status")]
    UsbStatus,

    /// Claiming the interface or selecting the alt setting failed.
    #[error("Unable to set device interface")]
    UsbInterface,

    #[error("Unable to set device configuration")]
    UsbConfiguration,

    /// Unclassified transport or parse failure.
    #[error("Unknown error")]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_stable() {
        assert_eq!(Error::UnableToConnect.to_string(), "Unable to connect to device");
        assert_eq!(Error::UsbUpload.to_string(), "Unable to upload data to device");
        assert_eq!(Error::UsbStatus.to_string(), "Unable to get device status");
        assert_eq!(Error::UsbInterface.to_string(), "Unable to set device interface");
        assert_eq!(
            Error::UsbConfiguration.to_string(),
            "Unable to set device configuration"
        );
        assert_eq!(Error::Unknown.to_string(), "Unknown error");
    }
}
