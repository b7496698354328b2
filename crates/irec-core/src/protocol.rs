//! Wire protocol definitions for the recovery-mode bootloader.
//!
//! Nothing here is published by the vendor; request codes, chunk
//! geometry, and timing were recovered from observed device behavior.
//! Changing any of these values tends to hang or wedge the bootloader
//! rather than produce a clean error.

use std::fmt;
use std::time::Duration;

// ============================================================================
// Device Identification
// ============================================================================

/// Apple Inc. vendor ID.
pub const APPLE_VENDOR_ID: u16 = 0x05AC;

/// Product ID reported in firmware-update (DFU) mode.
pub const DFU_MODE_PID: u16 = 0x1227;
/// Product IDs reported by the four recovery-mode variants.
pub const RECOVERY_MODE_1_PID: u16 = 0x1280;
pub const RECOVERY_MODE_2_PID: u16 = 0x1281;
pub const RECOVERY_MODE_3_PID: u16 = 0x1282;
pub const RECOVERY_MODE_4_PID: u16 = 0x1283;

/// All product IDs accepted during device discovery.
pub const SUPPORTED_PIDS: &[u16] = &[
    DFU_MODE_PID,
    RECOVERY_MODE_1_PID,
    RECOVERY_MODE_2_PID,
    RECOVERY_MODE_3_PID,
    RECOVERY_MODE_4_PID,
];

// ============================================================================
// Control Transfer Vocabulary
// ============================================================================

/// bmRequestType: host-to-device | vendor | device. Carries commands.
pub const REQUEST_TYPE_COMMAND: u8 = 0x40;
/// bmRequestType: host-to-device | class | interface. Carries image chunks.
pub const REQUEST_TYPE_UPLOAD: u8 = 0x21;
/// bmRequestType: device-to-host | class | interface. Fetches the status block.
pub const REQUEST_TYPE_STATUS: u8 = 0xA1;
/// bmRequestType: device-to-host | vendor | device. Fetches the environment.
pub const REQUEST_TYPE_ENV: u8 = 0xC0;

/// bRequest for command send and environment fetch (direction disambiguates).
pub const REQUEST_COMMAND: u8 = 0;
/// bRequest for image chunks and the zero-length terminator.
pub const REQUEST_UPLOAD: u8 = 1;
/// bRequest for the 6-byte status block.
pub const REQUEST_STATUS: u8 = 3;

// ============================================================================
// Geometry
// ============================================================================

/// Upload chunk size. The bootloader acknowledges at most this much per
/// transfer.
pub const CHUNK_SIZE: usize = 0x800;

/// Length of the status block; only [`STATUS_BYTE_INDEX`] is interpreted.
pub const STATUS_LEN: usize = 6;
/// Offset of the status byte within the status block.
pub const STATUS_BYTE_INDEX: usize = 4;
/// Status value signalling readiness for the next chunk.
pub const STATUS_READY: u8 = 5;
/// Number of status polls issued after the upload terminator. The
/// returned values are not validated; this drains the device rather
/// than checking correctness.
pub const DRAIN_POLLS: usize = 3;

/// Commands longer than this are silently truncated, not rejected.
pub const MAX_COMMAND_LEN: usize = 0xFF;

/// Bulk IN endpoint carrying asynchronous device output.
pub const BULK_IN_ENDPOINT: u8 = 0x81;
/// Receive loop read size.
pub const RECEIVE_BUFFER_SIZE: usize = 0x1000;

/// Size of the environment variable buffer returned by `get_env`.
pub const ENV_BUFFER_SIZE: usize = 256;
/// String descriptor index carrying the `ECID:<hex>` blob.
pub const ECID_DESCRIPTOR_INDEX: u8 = 3;

// ============================================================================
// Timing
// ============================================================================

/// Command transfers. Short on purpose: commands that reboot the device
/// never complete their status stage.
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(100);
/// Environment fetch.
pub const ENV_TIMEOUT: Duration = Duration::from_millis(500);
/// Status block fetch.
pub const STATUS_TIMEOUT: Duration = Duration::from_millis(1000);
/// Image chunk transfers.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_millis(1000);
/// Bulk polling in the receive loop; a timeout here means the console
/// has gone quiet.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

// ============================================================================
// Device Mode
// ============================================================================

/// Bootloader state a device is running, identified by its product ID at
/// open time. Immutable for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Firmware-update (DFU) mode.
    Dfu,
    Recovery1,
    Recovery2,
    Recovery3,
    Recovery4,
}

impl Mode {
    /// Map a product ID to a recognized mode, if any.
    pub fn from_product_id(pid: u16) -> Option<Self> {
        match pid {
            DFU_MODE_PID => Some(Mode::Dfu),
            RECOVERY_MODE_1_PID => Some(Mode::Recovery1),
            RECOVERY_MODE_2_PID => Some(Mode::Recovery2),
            RECOVERY_MODE_3_PID => Some(Mode::Recovery3),
            RECOVERY_MODE_4_PID => Some(Mode::Recovery4),
            _ => None,
        }
    }

    /// The product ID a device in this mode reports.
    pub fn product_id(&self) -> u16 {
        match self {
            Mode::Dfu => DFU_MODE_PID,
            Mode::Recovery1 => RECOVERY_MODE_1_PID,
            Mode::Recovery2 => RECOVERY_MODE_2_PID,
            Mode::Recovery3 => RECOVERY_MODE_3_PID,
            Mode::Recovery4 => RECOVERY_MODE_4_PID,
        }
    }

    /// Whether this is one of the recovery-mode variants.
    pub fn is_recovery(&self) -> bool {
        !matches!(self, Mode::Dfu)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Dfu => write!(f, "DFU"),
            Mode::Recovery1 => write!(f, "Recovery (variant 1)"),
            Mode::Recovery2 => write!(f, "Recovery (variant 2)"),
            Mode::Recovery3 => write!(f, "Recovery (variant 3)"),
            Mode::Recovery4 => write!(f, "Recovery (variant 4)"),
        }
    }
}
