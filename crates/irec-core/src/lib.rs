//! irec-core: session and upload engine for Apple recovery-mode devices.
//!
//! Talks the undocumented control-transfer protocol exposed by devices
//! in firmware-update (DFU) or recovery mode: short textual commands,
//! chunked image uploads with a per-chunk status handshake, the
//! asynchronous console stream, and identity/environment queries.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: vendor/product IDs, request codes, chunk geometry, timing
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **Hooks**: outbound filter / inbound sink callback traits
//! - **Session**: the protocol engine driving one opened device
//!
//! # Example
//!
//! ```no_run
//! use irec_core::{Session, StdoutSink};
//!
//! let mut session = Session::discover().expect("no device in recovery mode");
//! session.set_receiver(StdoutSink);
//! session.send(b"printenv").expect("send failed");
//! session.receive().expect("receive failed");
//! ```

pub mod error;
pub mod hooks;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use error::Error;
pub use hooks::{ReceiveSink, SendFilter, StdoutSink};
pub use protocol::Mode;
pub use session::Session;
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
