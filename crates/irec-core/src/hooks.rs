//! Session callback hooks.
//!
//! A session exposes two synchronous extension points: an outbound
//! filter consulted before each command send, and an inbound sink fed
//! by the receive loop. Both are plain trait objects so a UI layer can
//! hook the byte streams without the core knowing about it.

/// Outbound command filter.
pub trait SendFilter: Send {
    /// Inspect an outbound command and return how many of its leading
    /// bytes may actually be sent. Returning 0 aborts the send; the
    /// command is dropped without error.
    fn filter(&mut self, command: &[u8]) -> usize;
}

/// Inbound device-output sink.
pub trait ReceiveSink: Send {
    /// Consume a block of device output and return the number of bytes
    /// accepted. Any value other than `data.len()` aborts the receive
    /// loop.
    fn receive(&mut self, data: &[u8]) -> usize;
}

impl<F> SendFilter for F
where
    F: FnMut(&[u8]) -> usize + Send,
{
    fn filter(&mut self, command: &[u8]) -> usize {
        self(command)
    }
}

impl<F> ReceiveSink for F
where
    F: FnMut(&[u8]) -> usize + Send,
{
    fn receive(&mut self, data: &[u8]) -> usize {
        self(data)
    }
}

/// Sink that copies device output to stdout, unmodified.
pub struct StdoutSink;

impl ReceiveSink for StdoutSink {
    fn receive(&mut self, data: &[u8]) -> usize {
        use std::io::Write;

        let mut out = std::io::stdout();
        if out.write_all(data).and_then(|_| out.flush()).is_err() {
            return 0;
        }
        data.len()
    }
}
