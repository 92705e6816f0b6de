//! Transport trait for device communication.
//!
//! The [`Transport`] trait abstracts over the physical link to the DAC.
//! Implementations exist for serial ports (the uManager console is a
//! 115200-baud serial line) and mock transports for testing.
//!
//! The protocol engine in `damlib-dam1021` operates on a `Transport`
//! rather than directly on a serial port, enabling both real hardware
//! control and deterministic unit testing with `ScriptedTransport` from
//! the `damlib-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to the device.
///
/// The uManager console has no framing and no message boundaries; the
/// transport only moves bytes. Everything protocol-shaped (prompt
/// detection, command echo matching, block transfer) is handled by the
/// engine that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the device.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying transport.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Waits up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if nothing is received within the deadline. The timeout applies to
    /// this call only.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
