//! Dam1021Builder -- fluent builder for constructing [`Dam1021`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! the serial device, timeout budget, and safety behavior before the
//! transport connection is established.
//!
//! # Example
//!
//! ```no_run
//! use damlib_dam1021::Dam1021Builder;
//! use std::time::Duration;
//!
//! # async fn example() -> damlib_core::Result<()> {
//! let dac = Dam1021Builder::new()
//!     .serial_device("/dev/ttyUSB1")
//!     .base_timeout(Duration::from_millis(1500))
//!     .cautious(true)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use damlib_core::error::Result;
use damlib_core::transport::Transport;
use damlib_transport::SerialTransport;

use crate::dac::Dam1021;
use crate::{DEFAULT_BASE_TIMEOUT, DEFAULT_SERIAL_DEVICE};

/// Fluent builder for [`Dam1021`].
///
/// All configuration has defaults matching a stock device on the usual
/// USB adapter, so the simplest usage is:
///
/// ```ignore
/// let dac = Dam1021Builder::new().build().await?;
/// ```
pub struct Dam1021Builder {
    serial_device: String,
    baud_rate: u32,
    base_timeout: Duration,
    cautious: bool,
}

impl Dam1021Builder {
    /// Create a builder with the stock defaults.
    pub fn new() -> Self {
        Dam1021Builder {
            serial_device: DEFAULT_SERIAL_DEVICE.to_string(),
            baud_rate: damlib_transport::DEFAULT_BAUD,
            base_timeout: DEFAULT_BASE_TIMEOUT,
            cautious: false,
        }
    }

    /// Set the serial device path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_device(mut self, device: &str) -> Self {
        self.serial_device = device.to_string();
        self
    }

    /// Override the console baud rate. Stock firmware listens at
    /// 115200 regardless.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Set the base timeout all poll budgets derive from (default: 1 s).
    pub fn base_timeout(mut self, timeout: Duration) -> Self {
        self.base_timeout = timeout;
        self
    }

    /// Force a session close before commands issued at the normal
    /// prompt (default: off). Useful when other tooling may have left
    /// the console mid-session.
    pub fn cautious(mut self, cautious: bool) -> Self {
        self.cautious = cautious;
        self
    }

    /// Build a [`Dam1021`] with a caller-provided transport.
    ///
    /// This is the entry point for testing (pass a `ScriptedTransport`
    /// from `damlib-test-harness`) and for callers that manage the
    /// transport lifecycle directly.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> Dam1021 {
        Dam1021::new(transport, self.base_timeout, self.cautious)
    }

    /// Build a [`Dam1021`] by opening the configured serial device.
    pub async fn build(self) -> Result<Dam1021> {
        let transport =
            SerialTransport::open_with_baud(&self.serial_device, self.baud_rate).await?;
        Ok(self.build_with_transport(Box::new(transport)))
    }
}

impl Default for Dam1021Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dac::SessionState;
    use damlib_test_harness::ScriptedTransport;

    #[tokio::test]
    async fn builder_defaults() {
        let mock = ScriptedTransport::new();
        let dac = Dam1021Builder::new().build_with_transport(Box::new(mock));
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn builder_fluent_chain() {
        let mock = ScriptedTransport::new();
        let dac = Dam1021Builder::new()
            .serial_device("/dev/ttyUSB1")
            .baud_rate(115_200)
            .base_timeout(Duration::from_millis(250))
            .cautious(true)
            .build_with_transport(Box::new(mock));
        assert_eq!(dac.session_state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn builder_open_failure_surfaces() {
        let result = Dam1021Builder::new()
            .serial_device("/dev/does-not-exist-damlib")
            .build()
            .await;
        assert!(result.is_err());
    }
}
