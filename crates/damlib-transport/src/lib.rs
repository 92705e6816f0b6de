//! damlib-transport: transport implementations for damlib.
//!
//! Currently a single backend, [`SerialTransport`], for the USB serial
//! adapter wired to the DAC's isolated uManager port.

pub mod serial;

pub use serial::{SerialTransport, DEFAULT_BAUD};
