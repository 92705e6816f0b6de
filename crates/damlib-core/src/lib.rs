//! damlib-core: Core traits and error definitions for damlib.
//!
//! This crate defines the device-agnostic abstractions the protocol engine
//! is built on. Applications depend on these types without pulling in the
//! serial backend or the dam1021 driver itself.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod transport;

// Re-export key types at crate root for ergonomic `use damlib_core::*`.
pub use error::{Error, Result};
pub use transport::Transport;
