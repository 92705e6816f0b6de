//! damlib-dam1021: protocol engine for the dam1021 uManager console.
//!
//! The dam1021 is a DAC module based on a discrete R-2R sign-magnitude
//! ladder with FPGA FIFO reclocking and replaceable digital filters. It is
//! configured over a serial console ("uManager") that has no framing, no
//! message boundaries, and no acknowledgement discipline -- success and
//! failure are detected purely by polling the byte stream for prompt
//! markers, command echoes, and error text within bounded time budgets.
//!
//! This crate ties that console to a [`Transport`](damlib_core::Transport)
//! to produce a working driver:
//!
//! - [`poller`] -- the bounded-read accumulation loop everything builds on
//! - [`protocol`] -- console markers and buffer predicates
//! - [`commands`] -- command formatting and argument validation
//! - [`xmodem`] -- the block-checksum image transfer sub-protocol
//! - [`filters`] -- filter set codes and the filter-bank listing model
//! - [`dac`] -- the [`Dam1021`] driver: session state machine + operations
//!
//! Construct a driver with [`Dam1021Builder`]:
//!
//! ```no_run
//! use damlib_dam1021::Dam1021Builder;
//!
//! # async fn example() -> damlib_core::Result<()> {
//! let mut dac = Dam1021Builder::new()
//!     .serial_device("/dev/ttyUSB0")
//!     .build()
//!     .await?;
//!
//! dac.set_current_volume(-14).await?;
//! dac.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

pub mod builder;
pub mod commands;
pub mod dac;
pub mod filters;
pub mod poller;
pub mod protocol;
pub mod xmodem;

pub use builder::Dam1021Builder;
pub use commands::{ListingScope, OperatingMode};
pub use dac::{Dam1021, SessionState};
pub use filters::{FilterBank, FilterSet};
pub use poller::{poll, PollBudget};

/// Default serial device the DAC is expected on.
pub const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyUSB0";

/// Default base timeout for a single poll budget.
pub const DEFAULT_BASE_TIMEOUT: Duration = Duration::from_secs(1);
