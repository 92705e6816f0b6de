//! # damlib -- dam1021 DAC Control
//!
//! `damlib` is an asynchronous Rust library for controlling the Soekris
//! dam1021 R-2R DAC module over its uManager serial console: volume and
//! input routing, digital filter selection, filter-bank listings, and
//! firmware/filter image uploads via the console's XMODEM download mode.
//!
//! ## Quick Start
//!
//! Add `damlib` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! damlib = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect to the DAC and set the volume:
//!
//! ```no_run
//! use damlib::dam1021::Dam1021Builder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut dac = Dam1021Builder::new()
//!         .serial_device("/dev/ttyUSB0")
//!         .build()
//!         .await?;
//!
//!     dac.set_current_volume(-14).await?;
//!     dac.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                 | Purpose                                      |
//! |-----------------------|----------------------------------------------|
//! | `damlib-core`         | [`Transport`] trait, [`Error`] / [`Result`]  |
//! | `damlib-transport`    | Serial transport implementation              |
//! | `damlib-dam1021`      | The uManager protocol engine                 |
//! | `damlib-test-harness` | Scripted mock transport for tests            |
//! | **`damlib`**          | This facade crate -- re-exports everything   |
//!
//! The protocol engine operates on the [`Transport`] trait, so everything
//! it does can be exercised against the scripted mock transport without
//! hardware.
//!
//! ## The uManager console
//!
//! The console has no framing and no acknowledgement discipline. Success
//! and failure are detected by polling the byte stream against timeout
//! budgets: a `# ` prompt suffix means the session is ready, immediate
//! commands (`V`, `I`, `F`) confirm themselves by being echoed back, and
//! `set ...` commands signal failure only through the console's error
//! text. [`dam1021::poll`] is the primitive all of this is built on.

pub use damlib_core::*;

/// The dam1021 uManager protocol engine.
///
/// Provides [`Dam1021`](dam1021::Dam1021) and
/// [`Dam1021Builder`](dam1021::Dam1021Builder), plus the filter set
/// translation and filter-bank listing model.
pub mod dam1021 {
    pub use damlib_dam1021::*;
}

/// Transport implementations.
///
/// Provides [`SerialTransport`](transport::SerialTransport) for the USB
/// serial adapter wired to the DAC.
pub mod transport {
    pub use damlib_transport::*;
}
