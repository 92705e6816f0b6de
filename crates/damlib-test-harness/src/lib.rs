//! damlib-test-harness: mock transport for protocol engine tests.
//!
//! Provides [`ScriptedTransport`], a [`Transport`](damlib_core::Transport)
//! implementation driven by an ordered script of expected writes and
//! device output, so session, command, and transfer flows can be tested
//! without hardware.

pub mod scripted;

pub use scripted::ScriptedTransport;
