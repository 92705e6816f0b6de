//! Error types for damlib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer failures and every
//! protocol-level outcome the uManager console can produce are captured
//! here.

/// The error type for all damlib operations.
///
/// Variants cover the full range of failure modes encountered when talking
/// to the DAC's serial console: physical transport failures, session
/// entry/exit problems, image transfer failures, and argument validation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open/read/write).
    #[error("transport error: {0}")]
    Transport(String),

    /// Timed out waiting for output from the device.
    ///
    /// This typically indicates the DAC is powered off, the wrong serial
    /// device was opened, or the console is wedged mid-transfer.
    #[error("timeout waiting for device output")]
    Timeout,

    /// No connection to the device has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// Neither the optimistic nor the forced prompt poll produced the
    /// uManager prompt.
    #[error("failed to open uManager session")]
    SessionOpenFailed,

    /// A prompt was found but the exit banner never appeared after the
    /// termination command.
    #[error("failed to close uManager session")]
    SessionCloseFailed,

    /// The device never signalled readiness after the download command.
    #[error("device is not ready to accept a download")]
    TransferNotReady,

    /// The block-checksum transfer itself failed (checksum rejections
    /// exhausted, receiver cancelled, or the completion handshake broke).
    #[error("block transfer failed: {0}")]
    TransferProtocolFailed(String),

    /// The block transfer completed but the device never confirmed that
    /// it reprogrammed itself with the new image.
    #[error("download accepted but device did not reprogram")]
    TransferNotAcknowledged,

    /// The self-update handshake after a firmware download broke down.
    #[error("update handshake failed: {0}")]
    UpdateHandshakeFailed(String),

    /// An argument was outside its declared domain (volume level, input
    /// source index, filter code). Raised before any I/O takes place.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// A self-echoing command was never echoed back within the bounded
    /// retry count.
    #[error("command not confirmed by device echo: {0}")]
    RetryExhausted(String),

    /// The device answered a session-scoped command with its generic
    /// error text.
    #[error("device rejected command: {0}")]
    DeviceRejected(String),

    /// The interactive prompt never reappeared after a listing command.
    #[error("filter listing did not complete")]
    ListingFailed,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
