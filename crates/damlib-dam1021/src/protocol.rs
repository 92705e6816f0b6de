//! uManager console markers and buffer predicates.
//!
//! The console is a plain text stream. Every state the engine needs to
//! detect -- a fresh prompt, a command echo, the generic error text, the
//! transfer-ready request, a reprogram confirmation -- is a pattern
//! matched against the accumulated read buffer. The predicates here are
//! pure functions over that buffer; the polling and retry policy around
//! them lives in [`poller`](crate::poller) and [`dac`](crate::dac).
//!
//! Device output is not guaranteed valid UTF-8 (an aborted transfer can
//! leave binary garbage in the stream), so text predicates go through a
//! lossy conversion.

/// Byte sequence that invokes the uManager session. Sent without a
/// terminator.
pub const SESSION_INVOCATION: &[u8] = b"+++";

/// Command that terminates the uManager session.
pub const SESSION_TERMINATION: &str = "exit";

/// Line terminator the console expects after commands.
pub const LINE_TERMINATOR: &str = "\r";

/// The interactive prompt. Its appearance as a buffer suffix is the only
/// signal that the console is ready for a command.
pub const PROMPT: &str = "# ";

/// What the console echoes when the termination command is accepted.
pub const EXIT_BANNER: &str = "exit\r\n";

/// Generic error text for a rejected session-scoped command.
pub const ERROR_TEXT: &str = "invalid command";

/// Emitted by the console when it is ready to receive an image; also the
/// XMODEM CRC-mode request character.
pub const READY_MARKER: char = 'C';

/// Substring confirming the device reprogrammed itself after a transfer.
pub const REPROGRAM_ACK: &str = "programmed";

/// Substring of the confirmation question asked by the update command.
pub const UPDATE_CONFIRM: &str = "sure";

/// Single acknowledgement byte answering the update confirmation.
pub const UPDATE_ACK: &[u8] = b"y";

/// Substring confirming the device is resetting into the new firmware.
pub const RESET_ACK: &str = "resetting";

/// Bytes requested per bounded read while polling.
pub const READ_CHUNK: usize = 300;

/// True when the accumulated buffer ends with the interactive prompt.
pub fn prompt_ready(buf: &[u8]) -> bool {
    buf.ends_with(PROMPT.as_bytes())
}

/// True when the accumulated buffer ends with the session exit banner.
pub fn session_closed(buf: &[u8]) -> bool {
    buf.ends_with(EXIT_BANNER.as_bytes())
}

/// True when the buffer, ignoring trailing whitespace, ends with the
/// exact command text -- the success signal for self-echoing commands.
pub fn echoes_command(buf: &[u8], command: &str) -> bool {
    String::from_utf8_lossy(buf).trim_end().ends_with(command)
}

/// True when the buffer, ignoring trailing whitespace and case, ends
/// with the console's generic error text.
pub fn reports_error(buf: &[u8]) -> bool {
    String::from_utf8_lossy(buf)
        .trim_end()
        .to_ascii_lowercase()
        .ends_with(ERROR_TEXT)
}

/// True when the buffer's last non-whitespace character is the
/// transfer-ready marker.
pub fn transfer_ready(buf: &[u8]) -> bool {
    String::from_utf8_lossy(buf).trim_end().ends_with(READY_MARKER)
}

/// Case-insensitive containment test, used for acknowledgement
/// substrings that can appear anywhere in the buffer.
pub fn contains_ignore_case(buf: &[u8], needle: &str) -> bool {
    String::from_utf8_lossy(buf)
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}
