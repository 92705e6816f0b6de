//! uManager command formatting and argument validation.
//!
//! Commands are short ASCII strings. The immediate-effect family (`V`,
//! `I`, `F`) is typed at the normal prompt and confirmed by the console
//! echoing the command back; the `set ...` family runs inside a session
//! and persists to the device's flash. Argument ranges are validated here,
//! before any I/O takes place.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};
use damlib_core::error::{Error, Result};

use crate::filters::FilterSet;
use crate::protocol;

/// Lowest accepted volume level, in dB steps.
pub const VOLUME_MIN: i16 = -99;

/// Highest accepted volume level.
pub const VOLUME_MAX: i16 = 15;

/// Sentinel level that hands volume control back to the onboard
/// potentiometer.
pub const VOLUME_POTENTIOMETER: i16 = 99;

/// Valid input source indices: 0 = TOSLINK, 1 = RCA S/PDIF, 2 = BNC
/// S/PDIF.
pub const INPUT_SOURCES: RangeInclusive<u8> = 0..=2;

/// Send attempts for a self-echoing command before giving up.
pub const SELF_ECHO_TRIES: u8 = 2;

/// Download-mode command.
pub const DOWNLOAD: &str = "download";

/// Self-update command, issued after a firmware download.
pub const UPDATE: &str = "update";

/// Which filter banks a listing command covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingScope {
    /// Filters for the currently active sample-rate bank.
    Current,
    /// Every filter stored on the device.
    All,
}

/// Persisted operating mode of the DAC output stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    /// Normal output polarity.
    Normal,
    /// Inverted output polarity.
    Inverted,
}

impl OperatingMode {
    /// The symbolic name the console expects in `set mode=`.
    pub fn name(self) -> &'static str {
        match self {
            OperatingMode::Normal => "normal",
            OperatingMode::Inverted => "inverted",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for OperatingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(OperatingMode::Normal),
            "inverted" => Ok(OperatingMode::Inverted),
            _ => Err(Error::OutOfRange(format!("unknown operating mode: {s}"))),
        }
    }
}

/// Format the immediate volume command, e.g. `V-14`.
pub fn current_volume(level: i16) -> Result<String> {
    validate_volume(level)?;
    Ok(format!("V{level:+03}"))
}

/// Format the flash volume command, e.g. `set volume=-22`. The stored
/// level becomes the current level at power-up.
pub fn flash_volume(level: i16) -> Result<String> {
    validate_volume(level)?;
    Ok(format!("set volume={level:+03}"))
}

/// Format the input selection command, e.g. `I1`.
pub fn input_source(index: u8) -> Result<String> {
    if !INPUT_SOURCES.contains(&index) {
        return Err(Error::OutOfRange(format!(
            "input source {index} outside {}..={}",
            INPUT_SOURCES.start(),
            INPUT_SOURCES.end()
        )));
    }
    Ok(format!("I{index}"))
}

/// Format the immediate filter selection command, e.g. `F4`. Uses the
/// device's internal filter code.
pub fn current_filter(set: FilterSet) -> String {
    format!("F{}", set.code())
}

/// Format the flash filter command, e.g. `set filter=linear`. The
/// console wants the symbolic name here, not the code.
pub fn flash_filter(set: FilterSet) -> String {
    format!("set filter={}", set.name())
}

/// Format the flash operating-mode command, e.g. `set mode=inverted`.
pub fn operating_mode(mode: OperatingMode) -> String {
    format!("set mode={}", mode.name())
}

/// The listing command for a scope.
pub fn listing(scope: ListingScope) -> &'static str {
    match scope {
        ListingScope::Current => "lsf",
        ListingScope::All => "lsf all",
    }
}

/// Encode a command with its trailing line terminator, ready for the
/// wire.
pub fn encode_line(command: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(command.len() + 1);
    buf.put_slice(command.as_bytes());
    buf.put_slice(protocol::LINE_TERMINATOR.as_bytes());
    buf.to_vec()
}

fn validate_volume(level: i16) -> Result<()> {
    if level == VOLUME_POTENTIOMETER || (VOLUME_MIN..=VOLUME_MAX).contains(&level) {
        Ok(())
    } else {
        Err(Error::OutOfRange(format!(
            "volume level {level} outside [{VOLUME_MIN}, {VOLUME_MAX}]"
        )))
    }
}
