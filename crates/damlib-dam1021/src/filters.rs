//! Filter set codes and the filter-bank listing model.
//!
//! Two separate concerns live here:
//!
//! 1. [`FilterSet`] -- the fixed bijection between the three ways a
//!    filter set is named: the external numeric id (1-4) used on the
//!    command line, the symbolic name (`linear`, `mixed`, `minimum`,
//!    `soft`) the console's `set filter=` wants, and the internal device
//!    code (4-7) the `F` command wants.
//! 2. [`FilterBank`] -- the structured model parsed out of the raw `lsf`
//!    listing text. The device emits one line per filter slot, id first;
//!    FIR slots classify into banks and sub-types through fixed tables,
//!    IIR slots key directly by id. The model is rebuilt on every
//!    listing -- the device's flash is the source of truth, nothing is
//!    cached.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use damlib_core::error::{Error, Result};
use tracing::debug;

/// A selectable digital filter set.
///
/// The declaration order is the canonical presentation order and matches
/// ascending device codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterSet {
    /// Linear phase.
    Linear,
    /// Mixed phase.
    Mixed,
    /// Minimum phase.
    Minimum,
    /// Soft rolloff.
    Soft,
}

impl FilterSet {
    /// All filter sets in canonical order.
    pub const ALL: [FilterSet; 4] = [
        FilterSet::Linear,
        FilterSet::Mixed,
        FilterSet::Minimum,
        FilterSet::Soft,
    ];

    /// The device's internal filter code, used by the `F` command.
    pub fn code(self) -> u8 {
        match self {
            FilterSet::Linear => 4,
            FilterSet::Mixed => 5,
            FilterSet::Minimum => 6,
            FilterSet::Soft => 7,
        }
    }

    /// The external numeric id accepted from callers.
    pub fn external_id(self) -> u8 {
        match self {
            FilterSet::Linear => 1,
            FilterSet::Mixed => 2,
            FilterSet::Minimum => 3,
            FilterSet::Soft => 4,
        }
    }

    /// The symbolic name, as the console's `set filter=` expects it.
    pub fn name(self) -> &'static str {
        match self {
            FilterSet::Linear => "linear",
            FilterSet::Mixed => "mixed",
            FilterSet::Minimum => "minimum",
            FilterSet::Soft => "soft",
        }
    }

    /// Look up a filter set by its internal device code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            4 => Ok(FilterSet::Linear),
            5 => Ok(FilterSet::Mixed),
            6 => Ok(FilterSet::Minimum),
            7 => Ok(FilterSet::Soft),
            _ => Err(Error::OutOfRange(format!("filter code {code} outside 4..=7"))),
        }
    }

    /// Translate an external identifier -- a numeric id (`"1"`..`"4"`)
    /// or a symbolic name -- into a filter set.
    pub fn from_external(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(id) = s.parse::<u8>() {
            return match id {
                1 => Ok(FilterSet::Linear),
                2 => Ok(FilterSet::Mixed),
                3 => Ok(FilterSet::Minimum),
                4 => Ok(FilterSet::Soft),
                _ => Err(Error::OutOfRange(format!("filter id {id} outside 1..=4"))),
            };
        }
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(FilterSet::Linear),
            "mixed" => Ok(FilterSet::Mixed),
            "minimum" => Ok(FilterSet::Minimum),
            "soft" => Ok(FilterSet::Soft),
            _ => Err(Error::OutOfRange(format!("unknown filter set: {s}"))),
        }
    }
}

impl fmt::Display for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for FilterSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FilterSet::from_external(s)
    }
}

/// Number of FIR filter slots; ids below this are FIR, everything else
/// is IIR.
pub const FIR_ID_COUNT: usize = 12;

/// FIR slot id -> bank number. Three banks of four slots.
const FIR_BANKS: [u8; FIR_ID_COUNT] = [1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3];

/// FIR slot id -> sub-type label. Each bank carries the four sets in
/// canonical order, so the selectable codes 4..=7 are exactly the bank-2
/// slots.
const FIR_SUBTYPES: [FilterSet; FIR_ID_COUNT] = [
    FilterSet::Linear,
    FilterSet::Mixed,
    FilterSet::Minimum,
    FilterSet::Soft,
    FilterSet::Linear,
    FilterSet::Mixed,
    FilterSet::Minimum,
    FilterSet::Soft,
    FilterSet::Linear,
    FilterSet::Mixed,
    FilterSet::Minimum,
    FilterSet::Soft,
];

/// Classify a listing line id: `Some((bank, sub_type))` for FIR slots,
/// `None` for IIR slots.
pub fn fir_classification(id: u16) -> Option<(u8, FilterSet)> {
    let idx = usize::from(id);
    (idx < FIR_ID_COUNT).then(|| (FIR_BANKS[idx], FIR_SUBTYPES[idx]))
}

/// Structured model of a filter listing.
///
/// FIR entries group by bank then sub-type, each group holding `(id,
/// description)` pairs in the order the device emitted them. IIR entries
/// key directly by id, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterBank {
    fir: BTreeMap<u8, BTreeMap<FilterSet, Vec<(u16, String)>>>,
    iir: BTreeMap<u16, Vec<String>>,
}

impl FilterBank {
    /// Parse raw listing text into the structured model.
    ///
    /// A line carries a filter definition when its first two characters,
    /// once trimmed, form a non-empty all-digit string -- this accepts
    /// both single-digit (`4 foo`) and two-digit (`12 baz`) ids while
    /// rejecting prompts and prose. The id is everything up to the first
    /// space; the rest of the line is the description.
    pub fn parse(listing: &str) -> Self {
        let mut model = FilterBank::default();
        for raw_line in listing.lines() {
            let line = raw_line.trim();
            if !starts_with_slot_id(line) {
                continue;
            }
            let (id_text, description) = line.split_once(' ').unwrap_or((line, ""));
            let id = match id_text.parse::<u16>() {
                Ok(id) => id,
                Err(_) => {
                    debug!(line, "skipping malformed listing line");
                    continue;
                }
            };
            let description = description.trim().to_string();
            match fir_classification(id) {
                Some((bank, sub_type)) => model
                    .fir
                    .entry(bank)
                    .or_default()
                    .entry(sub_type)
                    .or_default()
                    .push((id, description)),
                None => model.iir.entry(id).or_default().push(description),
            }
        }
        model
    }

    /// True when the listing produced no entries at all.
    pub fn is_empty(&self) -> bool {
        self.fir.is_empty() && self.iir.is_empty()
    }

    /// FIR entries, grouped by bank then sub-type.
    pub fn fir(&self) -> &BTreeMap<u8, BTreeMap<FilterSet, Vec<(u16, String)>>> {
        &self.fir
    }

    /// IIR entries, keyed by slot id.
    pub fn iir(&self) -> &BTreeMap<u16, Vec<String>> {
        &self.iir
    }
}

impl fmt::Display for FilterBank {
    /// Deterministic rendering: FIR groups by ascending bank and
    /// canonical sub-type order, then IIR slots by ascending id --
    /// independent of the order the device emitted them.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FIR filter banks:")?;
        for (bank, sub_types) in &self.fir {
            for (sub_type, entries) in sub_types {
                writeln!(f, "  bank {bank}, {sub_type}:")?;
                for (id, description) in entries {
                    writeln!(f, "    {id:>2}  {description}")?;
                }
            }
        }
        writeln!(f, "IIR filters:")?;
        for (id, entries) in &self.iir {
            for description in entries {
                writeln!(f, "    {id:>2}  {description}")?;
            }
        }
        Ok(())
    }
}

fn starts_with_slot_id(line: &str) -> bool {
    let head: String = line.chars().take(2).collect();
    let head = head.trim();
    !head.is_empty() && head.chars().all(|c| c.is_ascii_digit())
}
