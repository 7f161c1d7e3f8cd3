//! Errors a snapshot load can fail with (spec §4.12).

use std::fmt;

/// A version outside the decoder's supported `[MIN, CURRENT]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistError {
    /// `format_version` fell outside `[MIN_SUPPORTED_FORMAT_VERSION,
    /// FORMAT_VERSION]`.
    InvalidVersion { found: u16, min: u16, max: u16 },
    /// `width`/`height` aren't both one of [`crate::VALID_GRID_SIDES`], or
    /// don't match each other.
    InvalidDimensions { width: u16, height: u16 },
    /// The buffer ended before every section the header promised was read.
    InsufficientData { expected: usize, actual: usize },
    /// The bytes parsed to the expected length but contain values that
    /// can't represent a valid grid (an out-of-range terrain type byte, or
    /// an entity section that failed to decode).
    CorruptData,
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::InvalidVersion { found, min, max } => write!(
                f,
                "unsupported snapshot format version {found} (supported range is {min}..={max})"
            ),
            PersistError::InvalidDimensions { width, height } => {
                write!(f, "invalid grid dimensions {width}x{height}")
            }
            PersistError::InsufficientData { expected, actual } => write!(
                f,
                "snapshot buffer too short: expected at least {expected} bytes, found {actual}"
            ),
            PersistError::CorruptData => write!(f, "snapshot data is corrupt"),
        }
    }
}

impl std::error::Error for PersistError {}
