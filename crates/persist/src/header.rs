//! Fixed 12-byte grid-snapshot header (spec §4.12).
//!
//! ```text
//! offset  size  field
//! 0       2     format_version (u16, little-endian)
//! 2       2     width (u16)
//! 4       2     height (u16)
//! 6       1     sea_level (u8)
//! 7       1     reserved (= 0)
//! 8       4     map_seed (u32)
//! ```
//!
//! Written by hand with `to_le_bytes`/`from_le_bytes` rather than routed
//! through `bitcode`, the same way the teacher's own file header is -- the
//! byte offsets here are part of the format, not an implementation detail
//! a length-prefixed encoder would preserve across versions.

use colonycore_core::config::VALID_MAP_SIDES;

use crate::error::PersistError;

/// Current snapshot format version this crate writes.
pub const FORMAT_VERSION: u16 = 1;

/// Oldest format version this crate can still read.
pub const MIN_SUPPORTED_FORMAT_VERSION: u16 = 1;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 12;

/// The 12-byte grid-snapshot header, parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub format_version: u16,
    pub width: u16,
    pub height: u16,
    pub sea_level: u8,
    pub map_seed: u32,
}

impl SnapshotHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..2].copy_from_slice(&self.format_version.to_le_bytes());
        out[2..4].copy_from_slice(&self.width.to_le_bytes());
        out[4..6].copy_from_slice(&self.height.to_le_bytes());
        out[6] = self.sea_level;
        out[7] = 0; // reserved
        out[8..12].copy_from_slice(&self.map_seed.to_le_bytes());
        out
    }

    /// Parses and validates the header. Dimension and version checks happen
    /// here so every caller gets the same rejection regardless of which
    /// section of the snapshot it's decoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, PersistError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PersistError::InsufficientData { expected: HEADER_SIZE, actual: bytes.len() });
        }

        let format_version = u16::from_le_bytes([bytes[0], bytes[1]]);
        if format_version < MIN_SUPPORTED_FORMAT_VERSION || format_version > FORMAT_VERSION {
            return Err(PersistError::InvalidVersion {
                found: format_version,
                min: MIN_SUPPORTED_FORMAT_VERSION,
                max: FORMAT_VERSION,
            });
        }

        let width = u16::from_le_bytes([bytes[2], bytes[3]]);
        let height = u16::from_le_bytes([bytes[4], bytes[5]]);
        if height != width || !VALID_MAP_SIDES.contains(&width) {
            return Err(PersistError::InvalidDimensions { width, height });
        }

        let sea_level = bytes[6];
        let map_seed = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

        Ok(Self { format_version, width, height, sea_level, map_seed })
    }
}
