//! Dense, row-major 2-D grids with bounds-checked accessors (spec §3.2).
//!
//! Every accessor here follows the same contract: out-of-bounds reads return
//! the type's default, out-of-bounds writes are no-ops. `i = y * width + x`.

use serde::{Deserialize, Serialize};

use crate::ids::Coord;

/// Minimal bitflags-style macro, used only for [`TerrainFlags`]. The teacher
/// workspace has no dependency on the `bitflags` crate, so a small local
/// macro keeps the POD byte layout without adding one for a single type.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $ty:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
        #[repr(transparent)]
        pub struct $name($ty);

        impl $name {
            $(pub const $flag: $name = $name($value);)*

            pub const fn empty() -> Self {
                Self(0)
            }

            /// Reconstructs flags from a raw byte, e.g. read back from a
            /// snapshot. Bits with no defined meaning are preserved rather
            /// than rejected.
            pub const fn from_bits(bits: $ty) -> Self {
                Self(bits)
            }

            pub fn contains(self, other: Self) -> bool {
                (self.0 & other.0) == other.0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            pub fn bits(self) -> $ty {
                self.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

/// A square dense grid over `T`. `T` must be small and `Copy` -- these are
/// meant to back the terrain/occupancy/contamination/etc. grids, not general
/// purpose storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenseGrid<T> {
    cells: Vec<T>,
    side: u16,
}

impl<T: Copy + Default> DenseGrid<T> {
    pub fn new(side: u16) -> Self {
        Self {
            cells: vec![T::default(); side as usize * side as usize],
            side,
        }
    }

    #[inline]
    pub fn side(&self) -> u16 {
        self.side
    }

    #[inline]
    pub fn in_bounds(&self, x: Coord, y: Coord) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.side as u32 && (y as u32) < self.side as u32
    }

    #[inline]
    fn index(&self, x: Coord, y: Coord) -> usize {
        y as usize * self.side as usize + x as usize
    }

    /// Returns the cell value, or `T::default()` if out of bounds.
    pub fn get(&self, x: Coord, y: Coord) -> T {
        if !self.in_bounds(x, y) {
            return T::default();
        }
        self.cells[self.index(x, y)]
    }

    /// No-op if out of bounds.
    pub fn set(&mut self, x: Coord, y: Coord, value: T) {
        if !self.in_bounds(x, y) {
            return;
        }
        let idx = self.index(x, y);
        self.cells[idx] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.cells.fill(value);
    }

    pub fn iter_cells(&self) -> impl Iterator<Item = (Coord, Coord, &T)> {
        let side = self.side as Coord;
        self.cells.iter().enumerate().map(move |(i, v)| {
            let x = (i as Coord) % side;
            let y = (i as Coord) / side;
            (x, y, v)
        })
    }

    pub fn raw(&self) -> &[T] {
        &self.cells
    }

    pub fn raw_mut(&mut self) -> &mut [T] {
        &mut self.cells
    }

    /// 4-connected neighbor coordinates that are in bounds.
    pub fn neighbors4(&self, x: Coord, y: Coord) -> impl Iterator<Item = (Coord, Coord)> + '_ {
        [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
            .into_iter()
            .filter(move |&(nx, ny)| self.in_bounds(nx, ny))
    }
}

// ---------------------------------------------------------------------------
// Terrain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TerrainType {
    Substrate = 0,
    Slope = 1,
    DeepVoid = 2,
    FlowChannel = 3,
    StillBasin = 4,
    BlightMires = 5,
    EmberCrust = 6,
}

impl Default for TerrainType {
    fn default() -> Self {
        TerrainType::Substrate
    }
}

impl TerrainType {
    pub fn is_water(self) -> bool {
        matches!(
            self,
            TerrainType::DeepVoid | TerrainType::FlowChannel | TerrainType::StillBasin
        )
    }

    pub fn is_terraformable_source(self) -> bool {
        matches!(self, TerrainType::BlightMires | TerrainType::EmberCrust)
    }

    pub fn is_buildable(self) -> bool {
        matches!(self, TerrainType::Substrate | TerrainType::Slope)
    }
}

bitflags_like! {
    /// Terrain cell flags. Kept as a raw byte for the exact 4-byte POD
    /// layout spec §3.2 specifies (type, elevation, moisture, flags).
    pub struct TerrainFlags: u8 {
        const CLEARED = 0b0000_0001;
        const RESERVED_SPAWN = 0b0000_0010;
    }
}

/// 4-byte POD terrain cell: `(terrain_type, elevation 0..31, moisture, flags)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct TerrainCell {
    pub terrain_type: TerrainType,
    pub elevation: u8,
    pub moisture: u8,
    pub flags: TerrainFlags,
}

impl Default for TerrainCell {
    fn default() -> Self {
        Self {
            terrain_type: TerrainType::Substrate,
            elevation: 0,
            moisture: 0,
            flags: TerrainFlags::empty(),
        }
    }
}

pub type TerrainGrid = DenseGrid<TerrainCell>;

// ---------------------------------------------------------------------------
// Water body / flow direction
// ---------------------------------------------------------------------------

pub type WaterBodyGrid = DenseGrid<u16>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum FlowDirection {
    #[default]
    None = 0,
    N = 1,
    Ne = 2,
    E = 3,
    Se = 4,
    S = 5,
    Sw = 6,
    W = 7,
    Nw = 8,
}

impl FlowDirection {
    /// Unknown/out-of-range byte values clamp to `None` (spec §4.12).
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => FlowDirection::N,
            2 => FlowDirection::Ne,
            3 => FlowDirection::E,
            4 => FlowDirection::Se,
            5 => FlowDirection::S,
            6 => FlowDirection::Sw,
            7 => FlowDirection::W,
            8 => FlowDirection::Nw,
            _ => FlowDirection::None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

pub type FlowDirectionGrid = DenseGrid<FlowDirection>;

// ---------------------------------------------------------------------------
// Occupancy / proximity / network id / chunk dirty / land value
// ---------------------------------------------------------------------------

use crate::ids::EntityId;

/// `0` = empty (EntityId::INVALID), else the occupying building's id.
pub type OccupancyGrid = DenseGrid<EntityId>;

/// Distance-to-nearest-pathway, `255` = out of range.
pub type ProximityGrid = DenseGrid<u8>;
pub const PROXIMITY_OUT_OF_RANGE: u8 = 255;

/// Connected-component id of the pathway graph; `0` = none.
pub type NetworkIdGrid = DenseGrid<u16>;

/// Desirability byte, `128` = neutral.
pub type LandValueGrid = DenseGrid<u8>;
pub const LAND_VALUE_NEUTRAL: u8 = 128;

/// One bit per 32x32 chunk. Implemented as a byte-per-chunk grid for
/// simplicity (still O(1) mark/clear/test); a host renderer only needs
/// presence, not the exact bit packing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDirtyGrid {
    dirty: Vec<bool>,
    chunks_per_side: u16,
}

impl ChunkDirtyGrid {
    pub fn new(map_side: u16, chunk_size: u16) -> Self {
        let chunks_per_side = map_side.div_ceil(chunk_size).max(1);
        Self {
            dirty: vec![false; chunks_per_side as usize * chunks_per_side as usize],
            chunks_per_side,
        }
    }

    pub fn mark_dirty_for_tile(&mut self, x: Coord, y: Coord, chunk_size: u16) {
        if x < 0 || y < 0 {
            return;
        }
        let cx = (x as u32 / chunk_size as u32) as usize;
        let cy = (y as u32 / chunk_size as u32) as usize;
        let idx = cy * self.chunks_per_side as usize + cx;
        if let Some(slot) = self.dirty.get_mut(idx) {
            *slot = true;
        }
    }

    pub fn clear_all(&mut self) {
        self.dirty.fill(false);
    }

    pub fn dirty_chunks(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        let side = self.chunks_per_side;
        self.dirty.iter().enumerate().filter_map(move |(i, &d)| {
            d.then(|| ((i as u16) % side, (i as u16) / side))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_read_returns_default() {
        let grid: DenseGrid<u8> = DenseGrid::new(256);
        assert_eq!(grid.get(-1, 0), 0);
        assert_eq!(grid.get(0, -1), 0);
        assert_eq!(grid.get(256, 0), 0);
        assert_eq!(grid.get(0, 256), 0);
    }

    #[test]
    fn out_of_bounds_write_is_noop() {
        let mut grid: DenseGrid<u8> = DenseGrid::new(128);
        grid.set(-1, 5, 42);
        grid.set(128, 5, 42);
        assert_eq!(grid.get(-1, 5), 0);
        assert_eq!(grid.get(128, 5), 0);
    }

    #[test]
    fn in_bounds_roundtrip() {
        let mut grid: DenseGrid<u8> = DenseGrid::new(256);
        grid.set(10, 20, 7);
        assert_eq!(grid.get(10, 20), 7);
    }

    #[test]
    fn water_body_id_zero_iff_not_water() {
        let mut terrain = TerrainGrid::new(128);
        let mut water = WaterBodyGrid::new(128);
        terrain.set(
            5,
            5,
            TerrainCell {
                terrain_type: TerrainType::FlowChannel,
                ..Default::default()
            },
        );
        water.set(5, 5, 7);
        assert!(terrain.get(5, 5).terrain_type.is_water());
        assert_ne!(water.get(5, 5), 0);
        assert_eq!(water.get(6, 6), 0);
        assert!(!terrain.get(6, 6).terrain_type.is_water());
    }

    #[test]
    fn flow_direction_unknown_byte_clamps_to_none() {
        assert_eq!(FlowDirection::from_byte(200), FlowDirection::None);
        assert_eq!(FlowDirection::from_byte(3), FlowDirection::E);
    }

    #[test]
    fn neighbors4_respects_edges() {
        let grid: DenseGrid<u8> = DenseGrid::new(4);
        let corner: Vec<_> = grid.neighbors4(0, 0).collect();
        assert_eq!(corner.len(), 2);
        let middle: Vec<_> = grid.neighbors4(1, 1).collect();
        assert_eq!(middle.len(), 4);
    }

    #[test]
    fn chunk_dirty_tracks_and_clears() {
        let mut chunks = ChunkDirtyGrid::new(256, 32);
        chunks.mark_dirty_for_tile(40, 40, 32);
        let dirty: Vec<_> = chunks.dirty_chunks().collect();
        assert_eq!(dirty, vec![(1, 1)]);
        chunks.clear_all();
        assert_eq!(chunks.dirty_chunks().count(), 0);
    }
}
