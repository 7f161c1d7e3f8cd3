//! Grid snapshot encode/decode: the header plus the three dense sections
//! spec §4.12 mandates (terrain cells, water body ids, flow directions).

use colonycore_core::grid::{FlowDirection, FlowDirectionGrid, TerrainCell, TerrainFlags, TerrainGrid, TerrainType, WaterBodyGrid};
use colonycore_core::terrain_gen::SEA_LEVEL;
use colonycore_core::world::SimWorld;

use crate::error::PersistError;
use crate::header::{SnapshotHeader, FORMAT_VERSION, HEADER_SIZE};

const TERRAIN_CELL_BYTES: usize = 4;
const WATER_BODY_CELL_BYTES: usize = 2;
const FLOW_DIRECTION_CELL_BYTES: usize = 1;

/// The grid portion of a world snapshot: everything spec §4.12 names.
/// Everything else `SimWorld` owns (occupancy, network ids, land value,
/// contamination, ...) is derived state the subsystems rebuild as ticks run
/// rather than a source of truth that needs to survive a save/load cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    pub sea_level: u8,
    pub map_seed: u32,
    pub terrain: TerrainGrid,
    pub water_body: WaterBodyGrid,
    pub flow_direction: FlowDirectionGrid,
}

impl GridSnapshot {
    /// Captures the persisted portion of a running world. `map_seed` is
    /// truncated to the low 32 bits -- the header field is a `u32` (spec
    /// §4.12) while [`SimWorld::map_seed`] is a `u64` PRNG seed; truncating
    /// changes the value a restored map would report but not anything the
    /// deterministic grid generator reads back, since [`Self::terrain`] etc.
    /// are already-generated cell data, not a re-seeded regeneration.
    pub fn from_world(world: &SimWorld) -> Self {
        Self {
            sea_level: SEA_LEVEL,
            map_seed: world.map_seed as u32,
            terrain: world.terrain.clone(),
            water_body: world.water_body.clone(),
            flow_direction: world.flow_direction.clone(),
        }
    }

    pub fn width(&self) -> u16 {
        self.terrain.side()
    }

    pub fn encode(&self) -> Vec<u8> {
        let side = self.terrain.side();
        let cell_count = side as usize * side as usize;
        let mut out = Vec::with_capacity(
            HEADER_SIZE + cell_count * (TERRAIN_CELL_BYTES + WATER_BODY_CELL_BYTES + FLOW_DIRECTION_CELL_BYTES),
        );

        let header = SnapshotHeader {
            format_version: FORMAT_VERSION,
            width: side,
            height: side,
            sea_level: self.sea_level,
            map_seed: self.map_seed,
        };
        out.extend_from_slice(&header.encode());

        for cell in self.terrain.raw() {
            out.push(cell.terrain_type as u8);
            out.push(cell.elevation);
            out.push(cell.moisture);
            out.push(cell.flags.bits());
        }
        for &id in self.water_body.raw() {
            out.extend_from_slice(&id.to_le_bytes());
        }
        for &dir in self.flow_direction.raw() {
            out.push(dir.to_byte());
        }

        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PersistError> {
        let header = SnapshotHeader::decode(bytes)?;
        let side = header.width;
        let cell_count = side as usize * side as usize;
        let terrain_bytes = cell_count * TERRAIN_CELL_BYTES;
        let water_bytes = cell_count * WATER_BODY_CELL_BYTES;
        let flow_bytes = cell_count * FLOW_DIRECTION_CELL_BYTES;
        let expected = HEADER_SIZE + terrain_bytes + water_bytes + flow_bytes;
        if bytes.len() < expected {
            return Err(PersistError::InsufficientData { expected, actual: bytes.len() });
        }

        let mut terrain = TerrainGrid::new(side);
        let terrain_section = &bytes[HEADER_SIZE..HEADER_SIZE + terrain_bytes];
        for (i, chunk) in terrain_section.chunks_exact(TERRAIN_CELL_BYTES).enumerate() {
            let terrain_type = terrain_type_from_byte(chunk[0]).ok_or(PersistError::CorruptData)?;
            let cell = TerrainCell {
                terrain_type,
                elevation: chunk[1],
                moisture: chunk[2],
                flags: TerrainFlags::from_bits(chunk[3]),
            };
            let x = (i as i32) % side as i32;
            let y = (i as i32) / side as i32;
            terrain.set(x, y, cell);
        }

        let mut water_body = WaterBodyGrid::new(side);
        let water_start = HEADER_SIZE + terrain_bytes;
        let water_section = &bytes[water_start..water_start + water_bytes];
        for (i, chunk) in water_section.chunks_exact(WATER_BODY_CELL_BYTES).enumerate() {
            let id = u16::from_le_bytes([chunk[0], chunk[1]]);
            let x = (i as i32) % side as i32;
            let y = (i as i32) / side as i32;
            water_body.set(x, y, id);
        }

        let mut flow_direction = FlowDirectionGrid::new(side);
        let flow_start = water_start + water_bytes;
        let flow_section = &bytes[flow_start..flow_start + flow_bytes];
        for (i, &byte) in flow_section.iter().enumerate() {
            let x = (i as i32) % side as i32;
            let y = (i as i32) / side as i32;
            flow_direction.set(x, y, FlowDirection::from_byte(byte));
        }

        Ok(Self { sea_level: header.sea_level, map_seed: header.map_seed, terrain, water_body, flow_direction })
    }
}

fn terrain_type_from_byte(b: u8) -> Option<TerrainType> {
    match b {
        0 => Some(TerrainType::Substrate),
        1 => Some(TerrainType::Slope),
        2 => Some(TerrainType::DeepVoid),
        3 => Some(TerrainType::FlowChannel),
        4 => Some(TerrainType::StillBasin),
        5 => Some(TerrainType::BlightMires),
        6 => Some(TerrainType::EmberCrust),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(side: u16) -> GridSnapshot {
        let mut terrain = TerrainGrid::new(side);
        let mut water_body = WaterBodyGrid::new(side);
        let mut flow_direction = FlowDirectionGrid::new(side);

        terrain.set(
            0,
            0,
            TerrainCell { terrain_type: TerrainType::BlightMires, elevation: 7, moisture: 200, flags: TerrainFlags::CLEARED },
        );
        terrain.set(1, 1, TerrainCell { terrain_type: TerrainType::StillBasin, elevation: 3, moisture: 255, flags: TerrainFlags::empty() });
        water_body.set(1, 1, 42);
        flow_direction.set(1, 1, FlowDirection::Se);

        GridSnapshot { sea_level: SEA_LEVEL, map_seed: 12345, terrain, water_body, flow_direction }
    }

    #[test]
    fn roundtrips_bit_exact() {
        let snapshot = sample(128);
        let bytes = snapshot.encode();
        let decoded = GridSnapshot::decode(&bytes).expect("decode");
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn encoded_length_matches_the_header_formula() {
        let snapshot = sample(128);
        let bytes = snapshot.encode();
        let cells = 128usize * 128;
        assert_eq!(bytes.len(), HEADER_SIZE + cells * (TERRAIN_CELL_BYTES + WATER_BODY_CELL_BYTES + FLOW_DIRECTION_CELL_BYTES));
    }

    #[test]
    fn rejects_an_out_of_range_terrain_type_byte() {
        let snapshot = sample(128);
        let mut bytes = snapshot.encode();
        bytes[HEADER_SIZE] = 200; // terrain_type of cell (0,0)
        assert_eq!(GridSnapshot::decode(&bytes), Err(PersistError::CorruptData));
    }

    #[test]
    fn an_unknown_flow_direction_byte_clamps_to_none() {
        let snapshot = sample(128);
        let mut bytes = snapshot.encode();
        let cells = 128usize * 128;
        let flow_start = HEADER_SIZE + cells * (TERRAIN_CELL_BYTES + WATER_BODY_CELL_BYTES);
        bytes[flow_start] = 250;
        let decoded = GridSnapshot::decode(&bytes).expect("decode");
        assert_eq!(decoded.flow_direction.get(0, 0), FlowDirection::None);
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let snapshot = sample(128);
        let bytes = snapshot.encode();
        let result = GridSnapshot::decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(PersistError::InsufficientData { .. })));
    }
}
