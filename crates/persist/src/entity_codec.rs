//! Entity-bundle serialization (spec §4.12: "layout not mandated ... all
//! trivially-POD components must round-trip bit-exact").
//!
//! Every component kind already derives `bitcode::{Encode, Decode}`
//! (`colonycore_core::components`), so each `EntityRecord` round-trips
//! bit-exact through `bitcode::encode`/`decode` for free -- no hand-written
//! byte layout is owed here the way the grid header is. The section itself
//! is a trailing `u32` little-endian entity count followed by a flat run of
//! length-prefixed, individually bitcode-encoded records (rather than one
//! `bitcode::encode` over the whole `Vec`) so a corrupt record can be
//! reported without discarding every record after it. None of the current
//! component kinds carry a `String` field, so the length-prefixed-UTF-8 rule
//! spec §4.12 mentions for non-POD fields has nothing to apply to yet; a
//! future component that adds one gets it from `bitcode` automatically too.

use bitcode::{Decode, Encode};

use colonycore_core::components::{
    Building, ContaminationSource, Construction, Debris, EnergyConduit, EnergyNexus,
    FluidConduit, FluidExtractor, FluidReservoir, Ownership, Position, Rail, Road, Terminal,
    TerrainModification, Traffic,
};
use colonycore_core::entity_store::EntityStore;
use colonycore_core::ids::EntityId;

use crate::error::PersistError;

/// One entity's full component bundle, keyed by its raw id. `Option<T>` per
/// column mirrors [`colonycore_core::entity_store::Column`]'s sparse
/// membership -- most entities only populate a handful of these.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct EntityRecord {
    pub id: u32,
    pub building: Option<Building>,
    pub construction: Option<Construction>,
    pub debris: Option<Debris>,
    pub road: Option<Road>,
    pub traffic: Option<Traffic>,
    pub rail: Option<Rail>,
    pub terminal: Option<Terminal>,
    pub energy_nexus: Option<EnergyNexus>,
    pub energy_conduit: Option<EnergyConduit>,
    pub fluid_extractor: Option<FluidExtractor>,
    pub fluid_reservoir: Option<FluidReservoir>,
    pub fluid_conduit: Option<FluidConduit>,
    pub ownership: Option<Ownership>,
    pub position: Option<Position>,
    pub terrain_modification: Option<TerrainModification>,
    pub contamination_source: Option<ContaminationSource>,
}

/// Snapshots every live entity's component bundle, in the store's
/// deterministic insertion order.
pub fn capture_entities(store: &EntityStore) -> Vec<EntityRecord> {
    store
        .live_ids()
        .map(|id| EntityRecord {
            id: id.raw(),
            building: store.buildings.get(id).copied(),
            construction: store.constructions.get(id).copied(),
            debris: store.debris.get(id).copied(),
            road: store.roads.get(id).copied(),
            traffic: store.traffic.get(id).copied(),
            rail: store.rails.get(id).copied(),
            terminal: store.terminals.get(id).copied(),
            energy_nexus: store.energy_nexuses.get(id).copied(),
            energy_conduit: store.energy_conduits.get(id).copied(),
            fluid_extractor: store.fluid_extractors.get(id).copied(),
            fluid_reservoir: store.fluid_reservoirs.get(id).copied(),
            fluid_conduit: store.fluid_conduits.get(id).copied(),
            ownership: store.ownerships.get(id).copied(),
            position: store.positions.get(id).copied(),
            terrain_modification: store.terrain_modifications.get(id).copied(),
            contamination_source: store.contamination_sources.get(id).copied(),
        })
        .collect()
}

/// Encodes `[u32 LE count][u32 LE len, bitcode bytes]*count` (spec §4.12's
/// ambient entity-bundle convention, see module docs).
pub fn encode_entities(store: &EntityStore) -> Vec<u8> {
    let records = capture_entities(store);
    let mut out = Vec::new();
    out.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for record in &records {
        let encoded = bitcode::encode(record);
        out.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        out.extend_from_slice(&encoded);
    }
    out
}

pub fn decode_entities(bytes: &[u8]) -> Result<Vec<EntityRecord>, PersistError> {
    if bytes.len() < 4 {
        return Err(PersistError::InsufficientData { expected: 4, actual: bytes.len() });
    }
    let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;

    let mut records = Vec::with_capacity(count);
    let mut cursor = 4usize;
    for _ in 0..count {
        if bytes.len() < cursor + 4 {
            return Err(PersistError::InsufficientData { expected: cursor + 4, actual: bytes.len() });
        }
        let len = u32::from_le_bytes([bytes[cursor], bytes[cursor + 1], bytes[cursor + 2], bytes[cursor + 3]]) as usize;
        cursor += 4;
        if bytes.len() < cursor + len {
            return Err(PersistError::InsufficientData { expected: cursor + len, actual: bytes.len() });
        }
        let record: EntityRecord = bitcode::decode(&bytes[cursor..cursor + len]).map_err(|_| PersistError::CorruptData)?;
        cursor += len;
        records.push(record);
    }

    Ok(records)
}

/// Rebuilds an [`EntityStore`] from decoded records, restoring each
/// entity's original id (see [`EntityStore::restore`]) rather than
/// reallocating fresh ones, so references captured elsewhere in a save
/// (e.g. an owner's building list) still resolve.
pub fn restore_entities(records: Vec<EntityRecord>) -> EntityStore {
    let mut store = EntityStore::new();
    for record in records {
        let id = EntityId::from_raw(record.id);
        store.restore(id);
        if let Some(building) = record.building {
            store.buildings.insert(id, building);
        }
        if let Some(construction) = record.construction {
            store.constructions.insert(id, construction);
        }
        if let Some(debris) = record.debris {
            store.debris.insert(id, debris);
        }
        if let Some(road) = record.road {
            store.roads.insert(id, road);
        }
        if let Some(traffic) = record.traffic {
            store.traffic.insert(id, traffic);
        }
        if let Some(rail) = record.rail {
            store.rails.insert(id, rail);
        }
        if let Some(terminal) = record.terminal {
            store.terminals.insert(id, terminal);
        }
        if let Some(energy_nexus) = record.energy_nexus {
            store.energy_nexuses.insert(id, energy_nexus);
        }
        if let Some(energy_conduit) = record.energy_conduit {
            store.energy_conduits.insert(id, energy_conduit);
        }
        if let Some(fluid_extractor) = record.fluid_extractor {
            store.fluid_extractors.insert(id, fluid_extractor);
        }
        if let Some(fluid_reservoir) = record.fluid_reservoir {
            store.fluid_reservoirs.insert(id, fluid_reservoir);
        }
        if let Some(fluid_conduit) = record.fluid_conduit {
            store.fluid_conduits.insert(id, fluid_conduit);
        }
        if let Some(ownership) = record.ownership {
            store.ownerships.insert(id, ownership);
        }
        if let Some(position) = record.position {
            store.positions.insert(id, position);
        }
        if let Some(terrain_modification) = record.terrain_modification {
            store.terrain_modifications.insert(id, terrain_modification);
        }
        if let Some(contamination_source) = record.contamination_source {
            store.contamination_sources.insert(id, contamination_source);
        }
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use colonycore_core::components::{BuildingState, Density, Footprint, ZoneType};
    use colonycore_core::ids::Tick;

    fn sample_building() -> Building {
        Building {
            template_id: 7,
            state: BuildingState::Active,
            zone_type: ZoneType::Habitation,
            density: Density::Low,
            level: 1,
            health: 255,
            capacity: 10,
            current_occupancy: 4,
            footprint: Footprint::new(2, 2),
            rotation: 0,
            color_accent: 3,
            abandon_timer: 0,
            state_changed_tick: Tick(42),
        }
    }

    #[test]
    fn captures_every_populated_column_for_a_live_entity() {
        let mut store = EntityStore::new();
        let id = store.spawn();
        store.buildings.insert(id, sample_building());
        store.ownerships.insert(id, Ownership { owner: colonycore_core::ids::PlayerId(1) });

        let records = capture_entities(&store);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id.raw());
        assert_eq!(records[0].building, Some(sample_building()));
        assert!(records[0].construction.is_none());
    }

    #[test]
    fn roundtrips_through_bitcode_bit_exact() {
        let mut store = EntityStore::new();
        let a = store.spawn();
        store.buildings.insert(a, sample_building());
        let b = store.spawn();
        store.positions.insert(b, Position { x: 3, y: 9, z: 0.0 });

        let bytes = encode_entities(&store);
        let records = decode_entities(&bytes).expect("decode");
        assert_eq!(records, capture_entities(&store));
    }

    #[test]
    fn restored_entities_keep_their_original_ids_and_stay_live() {
        let mut store = EntityStore::new();
        let a = store.spawn();
        store.buildings.insert(a, sample_building());
        let _ = store.spawn(); // leave a gap so ids aren't contiguous
        let c = store.spawn();
        store.positions.insert(c, Position { x: 1, y: 1, z: 0.0 });

        let records = capture_entities(&store);
        let restored = restore_entities(records);

        assert!(restored.is_alive(a));
        assert!(restored.is_alive(c));
        assert_eq!(restored.buildings.get(a), Some(&sample_building()));
        assert_eq!(restored.positions.get(c), Some(&Position { x: 1, y: 1, z: 0.0 }));
    }

    #[test]
    fn allocator_resumes_past_the_highest_restored_id() {
        let mut store = EntityStore::new();
        for _ in 0..5 {
            store.spawn();
        }
        let records = capture_entities(&store);
        let mut restored = restore_entities(records);
        let fresh = restored.spawn();
        assert_eq!(fresh.raw(), 6);
    }

    #[test]
    fn corrupt_bytes_are_rejected_not_panicked_on() {
        let mut bytes = 1u32.to_le_bytes().to_vec(); // count = 1
        bytes.extend_from_slice(&4u32.to_le_bytes()); // record length = 4
        bytes.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]); // not a valid EntityRecord
        assert_eq!(decode_entities(&bytes), Err(PersistError::CorruptData));
    }

    #[test]
    fn a_truncated_count_is_insufficient_data_not_corrupt() {
        let garbage = vec![1u8, 2, 3];
        assert_eq!(decode_entities(&garbage), Err(PersistError::InsufficientData { expected: 4, actual: 3 }));
    }
}
