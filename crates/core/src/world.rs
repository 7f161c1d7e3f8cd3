//! The shared world state every subsystem's `tick()` mutates or reads.
//!
//! Grids are mutated only by their owning subsystem and read-only by others
//! (spec §5 "shared-resource policy"); this struct is simply where the
//! orchestrator keeps all of it so a `&mut SimWorld` can be threaded through
//! the dispatch loop instead of each subsystem owning a disjoint, hard-to-
//! coordinate slice of state.

use crate::config::SimConfig;
use crate::contamination::ContaminationField;
use crate::entity_store::EntityStore;
use crate::events::EventBus;
use crate::grid::{
    ChunkDirtyGrid, FlowDirectionGrid, LandValueGrid, NetworkIdGrid, OccupancyGrid, ProximityGrid,
    TerrainGrid, WaterBodyGrid,
};
use crate::ids::EntityId;
use crate::rng::Xoshiro256StarStar;

/// Road-cell presence grid: `EntityId::INVALID` = no pathway at this tile,
/// otherwise the id of the `Road` entity occupying it (spec §3.2).
pub type PathwayGrid = crate::grid::DenseGrid<EntityId>;

/// Conduit-cell presence grid, energy and fluid's counterpart to
/// [`PathwayGrid`]: `EntityId::INVALID` = no conduit at this tile, otherwise
/// the id of the conduit entity occupying it (spec §4.7 "connected via
/// conduits").
pub type ConduitGrid = crate::grid::DenseGrid<EntityId>;

pub struct SimWorld {
    pub entities: EntityStore,
    pub terrain: TerrainGrid,
    pub water_body: WaterBodyGrid,
    pub flow_direction: FlowDirectionGrid,
    pub occupancy: OccupancyGrid,
    pub pathway: PathwayGrid,
    pub proximity: ProximityGrid,
    pub network_id: NetworkIdGrid,
    pub energy_conduit: ConduitGrid,
    pub energy_network_id: NetworkIdGrid,
    pub fluid_conduit: ConduitGrid,
    pub fluid_network_id: NetworkIdGrid,
    pub land_value: LandValueGrid,
    pub chunk_dirty: ChunkDirtyGrid,
    pub contamination: ContaminationField,
    pub events: EventBus,
    pub config: SimConfig,
    pub rng: Xoshiro256StarStar,
    pub map_side: u16,
    pub map_seed: u64,
}

impl SimWorld {
    pub fn new(map_side: u16, map_seed: u64, config: SimConfig) -> Self {
        Self {
            entities: EntityStore::new(),
            terrain: TerrainGrid::new(map_side),
            water_body: WaterBodyGrid::new(map_side),
            flow_direction: FlowDirectionGrid::new(map_side),
            occupancy: OccupancyGrid::new(map_side),
            pathway: PathwayGrid::new(map_side),
            proximity: ProximityGrid::new(map_side),
            network_id: NetworkIdGrid::new(map_side),
            energy_conduit: ConduitGrid::new(map_side),
            energy_network_id: NetworkIdGrid::new(map_side),
            fluid_conduit: ConduitGrid::new(map_side),
            fluid_network_id: NetworkIdGrid::new(map_side),
            land_value: LandValueGrid::new(map_side),
            chunk_dirty: ChunkDirtyGrid::new(map_side, crate::config::CHUNK_SIZE),
            contamination: ContaminationField::new(map_side),
            events: EventBus::new(),
            config,
            rng: Xoshiro256StarStar::new(map_seed),
            map_side,
            map_seed,
        }
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        self.terrain.in_bounds(x, y)
    }

    /// Used by tests/scenarios that need a fixed current tick without
    /// running the full scheduler (e.g. grace-period expiry math).
    pub fn mark_chunk_dirty(&mut self, x: i32, y: i32) {
        self.chunk_dirty
            .mark_dirty_for_tile(x, y, crate::config::CHUNK_SIZE);
    }
}
