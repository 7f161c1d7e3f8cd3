//! Sparse entity/component store (spec §3.3, §9 "entt-style registries").
//!
//! Modeled as one `HashMap<EntityId, T>` per component kind rather than a
//! struct-of-arrays layout -- spec §9 explicitly permits either
//! representation as long as the invariants and iteration contracts hold,
//! and per-entity bundles are the simpler fit for a hand-rolled store with no
//! archetype/query-compiler machinery.

use std::collections::HashMap;

use crate::components::{
    Building, Construction, ContaminationSource, Debris, EnergyConduit, EnergyNexus,
    FluidConduit, FluidExtractor, FluidReservoir, Ownership, Position, Rail, Road, Terminal,
    TerrainModification, Traffic,
};
use crate::ids::{EntityId, EntityIdAllocator};

/// A single component column: sparse `EntityId -> T` with insertion order
/// preserved for deterministic iteration (`HashMap` iteration order is not
/// deterministic across runs, so every kind also keeps an insertion-ordered
/// key vector).
#[derive(Debug, Default)]
pub struct Column<T> {
    map: HashMap<EntityId, T>,
    order: Vec<EntityId>,
}

impl<T> Column<T> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn insert(&mut self, id: EntityId, value: T) {
        if !self.map.contains_key(&id) {
            self.order.push(id);
        }
        self.map.insert(id, value);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let removed = self.map.remove(&id);
        if removed.is_some() {
            self.order.retain(|&k| k != id);
        }
        removed
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.map.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.map.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.map.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Deterministic, insertion-ordered iteration.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.order.iter().map(move |&id| (id, &self.map[&id]))
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.order.iter().copied()
    }
}

/// Owns every component column plus entity-id allocation and liveness.
///
/// Entity "destruction" means removing it from every column it could belong
/// to and from the live set; a destroyed id is never reused (monotonic
/// allocation per spec §3.1).
#[derive(Debug, Default)]
pub struct EntityStore {
    allocator: EntityIdAllocator,
    live: HashMap<EntityId, ()>,
    live_order: Vec<EntityId>,

    pub buildings: Column<Building>,
    pub constructions: Column<Construction>,
    pub debris: Column<Debris>,
    pub roads: Column<Road>,
    pub traffic: Column<Traffic>,
    pub rails: Column<Rail>,
    pub terminals: Column<Terminal>,
    pub energy_nexuses: Column<EnergyNexus>,
    pub energy_conduits: Column<EnergyConduit>,
    pub fluid_extractors: Column<FluidExtractor>,
    pub fluid_reservoirs: Column<FluidReservoir>,
    pub fluid_conduits: Column<FluidConduit>,
    pub ownerships: Column<Ownership>,
    pub positions: Column<Position>,
    pub terrain_modifications: Column<TerrainModification>,
    pub contamination_sources: Column<ContaminationSource>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            allocator: EntityIdAllocator::new(),
            ..Default::default()
        }
    }

    pub fn spawn(&mut self) -> EntityId {
        let id = self.allocator.alloc();
        self.live.insert(id, ());
        self.live_order.push(id);
        id
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.live.contains_key(&id)
    }

    /// Marks `id` alive without allocating a fresh one, for a deserializer
    /// restoring entities with their original ids. Advances the allocator
    /// past `id` so subsequent [`Self::spawn`] calls never collide with it.
    /// Component columns are public, so the caller inserts each component
    /// directly after this.
    pub fn restore(&mut self, id: EntityId) {
        if self.live.insert(id, ()).is_none() {
            self.live_order.push(id);
        }
        self.allocator.ensure_next_after(id);
    }

    /// Removes the entity from every component column and the live set.
    pub fn destroy(&mut self, id: EntityId) {
        self.buildings.remove(id);
        self.constructions.remove(id);
        self.debris.remove(id);
        self.roads.remove(id);
        self.traffic.remove(id);
        self.rails.remove(id);
        self.terminals.remove(id);
        self.energy_nexuses.remove(id);
        self.energy_conduits.remove(id);
        self.fluid_extractors.remove(id);
        self.fluid_reservoirs.remove(id);
        self.fluid_conduits.remove(id);
        self.ownerships.remove(id);
        self.positions.remove(id);
        self.terrain_modifications.remove(id);
        self.contamination_sources.remove(id);
        if self.live.remove(&id).is_some() {
            self.live_order.retain(|&k| k != id);
        }
    }

    pub fn live_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.live_order.iter().copied()
    }

    pub fn entity_count(&self) -> usize {
        self.live_order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Building, BuildingState, Density, Footprint, ZoneType};
    use crate::ids::Tick;

    fn sample_building() -> Building {
        Building {
            template_id: 1,
            state: BuildingState::Materializing,
            zone_type: ZoneType::Habitation,
            density: Density::Low,
            level: 0,
            health: 255,
            capacity: 10,
            current_occupancy: 0,
            footprint: Footprint::new(1, 1),
            rotation: 0,
            color_accent: 0,
            abandon_timer: 0,
            state_changed_tick: Tick::ZERO,
        }
    }

    #[test]
    fn spawn_allocates_distinct_ids_and_marks_alive() {
        let mut store = EntityStore::new();
        let a = store.spawn();
        let b = store.spawn();
        assert_ne!(a, b);
        assert!(store.is_alive(a));
        assert!(store.is_alive(b));
        assert_eq!(store.entity_count(), 2);
    }

    #[test]
    fn destroy_clears_every_column_and_liveness() {
        let mut store = EntityStore::new();
        let id = store.spawn();
        store.buildings.insert(id, sample_building());
        store.destroy(id);
        assert!(!store.is_alive(id));
        assert!(store.buildings.get(id).is_none());
        assert_eq!(store.entity_count(), 0);
    }

    #[test]
    fn column_iteration_is_insertion_ordered() {
        let mut store = EntityStore::new();
        let ids: Vec<_> = (0..5).map(|_| store.spawn()).collect();
        for &id in ids.iter().rev() {
            store.buildings.insert(id, sample_building());
        }
        let iterated: Vec<_> = store.buildings.ids().collect();
        let expected: Vec<_> = ids.iter().rev().copied().collect();
        assert_eq!(iterated, expected);
    }

    #[test]
    fn destroyed_ids_are_never_reallocated() {
        let mut store = EntityStore::new();
        let a = store.spawn();
        store.destroy(a);
        let b = store.spawn();
        let c = store.spawn();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }
}
