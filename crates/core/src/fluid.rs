//! Fluid subsystem: conduit network connectivity, extractor output scaled by
//! water proximity, reservoir buffering, and per-player pools (spec §4.7,
//! priority 42). Mirrors [`crate::energy`]'s connectivity and pool-state
//! machinery; the fluid-specific addition is the reservoir buffer that energy
//! has no counterpart for.

use std::collections::{HashMap, VecDeque};

use crate::components::{FluidConduit, FluidExtractor, FluidReservoir, Ownership, Position};
use crate::config::priority;
use crate::error::ValidationError;
use crate::events::{ConduitPlaced, ConduitRemoved, PoolKind, PoolStateChanged, ReservoirLevelChanged};
use crate::ids::{Coord, EntityId, PlayerId};
use crate::providers::{FluidProvider, PoolOperationalState};
use crate::subsystem::{SchedulerTime, Simulatable};
use crate::world::SimWorld;

const MAX_PLAYER_SLOTS: usize = PlayerId::MAX_PLAYERS as usize + 1;

/// Max BFS search range for a water source at extractor placement time;
/// beyond this the tile is rejected outright rather than accepted with a
/// token output (spec §4.7 "require proximity to a water source tile").
const MAX_WATER_SEARCH_RANGE: u8 = 16;

fn pool_state_from_ratio(available: f32, consumed: f32) -> PoolOperationalState {
    if consumed <= 0.0 {
        return PoolOperationalState::Healthy;
    }
    let ratio = available / consumed;
    if ratio >= 1.0 {
        PoolOperationalState::Healthy
    } else if ratio >= 0.85 {
        PoolOperationalState::Marginal
    } else if ratio >= 0.5 {
        PoolOperationalState::Deficit
    } else {
        PoolOperationalState::Collapse
    }
}

fn to_event_state(state: PoolOperationalState) -> crate::events::PoolState {
    use crate::events::PoolState;
    match state {
        PoolOperationalState::Healthy => PoolState::Healthy,
        PoolOperationalState::Marginal => PoolState::Marginal,
        PoolOperationalState::Deficit => PoolState::Deficit,
        PoolOperationalState::Collapse => PoolState::Collapse,
    }
}

/// Output falloff with water distance: full rate adjacent to water, linear
/// falloff to a 20% floor at [`MAX_WATER_SEARCH_RANGE`] (decided; spec only
/// requires output to scale with distance, not the exact curve).
fn extractor_efficiency(water_distance: u8) -> f32 {
    let t = water_distance as f32 / MAX_WATER_SEARCH_RANGE as f32;
    (1.0 - 0.8 * t.clamp(0.0, 1.0)).clamp(0.2, 1.0)
}

#[derive(Debug, Clone, Copy, Default)]
struct PlayerPool {
    generated: f32,
    consumed: f32,
    reservoir_stored: f32,
    state: PoolOperationalState,
}

fn slot(owner: PlayerId) -> usize {
    (owner.0 as usize).min(MAX_PLAYER_SLOTS - 1)
}

pub struct Fluid {
    network_dirty: bool,
    placed_since_last_drain: Vec<ConduitPlaced>,
    removed_since_last_drain: Vec<ConduitRemoved>,
    pools: [PlayerPool; MAX_PLAYER_SLOTS],
    consumption_demand: [f32; MAX_PLAYER_SLOTS],
    network_owners: HashMap<u16, Vec<PlayerId>>,
}

impl Fluid {
    pub fn new() -> Self {
        Self {
            network_dirty: true,
            placed_since_last_drain: Vec::new(),
            removed_since_last_drain: Vec::new(),
            pools: [PlayerPool::default(); MAX_PLAYER_SLOTS],
            consumption_demand: [0.0; MAX_PLAYER_SLOTS],
            network_owners: HashMap::new(),
        }
    }

    pub fn set_consumption_demand(&mut self, owner: PlayerId, demand: f32) {
        self.consumption_demand[slot(owner)] = demand.max(0.0);
    }

    pub fn place_conduit(
        &mut self,
        world: &mut SimWorld,
        x: Coord,
        y: Coord,
        owner: PlayerId,
    ) -> Result<EntityId, ValidationError> {
        if !world.in_bounds(x, y) {
            return Err(ValidationError::OutOfBounds);
        }
        if world.fluid_conduit.get(x, y).is_valid() {
            return Err(ValidationError::AlreadyPlaced);
        }

        let id = world.entities.spawn();
        world.entities.fluid_conduits.insert(id, FluidConduit);
        world.entities.positions.insert(id, Position { x, y, z: 0.0 });
        world.entities.ownerships.insert(id, Ownership { owner });
        world.fluid_conduit.set(x, y, id);
        world.mark_chunk_dirty(x, y);
        self.network_dirty = true;
        self.placed_since_last_drain.push(ConduitPlaced { pool: PoolKind::Fluid, x, y });
        Ok(id)
    }

    pub fn remove_conduit(
        &mut self,
        world: &mut SimWorld,
        entity: EntityId,
        owner: PlayerId,
    ) -> Result<(), ValidationError> {
        let Some(ownership) = world.entities.ownerships.get(entity) else {
            return Err(ValidationError::UnknownEntity);
        };
        if ownership.owner != owner {
            return Err(ValidationError::NotOwned);
        }
        let Some(pos) = world.entities.positions.get(entity).copied() else {
            return Err(ValidationError::UnknownEntity);
        };
        world.fluid_conduit.set(pos.x, pos.y, EntityId::INVALID);
        world.entities.destroy(entity);
        world.mark_chunk_dirty(pos.x, pos.y);
        self.network_dirty = true;
        self.removed_since_last_drain.push(ConduitRemoved { pool: PoolKind::Fluid, x: pos.x, y: pos.y });
        Ok(())
    }

    /// BFS distance from `(x, y)` to the nearest nonzero `water_body` tile,
    /// capped at [`MAX_WATER_SEARCH_RANGE`].
    fn distance_to_water(world: &SimWorld, x: Coord, y: Coord) -> Option<u8> {
        if world.water_body.get(x, y) != 0 {
            return Some(0);
        }
        let mut visited = std::collections::HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert((x, y));
        queue.push_back((x, y, 0u8));
        while let Some((cx, cy, dist)) = queue.pop_front() {
            if dist >= MAX_WATER_SEARCH_RANGE {
                continue;
            }
            for (nx, ny) in world.water_body.neighbors4(cx, cy) {
                if !visited.insert((nx, ny)) {
                    continue;
                }
                if world.water_body.get(nx, ny) != 0 {
                    return Some(dist + 1);
                }
                queue.push_back((nx, ny, dist + 1));
            }
        }
        None
    }

    pub fn place_extractor(
        &mut self,
        world: &mut SimWorld,
        x: Coord,
        y: Coord,
        base_output: f32,
        owner: PlayerId,
    ) -> Result<EntityId, ValidationError> {
        if !world.in_bounds(x, y) {
            return Err(ValidationError::OutOfBounds);
        }
        if world.fluid_conduit.get(x, y).is_valid() {
            return Err(ValidationError::AlreadyPlaced);
        }
        let Some(water_distance) = Self::distance_to_water(world, x, y) else {
            return Err(ValidationError::NoWaterSource);
        };

        let id = world.entities.spawn();
        world.entities.fluid_extractors.insert(
            id,
            FluidExtractor {
                base_output,
                current_output: base_output * extractor_efficiency(water_distance),
                water_distance,
            },
        );
        world.entities.positions.insert(id, Position { x, y, z: 0.0 });
        world.entities.ownerships.insert(id, Ownership { owner });
        world.fluid_conduit.set(x, y, id);
        world.mark_chunk_dirty(x, y);
        self.network_dirty = true;
        self.placed_since_last_drain.push(ConduitPlaced { pool: PoolKind::Fluid, x, y });
        Ok(id)
    }

    pub fn place_reservoir(
        &mut self,
        world: &mut SimWorld,
        x: Coord,
        y: Coord,
        capacity: f32,
        owner: PlayerId,
    ) -> Result<EntityId, ValidationError> {
        if !world.in_bounds(x, y) {
            return Err(ValidationError::OutOfBounds);
        }
        if world.fluid_conduit.get(x, y).is_valid() {
            return Err(ValidationError::AlreadyPlaced);
        }

        let id = world.entities.spawn();
        world.entities.fluid_reservoirs.insert(id, FluidReservoir { stored: 0.0, capacity });
        world.entities.positions.insert(id, Position { x, y, z: 0.0 });
        world.entities.ownerships.insert(id, Ownership { owner });
        world.fluid_conduit.set(x, y, id);
        world.mark_chunk_dirty(x, y);
        self.network_dirty = true;
        self.placed_since_last_drain.push(ConduitPlaced { pool: PoolKind::Fluid, x, y });
        Ok(id)
    }

    /// Removes any of conduit/extractor/reservoir at `entity` -- the three
    /// kinds share the same grid and ownership/removal mechanics.
    pub fn remove_structure(
        &mut self,
        world: &mut SimWorld,
        entity: EntityId,
        owner: PlayerId,
    ) -> Result<(), ValidationError> {
        let Some(ownership) = world.entities.ownerships.get(entity) else {
            return Err(ValidationError::UnknownEntity);
        };
        if ownership.owner != owner {
            return Err(ValidationError::NotOwned);
        }
        let Some(pos) = world.entities.positions.get(entity).copied() else {
            return Err(ValidationError::UnknownEntity);
        };
        world.fluid_conduit.set(pos.x, pos.y, EntityId::INVALID);
        world.entities.destroy(entity);
        world.mark_chunk_dirty(pos.x, pos.y);
        self.network_dirty = true;
        self.removed_since_last_drain.push(ConduitRemoved { pool: PoolKind::Fluid, x: pos.x, y: pos.y });
        Ok(())
    }

    fn rebuild_network_graph(&mut self, world: &mut SimWorld) {
        let side = world.map_side as i32;
        world.fluid_network_id.fill(0);
        let mut visited = vec![false; (side * side) as usize];
        let mut next_id: u16 = 1;

        for y in 0..side {
            for x in 0..side {
                let idx = (y * side + x) as usize;
                if visited[idx] || !world.fluid_conduit.get(x, y).is_valid() {
                    continue;
                }
                let id = next_id;
                next_id = next_id.wrapping_add(1).max(1);
                let mut queue = VecDeque::new();
                queue.push_back((x, y));
                visited[idx] = true;
                while let Some((cx, cy)) = queue.pop_front() {
                    world.fluid_network_id.set(cx, cy, id);
                    for (nx, ny) in world.fluid_conduit.neighbors4(cx, cy) {
                        let nidx = (ny * side + nx) as usize;
                        if !visited[nidx] && world.fluid_conduit.get(nx, ny).is_valid() {
                            visited[nidx] = true;
                            queue.push_back((nx, ny));
                        }
                    }
                }
            }
        }

        self.network_owners.clear();
        for id in world.entities.fluid_extractors.ids() {
            let Some(pos) = world.entities.positions.get(id) else {
                continue;
            };
            let net = world.fluid_network_id.get(pos.x, pos.y);
            if net == 0 {
                continue;
            }
            let owner = world.entities.ownerships.get(id).map(|o| o.owner).unwrap_or(PlayerId::WORLD);
            let owners = self.network_owners.entry(net).or_default();
            if !owners.contains(&owner) {
                owners.push(owner);
            }
        }
    }

    /// Drains reservoirs to cover a deficit, or fills them with surplus,
    /// proportionally by capacity. Returns the amount actually drawn from
    /// storage (bounded by what is stored), used to compute `available`.
    fn settle_reservoirs(&mut self, world: &mut SimWorld, owner: PlayerId, generated: f32, consumed: f32) -> f32 {
        let ids: Vec<EntityId> = world
            .entities
            .fluid_reservoirs
            .ids()
            .filter(|&id| world.entities.ownerships.get(id).map(|o| o.owner) == Some(owner))
            .collect();
        if ids.is_empty() {
            return 0.0;
        }

        let total_capacity: f32 = ids
            .iter()
            .map(|&id| world.entities.fluid_reservoirs.get(id).map(|r| r.capacity).unwrap_or(0.0))
            .sum();
        if total_capacity <= 0.0 {
            return 0.0;
        }

        let deficit = consumed - generated;
        let mut drawn_total = 0.0f32;

        for &id in &ids {
            let Some(reservoir) = world.entities.fluid_reservoirs.get_mut(id) else {
                continue;
            };
            let share = reservoir.capacity / total_capacity;
            let before_percent = if reservoir.capacity > 0.0 {
                ((reservoir.stored / reservoir.capacity) * 100.0) as u8
            } else {
                0
            };

            if deficit > 0.0 {
                let draw = (deficit * share).min(reservoir.stored);
                reservoir.stored -= draw;
                drawn_total += draw;
            } else {
                let surplus = -deficit;
                let fill = (surplus * share).min(reservoir.capacity - reservoir.stored);
                reservoir.stored += fill.max(0.0);
            }

            let after_percent = if reservoir.capacity > 0.0 {
                ((reservoir.stored / reservoir.capacity) * 100.0) as u8
            } else {
                0
            };
            if after_percent != before_percent {
                world.events.reservoir_level_changed.push(ReservoirLevelChanged {
                    entity: id,
                    stored_percent: after_percent,
                });
            }
        }

        drawn_total
    }

    fn recompute_pools(&mut self, world: &mut SimWorld) {
        let mut generated = [0.0f32; MAX_PLAYER_SLOTS];
        for id in world.entities.fluid_extractors.ids() {
            let owner = world.entities.ownerships.get(id).map(|o| o.owner).unwrap_or(PlayerId::WORLD);
            let output = world.entities.fluid_extractors.get(id).map(|e| e.current_output).unwrap_or(0.0);
            generated[slot(owner)] += output;
        }

        for i in 0..MAX_PLAYER_SLOTS {
            let owner = PlayerId(i as u8);
            let consumed = self.consumption_demand[i];
            let drawn = self.settle_reservoirs(world, owner, generated[i], consumed);
            let available = generated[i] + drawn;

            let reservoir_stored: f32 = world
                .entities
                .fluid_reservoirs
                .ids()
                .filter(|&id| world.entities.ownerships.get(id).map(|o| o.owner) == Some(owner))
                .map(|id| world.entities.fluid_reservoirs.get(id).map(|r| r.stored).unwrap_or(0.0))
                .sum();

            let new_state = pool_state_from_ratio(available, consumed);
            let before = self.pools[i].state;
            self.pools[i] = PlayerPool {
                generated: generated[i],
                consumed,
                reservoir_stored,
                state: new_state,
            };
            if new_state != before {
                world.events.pool_state_changed.push(PoolStateChanged {
                    pool: PoolKind::Fluid,
                    owner,
                    from: to_event_state(before),
                    to: to_event_state(new_state),
                });
            }
        }
    }
}

impl Default for Fluid {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulatable for Fluid {
    fn priority(&self) -> i32 {
        priority::FLUID
    }

    fn tick(&mut self, _time: SchedulerTime, world: &mut SimWorld) {
        if self.network_dirty {
            self.rebuild_network_graph(world);
            self.network_dirty = false;
        }

        self.recompute_pools(world);

        for ev in self.placed_since_last_drain.drain(..) {
            world.events.conduit_placed.push(ev);
        }
        for ev in self.removed_since_last_drain.drain(..) {
            world.events.conduit_removed.push(ev);
        }
    }

    fn name(&self) -> &'static str {
        "fluid"
    }
}

pub struct WorldFluidProvider<'a> {
    pub world: &'a SimWorld,
    pub fluid: &'a Fluid,
}

impl FluidProvider for WorldFluidProvider<'_> {
    fn is_available_at(&self, x: i32, y: i32, owner: PlayerId) -> bool {
        let state = self.pool_state(owner);
        if !matches!(state, PoolOperationalState::Healthy | PoolOperationalState::Marginal) {
            return false;
        }
        let net = self.world.fluid_network_id.get(x, y);
        if net == 0 {
            return false;
        }
        self.fluid
            .network_owners
            .get(&net)
            .map(|owners| owners.contains(&owner) || owners.contains(&PlayerId::WORLD))
            .unwrap_or(false)
    }

    fn pool_state(&self, owner: PlayerId) -> PoolOperationalState {
        self.fluid.pools[slot(owner)].state
    }

    fn total_generated(&self, owner: PlayerId) -> f32 {
        self.fluid.pools[slot(owner)].generated
    }

    fn total_consumed(&self, owner: PlayerId) -> f32 {
        self.fluid.pools[slot(owner)].consumed
    }

    fn surplus(&self, owner: PlayerId) -> f32 {
        let pool = self.fluid.pools[slot(owner)];
        (pool.generated + pool.reservoir_stored) - pool.consumed
    }

    fn reservoir_stored(&self, owner: PlayerId) -> f32 {
        self.fluid.pools[slot(owner)].reservoir_stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn world(side: u16) -> SimWorld {
        SimWorld::new(side, 1, SimConfig::default())
    }

    fn tick_at(n: u64) -> SchedulerTime {
        SchedulerTime { tick: crate::ids::Tick(n), phase: 0, cycle: 0 }
    }

    #[test]
    fn place_extractor_rejects_far_from_water() {
        let mut w = world(64);
        let mut f = Fluid::new();
        let err = f.place_extractor(&mut w, 0, 0, 100.0, PlayerId(1)).unwrap_err();
        assert_eq!(err, ValidationError::NoWaterSource);
    }

    #[test]
    fn place_extractor_succeeds_adjacent_to_water() {
        let mut w = world(64);
        w.water_body.set(5, 5, 1);
        let mut f = Fluid::new();
        let id = f.place_extractor(&mut w, 6, 5, 100.0, PlayerId(1)).unwrap();
        let extractor = w.entities.fluid_extractors.get(id).unwrap();
        assert_eq!(extractor.water_distance, 1);
        assert!(extractor.current_output < extractor.base_output);
    }

    #[test]
    fn reservoir_drains_to_cover_a_deficit() {
        let mut w = world(32);
        w.water_body.set(0, 0, 1);
        let mut f = Fluid::new();
        f.place_extractor(&mut w, 1, 0, 100.0, PlayerId(1)).unwrap();
        f.place_reservoir(&mut w, 2, 0, 500.0, PlayerId(1)).unwrap();
        f.place_conduit(&mut w, 3, 0, PlayerId(1)).unwrap();
        f.tick(tick_at(1), &mut w);

        let reservoir_id = w.fluid_conduit.get(2, 0);
        if let Some(r) = w.entities.fluid_reservoirs.get_mut(reservoir_id) {
            r.stored = 400.0;
        }
        f.set_consumption_demand(PlayerId(1), 5000.0);
        f.tick(tick_at(2), &mut w);

        let after = w.entities.fluid_reservoirs.get(reservoir_id).unwrap().stored;
        assert!(after < 400.0);
    }

    #[test]
    fn reservoir_fills_with_surplus() {
        let mut w = world(32);
        w.water_body.set(0, 0, 1);
        let mut f = Fluid::new();
        f.place_extractor(&mut w, 1, 0, 1000.0, PlayerId(1)).unwrap();
        f.place_reservoir(&mut w, 2, 0, 500.0, PlayerId(1)).unwrap();
        f.place_conduit(&mut w, 3, 0, PlayerId(1)).unwrap();
        f.set_consumption_demand(PlayerId(1), 1.0);
        f.tick(tick_at(1), &mut w);
        f.tick(tick_at(2), &mut w);

        let reservoir_id = w.fluid_conduit.get(2, 0);
        let stored = w.entities.fluid_reservoirs.get(reservoir_id).unwrap().stored;
        assert!(stored > 0.0);
    }

    #[test]
    fn extractor_energizes_connected_network() {
        let mut w = world(32);
        w.water_body.set(0, 0, 1);
        let mut f = Fluid::new();
        f.place_extractor(&mut w, 1, 0, 1000.0, PlayerId(1)).unwrap();
        f.place_conduit(&mut w, 2, 0, PlayerId(1)).unwrap();
        f.set_consumption_demand(PlayerId(1), 10.0);
        f.tick(tick_at(1), &mut w);

        let provider = WorldFluidProvider { world: &w, fluid: &f };
        assert!(provider.is_available_at(2, 0, PlayerId(1)));
        assert!(!provider.is_available_at(2, 0, PlayerId(2)));
    }
}
