//! Energy subsystem: conduit network connectivity, nexus output aging, and
//! per-player generation/consumption pools (spec §4.7, priority 41).
//!
//! Per tick, in order: rebuild the conduit network graph if dirty, age every
//! nexus toward its efficiency floor, recompute per-player pools and emit
//! state-transition events, then drain placed/removed conduit events.
//!
//! Building demand is not wired through here directly -- building runs at a
//! lower priority (40) than energy (41), so the orchestrator hands this
//! subsystem each player's aggregate demand via [`Energy::set_consumption_demand`]
//! between the two ticks, the same way it assembles [`crate::providers::Providers`].

use std::collections::{HashMap, VecDeque};

use crate::components::{EnergyConduit, EnergyNexus, Ownership, Position};
use crate::config::priority;
use crate::error::ValidationError;
use crate::events::{ConduitPlaced, ConduitRemoved, NexusAged, PoolKind, PoolStateChanged};
use crate::ids::{Coord, EntityId, PlayerId};
use crate::providers::{EnergyProvider, PoolOperationalState};
use crate::subsystem::{SchedulerTime, Simulatable};
use crate::world::SimWorld;

const MAX_PLAYER_SLOTS: usize = PlayerId::MAX_PLAYERS as usize + 1;

/// Asymptotic floor a nexus's output decays toward as it ages (spec §4.7
/// "ages ... toward an aging floor"). Decided: 60% of rated output, relaxed
/// toward at a fixed per-tick fraction of the remaining gap so the curve
/// stays smooth rather than stepping.
const AGING_FLOOR_RATIO: f32 = 0.60;
const AGING_RELAXATION_PER_TICK: f32 = 0.0002;

/// `NexusAged` is only emitted on this interval, not every tick -- the float
/// delta per tick is imperceptible and an event per tick per nexus would
/// drown every other event kind.
const NEXUS_AGE_EVENT_INTERVAL_TICKS: u64 = 100;

fn pool_state_from_ratio(generated: f32, consumed: f32) -> PoolOperationalState {
    if consumed <= 0.0 {
        return PoolOperationalState::Healthy;
    }
    let ratio = generated / consumed;
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

#[derive(Debug, Clone, Copy, Default)]
struct PlayerPool {
    generated: f32,
    consumed: f32,
    state: PoolOperationalState,
}

fn slot(owner: PlayerId) -> usize {
    (owner.0 as usize).min(MAX_PLAYER_SLOTS - 1)
}

pub struct Energy {
    network_dirty: bool,
    placed_since_last_drain: Vec<ConduitPlaced>,
    removed_since_last_drain: Vec<ConduitRemoved>,
    pools: [PlayerPool; MAX_PLAYER_SLOTS],
    consumption_demand: [f32; MAX_PLAYER_SLOTS],
    /// Network id -> distinct owners with a nexus on that network, rebuilt
    /// alongside the connectivity graph.
    network_owners: HashMap<u16, Vec<PlayerId>>,
}

impl Energy {
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

    /// Aggregate demand for `owner` this tick, supplied by the orchestrator
    /// after the building subsystem has run.
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
        if world.energy_conduit.get(x, y).is_valid() {
            return Err(ValidationError::AlreadyPlaced);
        }

        let id = world.entities.spawn();
        world.entities.energy_conduits.insert(id, EnergyConduit);
        world.entities.positions.insert(id, Position { x, y, z: 0.0 });
        world.entities.ownerships.insert(id, Ownership { owner });
        world.energy_conduit.set(x, y, id);
        world.mark_chunk_dirty(x, y);
        self.network_dirty = true;
        self.placed_since_last_drain.push(ConduitPlaced { pool: PoolKind::Energy, x, y });
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
        world.energy_conduit.set(pos.x, pos.y, EntityId::INVALID);
        world.entities.destroy(entity);
        world.mark_chunk_dirty(pos.x, pos.y);
        self.network_dirty = true;
        self.removed_since_last_drain.push(ConduitRemoved { pool: PoolKind::Energy, x: pos.x, y: pos.y });
        Ok(())
    }

    /// A nexus occupies the same conduit grid as a plain conduit tile so it
    /// seeds connectivity for the network it feeds (spec §4.7 "connected via
    /// conduits to at least one producer").
    pub fn place_nexus(
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
        if world.energy_conduit.get(x, y).is_valid() {
            return Err(ValidationError::AlreadyPlaced);
        }

        let id = world.entities.spawn();
        world.entities.energy_nexuses.insert(
            id,
            EnergyNexus {
                base_output,
                current_output: base_output,
                age_ticks: 0,
            },
        );
        world.entities.positions.insert(id, Position { x, y, z: 0.0 });
        world.entities.ownerships.insert(id, Ownership { owner });
        world.energy_conduit.set(x, y, id);
        world.mark_chunk_dirty(x, y);
        self.network_dirty = true;
        self.placed_since_last_drain.push(ConduitPlaced { pool: PoolKind::Energy, x, y });
        Ok(id)
    }

    pub fn remove_nexus(
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
        world.energy_conduit.set(pos.x, pos.y, EntityId::INVALID);
        world.entities.destroy(entity);
        world.mark_chunk_dirty(pos.x, pos.y);
        self.network_dirty = true;
        self.removed_since_last_drain.push(ConduitRemoved { pool: PoolKind::Energy, x: pos.x, y: pos.y });
        Ok(())
    }

    /// 4-connected BFS/flood-fill over conduit (and nexus) tiles, plus the
    /// per-network owner index used by [`WorldEnergyProvider::is_available_at`].
    fn rebuild_network_graph(&mut self, world: &mut SimWorld) {
        let side = world.map_side as i32;
        world.energy_network_id.fill(0);
        let mut visited = vec![false; (side * side) as usize];
        let mut next_id: u16 = 1;

        for y in 0..side {
            for x in 0..side {
                let idx = (y * side + x) as usize;
                if visited[idx] || !world.energy_conduit.get(x, y).is_valid() {
                    continue;
                }
                let id = next_id;
                next_id = next_id.wrapping_add(1).max(1);
                let mut queue = VecDeque::new();
                queue.push_back((x, y));
                visited[idx] = true;
                while let Some((cx, cy)) = queue.pop_front() {
                    world.energy_network_id.set(cx, cy, id);
                    for (nx, ny) in world.energy_conduit.neighbors4(cx, cy) {
                        let nidx = (ny * side + nx) as usize;
                        if !visited[nidx] && world.energy_conduit.get(nx, ny).is_valid() {
                            visited[nidx] = true;
                            queue.push_back((nx, ny));
                        }
                    }
                }
            }
        }

        self.network_owners.clear();
        for id in world.entities.energy_nexuses.ids() {
            let Some(pos) = world.entities.positions.get(id) else {
                continue;
            };
            let net = world.energy_network_id.get(pos.x, pos.y);
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

    fn age_nexuses(&mut self, world: &mut SimWorld, emit_events: bool) {
        let ids: Vec<EntityId> = world.entities.energy_nexuses.ids().collect();
        for id in ids {
            let Some(nexus) = world.entities.energy_nexuses.get_mut(id) else {
                continue;
            };
            nexus.age_ticks = nexus.age_ticks.saturating_add(1);
            let floor = nexus.base_output * AGING_FLOOR_RATIO;
            nexus.current_output += (floor - nexus.current_output) * AGING_RELAXATION_PER_TICK;
            if emit_events {
                world.events.nexus_aged.push(NexusAged { entity: id });
            }
        }
    }

    fn recompute_pools(&mut self, world: &mut SimWorld) {
        let mut generated = [0.0f32; MAX_PLAYER_SLOTS];
        for id in world.entities.energy_nexuses.ids() {
            let owner = world.entities.ownerships.get(id).map(|o| o.owner).unwrap_or(PlayerId::WORLD);
            let output = world.entities.energy_nexuses.get(id).map(|n| n.current_output).unwrap_or(0.0);
            generated[slot(owner)] += output;
        }

        for i in 0..MAX_PLAYER_SLOTS {
            let owner = PlayerId(i as u8);
            let consumed = self.consumption_demand[i];
            let new_state = pool_state_from_ratio(generated[i], consumed);
            let before = self.pools[i].state;
            self.pools[i] = PlayerPool {
                generated: generated[i],
                consumed,
                state: new_state,
            };
            if new_state != before {
                world.events.pool_state_changed.push(PoolStateChanged {
                    pool: PoolKind::Energy,
                    owner,
                    from: to_event_state(before),
                    to: to_event_state(new_state),
                });
            }
        }
    }
}

impl Default for Energy {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulatable for Energy {
    fn priority(&self) -> i32 {
        priority::ENERGY
    }

    fn tick(&mut self, time: SchedulerTime, world: &mut SimWorld) {
        if self.network_dirty {
            self.rebuild_network_graph(world);
            self.network_dirty = false;
        }

        let emit_aging_events = time.tick.0 > 0 && time.tick.0 % NEXUS_AGE_EVENT_INTERVAL_TICKS == 0;
        self.age_nexuses(world, emit_aging_events);
        self.recompute_pools(world);

        for ev in self.placed_since_last_drain.drain(..) {
            world.events.conduit_placed.push(ev);
        }
        for ev in self.removed_since_last_drain.drain(..) {
            world.events.conduit_removed.push(ev);
        }
    }

    fn name(&self) -> &'static str {
        "energy"
    }
}

/// Query surface backed directly by [`SimWorld`]'s energy grids plus the
/// owning [`Energy`] subsystem's pool state -- used by the orchestrator to
/// build the per-tick [`crate::providers::Providers`] value.
pub struct WorldEnergyProvider<'a> {
    pub world: &'a SimWorld,
    pub energy: &'a Energy,
}

impl EnergyProvider for WorldEnergyProvider<'_> {
    fn is_available_at(&self, x: i32, y: i32, owner: PlayerId) -> bool {
        let state = self.pool_state(owner);
        if !matches!(state, PoolOperationalState::Healthy | PoolOperationalState::Marginal) {
            return false;
        }
        let net = self.world.energy_network_id.get(x, y);
        if net == 0 {
            return false;
        }
        self.energy
            .network_owners
            .get(&net)
            .map(|owners| owners.contains(&owner) || owners.contains(&PlayerId::WORLD))
            .unwrap_or(false)
    }

    fn pool_state(&self, owner: PlayerId) -> PoolOperationalState {
        self.energy.pools[slot(owner)].state
    }

    fn total_generated(&self, owner: PlayerId) -> f32 {
        self.energy.pools[slot(owner)].generated
    }

    fn total_consumed(&self, owner: PlayerId) -> f32 {
        self.energy.pools[slot(owner)].consumed
    }

    fn surplus(&self, owner: PlayerId) -> f32 {
        let pool = self.energy.pools[slot(owner)];
        pool.generated - pool.consumed
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
    fn place_conduit_rejects_out_of_bounds() {
        let mut w = world(32);
        let mut e = Energy::new();
        let err = e.place_conduit(&mut w, -1, 0, PlayerId(1)).unwrap_err();
        assert_eq!(err, ValidationError::OutOfBounds);
    }

    #[test]
    fn place_conduit_rejects_already_placed() {
        let mut w = world(32);
        let mut e = Energy::new();
        e.place_conduit(&mut w, 5, 5, PlayerId(1)).unwrap();
        let err = e.place_conduit(&mut w, 5, 5, PlayerId(1)).unwrap_err();
        assert_eq!(err, ValidationError::AlreadyPlaced);
    }

    #[test]
    fn nexus_energizes_its_connected_conduit_network() {
        let mut w = world(32);
        let mut e = Energy::new();
        e.place_nexus(&mut w, 5, 5, 1000.0, PlayerId(1)).unwrap();
        e.place_conduit(&mut w, 6, 5, PlayerId(1)).unwrap();
        e.place_conduit(&mut w, 7, 5, PlayerId(1)).unwrap();
        e.set_consumption_demand(PlayerId(1), 10.0);
        e.tick(tick_at(1), &mut w);

        let provider = WorldEnergyProvider { world: &w, energy: &e };
        assert!(provider.is_available_at(7, 5, PlayerId(1)));
        assert!(!provider.is_available_at(7, 5, PlayerId(2)));
        assert!(!provider.is_available_at(20, 20, PlayerId(1)));
    }

    #[test]
    fn pool_state_reflects_generation_to_consumption_ratio() {
        let mut w = world(32);
        let mut e = Energy::new();
        e.place_nexus(&mut w, 0, 0, 100.0, PlayerId(1)).unwrap();
        e.set_consumption_demand(PlayerId(1), 1000.0);
        e.tick(tick_at(1), &mut w);
        let provider = WorldEnergyProvider { world: &w, energy: &e };
        assert_eq!(provider.pool_state(PlayerId(1)), PoolOperationalState::Collapse);
    }

    #[test]
    fn pool_state_change_emits_event() {
        let mut w = world(32);
        let mut e = Energy::new();
        e.place_nexus(&mut w, 0, 0, 100.0, PlayerId(1)).unwrap();
        e.set_consumption_demand(PlayerId(1), 0.0);
        e.tick(tick_at(1), &mut w);
        assert!(w.events.pool_state_changed.is_empty());

        e.set_consumption_demand(PlayerId(1), 10_000.0);
        e.tick(tick_at(2), &mut w);
        let drained: Vec<_> = w.events.pool_state_changed.drain().collect();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].to, crate::events::PoolState::Collapse);
    }

    #[test]
    fn nexus_output_decays_toward_aging_floor() {
        let mut w = world(32);
        let mut e = Energy::new();
        let id = e.place_nexus(&mut w, 0, 0, 1000.0, PlayerId::WORLD).unwrap();
        for t in 1..=NEXUS_AGE_EVENT_INTERVAL_TICKS {
            e.tick(tick_at(t), &mut w);
        }
        let output = w.entities.energy_nexuses.get(id).unwrap().current_output;
        assert!(output < 1000.0);
        assert!(output > 1000.0 * AGING_FLOOR_RATIO);
    }

    #[test]
    fn removing_a_conduit_splits_the_network() {
        let mut w = world(32);
        let mut e = Energy::new();
        let mid = e.place_conduit(&mut w, 5, 5, PlayerId(1)).unwrap();
        e.place_conduit(&mut w, 4, 5, PlayerId(1)).unwrap();
        e.place_conduit(&mut w, 6, 5, PlayerId(1)).unwrap();
        e.tick(tick_at(1), &mut w);
        let before = w.energy_network_id.get(4, 5);
        assert_eq!(before, w.energy_network_id.get(6, 5));

        e.remove_conduit(&mut w, mid, PlayerId(1)).unwrap();
        e.tick(tick_at(2), &mut w);
        let left = w.energy_network_id.get(4, 5);
        let right = w.energy_network_id.get(6, 5);
        assert_ne!(left, 0);
        assert_ne!(right, 0);
        assert_ne!(left, right);
    }
}
