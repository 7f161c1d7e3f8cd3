//! Transport subsystem: pathway grid, network connectivity, proximity cache,
//! traffic flow diffusion, congestion, and pathway decay (spec §4.4).
//!
//! Per tick, in order: rebuild network graph + proximity cache if dirty,
//! clear flow accumulators, propagate flow, compute congestion, decay every
//! `TRANSPORT_DECAY_INTERVAL_TICKS` ticks, then drain placed/removed events
//! accumulated since the previous tick.

use std::collections::VecDeque;

use crate::components::{Road, RoadType, Traffic};
use crate::config::{self, priority};
use crate::error::ValidationError;
use crate::events::{PathwayPlaced, PathwayRemoved, PathwayStateChanged, TransportAccessLost};
use crate::grid::{NetworkIdGrid, ProximityGrid, PROXIMITY_OUT_OF_RANGE};
use crate::ids::{Coord, EntityId, PlayerId};
use crate::providers::TransportProvider;
use crate::subsystem::{SchedulerTime, Simulatable};
use crate::world::SimWorld;

/// Max BFS range for the proximity cache; distances beyond this saturate at
/// [`PROXIMITY_OUT_OF_RANGE`] rather than continuing the search indefinitely.
pub const PROXIMITY_MAX_RANGE: u8 = 64;

fn road_capacity(kind: RoadType) -> u16 {
    match kind {
        RoadType::Local => 100,
        RoadType::Arterial => 300,
        RoadType::Highway => 800,
    }
}

/// Health thresholds that, when crossed downward, emit a
/// [`PathwayStateChanged`] event (spec §4.4).
const HEALTH_THRESHOLDS: [u8; 6] = [255, 200, 150, 100, 50, 0];

fn threshold_band(health: u8) -> usize {
    HEALTH_THRESHOLDS
        .iter()
        .position(|&t| health >= t)
        .unwrap_or(HEALTH_THRESHOLDS.len() - 1)
}

pub struct Transport {
    network_dirty: bool,
    grace_ticks_remaining: u32,
    placed_since_last_drain: Vec<PathwayPlaced>,
    removed_since_last_drain: Vec<PathwayRemoved>,
    congestion: ProximityGridF32,
}

/// A dense `f32` grid, kept separate from [`crate::grid::DenseGrid`]'s
/// `Copy + Default` bound story by just wrapping a `Vec` directly -- f32
/// already satisfies both, this is purely for a descriptive type name.
struct ProximityGridF32 {
    cells: Vec<f32>,
    side: u16,
}

impl ProximityGridF32 {
    fn new(side: u16) -> Self {
        Self {
            cells: vec![0.0; side as usize * side as usize],
            side,
        }
    }

    fn in_bounds(&self, x: Coord, y: Coord) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.side as u32 && (y as u32) < self.side as u32
    }

    fn get(&self, x: Coord, y: Coord) -> f32 {
        if !self.in_bounds(x, y) {
            return 0.0;
        }
        self.cells[y as usize * self.side as usize + x as usize]
    }

    fn set(&mut self, x: Coord, y: Coord, v: f32) {
        if !self.in_bounds(x, y) {
            return;
        }
        let idx = y as usize * self.side as usize + x as usize;
        self.cells[idx] = v;
    }

    fn fill(&mut self, v: f32) {
        self.cells.fill(v);
    }
}

impl Transport {
    pub fn new(map_side: u16, grace_period_ticks: u32) -> Self {
        Self {
            network_dirty: true,
            grace_ticks_remaining: grace_period_ticks,
            placed_since_last_drain: Vec::new(),
            removed_since_last_drain: Vec::new(),
            congestion: ProximityGridF32::new(map_side),
        }
    }

    /// Whether the grace period (spec §4.4) is still active. While active,
    /// `is_road_accessible_at` returns true unconditionally.
    pub fn in_grace_period(&self) -> bool {
        self.grace_ticks_remaining > 0
    }

    pub fn place_pathway(
        &mut self,
        world: &mut SimWorld,
        x: Coord,
        y: Coord,
        kind: RoadType,
        owner: PlayerId,
    ) -> Result<EntityId, ValidationError> {
        if !world.in_bounds(x, y) {
            return Err(ValidationError::OutOfBounds);
        }
        if world.pathway.get(x, y).is_valid() {
            return Err(ValidationError::AlreadyPlaced);
        }

        let id = world.entities.spawn();
        world.entities.roads.insert(
            id,
            Road {
                kind,
                health: 255,
                base_capacity: road_capacity(kind),
            },
        );
        world.entities.traffic.insert(id, Traffic::default());
        world.entities.positions.insert(
            id,
            crate::components::Position {
                x,
                y,
                z: 0.0,
            },
        );
        world.entities.ownerships.insert(id, crate::components::Ownership { owner });
        world.pathway.set(x, y, id);
        world.mark_chunk_dirty(x, y);
        self.network_dirty = true;
        self.placed_since_last_drain.push(PathwayPlaced { x, y });
        Ok(id)
    }

    pub fn remove_pathway(
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
        world.pathway.set(pos.x, pos.y, EntityId::INVALID);
        world.entities.destroy(entity);
        world.mark_chunk_dirty(pos.x, pos.y);
        self.network_dirty = true;
        self.removed_since_last_drain.push(PathwayRemoved { x: pos.x, y: pos.y });
        Ok(())
    }

    /// 4-connected BFS/flood-fill labeling of connected pathway components,
    /// 1..K (spec §4.4 step 1).
    fn rebuild_network_graph(&mut self, world: &mut SimWorld) {
        let side = world.map_side as i32;
        world.network_id.fill(0);
        let mut visited = vec![false; (side * side) as usize];
        let mut next_id: u16 = 1;

        for y in 0..side {
            for x in 0..side {
                let idx = (y * side + x) as usize;
                if visited[idx] || !world.pathway.get(x, y).is_valid() {
                    continue;
                }
                let id = next_id;
                next_id = next_id.wrapping_add(1).max(1);
                let mut queue = VecDeque::new();
                queue.push_back((x, y));
                visited[idx] = true;
                while let Some((cx, cy)) = queue.pop_front() {
                    world.network_id.set(cx, cy, id);
                    for (nx, ny) in world.pathway.neighbors4(cx, cy) {
                        let nidx = (ny * side + nx) as usize;
                        if !visited[nidx] && world.pathway.get(nx, ny).is_valid() {
                            visited[nidx] = true;
                            queue.push_back((nx, ny));
                        }
                    }
                }
            }
        }
    }

    /// Multi-source BFS from every pathway cell, capped at
    /// [`PROXIMITY_MAX_RANGE`] (spec §4.4 step 1, §9 resolved Open Question:
    /// step-wise 4-connected, not Manhattan/Euclidean).
    fn rebuild_proximity_cache(&mut self, world: &mut SimWorld) {
        let side = world.map_side as i32;
        world.proximity.fill(PROXIMITY_OUT_OF_RANGE);
        let mut queue = VecDeque::new();

        for y in 0..side {
            for x in 0..side {
                if world.pathway.get(x, y).is_valid() {
                    world.proximity.set(x, y, 0);
                    queue.push_back((x, y, 0u8));
                }
            }
        }

        while let Some((x, y, dist)) = queue.pop_front() {
            if dist >= PROXIMITY_MAX_RANGE {
                continue;
            }
            for (nx, ny) in world.proximity.neighbors4(x, y) {
                if world.proximity.get(nx, ny) == PROXIMITY_OUT_OF_RANGE {
                    world.proximity.set(nx, ny, dist + 1);
                    queue.push_back((nx, ny, dist + 1));
                }
            }
        }
    }

    /// Simple conservation-based flow diffusion: each road cell spreads its
    /// accumulated traffic evenly across its 4-connected pathway neighbors
    /// (spec §4.4 step 3).
    fn propagate_flow(&mut self, world: &mut SimWorld) {
        let ids: Vec<EntityId> = world.pathway.raw().iter().copied().filter(|id| id.is_valid()).collect();
        let mut base_flow: Vec<(EntityId, i32, i32, f32)> = Vec::with_capacity(ids.len());
        for &id in &ids {
            let Some(pos) = world.entities.positions.get(id).copied() else {
                continue;
            };
            let road = world.entities.roads.get(id).copied().unwrap_or(Road {
                kind: RoadType::Local,
                health: 255,
                base_capacity: road_capacity(RoadType::Local),
            });
            base_flow.push((id, pos.x, pos.y, road.base_capacity as f32 * 0.1));
        }

        for (id, _, _, seed) in &base_flow {
            if let Some(traffic) = world.entities.traffic.get_mut(*id) {
                traffic.accumulator += *seed;
            }
        }

        for (id, x, y, _) in &base_flow {
            let neighbors: Vec<(i32, i32)> = world.pathway.neighbors4(*x, *y)
                .filter(|(nx, ny)| world.pathway.get(*nx, *ny).is_valid())
                .collect();
            if neighbors.is_empty() {
                continue;
            }
            let share = world
                .entities
                .traffic
                .get(*id)
                .map(|t| t.accumulator / neighbors.len() as f32)
                .unwrap_or(0.0);
            for (nx, ny) in neighbors {
                let neighbor_id = world.pathway.get(nx, ny);
                if let Some(t) = world.entities.traffic.get_mut(neighbor_id) {
                    t.flow_current += share;
                }
            }
        }

        for (id, _, _, _) in &base_flow {
            if let Some(t) = world.entities.traffic.get_mut(*id) {
                t.flow_current += t.accumulator * 0.25;
                t.accumulator = 0.0;
            }
        }
    }

    fn compute_congestion(&mut self, world: &SimWorld) {
        self.congestion.fill(0.0);
        for id in world.entities.roads.ids() {
            let Some(pos) = world.entities.positions.get(id) else {
                continue;
            };
            let road = world.entities.roads.get(id).copied().unwrap();
            let flow = world.entities.traffic.get(id).map(|t| t.flow_current).unwrap_or(0.0);
            let congestion = (flow / road.base_capacity.max(1) as f32).clamp(0.0, 1.0);
            self.congestion.set(pos.x, pos.y, congestion);
        }
    }

    /// Pathway health decay, applied every
    /// [`config::TRANSPORT_DECAY_INTERVAL_TICKS`] ticks only (spec §4.4 step
    /// 5).
    fn apply_decay(&mut self, world: &mut SimWorld) {
        let ids: Vec<EntityId> = world.entities.roads.ids().collect();
        for id in ids {
            let Some(pos) = world.entities.positions.get(id).copied() else {
                continue;
            };
            let flow = world.entities.traffic.get(id).map(|t| t.flow_current).unwrap_or(0.0);
            let Some(road) = world.entities.roads.get_mut(id) else {
                continue;
            };
            let before = road.health;
            let ratio = flow / road.base_capacity.max(1) as f32;
            let traffic_multiplier = (1.0 + 2.0 * ratio).clamp(1.0, 3.0);
            let base_decay = 2.0_f32;
            let delta = (base_decay * traffic_multiplier).round() as u8;
            road.health = road.health.saturating_sub(delta);

            if threshold_band(road.health) != threshold_band(before) {
                world.events.pathway_state_changed.push(PathwayStateChanged {
                    x: pos.x,
                    y: pos.y,
                    health: road.health,
                });
            }
        }
    }
}

impl Simulatable for Transport {
    fn priority(&self) -> i32 {
        priority::TRANSPORT
    }

    fn tick(&mut self, time: SchedulerTime, world: &mut SimWorld) {
        if self.grace_ticks_remaining > 0 {
            self.grace_ticks_remaining -= 1;
        }

        if self.network_dirty {
            self.rebuild_network_graph(world);
            self.rebuild_proximity_cache(world);
            self.network_dirty = false;
        }

        for id in world.entities.traffic.ids().collect::<Vec<_>>() {
            if let Some(t) = world.entities.traffic.get_mut(id) {
                t.flow_current = 0.0;
            }
        }

        self.propagate_flow(world);
        self.compute_congestion(world);

        if time.tick.0 > 0 && time.tick.0 % config::TRANSPORT_DECAY_INTERVAL_TICKS == 0 {
            self.apply_decay(world);
        }

        for ev in self.placed_since_last_drain.drain(..) {
            world.events.pathway_placed.push(ev);
        }
        for ev in self.removed_since_last_drain.drain(..) {
            world.events.pathway_removed.push(ev);
        }
    }

    fn name(&self) -> &'static str {
        "transport"
    }
}

/// Query surface backed directly by [`SimWorld`]'s grids plus the owning
/// [`Transport`] subsystem's congestion cache -- used by the orchestrator to
/// build the per-tick [`crate::providers::Providers`] value. Grace-period
/// permissiveness is read from `Transport` itself since the grids carry no
/// notion of "not authoritative yet" (spec §4.4 "Grace period").
pub struct WorldTransportProvider<'a> {
    pub world: &'a SimWorld,
    pub transport: &'a Transport,
}

impl TransportProvider for WorldTransportProvider<'_> {
    fn is_road_accessible_at(&self, x: i32, y: i32, max_distance: u8) -> bool {
        if self.transport.in_grace_period() {
            return true;
        }
        match self.get_nearest_road_distance(x, y) {
            Some(d) => d < max_distance,
            None => false,
        }
    }

    fn get_nearest_road_distance(&self, x: i32, y: i32) -> Option<u8> {
        let d = self.world.proximity.get(x, y);
        if d == PROXIMITY_OUT_OF_RANGE {
            None
        } else {
            Some(d)
        }
    }

    fn is_connected_to_network(&self, x: i32, y: i32) -> bool {
        self.world.network_id.get(x, y) != 0
    }

    fn are_connected(&self, a: (i32, i32), b: (i32, i32)) -> bool {
        let na = self.world.network_id.get(a.0, a.1);
        let nb = self.world.network_id.get(b.0, b.1);
        na != 0 && na == nb
    }

    fn get_congestion_at(&self, x: i32, y: i32) -> f32 {
        self.transport.congestion.get(x, y)
    }

    fn get_traffic_volume_at(&self, x: i32, y: i32) -> f32 {
        let id = self.world.pathway.get(x, y);
        self.world.entities.traffic.get(id).map(|t| t.flow_current).unwrap_or(0.0)
    }

    fn get_network_id_at(&self, x: i32, y: i32) -> u16 {
        self.world.network_id.get(x, y)
    }
}

pub fn emit_access_lost_if_needed(world: &mut SimWorld, x: i32, y: i32, was_accessible: bool, is_accessible: bool) {
    if was_accessible && !is_accessible {
        world.events.transport_access_lost.push(TransportAccessLost { x, y });
    }
}

/// Read-only overlay surface for host UIs (spec §6 `GridOverlay`): darker
/// near pathways, fading to transparent at and beyond
/// [`PROXIMITY_OUT_OF_RANGE`].
pub struct ProximityOverlay<'a> {
    pub world: &'a SimWorld,
}

impl crate::providers::GridOverlay for ProximityOverlay<'_> {
    fn get_name(&self) -> &'static str {
        "road_proximity"
    }

    fn is_active(&self) -> bool {
        true
    }

    fn get_color_at(&self, x: i32, y: i32) -> (u8, u8, u8, u8) {
        let d = self.world.proximity.get(x, y);
        let alpha = 255u16.saturating_sub(d as u16).min(255) as u8;
        (60, 130, 220, alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn world(side: u16) -> SimWorld {
        SimWorld::new(side, 1, SimConfig::default())
    }

    #[test]
    fn place_pathway_rejects_out_of_bounds() {
        let mut w = world(32);
        let mut t = Transport::new(32, 0);
        let err = t.place_pathway(&mut w, -1, 0, RoadType::Local, PlayerId(1)).unwrap_err();
        assert_eq!(err, ValidationError::OutOfBounds);
    }

    #[test]
    fn place_pathway_rejects_already_placed() {
        let mut w = world(32);
        let mut t = Transport::new(32, 0);
        t.place_pathway(&mut w, 5, 5, RoadType::Local, PlayerId(1)).unwrap();
        let err = t.place_pathway(&mut w, 5, 5, RoadType::Local, PlayerId(1)).unwrap_err();
        assert_eq!(err, ValidationError::AlreadyPlaced);
    }

    #[test]
    fn network_rebuild_assigns_matching_ids_to_connected_cells() {
        let mut w = world(32);
        let mut t = Transport::new(32, 0);
        t.place_pathway(&mut w, 5, 5, RoadType::Local, PlayerId(1)).unwrap();
        t.place_pathway(&mut w, 6, 5, RoadType::Local, PlayerId(1)).unwrap();
        t.place_pathway(&mut w, 10, 10, RoadType::Local, PlayerId(1)).unwrap();

        let time = SchedulerTime { tick: crate::ids::Tick(1), phase: 0, cycle: 0 };
        t.tick(time, &mut w);

        let a = w.network_id.get(5, 5);
        let b = w.network_id.get(6, 5);
        let c = w.network_id.get(10, 10);
        assert_ne!(a, 0);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn proximity_is_zero_on_pathway_cells_and_bfs_distance_elsewhere() {
        let mut w = world(32);
        let mut t = Transport::new(32, 0);
        t.place_pathway(&mut w, 10, 10, RoadType::Local, PlayerId(1)).unwrap();
        let time = SchedulerTime { tick: crate::ids::Tick(1), phase: 0, cycle: 0 };
        t.tick(time, &mut w);

        assert_eq!(w.proximity.get(10, 10), 0);
        assert_eq!(w.proximity.get(11, 10), 1);
        assert_eq!(w.proximity.get(12, 10), 2);
    }

    #[test]
    fn grace_period_grants_access_before_expiry_and_lapses_after() {
        let w = world(32);
        let mut t = Transport::new(32, 2);
        let provider = WorldTransportProvider { world: &w, transport: &t };
        assert!(provider.is_road_accessible_at(0, 0, 1));
        drop(provider);

        let time = SchedulerTime { tick: crate::ids::Tick(1), phase: 0, cycle: 0 };
        let mut w2 = world(32);
        t.tick(time, &mut w2);
        let time2 = SchedulerTime { tick: crate::ids::Tick(2), phase: 0, cycle: 0 };
        t.tick(time2, &mut w2);
        assert!(!t.in_grace_period());
        let provider = WorldTransportProvider { world: &w2, transport: &t };
        assert!(!provider.is_road_accessible_at(0, 0, 1));
    }

    #[test]
    fn decay_only_applies_on_the_configured_interval() {
        let mut w = world(32);
        let mut t = Transport::new(32, 0);
        t.place_pathway(&mut w, 1, 1, RoadType::Local, PlayerId(1)).unwrap();

        for tick in 1..config::TRANSPORT_DECAY_INTERVAL_TICKS {
            let time = SchedulerTime { tick: crate::ids::Tick(tick), phase: 0, cycle: 0 };
            t.tick(time, &mut w);
        }
        let id = w.pathway.get(1, 1);
        assert_eq!(w.entities.roads.get(id).unwrap().health, 255);

        let time = SchedulerTime {
            tick: crate::ids::Tick(config::TRANSPORT_DECAY_INTERVAL_TICKS),
            phase: 0,
            cycle: 0,
        };
        t.tick(time, &mut w);
        assert!(w.entities.roads.get(id).unwrap().health <= 255);
    }

    #[test]
    fn proximity_overlay_fades_out_with_distance() {
        use crate::providers::GridOverlay;
        let mut w = world(32);
        w.proximity.set(0, 0, 0);
        w.proximity.set(5, 5, crate::grid::PROXIMITY_OUT_OF_RANGE);
        let overlay = ProximityOverlay { world: &w };
        let (_, _, _, near_alpha) = overlay.get_color_at(0, 0);
        let (_, _, _, far_alpha) = overlay.get_color_at(5, 5);
        assert_eq!(near_alpha, 255);
        assert_eq!(far_alpha, 0);
    }
}
