//! Double-buffered contamination diffusion (spec §4.8).
//!
//! Protocol each tick: swap buffers (`current` is seeded from last tick's
//! finalized `previous`), decay the carried-over levels, generate from
//! registered sources (including diffusion to neighbors within
//! `spread_radius`), then cache aggregate stats. `current` is the
//! authoritative, fully up-to-date field from the moment this tick's
//! `tick()` returns until the next swap; that is what every external
//! reader (other same-tick-or-later subsystems, between-tick queries,
//! overlays) should read. `previous` is kept only as the frozen seed for
//! the next tick's swap, not as a public read surface.

use crate::components::ContaminationType;
use crate::ids::EntityId;
use crate::subsystem::{SchedulerTime, Simulatable};
use crate::world::SimWorld;

pub const DEFAULT_NATURAL_DECAY_PER_TICK: u8 = 2;
pub const DEFAULT_TOXIC_THRESHOLD: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContaminationCell {
    pub level: u8,
    /// `0` whenever `level == 0`; otherwise a [`ContaminationType`]
    /// discriminant.
    pub dominant_type: u8,
}

/// The running per-cell bookkeeping needed to resolve dominant-type ties
/// within a single tick's generation pass; reset at every swap.
#[derive(Debug, Clone, Copy, Default)]
struct DominantTracker {
    best_contribution: u16,
}

pub struct ContaminationField {
    current: crate::grid::DenseGrid<ContaminationCell>,
    previous: crate::grid::DenseGrid<ContaminationCell>,
    trackers: Vec<DominantTracker>,
    side: u16,
    total: u64,
    toxic_tile_count: u32,
}

impl ContaminationField {
    pub fn new(side: u16) -> Self {
        Self {
            current: crate::grid::DenseGrid::new(side),
            previous: crate::grid::DenseGrid::new(side),
            trackers: vec![DominantTracker::default(); side as usize * side as usize],
            side,
            total: 0,
            toxic_tile_count: 0,
        }
    }

    /// This tick's finalized level (post-generate, post-decay). Valid for
    /// same-tick reads by later-executing (higher-priority-number)
    /// subsystems and for any between-tick query, since `current` holds
    /// the fully resolved field from the moment `tick()` returns until the
    /// next swap.
    pub fn level_at(&self, x: i32, y: i32) -> u8 {
        self.current.get(x, y).level
    }

    pub fn dominant_type_at(&self, x: i32, y: i32) -> u8 {
        self.current.get(x, y).dominant_type
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn toxic_tile_count(&self) -> u32 {
        self.toxic_tile_count
    }

    /// Same aggregate as [`Self::toxic_tile_count`] but against an
    /// arbitrary threshold rather than the cached
    /// [`DEFAULT_TOXIC_THRESHOLD`] pass (spec §6 `StatQueryable`/overlay
    /// queries want caller-chosen thresholds, e.g. for a UI slider).
    pub fn toxic_tile_count_at(&self, threshold: u8) -> u32 {
        let side = self.side as i32;
        let mut count = 0u32;
        for y in 0..side {
            for x in 0..side {
                if self.current.get(x, y).level >= threshold {
                    count += 1;
                }
            }
        }
        count
    }

    fn tracker_index(&self, x: i32, y: i32) -> Option<usize> {
        if !self.current.in_bounds(x, y) {
            return None;
        }
        Some(y as usize * self.side as usize + x as usize)
    }

    /// Saturating add with dominant-type tie-break: a strictly greater
    /// contribution than the one that last won takes over dominance; a tie
    /// keeps the previous dominant type (spec §9 Open Question).
    pub(crate) fn add(&mut self, x: i32, y: i32, amount: u16, kind: ContaminationType) {
        let Some(idx) = self.tracker_index(x, y) else {
            return;
        };
        let mut cell = self.current.get(x, y);
        cell.level = cell.level.saturating_add(amount.min(255) as u8);

        let tracker = &mut self.trackers[idx];
        if amount > tracker.best_contribution {
            tracker.best_contribution = amount;
            cell.dominant_type = kind as u8;
        }
        self.current.set(x, y, cell);
    }

    fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
        self.current = self.previous.clone();
        for t in &mut self.trackers {
            *t = DominantTracker::default();
        }
    }

    fn decay(&mut self) {
        let side = self.side as i32;
        for y in 0..side {
            for x in 0..side {
                let mut cell = self.current.get(x, y);
                cell.level = cell.level.saturating_sub(DEFAULT_NATURAL_DECAY_PER_TICK);
                if cell.level == 0 {
                    cell.dominant_type = 0;
                }
                self.current.set(x, y, cell);
            }
        }
    }

    fn recompute_stats(&mut self) {
        let side = self.side as i32;
        let mut total = 0u64;
        let mut toxic = 0u32;
        for y in 0..side {
            for x in 0..side {
                let level = self.current.get(x, y).level;
                total += level as u64;
                if level >= DEFAULT_TOXIC_THRESHOLD {
                    toxic += 1;
                }
            }
        }
        self.total = total;
        self.toxic_tile_count = toxic;
    }
}

/// Driving subsystem: iterates `ContaminationSource` components paired with
/// their entity's `Position`, generating + diffusing into the field each
/// tick.
pub struct Contamination {
    /// Tiles known to host a fixed terrain-borne source (blight mires).
    /// Rebuilt when [`Contamination::invalidate_terrain_sources`] marks it
    /// dirty, per spec §4.8's "dedicated cache invalidator".
    terrain_sources_dirty: bool,
    terrain_sources: Vec<(i32, i32)>,
}

pub const BLIGHT_MIRE_OUTPUT: u16 = 30;

impl Default for Contamination {
    fn default() -> Self {
        Self {
            terrain_sources_dirty: true,
            terrain_sources: Vec::new(),
        }
    }
}

impl Contamination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate_terrain_sources(&mut self) {
        self.terrain_sources_dirty = true;
    }

    fn rebuild_terrain_sources(&mut self, world: &SimWorld) {
        self.terrain_sources.clear();
        let side = world.map_side as i32;
        for y in 0..side {
            for x in 0..side {
                if world.terrain.get(x, y).terrain_type.is_terraformable_source() {
                    self.terrain_sources.push((x, y));
                }
            }
        }
        self.terrain_sources_dirty = false;
    }

    fn positioned_entities(world: &SimWorld) -> Vec<(EntityId, i32, i32)> {
        world
            .entities
            .contamination_sources
            .ids()
            .filter_map(|id| {
                world
                    .entities
                    .positions
                    .get(id)
                    .map(|p| (id, p.x, p.y))
            })
            .collect()
    }
}

impl Simulatable for Contamination {
    fn priority(&self) -> i32 {
        crate::config::priority::CONTAMINATION
    }

    fn tick(&mut self, _time: SchedulerTime, world: &mut SimWorld) {
        world.contamination.swap();
        // Decay the carried-over level before this tick's sources add their
        // output, so a source's own freshly-generated contribution isn't
        // immediately clipped by the same tick's decay (spec §8 scenario 5:
        // a lone nexus's level reads exactly its `current_output` after one
        // tick, not `output - decay`).
        world.contamination.decay();

        if self.terrain_sources_dirty {
            self.rebuild_terrain_sources(world);
        }

        let positioned = Self::positioned_entities(world);
        for (id, x, y) in positioned {
            let source = *world.entities.contamination_sources.get(id).unwrap();
            if !source.is_active {
                continue;
            }
            let output = source.current_output.min(255);
            world.contamination.add(x, y, output, source.kind);

            let radius = source.spread_radius as i32;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let dist = dx.abs().max(dy.abs());
                    if dist == 0 || dist > radius {
                        continue;
                    }
                    let attenuation = (100u32.saturating_sub(source.spread_decay_rate as u32 * dist as u32)).max(0);
                    let contribution = (output as u32 * attenuation / 100) as u16;
                    if contribution == 0 {
                        continue;
                    }
                    world
                        .contamination
                        .add(x + dx, y + dy, contribution, source.kind);
                }
            }
        }

        for &(x, y) in &self.terrain_sources.clone() {
            world
                .contamination
                .add(x, y, BLIGHT_MIRE_OUTPUT, ContaminationType::Terrain);
        }

        world.contamination.recompute_stats();
    }

    fn name(&self) -> &'static str {
        "contamination"
    }
}

/// Overlay color for a contamination level: intensity of red scales with
/// level, alpha scales with level so clean tiles render fully transparent
/// (mirrors [`crate::land_value::color_band`]'s banding approach but as a
/// continuous ramp since contamination has no neutral midpoint to band
/// around).
pub fn color_ramp(level: u8) -> (u8, u8, u8, u8) {
    (200, 40, 40, level)
}

/// Read-only overlay surface for host UIs (spec §6 `GridOverlay`).
pub struct ContaminationOverlay<'a> {
    pub world: &'a SimWorld,
}

impl crate::providers::GridOverlay for ContaminationOverlay<'_> {
    fn get_name(&self) -> &'static str {
        "contamination"
    }

    fn is_active(&self) -> bool {
        true
    }

    fn get_color_at(&self, x: i32, y: i32) -> (u8, u8, u8, u8) {
        color_ramp(self.world.contamination.level_at(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ContaminationSource, Position};
    use crate::config::SimConfig;

    #[test]
    fn single_nexus_diffuses_with_attenuation_and_radius_cutoff() {
        let mut world = SimWorld::new(128, 1, SimConfig::default());
        let id = world.entities.spawn();
        world.entities.positions.insert(
            id,
            Position {
                x: 64,
                y: 64,
                z: 0.0,
            },
        );
        world.entities.contamination_sources.insert(
            id,
            ContaminationSource {
                base_output: 200,
                current_output: 200,
                spread_radius: 4,
                spread_decay_rate: 25,
                kind: ContaminationType::Energy,
                is_active: true,
            },
        );

        let mut sub = Contamination::new();
        let time = SchedulerTime {
            tick: crate::ids::Tick(1),
            phase: 0,
            cycle: 0,
        };
        sub.tick(time, &mut world);

        assert_eq!(world.contamination.level_at(64, 64), 200);
        assert_eq!(
            world.contamination.dominant_type_at(64, 64),
            ContaminationType::Energy as u8
        );
        assert!(world.contamination.level_at(65, 64) > 0);
        assert_eq!(world.contamination.level_at(64 + 5, 64), 0);
        assert_eq!(world.contamination.level_at(64 + 10, 64), 0);
    }

    #[test]
    fn level_saturates_at_255_and_0() {
        let mut world = SimWorld::new(32, 1, SimConfig::default());
        world.contamination.add(5, 5, 300, ContaminationType::Traffic);
        assert_eq!(world.contamination.current.get(5, 5).level, 255);
        world.contamination.add(5, 5, 10, ContaminationType::Traffic);
        assert_eq!(world.contamination.current.get(5, 5).level, 255);

        let mut field = ContaminationField::new(32);
        field.decay();
        assert_eq!(field.current.get(5, 5).level, 0);
    }

    #[test]
    fn tie_keeps_previous_dominant_type() {
        let mut field = ContaminationField::new(32);
        field.add(1, 1, 50, ContaminationType::Energy);
        field.add(1, 1, 50, ContaminationType::Industrial);
        assert_eq!(field.current.get(1, 1).dominant_type, ContaminationType::Energy as u8);
    }

    #[test]
    fn strictly_greater_contribution_takes_dominance() {
        let mut field = ContaminationField::new(32);
        field.add(1, 1, 50, ContaminationType::Energy);
        field.add(1, 1, 51, ContaminationType::Industrial);
        assert_eq!(
            field.current.get(1, 1).dominant_type,
            ContaminationType::Industrial as u8
        );
    }

    #[test]
    fn swap_then_swap_restores_prior_semantics() {
        let mut field = ContaminationField::new(16);
        field.add(3, 3, 100, ContaminationType::Traffic);
        field.swap();
        assert_eq!(field.previous.get(3, 3).level, 100);
        field.swap();
        assert_eq!(field.current.get(3, 3).level, 100);
    }

    #[test]
    fn toxic_tile_count_at_respects_caller_threshold() {
        let mut field = ContaminationField::new(8);
        field.add(0, 0, 200, ContaminationType::Industrial);
        field.add(1, 0, 50, ContaminationType::Industrial);
        assert_eq!(field.toxic_tile_count_at(100), 1);
        assert_eq!(field.toxic_tile_count_at(10), 2);
    }

    #[test]
    fn overlay_color_alpha_tracks_level() {
        use crate::providers::GridOverlay;
        let mut world = SimWorld::new(8, 1, crate::config::SimConfig::default());
        world.contamination.add(2, 2, 180, ContaminationType::Industrial);
        world.contamination.swap();
        let overlay = ContaminationOverlay { world: &world };
        let (_, _, _, a) = overlay.get_color_at(2, 2);
        assert_eq!(a, world.contamination.level_at(2, 2));
    }
}
