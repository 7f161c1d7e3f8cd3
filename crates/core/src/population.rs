//! Population aggregation, health index, and milestone detection (spec
//! §4.11, priority 50 — the last subsystem to run each tick, so its
//! aggregates reflect every other subsystem's output for the current tick).
//!
//! Population has no component columns of its own: it is a pure read of
//! `Active` habitation buildings' `current_occupancy`, plus a small amount of
//! per-player bookkeeping (previous population, for milestone-crossing
//! detection, and a host-settable medical-coverage ratio -- see below).
//!
//! **(supplement, from `original_source/include/sims3000/population/
//! PopulationMilestones.h` and `HealthIndex.h`)**: neither spec.md nor the
//! retrieved original headers define a medical/civic-service coverage
//! subsystem (no hospital/clinic templates exist in this core's building
//! registry). `medical_coverage` is therefore exposed as a per-player
//! external input the host sets directly (`set_medical_coverage`), the same
//! pattern `Energy`/`Fluid` use for `set_consumption_demand` -- defaulting to
//! `0.0` (no coverage) rather than fabricating a plausible-looking number.

use crate::config::priority;
use crate::components::{BuildingState, ZoneType};
use crate::events::{Milestone, MilestoneDirection};
use crate::ids::PlayerId;
use crate::subsystem::{SchedulerTime, Simulatable};
use crate::world::SimWorld;

const NUM_SLOTS: usize = PlayerId::MAX_PLAYERS as usize + 1;

fn slot(owner: PlayerId) -> usize {
    owner.0 as usize
}

/// Population milestone levels (spec §4.11, GLOSSARY), in ascending
/// threshold order. Matches `PopulationMilestones.h`'s `MilestoneType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilestoneType {
    Village,
    Town,
    City,
    Metropolis,
    Megalopolis,
}

impl MilestoneType {
    pub const ALL: [MilestoneType; 5] = [
        MilestoneType::Village,
        MilestoneType::Town,
        MilestoneType::City,
        MilestoneType::Metropolis,
        MilestoneType::Megalopolis,
    ];

    pub fn threshold(self) -> u32 {
        match self {
            MilestoneType::Village => 100,
            MilestoneType::Town => 500,
            MilestoneType::City => 2_000,
            MilestoneType::Metropolis => 10_000,
            MilestoneType::Megalopolis => 50_000,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MilestoneType::Village => "Village",
            MilestoneType::Town => "Town",
            MilestoneType::City => "City",
            MilestoneType::Metropolis => "Metropolis",
            MilestoneType::Megalopolis => "Megalopolis",
        }
    }
}

/// A single milestone crossing detected between two population readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneCrossing {
    pub kind: MilestoneType,
    pub population: u32,
    pub is_upgrade: bool,
}

/// Detects every milestone threshold crossed between `previous` and
/// `current` (spec §4.11, §8 scenario 6). A large single-tick jump can cross
/// several thresholds at once; they are returned in ascending threshold
/// order regardless of growth direction, matching
/// `PopulationMilestones.cpp::check_milestones`.
pub fn check_milestones(previous: u32, current: u32) -> Vec<MilestoneCrossing> {
    let mut events = Vec::new();
    if previous == current {
        return events;
    }
    let growing = current > previous;
    for kind in MilestoneType::ALL {
        let threshold = kind.threshold();
        if growing {
            if previous < threshold && current >= threshold {
                events.push(MilestoneCrossing { kind, population: current, is_upgrade: true });
            }
        } else if previous >= threshold && current < threshold {
            events.push(MilestoneCrossing { kind, population: current, is_upgrade: false });
        }
    }
    events
}

/// Highest milestone level reached by `population`; `Village` is the floor
/// (spec §4.11's `get_milestone_level`, "below 100 beings" still reports the
/// lowest level rather than "none").
pub fn milestone_level(population: u32) -> MilestoneType {
    for kind in MilestoneType::ALL.into_iter().rev() {
        if population >= kind.threshold() {
            return kind;
        }
    }
    MilestoneType::Village
}

/// Inputs to the health-index formula (spec §4.11, resolved in
/// `SPEC_FULL.md` §4.11 from `HealthIndex.h`). All ratios are `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthIndexInputs {
    pub medical_coverage: f32,
    pub contamination_ratio: f32,
    pub fluid_availability_ratio: f32,
}

/// `baseline(50) + medical_coverage*25 - contamination_ratio*30 +
/// fluid_availability_ratio*10 - (1-fluid_availability_ratio)*10`, clamped to
/// `[0, 100]`.
pub fn compute_health_index(inputs: HealthIndexInputs) -> u8 {
    let medical = inputs.medical_coverage.clamp(0.0, 1.0);
    let contamination = inputs.contamination_ratio.clamp(0.0, 1.0);
    let fluid = inputs.fluid_availability_ratio.clamp(0.0, 1.0);

    let raw = 50.0 + medical * 25.0 - contamination * 30.0 + fluid * 10.0 - (1.0 - fluid) * 10.0;
    raw.clamp(0.0, 100.0) as u8
}

/// Per-tick population/health/milestone aggregator.
pub struct Population {
    previous_population: [u32; NUM_SLOTS],
    current_population: [u32; NUM_SLOTS],
    medical_coverage: [f32; NUM_SLOTS],
    health_index: [u8; NUM_SLOTS],
}

impl Default for Population {
    fn default() -> Self {
        Self::new()
    }
}

impl Population {
    pub fn new() -> Self {
        Self {
            previous_population: [0; NUM_SLOTS],
            current_population: [0; NUM_SLOTS],
            medical_coverage: [0.0; NUM_SLOTS],
            health_index: [50; NUM_SLOTS],
        }
    }

    /// Host-supplied civic/medical coverage ratio for `owner`, `[0, 1]`. No
    /// medical-service subsystem exists in this core (see module docs); a
    /// host that adds one drives this value each tick before `update`.
    pub fn set_medical_coverage(&mut self, owner: PlayerId, coverage: f32) {
        self.medical_coverage[slot(owner)] = coverage.clamp(0.0, 1.0);
    }

    pub fn population(&self, owner: PlayerId) -> u32 {
        self.current_population[slot(owner)]
    }

    pub fn health_index(&self, owner: PlayerId) -> u8 {
        self.health_index[slot(owner)]
    }

    pub fn total_population(&self) -> u32 {
        self.current_population.iter().copied().sum()
    }

    /// Fraction of `Active` habitation buildings owned by `owner` whose tile
    /// is on the fluid network, used as `fluid_availability_ratio` (spec
    /// §4.11). Mirrors `building::BuildingSystem`'s self-contained grid
    /// reads rather than threading a `FluidProvider` through `tick()` (spec
    /// §9, same pattern as `crate::rail::Rail`).
    fn fluid_availability_ratio(world: &SimWorld, owner: PlayerId) -> f32 {
        let mut total = 0u32;
        let mut served = 0u32;
        for id in world.entities.buildings.ids() {
            let building = world.entities.buildings.get(id).unwrap();
            if building.zone_type != ZoneType::Habitation || building.state != BuildingState::Active {
                continue;
            }
            if world.entities.ownerships.get(id).map(|o| o.owner) != Some(owner) {
                continue;
            }
            total += 1;
            if let Some(pos) = world.entities.positions.get(id) {
                if world.fluid_network_id.get(pos.x, pos.y) != 0 {
                    served += 1;
                }
            }
        }
        if total == 0 {
            1.0
        } else {
            served as f32 / total as f32
        }
    }

    fn contamination_ratio(world: &SimWorld) -> f32 {
        let side = world.map_side as u64;
        let tiles = side * side;
        if tiles == 0 {
            return 0.0;
        }
        (world.contamination.total() as f32 / tiles as f32) / 255.0
    }

    fn sum_population(world: &SimWorld, owner: PlayerId) -> u32 {
        let mut total = 0u32;
        for id in world.entities.buildings.ids() {
            let building = world.entities.buildings.get(id).unwrap();
            if building.zone_type != ZoneType::Habitation || building.state != BuildingState::Active {
                continue;
            }
            if world.entities.ownerships.get(id).map(|o| o.owner) != Some(owner) {
                continue;
            }
            total += building.current_occupancy;
        }
        total
    }
}

impl Simulatable for Population {
    fn priority(&self) -> i32 {
        priority::POPULATION
    }

    fn tick(&mut self, _time: SchedulerTime, world: &mut SimWorld) {
        let contamination_ratio = Self::contamination_ratio(world);

        for raw_owner in 0..=PlayerId::MAX_PLAYERS {
            let owner = PlayerId(raw_owner);
            let idx = slot(owner);

            let current = Self::sum_population(world, owner);
            self.previous_population[idx] = self.current_population[idx];
            self.current_population[idx] = current;

            let fluid_ratio = Self::fluid_availability_ratio(world, owner);
            self.health_index[idx] = compute_health_index(HealthIndexInputs {
                medical_coverage: self.medical_coverage[idx],
                contamination_ratio,
                fluid_availability_ratio: fluid_ratio,
            });

            for crossing in check_milestones(self.previous_population[idx], current) {
                world.events.milestone.push(Milestone {
                    owner,
                    name: crossing.kind.name(),
                    threshold: crossing.kind.threshold(),
                    direction: if crossing.is_upgrade { MilestoneDirection::Up } else { MilestoneDirection::Down },
                });
            }
        }
    }

    fn name(&self) -> &'static str {
        "population"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Building, Construction, ConstructionPhase, Density, Footprint, Ownership, Position};
    use crate::config::SimConfig;
    use crate::ids::Tick;

    fn world(side: u16) -> SimWorld {
        SimWorld::new(side, 1, SimConfig::default())
    }

    fn tick_at(n: u64) -> SchedulerTime {
        SchedulerTime { tick: Tick(n), phase: 0, cycle: 0 }
    }

    fn spawn_active_habitation(world: &mut SimWorld, owner: PlayerId, x: i32, y: i32, occupancy: u32) {
        let entity = world.entities.spawn();
        world.entities.positions.insert(entity, Position { x, y, z: 0.0 });
        world.entities.ownerships.insert(entity, Ownership { owner });
        world.entities.buildings.insert(
            entity,
            Building {
                template_id: 1,
                state: BuildingState::Active,
                zone_type: ZoneType::Habitation,
                density: Density::Low,
                level: 1,
                health: 255,
                capacity: occupancy,
                current_occupancy: occupancy,
                footprint: Footprint::new(1, 1),
                rotation: 0,
                color_accent: 0,
                abandon_timer: 0,
                state_changed_tick: Tick::ZERO,
            },
        );
        world.fluid_network_id.set(x, y, 1);
    }

    #[test]
    fn milestone_single_upgrade_matches_worked_example() {
        let crossings = check_milestones(50, 150);
        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].kind, MilestoneType::Village);
        assert_eq!(crossings[0].population, 150);
        assert!(crossings[0].is_upgrade);
    }

    #[test]
    fn milestone_single_downgrade() {
        let crossings = check_milestones(600, 400);
        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].kind, MilestoneType::Town);
        assert!(!crossings[0].is_upgrade);
    }

    #[test]
    fn milestone_multiple_upgrades_in_one_jump_are_ordered() {
        let crossings = check_milestones(50, 3000);
        let kinds: Vec<_> = crossings.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![MilestoneType::Village, MilestoneType::Town, MilestoneType::City]);
        assert!(crossings.iter().all(|c| c.is_upgrade));
    }

    #[test]
    fn milestone_scenario_town_then_city_upward() {
        // spec §8 scenario 6: previous 150, current 2100 -> Town then City, in order.
        let crossings = check_milestones(150, 2100);
        let kinds: Vec<_> = crossings.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![MilestoneType::Town, MilestoneType::City]);
    }

    #[test]
    fn milestone_scenario_three_downward_crossings() {
        // spec §8 scenario 6: previous 2100, current 50 -> three downward events.
        let crossings = check_milestones(2100, 50);
        assert_eq!(crossings.len(), 3);
        assert!(crossings.iter().all(|c| !c.is_upgrade));
    }

    #[test]
    fn no_crossing_when_staying_in_same_band() {
        assert!(check_milestones(120, 140).is_empty());
    }

    #[test]
    fn milestone_level_floors_at_village() {
        assert_eq!(milestone_level(0), MilestoneType::Village);
        assert_eq!(milestone_level(99), MilestoneType::Village);
        assert_eq!(milestone_level(100), MilestoneType::Village);
        assert_eq!(milestone_level(2_000), MilestoneType::City);
        assert_eq!(milestone_level(50_000), MilestoneType::Megalopolis);
    }

    #[test]
    fn health_index_baseline_with_no_adjustments() {
        let idx = compute_health_index(HealthIndexInputs {
            medical_coverage: 0.0,
            contamination_ratio: 0.0,
            fluid_availability_ratio: 0.0,
        });
        // 50 + 0 - 0 + 0 - 10 = 40
        assert_eq!(idx, 40);
    }

    #[test]
    fn health_index_full_coverage_no_contamination_full_fluid() {
        let idx = compute_health_index(HealthIndexInputs {
            medical_coverage: 1.0,
            contamination_ratio: 0.0,
            fluid_availability_ratio: 1.0,
        });
        // 50 + 25 - 0 + 10 - 0 = 85
        assert_eq!(idx, 85);
    }

    #[test]
    fn health_index_clamps_at_zero_under_full_contamination() {
        let idx = compute_health_index(HealthIndexInputs {
            medical_coverage: 0.0,
            contamination_ratio: 1.0,
            fluid_availability_ratio: 0.0,
        });
        // 50 - 30 - 10 = 10, still positive, but confirm no underflow/panic.
        assert_eq!(idx, 10);
    }

    #[test]
    fn tick_aggregates_population_by_owner_and_emits_milestone_events() {
        let mut w = world(32);
        let mut pop = Population::new();

        for i in 0..60u32 {
            spawn_active_habitation(&mut w, PlayerId(1), (i % 32) as i32, (i / 32) as i32, 10);
        }
        pop.tick(tick_at(1), &mut w);
        assert_eq!(pop.population(PlayerId(1)), 600);
        assert_eq!(pop.population(PlayerId(2)), 0);

        let events: Vec<_> = w.events.milestone.drain().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Village");
        assert_eq!(events[0].threshold, 100);
        assert_eq!(events[0].owner, PlayerId(1));
    }

    #[test]
    fn construction_column_unused_buildings_are_excluded_from_population() {
        let mut w = world(16);
        let entity = w.entities.spawn();
        w.entities.positions.insert(entity, Position { x: 0, y: 0, z: 0.0 });
        w.entities.ownerships.insert(entity, Ownership { owner: PlayerId(1) });
        w.entities.buildings.insert(
            entity,
            Building {
                template_id: 1,
                state: BuildingState::Materializing,
                zone_type: ZoneType::Habitation,
                density: Density::Low,
                level: 0,
                health: 255,
                capacity: 10,
                current_occupancy: 10,
                footprint: Footprint::new(1, 1),
                rotation: 0,
                color_accent: 0,
                abandon_timer: 0,
                state_changed_tick: Tick::ZERO,
            },
        );
        w.entities.constructions.insert(
            entity,
            Construction {
                ticks_total: 10,
                ticks_elapsed: 0,
                phase: ConstructionPhase::Foundation,
                phase_progress: 0,
                is_paused: false,
                construction_cost: 100,
            },
        );

        let mut pop = Population::new();
        pop.tick(tick_at(1), &mut w);
        assert_eq!(pop.population(PlayerId(1)), 0);
    }
}
