//! Land value subsystem: a derived byte grid influenced by contamination and
//! coverage, exposed through an overlay coloring plus aggregate stats, and
//! the pure demand-cap formulas zoning growth is bounded by (spec §4.9).
//!
//! Land value has no independent source of truth -- every tick it is
//! recomputed from the previous tick's grid plus this tick's contamination
//! and coverage signals, then lightly diffused toward its neighbors so
//! value changes read as a gradient rather than a checkerboard (spec §4.9
//! "a slow diffusion").

use crate::config::priority;
use crate::grid::LAND_VALUE_NEUTRAL;
use crate::providers::TransportProvider;
use crate::subsystem::{SchedulerTime, Simulatable};
use crate::world::SimWorld;

/// Contamination points subtracted from land value per point of
/// contamination level, scaled down from the 0..255 contamination range
/// (decided: a fully-toxic tile at level 255 costs roughly 64 land-value
/// points per tick before diffusion smooths it out).
const CONTAMINATION_PENALTY_SCALE: f32 = 64.0 / 255.0;

/// Land value gained per tick for a tile connected to the road network,
/// representing generic civic coverage until the building subsystem
/// registers per-service coverage directly (decided, see `DESIGN.md`).
const ROAD_COVERAGE_BONUS: f32 = 0.15;

/// Fraction of the gap toward the 4-neighbor average closed per tick.
const DIFFUSION_RATE: f32 = 0.05;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LandValueStats {
    pub average: f32,
    pub max: u8,
    pub min: u8,
    pub high_count: u32,
    pub low_count: u32,
}

/// Overlay color band (spec §4.9): red <64, orange 64..127, yellow
/// 128..191, green >=192.
pub fn color_band(value: u8) -> (u8, u8, u8, u8) {
    match value {
        0..=63 => (220, 60, 60, 255),
        64..=127 => (230, 150, 60, 255),
        128..=191 => (220, 210, 70, 255),
        _ => (80, 200, 100, 255),
    }
}

pub struct LandValue {
    initialized: bool,
    stats: LandValueStats,
}

impl Default for LandValue {
    fn default() -> Self {
        Self {
            initialized: false,
            stats: LandValueStats::default(),
        }
    }
}

impl LandValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> LandValueStats {
        self.stats
    }

    fn recompute_stats(&mut self, world: &SimWorld) {
        let side = world.map_side as i32;
        let mut total = 0u64;
        let mut max = 0u8;
        let mut min = 255u8;
        let mut high = 0u32;
        let mut low = 0u32;
        let count = (side * side) as u64;

        for y in 0..side {
            for x in 0..side {
                let v = world.land_value.get(x, y);
                total += v as u64;
                max = max.max(v);
                min = min.min(v);
                if v >= 192 {
                    high += 1;
                }
                if v < 64 {
                    low += 1;
                }
            }
        }

        self.stats = LandValueStats {
            average: if count > 0 { total as f32 / count as f32 } else { 0.0 },
            max,
            min,
            high_count: high,
            low_count: low,
        };
    }
}

impl Simulatable for LandValue {
    fn priority(&self) -> i32 {
        priority::LAND_VALUE
    }

    fn tick(&mut self, _time: SchedulerTime, world: &mut SimWorld) {
        if !self.initialized {
            world.land_value.fill(LAND_VALUE_NEUTRAL);
            self.initialized = true;
        }

        let side = world.map_side as i32;
        let mut next = world.land_value.clone();

        for y in 0..side {
            for x in 0..side {
                let current = world.land_value.get(x, y) as f32;
                let contamination = world.contamination.level_at(x, y) as f32 * CONTAMINATION_PENALTY_SCALE;
                let connected = world.network_id.get(x, y) != 0;
                let coverage = if connected { ROAD_COVERAGE_BONUS } else { 0.0 };

                let neighbor_avg = {
                    let neighbors: Vec<(i32, i32)> = world.land_value.neighbors4(x, y).collect();
                    if neighbors.is_empty() {
                        current
                    } else {
                        let sum: f32 = neighbors.iter().map(|&(nx, ny)| world.land_value.get(nx, ny) as f32).sum();
                        sum / neighbors.len() as f32
                    }
                };

                let adjusted = current - contamination + coverage;
                let diffused = adjusted + (neighbor_avg - adjusted) * DIFFUSION_RATE;
                next.set(x, y, diffused.round().clamp(0.0, 255.0) as u8);
            }
        }

        world.land_value = next;
        self.recompute_stats(world);
    }

    fn name(&self) -> &'static str {
        "land_value"
    }
}

/// Read-only overlay surface for host UIs, mirroring
/// [`crate::providers::GridOverlay`]'s contract for the land-value layer.
pub struct LandValueOverlay<'a> {
    pub world: &'a SimWorld,
}

impl crate::providers::GridOverlay for LandValueOverlay<'_> {
    fn get_name(&self) -> &'static str {
        "land_value"
    }

    fn is_active(&self) -> bool {
        true
    }

    fn get_color_at(&self, x: i32, y: i32) -> (u8, u8, u8, u8) {
        color_band(self.world.land_value.get(x, y))
    }
}

/// Demand-cap inputs and the pure formulas bounding how many new buildings
/// of each zone may materialize per tick (spec §4.9). Factors are expected
/// in `[0, 1]`; callers clamp upstream (energy/fluid/transport providers
/// already return ratios in that range).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandCapInputs {
    pub housing_capacity: u32,
    pub exchange_jobs: u32,
    pub fabrication_jobs: u32,
    pub energy_factor: f32,
    pub fluid_factor: f32,
    pub transport_factor: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandCaps {
    pub habitation_cap: u32,
    pub exchange_cap: u32,
    pub fabrication_cap: u32,
}

pub fn calculate_demand_caps(inputs: DemandCapInputs) -> DemandCaps {
    let habitation_cap = (inputs.housing_capacity as f32 * inputs.energy_factor * inputs.fluid_factor).floor() as u32;
    let exchange_cap = (inputs.exchange_jobs as f32 * inputs.transport_factor).floor() as u32;
    let fabrication_cap = (inputs.fabrication_jobs as f32 * inputs.transport_factor).floor() as u32;
    DemandCaps {
        habitation_cap,
        exchange_cap,
        fabrication_cap,
    }
}

/// Derives `transport_factor` from a [`TransportProvider`]'s congestion
/// reading at a tile: `1.0 - congestion`, since congestion is already
/// normalized to `[0, 1]` (spec §4.4).
pub fn transport_factor_at(transport: &dyn TransportProvider, x: i32, y: i32) -> f32 {
    (1.0 - transport.get_congestion_at(x, y)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::ids::Tick;

    fn world(side: u16) -> SimWorld {
        SimWorld::new(side, 1, SimConfig::default())
    }

    fn tick_at(n: u64) -> SchedulerTime {
        SchedulerTime { tick: Tick(n), phase: 0, cycle: 0 }
    }

    #[test]
    fn demand_cap_matches_worked_example() {
        let caps = calculate_demand_caps(DemandCapInputs {
            housing_capacity: 1000,
            exchange_jobs: 500,
            fabrication_jobs: 0,
            energy_factor: 0.5,
            fluid_factor: 1.0,
            transport_factor: 0.3,
        });
        assert_eq!(caps.habitation_cap, 500);
        assert_eq!(caps.exchange_cap, 150);
    }

    #[test]
    fn color_bands_match_thresholds() {
        assert_eq!(color_band(0).0, 220);
        assert_eq!(color_band(63).0, 220);
        assert_eq!(color_band(64).0, 230);
        assert_eq!(color_band(127).0, 230);
        assert_eq!(color_band(128).0, 220);
        assert_eq!(color_band(191).0, 220);
        assert_eq!(color_band(192).0, 80);
        assert_eq!(color_band(255).0, 80);
    }

    #[test]
    fn first_tick_initializes_to_neutral() {
        let mut w = world(16);
        let mut lv = LandValue::new();
        lv.tick(tick_at(1), &mut w);
        assert_eq!(w.land_value.get(8, 8), LAND_VALUE_NEUTRAL);
    }

    #[test]
    fn contamination_pulls_land_value_down_over_time() {
        let mut w = world(16);
        w.contamination.add(8, 8, 255, crate::components::ContaminationType::Industrial);
        let mut lv = LandValue::new();
        for t in 1..=20 {
            lv.tick(tick_at(t), &mut w);
        }
        assert!(w.land_value.get(8, 8) < LAND_VALUE_NEUTRAL);
    }

    #[test]
    fn road_connectivity_raises_land_value_over_time() {
        let mut w = world(16);
        w.network_id.set(8, 8, 1);
        let mut lv = LandValue::new();
        for t in 1..=20 {
            lv.tick(tick_at(t), &mut w);
        }
        assert!(w.land_value.get(8, 8) > LAND_VALUE_NEUTRAL);
    }

    #[test]
    fn stats_track_grid_extremes() {
        let mut w = world(8);
        let mut lv = LandValue::new();
        lv.tick(tick_at(1), &mut w);
        w.land_value.set(0, 0, 255);
        w.land_value.set(1, 0, 10);
        lv.tick(tick_at(2), &mut w);
        let stats = lv.stats();
        assert!(stats.max <= 255);
        assert!(stats.min <= stats.max);
    }
}
