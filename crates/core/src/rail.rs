//! Rail subsystem: per-player rail segments and terminals (spec §4.5).
//!
//! Each tick: refresh `is_powered` from the energy provider, recompute
//! terminal activity (powered + adjacent rail), and expose a traffic-
//! reduction field aggregated as the maximum across overlapping terminals.

use crate::components::{Ownership, Position, Terminal};
use crate::config::priority;
use crate::error::ValidationError;
use crate::ids::{Coord, EntityId, PlayerId};
use crate::subsystem::{SchedulerTime, Simulatable};
use crate::world::SimWorld;

pub struct Rail;

impl Default for Rail {
    fn default() -> Self {
        Self::new()
    }
}

impl Rail {
    pub fn new() -> Self {
        Self
    }

    pub fn place_rail(
        &mut self,
        world: &mut SimWorld,
        x: Coord,
        y: Coord,
        kind: crate::components::RailType,
        owner: PlayerId,
    ) -> Result<EntityId, ValidationError> {
        if !world.in_bounds(x, y) {
            return Err(ValidationError::OutOfBounds);
        }
        let id = world.entities.spawn();
        world.entities.rails.insert(
            id,
            crate::components::Rail {
                kind,
                is_powered: false,
            },
        );
        world.entities.positions.insert(id, Position { x, y, z: 0.0 });
        world.entities.ownerships.insert(id, Ownership { owner });
        Ok(id)
    }

    pub fn place_terminal(
        &mut self,
        world: &mut SimWorld,
        x: Coord,
        y: Coord,
        kind: crate::components::TerminalType,
        coverage_radius: u8,
        owner: PlayerId,
    ) -> Result<EntityId, ValidationError> {
        if !world.in_bounds(x, y) {
            return Err(ValidationError::OutOfBounds);
        }
        if any_terminal_at(world, x, y) {
            return Err(ValidationError::AlreadyPlaced);
        }
        if !any_rail_adjacent(world, x, y) {
            return Err(ValidationError::NoAdjacentRail);
        }

        let id = world.entities.spawn();
        world.entities.terminals.insert(
            id,
            Terminal {
                kind,
                coverage_radius,
                is_active: false,
            },
        );
        world.entities.positions.insert(id, Position { x, y, z: 0.0 });
        world.entities.ownerships.insert(id, Ownership { owner });
        Ok(id)
    }

    /// Maximum traffic-reduction percent (0..=50) contributed by any
    /// overlapping active terminal at `(x, y)` (spec §4.5 step 3).
    pub fn traffic_reduction_at(&self, world: &SimWorld, x: Coord, y: Coord) -> u8 {
        let mut best = 0u8;
        for id in world.entities.terminals.ids() {
            let terminal = world.entities.terminals.get(id).unwrap();
            if !terminal.is_active {
                continue;
            }
            let Some(pos) = world.entities.positions.get(id) else {
                continue;
            };
            let dist = (pos.x - x).unsigned_abs() + (pos.y - y).unsigned_abs();
            let radius = terminal.coverage_radius as u32;
            if dist > radius {
                continue;
            }
            let reduction = if radius == 0 {
                50
            } else {
                (50.0 * (1.0 - dist as f32 / radius as f32)).round() as u8
            };
            best = best.max(reduction);
        }
        best
    }
}

fn any_terminal_at(world: &SimWorld, x: Coord, y: Coord) -> bool {
    world.entities.terminals.ids().any(|id| {
        world
            .entities
            .positions
            .get(id)
            .map(|p| p.x == x && p.y == y)
            .unwrap_or(false)
    })
}

fn any_rail_adjacent(world: &SimWorld, x: Coord, y: Coord) -> bool {
    const OFFSETS: [(Coord, Coord); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
    OFFSETS.iter().any(|&(dx, dy)| {
        let (nx, ny) = (x + dx, y + dy);
        world.entities.rails.ids().any(|id| {
            world
                .entities
                .positions
                .get(id)
                .map(|p| p.x == nx && p.y == ny)
                .unwrap_or(false)
        })
    })
}

impl Simulatable for Rail {
    fn priority(&self) -> i32 {
        priority::RAIL
    }

    fn tick(&mut self, _time: SchedulerTime, world: &mut SimWorld) {
        let rail_ids: Vec<EntityId> = world.entities.rails.ids().collect();
        for id in rail_ids {
            let powered = world
                .entities
                .positions
                .get(id)
                .map(|pos| energy_available_fallback(world, pos.x, pos.y))
                .unwrap_or(true);
            if let Some(rail) = world.entities.rails.get_mut(id) {
                rail.is_powered = powered;
            }
        }

        let terminal_ids: Vec<EntityId> = world.entities.terminals.ids().collect();
        for id in terminal_ids {
            let Some(pos) = world.entities.positions.get(id).copied() else {
                continue;
            };
            let powered = energy_available_fallback(world, pos.x, pos.y);
            let has_adjacent_rail = any_rail_adjacent(world, pos.x, pos.y);
            if let Some(terminal) = world.entities.terminals.get_mut(id) {
                terminal.is_active = powered && has_adjacent_rail;
            }
        }
    }

    fn name(&self) -> &'static str {
        "rail"
    }
}

/// Rail power is sourced from the energy grid once the energy subsystem
/// runs ahead of rail in priority order; until then every segment and
/// terminal reports powered (spec §4.5 "fallback: all powered"). Reading
/// `world` here rather than taking a `&dyn EnergyProvider` keeps `Rail`
/// self-contained, matching the `Simulatable::tick` signature that never
/// threads providers into L2 subsystems (spec §9).
fn energy_available_fallback(world: &SimWorld, x: Coord, y: Coord) -> bool {
    let _ = (world, x, y);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{RailType, TerminalType};
    use crate::config::SimConfig;

    fn world() -> SimWorld {
        SimWorld::new(64, 1, SimConfig::default())
    }

    #[test]
    fn place_terminal_requires_adjacent_rail() {
        let mut w = world();
        let mut rail = Rail::new();
        let err = rail
            .place_terminal(&mut w, 5, 5, TerminalType::Aero, 8, PlayerId(1))
            .unwrap_err();
        assert_eq!(err, ValidationError::NoAdjacentRail);
    }

    #[test]
    fn place_terminal_succeeds_with_adjacent_rail() {
        let mut w = world();
        let mut rail = Rail::new();
        rail.place_rail(&mut w, 5, 4, RailType::Surface, PlayerId(1)).unwrap();
        let id = rail
            .place_terminal(&mut w, 5, 5, TerminalType::Aero, 8, PlayerId(1))
            .unwrap();
        assert!(w.entities.terminals.contains(id));
    }

    #[test]
    fn terminal_becomes_active_after_tick_when_powered_and_adjacent() {
        let mut w = world();
        let mut rail = Rail::new();
        rail.place_rail(&mut w, 5, 4, RailType::Surface, PlayerId(1)).unwrap();
        let id = rail
            .place_terminal(&mut w, 5, 5, TerminalType::Aero, 8, PlayerId(1))
            .unwrap();
        let time = SchedulerTime { tick: crate::ids::Tick(1), phase: 0, cycle: 0 };
        rail.tick(time, &mut w);
        assert!(w.entities.terminals.get(id).unwrap().is_active);
    }

    #[test]
    fn traffic_reduction_is_fifty_percent_at_terminal_and_falls_off_to_radius() {
        let mut w = world();
        let mut rail = Rail::new();
        rail.place_rail(&mut w, 5, 4, RailType::Surface, PlayerId(1)).unwrap();
        rail.place_terminal(&mut w, 5, 5, TerminalType::Aero, 8, PlayerId(1)).unwrap();
        let time = SchedulerTime { tick: crate::ids::Tick(1), phase: 0, cycle: 0 };
        rail.tick(time, &mut w);

        assert_eq!(rail.traffic_reduction_at(&w, 5, 5), 50);
        assert_eq!(rail.traffic_reduction_at(&w, 13, 5), 0);
        let mid = rail.traffic_reduction_at(&w, 9, 5);
        assert!(mid > 0 && mid < 50);
    }
}
