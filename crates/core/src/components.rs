//! Component bundles attached to entities (spec §3.3).
//!
//! Every bundle here is plain, trivially-copyable data. Ownership of *which*
//! subsystem may mutate a bundle kind is a convention enforced by module
//! visibility and the orchestrator's wiring, not by the type system: the
//! building subsystem owns `Building`/`Construction`/`Debris`, transport owns
//! `Road`/`Traffic`, and so on, per spec §3.5.

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::ids::{Credits, PlayerId, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[repr(u8)]
pub enum BuildingState {
    Materializing = 0,
    Active = 1,
    Abandoned = 2,
    Derelict = 3,
    Deconstructed = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[repr(u8)]
pub enum ZoneType {
    Habitation = 0,
    Exchange = 1,
    Fabrication = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[repr(u8)]
pub enum Density {
    Low = 0,
    High = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Footprint {
    pub w: u8,
    pub h: u8,
}

impl Footprint {
    pub fn new(w: u8, h: u8) -> Self {
        Self { w, h }
    }

    /// All tile offsets this footprint covers, relative to its origin.
    pub fn cells(self) -> impl Iterator<Item = (i32, i32)> {
        let (w, h) = (self.w as i32, self.h as i32);
        (0..h).flat_map(move |dy| (0..w).map(move |dx| (dx, dy)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Building {
    pub template_id: u32,
    pub state: BuildingState,
    pub zone_type: ZoneType,
    pub density: Density,
    pub level: u8,
    pub health: u8,
    pub capacity: u32,
    pub current_occupancy: u32,
    pub footprint: Footprint,
    pub rotation: u8,
    pub color_accent: u8,
    pub abandon_timer: u32,
    pub state_changed_tick: Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[repr(u8)]
pub enum ConstructionPhase {
    Foundation = 0,
    Framework = 1,
    Exterior = 2,
    Finalization = 3,
}

impl ConstructionPhase {
    /// Phase implied by completion percent (spec §4.10).
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            0..=24 => ConstructionPhase::Foundation,
            25..=49 => ConstructionPhase::Framework,
            50..=74 => ConstructionPhase::Exterior,
            _ => ConstructionPhase::Finalization,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Construction {
    pub ticks_total: u32,
    pub ticks_elapsed: u32,
    pub phase: ConstructionPhase,
    pub phase_progress: u8,
    pub is_paused: bool,
    pub construction_cost: Credits,
}

impl Construction {
    pub fn percent_complete(&self) -> u8 {
        if self.ticks_total == 0 {
            return 255;
        }
        let ratio = self.ticks_elapsed as f64 / self.ticks_total as f64;
        (ratio * 100.0).clamp(0.0, 100.0) as u8
    }
}

pub const DEFAULT_DEBRIS_CLEAR_TIMER: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Debris {
    pub original_template_id: u32,
    pub clear_timer: u32,
    pub footprint: Footprint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[repr(u8)]
pub enum ContaminationType {
    Energy = 0,
    Industrial = 1,
    Traffic = 2,
    Terrain = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ContaminationSource {
    pub base_output: u16,
    pub current_output: u16,
    pub spread_radius: u8,
    /// Percent attenuation per Chebyshev step, 0..100.
    pub spread_decay_rate: u8,
    pub kind: ContaminationType,
    pub is_active: bool,
}

impl Default for ContaminationSource {
    fn default() -> Self {
        Self {
            base_output: 0,
            current_output: 0,
            spread_radius: 4,
            spread_decay_rate: 25,
            kind: ContaminationType::Terrain,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[repr(u8)]
pub enum RoadType {
    Local = 0,
    Arterial = 1,
    Highway = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Road {
    pub kind: RoadType,
    pub health: u8,
    pub base_capacity: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Encode, Decode, Default)]
pub struct Traffic {
    pub flow_current: f32,
    pub accumulator: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[repr(u8)]
pub enum RailType {
    Surface = 0,
    Elevated = 1,
    Subterra = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Rail {
    pub kind: RailType,
    pub is_powered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[repr(u8)]
pub enum TerminalType {
    Aero = 0,
    Aqua = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Terminal {
    pub kind: TerminalType,
    pub coverage_radius: u8,
    pub is_active: bool,
}

impl Default for Terminal {
    fn default() -> Self {
        Self {
            kind: TerminalType::Aero,
            coverage_radius: 8,
            is_active: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Encode, Decode, Default)]
pub struct EnergyNexus {
    pub base_output: f32,
    pub current_output: f32,
    pub age_ticks: u32,
}

/// Marker component for a tile carrying energy between nexuses and
/// consumers. Ownership lives in the [`Ownership`] column like every other
/// placeable entity (spec §4.7 "connected via conduits").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, Default)]
pub struct EnergyConduit;

/// Marker component, fluid's counterpart to [`EnergyConduit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, Default)]
pub struct FluidConduit;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Encode, Decode, Default)]
pub struct FluidExtractor {
    pub base_output: f32,
    pub current_output: f32,
    pub water_distance: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Encode, Decode, Default)]
pub struct FluidReservoir {
    pub stored: f32,
    pub capacity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, Default)]
pub struct Ownership {
    pub owner: PlayerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Encode, Decode, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    /// Only consumed by rendering collaborators; the core never reads it.
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct TerrainModification {
    pub x: i32,
    pub y: i32,
    pub kind: TerrainOpKindTag,
    /// Only meaningful when `kind == Grade`.
    pub target_elevation: u8,
    pub ticks_total: u32,
    pub ticks_elapsed: u32,
    pub cancelled: bool,
    pub owner: PlayerId,
    pub total_cost: Credits,
}

/// Discriminant for [`TerrainModification::kind`]. Kept as a plain tag
/// rather than a payload-carrying enum so the bundle stays POD with a fixed
/// layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[repr(u8)]
pub enum TerrainOpKindTag {
    Grade = 0,
    Terraform = 1,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footprint_cells_cover_rectangle() {
        let fp = Footprint::new(2, 3);
        let cells: Vec<_> = fp.cells().collect();
        assert_eq!(cells.len(), 6);
        assert!(cells.contains(&(0, 0)));
        assert!(cells.contains(&(1, 2)));
    }

    #[test]
    fn construction_phase_thresholds() {
        assert_eq!(ConstructionPhase::from_percent(0), ConstructionPhase::Foundation);
        assert_eq!(ConstructionPhase::from_percent(24), ConstructionPhase::Foundation);
        assert_eq!(ConstructionPhase::from_percent(25), ConstructionPhase::Framework);
        assert_eq!(ConstructionPhase::from_percent(49), ConstructionPhase::Framework);
        assert_eq!(ConstructionPhase::from_percent(50), ConstructionPhase::Exterior);
        assert_eq!(ConstructionPhase::from_percent(74), ConstructionPhase::Exterior);
        assert_eq!(ConstructionPhase::from_percent(75), ConstructionPhase::Finalization);
        assert_eq!(ConstructionPhase::from_percent(255), ConstructionPhase::Finalization);
    }

    #[test]
    fn construction_percent_complete_clamped() {
        let c = Construction {
            ticks_total: 40,
            ticks_elapsed: 40,
            phase: ConstructionPhase::Finalization,
            phase_progress: 255,
            is_paused: false,
            construction_cost: 1000,
        };
        assert_eq!(c.percent_complete(), 100);
    }
}
