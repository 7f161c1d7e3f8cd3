//! Building subsystem: template registry, zone-growth spawning, construction
//! progress, the Materializing/Active/Abandoned/Derelict/Deconstructed
//! lifecycle, demolition, debris clearing, and terrain modification (spec
//! §4.10, priority 40).
//!
//! The most complex subsystem; the other subsystems exist largely to serve
//! it. Per tick, in order: scan zoned tiles for spawn opportunities, advance
//! construction on every `Materializing` building, evaluate lifecycle state
//! transitions, tick debris clear timers, advance in-progress terrain
//! modifications.
//!
//! `Simulatable::tick` takes only `&mut SimWorld` -- it never sees a
//! [`crate::providers::Providers`] bundle or a credit provider (spec §9's
//! provider re-architecture is an orchestrator-level concern, see
//! `crate::providers`). The automatic spawn loop therefore checks
//! connectivity directly off world grids (`energy_network_id`,
//! `fluid_network_id`, `proximity`, `land_value`) rather than through
//! `EnergyProvider`/`FluidProvider`/`TransportProvider`, mirroring
//! [`crate::rail::Rail`]'s self-contained pattern, and never charges
//! credits for organic growth. Player-initiated operations (demolition,
//! terrain modification) take `&mut dyn CreditProvider` as an explicit
//! parameter instead, the same way [`crate::energy::Energy::place_conduit`]
//! takes an explicit `owner`.

use std::collections::HashMap;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::components::{
    Building, BuildingState, ConstructionPhase, Construction, ContaminationSource, ContaminationType,
    Debris, Density, Footprint, Ownership, Position, TerrainModification, TerrainOpKindTag, ZoneType,
    DEFAULT_DEBRIS_CLEAR_TIMER,
};
use crate::config::priority;
use crate::error::{DemolishError, TerrainModError, ValidationError};
use crate::events::{
    BuildingAbandoned, BuildingConstructed, BuildingDeconstructed, BuildingDerelict, BuildingDowngraded,
    BuildingRestored, BuildingStateChanged, BuildingUpgraded, DebrisCleared, TerrainModified,
};
use crate::grid::{DenseGrid, PROXIMITY_OUT_OF_RANGE};
use crate::ids::{Coord, Credits, EntityId, PlayerId, Tick};
use crate::land_value::DemandCaps;
use crate::providers::{BuildingQueryable, BuildingStateQuery, CreditProvider, ZoneQuery};
use crate::subsystem::{SchedulerTime, Simulatable};
use crate::world::SimWorld;

/// Maximum distance (in pathway-proximity steps) a tile may be from the road
/// network and still be considered road-accessible for zone growth (spec
/// §4.4 "road access within N tiles", decided at the transport subsystem's
/// own default search range).
const ROAD_ACCESS_MAX_DISTANCE: u8 = 8;

/// Minimum land value (0..255) a tile must carry before a template will
/// spawn on it (spec §4.10 template field `min_land_value`, folded here to
/// a flat minimum since no template in the initial set demands more).
const DEFAULT_MIN_LAND_VALUE: u8 = 0;

/// How many zoned-but-empty tiles the spawn scan considers per tick, to keep
/// a single tick bounded on large maps (spec §5 "no suspension points within
/// a tick" -- an unbounded scan would be the only way to violate that on a
/// 512-side map).
const MAX_SPAWN_CANDIDATES_PER_TICK: usize = 64;

/// Default spawn allowance when nothing has called [`BuildingSystem::set_demand_caps`]
/// this tick -- unconstrained, matching behavior before demand caps existed.
const UNCAPPED_DEMAND: DemandCaps = DemandCaps {
    habitation_cap: u32::MAX,
    exchange_cap: u32::MAX,
    fabrication_cap: u32::MAX,
};

/// Complete archetype definition for a zone-grown building (spec §4.10).
#[derive(Debug, Clone)]
pub struct BuildingTemplate {
    pub template_id: u32,
    pub name: &'static str,
    pub zone_type: ZoneType,
    pub density: Density,
    pub footprint: Footprint,
    pub construction_ticks: u32,
    pub construction_cost: Credits,
    pub min_land_value: u8,
    pub base_capacity: u32,
    pub energy_required: f32,
    pub fluid_required: f32,
    pub contamination_output: u16,
    pub color_accent_count: u8,
    pub selection_weight: f32,
}

/// (zone_type, density) pool key, kept as a tuple rather than a dedicated
/// struct since both fields are already small `Copy` enums with `Hash`.
type PoolKey = (ZoneType, Density);

/// Immutable-after-load template catalogue, indexed both by id and by
/// `(zone_type, density)` pool for the spawn loop's weighted selection (spec
/// §4.10 "template registry").
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    by_id: HashMap<u32, BuildingTemplate>,
    pools: HashMap<PoolKey, Vec<u32>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template: BuildingTemplate) {
        let key = (template.zone_type, template.density);
        self.pools.entry(key).or_default().push(template.template_id);
        self.by_id.insert(template.template_id, template);
    }

    pub fn get(&self, template_id: u32) -> Option<&BuildingTemplate> {
        self.by_id.get(&template_id)
    }

    pub fn pool(&self, zone_type: ZoneType, density: Density) -> &[u32] {
        self.pools
            .get(&(zone_type, density))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn templates(&self) -> impl Iterator<Item = &BuildingTemplate> {
        self.by_id.values()
    }
}

/// Registers the 30 canonical templates: 5 per `(zone_type, density)` bucket
/// across 6 buckets (spec §4.10, data per the original template briefs).
pub fn register_initial_templates(registry: &mut TemplateRegistry) {
    let rows: &[(u32, &'static str, ZoneType, Density, u8, u8, u32, i64, u32, f32, f32, u16, f32)] = &[
        // Habitation / Low
        (1, "dwelling-pod-alpha", ZoneType::Habitation, Density::Low, 1, 1, 40, 100, 4, 5.0, 3.0, 0, 1.0),
        (2, "dwelling-pod-beta", ZoneType::Habitation, Density::Low, 1, 1, 50, 120, 6, 6.0, 4.0, 0, 1.0),
        (3, "hab-cell-standard", ZoneType::Habitation, Density::Low, 1, 1, 60, 150, 8, 8.0, 5.0, 0, 1.0),
        (4, "hab-cell-compact", ZoneType::Habitation, Density::Low, 1, 1, 70, 180, 10, 9.0, 6.0, 0, 1.0),
        (5, "micro-dwelling", ZoneType::Habitation, Density::Low, 1, 1, 80, 200, 12, 10.0, 7.0, 0, 1.0),
        // Habitation / High
        (6, "hab-spire-minor", ZoneType::Habitation, Density::High, 1, 1, 100, 500, 40, 25.0, 20.0, 0, 1.0),
        (7, "hab-spire-major", ZoneType::Habitation, Density::High, 1, 1, 130, 700, 80, 40.0, 30.0, 0, 1.0),
        (8, "hab-tower-standard", ZoneType::Habitation, Density::High, 1, 1, 150, 900, 120, 50.0, 40.0, 0, 1.0),
        (9, "communal-nexus", ZoneType::Habitation, Density::High, 2, 2, 180, 1200, 160, 70.0, 55.0, 0, 0.8),
        (10, "hab-complex-alpha", ZoneType::Habitation, Density::High, 1, 1, 200, 1500, 200, 80.0, 60.0, 0, 0.6),
        // Exchange / Low
        (11, "market-pod-alpha", ZoneType::Exchange, Density::Low, 1, 1, 40, 120, 2, 4.0, 2.0, 0, 1.0),
        (12, "market-pod-beta", ZoneType::Exchange, Density::Low, 1, 1, 50, 140, 3, 5.0, 3.0, 0, 1.0),
        (13, "trade-cell-standard", ZoneType::Exchange, Density::Low, 1, 1, 60, 160, 4, 6.0, 4.0, 0, 1.0),
        (14, "barter-node", ZoneType::Exchange, Density::Low, 1, 1, 70, 180, 5, 7.0, 4.0, 0, 1.0),
        (15, "exchange-kiosk", ZoneType::Exchange, Density::Low, 1, 1, 80, 200, 6, 8.0, 5.0, 0, 1.0),
        // Exchange / High
        (16, "exchange-tower-alpha", ZoneType::Exchange, Density::High, 1, 1, 100, 600, 20, 20.0, 15.0, 0, 1.0),
        (17, "exchange-tower-beta", ZoneType::Exchange, Density::High, 1, 1, 130, 800, 35, 30.0, 22.0, 0, 1.0),
        (18, "trade-nexus", ZoneType::Exchange, Density::High, 2, 2, 160, 1100, 50, 45.0, 35.0, 0, 0.8),
        (19, "commerce-spire", ZoneType::Exchange, Density::High, 1, 1, 180, 1300, 65, 55.0, 42.0, 0, 0.7),
        (20, "exchange-complex", ZoneType::Exchange, Density::High, 1, 1, 200, 1600, 80, 65.0, 50.0, 0, 0.6),
        // Fabrication / Low
        (21, "fabricator-pod-alpha", ZoneType::Fabrication, Density::Low, 1, 1, 40, 130, 4, 8.0, 3.0, 5, 1.0),
        (22, "fabricator-pod-beta", ZoneType::Fabrication, Density::Low, 1, 1, 50, 160, 5, 10.0, 4.0, 7, 1.0),
        (23, "assembly-cell", ZoneType::Fabrication, Density::Low, 1, 1, 60, 190, 7, 12.0, 5.0, 8, 1.0),
        (24, "forge-pod", ZoneType::Fabrication, Density::Low, 1, 1, 70, 220, 8, 14.0, 6.0, 10, 1.0),
        (25, "workshop-node", ZoneType::Fabrication, Density::Low, 1, 1, 80, 250, 10, 16.0, 7.0, 12, 1.0),
        // Fabrication / High
        (26, "fabrication-tower-alpha", ZoneType::Fabrication, Density::High, 1, 1, 100, 650, 30, 35.0, 20.0, 15, 1.0),
        (27, "fabrication-tower-beta", ZoneType::Fabrication, Density::High, 1, 1, 130, 850, 50, 50.0, 30.0, 20, 1.0),
        (28, "forge-spire", ZoneType::Fabrication, Density::High, 2, 2, 160, 1150, 80, 70.0, 45.0, 30, 0.8),
        (29, "assembly-complex", ZoneType::Fabrication, Density::High, 1, 1, 180, 1400, 100, 80.0, 55.0, 35, 0.7),
        (30, "factory-nexus", ZoneType::Fabrication, Density::High, 1, 1, 200, 1700, 120, 90.0, 65.0, 40, 0.6),
    ];

    for &(template_id, name, zone_type, density, w, h, construction_ticks, construction_cost, base_capacity, energy_required, fluid_required, contamination_output, selection_weight) in rows {
        registry.register(BuildingTemplate {
            template_id,
            name,
            zone_type,
            density,
            footprint: Footprint::new(w, h),
            construction_ticks,
            construction_cost,
            min_land_value: DEFAULT_MIN_LAND_VALUE,
            base_capacity,
            energy_required,
            fluid_required,
            contamination_output,
            color_accent_count: 4,
            selection_weight,
        });
    }
}

/// Per-entity grace-period tracking for service loss (spec §4.10 state
/// transition system). Reset to all-zero on restoration.
#[derive(Debug, Clone, Copy, Default)]
struct ServiceGraceState {
    ticks_without_energy: u32,
    ticks_without_fluid: u32,
    ticks_without_transport: u32,
}

/// Zone designation for one tile. No zone grid exists on [`SimWorld`] (spec
/// §9 flags "bidirectional pointers between BuildingSystem and ZoneSystem"
/// for re-architecture); folding zone state into `Building` privately
/// resolves that without a second cross-referencing subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneCell {
    pub zone_type: ZoneType,
    pub density: Density,
    pub designated: bool,
}

impl Default for ZoneCell {
    fn default() -> Self {
        Self {
            zone_type: ZoneType::Habitation,
            density: Density::Low,
            designated: false,
        }
    }
}

pub struct BuildingSystem {
    registry: TemplateRegistry,
    zones: DenseGrid<ZoneCell>,
    grace_states: HashMap<EntityId, ServiceGraceState>,
    terrain_mods: HashMap<EntityId, ()>,
    /// Round-robin cursor into the zoned-tile scan so a big map's spawn
    /// candidates are serviced fairly across ticks instead of always
    /// favoring low-index tiles (spec §5 bounded per-tick work).
    scan_cursor: usize,
    /// Remaining materializations allowed this tick per zone type (spec
    /// §4.9 demand caps, §4.10 "each tick, under demand caps"). Refreshed by
    /// [`Self::set_demand_caps`] before each tick; defaults to uncapped so
    /// unit tests that never call it behave as before that wiring existed.
    remaining_caps: DemandCaps,
}

impl BuildingSystem {
    pub fn new(map_side: u16) -> Self {
        let mut registry = TemplateRegistry::new();
        register_initial_templates(&mut registry);
        Self {
            registry,
            zones: DenseGrid::new(map_side),
            grace_states: HashMap::new(),
            terrain_mods: HashMap::new(),
            scan_cursor: 0,
            remaining_caps: UNCAPPED_DEMAND,
        }
    }

    /// Sets this tick's per-zone spawn allowance, computed by the caller
    /// (typically the orchestrator, from the previous tick's energy/fluid/
    /// transport provider readings via [`crate::land_value::calculate_demand_caps`]).
    /// Takes effect on the next [`Simulatable::tick`] call.
    pub fn set_demand_caps(&mut self, caps: DemandCaps) {
        self.remaining_caps = caps;
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Sums `energy_required`/`fluid_required` across every `Materializing`
    /// or `Active` building owned by `owner`, for the orchestrator to feed
    /// into [`crate::energy::Energy::set_consumption_demand`] /
    /// [`crate::fluid::Fluid::set_consumption_demand`] between this tick's
    /// building pass and the energy/fluid passes that follow it in priority
    /// order (see module doc comment).
    fn total_service_demand(&self, world: &SimWorld, owner: PlayerId, required: impl Fn(&BuildingTemplate) -> f32) -> f32 {
        world
            .entities
            .buildings
            .ids()
            .filter(|id| matches!(world.entities.buildings.get(*id).unwrap().state, BuildingState::Materializing | BuildingState::Active))
            .filter(|id| world.entities.ownerships.get(*id).map(|o| o.owner) == Some(owner))
            .filter_map(|id| {
                let building = world.entities.buildings.get(id).unwrap();
                self.registry.get(building.template_id)
            })
            .map(required)
            .sum()
    }

    pub fn total_energy_demand(&self, world: &SimWorld, owner: PlayerId) -> f32 {
        self.total_service_demand(world, owner, |t| t.energy_required)
    }

    pub fn total_fluid_demand(&self, world: &SimWorld, owner: PlayerId) -> f32 {
        self.total_service_demand(world, owner, |t| t.fluid_required)
    }

    /// Estimated growth potential for a zone type: designated-but-not-yet-
    /// built tile count times the registry's average `base_capacity` for
    /// that zone (decided, see `DESIGN.md` -- `housing_capacity`/
    /// `exchange_jobs`/`fabrication_jobs` are zoned *demand*, not built
    /// supply, so the demand cap can be nonzero before anything has spawned
    /// yet).
    pub fn zoned_capacity_potential(&self, zone_type: ZoneType) -> u32 {
        let side = self.zones.side() as i32;
        let mut designated = 0u32;
        for y in 0..side {
            for x in 0..side {
                if self.zones.get(x, y).designated && self.zones.get(x, y).zone_type == zone_type {
                    designated += 1;
                }
            }
        }

        let matching: Vec<&BuildingTemplate> = self.registry.templates().filter(|t| t.zone_type == zone_type).collect();
        if matching.is_empty() {
            return 0;
        }
        let avg_capacity = matching.iter().map(|t| t.base_capacity as f32).sum::<f32>() / matching.len() as f32;
        (designated as f32 * avg_capacity) as u32
    }

    pub fn designate_zone(&mut self, x: Coord, y: Coord, zone_type: ZoneType, density: Density) {
        if !self.zones.in_bounds(x, y) {
            return;
        }
        self.zones.set(
            x,
            y,
            ZoneCell {
                zone_type,
                density,
                designated: true,
            },
        );
    }

    pub fn clear_zone(&mut self, x: Coord, y: Coord) {
        self.zones.set(x, y, ZoneCell::default());
    }

    pub fn zone_at(&self, x: Coord, y: Coord) -> Option<ZoneCell> {
        if !self.zones.in_bounds(x, y) {
            return None;
        }
        let cell = self.zones.get(x, y);
        cell.designated.then_some(cell)
    }

    fn road_accessible(world: &SimWorld, x: Coord, y: Coord) -> bool {
        let d = world.proximity.get(x, y);
        d != PROXIMITY_OUT_OF_RANGE && d <= ROAD_ACCESS_MAX_DISTANCE
    }

    fn energy_connected(world: &SimWorld, x: Coord, y: Coord) -> bool {
        world.energy_network_id.get(x, y) != 0
    }

    fn fluid_connected(world: &SimWorld, x: Coord, y: Coord) -> bool {
        world.fluid_network_id.get(x, y) != 0
    }

    /// Validates every spawn precondition for a single tile against a
    /// candidate template (spec §4.10 spawning loop step 2): footprint free,
    /// land value, road access, energy/fluid connectivity.
    fn spawn_checker(world: &SimWorld, x: Coord, y: Coord, template: &BuildingTemplate) -> bool {
        for (dx, dy) in template.footprint.cells() {
            let (cx, cy) = (x + dx, y + dy);
            if !world.in_bounds(cx, cy) || world.occupancy.get(cx, cy).is_valid() {
                return false;
            }
        }
        if world.land_value.get(x, y) < template.min_land_value {
            return false;
        }
        if !Self::road_accessible(world, x, y) {
            return false;
        }
        if !Self::energy_connected(world, x, y) || !Self::fluid_connected(world, x, y) {
            return false;
        }
        true
    }

    fn select_template<'a>(
        world: &mut SimWorld,
        registry: &'a TemplateRegistry,
        zone_type: ZoneType,
        density: Density,
    ) -> Option<&'a BuildingTemplate> {
        let pool = registry.pool(zone_type, density);
        if pool.is_empty() {
            return None;
        }
        let weights: Vec<f32> = pool
            .iter()
            .map(|id| registry.get(*id).map(|t| t.selection_weight).unwrap_or(0.0))
            .collect();
        let dist = WeightedIndex::new(&weights).ok()?;
        let idx = dist.sample(&mut world.rng);
        registry.get(pool[idx])
    }

    /// Spawn-growth scan (spec §4.10 spawning loop). Considers up to
    /// [`MAX_SPAWN_CANDIDATES_PER_TICK`] designated-but-empty tiles starting
    /// from `scan_cursor`, spawning a `Materializing` building wherever the
    /// spawn checker passes.
    fn run_spawn_loop(&mut self, world: &mut SimWorld, tick: Tick, owner: PlayerId) {
        let side = self.zones.side() as usize;
        let total = side * side;
        if total == 0 {
            return;
        }

        let mut considered = 0usize;
        let mut cursor = self.scan_cursor % total;

        while considered < total && considered < MAX_SPAWN_CANDIDATES_PER_TICK {
            let x = (cursor % side) as Coord;
            let y = (cursor / side) as Coord;
            cursor = (cursor + 1) % total;
            considered += 1;

            let cell = self.zones.get(x, y);
            if cell.designated && !world.occupancy.get(x, y).is_valid() && Self::cap_remaining(&self.remaining_caps, cell.zone_type) > 0 {
                if let Some(template) = Self::select_template(world, &self.registry, cell.zone_type, cell.density) {
                    let template = template.clone();
                    if Self::spawn_checker(world, x, y, &template) {
                        self.spawn_building(world, x, y, &template, owner, tick);
                        Self::decrement_cap(&mut self.remaining_caps, cell.zone_type);
                    }
                }
            }
        }

        self.scan_cursor = cursor;
    }

    fn cap_remaining(caps: &DemandCaps, zone_type: ZoneType) -> u32 {
        match zone_type {
            ZoneType::Habitation => caps.habitation_cap,
            ZoneType::Exchange => caps.exchange_cap,
            ZoneType::Fabrication => caps.fabrication_cap,
        }
    }

    fn decrement_cap(caps: &mut DemandCaps, zone_type: ZoneType) {
        let slot = match zone_type {
            ZoneType::Habitation => &mut caps.habitation_cap,
            ZoneType::Exchange => &mut caps.exchange_cap,
            ZoneType::Fabrication => &mut caps.fabrication_cap,
        };
        *slot = slot.saturating_sub(1);
    }

    fn spawn_building(
        &mut self,
        world: &mut SimWorld,
        x: Coord,
        y: Coord,
        template: &BuildingTemplate,
        owner: PlayerId,
        tick: Tick,
    ) {
        let rotation = world.rng.gen_range(0..4u8);
        let color_accent = if template.color_accent_count > 0 {
            world.rng.gen_range(0..template.color_accent_count)
        } else {
            0
        };

        let entity = world.entities.spawn();
        world.entities.positions.insert(entity, Position { x, y, z: 0.0 });
        world.entities.ownerships.insert(entity, Ownership { owner });
        world.entities.buildings.insert(
            entity,
            Building {
                template_id: template.template_id,
                state: BuildingState::Materializing,
                zone_type: template.zone_type,
                density: template.density,
                level: 1,
                health: 255,
                capacity: template.base_capacity,
                current_occupancy: 0,
                footprint: template.footprint,
                rotation,
                color_accent,
                abandon_timer: 0,
                state_changed_tick: tick,
            },
        );
        world.entities.constructions.insert(
            entity,
            Construction {
                ticks_total: template.construction_ticks,
                ticks_elapsed: 0,
                phase: ConstructionPhase::Foundation,
                phase_progress: 0,
                is_paused: false,
                construction_cost: template.construction_cost,
            },
        );
        if template.contamination_output > 0 {
            world.entities.contamination_sources.insert(
                entity,
                ContaminationSource {
                    base_output: template.contamination_output,
                    current_output: 0,
                    spread_radius: 3,
                    spread_decay_rate: 30,
                    kind: ContaminationType::Industrial,
                    is_active: false,
                },
            );
        }

        for (dx, dy) in template.footprint.cells() {
            let (cx, cy) = (x + dx, y + dy);
            world.occupancy.set(cx, cy, entity);
        }
        world.mark_chunk_dirty(x, y);
        self.grace_states.insert(entity, ServiceGraceState::default());
    }

    /// Advances every `Materializing` building's construction timer (spec
    /// §4.10 construction progress system).
    fn run_construction_progress(&mut self, world: &mut SimWorld, tick: Tick, owner: PlayerId) {
        let ids: Vec<EntityId> = world.entities.constructions.ids().collect();
        for id in ids {
            let complete = {
                let construction = world.entities.constructions.get_mut(id).unwrap();
                if construction.is_paused {
                    false
                } else {
                    construction.ticks_elapsed += 1;
                    let percent = construction.percent_complete();
                    construction.phase = ConstructionPhase::from_percent(percent);
                    let phase_start = match construction.phase {
                        ConstructionPhase::Foundation => 0,
                        ConstructionPhase::Framework => 25,
                        ConstructionPhase::Exterior => 50,
                        ConstructionPhase::Finalization => 75,
                    };
                    construction.phase_progress =
                        (((percent as i32 - phase_start as i32).max(0) as u32 * 255) / 25).min(255) as u8;
                    construction.ticks_elapsed >= construction.ticks_total
                }
            };

            if complete {
                world.entities.constructions.remove(id);
                if let Some(building) = world.entities.buildings.get_mut(id) {
                    building.state = BuildingState::Active;
                    building.state_changed_tick = tick;
                }
                if let Some(source) = world.entities.contamination_sources.get_mut(id) {
                    source.is_active = true;
                    source.current_output = source.base_output;
                }
                let entity_owner = world
                    .entities
                    .ownerships
                    .get(id)
                    .map(|o| o.owner)
                    .unwrap_or(owner);
                if let Some(pos) = world.entities.positions.get(id) {
                    world.events.building_constructed.push(BuildingConstructed {
                        entity: id,
                        owner: entity_owner,
                        x: pos.x,
                        y: pos.y,
                    });
                }
            }
        }
    }

    fn all_services_available(world: &SimWorld, x: Coord, y: Coord) -> (bool, bool, bool) {
        (
            Self::energy_connected(world, x, y),
            Self::fluid_connected(world, x, y),
            Self::road_accessible(world, x, y),
        )
    }

    /// State-machine tick for Active/Abandoned/Derelict buildings (spec
    /// §4.10 state transition system).
    fn run_state_transitions(&mut self, world: &mut SimWorld, tick: Tick) {
        let ids: Vec<EntityId> = world.entities.buildings.ids().collect();
        for id in ids {
            let (state, pos) = {
                let b = world.entities.buildings.get(id).unwrap();
                (b.state, world.entities.positions.get(id).copied())
            };
            let Some(pos) = pos else { continue };

            match state {
                BuildingState::Active => self.evaluate_active(world, id, pos.x, pos.y, tick),
                BuildingState::Abandoned => self.evaluate_abandoned(world, id, pos.x, pos.y, tick),
                BuildingState::Derelict => self.evaluate_derelict(world, id, tick),
                BuildingState::Materializing | BuildingState::Deconstructed => {}
            }
        }
    }

    fn evaluate_active(&mut self, world: &mut SimWorld, id: EntityId, x: Coord, y: Coord, tick: Tick) {
        let (energy_ok, fluid_ok, transport_ok) = Self::all_services_available(world, x, y);
        let grace = self.grace_states.entry(id).or_default();

        if energy_ok {
            grace.ticks_without_energy = 0;
        } else {
            grace.ticks_without_energy += 1;
        }
        if fluid_ok {
            grace.ticks_without_fluid = 0;
        } else {
            grace.ticks_without_fluid += 1;
        }
        if transport_ok {
            grace.ticks_without_transport = 0;
        } else {
            grace.ticks_without_transport += 1;
        }

        let energy_grace = world.config.energy_grace();
        let fluid_grace = world.config.fluid_grace();
        let transport_grace = world.config.transport_grace();

        let lost_service = grace.ticks_without_energy >= energy_grace
            || grace.ticks_without_fluid >= fluid_grace
            || grace.ticks_without_transport >= transport_grace;

        if lost_service {
            let abandon_timer = world.config.abandon_timer_ticks;
            if let Some(building) = world.entities.buildings.get_mut(id) {
                let from = building.state;
                building.state = BuildingState::Abandoned;
                building.abandon_timer = abandon_timer;
                building.state_changed_tick = tick;
                world.events.building_abandoned.push(BuildingAbandoned { entity: id, tick });
                world.events.building_state_changed.push(BuildingStateChanged { entity: id, from, to: building.state });
            }
        }
    }

    fn evaluate_abandoned(&mut self, world: &mut SimWorld, id: EntityId, x: Coord, y: Coord, tick: Tick) {
        let (energy_ok, fluid_ok, transport_ok) = Self::all_services_available(world, x, y);

        if energy_ok && fluid_ok && transport_ok {
            if let Some(grace) = self.grace_states.get_mut(&id) {
                *grace = ServiceGraceState::default();
            }
            if let Some(building) = world.entities.buildings.get_mut(id) {
                let from = building.state;
                building.state = BuildingState::Active;
                building.abandon_timer = 0;
                building.state_changed_tick = tick;
                world.events.building_restored.push(BuildingRestored { entity: id, tick });
                world.events.building_state_changed.push(BuildingStateChanged { entity: id, from, to: building.state });
            }
            return;
        }

        let transitioned = if let Some(building) = world.entities.buildings.get_mut(id) {
            if building.abandon_timer > 0 {
                building.abandon_timer -= 1;
            }
            building.abandon_timer == 0
        } else {
            false
        };

        if transitioned {
            if let Some(building) = world.entities.buildings.get_mut(id) {
                let from = building.state;
                building.state = BuildingState::Derelict;
                building.state_changed_tick = tick;
                world.events.building_derelict.push(BuildingDerelict { entity: id, tick });
                world.events.building_state_changed.push(BuildingStateChanged { entity: id, from, to: building.state });
            }
        }
    }

    fn evaluate_derelict(&mut self, world: &mut SimWorld, id: EntityId, tick: Tick) {
        let derelict_timer = world.config.derelict_timer_ticks as u64;
        let Some(building) = world.entities.buildings.get(id) else { return };
        let elapsed = tick.saturating_sub(building.state_changed_tick).0;
        if elapsed < derelict_timer {
            return;
        }

        let (template_id, footprint, pos) = {
            let b = world.entities.buildings.get(id).unwrap();
            (b.template_id, b.footprint, world.entities.positions.get(id).copied())
        };

        self.clear_footprint(world, id, footprint, pos);
        world.entities.buildings.remove(id);
        world.entities.contamination_sources.remove(id);
        world.entities.debris.insert(
            id,
            Debris {
                original_template_id: template_id,
                clear_timer: DEFAULT_DEBRIS_CLEAR_TIMER,
                footprint,
            },
        );
        self.grace_states.remove(&id);
        world.events.building_deconstructed.push(BuildingDeconstructed {
            entity: id,
            tick,
            was_player_initiated: false,
        });
        world
            .events
            .building_state_changed
            .push(BuildingStateChanged { entity: id, from: BuildingState::Derelict, to: BuildingState::Deconstructed });
    }

    /// Clearing the occupancy footprint twice (e.g. once from demolition and
    /// once from a stale derelict evaluation the same tick) is tolerable --
    /// `set` on an already-empty cell is idempotent (spec §9).
    fn clear_footprint(&self, world: &mut SimWorld, id: EntityId, footprint: Footprint, pos: Option<Position>) {
        let Some(pos) = pos else { return };
        for (dx, dy) in footprint.cells() {
            let (cx, cy) = (pos.x + dx, pos.y + dy);
            if world.occupancy.get(cx, cy) == id {
                world.occupancy.set(cx, cy, EntityId::INVALID);
            }
        }
        world.mark_chunk_dirty(pos.x, pos.y);
    }

    /// Overseer-initiated demolition (spec §4.10 demolition handler). Cost
    /// scales with the building's current state; credits are charged via an
    /// explicit [`CreditProvider`], never through `tick()`.
    pub fn demolish(
        &mut self,
        world: &mut SimWorld,
        entity: EntityId,
        owner: PlayerId,
        tick: Tick,
        credits: &mut dyn CreditProvider,
    ) -> Result<(), DemolishError> {
        let Some(building) = world.entities.buildings.get(entity).copied() else {
            return Err(DemolishError::EntityNotFound);
        };
        let actual_owner = world.entities.ownerships.get(entity).map(|o| o.owner);
        if actual_owner != Some(owner) {
            return Err(DemolishError::NotOwned);
        }
        if building.state == BuildingState::Deconstructed {
            return Err(DemolishError::AlreadyDeconstructed);
        }

        let construction_cost = world
            .entities
            .constructions
            .get(entity)
            .map(|c| c.construction_cost)
            .unwrap_or_else(|| {
                self.registry
                    .get(building.template_id)
                    .map(|t| t.construction_cost)
                    .unwrap_or(0)
            });
        let state_multiplier = match building.state {
            BuildingState::Active => 1.0,
            BuildingState::Materializing => 0.5,
            BuildingState::Abandoned => 0.1,
            BuildingState::Derelict => 0.0,
            BuildingState::Deconstructed => 0.0,
        };
        let cost = (construction_cost as f64 * state_multiplier as f64 * world.config.base_cost_ratio as f64) as Credits;

        if cost > 0 && !credits.try_charge(owner, cost) {
            return Err(DemolishError::InsufficientCredits);
        }

        let pos = world.entities.positions.get(entity).copied();
        self.clear_footprint(world, entity, building.footprint, pos);
        world.entities.buildings.remove(entity);
        world.entities.constructions.remove(entity);
        world.entities.contamination_sources.remove(entity);
        self.grace_states.remove(&entity);
        world.entities.debris.insert(
            entity,
            Debris {
                original_template_id: building.template_id,
                clear_timer: DEFAULT_DEBRIS_CLEAR_TIMER,
                footprint: building.footprint,
            },
        );
        world.events.building_deconstructed.push(BuildingDeconstructed {
            entity,
            tick,
            was_player_initiated: true,
        });
        Ok(())
    }

    /// Upgrades a building's level, emitting `BuildingUpgraded`/
    /// `BuildingDowngraded` depending on direction (spec §4.10).
    pub fn set_level(&mut self, world: &mut SimWorld, entity: EntityId, new_level: u8) -> Result<(), ValidationError> {
        let Some(building) = world.entities.buildings.get_mut(entity) else {
            return Err(ValidationError::UnknownEntity);
        };
        let from_level = building.level;
        if new_level == from_level {
            return Ok(());
        }
        building.level = new_level;
        if new_level > from_level {
            world.events.building_upgraded.push(BuildingUpgraded { entity, from_level, to_level: new_level });
        } else {
            world.events.building_downgraded.push(BuildingDowngraded { entity, from_level, to_level: new_level });
        }
        Ok(())
    }

    fn run_debris_clear(&mut self, world: &mut SimWorld) {
        let ids: Vec<EntityId> = world.entities.debris.ids().collect();
        for id in ids {
            let expired = {
                let debris = world.entities.debris.get_mut(id).unwrap();
                if debris.clear_timer > 0 {
                    debris.clear_timer -= 1;
                }
                debris.clear_timer == 0
            };
            if expired {
                let footprint = world.entities.debris.get(id).unwrap().footprint;
                let pos = world.entities.positions.get(id).copied();
                self.clear_footprint(world, id, footprint, pos);
                world.entities.debris.remove(id);
                world.entities.destroy(id);
                world.events.debris_cleared.push(DebrisCleared { entity: id });
            }
        }
    }

    /// Begins a multi-tick `Grade`/`Terraform` terrain operation (spec
    /// §4.10 terrain modification).
    pub fn begin_terrain_mod(
        &mut self,
        world: &mut SimWorld,
        x: Coord,
        y: Coord,
        kind: TerrainOpKindTag,
        target_elevation: u8,
        owner: PlayerId,
        total_cost: Credits,
        credits: &mut dyn CreditProvider,
    ) -> Result<EntityId, TerrainModError> {
        if !world.in_bounds(x, y) {
            return Err(TerrainModError::OutOfBounds);
        }
        if kind == TerrainOpKindTag::Terraform {
            let terrain = world.terrain.get(x, y).terrain_type;
            if !terrain.is_terraformable_source() {
                return Err(TerrainModError::NotTerraformable);
            }
        }
        let already_running = world.entities.terrain_modifications.ids().any(|id| {
            world
                .entities
                .terrain_modifications
                .get(id)
                .map(|m| m.x == x && m.y == y && !m.cancelled)
                .unwrap_or(false)
        });
        if already_running {
            return Err(TerrainModError::OperationInProgress);
        }
        if !owner.is_world() && owner.0 > crate::config::MAX_PLAYERS {
            return Err(TerrainModError::NotAuthorized);
        }
        if total_cost > 0 && !credits.try_charge(owner, total_cost) {
            return Err(TerrainModError::InsufficientCredits);
        }

        let ticks_total = match kind {
            TerrainOpKindTag::Grade => 1,
            TerrainOpKindTag::Terraform => {
                let terrain = world.terrain.get(x, y).terrain_type;
                if matches!(terrain, crate::grid::TerrainType::BlightMires) {
                    crate::config::BLIGHT_TERRAFORM_TICKS
                } else {
                    crate::config::EMBER_TERRAFORM_TICKS
                }
            }
        };

        let entity = world.entities.spawn();
        world.entities.terrain_modifications.insert(
            entity,
            TerrainModification {
                x,
                y,
                kind,
                target_elevation,
                ticks_total,
                ticks_elapsed: 0,
                cancelled: false,
                owner,
                total_cost,
            },
        );
        self.terrain_mods.insert(entity, ());
        Ok(entity)
    }

    /// Cancels an in-progress terrain modification, refunding a fraction of
    /// its cost (spec §4.10 "cancellation yields a partial refund").
    pub fn cancel_terrain_mod(
        &mut self,
        world: &mut SimWorld,
        entity: EntityId,
        owner: PlayerId,
        credits: &mut dyn CreditProvider,
    ) -> Result<(), TerrainModError> {
        let Some(modification) = world.entities.terrain_modifications.get_mut(entity) else {
            return Err(TerrainModError::OutOfBounds);
        };
        if modification.owner != owner {
            return Err(TerrainModError::NotAuthorized);
        }
        modification.cancelled = true;
        let refund = (modification.total_cost as f64 * world.config.terraform_refund_ratio as f64) as Credits;
        if refund > 0 {
            credits.refund(owner, refund);
        }
        world.entities.terrain_modifications.remove(entity);
        self.terrain_mods.remove(&entity);
        Ok(())
    }

    fn run_terrain_mods(&mut self, world: &mut SimWorld, invalidate_terrain: &mut bool) {
        let ids: Vec<EntityId> = world.entities.terrain_modifications.ids().collect();
        for id in ids {
            let complete = {
                let modification = world.entities.terrain_modifications.get_mut(id).unwrap();
                if modification.cancelled {
                    false
                } else {
                    modification.ticks_elapsed += 1;
                    modification.ticks_elapsed >= modification.ticks_total
                }
            };
            if !complete {
                continue;
            }

            let modification = *world.entities.terrain_modifications.get(id).unwrap();
            let mut cell = world.terrain.get(modification.x, modification.y);
            match modification.kind {
                TerrainOpKindTag::Grade => {
                    cell.elevation = modification.target_elevation;
                }
                TerrainOpKindTag::Terraform => {
                    let was_blight = matches!(cell.terrain_type, crate::grid::TerrainType::BlightMires);
                    cell.terrain_type = crate::grid::TerrainType::Substrate;
                    cell.flags = crate::grid::TerrainFlags::empty();
                    if was_blight {
                        *invalidate_terrain = true;
                    }
                }
            }
            world.terrain.set(modification.x, modification.y, cell);
            world.mark_chunk_dirty(modification.x, modification.y);
            world.entities.terrain_modifications.remove(id);
            self.terrain_mods.remove(&id);
            world.events.terrain_modified.push(TerrainModified { x: modification.x, y: modification.y });
        }
    }
}

impl Simulatable for BuildingSystem {
    fn priority(&self) -> i32 {
        priority::BUILDING
    }

    fn tick(&mut self, time: SchedulerTime, world: &mut SimWorld) {
        self.run_spawn_loop(world, time.tick, PlayerId(1));
        self.run_construction_progress(world, time.tick, PlayerId(1));
        self.run_state_transitions(world, time.tick);
        self.run_debris_clear(world);

        let mut invalidate_terrain = false;
        self.run_terrain_mods(world, &mut invalidate_terrain);
        if invalidate_terrain {
            world.events.contamination_source_invalidated.push(crate::events::ContaminationSourceInvalidated {
                kind: ContaminationType::Terrain,
            });
        }
    }

    fn name(&self) -> &'static str {
        "building"
    }
}

/// Read-only building queries over world state (spec §6 `BuildingQueryable`).
/// No private `Building` subsystem state is needed for these -- every answer
/// is derivable from `world.entities.buildings`/`world.occupancy` directly.
pub struct WorldBuildingProvider<'a> {
    pub world: &'a SimWorld,
}

impl BuildingQueryable for WorldBuildingProvider<'_> {
    fn get_building_at(&self, x: i32, y: i32) -> Option<EntityId> {
        let id = self.world.occupancy.get(x, y);
        id.is_valid().then_some(id)
    }

    fn is_tile_occupied(&self, x: i32, y: i32) -> bool {
        self.world.occupancy.get(x, y).is_valid()
    }

    fn is_footprint_available(&self, x: i32, y: i32, w: u8, h: u8) -> bool {
        Footprint::new(w, h).cells().all(|(dx, dy)| {
            let (cx, cy) = (x + dx, y + dy);
            self.world.in_bounds(cx, cy) && !self.world.occupancy.get(cx, cy).is_valid()
        })
    }

    fn get_buildings_in_rect(&self, x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<EntityId> {
        let mut out = Vec::new();
        for id in self.world.entities.buildings.ids() {
            if let Some(pos) = self.world.entities.positions.get(id) {
                if pos.x >= x0 && pos.x < x1 && pos.y >= y0 && pos.y < y1 {
                    out.push(id);
                }
            }
        }
        out
    }

    fn get_buildings_by_owner(&self, owner: PlayerId) -> Vec<EntityId> {
        self.world
            .entities
            .buildings
            .ids()
            .filter(|id| self.world.entities.ownerships.get(*id).map(|o| o.owner) == Some(owner))
            .collect()
    }

    fn get_building_state(&self, entity: EntityId) -> Option<BuildingStateQuery> {
        self.world.entities.buildings.get(entity).map(|b| match b.state {
            BuildingState::Materializing => BuildingStateQuery::Materializing,
            BuildingState::Active => BuildingStateQuery::Active,
            BuildingState::Abandoned => BuildingStateQuery::Abandoned,
            BuildingState::Derelict => BuildingStateQuery::Derelict,
            BuildingState::Deconstructed => BuildingStateQuery::Deconstructed,
        })
    }

    fn get_total_capacity(&self, zone: ZoneQuery, owner: PlayerId) -> u32 {
        self.sum_by_zone(zone, owner, |b| b.capacity)
    }

    fn get_total_occupancy(&self, zone: ZoneQuery, owner: PlayerId) -> u32 {
        self.sum_by_zone(zone, owner, |b| b.current_occupancy)
    }

    fn count_by_state(&self, state: BuildingStateQuery) -> usize {
        let target = match state {
            BuildingStateQuery::Materializing => BuildingState::Materializing,
            BuildingStateQuery::Active => BuildingState::Active,
            BuildingStateQuery::Abandoned => BuildingState::Abandoned,
            BuildingStateQuery::Derelict => BuildingState::Derelict,
            BuildingStateQuery::Deconstructed => BuildingState::Deconstructed,
        };
        self.world
            .entities
            .buildings
            .ids()
            .filter(|id| self.world.entities.buildings.get(*id).map(|b| b.state) == Some(target))
            .count()
    }
}

impl WorldBuildingProvider<'_> {
    fn sum_by_zone(&self, zone: ZoneQuery, owner: PlayerId, f: impl Fn(&crate::components::Building) -> u32) -> u32 {
        let target = match zone {
            ZoneQuery::Habitation => ZoneType::Habitation,
            ZoneQuery::Exchange => ZoneType::Exchange,
            ZoneQuery::Fabrication => ZoneType::Fabrication,
        };
        self.world
            .entities
            .buildings
            .ids()
            .filter_map(|id| {
                let b = self.world.entities.buildings.get(id)?;
                if b.zone_type != target || b.state == BuildingState::Deconstructed {
                    return None;
                }
                if self.world.entities.ownerships.get(id).map(|o| o.owner) != Some(owner) {
                    return None;
                }
                Some(f(b))
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::ids::Tick;

    fn world(side: u16) -> SimWorld {
        SimWorld::new(side, 1, SimConfig::default())
    }

    fn connect_services(world: &mut SimWorld, x: Coord, y: Coord) {
        world.energy_network_id.set(x, y, 1);
        world.fluid_network_id.set(x, y, 1);
        world.proximity.set(x, y, 0);
        world.land_value.set(x, y, 200);
    }

    struct FakeCredits {
        balances: HashMap<PlayerId, Credits>,
    }

    impl FakeCredits {
        fn new(balance: Credits) -> Self {
            let mut balances = HashMap::new();
            balances.insert(PlayerId(1), balance);
            Self { balances }
        }
    }

    impl CreditProvider for FakeCredits {
        fn balance(&self, owner: PlayerId) -> Credits {
            *self.balances.get(&owner).unwrap_or(&0)
        }

        fn try_charge(&mut self, owner: PlayerId, amount: Credits) -> bool {
            let entry = self.balances.entry(owner).or_insert(0);
            if *entry >= amount {
                *entry -= amount;
                true
            } else {
                false
            }
        }

        fn refund(&mut self, owner: PlayerId, amount: Credits) {
            *self.balances.entry(owner).or_insert(0) += amount;
        }
    }

    fn time_at(n: u64) -> SchedulerTime {
        SchedulerTime { tick: Tick(n), phase: 0, cycle: 0 }
    }

    #[test]
    fn registry_has_thirty_templates_across_six_pools() {
        let mut registry = TemplateRegistry::new();
        register_initial_templates(&mut registry);
        assert_eq!(registry.len(), 30);
        for zone in [ZoneType::Habitation, ZoneType::Exchange, ZoneType::Fabrication] {
            for density in [Density::Low, Density::High] {
                assert_eq!(registry.pool(zone, density).len(), 5);
            }
        }
    }

    #[test]
    fn spawn_checker_rejects_tile_without_connectivity() {
        let w = world(16);
        let mut registry = TemplateRegistry::new();
        register_initial_templates(&mut registry);
        let template = registry.get(1).unwrap();
        assert!(!BuildingSystem::spawn_checker(&w, 5, 5, template));
    }

    #[test]
    fn demand_cap_of_zero_blocks_spawning_even_when_checker_passes() {
        let mut w = world(16);
        connect_services(&mut w, 5, 5);
        let mut building = BuildingSystem::new(16);
        building.designate_zone(5, 5, ZoneType::Habitation, Density::Low);
        building.set_demand_caps(DemandCaps {
            habitation_cap: 0,
            exchange_cap: u32::MAX,
            fabrication_cap: u32::MAX,
        });

        building.run_spawn_loop(&mut w, Tick(1), PlayerId(1));

        assert!(!w.occupancy.get(5, 5).is_valid());
    }

    #[test]
    fn demand_cap_is_consumed_per_spawn_and_blocks_further_growth_this_tick() {
        let mut w = world(16);
        connect_services(&mut w, 1, 1);
        connect_services(&mut w, 3, 3);
        let mut building = BuildingSystem::new(16);
        building.designate_zone(1, 1, ZoneType::Habitation, Density::Low);
        building.designate_zone(3, 3, ZoneType::Habitation, Density::Low);
        building.set_demand_caps(DemandCaps {
            habitation_cap: 1,
            exchange_cap: u32::MAX,
            fabrication_cap: u32::MAX,
        });

        building.run_spawn_loop(&mut w, Tick(1), PlayerId(1));

        let spawned = w.occupancy.get(1, 1).is_valid() as u8 + w.occupancy.get(3, 3).is_valid() as u8;
        assert_eq!(spawned, 1);
    }

    #[test]
    fn full_building_lifecycle_matches_worked_example() {
        let mut w = world(32);
        connect_services(&mut w, 10, 10);
        let mut building = BuildingSystem::new(32);
        building.designate_zone(10, 10, ZoneType::Habitation, Density::Low);

        // Pin the scan straight at the zoned tile and spawn with a fixed
        // template so the timeline matches the spec's worked example
        // exactly (template 1: construction_ticks = 40).
        let template = building.registry().get(1).unwrap().clone();
        building.spawn_building(&mut w, 10, 10, &template, PlayerId(1), Tick(1000));
        let entity = w.occupancy.get(10, 10);
        assert!(entity.is_valid());

        for t in 1001..=1040 {
            building.run_construction_progress(&mut w, Tick(t), PlayerId(1));
        }
        assert_eq!(w.entities.buildings.get(entity).unwrap().state, BuildingState::Active);
        assert_eq!(w.events.building_constructed.iter().count(), 1);

        // Drop energy connectivity; after energy_grace (default 100) ticks
        // without it the building abandons.
        w.energy_network_id.set(10, 10, 0);
        for t in 1041..=1140 {
            building.run_state_transitions(&mut w, Tick(t));
        }
        assert_eq!(w.entities.buildings.get(entity).unwrap().state, BuildingState::Abandoned);
        assert_eq!(w.events.building_abandoned.iter().count(), 1);

        // Restore before the abandon timer (200 ticks) expires.
        w.energy_network_id.set(10, 10, 1);
        building.run_state_transitions(&mut w, Tick(1141));
        assert_eq!(w.entities.buildings.get(entity).unwrap().state, BuildingState::Active);
        assert_eq!(w.events.building_restored.iter().count(), 1);

        // Drop again and let it run all the way to Derelict then
        // Deconstructed.
        w.energy_network_id.set(10, 10, 0);
        let mut tick = 1142u64;
        for _ in 0..100 {
            building.run_state_transitions(&mut w, Tick(tick));
            tick += 1;
        }
        assert_eq!(w.entities.buildings.get(entity).unwrap().state, BuildingState::Abandoned);
        for _ in 0..200 {
            building.run_state_transitions(&mut w, Tick(tick));
            tick += 1;
        }
        assert_eq!(w.entities.buildings.get(entity).unwrap().state, BuildingState::Derelict);
        assert_eq!(w.events.building_derelict.iter().count(), 1);

        for _ in 0..=500 {
            building.run_state_transitions(&mut w, Tick(tick));
            tick += 1;
        }
        assert!(w.entities.buildings.get(entity).is_none());
        assert!(w.entities.debris.get(entity).is_some());
        assert_eq!(w.events.building_deconstructed.iter().count(), 1);
    }

    #[test]
    fn demolition_charges_active_cost_and_attaches_debris() {
        let mut w = world(16);
        let mut building = BuildingSystem::new(16);
        let template = building.registry().get(1).unwrap().clone();
        building.spawn_building(&mut w, 2, 2, &template, PlayerId(1), Tick(0));
        let entity = w.occupancy.get(2, 2);
        building.run_construction_progress(&mut w, Tick(1), PlayerId(1));
        for t in 2..=40 {
            building.run_construction_progress(&mut w, Tick(t), PlayerId(1));
        }

        let mut credits = FakeCredits::new(1000);
        building
            .demolish(&mut w, entity, PlayerId(1), Tick(41), &mut credits)
            .unwrap();
        // construction_cost=100, Active multiplier 1.0, base_cost_ratio 0.25 => 25
        assert_eq!(credits.balance(PlayerId(1)), 975);
        assert!(w.entities.debris.get(entity).is_some());
    }

    #[test]
    fn demolition_rejects_wrong_owner() {
        let mut w = world(16);
        let mut building = BuildingSystem::new(16);
        let template = building.registry().get(1).unwrap().clone();
        building.spawn_building(&mut w, 2, 2, &template, PlayerId(1), Tick(0));
        let entity = w.occupancy.get(2, 2);

        let mut credits = FakeCredits::new(1000);
        let result = building.demolish(&mut w, entity, PlayerId(2), Tick(1), &mut credits);
        assert_eq!(result, Err(DemolishError::NotOwned));
    }

    #[test]
    fn debris_clears_after_timer_expires() {
        let mut w = world(16);
        let mut building = BuildingSystem::new(16);
        let template = building.registry().get(1).unwrap().clone();
        building.spawn_building(&mut w, 2, 2, &template, PlayerId(1), Tick(0));
        let entity = w.occupancy.get(2, 2);
        let mut credits = FakeCredits::new(1000);
        building.demolish(&mut w, entity, PlayerId(1), Tick(1), &mut credits).unwrap();

        for _ in 0..DEFAULT_DEBRIS_CLEAR_TIMER {
            building.run_debris_clear(&mut w);
        }
        assert!(w.entities.debris.get(entity).is_none());
        assert!(!w.entities.is_alive(entity));
        assert_eq!(w.events.debris_cleared.iter().count(), 1);
    }

    #[test]
    fn terrain_mod_invalidates_contamination_cache_only_when_removing_blight() {
        let mut w = world(16);
        w.terrain.set(3, 3, crate::grid::TerrainCell {
            terrain_type: crate::grid::TerrainType::BlightMires,
            elevation: 0,
            moisture: 0,
            flags: crate::grid::TerrainFlags::empty(),
        });
        let mut building = BuildingSystem::new(16);
        let mut credits = FakeCredits::new(1000);
        let entity = building
            .begin_terrain_mod(&mut w, 3, 3, TerrainOpKindTag::Terraform, 0, PlayerId(1), 100, &mut credits)
            .unwrap();
        assert_eq!(credits.balance(PlayerId(1)), 900);

        let mut invalidated = false;
        for _ in 0..crate::config::BLIGHT_TERRAFORM_TICKS {
            building.run_terrain_mods(&mut w, &mut invalidated);
        }
        assert!(invalidated);
        assert_eq!(w.terrain.get(3, 3).terrain_type, crate::grid::TerrainType::Substrate);
        assert!(w.entities.terrain_modifications.get(entity).is_none());
    }

    #[test]
    fn cancelling_terrain_mod_refunds_half_by_default() {
        let mut w = world(16);
        w.terrain.set(3, 3, crate::grid::TerrainCell {
            terrain_type: crate::grid::TerrainType::BlightMires,
            elevation: 0,
            moisture: 0,
            flags: crate::grid::TerrainFlags::empty(),
        });
        let mut building = BuildingSystem::new(16);
        let mut credits = FakeCredits::new(1000);
        let entity = building
            .begin_terrain_mod(&mut w, 3, 3, TerrainOpKindTag::Terraform, 0, PlayerId(1), 100, &mut credits)
            .unwrap();
        building.cancel_terrain_mod(&mut w, entity, PlayerId(1), &mut credits).unwrap();
        assert_eq!(credits.balance(PlayerId(1)), 950);
    }

    #[test]
    fn level_change_emits_upgraded_or_downgraded() {
        let mut w = world(16);
        let mut building = BuildingSystem::new(16);
        let template = building.registry().get(1).unwrap().clone();
        building.spawn_building(&mut w, 2, 2, &template, PlayerId(1), Tick(0));
        let entity = w.occupancy.get(2, 2);

        building.set_level(&mut w, entity, 2).unwrap();
        assert_eq!(w.events.building_upgraded.iter().count(), 1);

        building.set_level(&mut w, entity, 1).unwrap();
        assert_eq!(w.events.building_downgraded.iter().count(), 1);
    }

    #[test]
    fn full_tick_drives_spawn_through_construction() {
        let mut w = world(32);
        connect_services(&mut w, 5, 5);
        let mut building = BuildingSystem::new(32);
        building.designate_zone(5, 5, ZoneType::Habitation, Density::Low);

        for t in 1..=250 {
            building.tick(time_at(t), &mut w);
        }
        let entity = w.occupancy.get(5, 5);
        assert!(entity.is_valid());
        assert_eq!(w.entities.buildings.get(entity).unwrap().state, BuildingState::Active);
    }
}
