//! Per-tick, typed, drainable event queues (spec §4.2).
//!
//! Each event kind gets its own `Vec`-backed queue on [`EventBus`]. Producers
//! push during their `tick()`; the orchestrator drains every queue once per
//! tick and hands the drained batch to whichever consumers care. An event
//! with no consumer this tick simply vanishes -- there is no guaranteed
//! delivery beyond "within the tick it was produced", by design.

use crate::components::{BuildingState, ContaminationType};
use crate::ids::{Credits, EntityId, PlayerId, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickStart {
    pub tick: Tick,
    pub delta_millis: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickComplete {
    pub tick: Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChanged {
    pub tick: Tick,
    pub phase: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleChanged {
    pub tick: Tick,
    pub cycle: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingConstructed {
    pub entity: EntityId,
    pub owner: PlayerId,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingAbandoned {
    pub entity: EntityId,
    pub tick: Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingRestored {
    pub entity: EntityId,
    pub tick: Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingDerelict {
    pub entity: EntityId,
    pub tick: Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingDeconstructed {
    pub entity: EntityId,
    pub tick: Tick,
    pub was_player_initiated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebrisCleared {
    pub entity: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingUpgraded {
    pub entity: EntityId,
    pub from_level: u8,
    pub to_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingDowngraded {
    pub entity: EntityId,
    pub from_level: u8,
    pub to_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrainModified {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Energy,
    Fluid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Healthy,
    Marginal,
    Deficit,
    Collapse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStateChanged {
    pub pool: PoolKind,
    pub owner: PlayerId,
    pub from: PoolState,
    pub to: PoolState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NexusAged {
    pub entity: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConduitPlaced {
    pub pool: PoolKind,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConduitRemoved {
    pub pool: PoolKind,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservoirLevelChanged {
    pub entity: EntityId,
    pub stored_percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportAccessLost {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathwayStateChanged {
    pub x: i32,
    pub y: i32,
    pub health: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathwayPlaced {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathwayRemoved {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilestoneDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub owner: PlayerId,
    pub name: &'static str,
    pub threshold: u32,
    pub direction: MilestoneDirection,
}

/// Non-fatal diagnostics that would otherwise go to a logging facade. The
/// teacher has no `tracing`/`log` dependency anywhere in its graph; this
/// queue is the core's equivalent channel (spec §7 "failed map generation
/// triggers ... a diagnostic event").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    MapGenerationRetried {
        seed: u64,
        attempt: u32,
        reason: &'static str,
    },
    MapGenerationAccepted {
        seed: u64,
        attempts: u32,
        score: i32,
    },
    SubsystemPanicRecovered {
        subsystem: &'static str,
    },
}

/// A note on `BuildingState` transitions kept for tests/tools that want a
/// uniform feed of every state change rather than five separately-typed
/// events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingStateChanged {
    pub entity: EntityId,
    pub from: BuildingState,
    pub to: BuildingState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContaminationSourceInvalidated {
    pub kind: ContaminationType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeIncome {
    pub owner: PlayerId,
    pub amount: Credits,
}

/// A single push/drain queue for one event kind.
#[derive(Debug)]
pub struct EventQueue<T> {
    items: Vec<T>,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> EventQueue<T> {
    pub fn push(&mut self, event: T) {
        self.items.push(event);
    }

    /// Removes and returns every queued event, leaving the queue empty for
    /// the next tick.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.items.drain(..)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

/// Owns one queue per event kind declared in this module. Producers push
/// into the field for their kind during `tick()`; the orchestrator drains
/// every field once per tick.
#[derive(Debug, Default)]
pub struct EventBus {
    pub tick_start: EventQueue<TickStart>,
    pub tick_complete: EventQueue<TickComplete>,
    pub phase_changed: EventQueue<PhaseChanged>,
    pub cycle_changed: EventQueue<CycleChanged>,
    pub building_constructed: EventQueue<BuildingConstructed>,
    pub building_abandoned: EventQueue<BuildingAbandoned>,
    pub building_restored: EventQueue<BuildingRestored>,
    pub building_derelict: EventQueue<BuildingDerelict>,
    pub building_deconstructed: EventQueue<BuildingDeconstructed>,
    pub building_state_changed: EventQueue<BuildingStateChanged>,
    pub debris_cleared: EventQueue<DebrisCleared>,
    pub building_upgraded: EventQueue<BuildingUpgraded>,
    pub building_downgraded: EventQueue<BuildingDowngraded>,
    pub terrain_modified: EventQueue<TerrainModified>,
    pub pool_state_changed: EventQueue<PoolStateChanged>,
    pub nexus_aged: EventQueue<NexusAged>,
    pub conduit_placed: EventQueue<ConduitPlaced>,
    pub conduit_removed: EventQueue<ConduitRemoved>,
    pub reservoir_level_changed: EventQueue<ReservoirLevelChanged>,
    pub transport_access_lost: EventQueue<TransportAccessLost>,
    pub pathway_state_changed: EventQueue<PathwayStateChanged>,
    pub pathway_placed: EventQueue<PathwayPlaced>,
    pub pathway_removed: EventQueue<PathwayRemoved>,
    pub milestone: EventQueue<Milestone>,
    pub contamination_source_invalidated: EventQueue<ContaminationSourceInvalidated>,
    pub trade_income: EventQueue<TradeIncome>,
    pub diagnostics: EventQueue<DiagnosticEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }
}
