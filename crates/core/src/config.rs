//! Centralized constants, mirroring the teacher's `config.rs` convention of
//! `pub const` defaults plus a small overridable params struct for the
//! handful of values `spec.md` calls out as tunable.

/// Fixed simulation timestep, 20 Hz.
pub const TICK_DELTA_SECS: f32 = 0.050;

pub const TICKS_PER_PHASE: u64 = 500;
pub const PHASES_PER_CYCLE: u64 = 4;
pub const TICKS_PER_CYCLE: u64 = TICKS_PER_PHASE * PHASES_PER_CYCLE;

pub const MAX_PLAYERS: u8 = 4;

/// Supported square map sides.
pub const VALID_MAP_SIDES: [u16; 3] = [128, 256, 512];
pub const DEFAULT_MAP_SIDE: u16 = 256;

pub const CHUNK_SIZE: u16 = 32;

/// Priority values: lower executes earlier within a tick. Building (40)
/// executes before transport/energy/fluid/contamination/land-value
/// (41..44) and transport (45) by design: buildings always read the
/// *previous* tick's provider state regardless of conceptual layering
/// (spec §2 "Canonical priority values").
pub mod priority {
    pub const SIMULATION_TIME: i32 = 0;
    pub const BUILDING: i32 = 40;
    pub const ENERGY: i32 = 41;
    pub const FLUID: i32 = 42;
    pub const CONTAMINATION: i32 = 43;
    pub const LAND_VALUE: i32 = 44;
    pub const TRANSPORT: i32 = 45;
    pub const RAIL: i32 = 47;
    pub const PORT: i32 = 48;
    pub const POPULATION: i32 = 50;
}

pub const TRANSPORT_GRACE_PERIOD_TICKS: u32 = 500;
pub const TRANSPORT_DECAY_INTERVAL_TICKS: u64 = 100;

pub const DEFAULT_SERVICE_GRACE_PERIOD_TICKS: u32 = 100;
pub const DEFAULT_ABANDON_TIMER_TICKS: u32 = 200;
pub const DEFAULT_DERELICT_TIMER_TICKS: u32 = 500;
pub const DEFAULT_DEBRIS_CLEAR_TIMER_TICKS: u32 = 60;
pub const DEFAULT_BASE_COST_RATIO: f32 = 0.25;
pub const DEFAULT_TERRAFORM_REFUND_RATIO: f32 = 0.50;

pub const BLIGHT_TERRAFORM_TICKS: u32 = 100;
pub const EMBER_TERRAFORM_TICKS: u32 = 50;

pub const DEFAULT_CONTAMINATION_SPREAD_RADIUS: u8 = 4;
pub const DEFAULT_RAIL_TERMINAL_COVERAGE_RADIUS: u8 = 8;

/// Starting balance credited to a player slot the first time
/// [`crate::treasury::Treasury`] sees it queried or charged.
pub const DEFAULT_STARTING_CREDITS: i64 = 50_000;

pub const POPULATION_MILESTONES: [(u32, &str); 5] = [
    (100, "Village"),
    (500, "Town"),
    (2000, "City"),
    (10_000, "Metropolis"),
    (50_000, "Megalopolis"),
];

/// Per-service grace-period overrides. `None` means "use the shared
/// `service_grace_period` default" -- the Rust replacement for the
/// original implementation's `UINT32_MAX` "use legacy value" sentinel
/// (see `DESIGN.md` Open Question log).
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceGraceOverrides {
    pub energy: Option<u32>,
    pub fluid: Option<u32>,
    pub transport: Option<u32>,
}

/// Host-overridable simulation tunables. Defaults match the constants above.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub service_grace_period_ticks: u32,
    pub service_grace_overrides: ServiceGraceOverrides,
    pub abandon_timer_ticks: u32,
    pub derelict_timer_ticks: u32,
    pub debris_clear_timer_ticks: u32,
    pub base_cost_ratio: f32,
    pub terraform_refund_ratio: f32,
    pub transport_grace_period_ticks: u32,
    pub map_generation_max_retries: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            service_grace_period_ticks: DEFAULT_SERVICE_GRACE_PERIOD_TICKS,
            service_grace_overrides: ServiceGraceOverrides::default(),
            abandon_timer_ticks: DEFAULT_ABANDON_TIMER_TICKS,
            derelict_timer_ticks: DEFAULT_DERELICT_TIMER_TICKS,
            debris_clear_timer_ticks: DEFAULT_DEBRIS_CLEAR_TIMER_TICKS,
            base_cost_ratio: DEFAULT_BASE_COST_RATIO,
            terraform_refund_ratio: DEFAULT_TERRAFORM_REFUND_RATIO,
            transport_grace_period_ticks: TRANSPORT_GRACE_PERIOD_TICKS,
            map_generation_max_retries: 8,
        }
    }
}

impl SimConfig {
    pub fn energy_grace(&self) -> u32 {
        self.service_grace_overrides
            .energy
            .unwrap_or(self.service_grace_period_ticks)
    }

    pub fn fluid_grace(&self) -> u32 {
        self.service_grace_overrides
            .fluid
            .unwrap_or(self.service_grace_period_ticks)
    }

    pub fn transport_grace(&self) -> u32 {
        self.service_grace_overrides
            .transport
            .unwrap_or(self.service_grace_period_ticks)
    }
}
