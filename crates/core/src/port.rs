//! Port subsystem: per-player aero/aqua ports, trade agreements, and
//! external-edge connections (spec §4.6, priority 48).
//!
//! Per tick, in order: refresh port operational states, refresh external
//! connection active/inactive flags, compute trade income from active
//! agreements (windowed over the last 12 phases for UI), cache demand
//! bonuses for the building/demand layer.

use crate::config::priority;
use crate::ids::{Credits, PlayerId};
use crate::providers::{PortProvider, TerminalKindQuery, ZoneQuery};
use crate::subsystem::{SchedulerTime, Simulatable};
use crate::world::SimWorld;

pub const INCOME_HISTORY_PHASES: usize = 12;
const MAX_PLAYER_SLOTS: usize = crate::ids::PlayerId::MAX_PLAYERS as usize + 1;

/// 0 = game-world neighbor NPC, as the original's `GAME_MASTER` constant.
pub const GAME_MASTER: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAgreementType {
    None,
    Basic,
    Enhanced,
    Premium,
}

/// A trade deal between `party_a` and `party_b` (spec §4.6). Mirrors the
/// original's 16-byte POD layout; kept plain here since nothing persists
/// agreements across snapshots yet (not named by spec §4.12's format).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeAgreement {
    pub party_a: u8,
    pub party_b: u8,
    pub agreement_type: TradeAgreementType,
    pub neighbor_id: u16,
    pub cycles_remaining: u16,
    pub demand_bonus_a: i8,
    pub demand_bonus_b: i8,
    pub income_bonus_percent: u8,
    pub cost_per_cycle_a: i32,
    pub cost_per_cycle_b: i16,
}

impl Default for TradeAgreement {
    fn default() -> Self {
        Self {
            party_a: 0,
            party_b: 0,
            agreement_type: TradeAgreementType::None,
            neighbor_id: 0,
            cycles_remaining: 0,
            demand_bonus_a: 0,
            demand_bonus_b: 0,
            income_bonus_percent: 100,
            cost_per_cycle_a: 0,
            cost_per_cycle_b: 0,
        }
    }
}

impl TradeAgreement {
    pub fn is_expired(&self) -> bool {
        self.cycles_remaining == 0
    }

    /// Per-cycle credits flowing to `party_a`: sum of its configured cost
    /// (positive = income, negative = expense) scaled by the income bonus.
    fn income_for_party_a(&self) -> Credits {
        let base = self.cost_per_cycle_a as i64;
        base * self.income_bonus_percent as i64 / 100
    }

    fn income_for_party_b(&self) -> Credits {
        let base = self.cost_per_cycle_b as i64;
        base * self.income_bonus_percent as i64 / 100
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalEdge {
    North,
    East,
    South,
    West,
}

pub const ALL_EDGES: [ExternalEdge; 4] = [
    ExternalEdge::North,
    ExternalEdge::East,
    ExternalEdge::South,
    ExternalEdge::West,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalConnection {
    pub edge: ExternalEdge,
    pub owner: PlayerId,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PortFacility {
    pub kind: TerminalKindQuery,
    pub owner: PlayerId,
    pub x: i32,
    pub y: i32,
    pub capacity: u32,
    pub utilization: f32,
    pub is_operational: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct DemandBonusCache {
    habitation: i8,
    exchange: i8,
    fabrication: i8,
}

pub struct Port {
    facilities: Vec<PortFacility>,
    agreements: Vec<TradeAgreement>,
    connections: Vec<ExternalConnection>,
    demand_bonus: [DemandBonusCache; MAX_PLAYER_SLOTS],
    income_history: [[Credits; INCOME_HISTORY_PHASES]; MAX_PLAYER_SLOTS],
    history_write_index: [usize; MAX_PLAYER_SLOTS],
    last_phase_income: [Credits; MAX_PLAYER_SLOTS],
    last_phase: u64,
}

impl Default for Port {
    fn default() -> Self {
        Self {
            facilities: Vec::new(),
            agreements: Vec::new(),
            connections: Vec::new(),
            demand_bonus: [DemandBonusCache::default(); MAX_PLAYER_SLOTS],
            income_history: [[0; INCOME_HISTORY_PHASES]; MAX_PLAYER_SLOTS],
            history_write_index: [0; MAX_PLAYER_SLOTS],
            last_phase_income: [0; MAX_PLAYER_SLOTS],
            last_phase: 0,
        }
    }
}

impl Port {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_facility(&mut self, facility: PortFacility) {
        self.facilities.push(facility);
    }

    pub fn add_agreement(&mut self, agreement: TradeAgreement) {
        self.agreements.push(agreement);
    }

    pub fn set_connection(&mut self, edge: ExternalEdge, owner: PlayerId, is_active: bool) {
        if let Some(existing) = self
            .connections
            .iter_mut()
            .find(|c| c.edge == edge && c.owner == owner)
        {
            existing.is_active = is_active;
        } else {
            self.connections.push(ExternalConnection {
                edge,
                owner,
                is_active,
            });
        }
    }

    fn slot(owner: PlayerId) -> usize {
        (owner.0 as usize).min(MAX_PLAYER_SLOTS - 1)
    }

    fn update_port_states(&mut self) {
        for facility in &mut self.facilities {
            facility.is_operational = facility.capacity > 0;
        }
    }

    fn update_external_connections(&mut self) {
        // Connections are toggled externally via `set_connection`; this
        // phase exists as the tick hook spec §4.6 names so a future
        // neighbor-handshake system has somewhere to plug in without
        // reshaping the subsystem.
    }

    fn expire_and_tick_agreements(&mut self) {
        for agreement in &mut self.agreements {
            if agreement.cycles_remaining > 0 {
                agreement.cycles_remaining -= 1;
            }
        }
        self.agreements.retain(|a| !a.is_expired());
    }

    fn calculate_trade_income(&mut self, phase: u64) {
        let mut income = [0i64; MAX_PLAYER_SLOTS];
        for agreement in &self.agreements {
            let a_slot = Self::slot(PlayerId(agreement.party_a));
            let b_slot = Self::slot(PlayerId(agreement.party_b));
            income[a_slot] += agreement.income_for_party_a();
            income[b_slot] += agreement.income_for_party_b();
        }

        if phase != self.last_phase {
            for slot in 0..MAX_PLAYER_SLOTS {
                let idx = self.history_write_index[slot];
                self.income_history[slot][idx] = income[slot];
                self.history_write_index[slot] = (idx + 1) % INCOME_HISTORY_PHASES;
            }
            self.last_phase = phase;
        }
        self.last_phase_income = income;
    }

    fn cache_demand_bonuses(&mut self) {
        for cache in &mut self.demand_bonus {
            *cache = DemandBonusCache::default();
        }
        for agreement in &self.agreements {
            let a_slot = Self::slot(PlayerId(agreement.party_a));
            let b_slot = Self::slot(PlayerId(agreement.party_b));
            Self::apply_demand_bonus(&mut self.demand_bonus[a_slot], agreement.demand_bonus_a);
            Self::apply_demand_bonus(&mut self.demand_bonus[b_slot], agreement.demand_bonus_b);
        }
    }

    fn apply_demand_bonus(cache: &mut DemandBonusCache, bonus: i8) {
        cache.habitation = cache.habitation.saturating_add(bonus);
        cache.exchange = cache.exchange.saturating_add(bonus);
        cache.fabrication = cache.fabrication.saturating_add(bonus);
    }

    pub fn trade_income_history(&self, owner: PlayerId) -> &[Credits; INCOME_HISTORY_PHASES] {
        &self.income_history[Self::slot(owner)]
    }
}

impl Simulatable for Port {
    fn priority(&self) -> i32 {
        priority::PORT
    }

    fn tick(&mut self, time: SchedulerTime, _world: &mut SimWorld) {
        self.update_port_states();
        self.update_external_connections();
        self.expire_and_tick_agreements();
        self.calculate_trade_income(time.phase);
        self.cache_demand_bonuses();
    }

    fn name(&self) -> &'static str {
        "port"
    }
}

impl PortProvider for Port {
    fn capacity(&self, kind: TerminalKindQuery, owner: PlayerId) -> u32 {
        self.facilities
            .iter()
            .filter(|f| f.kind == kind && f.owner == owner)
            .map(|f| f.capacity)
            .sum()
    }

    fn utilization(&self, kind: TerminalKindQuery, owner: PlayerId) -> f32 {
        let matching: Vec<&PortFacility> = self
            .facilities
            .iter()
            .filter(|f| f.kind == kind && f.owner == owner)
            .collect();
        if matching.is_empty() {
            return 0.0;
        }
        matching.iter().map(|f| f.utilization).sum::<f32>() / matching.len() as f32
    }

    fn count(&self, kind: TerminalKindQuery, owner: PlayerId) -> usize {
        self.facilities
            .iter()
            .filter(|f| f.kind == kind && f.owner == owner)
            .count()
    }

    fn demand_bonus(&self, zone: ZoneQuery, owner: PlayerId) -> i8 {
        let cache = &self.demand_bonus[Self::slot(owner)];
        match zone {
            ZoneQuery::Habitation => cache.habitation,
            ZoneQuery::Exchange => cache.exchange,
            ZoneQuery::Fabrication => cache.fabrication,
        }
    }

    fn external_connection_count(&self, owner: PlayerId) -> usize {
        self.connections
            .iter()
            .filter(|c| c.owner == owner && c.is_active)
            .count()
    }

    fn trade_income(&self, owner: PlayerId) -> Credits {
        self.last_phase_income[Self::slot(owner)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn world() -> SimWorld {
        SimWorld::new(64, 1, SimConfig::default())
    }

    fn time(phase: u64) -> SchedulerTime {
        SchedulerTime {
            tick: crate::ids::Tick(1),
            phase,
            cycle: 0,
        }
    }

    #[test]
    fn default_agreement_matches_original_defaults() {
        let a = TradeAgreement::default();
        assert_eq!(a.party_a, 0);
        assert_eq!(a.party_b, 0);
        assert_eq!(a.income_bonus_percent, 100);
        assert!(a.is_expired());
    }

    #[test]
    fn expired_agreements_are_dropped_after_tick() {
        let mut w = world();
        let mut port = Port::new();
        port.add_agreement(TradeAgreement {
            party_a: GAME_MASTER,
            party_b: 1,
            cycles_remaining: 1,
            ..Default::default()
        });
        port.tick(time(0), &mut w);
        assert_eq!(port.agreements.len(), 1);
        port.tick(time(1), &mut w);
        assert!(port.agreements.is_empty());
    }

    #[test]
    fn trade_income_sums_active_agreements_per_party() {
        let mut w = world();
        let mut port = Port::new();
        port.add_agreement(TradeAgreement {
            party_a: 1,
            party_b: 2,
            cycles_remaining: 1000,
            cost_per_cycle_a: 1000,
            cost_per_cycle_b: -500,
            income_bonus_percent: 150,
            ..Default::default()
        });
        port.tick(time(0), &mut w);
        assert_eq!(port.trade_income(PlayerId(1)), 1500);
        assert_eq!(port.trade_income(PlayerId(2)), -750);
    }

    #[test]
    fn demand_bonus_is_cached_from_agreements() {
        let mut w = world();
        let mut port = Port::new();
        port.add_agreement(TradeAgreement {
            party_a: 1,
            party_b: 2,
            cycles_remaining: 1000,
            demand_bonus_a: 15,
            demand_bonus_b: -5,
            ..Default::default()
        });
        port.tick(time(0), &mut w);
        assert_eq!(port.demand_bonus(ZoneQuery::Habitation, PlayerId(1)), 15);
        assert_eq!(port.demand_bonus(ZoneQuery::Exchange, PlayerId(2)), -5);
    }

    #[test]
    fn income_history_advances_only_on_new_phase() {
        let mut w = world();
        let mut port = Port::new();
        port.add_agreement(TradeAgreement {
            party_a: 1,
            party_b: 0,
            cycles_remaining: 1000,
            cost_per_cycle_a: 200,
            ..Default::default()
        });
        port.tick(time(0), &mut w);
        port.tick(time(0), &mut w);
        port.tick(time(1), &mut w);
        let history = port.trade_income_history(PlayerId(1));
        assert_eq!(history[0], 200);
        assert_eq!(history[1], 200);
    }

    #[test]
    fn external_connection_count_only_counts_active() {
        let mut port = Port::new();
        port.set_connection(ExternalEdge::North, PlayerId(1), true);
        port.set_connection(ExternalEdge::East, PlayerId(1), false);
        assert_eq!(port.external_connection_count(PlayerId(1)), 1);
    }
}
