//! Fixed-timestep tick scheduler (spec §4.1).
//!
//! Drives a priority-ordered set of [`Simulatable`] subsystems from wall-clock
//! `update(wall_δ)` calls. Subsystems are boxed trait objects, per spec §9's
//! re-architecture of the source's duck-typed `ISimulatable` interfaces into
//! a single trait + a vector of dynamically dispatched references.

use crate::config::{PHASES_PER_CYCLE, TICKS_PER_CYCLE, TICKS_PER_PHASE, TICK_DELTA_SECS};
use crate::events::{CycleChanged, PhaseChanged, TickComplete, TickStart};
use crate::ids::Tick;
use crate::subsystem::{SchedulerTime, Simulatable};
use crate::world::SimWorld;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimSpeed {
    Paused,
    Normal,
    Fast,
    Fastest,
}

impl SimSpeed {
    pub fn multiplier(self) -> f32 {
        match self {
            SimSpeed::Paused => 0.0,
            SimSpeed::Normal => 1.0,
            SimSpeed::Fast => 2.0,
            SimSpeed::Fastest => 3.0,
        }
    }
}

/// A (tick, delta) payload recorded at the scheduler's rendezvous points, for
/// late-joining query consumers that missed the corresponding event
/// (`get_last_tick_start`/`get_last_tick_complete` in the original system).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickTimestamp {
    pub tick: Tick,
    pub delta_secs: f32,
}

pub struct Scheduler {
    subsystems: Vec<Box<dyn Simulatable>>,
    dirty_order: bool,
    speed: SimSpeed,
    accumulator: f32,
    tick: Tick,
    last_tick_start: Option<TickTimestamp>,
    last_tick_complete: Option<TickTimestamp>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            subsystems: Vec::new(),
            dirty_order: false,
            speed: SimSpeed::Normal,
            accumulator: 0.0,
            tick: Tick::ZERO,
            last_tick_start: None,
            last_tick_complete: None,
        }
    }

    /// Idempotent registration. Re-sort is lazy: it happens the next time
    /// `update` runs, not on every call.
    pub fn register(&mut self, subsystem: Box<dyn Simulatable>) {
        self.subsystems.push(subsystem);
        self.dirty_order = true;
    }

    pub fn set_speed(&mut self, speed: SimSpeed) {
        self.speed = speed;
    }

    pub fn speed(&self) -> SimSpeed {
        self.speed
    }

    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    pub fn cycle(&self) -> u64 {
        self.tick.0 / TICKS_PER_CYCLE
    }

    pub fn phase(&self) -> u64 {
        (self.tick.0 / TICKS_PER_PHASE) % PHASES_PER_CYCLE
    }

    /// Residual accumulator expressed as a fraction of one tick, `[0, 1)` --
    /// the render-side interpolation factor.
    pub fn interpolation_factor(&self) -> f32 {
        self.accumulator / TICK_DELTA_SECS
    }

    pub fn last_tick_start(&self) -> Option<TickTimestamp> {
        self.last_tick_start
    }

    pub fn last_tick_complete(&self) -> Option<TickTimestamp> {
        self.last_tick_complete
    }

    /// Called once per host frame with the real wall-clock delta. Returns
    /// the number of simulation ticks that fired this call.
    pub fn update(&mut self, wall_delta_secs: f32, world: &mut SimWorld) -> u32 {
        if self.dirty_order {
            self.subsystems.sort_by_key(|s| s.priority());
            self.dirty_order = false;
        }

        let effective_delta = wall_delta_secs * self.speed.multiplier();
        self.accumulator += effective_delta;

        let mut prev_phase = self.phase();
        let mut prev_cycle = self.cycle();

        let mut ticks_run = 0;
        while self.accumulator >= TICK_DELTA_SECS {
            self.accumulator -= TICK_DELTA_SECS;
            self.tick = self.tick.next();

            let start = TickTimestamp {
                tick: self.tick,
                delta_secs: TICK_DELTA_SECS,
            };
            self.last_tick_start = Some(start);
            world.events.tick_start.push(TickStart {
                tick: self.tick,
                delta_millis: (TICK_DELTA_SECS * 1000.0) as u32,
            });

            let time = SchedulerTime {
                tick: self.tick,
                phase: self.phase(),
                cycle: self.cycle(),
            };
            for subsystem in &mut self.subsystems {
                subsystem.tick(time, world);
            }

            let complete = TickTimestamp {
                tick: self.tick,
                delta_secs: TICK_DELTA_SECS,
            };
            self.last_tick_complete = Some(complete);
            world
                .events
                .tick_complete
                .push(TickComplete { tick: self.tick });

            let phase = self.phase();
            if phase != prev_phase {
                world.events.phase_changed.push(PhaseChanged {
                    tick: self.tick,
                    phase,
                });
                prev_phase = phase;
            }
            let cycle = self.cycle();
            if cycle != prev_cycle {
                world.events.cycle_changed.push(CycleChanged {
                    tick: self.tick,
                    cycle,
                });
                prev_cycle = cycle;
            }

            ticks_run += 1;
        }
        ticks_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn world() -> SimWorld {
        SimWorld::new(128, 1, SimConfig::default())
    }

    #[test]
    fn fixed_timestep_accumulation_scenario() {
        let mut sched = Scheduler::new();
        let mut w = world();

        sched.update(0.040, &mut w);
        sched.update(0.040, &mut w);
        assert_eq!(sched.current_tick(), Tick(1));
        assert!((sched.accumulator - 0.030).abs() < 1e-4);

        sched.update(0.250, &mut w);
        assert_eq!(sched.current_tick(), Tick(6));
        assert!((sched.accumulator - 0.030).abs() < 1e-4);
    }

    #[test]
    fn speed_control_scenario() {
        let mut sched = Scheduler::new();
        let mut w = world();

        sched.set_speed(SimSpeed::Fast);
        let ticks = sched.update(0.050, &mut w);
        assert_eq!(ticks, 2);

        sched.set_speed(SimSpeed::Paused);
        let ticks = sched.update(1.000, &mut w);
        assert_eq!(ticks, 0);
    }

    struct CountingSubsystem {
        priority: i32,
        log: std::rc::Rc<std::cell::RefCell<Vec<i32>>>,
    }

    impl Simulatable for CountingSubsystem {
        fn priority(&self) -> i32 {
            self.priority
        }
        fn tick(&mut self, _time: SchedulerTime, _world: &mut SimWorld) {
            self.log.borrow_mut().push(self.priority);
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn subsystems_run_in_ascending_priority_stable_for_ties() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut sched = Scheduler::new();
        let mut w = world();

        sched.register(Box::new(CountingSubsystem {
            priority: 50,
            log: log.clone(),
        }));
        sched.register(Box::new(CountingSubsystem {
            priority: 0,
            log: log.clone(),
        }));
        sched.register(Box::new(CountingSubsystem {
            priority: 0,
            log: log.clone(),
        }));
        sched.register(Box::new(CountingSubsystem {
            priority: 45,
            log: log.clone(),
        }));

        sched.update(0.050, &mut w);
        assert_eq!(*log.borrow(), vec![0, 0, 45, 50]);
    }

    #[test]
    fn phase_and_cycle_boundaries_emit_events() {
        let mut sched = Scheduler::new();
        let mut w = world();
        // 500 ticks to cross into phase 1; 25.0 seconds of wall time.
        sched.update(25.0, &mut w);
        assert_eq!(sched.current_tick(), Tick(500));
        assert_eq!(w.events.phase_changed.iter().count(), 1);
    }
}
