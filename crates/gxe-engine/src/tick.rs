//! Tick-rate-gated system scheduler.
//!
//! The [`Scheduler`] drives systems against a [`World`]. Each system is
//! registered with its own tick rate:
//!
//! - `0` runs the system once per [`update`](Scheduler::update) with the
//!   frame's `dt` (variable timestep).
//! - `n > 0` accumulates frame time and runs the system once for every whole
//!   `1 / n` seconds accumulated, each time with that fixed step.
//!
//! Systems run in registration order. After every system tick the shared
//! [`CommandBuffer`] is applied, so entities a system destroyed or created
//! are settled before the next system (or the next tick of the same system)
//! runs.
//!
//! # Example
//!
//! ```
//! use gxe_engine::prelude::*;
//!
//! struct Counter(u32);
//! type Game = ((Counter,),);
//!
//! let mut world: World<Game> = World::new();
//! world.create_entity((Counter(0),));
//!
//! let mut scheduler = Scheduler::<Game>::new(SchedulerConfig::default());
//! scheduler
//!     .add_fn("count", 60, |world, _commands, _dt| {
//!         world.for_each_with_components(|c: &mut Counter| c.0 += 1);
//!     })
//!     .unwrap();
//!
//! // Half a second in uneven frames.
//! for dt in [0.1, 0.25, 0.15] {
//!     scheduler.update(&mut world, dt);
//! }
//!
//! let mut total = 0;
//! world.for_each_with_components(|c: &mut Counter| total = c.0);
//! assert_eq!(total, 30);
//! ```

use std::time::{Duration, Instant};

use gxe_ecs::command::{ApplyReport, CommandBuffer};
use gxe_ecs::world::{ArchetypeList, World};
use tracing::{debug, warn};

use crate::EngineError;

/// Accumulated time within this distance of a whole step counts as a step.
const STEP_TOLERANCE: f64 = 1e-9;

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Logic run against the world on a cadence.
///
/// Systems mutate components through `world` and defer structural changes
/// made during a visit through `commands`.
pub trait System<L: ArchetypeList> {
    /// Run one tick of `dt` seconds.
    fn tick(&mut self, world: &mut World<L>, commands: &mut CommandBuffer<L>, dt: f64);
}

impl<L, F> System<L> for F
where
    L: ArchetypeList,
    F: FnMut(&mut World<L>, &mut CommandBuffer<L>, f64),
{
    fn tick(&mut self, world: &mut World<L>, commands: &mut CommandBuffer<L>, dt: f64) {
        self(world, commands, dt);
    }
}

// ---------------------------------------------------------------------------
// TickGate
// ---------------------------------------------------------------------------

/// Fixed-timestep accumulator deciding how often a system runs.
#[derive(Debug, Clone, PartialEq)]
pub struct TickGate {
    tickrate: u32,
    secs_per_tick: f64,
    accumulated: f64,
}

impl TickGate {
    /// A gate for `tickrate` ticks per second; `0` means variable timestep.
    pub fn new(tickrate: u32) -> Self {
        let secs_per_tick = if tickrate > 0 {
            1.0 / f64::from(tickrate)
        } else {
            0.0
        };
        Self {
            tickrate,
            secs_per_tick,
            accumulated: 0.0,
        }
    }

    /// Ticks per second, `0` for variable timestep.
    pub fn tickrate(&self) -> u32 {
        self.tickrate
    }

    /// The fixed step, or `None` for variable timestep.
    pub fn step(&self) -> Option<f64> {
        (self.tickrate > 0).then_some(self.secs_per_tick)
    }

    /// Time accumulated toward the next tick.
    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    /// Feed `dt` seconds of frame time. Returns how many ticks to run and
    /// the `dt` to pass to each.
    ///
    /// With `max_catch_up`, at most that many ticks are returned and any
    /// further whole steps of accumulated time are discarded. The due count
    /// saturates at `u32::MAX`; a non-finite backlog is discarded entirely.
    pub fn advance(&mut self, dt: f64, max_catch_up: Option<u32>) -> (u32, f64) {
        if self.tickrate == 0 {
            return (1, dt);
        }

        self.accumulated += dt;
        let steps = ((self.accumulated + STEP_TOLERANCE) / self.secs_per_tick).floor();
        // Float-to-int `as` saturates and maps NaN to 0.
        let due = steps as u32;
        let remainder = self.accumulated - f64::from(due) * self.secs_per_tick;

        let ticks = match max_catch_up {
            Some(max) if due > max => {
                warn!(
                    tickrate = self.tickrate,
                    due,
                    max,
                    dropped_secs = f64::from(due - max) * self.secs_per_tick,
                    "system fell behind; dropping accumulated time"
                );
                max
            }
            _ => due,
        };

        self.accumulated = if !remainder.is_finite() {
            0.0
        } else if ticks < due && remainder >= self.secs_per_tick {
            // Saturated count: keep only the partial step.
            remainder % self.secs_per_tick
        } else {
            remainder.max(0.0)
        };
        (ticks, self.secs_per_tick)
    }
}

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

/// Configuration for the [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerConfig {
    /// Upper bound on fixed-rate ticks per system per update. `None` runs
    /// every accumulated step.
    pub max_catch_up: Option<u32>,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What one system did during an update.
#[derive(Debug, Clone, Default)]
pub struct SystemRun {
    /// The system's registered name.
    pub name: String,
    /// How many times it ticked.
    pub ticks: u32,
    /// Wall-clock time spent in the system and its command flushes.
    pub elapsed: Duration,
    /// Entities created by its deferred commands.
    pub created: usize,
    /// Entities destroyed by its deferred commands.
    pub destroyed: usize,
}

/// Summary of one [`Scheduler::update`].
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    /// Frame time fed to the update.
    pub dt: f64,
    /// One entry per registered system, in execution order.
    pub systems: Vec<SystemRun>,
    /// Wall-clock time for the whole update.
    pub total_time: Duration,
}

impl UpdateReport {
    /// Ticks run by the named system, if it is registered.
    pub fn ticks_of(&self, name: &str) -> Option<u32> {
        self.systems
            .iter()
            .find(|run| run.name == name)
            .map(|run| run.ticks)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// A named system and its gate.
struct RegisteredSystem<L: ArchetypeList> {
    name: String,
    gate: TickGate,
    system: Box<dyn System<L>>,
}

/// Runs registered systems against a world, each at its own tick rate.
pub struct Scheduler<L: ArchetypeList> {
    systems: Vec<RegisteredSystem<L>>,
    commands: CommandBuffer<L>,
    config: SchedulerConfig,
    update_count: u64,
    sim_time: f64,
    last_report: UpdateReport,
}

impl<L: ArchetypeList> Scheduler<L> {
    /// Create a scheduler with no systems.
    ///
    /// # Panics
    ///
    /// Panics if `config.max_catch_up` is `Some(0)`.
    pub fn new(config: SchedulerConfig) -> Self {
        assert!(
            config.max_catch_up != Some(0),
            "max_catch_up must be at least 1 when set"
        );
        Self {
            systems: Vec::new(),
            commands: CommandBuffer::new(),
            config,
            update_count: 0,
            sim_time: 0.0,
            last_report: UpdateReport::default(),
        }
    }

    /// Register a system to run at `tickrate` ticks per second (`0` for once
    /// per update). Systems run in registration order.
    ///
    /// # Errors
    ///
    /// [`EngineError::DuplicateSystem`] if `name` is already registered.
    pub fn add_system(
        &mut self,
        name: &str,
        tickrate: u32,
        system: impl System<L> + 'static,
    ) -> Result<(), EngineError> {
        if self.systems.iter().any(|s| s.name == name) {
            return Err(EngineError::DuplicateSystem {
                name: name.to_owned(),
            });
        }
        self.systems.push(RegisteredSystem {
            name: name.to_owned(),
            gate: TickGate::new(tickrate),
            system: Box::new(system),
        });
        debug!(system = name, tickrate, "registered system");
        Ok(())
    }

    /// Register a closure as a system. Same as
    /// [`add_system`](Self::add_system), but the closure's parameter types
    /// are inferred.
    ///
    /// # Errors
    ///
    /// [`EngineError::DuplicateSystem`] if `name` is already registered.
    pub fn add_fn<F>(&mut self, name: &str, tickrate: u32, func: F) -> Result<(), EngineError>
    where
        F: FnMut(&mut World<L>, &mut CommandBuffer<L>, f64) + 'static,
    {
        self.add_system(name, tickrate, func)
    }

    /// Advance every system by `dt` seconds of frame time.
    ///
    /// # Panics
    ///
    /// Panics if `dt` is negative, NaN or infinite.
    pub fn update(&mut self, world: &mut World<L>, dt: f64) -> UpdateReport {
        assert!(
            dt.is_finite() && dt >= 0.0,
            "frame dt must be finite and non-negative, got {dt}"
        );
        let update_start = Instant::now();
        let mut runs = Vec::with_capacity(self.systems.len());

        for registered in &mut self.systems {
            let system_start = Instant::now();
            let (ticks, step) = registered.gate.advance(dt, self.config.max_catch_up);
            let mut run = SystemRun {
                name: registered.name.clone(),
                ticks,
                ..SystemRun::default()
            };

            for _ in 0..ticks {
                registered.system.tick(world, &mut self.commands, step);
                let ApplyReport {
                    created, destroyed, ..
                } = self.commands.apply(world);
                run.created += created.len();
                run.destroyed += destroyed;
            }

            run.elapsed = system_start.elapsed();
            runs.push(run);
        }

        self.update_count += 1;
        self.sim_time += dt;
        self.last_report = UpdateReport {
            dt,
            systems: runs,
            total_time: update_start.elapsed(),
        };
        self.last_report.clone()
    }

    // -- accessors ----------------------------------------------------------

    /// Number of completed [`update`](Self::update) calls.
    pub fn tick_count(&self) -> u64 {
        self.update_count
    }

    /// Total frame time fed to [`update`](Self::update), in seconds.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// The number of registered systems.
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// The names of all registered systems, in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    /// The tick gate of the named system.
    pub fn gate(&self, name: &str) -> Option<&TickGate> {
        self.systems
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.gate)
    }

    /// The report from the most recent update.
    pub fn last_report(&self) -> &UpdateReport {
        &self.last_report
    }

    /// The configuration this scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

impl<L: ArchetypeList> std::fmt::Debug for Scheduler<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("systems", &self.system_names())
            .field("update_count", &self.update_count)
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use gxe_ecs::entity::EntityId;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Ticks(u32);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Fuse(i32);

    type Game = ((Ticks,), (Fuse,));

    fn world_with_counter() -> World<Game> {
        let mut world = World::new();
        world.create_entity((Ticks(0),));
        world
    }

    fn counter(world: &mut World<Game>) -> u32 {
        let mut value = 0;
        world.for_each::<(Ticks,), _, _>(|t: &mut Ticks| value = t.0);
        value
    }

    // -- TickGate -------------------------------------------------------------

    #[test]
    fn zero_tickrate_runs_once_with_frame_dt() {
        let mut gate = TickGate::new(0);
        assert_eq!(gate.step(), None);
        assert_eq!(gate.advance(0.123, None), (1, 0.123));
        assert_eq!(gate.advance(0.0, None), (1, 0.0));
    }

    #[test]
    fn fixed_rate_accumulates_partial_frames() {
        let mut gate = TickGate::new(10);
        assert_eq!(gate.advance(0.05, None).0, 0);
        assert_eq!(gate.advance(0.05, None).0, 1);
        assert_eq!(gate.advance(0.25, None).0, 2);
        assert!((gate.accumulated() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn sixty_hz_over_one_second_of_uneven_frames() {
        let mut gate = TickGate::new(60);
        let mut total = 0;
        for _ in 0..25 {
            for dt in [0.007, 0.013, 0.02] {
                let (ticks, step) = gate.advance(dt, None);
                assert_eq!(step, 1.0 / 60.0);
                total += ticks;
            }
        }
        assert_eq!(total, 60);
    }

    #[test]
    fn max_catch_up_drops_excess_time() {
        let mut gate = TickGate::new(100);
        assert_eq!(gate.advance(1.0, Some(5)).0, 5);
        // The dropped backlog does not come back.
        assert!(gate.accumulated() < 0.01);
        assert_eq!(gate.advance(0.01, Some(5)).0, 1);
    }

    #[test]
    fn huge_frame_is_counted_without_stepping() {
        let mut gate = TickGate::new(1000);
        assert_eq!(gate.advance(5.0e6, Some(1)), (1, 0.001));
        assert!(gate.accumulated() < 0.001);

        let mut uncapped = TickGate::new(1000);
        assert_eq!(uncapped.advance(5.0e6, None).0, u32::MAX);
        // More steps than fit in u32; the remainder is still carried.
        assert!(uncapped.accumulated() > 0.0);
    }

    #[test]
    fn infinite_frame_runs_capped_ticks_and_resets() {
        let mut gate = TickGate::new(60);
        assert_eq!(gate.advance(f64::INFINITY, Some(3)).0, 3);
        assert_eq!(gate.accumulated(), 0.0);
        // The gate keeps working afterwards.
        assert_eq!(gate.advance(1.0 / 60.0, Some(3)).0, 1);
    }

    #[test]
    fn nan_frame_runs_nothing() {
        let mut gate = TickGate::new(60);
        assert_eq!(gate.advance(f64::NAN, None).0, 0);
        assert_eq!(gate.accumulated(), 0.0);
    }

    // -- Scheduler ------------------------------------------------------------

    #[test]
    #[should_panic(expected = "finite and non-negative")]
    fn update_rejects_infinite_dt() {
        let mut world = World::<Game>::new();
        let mut scheduler = Scheduler::<Game>::new(SchedulerConfig {
            max_catch_up: Some(1),
        });
        scheduler.add_fn("noop", 60, |_, _, _| {}).unwrap();
        scheduler.update(&mut world, f64::INFINITY);
    }

    #[test]
    #[should_panic(expected = "finite and non-negative")]
    fn update_rejects_negative_dt() {
        let mut world = World::<Game>::new();
        let mut scheduler = Scheduler::<Game>::new(SchedulerConfig::default());
        scheduler.update(&mut world, -0.5);
    }

    #[test]
    fn gate_and_config_are_inspectable() {
        let config = SchedulerConfig {
            max_catch_up: Some(4),
        };
        let mut scheduler = Scheduler::<Game>::new(config);
        scheduler.add_fn("slow", 10, |_, _, _| {}).unwrap();
        scheduler.update(&mut World::new(), 0.25);

        assert_eq!(scheduler.config(), &config);
        let gate = scheduler.gate("slow").unwrap();
        assert_eq!(gate.tickrate(), 10);
        assert!((gate.accumulated() - 0.05).abs() < 1e-9);
        assert!(scheduler.gate("missing").is_none());
    }

    #[test]
    fn duplicate_system_name_rejected() {
        let mut scheduler = Scheduler::<Game>::new(SchedulerConfig::default());
        scheduler.add_fn("a", 0, |_, _, _| {}).unwrap();
        let err = scheduler.add_fn("a", 30, |_, _, _| {}).unwrap_err();
        assert_eq!(
            err,
            EngineError::DuplicateSystem {
                name: "a".to_owned()
            }
        );
        assert_eq!(scheduler.system_count(), 1);
    }

    #[test]
    fn systems_run_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::<Game>::new(SchedulerConfig::default());
        for name in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            scheduler
                .add_fn(name, 0, move |_, _, _| order.borrow_mut().push(name))
                .unwrap();
        }
        let mut world = World::<Game>::new();
        scheduler.update(&mut world, 0.016);
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
        assert_eq!(scheduler.system_names(), vec!["first", "second", "third"]);
    }

    #[test]
    fn fixed_rate_system_ticks_per_accumulated_step() {
        let mut world = world_with_counter();
        let mut scheduler = Scheduler::<Game>::new(SchedulerConfig::default());
        scheduler
            .add_fn("count", 60, |world, _, _| {
                world.for_each_with_components(|t: &mut Ticks| t.0 += 1);
            })
            .unwrap();

        for _ in 0..25 {
            for dt in [0.007, 0.013, 0.02] {
                scheduler.update(&mut world, dt);
            }
        }
        assert_eq!(counter(&mut world), 60);
        assert_eq!(scheduler.tick_count(), 75);
        assert!((scheduler.sim_time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn commands_flushed_between_systems() {
        let mut world = World::<Game>::new();
        for n in [3, -1, 0, 7] {
            world.create_entity((Fuse(n),));
        }
        let seen_by_second = Rc::new(RefCell::new(0));
        let mut scheduler = Scheduler::<Game>::new(SchedulerConfig::default());
        scheduler
            .add_fn("burn", 0, |world, commands, _| {
                world.for_each_with_components(|id: EntityId, fuse: &mut Fuse| {
                    if fuse.0 <= 0 {
                        commands.destroy(id);
                    }
                });
            })
            .unwrap();
        let seen = Rc::clone(&seen_by_second);
        scheduler
            .add_fn("count", 0, move |world, _, _| {
                *seen.borrow_mut() = world.archetype::<(Fuse,), _>().len();
            })
            .unwrap();

        let report = scheduler.update(&mut world, 0.016);
        assert_eq!(*seen_by_second.borrow(), 2);
        assert_eq!(report.systems[0].destroyed, 2);
        assert_eq!(report.ticks_of("count"), Some(1));
        assert_eq!(world.entity_count(), 2);
    }

    #[test]
    fn struct_systems_keep_state() {
        struct Spawner {
            every: u32,
            seen: u32,
        }

        impl System<Game> for Spawner {
            fn tick(
                &mut self,
                _world: &mut World<Game>,
                commands: &mut CommandBuffer<Game>,
                _dt: f64,
            ) {
                self.seen += 1;
                if self.seen % self.every == 0 {
                    commands.create((Fuse(5),));
                }
            }
        }

        let mut world = World::<Game>::new();
        let mut scheduler = Scheduler::<Game>::new(SchedulerConfig::default());
        scheduler
            .add_system("spawner", 10, Spawner { every: 2, seen: 0 })
            .unwrap();
        let report = scheduler.update(&mut world, 1.0);
        assert_eq!(report.ticks_of("spawner"), Some(10));
        assert_eq!(report.systems[0].created, 5);
        assert_eq!(world.archetype::<(Fuse,), _>().len(), 5);
    }

    #[test]
    fn max_catch_up_limits_ticks_per_update() {
        let mut world = world_with_counter();
        let mut scheduler = Scheduler::<Game>::new(SchedulerConfig {
            max_catch_up: Some(3),
        });
        scheduler
            .add_fn("count", 60, |world, _, _| {
                world.for_each_with_components(|t: &mut Ticks| t.0 += 1);
            })
            .unwrap();
        let report = scheduler.update(&mut world, 1.0);
        assert_eq!(report.ticks_of("count"), Some(3));
        assert_eq!(counter(&mut world), 3);
    }

    #[test]
    #[should_panic(expected = "max_catch_up")]
    fn zero_catch_up_rejected() {
        let _ = Scheduler::<Game>::new(SchedulerConfig {
            max_catch_up: Some(0),
        });
    }
}
