//! gxe engine -- tick-rate-gated system scheduling on top of the ECS.
//!
//! This crate builds on [`gxe_ecs`] to provide the simulation driver: a
//! [`Scheduler`](tick::Scheduler) that runs systems against a
//! [`World`](gxe_ecs::world::World) in registration order, each at its own
//! tick rate, flushing the [`CommandBuffer`](gxe_ecs::command::CommandBuffer)
//! after every system tick.
//!
//! # Quick Start
//!
//! ```
//! use gxe_engine::prelude::*;
//!
//! type Particle = (Position, Velocity, Lifetime, Color);
//! type Scene = (Particle,);
//!
//! let mut world: World<Scene> = World::new();
//! world.create_entity((
//!     Position { x: 0.0, y: 0.0 },
//!     Velocity { dx: 1.0, dy: 0.0 },
//!     Lifetime { remaining: 0.5 },
//!     Color::WHITE,
//! ));
//!
//! let mut scheduler = Scheduler::<Scene>::new(SchedulerConfig::default());
//! scheduler.add_system("physics", 60, PhysicsSystem::default()).unwrap();
//! scheduler.add_system("lifetime", 0, LifetimeSystem).unwrap();
//!
//! for _ in 0..60 {
//!     scheduler.update(&mut world, 1.0 / 60.0);
//! }
//! assert_eq!(world.entity_count(), 0);
//! ```

#![deny(unsafe_code)]

pub mod physics;
pub mod tick;

use tracing_subscriber::EnvFilter;

/// Re-export the ECS crate for convenience.
pub use gxe_ecs;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by engine setup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A system with this name is already registered.
    #[error("duplicate system name: {name:?}")]
    DuplicateSystem { name: String },
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"warn"` or `"gxe_ecs=debug"`) when the
/// variable is unset or invalid.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .try_init()
        .is_ok()
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    // Re-export everything from the ECS prelude.
    pub use gxe_ecs::prelude::*;

    // Engine-specific exports.
    pub use crate::physics::{Color, Lifetime, LifetimeSystem, PhysicsSystem, Position, Velocity};
    pub use crate::tick::{
        Scheduler, SchedulerConfig, System, SystemRun, TickGate, UpdateReport,
    };
    pub use crate::{init_tracing, EngineError};
}
