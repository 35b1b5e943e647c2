//! gxe ECS -- archetype-based Entity Component System with static archetypes.
//!
//! Entities are stored in archetypes, one per component set declared in the
//! world's type. Each archetype keeps a Structure-of-Arrays layout (one typed
//! `Vec` per component type plus a parallel `Vec` of entity ids) for
//! cache-friendly iteration. A global location table maps every live entity
//! to its archetype and row, and swap-and-pop removal keeps it consistent.
//!
//! Archetype selection and component membership are checked at compile time;
//! queries over every archetype match archetypes once per call by type id.
//!
//! # Quick Start
//!
//! ```
//! use gxe_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! type Moving = (Position, Velocity);
//! type Fixed = (Position,);
//!
//! let mut world: World<(Moving, Fixed)> = World::new();
//! let ball = world.create_entity((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 2.0 }));
//! world.create_entity((Position { x: 5.0, y: 5.0 },));
//!
//! world.for_each_with_components(|p: &mut Position, v: &mut Velocity| {
//!     p.x += v.dx;
//!     p.y += v.dy;
//! });
//!
//! assert_eq!(world.get::<Position>(ball), Some(&Position { x: 1.0, y: 2.0 }));
//! ```

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod archetype;
pub mod command;
pub mod component;
pub mod entity;
pub mod location;
#[allow(unsafe_code)]
pub mod query;
#[allow(unsafe_code)]
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The entity is not live (destroyed, or never created).
    #[error("entity {entity:?} has no valid location (destroyed or never created)")]
    InvalidEntity {
        entity: entity::EntityId,
    },

    /// The entity lives in a different archetype than the one named.
    #[error("entity {entity:?} lives in archetype {actual}, not archetype {expected}")]
    WrongArchetype {
        entity: entity::EntityId,
        expected: usize,
        actual: usize,
    },

    /// The 32-bit id space cannot hold another id block.
    #[error("entity id space exhausted after issuing {issued} ids")]
    IdSpaceExhausted {
        issued: u32,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::Archetype;
    pub use crate::command::{ApplyReport, CommandBuffer};
    pub use crate::component::{At, ComponentQuery, ComponentSet, Contains, Subset};
    pub use crate::entity::EntityId;
    pub use crate::location::EntityLocation;
    pub use crate::query::{ComponentsOnly, Visitor, WithEntity};
    pub use crate::world::{ArchetypeList, Registered, World, WorldConfig};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
