//! Reference simulation components and systems.
//!
//! [`PhysicsSystem`] integrates every entity that has both a [`Position`] and
//! a [`Velocity`], whatever archetype it lives in. [`LifetimeSystem`] counts
//! down [`Lifetime`]s and destroys expired entities through the command
//! buffer, since destroying during a visit is not possible.

use gxe_ecs::command::CommandBuffer;
use gxe_ecs::entity::EntityId;
use gxe_ecs::world::{ArchetypeList, World};
use tracing::trace;

use crate::tick::System;

/// Default downward acceleration, in units per second squared.
pub const DEFAULT_GRAVITY: f32 = 0.5;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// 2D position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

/// 2D velocity, in units per second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    /// Horizontal velocity.
    pub dx: f32,
    /// Vertical velocity.
    pub dy: f32,
}

/// Seconds until the entity is destroyed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lifetime {
    pub remaining: f32,
}

/// RGBA display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    /// An opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

// ---------------------------------------------------------------------------
// PhysicsSystem
// ---------------------------------------------------------------------------

/// Applies gravity to velocity and integrates position (explicit Euler).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsSystem {
    /// Added to `Velocity::dy` per second.
    pub gravity: f32,
}

impl Default for PhysicsSystem {
    fn default() -> Self {
        Self {
            gravity: DEFAULT_GRAVITY,
        }
    }
}

impl<L: ArchetypeList> System<L> for PhysicsSystem {
    fn tick(&mut self, world: &mut World<L>, _commands: &mut CommandBuffer<L>, dt: f64) {
        let dt = dt as f32;
        let gravity = self.gravity;
        world.for_each_with_components(|pos: &mut Position, vel: &mut Velocity| {
            vel.dy += gravity * dt;
            pos.x += vel.dx * dt;
            pos.y += vel.dy * dt;
        });
    }
}

// ---------------------------------------------------------------------------
// LifetimeSystem
// ---------------------------------------------------------------------------

/// Counts down every [`Lifetime`] and destroys entities whose time is up.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifetimeSystem;

impl<L: ArchetypeList> System<L> for LifetimeSystem {
    fn tick(&mut self, world: &mut World<L>, commands: &mut CommandBuffer<L>, dt: f64) {
        let dt = dt as f32;
        let mut expired = 0usize;
        world.for_each_with_components(|id: EntityId, life: &mut Lifetime| {
            life.remaining -= dt;
            if life.remaining <= 0.0 {
                commands.destroy(id);
                expired += 1;
            }
        });
        if expired > 0 {
            trace!(expired, "lifetimes expired");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
