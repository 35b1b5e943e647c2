//! Command buffer for deferred structural mutations.
//!
//! Visits borrow the [`World`] exclusively, so a visitor cannot create or
//! destroy entities while rows are borrowed. Instead it records the change
//! in a [`CommandBuffer`], which is applied once the pass is over. Commands
//! are applied in strict insertion order (FIFO).
//!
//! # Example
//!
//! ```
//! use gxe_ecs::prelude::*;
//!
//! struct Health(i32);
//!
//! type Units = ((Health,),);
//!
//! let mut world: World<Units> = World::new();
//! let weak = world.create_entity((Health(0),));
//! let strong = world.create_entity((Health(50),));
//!
//! let mut commands = CommandBuffer::<Units>::new();
//! world.for_each_with_components(|id: EntityId, health: &mut Health| {
//!     if health.0 <= 0 {
//!         commands.destroy(id);
//!     }
//! });
//!
//! let report = commands.apply(&mut world);
//! assert_eq!(report.destroyed, 1);
//! assert!(!world.is_valid(weak));
//! assert!(world.is_valid(strong));
//! ```

use std::fmt;

use tracing::{debug, trace};

use crate::component::ComponentSet;
use crate::entity::EntityId;
use crate::world::{ArchetypeList, Registered, World};

type CreateFn<L> = Box<dyn FnOnce(&mut World<L>) -> EntityId>;

/// One deferred mutation.
enum Command<L: ArchetypeList> {
    /// Create an entity in a statically chosen archetype.
    Create(CreateFn<L>),
    /// Destroy an entity if it is still live.
    Destroy(EntityId),
}

/// Summary of one [`CommandBuffer::apply`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Ids of created entities, in application order.
    pub created: Vec<EntityId>,
    /// Destroy commands that hit a live entity.
    pub destroyed: usize,
    /// Destroy commands whose target was already dead.
    pub ignored_destroys: usize,
}

impl ApplyReport {
    /// Total number of commands applied.
    pub fn total(&self) -> usize {
        self.created.len() + self.destroyed + self.ignored_destroys
    }
}

/// FIFO queue of deferred creations and destructions for a `World<L>`.
pub struct CommandBuffer<L: ArchetypeList> {
    commands: Vec<Command<L>>,
    last_apply_report: ApplyReport,
}

impl<L: ArchetypeList> CommandBuffer<L> {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            last_apply_report: ApplyReport::default(),
        }
    }

    /// Queue the creation of an entity in the archetype of `S`.
    ///
    /// The archetype is checked when the command is queued, so naming an
    /// unregistered component set fails to compile here.
    pub fn create<S, I>(&mut self, values: S)
    where
        S: ComponentSet,
        L: Registered<S, I>,
        I: 'static,
    {
        self.commands.push(Command::Create(Box::new(move |world: &mut World<L>| {
            world.create_entity::<S, I>(values)
        })));
    }

    /// Queue the destruction of `entity`.
    pub fn destroy(&mut self, entity: EntityId) {
        self.commands.push(Command::Destroy(entity));
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether no commands are queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every queued command without applying it.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// The report from the most recent [`apply`](Self::apply).
    pub fn last_apply_report(&self) -> &ApplyReport {
        &self.last_apply_report
    }

    /// Apply all queued commands to `world` in insertion order, leaving the
    /// buffer empty.
    ///
    /// A destroy whose target is no longer live (including one destroyed by
    /// an earlier command in the same batch) is counted and skipped.
    pub fn apply(&mut self, world: &mut World<L>) -> ApplyReport {
        let commands = std::mem::take(&mut self.commands);
        let mut report = ApplyReport::default();

        for command in commands {
            match command {
                Command::Create(create) => {
                    report.created.push(create(world));
                }
                Command::Destroy(entity) => {
                    if world.destroy_entity(entity) {
                        report.destroyed += 1;
                    } else {
                        trace!(entity = %entity, "deferred destroy of dead entity skipped");
                        report.ignored_destroys += 1;
                    }
                }
            }
        }

        if report.total() > 0 {
            debug!(
                created = report.created.len(),
                destroyed = report.destroyed,
                ignored = report.ignored_destroys,
                "applied command buffer"
            );
        }
        self.last_apply_report = report.clone();
        report
    }
}

impl<L: ArchetypeList> Default for CommandBuffer<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ArchetypeList> fmt::Debug for CommandBuffer<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let destroys = self
            .commands
            .iter()
            .filter(|command| matches!(command, Command::Destroy(_)))
            .count();
        f.debug_struct("CommandBuffer")
            .field("creates", &(self.commands.len() - destroys))
            .field("destroys", &destroys)
            .field("last_apply_report", &self.last_apply_report)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
