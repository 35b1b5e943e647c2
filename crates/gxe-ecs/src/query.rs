//! Query visitors and the world-wide component query.
//!
//! A visitor is any closure over exclusive component references. Its
//! parameter list decides what it receives:
//!
//! ```
//! use gxe_ecs::prelude::*;
//!
//! struct Position(f32);
//! struct Velocity(f32);
//!
//! let mut world: World<((Position, Velocity), (Position,))> = World::new();
//! world.create_entity((Position(0.0), Velocity(2.0)));
//! world.create_entity((Position(5.0),));
//!
//! // With the entity id.
//! world.for_each_with_components(|_id: EntityId, p: &mut Position, v: &mut Velocity| {
//!     p.0 += v.0;
//! });
//!
//! // Without it.
//! let mut total = 0.0;
//! world.for_each_with_components(|p: &mut Position| total += p.0);
//! assert_eq!(total, 7.0);
//! ```
//!
//! Closure parameters must be annotated so the id-taking and id-less forms
//! can be told apart at compile time.
//!
//! ## Soundness
//!
//! Visits hold `&mut World`, so no structural change can happen while rows
//! are borrowed. Each visitor receives one exclusive reference per requested
//! type per row. Queries that name a type twice are rejected before any row
//! is visited.

use tracing::trace;

use crate::component::ComponentQuery;
use crate::entity::EntityId;
use crate::world::{ArchetypeList, World};

/// Marker for visitors taking `(EntityId, &mut C1, ..)`.
#[derive(Debug, Clone, Copy)]
pub struct WithEntity;

/// Marker for visitors taking `(&mut C1, ..)`.
#[derive(Debug, Clone, Copy)]
pub struct ComponentsOnly;

/// Something that can be called once per row of an archetype.
///
/// `Marker` is [`WithEntity`] or [`ComponentsOnly`] and is inferred from
/// the closure's parameter list.
pub trait Visitor<Q: ComponentQuery, Marker> {
    /// Call the visitor for every row.
    ///
    /// # Safety
    ///
    /// Every pointer in `columns` must address at least `entities.len()`
    /// initialized values that nothing else references for the duration of
    /// the call, and no two pointers may address the same column.
    unsafe fn visit_rows(&mut self, entities: &[EntityId], columns: Q::Ptrs);
}

macro_rules! impl_visitor {
    ($(($t:ident, $p:ident)),+) => {
        impl<Func, $($t: 'static),+> Visitor<($($t,)+), WithEntity> for Func
        where
            Func: FnMut(EntityId, $(&mut $t),+),
        {
            #[inline]
            unsafe fn visit_rows(
                &mut self,
                entities: &[EntityId],
                columns: <($($t,)+) as ComponentQuery>::Ptrs,
            ) {
                let ($($p,)+) = columns;
                for (row, &entity) in entities.iter().enumerate() {
                    self(entity, $(&mut *$p.add(row)),+);
                }
            }
        }

        impl<Func, $($t: 'static),+> Visitor<($($t,)+), ComponentsOnly> for Func
        where
            Func: FnMut($(&mut $t),+),
        {
            #[inline]
            unsafe fn visit_rows(
                &mut self,
                entities: &[EntityId],
                columns: <($($t,)+) as ComponentQuery>::Ptrs,
            ) {
                let ($($p,)+) = columns;
                for row in 0..entities.len() {
                    self($(&mut *$p.add(row)),+);
                }
            }
        }
    };
}

impl_visitor!((A, a));
impl_visitor!((A, a), (B, b));
impl_visitor!((A, a), (B, b), (C, c));
impl_visitor!((A, a), (B, b), (C, c), (D, d));
impl_visitor!((A, a), (B, b), (C, c), (D, d), (E, e));
impl_visitor!((A, a), (B, b), (C, c), (D, d), (E, e), (F, f));
impl_visitor!((A, a), (B, b), (C, c), (D, d), (E, e), (F, f), (G, g));
impl_visitor!((A, a), (B, b), (C, c), (D, d), (E, e), (F, f), (G, g), (H, h));

impl<L: ArchetypeList> World<L> {
    /// Visit every row of every registered archetype that declares all the
    /// component types of `Q`, archetypes in registration order.
    ///
    /// Archetypes are matched once per call by type id; rows are never
    /// filtered individually. Returns the number of archetypes visited.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names a component type twice.
    pub fn for_each_with_components<Q, M>(&mut self, mut visitor: impl Visitor<Q, M>) -> usize
    where
        Q: ComponentQuery,
    {
        if let Some(name) = Q::duplicate() {
            panic!("query requests component type `{name}` more than once");
        }
        let matched = L::visit_matching::<Q, M, _>(self.archetypes_mut(), &mut visitor);
        trace!(
            query = std::any::type_name::<Q>(),
            archetypes = matched,
            "component query"
        );
        matched
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Health(u32);

    type Moving = (Position, Velocity);
    type Static = (Position,);
    type Living = (Health, Velocity);
    type Demo = (Moving, Static, Living);

    fn populated() -> World<Demo> {
        let mut world = World::new();
        world.create_entity((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }));
        world.create_entity((Position { x: 1.0, y: 1.0 }, Velocity { dx: 0.0, dy: 1.0 }));
        world.create_entity((Position { x: 9.0, y: 9.0 },));
        world.create_entity((Health(10), Velocity { dx: 5.0, dy: 5.0 }));
        world
    }

    #[test]
    fn single_type_query_visits_every_declaring_archetype() {
        let mut world = populated();
        let mut count = 0;
        let matched = world.for_each_with_components(|_: &mut Position| count += 1);
        assert_eq!(count, 3);
        assert_eq!(matched, 2);
    }

    #[test]
    fn multi_type_query_skips_archetypes_missing_a_type() {
        let mut world = populated();
        let mut ids = Vec::new();
        world.for_each_with_components(|id: EntityId, p: &mut Position, v: &mut Velocity| {
            p.x += v.dx;
            p.y += v.dy;
            ids.push(id);
        });
        assert_eq!(ids.len(), 2);
        for id in ids {
            assert!(world.get::<Velocity>(id).is_some());
            assert!(world.get::<Health>(id).is_none());
        }
    }

    #[test]
    fn query_order_need_not_match_declaration_order() {
        let mut world = populated();
        let mut count = 0;
        world.for_each_with_components(|_: &mut Velocity, _: &mut Position| count += 1);
        assert_eq!(count, 2);
    }

    #[test]
    fn query_with_no_matching_archetype_visits_nothing() {
        let mut world = populated();
        let mut count = 0;
        let matched =
            world.for_each_with_components(|_: &mut Health, _: &mut Position| count += 1);
        assert_eq!(count, 0);
        assert_eq!(matched, 0);
    }

    #[test]
    fn query_of_unregistered_component_visits_nothing() {
        let mut world = populated();
        let mut count = 0;
        world.for_each_with_components(|_: &mut String| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn mutations_are_visible_after_query() {
        let mut world = populated();
        world.for_each_with_components(|h: &mut Health| h.0 -= 3);
        let mut remaining = Vec::new();
        world.for_each_with_components(|h: &mut Health| remaining.push(h.0));
        assert_eq!(remaining, vec![7]);
    }

    #[test]
    #[should_panic(expected = "more than once")]
    fn duplicate_query_types_panic() {
        let mut world = populated();
        world.for_each_with_components(|_: &mut Velocity, _: &mut Velocity| {});
    }
}
