//! Archetype storage for the ECS.
//!
//! An [`Archetype<S>`] stores every entity created with the component set `S`.
//! Components are laid out Structure-of-Arrays: one typed `Vec` per declared
//! component type, plus a parallel `Vec<EntityId>` mapping row index to entity.
//! Row `i` of every column belongs to `entities[i]`.
//!
//! Rows are removed by swap-and-pop, so row order is stable between
//! mutations but is not creation order. When a removal moves another entity
//! into the vacated row, the archetype updates that entity's entry in the
//! [`LocationTable`] it was handed.
//!
//! # Safety
//!
//! Visits hand raw column pointers to a [`Visitor`]. They are derived from
//! `&mut self`, cover exactly `len()` initialized rows, and queries naming a
//! type twice are rejected before the visit starts.
// Note: unsafe_code is allowed on this module via #[allow(unsafe_code)] in lib.rs

use std::any::TypeId;
use std::fmt;

use crate::component::{ComponentQuery, ComponentSet, Contains, Subset};
use crate::entity::EntityId;
use crate::location::LocationTable;
use crate::query::Visitor;
use crate::EcsError;

/// Rows reserved by a freshly constructed archetype.
pub const DEFAULT_ROW_CAPACITY: usize = 128;

/// Columnar storage for all entities sharing the component set `S`.
pub struct Archetype<S: ComponentSet> {
    /// Entity at each row.
    entities: Vec<EntityId>,
    /// One column per declared component type.
    columns: S::Columns,
}

impl<S: ComponentSet> Archetype<S> {
    /// Create an empty archetype with [`DEFAULT_ROW_CAPACITY`] rows reserved.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ROW_CAPACITY)
    }

    /// Create an empty archetype with `capacity` rows reserved.
    ///
    /// # Panics
    ///
    /// Panics if `S` declares the same component type twice.
    pub fn with_capacity(capacity: usize) -> Self {
        if let Some(name) = S::duplicate() {
            panic!("archetype declares component type `{name}` more than once");
        }
        Self {
            entities: Vec::with_capacity(capacity),
            columns: S::new_columns(capacity),
        }
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the archetype holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity ids in row order.
    #[inline]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// The entity stored at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= len()`.
    #[inline]
    pub fn entity_at(&self, row: usize) -> EntityId {
        self.entities[row]
    }

    /// Whether `entity` has a valid location pointing into this archetype.
    pub fn contains(&self, entity: EntityId, locations: &LocationTable) -> bool {
        locations
            .get(entity)
            .is_some_and(|location| self.entities.get(location.row) == Some(&entity))
    }

    /// Typed read access to the column of `T`.
    #[inline]
    pub fn column<T, I>(&self) -> &[T]
    where
        S: Contains<T, I>,
    {
        S::column(&self.columns)
    }

    /// Append a row and return its index.
    ///
    /// Does not check whether `entity` is already stored here; the caller
    /// records the returned row in the location table.
    pub(crate) fn add_row(&mut self, entity: EntityId, values: S) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        S::push(&mut self.columns, values);
        row
    }

    /// Remove the row of `entity` by swap-and-pop.
    ///
    /// If another entity was moved into the vacated row, its location entry
    /// is updated and it is returned. An entity with no valid location is a
    /// no-op returning `None`.
    ///
    /// # Panics
    ///
    /// Panics if the location of `entity` names a row of this archetype that
    /// holds a different entity.
    pub(crate) fn remove_row(
        &mut self,
        entity: EntityId,
        locations: &mut LocationTable,
    ) -> Option<EntityId> {
        let row = locations.get(entity)?.row;
        assert!(
            self.entities.get(row) == Some(&entity),
            "entity {entity:?} is not stored at row {row} of this archetype"
        );

        let last = self.entities.len() - 1;
        self.entities.swap_remove(row);
        S::swap_remove(&mut self.columns, row);

        if row == last {
            return None;
        }
        let moved = self.entities[row];
        locations.update_row(moved, row);
        Some(moved)
    }

    /// Shared reference to the `T` component of `entity`.
    ///
    /// # Panics
    ///
    /// Panics if `entity` has no valid row in this archetype.
    pub fn get_component<T, I>(&self, entity: EntityId, locations: &LocationTable) -> &T
    where
        S: Contains<T, I>,
    {
        let row = self.row_of(entity, locations);
        &S::column(&self.columns)[row]
    }

    /// Exclusive reference to the `T` component of `entity`.
    ///
    /// # Panics
    ///
    /// Panics if `entity` has no valid row in this archetype.
    pub fn get_component_mut<T, I>(
        &mut self,
        entity: EntityId,
        locations: &LocationTable,
    ) -> &mut T
    where
        S: Contains<T, I>,
    {
        let row = self.row_of(entity, locations);
        &mut S::column_mut(&mut self.columns)[row]
    }

    /// Visit every row in storage order with every declared component.
    ///
    /// # Panics
    ///
    /// Panics if the visitor names a component type twice.
    pub fn for_each<M>(&mut self, mut visitor: impl Visitor<S, M>) {
        let columns = S::column_ptrs(&mut self.columns);
        self.visit::<S, M, _>(columns, &mut visitor);
    }

    /// Visit every row in storage order with the components named by `Q`.
    ///
    /// Naming a type that `S` does not declare is a compile error.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names a component type twice.
    pub fn for_each_with<Q, I, M>(&mut self, mut visitor: impl Visitor<Q, M>)
    where
        Q: Subset<S, I>,
    {
        let columns = Q::fetch(&mut self.columns);
        self.visit::<Q, M, _>(columns, &mut visitor);
    }

    /// Visit this archetype if it declares every type of `Q`. Returns whether
    /// it did.
    pub(crate) fn visit_if_superset<Q, M, V>(&mut self, visitor: &mut V) -> bool
    where
        Q: ComponentQuery,
        V: Visitor<Q, M>,
    {
        match Q::fetch_erased::<S>(&mut self.columns) {
            Some(columns) => {
                self.visit::<Q, M, V>(columns, visitor);
                true
            }
            None => false,
        }
    }

    /// Base pointer and length of the column holding `type_id`, if declared.
    pub(crate) fn column_ptr(&self, type_id: TypeId) -> Option<(*const u8, usize)> {
        S::column_ptr(&self.columns, type_id).map(|ptr| (ptr, self.len()))
    }

    /// Mutable base pointer and length of the column holding `type_id`.
    pub(crate) fn column_ptr_mut(&mut self, type_id: TypeId) -> Option<(*mut u8, usize)> {
        let len = self.len();
        S::column_ptr_mut(&mut self.columns, type_id).map(|ptr| (ptr, len))
    }

    /// Drop every row.
    ///
    /// Location entries of the removed entities are left to the caller.
    pub(crate) fn clear(&mut self) {
        self.entities.clear();
        S::clear(&mut self.columns);
    }

    fn row_of(&self, entity: EntityId, locations: &LocationTable) -> usize {
        match locations.get(entity) {
            Some(location) if self.entities.get(location.row) == Some(&entity) => location.row,
            Some(_) => panic!("entity {entity:?} is not stored in this archetype"),
            None => panic!("{}", EcsError::InvalidEntity { entity }),
        }
    }

    fn visit<Q, M, V>(&mut self, columns: Q::Ptrs, visitor: &mut V)
    where
        Q: ComponentQuery,
        V: Visitor<Q, M>,
    {
        if let Some(name) = Q::duplicate() {
            panic!("query requests component type `{name}` more than once");
        }
        // SAFETY: `columns` were taken from `self.columns`, which holds
        // `self.entities.len()` initialized rows per column and stays
        // exclusively borrowed for the whole call. `Q` has no repeated type,
        // so no two pointers address the same column.
        unsafe { visitor.visit_rows(&self.entities, columns) }
    }
}

impl<S: ComponentSet> Default for Archetype<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ComponentSet> fmt::Debug for Archetype<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("components", &std::any::type_name::<S>())
            .field("len", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::EntityLocation;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    type Body = (Pos, Vel);

    fn pos(x: f32, y: f32) -> Pos {
        Pos { x, y }
    }

    fn vel(dx: f32, dy: f32) -> Vel {
        Vel { dx, dy }
    }

    /// Add a row and record its location the way the world does.
    fn spawn(
        archetype: &mut Archetype<Body>,
        locations: &mut LocationTable,
        raw: u32,
        p: Pos,
        v: Vel,
    ) -> EntityId {
        let entity = EntityId::from_raw(raw);
        let row = archetype.add_row(entity, (p, v));
        locations.insert(
            entity,
            EntityLocation {
                archetype_index: 0,
                row,
            },
        );
        entity
    }

    #[test]
    fn add_row_returns_sequential_rows() {
        let mut archetype = Archetype::<Body>::new();
        assert_eq!(archetype.add_row(EntityId::from_raw(5), (pos(0.0, 0.0), vel(0.0, 0.0))), 0);
        assert_eq!(archetype.add_row(EntityId::from_raw(9), (pos(1.0, 0.0), vel(0.0, 0.0))), 1);
        assert_eq!(archetype.len(), 2);
        assert_eq!(archetype.entity_at(1), EntityId::from_raw(9));
        assert_eq!(archetype.column::<Pos, _>()[1], pos(1.0, 0.0));
    }

    #[test]
    fn remove_middle_row_swaps_last_in() {
        let mut archetype = Archetype::<Body>::new();
        let mut locations = LocationTable::new();
        let a = spawn(&mut archetype, &mut locations, 1, pos(0.0, 0.0), vel(0.0, 0.0));
        let b = spawn(&mut archetype, &mut locations, 2, pos(1.0, 1.0), vel(1.0, 1.0));
        let c = spawn(&mut archetype, &mut locations, 3, pos(2.0, 2.0), vel(2.0, 2.0));

        let moved = archetype.remove_row(b, &mut locations);
        locations.invalidate(b);

        assert_eq!(moved, Some(c));
        assert_eq!(archetype.len(), 2);
        assert_eq!(archetype.entities(), &[a, c]);
        assert_eq!(locations.get(c).map(|l| l.row), Some(1));
        assert_eq!(*archetype.get_component::<Pos, _>(c, &locations), pos(2.0, 2.0));
        assert_eq!(*archetype.get_component::<Vel, _>(c, &locations), vel(2.0, 2.0));
        assert_eq!(*archetype.get_component::<Pos, _>(a, &locations), pos(0.0, 0.0));
    }

    #[test]
    fn remove_last_row_moves_nothing() {
        let mut archetype = Archetype::<Body>::new();
        let mut locations = LocationTable::new();
        let a = spawn(&mut archetype, &mut locations, 1, pos(0.0, 0.0), vel(0.0, 0.0));
        let b = spawn(&mut archetype, &mut locations, 2, pos(1.0, 1.0), vel(1.0, 1.0));

        assert_eq!(archetype.remove_row(b, &mut locations), None);
        assert_eq!(archetype.entities(), &[a]);
        assert_eq!(locations.get(a).map(|l| l.row), Some(0));
    }

    #[test]
    fn remove_unknown_entity_is_noop() {
        let mut archetype = Archetype::<Body>::new();
        let mut locations = LocationTable::new();
        spawn(&mut archetype, &mut locations, 1, pos(0.0, 0.0), vel(0.0, 0.0));
        assert_eq!(archetype.remove_row(EntityId::from_raw(77), &mut locations), None);
        assert_eq!(archetype.len(), 1);
    }

    #[test]
    #[should_panic(expected = "is not stored at row")]
    fn remove_with_foreign_location_panics() {
        let mut archetype = Archetype::<Body>::new();
        let mut locations = LocationTable::new();
        spawn(&mut archetype, &mut locations, 1, pos(0.0, 0.0), vel(0.0, 0.0));
        // Location claims row 0, which holds entity 1.
        locations.insert(
            EntityId::from_raw(2),
            EntityLocation {
                archetype_index: 0,
                row: 0,
            },
        );
        archetype.remove_row(EntityId::from_raw(2), &mut locations);
    }

    #[test]
    fn get_component_mut_writes_through() {
        let mut archetype = Archetype::<Body>::new();
        let mut locations = LocationTable::new();
        let a = spawn(&mut archetype, &mut locations, 1, pos(0.0, 0.0), vel(3.0, 4.0));
        archetype.get_component_mut::<Pos, _>(a, &locations).x = 10.0;
        assert_eq!(archetype.get_component::<Pos, _>(a, &locations).x, 10.0);
    }

    #[test]
    #[should_panic(expected = "no valid location")]
    fn get_component_of_dead_entity_panics() {
        let archetype = Archetype::<Body>::new();
        let locations = LocationTable::new();
        archetype.get_component::<Pos, _>(EntityId::from_raw(3), &locations);
    }

    #[test]
    fn for_each_visits_rows_with_ids() {
        let mut archetype = Archetype::<Body>::new();
        let mut locations = LocationTable::new();
        spawn(&mut archetype, &mut locations, 1, pos(0.0, 0.0), vel(1.0, 0.0));
        spawn(&mut archetype, &mut locations, 2, pos(5.0, 5.0), vel(0.0, 1.0));

        let mut seen = Vec::new();
        archetype.for_each(|entity: EntityId, p: &mut Pos, v: &mut Vel| {
            p.x += v.dx;
            p.y += v.dy;
            seen.push(entity.to_raw());
        });

        assert_eq!(seen, vec![1, 2]);
        assert_eq!(archetype.column::<Pos, _>(), &[pos(1.0, 0.0), pos(5.0, 6.0)]);
    }

    #[test]
    fn for_each_with_subset_without_ids() {
        let mut archetype = Archetype::<Body>::new();
        let mut locations = LocationTable::new();
        spawn(&mut archetype, &mut locations, 1, pos(0.0, 0.0), vel(1.0, 2.0));

        archetype.for_each_with::<(Vel,), _, _>(|v: &mut Vel| v.dy = -v.dy);
        assert_eq!(archetype.column::<Vel, _>()[0], vel(1.0, -2.0));
    }

    #[test]
    fn for_each_on_empty_archetype_does_not_call_visitor() {
        let mut archetype = Archetype::<Body>::new();
        let mut calls = 0;
        archetype.for_each(|_: &mut Pos, _: &mut Vel| calls += 1);
        assert_eq!(calls, 0);
    }

    #[test]
    #[should_panic(expected = "more than once")]
    fn duplicate_declaration_rejected() {
        let _ = Archetype::<(Pos, Pos)>::new();
    }

    #[test]
    #[should_panic(expected = "more than once")]
    fn duplicate_query_rejected() {
        let mut archetype = Archetype::<Body>::new();
        archetype.for_each_with::<(Pos, Pos), _, _>(|_: &mut Pos, _: &mut Pos| {});
    }

    #[test]
    fn contains_checks_location_and_row() {
        let mut archetype = Archetype::<Body>::new();
        let mut locations = LocationTable::new();
        let a = spawn(&mut archetype, &mut locations, 1, pos(0.0, 0.0), vel(0.0, 0.0));
        assert!(archetype.contains(a, &locations));
        assert!(!archetype.contains(EntityId::from_raw(2), &locations));
    }

    #[test]
    fn clear_drops_all_rows() {
        let mut archetype = Archetype::<Body>::new();
        let mut locations = LocationTable::new();
        spawn(&mut archetype, &mut locations, 1, pos(0.0, 0.0), vel(0.0, 0.0));
        archetype.clear();
        assert!(archetype.is_empty());
        assert!(archetype.column::<Vel, _>().is_empty());
    }
}
