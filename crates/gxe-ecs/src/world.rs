//! The [`World`] is the top-level container for the ECS. It owns the id
//! allocator, the location table, and one [`Archetype`] per registered
//! component set.
//!
//! The set of archetypes is fixed by the world's type parameter, a tuple of
//! component-set tuples:
//!
//! ```
//! use gxe_ecs::prelude::*;
//!
//! struct Position(f32, f32);
//! struct Velocity(f32, f32);
//!
//! type Moving = (Position, Velocity);
//! type Scenery = (Position,);
//!
//! let mut world: World<(Moving, Scenery)> = World::new();
//! let ball = world.create_entity((Position(0.0, 0.0), Velocity(1.0, 0.0)));
//! let tree = world.create_entity((Position(4.0, 0.0),));
//!
//! assert_eq!(world.location(ball).map(|l| l.archetype_index), Some(0));
//! assert_eq!(world.location(tree).map(|l| l.archetype_index), Some(1));
//! assert_eq!(world.get_component::<Moving, Velocity, _, _>(ball).0, 1.0);
//! ```
//!
//! Creating an entity of a set the world does not register, or asking an
//! archetype for a type it does not declare, fails to compile. Registering
//! the same component set twice makes selection by that set ambiguous.

use std::any::TypeId;
use std::fmt;

use tracing::trace;

use crate::archetype::{Archetype, DEFAULT_ROW_CAPACITY};
use crate::component::{At, ComponentQuery, ComponentSet, Contains, Subset};
use crate::entity::{EntityId, IdAllocator, DEFAULT_ID_BLOCK_SIZE};
use crate::location::{EntityLocation, LocationTable, DEFAULT_LOCATION_BLOCK_SIZE};
use crate::query::Visitor;
use crate::EcsError;

mod sealed {
    pub trait Sealed {}
    pub trait Slot<S, I> {}
}

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Sizing knobs for a [`World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldConfig {
    /// Ids issued per allocator growth step.
    pub id_block_size: u32,
    /// Slots added per location table growth step.
    pub location_block_size: usize,
    /// Rows reserved by each archetype at construction.
    pub row_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            id_block_size: DEFAULT_ID_BLOCK_SIZE,
            location_block_size: DEFAULT_LOCATION_BLOCK_SIZE,
            row_capacity: DEFAULT_ROW_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// ArchetypeList
// ---------------------------------------------------------------------------

/// An ordered, fixed list of component sets, one archetype each.
///
/// Implemented for tuples of one to eight [`ComponentSet`]s. Dispatch from a
/// runtime archetype index to the typed archetype is a linear scan over the
/// tuple. The trait is sealed; component lookups trust the column pointers
/// it returns.
pub trait ArchetypeList: sealed::Sealed + 'static {
    /// One [`Archetype`] per component set, in declaration order.
    type Storage;

    /// Number of registered archetypes.
    const COUNT: usize;

    /// Empty archetypes with `row_capacity` rows reserved each.
    fn new_storage(row_capacity: usize) -> Self::Storage;

    /// Remove the row of `entity` from the archetype at `archetype_index`.
    ///
    /// # Panics
    ///
    /// Panics if `archetype_index >= COUNT`.
    fn remove_row(
        storage: &mut Self::Storage,
        archetype_index: usize,
        entity: EntityId,
        locations: &mut LocationTable,
    ) -> Option<EntityId>;

    /// Visit every archetype declaring all the types of `Q`. Returns how
    /// many archetypes matched.
    fn visit_matching<Q, M, V>(storage: &mut Self::Storage, visitor: &mut V) -> usize
    where
        Q: ComponentQuery,
        V: Visitor<Q, M>;

    /// Base pointer and row count of the column of `type_id` in the
    /// archetype at `archetype_index`.
    fn column_ptr(
        storage: &Self::Storage,
        archetype_index: usize,
        type_id: TypeId,
    ) -> Option<(*const u8, usize)>;

    /// Mutable form of [`column_ptr`](Self::column_ptr).
    fn column_ptr_mut(
        storage: &mut Self::Storage,
        archetype_index: usize,
        type_id: TypeId,
    ) -> Option<(*mut u8, usize)>;

    /// Row count of the archetype at `archetype_index` (0 if out of range).
    fn len(storage: &Self::Storage, archetype_index: usize) -> usize;

    /// Empty every archetype, reporting each removed entity.
    fn clear(storage: &mut Self::Storage, removed: &mut dyn FnMut(EntityId));
}

/// Compile-time proof that the list registers the component set `S`.
///
/// `I` is the position marker ([`At`]) and is always inferred.
pub trait Registered<S: ComponentSet, I>: ArchetypeList + sealed::Slot<S, I> {
    /// Position of `S` in the list.
    const INDEX: usize;

    /// The archetype storing `S`.
    fn archetype(storage: &Self::Storage) -> &Archetype<S>;

    /// The archetype storing `S`, mutably.
    fn archetype_mut(storage: &mut Self::Storage) -> &mut Archetype<S>;
}

macro_rules! impl_archetype_list {
    ($(($s:ident, $i:tt)),+) => {
        impl<$($s: ComponentSet),+> sealed::Sealed for ($($s,)+) {}

        impl<$($s: ComponentSet),+> ArchetypeList for ($($s,)+) {
            type Storage = ($(Archetype<$s>,)+);

            const COUNT: usize = [$($i),+].len();

            fn new_storage(row_capacity: usize) -> Self::Storage {
                ($(Archetype::<$s>::with_capacity(row_capacity),)+)
            }

            fn remove_row(
                storage: &mut Self::Storage,
                archetype_index: usize,
                entity: EntityId,
                locations: &mut LocationTable,
            ) -> Option<EntityId> {
                $(
                    if archetype_index == $i {
                        return storage.$i.remove_row(entity, locations);
                    }
                )+
                panic!("archetype index {archetype_index} out of range");
            }

            fn visit_matching<Q, M, V>(storage: &mut Self::Storage, visitor: &mut V) -> usize
            where
                Q: ComponentQuery,
                V: Visitor<Q, M>,
            {
                let mut matched = 0;
                $(
                    if storage.$i.visit_if_superset::<Q, M, V>(visitor) {
                        matched += 1;
                    }
                )+
                matched
            }

            fn column_ptr(
                storage: &Self::Storage,
                archetype_index: usize,
                type_id: TypeId,
            ) -> Option<(*const u8, usize)> {
                $(
                    if archetype_index == $i {
                        return storage.$i.column_ptr(type_id);
                    }
                )+
                None
            }

            fn column_ptr_mut(
                storage: &mut Self::Storage,
                archetype_index: usize,
                type_id: TypeId,
            ) -> Option<(*mut u8, usize)> {
                $(
                    if archetype_index == $i {
                        return storage.$i.column_ptr_mut(type_id);
                    }
                )+
                None
            }

            fn len(storage: &Self::Storage, archetype_index: usize) -> usize {
                $(
                    if archetype_index == $i {
                        return storage.$i.len();
                    }
                )+
                0
            }

            fn clear(storage: &mut Self::Storage, removed: &mut dyn FnMut(EntityId)) {
                $(
                    storage.$i.entities().iter().copied().for_each(&mut *removed);
                    storage.$i.clear();
                )+
            }
        }

        impl_archetype_list!(@registered [$($s),+] $(($s, $i))+);
    };

    (@registered $all:tt $(($sel:ident, $i:tt))+) => {
        $(impl_archetype_list!(@registered_one $all $sel $i);)+
    };

    (@registered_one [$($all:ident),+] $sel:ident $i:tt) => {
        impl<$($all: ComponentSet),+> sealed::Slot<$sel, At<$i>> for ($($all,)+) {}

        impl<$($all: ComponentSet),+> Registered<$sel, At<$i>> for ($($all,)+) {
            const INDEX: usize = $i;

            #[inline]
            fn archetype(storage: &Self::Storage) -> &Archetype<$sel> {
                &storage.$i
            }

            #[inline]
            fn archetype_mut(storage: &mut Self::Storage) -> &mut Archetype<$sel> {
                &mut storage.$i
            }
        }
    };
}

impl_archetype_list!((A, 0));
impl_archetype_list!((A, 0), (B, 1));
impl_archetype_list!((A, 0), (B, 1), (C, 2));
impl_archetype_list!((A, 0), (B, 1), (C, 2), (D, 3));
impl_archetype_list!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
impl_archetype_list!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));
impl_archetype_list!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6));
impl_archetype_list!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7));

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The central ECS container.
pub struct World<L: ArchetypeList> {
    allocator: IdAllocator,
    locations: LocationTable,
    archetypes: L::Storage,
    config: WorldConfig,
}

impl<L: ArchetypeList> World<L> {
    /// Create an empty world with the default [`WorldConfig`].
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create an empty world sized by `config`.
    ///
    /// # Panics
    ///
    /// Panics if either block size is zero.
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            allocator: IdAllocator::with_block_size(config.id_block_size),
            locations: LocationTable::with_block_size(config.location_block_size),
            archetypes: L::new_storage(config.row_capacity),
            config,
        }
    }

    /// The configuration this world was built with.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    // -- Entity lifecycle ---------------------------------------------------

    /// Create an entity in the archetype of `S` with the given component
    /// values and return its id.
    pub fn create_entity<S, I>(&mut self, values: S) -> EntityId
    where
        S: ComponentSet,
        L: Registered<S, I>,
    {
        let entity = self.allocator.allocate();
        self.locations.ensure(entity);
        let row = L::archetype_mut(&mut self.archetypes).add_row(entity, values);
        let archetype_index = <L as Registered<S, I>>::INDEX;
        self.locations.insert(
            entity,
            EntityLocation {
                archetype_index,
                row,
            },
        );
        trace!(entity = %entity, archetype = archetype_index, row, "created entity");
        entity
    }

    /// Destroy `entity`, dropping its components and releasing its id.
    ///
    /// Returns `false` without doing anything if `entity` is not live, so
    /// destroying twice or destroying an id that was never issued is safe.
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        let Some(location) = self.locations.get(entity) else {
            trace!(entity = %entity, "destroy of invalid entity ignored");
            return false;
        };
        let moved = L::remove_row(
            &mut self.archetypes,
            location.archetype_index,
            entity,
            &mut self.locations,
        );
        self.locations.invalidate(entity);
        self.allocator.release(entity);
        trace!(
            entity = %entity,
            archetype = location.archetype_index,
            row = location.row,
            moved = ?moved,
            "destroyed entity"
        );
        true
    }

    /// Destroy every live entity and release all their ids.
    pub fn clear(&mut self) {
        let allocator = &mut self.allocator;
        let locations = &mut self.locations;
        let mut removed = 0usize;
        L::clear(&mut self.archetypes, &mut |entity: EntityId| {
            locations.invalidate(entity);
            allocator.release(entity);
            removed += 1;
        });
        trace!(removed, "cleared world");
    }

    // -- Lookups --------------------------------------------------------------

    /// Whether `entity` is live.
    #[inline]
    pub fn is_valid(&self, entity: EntityId) -> bool {
        self.locations.is_valid(entity)
    }

    /// Number of live entities.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.allocator.outstanding()
    }

    /// Archetype index and row of `entity`, if live.
    #[inline]
    pub fn location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.locations.get(entity)
    }

    /// Number of registered archetypes.
    pub fn archetype_count(&self) -> usize {
        L::COUNT
    }

    /// The archetype storing `S`.
    pub fn archetype<S, I>(&self) -> &Archetype<S>
    where
        S: ComponentSet,
        L: Registered<S, I>,
    {
        L::archetype(&self.archetypes)
    }

    /// The archetype storing `S`, mutably.
    ///
    /// Component values may be edited in place. Rows are only added or
    /// removed through the world's lifecycle methods:
    ///
    /// ```compile_fail
    /// use gxe_ecs::prelude::*;
    ///
    /// let mut world: World<((u8,),)> = World::new();
    /// world.archetype_mut::<(u8,), _>().clear();
    /// ```
    pub fn archetype_mut<S, I>(&mut self) -> &mut Archetype<S>
    where
        S: ComponentSet,
        L: Registered<S, I>,
    {
        L::archetype_mut(&mut self.archetypes)
    }

    /// The id allocator, for diagnostics.
    pub fn allocator(&self) -> &IdAllocator {
        &self.allocator
    }

    /// The location table, for diagnostics.
    pub fn locations(&self) -> &LocationTable {
        &self.locations
    }

    // -- Typed component access ---------------------------------------------

    /// The `T` component of `entity`, which must live in the archetype of `S`.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidEntity`] if `entity` is not live,
    /// [`EcsError::WrongArchetype`] if it lives in another archetype.
    pub fn try_get_component<S, T, I, J>(&self, entity: EntityId) -> Result<&T, EcsError>
    where
        S: Contains<T, J>,
        L: Registered<S, I>,
    {
        self.check_archetype::<S, I>(entity)?;
        Ok(L::archetype(&self.archetypes).get_component::<T, J>(entity, &self.locations))
    }

    /// Mutable form of [`try_get_component`](Self::try_get_component).
    ///
    /// # Errors
    ///
    /// Same as [`try_get_component`](Self::try_get_component).
    pub fn try_get_component_mut<S, T, I, J>(
        &mut self,
        entity: EntityId,
    ) -> Result<&mut T, EcsError>
    where
        S: Contains<T, J>,
        L: Registered<S, I>,
    {
        self.check_archetype::<S, I>(entity)?;
        let archetype = L::archetype_mut(&mut self.archetypes);
        Ok(archetype.get_component_mut::<T, J>(entity, &self.locations))
    }

    /// The `T` component of `entity`, which must live in the archetype of `S`.
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not live or lives in another archetype.
    pub fn get_component<S, T, I, J>(&self, entity: EntityId) -> &T
    where
        S: Contains<T, J>,
        L: Registered<S, I>,
    {
        self.try_get_component::<S, T, I, J>(entity)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Mutable form of [`get_component`](Self::get_component).
    ///
    /// # Panics
    ///
    /// Panics if `entity` is not live or lives in another archetype.
    pub fn get_component_mut<S, T, I, J>(&mut self, entity: EntityId) -> &mut T
    where
        S: Contains<T, J>,
        L: Registered<S, I>,
    {
        self.try_get_component_mut::<S, T, I, J>(entity)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    // -- Archetype-agnostic component access ---------------------------------

    /// The `T` component of `entity` wherever it lives, or `None` if the
    /// entity is not live or its archetype does not declare `T`.
    pub fn get<T: 'static>(&self, entity: EntityId) -> Option<&T> {
        let location = self.locations.get(entity)?;
        let (base, len) =
            L::column_ptr(&self.archetypes, location.archetype_index, TypeId::of::<T>())?;
        assert!(location.row < len, "location of {entity:?} points past its archetype");
        // SAFETY: `base` is the start of the `Vec<T>` column whose element
        // type id matched `T`, and `row < len` keeps the read in bounds. The
        // returned borrow is tied to `&self`.
        Some(unsafe { &*base.cast::<T>().add(location.row) })
    }

    /// Mutable form of [`get`](Self::get).
    pub fn get_mut<T: 'static>(&mut self, entity: EntityId) -> Option<&mut T> {
        let location = self.locations.get(entity)?;
        let (base, len) =
            L::column_ptr_mut(&mut self.archetypes, location.archetype_index, TypeId::of::<T>())?;
        assert!(location.row < len, "location of {entity:?} points past its archetype");
        // SAFETY: as in `get`; `&mut self` makes the borrow exclusive.
        Some(unsafe { &mut *base.cast::<T>().add(location.row) })
    }

    // -- Single-archetype iteration ------------------------------------------

    /// Visit every row of the archetype of `S` with all its components.
    pub fn for_each<S, I, M>(&mut self, visitor: impl Visitor<S, M>)
    where
        S: ComponentSet,
        L: Registered<S, I>,
    {
        L::archetype_mut(&mut self.archetypes).for_each(visitor);
    }

    /// Visit every row of the archetype of `S` with the components of `Q`.
    pub fn for_each_with<S, Q, I, J, M>(&mut self, visitor: impl Visitor<Q, M>)
    where
        S: ComponentSet,
        Q: Subset<S, J>,
        L: Registered<S, I>,
    {
        L::archetype_mut(&mut self.archetypes).for_each_with::<Q, J, M>(visitor);
    }

    pub(crate) fn archetypes_mut(&mut self) -> &mut L::Storage {
        &mut self.archetypes
    }

    fn check_archetype<S, I>(&self, entity: EntityId) -> Result<(), EcsError>
    where
        S: ComponentSet,
        L: Registered<S, I>,
    {
        let location = self
            .locations
            .get(entity)
            .ok_or(EcsError::InvalidEntity { entity })?;
        let expected = <L as Registered<S, I>>::INDEX;
        if location.archetype_index != expected {
            return Err(EcsError::WrongArchetype {
                entity,
                expected,
                actual: location.archetype_index,
            });
        }
        Ok(())
    }
}

impl<L: ArchetypeList> Default for World<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ArchetypeList> fmt::Debug for World<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sizes: Vec<usize> = (0..L::COUNT)
            .map(|index| L::len(&self.archetypes, index))
            .collect();
        f.debug_struct("World")
            .field("entity_count", &self.entity_count())
            .field("archetype_sizes", &sizes)
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
