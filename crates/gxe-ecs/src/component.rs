//! Component sets: the statically declared column layout of an archetype.
//!
//! An archetype is declared as a tuple of component types, e.g.
//! `(Position, Velocity)`. Three traits are implemented for tuples of up to
//! eight types:
//!
//! - [`ComponentSet`] owns the columns (`(Vec<Position>, Vec<Velocity>)`) and
//!   performs row-wise push and swap-remove across all of them.
//! - [`Contains<T, At<N>>`](Contains) is implemented once per declared type,
//!   with the type's tuple position as a marker. Asking for a column the set
//!   does not declare fails to compile, and the marker is inferred at call
//!   sites (`archetype.column::<Position, _>()`).
//! - [`ComponentQuery`] describes a request for some component types, used by
//!   visitors. [`Subset`] ties a query to an archetype at compile time; the
//!   erased [`ComponentQuery::fetch_erased`] path lets the world test every
//!   registered archetype against a query by type id.
//!
//! Components are any `'static` type. No registration step exists.
//!
//! All of these traits are sealed. Storage and visits trust the column
//! pointers they hand out, so only the tuple impls in this module exist:
//!
//! ```compile_fail
//! use gxe_ecs::component::{ComponentQuery, ComponentSet};
//!
//! struct Liar;
//!
//! impl ComponentQuery for Liar {
//!     type Ptrs = ();
//!     fn duplicate() -> Option<&'static str> {
//!         None
//!     }
//!     fn fetch_erased<S: ComponentSet>(_: &mut S::Columns) -> Option<()> {
//!         Some(())
//!     }
//! }
//! ```

use std::any::{type_name, TypeId};

mod sealed {
    pub trait Sealed {}
    pub trait Member<T, I> {}
    pub trait Within<S, I> {}
}

/// Position marker for [`Contains`] and world registration.
///
/// `At<N>` names the `N`th element of a tuple. Callers never write it out;
/// it is inferred through `_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct At<const N: usize>;

// ---------------------------------------------------------------------------
// ComponentQuery
// ---------------------------------------------------------------------------

/// A tuple of component types requested together.
pub trait ComponentQuery: sealed::Sealed + 'static {
    /// One column base pointer per requested type, in request order.
    type Ptrs: Copy;

    /// Name of the first type that appears more than once, if any.
    ///
    /// Two exclusive references into the same column would alias, so
    /// duplicated queries are rejected before any row is visited.
    fn duplicate() -> Option<&'static str>;

    /// Column pointers for every requested type, or `None` if the set `S`
    /// does not declare all of them.
    fn fetch_erased<S: ComponentSet>(columns: &mut S::Columns) -> Option<Self::Ptrs>;
}

// ---------------------------------------------------------------------------
// ComponentSet
// ---------------------------------------------------------------------------

/// A tuple of component types declared by an archetype, with its columnar
/// storage.
///
/// Every method that changes the length of the columns changes all of them
/// together, so all columns always hold the same number of rows.
pub trait ComponentSet: ComponentQuery + Sized {
    /// One `Vec` per declared component type.
    type Columns;

    /// Empty columns with room for `capacity` rows each.
    fn new_columns(capacity: usize) -> Self::Columns;

    /// Whether the set declares the component type `type_id`.
    fn declares(type_id: TypeId) -> bool;

    /// Append one row.
    fn push(columns: &mut Self::Columns, values: Self);

    /// Move the last row into `row` in every column, dropping the values
    /// that were there, and shorten every column by one.
    fn swap_remove(columns: &mut Self::Columns, row: usize);

    /// Drop every row.
    fn clear(columns: &mut Self::Columns);

    /// Base pointer of the column holding `type_id`, if declared.
    fn column_ptr(columns: &Self::Columns, type_id: TypeId) -> Option<*const u8>;

    /// Mutable base pointer of the column holding `type_id`, if declared.
    fn column_ptr_mut(columns: &mut Self::Columns, type_id: TypeId) -> Option<*mut u8>;

    /// Base pointers of every column, in declaration order.
    fn column_ptrs(columns: &mut Self::Columns) -> Self::Ptrs;
}

/// Compile-time proof that a component set declares `T`.
///
/// `I` is the position marker ([`At`]) and is always inferred.
pub trait Contains<T, I>: ComponentSet + sealed::Member<T, I> {
    /// The column of `T` values.
    fn column(columns: &Self::Columns) -> &[T];

    /// The column of `T` values, mutably.
    fn column_mut(columns: &mut Self::Columns) -> &mut [T];
}

/// Compile-time proof that the set `S` declares every type of this query.
///
/// `I` is a tuple of position markers, one per requested type.
pub trait Subset<S: ComponentSet, I>: ComponentQuery + sealed::Within<S, I> {
    /// Column pointers for the requested types, in request order.
    fn fetch(columns: &mut S::Columns) -> Self::Ptrs;
}

// ---------------------------------------------------------------------------
// Tuple implementations
// ---------------------------------------------------------------------------

macro_rules! impl_component_tuple {
    ($(($t:ident, $v:ident, $i:tt)),+) => {
        impl<$($t: 'static),+> sealed::Sealed for ($($t,)+) {}

        impl<$($t: 'static),+> ComponentQuery for ($($t,)+) {
            type Ptrs = ($(*mut $t,)+);

            fn duplicate() -> Option<&'static str> {
                let ids = [$(TypeId::of::<$t>()),+];
                let names = [$(type_name::<$t>()),+];
                (0..ids.len())
                    .find(|&i| ids[..i].contains(&ids[i]))
                    .map(|i| names[i])
            }

            fn fetch_erased<Set: ComponentSet>(columns: &mut Set::Columns) -> Option<Self::Ptrs> {
                Some(($(
                    Set::column_ptr_mut(columns, TypeId::of::<$t>())?.cast::<$t>(),
                )+))
            }
        }

        impl<$($t: 'static),+> ComponentSet for ($($t,)+) {
            type Columns = ($(Vec<$t>,)+);

            fn new_columns(capacity: usize) -> Self::Columns {
                ($(Vec::<$t>::with_capacity(capacity),)+)
            }

            fn declares(type_id: TypeId) -> bool {
                $(TypeId::of::<$t>() == type_id)||+
            }

            #[inline]
            fn push(columns: &mut Self::Columns, values: Self) {
                let ($($v,)+) = values;
                $(columns.$i.push($v);)+
            }

            #[inline]
            fn swap_remove(columns: &mut Self::Columns, row: usize) {
                $(columns.$i.swap_remove(row);)+
            }

            fn clear(columns: &mut Self::Columns) {
                $(columns.$i.clear();)+
            }

            fn column_ptr(columns: &Self::Columns, type_id: TypeId) -> Option<*const u8> {
                $(
                    if TypeId::of::<$t>() == type_id {
                        return Some(columns.$i.as_ptr().cast::<u8>());
                    }
                )+
                None
            }

            fn column_ptr_mut(columns: &mut Self::Columns, type_id: TypeId) -> Option<*mut u8> {
                $(
                    if TypeId::of::<$t>() == type_id {
                        return Some(columns.$i.as_mut_ptr().cast::<u8>());
                    }
                )+
                None
            }

            #[inline]
            fn column_ptrs(columns: &mut Self::Columns) -> Self::Ptrs {
                ($(columns.$i.as_mut_ptr(),)+)
            }
        }

        impl_component_tuple!(@contains [$($t),+] $(($t, $i))+);
    };

    (@contains $all:tt $(($sel:ident, $i:tt))+) => {
        $(impl_component_tuple!(@contains_one $all $sel $i);)+
    };

    (@contains_one [$($all:ident),+] $sel:ident $i:tt) => {
        impl<$($all: 'static),+> sealed::Member<$sel, At<$i>> for ($($all,)+) {}

        impl<$($all: 'static),+> Contains<$sel, At<$i>> for ($($all,)+) {
            #[inline]
            fn column(columns: &Self::Columns) -> &[$sel] {
                &columns.$i
            }

            #[inline]
            fn column_mut(columns: &mut Self::Columns) -> &mut [$sel] {
                &mut columns.$i
            }
        }
    };
}

impl_component_tuple!((A, a, 0));
impl_component_tuple!((A, a, 0), (B, b, 1));
impl_component_tuple!((A, a, 0), (B, b, 1), (C, c, 2));
impl_component_tuple!((A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3));
impl_component_tuple!((A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3), (E, e, 4));
impl_component_tuple!((A, a, 0), (B, b, 1), (C, c, 2), (D, d, 3), (E, e, 4), (F, f, 5));
impl_component_tuple!(
    (A, a, 0),
    (B, b, 1),
    (C, c, 2),
    (D, d, 3),
    (E, e, 4),
    (F, f, 5),
    (G, g, 6)
);
impl_component_tuple!(
    (A, a, 0),
    (B, b, 1),
    (C, c, 2),
    (D, d, 3),
    (E, e, 4),
    (F, f, 5),
    (G, g, 6),
    (H, h, 7)
);

macro_rules! impl_subset {
    ($(($t:ident, $idx:ident)),+) => {
        impl<Set, $($t: 'static, $idx),+> sealed::Within<Set, ($($idx,)+)> for ($($t,)+)
        where
            Set: ComponentSet $(+ Contains<$t, $idx>)+,
        {
        }

        impl<Set, $($t: 'static, $idx),+> Subset<Set, ($($idx,)+)> for ($($t,)+)
        where
            Set: ComponentSet $(+ Contains<$t, $idx>)+,
        {
            #[inline]
            fn fetch(columns: &mut Set::Columns) -> Self::Ptrs {
                ($(<Set as Contains<$t, $idx>>::column_mut(columns).as_mut_ptr(),)+)
            }
        }
    };
}

impl_subset!((A, IA));
impl_subset!((A, IA), (B, IB));
impl_subset!((A, IA), (B, IB), (C, IC));
impl_subset!((A, IA), (B, IB), (C, IC), (D, ID));
impl_subset!((A, IA), (B, IB), (C, IC), (D, ID), (E, IE));
impl_subset!((A, IA), (B, IB), (C, IC), (D, ID), (E, IE), (F, IF));
impl_subset!((A, IA), (B, IB), (C, IC), (D, ID), (E, IE), (F, IF), (G, IG));
impl_subset!((A, IA), (B, IB), (C, IC), (D, ID), (E, IE), (F, IF), (G, IG), (H, IH));

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
