//! The entity location table: entity id -> (archetype index, row).
//!
//! The table is a dense `Vec` indexed by [`EntityId::index`]. It grows in
//! fixed-size blocks whenever an id lands past its end, and every new slot
//! starts out invalid.

use tracing::debug;

use crate::entity::EntityId;

/// Slots added per growth step.
pub const DEFAULT_LOCATION_BLOCK_SIZE: usize = 1024;

/// Where an entity lives: which registered archetype and which row within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    /// Position of the archetype in the world's ordered archetype list.
    pub archetype_index: usize,
    /// Row within that archetype's columns.
    pub row: usize,
}

/// Id-indexed table of [`EntityLocation`]s.
///
/// Archetype storage receives this table explicitly whenever it needs to
/// resolve or relocate a row, so storage never holds a reference back to the
/// world that owns it.
#[derive(Debug, Clone)]
pub struct LocationTable {
    entries: Vec<Option<EntityLocation>>,
    block_size: usize,
}

impl LocationTable {
    /// Create a table that grows by [`DEFAULT_LOCATION_BLOCK_SIZE`] slots.
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_LOCATION_BLOCK_SIZE)
    }

    /// Create a table that grows by `block_size` slots, with one block
    /// reserved up front.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn with_block_size(block_size: usize) -> Self {
        assert!(block_size > 0, "location block size must be non-zero");
        Self {
            entries: Vec::with_capacity(block_size),
            block_size,
        }
    }

    /// Number of slots currently addressable without growing.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Make sure `entity` has a slot, growing to `entity + block_size` slots
    /// if it does not.
    pub fn ensure(&mut self, entity: EntityId) {
        let index = entity.index();
        if index < self.entries.len() {
            return;
        }
        let new_len = index + self.block_size;
        self.entries.resize(new_len, None);
        debug!(entity = %entity, capacity = new_len, "grew entity location table");
    }

    /// The location of `entity`, or `None` if it has no valid entry.
    #[inline]
    pub fn get(&self, entity: EntityId) -> Option<EntityLocation> {
        self.entries.get(entity.index()).copied().flatten()
    }

    /// Whether `entity` has a valid entry.
    #[inline]
    pub fn is_valid(&self, entity: EntityId) -> bool {
        self.get(entity).is_some()
    }

    /// Record the location of `entity`, growing the table if needed.
    pub fn insert(&mut self, entity: EntityId, location: EntityLocation) {
        self.ensure(entity);
        self.entries[entity.index()] = Some(location);
    }

    /// Invalidate the entry for `entity`, returning what it held.
    pub fn invalidate(&mut self, entity: EntityId) -> Option<EntityLocation> {
        self.entries.get_mut(entity.index()).and_then(Option::take)
    }

    /// Point `entity` at a new row within the same archetype.
    ///
    /// Called after a swap-and-pop moved `entity` into a vacated slot.
    ///
    /// # Panics
    ///
    /// Panics if `entity` has no valid entry; a relocated row always belongs
    /// to a live entity.
    pub fn update_row(&mut self, entity: EntityId, row: usize) {
        match self.entries.get_mut(entity.index()) {
            Some(Some(location)) => location.row = row,
            _ => panic!("relocated entity {entity:?} has no valid location"),
        }
    }

    /// Invalidate every entry without releasing the table's memory.
    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|entry| *entry = None);
    }
}

impl Default for LocationTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(archetype_index: usize, row: usize) -> EntityLocation {
        EntityLocation {
            archetype_index,
            row,
        }
    }

    #[test]
    fn entries_default_to_invalid() {
        let mut table = LocationTable::with_block_size(8);
        table.ensure(EntityId::from_raw(3));
        assert_eq!(table.get(EntityId::from_raw(0)), None);
        assert_eq!(table.get(EntityId::from_raw(3)), None);
        // Past the end is also invalid, not a panic.
        assert_eq!(table.get(EntityId::from_raw(500)), None);
    }

    #[test]
    fn grows_to_id_plus_block() {
        let mut table = LocationTable::with_block_size(16);
        assert_eq!(table.capacity(), 0);
        table.insert(EntityId::from_raw(20), loc(0, 0));
        assert_eq!(table.capacity(), 36);
        // Ids inside the current capacity do not grow the table.
        table.insert(EntityId::from_raw(35), loc(0, 1));
        assert_eq!(table.capacity(), 36);
    }

    #[test]
    fn insert_update_invalidate() {
        let mut table = LocationTable::new();
        let e = EntityId::from_raw(7);
        table.insert(e, loc(1, 4));
        assert_eq!(table.get(e), Some(loc(1, 4)));

        table.update_row(e, 2);
        assert_eq!(table.get(e), Some(loc(1, 2)));

        assert_eq!(table.invalidate(e), Some(loc(1, 2)));
        assert!(!table.is_valid(e));
        assert_eq!(table.invalidate(e), None);
    }

    #[test]
    fn clear_invalidates_but_keeps_capacity() {
        let mut table = LocationTable::with_block_size(8);
        table.insert(EntityId::from_raw(2), loc(0, 0));
        table.insert(EntityId::from_raw(5), loc(1, 3));
        table.clear();
        assert!(!table.is_valid(EntityId::from_raw(2)));
        assert!(!table.is_valid(EntityId::from_raw(5)));
        assert_eq!(table.capacity(), 10);
    }

    #[test]
    #[should_panic(expected = "has no valid location")]
    fn update_row_of_dead_entity_panics() {
        let mut table = LocationTable::new();
        table.update_row(EntityId::from_raw(1), 0);
    }
}
