//! Entity identifiers and allocation.
//!
//! An [`EntityId`] is a plain 32-bit index. Ids are recycled through a
//! stack-shaped free list, and fresh ids are issued in contiguous blocks so
//! growth cost is amortized over many allocations.
//!
//! Ids carry no generation counter: once an id has been released and handed
//! out again, a stale copy held by a caller compares equal to the new entity.

use std::fmt;

use tracing::debug;

use crate::EcsError;

/// Number of ids issued per growth step.
pub const DEFAULT_ID_BLOCK_SIZE: u32 = 1024;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// An entity identifier, unique among currently live entities.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);

impl EntityId {
    /// Construct an `EntityId` from a raw index.
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw `u32` representation.
    #[inline]
    pub fn to_raw(self) -> u32 {
        self.0
    }

    /// The id as an index into id-keyed tables.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// IdAllocator
// ---------------------------------------------------------------------------

/// Issues and recycles [`EntityId`]s.
///
/// Free ids live on a stack: the most recently released id is the next one
/// handed out. When the stack runs dry a block of `block_size` new ids is
/// pushed so that the lowest id of the block pops first. The first block is
/// `1..=block_size`; id 0 is never issued.
///
/// `release` does not check that the id is outstanding. Releasing the same
/// id twice puts it on the stack twice.
#[derive(Debug)]
pub struct IdAllocator {
    /// Recyclable ids, treated as a stack.
    free: Vec<EntityId>,
    /// Highest id issued by any block so far (0 before the first block).
    high_water: u32,
    /// Ids per growth step.
    block_size: u32,
    /// Ids allocated and not yet released.
    outstanding: usize,
}

impl IdAllocator {
    /// Create an allocator that grows by [`DEFAULT_ID_BLOCK_SIZE`] ids.
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_ID_BLOCK_SIZE)
    }

    /// Create an allocator that grows by `block_size` ids at a time.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero.
    pub fn with_block_size(block_size: u32) -> Self {
        assert!(block_size > 0, "id block size must be non-zero");
        let mut allocator = Self {
            free: Vec::new(),
            high_water: 0,
            block_size,
            outstanding: 0,
        };
        allocator.grow();
        allocator
    }

    /// Pop an id off the free stack, issuing a new block first if it is empty.
    pub fn allocate(&mut self) -> EntityId {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                self.grow();
                self.free
                    .pop()
                    .expect("freshly grown id block must not be empty")
            }
        };
        self.outstanding += 1;
        id
    }

    /// Push `id` back onto the free stack.
    pub fn release(&mut self, id: EntityId) {
        debug_assert!(self.outstanding > 0, "released more ids than allocated");
        self.outstanding = self.outstanding.saturating_sub(1);
        self.free.push(id);
    }

    /// Number of ids allocated and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Number of ids currently waiting on the free stack.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Highest id issued by any block so far.
    pub fn issued_high_water(&self) -> EntityId {
        EntityId(self.high_water)
    }

    /// The configured growth step.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Issue the next contiguous block of ids onto the free stack.
    ///
    /// # Panics
    ///
    /// Panics with [`EcsError::IdSpaceExhausted`] if the block would run past
    /// `u32::MAX`.
    fn grow(&mut self) {
        let start = self.high_water;
        let end = start
            .checked_add(self.block_size)
            .unwrap_or_else(|| panic!("{}", EcsError::IdSpaceExhausted { issued: start }));

        self.free.reserve(self.block_size as usize);
        // Highest first so the lowest id sits on top of the stack.
        self.free.extend((start + 1..=end).rev().map(EntityId));
        self.high_water = end;

        debug!(
            first = start + 1,
            last = end,
            free = self.free.len(),
            "issued entity id block"
        );
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
