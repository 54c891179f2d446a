//! Read-only views of the arena: statistics, block iteration and dumps.

use core::{fmt, iter::FusedIterator};

use crate::{
    arena::Arena,
    slot::{self, SLOT_SIZE, SlotTable},
};

/// Snapshot of how the arena is used.
///
/// `available + used + metadata == capacity` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    /// Bytes manageable by the allocator: the arena length rounded down so
    /// that the metadata table is aligned.
    pub capacity: usize,
    /// Bytes not committed to a block or to the metadata table.
    pub available: usize,
    /// Sum of the lengths of all live blocks.
    pub used: usize,
    /// Bytes occupied by the metadata table.
    pub metadata: usize,
    /// Number of live blocks.
    pub blocks: usize,
    /// Number of slots in the metadata table.
    pub slots: usize,
    /// Number of slots in the table waiting to be reused.
    pub empty_slots: usize,
    /// Length of the largest contiguous free range below the table.
    pub largest_gap: usize,
}

impl Usage {
    pub(crate) fn get(arena: &Arena<'_>, table: &SlotTable) -> Self {
        let mut used = 0;
        let mut blocks = 0;
        for (_, slot) in table.iter(arena) {
            used += slot.len();
            blocks += 1;
        }
        Self {
            capacity: arena.table_end(),
            available: table.available(),
            used,
            metadata: table.total() * SLOT_SIZE,
            blocks,
            slots: table.total(),
            empty_slots: table.empty(),
            largest_gap: largest_gap(arena, table),
        }
    }
}

pub(crate) fn largest_gap(arena: &Arena<'_>, table: &SlotTable) -> usize {
    let mut largest = 0;
    let mut cursor = 0;
    for (_, slot) in table.iter(arena) {
        largest = largest.max(slot.start() - cursor);
        cursor = slot.end();
    }
    largest.max(table.metadata_start() - cursor)
}

/// A live block as seen by [`DefragAllocator::blocks`].
///
/// [`DefragAllocator::blocks`]: crate::DefragAllocator::blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block {
    /// Offset of the block from the arena base.
    pub offset: usize,
    /// Length of the block in bytes.
    pub len: usize,
}

impl Block {
    /// Offset one past the last byte of the block.
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Iterator over live blocks in address order.
pub struct Blocks<'t> {
    inner: slot::Iter<'t>,
}

impl<'t> Blocks<'t> {
    pub(crate) fn new(arena: &'t Arena<'_>, table: &'t SlotTable) -> Self {
        Self {
            inner: table.iter(arena),
        }
    }
}

impl Iterator for Blocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        let (_, slot) = self.inner.next()?;
        Some(Block {
            offset: slot.start(),
            len: slot.len(),
        })
    }
}

impl FusedIterator for Blocks<'_> {}

/// Human-readable map of the arena, returned by
/// [`DefragAllocator::dump`](crate::DefragAllocator::dump).
///
/// ```text
/// arena: 1024 bytes, capacity 1024, available 726, 2 slots (0 empty)
///   [     0,     50)  block      50
///   [    50,    100)  gap        50
///   [   100,    300)  block     200
///   [   300,    976)  free      676
///   [   976,   1024)  metadata   48
/// ```
pub struct Dump<'t> {
    arena: &'t Arena<'t>,
    table: &'t SlotTable,
}

impl<'t> Dump<'t> {
    pub(crate) fn new(arena: &'t Arena<'_>, table: &'t SlotTable) -> Self {
        Self { arena, table }
    }
}

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn row(f: &mut fmt::Formatter<'_>, start: usize, end: usize, what: &str) -> fmt::Result {
            writeln!(f, "  [{start:6}, {end:6})  {what:<8} {:4}", end - start)
        }

        let Self { arena, table } = self;
        writeln!(
            f,
            "arena: {} bytes, capacity {}, available {}, {} slots ({} empty)",
            arena.len(),
            arena.table_end(),
            table.available(),
            table.total(),
            table.empty(),
        )?;

        let mut cursor = 0;
        for (_, slot) in table.iter(arena) {
            if slot.start() > cursor {
                row(f, cursor, slot.start(), "gap")?;
            }
            row(f, slot.start(), slot.end(), "block")?;
            cursor = slot.end();
        }
        if table.metadata_start() > cursor {
            row(f, cursor, table.metadata_start(), "free")?;
        }
        if table.total() > 0 {
            row(f, table.metadata_start(), arena.table_end(), "metadata")?;
        }
        Ok(())
    }
}
