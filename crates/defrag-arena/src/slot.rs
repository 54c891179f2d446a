//! Metadata table living at the high end of the arena.
//!
//! The table is a flat array of fixed-size [`Slot`]s that grows downward from
//! [`Arena::table_end`]. Slot `0` sits right below the table end, slot `1`
//! right below slot `0`, and so on, so a slot keeps its index while the table
//! grows or shrinks at its low-address edge.
//!
//! ```text
//!  offset 0                     metadata_start            table_end
//!  ┌──────┬─────┬──────┬────────┬────────┬────────┬────────┐
//!  │ blk  │ gap │ blk  │  free  │ slot 2 │ slot 1 │ slot 0 │
//!  └──────┴─────┴──────┴────────┴────────┴────────┴────────┘
//!                                 ▲ low edge: grows/shrinks here
//! ```
//!
//! Live slots are chained through their `next` index into a singly linked
//! list sorted by block address. List order is independent of slot index.

use core::iter::FusedIterator;

use crate::arena::Arena;

const NONE: usize = usize::MAX;

/// Size in bytes of one metadata slot.
///
/// Every live block costs this much of the arena in addition to its own
/// length.
pub const SLOT_SIZE: usize = size_of::<Slot>();

/// Index of a slot in the metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SlotIndex(usize);

impl SlotIndex {
    fn from_raw(raw: usize) -> Option<Self> {
        (raw != NONE).then_some(Self(raw))
    }

    fn into_raw(index: Option<Self>) -> usize {
        index.map_or(NONE, |Self(raw)| raw)
    }
}

/// One entry of the metadata table, describing a single live block.
///
/// An empty slot has its address set to a sentinel; its other fields are
/// meaningless.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    address: usize,
    length: usize,
    next: usize,
}

impl Slot {
    pub(crate) const EMPTY: Self = Self {
        address: NONE,
        length: 0,
        next: NONE,
    };

    fn new(address: usize, length: usize, next: Option<SlotIndex>) -> Self {
        assert_ne!(address, NONE);
        Self {
            address,
            length,
            next: SlotIndex::into_raw(next),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.address == NONE
    }

    /// Offset of the first byte of the block.
    pub(crate) fn start(&self) -> usize {
        assert!(!self.is_empty(), "empty slot has no address");
        self.address
    }

    /// Offset one past the last byte of the block.
    pub(crate) fn end(&self) -> usize {
        self.start() + self.length
    }

    pub(crate) fn len(&self) -> usize {
        assert!(!self.is_empty(), "empty slot has no length");
        self.length
    }

    pub(crate) fn next(&self) -> Option<SlotIndex> {
        SlotIndex::from_raw(self.next)
    }
}

/// Bookkeeping for the metadata table and the byte budget of the arena.
///
/// All methods take the [`Arena`] explicitly; the table itself only stores
/// counters and the head and tail of the live list.
pub(crate) struct SlotTable {
    table_end: usize,
    total: usize,
    empty: usize,
    root: Option<SlotIndex>,
    tail: Option<SlotIndex>,
    available: usize,
}

impl SlotTable {
    pub(crate) fn new(arena: &Arena<'_>) -> Self {
        Self {
            table_end: arena.table_end(),
            total: 0,
            empty: 0,
            root: None,
            tail: None,
            available: arena.table_end(),
        }
    }

    /// Offset of the lowest slot, i.e. the end of the usable block area.
    pub(crate) fn metadata_start(&self) -> usize {
        self.table_end - self.total * SLOT_SIZE
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn empty(&self) -> usize {
        self.empty
    }

    pub(crate) fn root(&self) -> Option<SlotIndex> {
        self.root
    }

    /// Bytes neither committed to a live block nor occupied by the table.
    pub(crate) fn available(&self) -> usize {
        self.available
    }

    /// Accounts `len` bytes as used by a block.
    pub(crate) fn commit(&mut self, len: usize) {
        assert!(len <= self.available, "committing more than is available");
        self.available -= len;
    }

    /// Returns `len` bytes of a block to the available budget.
    pub(crate) fn release(&mut self, len: usize) {
        self.available += len;
    }

    fn slot_offset(&self, index: SlotIndex) -> usize {
        assert!(index.0 < self.total, "slot index {} out of range", index.0);
        self.table_end - (index.0 + 1) * SLOT_SIZE
    }

    pub(crate) fn get(&self, arena: &Arena<'_>, index: SlotIndex) -> Slot {
        arena.read_slot(self.slot_offset(index))
    }

    /// Returns the slot at `index` if it is in the table and describes a live
    /// block.
    pub(crate) fn lookup(&self, arena: &Arena<'_>, index: SlotIndex) -> Option<Slot> {
        if index.0 >= self.total {
            return None;
        }
        let slot = self.get(arena, index);
        (!slot.is_empty()).then_some(slot)
    }

    fn set(&self, arena: &mut Arena<'_>, index: SlotIndex, slot: Slot) {
        arena.write_slot(self.slot_offset(index), slot);
    }

    pub(crate) fn set_address(&self, arena: &mut Arena<'_>, index: SlotIndex, address: usize) {
        let slot = self.get(arena, index);
        self.set(arena, index, Slot { address, ..slot });
    }

    pub(crate) fn set_len(&self, arena: &mut Arena<'_>, index: SlotIndex, length: usize) {
        let slot = self.get(arena, index);
        assert!(!slot.is_empty());
        self.set(arena, index, Slot { length, ..slot });
    }

    fn set_next(&self, arena: &mut Arena<'_>, index: SlotIndex, next: Option<SlotIndex>) {
        let slot = self.get(arena, index);
        self.set(
            arena,
            index,
            Slot {
                next: SlotIndex::into_raw(next),
                ..slot
            },
        );
    }

    /// End offset of the last live block, or `0` if there is none.
    pub(crate) fn tail_end(&self, arena: &Arena<'_>) -> usize {
        self.tail.map_or(0, |tail| self.get(arena, tail).end())
    }

    /// Returns the live slot linked right before `index`, or `None` if `index`
    /// is the root.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not linked into the live list.
    pub(crate) fn predecessor(&self, arena: &Arena<'_>, index: SlotIndex) -> Option<SlotIndex> {
        let mut prev = None;
        let mut current = self.root;
        while let Some(cur) = current {
            if cur == index {
                return prev;
            }
            prev = Some(cur);
            current = self.get(arena, cur).next();
        }
        panic!("slot {} is not linked into the live list", index.0);
    }

    pub(crate) fn iter<'t>(&'t self, arena: &'t Arena<'_>) -> Iter<'t> {
        Iter {
            table: self,
            arena,
            current: self.root,
        }
    }

    fn find_empty(&self, arena: &Arena<'_>) -> Option<SlotIndex> {
        if self.empty == 0 {
            return None;
        }
        // Prefer slots far from the low edge so that the edge can retract.
        (0..self.total)
            .map(SlotIndex)
            .find(|&index| self.get(arena, index).is_empty())
    }

    /// Extends the table by one empty slot at its low edge.
    ///
    /// Fails if the new slot would overlap the last live block.
    fn grow(&mut self, arena: &mut Arena<'_>) -> Option<SlotIndex> {
        let new_start = self.metadata_start().checked_sub(SLOT_SIZE)?;
        if self.tail_end(arena) > new_start {
            return None;
        }
        assert!(self.available >= SLOT_SIZE);

        let index = SlotIndex(self.total);
        self.total += 1;
        self.empty += 1;
        self.available -= SLOT_SIZE;
        self.set(arena, index, Slot::EMPTY);
        Some(index)
    }

    /// Drops every empty slot at the low edge of the table.
    fn retract(&mut self, arena: &Arena<'_>) {
        while self.total > 0 && self.get(arena, SlotIndex(self.total - 1)).is_empty() {
            self.total -= 1;
            self.empty -= 1;
            self.available += SLOT_SIZE;
        }
    }

    fn link(
        &mut self,
        arena: &mut Arena<'_>,
        index: SlotIndex,
        prev: Option<SlotIndex>,
        next: Option<SlotIndex>,
    ) {
        match prev {
            Some(prev) => {
                assert_eq!(self.get(arena, prev).next(), next);
                self.set_next(arena, prev, Some(index));
            }
            None => {
                assert_eq!(self.root, next);
                self.root = Some(index);
            }
        }
        if next.is_none() {
            self.tail = Some(index);
        }
    }

    /// Records a block at `address..address + length` between `prev` and
    /// `next` in the live list.
    ///
    /// An empty slot is recycled when there is one, otherwise the table grows
    /// by one slot. Returns `None` without changing anything if no slot can be
    /// obtained, or if the block would run into the metadata table.
    pub(crate) fn insert(
        &mut self,
        arena: &mut Arena<'_>,
        address: usize,
        length: usize,
        prev: Option<SlotIndex>,
        next: Option<SlotIndex>,
    ) -> Option<SlotIndex> {
        let index = match self.find_empty(arena) {
            Some(index) => index,
            None => self.grow(arena)?,
        };

        self.set(arena, index, Slot::new(address, length, next));
        self.empty -= 1;
        self.link(arena, index, prev, next);

        if next.is_none()
            && address
                .checked_add(length)
                .is_none_or(|end| end > self.metadata_start())
        {
            // The block and the table claimed the same bytes.
            self.remove(arena, index);
            return None;
        }

        Some(index)
    }

    /// Unlinks the live slot at `index` and marks it empty.
    ///
    /// If the slot is at the low edge of the table, the table shrinks past it
    /// and past every empty slot directly above it.
    pub(crate) fn remove(&mut self, arena: &mut Arena<'_>, index: SlotIndex) {
        let slot = self.get(arena, index);
        assert!(!slot.is_empty(), "slot {} is already empty", index.0);

        let prev = self.predecessor(arena, index);
        match prev {
            Some(prev) => self.set_next(arena, prev, slot.next()),
            None => self.root = slot.next(),
        }
        if self.tail == Some(index) {
            self.tail = prev;
        }

        self.set(arena, index, Slot::EMPTY);
        self.empty += 1;

        if index.0 + 1 == self.total {
            self.retract(arena);
        }
    }

    /// Puts a block back into the slot it was removed from.
    ///
    /// This is the rollback path of a failed relocation: `prev` and `next`
    /// must be the neighbours the slot had when it was removed, and nothing
    /// may have been placed between them since. If the table retracted past
    /// `index`, it is regrown over its former footprint.
    pub(crate) fn restore(
        &mut self,
        arena: &mut Arena<'_>,
        index: SlotIndex,
        address: usize,
        length: usize,
        prev: Option<SlotIndex>,
        next: Option<SlotIndex>,
    ) {
        while self.total <= index.0 {
            let grown = self.grow(arena);
            assert!(grown.is_some(), "table must regrow over its former slots");
        }
        assert!(self.get(arena, index).is_empty());

        self.set(arena, index, Slot::new(address, length, next));
        self.empty -= 1;
        self.link(arena, index, prev, next);
    }
}

/// Iterator over live slots in address order.
pub(crate) struct Iter<'t> {
    table: &'t SlotTable,
    arena: &'t Arena<'t>,
    current: Option<SlotIndex>,
}

impl Iterator for Iter<'_> {
    type Item = (SlotIndex, Slot);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.current?;
        let slot = self.table.get(self.arena, index);
        self.current = slot.next();
        Some((index, slot))
    }
}

impl FusedIterator for Iter<'_> {}
