//! The defragmenting allocator.
//!
//! # Algorithm
//!
//! Blocks are placed **first-fit** over the address-ordered list of live
//! blocks kept by the metadata table:
//!
//! 1. the gap in front of the first block,
//! 2. each gap between two neighbouring blocks, in address order,
//! 3. the space behind the last block, up to the metadata table.
//!
//! The first gap that is at least as long as the request wins. Freed blocks
//! simply leave a gap behind; nothing is coalesced because gaps are implicit
//! in the list. [`DefragAllocator::defrag`] closes every gap by sliding blocks
//! towards offset `0`.
//!
//! # Memory Layout
//!
//! ```text
//!  base                                         metadata_start   table_end
//!  ┌────────┬───────┬────────────┬────────────────────┬───────────────┐
//!  │ block  │  gap  │   block    │        free        │ slot table ◀─ │
//!  └────────┴───────┴────────────┴────────────────────┴───────────────┘
//!   ───────────────▶ blocks grow upward               table grows downward
//! ```
//!
//! Clients only ever hold [`Handle`]s, which name a slot of the table. A block
//! may therefore move without invalidating anything the client holds.

use core::ptr::NonNull;

use snafu::{OptionExt as _, ensure};

use crate::{
    Handle,
    arena::Arena,
    error::{
        AllocError,
        alloc_error::{
            DoubleFreeSnafu, FragmentedSnafu, InvalidHandleSnafu, OutOfMemorySnafu,
            ZeroSizeSnafu,
        },
    },
    slot::{SLOT_SIZE, Slot, SlotIndex, SlotTable},
    usage::{self, Blocks, Dump, Usage},
};

/// An allocator over a single caller-owned byte range that can compact its
/// live blocks.
///
/// Blocks are placed first-fit in address order. Freed space stays behind as
/// gaps until [`defrag`](Self::defrag) slides the live blocks together.
///
/// # Thread Safety
///
/// This allocator is `Send` but not `Sync`. It can be moved between threads
/// but requires external synchronization for concurrent access.
pub struct DefragAllocator<'a> {
    arena: Arena<'a>,
    table: SlotTable,
}

unsafe impl Send for DefragAllocator<'_> {}

impl<'a> From<&'a mut [u8]> for DefragAllocator<'a> {
    fn from(value: &'a mut [u8]) -> Self {
        Self::new(value)
    }
}

impl<'a> DefragAllocator<'a> {
    /// Creates an allocator managing `bytes`.
    ///
    /// The tail of the slice may be left unused so that the metadata table
    /// stays aligned; see [`capacity`](Self::capacity).
    #[must_use]
    pub fn new(bytes: &'a mut [u8]) -> Self {
        let len = bytes.len();
        // A slice pointer is never null, even for an empty slice.
        let base = NonNull::from(bytes).cast::<u8>();
        Self::from_arena(unsafe { Arena::new(base, len) })
    }

    /// Creates an allocator managing `len` bytes starting at `base`.
    ///
    /// # Panics
    ///
    /// Panics if `base` is null or if `base + len` overflows.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - The range `base..base + len` is valid for reads and writes
    /// - The range is not used by any other allocator or code while the
    ///   returned allocator is alive
    /// - The range remains valid for the lifetime `'a`
    #[must_use]
    pub unsafe fn from_raw_parts(base: *mut u8, len: usize) -> Self {
        let Some(base) = NonNull::new(base) else {
            panic!("arena base must not be null");
        };
        Self::from_arena(unsafe { Arena::new(base, len) })
    }

    fn from_arena(arena: Arena<'a>) -> Self {
        let table = SlotTable::new(&arena);
        log::trace!(
            "[defrag-arena] new arena of {} bytes, capacity {}",
            arena.len(),
            arena.table_end()
        );
        Self { arena, table }
    }

    /// Bytes manageable by this allocator, before any metadata is stored.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.arena.table_end()
    }

    /// Bytes neither used by a live block nor by the metadata table.
    ///
    /// They may be scattered over several gaps; see
    /// [`Usage::largest_gap`].
    #[must_use]
    pub fn available(&self) -> usize {
        self.table.available()
    }

    /// Offset at which the metadata table starts.
    ///
    /// No block ever extends past this offset.
    #[must_use]
    pub fn metadata_start(&self) -> usize {
        self.table.metadata_start()
    }

    #[must_use]
    pub fn usage(&self) -> Usage {
        Usage::get(&self.arena, &self.table)
    }

    /// Iterates over live blocks in address order.
    #[must_use]
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks::new(&self.arena, &self.table)
    }

    /// Returns a printable map of blocks, gaps and the metadata table.
    #[must_use]
    pub fn dump(&self) -> Dump<'_> {
        Dump::new(&self.arena, &self.table)
    }

    /// Allocates a block of exactly `len` bytes.
    ///
    /// The block goes into the first gap, in address order, that can hold
    /// it. Its contents are left as they were in the arena.
    ///
    /// # Errors
    ///
    /// - [`AllocError::ZeroSize`] if `len` is zero
    /// - [`AllocError::OutOfMemory`] if fewer than `len` bytes (plus the cost
    ///   of a new metadata slot, if one is needed) are available
    /// - [`AllocError::Fragmented`] if enough bytes are available but not in
    ///   one piece; [`defrag`](Self::defrag) may help
    ///
    /// On error nothing is changed.
    pub fn allocate(&mut self, len: usize) -> Result<Handle, AllocError> {
        ensure!(len > 0, ZeroSizeSnafu);
        self.place(len).map(Handle::new)
    }

    fn place(&mut self, len: usize) -> Result<SlotIndex, AllocError> {
        let available = self.table.available();
        ensure!(
            available >= len,
            OutOfMemorySnafu {
                requested: len,
                available,
            }
        );

        let (address, prev, next) = self.find_gap(len);
        let Some(index) = self
            .table
            .insert(&mut self.arena, address, len, prev, next)
        else {
            let err = self.placement_error(len);
            log::debug!("[defrag-arena] allocate({len}) failed: {err}");
            return Err(err);
        };
        self.table.commit(len);

        log::trace!("[defrag-arena] allocate({len}) -> offset {address}, {index:?}");
        Ok(index)
    }

    /// Picks the first gap that can hold `len` bytes.
    ///
    /// Returns the offset for the block and the live slots it would sit
    /// between. The space behind the last block is returned unchecked; the
    /// metadata table validates it when the slot is inserted.
    fn find_gap(&self, len: usize) -> (usize, Option<SlotIndex>, Option<SlotIndex>) {
        let Some(root) = self.table.root() else {
            return (0, None, None);
        };

        let mut prev = root;
        let mut prev_slot = self.table.get(&self.arena, root);
        if prev_slot.start() >= len {
            return (0, None, Some(root));
        }

        while let Some(next) = prev_slot.next() {
            let next_slot = self.table.get(&self.arena, next);
            if next_slot.start() - prev_slot.end() >= len {
                return (prev_slot.end(), Some(prev), Some(next));
            }
            prev = next;
            prev_slot = next_slot;
        }

        (prev_slot.end(), Some(prev), None)
    }

    fn placement_error(&self, len: usize) -> AllocError {
        let available = self.table.available();
        let needed = if self.table.empty() > 0 {
            len
        } else {
            len.saturating_add(SLOT_SIZE)
        };
        if available < needed {
            return OutOfMemorySnafu {
                requested: len,
                available,
            }
            .build();
        }
        FragmentedSnafu {
            requested: len,
            available,
            largest_gap: usage::largest_gap(&self.arena, &self.table),
        }
        .build()
    }

    /// Changes the length of the block behind `handle` to `len` bytes.
    ///
    /// The first `min(old_len, len)` bytes are preserved. The block grows or
    /// shrinks in place when the space up to the next block (or the metadata
    /// table) allows it; otherwise it is moved and `handle` is updated.
    ///
    /// An empty handle is bound to a freshly allocated block.
    ///
    /// # Errors
    ///
    /// - [`AllocError::ZeroSize`] if `len` is zero
    /// - [`AllocError::DoubleFree`] if the block behind `handle` was freed
    /// - [`AllocError::OutOfMemory`] or [`AllocError::Fragmented`] if the
    ///   block has to move and no gap can hold it
    ///
    /// On error the block, its contents, the arena and `handle` are left
    /// exactly as they were.
    pub fn resize(&mut self, handle: &mut Handle, len: usize) -> Result<(), AllocError> {
        ensure!(len > 0, ZeroSizeSnafu);
        let Some(index) = handle.slot() else {
            *handle = self.allocate(len)?;
            return Ok(());
        };
        let slot = self
            .table
            .lookup(&self.arena, index)
            .context(DoubleFreeSnafu)?;

        let limit = match slot.next() {
            Some(next) => self.table.get(&self.arena, next).start(),
            None => self.table.metadata_start(),
        };
        if limit - slot.start() >= len {
            let old_len = slot.len();
            self.table.set_len(&mut self.arena, index, len);
            if len > old_len {
                self.table.commit(len - old_len);
            } else {
                self.table.release(old_len - len);
            }
            log::trace!(
                "[defrag-arena] resize({index:?}, {old_len} -> {len}) in place at offset {}",
                slot.start()
            );
            return Ok(());
        }

        self.relocate(handle, index, slot, len)
    }

    fn relocate(
        &mut self,
        handle: &mut Handle,
        index: SlotIndex,
        slot: Slot,
        len: usize,
    ) -> Result<(), AllocError> {
        let prev = self.table.predecessor(&self.arena, index);

        // The old bytes stay untouched while the slot is free: placing a new
        // slot only writes to the metadata table.
        self.table.release(slot.len());
        self.table.remove(&mut self.arena, index);

        match self.place(len) {
            Ok(new_index) => {
                let new_start = self.table.get(&self.arena, new_index).start();
                self.arena
                    .copy_within(slot.start(), new_start, slot.len().min(len));
                log::trace!(
                    "[defrag-arena] resize({index:?}, {} -> {len}) moved offset {} -> {new_start}",
                    slot.len(),
                    slot.start(),
                );
                *handle = Handle::new(new_index);
                Ok(())
            }
            Err(err) => {
                self.table.restore(
                    &mut self.arena,
                    index,
                    slot.start(),
                    slot.len(),
                    prev,
                    slot.next(),
                );
                self.table.commit(slot.len());
                log::debug!("[defrag-arena] resize({index:?}, {len}) rolled back: {err}");
                Err(err)
            }
        }
    }

    /// Releases the block behind `handle`.
    ///
    /// Every clone of `handle` becomes stale.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidHandle`] if `handle` is empty
    /// - [`AllocError::DoubleFree`] if the block was already freed
    pub fn free(&mut self, handle: &Handle) -> Result<(), AllocError> {
        let index = handle.slot().context(InvalidHandleSnafu)?;
        let slot = self
            .table
            .lookup(&self.arena, index)
            .context(DoubleFreeSnafu)?;

        self.table.release(slot.len());
        self.table.remove(&mut self.arena, index);

        log::trace!(
            "[defrag-arena] free({index:?}) released {} bytes at offset {}",
            slot.len(),
            slot.start()
        );
        Ok(())
    }

    /// Slides every live block towards offset `0` so that no gap remains.
    ///
    /// Blocks keep their address order and handles keep referring to the
    /// same blocks. Calling this twice in a row moves nothing the second
    /// time.
    ///
    /// Returns the number of blocks that were moved.
    pub fn defrag(&mut self) -> usize {
        let mut moved = 0;
        let mut expected = 0;
        let mut current = self.table.root();
        while let Some(index) = current {
            let slot = self.table.get(&self.arena, index);
            if slot.start() != expected {
                assert!(slot.start() > expected, "live blocks must not overlap");
                self.arena.copy_within(slot.start(), expected, slot.len());
                self.table.set_address(&mut self.arena, index, expected);
                moved += 1;
            }
            expected += slot.len();
            current = slot.next();
        }

        log::trace!("[defrag-arena] defrag moved {moved} blocks, {expected} bytes in use");
        moved
    }

    fn live_slot(&self, handle: &Handle) -> Result<Slot, AllocError> {
        let index = handle.slot().context(InvalidHandleSnafu)?;
        self.table
            .lookup(&self.arena, index)
            .context(InvalidHandleSnafu)
    }

    /// Returns the current address of the block behind `handle`.
    ///
    /// The address is only valid until the next call that may move blocks
    /// ([`resize`](Self::resize), [`defrag`](Self::defrag)).
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidHandle`] if `handle` is empty or its block was
    /// freed.
    pub fn resolve(&self, handle: &Handle) -> Result<NonNull<u8>, AllocError> {
        let slot = self.live_slot(handle)?;
        Ok(self.arena.ptr(slot.start()))
    }

    /// Returns the offset of the block behind `handle` from the arena base.
    ///
    /// # Errors
    ///
    /// Fails like [`resolve`](Self::resolve).
    pub fn offset_of(&self, handle: &Handle) -> Result<usize, AllocError> {
        self.live_slot(handle).map(|slot| slot.start())
    }

    /// Returns the length of the block behind `handle`.
    ///
    /// # Errors
    ///
    /// Fails like [`resolve`](Self::resolve).
    pub fn len_of(&self, handle: &Handle) -> Result<usize, AllocError> {
        self.live_slot(handle).map(|slot| slot.len())
    }

    /// Returns the contents of the block behind `handle`.
    ///
    /// # Errors
    ///
    /// Fails like [`resolve`](Self::resolve).
    pub fn block(&self, handle: &Handle) -> Result<&[u8], AllocError> {
        let slot = self.live_slot(handle)?;
        Ok(self.arena.bytes(slot.start(), slot.len()))
    }

    /// Returns the contents of the block behind `handle` for writing.
    ///
    /// # Errors
    ///
    /// Fails like [`resolve`](Self::resolve).
    pub fn block_mut(&mut self, handle: &Handle) -> Result<&mut [u8], AllocError> {
        let slot = self.live_slot(handle)?;
        Ok(self.arena.bytes_mut(slot.start(), slot.len()))
    }
}
