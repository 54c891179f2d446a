//! Raw view over the byte range handed to the allocator.
//!
//! Everything above this module speaks in byte *offsets* from the arena base;
//! this is the only place where offsets turn into pointers.

use core::{marker::PhantomData, ptr::NonNull, slice};

use crate::slot::Slot;

/// The externally owned `[base, base + len)` byte range.
///
/// The high end of the range is rounded down to the alignment of [`Slot`] so
/// that the metadata table, which grows downward from there, is always
/// properly aligned. Block data itself is packed without any alignment.
pub(crate) struct Arena<'a> {
    base: NonNull<u8>,
    len: usize,
    table_end: usize,
    _marker: PhantomData<&'a mut [u8]>,
}

impl Arena<'_> {
    /// Wraps a raw byte range.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - `base..base + len` is valid for reads and writes for the lifetime of
    ///   the returned value
    /// - nothing else accesses that range while the returned value is alive
    pub(crate) unsafe fn new(base: NonNull<u8>, len: usize) -> Self {
        let start = base.as_ptr().addr();
        let Some(end) = start.checked_add(len) else {
            panic!("arena range must not wrap around the address space");
        };
        let aligned_end = end & !(align_of::<Slot>() - 1);
        let table_end = aligned_end.saturating_sub(start);
        Self {
            base,
            len,
            table_end,
            _marker: PhantomData,
        }
    }

    /// Total length of the arena in bytes, including any unaligned tail.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Offset one past the highest slot of the metadata table.
    pub(crate) fn table_end(&self) -> usize {
        self.table_end
    }

    pub(crate) fn ptr(&self, offset: usize) -> NonNull<u8> {
        assert!(offset <= self.len, "offset {offset} is outside of the arena");
        unsafe { self.base.add(offset) }
    }

    pub(crate) fn read_slot(&self, offset: usize) -> Slot {
        let ptr = self.slot_ptr(offset);
        unsafe { ptr.read() }
    }

    pub(crate) fn write_slot(&mut self, offset: usize, slot: Slot) {
        let ptr = self.slot_ptr(offset);
        unsafe { ptr.write(slot) }
    }

    fn slot_ptr(&self, offset: usize) -> NonNull<Slot> {
        assert!(
            offset + size_of::<Slot>() <= self.table_end,
            "slot at {offset} is outside of the metadata area"
        );
        let ptr = self.ptr(offset).cast::<Slot>();
        assert!(ptr.as_ptr().is_aligned(), "slot pointer must be properly aligned");
        ptr
    }

    /// Moves `len` bytes from `src` to `dst`. The ranges may overlap.
    pub(crate) fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        assert!(src + len <= self.table_end && dst + len <= self.table_end);
        unsafe {
            self.ptr(src).copy_to(self.ptr(dst), len);
        }
    }

    pub(crate) fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        assert!(offset + len <= self.table_end);
        unsafe { slice::from_raw_parts(self.ptr(offset).as_ptr(), len) }
    }

    pub(crate) fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        assert!(offset + len <= self.table_end);
        unsafe { slice::from_raw_parts_mut(self.ptr(offset).as_ptr(), len) }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(16))]
    struct Bytes<const N: usize>([u8; N]);

    fn with_test_arena<F>(bytes: &mut [u8], test_fn: F)
    where
        F: FnOnce(&mut Arena<'_>),
    {
        let base = NonNull::new(bytes.as_mut_ptr()).unwrap();
        let mut arena = unsafe { Arena::new(base, bytes.len()) };
        test_fn(&mut arena);
    }

    #[test]
    fn test_table_end_is_aligned() {
        let mut bytes = Bytes([0_u8; 64]);
        with_test_arena(&mut bytes.0[1..61], |arena| {
            assert_eq!(arena.len(), 60);
            let end = arena.ptr(arena.table_end()).as_ptr().addr();
            assert_eq!(end % align_of::<Slot>(), 0);
            assert!(arena.table_end() <= 60);
            assert!(60 - arena.table_end() < align_of::<Slot>());
        });
    }

    #[test]
    fn test_table_end_of_tiny_arena() {
        let mut bytes = Bytes([0_u8; 16]);
        with_test_arena(&mut bytes.0[1..3], |arena| {
            assert_eq!(arena.table_end(), 0);
        });
    }

    #[test]
    fn test_slot_round_trip() {
        let mut bytes = Bytes([0_u8; 64]);
        with_test_arena(&mut bytes.0, |arena| {
            let offset = arena.table_end() - size_of::<Slot>();
            arena.write_slot(offset, Slot::EMPTY);
            assert!(arena.read_slot(offset).is_empty());
        });
    }

    #[test]
    fn test_copy_within_overlapping() {
        let mut bytes = Bytes([0_u8; 32]);
        with_test_arena(&mut bytes.0, |arena| {
            arena.bytes_mut(4, 8).copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
            arena.copy_within(4, 0, 8);
            assert_eq!(arena.bytes(0, 8), &[1, 2, 3, 4, 5, 6, 7, 8]);
            arena.copy_within(0, 2, 8);
            assert_eq!(arena.bytes(2, 8), &[1, 2, 3, 4, 5, 6, 7, 8]);
        });
    }
}
