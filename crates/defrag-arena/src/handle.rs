use crate::slot::SlotIndex;

/// A client-held reference to an allocation.
///
/// A handle names a metadata slot, not an address. The allocator may move
/// the block behind it (on [`resize`] or [`defrag`]); the handle keeps
/// resolving to the block's current location through
/// [`resolve`](crate::DefragAllocator::resolve).
///
/// Handles are plain lookup keys: they own no memory and are not reference
/// counted. Cloning a handle yields another key for the same slot, and every
/// clone becomes stale when the block is freed. A stale handle is reported as
/// an error by the allocator rather than dereferenced.
///
/// [`resize`]: crate::DefragAllocator::resize
/// [`defrag`]: crate::DefragAllocator::defrag
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    slot: Option<SlotIndex>,
}

impl Handle {
    /// A handle that refers to no allocation.
    ///
    /// Passing it to [`resize`](crate::DefragAllocator::resize) allocates a
    /// new block.
    pub const EMPTY: Self = Self { slot: None };

    pub(crate) fn new(slot: SlotIndex) -> Self {
        Self { slot: Some(slot) }
    }

    /// Returns `true` if the handle was never bound to an allocation.
    ///
    /// A handle to a freed block is *not* empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    pub(crate) fn slot(&self) -> Option<SlotIndex> {
        self.slot
    }
}
