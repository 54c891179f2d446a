//! A defragmenting allocator over a single caller-supplied byte range.
//!
//! [`DefragAllocator`] hands out variable-sized blocks from one contiguous
//! arena and can later compact them towards the start of the arena. Clients
//! never hold raw addresses across allocator calls; they hold [`Handle`]s,
//! which stay valid while the block behind them moves.
//!
//! The bookkeeping lives inside the arena itself: a table of fixed-size
//! metadata slots grows downward from the high end, while blocks are placed
//! first-fit from the low end. No memory outside the arena is ever used.
//!
//! ```text
//!  0                                            metadata_start    capacity
//!  ┌─────────┬─────┬──────────┬─────────────────┬─────────────────┐
//!  │ block A │ gap │ block B  │      free       │  slot table  ◀──│
//!  └─────────┴─────┴──────────┴─────────────────┴─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use defrag_arena::DefragAllocator;
//!
//! let mut memory = [0_u8; 1024];
//! let mut allocator = DefragAllocator::new(&mut memory);
//!
//! let first = allocator.allocate(100)?;
//! let mut second = allocator.allocate(200)?;
//! allocator.block_mut(&second)?.fill(0xab);
//!
//! // Leave a hole at the start of the arena.
//! allocator.free(&first)?;
//!
//! // Grow a block; it may move, the handle follows it.
//! allocator.resize(&mut second, 250)?;
//!
//! // Close every gap. `second` still refers to the same bytes.
//! allocator.defrag();
//! assert_eq!(allocator.offset_of(&second)?, 0);
//! assert!(allocator.block(&second)?[..200].iter().all(|&b| b == 0xab));
//! # Ok::<(), defrag_arena::AllocError>(())
//! ```
//!
//! # Errors
//!
//! Every fallible operation returns [`AllocError`]. A failing operation
//! never changes the allocator, so recovery is a matter of freeing memory or
//! calling [`DefragAllocator::defrag`] before retrying. In particular a
//! failed [`DefragAllocator::resize`] leaves the block and its handle where
//! they were.
//!
//! # Thread Safety
//!
//! The allocator is `Send` but not `Sync`. All mutating operations take
//! `&mut self`; share it between threads behind a lock.
//!
//! # Features
//!
//! - `unstable-provider-api`: lets errors provide their
//!   [`Location`](snafu_utils::Location) through the nightly
//!   `error_generic_member_access` API.

#![cfg_attr(
    feature = "unstable-provider-api",
    feature(error_generic_member_access)
)]
#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use self::{
    allocator::DefragAllocator,
    error::{AllocError, AllocErrorKind},
    handle::Handle,
    slot::SLOT_SIZE,
    usage::{Block, Blocks, Dump, Usage},
};

mod allocator;
mod arena;
mod error;
mod handle;
mod slot;
mod usage;
