use snafu::Snafu;
use snafu_utils::Location;

/// Errors reported by [`DefragAllocator`](crate::DefragAllocator).
///
/// No error is fatal. Every failing operation leaves the allocator exactly as
/// it was before the call, so the caller may free something, shrink a block
/// or [`defrag`](crate::DefragAllocator::defrag) and try again.
#[derive(Debug, Snafu, derive_more::IsVariant)]
#[snafu(module, visibility(pub(crate)))]
#[non_exhaustive]
pub enum AllocError {
    #[snafu(display("zero-sized allocation requested"))]
    #[cfg_attr(
        feature = "unstable-provider-api",
        snafu(provide(ref, priority, Location => location))
    )]
    ZeroSize {
        #[snafu(implicit)]
        location: Location,
    },
    /// Fewer bytes are free in total than the request needs.
    #[snafu(display("out of memory: requested {requested} bytes, {available} bytes available"))]
    #[cfg_attr(
        feature = "unstable-provider-api",
        snafu(provide(ref, priority, Location => location))
    )]
    OutOfMemory {
        requested: usize,
        available: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// Enough bytes are free in total, but no single gap is large enough.
    ///
    /// [`defrag`](crate::DefragAllocator::defrag) merges all gaps and may let
    /// the request succeed.
    #[snafu(display(
        "cannot place {requested} contiguous bytes, {available} bytes available \
         but the largest gap is {largest_gap} bytes; memory needs defragmentation"
    ))]
    #[cfg_attr(
        feature = "unstable-provider-api",
        snafu(provide(ref, priority, Location => location))
    )]
    Fragmented {
        requested: usize,
        available: usize,
        largest_gap: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// The handle is empty, or no longer refers to a live block.
    #[snafu(display("invalid handle"))]
    #[cfg_attr(
        feature = "unstable-provider-api",
        snafu(provide(ref, priority, Location => location))
    )]
    InvalidHandle {
        #[snafu(implicit)]
        location: Location,
    },
    /// The handle refers to a block that was already freed.
    #[snafu(display("block already freed"))]
    #[cfg_attr(
        feature = "unstable-provider-api",
        snafu(provide(ref, priority, Location => location))
    )]
    DoubleFree {
        #[snafu(implicit)]
        location: Location,
    },
}

/// Field-less discriminant of [`AllocError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AllocErrorKind {
    ZeroSize,
    OutOfMemory,
    Fragmented,
    InvalidHandle,
    DoubleFree,
}

impl AllocError {
    #[must_use]
    pub fn kind(&self) -> AllocErrorKind {
        match self {
            Self::ZeroSize { .. } => AllocErrorKind::ZeroSize,
            Self::OutOfMemory { .. } => AllocErrorKind::OutOfMemory,
            Self::Fragmented { .. } => AllocErrorKind::Fragmented,
            Self::InvalidHandle { .. } => AllocErrorKind::InvalidHandle,
            Self::DoubleFree { .. } => AllocErrorKind::DoubleFree,
        }
    }

    /// Returns the location where this error was raised.
    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            Self::ZeroSize { location }
            | Self::OutOfMemory { location, .. }
            | Self::Fragmented { location, .. }
            | Self::InvalidHandle { location }
            | Self::DoubleFree { location } => location,
        }
    }

    /// Returns `true` for both out-of-memory flavours.
    #[must_use]
    pub fn is_memory_exhausted(&self) -> bool {
        self.is_out_of_memory() || self.is_fragmented()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use snafu_utils::Report;

    use super::{alloc_error::*, *};

    #[test]
    fn test_kind_and_predicates() {
        let err = FragmentedSnafu {
            requested: 64_usize,
            available: 100_usize,
            largest_gap: 40_usize,
        }
        .build();
        assert_eq!(err.kind(), AllocErrorKind::Fragmented);
        assert!(err.is_fragmented());
        assert!(!err.is_out_of_memory());
        assert!(err.is_memory_exhausted());

        let err = DoubleFreeSnafu.build();
        assert_eq!(err.kind(), AllocErrorKind::DoubleFree);
        assert!(!err.is_memory_exhausted());
    }

    #[test]
    fn test_location_is_captured() {
        let line = line!() + 1;
        let err = InvalidHandleSnafu.build();
        assert_eq!(err.location().line(), line);
        assert!(err.location().file().ends_with("error.rs"));
    }

    #[test]
    fn test_report() {
        let err = OutOfMemorySnafu {
            requested: 512_usize,
            available: 96_usize,
        }
        .build();
        let rendered = Report::new(err).to_string();
        assert!(
            rendered
                .starts_with("Error: out of memory: requested 512 bytes, 96 bytes available\n")
        );
    }
}
