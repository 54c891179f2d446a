//! Small helpers shared by the `snafu` error types of this workspace.
//!
//! - [`Location`] is captured implicitly by every error variant
//!   (`#[snafu(implicit)]`) and points at the call site that raised it.
//! - [`Report`] renders an error together with its source chain.

#![cfg_attr(
    feature = "unstable-provider-api",
    feature(error_generic_member_access)
)]
#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use core::{error::Error, fmt};

use snafu::GenerateImplicitData;

/// Source location at which an error value was created.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location(&'static core::panic::Location<'static>);

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self(core::panic::Location::caller())
    }
}

impl GenerateImplicitData for Location {
    #[track_caller]
    fn generate() -> Self {
        Self::default()
    }
}

impl Location {
    /// Returns the source file name.
    #[must_use]
    pub fn file(self) -> &'static str {
        self.0.file()
    }

    /// Returns the line number.
    #[must_use]
    pub fn line(self) -> u32 {
        self.0.line()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Multi-line rendering of an error and everything it was caused by.
///
/// ```text
/// Error: out of memory: requested 512 bytes, 96 bytes available
///
/// Caused by:
///    0: ...
/// ```
///
/// With the `unstable-provider-api` feature the [`Location`] provided by each
/// error in the chain is printed under it.
pub struct Report<E> {
    error: E,
}

impl<E> fmt::Debug for Report<E>
where
    E: Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<E> fmt::Display for Report<E>
where
    E: Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", self.error)?;
        write_location(f, &self.error, "  ")?;
        let mut source = self.error.source();
        if source.is_some() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
        }
        let mut index = 0;
        while let Some(s) = source {
            writeln!(f, "{index:4}: {s}")?;
            write_location(f, s, "      ")?;
            source = s.source();
            index += 1;
        }
        Ok(())
    }
}

#[cfg(feature = "unstable-provider-api")]
fn write_location(f: &mut fmt::Formatter<'_>, error: &dyn Error, indent: &str) -> fmt::Result {
    if let Some(loc) = core::error::request_ref::<Location>(error) {
        writeln!(f, "{indent}at {loc}")?;
    }
    Ok(())
}

#[cfg(not(feature = "unstable-provider-api"))]
#[expect(clippy::unnecessary_wraps)]
fn write_location(_f: &mut fmt::Formatter<'_>, _error: &dyn Error, _indent: &str) -> fmt::Result {
    Ok(())
}

impl<E> Report<E> {
    #[must_use]
    pub fn new(error: E) -> Self {
        Self { error }
    }

    /// Returns the wrapped error.
    #[must_use]
    pub fn into_inner(self) -> E {
        self.error
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use snafu::{ResultExt as _, Snafu};

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("inner failure"))]
    struct InnerError {
        #[snafu(implicit)]
        location: Location,
    }

    #[derive(Debug, Snafu)]
    #[snafu(display("outer failure"))]
    struct OuterError {
        source: InnerError,
        #[snafu(implicit)]
        location: Location,
    }

    fn fail_inner() -> Result<(), InnerError> {
        InnerSnafu.fail()
    }

    fn fail_outer() -> Result<(), OuterError> {
        fail_inner().context(OuterSnafu)
    }

    #[test]
    fn test_location_points_at_caller() {
        let line = line!() + 1;
        let location = Location::default();
        assert_eq!(location.line(), line);
        assert!(location.file().ends_with("lib.rs"));
    }

    #[test]
    fn test_implicit_location_is_captured() {
        let err = fail_inner().unwrap_err();
        assert!(err.location.file().ends_with("lib.rs"));
    }

    #[test]
    fn test_report_lists_source_chain() {
        let err = fail_outer().unwrap_err();
        assert!(err.location.file().ends_with("lib.rs"));
        let rendered = Report::new(err).to_string();
        assert!(rendered.starts_with("Error: outer failure\n"));
        assert!(rendered.contains("Caused by:\n"));
        assert!(rendered.contains("   0: inner failure\n"));
    }

    #[test]
    fn test_report_without_source() {
        let err = fail_inner().unwrap_err();
        let rendered = Report::new(err).to_string();
        assert!(rendered.starts_with("Error: inner failure\n"));
        assert!(!rendered.contains("Caused by:"));
    }
}
