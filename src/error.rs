//! Error type for fallible container construction.

use std::alloc::Layout;

/// The error type for `try_*` constructors.
///
/// Misuse of an already constructed container (oversized elements, removal
/// from an empty list) is a programming error and panics instead.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum ListContainerError {
    /// The requested alignment is zero or not a power of two.
    #[error("alignment {alignment} is not a power of two")]
    InvalidAlignment { alignment: usize },
    /// The slot stride or segment size computation overflowed.
    #[error("memory allocation failed due to capacity overflow")]
    CapacityOverflow,
    /// The allocator could not provide a segment.
    #[error("memory allocation of {} bytes failed", .layout.size())]
    AllocError { layout: Layout },
}
