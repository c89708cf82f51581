//! Positions into a `ListContainer`.
//!
//! Positions are plain `Copy` handles that do not borrow the container, so
//! they survive across allocation. Dereference them through the container
//! (`at`, `at_mut`, `at_rev`). Inserting, erasing and clearing bump the
//! container's generation; using an older position trips a debug assertion.

use crate::raw_list::RawPosition;

/// A forward position: either an element or `end()`.
///
/// Positions compare by logical index.
#[derive(Clone, Copy, Debug)]
pub struct Position {
    pub(crate) raw: RawPosition,
    pub(crate) generation: u32,
}

impl Position {
    #[inline]
    pub(crate) const fn new(raw: RawPosition, generation: u32) -> Self {
        Self { raw, generation }
    }

    /// Returns the logical index of this position.
    #[inline]
    pub const fn index(&self) -> usize {
        self.raw.index
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Position {}

/// A reverse position: either an element or `rend()`.
///
/// Like `std::reverse_iterator`, it wraps the forward position one past the
/// element it refers to.
#[derive(Clone, Copy, Debug)]
pub struct ReversePosition {
    pub(crate) base: RawPosition,
    pub(crate) generation: u32,
}

impl ReversePosition {
    #[inline]
    pub(crate) const fn new(base: RawPosition, generation: u32) -> Self {
        Self { base, generation }
    }

    /// Returns the forward position one past the referenced element.
    #[inline]
    pub const fn base(&self) -> Position {
        Position::new(self.base, self.generation)
    }
}

impl PartialEq for ReversePosition {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl Eq for ReversePosition {}
