//! Construction-time bounds for a `ListContainer`.

use std::mem::{align_of, size_of};

/// Slot bounds and initial reservation for a `ListContainer`.
///
/// Build it from the concrete types that will be stored:
///
/// ```
/// use list_container::ListConfig;
///
/// let config = ListConfig::new().fit::<u8>().fit::<[u64; 3]>().reserve(16);
/// assert_eq!(config.max_alignment(), 8);
/// assert_eq!(config.max_size(), 24);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListConfig {
    max_alignment: usize,
    max_size: usize,
    reserve: usize,
}

impl ListConfig {
    /// Bounds that fit only zero-sized, byte-aligned types.
    pub const fn new() -> Self {
        Self {
            max_alignment: 1,
            max_size: 0,
            reserve: 0,
        }
    }

    /// Bounds taken as given. An invalid alignment is rejected when the
    /// container is built.
    pub const fn with_bounds(max_alignment: usize, max_size: usize) -> Self {
        Self {
            max_alignment,
            max_size,
            reserve: 0,
        }
    }

    /// Widens the bounds so that `D` fits.
    pub const fn fit<D>(self) -> Self {
        self.with_max_alignment(align_of::<D>())
            .with_max_size(size_of::<D>())
    }

    /// Raises the maximum alignment to at least `alignment`.
    pub const fn with_max_alignment(mut self, alignment: usize) -> Self {
        if alignment > self.max_alignment {
            self.max_alignment = alignment;
        }
        self
    }

    /// Raises the maximum element size to at least `size`.
    pub const fn with_max_size(mut self, size: usize) -> Self {
        if size > self.max_size {
            self.max_size = size;
        }
        self
    }

    /// Sets the number of elements the first segment holds. Zero picks the
    /// default.
    pub const fn reserve(mut self, count: usize) -> Self {
        self.reserve = count;
        self
    }

    pub const fn max_alignment(&self) -> usize {
        self.max_alignment
    }

    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    pub const fn reservation(&self) -> usize {
        self.reserve
    }
}

impl Default for ListConfig {
    fn default() -> Self {
        Self::new()
    }
}
