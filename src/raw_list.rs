//! Raw segment and slot bookkeeping for `ListContainer`.
//!
//! This module manages untyped storage: a list of segments, each holding
//! fixed-stride slots whose occupied part is always a prefix of the segment.
//! It never constructs, reads or drops elements; `ListContainer` layers the
//! element discipline on top.

use std::alloc::{handle_alloc_error, Layout};
use std::ptr::{self, NonNull};

use allocator_api2::alloc::{Allocator, Global};

use crate::ListContainerError;

/// Number of slots reserved for the first segment when no reservation is given.
pub const DEFAULT_RESERVE: usize = 32;

/// A low-level position in a `RawListContainer`.
///
/// Holds the segment index, the offset within that segment and the logical
/// index. Two positions are equal when their logical indices are equal.
#[derive(Clone, Copy, Debug)]
pub struct RawPosition {
    pub(crate) segment: usize,
    pub(crate) offset: usize,
    pub(crate) index: usize,
}

impl RawPosition {
    /// Returns the logical index of this position.
    #[inline]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl PartialEq for RawPosition {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for RawPosition {}

/// One owned block of slots.
struct Segment {
    ptr: NonNull<u8>,
    /// Number of slots the block can hold
    capacity: usize,
    /// Number of occupied slots, always a prefix of the block
    len: usize,
}

impl Segment {
    #[inline]
    fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Returns a pointer to the slot at `offset`.
    ///
    /// # Safety
    ///
    /// `offset` must be at most `capacity`.
    #[inline]
    unsafe fn slot(&self, offset: usize, stride: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.capacity);
        NonNull::new_unchecked(self.ptr.as_ptr().add(offset * stride))
    }
}

/// Untyped storage allocator behind `ListContainer`.
///
/// Hands out slots of `slot_stride` bytes, aligned to `max_alignment`.
/// Appending and removing from the end never move occupied slots. Only
/// [`insert_before`](Self::insert_before) and [`erase`](Self::erase) relocate
/// slots, and only those at or after the position inside the segment that
/// contains it.
///
/// Segment invariants:
/// - every segment before `last` holds at least one slot;
/// - `segments[last]` is empty only when the whole list is empty;
/// - at most one empty spare segment follows `last`.
pub struct RawListContainer<A: Allocator = Global> {
    segments: Vec<Segment>,
    /// Index of the segment receiving appends
    last: usize,
    /// Number of occupied slots across all segments
    len: usize,
    max_alignment: usize,
    max_size: usize,
    slot_stride: usize,
    alloc: A,
}

impl RawListContainer {
    /// Creates a new allocator using the global allocator.
    ///
    /// A `reserve` of zero reserves [`DEFAULT_RESERVE`] slots.
    ///
    /// # Panics
    ///
    /// Panics if `max_alignment` is not a power of two or the sizes overflow.
    pub fn new(max_alignment: usize, max_size: usize, reserve: usize) -> Self {
        Self::new_in(max_alignment, max_size, reserve, Global)
    }
}

impl<A: Allocator> RawListContainer<A> {
    /// Creates a new allocator that allocates segments from `alloc`.
    ///
    /// # Panics
    ///
    /// Panics if `max_alignment` is not a power of two or the sizes overflow.
    pub fn new_in(max_alignment: usize, max_size: usize, reserve: usize, alloc: A) -> Self {
        match Self::try_new_in(max_alignment, max_size, reserve, alloc) {
            Ok(raw) => raw,
            Err(ListContainerError::AllocError { layout }) => handle_alloc_error(layout),
            Err(err) => panic!("invalid list configuration: {err}"),
        }
    }

    /// Fallible version of [`new_in`](Self::new_in).
    pub fn try_new_in(
        max_alignment: usize,
        max_size: usize,
        reserve: usize,
        alloc: A,
    ) -> Result<Self, ListContainerError> {
        if !max_alignment.is_power_of_two() {
            return Err(ListContainerError::InvalidAlignment {
                alignment: max_alignment,
            });
        }
        let slot_stride = round_up(max_size.max(1), max_alignment)
            .ok_or(ListContainerError::CapacityOverflow)?;
        let capacity = if reserve == 0 { DEFAULT_RESERVE } else { reserve };

        let mut raw = Self {
            segments: Vec::new(),
            last: 0,
            len: 0,
            max_alignment,
            max_size,
            slot_stride,
            alloc,
        };
        let first = raw.try_allocate_segment(capacity)?;
        raw.segments.push(first);
        Ok(raw)
    }

    /// Returns the number of occupied slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slot is occupied.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the largest alignment `allocate` accepts.
    #[inline]
    pub fn max_alignment(&self) -> usize {
        self.max_alignment
    }

    /// Returns the largest size `allocate` accepts.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the distance in bytes between consecutive slots.
    #[inline]
    pub fn slot_stride(&self) -> usize {
        self.slot_stride
    }

    /// Returns the number of allocated segments, spares included.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Returns the total number of bytes held by all segments.
    pub fn capacity_bytes(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| segment.capacity * self.slot_stride)
            .sum()
    }

    /// Returns how many slots can be appended before a new segment is needed.
    pub fn available_without_allocation(&self) -> usize {
        self.segments[self.last..]
            .iter()
            .map(|segment| segment.capacity - segment.len)
            .sum()
    }

    /// Appends one slot and returns a pointer to it.
    ///
    /// The slot is uninitialized. Its address stays valid until it is removed
    /// or an invalidating operation runs.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` or `size` exceed the configured maximums.
    pub fn allocate(&mut self, alignment: usize, size: usize) -> NonNull<u8> {
        assert!(
            alignment <= self.max_alignment,
            "requested alignment {alignment} exceeds the configured maximum of {}",
            self.max_alignment
        );
        assert!(
            size <= self.max_size,
            "requested size {size} exceeds the configured maximum of {}",
            self.max_size
        );
        self.push_slot()
    }

    #[inline]
    fn push_slot(&mut self) -> NonNull<u8> {
        if self.segments[self.last].is_full() {
            self.advance_last_segment();
        }

        let stride = self.slot_stride;
        let segment = &mut self.segments[self.last];
        // Safety: the segment is not full, so `len < capacity`
        let slot = unsafe { segment.slot(segment.len, stride) };
        segment.len += 1;
        self.len += 1;
        slot
    }

    #[cold]
    #[inline(never)]
    fn advance_last_segment(&mut self) {
        if self.last + 1 < self.segments.len() {
            self.last += 1;
            return;
        }

        // Double the largest segment so small split segments do not restart growth
        let capacity = self
            .segments
            .iter()
            .map(|segment| segment.capacity)
            .max()
            .unwrap_or(DEFAULT_RESERVE)
            .checked_mul(2)
            .unwrap_or_else(|| panic!("list segment capacity overflow"));
        let segment = self.allocate_segment(capacity);
        self.segments.push(segment);
        self.last += 1;
    }

    /// Removes the last occupied slot.
    ///
    /// Does not free the slot's memory, so a pointer to it stays dereferenceable
    /// until the next mutation.
    ///
    /// # Panics
    ///
    /// Panics if the list is empty.
    pub fn remove_last(&mut self) {
        assert!(!self.is_empty(), "remove_last called on an empty list");

        let segment = &mut self.segments[self.last];
        segment.len -= 1;
        self.len -= 1;
        if segment.len == 0 && self.last > 0 {
            self.retire_last_segment();
        }
    }

    /// Steps `last` back after its segment emptied. The emptied segment becomes
    /// the spare, an older spare is freed.
    fn retire_last_segment(&mut self) {
        let removed = self.last;
        self.last -= 1;
        if removed + 1 < self.segments.len() {
            if let Some(spare) = self.segments.pop() {
                self.free_segment(spare);
            }
        }
    }

    /// Inserts `count` uninitialized slots before `position` and returns the
    /// position of the first new slot.
    ///
    /// Slots at or after `position` in the same segment may be moved. Slots in
    /// other segments keep their addresses, but callers must treat every
    /// previously obtained pointer and position as invalid.
    ///
    /// # Panics
    ///
    /// Panics if `position` is not a position of this list.
    pub fn insert_before(&mut self, position: RawPosition, count: usize) -> RawPosition {
        let position = self.normalize(position);
        if count == 0 {
            return position;
        }
        tracing::trace!(index = position.index, count, "inserting list slots");

        if position.segment == self.last && position.offset == self.segments[self.last].len {
            return self.append_slots(count);
        }
        assert!(
            position.offset < self.segments[position.segment].len,
            "insert position is out of range"
        );

        let stride = self.slot_stride;
        let RawPosition { segment: s, offset, index } = position;

        if offset == 0 {
            // Fill the previous segment's free tail, which moves nothing.
            if s > 0 {
                let previous = &mut self.segments[s - 1];
                if previous.capacity - previous.len >= count {
                    let start = previous.len;
                    previous.len += count;
                    self.len += count;
                    return RawPosition { segment: s - 1, offset: start, index };
                }
            }

            let mut fresh = self.allocate_segment(count);
            fresh.len = count;
            self.segments.insert(s, fresh);
            self.last += 1;
            self.len += count;
            return RawPosition { segment: s, offset: 0, index };
        }

        let segment = &mut self.segments[s];
        let tail = segment.len - offset;
        if segment.len + count <= segment.capacity {
            // Safety: both ranges lie within the segment's capacity
            unsafe {
                ptr::copy(
                    segment.slot(offset, stride).as_ptr(),
                    segment.slot(offset + count, stride).as_ptr(),
                    tail * stride,
                );
            }
            segment.len += count;
            self.len += count;
            return position;
        }

        // Split: the new slots and the moved tail form a new segment after `s`.
        let mut fresh = self.allocate_segment(count + tail);
        let segment = &mut self.segments[s];
        // Safety: `fresh` has room for `count + tail` slots and does not alias
        unsafe {
            ptr::copy_nonoverlapping(
                segment.slot(offset, stride).as_ptr(),
                fresh.slot(count, stride).as_ptr(),
                tail * stride,
            );
        }
        segment.len = offset;
        fresh.len = count + tail;
        self.segments.insert(s + 1, fresh);
        self.last += 1;
        self.len += count;
        RawPosition { segment: s + 1, offset: 0, index }
    }

    fn append_slots(&mut self, count: usize) -> RawPosition {
        let first = self.end();
        for _ in 0..count {
            self.push_slot();
        }
        self.normalize(first)
    }

    /// Removes the slot at `position` and returns the position of the slot
    /// that followed it, or `end()`.
    ///
    /// Following slots of the same segment move down by one. A segment left
    /// empty in the middle of the list is freed.
    ///
    /// # Panics
    ///
    /// Panics if `position` does not address an occupied slot.
    pub fn erase(&mut self, position: RawPosition) -> RawPosition {
        let position = self.normalize(position);
        assert!(
            position.segment <= self.last
                && position.offset < self.segments[position.segment].len,
            "erase position does not address an element"
        );
        tracing::trace!(index = position.index, "erasing list slot");

        let stride = self.slot_stride;
        let segment = &mut self.segments[position.segment];
        let following = segment.len - position.offset - 1;
        // Safety: `offset + 1 <= len <= capacity`, both ranges are in bounds
        unsafe {
            ptr::copy(
                segment.slot(position.offset + 1, stride).as_ptr(),
                segment.slot(position.offset, stride).as_ptr(),
                following * stride,
            );
        }
        segment.len -= 1;
        self.len -= 1;

        if segment.len > 0 {
            return self.normalize(position);
        }
        if position.segment < self.last {
            let emptied = self.segments.remove(position.segment);
            self.free_segment(emptied);
            self.last -= 1;
            return RawPosition {
                segment: position.segment,
                offset: 0,
                index: position.index,
            };
        }
        if self.last > 0 {
            self.retire_last_segment();
        }
        self.end()
    }

    /// Removes every slot, keeping only the first segment.
    pub fn clear(&mut self) {
        tracing::trace!(len = self.len, "clearing list");
        for segment in self.segments.split_off(1) {
            self.free_segment(segment);
        }
        self.segments[0].len = 0;
        self.last = 0;
        self.len = 0;
    }

    /// Returns the position of the first slot.
    #[inline]
    pub fn begin(&self) -> RawPosition {
        RawPosition { segment: 0, offset: 0, index: 0 }
    }

    /// Returns the position one past the last slot.
    #[inline]
    pub fn end(&self) -> RawPosition {
        RawPosition {
            segment: self.last,
            offset: self.segments[self.last].len,
            index: self.len,
        }
    }

    /// Returns the base of the first reverse position.
    ///
    /// Reverse positions are stored as the forward position one past the slot
    /// they refer to, so `rbegin()` is `end()` and `rend()` is `begin()`.
    #[inline]
    pub fn rbegin(&self) -> RawPosition {
        self.end()
    }

    /// Returns the base of the reverse end position.
    #[inline]
    pub fn rend(&self) -> RawPosition {
        self.begin()
    }

    /// Returns the position of the slot at logical `index`.
    ///
    /// Walks the segment list, so this is O(segment count).
    ///
    /// # Panics
    ///
    /// Panics if `index > len()`.
    pub fn position_at(&self, index: usize) -> RawPosition {
        assert!(
            index <= self.len,
            "index {index} out of range for list of length {}",
            self.len
        );
        let mut remaining = index;
        for (segment, s) in self.segments[..=self.last].iter().enumerate() {
            if remaining < s.len {
                return RawPosition { segment, offset: remaining, index };
            }
            remaining -= s.len;
        }
        self.end()
    }

    /// Moves `position` forward by one slot.
    #[inline]
    pub fn increment(&self, position: &mut RawPosition) {
        debug_assert!(position.index < self.len, "increment past the end of the list");
        position.offset += 1;
        position.index += 1;
        if position.offset == self.segments[position.segment].len && position.segment < self.last {
            position.segment += 1;
            position.offset = 0;
        }
    }

    /// Moves `position` backward by one slot. Applied to a reverse base, this
    /// advances the reverse position.
    #[inline]
    pub fn reverse_increment(&self, position: &mut RawPosition) {
        debug_assert!(position.index > 0, "reverse increment past the start of the list");
        if position.offset == 0 {
            position.segment -= 1;
            position.offset = self.segments[position.segment].len;
        }
        position.offset -= 1;
        position.index -= 1;
    }

    /// Returns the slot at `position`, or `None` if it does not address an
    /// occupied slot.
    pub fn slot(&self, position: RawPosition) -> Option<NonNull<u8>> {
        if position.segment > self.last {
            return None;
        }
        let segment = &self.segments[position.segment];
        if position.offset >= segment.len {
            return None;
        }
        // Safety: `offset < len <= capacity`
        Some(unsafe { segment.slot(position.offset, self.slot_stride) })
    }

    /// Returns the slot at `position` without checking it.
    ///
    /// # Safety
    ///
    /// `position` must address an occupied slot.
    #[inline]
    pub unsafe fn slot_unchecked(&self, position: RawPosition) -> NonNull<u8> {
        let segment = self.segments.get_unchecked(position.segment);
        segment.slot(position.offset, self.slot_stride)
    }

    /// Rewrites a position that sits one past the end of a non-last segment
    /// into the start of the next segment.
    #[inline]
    fn normalize(&self, mut position: RawPosition) -> RawPosition {
        if position.segment < self.last && position.offset == self.segments[position.segment].len {
            position.segment += 1;
            position.offset = 0;
        }
        position
    }

    fn segment_layout(&self, capacity: usize) -> Result<Layout, ListContainerError> {
        let bytes = capacity
            .checked_mul(self.slot_stride)
            .ok_or(ListContainerError::CapacityOverflow)?;
        Layout::from_size_align(bytes, self.max_alignment)
            .map_err(|_| ListContainerError::CapacityOverflow)
    }

    fn try_allocate_segment(&self, capacity: usize) -> Result<Segment, ListContainerError> {
        let layout = self.segment_layout(capacity)?;
        let ptr = self
            .alloc
            .allocate(layout)
            .map_err(|_| ListContainerError::AllocError { layout })?;
        tracing::debug!(capacity, bytes = layout.size(), "allocated list segment");
        Ok(Segment {
            ptr: ptr.cast(),
            capacity,
            len: 0,
        })
    }

    fn allocate_segment(&self, capacity: usize) -> Segment {
        match self.try_allocate_segment(capacity) {
            Ok(segment) => segment,
            Err(ListContainerError::AllocError { layout }) => handle_alloc_error(layout),
            Err(err) => panic!("{err}"),
        }
    }

    fn free_segment(&self, segment: Segment) {
        tracing::debug!(capacity = segment.capacity, "freeing list segment");
        // Safety: the same layout was validated when the segment was allocated
        unsafe {
            let layout = Layout::from_size_align_unchecked(
                segment.capacity * self.slot_stride,
                self.max_alignment,
            );
            self.alloc.deallocate(segment.ptr, layout);
        }
    }
}

impl<A: Allocator> Drop for RawListContainer<A> {
    fn drop(&mut self) {
        // Only frees memory. ListContainer drops the elements first.
        for segment in std::mem::take(&mut self.segments) {
            self.free_segment(segment);
        }
    }
}

// Safety: RawListContainer owns its segments and never touches their contents
unsafe impl<A: Allocator + Send> Send for RawListContainer<A> {}
unsafe impl<A: Allocator + Sync> Sync for RawListContainer<A> {}

/// Rounds `value` up to a multiple of `align`, which must be a power of two.
#[inline]
pub(crate) const fn round_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(padded) => Some(padded & !(align - 1)),
        None => None,
    }
}
