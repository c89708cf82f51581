//! A segmented container for heterogeneous elements with stable addresses.
//!
//! `ListContainer<B>` stores elements of different concrete types that share a
//! common base type `B` (usually a trait object) in fixed-size slots. Slots
//! live in segments that are never reallocated, so allocating new elements
//! never moves existing ones.
//!
//! # Example
//!
//! ```
//! use list_container::{impl_element, ListConfig, ListContainer};
//!
//! trait Shape {
//!     fn area(&self) -> f64;
//! }
//!
//! #[derive(Default)]
//! struct Square {
//!     side: f64,
//! }
//!
//! #[derive(Default)]
//! struct Rect {
//!     w: f64,
//!     h: f64,
//! }
//!
//! impl Shape for Square {
//!     fn area(&self) -> f64 {
//!         self.side * self.side
//!     }
//! }
//!
//! impl Shape for Rect {
//!     fn area(&self) -> f64 {
//!         self.w * self.h
//!     }
//! }
//!
//! impl_element!(dyn Shape: Square, Rect);
//!
//! let config = ListConfig::new().fit::<Square>().fit::<Rect>();
//! let mut shapes: ListContainer<dyn Shape> = ListContainer::with_config(config);
//!
//! shapes.allocate_and_construct::<Square>().side = 2.0;
//! let rect: *const Rect = shapes.allocate_with(Rect { w: 1.0, h: 3.0 });
//!
//! for _ in 0..100 {
//!     shapes.allocate_and_construct::<Square>();
//! }
//!
//! // The pointer is still valid
//! assert_eq!(unsafe { (*rect).h }, 3.0);
//!
//! let total: f64 = shapes.iter().map(|shape| shape.area()).sum();
//! assert_eq!(total, 7.0);
//! ```
//!
//! # Invalidation
//!
//! Only the operations named `*_and_invalidate_all_pointers` and `clear` may
//! relocate elements. They move at most the elements that follow the affected
//! position inside its segment, but every reference, pointer and [`Position`]
//! obtained before the call must be treated as dead afterwards. Fresh positions
//! are returned by the operations themselves.

mod config;
mod element;
mod error;
mod iter;
mod position;
pub mod raw_list;

pub use config::ListConfig;
pub use element::Element;
pub use error::ListContainerError;
pub use iter::{Iter, IterMut};
pub use position::{Position, ReversePosition};

use allocator_api2::alloc::{Allocator, Global};
use element::{element_ptr, write_header, Upcast};
use raw_list::{round_up, RawListContainer, RawPosition};
use std::alloc::handle_alloc_error;
use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, align_of, size_of};
use std::ptr::{self, NonNull};

/// A container of elements sharing the base type `B`.
///
/// Each slot holds a small header followed by the element. The header lets the
/// container recover a `B` pointer and drop the element without knowing its
/// concrete type.
///
/// # Memory Layout
///
/// Slots are `header + max_size` bytes rounded up to the maximum alignment.
/// The first segment holds the reserved number of slots, later segments
/// double in capacity. Segments are freed only by `clear`, by erasing every
/// element of a middle segment, or when more than one empty segment trails
/// the list.
pub struct ListContainer<B: ?Sized, A: Allocator = Global> {
    raw: RawListContainer<A>,
    /// Offset of the element within its slot
    header_offset: usize,
    max_alignment: usize,
    max_size: usize,
    /// Bumped by every invalidating operation
    generation: u32,
    _marker: PhantomData<Box<B>>,
}

impl<B: ?Sized> ListContainer<B> {
    /// Creates an empty container for elements up to `max_size` bytes with
    /// alignment up to `max_alignment`.
    ///
    /// The first segment is allocated up front and holds `reserve` elements,
    /// or a default number when `reserve` is zero.
    ///
    /// # Panics
    ///
    /// Panics if `max_alignment` is not a power of two or the sizes overflow.
    pub fn new(max_alignment: usize, max_size: usize, reserve: usize) -> Self {
        Self::new_in(max_alignment, max_size, reserve, Global)
    }

    /// Creates an empty container from a [`ListConfig`].
    pub fn with_config(config: ListConfig) -> Self {
        Self::with_config_in(config, Global)
    }
}

impl<B: ?Sized, A: Allocator> ListContainer<B, A> {
    /// Like [`new`](ListContainer::new), allocating from `alloc`.
    pub fn new_in(max_alignment: usize, max_size: usize, reserve: usize, alloc: A) -> Self {
        let config = ListConfig::with_bounds(max_alignment, max_size).reserve(reserve);
        Self::with_config_in(config, alloc)
    }

    /// Like [`with_config`](ListContainer::with_config), allocating from `alloc`.
    pub fn with_config_in(config: ListConfig, alloc: A) -> Self {
        match Self::try_with_config_in(config, alloc) {
            Ok(list) => list,
            Err(ListContainerError::AllocError { layout }) => handle_alloc_error(layout),
            Err(err) => panic!("invalid list configuration: {err}"),
        }
    }

    /// Fallible constructor.
    ///
    /// Returns an error if the maximum alignment is not a power of two, the
    /// slot size overflows, or the first segment cannot be allocated.
    pub fn try_with_config_in(config: ListConfig, alloc: A) -> Result<Self, ListContainerError> {
        let max_alignment = config.max_alignment();
        if !max_alignment.is_power_of_two() {
            return Err(ListContainerError::InvalidAlignment {
                alignment: max_alignment,
            });
        }
        let slot_alignment = max_alignment.max(align_of::<Upcast<B>>());
        let header_offset = round_up(size_of::<Upcast<B>>(), slot_alignment)
            .ok_or(ListContainerError::CapacityOverflow)?;
        let slot_size = header_offset
            .checked_add(config.max_size())
            .ok_or(ListContainerError::CapacityOverflow)?;

        let raw = RawListContainer::try_new_in(slot_alignment, slot_size, config.reservation(), alloc)?;
        Ok(Self {
            raw,
            header_offset,
            max_alignment,
            max_size: config.max_size(),
            generation: 0,
            _marker: PhantomData,
        })
    }

    /// Returns the number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the container holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns the number of bytes reserved by all segments.
    pub fn capacity_bytes(&self) -> usize {
        self.raw.capacity_bytes()
    }

    /// Returns how many elements can be added before another segment is
    /// allocated.
    pub fn available_without_allocation(&self) -> usize {
        self.raw.available_without_allocation()
    }

    /// Default-constructs a `D` in a new slot at the end.
    ///
    /// # Panics
    ///
    /// Panics if `D` is larger or more aligned than the configured bounds.
    #[inline]
    pub fn allocate_and_construct<D>(&mut self) -> &mut D
    where
        D: Element<B> + Default,
    {
        self.allocate_with(D::default())
    }

    /// Clones `source` into a new slot at the end.
    #[inline]
    pub fn allocate_and_copy_from<D>(&mut self, source: &D) -> &mut D
    where
        D: Element<B> + Clone,
    {
        self.allocate_with(source.clone())
    }

    /// Moves `value` into a new slot at the end.
    ///
    /// Existing elements are not moved, so pointers to them stay valid.
    ///
    /// # Panics
    ///
    /// Panics if `D` is larger or more aligned than the configured bounds.
    pub fn allocate_with<D: Element<B>>(&mut self, value: D) -> &mut D {
        self.check_fits::<D>();
        let slot = self
            .raw
            .allocate(align_of::<D>(), self.header_offset + size_of::<D>());
        // Safety: the slot is fresh and sized for `D`
        unsafe {
            let element = write_header::<B, D>(slot, self.header_offset);
            element.as_ptr().write(value);
            &mut *element.as_ptr()
        }
    }

    /// Drops the element at `at` and default-constructs a `D` in the same
    /// slot, at the same address.
    ///
    /// # Panics
    ///
    /// Panics if `at` does not address an element or `D` does not fit.
    pub fn replace_existing_element<D>(&mut self, at: Position) -> &mut D
    where
        D: Element<B> + Default,
    {
        self.check_generation(at.generation);
        self.check_fits::<D>();
        let value = D::default();
        let slot = self.slot(at.raw, "replace");

        // Safety: the slot holds a live element, which is dropped exactly once
        unsafe {
            let old = element_ptr::<B>(slot, self.header_offset);
            let guard = EraseGuard::new(&mut self.raw, &mut self.generation, at.raw);
            ptr::drop_in_place(old.as_ptr());
            mem::forget(guard);

            let element = write_header::<B, D>(slot, self.header_offset);
            element.as_ptr().write(value);
            &mut *element.as_ptr()
        }
    }

    /// Drops the last element.
    ///
    /// # Panics
    ///
    /// Panics if the container is empty.
    pub fn remove_last(&mut self) {
        assert!(!self.is_empty(), "remove_last called on an empty ListContainer");
        let mut last = self.raw.end();
        self.raw.reverse_increment(&mut last);

        // Safety: `last` addresses the last element. remove_last keeps the
        // slot's memory allocated, so it is dropped after the bookkeeping.
        unsafe {
            let element = element_ptr::<B>(self.raw.slot_unchecked(last), self.header_offset);
            self.raw.remove_last();
            ptr::drop_in_place(element.as_ptr());
        }
    }

    /// Drops the element at `at` and removes its slot.
    ///
    /// Returns the position of the element that followed it, or `end()`.
    /// All other positions, references and pointers are invalidated.
    ///
    /// # Panics
    ///
    /// Panics if `at` does not address an element.
    pub fn erase_and_invalidate_all_pointers(&mut self, at: Position) -> Position {
        self.check_generation(at.generation);
        let slot = self.slot(at.raw, "erase");
        self.generation = self.generation.wrapping_add(1);

        // Safety: the slot holds a live element. The guard removes the slot
        // even if the element's destructor panics.
        let next = unsafe {
            let element = element_ptr::<B>(slot, self.header_offset);
            let guard = EraseGuard::new(&mut self.raw, &mut self.generation, at.raw);
            ptr::drop_in_place(element.as_ptr());
            guard.finish()
        };
        Position::new(next, self.generation)
    }

    /// Inserts `count` default-constructed `D`s before `at`.
    ///
    /// Returns the position of the first inserted element. All previously
    /// obtained positions, references and pointers are invalidated.
    ///
    /// # Panics
    ///
    /// Panics if `at` is not a position of this container or `D` does not fit.
    pub fn insert_before_and_invalidate_all_pointers<D>(&mut self, at: Position, count: usize) -> Position
    where
        D: Element<B> + Default,
    {
        self.check_generation(at.generation);
        self.check_fits::<D>();
        // Construct first so a panicking `default` leaves no uninitialized slots
        let values: Vec<D> = std::iter::repeat_with(D::default).take(count).collect();

        self.generation = self.generation.wrapping_add(1);
        let first = self.raw.insert_before(at.raw, count);
        let mut position = first;
        for value in values {
            // Safety: `position` walks the `count` fresh slots
            unsafe {
                let slot = self.raw.slot_unchecked(position);
                write_header::<B, D>(slot, self.header_offset)
                    .as_ptr()
                    .write(value);
            }
            self.raw.increment(&mut position);
        }
        Position::new(first, self.generation)
    }

    /// Inserts `count` default-constructed `D`s after `at`, or at the end when
    /// `at` is `end()`.
    ///
    /// Returns the position of the first inserted element. All previously
    /// obtained positions, references and pointers are invalidated.
    pub fn insert_after_and_invalidate_all_pointers<D>(&mut self, at: Position, count: usize) -> Position
    where
        D: Element<B> + Default,
    {
        let mut at = at;
        if at != self.end() {
            self.advance(&mut at);
        }
        self.insert_before_and_invalidate_all_pointers::<D>(at, count)
    }

    /// Drops every element. The first segment is kept for reuse.
    pub fn clear(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.drop_elements();
    }

    /// Returns the first element, or `None` if empty.
    #[inline]
    pub fn first(&self) -> Option<&B> {
        self.get(0)
    }

    /// Returns the first element, or `None` if empty.
    #[inline]
    pub fn first_mut(&mut self) -> Option<&mut B> {
        self.get_mut(0)
    }

    /// Returns the last element, or `None` if empty.
    pub fn last(&self) -> Option<&B> {
        if self.is_empty() {
            return None;
        }
        let mut last = self.raw.end();
        self.raw.reverse_increment(&mut last);
        // Safety: the list is not empty
        Some(unsafe { self.element_ref(last) })
    }

    /// Returns the last element, or `None` if empty.
    pub fn last_mut(&mut self) -> Option<&mut B> {
        if self.is_empty() {
            return None;
        }
        let mut last = self.raw.end();
        self.raw.reverse_increment(&mut last);
        // Safety: the list is not empty
        Some(unsafe { self.element_mut(last) })
    }

    /// Returns the first element.
    ///
    /// # Panics
    ///
    /// Panics if the container is empty.
    pub fn front(&self) -> &B {
        match self.first() {
            Some(element) => element,
            None => panic!("front called on an empty ListContainer"),
        }
    }

    /// Returns the first element.
    ///
    /// # Panics
    ///
    /// Panics if the container is empty.
    pub fn front_mut(&mut self) -> &mut B {
        match self.first_mut() {
            Some(element) => element,
            None => panic!("front_mut called on an empty ListContainer"),
        }
    }

    /// Returns the last element.
    ///
    /// # Panics
    ///
    /// Panics if the container is empty.
    pub fn back(&self) -> &B {
        match self.last() {
            Some(element) => element,
            None => panic!("back called on an empty ListContainer"),
        }
    }

    /// Returns the last element.
    ///
    /// # Panics
    ///
    /// Panics if the container is empty.
    pub fn back_mut(&mut self) -> &mut B {
        match self.last_mut() {
            Some(element) => element,
            None => panic!("back_mut called on an empty ListContainer"),
        }
    }

    /// Returns the element at `index`, or `None` if out of bounds.
    ///
    /// Walks the segment list, so this is O(segment count).
    pub fn get(&self, index: usize) -> Option<&B> {
        if index >= self.len() {
            return None;
        }
        let position = self.raw.position_at(index);
        // Safety: `index < len`
        Some(unsafe { self.element_ref(position) })
    }

    /// Returns the element at `index`, or `None` if out of bounds.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut B> {
        if index >= self.len() {
            return None;
        }
        let position = self.raw.position_at(index);
        // Safety: `index < len`
        Some(unsafe { self.element_mut(position) })
    }

    /// Returns the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn element_at(&self, index: usize) -> &B {
        let len = self.len();
        match self.get(index) {
            Some(element) => element,
            None => panic!("index {index} out of range for ListContainer of length {len}"),
        }
    }

    /// Returns the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn element_at_mut(&mut self, index: usize) -> &mut B {
        let len = self.len();
        match self.get_mut(index) {
            Some(element) => element,
            None => panic!("index {index} out of range for ListContainer of length {len}"),
        }
    }

    /// Returns the position of the first element.
    #[inline]
    pub fn begin(&self) -> Position {
        Position::new(self.raw.begin(), self.generation)
    }

    /// Returns the position one past the last element.
    #[inline]
    pub fn end(&self) -> Position {
        Position::new(self.raw.end(), self.generation)
    }

    /// Returns the reverse position of the last element.
    #[inline]
    pub fn rbegin(&self) -> ReversePosition {
        ReversePosition::new(self.raw.rbegin(), self.generation)
    }

    /// Returns the reverse position one before the first element.
    #[inline]
    pub fn rend(&self) -> ReversePosition {
        ReversePosition::new(self.raw.rend(), self.generation)
    }

    /// Returns the position of the element at `index`, or `end()` for
    /// `index == len()`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len()`.
    pub fn position_at(&self, index: usize) -> Position {
        Position::new(self.raw.position_at(index), self.generation)
    }

    /// Moves `position` to the next element.
    ///
    /// # Panics
    ///
    /// Panics if `position` is `end()`.
    pub fn advance(&self, position: &mut Position) {
        self.check_generation(position.generation);
        assert!(position.index() < self.len(), "cannot advance past end()");
        self.raw.increment(&mut position.raw);
    }

    /// Moves `position` to the previous element in forward order.
    ///
    /// # Panics
    ///
    /// Panics if `position` is `rend()`.
    pub fn advance_rev(&self, position: &mut ReversePosition) {
        self.check_generation(position.generation);
        assert!(position.base.index > 0, "cannot advance past rend()");
        self.raw.reverse_increment(&mut position.base);
    }

    /// Returns the element at `position`, or `None` for `end()`.
    pub fn at(&self, position: Position) -> Option<&B> {
        self.check_generation(position.generation);
        let slot = self.raw.slot(position.raw)?;
        // Safety: `slot` checked the position addresses a live element
        Some(unsafe { element_ptr::<B>(slot, self.header_offset).as_ref() })
    }

    /// Returns the element at `position`, or `None` for `end()`.
    pub fn at_mut(&mut self, position: Position) -> Option<&mut B> {
        self.check_generation(position.generation);
        let slot = self.raw.slot(position.raw)?;
        // Safety: `slot` checked the position addresses a live element
        Some(unsafe { element_ptr::<B>(slot, self.header_offset).as_mut() })
    }

    /// Returns the element at a reverse position, or `None` for `rend()`.
    pub fn at_rev(&self, position: ReversePosition) -> Option<&B> {
        self.check_generation(position.generation);
        if position.base.index == 0 {
            return None;
        }
        let mut raw = position.base;
        self.raw.reverse_increment(&mut raw);
        self.at(Position::new(raw, position.generation))
    }

    /// Returns an iterator over the elements in order.
    #[inline]
    pub fn iter(&self) -> Iter<'_, B, A> {
        Iter::new(&self.raw, self.header_offset)
    }

    /// Returns an iterator over mutable references to the elements in order.
    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, B, A> {
        IterMut::new(&self.raw, self.header_offset)
    }

    #[inline]
    fn check_fits<D>(&self) {
        assert!(
            align_of::<D>() <= self.max_alignment,
            "element alignment {} exceeds the configured maximum of {}",
            align_of::<D>(),
            self.max_alignment
        );
        assert!(
            size_of::<D>() <= self.max_size,
            "element size {} exceeds the configured maximum of {}",
            size_of::<D>(),
            self.max_size
        );
    }

    #[inline]
    fn check_generation(&self, generation: u32) {
        debug_assert_eq!(
            generation, self.generation,
            "position used after an invalidating operation"
        );
    }

    fn slot(&self, position: RawPosition, operation: &str) -> NonNull<u8> {
        match self.raw.slot(position) {
            Some(slot) => slot,
            None => panic!("{operation} position does not address an element"),
        }
    }

    /// # Safety
    ///
    /// `position` must address a live element.
    #[inline]
    unsafe fn element_ref(&self, position: RawPosition) -> &B {
        element_ptr::<B>(self.raw.slot_unchecked(position), self.header_offset).as_ref()
    }

    /// # Safety
    ///
    /// `position` must address a live element.
    #[inline]
    unsafe fn element_mut(&mut self, position: RawPosition) -> &mut B {
        element_ptr::<B>(self.raw.slot_unchecked(position), self.header_offset).as_mut()
    }

    /// Drops every element in forward order, then resets the bookkeeping. If a
    /// destructor panics the remaining elements are leaked, never dropped twice.
    fn drop_elements(&mut self) {
        let header_offset = self.header_offset;
        let guard = ClearGuard(&mut self.raw);
        let mut position = guard.0.begin();
        for _ in 0..guard.0.len() {
            // Safety: `position` walks the live elements exactly once
            unsafe {
                let slot = guard.0.slot_unchecked(position);
                guard.0.increment(&mut position);
                ptr::drop_in_place(element_ptr::<B>(slot, header_offset).as_ptr());
            }
        }
    }
}

impl<B: ?Sized, A: Allocator> Drop for ListContainer<B, A> {
    fn drop(&mut self) {
        self.drop_elements();
        // RawListContainer frees the segments when it is dropped
    }
}

impl<B: ?Sized + fmt::Debug, A: Allocator> fmt::Debug for ListContainer<B, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, B: ?Sized, A: Allocator> IntoIterator for &'a ListContainer<B, A> {
    type Item = &'a B;
    type IntoIter = Iter<'a, B, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, B: ?Sized, A: Allocator> IntoIterator for &'a mut ListContainer<B, A> {
    type Item = &'a mut B;
    type IntoIter = IterMut<'a, B, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// Removes a slot from the bookkeeping once its element has been dropped,
/// including when the drop unwinds. Unwinding also invalidates positions.
struct EraseGuard<'a, A: Allocator> {
    raw: &'a mut RawListContainer<A>,
    generation: &'a mut u32,
    at: RawPosition,
}

impl<'a, A: Allocator> EraseGuard<'a, A> {
    fn new(raw: &'a mut RawListContainer<A>, generation: &'a mut u32, at: RawPosition) -> Self {
        Self { raw, generation, at }
    }

    fn finish(self) -> RawPosition {
        let at = self.at;
        let mut this = mem::ManuallyDrop::new(self);
        this.raw.erase(at)
    }
}

impl<A: Allocator> Drop for EraseGuard<'_, A> {
    fn drop(&mut self) {
        *self.generation = self.generation.wrapping_add(1);
        self.raw.erase(self.at);
    }
}

/// Resets the bookkeeping after the elements have been dropped.
struct ClearGuard<'a, A: Allocator>(&'a mut RawListContainer<A>);

impl<A: Allocator> Drop for ClearGuard<'_, A> {
    fn drop(&mut self) {
        self.0.clear();
    }
}
