//! Iterator implementations for `ListContainer`.

use std::iter::FusedIterator;
use std::marker::PhantomData;

use allocator_api2::alloc::{Allocator, Global};

use crate::element::element_ptr;
use crate::raw_list::{RawListContainer, RawPosition};

/// An iterator over references to the elements of a `ListContainer`.
///
/// Use `.rev()` for reverse traversal.
pub struct Iter<'a, B: ?Sized, A: Allocator = Global> {
    raw: &'a RawListContainer<A>,
    header_offset: usize,
    /// Next element from the front
    front: RawPosition,
    /// One past the next element from the back
    back: RawPosition,
    remaining: usize,
    _marker: PhantomData<&'a B>,
}

impl<'a, B: ?Sized, A: Allocator> Iter<'a, B, A> {
    pub(crate) fn new(raw: &'a RawListContainer<A>, header_offset: usize) -> Self {
        Self {
            raw,
            header_offset,
            front: raw.begin(),
            back: raw.end(),
            remaining: raw.len(),
            _marker: PhantomData,
        }
    }
}

impl<'a, B: ?Sized, A: Allocator> Iterator for Iter<'a, B, A> {
    type Item = &'a B;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        // Safety: `remaining > 0`, so `front` addresses a live element
        let slot = unsafe { self.raw.slot_unchecked(self.front) };
        self.raw.increment(&mut self.front);
        self.remaining -= 1;
        Some(unsafe { element_ptr::<B>(slot, self.header_offset).as_ref() })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<B: ?Sized, A: Allocator> DoubleEndedIterator for Iter<'_, B, A> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.raw.reverse_increment(&mut self.back);
        self.remaining -= 1;
        // Safety: `back` now addresses the last element not yet yielded
        let slot = unsafe { self.raw.slot_unchecked(self.back) };
        Some(unsafe { element_ptr::<B>(slot, self.header_offset).as_ref() })
    }
}

impl<B: ?Sized, A: Allocator> ExactSizeIterator for Iter<'_, B, A> {}

impl<B: ?Sized, A: Allocator> FusedIterator for Iter<'_, B, A> {}

impl<B: ?Sized, A: Allocator> Clone for Iter<'_, B, A> {
    fn clone(&self) -> Self {
        Self { ..*self }
    }
}

/// An iterator over mutable references to the elements of a `ListContainer`.
pub struct IterMut<'a, B: ?Sized, A: Allocator = Global> {
    raw: &'a RawListContainer<A>,
    header_offset: usize,
    front: RawPosition,
    back: RawPosition,
    remaining: usize,
    _marker: PhantomData<&'a mut B>,
}

impl<'a, B: ?Sized, A: Allocator> IterMut<'a, B, A> {
    /// `raw` must be borrowed from a container that is exclusively borrowed
    /// for `'a`.
    pub(crate) fn new(raw: &'a RawListContainer<A>, header_offset: usize) -> Self {
        Self {
            raw,
            header_offset,
            front: raw.begin(),
            back: raw.end(),
            remaining: raw.len(),
            _marker: PhantomData,
        }
    }
}

impl<'a, B: ?Sized, A: Allocator> Iterator for IterMut<'a, B, A> {
    type Item = &'a mut B;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        // Safety: each live element is yielded at most once
        let slot = unsafe { self.raw.slot_unchecked(self.front) };
        self.raw.increment(&mut self.front);
        self.remaining -= 1;
        Some(unsafe { element_ptr::<B>(slot, self.header_offset).as_mut() })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<B: ?Sized, A: Allocator> DoubleEndedIterator for IterMut<'_, B, A> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.raw.reverse_increment(&mut self.back);
        self.remaining -= 1;
        let slot = unsafe { self.raw.slot_unchecked(self.back) };
        Some(unsafe { element_ptr::<B>(slot, self.header_offset).as_mut() })
    }
}

impl<B: ?Sized, A: Allocator> ExactSizeIterator for IterMut<'_, B, A> {}

impl<B: ?Sized, A: Allocator> FusedIterator for IterMut<'_, B, A> {}
