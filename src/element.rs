//! Element type erasure.
//!
//! Every occupied slot starts with a header holding a monomorphized upcast
//! function for the concrete type stored in it. The payload follows at a fixed
//! offset, so a slot can be turned back into a `NonNull<B>` without knowing the
//! concrete type.

use std::ptr::NonNull;

/// A concrete type that can be stored in a `ListContainer<B>`.
///
/// # Safety
///
/// `upcast` must return a pointer to the same address it was given, only
/// attaching the metadata `B` needs (for example a trait object vtable).
/// Use [`impl_element!`](crate::impl_element) rather than implementing this
/// by hand.
pub unsafe trait Element<B: ?Sized>: Sized {
    /// Converts a pointer to `Self` into a pointer to the base type.
    fn upcast(ptr: NonNull<Self>) -> NonNull<B>;
}

// Safety: the identity keeps the address
unsafe impl<T> Element<T> for T {
    #[inline]
    fn upcast(ptr: NonNull<T>) -> NonNull<T> {
        ptr
    }
}

/// Implements [`Element`] for concrete types of a trait object base.
///
/// ```
/// use list_container::impl_element;
///
/// trait Quad {}
/// #[derive(Default)]
/// struct SolidColor;
/// #[derive(Default)]
/// struct Texture;
/// impl Quad for SolidColor {}
/// impl Quad for Texture {}
///
/// impl_element!(dyn Quad: SolidColor, Texture);
/// ```
#[macro_export]
macro_rules! impl_element {
    ($base:ty: $($derived:ty),+ $(,)?) => {
        $(
            unsafe impl $crate::Element<$base> for $derived {
                #[inline]
                fn upcast(ptr: ::core::ptr::NonNull<Self>) -> ::core::ptr::NonNull<$base> {
                    ptr
                }
            }
        )+
    };
}

/// Slot header: recovers the base pointer from the payload address.
pub(crate) type Upcast<B> = unsafe fn(NonNull<u8>) -> NonNull<B>;

unsafe fn upcast_erased<B: ?Sized, D: Element<B>>(payload: NonNull<u8>) -> NonNull<B> {
    D::upcast(payload.cast::<D>())
}

/// Writes the header for `D` into `slot` and returns the payload pointer.
///
/// # Safety
///
/// `slot` must be a slot of a container whose header offset is `header_offset`
/// and whose bounds fit `D`.
#[inline]
pub(crate) unsafe fn write_header<B: ?Sized, D: Element<B>>(
    slot: NonNull<u8>,
    header_offset: usize,
) -> NonNull<D> {
    slot.cast::<Upcast<B>>()
        .as_ptr()
        .write(upcast_erased::<B, D> as Upcast<B>);
    NonNull::new_unchecked(slot.as_ptr().add(header_offset)).cast()
}

/// Returns the base pointer of the element stored in `slot`.
///
/// # Safety
///
/// `slot` must hold a header written by [`write_header`] and a live element.
#[inline]
pub(crate) unsafe fn element_ptr<B: ?Sized>(slot: NonNull<u8>, header_offset: usize) -> NonNull<B> {
    let upcast = slot.cast::<Upcast<B>>().as_ptr().read();
    upcast(NonNull::new_unchecked(slot.as_ptr().add(header_offset)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of, MaybeUninit};

    trait Named {
        fn name(&self) -> &'static str;
    }

    struct Alpha(u8);
    struct Beta(u64);

    impl Named for Alpha {
        fn name(&self) -> &'static str {
            "alpha"
        }
    }

    impl Named for Beta {
        fn name(&self) -> &'static str {
            "beta"
        }
    }

    crate::impl_element!(dyn Named: Alpha, Beta);

    #[repr(C, align(8))]
    struct Slot([MaybeUninit<u8>; 16]);

    #[test]
    fn test_header_round_trip() {
        assert!(size_of::<Upcast<dyn Named>>() <= 8);
        assert!(align_of::<Beta>() <= 8);

        let mut slot = Slot([MaybeUninit::uninit(); 16]);
        let slot = NonNull::from(&mut slot).cast::<u8>();
        unsafe {
            write_header::<dyn Named, Beta>(slot, 8).as_ptr().write(Beta(7));
            let element = element_ptr::<dyn Named>(slot, 8);
            assert_eq!(element.as_ref().name(), "beta");
            assert_eq!(element.cast::<u8>(), NonNull::new_unchecked(slot.as_ptr().add(8)));
        }
    }

    #[test]
    fn test_identity_element() {
        let mut value = Alpha(3);
        let ptr = NonNull::from(&mut value);
        assert_eq!(<Alpha as Element<Alpha>>::upcast(ptr), ptr);
        assert_eq!(unsafe { ptr.as_ref() }.0, 3);
    }
}
