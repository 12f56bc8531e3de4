use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;

/// Bytes available for a callable stored directly in a closure's slot.
///
/// A callable goes inline iff its size fits in one pointer and its alignment
/// does not exceed a pointer's; everything else is boxed.
pub const INLINE_CAPACITY: usize = mem::size_of::<*mut ()>();

/// Whether values of type `F` are stored inline.
pub const fn fits_inline<F>() -> bool {
    mem::size_of::<F>() <= INLINE_CAPACITY && mem::align_of::<F>() <= mem::align_of::<*mut ()>()
}

/// The single storage slot of a [`TaskClosure`](crate::TaskClosure).
///
/// The slot does not know what it holds. Only the operation table bound next
/// to it can read, drop, or free the contents, so a `Slot` never drops its
/// contents on its own.
#[derive(Debug)]
pub enum Slot {
    /// Nothing stored.
    Empty,
    /// The callable's bytes, stored in place.
    Inline(MaybeUninit<*mut ()>),
    /// A heap block holding the callable.
    Boxed(NonNull<()>),
}

impl Slot {
    /// Move `value` into a fresh slot, boxing it when it does not fit inline.
    pub(crate) fn new<F>(value: F) -> Self {
        if fits_inline::<F>() {
            let mut bytes = MaybeUninit::<*mut ()>::uninit();
            // SAFETY: `F` fits in the size and alignment of the inline storage.
            unsafe { bytes.as_mut_ptr().cast::<F>().write(value) };
            Slot::Inline(bytes)
        } else {
            let block = Box::into_raw(Box::new(value));
            // SAFETY: `Box::into_raw` never returns null.
            Slot::Boxed(unsafe { NonNull::new_unchecked(block) }.cast())
        }
    }

    /// Construct `value` over storage whose previous `F` has been destructed.
    ///
    /// # Safety
    ///
    /// The slot must have been created by [`Slot::new::<F>`] and its value
    /// must already have been dropped in place.
    pub(crate) unsafe fn rebuild<F>(&mut self, value: F) {
        match self {
            Slot::Inline(bytes) => bytes.as_mut_ptr().cast::<F>().write(value),
            Slot::Boxed(block) => block.as_ptr().cast::<F>().write(value),
            Slot::Empty => *self = Slot::new(value),
        }
    }

    /// Pointer to the stored `F`, if anything is stored.
    ///
    /// # Safety
    ///
    /// The slot must have been created by [`Slot::new::<F>`].
    pub(crate) unsafe fn value_ptr<F>(&mut self) -> Option<*mut F> {
        match self {
            Slot::Empty => None,
            Slot::Inline(bytes) => Some(bytes.as_mut_ptr().cast::<F>()),
            Slot::Boxed(block) => Some(block.as_ptr().cast::<F>()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Slot::Inline(_))
    }

    pub fn is_boxed(&self) -> bool {
        matches!(self, Slot::Boxed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_capacity_is_pointer_width() {
        assert_eq!(INLINE_CAPACITY, mem::size_of::<usize>());
    }

    #[test]
    fn pointer_sized_values_go_inline() {
        assert!(fits_inline::<()>());
        assert!(fits_inline::<u8>());
        assert!(fits_inline::<usize>());
        assert!(fits_inline::<&'static u64>());
        assert!(!fits_inline::<[usize; 2]>());
    }

    #[test]
    fn over_aligned_values_are_boxed() {
        #[repr(align(64))]
        struct Wide(u8);
        let _ = Wide(0).0;
        assert!(!fits_inline::<Wide>());
    }

    #[test]
    fn new_picks_storage_by_size() {
        let mut small = Slot::new(5u32);
        assert!(small.is_inline());
        // SAFETY: created from `u32` above.
        unsafe { assert_eq!(*small.value_ptr::<u32>().unwrap(), 5) };

        let mut large = Slot::new([1u64, 2, 3]);
        assert!(large.is_boxed());
        // SAFETY: created from `[u64; 3]` above; freed exactly once below.
        unsafe {
            assert_eq!(*large.value_ptr::<[u64; 3]>().unwrap(), [1, 2, 3]);
            if let Slot::Boxed(block) = large {
                drop(Box::from_raw(block.as_ptr().cast::<[u64; 3]>()));
            }
        }
    }
}
