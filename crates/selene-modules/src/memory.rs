//! Bounded sequences over memory supplied by a block allocator.
//!
//! [`FixedSeq`] is a fixed-length, bounds-checked sequence that obtains its
//! storage from a [`BlockAllocator`]. [`ForeignBlock`] is the allocator for
//! memory someone else owns, such as a userdata block held by Lua:
//! `allocate` hands back the existing block and `deallocate` does nothing,
//! so the sequence never allocates, copies or frees.
//!
//! ```
//! use selene_modules::memory::{FixedSeq, ForeignBlock};
//!
//! let mut backing = [0.0f64; 4];
//! {
//!     let mut seq = FixedSeq::with_len_in(4, ForeignBlock::new(&mut backing)).unwrap();
//!     *seq.at_mut(2).unwrap() = 7.5;
//!     assert!(seq.at(4).is_err());
//! }
//! assert_eq!(backing[2], 7.5);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::slice;

use thiserror::Error;

/// Errors from block allocation and bounds-checked access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("index {index} out of range for length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("requested {requested} elements from a block of {capacity}")]
    Capacity { requested: usize, capacity: usize },
}

/// Source of storage for a [`FixedSeq`].
///
/// # Safety
///
/// A pointer returned by `allocate(len)` must be aligned for `T` and valid
/// for reads and writes of `len` initialised values of `T` until it is
/// passed to `deallocate` or the allocator itself is dropped.
pub unsafe trait BlockAllocator<T> {
    fn allocate(&mut self, len: usize) -> Result<NonNull<T>, BlockError>;

    /// # Safety
    ///
    /// `ptr` and `len` must come from a prior `allocate` on this allocator.
    unsafe fn deallocate(&mut self, ptr: NonNull<T>, len: usize);
}

/// Non-owning allocator over an existing block.
///
/// The lifetime ties the allocator, and any sequence built on it, to the
/// borrow of the block, so the view cannot outlive the memory it covers.
pub struct ForeignBlock<'a, T> {
    ptr: NonNull<T>,
    capacity: usize,
    _block: PhantomData<&'a mut [T]>,
}

impl<'a, T> ForeignBlock<'a, T> {
    /// View a mutable slice as a block.
    pub fn new(block: &'a mut [T]) -> Self {
        Self {
            capacity: block.len(),
            ptr: NonNull::from(block).cast(),
            _block: PhantomData,
        }
    }

    /// View `capacity` elements starting at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be aligned and valid for reads and writes of `capacity`
    /// initialised values of `T` for all of `'a`, and no other reference
    /// may access that memory while the view is alive.
    pub unsafe fn from_raw(ptr: NonNull<T>, capacity: usize) -> Self {
        Self {
            ptr,
            capacity,
            _block: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// SAFETY: the pointer covers `capacity` initialised elements for 'a (by
// construction) and is handed out only for lengths within that capacity.
unsafe impl<T> BlockAllocator<T> for ForeignBlock<'_, T> {
    fn allocate(&mut self, len: usize) -> Result<NonNull<T>, BlockError> {
        if len > self.capacity {
            return Err(BlockError::Capacity {
                requested: len,
                capacity: self.capacity,
            });
        }
        Ok(self.ptr)
    }

    unsafe fn deallocate(&mut self, _ptr: NonNull<T>, _len: usize) {}
}

impl<T> fmt::Debug for ForeignBlock<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignBlock")
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// A fixed-length, bounds-checked sequence over allocator-provided storage.
pub struct FixedSeq<T: Copy, A: BlockAllocator<T>> {
    ptr: NonNull<T>,
    len: usize,
    alloc: A,
}

impl<T: Copy, A: BlockAllocator<T>> FixedSeq<T, A> {
    /// Obtain storage for `len` elements from `alloc`.
    ///
    /// The elements start with whatever the allocator provides, which for
    /// a [`ForeignBlock`] is the existing contents.
    pub fn with_len_in(len: usize, mut alloc: A) -> Result<Self, BlockError> {
        let ptr = alloc.allocate(len)?;
        Ok(Self { ptr, len, alloc })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bounds-checked element access.
    pub fn at(&self, index: usize) -> Result<&T, BlockError> {
        self.as_slice().get(index).ok_or(BlockError::OutOfRange {
            index,
            len: self.len,
        })
    }

    /// Bounds-checked mutable element access.
    pub fn at_mut(&mut self, index: usize) -> Result<&mut T, BlockError> {
        let len = self.len;
        self.as_mut_slice()
            .get_mut(index)
            .ok_or(BlockError::OutOfRange { index, len })
    }

    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the allocator contract guarantees `len` initialised,
        // aligned elements behind `ptr` while `self` is alive.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as for `as_slice`; `&mut self` guarantees uniqueness.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T: Copy, A: BlockAllocator<T>> Drop for FixedSeq<T, A> {
    fn drop(&mut self) {
        // SAFETY: ptr and len came from `allocate` on this allocator.
        unsafe { self.alloc.deallocate(self.ptr, self.len) };
    }
}

impl<T: Copy + fmt::Debug, A: BlockAllocator<T>> fmt::Debug for FixedSeq<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'s, T: Copy, A: BlockAllocator<T>> IntoIterator for &'s FixedSeq<T, A> {
    type Item = &'s T;
    type IntoIter = slice::Iter<'s, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
