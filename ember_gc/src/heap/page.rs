//! A single contiguous allocation region.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

use ember_core::layout::WORD_SIZE;

/// A contiguous byte region with a bump cursor.
///
/// `top` is the offset of the next free byte; `limit` is one past the
/// end. The buffer is word-aligned and zero-initialised, so a freshly
/// bumped address starts even and stays even as long as every request is
/// rounded to an even size (the space guarantees that).
pub struct Page {
    data: NonNull<u8>,
    top: usize,
    limit: usize,
}

impl Page {
    /// Allocate a page of `size` bytes. Allocation failure is fatal.
    pub fn new(size: usize) -> Self {
        let layout = Layout::from_size_align(size, WORD_SIZE).expect("invalid page layout");

        // SAFETY: layout has non-zero size and valid alignment.
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(data) = NonNull::new(ptr) else {
            handle_alloc_error(layout);
        };

        Self {
            data,
            top: 0,
            limit: size,
        }
    }

    /// Check whether `bytes` more fit below the limit.
    #[inline]
    pub fn fits(&self, bytes: usize) -> bool {
        self.top + bytes <= self.limit
    }

    /// Bump the cursor by `bytes` and return the previous top.
    ///
    /// Callers must check [`fits`](Self::fits) first.
    #[inline]
    pub fn bump(&mut self, bytes: usize) -> *mut u8 {
        debug_assert!(self.fits(bytes));
        // SAFETY: top + bytes <= limit, so the offset stays in bounds.
        let result = unsafe { self.data.as_ptr().add(self.top) };
        self.top += bytes;
        result
    }

    /// Check whether an address lies within this page's buffer.
    #[inline]
    pub fn contains(&self, addr: *const u8) -> bool {
        let start = self.data.as_ptr() as usize;
        let addr = addr as usize;
        addr >= start && addr < start + self.limit
    }

    /// Start of the buffer.
    #[inline]
    pub fn start(&self) -> *mut u8 {
        self.data.as_ptr()
    }

    /// Offset of the next free byte.
    #[inline]
    pub fn top(&self) -> usize {
        self.top
    }

    /// One past the last usable byte offset.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        let layout =
            Layout::from_size_align(self.limit, WORD_SIZE).expect("invalid page layout");
        // SAFETY: data was allocated with exactly this layout in Page::new.
        unsafe { dealloc(self.data.as_ptr(), layout) };
    }
}

// SAFETY: the page owns its buffer exclusively.
unsafe impl Send for Page {}
