//! Paged bump-allocation space backing one heap generation.

use crate::heap::page::Page;
use crate::{GcFlag, SpaceKind};

/// An ordered sequence of pages with bump allocation.
///
/// Allocation rounds every request up to an even byte count so the low
/// bit of any heap address stays free for the value tagging scheme. When
/// the selected page is exhausted the space scans the remaining pages for
/// a gap and, failing that, appends a fresh page — raising the heap's
/// needs-gc flag first if the space has outgrown its soft limit.
/// Allocation itself never enters the collector; the mutator polls the
/// flag at safe points.
pub struct Space {
    kind: SpaceKind,
    pages: Vec<Page>,
    /// Index of the page currently selected for allocation.
    current: usize,
    page_size: usize,
    /// Bytes handed out and still resident in this space.
    size: usize,
    /// Soft limit; exceeding it requests a collection of this space.
    size_limit: usize,
    flag: GcFlag,
}

impl Space {
    /// Create a space that reports pressure through the heap's flag.
    pub fn new(kind: SpaceKind, page_size: usize, flag: GcFlag) -> Self {
        let mut space = Self {
            kind,
            pages: vec![Page::new(page_size)],
            current: 0,
            page_size,
            size: 0,
            size_limit: 0,
            flag,
        };
        space.compute_size_limit();
        space
    }

    /// Create a detached space (a to-space for one collection cycle).
    /// Its growth never raises a collection request.
    pub fn internal(kind: SpaceKind, page_size: usize) -> Self {
        Self::new(kind, page_size, GcFlag::new())
    }

    /// Allocate `bytes`, rounded up to an even count.
    ///
    /// The returned address is even and the requested bytes fit below the
    /// owning page's limit. Never returns null; page allocation failure
    /// is fatal.
    pub fn allocate(&mut self, bytes: usize) -> *mut u8 {
        let even_bytes = bytes + (bytes & 1);

        if !self.pages[self.current].fits(even_bytes) {
            // Scan the remaining pages for a gap.
            let gap = (self.current + 1..self.pages.len())
                .find(|&idx| self.pages[idx].fits(even_bytes));

            match gap {
                Some(idx) => self.current = idx,
                None => {
                    if self.size > self.size_limit {
                        self.flag.request(self.kind);
                    }
                    let page_bytes = round_up(even_bytes + 1, self.page_size);
                    self.pages.push(Page::new(page_bytes));
                    self.current = self.pages.len() - 1;
                }
            }
        }

        self.size += even_bytes;
        self.pages[self.current].bump(even_bytes)
    }

    /// Replace this space's pages with `other`'s.
    ///
    /// Used by the collector to swap a from-space for its to-space; the
    /// dropped pages die with `other`. Recomputes the soft limit for the
    /// next cycle.
    pub fn swap(&mut self, other: &mut Space) {
        std::mem::swap(&mut self.pages, &mut other.pages);
        std::mem::swap(&mut self.size, &mut other.size);
        std::mem::swap(&mut self.current, &mut other.current);
        self.compute_size_limit();
    }

    /// Release every page.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.pages.push(Page::new(self.page_size));
        self.current = 0;
        self.size = 0;
        self.compute_size_limit();
    }

    /// Set the next collection threshold proportional to occupied size.
    fn compute_size_limit(&mut self) {
        self.size_limit = (self.size * 2).max(self.page_size);
    }

    /// Check whether an address lies in any page of this space.
    pub fn contains(&self, addr: *const u8) -> bool {
        self.pages.iter().any(|page| page.contains(addr))
    }

    /// Bounds of the page containing `addr`, if any. Debug helper.
    pub fn page_bounds(&self, addr: *const u8) -> Option<(usize, usize)> {
        self.pages
            .iter()
            .find(|page| page.contains(addr))
            .map(|page| (page.start() as usize, page.start() as usize + page.limit()))
    }

    /// Bytes resident in this space.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current soft limit.
    #[inline]
    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    /// Default page size.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages.
    #[inline]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Which generation this space backs.
    #[inline]
    pub fn kind(&self) -> SpaceKind {
        self.kind
    }
}

/// Round `value` up to the next multiple of `multiple`.
#[inline]
fn round_up(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}
