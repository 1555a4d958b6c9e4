//! Fixed-size page arena for per-node storage.
//!
//! Element `i` lives in page `i >> page_shift` at offset `i & (page_size - 1)`.
//! Pages are allocated fallibly, so a graph too large for memory surfaces as
//! an [`AllocationError`] instead of aborting the process.
//!
//! [`PagedArray::split_mut`] hands out disjoint mutable views over contiguous
//! index ranges. The engine gives one view to each worker for the lifetime of
//! a run, which is what makes per-node value writes lock-free.

use std::ops::Range;

use crate::error::AllocationError;

/// Default page size as a power of two (16384 elements).
pub const DEFAULT_PAGE_SHIFT: u32 = 14;

/// Per-node storage split into fixed-size pages.
#[derive(Debug)]
pub struct PagedArray<T> {
    pages: Vec<Box<[T]>>,
    len: usize,
    page_shift: u32,
}

impl<T> PagedArray<T> {
    /// Allocates `len` elements using the default page size, initializing
    /// element `i` with `init(i)`.
    pub fn try_from_fn<F>(len: usize, init: F) -> Result<Self, AllocationError>
    where
        F: FnMut(usize) -> T,
    {
        Self::try_from_fn_with_page_shift(len, DEFAULT_PAGE_SHIFT, init)
    }

    /// Allocates `len` elements in pages of `1 << page_shift` elements.
    pub fn try_from_fn_with_page_shift<F>(
        len: usize,
        page_shift: u32,
        mut init: F,
    ) -> Result<Self, AllocationError>
    where
        F: FnMut(usize) -> T,
    {
        let page_size = 1usize << page_shift;
        let page_count = len.div_ceil(page_size);

        let mut pages = Vec::new();
        pages
            .try_reserve_exact(page_count)
            .map_err(|_| AllocationError {
                requested: page_count,
            })?;

        for page_idx in 0..page_count {
            let base = page_idx << page_shift;
            let page_len = page_size.min(len - base);
            let mut page = Vec::new();
            page.try_reserve_exact(page_len)
                .map_err(|_| AllocationError {
                    requested: page_len,
                })?;
            page.extend((base..base + page_len).map(&mut init));
            pages.push(page.into_boxed_slice());
        }

        Ok(PagedArray {
            pages,
            len,
            page_shift,
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements per page.
    pub fn page_size(&self) -> usize {
        1 << self.page_shift
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        let mask = self.page_size() - 1;
        Some(&self.pages[index >> self.page_shift][index & mask])
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.len {
            return None;
        }
        let mask = self.page_size() - 1;
        Some(&mut self.pages[index >> self.page_shift][index & mask])
    }

    /// Iterates all elements in index order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.pages.iter().flat_map(|page| page.iter())
    }

    /// Flattens the pages into one vector.
    pub fn into_vec(self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        for page in self.pages {
            out.extend(page.into_vec());
        }
        out
    }

    /// Splits the array into disjoint mutable views, one per range.
    ///
    /// Ranges must be sorted, non-overlapping and within bounds. Indices not
    /// covered by any range are left out of every view.
    pub fn split_mut(&mut self, ranges: &[Range<usize>]) -> Vec<PagedSliceMut<'_, T>> {
        debug_assert!(ranges.windows(2).all(|w| w[0].end <= w[1].start));
        debug_assert!(ranges.last().map_or(true, |r| r.end <= self.len));

        let page_shift = self.page_shift;
        let mut views: Vec<PagedSliceMut<'_, T>> = ranges
            .iter()
            .map(|r| PagedSliceMut {
                range: r.clone(),
                page_shift,
                segments: Vec::new(),
            })
            .collect();

        let mut current = 0;
        for (page_idx, page) in self.pages.iter_mut().enumerate() {
            let mut rest: &mut [T] = page;
            let mut offset = page_idx << page_shift;
            while !rest.is_empty() {
                while current < views.len() && views[current].range.end <= offset {
                    current += 1;
                }
                let Some(view) = views.get_mut(current) else {
                    break;
                };
                if offset < view.range.start {
                    // Skip the uncovered gap before this view.
                    let gap = (view.range.start - offset).min(rest.len());
                    rest = &mut std::mem::take(&mut rest)[gap..];
                    offset += gap;
                    continue;
                }
                let take = (view.range.end - offset).min(rest.len());
                let (head, tail) = std::mem::take(&mut rest).split_at_mut(take);
                view.segments.push(head);
                rest = tail;
                offset += take;
            }
        }

        views
    }
}

/// Mutable view over a contiguous index range of a [`PagedArray`].
///
/// Indexed with the same global indices as the array it came from.
#[derive(Debug)]
pub struct PagedSliceMut<'a, T> {
    range: Range<usize>,
    page_shift: u32,
    segments: Vec<&'a mut [T]>,
}

impl<T> PagedSliceMut<'_, T> {
    /// Global index range covered by this view.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if !self.range.contains(&index) {
            return None;
        }
        let first_page = self.range.start >> self.page_shift;
        let segment = (index >> self.page_shift) - first_page;
        let local = if segment == 0 {
            index - self.range.start
        } else {
            index & ((1usize << self.page_shift) - 1)
        };
        self.segments.get_mut(segment)?.get_mut(local)
    }
}
