/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! Bitmap page layout:
//!
//! ```text
//!   | allocated_count (4) | next_free_hint (4) | bit array (BITMAP_SIZE bits) |
//! ```
//!
//! Bit `n` is 1 iff the n-th data page of this extent is currently allocated. The hint caches
//! the index most recently found free, so that repeated allocations inside a hot extent don't
//! rescan from bit 0 each time.

use crate::common::bitmap::{clear_bit, get_bit, set_bit};
use crate::common::io::{read_u32, write_u32, IoError};
use crate::common::{BITMAP_PAGE_HEADER_SIZE, BITMAP_SIZE};
use crate::page::PageBytes;

const ALLOCATED_COUNT_OFFSET: u32 = 0;
const NEXT_FREE_HINT_OFFSET: u32 = 4;
const BITS_OFFSET: u32 = BITMAP_PAGE_HEADER_SIZE;

pub struct BitmapPageView<'a> {
    bytes: &'a mut PageBytes,
}

impl<'a> BitmapPageView<'a> {
    pub fn new(bytes: &'a mut PageBytes) -> Self {
        Self { bytes }
    }

    pub fn allocated_count(&self) -> Result<u32, IoError> {
        read_u32(self.bytes, ALLOCATED_COUNT_OFFSET)
    }

    fn set_allocated_count(&mut self, count: u32) -> Result<(), IoError> {
        write_u32(self.bytes, ALLOCATED_COUNT_OFFSET, count)
    }

    pub fn next_free_hint(&self) -> Result<u32, IoError> {
        read_u32(self.bytes, NEXT_FREE_HINT_OFFSET)
    }

    fn set_next_free_hint(&mut self, hint: u32) -> Result<(), IoError> {
        write_u32(self.bytes, NEXT_FREE_HINT_OFFSET, hint)
    }

    /// Return whether the data page at `offset` within this extent is free.
    pub fn is_free(&self, offset: u32) -> bool {
        !get_bit(&self.bytes[BITS_OFFSET as usize..], offset).unwrap_or(true)
    }

    /// Find the first free offset within this extent, starting from the cached hint. Returns
    /// `None` if the extent is full.
    pub fn find_free(&self) -> Option<u32> {
        if self.allocated_count().unwrap_or(BITMAP_SIZE) >= BITMAP_SIZE {
            return None;
        }
        let hint = self.next_free_hint().unwrap_or(0);
        for candidate in (hint..BITMAP_SIZE).chain(0..hint) {
            if self.is_free(candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Mark `offset` allocated, bump the allocated count, and advance the hint past it.
    pub fn allocate(&mut self, offset: u32) -> Result<(), IoError> {
        set_bit(&mut self.bytes[BITS_OFFSET as usize..], offset)
            .map_err(|_| IoError::Overflow)?;
        let count = self.allocated_count()?;
        self.set_allocated_count(count + 1)?;
        self.set_next_free_hint((offset + 1) % BITMAP_SIZE)
    }

    /// Mark `offset` free and decrement the allocated count. Idempotent if already free.
    pub fn deallocate(&mut self, offset: u32) -> Result<(), IoError> {
        if self.is_free(offset) {
            return Ok(());
        }
        clear_bit(&mut self.bytes[BITS_OFFSET as usize..], offset)
            .map_err(|_| IoError::Overflow)?;
        let count = self.allocated_count()?;
        self.set_allocated_count(count.saturating_sub(1))?;
        self.set_next_free_hint(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::zeroed;

    #[test]
    fn test_allocate_and_deallocate() {
        let mut bytes = zeroed();
        let mut view = BitmapPageView::new(&mut bytes);

        assert_eq!(view.find_free(), Some(0));
        view.allocate(0).unwrap();
        assert_eq!(view.allocated_count().unwrap(), 1);
        assert!(!view.is_free(0));

        assert_eq!(view.find_free(), Some(1));
        view.allocate(1).unwrap();
        assert_eq!(view.allocated_count().unwrap(), 2);

        view.deallocate(0).unwrap();
        assert_eq!(view.allocated_count().unwrap(), 1);
        assert!(view.is_free(0));
        assert_eq!(view.find_free(), Some(0));
    }

    #[test]
    fn test_full_extent_returns_none() {
        let mut bytes = zeroed();
        let mut view = BitmapPageView::new(&mut bytes);
        for i in 0..BITMAP_SIZE {
            view.allocate(i).unwrap();
        }
        assert_eq!(view.find_free(), None);
    }
}
