/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! B+-tree leaf page layout:
//!
//! ```text
//!   | <btree_page header, 24 bytes> | next_page_id (4) |
//!   | (key[key_size], page_id[4], slot_num[4])[size] |
//! ```
//!
//! Slots are kept in ascending key order at all times; `lookup`/`insert` maintain that invariant
//! via linear scan, which is appropriate for the small `leaf_max_size` that one page allows.

use crate::common::io::{read_i32, read_u32, write_i32, write_u32};
use crate::common::{PageIdT, RowId, SlotIdT, INVALID_PAGE_ID};
use crate::page::btree_page::{self, NodeType};
use crate::page::PageBytes;

const NEXT_PAGE_ID_OFFSET: u32 = btree_page::HEADER_SIZE;
pub const HEADER_SIZE: u32 = btree_page::HEADER_SIZE + 4;

pub struct LeafPageView<'a> {
    bytes: &'a mut PageBytes,
}

impl<'a> LeafPageView<'a> {
    pub fn new(bytes: &'a mut PageBytes) -> Self {
        Self { bytes }
    }

    pub fn init(&mut self, page_id: PageIdT, parent_page_id: PageIdT, key_size: u32, max_size: u32) {
        btree_page::set_node_type(self.bytes, NodeType::Leaf);
        btree_page::set_size(self.bytes, 0);
        btree_page::set_max_size(self.bytes, max_size);
        btree_page::set_parent_page_id(self.bytes, parent_page_id);
        btree_page::set_page_id(self.bytes, page_id);
        btree_page::set_key_size(self.bytes, key_size);
        self.set_next_page_id(INVALID_PAGE_ID);
    }

    pub fn page_id(&self) -> PageIdT {
        btree_page::page_id(self.bytes)
    }

    pub fn parent_page_id(&self) -> PageIdT {
        btree_page::parent_page_id(self.bytes)
    }

    pub fn set_parent_page_id(&mut self, page_id: PageIdT) {
        btree_page::set_parent_page_id(self.bytes, page_id)
    }

    pub fn size(&self) -> u32 {
        btree_page::size(self.bytes)
    }

    fn set_size(&mut self, size: u32) {
        btree_page::set_size(self.bytes, size)
    }

    pub fn max_size(&self) -> u32 {
        btree_page::max_size(self.bytes)
    }

    pub fn minimum_size(&self) -> u32 {
        btree_page::minimum_size(self.bytes)
    }

    pub fn is_overfull(&self) -> bool {
        btree_page::is_overfull(self.bytes)
    }

    pub fn key_size(&self) -> u32 {
        btree_page::key_size(self.bytes)
    }

    pub fn next_page_id(&self) -> PageIdT {
        read_i32(self.bytes, NEXT_PAGE_ID_OFFSET).unwrap_or(INVALID_PAGE_ID)
    }

    pub fn set_next_page_id(&mut self, page_id: PageIdT) {
        write_i32(self.bytes, NEXT_PAGE_ID_OFFSET, page_id).ok();
    }

    fn slot_size(&self) -> u32 {
        self.key_size() + 8
    }

    fn slot_offset(&self, slot: u32) -> u32 {
        HEADER_SIZE + slot * self.slot_size()
    }

    pub fn key_at(&self, slot: u32) -> Vec<u8> {
        let base = self.slot_offset(slot) as usize;
        let key_size = self.key_size() as usize;
        self.bytes[base..base + key_size].to_vec()
    }

    pub fn value_at(&self, slot: u32) -> RowId {
        let base = self.slot_offset(slot) + self.key_size();
        let page_id = read_i32(self.bytes, base).unwrap_or(INVALID_PAGE_ID);
        let slot_num = read_u32(self.bytes, base + 4).unwrap_or(0);
        RowId::new(page_id, slot_num)
    }

    fn write_entry(&mut self, slot: u32, key: &[u8], value: RowId) {
        let base = self.slot_offset(slot);
        let key_size = self.key_size();
        self.bytes[base as usize..(base + key_size) as usize].copy_from_slice(key);
        write_i32(self.bytes, base + key_size, value.page_id()).ok();
        write_u32(self.bytes, base + key_size + 4, value.slot_num()).ok();
    }

    /// Binary search for `key`. Returns `Ok(slot)` on an exact match, `Err(slot)` for the
    /// insertion point that keeps the directory sorted.
    fn search(&self, key: &[u8]) -> Result<u32, u32> {
        let mut lo = 0u32;
        let mut hi = self.size();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.key_at(mid).as_slice().cmp(key) {
                std::cmp::Ordering::Equal => return Ok(mid),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Err(lo)
    }

    pub fn lookup(&self, key: &[u8]) -> Option<RowId> {
        self.search(key).ok().map(|slot| self.value_at(slot))
    }

    /// The slot of the first entry `>= key`, or `size()` if every entry is smaller.
    pub fn lower_bound(&self, key: &[u8]) -> u32 {
        self.search(key).unwrap_or_else(|slot| slot)
    }

    /// Insert `(key, value)` in sorted position. Returns the new size, or the current size
    /// unchanged if `key` is already present (duplicates are rejected).
    pub fn insert(&mut self, key: &[u8], value: RowId) -> u32 {
        let size = self.size();
        let slot = match self.search(key) {
            Ok(_) => return size,
            Err(slot) => slot,
        };
        for i in (slot..size).rev() {
            let k = self.key_at(i);
            let v = self.value_at(i);
            self.write_entry(i + 1, &k, v);
        }
        self.write_entry(slot, key, value);
        self.set_size(size + 1);
        size + 1
    }

    /// Remove the entry for `key`, if present. Returns whether an entry was removed.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        let slot = match self.search(key) {
            Ok(slot) => slot,
            Err(_) => return false,
        };
        let size = self.size();
        for i in slot..size - 1 {
            let k = self.key_at(i + 1);
            let v = self.value_at(i + 1);
            self.write_entry(i, &k, v);
        }
        self.set_size(size - 1);
        true
    }

    /// Move the upper half of this leaf's entries into `other`, for a split. `other` must already
    /// be initialized with the same key size and max size.
    pub fn move_half_to(&mut self, other: &mut LeafPageView) {
        let size = self.size();
        let split_at = size / 2;
        for i in split_at..size {
            let k = self.key_at(i);
            let v = self.value_at(i);
            other.insert(&k, v);
        }
        self.set_size(split_at);
    }

    /// Move every entry of `other` into this leaf, for a merge. `other` is left empty.
    pub fn absorb(&mut self, other: &mut LeafPageView) {
        for i in 0..other.size() {
            let k = other.key_at(i);
            let v = other.value_at(i);
            self.insert(&k, v);
        }
        other.set_size(0);
    }

    /// Move the first entry of `other` onto the end of this leaf (redistribute from the right).
    pub fn borrow_front_from(&mut self, other: &mut LeafPageView) {
        let k = other.key_at(0);
        let v = other.value_at(0);
        other.remove(&k);
        self.insert(&k, v);
    }

    /// Move the last entry of `other` onto the front of this leaf (redistribute from the left).
    pub fn borrow_back_from(&mut self, other: &mut LeafPageView) {
        let last = other.size() - 1;
        let k = other.key_at(last);
        let v = other.value_at(last);
        other.remove(&k);
        self.insert(&k, v);
    }
}

pub fn max_size_for_key(key_size: u32) -> u32 {
    (crate::common::PAGE_SIZE - HEADER_SIZE) / (key_size + 8) - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::zeroed;

    fn key(v: i32) -> Vec<u8> {
        let mut b = [0u8; 4];
        crate::common::io::write_ordered_i32(&mut b, 0, v).unwrap();
        b.to_vec()
    }

    #[test]
    fn test_insert_keeps_sorted_order() {
        let mut bytes = zeroed();
        let mut view = LeafPageView::new(&mut bytes);
        view.init(1, INVALID_PAGE_ID, 4, 10);

        view.insert(&key(5), RowId::new(1, 0));
        view.insert(&key(1), RowId::new(1, 1));
        view.insert(&key(3), RowId::new(1, 2));

        assert_eq!(view.size(), 3);
        assert_eq!(view.key_at(0), key(1));
        assert_eq!(view.key_at(1), key(3));
        assert_eq!(view.key_at(2), key(5));
        assert_eq!(view.lookup(&key(3)), Some(RowId::new(1, 2)));
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let mut bytes = zeroed();
        let mut view = LeafPageView::new(&mut bytes);
        view.init(1, INVALID_PAGE_ID, 4, 10);
        view.insert(&key(1), RowId::new(1, 0));
        let size = view.insert(&key(1), RowId::new(1, 1));
        assert_eq!(size, 1);
    }

    #[test]
    fn test_remove() {
        let mut bytes = zeroed();
        let mut view = LeafPageView::new(&mut bytes);
        view.init(1, INVALID_PAGE_ID, 4, 10);
        view.insert(&key(1), RowId::new(1, 0));
        view.insert(&key(2), RowId::new(1, 1));

        assert!(view.remove(&key(1)));
        assert!(!view.remove(&key(1)));
        assert_eq!(view.size(), 1);
        assert_eq!(view.lookup(&key(2)), Some(RowId::new(1, 1)));
    }

    #[test]
    fn test_split_moves_upper_half() {
        let mut left_bytes = zeroed();
        let mut right_bytes = zeroed();
        let mut left = LeafPageView::new(&mut left_bytes);
        left.init(1, INVALID_PAGE_ID, 4, 4);
        for i in 0..4 {
            left.insert(&key(i), RowId::new(1, i as u32));
        }
        let mut right = LeafPageView::new(&mut right_bytes);
        right.init(2, INVALID_PAGE_ID, 4, 4);

        left.move_half_to(&mut right);
        assert_eq!(left.size(), 2);
        assert_eq!(right.size(), 2);
        assert_eq!(right.key_at(0), key(2));
    }
}
