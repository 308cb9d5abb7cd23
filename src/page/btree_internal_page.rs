/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! B+-tree internal page layout:
//!
//! ```text
//!   | <btree_page header, 24 bytes> |
//!   | (key[key_size], child_page_id[4])[size] |
//! ```
//!
//! Slot 0's key bytes are never read: its child is the "less than the first real key" pointer.
//! Slots 1..size carry the separator keys, where `key[i]` is the smallest key reachable through
//! `child[i]`.

use crate::common::io::{read_i32, write_i32};
use crate::common::{PageIdT, INVALID_PAGE_ID};
use crate::page::btree_page::{self, NodeType};
use crate::page::PageBytes;

pub const HEADER_SIZE: u32 = btree_page::HEADER_SIZE;

pub struct InternalPageView<'a> {
    bytes: &'a mut PageBytes,
}

impl<'a> InternalPageView<'a> {
    pub fn new(bytes: &'a mut PageBytes) -> Self {
        Self { bytes }
    }

    pub fn init(&mut self, page_id: PageIdT, parent_page_id: PageIdT, key_size: u32, max_size: u32) {
        btree_page::set_node_type(self.bytes, NodeType::Internal);
        btree_page::set_size(self.bytes, 0);
        btree_page::set_max_size(self.bytes, max_size);
        btree_page::set_parent_page_id(self.bytes, parent_page_id);
        btree_page::set_page_id(self.bytes, page_id);
        btree_page::set_key_size(self.bytes, key_size);
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

    fn slot_size(&self) -> u32 {
        self.key_size() + 4
    }

    fn slot_offset(&self, slot: u32) -> u32 {
        HEADER_SIZE + slot * self.slot_size()
    }

    pub fn key_at(&self, slot: u32) -> Vec<u8> {
        let base = self.slot_offset(slot) as usize;
        let key_size = self.key_size() as usize;
        self.bytes[base..base + key_size].to_vec()
    }

    pub fn child_at(&self, slot: u32) -> PageIdT {
        let base = self.slot_offset(slot) + self.key_size();
        read_i32(self.bytes, base).unwrap_or(INVALID_PAGE_ID)
    }

    fn write_entry(&mut self, slot: u32, key: &[u8], child: PageIdT) {
        let base = self.slot_offset(slot);
        let key_size = self.key_size();
        self.bytes[base as usize..(base + key_size) as usize].copy_from_slice(key);
        write_i32(self.bytes, base + key_size, child).ok();
    }

    pub fn replace_key_at(&mut self, slot: u32, key: &[u8]) {
        let base = self.slot_offset(slot) as usize;
        let key_size = self.key_size() as usize;
        self.bytes[base..base + key_size].copy_from_slice(key);
    }

    /// Seed a brand-new root with its two children and the separator between them.
    pub fn populate_new_root(&mut self, left: PageIdT, key: &[u8], right: PageIdT) {
        let zero_key = vec![0u8; self.key_size() as usize];
        self.write_entry(0, &zero_key, left);
        self.write_entry(1, key, right);
        self.set_size(2);
    }

    /// Find which slot's child pointer equals `child_page_id`.
    pub fn index_of_child(&self, child_page_id: PageIdT) -> Option<u32> {
        (0..self.size()).find(|&i| self.child_at(i) == child_page_id)
    }

    /// Return the child that should be descended into to find `key`: the largest slot whose key
    /// is `<= key` (slot 0 always matches, as the "less than everything" pointer).
    pub fn lookup(&self, key: &[u8]) -> PageIdT {
        let mut chosen = 0;
        for i in 1..self.size() {
            if self.key_at(i).as_slice() <= key {
                chosen = i;
            } else {
                break;
            }
        }
        self.child_at(chosen)
    }

    /// Insert `(key, child)` immediately after the slot whose child is `after_child`.
    pub fn insert_after(&mut self, after_child: PageIdT, key: &[u8], child: PageIdT) -> u32 {
        let pos = self.index_of_child(after_child).unwrap_or(self.size() - 1);
        let size = self.size();
        for i in (pos + 1..size).rev() {
            let k = self.key_at(i);
            let c = self.child_at(i);
            self.write_entry(i + 1, &k, c);
        }
        self.write_entry(pos + 1, key, child);
        self.set_size(size + 1);
        size + 1
    }

    /// Remove the slot at `index` (shifting later slots down by one).
    pub fn remove_at(&mut self, index: u32) {
        let size = self.size();
        for i in index..size - 1 {
            let k = self.key_at(i + 1);
            let c = self.child_at(i + 1);
            self.write_entry(i, &k, c);
        }
        self.set_size(size - 1);
    }

    /// Move the upper half of entries (including the first promoted separator) into `other`.
    /// Returns the key that should be promoted to the parent as the new separator.
    pub fn move_half_to(&mut self, other: &mut InternalPageView) -> Vec<u8> {
        let size = self.size();
        let split_at = size / 2;
        let promoted = self.key_at(split_at);

        let mut entries = Vec::new();
        for i in split_at..size {
            entries.push((self.key_at(i), self.child_at(i)));
        }
        self.set_size(split_at);

        let zero_key = vec![0u8; other.key_size() as usize];
        other.write_entry(0, &zero_key, entries[0].1);
        for (offset, (k, c)) in entries.iter().enumerate().skip(1) {
            other.write_entry(offset as u32, k, *c);
        }
        other.set_size(entries.len() as u32);
        promoted
    }

    /// Move every entry of `other` into this node, with `separator` becoming the key for
    /// `other`'s first (previously slot-0) child. `other` is left empty.
    pub fn absorb(&mut self, other: &mut InternalPageView, separator: &[u8]) {
        let size = self.size();
        let other_size = other.size();
        self.write_entry(size, separator, other.child_at(0));
        for i in 1..other_size {
            let k = other.key_at(i);
            let c = other.child_at(i);
            self.write_entry(size + i, &k, c);
        }
        self.set_size(size + other_size);
        other.set_size(0);
    }

    /// Move the first child of `other` onto the end of this node (redistribute from the right).
    /// `separator` is the parent's current key for `other`, which becomes this node's new last
    /// key; the caller must then update the parent's separator to `other`'s new first key.
    pub fn borrow_front_from(&mut self, other: &mut InternalPageView, separator: &[u8]) {
        let size = self.size();
        self.write_entry(size, separator, other.child_at(0));
        self.set_size(size + 1);
        other.remove_at(0);
    }

    /// Move the last child of `other` onto the front of this node (redistribute from the left).
    /// `separator` is the parent's current key for this node. Returns the key that should become
    /// the new parent separator between `other` and this node.
    pub fn borrow_back_from(&mut self, other: &mut InternalPageView, separator: &[u8]) -> Vec<u8> {
        let other_last = other.size() - 1;
        let moved_key = other.key_at(other_last);
        let moved_child = other.child_at(other_last);
        other.remove_at(other_last);

        let size = self.size();
        for i in (0..size).rev() {
            let k = self.key_at(i);
            let c = self.child_at(i);
            self.write_entry(i + 1, &k, c);
        }
        self.write_entry(1, separator, self.child_at(1));
        self.write_entry(0, &vec![0u8; self.key_size() as usize], moved_child);
        self.set_size(size + 1);
        moved_key
    }
}

pub fn max_size_for_key(key_size: u32) -> u32 {
    (crate::common::PAGE_SIZE - HEADER_SIZE) / (key_size + 4) - 1
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
    fn test_populate_new_root_and_lookup() {
        let mut bytes = zeroed();
        let mut view = InternalPageView::new(&mut bytes);
        view.init(1, INVALID_PAGE_ID, 4, 4);
        view.populate_new_root(10, &key(5), 20);

        assert_eq!(view.size(), 2);
        assert_eq!(view.lookup(&key(1)), 10);
        assert_eq!(view.lookup(&key(5)), 20);
        assert_eq!(view.lookup(&key(100)), 20);
    }

    #[test]
    fn test_insert_after_and_remove() {
        let mut bytes = zeroed();
        let mut view = InternalPageView::new(&mut bytes);
        view.init(1, INVALID_PAGE_ID, 4, 4);
        view.populate_new_root(10, &key(5), 20);

        view.insert_after(20, &key(15), 30);
        assert_eq!(view.size(), 3);
        assert_eq!(view.lookup(&key(20)), 30);

        let idx = view.index_of_child(20).unwrap();
        view.remove_at(idx);
        assert_eq!(view.size(), 2);
        assert_eq!(view.lookup(&key(20)), 30);
    }
}
