/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! Slotted table-heap page layout:
//!
//! ```text
//!   | page_id (4) | prev_page_id (4) | next_page_id (4) | free_space_ptr (4) | tuple_count (4) |
//!   | slot[0] | slot[1] | ... ---->                                  <---- tuple bytes, packed |
//! ```
//!
//! Records are packed from the end of the page backwards; the slot directory grows forward after
//! the header. Each slot is an `(offset: u32, size: i32)` pair; a negative size marks the slot a
//! tombstone (the tuple is logically deleted but its bytes are still in place, recoverable by
//! `rollback_delete`).

use crate::common::io::{read_i32, read_u32, write_i32, write_u32, IoError};
use crate::common::PageIdT;
use crate::page::PageBytes;

const PAGE_ID_OFFSET: u32 = 0;
const PREV_PAGE_ID_OFFSET: u32 = 4;
const NEXT_PAGE_ID_OFFSET: u32 = 8;
const FREE_SPACE_OFFSET: u32 = 12;
const TUPLE_COUNT_OFFSET: u32 = 16;
pub const HEADER_SIZE: u32 = 20;
const SLOT_SIZE: u32 = 8;

/// Largest tuple that could ever fit in a freshly initialized page (header plus one slot).
pub const SIZE_MAX_ROW: u32 = crate::common::PAGE_SIZE - HEADER_SIZE - SLOT_SIZE;

/// Outcome of a slot-level update attempt, mirroring the four cases a table heap must handle.
#[derive(Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    SlotOutOfRange,
    Tombstoned,
    NoSpace,
}

pub struct TablePageView<'a> {
    bytes: &'a mut PageBytes,
}

impl<'a> TablePageView<'a> {
    pub fn new(bytes: &'a mut PageBytes) -> Self {
        Self { bytes }
    }

    pub fn init(&mut self, page_id: PageIdT, prev_page_id: PageIdT) {
        self.set_page_id(page_id);
        self.set_prev_page_id(prev_page_id);
        self.set_next_page_id(crate::common::INVALID_PAGE_ID);
        self.set_free_space_pointer(crate::common::PAGE_SIZE);
        self.set_tuple_count(0);
    }

    pub fn page_id(&self) -> PageIdT {
        read_i32(self.bytes, PAGE_ID_OFFSET).unwrap_or(crate::common::INVALID_PAGE_ID)
    }

    fn set_page_id(&mut self, page_id: PageIdT) {
        write_i32(self.bytes, PAGE_ID_OFFSET, page_id).ok();
    }

    pub fn prev_page_id(&self) -> PageIdT {
        read_i32(self.bytes, PREV_PAGE_ID_OFFSET).unwrap_or(crate::common::INVALID_PAGE_ID)
    }

    pub fn set_prev_page_id(&mut self, page_id: PageIdT) {
        write_i32(self.bytes, PREV_PAGE_ID_OFFSET, page_id).ok();
    }

    pub fn next_page_id(&self) -> PageIdT {
        read_i32(self.bytes, NEXT_PAGE_ID_OFFSET).unwrap_or(crate::common::INVALID_PAGE_ID)
    }

    pub fn set_next_page_id(&mut self, page_id: PageIdT) {
        write_i32(self.bytes, NEXT_PAGE_ID_OFFSET, page_id).ok();
    }

    fn free_space_pointer(&self) -> u32 {
        read_u32(self.bytes, FREE_SPACE_OFFSET).unwrap_or(crate::common::PAGE_SIZE)
    }

    fn set_free_space_pointer(&mut self, ptr: u32) {
        write_u32(self.bytes, FREE_SPACE_OFFSET, ptr).ok();
    }

    pub fn tuple_count(&self) -> u32 {
        read_u32(self.bytes, TUPLE_COUNT_OFFSET).unwrap_or(0)
    }

    fn set_tuple_count(&mut self, count: u32) {
        write_u32(self.bytes, TUPLE_COUNT_OFFSET, count).ok();
    }

    fn slot_offset(slot: u32) -> u32 {
        HEADER_SIZE + slot * SLOT_SIZE
    }

    fn read_slot(&self, slot: u32) -> Option<(u32, i32)> {
        if slot >= self.tuple_count() {
            return None;
        }
        let base = Self::slot_offset(slot);
        let offset = read_u32(self.bytes, base).ok()?;
        let size = read_i32(self.bytes, base + 4).ok()?;
        Some((offset, size))
    }

    fn write_slot(&mut self, slot: u32, offset: u32, size: i32) {
        let base = Self::slot_offset(slot);
        write_u32(self.bytes, base, offset).ok();
        write_i32(self.bytes, base + 4, size).ok();
    }

    /// Bytes remaining before the slot directory and the tuple region would collide, accounting
    /// for one additional slot entry.
    fn free_space_remaining(&self) -> u32 {
        let directory_end = Self::slot_offset(self.tuple_count() + 1);
        self.free_space_pointer().saturating_sub(directory_end)
    }

    /// Append a new tuple. Returns its slot number, or `None` if the page has no room.
    pub fn insert_tuple(&mut self, data: &[u8]) -> Option<u32> {
        if data.len() as u32 > self.free_space_remaining() {
            return None;
        }
        let new_free_space = self.free_space_pointer() - data.len() as u32;
        self.bytes[new_free_space as usize..new_free_space as usize + data.len()]
            .copy_from_slice(data);

        let slot = self.tuple_count();
        self.write_slot(slot, new_free_space, data.len() as i32);
        self.set_free_space_pointer(new_free_space);
        self.set_tuple_count(slot + 1);
        Some(slot)
    }

    /// Read a tuple's bytes. Returns `None` if the slot is out of range or tombstoned.
    pub fn get_tuple(&self, slot: u32) -> Option<Vec<u8>> {
        let (offset, size) = self.read_slot(slot)?;
        if size < 0 {
            return None;
        }
        let offset = offset as usize;
        let size = size as usize;
        Some(self.bytes[offset..offset + size].to_vec())
    }

    pub fn is_deleted(&self, slot: u32) -> bool {
        matches!(self.read_slot(slot), Some((_, size)) if size < 0)
    }

    /// Flip a live slot's size negative, tombstoning it without discarding its bytes.
    pub fn mark_delete(&mut self, slot: u32) -> bool {
        match self.read_slot(slot) {
            Some((offset, size)) if size >= 0 => {
                self.write_slot(slot, offset, -size.max(1));
                true
            }
            _ => false,
        }
    }

    /// Undo a prior `mark_delete`.
    pub fn rollback_delete(&mut self, slot: u32) -> bool {
        match self.read_slot(slot) {
            Some((offset, size)) if size < 0 => {
                self.write_slot(slot, offset, -size);
                true
            }
            _ => false,
        }
    }

    /// Finalize a tombstone. The slot becomes permanently empty; its byte region is not
    /// reclaimed (this page never compacts), so callers relying on recovered space should
    /// prefer inserting into a later page.
    pub fn apply_delete(&mut self, slot: u32) -> bool {
        match self.read_slot(slot) {
            Some((_, size)) if size < 0 => {
                self.write_slot(slot, 0, 0);
                true
            }
            _ => false,
        }
    }

    /// Attempt to overwrite a live tuple in place. In-place update is only possible when the new
    /// tuple is no larger than the old one; the caller must delete-and-reinsert otherwise.
    pub fn update_tuple(&mut self, slot: u32, data: &[u8]) -> UpdateOutcome {
        let (offset, size) = match self.read_slot(slot) {
            None => return UpdateOutcome::SlotOutOfRange,
            Some((_, size)) if size < 0 => return UpdateOutcome::Tombstoned,
            Some(pair) => pair,
        };
        if data.len() as u32 > size as u32 {
            return UpdateOutcome::NoSpace;
        }
        let offset = offset as usize;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        self.write_slot(slot, offset as u32, data.len() as i32);
        UpdateOutcome::Updated
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TablePageError {
    #[error("tuple of {0} bytes exceeds the maximum row size")]
    RowTooLarge(u32),
    #[error("{0}")]
    Io(#[from] IoError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::zeroed;

    #[test]
    fn test_insert_and_get_tuple() {
        let mut bytes = zeroed();
        let mut view = TablePageView::new(&mut bytes);
        view.init(5, crate::common::INVALID_PAGE_ID);

        let slot = view.insert_tuple(b"hello").unwrap();
        assert_eq!(slot, 0);
        assert_eq!(view.get_tuple(0).unwrap(), b"hello");
        assert_eq!(view.tuple_count(), 1);
    }

    #[test]
    fn test_mark_and_rollback_delete() {
        let mut bytes = zeroed();
        let mut view = TablePageView::new(&mut bytes);
        view.init(1, crate::common::INVALID_PAGE_ID);
        view.insert_tuple(b"row").unwrap();

        assert!(view.mark_delete(0));
        assert!(view.is_deleted(0));
        assert_eq!(view.get_tuple(0), None);

        assert!(view.rollback_delete(0));
        assert!(!view.is_deleted(0));
        assert_eq!(view.get_tuple(0).unwrap(), b"row");
    }

    #[test]
    fn test_apply_delete_requires_mark_first() {
        let mut bytes = zeroed();
        let mut view = TablePageView::new(&mut bytes);
        view.init(1, crate::common::INVALID_PAGE_ID);
        view.insert_tuple(b"row").unwrap();

        assert!(!view.apply_delete(0));
        view.mark_delete(0);
        assert!(view.apply_delete(0));
    }

    #[test]
    fn test_update_tuple_outcomes() {
        let mut bytes = zeroed();
        let mut view = TablePageView::new(&mut bytes);
        view.init(1, crate::common::INVALID_PAGE_ID);
        view.insert_tuple(b"abcde").unwrap();

        assert_eq!(view.update_tuple(0, b"xy"), UpdateOutcome::Updated);
        assert_eq!(view.get_tuple(0).unwrap(), b"xy");

        assert_eq!(
            view.update_tuple(0, b"this is way too long"),
            UpdateOutcome::NoSpace
        );
        assert_eq!(view.update_tuple(9, b"x"), UpdateOutcome::SlotOutOfRange);

        view.mark_delete(0);
        assert_eq!(view.update_tuple(0, b"x"), UpdateOutcome::Tombstoned);
    }

    #[test]
    fn test_insert_fails_when_full() {
        let mut bytes = zeroed();
        let mut view = TablePageView::new(&mut bytes);
        view.init(1, crate::common::INVALID_PAGE_ID);

        let big = vec![0u8; (SIZE_MAX_ROW) as usize];
        assert!(view.insert_tuple(&big).is_some());
        assert!(view.insert_tuple(b"no room left").is_none());
    }
}
