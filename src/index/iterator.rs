/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! Forward-only iterator over a B+-tree's leaves in ascending key order, following leaf
//! `next_page_id` sibling links rather than re-descending from the root.

use crate::buffer::BufferPoolManager;
use crate::common::{PageIdT, RowId, INVALID_PAGE_ID};
use crate::index::generic_key::GenericKey;
use crate::page::btree_leaf_page::LeafPageView;

pub struct IndexIterator<'a> {
    buffer_pool: &'a BufferPoolManager,
    page_id: PageIdT,
    slot: u32,
}

impl<'a> IndexIterator<'a> {
    /// Start at the leftmost slot of the leaf identified by `leaf_page_id`.
    pub fn new(buffer_pool: &'a BufferPoolManager, leaf_page_id: PageIdT) -> Self {
        Self {
            buffer_pool,
            page_id: leaf_page_id,
            slot: 0,
        }
    }

    pub fn empty(buffer_pool: &'a BufferPoolManager) -> Self {
        Self {
            buffer_pool,
            page_id: INVALID_PAGE_ID,
            slot: 0,
        }
    }

    /// Start at the first entry `>= key` within the leaf identified by `leaf_page_id`.
    pub fn from_key(
        buffer_pool: &'a BufferPoolManager,
        leaf_page_id: PageIdT,
        key: &[u8],
    ) -> Result<Self, crate::buffer::BufferError> {
        let frame_id = buffer_pool.fetch_page(leaf_page_id)?;
        let slot = {
            let mut bytes = buffer_pool.write_frame(frame_id);
            LeafPageView::new(&mut bytes).lower_bound(key)
        };
        buffer_pool.unpin_page(leaf_page_id, false)?;
        Ok(Self {
            buffer_pool,
            page_id: leaf_page_id,
            slot,
        })
    }
}

impl<'a> Iterator for IndexIterator<'a> {
    type Item = (GenericKey, RowId);

    fn next(&mut self) -> Option<(GenericKey, RowId)> {
        if self.page_id == INVALID_PAGE_ID {
            return None;
        }

        let frame_id = self.buffer_pool.fetch_page(self.page_id).ok()?;
        let (size, next_page_id, entry) = {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            let view = LeafPageView::new(&mut bytes);
            let entry = if self.slot < view.size() {
                Some((view.key_at(self.slot), view.value_at(self.slot)))
            } else {
                None
            };
            (view.size(), view.next_page_id(), entry)
        };
        self.buffer_pool.unpin_page(self.page_id, false).ok()?;

        match entry {
            Some((key_bytes, value)) => {
                self.slot += 1;
                Some((GenericKey::from_bytes(key_bytes), value))
            }
            None => {
                let _ = size;
                self.page_id = next_page_id;
                self.slot = 0;
                self.next()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::INDEX_ROOTS_PAGE_ID;
    use crate::disk::DiskManager;
    use crate::index::btree::BPlusTree;
    use std::fs;

    struct TestContext {
        bpm: BufferPoolManager,
        filename: String,
    }

    impl Drop for TestContext {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.filename);
        }
    }

    fn setup(test_id: &str) -> TestContext {
        let _ = env_logger::try_init();
        let filename = format!("INDEX_ITER_TEST_{}.jin", test_id);
        let _ = fs::remove_file(&filename);
        let bpm = BufferPoolManager::new(16, DiskManager::new(&filename));
        let (page_id, _) = bpm.new_page().unwrap();
        assert_eq!(page_id, INDEX_ROOTS_PAGE_ID);
        bpm.unpin_page(page_id, true).unwrap();
        TestContext { bpm, filename }
    }

    #[test]
    fn test_empty_tree_yields_nothing() {
        let ctx = setup("empty");
        let tree = BPlusTree::new(1, &ctx.bpm, 4, Some(4), Some(4)).unwrap();
        assert_eq!(tree.iter().unwrap().count(), 0);
    }

    #[test]
    fn test_iterates_across_leaf_boundary() {
        let ctx = setup("boundary");
        let tree = BPlusTree::new(1, &ctx.bpm, 4, Some(3), Some(3)).unwrap();
        for i in (0..15).rev() {
            tree.insert(&GenericKey::from_i32(i, 4), RowId::new(1, i as u32)).unwrap();
        }
        let collected: Vec<i32> = tree.iter().unwrap().map(|(k, _)| k.to_i32().unwrap()).collect();
        assert_eq!(collected, (0..15).collect::<Vec<_>>());
    }

    #[test]
    fn test_iter_from_key_skips_to_lower_bound() {
        let ctx = setup("from_key");
        let tree = BPlusTree::new(1, &ctx.bpm, 4, Some(3), Some(3)).unwrap();
        for i in (0..15).filter(|i| i % 2 == 0) {
            tree.insert(&GenericKey::from_i32(i, 4), RowId::new(1, i as u32)).unwrap();
        }

        // 7 is absent; iteration should start at the next present key, 8.
        let from_absent: Vec<i32> = tree
            .iter_from(&GenericKey::from_i32(7, 4))
            .unwrap()
            .map(|(k, _)| k.to_i32().unwrap())
            .collect();
        assert_eq!(from_absent, vec![8, 10, 12, 14]);

        // 6 is present; iteration should start at 6 itself, not skip past it.
        let from_present: Vec<i32> = tree
            .iter_from(&GenericKey::from_i32(6, 4))
            .unwrap()
            .map(|(k, _)| k.to_i32().unwrap())
            .collect();
        assert_eq!(from_present, vec![6, 8, 10, 12, 14]);

        // Past every key: yields nothing.
        assert_eq!(tree.iter_from(&GenericKey::from_i32(100, 4)).unwrap().count(), 0);
    }
}
