/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

use crate::buffer::BufferPoolManager;
use crate::common::{PageIdT, RowId, INDEX_ROOTS_PAGE_ID, INVALID_PAGE_ID};
use crate::index::generic_key::GenericKey;
use crate::index::iterator::IndexIterator;
use crate::page::btree_internal_page::{self, InternalPageView};
use crate::page::btree_leaf_page::{self, LeafPageView};
use crate::page::btree_page::{self, NodeType};
use crate::page::index_roots_page::IndexRootsPageView;
use log::debug;
use std::cell::Cell;

pub struct BPlusTree<'a> {
    index_id: u32,
    buffer_pool: &'a BufferPoolManager,
    key_size: u32,
    leaf_max_size: u32,
    internal_max_size: u32,
    root_page_id: Cell<PageIdT>,
}

impl<'a> BPlusTree<'a> {
    pub fn new(
        index_id: u32,
        buffer_pool: &'a BufferPoolManager,
        key_size: u32,
        leaf_max_size: Option<u32>,
        internal_max_size: Option<u32>,
    ) -> Result<Self, IndexError> {
        let leaf_max_size = leaf_max_size.unwrap_or_else(|| btree_leaf_page::max_size_for_key(key_size));
        let internal_max_size =
            internal_max_size.unwrap_or_else(|| btree_internal_page::max_size_for_key(key_size));

        let root_page_id = {
            let frame_id = buffer_pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
            let root_page_id = {
                let mut bytes = buffer_pool.write_frame(frame_id);
                IndexRootsPageView::new(&mut bytes)
                    .get_root(index_id)
                    .unwrap_or(INVALID_PAGE_ID)
            };
            buffer_pool.unpin_page(INDEX_ROOTS_PAGE_ID, false)?;
            root_page_id
        };

        Ok(Self {
            index_id,
            buffer_pool,
            key_size,
            leaf_max_size,
            internal_max_size,
            root_page_id: Cell::new(root_page_id),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id.get() == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageIdT {
        self.root_page_id.get()
    }

    fn persist_root(&self) -> Result<(), IndexError> {
        let frame_id = self.buffer_pool.fetch_page(INDEX_ROOTS_PAGE_ID)?;
        {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            IndexRootsPageView::new(&mut bytes).set_root(self.index_id, self.root_page_id.get());
        }
        self.buffer_pool.unpin_page(INDEX_ROOTS_PAGE_ID, true)?;
        Ok(())
    }

    /// Descend from the root to the leaf that would contain `key`.
    fn find_leaf_page_id(&self, key: &[u8]) -> Result<PageIdT, IndexError> {
        let mut page_id = self.root_page_id.get();
        loop {
            let frame_id = self.buffer_pool.fetch_page(page_id)?;
            let (node_type, next) = {
                let mut bytes = self.buffer_pool.write_frame(frame_id);
                match btree_page::node_type(&bytes) {
                    NodeType::Leaf => (NodeType::Leaf, INVALID_PAGE_ID),
                    NodeType::Internal => {
                        let child = InternalPageView::new(&mut bytes).lookup(key);
                        (NodeType::Internal, child)
                    }
                    NodeType::Invalid => (NodeType::Invalid, INVALID_PAGE_ID),
                }
            };
            match node_type {
                NodeType::Leaf => return Ok(page_id),
                NodeType::Internal => {
                    self.buffer_pool.unpin_page(page_id, false)?;
                    page_id = next;
                }
                NodeType::Invalid => return Err(IndexError::CorruptNode(page_id)),
            }
        }
    }

    pub fn get_value(&self, key: &GenericKey) -> Result<Option<RowId>, IndexError> {
        if self.is_empty() {
            return Ok(None);
        }
        let leaf_page_id = self.find_leaf_page_id(key.as_bytes())?;
        let frame_id = self.buffer_pool.fetch_page(leaf_page_id)?;
        let value = {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            LeafPageView::new(&mut bytes).lookup(key.as_bytes())
        };
        self.buffer_pool.unpin_page(leaf_page_id, false)?;
        Ok(value)
    }

    pub fn insert(&self, key: &GenericKey, value: RowId) -> Result<bool, IndexError> {
        if self.is_empty() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }
        self.insert_into_leaf(key, value)
    }

    fn start_new_tree(&self, key: &GenericKey, value: RowId) -> Result<(), IndexError> {
        let (page_id, frame_id) = self.buffer_pool.new_page()?;
        {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            let mut leaf = LeafPageView::new(&mut bytes);
            leaf.init(page_id, INVALID_PAGE_ID, self.key_size, self.leaf_max_size);
            leaf.insert(key.as_bytes(), value);
        }
        self.buffer_pool.unpin_page(page_id, true)?;
        self.root_page_id.set(page_id);
        self.persist_root()
    }

    fn insert_into_leaf(&self, key: &GenericKey, value: RowId) -> Result<bool, IndexError> {
        let leaf_page_id = self.find_leaf_page_id(key.as_bytes())?;
        let frame_id = self.buffer_pool.fetch_page(leaf_page_id)?;
        let (old_size, new_size, parent_page_id) = {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            let mut view = LeafPageView::new(&mut bytes);
            let old_size = view.size();
            let new_size = view.insert(key.as_bytes(), value);
            (old_size, new_size, view.parent_page_id())
        };

        if new_size == old_size {
            self.buffer_pool.unpin_page(leaf_page_id, false)?;
            return Ok(false);
        }
        if new_size <= self.leaf_max_size {
            self.buffer_pool.unpin_page(leaf_page_id, true)?;
            return Ok(true);
        }

        let (new_leaf_id, new_frame_id) = self.buffer_pool.new_page()?;
        {
            let mut bytes = self.buffer_pool.write_frame(new_frame_id);
            LeafPageView::new(&mut bytes).init(new_leaf_id, parent_page_id, self.key_size, self.leaf_max_size);
        }
        let promoted_key = {
            let mut left_bytes = self.buffer_pool.write_frame(frame_id);
            let mut right_bytes = self.buffer_pool.write_frame(new_frame_id);
            let mut left = LeafPageView::new(&mut left_bytes);
            let mut right = LeafPageView::new(&mut right_bytes);
            left.move_half_to(&mut right);
            right.set_next_page_id(left.next_page_id());
            left.set_next_page_id(new_leaf_id);
            right.key_at(0)
        };
        self.buffer_pool.unpin_page(leaf_page_id, true)?;
        self.buffer_pool.unpin_page(new_leaf_id, true)?;

        debug!("split leaf {} into {}/{}", leaf_page_id, leaf_page_id, new_leaf_id);
        self.insert_into_parent(leaf_page_id, &promoted_key, new_leaf_id, parent_page_id)?;
        Ok(true)
    }

    fn insert_into_parent(
        &self,
        old_child_id: PageIdT,
        key: &[u8],
        new_child_id: PageIdT,
        parent_page_id: PageIdT,
    ) -> Result<(), IndexError> {
        if parent_page_id == INVALID_PAGE_ID {
            let (new_root_id, new_root_frame) = self.buffer_pool.new_page()?;
            {
                let mut bytes = self.buffer_pool.write_frame(new_root_frame);
                let mut root = InternalPageView::new(&mut bytes);
                root.init(new_root_id, INVALID_PAGE_ID, self.key_size, self.internal_max_size);
                root.populate_new_root(old_child_id, key, new_child_id);
            }
            self.set_parent_page_id(old_child_id, new_root_id)?;
            self.set_parent_page_id(new_child_id, new_root_id)?;
            self.buffer_pool.unpin_page(new_root_id, true)?;
            self.root_page_id.set(new_root_id);
            return self.persist_root();
        }

        let frame_id = self.buffer_pool.fetch_page(parent_page_id)?;
        let (new_size, grandparent_id) = {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            let mut view = InternalPageView::new(&mut bytes);
            let new_size = view.insert_after(old_child_id, key, new_child_id);
            (new_size, view.parent_page_id())
        };

        if new_size <= self.internal_max_size {
            self.buffer_pool.unpin_page(parent_page_id, true)?;
            return Ok(());
        }

        let (new_internal_id, new_frame_id) = self.buffer_pool.new_page()?;
        {
            let mut bytes = self.buffer_pool.write_frame(new_frame_id);
            InternalPageView::new(&mut bytes).init(
                new_internal_id,
                grandparent_id,
                self.key_size,
                self.internal_max_size,
            );
        }
        let promoted_key = {
            let mut left_bytes = self.buffer_pool.write_frame(frame_id);
            let mut right_bytes = self.buffer_pool.write_frame(new_frame_id);
            let mut left = InternalPageView::new(&mut left_bytes);
            let mut right = InternalPageView::new(&mut right_bytes);
            left.move_half_to(&mut right)
        };
        self.buffer_pool.unpin_page(parent_page_id, true)?;
        self.buffer_pool.unpin_page(new_internal_id, true)?;
        self.reparent_children(new_internal_id)?;

        self.insert_into_parent(parent_page_id, &promoted_key, new_internal_id, grandparent_id)
    }

    fn reparent_children(&self, internal_page_id: PageIdT) -> Result<(), IndexError> {
        let frame_id = self.buffer_pool.fetch_page(internal_page_id)?;
        let children: Vec<PageIdT> = {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            let view = InternalPageView::new(&mut bytes);
            (0..view.size()).map(|i| view.child_at(i)).collect()
        };
        self.buffer_pool.unpin_page(internal_page_id, false)?;
        for child in children {
            self.set_parent_page_id(child, internal_page_id)?;
        }
        Ok(())
    }

    fn set_parent_page_id(&self, child_page_id: PageIdT, parent_page_id: PageIdT) -> Result<(), IndexError> {
        let frame_id = self.buffer_pool.fetch_page(child_page_id)?;
        {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            match btree_page::node_type(&bytes) {
                NodeType::Leaf => LeafPageView::new(&mut bytes).set_parent_page_id(parent_page_id),
                NodeType::Internal => InternalPageView::new(&mut bytes).set_parent_page_id(parent_page_id),
                NodeType::Invalid => {}
            }
        }
        self.buffer_pool.unpin_page(child_page_id, true)?;
        Ok(())
    }

    pub fn remove(&self, key: &GenericKey) -> Result<bool, IndexError> {
        if self.is_empty() {
            return Ok(false);
        }
        let leaf_page_id = self.find_leaf_page_id(key.as_bytes())?;
        let frame_id = self.buffer_pool.fetch_page(leaf_page_id)?;
        let (removed, size, parent_page_id) = {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            let mut view = LeafPageView::new(&mut bytes);
            let removed = view.remove(key.as_bytes());
            (removed, view.size(), view.parent_page_id())
        };
        if !removed {
            self.buffer_pool.unpin_page(leaf_page_id, false)?;
            return Ok(false);
        }
        self.buffer_pool.unpin_page(leaf_page_id, true)?;

        if parent_page_id == INVALID_PAGE_ID {
            if size == 0 {
                self.root_page_id.set(INVALID_PAGE_ID);
                self.persist_root()?;
                self.buffer_pool.delete_page(leaf_page_id)?;
            }
            return Ok(true);
        }

        let minimum = {
            let frame_id = self.buffer_pool.fetch_page(leaf_page_id)?;
            let min = {
                let mut bytes = self.buffer_pool.write_frame(frame_id);
                LeafPageView::new(&mut bytes).minimum_size()
            };
            self.buffer_pool.unpin_page(leaf_page_id, false)?;
            min
        };
        if size < minimum {
            self.coalesce_or_redistribute_leaf(leaf_page_id, parent_page_id)?;
        }
        Ok(true)
    }

    fn coalesce_or_redistribute_leaf(&self, page_id: PageIdT, parent_page_id: PageIdT) -> Result<(), IndexError> {
        let parent_frame_id = self.buffer_pool.fetch_page(parent_page_id)?;
        let (sibling_idx, sibling_id, node_idx) = {
            let mut bytes = self.buffer_pool.write_frame(parent_frame_id);
            let view = InternalPageView::new(&mut bytes);
            let node_idx = view.index_of_child(page_id).ok_or(IndexError::CorruptNode(page_id))?;
            if node_idx > 0 {
                (node_idx - 1, view.child_at(node_idx - 1), node_idx)
            } else {
                (node_idx + 1, view.child_at(node_idx + 1), node_idx)
            }
        };
        let use_left = sibling_idx < node_idx;

        let node_frame_id = self.buffer_pool.fetch_page(page_id)?;
        let sibling_frame_id = self.buffer_pool.fetch_page(sibling_id)?;

        let (node_size, sibling_size, max_size) = {
            let mut node_bytes = self.buffer_pool.write_frame(node_frame_id);
            let mut sib_bytes = self.buffer_pool.write_frame(sibling_frame_id);
            let node = LeafPageView::new(&mut node_bytes);
            let sib = LeafPageView::new(&mut sib_bytes);
            (node.size(), sib.size(), node.max_size())
        };

        if node_size + sibling_size > max_size {
            // Redistribute.
            {
                let mut node_bytes = self.buffer_pool.write_frame(node_frame_id);
                let mut sib_bytes = self.buffer_pool.write_frame(sibling_frame_id);
                let mut node = LeafPageView::new(&mut node_bytes);
                let mut sib = LeafPageView::new(&mut sib_bytes);
                if use_left {
                    node.borrow_back_from(&mut sib);
                } else {
                    node.borrow_front_from(&mut sib);
                }
            }
            let new_separator = {
                let mut bytes = self.buffer_pool.write_frame(if use_left { node_frame_id } else { sibling_frame_id });
                LeafPageView::new(&mut bytes).key_at(0)
            };
            {
                let mut bytes = self.buffer_pool.write_frame(parent_frame_id);
                let mut parent = InternalPageView::new(&mut bytes);
                let separator_slot = if use_left { node_idx } else { sibling_idx };
                parent.replace_key_at(separator_slot, &new_separator);
            }
            self.buffer_pool.unpin_page(page_id, true)?;
            self.buffer_pool.unpin_page(sibling_id, true)?;
            self.buffer_pool.unpin_page(parent_page_id, true)?;
            return Ok(());
        }

        // Coalesce: merge the right node into the left node and drop the right one.
        let (surviving_id, removed_id, removed_slot) = if use_left {
            (sibling_id, page_id, node_idx)
        } else {
            (page_id, sibling_id, sibling_idx)
        };
        let surviving_frame = if use_left { sibling_frame_id } else { node_frame_id };
        let removed_frame = if use_left { node_frame_id } else { sibling_frame_id };
        {
            let mut surv_bytes = self.buffer_pool.write_frame(surviving_frame);
            let mut rem_bytes = self.buffer_pool.write_frame(removed_frame);
            let mut surv = LeafPageView::new(&mut surv_bytes);
            let mut rem = LeafPageView::new(&mut rem_bytes);
            surv.absorb(&mut rem);
            surv.set_next_page_id(rem.next_page_id());
        }
        self.buffer_pool.unpin_page(page_id, true)?;
        self.buffer_pool.unpin_page(sibling_id, true)?;
        self.buffer_pool.delete_page(removed_id)?;

        let (parent_size, grandparent_id) = {
            let mut bytes = self.buffer_pool.write_frame(parent_frame_id);
            let mut parent = InternalPageView::new(&mut bytes);
            parent.remove_at(removed_slot);
            (parent.size(), parent.parent_page_id())
        };
        let _ = surviving_id;

        if grandparent_id == INVALID_PAGE_ID {
            self.buffer_pool.unpin_page(parent_page_id, true)?;
            self.adjust_root(parent_page_id)?;
            return Ok(());
        }

        let minimum = {
            let mut bytes = self.buffer_pool.write_frame(parent_frame_id);
            InternalPageView::new(&mut bytes).minimum_size()
        };
        self.buffer_pool.unpin_page(parent_page_id, true)?;
        if parent_size < minimum {
            self.coalesce_or_redistribute_internal(parent_page_id, grandparent_id)?;
        }
        Ok(())
    }

    fn coalesce_or_redistribute_internal(&self, page_id: PageIdT, parent_page_id: PageIdT) -> Result<(), IndexError> {
        let parent_frame_id = self.buffer_pool.fetch_page(parent_page_id)?;
        let (sibling_idx, sibling_id, node_idx) = {
            let mut bytes = self.buffer_pool.write_frame(parent_frame_id);
            let view = InternalPageView::new(&mut bytes);
            let node_idx = view.index_of_child(page_id).ok_or(IndexError::CorruptNode(page_id))?;
            if node_idx > 0 {
                (node_idx - 1, view.child_at(node_idx - 1), node_idx)
            } else {
                (node_idx + 1, view.child_at(node_idx + 1), node_idx)
            }
        };
        let use_left = sibling_idx < node_idx;

        let node_frame_id = self.buffer_pool.fetch_page(page_id)?;
        let sibling_frame_id = self.buffer_pool.fetch_page(sibling_id)?;

        let (node_size, sibling_size, max_size) = {
            let mut node_bytes = self.buffer_pool.write_frame(node_frame_id);
            let mut sib_bytes = self.buffer_pool.write_frame(sibling_frame_id);
            let node = InternalPageView::new(&mut node_bytes);
            let sib = InternalPageView::new(&mut sib_bytes);
            (node.size(), sib.size(), node.max_size())
        };

        let separator_slot = if use_left { node_idx } else { sibling_idx };
        let separator = {
            let mut bytes = self.buffer_pool.write_frame(parent_frame_id);
            InternalPageView::new(&mut bytes).key_at(separator_slot)
        };

        if node_size + sibling_size > max_size {
            let new_separator = {
                let mut node_bytes = self.buffer_pool.write_frame(node_frame_id);
                let mut sib_bytes = self.buffer_pool.write_frame(sibling_frame_id);
                let mut node = InternalPageView::new(&mut node_bytes);
                let mut sib = InternalPageView::new(&mut sib_bytes);
                if use_left {
                    node.borrow_back_from(&mut sib, &separator)
                } else {
                    node.borrow_front_from(&mut sib, &separator);
                    sib.key_at(0)
                }
            };
            self.reparent_children(page_id)?;
            {
                let mut bytes = self.buffer_pool.write_frame(parent_frame_id);
                InternalPageView::new(&mut bytes).replace_key_at(separator_slot, &new_separator);
            }
            self.buffer_pool.unpin_page(page_id, true)?;
            self.buffer_pool.unpin_page(sibling_id, true)?;
            self.buffer_pool.unpin_page(parent_page_id, true)?;
            return Ok(());
        }

        let (surviving_id, removed_id) = if use_left {
            (sibling_id, page_id)
        } else {
            (page_id, sibling_id)
        };
        let surviving_frame = if use_left { sibling_frame_id } else { node_frame_id };
        let removed_frame = if use_left { node_frame_id } else { sibling_frame_id };
        {
            let mut surv_bytes = self.buffer_pool.write_frame(surviving_frame);
            let mut rem_bytes = self.buffer_pool.write_frame(removed_frame);
            let mut surv = InternalPageView::new(&mut surv_bytes);
            let mut rem = InternalPageView::new(&mut rem_bytes);
            surv.absorb(&mut rem, &separator);
        }
        self.buffer_pool.unpin_page(page_id, true)?;
        self.buffer_pool.unpin_page(sibling_id, true)?;
        self.reparent_children(surviving_id)?;
        self.buffer_pool.delete_page(removed_id)?;

        let (parent_size, grandparent_id) = {
            let mut bytes = self.buffer_pool.write_frame(parent_frame_id);
            let mut parent = InternalPageView::new(&mut bytes);
            parent.remove_at(separator_slot);
            (parent.size(), parent.parent_page_id())
        };

        if grandparent_id == INVALID_PAGE_ID {
            self.buffer_pool.unpin_page(parent_page_id, true)?;
            self.adjust_root(parent_page_id)?;
            return Ok(());
        }

        let minimum = {
            let mut bytes = self.buffer_pool.write_frame(parent_frame_id);
            InternalPageView::new(&mut bytes).minimum_size()
        };
        self.buffer_pool.unpin_page(parent_page_id, true)?;
        if parent_size < minimum {
            self.coalesce_or_redistribute_internal(parent_page_id, grandparent_id)?;
        }
        Ok(())
    }

    /// Collapse a root whose single remaining child should become the new root, or empty the
    /// tree if a leaf root has no entries left.
    fn adjust_root(&self, page_id: PageIdT) -> Result<(), IndexError> {
        let frame_id = self.buffer_pool.fetch_page(page_id)?;
        let (node_type, size, sole_child) = {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            match btree_page::node_type(&bytes) {
                NodeType::Internal => {
                    let view = InternalPageView::new(&mut bytes);
                    let size = view.size();
                    let sole_child = if size == 1 { Some(view.child_at(0)) } else { None };
                    (NodeType::Internal, size, sole_child)
                }
                NodeType::Leaf => {
                    let size = LeafPageView::new(&mut bytes).size();
                    (NodeType::Leaf, size, None)
                }
                NodeType::Invalid => (NodeType::Invalid, 0, None),
            }
        };
        self.buffer_pool.unpin_page(page_id, false)?;

        match (node_type, sole_child) {
            (NodeType::Internal, Some(child_id)) => {
                self.set_parent_page_id(child_id, INVALID_PAGE_ID)?;
                self.root_page_id.set(child_id);
                self.persist_root()?;
                self.buffer_pool.delete_page(page_id)?;
            }
            (NodeType::Leaf, _) if size == 0 => {
                self.root_page_id.set(INVALID_PAGE_ID);
                self.persist_root()?;
                self.buffer_pool.delete_page(page_id)?;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn iter(&'a self) -> Result<IndexIterator<'a>, IndexError> {
        if self.is_empty() {
            return Ok(IndexIterator::empty(self.buffer_pool));
        }
        let mut page_id = self.root_page_id.get();
        loop {
            let frame_id = self.buffer_pool.fetch_page(page_id)?;
            let (node_type, first_child) = {
                let mut bytes = self.buffer_pool.write_frame(frame_id);
                match btree_page::node_type(&bytes) {
                    NodeType::Leaf => (NodeType::Leaf, INVALID_PAGE_ID),
                    NodeType::Internal => (NodeType::Internal, InternalPageView::new(&mut bytes).child_at(0)),
                    NodeType::Invalid => (NodeType::Invalid, INVALID_PAGE_ID),
                }
            };
            match node_type {
                NodeType::Leaf => {
                    self.buffer_pool.unpin_page(page_id, false)?;
                    return Ok(IndexIterator::new(self.buffer_pool, page_id));
                }
                NodeType::Internal => {
                    self.buffer_pool.unpin_page(page_id, false)?;
                    page_id = first_child;
                }
                NodeType::Invalid => return Err(IndexError::CorruptNode(page_id)),
            }
        }
    }

    /// Start iteration at the first key `>= key`, descending to its leaf the same way
    /// `get_value` does rather than starting from the leftmost leaf.
    pub fn iter_from(&'a self, key: &GenericKey) -> Result<IndexIterator<'a>, IndexError> {
        if self.is_empty() {
            return Ok(IndexIterator::empty(self.buffer_pool));
        }
        let leaf_page_id = self.find_leaf_page_id(key.as_bytes())?;
        Ok(IndexIterator::from_key(self.buffer_pool, leaf_page_id, key.as_bytes())?)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    #[error("buffer pool error: {0}")]
    Buffer(#[from] crate::buffer::BufferError),
    #[error("encountered a page with no recognized node type: {0}")]
    CorruptNode(PageIdT),
}
