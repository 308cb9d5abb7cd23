/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! The buffer pool caches `pool_size` pages in memory, pins them for callers, and evicts
//! unpinned frames on an LRU policy when a fetch or allocation needs a free slot.
//!
//! Two lock namespaces are kept deliberately separate:
//! - a single pool-wide mutex ([`PoolState`]) over the page table, free list, replacer, and
//!   per-frame metadata (page id, pin count, dirty flag);
//! - a per-frame `RwLock` over the frame's raw bytes, acquired by the caller only after a
//!   successful pin, independent of the pool-wide mutex.

pub mod replacer;

use crate::common::{FrameIdT, PageIdT, INVALID_PAGE_ID};
use crate::disk::DiskManager;
use crate::page::{zeroed, PageBytes};
use crate::buffer::replacer::LruReplacer;
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Copy)]
struct FrameMeta {
    page_id: PageIdT,
    pin_count: u32,
    is_dirty: bool,
}

impl FrameMeta {
    fn empty() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

struct PoolState {
    frame_meta: Vec<FrameMeta>,
    page_table: HashMap<PageIdT, FrameIdT>,
    free_list: VecDeque<FrameIdT>,
    replacer: LruReplacer,
}

pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<RwLock<PageBytes>>,
    state: Mutex<PoolState>,
    disk_manager: DiskManager,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        let frames = (0..pool_size).map(|_| RwLock::new(zeroed())).collect();
        let frame_meta = vec![FrameMeta::empty(); pool_size];
        let free_list = (0..pool_size).collect();

        Self {
            pool_size,
            frames,
            state: Mutex::new(PoolState {
                frame_meta,
                page_table: HashMap::new(),
                free_list,
                replacer: LruReplacer::new(),
            }),
            disk_manager,
        }
    }

    pub fn disk_manager(&self) -> &DiskManager {
        &self.disk_manager
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Obtain a frame to install a page into: the free list first, the LRU victim otherwise.
    /// Flushes the victim if it holds a dirty page. Returns `None` if no frame is available.
    fn acquire_frame(&self, state: &mut PoolState) -> Option<FrameIdT> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Some(frame_id);
        }

        let frame_id = state.replacer.victim()?;
        let meta = state.frame_meta[frame_id];
        if meta.is_dirty {
            let bytes = *self.frames[frame_id].read().unwrap();
            self.disk_manager.write_page(meta.page_id, &bytes);
            debug!("flushed dirty victim page {} before eviction", meta.page_id);
        }
        state.page_table.remove(&meta.page_id);
        Some(frame_id)
    }

    /// Fetch `page_id`, pinning it. If not already resident, evicts a victim frame and reads the
    /// page from disk. Returns `NoFreeFrame` iff every frame is pinned and the replacer is empty.
    pub fn fetch_page(&self, page_id: PageIdT) -> Result<FrameIdT, BufferError> {
        let mut state = self.state.lock().unwrap();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.frame_meta[frame_id].pin_count += 1;
            state.replacer.pin(frame_id);
            return Ok(frame_id);
        }

        let frame_id = self
            .acquire_frame(&mut state)
            .ok_or(BufferError::NoFreeFrame)?;

        let bytes = self.disk_manager.read_page(page_id);
        *self.frames[frame_id].write().unwrap() = bytes;

        state.page_table.insert(page_id, frame_id);
        state.frame_meta[frame_id] = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: false,
        };
        Ok(frame_id)
    }

    /// Allocate a brand-new page on disk, install it zeroed into a frame, and pin it.
    pub fn new_page(&self) -> Result<(PageIdT, FrameIdT), BufferError> {
        let mut state = self.state.lock().unwrap();

        let frame_id = self
            .acquire_frame(&mut state)
            .ok_or(BufferError::NoFreeFrame)?;

        let page_id = self.disk_manager.allocate_page();
        if page_id == INVALID_PAGE_ID {
            state.free_list.push_back(frame_id);
            return Err(BufferError::DiskFull);
        }

        *self.frames[frame_id].write().unwrap() = zeroed();
        state.page_table.insert(page_id, frame_id);
        state.frame_meta[frame_id] = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: true,
        };
        Ok((page_id, frame_id))
    }

    /// Unpin a resident page, marking it dirty if requested. When the pin count reaches 0 the
    /// frame becomes eligible for eviction.
    pub fn unpin_page(&self, page_id: PageIdT, dirty: bool) -> Result<(), BufferError> {
        let mut state = self.state.lock().unwrap();
        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(BufferError::PageNotResident)?;

        let meta = &mut state.frame_meta[frame_id];
        meta.is_dirty |= dirty;
        if meta.pin_count > 0 {
            meta.pin_count -= 1;
        }
        if meta.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// Write a resident page's bytes to disk. Does not clear the dirty flag: a writer may still
    /// be mid-update while holding its pin, so the flush is advisory.
    pub fn flush_page(&self, page_id: PageIdT) -> Result<(), BufferError> {
        let state = self.state.lock().unwrap();
        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(BufferError::PageNotResident)?;
        let bytes = *self.frames[frame_id].read().unwrap();
        self.disk_manager.write_page(page_id, &bytes);
        Ok(())
    }

    /// Flush every resident page to disk, dirty or not.
    pub fn flush_all_pages(&self) {
        let state = self.state.lock().unwrap();
        for (&page_id, &frame_id) in state.page_table.iter() {
            let bytes = *self.frames[frame_id].read().unwrap();
            self.disk_manager.write_page(page_id, &bytes);
        }
    }

    /// Remove a page from the buffer and free it on disk. Fails if the page is resident and
    /// pinned. Returns `true` if the page is gone (whether or not it was ever resident).
    pub fn delete_page(&self, page_id: PageIdT) -> Result<bool, BufferError> {
        let mut state = self.state.lock().unwrap();
        if let Some(frame_id) = state.page_table.get(&page_id).copied() {
            if state.frame_meta[frame_id].pin_count > 0 {
                return Err(BufferError::PagePinned);
            }
            state.page_table.remove(&page_id);
            state.replacer.pin(frame_id);
            state.frame_meta[frame_id] = FrameMeta::empty();
            state.free_list.push_back(frame_id);
        }
        self.disk_manager.deallocate_page(page_id);
        Ok(true)
    }

    /// Debug assertion: every frame in the pool has pin count 0.
    pub fn check_all_unpinned(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.frame_meta.iter().all(|meta| meta.pin_count == 0)
    }

    /// Acquire the read latch over a pinned frame's bytes.
    pub fn read_frame(&self, frame_id: FrameIdT) -> RwLockReadGuard<PageBytes> {
        self.frames[frame_id].read().unwrap()
    }

    /// Acquire the write latch over a pinned frame's bytes.
    pub fn write_frame(&self, frame_id: FrameIdT) -> RwLockWriteGuard<PageBytes> {
        self.frames[frame_id].write().unwrap()
    }
}

/// Custom error types used by the buffer pool manager.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    #[error("no buffer frame is available: every frame is pinned")]
    NoFreeFrame,
    #[error("cannot delete a pinned page")]
    PagePinned,
    #[error("page is not resident in the buffer pool")]
    PageNotResident,
    #[error("disk manager has no space left to allocate a new page")]
    DiskFull,
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn setup(test_id: &str, pool_size: usize) -> TestContext {
        let _ = env_logger::try_init();
        let filename = format!("BPM_TEST_{}.jin", test_id);
        let _ = fs::remove_file(&filename);
        TestContext {
            bpm: BufferPoolManager::new(pool_size, DiskManager::new(&filename)),
            filename,
        }
    }

    #[test]
    fn test_new_page_is_pinned_and_zeroed() {
        let ctx = setup("new_page", 4);
        let (page_id, frame_id) = ctx.bpm.new_page().unwrap();
        assert_eq!(*ctx.bpm.read_frame(frame_id), zeroed());
        assert!(!ctx.bpm.check_all_unpinned());
        ctx.bpm.unpin_page(page_id, false).unwrap();
        assert!(ctx.bpm.check_all_unpinned());
    }

    #[test]
    fn test_fetch_after_flush_roundtrips_bytes() {
        let ctx = setup("fetch_roundtrip", 4);
        let (page_id, frame_id) = ctx.bpm.new_page().unwrap();
        {
            let mut bytes = ctx.bpm.write_frame(frame_id);
            bytes[0] = 77;
        }
        ctx.bpm.unpin_page(page_id, true).unwrap();
        ctx.bpm.flush_page(page_id).unwrap();

        // Force eviction by filling the rest of the pool and fetching one more page.
        for _ in 0..4 {
            let (id, _) = ctx.bpm.new_page().unwrap();
            ctx.bpm.unpin_page(id, false).unwrap();
        }

        let frame_id_2 = ctx.bpm.fetch_page(page_id).unwrap();
        assert_eq!(ctx.bpm.read_frame(frame_id_2)[0], 77);
        ctx.bpm.unpin_page(page_id, false).unwrap();
    }

    #[test]
    fn test_scenario_s2_lru_eviction_order() {
        let ctx = setup("s2_lru", 3);
        let bpm = &ctx.bpm;

        let (p1, f1) = bpm.new_page().unwrap();
        let (p2, f2) = bpm.new_page().unwrap();
        let (p3, f3) = bpm.new_page().unwrap();
        bpm.unpin_page(p1, false).unwrap();
        bpm.unpin_page(p2, false).unwrap();
        bpm.unpin_page(p3, false).unwrap();

        // p1 is least-recently-unpinned, so it is evicted first.
        let (p4, f4) = bpm.new_page().unwrap();
        assert_eq!(f4, f1, "victim should reuse page 1's frame");
        bpm.unpin_page(p4, false).unwrap();

        // p2 is next in line.
        let (p5, f5) = bpm.new_page().unwrap();
        assert_eq!(f5, f2, "victim should reuse page 2's frame");
        bpm.unpin_page(p5, false).unwrap();

        // p3 was never re-touched, so fetching p1 back evicts p3's frame.
        let f_p1_again = bpm.fetch_page(p1).unwrap();
        assert_eq!(f_p1_again, f3);
        bpm.unpin_page(p1, false).unwrap();
    }

    #[test]
    fn test_delete_pinned_page_fails() {
        let ctx = setup("delete_pinned", 2);
        let (page_id, _) = ctx.bpm.new_page().unwrap();
        assert_eq!(ctx.bpm.delete_page(page_id), Err(BufferError::PagePinned));
        ctx.bpm.unpin_page(page_id, false).unwrap();
        assert_eq!(ctx.bpm.delete_page(page_id), Ok(true));
    }

    #[test]
    fn test_no_free_frame_when_all_pinned() {
        let ctx = setup("no_free_frame", 1);
        let (page_id, _) = ctx.bpm.new_page().unwrap();
        assert_eq!(ctx.bpm.new_page().unwrap_err(), BufferError::NoFreeFrame);
        ctx.bpm.unpin_page(page_id, false).unwrap();
    }
}
