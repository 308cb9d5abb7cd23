/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! The disk manager owns a single database file and partitions it into fixed-size pages.
//!
//! The file is organized in *extents*: one bitmap page followed by `BITMAP_SIZE` data pages.
//! Physical page 0 is the disk meta page, which never has a logical id of its own. The physical
//! page of logical page `L` is `L + L / BITMAP_SIZE + 2`; extent `k`'s bitmap page sits at
//! physical page `k * (BITMAP_SIZE + 1) + 1`.

use crate::common::{PageIdT, BITMAP_SIZE, INVALID_PAGE_ID, MAX_EXTENTS, PAGE_SIZE};
use crate::page::bitmap_page::BitmapPageView;
use crate::page::PageBytes;
use log::{debug, error, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

const META_ALLOCATED_COUNT_OFFSET: u32 = 0;
const META_NUM_EXTENTS_OFFSET: u32 = 4;
const META_EXTENT_COUNTS_OFFSET: u32 = 8;

struct DiskMeta {
    num_allocated_pages: u32,
    num_extents: u32,
    extent_used: Vec<u32>,
}

impl DiskMeta {
    fn empty() -> Self {
        Self {
            num_allocated_pages: 0,
            num_extents: 0,
            extent_used: Vec::new(),
        }
    }

    fn serialize(&self) -> PageBytes {
        let mut bytes = crate::page::zeroed();
        crate::common::io::write_u32(
            &mut bytes,
            META_ALLOCATED_COUNT_OFFSET,
            self.num_allocated_pages,
        )
        .unwrap();
        crate::common::io::write_u32(&mut bytes, META_NUM_EXTENTS_OFFSET, self.num_extents)
            .unwrap();
        for (i, count) in self.extent_used.iter().enumerate() {
            let offset = META_EXTENT_COUNTS_OFFSET + (i as u32) * 4;
            crate::common::io::write_u32(&mut bytes, offset, *count).unwrap();
        }
        bytes
    }

    fn deserialize(bytes: &PageBytes) -> Self {
        let num_allocated_pages =
            crate::common::io::read_u32(bytes, META_ALLOCATED_COUNT_OFFSET).unwrap_or(0);
        let num_extents = crate::common::io::read_u32(bytes, META_NUM_EXTENTS_OFFSET).unwrap_or(0);
        let mut extent_used = Vec::with_capacity(num_extents as usize);
        for i in 0..num_extents {
            let offset = META_EXTENT_COUNTS_OFFSET + i * 4;
            extent_used.push(crate::common::io::read_u32(bytes, offset).unwrap_or(0));
        }
        Self {
            num_allocated_pages,
            num_extents,
            extent_used,
        }
    }
}

struct DiskManagerState {
    file: File,
    meta: DiskMeta,
}

/// Manages reads, writes, and space allocation against one database file.
pub struct DiskManager {
    state: Mutex<DiskManagerState>,
    filename: String,
}

impl DiskManager {
    /// Open (creating if necessary) the database file at `filename`.
    pub fn new(filename: &str) -> Self {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(filename)
            .unwrap_or_else(|e| panic!("failed to open database file {}: {}", filename, e));

        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        let meta = if len >= PAGE_SIZE as u64 {
            let mut bytes = crate::page::zeroed();
            file.seek(SeekFrom::Start(0)).unwrap();
            file.read_exact(&mut bytes).unwrap();
            DiskMeta::deserialize(&bytes)
        } else {
            let meta = DiskMeta::empty();
            file.seek(SeekFrom::Start(0)).unwrap();
            file.write_all(&meta.serialize()).unwrap();
            file.flush().unwrap();
            meta
        };

        Self {
            state: Mutex::new(DiskManagerState { file, meta }),
            filename: filename.to_string(),
        }
    }

    /// Physical page holding extent `k`'s bitmap.
    fn bitmap_physical(extent_id: u32) -> u64 {
        extent_id as u64 * (BITMAP_SIZE as u64 + 1) + 1
    }

    /// Physical page holding logical page `logical`.
    fn data_physical(logical: PageIdT) -> u64 {
        let logical = logical as u64;
        logical + logical / BITMAP_SIZE as u64 + 2
    }

    fn read_physical(file: &mut File, physical: u64) -> PageBytes {
        let mut bytes = crate::page::zeroed();
        let offset = physical * PAGE_SIZE as u64;
        let file_len = file.metadata().map(|m| m.len()).unwrap_or(0);
        if offset >= file_len {
            return bytes;
        }
        if file.seek(SeekFrom::Start(offset)).is_err() {
            return bytes;
        }
        let available = (file_len - offset).min(PAGE_SIZE as u64) as usize;
        if let Err(e) = file.read_exact(&mut bytes[..available]) {
            warn!("short read at physical page {}: {}", physical, e);
        }
        bytes
    }

    fn write_physical(file: &mut File, physical: u64, bytes: &PageBytes) {
        let offset = physical * PAGE_SIZE as u64;
        if let Err(e) = file.seek(SeekFrom::Start(offset)) {
            error!("failed to seek to physical page {}: {}", physical, e);
            return;
        }
        if let Err(e) = file.write_all(bytes) {
            error!("failed to write physical page {}: {}", physical, e);
            return;
        }
        if let Err(e) = file.flush() {
            error!("failed to flush physical page {}: {}", physical, e);
        }
    }

    /// Read a page's bytes. Reads past the end of the file, or of an unallocated page, zero-fill.
    pub fn read_page(&self, page_id: PageIdT) -> PageBytes {
        let mut state = self.state.lock().unwrap();
        let physical = Self::data_physical(page_id);
        Self::read_physical(&mut state.file, physical)
    }

    /// Write a page's bytes to disk. Best-effort: I/O errors are logged and the call returns.
    pub fn write_page(&self, page_id: PageIdT, data: &PageBytes) {
        let mut state = self.state.lock().unwrap();
        let physical = Self::data_physical(page_id);
        Self::write_physical(&mut state.file, physical, data);
    }

    /// Allocate a new logical page. Returns `INVALID_PAGE_ID` when the extent directory is full.
    pub fn allocate_page(&self) -> PageIdT {
        let mut state = self.state.lock().unwrap();

        // Try existing extents first.
        for extent_id in 0..state.meta.num_extents {
            let bitmap_phys = Self::bitmap_physical(extent_id);
            let mut bitmap_bytes = Self::read_physical(&mut state.file, bitmap_phys);
            let mut view = BitmapPageView::new(&mut bitmap_bytes);
            if let Some(offset) = view.find_free() {
                view.allocate(offset).unwrap();
                Self::write_physical(&mut state.file, bitmap_phys, &bitmap_bytes);

                let logical = extent_id * BITMAP_SIZE + offset;
                state.meta.num_allocated_pages += 1;
                state.meta.extent_used[extent_id as usize] += 1;
                let meta_bytes = state.meta.serialize();
                Self::write_physical(&mut state.file, 0, &meta_bytes);

                debug!("allocated logical page {} (extent {})", logical, extent_id);
                return logical;
            }
        }

        // All existing extents are full; create a new one if the directory has room.
        if state.meta.num_extents >= MAX_EXTENTS {
            warn!("extent directory full; cannot allocate a new page");
            return INVALID_PAGE_ID;
        }

        let extent_id = state.meta.num_extents;
        let mut bitmap_bytes = crate::page::zeroed();
        let mut view = BitmapPageView::new(&mut bitmap_bytes);
        view.allocate(0).unwrap();
        Self::write_physical(&mut state.file, Self::bitmap_physical(extent_id), &bitmap_bytes);

        state.meta.num_extents += 1;
        state.meta.extent_used.push(1);
        state.meta.num_allocated_pages += 1;
        let meta_bytes = state.meta.serialize();
        Self::write_physical(&mut state.file, 0, &meta_bytes);

        let logical = extent_id * BITMAP_SIZE;
        debug!("allocated logical page {} (new extent {})", logical, extent_id);
        logical
    }

    /// Free a logical page. Idempotent on an already-free page.
    pub fn deallocate_page(&self, page_id: PageIdT) {
        let mut state = self.state.lock().unwrap();
        let extent_id = page_id as u32 / BITMAP_SIZE;
        let offset = page_id as u32 % BITMAP_SIZE;

        if extent_id >= state.meta.num_extents {
            return;
        }

        let bitmap_phys = Self::bitmap_physical(extent_id);
        let mut bitmap_bytes = Self::read_physical(&mut state.file, bitmap_phys);
        let mut view = BitmapPageView::new(&mut bitmap_bytes);
        if view.is_free(offset) {
            return;
        }
        view.deallocate(offset).unwrap();
        Self::write_physical(&mut state.file, bitmap_phys, &bitmap_bytes);

        state.meta.num_allocated_pages = state.meta.num_allocated_pages.saturating_sub(1);
        state.meta.extent_used[extent_id as usize] =
            state.meta.extent_used[extent_id as usize].saturating_sub(1);

        // Drop trailing, now-empty extents so the directory can be reused.
        while state.meta.num_extents > 0
            && state.meta.extent_used[state.meta.num_extents as usize - 1] == 0
        {
            state.meta.num_extents -= 1;
            state.meta.extent_used.pop();
        }

        let meta_bytes = state.meta.serialize();
        Self::write_physical(&mut state.file, 0, &meta_bytes);
        debug!("deallocated logical page {}", page_id);
    }

    /// Return whether a logical page is currently free (never allocated, or since freed).
    pub fn is_page_free(&self, page_id: PageIdT) -> bool {
        let mut state = self.state.lock().unwrap();
        let extent_id = page_id as u32 / BITMAP_SIZE;
        let offset = page_id as u32 % BITMAP_SIZE;
        if extent_id >= state.meta.num_extents {
            return true;
        }
        let bitmap_phys = Self::bitmap_physical(extent_id);
        let mut bitmap_bytes = Self::read_physical(&mut state.file, bitmap_phys);
        BitmapPageView::new(&mut bitmap_bytes).is_free(offset)
    }

    /// Total number of currently allocated data pages.
    pub fn num_allocated_pages(&self) -> u32 {
        self.state.lock().unwrap().meta.num_allocated_pages
    }

    /// Flush the meta page and close the file. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        let meta_bytes = state.meta.serialize();
        Self::write_physical(&mut state.file, 0, &meta_bytes);
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct TestContext {
        disk_manager: DiskManager,
        filename: String,
    }

    impl Drop for TestContext {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.filename);
        }
    }

    fn setup(test_id: &str) -> TestContext {
        let _ = env_logger::try_init();
        let filename = format!("DM_TEST_{}.jin", test_id);
        let _ = fs::remove_file(&filename);
        TestContext {
            disk_manager: DiskManager::new(&filename),
            filename,
        }
    }

    #[test]
    fn test_allocate_and_free_roundtrip() {
        let ctx = setup("alloc_free");
        let dm = &ctx.disk_manager;

        let first = dm.allocate_page();
        assert_eq!(first, 0);
        assert!(!dm.is_page_free(first));

        dm.deallocate_page(first);
        assert!(dm.is_page_free(first));

        let reused = dm.allocate_page();
        assert_eq!(reused, first);
    }

    #[test]
    fn test_allocate_crosses_extent_boundary() {
        let ctx = setup("extent_boundary");
        let dm = &ctx.disk_manager;

        // Drain the first extent entirely, then allocate one more page; it must land in a new
        // extent at logical id BITMAP_SIZE.
        for expected in 0..BITMAP_SIZE {
            assert_eq!(dm.allocate_page(), expected as PageIdT);
        }
        assert_eq!(dm.allocate_page(), BITMAP_SIZE as PageIdT);
        assert_eq!(dm.num_allocated_pages(), BITMAP_SIZE + 1);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let ctx = setup("write_read");
        let dm = &ctx.disk_manager;

        let page_id = dm.allocate_page();
        let mut data = crate::page::zeroed();
        data[0] = 123;
        data[PAGE_SIZE as usize - 1] = 231;
        dm.write_page(page_id, &data);

        let read_back = dm.read_page(page_id);
        assert_eq!(read_back, data);
    }

    #[test]
    fn test_read_unallocated_page_zero_fills() {
        let ctx = setup("read_unallocated");
        let data = ctx.disk_manager.read_page(900_000);
        assert_eq!(data, crate::page::zeroed());
    }

    #[test]
    fn test_deallocate_is_idempotent() {
        let ctx = setup("dealloc_idempotent");
        let dm = &ctx.disk_manager;
        let page_id = dm.allocate_page();
        dm.deallocate_page(page_id);
        dm.deallocate_page(page_id);
        assert!(dm.is_page_free(page_id));
    }

    #[test]
    fn test_reopen_preserves_allocation_state() {
        let filename = "DM_TEST_reopen.jin".to_string();
        let _ = fs::remove_file(&filename);
        let page_id;
        {
            let dm = DiskManager::new(&filename);
            page_id = dm.allocate_page();
            dm.allocate_page();
            dm.close();
        }
        {
            let dm = DiskManager::new(&filename);
            assert_eq!(dm.num_allocated_pages(), 2);
            assert!(!dm.is_page_free(page_id));
        }
        let _ = fs::remove_file(&filename);
    }
}
