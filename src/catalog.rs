/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! On-page encoding of the catalog's directory of tables and indexes. Table/index name
//! resolution and DDL (`CreateTable`, `DropIndex`, ...) live outside this core; what belongs
//! here is the wire format of `CatalogMeta`, since it is read and written exclusively through
//! this core's buffer pool and byte-codec helpers and must round-trip like `Schema`/`Column`/`Row`.

use crate::buffer::BufferPoolManager;
use crate::common::io::{read_u32, write_u32, IoError};
use crate::common::{PageIdT, CATALOG_META_PAGE_ID};
use std::collections::BTreeMap;

const CATALOG_META_MAGIC_NUM: u32 = 0x7A1C_0003;

/// `table_id -> table_meta_page_id` and `index_id -> index_meta_page_id` directories. Uses
/// `BTreeMap` rather than `HashMap` so serialization is byte-stable across runs.
pub struct CatalogMeta {
    table_meta_pages: BTreeMap<u32, PageIdT>,
    index_meta_pages: BTreeMap<u32, PageIdT>,
}

impl CatalogMeta {
    pub fn new() -> Self {
        Self {
            table_meta_pages: BTreeMap::new(),
            index_meta_pages: BTreeMap::new(),
        }
    }

    pub fn table_meta_pages(&self) -> &BTreeMap<u32, PageIdT> {
        &self.table_meta_pages
    }

    pub fn index_meta_pages(&self) -> &BTreeMap<u32, PageIdT> {
        &self.index_meta_pages
    }

    pub fn set_table_meta_page(&mut self, table_id: u32, page_id: PageIdT) {
        self.table_meta_pages.insert(table_id, page_id);
    }

    pub fn remove_table_meta_page(&mut self, table_id: u32) -> Option<PageIdT> {
        self.table_meta_pages.remove(&table_id)
    }

    pub fn set_index_meta_page(&mut self, index_id: u32, page_id: PageIdT) {
        self.index_meta_pages.insert(index_id, page_id);
    }

    pub fn remove_index_meta_page(&mut self, index_id: u32) -> Option<PageIdT> {
        self.index_meta_pages.remove(&index_id)
    }

    pub fn get_serialized_size(&self) -> u32 {
        4 + 4 + self.table_meta_pages.len() as u32 * 8 + 4 + self.index_meta_pages.len() as u32 * 8
    }

    pub fn serialize_to(&self, buf: &mut [u8], offset: u32) -> Result<u32, IoError> {
        let mut cursor = offset;
        write_u32(buf, cursor, CATALOG_META_MAGIC_NUM)?;
        cursor += 4;
        write_u32(buf, cursor, self.table_meta_pages.len() as u32)?;
        cursor += 4;
        for (&table_id, &page_id) in &self.table_meta_pages {
            write_u32(buf, cursor, table_id)?;
            cursor += 4;
            write_u32(buf, cursor, page_id as u32)?;
            cursor += 4;
        }
        write_u32(buf, cursor, self.index_meta_pages.len() as u32)?;
        cursor += 4;
        for (&index_id, &page_id) in &self.index_meta_pages {
            write_u32(buf, cursor, index_id)?;
            cursor += 4;
            write_u32(buf, cursor, page_id as u32)?;
            cursor += 4;
        }
        Ok(cursor - offset)
    }

    pub fn deserialize_from(buf: &[u8], offset: u32) -> Result<(Self, u32), IoError> {
        let mut cursor = offset;
        let magic = read_u32(buf, cursor)?;
        cursor += 4;
        if magic != CATALOG_META_MAGIC_NUM {
            return Err(IoError::Custom("bad catalog meta magic number".to_string()));
        }

        let mut meta = CatalogMeta::new();
        let table_count = read_u32(buf, cursor)?;
        cursor += 4;
        for _ in 0..table_count {
            let table_id = read_u32(buf, cursor)?;
            cursor += 4;
            let page_id = read_u32(buf, cursor)? as PageIdT;
            cursor += 4;
            meta.set_table_meta_page(table_id, page_id);
        }

        let index_count = read_u32(buf, cursor)?;
        cursor += 4;
        for _ in 0..index_count {
            let index_id = read_u32(buf, cursor)?;
            cursor += 4;
            let page_id = read_u32(buf, cursor)? as PageIdT;
            cursor += 4;
            meta.set_index_meta_page(index_id, page_id);
        }

        Ok((meta, cursor - offset))
    }

    /// Persist this directory to `CATALOG_META_PAGE_ID` through `buffer_pool`.
    pub fn flush(&self, buffer_pool: &BufferPoolManager) -> Result<(), CatalogError> {
        let frame_id = buffer_pool.fetch_page(CATALOG_META_PAGE_ID)?;
        {
            let mut bytes = buffer_pool.write_frame(frame_id);
            self.serialize_to(&mut bytes[..], 0)?;
        }
        buffer_pool.unpin_page(CATALOG_META_PAGE_ID, true)?;
        buffer_pool.flush_page(CATALOG_META_PAGE_ID)?;
        Ok(())
    }

    /// Load this directory back from `CATALOG_META_PAGE_ID` through `buffer_pool`.
    pub fn load(buffer_pool: &BufferPoolManager) -> Result<Self, CatalogError> {
        let frame_id = buffer_pool.fetch_page(CATALOG_META_PAGE_ID)?;
        let meta = {
            let bytes = buffer_pool.read_frame(frame_id);
            Self::deserialize_from(&bytes[..], 0)?.0
        };
        buffer_pool.unpin_page(CATALOG_META_PAGE_ID, false)?;
        Ok(meta)
    }
}

impl Default for CatalogMeta {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("buffer pool error: {0}")]
    Buffer(#[from] crate::buffer::BufferError),
    #[error("serialization error: {0}")]
    Io(#[from] IoError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::INDEX_ROOTS_PAGE_ID;
    use crate::disk::DiskManager;
    use std::fs;

    #[test]
    fn test_roundtrip_through_byte_buffer() {
        let mut meta = CatalogMeta::new();
        meta.set_table_meta_page(0, 5);
        meta.set_table_meta_page(1, 9);
        meta.set_index_meta_page(0, 12);

        let mut buf = vec![0u8; meta.get_serialized_size() as usize];
        let written = meta.serialize_to(&mut buf, 0).unwrap();
        assert_eq!(written, meta.get_serialized_size());

        let (decoded, _) = CatalogMeta::deserialize_from(&buf, 0).unwrap();
        assert_eq!(decoded.table_meta_pages(), meta.table_meta_pages());
        assert_eq!(decoded.index_meta_pages(), meta.index_meta_pages());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let buf = vec![0u8; 16];
        assert!(CatalogMeta::deserialize_from(&buf, 0).is_err());
    }

    #[test]
    fn test_flush_and_load_through_buffer_pool() {
        let _ = env_logger::try_init();
        let filename = "CATALOG_TEST_flush.jin";
        let _ = fs::remove_file(filename);
        let bpm = crate::buffer::BufferPoolManager::new(4, DiskManager::new(filename));
        let (roots_page_id, _) = bpm.new_page().unwrap();
        assert_eq!(roots_page_id, INDEX_ROOTS_PAGE_ID);
        bpm.unpin_page(roots_page_id, true).unwrap();

        let (page_id, _) = bpm.new_page().unwrap();
        assert_eq!(page_id, CATALOG_META_PAGE_ID);
        bpm.unpin_page(page_id, true).unwrap();

        let mut meta = CatalogMeta::new();
        meta.set_table_meta_page(3, 7);
        meta.flush(&bpm).unwrap();

        let loaded = CatalogMeta::load(&bpm).unwrap();
        assert_eq!(loaded.table_meta_pages(), meta.table_meta_pages());

        let _ = fs::remove_file(filename);
    }
}
