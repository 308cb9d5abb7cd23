/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

use crate::buffer::BufferPoolManager;
use crate::common::io::IoError;
use crate::common::{PageIdT, RowId, INVALID_PAGE_ID};
use crate::page::table_page::{TablePageView, UpdateOutcome, SIZE_MAX_ROW};
use crate::record::{Row, Schema};
use crate::table::iterator::TableIterator;
use log::debug;

pub struct TableHeap<'a> {
    buffer_pool: &'a BufferPoolManager,
    first_page_id: PageIdT,
    schema: Schema,
}

impl<'a> TableHeap<'a> {
    /// Create a brand-new, empty table heap backed by one freshly allocated page.
    pub fn new(buffer_pool: &'a BufferPoolManager, schema: Schema) -> Result<Self, HeapError> {
        let (page_id, frame_id) = buffer_pool.new_page()?;
        {
            let mut bytes = buffer_pool.write_frame(frame_id);
            TablePageView::new(&mut bytes).init(page_id, INVALID_PAGE_ID);
        }
        buffer_pool.unpin_page(page_id, true)?;
        Ok(Self {
            buffer_pool,
            first_page_id: page_id,
            schema,
        })
    }

    /// Reopen a table heap whose first page is already on disk.
    pub fn from_existing(buffer_pool: &'a BufferPoolManager, schema: Schema, first_page_id: PageIdT) -> Self {
        Self {
            buffer_pool,
            first_page_id,
            schema,
        }
    }

    pub fn first_page_id(&self) -> PageIdT {
        self.first_page_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Append `row` to the heap, scanning forward for a page with room and appending a new page
    /// if none is found. On success, fills in `row`'s `RowId`.
    pub fn insert_tuple(&self, row: &mut Row) -> Result<RowId, HeapError> {
        let size = row.get_serialized_size(&self.schema);
        if size > SIZE_MAX_ROW {
            return Err(HeapError::RowTooLarge(size));
        }
        let mut data = vec![0u8; size as usize];
        row.serialize_to(&mut data, 0, &self.schema)?;

        let mut page_id = self.first_page_id;
        loop {
            let frame_id = self.buffer_pool.fetch_page(page_id)?;
            let slot = {
                let mut bytes = self.buffer_pool.write_frame(frame_id);
                TablePageView::new(&mut bytes).insert_tuple(&data)
            };

            if let Some(slot) = slot {
                self.buffer_pool.unpin_page(page_id, true)?;
                let rid = RowId::new(page_id, slot);
                row.set_row_id(rid);
                return Ok(rid);
            }

            let next_page_id = {
                let mut bytes = self.buffer_pool.write_frame(frame_id);
                TablePageView::new(&mut bytes).next_page_id()
            };

            if next_page_id != INVALID_PAGE_ID {
                self.buffer_pool.unpin_page(page_id, false)?;
                page_id = next_page_id;
                continue;
            }

            debug!("table page {} is full, allocating a new page", page_id);
            let (new_page_id, new_frame_id) = self.buffer_pool.new_page()?;
            {
                let mut bytes = self.buffer_pool.write_frame(new_frame_id);
                TablePageView::new(&mut bytes).init(new_page_id, page_id);
            }
            {
                let mut bytes = self.buffer_pool.write_frame(frame_id);
                TablePageView::new(&mut bytes).set_next_page_id(new_page_id);
            }
            self.buffer_pool.unpin_page(page_id, true)?;
            page_id = new_page_id;
        }
    }

    /// Read the row at `rid`.
    pub fn get_tuple(&self, rid: RowId) -> Result<Row, HeapError> {
        let frame_id = self.buffer_pool.fetch_page(rid.page_id())?;
        let data = {
            let bytes = self.buffer_pool.read_frame(frame_id);
            let mut local = *bytes;
            TablePageView::new(&mut local).get_tuple(rid.slot_num())
        };
        self.buffer_pool.unpin_page(rid.page_id(), false)?;

        let data = data.ok_or(HeapError::SlotOutOfRange)?;
        let (mut row, _) = Row::deserialize_from(&data, 0, &self.schema)?;
        row.set_row_id(rid);
        Ok(row)
    }

    /// Mark a row deleted without reclaiming its space yet.
    pub fn mark_delete(&self, rid: RowId) -> Result<(), HeapError> {
        let frame_id = self.buffer_pool.fetch_page(rid.page_id())?;
        let marked = {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            TablePageView::new(&mut bytes).mark_delete(rid.slot_num())
        };
        self.buffer_pool.unpin_page(rid.page_id(), true)?;
        if !marked {
            return Err(HeapError::SlotOutOfRange);
        }
        Ok(())
    }

    /// Undo a prior `mark_delete`.
    pub fn rollback_delete(&self, rid: RowId) -> Result<(), HeapError> {
        let frame_id = self.buffer_pool.fetch_page(rid.page_id())?;
        let rolled_back = {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            TablePageView::new(&mut bytes).rollback_delete(rid.slot_num())
        };
        self.buffer_pool.unpin_page(rid.page_id(), true)?;
        if !rolled_back {
            return Err(HeapError::SlotOutOfRange);
        }
        Ok(())
    }

    /// Finalize a mark-deleted row. The slot's byte region is not reclaimed.
    pub fn apply_delete(&self, rid: RowId) -> Result<(), HeapError> {
        let frame_id = self.buffer_pool.fetch_page(rid.page_id())?;
        {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            TablePageView::new(&mut bytes).apply_delete(rid.slot_num());
        }
        self.buffer_pool.unpin_page(rid.page_id(), true)?;
        Ok(())
    }

    /// Update the row at `rid` with `row`'s contents. Returns the row's resulting `RowId`, which
    /// differs from `rid` if the new value did not fit in place and had to be reinserted.
    pub fn update_tuple(&self, row: &Row, rid: RowId) -> Result<RowId, HeapError> {
        let size = row.get_serialized_size(&self.schema);
        if size > SIZE_MAX_ROW {
            return Err(HeapError::RowTooLarge(size));
        }
        let mut data = vec![0u8; size as usize];
        row.serialize_to(&mut data, 0, &self.schema)?;

        let frame_id = self.buffer_pool.fetch_page(rid.page_id())?;
        let outcome = {
            let mut bytes = self.buffer_pool.write_frame(frame_id);
            TablePageView::new(&mut bytes).update_tuple(rid.slot_num(), &data)
        };

        match outcome {
            UpdateOutcome::Updated => {
                self.buffer_pool.unpin_page(rid.page_id(), true)?;
                Ok(rid)
            }
            UpdateOutcome::SlotOutOfRange => {
                self.buffer_pool.unpin_page(rid.page_id(), false)?;
                Err(HeapError::SlotOutOfRange)
            }
            UpdateOutcome::Tombstoned => {
                self.buffer_pool.unpin_page(rid.page_id(), false)?;
                Err(HeapError::Tombstoned)
            }
            UpdateOutcome::NoSpace => {
                {
                    let mut bytes = self.buffer_pool.write_frame(frame_id);
                    TablePageView::new(&mut bytes).mark_delete(rid.slot_num());
                    TablePageView::new(&mut bytes).apply_delete(rid.slot_num());
                }
                self.buffer_pool.unpin_page(rid.page_id(), true)?;
                let mut row = row.clone();
                self.insert_tuple(&mut row)
            }
        }
    }

    /// Deallocate every page in this heap's chain.
    pub fn delete_table(&self) -> Result<(), HeapError> {
        let mut page_id = self.first_page_id;
        while page_id != INVALID_PAGE_ID {
            let frame_id = self.buffer_pool.fetch_page(page_id)?;
            let next_page_id = {
                let bytes = self.buffer_pool.read_frame(frame_id);
                let mut local = *bytes;
                TablePageView::new(&mut local).next_page_id()
            };
            self.buffer_pool.unpin_page(page_id, false)?;
            self.buffer_pool.delete_page(page_id)?;
            page_id = next_page_id;
        }
        Ok(())
    }

    pub fn iter(&'a self) -> TableIterator<'a> {
        TableIterator::new(self.buffer_pool, self.first_page_id, &self.schema)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HeapError {
    #[error("row of {0} bytes exceeds the maximum row size")]
    RowTooLarge(u32),
    #[error("slot is out of range or was never allocated")]
    SlotOutOfRange,
    #[error("row has been deleted")]
    Tombstoned,
    #[error("buffer pool error: {0}")]
    Buffer(#[from] crate::buffer::BufferError),
    #[error("codec error: {0}")]
    Io(#[from] IoError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskManager;
    use crate::record::column::DataType;
    use crate::record::field::Value;
    use crate::record::{Column, Field};
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
        let filename = format!("HEAP_TEST_{}.jin", test_id);
        let _ = fs::remove_file(&filename);
        TestContext {
            bpm: BufferPoolManager::new(8, DiskManager::new(&filename)),
            filename,
        }
    }

    fn schema() -> Schema {
        Schema::new(
            vec![
                Column::new("id", DataType::Integer, 0, false, true),
                Column::new_varchar("name", 16, 1, true, false),
            ],
            true,
        )
    }

    fn row(id: i32, name: &str) -> Row {
        Row::new(vec![
            Field::new(Value::Integer(id)),
            Field::new(Value::Varchar(name.to_string())),
        ])
    }

    #[test]
    fn test_insert_and_get() {
        let ctx = setup("insert_get");
        let heap = TableHeap::new(&ctx.bpm, schema()).unwrap();

        let mut r = row(1, "alice");
        let rid = heap.insert_tuple(&mut r).unwrap();
        let fetched = heap.get_tuple(rid).unwrap();
        assert_eq!(fetched.get_fields(), r.get_fields());
    }

    #[test]
    fn test_mark_apply_delete() {
        let ctx = setup("delete");
        let heap = TableHeap::new(&ctx.bpm, schema()).unwrap();
        let mut r = row(1, "bob");
        let rid = heap.insert_tuple(&mut r).unwrap();

        heap.mark_delete(rid).unwrap();
        assert!(matches!(
            heap.get_tuple(rid),
            Err(HeapError::SlotOutOfRange)
        ));

        heap.rollback_delete(rid).unwrap();
        assert!(heap.get_tuple(rid).is_ok());

        heap.mark_delete(rid).unwrap();
        heap.apply_delete(rid).unwrap();
    }

    #[test]
    fn test_update_in_place_and_with_move() {
        let ctx = setup("update");
        let heap = TableHeap::new(&ctx.bpm, schema()).unwrap();
        let mut r = row(1, "short");
        let rid = heap.insert_tuple(&mut r).unwrap();

        let updated_small = row(1, "shrt");
        let new_rid = heap.update_tuple(&updated_small, rid).unwrap();
        assert_eq!(new_rid, rid);

        let updated_big = row(1, "a much longer replacement value than fits");
        let moved_rid = heap.update_tuple(&updated_big, rid);
        // Either it fits (varchar is capped at the column width, so this errors as too large)
        // or it moves; both are acceptable outcomes to exercise here.
        let _ = moved_rid;
    }

    #[test]
    fn test_insert_spills_to_new_page() {
        let ctx = setup("spill");
        let heap = TableHeap::new(&ctx.bpm, schema()).unwrap();
        let first_page = heap.first_page_id();

        let mut last_rid = RowId::invalid();
        for i in 0..2000 {
            let mut r = row(i, "xxxxxxxxxxxxxxx");
            last_rid = heap.insert_tuple(&mut r).unwrap();
        }
        assert_ne!(last_rid.page_id(), first_page);
    }
}
