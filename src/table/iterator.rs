/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! Forward-only iterator over every live (non-tombstoned) row in a table heap, in page/slot
//! order. Skips slots that are out of range, empty, or deleted rather than surfacing them.

use crate::buffer::BufferPoolManager;
use crate::common::{PageIdT, RowId, INVALID_PAGE_ID};
use crate::page::table_page::TablePageView;
use crate::record::{Row, Schema};

pub struct TableIterator<'a> {
    buffer_pool: &'a BufferPoolManager,
    schema: &'a Schema,
    page_id: PageIdT,
    slot: u32,
}

impl<'a> TableIterator<'a> {
    pub fn new(buffer_pool: &'a BufferPoolManager, first_page_id: PageIdT, schema: &'a Schema) -> Self {
        Self {
            buffer_pool,
            schema,
            page_id: first_page_id,
            slot: 0,
        }
    }
}

impl<'a> Iterator for TableIterator<'a> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return None;
            }

            let frame_id = self.buffer_pool.fetch_page(self.page_id).ok()?;
            let (tuple_count, next_page_id, tuple_bytes) = {
                let bytes = self.buffer_pool.read_frame(frame_id);
                let mut local = *bytes;
                let view = TablePageView::new(&mut local);
                (view.tuple_count(), view.next_page_id(), view.get_tuple(self.slot))
            };
            self.buffer_pool.unpin_page(self.page_id, false).ok()?;

            if self.slot >= tuple_count {
                self.page_id = next_page_id;
                self.slot = 0;
                continue;
            }

            let current_slot = self.slot;
            self.slot += 1;

            if let Some(data) = tuple_bytes {
                let (mut row, _) = Row::deserialize_from(&data, 0, self.schema).ok()?;
                row.set_row_id(RowId::new(self.page_id, current_slot));
                return Some(row);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskManager;
    use crate::record::column::DataType;
    use crate::record::field::Value;
    use crate::record::{Column, Field};
    use crate::table::TableHeap;
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
        let filename = format!("ITER_TEST_{}.jin", test_id);
        let _ = fs::remove_file(&filename);
        TestContext {
            bpm: BufferPoolManager::new(8, DiskManager::new(&filename)),
            filename,
        }
    }

    fn schema() -> Schema {
        Schema::new(
            vec![Column::new("id", DataType::Integer, 0, false, true)],
            true,
        )
    }

    #[test]
    fn test_iterates_all_live_rows_and_skips_deleted() {
        let ctx = setup("iterate");
        let heap = TableHeap::new(&ctx.bpm, schema()).unwrap();

        let mut rids = Vec::new();
        for i in 0..10 {
            let mut row = Row::new(vec![Field::new(Value::Integer(i))]);
            rids.push(heap.insert_tuple(&mut row).unwrap());
        }
        heap.mark_delete(rids[3]).unwrap();

        let values: Vec<i32> = heap
            .iter()
            .map(|row| match row.get_field(0).unwrap().get_value() {
                Some(Value::Integer(v)) => *v,
                _ => panic!("expected integer"),
            })
            .collect();

        assert_eq!(values.len(), 9);
        assert!(!values.contains(&3));
    }
}
