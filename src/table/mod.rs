/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A table heap is a logical table: a singly-linked list of slotted table pages, the first of
//! which is `first_page_id`. Rows are identified by their `RowId` for as long as they live; an
//! update that doesn't fit in place changes a row's `RowId` (delete-then-reinsert).

pub mod heap;
pub mod iterator;

pub use heap::{HeapError, TableHeap};
pub use iterator::TableIterator;
