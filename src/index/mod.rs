/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A disk-resident B+-tree index over a fixed-width [`GenericKey`], keyed by the index's numeric
//! id and rooted through the shared index-roots directory page. Concurrent operations are not
//! supported: [`BPlusTree`] mutates its cached root page id through a `Cell`, which makes it
//! `!Sync` by design.

pub mod btree;
pub mod generic_key;
pub mod iterator;

pub use btree::{BPlusTree, IndexError};
pub use generic_key::GenericKey;
pub use iterator::IndexIterator;
