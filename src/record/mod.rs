/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! Typed record codec: `Schema` and `Column` describe a row's shape; `Row` and `Field` hold and
//! serialize its values. This module knows nothing about pages or the buffer pool — it only
//! turns rows into bytes and back, given a schema to interpret them with.

pub mod column;
pub mod field;
pub mod row;
pub mod schema;

pub use column::{Column, DataType};
pub use field::{Field, Value};
pub use row::Row;
pub use schema::Schema;
