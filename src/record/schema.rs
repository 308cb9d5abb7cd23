/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A `Schema` is an ordered list of columns used to interpret a row's bytes. Serialized form:
//!
//! ```text
//!   | MAGIC (4) | column_count (4) | columns... | is_managed (1) |
//! ```

use crate::common::io::{read_bool, read_u32, write_bool, write_u32, IoError};
use crate::record::column::Column;

pub const SCHEMA_MAGIC_NUM: u32 = 0x7A1C_0002;

#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
    /// Whether this schema is the table's own managed schema, as opposed to a derived schema
    /// (e.g. an index key schema) that projects a subset of the table's columns.
    is_managed: bool,
}

impl Schema {
    pub fn new(columns: Vec<Column>, is_managed: bool) -> Self {
        Self {
            columns,
            is_managed,
        }
    }

    pub fn get_columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get_column_count(&self) -> u32 {
        self.columns.len() as u32
    }

    pub fn is_managed(&self) -> bool {
        self.is_managed
    }

    pub fn get_column_index(&self, name: &str) -> Option<u32> {
        self.columns
            .iter()
            .position(|c| c.get_name() == name)
            .map(|i| i as u32)
    }

    pub fn get_serialized_size(&self) -> u32 {
        let columns_size: u32 = self.columns.iter().map(Column::get_serialized_size).sum();
        4 + 4 + columns_size + 1
    }

    pub fn serialize_to(&self, buf: &mut [u8], offset: u32) -> Result<u32, IoError> {
        let mut cursor = offset;
        write_u32(buf, cursor, SCHEMA_MAGIC_NUM)?;
        cursor += 4;
        write_u32(buf, cursor, self.get_column_count())?;
        cursor += 4;
        for column in &self.columns {
            cursor += column.serialize_to(buf, cursor)?;
        }
        write_bool(buf, cursor, self.is_managed)?;
        cursor += 1;
        Ok(cursor - offset)
    }

    pub fn deserialize_from(buf: &[u8], offset: u32) -> Result<(Self, u32), IoError> {
        let mut cursor = offset;
        let magic = read_u32(buf, cursor)?;
        if magic != SCHEMA_MAGIC_NUM {
            return Err(IoError::Custom(format!(
                "bad schema magic number: {:#x}",
                magic
            )));
        }
        cursor += 4;

        let column_count = read_u32(buf, cursor)?;
        cursor += 4;

        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let (column, size) = Column::deserialize_from(buf, cursor)?;
            columns.push(column);
            cursor += size;
        }

        let is_managed = read_bool(buf, cursor)?;
        cursor += 1;

        Ok((Schema { columns, is_managed }, cursor - offset))
    }
}
