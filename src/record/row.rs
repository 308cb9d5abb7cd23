/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A `Row` is a sequence of `Field`s, one per column of its schema, plus the `RowId` it was
//! located at on disk (if any — a freshly constructed row destined for insertion has none yet).
//! Serialized form: `| field_count (4) | null_bitmap (ceil(field_count/8)) | fields... |`, where
//! bit `i` of the null bitmap records whether field `i` is null. A null field contributes zero
//! bytes to the trailing field stream; a present field's width comes from its schema column.

use crate::common::bitmap::{get_bit, set_bit};
use crate::common::io::{read_u32, write_u32, IoError};
use crate::common::RowId;
use crate::record::field::Field;
use crate::record::schema::Schema;

/// Bytes needed to hold one bit per field.
fn null_bitmap_size(field_count: usize) -> u32 {
    ((field_count + 7) / 8) as u32
}

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    fields: Vec<Field>,
    row_id: Option<RowId>,
}

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            row_id: None,
        }
    }

    pub fn with_row_id(fields: Vec<Field>, row_id: RowId) -> Self {
        Self {
            fields,
            row_id: Some(row_id),
        }
    }

    pub fn get_fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get_field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn get_row_id(&self) -> Option<RowId> {
        self.row_id
    }

    pub fn set_row_id(&mut self, row_id: RowId) {
        self.row_id = Some(row_id);
    }

    /// Project this row's fields down to `key_schema`'s columns, by name, against `schema`.
    pub fn get_key_from_row(&self, schema: &Schema, key_schema: &Schema) -> Row {
        let fields = key_schema
            .get_columns()
            .iter()
            .map(|key_column| {
                let idx = schema
                    .get_column_index(key_column.get_name())
                    .expect("key column must exist in the row's schema");
                self.fields[idx as usize].clone()
            })
            .collect();
        Row::new(fields)
    }

    pub fn get_serialized_size(&self, schema: &Schema) -> u32 {
        let fields_size: u32 = self
            .fields
            .iter()
            .zip(schema.get_columns())
            .map(|(field, column)| field.serialized_size(column))
            .sum();
        4 + null_bitmap_size(self.fields.len()) + fields_size
    }

    pub fn serialize_to(&self, buf: &mut [u8], offset: u32, schema: &Schema) -> Result<u32, IoError> {
        assert_eq!(
            self.fields.len(),
            schema.get_columns().len(),
            "row field count must match schema column count"
        );
        let mut cursor = offset;
        write_u32(buf, cursor, self.fields.len() as u32)?;
        cursor += 4;

        let bitmap_size = null_bitmap_size(self.fields.len());
        let bitmap_start = cursor as usize;
        let bitmap_end = bitmap_start + bitmap_size as usize;
        if bitmap_end > buf.len() {
            return Err(IoError::Overflow);
        }
        buf[bitmap_start..bitmap_end].fill(0);
        for (i, field) in self.fields.iter().enumerate() {
            if field.is_null() {
                set_bit(&mut buf[bitmap_start..bitmap_end], i as u32)
                    .map_err(|e| IoError::Custom(e.to_string()))?;
            }
        }
        cursor += bitmap_size;

        for (field, column) in self.fields.iter().zip(schema.get_columns()) {
            cursor += field.serialize_to(buf, cursor, column)?;
        }
        Ok(cursor - offset)
    }

    pub fn deserialize_from(buf: &[u8], offset: u32, schema: &Schema) -> Result<(Self, u32), IoError> {
        let mut cursor = offset;
        let field_count = read_u32(buf, cursor)?;
        cursor += 4;

        let bitmap_size = null_bitmap_size(field_count as usize);
        let bitmap_start = cursor as usize;
        let bitmap_end = bitmap_start + bitmap_size as usize;
        if bitmap_end > buf.len() {
            return Err(IoError::Overflow);
        }
        let bitmap = &buf[bitmap_start..bitmap_end];
        cursor += bitmap_size;

        let mut fields = Vec::with_capacity(field_count as usize);
        for (i, column) in schema.get_columns().iter().take(field_count as usize).enumerate() {
            let is_null = get_bit(bitmap, i as u32).map_err(|e| IoError::Custom(e.to_string()))?;
            let (field, size) = Field::deserialize_from(buf, cursor, column, is_null)?;
            fields.push(field);
            cursor += size;
        }

        Ok((Row::new(fields), cursor - offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::column::{Column, DataType};
    use crate::record::field::Value;

    fn sample_schema() -> Schema {
        Schema::new(
            vec![
                Column::new("id", DataType::Integer, 0, false, true),
                Column::new_varchar("name", 16, 1, true, false),
            ],
            true,
        )
    }

    #[test]
    fn test_roundtrip() {
        let schema = sample_schema();
        let row = Row::new(vec![
            Field::new(Value::Integer(7)),
            Field::new(Value::Varchar("abc".to_string())),
        ]);
        let mut buf = vec![0u8; 512];
        let written = row.serialize_to(&mut buf, 0, &schema).unwrap();
        assert_eq!(written, row.get_serialized_size(&schema));

        let (decoded, read) = Row::deserialize_from(&buf, 0, &schema).unwrap();
        assert_eq!(read, written);
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_null_field_elided_from_wire_size() {
        let schema = sample_schema();
        let with_value = Row::new(vec![
            Field::new(Value::Integer(7)),
            Field::new(Value::Varchar("abcdefghijklmnop".to_string())),
        ]);
        let with_null = Row::new(vec![Field::new(Value::Integer(7)), Field::null()]);

        // The varchar column reserves 16 bytes; eliding a null field's body must save exactly
        // that much relative to a row that actually populates it.
        assert_eq!(
            with_value.get_serialized_size(&schema) - with_null.get_serialized_size(&schema),
            16
        );

        let mut buf = vec![0u8; 512];
        let written = with_null.serialize_to(&mut buf, 0, &schema).unwrap();
        assert_eq!(written, with_null.get_serialized_size(&schema));

        let (decoded, read) = Row::deserialize_from(&buf, 0, &schema).unwrap();
        assert_eq!(read, written);
        assert_eq!(decoded, with_null);
        assert!(decoded.get_field(1).unwrap().is_null());
    }

    #[test]
    fn test_get_key_from_row() {
        let schema = sample_schema();
        let key_schema = Schema::new(
            vec![Column::new("id", DataType::Integer, 0, false, true)],
            false,
        );
        let row = Row::new(vec![
            Field::new(Value::Integer(7)),
            Field::new(Value::Varchar("abc".to_string())),
        ]);
        let key_row = row.get_key_from_row(&schema, &key_schema);
        assert_eq!(key_row.get_fields().len(), 1);
        assert_eq!(
            key_row.get_field(0).unwrap().get_value(),
            Some(&Value::Integer(7))
        );
    }
}
