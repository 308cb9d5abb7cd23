/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A `Field` holds one column's value for one row, or nothing if the column is null for that
//! row. Whether a field is null is recorded once per row in `Row`'s null bitmap, not here; a
//! null field's bytes are elided entirely, so a `Field` serializes to either `column.get_length()`
//! bytes or zero, depending on that bit. The field itself carries no type tag — width and
//! interpretation come entirely from the owning `Column`.

use crate::common::io::{read_f32, read_i32, read_string, write_f32, write_i32, write_string, IoError};
use crate::record::column::{Column, DataType};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Integer(i32),
    Float(f32),
    Varchar(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    value: Option<Value>,
}

impl Field {
    pub fn new(value: Value) -> Self {
        Self { value: Some(value) }
    }

    pub fn null() -> Self {
        Self { value: None }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn get_value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Bytes this field occupies on the wire: nothing if null, `column.get_length()` otherwise.
    pub fn serialized_size(&self, column: &Column) -> u32 {
        if self.is_null() {
            0
        } else {
            column.get_length()
        }
    }

    /// Write this field's value bytes, if any. Writes nothing for a null field; the caller is
    /// responsible for recording nullness in the row's null bitmap.
    pub fn serialize_to(&self, buf: &mut [u8], offset: u32, column: &Column) -> Result<u32, IoError> {
        let value = match &self.value {
            Some(value) => value,
            None => return Ok(0),
        };
        match (column.get_data_type(), value) {
            (DataType::Integer, Value::Integer(v)) => write_i32(buf, offset, *v)?,
            (DataType::Float, Value::Float(v)) => write_f32(buf, offset, *v)?,
            (DataType::Varchar, Value::Varchar(s)) => {
                write_string(buf, offset, column.get_length(), s)?
            }
            _ => {
                return Err(IoError::Custom(
                    "field value does not match column type".to_string(),
                ))
            }
        }
        Ok(column.get_length())
    }

    /// Read a field's value bytes. `is_null` comes from the row's null bitmap; when set, no bytes
    /// are consumed and `Field::null()` is returned.
    pub fn deserialize_from(
        buf: &[u8],
        offset: u32,
        column: &Column,
        is_null: bool,
    ) -> Result<(Self, u32), IoError> {
        if is_null {
            return Ok((Field::null(), 0));
        }
        let value = match column.get_data_type() {
            DataType::Integer => Value::Integer(read_i32(buf, offset)?),
            DataType::Float => Value::Float(read_f32(buf, offset)?),
            DataType::Varchar => Value::Varchar(read_string(buf, offset, column.get_length())?),
        };
        Ok((Field::new(value), column.get_length()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_integer() {
        let column = Column::new("id", DataType::Integer, 0, false, false);
        let field = Field::new(Value::Integer(42));
        let mut buf = [0u8; 32];
        field.serialize_to(&mut buf, 0, &column).unwrap();
        let (decoded, _) = Field::deserialize_from(&buf, 0, &column, false).unwrap();
        assert_eq!(decoded, field);
    }

    #[test]
    fn test_roundtrip_null() {
        let column = Column::new("id", DataType::Integer, 0, true, false);
        let field = Field::null();
        let mut buf = [0u8; 32];
        let written = field.serialize_to(&mut buf, 0, &column).unwrap();
        assert_eq!(written, 0);
        let (decoded, read) = Field::deserialize_from(&buf, 0, &column, true).unwrap();
        assert_eq!(read, 0);
        assert!(decoded.is_null());
    }

    #[test]
    fn test_roundtrip_varchar() {
        let column = Column::new_varchar("name", 16, 0, false, false);
        let field = Field::new(Value::Varchar("hello".to_string()));
        let mut buf = [0u8; 32];
        field.serialize_to(&mut buf, 0, &column).unwrap();
        let (decoded, _) = Field::deserialize_from(&buf, 0, &column, false).unwrap();
        assert_eq!(decoded, field);
    }
}
