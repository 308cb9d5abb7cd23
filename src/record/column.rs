/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A `Column` describes one field of a `Schema`: its name, type, on-disk width, position, and
//! nullable/unique flags. Serialized form:
//!
//! ```text
//!   | MAGIC (4) | name_len (4) | name (name_len) | type_tag (4) | length (4)
//!   | table_ind (4) | nullable (1) | unique (1) |
//! ```

use crate::common::io::{
    read_bool, read_i32, read_string, read_u32, write_bool, write_i32, write_string, write_u32,
    IoError,
};

pub const COLUMN_MAGIC_NUM: u32 = 0x7A1C_0001;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Float,
    Varchar,
}

impl DataType {
    fn tag(self) -> i32 {
        match self {
            DataType::Integer => 0,
            DataType::Float => 1,
            DataType::Varchar => 2,
        }
    }

    fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(DataType::Integer),
            1 => Some(DataType::Float),
            2 => Some(DataType::Varchar),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    name: String,
    data_type: DataType,
    length: u32,
    table_ind: u32,
    nullable: bool,
    unique: bool,
}

impl Column {
    /// Construct a fixed-width column (`Integer` or `Float`); its length is implied by the type.
    pub fn new(name: &str, data_type: DataType, table_ind: u32, nullable: bool, unique: bool) -> Self {
        let length = match data_type {
            DataType::Integer => 4,
            DataType::Float => 4,
            DataType::Varchar => panic!("Varchar columns must specify a length"),
        };
        Self {
            name: name.to_string(),
            data_type,
            length,
            table_ind,
            nullable,
            unique,
        }
    }

    /// Construct a `Varchar` column with an explicit byte width.
    pub fn new_varchar(
        name: &str,
        length: u32,
        table_ind: u32,
        nullable: bool,
        unique: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            data_type: DataType::Varchar,
            length,
            table_ind,
            nullable,
            unique,
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_data_type(&self) -> DataType {
        self.data_type
    }

    pub fn get_length(&self) -> u32 {
        self.length
    }

    pub fn get_table_ind(&self) -> u32 {
        self.table_ind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn get_serialized_size(&self) -> u32 {
        // MAGIC + name_len + name bytes + type_tag + length + table_ind + nullable + unique
        4 + 4 + self.name.len() as u32 + 4 + 4 + 4 + 1 + 1
    }

    pub fn serialize_to(&self, buf: &mut [u8], offset: u32) -> Result<u32, IoError> {
        let mut cursor = offset;
        write_u32(buf, cursor, COLUMN_MAGIC_NUM)?;
        cursor += 4;

        let name_len = self.name.len() as u32;
        write_u32(buf, cursor, name_len)?;
        cursor += 4;
        write_string(buf, cursor, name_len, &self.name)?;
        cursor += name_len;

        write_i32(buf, cursor, self.data_type.tag())?;
        cursor += 4;
        write_u32(buf, cursor, self.length)?;
        cursor += 4;
        write_u32(buf, cursor, self.table_ind)?;
        cursor += 4;
        write_bool(buf, cursor, self.nullable)?;
        cursor += 1;
        write_bool(buf, cursor, self.unique)?;
        cursor += 1;

        Ok(cursor - offset)
    }

    pub fn deserialize_from(buf: &[u8], offset: u32) -> Result<(Self, u32), IoError> {
        let mut cursor = offset;
        let magic = read_u32(buf, cursor)?;
        if magic != COLUMN_MAGIC_NUM {
            return Err(IoError::Custom(format!(
                "bad column magic number: {:#x}",
                magic
            )));
        }
        cursor += 4;

        let name_len = read_u32(buf, cursor)?;
        cursor += 4;
        let name = read_string(buf, cursor, name_len)?;
        cursor += name_len;

        let type_tag = read_i32(buf, cursor)?;
        let data_type = DataType::from_tag(type_tag)
            .ok_or_else(|| IoError::Custom(format!("unknown column type tag: {}", type_tag)))?;
        cursor += 4;

        let length = read_u32(buf, cursor)?;
        cursor += 4;
        let table_ind = read_u32(buf, cursor)?;
        cursor += 4;
        let nullable = read_bool(buf, cursor)?;
        cursor += 1;
        let unique = read_bool(buf, cursor)?;
        cursor += 1;

        let column = Column {
            name,
            data_type,
            length,
            table_ind,
            nullable,
            unique,
        };
        Ok((column, cursor - offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_fixed_width_column() {
        let column = Column::new("id", DataType::Integer, 0, false, true);
        let mut buf = [0u8; 128];
        let written = column.serialize_to(&mut buf, 0).unwrap();
        assert_eq!(written, column.get_serialized_size());

        let (decoded, read) = Column::deserialize_from(&buf, 0).unwrap();
        assert_eq!(read, written);
        assert_eq!(decoded, column);
    }

    #[test]
    fn test_roundtrip_varchar_column() {
        let column = Column::new_varchar("name", 32, 1, true, false);
        let mut buf = [0u8; 128];
        column.serialize_to(&mut buf, 0).unwrap();
        let (decoded, _) = Column::deserialize_from(&buf, 0).unwrap();
        assert_eq!(decoded, column);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let buf = [0u8; 128];
        assert!(Column::deserialize_from(&buf, 0).is_err());
    }
}
