/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! A `GenericKey` is a fixed-width byte string used as a B+-tree key. Ordering is plain
//! byte-wise comparison, so callers must encode values into an order-preserving form: signed
//! integers go through `common::io::write_ordered_i32`, and fixed-width strings are naturally
//! ordered by their own bytes.

use crate::common::io::{read_ordered_i32, write_ordered_i32};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct GenericKey {
    bytes: Vec<u8>,
}

impl GenericKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Build a key of `key_size` bytes around a single order-preserving-encoded `i32`, zero
    /// padded past the first 4 bytes.
    pub fn from_i32(value: i32, key_size: u32) -> Self {
        let mut bytes = vec![0u8; key_size as usize];
        write_ordered_i32(&mut bytes, 0, value).expect("key_size must be at least 4 bytes");
        Self { bytes }
    }

    pub fn to_i32(&self) -> Option<i32> {
        read_ordered_i32(&self.bytes, 0).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn key_size(&self) -> u32 {
        self.bytes.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_roundtrip_and_order() {
        let a = GenericKey::from_i32(-5, 4);
        let b = GenericKey::from_i32(5, 4);
        assert_eq!(a.to_i32(), Some(-5));
        assert_eq!(b.to_i32(), Some(5));
        assert!(a < b);
    }
}
