/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

//! Runtime-configurable surface of this core: a database file path and a buffer pool size. An
//! embedder (the excluded command shell/catalog manager) constructs a `Config` directly; this
//! crate does no file-format or environment-variable parsing of its own.

use crate::common::{BUFFER_POOL_SIZE, DB_FILENAME};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub db_filename: String,
    pub buffer_pool_size: usize,
}

impl Config {
    pub fn new(db_filename: impl Into<String>, buffer_pool_size: usize) -> Self {
        Self {
            db_filename: db_filename.into(),
            buffer_pool_size,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_filename: DB_FILENAME.to_string(),
            buffer_pool_size: BUFFER_POOL_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_constants() {
        let config = Config::default();
        assert_eq!(config.db_filename, DB_FILENAME);
        assert_eq!(config.buffer_pool_size, BUFFER_POOL_SIZE);
    }

    #[test]
    fn test_new_overrides_defaults() {
        let config = Config::new("custom.jin", 128);
        assert_eq!(config.db_filename, "custom.jin");
        assert_eq!(config.buffer_pool_size, 128);
    }
}
