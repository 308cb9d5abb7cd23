/*
 * Copyright (c) 2020 - 2021.  Shoyo Inokuchi.
 * Please refer to github.com/shoyo/jin for more information about this project and its license.
 */

pub mod bitmap;
pub mod constants;
pub mod io;
pub mod row_id;

pub use constants::*;
pub use row_id::{RowId, SlotIdT};
