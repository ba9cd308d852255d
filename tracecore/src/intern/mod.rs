//! String interning
//!
//! [`Dictionary`] hands out stable small ids for names (threads, methods,
//! classes) so that events and traces can refer to them by integer.

pub mod dictionary;

pub use dictionary::{Dictionary, BASE_INDEX, CELLS, ROWS, TABLE_CAPACITY};
