//! Cell types: addresses, ranges, values, and storage

mod address;
mod storage;
mod value;

pub use address::{CellAddress, CellRange, CellRangeIter};
pub use storage::{CellData, CellStorage};
pub use value::{CellError, CellValue, SharedString};
