//! Data structures for cell frequency analysis.

mod cell_type;
mod overview_row;
mod row_set;
mod sample;
mod value;

pub use cell_type::CellType;
pub use overview_row::OverviewRow;
pub use row_set::{Row, RowSet};
pub use sample::Sample;
pub use value::Value;
