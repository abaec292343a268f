pub mod table;

pub use table::{TableBuilder, layout_table, records_table};
