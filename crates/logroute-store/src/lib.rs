//! Storage layer: CSV log tables in and labeled CSV out, held as Arrow batches.

mod error;
pub use error::StoreError;

mod table;
pub use table::{DEFAULT_OUTPUT, LogTable};
