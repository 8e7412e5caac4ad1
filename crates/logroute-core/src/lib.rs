//! Shared types for log classification: labels, records, and table columns.

pub mod label;
pub mod record;
pub mod schema;

pub use label::{Label, LabelParseError};
pub use record::LogRecord;
pub use schema::columns;
