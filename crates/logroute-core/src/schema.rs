/// Column names and Arrow schema helpers for log tables.
pub mod columns {
    use arrow::datatypes::{DataType, Field, Schema};

    /// Upstream system identifier.
    pub const SOURCE: &str = "source";
    /// Raw log line text.
    pub const LOG_MESSAGE: &str = "log_message";
    /// Appended classification result.
    pub const TARGET_LABEL: &str = "target_label";

    /// Columns that must be present before any row is classified.
    pub const REQUIRED: &[&str] = &[SOURCE, LOG_MESSAGE];

    /// Field definition for the appended label column.
    pub fn target_label_field() -> Field {
        Field::new(TARGET_LABEL, DataType::Utf8, false)
    }

    /// Required columns absent from `schema`, in [`REQUIRED`] order.
    pub fn missing_required(schema: &Schema) -> Vec<&'static str> {
        REQUIRED
            .iter()
            .copied()
            .filter(|name| schema.field_with_name(name).is_err())
            .collect()
    }

    /// Rebuild every field of `schema` as nullable `Utf8`, keeping names and order.
    pub fn as_utf8(schema: &Schema) -> Schema {
        Schema::new(
            schema
                .fields()
                .iter()
                .map(|f| Field::new(f.name(), DataType::Utf8, true))
                .collect::<Vec<_>>(),
        )
    }
}
