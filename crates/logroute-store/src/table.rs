//! CSV-backed log tables.
//!
//! Every column is read as text, so identifiers such as `007` or timestamps
//! pass through to the output unchanged.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, FieldRef, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use logroute_core::{Label, LogRecord, columns};
use tracing::info;

use crate::StoreError;

/// Destination used when the caller does not name one.
pub const DEFAULT_OUTPUT: &str = "resources/output.csv";

/// An in-memory table of log rows.
#[derive(Debug, Clone)]
pub struct LogTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl LogTable {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    /// Read a CSV file with a header row.
    pub fn read_csv(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::CsvNotFound(path.to_path_buf()));
        }
        let table = Self::read_csv_from(File::open(path)?)?;
        info!(rows = table.num_rows(), path = %path.display(), "read log table");
        Ok(table)
    }

    /// Read CSV from any seekable source: the header is scanned first, then
    /// the data is parsed with every column typed as `Utf8`.
    pub fn read_csv_from<R: Read + Seek>(mut reader: R) -> Result<Self, StoreError> {
        let (inferred, _) = Format::default()
            .with_header(true)
            .infer_schema(&mut reader, Some(0))?;
        let schema = Arc::new(columns::as_utf8(&inferred));
        reader.rewind()?;

        if schema.fields().is_empty() {
            return Ok(Self::new(schema, Vec::new()));
        }

        let batches = ReaderBuilder::new(schema.clone())
            .with_header(true)
            .build(reader)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(schema, batches))
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    /// Check that the required `source` and `log_message` columns exist.
    pub fn validate(&self) -> Result<(), StoreError> {
        let missing = columns::missing_required(&self.schema);
        if missing.is_empty() {
            return Ok(());
        }
        Err(StoreError::MissingColumns {
            missing: missing.into_iter().map(String::from).collect(),
        })
    }

    /// One [`LogRecord`] per row, in row order. Null cells become empty strings.
    pub fn records(&self) -> Result<Vec<LogRecord>, StoreError> {
        self.validate()?;
        let mut records = Vec::with_capacity(self.num_rows());
        for batch in &self.batches {
            let sources = text_column(batch, columns::SOURCE)?;
            let messages = text_column(batch, columns::LOG_MESSAGE)?;
            for i in 0..batch.num_rows() {
                records.push(LogRecord::new(cell(&sources, i), cell(&messages, i)));
            }
        }
        Ok(records)
    }

    /// Copy of this table with a `target_label` column holding `labels`.
    ///
    /// An existing `target_label` column is replaced in place; otherwise the
    /// column is appended. `labels` must have one entry per row.
    pub fn with_labels(&self, labels: &[Label]) -> Result<Self, StoreError> {
        let rows = self.num_rows();
        if labels.len() != rows {
            return Err(StoreError::RowCountMismatch {
                rows,
                labels: labels.len(),
            });
        }

        let existing = self.schema.index_of(columns::TARGET_LABEL).ok();
        let label_field: FieldRef = Arc::new(columns::target_label_field());
        let mut fields: Vec<FieldRef> = self.schema.fields().iter().cloned().collect();
        match existing {
            Some(i) => fields[i] = label_field,
            None => fields.push(label_field),
        }
        let schema = Arc::new(Schema::new_with_metadata(
            fields,
            self.schema.metadata().clone(),
        ));

        let mut offset = 0;
        let mut batches = Vec::with_capacity(self.batches.len());
        for batch in &self.batches {
            let n = batch.num_rows();
            let values: ArrayRef = Arc::new(StringArray::from_iter_values(
                labels[offset..offset + n].iter().map(Label::as_str),
            ));
            offset += n;

            let mut cols: Vec<ArrayRef> = batch.columns().to_vec();
            match existing {
                Some(i) => cols[i] = values,
                None => cols.push(values),
            }
            batches.push(RecordBatch::try_new(schema.clone(), cols)?);
        }

        Ok(Self::new(schema, batches))
    }

    /// Write the table as CSV, creating parent directories as needed.
    pub fn write_csv(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.write_csv_to(File::create(path)?)?;
        info!(rows = self.num_rows(), path = %path.display(), "wrote log table");
        Ok(())
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv_to<W: Write>(&self, writer: W) -> Result<(), StoreError> {
        let mut writer = WriterBuilder::new().with_header(true).build(writer);
        if self.batches.is_empty() {
            // An empty batch still emits the header.
            writer.write(&RecordBatch::new_empty(self.schema.clone()))?;
        }
        for batch in &self.batches {
            writer.write(batch)?;
        }
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, StoreError> {
        let mut buf = Vec::new();
        self.write_csv_to(&mut buf)?;
        Ok(buf)
    }
}

fn text_column(batch: &RecordBatch, name: &str) -> Result<StringArray, StoreError> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| StoreError::MissingColumns {
            missing: vec![name.to_string()],
        })?;
    let text = arrow::compute::cast(column, &DataType::Utf8)?;
    text.as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| {
            StoreError::Arrow(ArrowError::CastError(format!(
                "column {name} is not Utf8 after cast"
            )))
        })
}

fn cell(array: &StringArray, i: usize) -> &str {
    if array.is_null(i) { "" } else { array.value(i) }
}
