//! Arrow record batch construction and IPC serialization.
//!
//! Concrete builders construct each column directly from source rows in
//! one pass — no intermediate per-row value boxing — and serialize
//! batches and schemas as self-contained Arrow IPC stream buffers.

use std::io::Cursor;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanBuilder, Date32Builder, Float64Builder, Int64Builder, StringBuilder,
    TimestampNanosecondBuilder,
};
use arrow::datatypes::DataType;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use arrow_schema::Schema;
use tracing::warn;

use crate::types::{coerce, LogicalType, Scalar, TypeOptions};

/// Options controlling batch construction.
#[derive(Debug, Clone)]
pub struct BuilderOptions {
    /// Target row count per record batch (informational; the caller
    /// decides how rows are chunked before calling [`build_record_batch`]).
    pub record_batch_size: usize,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            record_batch_size: 65_536,
        }
    }
}

/// Builds a single Arrow array for one column directly from that
/// column's raw string values, without going through a per-row
/// intermediate representation.
fn build_column(
    data_type: &DataType,
    logical: LogicalType,
    values: &[Option<String>],
    opts: &TypeOptions,
) -> Option<ArrayRef> {
    match data_type {
        DataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(values.len());
            for v in values {
                match v.as_deref().and_then(|s| coerce(s, logical, opts)) {
                    Some(Scalar::Boolean(b)) => builder.append_value(b),
                    _ => builder.append_null(),
                }
            }
            Some(Arc::new(builder.finish()))
        }
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(values.len());
            for v in values {
                match v.as_deref().and_then(|s| coerce(s, logical, opts)) {
                    Some(Scalar::Int64(n)) => builder.append_value(n),
                    _ => builder.append_null(),
                }
            }
            Some(Arc::new(builder.finish()))
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(values.len());
            for v in values {
                match v.as_deref().and_then(|s| coerce(s, logical, opts)) {
                    Some(Scalar::Float64(f)) => builder.append_value(f),
                    _ => builder.append_null(),
                }
            }
            Some(Arc::new(builder.finish()))
        }
        DataType::Date32 => {
            let mut builder = Date32Builder::with_capacity(values.len());
            for v in values {
                match v.as_deref().and_then(|s| coerce(s, logical, opts)) {
                    Some(Scalar::Date32(d)) => builder.append_value(d),
                    _ => builder.append_null(),
                }
            }
            Some(Arc::new(builder.finish()))
        }
        DataType::Timestamp(_, _) => {
            let mut builder = TimestampNanosecondBuilder::with_capacity(values.len());
            for v in values {
                match v.as_deref().and_then(|s| coerce(s, logical, opts)) {
                    Some(Scalar::TimestampNanos(ts)) => builder.append_value(ts),
                    _ => builder.append_null(),
                }
            }
            Some(Arc::new(builder.finish()))
        }
        DataType::Utf8 => {
            let mut builder = StringBuilder::with_capacity(values.len(), values.len() * 8);
            for v in values {
                match v.as_deref() {
                    Some(s) if !s.is_empty() => builder.append_value(s),
                    _ => builder.append_null(),
                }
            }
            Some(Arc::new(builder.finish()))
        }
        other => {
            warn!(data_type = ?other, "unsupported arrow data type for column builder");
            None
        }
    }
}

/// Maps an Arrow [`DataType`] back to the [`LogicalType`] used to coerce
/// cell values for it. Only the types [`build_column`] supports are
/// covered; anything else coerces as `String`.
fn logical_for(data_type: &DataType) -> LogicalType {
    match data_type {
        DataType::Boolean => LogicalType::Boolean,
        DataType::Int64 => LogicalType::Int64,
        DataType::Float64 => LogicalType::Float64,
        DataType::Date32 => LogicalType::Date,
        DataType::Timestamp(_, _) => LogicalType::Timestamp,
        _ => LogicalType::String,
    }
}

/// Builds one [`RecordBatch`] directly from a column-oriented map of raw
/// values, given the target Arrow schema. Each column is constructed in
/// a single pass; rows are never transposed through an intermediate
/// per-cell representation.
///
/// Returns `None` (with a logged warning) if any column cannot be built,
/// rather than panicking or propagating an exception — callers treat a
/// failed batch as "nothing to emit this round", not a fatal error.
#[must_use]
pub fn build_record_batch(
    schema: &Arc<Schema>,
    columns: &[Vec<Option<String>>],
    opts: &TypeOptions,
) -> Option<RecordBatch> {
    if schema.fields().len() != columns.len() {
        warn!(
            expected = schema.fields().len(),
            actual = columns.len(),
            "column count does not match schema; skipping batch"
        );
        return None;
    }

    let mut arrays = Vec::with_capacity(columns.len());
    for (field, values) in schema.fields().iter().zip(columns.iter()) {
        let logical = logical_for(field.data_type());
        match build_column(field.data_type(), logical, values, opts) {
            Some(array) => arrays.push(array),
            None => return None,
        }
    }

    match RecordBatch::try_new(Arc::clone(schema), arrays) {
        Ok(batch) => Some(batch),
        Err(e) => {
            warn!(error = %e, "failed to assemble record batch");
            None
        }
    }
}

/// Serializes a record batch as a self-contained Arrow IPC stream: one
/// buffer containing the schema message followed by the batch message,
/// suitable for placing wholesale into a `FlightData.data_body`.
///
/// Returns `None` with a logged warning on failure, never an exception.
#[must_use]
pub fn serialize_record_batch(batch: &RecordBatch) -> Option<Vec<u8>> {
    serialize_stream(&batch.schema(), std::slice::from_ref(batch))
}

/// Serializes just a schema as a self-contained (empty) Arrow IPC
/// stream, suitable for `FlightInfo.schema` / `SchemaResult.schema`.
#[must_use]
pub fn serialize_schema(schema: &Arc<Schema>) -> Option<Vec<u8>> {
    serialize_stream(schema, &[])
}

fn serialize_stream(schema: &Arc<Schema>, batches: &[RecordBatch]) -> Option<Vec<u8>> {
    let mut buffer = Vec::new();
    let result = (|| -> arrow::error::Result<()> {
        let mut writer = StreamWriter::try_new(&mut buffer, schema)?;
        for batch in batches {
            writer.write(batch)?;
        }
        writer.finish()
    })();

    match result {
        Ok(()) => Some(buffer),
        Err(e) => {
            warn!(error = %e, "failed to serialize arrow ipc stream");
            None
        }
    }
}

/// Deserializes a self-contained Arrow IPC stream buffer (as produced by
/// [`serialize_record_batch`]) back into its record batches.
///
/// # Errors
///
/// Returns an [`arrow::error::ArrowError`] if the buffer is not a valid
/// IPC stream.
pub fn deserialize_stream(buffer: &[u8]) -> arrow::error::Result<Vec<RecordBatch>> {
    let cursor = Cursor::new(buffer);
    let reader = StreamReader::try_new(cursor, None)?;
    reader.collect()
}

/// Basic statistics about a record batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchStats {
    /// Number of rows.
    pub num_rows: usize,
    /// Number of columns.
    pub num_columns: usize,
}

/// Computes [`BatchStats`] for a batch.
#[must_use]
pub fn stats(batch: &RecordBatch) -> BatchStats {
    BatchStats {
        num_rows: batch.num_rows(),
        num_columns: batch.num_columns(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::Field;

    fn sample_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, true),
            Field::new("age", DataType::Int64, true),
        ]))
    }

    #[test]
    fn builds_batch_directly_from_columns() {
        let schema = sample_schema();
        let columns = vec![
            vec![Some("John".to_string()), Some("Jane".to_string())],
            vec![Some("25".to_string()), Some("30".to_string())],
        ];
        let batch = build_record_batch(&schema, &columns, &TypeOptions::default()).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 2);
    }

    #[test]
    fn unparseable_cell_becomes_null_not_error() {
        let schema = sample_schema();
        let columns = vec![
            vec![Some("John".to_string())],
            vec![Some("not-a-number".to_string())],
        ];
        let batch = build_record_batch(&schema, &columns, &TypeOptions::default()).unwrap();
        assert!(batch.column(1).is_null(0));
    }

    #[test]
    fn mismatched_column_count_returns_none() {
        let schema = sample_schema();
        let columns = vec![vec![Some("John".to_string())]];
        assert!(build_record_batch(&schema, &columns, &TypeOptions::default()).is_none());
    }

    #[test]
    fn record_batch_round_trips_through_ipc() {
        let schema = sample_schema();
        let columns = vec![
            vec![Some("John".to_string()), Some("Jane".to_string())],
            vec![Some("25".to_string()), Some("30".to_string())],
        ];
        let batch = build_record_batch(&schema, &columns, &TypeOptions::default()).unwrap();
        let bytes = serialize_record_batch(&batch).unwrap();
        let decoded = deserialize_stream(&bytes).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].num_rows(), 2);
    }

    #[test]
    fn schema_round_trips_through_ipc() {
        let schema = sample_schema();
        let bytes = serialize_schema(&schema).unwrap();
        let cursor = Cursor::new(bytes);
        let reader = StreamReader::try_new(cursor, None).unwrap();
        assert_eq!(reader.schema().fields().len(), 2);
    }

    #[test]
    fn batch_stats_reports_shape() {
        let schema = sample_schema();
        let columns = vec![
            vec![Some("John".to_string())],
            vec![Some("25".to_string())],
        ];
        let batch = build_record_batch(&schema, &columns, &TypeOptions::default()).unwrap();
        let s = stats(&batch);
        assert_eq!(s.num_rows, 1);
        assert_eq!(s.num_columns, 2);
    }
}
