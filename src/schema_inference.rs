//! Per-column schema inference from a bounded sample of raw string rows.
//!
//! Builds on [`crate::types::infer_logical_type`] with a null-fraction
//! threshold and a confidence-threshold vote across the sampled values of
//! each column.

use std::sync::Arc;

use arrow_schema::{Field, Schema};
use indexmap::IndexMap;

use crate::types::{infer_logical_type, logical_to_arrow, LogicalType, TypeOptions};

/// Options controlling [`infer_column_type`] and [`infer_schema`].
#[derive(Debug, Clone)]
pub struct SchemaInferenceOptions {
    /// If the fraction of null/empty values in a column exceeds this,
    /// the column is inferred as `String` without further voting.
    pub null_threshold: f64,
    /// Maximum number of non-null values sampled per column.
    pub sample_size: usize,
    /// Minimum share of non-null samples the most frequent type must
    /// reach to be accepted; otherwise the column falls back to `String`.
    pub confidence_threshold: f64,
    /// Type inference options applied to each sampled value.
    pub type_options: TypeOptions,
}

impl Default for SchemaInferenceOptions {
    fn default() -> Self {
        Self {
            null_threshold: 0.5,
            sample_size: 1_000,
            confidence_threshold: 0.6,
            type_options: TypeOptions::default(),
        }
    }
}

/// Infers the logical type of a single column from its raw sampled
/// values (including nulls as empty strings or `None`).
///
/// # Example
///
/// ```
/// use tabular_flight::schema_inference::{infer_column_type, SchemaInferenceOptions};
/// use tabular_flight::types::LogicalType;
///
/// let values = vec![Some("25".to_string()), Some("30".to_string()), Some("35".to_string())];
/// let opts = SchemaInferenceOptions::default();
/// assert_eq!(infer_column_type(&values, &opts), LogicalType::Int64);
/// ```
#[must_use]
pub fn infer_column_type(values: &[Option<String>], opts: &SchemaInferenceOptions) -> LogicalType {
    if values.is_empty() {
        return LogicalType::String;
    }

    let null_count = values
        .iter()
        .filter(|v| v.as_deref().map_or(true, str::is_empty))
        .count();
    #[allow(clippy::cast_precision_loss)]
    let null_fraction = null_count as f64 / values.len() as f64;
    if null_fraction > opts.null_threshold {
        return LogicalType::String;
    }

    let non_null: Vec<&str> = values
        .iter()
        .filter_map(|v| v.as_deref())
        .filter(|v| !v.is_empty())
        .take(opts.sample_size)
        .collect();

    if non_null.is_empty() {
        return LogicalType::String;
    }

    let mut counts: IndexMap<LogicalType, usize> = IndexMap::new();
    for value in &non_null {
        let inferred = infer_logical_type(value, &opts.type_options);
        *counts.entry(inferred).or_insert(0) += 1;
    }

    let (best_type, best_count) = counts
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(t, c)| (*t, *c))
        .unwrap_or((LogicalType::String, 0));

    #[allow(clippy::cast_precision_loss)]
    let share = best_count as f64 / non_null.len() as f64;
    if share >= opts.confidence_threshold {
        best_type
    } else {
        LogicalType::String
    }
}

/// Infers a per-column logical type mapping across a set of sample rows.
///
/// `column_names` gives the authoritative column order (CSV header order,
/// or synthesized `column_N` names); each row in `rows` is a parallel,
/// positional `Vec` of cells matching that order. The result preserves
/// `column_names` order exactly, rather than deriving it from row-keyed
/// map iteration (which Rust's `HashMap` does not guarantee).
///
/// # Example
///
/// ```
/// use tabular_flight::schema_inference::{infer_schema, SchemaInferenceOptions};
///
/// let columns = vec!["name".to_string(), "age".to_string()];
/// let rows = vec![vec![Some("John".to_string()), Some("25".to_string())]];
/// let schema = infer_schema(&columns, &rows, &SchemaInferenceOptions::default());
/// assert!(schema.contains_key("age"));
/// ```
#[must_use]
pub fn infer_schema(
    column_names: &[String],
    rows: &[Vec<Option<String>>],
    opts: &SchemaInferenceOptions,
) -> IndexMap<String, LogicalType> {
    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(rows.len()); column_names.len()];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(column) = columns.get_mut(i) {
                column.push(cell.clone());
            }
        }
    }

    column_names
        .iter()
        .zip(columns)
        .map(|(name, values)| (name.clone(), infer_column_type(&values, opts)))
        .collect()
}

/// Normalizes a logical-type mapping into Arrow type names, applying any
/// registered overrides. Unknown entries fall back to `Utf8`.
#[must_use]
pub fn normalize_schema(
    mapping: &IndexMap<String, LogicalType>,
) -> IndexMap<String, arrow_schema::DataType> {
    mapping
        .iter()
        .map(|(name, logical)| (name.clone(), logical_to_arrow(*logical)))
        .collect()
}

/// Builds an Arrow [`Schema`] from a normalized type mapping. All fields
/// are nullable.
#[must_use]
pub fn generate_arrow_schema(normalized: &IndexMap<String, arrow_schema::DataType>) -> Arc<Schema> {
    let fields: Vec<Field> = normalized
        .iter()
        .map(|(name, data_type)| Field::new(name, data_type.clone(), true))
        .collect();
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn votes_for_majority_type() {
        let opts = SchemaInferenceOptions::default();
        let values = vec![
            Some("1".to_string()),
            Some("2".to_string()),
            Some("3".to_string()),
            Some("not a number".to_string()),
        ];
        assert_eq!(infer_column_type(&values, &opts), LogicalType::Int64);
    }

    #[test]
    fn falls_back_below_confidence_threshold() {
        let opts = SchemaInferenceOptions::default();
        let values = vec![
            Some("1".to_string()),
            Some("a".to_string()),
            Some("b".to_string()),
        ];
        assert_eq!(infer_column_type(&values, &opts), LogicalType::String);
    }

    #[test]
    fn high_null_fraction_forces_string() {
        let opts = SchemaInferenceOptions::default();
        let values = vec![
            Some("1".to_string()),
            None,
            None,
            Some(String::new()),
        ];
        assert_eq!(infer_column_type(&values, &opts), LogicalType::String);
    }

    #[test]
    fn infer_schema_preserves_column_order() {
        let opts = SchemaInferenceOptions::default();
        let columns = vec!["city".to_string(), "name".to_string(), "age".to_string()];
        let rows = vec![
            vec![
                Some("New York".to_string()),
                Some("John".to_string()),
                Some("25".to_string()),
            ],
            vec![
                Some("Los Angeles".to_string()),
                Some("Jane".to_string()),
                Some("30".to_string()),
            ],
        ];
        let schema = infer_schema(&columns, &rows, &opts);
        let names: Vec<&str> = schema.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["city", "name", "age"]);
        assert_eq!(schema.get("name"), Some(&LogicalType::String));
        assert_eq!(schema.get("age"), Some(&LogicalType::Int64));
    }

    #[test]
    fn generate_arrow_schema_builds_nullable_fields() {
        let mut mapping = IndexMap::new();
        mapping.insert("age".to_string(), LogicalType::Int64);
        let normalized = normalize_schema(&mapping);
        let schema = generate_arrow_schema(&normalized);
        assert_eq!(schema.fields().len(), 1);
        assert!(schema.field(0).is_nullable());
    }
}
