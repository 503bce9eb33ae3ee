//! Logical type system: inference from raw string values, safe coercion,
//! and mapping to Arrow types.
//!
//! Inference applies a fixed, ordered set of rules to a trimmed string
//! form of each value (see [`infer_logical_type`]). Coercion
//! ([`coerce`]) is total: an input that cannot be parsed as its target
//! type yields `None`, never a panic.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Fields, IntervalUnit, TimeUnit, UnionFields, UnionMode};
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;

/// A logical type name, independent of any particular Arrow encoding.
///
/// This is the full closed enumeration the type system recognizes.
/// `infer_logical_type` only ever produces the subset that a raw CSV cell
/// can plausibly be (`Boolean`, `Int64`, `Float64`, `String`, `Date`,
/// `Timestamp`) — the remaining variants exist so that an explicit schema
/// override (or a future non-CSV source) can name them, and so the
/// [`TypeRegistry`] has a fixed vocabulary of names to attach custom Arrow
/// mappings and coercers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// `true`/`false` and common textual synonyms.
    Boolean,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 8-bit unsigned integer.
    UInt8,
    /// 16-bit unsigned integer.
    UInt16,
    /// 32-bit unsigned integer.
    UInt32,
    /// 64-bit unsigned integer.
    UInt64,
    /// 16-bit floating point.
    Float16,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 text.
    String,
    /// Raw bytes.
    Binary,
    /// Calendar date with no time component.
    Date,
    /// Time of day with no date component.
    Time,
    /// Timestamp with nanosecond resolution, UTC.
    Timestamp,
    /// Fixed-precision decimal.
    Decimal,
    /// Variable-length list of a single element type.
    List,
    /// Fixed set of named fields.
    Struct,
    /// Key/value association.
    Map,
    /// Tagged union of alternative types.
    Union,
    /// Dictionary-encoded (categorical) value.
    Dictionary,
    /// Binary of a fixed, known width.
    FixedSizeBinary,
    /// Calendar interval (months/days/nanos).
    Interval,
    /// Elapsed-time duration.
    Duration,
}

/// Options controlling [`infer_logical_type`] and [`coerce`].
#[derive(Debug, Clone)]
pub struct TypeOptions {
    /// When true, ambiguous forms (currency, percentages) stay `String`
    /// rather than being coerced into a numeric type.
    pub strict_mode: bool,
    /// Largest absolute integer value accepted before falling back to
    /// `String` (guards against precision loss in very large integers).
    pub integer_threshold: i64,
}

impl Default for TypeOptions {
    fn default() -> Self {
        Self {
            strict_mode: false,
            integer_threshold: i64::MAX,
        }
    }
}

/// A single coerced value. Scalar, directly CSV-coercible logical types map
/// to exactly one variant here; `None` (absent, via [`Option`]) represents
/// a coercion failure, a source null, or (for the compound logical types
/// that have no natural raw-string representation) an always-fails
/// coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Boolean value.
    Boolean(bool),
    /// 8-bit integer value.
    Int8(i8),
    /// 16-bit integer value.
    Int16(i16),
    /// 32-bit integer value.
    Int32(i32),
    /// 64-bit integer value.
    Int64(i64),
    /// 8-bit unsigned integer value.
    UInt8(u8),
    /// 16-bit unsigned integer value.
    UInt16(u16),
    /// 32-bit unsigned integer value.
    UInt32(u32),
    /// 64-bit unsigned integer value.
    UInt64(u64),
    /// 32-bit float value.
    Float32(f32),
    /// 64-bit float value.
    Float64(f64),
    /// UTF-8 string value.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Days since the Unix epoch.
    Date32(i32),
    /// Nanoseconds since the Unix epoch.
    TimestampNanos(i64),
}

const TRUE_WORDS: &[&str] = &["true", "yes", "y", "1"];
const FALSE_WORDS: &[&str] = &["false", "no", "n", "0"];

/// Infers the [`LogicalType`] of a single raw string value.
///
/// Rules are applied in this fixed order and must not be reordered (a
/// numeric column containing stray `"1"`/`"0"` values is expected to have
/// those values provisionally classified as booleans here; it is the
/// column-level voting in [`crate::schema_inference`] that demotes the
/// column away from `Boolean` when most values are not boolean-shaped):
///
/// 1. Empty value -> `String` (a placeholder; callers treat it as null).
/// 2. Boolean word (`true/false/yes/no/y/n/1/0`, case-insensitive).
/// 3. Integer pattern, within `integer_threshold` -> `Int64`.
/// 4. Float pattern (decimal or scientific notation) -> `Float64`.
/// 5. Date pattern (`YYYY-MM-DD`, `MM/DD/YYYY`) -> `Date`.
/// 6. Timestamp pattern (ISO `...T...`, or a plausible epoch) -> `Timestamp`.
/// 7. Otherwise -> `String`.
///
/// # Example
///
/// ```
/// use tabular_flight::types::{infer_logical_type, LogicalType, TypeOptions};
///
/// let opts = TypeOptions::default();
/// assert_eq!(infer_logical_type("42", &opts), LogicalType::Int64);
/// assert_eq!(infer_logical_type("true", &opts), LogicalType::Boolean);
/// assert_eq!(infer_logical_type("hello", &opts), LogicalType::String);
/// ```
#[must_use]
pub fn infer_logical_type(value: &str, opts: &TypeOptions) -> LogicalType {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return LogicalType::String;
    }

    let lower = trimmed.to_ascii_lowercase();
    if TRUE_WORDS.contains(&lower.as_str()) || FALSE_WORDS.contains(&lower.as_str()) {
        return LogicalType::Boolean;
    }

    if is_integer_literal(trimmed) {
        if let Ok(n) = trimmed.parse::<i64>() {
            if n.unsigned_abs() <= opts.integer_threshold.unsigned_abs() {
                return LogicalType::Int64;
            }
        }
        return LogicalType::String;
    }

    if is_float_literal(trimmed) && trimmed.parse::<f64>().is_ok() {
        return LogicalType::Float64;
    }

    if looks_like_date(trimmed) && parse_date(trimmed).is_some() {
        return LogicalType::Date;
    }

    if looks_like_timestamp(trimmed) && parse_timestamp(trimmed).is_some() {
        return LogicalType::Timestamp;
    }

    LogicalType::String
}

fn is_integer_literal(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_float_literal(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    if body.is_empty() {
        return false;
    }
    let mut saw_digit = false;
    let mut saw_dot = false;
    let mut saw_exp = false;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '0'..='9' => saw_digit = true,
            '.' if !saw_dot && !saw_exp => saw_dot = true,
            'e' | 'E' if saw_digit && !saw_exp => {
                saw_exp = true;
                if matches!(chars.peek(), Some('+' | '-')) {
                    chars.next();
                }
            }
            _ => return false,
        }
    }
    saw_digit && (saw_dot || saw_exp)
}

fn looks_like_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    let has_dash_date = bytes.len() >= 8 && (s.matches('-').count() == 2);
    let has_slash_date = s.matches('/').count() == 2;
    (has_dash_date || has_slash_date) && !s.contains('T')
}

fn looks_like_timestamp(s: &str) -> bool {
    if s.contains('T') || s.contains(' ') && s.matches(':').count() >= 2 {
        return true;
    }
    // Plausible epoch: 10 digits (seconds, ~2001-2286) or 13 digits (millis).
    let digits = s.strip_prefix('-').unwrap_or(s);
    digits.len() >= 10 && digits.len() <= 13 && digits.bytes().all(|b| b.is_ascii_digit())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

fn parse_timestamp(s: &str) -> Option<i64> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_nanos_opt();
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return dt.and_utc().timestamp_nanos_opt();
        }
    }
    if let Ok(epoch) = s.parse::<i64>() {
        let nanos = match s.trim_start_matches('-').len() {
            10 => epoch.checked_mul(1_000_000_000)?,
            13 => epoch.checked_mul(1_000_000)?,
            _ => return None,
        };
        return Some(nanos);
    }
    None
}

/// Coerces a raw string value to the given logical type.
///
/// Total: failures (including empty input) yield `None` rather than an
/// error or panic.
///
/// # Example
///
/// ```
/// use tabular_flight::types::{coerce, LogicalType, Scalar, TypeOptions};
///
/// let opts = TypeOptions::default();
/// assert_eq!(coerce("42", LogicalType::Int64, &opts), Some(Scalar::Int64(42)));
/// assert_eq!(coerce("not a number", LogicalType::Int64, &opts), None);
/// ```
#[must_use]
pub fn coerce(value: &str, target: LogicalType, _opts: &TypeOptions) -> Option<Scalar> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    match target {
        LogicalType::Boolean => {
            let lower = trimmed.to_ascii_lowercase();
            if TRUE_WORDS.contains(&lower.as_str()) {
                Some(Scalar::Boolean(true))
            } else if FALSE_WORDS.contains(&lower.as_str()) {
                Some(Scalar::Boolean(false))
            } else {
                None
            }
        }
        LogicalType::Int8 => trimmed.parse::<i8>().ok().map(Scalar::Int8),
        LogicalType::Int16 => trimmed.parse::<i16>().ok().map(Scalar::Int16),
        LogicalType::Int32 => trimmed.parse::<i32>().ok().map(Scalar::Int32),
        LogicalType::Int64 => trimmed.parse::<i64>().ok().map(Scalar::Int64),
        LogicalType::UInt8 => trimmed.parse::<u8>().ok().map(Scalar::UInt8),
        LogicalType::UInt16 => trimmed.parse::<u16>().ok().map(Scalar::UInt16),
        LogicalType::UInt32 => trimmed.parse::<u32>().ok().map(Scalar::UInt32),
        LogicalType::UInt64 => trimmed.parse::<u64>().ok().map(Scalar::UInt64),
        LogicalType::Float16 | LogicalType::Float32 => trimmed
            .parse::<f32>()
            .ok()
            .filter(|f| !f.is_nan())
            .map(Scalar::Float32),
        LogicalType::Float64 => trimmed
            .parse::<f64>()
            .ok()
            .filter(|f| !f.is_nan())
            .map(Scalar::Float64),
        LogicalType::String => Some(Scalar::String(trimmed.to_string())),
        LogicalType::Binary => Some(Scalar::Binary(trimmed.as_bytes().to_vec())),
        LogicalType::Date => parse_date(trimmed)
            .map(|d| Scalar::Date32((d - NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()).num_days() as i32)),
        LogicalType::Timestamp => parse_timestamp(trimmed).map(Scalar::TimestampNanos),
        // No natural raw-string representation; coercion is total (never
        // panics) but always reports failure for these until a caller
        // registers a custom coercer via `TypeRegistry::register_coercer`.
        LogicalType::Time
        | LogicalType::Decimal
        | LogicalType::List
        | LogicalType::Struct
        | LogicalType::Map
        | LogicalType::Union
        | LogicalType::Dictionary
        | LogicalType::FixedSizeBinary
        | LogicalType::Interval
        | LogicalType::Duration => None,
    }
}

/// Maps a [`LogicalType`] to its canonical Arrow [`DataType`].
///
/// # Example
///
/// ```
/// use arrow_schema::DataType;
/// use tabular_flight::types::{logical_to_arrow, LogicalType};
///
/// assert_eq!(logical_to_arrow(LogicalType::Int64), DataType::Int64);
/// ```
#[must_use]
pub fn logical_to_arrow(logical: LogicalType) -> DataType {
    match logical {
        LogicalType::Boolean => DataType::Boolean,
        LogicalType::Int8 => DataType::Int8,
        LogicalType::Int16 => DataType::Int16,
        LogicalType::Int32 => DataType::Int32,
        LogicalType::Int64 => DataType::Int64,
        LogicalType::UInt8 => DataType::UInt8,
        LogicalType::UInt16 => DataType::UInt16,
        LogicalType::UInt32 => DataType::UInt32,
        LogicalType::UInt64 => DataType::UInt64,
        LogicalType::Float16 => DataType::Float16,
        LogicalType::Float32 => DataType::Float32,
        LogicalType::Float64 => DataType::Float64,
        LogicalType::String => DataType::Utf8,
        LogicalType::Binary => DataType::Binary,
        LogicalType::Date => DataType::Date32,
        LogicalType::Time => DataType::Time64(TimeUnit::Nanosecond),
        LogicalType::Timestamp => DataType::Timestamp(TimeUnit::Nanosecond, Some(Arc::from("UTC"))),
        LogicalType::Decimal => DataType::Decimal128(38, 10),
        LogicalType::List => DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
        LogicalType::Struct => DataType::Struct(Fields::empty()),
        LogicalType::Map => DataType::Map(
            Arc::new(Field::new(
                "entries",
                DataType::Struct(Fields::from(vec![
                    Field::new("key", DataType::Utf8, false),
                    Field::new("value", DataType::Utf8, true),
                ])),
                false,
            )),
            false,
        ),
        LogicalType::Union => DataType::Union(UnionFields::empty(), UnionMode::Dense),
        LogicalType::Dictionary => DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
        LogicalType::FixedSizeBinary => DataType::FixedSizeBinary(16),
        LogicalType::Interval => DataType::Interval(IntervalUnit::MonthDayNano),
        LogicalType::Duration => DataType::Duration(TimeUnit::Nanosecond),
    }
}

/// A coercion function registrable on a [`TypeRegistry`].
pub type Coercer = Arc<dyn Fn(&str, &TypeOptions) -> Option<Scalar> + Send + Sync>;

/// Process-free registry of per-[`LogicalType`] Arrow-type overrides and
/// custom coercers.
///
/// The logical-type enumeration itself stays closed (spec §3): this
/// registry does not let callers invent new `LogicalType` variants, but it
/// does let them override the canonical Arrow mapping or plug in a custom
/// coercion function for an existing logical type — e.g. registering a
/// `Decimal` coercer once a caller knows the precision/scale it needs, or
/// pointing `Dictionary` at a differently-sized index type.
///
/// Passed explicitly to callers that need it; never stored as global
/// mutable state, per the "registry singletons" guidance.
///
/// # Example
///
/// ```
/// use tabular_flight::types::{LogicalType, Scalar, TypeOptions, TypeRegistry};
/// use std::sync::Arc;
///
/// let mut registry = TypeRegistry::new();
/// registry.register_coercer(LogicalType::Time, Arc::new(|v: &str, _: &TypeOptions| {
///     v.parse::<i64>().ok().map(Scalar::Int64)
/// }));
/// assert_eq!(registry.coerce("120", LogicalType::Time, &TypeOptions::default()), Some(Scalar::Int64(120)));
/// ```
#[derive(Clone, Default)]
pub struct TypeRegistry {
    arrow_overrides: IndexMap<LogicalType, DataType>,
    coercers: IndexMap<LogicalType, Coercer>,
}

impl TypeRegistry {
    /// Creates an empty registry; every logical type resolves to its
    /// canonical default until overridden.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the Arrow type a logical type maps to.
    pub fn register_arrow_type(&mut self, logical: LogicalType, arrow_type: DataType) {
        self.arrow_overrides.insert(logical, arrow_type);
    }

    /// Registers a custom coercion function for a logical type, replacing
    /// both the default behavior and any previously registered coercer.
    pub fn register_coercer(&mut self, logical: LogicalType, coercer: Coercer) {
        self.coercers.insert(logical, coercer);
    }

    /// Resolves a logical type to its Arrow type, honoring any registered
    /// override.
    #[must_use]
    pub fn logical_to_arrow(&self, logical: LogicalType) -> DataType {
        self.arrow_overrides
            .get(&logical)
            .cloned()
            .unwrap_or_else(|| logical_to_arrow(logical))
    }

    /// Coerces a raw value, honoring any registered coercer for `target`.
    #[must_use]
    pub fn coerce(&self, value: &str, target: LogicalType, opts: &TypeOptions) -> Option<Scalar> {
        match self.coercers.get(&target) {
            Some(coercer) => coercer(value, opts),
            None => coerce(value, target, opts),
        }
    }
}
