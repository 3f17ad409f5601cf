//! Value representations on both sides of the transformation.
//!
//! [`SourceValue`] is what the MySQL driver decodes, kept as wide as needed so
//! nothing is lost before the transformer clamps it. [`SqlValue`] is what the
//! PostgreSQL side writes.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

/// Raw decoded source value.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    /// SQL NULL.
    Null,

    /// Boolean (`tinyint(1)` decoded as bool).
    Bool(bool),

    /// Any integer, including `bigint unsigned` and oversized literals.
    Int(i128),

    /// Floating point.
    Float(f64),

    /// Fixed point.
    Decimal(Decimal),

    /// Character data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Calendar date.
    Date(NaiveDate),

    /// Time of day.
    Time(NaiveTime),

    /// Timestamp without time zone.
    DateTime(NaiveDateTime),

    /// Structured value (JSON document, or an undecodable value as `{}`).
    Composite(JsonValue),
}

impl SourceValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SourceValue::Null)
    }

    /// Empty object or array.
    #[must_use]
    pub fn is_empty_composite(&self) -> bool {
        match self {
            SourceValue::Composite(JsonValue::Object(m)) => m.is_empty(),
            SourceValue::Composite(JsonValue::Array(a)) => a.is_empty(),
            _ => false,
        }
    }

    /// JSON form used by the backup snapshot.
    ///
    /// Integers beyond the 64-bit range become strings so readers do not
    /// silently round them, bytes become `\x`-prefixed hex, temporal values
    /// become ISO 8601 strings.
    pub fn to_json(&self) -> JsonValue {
        match self {
            SourceValue::Null => JsonValue::Null,
            SourceValue::Bool(b) => JsonValue::Bool(*b),
            SourceValue::Int(i) => {
                if let Ok(v) = i64::try_from(*i) {
                    JsonValue::from(v)
                } else if let Ok(v) = u64::try_from(*i) {
                    JsonValue::from(v)
                } else {
                    JsonValue::String(i.to_string())
                }
            }
            SourceValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            SourceValue::Decimal(d) => JsonValue::String(d.to_string()),
            SourceValue::Text(s) => JsonValue::String(s.clone()),
            SourceValue::Bytes(b) => JsonValue::String(format!("\\x{}", hex::encode(b))),
            SourceValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            SourceValue::Time(t) => JsonValue::String(t.format("%H:%M:%S%.f").to_string()),
            SourceValue::DateTime(dt) => {
                JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            SourceValue::Composite(v) => v.clone(),
        }
    }
}

impl From<JsonValue> for SourceValue {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => SourceValue::Null,
            JsonValue::Bool(b) => SourceValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SourceValue::Int(i128::from(i))
                } else if let Some(u) = n.as_u64() {
                    SourceValue::Int(i128::from(u))
                } else {
                    SourceValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => SourceValue::Text(s),
            other => SourceValue::Composite(other),
        }
    }
}

impl From<&str> for SourceValue {
    fn from(v: &str) -> Self {
        SourceValue::Text(v.to_string())
    }
}

impl From<i64> for SourceValue {
    fn from(v: i64) -> Self {
        SourceValue::Int(i128::from(v))
    }
}

/// Transformed value ready for the target.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// `boolean`.
    Bool(bool),

    /// Any integer column, always within i64.
    I64(i64),

    /// `real` / `double precision`.
    F64(f64),

    /// `numeric`.
    Decimal(Decimal),

    /// Character data.
    Text(String),

    /// `bytea`.
    Bytes(Vec<u8>),

    /// `jsonb`.
    Json(JsonValue),

    /// `date`.
    Date(NaiveDate),

    /// `time`.
    Time(NaiveTime),

    /// `timestamp`.
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer payload, if any.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I64(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

/// One source row, keyed by source column name in select order.
pub type SourceRow = IndexMap<String, SourceValue>;

/// One transformed row, keyed by normalized target column name.
pub type MigrationRow = IndexMap<String, SqlValue>;
