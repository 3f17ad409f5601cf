//! Per-value transformation from MySQL values to PostgreSQL values.
//!
//! Every function here is total: anomalies are repaired (clamped, coerced,
//! replaced) and logged, never returned as errors.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::core::identifier::IdentifierNormalizer;
use crate::core::schema::TableDescriptor;
use crate::core::value::{MigrationRow, SourceRow, SourceValue, SqlValue};
use crate::typemap::{categorize, TypeCategory};

/// Keys that commonly wrap a date inside serialized documents.
const DATE_KEYS: &[&str] = &["$date", "date", "value", "iso"];

static EMBEDDED_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}(?:[ T]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?)?")
        .expect("embedded date pattern")
});

/// Transform one raw value for a column of the given MySQL type.
pub fn transform_value(raw: &SourceValue, source_type: &str) -> SqlValue {
    transform_value_at(raw, source_type, Utc::now().naive_utc())
}

/// [`transform_value`] with an explicit "now" used for unrecoverable
/// temporal values.
pub fn transform_value_at(raw: &SourceValue, source_type: &str, now: NaiveDateTime) -> SqlValue {
    let category = categorize(source_type);

    if raw.is_null() {
        return SqlValue::Null;
    }

    if category == TypeCategory::Boolean {
        return SqlValue::Bool(is_truthy(raw));
    }

    if raw.is_empty_composite() {
        return if category.is_temporal() {
            project(category, now)
        } else {
            SqlValue::Null
        };
    }

    let value = match category {
        TypeCategory::Integer => to_integer(raw),
        TypeCategory::Date | TypeCategory::Time | TypeCategory::DateTime => {
            to_temporal(raw, category, now)
        }
        TypeCategory::Json => to_json(raw),
        TypeCategory::Float => to_float(raw),
        TypeCategory::Decimal => to_decimal(raw),
        TypeCategory::Binary => to_binary(raw, source_type),
        TypeCategory::Text => match raw {
            SourceValue::Bytes(b) => SqlValue::Text(String::from_utf8_lossy(b).into_owned()),
            other => passthrough(other),
        },
        TypeCategory::Boolean | TypeCategory::Unknown => passthrough(raw),
    };

    sanitize_for_target(value)
}

/// Strip NUL and Unicode non-characters from every string in the value,
/// including nested JSON keys and elements.
pub fn sanitize_for_target(value: SqlValue) -> SqlValue {
    match value {
        SqlValue::Text(s) => SqlValue::Text(sanitize_str(&s)),
        SqlValue::Json(v) => SqlValue::Json(sanitize_json(v)),
        other => other,
    }
}

fn sanitize_str(s: &str) -> String {
    s.chars().filter(|c| !is_forbidden_char(*c)).collect()
}

fn is_forbidden_char(c: char) -> bool {
    let cp = c as u32;
    cp == 0 || (0xFDD0..=0xFDEF).contains(&cp) || (cp & 0xFFFE) == 0xFFFE
}

fn sanitize_json(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(sanitize_str(&s)),
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(sanitize_json).collect()),
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(k, v)| (sanitize_str(&k), sanitize_json(v)))
                .collect(),
        ),
        other => other,
    }
}

fn clamp_i64(v: i128) -> i64 {
    v.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

fn is_truthy(raw: &SourceValue) -> bool {
    match raw {
        SourceValue::Bool(b) => *b,
        SourceValue::Int(i) => *i == 1,
        SourceValue::Float(f) => *f == 1.0,
        SourceValue::Decimal(d) => *d == Decimal::ONE,
        SourceValue::Text(s) => {
            let s = s.trim();
            s == "1" || s.eq_ignore_ascii_case("true")
        }
        SourceValue::Bytes(b) => b.as_slice() == [1],
        SourceValue::Composite(JsonValue::Bool(b)) => *b,
        SourceValue::Composite(JsonValue::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Parse a numeric string as wide as possible.
fn parse_wide_integer(s: &str) -> Option<i128> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i128>() {
        return Some(i);
    }
    if let Ok(d) = s.parse::<Decimal>() {
        return d.trunc().to_i128();
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| !f.is_nan())
        .map(|f| f as i128)
}

fn to_integer(raw: &SourceValue) -> SqlValue {
    let wide = match raw {
        SourceValue::Int(i) => Some(*i),
        SourceValue::Bool(b) => Some(i128::from(*b)),
        SourceValue::Float(f) if !f.is_nan() => Some(*f as i128),
        SourceValue::Decimal(d) => d.trunc().to_i128(),
        SourceValue::Text(s) => parse_wide_integer(s),
        SourceValue::Composite(JsonValue::Number(n)) => parse_wide_integer(&n.to_string()),
        _ => None,
    };
    match wide {
        Some(v) => SqlValue::I64(clamp_i64(v)),
        None => {
            warn!("Non-numeric value {:?} in integer column, writing NULL", raw);
            SqlValue::Null
        }
    }
}

fn to_float(raw: &SourceValue) -> SqlValue {
    match raw {
        SourceValue::Float(f) => SqlValue::F64(*f),
        SourceValue::Int(i) => SqlValue::F64(*i as f64),
        SourceValue::Decimal(d) => d.to_f64().map(SqlValue::F64).unwrap_or(SqlValue::Null),
        SourceValue::Text(s) => match s.trim().parse::<f64>() {
            Ok(f) => SqlValue::F64(f),
            Err(_) => passthrough(raw),
        },
        other => passthrough(other),
    }
}

fn to_decimal(raw: &SourceValue) -> SqlValue {
    let parsed = match raw {
        SourceValue::Decimal(d) => Some(*d),
        SourceValue::Int(i) => i.to_string().parse::<Decimal>().ok(),
        SourceValue::Float(f) => Decimal::try_from(*f).ok(),
        SourceValue::Text(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    };
    parsed.map(SqlValue::Decimal).unwrap_or_else(|| passthrough(raw))
}

fn to_json(raw: &SourceValue) -> SqlValue {
    match raw {
        SourceValue::Text(s) => match serde_json::from_str::<JsonValue>(s) {
            Ok(v) => SqlValue::Json(v),
            Err(_) => SqlValue::Json(JsonValue::String(s.clone())),
        },
        SourceValue::Bytes(b) => to_json(&SourceValue::Text(String::from_utf8_lossy(b).into_owned())),
        SourceValue::Composite(v) => SqlValue::Json(v.clone()),
        other => SqlValue::Json(other.to_json()),
    }
}

/// Byte width of a `bit(n)` column.
fn bit_width(source_type: &str) -> Option<usize> {
    let lowered = source_type.trim().to_lowercase();
    let bits: usize = lowered
        .strip_prefix("bit(")?
        .strip_suffix(')')?
        .trim()
        .parse()
        .ok()?;
    Some(bits.div_ceil(8).clamp(1, 16))
}

/// Big-endian bytes of an integer, `width` bytes wide when known, otherwise
/// as few as hold the value.
fn integer_bytes(v: i128, width: Option<usize>) -> Vec<u8> {
    let all = v.to_be_bytes();
    let keep = match width {
        Some(w) => w,
        None => {
            let leading = all.iter().take_while(|b| **b == 0).count();
            (all.len() - leading).max(1)
        }
    };
    all[all.len() - keep..].to_vec()
}

/// `bytea` columns. MySQL `BIT` values arrive as integers.
fn to_binary(raw: &SourceValue, source_type: &str) -> SqlValue {
    match raw {
        SourceValue::Bytes(b) => SqlValue::Bytes(b.clone()),
        SourceValue::Text(s) => SqlValue::Bytes(s.clone().into_bytes()),
        SourceValue::Int(v) => SqlValue::Bytes(integer_bytes(*v, bit_width(source_type))),
        SourceValue::Bool(b) => SqlValue::Bytes(vec![u8::from(*b)]),
        SourceValue::Null => SqlValue::Null,
        other => {
            let text = match other.to_json() {
                JsonValue::String(s) => s,
                value => value.to_string(),
            };
            SqlValue::Bytes(text.into_bytes())
        }
    }
}

/// Values that need no column-specific handling.
fn passthrough(raw: &SourceValue) -> SqlValue {
    match raw {
        SourceValue::Null => SqlValue::Null,
        SourceValue::Bool(b) => SqlValue::Bool(*b),
        SourceValue::Int(i) => SqlValue::I64(clamp_i64(*i)),
        SourceValue::Float(f) => SqlValue::F64(*f),
        SourceValue::Decimal(d) => SqlValue::Decimal(*d),
        SourceValue::Text(s) => SqlValue::Text(s.clone()),
        SourceValue::Bytes(b) => SqlValue::Bytes(b.clone()),
        SourceValue::Date(d) => SqlValue::Date(*d),
        SourceValue::Time(t) => SqlValue::Time(*t),
        SourceValue::DateTime(dt) => SqlValue::DateTime(*dt),
        SourceValue::Composite(v) => SqlValue::Json(v.clone()),
    }
}

fn project(category: TypeCategory, dt: NaiveDateTime) -> SqlValue {
    match category {
        TypeCategory::Date => SqlValue::Date(dt.date()),
        TypeCategory::Time => SqlValue::Time(dt.time()),
        _ => SqlValue::DateTime(dt),
    }
}

fn to_temporal(raw: &SourceValue, category: TypeCategory, now: NaiveDateTime) -> SqlValue {
    let parsed = match raw {
        SourceValue::DateTime(dt) => Some(*dt),
        SourceValue::Date(d) => Some(d.and_time(NaiveTime::default())),
        SourceValue::Time(t) => {
            if category == TypeCategory::Time {
                return SqlValue::Time(*t);
            }
            None
        }
        SourceValue::Text(s) => {
            if category == TypeCategory::Time {
                if let Some(t) = parse_time(s) {
                    return SqlValue::Time(t);
                }
            }
            parse_datetime(s)
        }
        SourceValue::Bytes(b) => parse_datetime(&String::from_utf8_lossy(b)),
        SourceValue::Composite(v) => date_from_composite(v),
        _ => None,
    };

    match parsed {
        Some(dt) => project(category, dt),
        None => {
            warn!(
                "Unrecoverable temporal value {:?}, using current timestamp",
                raw
            );
            project(category, now)
        }
    }
}

/// Parse the date formats seen in MySQL exports.
fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_time(NaiveTime::default()));
    }
    None
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn date_from_composite(value: &JsonValue) -> Option<NaiveDateTime> {
    if let JsonValue::Object(map) = value {
        for key in DATE_KEYS {
            match map.get(*key) {
                Some(JsonValue::String(s)) => {
                    if let Some(dt) = parse_datetime(s) {
                        return Some(dt);
                    }
                }
                Some(JsonValue::Number(n)) => {
                    if let Some(dt) = n.as_i64().and_then(DateTime::from_timestamp_millis) {
                        return Some(dt.naive_utc());
                    }
                }
                Some(nested @ JsonValue::Object(_)) => {
                    if let Some(dt) = date_from_composite(nested) {
                        return Some(dt);
                    }
                }
                _ => {}
            }
        }
    }

    let serialized = serde_json::to_string(value).ok()?;
    let found = EMBEDDED_DATE.find(&serialized)?;
    parse_datetime(found.as_str())
}

/// How one source column lands in the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    /// Source column name.
    pub source: String,
    /// Normalized target column name.
    pub target: String,
    /// MySQL column type.
    pub source_type: String,
}

/// Column plan for a whole table.
#[derive(Debug, Clone)]
pub struct RowPlan {
    columns: IndexMap<String, ColumnPlan>,
    normalizer: IdentifierNormalizer,
}

impl RowPlan {
    /// Build the plan from introspected columns.
    pub fn new(descriptor: &TableDescriptor, normalizer: &IdentifierNormalizer) -> Self {
        let columns = descriptor
            .columns
            .iter()
            .map(|c| {
                (
                    c.field.to_lowercase(),
                    ColumnPlan {
                        source: c.field.clone(),
                        target: normalizer.column(&c.field),
                        source_type: c.source_type.clone(),
                    },
                )
            })
            .collect();
        Self {
            columns,
            normalizer: normalizer.clone(),
        }
    }

    /// Planned columns in ordinal order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnPlan> {
        self.columns.values()
    }

    /// Target column name for a source field.
    pub fn target_column(&self, field: &str) -> String {
        match self.columns.get(&field.to_lowercase()) {
            Some(plan) => plan.target.clone(),
            None => self.normalizer.column(field),
        }
    }
}

/// Transform a full row: rename columns and transform each value.
/// Columns the plan does not know are renamed and transformed as untyped.
pub fn transform_row(plan: &RowPlan, row: &SourceRow) -> MigrationRow {
    transform_row_at(plan, row, Utc::now().naive_utc())
}

/// [`transform_row`] with an explicit "now".
pub fn transform_row_at(plan: &RowPlan, row: &SourceRow, now: NaiveDateTime) -> MigrationRow {
    row.iter()
        .map(|(field, raw)| match plan.columns.get(&field.to_lowercase()) {
            Some(column) => (
                column.target.clone(),
                transform_value_at(raw, &column.source_type, now),
            ),
            None => (
                plan.normalizer.column(field),
                transform_value_at(raw, "", now),
            ),
        })
        .collect()
}
