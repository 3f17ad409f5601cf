//! Type mapping between MySQL and PostgreSQL.
//!
//! Input is the full MySQL `COLUMN_TYPE` (`int(11) unsigned`, `varchar(100)`,
//! `enum('a','b')`). Mapping is total: anything unrecognized becomes `text`.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Broad value family of a source column, used by the value transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Boolean,
    Integer,
    Float,
    Decimal,
    Text,
    Binary,
    Date,
    Time,
    DateTime,
    Json,
    Unknown,
}

impl TypeCategory {
    /// Date, time or timestamp.
    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            TypeCategory::Date | TypeCategory::Time | TypeCategory::DateTime
        )
    }
}

/// `varchar(n)`, `char(n)`, `decimal(p,s)` and friends.
static PARAMETERIZED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(varchar|char|character varying|character|decimal|numeric|dec|fixed)\s*\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)",
    )
    .expect("parameterized type pattern")
});

/// Leading type word, ignoring display width and modifiers.
static BASE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z]+)").expect("base type pattern"));

/// Rules keyed by the leading type word, in lookup order.
const TYPE_RULES: &[(&str, TypeCategory, &str)] = &[
    // Integers
    ("tinyint", TypeCategory::Integer, "smallint"),
    ("smallint", TypeCategory::Integer, "smallint"),
    ("mediumint", TypeCategory::Integer, "integer"),
    ("bigint", TypeCategory::Integer, "bigint"),
    ("integer", TypeCategory::Integer, "integer"),
    ("int", TypeCategory::Integer, "integer"),
    ("year", TypeCategory::Integer, "integer"),
    ("serial", TypeCategory::Integer, "bigint"),
    // Floating point
    ("float", TypeCategory::Float, "real"),
    ("double", TypeCategory::Float, "double precision"),
    ("real", TypeCategory::Float, "double precision"),
    // Fixed point without parameters
    ("decimal", TypeCategory::Decimal, "numeric"),
    ("numeric", TypeCategory::Decimal, "numeric"),
    ("dec", TypeCategory::Decimal, "numeric"),
    ("fixed", TypeCategory::Decimal, "numeric"),
    // Strings
    ("varchar", TypeCategory::Text, "text"),
    ("char", TypeCategory::Text, "text"),
    ("tinytext", TypeCategory::Text, "text"),
    ("mediumtext", TypeCategory::Text, "text"),
    ("longtext", TypeCategory::Text, "text"),
    ("text", TypeCategory::Text, "text"),
    ("enum", TypeCategory::Text, "text"),
    ("set", TypeCategory::Text, "text"),
    // Binary
    ("tinyblob", TypeCategory::Binary, "bytea"),
    ("mediumblob", TypeCategory::Binary, "bytea"),
    ("longblob", TypeCategory::Binary, "bytea"),
    ("blob", TypeCategory::Binary, "bytea"),
    ("varbinary", TypeCategory::Binary, "bytea"),
    ("binary", TypeCategory::Binary, "bytea"),
    ("bit", TypeCategory::Binary, "bytea"),
    // Temporal
    ("datetime", TypeCategory::DateTime, "timestamp"),
    ("timestamp", TypeCategory::DateTime, "timestamp"),
    ("date", TypeCategory::Date, "date"),
    ("time", TypeCategory::Time, "time"),
    // Documents
    ("json", TypeCategory::Json, "jsonb"),
];

fn normalize(source_type: &str) -> String {
    source_type.trim().to_lowercase()
}

fn is_boolean_flag(t: &str) -> bool {
    t.starts_with("tinyint(1)") || t.starts_with("bit(1)") || t == "bool" || t == "boolean"
}

fn resolve(source_type: &str) -> Option<(TypeCategory, String)> {
    let t = normalize(source_type);

    if is_boolean_flag(&t) {
        return Some((TypeCategory::Boolean, "boolean".to_string()));
    }

    if let Some(caps) = PARAMETERIZED.captures(&t) {
        let first = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let second = caps.get(3).map(|m| m.as_str());
        return Some(match &caps[1] {
            "varchar" | "character varying" => {
                (TypeCategory::Text, format!("varchar({})", first))
            }
            "char" | "character" => (TypeCategory::Text, format!("char({})", first)),
            _ => match second {
                Some(scale) => (TypeCategory::Decimal, format!("numeric({},{})", first, scale)),
                None => (TypeCategory::Decimal, format!("numeric({})", first)),
            },
        });
    }

    let base = BASE_WORD.captures(&t)?.get(1)?.as_str().to_string();
    let (category, target) = TYPE_RULES
        .iter()
        .find(|(word, _, _)| *word == base)
        .map(|(_, category, target)| (*category, *target))?;

    if category == TypeCategory::Integer && t.contains("unsigned") {
        return Some((category, widen_unsigned(&base).to_string()));
    }
    Some((category, target.to_string()))
}

/// Unsigned integers need the next wider signed type.
fn widen_unsigned(base: &str) -> &'static str {
    match base {
        "tinyint" => "smallint",
        "smallint" | "mediumint" => "integer",
        _ => "bigint",
    }
}

/// Map a MySQL column type to a PostgreSQL column type. Never fails;
/// unknown types map to `text` with a warning.
pub fn map_type(source_type: &str) -> String {
    match resolve(source_type) {
        Some((_, target)) => target,
        None => {
            warn!(
                "Unknown source type '{}', falling back to text",
                source_type
            );
            "text".to_string()
        }
    }
}

/// Value family of a MySQL column type.
pub fn categorize(source_type: &str) -> TypeCategory {
    resolve(source_type)
        .map(|(category, _)| category)
        .unwrap_or(TypeCategory::Unknown)
}

/// `serial`/`bigserial` for auto-increment integer keys.
pub fn serial_type_for(source_type: &str) -> Option<&'static str> {
    match resolve(source_type)? {
        (TypeCategory::Integer, target) if target == "bigint" => Some("bigserial"),
        (TypeCategory::Integer, _) => Some("serial"),
        _ => None,
    }
}
