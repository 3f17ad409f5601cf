//! SQL literal rendering for PostgreSQL.
//!
//! Bulk inserts are sent as text, so every value is rendered here and
//! nowhere else. Strings always use the `E'...'` form with backslashes and
//! single quotes doubled, which is correct whatever
//! `standard_conforming_strings` is set to.

use crate::core::value::SqlValue;

/// Render a string as an escape-string literal.
pub fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 3);
    out.push_str("E'");
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("''"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render a value as a PostgreSQL literal.
pub fn render_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        SqlValue::I64(i) => i.to_string(),
        SqlValue::F64(f) => render_float(*f),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::Text(s) => quote_literal(s),
        SqlValue::Bytes(b) => format!("E'\\\\x{}'::bytea", hex::encode(b)),
        SqlValue::Json(v) => format!("{}::jsonb", quote_literal(&v.to_string())),
        SqlValue::Date(d) => format!("'{}'::date", d.format("%Y-%m-%d")),
        SqlValue::Time(t) => format!("'{}'::time", t.format("%H:%M:%S%.f")),
        SqlValue::DateTime(dt) => format!("'{}'::timestamp", dt.format("%Y-%m-%d %H:%M:%S%.f")),
    }
}

fn render_float(f: f64) -> String {
    if f.is_nan() {
        "'NaN'::float8".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "'Infinity'::float8".to_string()
        } else {
            "'-Infinity'::float8".to_string()
        }
    } else {
        f.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal("plain"), "E'plain'");
        assert_eq!(quote_literal("O'Brien"), "E'O''Brien'");
        assert_eq!(quote_literal(r"C:\path"), r"E'C:\\path'");
        assert_eq!(quote_literal(r"\'"), r"E'\\'''");
        assert_eq!(quote_literal(""), "E''");
    }

    #[test]
    fn test_quote_literal_injection_is_inert() {
        let rendered = quote_literal("x'); DROP TABLE user; --");
        assert_eq!(rendered, "E'x''); DROP TABLE user; --'");
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(render_value(&SqlValue::Null), "NULL");
        assert_eq!(render_value(&SqlValue::Bool(true)), "TRUE");
        assert_eq!(render_value(&SqlValue::I64(i64::MIN)), "-9223372036854775808");
        assert_eq!(render_value(&SqlValue::F64(1.5)), "1.5");
        assert_eq!(render_value(&SqlValue::F64(f64::NAN)), "'NaN'::float8");
        assert_eq!(
            render_value(&SqlValue::F64(f64::NEG_INFINITY)),
            "'-Infinity'::float8"
        );
        assert_eq!(
            render_value(&SqlValue::Decimal("10.50".parse().unwrap())),
            "10.50"
        );
    }

    #[test]
    fn test_render_bytes_and_json() {
        assert_eq!(
            render_value(&SqlValue::Bytes(vec![0x00, 0xff])),
            r"E'\\x00ff'::bytea"
        );
        assert_eq!(
            render_value(&SqlValue::Json(json!({"q": "it's"}))),
            r#"E'{"q":"it''s"}'::jsonb"#
        );
    }

    #[test]
    fn test_render_temporal() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(render_value(&SqlValue::Date(d)), "'2024-02-29'::date");
        let dt = d.and_hms_opt(13, 5, 0).unwrap();
        assert_eq!(
            render_value(&SqlValue::DateTime(dt)),
            "'2024-02-29 13:05:00'::timestamp"
        );
    }
}
