//! Literal escaping

use quill_ir::Value;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Driver-specific literal escaping; every literal reaching the SQL text
/// passes through `escape_literal` exactly once
pub trait LiteralEscaper: Send + Sync {
    fn escape_literal(&self, value: &Value) -> String;
}

/// MySQL literal escaping
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlEscaper;

impl MySqlEscaper {
    pub fn escape_string(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 2);
        out.push('\'');
        for c in text.chars() {
            match c {
                '\0' => out.push_str("\\0"),
                '\u{8}' => out.push_str("\\b"),
                '\t' => out.push_str("\\t"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\u{1a}' => out.push_str("\\Z"),
                '"' => out.push_str("\\\""),
                '\'' => out.push_str("\\'"),
                '\\' => out.push_str("\\\\"),
                other => out.push(other),
            }
        }
        out.push('\'');
        out
    }
}

impl LiteralEscaper for MySqlEscaper {
    fn escape_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.is_finite() => f.to_string(),
            Value::Float(_) => "NULL".to_string(),
            Value::String(s) => self.escape_string(s),
            Value::DateTime(dt) => format!("'{}'", dt.format(DATE_FORMAT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_escape_control_characters() {
        let escaped = MySqlEscaper.escape_literal(&Value::from("a'b\"c\\d\n\r\t\0\u{1a}\u{8}"));
        assert_eq!(escaped, r#"'a\'b\"c\\d\n\r\t\0\Z\b'"#);
    }

    #[test]
    fn test_escape_scalars() {
        assert_eq!(MySqlEscaper.escape_literal(&Value::Null), "NULL");
        assert_eq!(MySqlEscaper.escape_literal(&Value::Bool(true)), "true");
        assert_eq!(MySqlEscaper.escape_literal(&Value::Int(-4)), "-4");
        assert_eq!(MySqlEscaper.escape_literal(&Value::Float(2.5)), "2.5");
        assert_eq!(MySqlEscaper.escape_literal(&Value::Float(f64::NAN)), "NULL");
    }

    #[test]
    fn test_escape_date_time() {
        let dt = NaiveDate::from_ymd_opt(2015, 1, 2)
            .unwrap()
            .and_hms_milli_opt(3, 4, 5, 60)
            .unwrap();
        assert_eq!(
            MySqlEscaper.escape_literal(&Value::DateTime(dt)),
            "'2015-01-02 03:04:05.060'"
        );
    }
}
