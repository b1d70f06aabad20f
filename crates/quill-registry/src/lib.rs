//! Function operator registry
//!
//! Maps the names used in function filters and computed fields (`$startswith`,
//! `$add`, `$month`, ...) to renderers producing SQL fragments. Renderers
//! receive arguments that were already escaped by the formatter; they never
//! see raw literals.

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Invalid argument for function {func}: {reason}")]
    InvalidArgument { func: String, reason: String },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// One escaped argument
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionArg {
    /// SQL fragment, `NULL` for null literals
    pub sql: String,
    /// Text that may be embedded in a quoted pattern; only scalar literals have one
    pattern: Option<String>,
    pub is_null: bool,
    /// Integer value when the argument is an integer literal
    pub int: Option<i64>,
}

impl FunctionArg {
    /// An argument that is not a literal (identifier, list, sub-query, expression)
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            pattern: None,
            is_null: false,
            int: None,
        }
    }

    pub fn null() -> Self {
        Self {
            is_null: true,
            ..Self::raw("NULL")
        }
    }

    /// An unquoted scalar literal such as a number or a boolean
    pub fn scalar(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self {
            pattern: Some(sql.clone()),
            ..Self::raw(sql)
        }
    }

    pub fn int(value: i64) -> Self {
        Self {
            int: Some(value),
            ..Self::scalar(value.to_string())
        }
    }

    /// A quoted literal; its pattern body is the text between the quotes
    pub fn quoted(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let pattern = sql
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .map(str::to_string);
        Self {
            pattern,
            ..Self::raw(sql)
        }
    }

    /// Escaped body for a regular expression, `None` unless this is a scalar literal
    pub fn pattern_body(&self) -> Option<&str> {
        self.pattern.as_deref()
    }
}

pub type Renderer = fn(&str, &[FunctionArg]) -> RegistryResult<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    Pattern,
    String,
    Date,
    Math,
    Arithmetic,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSignature {
    pub name: String,
    pub kind: FunctionKind,
    /// Maximum argument count, the field itself included
    pub max_args: usize,
    pub sql: String, // rendering template shown in listings
    #[serde(skip)]
    pub renderer: Renderer,
}

pub struct FunctionRegistry {
    functions: HashMap<String, FunctionSignature>,
    version: String,
}

fn present(args: &[FunctionArg], index: usize) -> Option<&FunctionArg> {
    args.get(index).filter(|arg| !arg.is_null)
}

fn sql_at(args: &[FunctionArg], index: usize) -> &str {
    args.get(index).map(|arg| arg.sql.as_str()).unwrap_or("NULL")
}

fn pattern<'a>(name: &str, arg: &'a FunctionArg) -> RegistryResult<&'a str> {
    arg.pattern_body().ok_or_else(|| RegistryError::InvalidArgument {
        func: name.to_string(),
        reason: format!("pattern must be a scalar literal, got {}", arg.sql),
    })
}

fn render_startswith(name: &str, args: &[FunctionArg]) -> RegistryResult<String> {
    Ok(match (present(args, 0), present(args, 1)) {
        (Some(a), Some(b)) => format!("({} REGEXP '^{}')", a.sql, pattern(name, b)?),
        _ => String::new(),
    })
}

fn render_endswith(name: &str, args: &[FunctionArg]) -> RegistryResult<String> {
    Ok(match (present(args, 0), present(args, 1)) {
        (Some(a), Some(b)) => format!("({} REGEXP '{}$')", a.sql, pattern(name, b)?),
        _ => String::new(),
    })
}

fn render_contains(name: &str, args: &[FunctionArg]) -> RegistryResult<String> {
    Ok(match (present(args, 0), present(args, 1)) {
        (Some(a), Some(b)) => match pattern(name, b)? {
            "" => String::new(),
            body => format!("({} REGEXP '{}')", a.sql, body),
        },
        _ => String::new(),
    })
}

fn render_unary(name: &str, args: &[FunctionArg]) -> RegistryResult<String> {
    let func = match name {
        "length" => "LENGTH",
        "trim" => "TRIM",
        "tolower" => "LOWER",
        "toupper" => "UPPER",
        "day" => "DAY",
        "month" => "MONTH",
        "year" => "YEAR",
        "hour" => "HOUR",
        "minute" => "MINUTE",
        "second" => "SECOND",
        "date" => "DATE",
        "floor" => "FLOOR",
        "ceiling" => "CEILING",
        other => return Err(RegistryError::FunctionNotFound(other.to_string())),
    };
    Ok(format!("{}({})", func, sql_at(args, 0)))
}

fn render_concat(_: &str, args: &[FunctionArg]) -> RegistryResult<String> {
    Ok(format!("CONCAT({},{})", sql_at(args, 0), sql_at(args, 1)))
}

fn render_indexof(_: &str, args: &[FunctionArg]) -> RegistryResult<String> {
    Ok(format!("LOCATE({},{})", sql_at(args, 1), sql_at(args, 0)))
}

fn render_substring(name: &str, args: &[FunctionArg]) -> RegistryResult<String> {
    let invalid = |reason: &str| RegistryError::InvalidArgument {
        func: name.to_string(),
        reason: reason.to_string(),
    };
    let pos = present(args, 1)
        .and_then(|arg| arg.int)
        .ok_or_else(|| invalid("start position must be an integer"))?
        .checked_add(1)
        .ok_or_else(|| invalid("start position out of range"))?;
    match present(args, 2) {
        Some(length) => match length.int.ok_or_else(|| invalid("length must be an integer"))? {
            0 => Ok(format!("SUBSTRING({},{})", sql_at(args, 0), pos)),
            length => Ok(format!("SUBSTRING({},{},{})", sql_at(args, 0), pos, length)),
        },
        None => Ok(format!("SUBSTRING({},{})", sql_at(args, 0), pos)),
    }
}

fn render_round(_: &str, args: &[FunctionArg]) -> RegistryResult<String> {
    let digits = present(args, 1).map(|arg| arg.sql.as_str()).unwrap_or("0");
    Ok(format!("ROUND({},{})", sql_at(args, 0), digits))
}

fn render_arithmetic(name: &str, args: &[FunctionArg]) -> RegistryResult<String> {
    let op = match name {
        "add" => "+",
        "sub" => "-",
        "mul" => "*",
        "div" => "/",
        "mod" => "%",
        "bit" => "&",
        other => return Err(RegistryError::FunctionNotFound(other.to_string())),
    };
    Ok(match (present(args, 0), present(args, 1)) {
        (Some(a), Some(b)) => format!("({} {} {})", a.sql, op, b.sql),
        _ => "0".to_string(),
    })
}

impl FunctionRegistry {
    pub fn new(version: impl Into<String>) -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
            version: version.into(),
        };
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        // Regular expression tests
        for (name, sql, renderer) in [
            ("startswith", "(a REGEXP '^b')", render_startswith as Renderer),
            ("endswith", "(a REGEXP 'b$')", render_endswith),
            ("contains", "(a REGEXP 'b')", render_contains),
        ] {
            self.register(FunctionSignature {
                name: name.to_string(),
                kind: FunctionKind::Pattern,
                max_args: 2,
                sql: sql.to_string(),
                renderer,
            });
        }

        for (name, sql) in [
            ("length", "LENGTH(a)"),
            ("trim", "TRIM(a)"),
            ("tolower", "LOWER(a)"),
            ("toupper", "UPPER(a)"),
        ] {
            self.register(FunctionSignature {
                name: name.to_string(),
                kind: FunctionKind::String,
                max_args: 1,
                sql: sql.to_string(),
                renderer: render_unary,
            });
        }

        for (name, sql, max_args, renderer) in [
            ("concat", "CONCAT(a,b)", 2, render_concat as Renderer),
            ("indexof", "LOCATE(b,a)", 2, render_indexof),
            ("substring", "SUBSTRING(a,pos+1[,len])", 3, render_substring),
        ] {
            self.register(FunctionSignature {
                name: name.to_string(),
                kind: FunctionKind::String,
                max_args,
                sql: sql.to_string(),
                renderer,
            });
        }

        // Date parts
        for name in ["day", "month", "year", "hour", "minute", "second", "date"] {
            self.register(FunctionSignature {
                name: name.to_string(),
                kind: FunctionKind::Date,
                max_args: 1,
                sql: format!("{}(a)", name.to_uppercase()),
                renderer: render_unary,
            });
        }

        for (name, sql, max_args, renderer) in [
            ("floor", "FLOOR(a)", 1, render_unary as Renderer),
            ("ceiling", "CEILING(a)", 1, render_unary),
            ("round", "ROUND(a,b)", 2, render_round),
        ] {
            self.register(FunctionSignature {
                name: name.to_string(),
                kind: FunctionKind::Math,
                max_args,
                sql: sql.to_string(),
                renderer,
            });
        }

        // Binary operators; a missing operand renders the neutral `0`
        for (name, op) in [
            ("add", "+"),
            ("sub", "-"),
            ("mul", "*"),
            ("div", "/"),
            ("mod", "%"),
            ("bit", "&"),
        ] {
            self.register(FunctionSignature {
                name: name.to_string(),
                kind: FunctionKind::Arithmetic,
                max_args: 2,
                sql: format!("(a {} b)", op),
                renderer: render_arithmetic,
            });
        }
    }

    /// Adds or replaces a function
    pub fn register(&mut self, sig: FunctionSignature) {
        self.functions.insert(sig.name.clone(), sig);
    }

    pub fn lookup(&self, name: &str) -> Result<&FunctionSignature, RegistryError> {
        self.functions
            .get(name)
            .ok_or_else(|| RegistryError::FunctionNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Renders `name` over escaped arguments; the first argument is the field
    pub fn render(&self, name: &str, args: &[FunctionArg]) -> RegistryResult<String> {
        let sig = self.lookup(name)?;
        if args.len() > sig.max_args {
            return Err(RegistryError::InvalidArgument {
                func: name.to_string(),
                reason: format!("expected at most {} arguments, got {}", sig.max_args, args.len()),
            });
        }
        let sql = (sig.renderer)(name, args)?;
        tracing::trace!(function = name, %sql, "rendered function");
        Ok(sql)
    }

    /// Registered signatures sorted by name
    pub fn signatures(&self) -> Vec<&FunctionSignature> {
        let mut sigs: Vec<_> = self.functions.values().collect();
        sigs.sort_by(|a, b| a.name.cmp(&b.name));
        sigs
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new("0.1.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> FunctionArg {
        FunctionArg::raw(name)
    }

    #[test]
    fn test_pattern_functions() {
        let registry = FunctionRegistry::default();
        let args = [field("lastName"), FunctionArg::quoted("'Mu'")];

        assert_eq!(
            registry.render("startswith", &args).unwrap(),
            "(lastName REGEXP '^Mu')"
        );
        assert_eq!(
            registry.render("endswith", &args).unwrap(),
            "(lastName REGEXP 'Mu$')"
        );
        assert_eq!(
            registry.render("contains", &args).unwrap(),
            "(lastName REGEXP 'Mu')"
        );
    }

    #[test]
    fn test_pattern_neutral_rendering() {
        let registry = FunctionRegistry::default();
        assert_eq!(registry.render("startswith", &[field("a")]).unwrap(), "");
        assert_eq!(
            registry
                .render("endswith", &[field("a"), FunctionArg::null()])
                .unwrap(),
            ""
        );
        assert_eq!(
            registry
                .render("contains", &[field("a"), FunctionArg::quoted("''")])
                .unwrap(),
            ""
        );
    }

    #[test]
    fn test_arithmetic_and_missing_operand() {
        let registry = FunctionRegistry::default();
        assert_eq!(
            registry.render("add", &[field("Price"), FunctionArg::int(5)]).unwrap(),
            "(Price + 5)"
        );
        assert_eq!(
            registry.render("bit", &[field("flags"), FunctionArg::int(4)]).unwrap(),
            "(flags & 4)"
        );
        assert_eq!(registry.render("mod", &[field("id")]).unwrap(), "0");
    }

    #[test]
    fn test_string_functions() {
        let registry = FunctionRegistry::default();
        assert_eq!(registry.render("length", &[field("name")]).unwrap(), "LENGTH(name)");
        assert_eq!(registry.render("tolower", &[field("name")]).unwrap(), "LOWER(name)");
        assert_eq!(
            registry
                .render("indexof", &[field("name"), FunctionArg::quoted("'x'")])
                .unwrap(),
            "LOCATE('x',name)"
        );
        assert_eq!(
            registry
                .render("substring", &[field("name"), FunctionArg::int(1), FunctionArg::int(3)])
                .unwrap(),
            "SUBSTRING(name,2,3)"
        );
        assert_eq!(
            registry
                .render("round", &[field("price")])
                .unwrap(),
            "ROUND(price,0)"
        );
    }

    #[test]
    fn test_substring_requires_integer_position() {
        let registry = FunctionRegistry::default();
        let err = registry
            .render("substring", &[field("name"), FunctionArg::quoted("'a'")])
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument { .. }));
    }

    #[test]
    fn test_substring_position_overflow() {
        let registry = FunctionRegistry::default();
        let err = registry
            .render("substring", &[field("title"), FunctionArg::int(i64::MAX)])
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument { .. }));
    }

    #[test]
    fn test_pattern_requires_literal() {
        let registry = FunctionRegistry::default();
        for name in ["startswith", "endswith", "contains"] {
            let err = registry
                .render(name, &[field("name"), FunctionArg::raw("'a', ') OR 1=1 OR ('")])
                .unwrap_err();
            assert!(matches!(err, RegistryError::InvalidArgument { .. }), "{}", name);
        }
        assert_eq!(
            registry
                .render("startswith", &[field("code"), FunctionArg::int(42)])
                .unwrap(),
            "(code REGEXP '^42')"
        );
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::default();
        assert_eq!(
            registry.render("soundex", &[field("a")]).unwrap_err(),
            RegistryError::FunctionNotFound("soundex".into())
        );
    }

    #[test]
    fn test_too_many_arguments() {
        let registry = FunctionRegistry::default();
        let err = registry
            .render("month", &[field("a"), field("b")])
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidArgument { .. }));
    }

    #[test]
    fn test_signatures_serialize_without_renderer() {
        let registry = FunctionRegistry::default();
        let sig = registry.lookup("month").unwrap();
        let json = serde_json::to_value(sig).unwrap();
        assert_eq!(json["kind"], "date");
        assert_eq!(json["sql"], "MONTH(a)");
        assert!(json.get("renderer").is_none());
    }
}
