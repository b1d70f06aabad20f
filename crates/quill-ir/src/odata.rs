//! OData query option builder
//!
//! Builds `$filter`, `$select`, `$orderby`, `$top` and `$skip` text for a
//! remote OData service instead of an IR tree. Filter terms accumulate the
//! way [`QueryExpression`](crate::QueryExpression) filters do: a run of the
//! same connector stays flat, a change of connector wraps what came before.
//!
//! ```
//! use quill_ir::odata::{self, ODataQuery};
//!
//! let mut q = ODataQuery::new();
//! q.where_("Price").greater_than(10).and(odata::to_lower("Name")).equal("tea");
//! assert_eq!(q.to_string(), "$filter=Price gt 10 and tolower(Name) eq 'tea'");
//! ```

use std::fmt;

use serde::Serialize;

use crate::{LogicalOp, Value};

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// OData literal: strings are single-quoted with quotes doubled
pub fn escape(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Float(_) => "null".to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::DateTime(dt) => format!("datetime'{}'", dt.format(DATE_FORMAT)),
    }
}

fn keyword(op: LogicalOp) -> &'static str {
    match op {
        LogicalOp::And => "and",
        LogicalOp::Or => "or",
    }
}

pub fn index_of(name: &str) -> String {
    format!("indexof({})", name)
}

pub fn starts_with(name: &str, s: impl Into<Value>) -> String {
    format!("startswith({},{})", name, escape(&s.into()))
}

pub fn ends_with(name: &str, s: impl Into<Value>) -> String {
    format!("endswith({},{})", name, escape(&s.into()))
}

pub fn substring_of(name: &str, s: impl Into<Value>) -> String {
    format!("substringof({},{})", name, escape(&s.into()))
}

pub fn substring(name: &str, pos: u32, length: u32) -> String {
    format!("substring({},{},{})", name, pos, length)
}

/// `concat(...)` over escaped literals
pub fn concat<I, V>(values: I) -> String
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    let values: Vec<String> = values.into_iter().map(|v| escape(&v.into())).collect();
    format!("concat({})", values.join(","))
}

macro_rules! unary_functions {
    ($($name:ident => $func:literal),* $(,)?) => {$(
        pub fn $name(name: &str) -> String {
            format!(concat!($func, "({})"), name)
        }
    )*};
}

unary_functions! {
    length => "length",
    to_lower => "tolower",
    to_upper => "toupper",
    trim => "trim",
    day => "day",
    month => "month",
    year => "year",
    hour => "hour",
    minute => "minute",
    second => "second",
    round => "round",
    floor => "floor",
    ceiling => "ceiling",
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Pending {
    left: Option<String>,
    connector: Option<LogicalOp>,
    /// Connector of the last appended term
    last: Option<LogicalOp>,
}

/// OData system query options
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ODataQuery {
    /// Target model, kept out of the query options
    #[serde(rename = "$model", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "$filter", skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(rename = "$select", skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(rename = "$orderby", skip_serializing_if = "Option::is_none")]
    pub orderby: Option<String>,
    #[serde(rename = "$top", skip_serializing_if = "Option::is_none")]
    pub top: Option<u64>,
    #[serde(rename = "$skip", skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(skip)]
    pending: Pending,
}

impl ODataQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&mut self, name: impl Into<String>) -> &mut Self {
        self.model = Some(name.into());
        self
    }

    /// Sets the left side of the next term: a property or a function expression
    pub fn where_(&mut self, left: impl Into<String>) -> &mut Self {
        self.pending.left = Some(left.into());
        self
    }

    pub fn and(&mut self, left: impl Into<String>) -> &mut Self {
        self.pending.connector = Some(LogicalOp::And);
        self.where_(left)
    }

    pub fn or(&mut self, left: impl Into<String>) -> &mut Self {
        self.pending.connector = Some(LogicalOp::Or);
        self.where_(left)
    }

    fn append(&mut self, build: impl FnOnce(&str) -> Option<String>) -> &mut Self {
        let pending = std::mem::take(&mut self.pending.left);
        let connector = self.pending.connector.take().unwrap_or(LogicalOp::And);
        let Some(left) = pending else {
            tracing::warn!("OData comparison without a left operand ignored");
            return self;
        };
        let Some(expr) = build(&left) else {
            return self;
        };
        self.filter = Some(match self.filter.take() {
            None => expr,
            Some(filter) => {
                let same = self.pending.last.unwrap_or(connector) == connector;
                self.pending.last = Some(connector);
                if same {
                    format!("{} {} {}", filter, keyword(connector), expr)
                } else {
                    format!("({}) {} {}", filter, keyword(connector), expr)
                }
            }
        });
        self
    }

    fn compare(&mut self, op: &str, value: Value) -> &mut Self {
        self.append(|left| Some(format!("{} {} {}", left, op, escape(&value))))
    }

    pub fn equal(&mut self, value: impl Into<Value>) -> &mut Self {
        self.compare("eq", value.into())
    }

    pub fn not_equal(&mut self, value: impl Into<Value>) -> &mut Self {
        self.compare("ne", value.into())
    }

    pub fn greater_than(&mut self, value: impl Into<Value>) -> &mut Self {
        self.compare("gt", value.into())
    }

    pub fn greater_or_equal(&mut self, value: impl Into<Value>) -> &mut Self {
        self.compare("ge", value.into())
    }

    pub fn lower_than(&mut self, value: impl Into<Value>) -> &mut Self {
        self.compare("lt", value.into())
    }

    pub fn lower_or_equal(&mut self, value: impl Into<Value>) -> &mut Self {
        self.compare("le", value.into())
    }

    /// `(x eq a or x eq b)`; an empty list adds nothing
    pub fn is_in<I, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.append(|left| expand(left, "eq", " or ", &values))
    }

    /// `(x ne a and x ne b)`; an empty list adds nothing
    pub fn not_in<I, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.append(|left| expand(left, "ne", " and ", &values))
    }

    pub fn select<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields: Vec<String> = fields.into_iter().map(|f| f.as_ref().to_string()).collect();
        self.select = Some(fields.join(","));
        self
    }

    pub fn take(&mut self, n: u64) -> &mut Self {
        self.top = Some(n);
        self
    }

    pub fn skip(&mut self, n: u64) -> &mut Self {
        self.skip = Some(n);
        self
    }

    /// Replaces the ordering
    pub fn order_by(&mut self, name: &str) -> &mut Self {
        self.orderby = Some(name.to_string());
        self
    }

    pub fn order_by_descending(&mut self, name: &str) -> &mut Self {
        self.orderby = Some(format!("{} desc", name));
        self
    }

    /// Appends to the ordering
    pub fn then_by(&mut self, name: &str) -> &mut Self {
        self.then(name.to_string())
    }

    pub fn then_by_descending(&mut self, name: &str) -> &mut Self {
        self.then(format!("{} desc", name))
    }

    fn then(&mut self, item: String) -> &mut Self {
        self.orderby = Some(match self.orderby.take() {
            Some(order) => format!("{},{}", order, item),
            None => item,
        });
        self
    }
}

fn expand(left: &str, op: &str, separator: &str, values: &[Value]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let terms: Vec<String> = values
        .iter()
        .map(|value| format!("{} {} {}", left, op, escape(value)))
        .collect();
    Some(format!("({})", terms.join(separator)))
}

/// Query options joined with `&`, unencoded
impl fmt::Display for ODataQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let options = [
            ("$filter", self.filter.clone()),
            ("$select", self.select.clone()),
            ("$orderby", self.orderby.clone()),
            ("$top", self.top.map(|n| n.to_string())),
            ("$skip", self.skip.map(|n| n.to_string())),
        ];
        let text: Vec<String> = options
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| format!("{}={}", key, value)))
            .collect();
        write!(f, "{}", text.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_same_connector_stays_flat() {
        let mut q = ODataQuery::new();
        q.where_("a").equal(1).and("b").equal(2).and("c").not_equal("x");
        assert_eq!(q.filter.as_deref(), Some("a eq 1 and b eq 2 and c ne 'x'"));
    }

    #[test]
    fn test_connector_change_wraps() {
        let mut q = ODataQuery::new();
        q.where_("a").equal(1).and("b").equal(2).or("c").equal(3);
        assert_eq!(q.filter.as_deref(), Some("(a eq 1 and b eq 2) or c eq 3"));

        q.or("d").lower_than(4).and("e").greater_or_equal(5);
        assert_eq!(
            q.filter.as_deref(),
            Some("((a eq 1 and b eq 2) or c eq 3 or d lt 4) and e ge 5")
        );
    }

    #[test]
    fn test_in_and_not_in_expand() {
        let mut q = ODataQuery::new();
        q.where_("id").is_in([1, 2, 3]).and("status").not_in(["closed", "void"]);
        assert_eq!(
            q.filter.as_deref(),
            Some("(id eq 1 or id eq 2 or id eq 3) and (status ne 'closed' and status ne 'void')")
        );

        let mut q = ODataQuery::new();
        q.where_("id").is_in(Vec::<i64>::new());
        assert_eq!(q.filter, None);
    }

    #[test]
    fn test_function_terms() {
        let mut q = ODataQuery::new();
        q.where_(index_of("Name"))
            .greater_than(0)
            .or(starts_with("Name", "O'B"))
            .equal(true)
            .or(substring("Code", 1, 2))
            .equal("ab")
            .or(concat(["a", "b"]))
            .equal("ab");
        assert_eq!(
            q.filter.as_deref(),
            Some(
                "indexof(Name) gt 0 or startswith(Name,'O''B') eq true \
                 or substring(Code,1,2) eq 'ab' or concat('a','b') eq 'ab'"
            )
        );
        assert_eq!(year("Created"), "year(Created)");
        assert_eq!(ceiling("Price"), "ceiling(Price)");
        assert_eq!(substring_of("Name", "x"), "substringof(Name,'x')");
    }

    #[test]
    fn test_comparison_without_left_is_ignored() {
        let mut q = ODataQuery::new();
        q.equal(1);
        assert_eq!(q.filter, None);
    }

    #[test]
    fn test_query_options() {
        let mut q = ODataQuery::new();
        q.model("Orders")
            .select(["id", "total"])
            .where_("total")
            .greater_than(100)
            .order_by_descending("total")
            .then_by("id")
            .take(25)
            .skip(50);
        assert_eq!(
            q.to_string(),
            "$filter=total gt 100&$select=id,total&$orderby=total desc,id&$top=25&$skip=50"
        );

        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["$model"], "Orders");
        assert_eq!(json["$top"], 25);
        assert!(json.get("pending").is_none());
    }

    #[test]
    fn test_then_by_without_order() {
        let mut q = ODataQuery::new();
        q.then_by_descending("created");
        assert_eq!(q.orderby.as_deref(), Some("created desc"));
    }
}
