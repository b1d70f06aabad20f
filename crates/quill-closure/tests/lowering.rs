//! Closures lowered to filters and rendered as SQL

use pretty_assertions::assert_eq;
use quill_closure::{
    parse, parse_with, ClosureError, ClosureParser, ClosureResolver, ClosureResult, Node,
    StandardMethods,
};
use quill_ir::{query, Comparison, ComparisonOp, Filter, Operand};
use quill_sql::SqlFormatter;
use serde_json::json;

fn sql(filter: &Filter) -> String {
    SqlFormatter::default().format_where(filter).unwrap()
}

fn standard(source: &str) -> Filter {
    parse_with(source, &StandardMethods).unwrap()
}

#[test]
fn test_price_and_active_scenario() {
    let filter = parse("x => x.price > 100 && x.active == true").unwrap();
    assert_eq!(
        filter.to_json(),
        json!({"$and": [{"price": {"$gt": 100}}, {"active": {"$eq": true}}]})
    );
    assert_eq!(sql(&filter), "((price>100) AND (active=true))");
}

#[test]
fn test_logical_nesting_follows_source() {
    let filter = parse("function (c) { return c.a == 1 || c.b == 2 && c.c == 3; }").unwrap();
    assert_eq!(sql(&filter), "((a=1) OR ((b=2) AND (c=3)))");

    let filter = parse("c => (c.a == 1 || c.b == 2) && c.c == 3").unwrap();
    assert_eq!(sql(&filter), "(((a=1) OR (b=2)) AND (c=3))");
}

#[test]
fn test_comparison_operators() {
    assert_eq!(sql(&parse("x => x.a === 'b'").unwrap()), "(a='b')");
    assert_eq!(sql(&parse("x => x.a !== null").unwrap()), "(NOT a IS NULL)");
    assert_eq!(sql(&parse("x => x.a == null").unwrap()), "(a IS NULL)");
    assert_eq!(sql(&parse("x => x.a >= 2").unwrap()), "(a>=2)");
    assert_eq!(sql(&parse("x => 2 >= x.a").unwrap()), "(a<=2)");
}

#[test]
fn test_arithmetic_comparison() {
    let filter = parse("x => x.price + 5 > 100").unwrap();
    assert_eq!(
        filter.to_json(),
        json!({"price": {"$add": [5, {"$gt": 100}]}})
    );
    assert_eq!(sql(&filter), "((price + 5)>100)");

    let filter = parse("x => x.qty % 2 == 0").unwrap();
    assert_eq!(sql(&filter), "((qty % 2)=0)");
}

#[test]
fn test_standard_string_methods() {
    let filter = standard("x => x.name.startsWith('Mu')");
    assert_eq!(filter.to_json(), json!({"name": {"$startswith": ["Mu", true]}}));
    assert_eq!(sql(&filter), "((name REGEXP '^Mu')=true)");

    assert_eq!(
        sql(&standard("x => x.name.toLowerCase() == 'ann'")),
        "(LOWER(name)='ann')"
    );
    assert_eq!(
        sql(&standard("x => x.name.indexOf('a') >= 0")),
        "(LOCATE('a',name)>=0)"
    );
    assert_eq!(
        sql(&standard("x => x.title.substring(1, 4) == 'abc'")),
        "(SUBSTRING(title,2,3)='abc')"
    );
    assert_eq!(
        sql(&standard("x => x.code.endsWith('x') == false")),
        "((code REGEXP 'x$')=false)"
    );
}

#[test]
fn test_standard_date_and_math_methods() {
    assert_eq!(
        sql(&standard("x => x.orderDate.getFullYear() == 2020")),
        "(YEAR(orderDate)=2020)"
    );
    assert_eq!(
        sql(&standard("x => Math.floor(x.price) < 10")),
        "(FLOOR(price)<10)"
    );
}

#[test]
fn test_methods_need_a_resolver() {
    let err = parse("x => x.name.startsWith('Mu')").unwrap_err();
    assert!(matches!(err, ClosureError::UnsupportedExpression(_)), "{}", err);

    let err = parse_with("x => x.name.localeCompare('b') == 0", &StandardMethods).unwrap_err();
    assert!(matches!(err, ClosureError::UnsupportedExpression(_)), "{}", err);
}

struct Schema;

impl ClosureResolver for Schema {
    fn resolve_member(&self, member: &str) -> ClosureResult<String> {
        match member {
            "price" => Ok("UnitPrice".to_string()),
            "category" => Ok("categories.name".to_string()),
            other => Err(ClosureError::Resolve(format!("unknown attribute '{}'", other))),
        }
    }
}

#[test]
fn test_custom_member_resolution() {
    let filter = parse_with("p => p.price < 20 && p.category == 'tea'", &Schema).unwrap();
    assert_eq!(
        filter,
        Filter::and(vec![
            Filter::compare("UnitPrice", ComparisonOp::Lt, 20),
            Filter::eq("categories.name", "tea"),
        ])
    );

    let err = parse_with("p => p.weight > 1", &Schema).unwrap_err();
    assert!(matches!(err, ClosureError::Resolve(_)));
}

struct Qualified;

impl ClosureResolver for Qualified {
    fn resolve_path(&self, path: &[String]) -> ClosureResult<String> {
        Ok(path.join("."))
    }
}

#[test]
fn test_member_paths() {
    let closure = "x => x.customer.name == 'ann'";
    assert_eq!(parse(closure).unwrap(), Filter::eq("name", "ann"));
    assert_eq!(
        parse_with(closure, &Qualified).unwrap(),
        Filter::eq("customer.name", "ann")
    );
    assert_eq!(sql(&parse_with(closure, &Qualified).unwrap()), "(customer.name='ann')");
}

#[test]
fn test_filter_drives_a_select() {
    let filter = parse("o => o.total >= 100").unwrap();
    let mut q = query("orders");
    q.select(["id", "total"]);
    q.filter = Some(filter);
    assert_eq!(
        quill_sql::format(&q).unwrap(),
        "SELECT id, total FROM orders WHERE (total>=100)"
    );
}

#[test]
fn test_lowering_a_deserialized_tree() {
    let node: Node = serde_json::from_value(json!({
        "type": "BinaryExpression",
        "operator": "<",
        "left": {
            "type": "MemberExpression",
            "computed": false,
            "object": {"type": "Identifier", "name": "x"},
            "property": {"type": "Identifier", "name": "stock"}
        },
        "right": {"type": "Literal", "value": 5, "raw": "5"}
    }))
    .unwrap();

    let parser = ClosureParser::default();
    let expression = parser.lower(&node, &["x".to_string()]).unwrap();
    assert_eq!(
        expression.to_filter().unwrap(),
        Filter::compare("stock", ComparisonOp::Lt, 5)
    );
}

#[test]
fn test_missing_operand() {
    let node: Node = serde_json::from_value(json!({
        "type": "LogicalExpression",
        "operator": "||",
        "left": {"type": "Literal", "value": true, "raw": "true"}
    }))
    .unwrap();
    let err = ClosureParser::default().lower(&node, &[]).unwrap_err();
    assert!(matches!(err, ClosureError::MissingOperand(_)));
}

#[test]
fn test_invalid_binary_operator() {
    let node = Node::binary("&", Node::identifier("a"), Node::literal(1));
    let err = ClosureParser::default().lower(&node, &[]).unwrap_err();
    assert!(matches!(err, ClosureError::InvalidOperator(_)));
}

#[test]
fn test_unsupported_shapes() {
    for source in ["x => !x.active", "x => x.price", "x => 1 == 2", "x => x.a + 1"] {
        let err = parse(source).unwrap_err();
        assert!(
            matches!(
                err,
                ClosureError::UnsupportedExpression(_) | ClosureError::Expression(_)
            ),
            "{}: {:?}",
            source,
            err
        );
    }
}

#[test]
fn test_function_filter_shape() {
    let filter = standard("x => x.name.includes('an')");
    assert_eq!(
        filter,
        Filter::function(
            "name",
            "contains",
            vec![Operand::from("an")],
            vec![Comparison::eq(true)]
        )
    );
}
