//! Pest-based parser for closure source text

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use serde_json::Value as JsonValue;

use crate::ast::{Closure, Node};
use crate::error::{ClosureError, ClosureResult};

#[derive(Parser)]
#[grammar = "closure.pest"]
pub struct ClosureGrammar;

/// Parse closure source into its parameters and body expression
pub fn parse_closure(source: &str) -> ClosureResult<Closure> {
    let mut pairs = ClosureGrammar::parse(Rule::closure, source)?;
    let closure = pairs
        .next()
        .ok_or_else(|| ClosureError::Syntax("Empty input".to_string()))?;

    for pair in closure.into_inner() {
        match pair.as_rule() {
            Rule::function_closure | Rule::arrow_closure => return parse_function(pair),
            Rule::expr => {
                return Ok(Closure {
                    params: Vec::new(),
                    body: parse_expr(pair)?,
                })
            }
            _ => {}
        }
    }

    Err(ClosureError::Syntax("Missing closure body".to_string()))
}

fn next<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> ClosureResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| ClosureError::Syntax(format!("Missing {}", what)))
}

fn parse_function(pair: Pair<Rule>) -> ClosureResult<Closure> {
    let mut params = Vec::new();
    let mut body = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::params => {
                params = inner.into_inner().map(|p| p.as_str().to_string()).collect();
            }
            Rule::block => {
                let expr = inner.into_inner().find(|p| p.as_rule() == Rule::expr);
                body = expr.map(parse_expr).transpose()?;
            }
            Rule::expr => body = Some(parse_expr(inner)?),
            // keyword and function name
            _ => {}
        }
    }

    Ok(Closure {
        params,
        body: body.ok_or_else(|| ClosureError::Syntax("Missing closure body".to_string()))?,
    })
}

fn parse_expr(pair: Pair<Rule>) -> ClosureResult<Node> {
    match pair.as_rule() {
        Rule::expr => parse_expr(next(&mut pair.into_inner(), "expression")?),
        Rule::or_expr | Rule::and_expr => parse_chain(pair, Node::logical),
        Rule::eq_expr | Rule::rel_expr | Rule::add_expr | Rule::mul_expr => {
            parse_chain(pair, Node::binary)
        }
        Rule::unary_expr => parse_unary(pair),
        Rule::postfix_expr => parse_postfix(pair),
        Rule::number => parse_number(pair),
        Rule::string => parse_string(pair),
        Rule::bool_lit => Ok(Node::Literal {
            value: JsonValue::Bool(pair.as_str() == "true"),
            raw: pair.as_str().to_string(),
        }),
        Rule::null_lit => Ok(Node::Literal {
            value: JsonValue::Null,
            raw: pair.as_str().to_string(),
        }),
        Rule::ident => Ok(Node::identifier(pair.as_str())),
        rule => Err(ClosureError::Syntax(format!("Unexpected {:?}", rule))),
    }
}

/// Left-associative `operand (op operand)*`
fn parse_chain(pair: Pair<Rule>, build: fn(&str, Node, Node) -> Node) -> ClosureResult<Node> {
    let mut inner = pair.into_inner();
    let mut left = parse_expr(next(&mut inner, "operand")?)?;

    while let Some(op) = inner.next() {
        let right = parse_expr(next(&mut inner, "right operand")?)?;
        left = build(op.as_str(), left, right);
    }

    Ok(left)
}

fn parse_unary(pair: Pair<Rule>) -> ClosureResult<Node> {
    let mut ops = Vec::new();
    let mut operand = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::unary_op => ops.push(inner.as_str().to_string()),
            _ => operand = Some(parse_expr(inner)?),
        }
    }

    let mut node = operand.ok_or_else(|| ClosureError::Syntax("Missing operand".to_string()))?;
    for operator in ops.into_iter().rev() {
        node = Node::UnaryExpression {
            operator,
            argument: Box::new(node),
            prefix: true,
        };
    }
    Ok(node)
}

fn parse_postfix(pair: Pair<Rule>) -> ClosureResult<Node> {
    let mut inner = pair.into_inner();
    let mut node = parse_expr(next(&mut inner, "operand")?)?;

    for suffix in inner {
        node = match suffix.as_rule() {
            Rule::member => {
                let property = next(&mut suffix.into_inner(), "member name")?;
                Node::member(node, property.as_str())
            }
            Rule::call => Node::CallExpression {
                callee: Box::new(node),
                arguments: suffix
                    .into_inner()
                    .map(parse_expr)
                    .collect::<ClosureResult<_>>()?,
            },
            rule => return Err(ClosureError::Syntax(format!("Unexpected {:?}", rule))),
        };
    }

    Ok(node)
}

fn parse_number(pair: Pair<Rule>) -> ClosureResult<Node> {
    let raw = pair.as_str();
    let value = match raw.parse::<i64>() {
        Ok(i) => JsonValue::from(i),
        Err(_) => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .ok_or_else(|| ClosureError::Syntax(format!("Invalid number '{}'", raw)))?,
    };
    Ok(Node::Literal {
        value,
        raw: raw.to_string(),
    })
}

fn parse_string(pair: Pair<Rule>) -> ClosureResult<Node> {
    let raw = pair.as_str().to_string();
    let body = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
    Ok(Node::Literal {
        value: JsonValue::String(unescape(body)),
        raw,
    })
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn x(property: &str) -> Node {
        Node::member(Node::identifier("x"), property)
    }

    #[test]
    fn test_parse_arrow_function() {
        let closure = parse_closure("x => x.price > 100").unwrap();
        assert_eq!(closure.params, vec!["x"]);
        assert_eq!(closure.body, Node::binary(">", x("price"), Node::literal(100)));
    }

    #[test]
    fn test_closure_forms_agree() {
        let expected = parse_closure("x => x.a == 1").unwrap();
        for source in [
            "function (x) { return x.a == 1; }",
            "function filter(x){return x.a == 1}",
            "(x) => { return x.a == 1; }",
            "(x) => x.a == 1;",
            "x => /* comment */ x.a == 1 // trailing",
        ] {
            assert_eq!(parse_closure(source).unwrap(), expected, "{}", source);
        }
    }

    #[test]
    fn test_bare_expression_has_no_params() {
        let closure = parse_closure("price >= 10").unwrap();
        assert!(closure.params.is_empty());
        assert_eq!(
            closure.body,
            Node::binary(">=", Node::identifier("price"), Node::literal(10))
        );
    }

    #[test]
    fn test_precedence() {
        let closure = parse_closure("x => x.a + x.b * 2 > 3 || x.c == 1 && x.d != 2").unwrap();
        let sum = Node::binary("+", x("a"), Node::binary("*", x("b"), Node::literal(2)));
        let expected = Node::logical(
            "||",
            Node::binary(">", sum, Node::literal(3)),
            Node::logical(
                "&&",
                Node::binary("==", x("c"), Node::literal(1)),
                Node::binary("!=", x("d"), Node::literal(2)),
            ),
        );
        assert_eq!(closure.body, expected);
    }

    #[test]
    fn test_strict_operators() {
        let closure = parse_closure("x => x.a === 1").unwrap();
        assert!(matches!(closure.body, Node::BinaryExpression { ref operator, .. } if operator == "==="));
        let closure = parse_closure("x => x.a !== 1").unwrap();
        assert!(matches!(closure.body, Node::BinaryExpression { ref operator, .. } if operator == "!=="));
    }

    #[test]
    fn test_method_call_chain() {
        let closure = parse_closure("x => x.name.startsWith('Mu')").unwrap();
        let expected = Node::CallExpression {
            callee: Box::new(Node::member(x("name"), "startsWith")),
            arguments: vec![Node::Literal {
                value: JsonValue::from("Mu"),
                raw: "'Mu'".to_string(),
            }],
        };
        assert_eq!(closure.body, expected);
    }

    #[test]
    fn test_literals() {
        let closure = parse_closure(r#"x => x.a == "say \"hi\"\n""#).unwrap();
        match closure.body {
            Node::BinaryExpression { right: Some(right), .. } => match *right {
                Node::Literal { value, .. } => assert_eq!(value, JsonValue::from("say \"hi\"\n")),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }

        let closure = parse_closure("x => x.a == 2.5").unwrap();
        assert_eq!(closure.body, Node::binary("==", x("a"), Node::literal(2.5)));

        let closure = parse_closure("x => x.a == null").unwrap();
        assert_eq!(
            closure.body,
            Node::binary(
                "==",
                x("a"),
                Node::Literal {
                    value: JsonValue::Null,
                    raw: "null".to_string()
                }
            )
        );
    }

    #[test]
    fn test_unary_operators() {
        let closure = parse_closure("x => x.a > -5").unwrap();
        let negative = Node::UnaryExpression {
            operator: "-".to_string(),
            argument: Box::new(Node::literal(5)),
            prefix: true,
        };
        assert_eq!(closure.body, Node::binary(">", x("a"), negative));
    }

    #[test]
    fn test_keyword_prefixed_identifiers() {
        let closure = parse_closure("x => x.returnDate == x.nullable").unwrap();
        assert_eq!(closure.body, Node::binary("==", x("returnDate"), x("nullable")));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            parse_closure("x => x.a >"),
            Err(ClosureError::Pest(_))
        ));
        assert!(matches!(parse_closure(""), Err(ClosureError::Pest(_))));
    }
}
