//! Closure frontend for the Quill IR
//!
//! Parses a function literal such as `x => x.price > 100 && x.active == true`
//! and lowers its body into a [`quill_ir::Filter`]. Member and method names
//! pass through a [`ClosureResolver`], so callers can map closure names onto
//! their schema or translate host-language methods into query functions.

pub mod ast;
mod error;
pub mod expressions;
mod parser;

pub use ast::{Closure, Node};
pub use error::{ClosureError, ClosureResult};
pub use expressions::{Expression, ExpressionError, Operators};
pub use parser::{parse_closure, ClosureGrammar, Rule};

use quill_ir::{Filter, Value};
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use expressions::{
    create_arithmetic_expression, create_comparison_expression, create_literal_expression,
    create_logical_expression, create_member_expression, create_method_call_expression,
};

/// Name resolution hooks used while lowering
pub trait ClosureResolver {
    /// Maps a member name to a field name
    fn resolve_member(&self, member: &str) -> ClosureResult<String> {
        Ok(member.to_string())
    }

    /// Maps a member chain (relative to the closure parameter) to a field name.
    /// By default only the last property is resolved, so `x.customer.name`
    /// names the field `name`.
    fn resolve_path(&self, path: &[String]) -> ClosureResult<String> {
        match path.last() {
            Some(member) => self.resolve_member(member),
            None => Err(ClosureError::UnsupportedExpression("empty member path".to_string())),
        }
    }

    /// Translates a method call; `args` starts with the receiver when the
    /// call is made on a member. `None` means the method has no translation.
    fn resolve_method(&self, _name: &str, _args: &[Expression]) -> ClosureResult<Option<Expression>> {
        Ok(None)
    }
}

/// Identity member resolution, no method translation
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl ClosureResolver for IdentityResolver {}

/// Translates common string, date and math methods into registry functions
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardMethods;

impl StandardMethods {
    fn signature(name: &str) -> Option<(&'static str, usize, usize)> {
        let sig = match name {
            "startsWith" => ("startswith", 2, 2),
            "endsWith" => ("endswith", 2, 2),
            "includes" => ("contains", 2, 2),
            "indexOf" => ("indexof", 2, 2),
            "substr" | "substring" => ("substring", 2, 3),
            "toLowerCase" => ("tolower", 1, 1),
            "toUpperCase" => ("toupper", 1, 1),
            "trim" => ("trim", 1, 1),
            "concat" => ("concat", 2, 2),
            "getDate" => ("day", 1, 1),
            "getFullYear" => ("year", 1, 1),
            "getHours" => ("hour", 1, 1),
            "getMinutes" => ("minute", 1, 1),
            "getSeconds" => ("second", 1, 1),
            "Math.round" => ("round", 1, 2),
            "Math.floor" => ("floor", 1, 1),
            "Math.ceil" => ("ceiling", 1, 1),
            _ => return None,
        };
        Some(sig)
    }
}

impl ClosureResolver for StandardMethods {
    fn resolve_method(&self, name: &str, args: &[Expression]) -> ClosureResult<Option<Expression>> {
        let Some((function, min, max)) = Self::signature(name) else {
            return Ok(None);
        };
        if args.len() < min || args.len() > max {
            return Err(ClosureError::Resolve(format!(
                "method '{}' with {} arguments",
                name,
                args.len()
            )));
        }

        let mut args = args.to_vec();
        // substring(start, end) takes an end index, SUBSTRING a length
        if name == "substring" && args.len() == 3 {
            let length = match (&args[1], &args[2]) {
                (Expression::Literal(Value::Int(start)), Expression::Literal(Value::Int(end))) => end
                    .checked_sub(*start)
                    .ok_or_else(|| ClosureError::Resolve("substring bounds out of range".to_string()))?
                    .max(0),
                _ => {
                    return Err(ClosureError::Resolve(
                        "substring bounds must be integer literals".to_string(),
                    ))
                }
            };
            args[2] = create_literal_expression(length);
        }

        Ok(Some(create_method_call_expression(function, args)))
    }
}

/// Lowers closures into filters through a resolver
pub struct ClosureParser<'a> {
    resolver: &'a dyn ClosureResolver,
}

impl Default for ClosureParser<'static> {
    fn default() -> Self {
        Self::new(&IdentityResolver)
    }
}

impl<'a> ClosureParser<'a> {
    pub fn new(resolver: &'a dyn ClosureResolver) -> Self {
        Self { resolver }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn parse(&self, source: &str) -> ClosureResult<Filter> {
        let expression = self.parse_expression(source)?;
        let filter = expression.to_filter()?;
        debug!(?filter, "closure lowered");
        Ok(filter)
    }

    /// Lowers without projecting to a filter
    pub fn parse_expression(&self, source: &str) -> ClosureResult<Expression> {
        let closure = parse_closure(source)?;
        trace!(params = ?closure.params, "closure parsed");
        self.lower_closure(&closure)
    }

    pub fn lower_closure(&self, closure: &Closure) -> ClosureResult<Expression> {
        self.lower(&closure.body, &closure.params)
    }

    /// Lowers one AST node. With no parameters, identifiers name fields directly.
    pub fn lower(&self, node: &Node, params: &[String]) -> ClosureResult<Expression> {
        match node {
            Node::LogicalExpression {
                operator,
                left,
                right,
            } => {
                let (left, right) = match (left.as_deref(), right.as_deref()) {
                    (Some(left), Some(right)) => (left, right),
                    _ => {
                        return Err(ClosureError::MissingOperand(
                            "logical expression needs a left and a right operand".to_string(),
                        ))
                    }
                };
                let op = Operators::from_logical(operator).ok_or_else(|| {
                    ClosureError::InvalidOperator(format!("invalid logical operator '{}'", operator))
                })?;
                let left = self.lower(left, params)?;
                let right = self.lower(right, params)?;
                Ok(create_logical_expression(op, vec![left, right])?)
            }
            Node::BinaryExpression {
                operator,
                left,
                right,
            } => {
                let op = Operators::from_binary(operator).ok_or_else(|| {
                    ClosureError::InvalidOperator(format!("invalid binary operator '{}'", operator))
                })?;
                let (left, right) = match (left.as_deref(), right.as_deref()) {
                    (Some(left), Some(right)) => (left, right),
                    _ => {
                        return Err(ClosureError::MissingOperand(
                            "binary expression needs a left and a right operand".to_string(),
                        ))
                    }
                };
                let left = self.lower(left, params)?;
                let right = self.lower(right, params)?;
                if op.is_arithmetic() {
                    Ok(create_arithmetic_expression(left, op, right)?)
                } else if op.is_comparison() {
                    Ok(create_comparison_expression(left, op, right)?)
                } else {
                    Err(ClosureError::UnsupportedExpression(format!(
                        "binary expression with operator '{}'",
                        operator
                    )))
                }
            }
            Node::MemberExpression { .. } | Node::Identifier { .. } => {
                let path = member_path(node, params)?;
                let member = self.resolver.resolve_path(&path)?;
                trace!(?path, %member, "member resolved");
                Ok(create_member_expression(member))
            }
            Node::CallExpression { callee, arguments } => self.lower_call(callee, arguments, params),
            Node::Literal { value, .. } => literal(value),
            Node::UnaryExpression {
                operator, argument, ..
            } => match (operator.as_str(), argument.as_ref()) {
                ("-", Node::Literal { value, .. }) => match literal(value)? {
                    Expression::Literal(Value::Int(i)) => i
                        .checked_neg()
                        .map(create_literal_expression)
                        .ok_or_else(|| ClosureError::Resolve(format!("cannot negate {}", i))),
                    Expression::Literal(Value::Float(f)) => Ok(create_literal_expression(-f)),
                    _ => Err(ClosureError::UnsupportedExpression(
                        "negation of a non-numeric literal".to_string(),
                    )),
                },
                _ => Err(ClosureError::UnsupportedExpression(format!(
                    "unary '{}' is not yet implemented",
                    operator
                ))),
            },
        }
    }

    fn lower_call(&self, callee: &Node, arguments: &[Node], params: &[String]) -> ClosureResult<Expression> {
        let mut args = Vec::with_capacity(arguments.len() + 1);
        let name = match callee {
            Node::MemberExpression {
                object, property, ..
            } => {
                let method = property_name(property)?;
                match object.as_ref() {
                    // `Math.round(...)` style namespaces
                    Node::Identifier { name } if !params.is_empty() && !params.contains(name) => {
                        format!("{}.{}", name, method)
                    }
                    receiver => {
                        args.push(self.lower(receiver, params)?);
                        method
                    }
                }
            }
            Node::Identifier { name } => name.clone(),
            other => {
                return Err(ClosureError::UnsupportedExpression(format!(
                    "call on {}",
                    other.kind()
                )))
            }
        };

        for argument in arguments {
            args.push(self.lower(argument, params)?);
        }

        match self.resolver.resolve_method(&name, &args)? {
            Some(expression) => {
                trace!(%name, "method resolved");
                Ok(expression)
            }
            None => Err(ClosureError::UnsupportedExpression(format!(
                "method '{}' has no query translation",
                name
            ))),
        }
    }
}

fn property_name(property: &Node) -> ClosureResult<String> {
    match property {
        Node::Identifier { name } => Ok(name.clone()),
        Node::Literal {
            value: JsonValue::String(name),
            ..
        } => Ok(name.clone()),
        other => Err(ClosureError::UnsupportedExpression(format!(
            "invalid member expression with a {} property",
            other.kind()
        ))),
    }
}

/// Property names of a member chain, without the closure parameter
fn member_path(node: &Node, params: &[String]) -> ClosureResult<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = node;
    loop {
        match current {
            Node::MemberExpression {
                object, property, ..
            } => {
                segments.push(property_name(property)?);
                current = object;
            }
            Node::Identifier { name } if params.is_empty() => {
                segments.push(name.clone());
                break;
            }
            Node::Identifier { name } if params.contains(name) => break,
            Node::Identifier { name } => {
                return Err(ClosureError::Resolve(format!(
                    "'{}' is not a closure parameter",
                    name
                )))
            }
            other => {
                return Err(ClosureError::UnsupportedExpression(format!(
                    "member access on {}",
                    other.kind()
                )))
            }
        }
    }

    if segments.is_empty() {
        return Err(ClosureError::UnsupportedExpression(
            "closure parameter used as a value".to_string(),
        ));
    }
    segments.reverse();
    Ok(segments)
}

fn literal(value: &JsonValue) -> ClosureResult<Expression> {
    Value::from_json(value)
        .map(Expression::Literal)
        .map_err(|e| ClosureError::UnsupportedExpression(e.to_string()))
}

/// Parse with identity member resolution and no method translation
pub fn parse(source: &str) -> ClosureResult<Filter> {
    ClosureParser::default().parse(source)
}

pub fn parse_with(source: &str, resolver: &dyn ClosureResolver) -> ClosureResult<Filter> {
    ClosureParser::new(resolver).parse(source)
}
