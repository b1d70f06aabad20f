//! Intermediate closure expressions and their lowering to query filters

use quill_ir::{Comparison, ComparisonOp, Filter, LogicalOp, Operand, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operators {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
}

impl Operators {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Operators::Add | Operators::Sub | Operators::Mul | Operators::Div | Operators::Mod
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operators::Eq | Operators::Ne | Operators::Gt | Operators::Ge | Operators::Lt | Operators::Le
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Operators::And | Operators::Or)
    }

    /// Maps a binary operator token (`===`, `>=`, `%`, ...)
    pub fn from_binary(token: &str) -> Option<Self> {
        let op = match token {
            "===" | "==" => Operators::Eq,
            "!==" | "!=" => Operators::Ne,
            ">" => Operators::Gt,
            ">=" => Operators::Ge,
            "<" => Operators::Lt,
            "<=" => Operators::Le,
            "+" => Operators::Add,
            "-" => Operators::Sub,
            "*" => Operators::Mul,
            "/" => Operators::Div,
            "%" => Operators::Mod,
            _ => return None,
        };
        Some(op)
    }

    pub fn from_logical(token: &str) -> Option<Self> {
        match token {
            "&&" => Some(Operators::And),
            "||" => Some(Operators::Or),
            _ => None,
        }
    }

    fn comparison(self) -> Option<ComparisonOp> {
        let op = match self {
            Operators::Eq => ComparisonOp::Eq,
            Operators::Ne => ComparisonOp::Ne,
            Operators::Gt => ComparisonOp::Gt,
            Operators::Ge => ComparisonOp::Gte,
            Operators::Lt => ComparisonOp::Lt,
            Operators::Le => ComparisonOp::Lte,
            _ => return None,
        };
        Some(op)
    }

    /// Registry name of an arithmetic operator
    fn function(self) -> Option<&'static str> {
        let name = match self {
            Operators::Add => "add",
            Operators::Sub => "sub",
            Operators::Mul => "mul",
            Operators::Div => "div",
            Operators::Mod => "mod",
            _ => return None,
        };
        Some(name)
    }

    fn commutes(self) -> bool {
        matches!(self, Operators::Add | Operators::Mul)
    }
}

pub fn is_arithmetic(op: Operators) -> bool {
    op.is_arithmetic()
}

pub fn is_comparison(op: Operators) -> bool {
    op.is_comparison()
}

pub fn is_logical(op: Operators) -> bool {
    op.is_logical()
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("{op:?} is not a {expected} operator")]
    InvalidOperator {
        op: Operators,
        expected: &'static str,
    },

    #[error("{0} cannot be expressed as a filter")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Logical {
        op: Operators,
        operands: Vec<Expression>,
    },
    Comparison {
        left: Box<Expression>,
        op: Operators,
        right: Box<Expression>,
    },
    Arithmetic {
        left: Box<Expression>,
        op: Operators,
        right: Box<Expression>,
    },
    /// Resolved field name
    Member(String),
    Literal(Value),
    /// Registry function; the first argument is the receiver
    MethodCall {
        name: String,
        args: Vec<Expression>,
    },
}

pub fn create_logical_expression(
    op: Operators,
    operands: Vec<Expression>,
) -> Result<Expression, ExpressionError> {
    if !op.is_logical() {
        return Err(ExpressionError::InvalidOperator {
            op,
            expected: "logical",
        });
    }
    Ok(Expression::Logical { op, operands })
}

pub fn create_comparison_expression(
    left: Expression,
    op: Operators,
    right: Expression,
) -> Result<Expression, ExpressionError> {
    if !op.is_comparison() {
        return Err(ExpressionError::InvalidOperator {
            op,
            expected: "comparison",
        });
    }
    Ok(Expression::Comparison {
        left: Box::new(left),
        op,
        right: Box::new(right),
    })
}

pub fn create_arithmetic_expression(
    left: Expression,
    op: Operators,
    right: Expression,
) -> Result<Expression, ExpressionError> {
    if !op.is_arithmetic() {
        return Err(ExpressionError::InvalidOperator {
            op,
            expected: "arithmetic",
        });
    }
    Ok(Expression::Arithmetic {
        left: Box::new(left),
        op,
        right: Box::new(right),
    })
}

pub fn create_member_expression(name: impl Into<String>) -> Expression {
    Expression::Member(name.into())
}

pub fn create_literal_expression(value: impl Into<Value>) -> Expression {
    Expression::Literal(value.into())
}

pub fn create_method_call_expression(name: impl Into<String>, args: Vec<Expression>) -> Expression {
    Expression::MethodCall {
        name: name.into(),
        args,
    }
}

impl Expression {
    fn describe(&self) -> String {
        match self {
            Expression::Logical { op, .. } => format!("logical {:?} expression", op),
            Expression::Comparison { op, .. } => format!("comparison {:?}", op),
            Expression::Arithmetic { op, .. } => format!("arithmetic {:?}", op),
            Expression::Member(name) => format!("member '{}'", name),
            Expression::Literal(value) => format!("literal {:?}", value),
            Expression::MethodCall { name, .. } => format!("method '{}'", name),
        }
    }

    fn operand(&self) -> Result<Operand, ExpressionError> {
        match self {
            Expression::Literal(value) => Ok(Operand::Value(value.clone())),
            Expression::Member(name) => Ok(Operand::field(name.as_str())),
            other => Err(ExpressionError::Unsupported(format!(
                "{} as a comparison operand",
                other.describe()
            ))),
        }
    }

    /// Lowers a boolean-valued expression to a filter
    pub fn to_filter(&self) -> Result<Filter, ExpressionError> {
        match self {
            Expression::Logical { op, operands } => {
                let op = match op {
                    Operators::And => LogicalOp::And,
                    Operators::Or => LogicalOp::Or,
                    other => {
                        return Err(ExpressionError::InvalidOperator {
                            op: *other,
                            expected: "logical",
                        })
                    }
                };
                let operands = operands
                    .iter()
                    .map(Expression::to_filter)
                    .collect::<Result<_, _>>()?;
                Ok(Filter::Logical { op, operands })
            }
            Expression::Comparison { left, op, right } => {
                let cmp = op.comparison().ok_or(ExpressionError::InvalidOperator {
                    op: *op,
                    expected: "comparison",
                })?;
                compare(left, cmp, right)
            }
            Expression::MethodCall { name, args } => {
                function_filter(name, args, vec![Comparison::eq(true)])
            }
            other => Err(ExpressionError::Unsupported(format!(
                "{} on its own",
                other.describe()
            ))),
        }
    }
}

fn compare(left: &Expression, op: ComparisonOp, right: &Expression) -> Result<Filter, ExpressionError> {
    match (left, right) {
        (Expression::Member(field), rhs) => Ok(Filter::compare(field.as_str(), op, rhs.operand()?)),
        (Expression::Arithmetic { left: lhs, op: arith, right: rhs }, test) => {
            let (field, arg) = match (lhs.as_ref(), rhs.as_ref()) {
                (Expression::Member(field), arg) => (field, arg),
                (arg, Expression::Member(field)) if arith.commutes() => (field, arg),
                _ => {
                    return Err(ExpressionError::Unsupported(format!(
                        "{} without a leading member",
                        left.describe()
                    )))
                }
            };
            let name = arith.function().ok_or(ExpressionError::InvalidOperator {
                op: *arith,
                expected: "arithmetic",
            })?;
            Ok(Filter::function(
                field.as_str(),
                name,
                vec![arg.operand()?],
                vec![Comparison::new(op, test.operand()?)],
            ))
        }
        (Expression::MethodCall { name, args }, test) => {
            function_filter(name, args, vec![Comparison::new(op, test.operand()?)])
        }
        (Expression::Literal(_), rhs @ (Expression::Member(_) | Expression::Arithmetic { .. } | Expression::MethodCall { .. })) => {
            compare(rhs, op.flip(), left)
        }
        _ => Err(ExpressionError::Unsupported(format!(
            "comparison between {} and {}",
            left.describe(),
            right.describe()
        ))),
    }
}

fn function_filter(
    name: &str,
    args: &[Expression],
    tests: Vec<Comparison>,
) -> Result<Filter, ExpressionError> {
    let (field, rest) = match args.split_first() {
        Some((Expression::Member(field), rest)) => (field, rest),
        _ => {
            return Err(ExpressionError::Unsupported(format!(
                "method '{}' without a member receiver",
                name
            )))
        }
    };
    let args = rest
        .iter()
        .map(Expression::operand)
        .collect::<Result<_, _>>()?;
    Ok(Filter::function(field.as_str(), name, args, tests))
}
