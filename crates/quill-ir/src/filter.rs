//! Filter expressions: comparisons, logical combinations and function tests

use crate::Operand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn key(self) -> &'static str {
        match self {
            LogicalOp::And => "$and",
            LogicalOp::Or => "$or",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "$and" => Some(LogicalOp::And),
            "$or" => Some(LogicalOp::Or),
            _ => None,
        }
    }

    /// Separator placed between rendered operands
    pub fn separator(self) -> &'static str {
        match self {
            LogicalOp::And => " AND ",
            LogicalOp::Or => " OR ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

impl ComparisonOp {
    pub const ALL: [ComparisonOp; 8] = [
        ComparisonOp::Eq,
        ComparisonOp::Ne,
        ComparisonOp::Gt,
        ComparisonOp::Gte,
        ComparisonOp::Lt,
        ComparisonOp::Lte,
        ComparisonOp::In,
        ComparisonOp::Nin,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "$eq",
            ComparisonOp::Ne => "$ne",
            ComparisonOp::Gt => "$gt",
            ComparisonOp::Gte => "$gte",
            ComparisonOp::Lt => "$lt",
            ComparisonOp::Lte => "$lte",
            ComparisonOp::In => "$in",
            ComparisonOp::Nin => "$nin",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.key() == key)
    }

    /// Operator with its operands swapped, so `5 < x` reads as `x > 5`
    pub fn flip(self) -> Self {
        match self {
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::Gte => ComparisonOp::Lte,
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::Lte => ComparisonOp::Gte,
            other => other,
        }
    }
}

/// One comparison against an operand, e.g. `$gt: 100`
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub op: ComparisonOp,
    pub operand: Operand,
}

impl Comparison {
    pub fn new(op: ComparisonOp, operand: impl Into<Operand>) -> Self {
        Self {
            op,
            operand: operand.into(),
        }
    }

    pub fn eq(operand: impl Into<Operand>) -> Self {
        Self::new(ComparisonOp::Eq, operand)
    }
}

/// A `$where` / `$prepared` / join ON expression
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Logical {
        op: LogicalOp,
        operands: Vec<Filter>,
    },
    Compare {
        field: String,
        comparison: Comparison,
    },
    /// Registered function applied to `field` and `args`, whose result is
    /// checked against every entry of `tests`
    Function {
        field: String,
        name: String,
        args: Vec<Operand>,
        tests: Vec<Comparison>,
    },
}

impl Filter {
    pub fn and(operands: Vec<Filter>) -> Self {
        Filter::Logical {
            op: LogicalOp::And,
            operands,
        }
    }

    pub fn or(operands: Vec<Filter>) -> Self {
        Filter::Logical {
            op: LogicalOp::Or,
            operands,
        }
    }

    pub fn compare(field: impl Into<String>, op: ComparisonOp, operand: impl Into<Operand>) -> Self {
        Filter::Compare {
            field: field.into(),
            comparison: Comparison::new(op, operand),
        }
    }

    pub fn eq(field: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Self::compare(field, ComparisonOp::Eq, operand)
    }

    pub fn function(
        field: impl Into<String>,
        name: impl Into<String>,
        args: Vec<Operand>,
        tests: Vec<Comparison>,
    ) -> Self {
        Filter::Function {
            field: field.into(),
            name: name.into(),
            args,
            tests,
        }
    }

    /// Combines two filters under `op`. A left side already rooted at `op`
    /// absorbs the right side instead of nesting.
    pub fn combine(self, op: LogicalOp, other: Filter) -> Filter {
        match self {
            Filter::Logical {
                op: root,
                mut operands,
            } if root == op => {
                operands.push(other);
                Filter::Logical { op, operands }
            }
            left => Filter::Logical {
                op,
                operands: vec![left, other],
            },
        }
    }
}
