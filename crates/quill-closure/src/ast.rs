//! Expression tree produced by the closure parser
//!
//! Node shapes follow the ESTree subset emitted by common JavaScript
//! expression parsers, so a tree produced elsewhere can be deserialized
//! from JSON and lowered the same way.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A parsed closure: parameter names and the returned expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Node,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Node {
    LogicalExpression {
        operator: String,
        #[serde(default)]
        left: Option<Box<Node>>,
        #[serde(default)]
        right: Option<Box<Node>>,
    },
    BinaryExpression {
        operator: String,
        #[serde(default)]
        left: Option<Box<Node>>,
        #[serde(default)]
        right: Option<Box<Node>>,
    },
    UnaryExpression {
        operator: String,
        argument: Box<Node>,
        #[serde(default = "prefix")]
        prefix: bool,
    },
    MemberExpression {
        #[serde(default)]
        computed: bool,
        object: Box<Node>,
        property: Box<Node>,
    },
    CallExpression {
        callee: Box<Node>,
        #[serde(default)]
        arguments: Vec<Node>,
    },
    Literal {
        value: JsonValue,
        #[serde(default)]
        raw: String,
    },
    Identifier {
        name: String,
    },
}

fn prefix() -> bool {
    true
}

impl Node {
    pub fn identifier(name: impl Into<String>) -> Self {
        Node::Identifier { name: name.into() }
    }

    pub fn literal(value: impl Into<JsonValue>) -> Self {
        let value = value.into();
        let raw = value.to_string();
        Node::Literal { value, raw }
    }

    pub fn member(object: Node, property: impl Into<String>) -> Self {
        Node::MemberExpression {
            computed: false,
            object: Box::new(object),
            property: Box::new(Node::identifier(property)),
        }
    }

    pub fn binary(operator: &str, left: Node, right: Node) -> Self {
        Node::BinaryExpression {
            operator: operator.to_string(),
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    pub fn logical(operator: &str, left: Node, right: Node) -> Self {
        Node::LogicalExpression {
            operator: operator.to_string(),
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::LogicalExpression { .. } => "LogicalExpression",
            Node::BinaryExpression { .. } => "BinaryExpression",
            Node::UnaryExpression { .. } => "UnaryExpression",
            Node::MemberExpression { .. } => "MemberExpression",
            Node::CallExpression { .. } => "CallExpression",
            Node::Literal { .. } => "Literal",
            Node::Identifier { .. } => "Identifier",
        }
    }
}
