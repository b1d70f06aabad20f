//! Field and entity references

use crate::{Operand, QueryError, QueryResult, Value};

/// SQL aggregate wrapped around a single column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    Count,
    Min,
    Max,
    Avg,
    Sum,
}

impl Aggregate {
    pub const ALL: [Aggregate; 5] = [
        Aggregate::Count,
        Aggregate::Min,
        Aggregate::Max,
        Aggregate::Avg,
        Aggregate::Sum,
    ];

    /// Reserved wire key, e.g. `$count`
    pub fn key(self) -> &'static str {
        match self {
            Aggregate::Count => "$count",
            Aggregate::Min => "$min",
            Aggregate::Max => "$max",
            Aggregate::Avg => "$avg",
            Aggregate::Sum => "$sum",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|agg| agg.key() == key)
    }

    pub fn sql_name(self) -> &'static str {
        match self {
            Aggregate::Count => "COUNT",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
            Aggregate::Avg => "AVG",
            Aggregate::Sum => "SUM",
        }
    }
}

/// A column, computed column or constant used in projections, ordering,
/// grouping and as a comparison operand
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRef {
    Name(String),
    Qualified { entity: String, name: String },
    /// Raw expression exposed under an alias
    Aliased { alias: String, expr: String },
    Aggregate { alias: String, func: Aggregate, name: String },
    /// Registered function applied to `args`
    Function { alias: String, func: String, args: Vec<Operand> },
    Constant { value: Value, alias: Option<String> },
}

/// Plain identifier test used when deciding whether a name is already qualified
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn bare_name(name: &str) -> &str {
    match name.split_once('.') {
        Some((_, rest)) if !rest.is_empty() => rest,
        _ => name,
    }
}

fn qualify(entity: &str, name: &str) -> String {
    format!("{}.{}", entity, bare_name(name))
}

impl FieldRef {
    /// Selects a column by name; `entity.name` becomes a qualified reference
    pub fn select(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.split_once('.') {
            Some((entity, column)) if !entity.is_empty() && !column.is_empty() => {
                FieldRef::Qualified {
                    entity: entity.to_string(),
                    name: column.to_string(),
                }
            }
            _ => FieldRef::Name(name),
        }
    }

    pub fn aggregate(func: Aggregate, name: impl Into<String>) -> Self {
        let name = name.into();
        FieldRef::Aggregate {
            alias: bare_name(&name).to_string(),
            func,
            name,
        }
    }

    pub fn count(name: impl Into<String>) -> Self {
        Self::aggregate(Aggregate::Count, name)
    }

    pub fn min(name: impl Into<String>) -> Self {
        Self::aggregate(Aggregate::Min, name)
    }

    pub fn max(name: impl Into<String>) -> Self {
        Self::aggregate(Aggregate::Max, name)
    }

    pub fn average(name: impl Into<String>) -> Self {
        Self::aggregate(Aggregate::Avg, name)
    }

    pub fn sum(name: impl Into<String>) -> Self {
        Self::aggregate(Aggregate::Sum, name)
    }

    /// Registered function over a column, aliased by the column name
    pub fn function(func: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        FieldRef::Function {
            alias: bare_name(&name).to_string(),
            func: func.into(),
            args: vec![Operand::Field(FieldRef::select(name))],
        }
    }

    pub fn day(name: impl Into<String>) -> Self {
        Self::function("day", name)
    }

    pub fn month(name: impl Into<String>) -> Self {
        Self::function("month", name)
    }

    pub fn year(name: impl Into<String>) -> Self {
        Self::function("year", name)
    }

    pub fn hour(name: impl Into<String>) -> Self {
        Self::function("hour", name)
    }

    pub fn minute(name: impl Into<String>) -> Self {
        Self::function("minute", name)
    }

    pub fn second(name: impl Into<String>) -> Self {
        Self::function("second", name)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::function("date", name)
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        FieldRef::Constant {
            value: value.into(),
            alias: None,
        }
    }

    /// Qualifies the field with `entity`, replacing any existing qualifier
    pub fn from(self, entity: &str) -> QueryResult<Self> {
        match self {
            FieldRef::Name(name) | FieldRef::Qualified { name, .. } => Ok(FieldRef::Qualified {
                entity: entity.to_string(),
                name: bare_name(&name).to_string(),
            }),
            FieldRef::Aggregate { alias, func, name } => Ok(FieldRef::Aggregate {
                alias,
                func,
                name: qualify(entity, &name),
            }),
            other => Err(QueryError::InvalidOperation(format!(
                "field {:?} has no name that can be qualified with '{}'",
                other, entity
            ))),
        }
    }

    /// Renames the field; plain and qualified names become aliased expressions
    pub fn alias(self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        match self {
            FieldRef::Name(name) => FieldRef::Aliased { alias, expr: name },
            FieldRef::Qualified { entity, name } => FieldRef::Aliased {
                alias,
                expr: format!("{}.{}", entity, name),
            },
            FieldRef::Aliased { expr, .. } => FieldRef::Aliased { alias, expr },
            FieldRef::Aggregate { func, name, .. } => FieldRef::Aggregate { alias, func, name },
            FieldRef::Function { func, args, .. } => FieldRef::Function { alias, func, args },
            FieldRef::Constant { value, .. } => FieldRef::Constant {
                value,
                alias: Some(alias),
            },
        }
    }

    pub fn alias_name(&self) -> Option<&str> {
        match self {
            FieldRef::Name(_) | FieldRef::Qualified { .. } => None,
            FieldRef::Aliased { alias, .. }
            | FieldRef::Aggregate { alias, .. }
            | FieldRef::Function { alias, .. } => Some(alias),
            FieldRef::Constant { alias, .. } => alias.as_deref(),
        }
    }

    /// Column name without its qualifier
    pub fn name(&self) -> Option<&str> {
        match self {
            FieldRef::Name(name) => Some(bare_name(name)),
            FieldRef::Qualified { name, .. } => Some(name),
            FieldRef::Aliased { expr, .. } => Some(bare_name(expr)),
            FieldRef::Aggregate { name, .. } => Some(bare_name(name)),
            FieldRef::Function { .. } | FieldRef::Constant { .. } => None,
        }
    }

    /// Identifier text usable as a filter key, when the field has one
    pub fn expression(&self) -> Option<String> {
        match self {
            FieldRef::Name(name) => Some(name.clone()),
            FieldRef::Qualified { entity, name } => Some(format!("{}.{}", entity, name)),
            FieldRef::Aliased { expr, .. } => Some(expr.clone()),
            _ => None,
        }
    }
}

impl From<&str> for FieldRef {
    fn from(name: &str) -> Self {
        FieldRef::select(name)
    }
}

impl From<String> for FieldRef {
    fn from(name: String) -> Self {
        FieldRef::select(name)
    }
}

impl From<&FieldRef> for FieldRef {
    fn from(field: &FieldRef) -> Self {
        field.clone()
    }
}

/// A table taking part in a query, with the fields it exposes
#[derive(Debug, Clone, PartialEq)]
pub struct QueryEntity {
    pub name: String,
    pub fields: Vec<FieldRef>,
    pub alias: Option<String>,
}

impl QueryEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            alias: None,
        }
    }

    pub fn with_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldRef>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name used to qualify this entity's columns
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// A column of this entity, qualified with the alias when one is set
    pub fn select(&self, name: &str) -> FieldRef {
        FieldRef::Qualified {
            entity: self.reference_name().to_string(),
            name: bare_name(name).to_string(),
        }
    }
}

impl From<&str> for QueryEntity {
    fn from(name: &str) -> Self {
        QueryEntity::new(name)
    }
}

impl From<String> for QueryEntity {
    fn from(name: String) -> Self {
        QueryEntity::new(name)
    }
}
