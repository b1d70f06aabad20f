//! Quill query intermediate representation (IR)
//!
//! One tree for select/insert/update/delete expressions shared by every
//! frontend (fluent builder, closures, OData) and rendered by the SQL backend.
//! Types are closed enums; the `$`-keyed JSON mapping lives in [`wire`] and is
//! deterministic, so [`QueryExpression::fingerprint`] can be used as a cache key.

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

mod builder;
mod error;
mod field;
mod filter;
pub mod odata;
mod types;
pub mod wire;

pub use builder::{query, where_};
pub use error::{QueryError, QueryResult};
pub use field::{is_identifier, Aggregate, FieldRef, QueryEntity};
pub use filter::{Comparison, ComparisonOp, Filter, LogicalOp};
pub use odata::ODataQuery;
pub use types::{Operand, Value};

use builder::Pending;

/// Top-level query expression
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryExpression {
    /// Exactly one statement kind, or none for a bare filter
    pub statement: Option<Statement>,
    pub expand: Vec<JoinExpression>,
    /// `$where`
    pub filter: Option<Filter>,
    /// Filter frozen by [`QueryExpression::prepare`]
    pub prepared: Option<Filter>,
    pub order: Vec<OrderBy>,
    pub group: Vec<FieldRef>,
    pub distinct: bool,
    pub fixed: bool,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    /// Alias used when this expression is embedded as a sub-query
    pub alias: Option<String>,
    pending: Pending,
}

impl QueryExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate fingerprint (SHA-256) for deterministic caching
    pub fn fingerprint(&self) -> String {
        let json = self.to_json().to_string();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub fn has_paging(&self) -> bool {
        self.take.is_some()
    }

    /// True when the select list or any joined entity exposes fields
    pub fn has_fields(&self) -> bool {
        let selected = matches!(
            &self.statement,
            Some(Statement::Select(select)) if !select.fields.is_empty()
        );
        selected
            || self.expand.iter().any(|join| match &join.target {
                JoinTarget::Entity(entity) => !entity.fields.is_empty(),
                JoinTarget::Query(_) => false,
            })
    }

    /// `$prepared` and `$where` ANDed together, or whichever one exists.
    /// Used as a join condition.
    pub fn combined_filter(&self) -> Option<Filter> {
        match (&self.prepared, &self.filter) {
            (Some(prepared), Some(filter)) => {
                Some(Filter::and(vec![prepared.clone(), filter.clone()]))
            }
            (prepared, filter) => prepared.as_ref().or(filter.as_ref()).cloned(),
        }
    }

    /// The WHERE clause filter: `$where` ANDed with `$prepared`, `$where` first
    pub fn where_filter(&self) -> Option<Filter> {
        match (&self.filter, &self.prepared) {
            (Some(filter), Some(prepared)) => {
                Some(Filter::and(vec![filter.clone(), prepared.clone()]))
            }
            (filter, prepared) => filter.as_ref().or(prepared.as_ref()).cloned(),
        }
    }

    pub fn select_clause(&self) -> Option<&SelectClause> {
        match &self.statement {
            Some(Statement::Select(select)) => Some(select),
            _ => None,
        }
    }

    /// Entity the statement operates on
    pub fn entity_name(&self) -> Option<&str> {
        self.statement.as_ref().map(Statement::entity)
    }

    /// Nothing to render: no statement and no filter
    pub fn is_empty(&self) -> bool {
        self.statement.is_none() && self.filter.is_none() && self.prepared.is_none()
    }
}

/// Statement kind; replacing it is how the builder keeps kinds exclusive
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectClause),
    Insert(EntityValues),
    Update(EntityValues),
    Delete(String),
}

impl Statement {
    pub fn entity(&self) -> &str {
        match self {
            Statement::Select(select) => &select.entity,
            Statement::Insert(values) | Statement::Update(values) => &values.entity,
            Statement::Delete(entity) => entity,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select(_) => "select",
            Statement::Insert(_) => "insert",
            Statement::Update(_) => "update",
            Statement::Delete(_) => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectClause {
    pub entity: String,
    pub fields: Vec<FieldRef>,
}

/// Entity plus ordered column values for insert and update
#[derive(Debug, Clone, PartialEq)]
pub struct EntityValues {
    pub entity: String,
    pub values: IndexMap<String, Operand>,
}

/// `$expand` entry
#[derive(Debug, Clone, PartialEq)]
pub struct JoinExpression {
    pub target: JoinTarget,
    pub on: JoinCondition,
    pub alias: Option<String>,
}

impl JoinExpression {
    /// Alias rendered after the joined table: the join's own, else the
    /// entity alias or the sub-query `$alias`
    pub fn effective_alias(&self) -> Option<&str> {
        self.alias.as_deref().or(match &self.target {
            JoinTarget::Entity(entity) => entity.alias.as_deref(),
            JoinTarget::Query(query) => query.alias.as_deref(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinTarget {
    Entity(QueryEntity),
    Query(Box<QueryExpression>),
}

impl From<QueryEntity> for JoinTarget {
    fn from(entity: QueryEntity) -> Self {
        JoinTarget::Entity(entity)
    }
}

impl From<&str> for JoinTarget {
    fn from(name: &str) -> Self {
        JoinTarget::Entity(QueryEntity::new(name))
    }
}

impl From<String> for JoinTarget {
    fn from(name: String) -> Self {
        JoinTarget::Entity(QueryEntity::new(name))
    }
}

impl From<QueryExpression> for JoinTarget {
    fn from(query: QueryExpression) -> Self {
        JoinTarget::Query(Box::new(query))
    }
}

/// ON clause of a join
#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    /// Equi-join over corresponding positions of a left and right side
    Columns(Vec<JoinSide>),
    Filter(Filter),
}

impl From<Filter> for JoinCondition {
    fn from(filter: Filter) -> Self {
        JoinCondition::Filter(filter)
    }
}

impl From<Vec<JoinSide>> for JoinCondition {
    fn from(sides: Vec<JoinSide>) -> Self {
        JoinCondition::Columns(sides)
    }
}

impl From<[JoinSide; 2]> for JoinCondition {
    fn from(sides: [JoinSide; 2]) -> Self {
        JoinCondition::Columns(sides.into())
    }
}

/// One side of an equi-join: `{table: [fields]}`
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSide {
    pub entity: String,
    pub fields: Vec<String>,
}

impl JoinSide {
    pub fn new<I, S>(entity: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity: entity.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn key(self) -> &'static str {
        match self {
            SortDirection::Asc => "$asc",
            SortDirection::Desc => "$desc",
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub direction: SortDirection,
    pub fields: Vec<FieldRef>,
}

impl OrderBy {
    pub fn asc(field: impl Into<FieldRef>) -> Self {
        Self {
            direction: SortDirection::Asc,
            fields: vec![field.into()],
        }
    }

    pub fn desc(field: impl Into<FieldRef>) -> Self {
        Self {
            direction: SortDirection::Desc,
            fields: vec![field.into()],
        }
    }
}
