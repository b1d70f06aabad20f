//! Fluent builder methods on [`QueryExpression`]
//!
//! Every method mutates the expression in place and returns it for chaining.
//! Comparison terminals consume the field named by the last `where_`, `and`
//! or `or` call; a terminal with no pending field leaves the expression as is.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{
    Comparison, ComparisonOp, EntityValues, FieldRef, Filter, JoinCondition, JoinExpression,
    JoinTarget, LogicalOp, Operand, OrderBy, QueryError, QueryExpression, QueryResult,
    SelectClause, SortDirection, Statement,
};

/// Builder state that never reaches the wire form
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Pending {
    field: Option<String>,
    connector: Option<LogicalOp>,
    fields: Option<Vec<FieldRef>>,
    join: Option<JoinTarget>,
}

/// Starts a select over `entity`
pub fn query(entity: impl Into<String>) -> QueryExpression {
    let mut q = QueryExpression::new();
    q.from(entity);
    q
}

/// Starts a bare filter on `field`
pub fn where_(field: impl Into<FieldRef>) -> QueryExpression {
    let mut q = QueryExpression::new();
    q.where_(field);
    q
}

fn object_values<T>(values: &T, context: &str) -> QueryResult<IndexMap<String, Operand>>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_value(values)
        .map_err(|e| QueryError::InvalidArgument(format!("{} values: {}", context, e)))?;
    match json {
        JsonValue::Object(map) => map
            .iter()
            .map(|(key, value)| Ok((key.clone(), Operand::from_json(value)?)))
            .collect(),
        other => Err(QueryError::InvalidArgument(format!(
            "{} expression argument must be an object, got {}",
            context, other
        ))),
    }
}

impl QueryExpression {
    /// Sets the select list. Without an entity the fields wait for [`from`](Self::from).
    pub fn select<I, F>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldRef>,
    {
        let fields: Vec<FieldRef> = fields.into_iter().map(Into::into).collect();
        match &mut self.statement {
            Some(Statement::Select(select)) => select.fields = fields,
            _ => {
                self.statement = None;
                self.pending.fields = Some(fields);
            }
        }
        self
    }

    /// Sets the entity of a select, picking up fields passed to `select` earlier
    pub fn from(&mut self, entity: impl Into<String>) -> &mut Self {
        let entity = entity.into();
        match &mut self.statement {
            Some(Statement::Select(select)) => select.entity = entity,
            _ => {
                let fields = self.pending.fields.take().unwrap_or_default();
                self.statement = Some(Statement::Select(SelectClause { entity, fields }));
            }
        }
        self
    }

    pub fn select_from(&mut self, entity: impl Into<String>) -> &mut Self {
        self.from(entity)
    }

    /// Turns the expression into an insert of `values`, any serializable map
    pub fn insert_into<T>(&mut self, entity: impl Into<String>, values: &T) -> QueryResult<&mut Self>
    where
        T: Serialize + ?Sized,
    {
        let values = object_values(values, "insert")?;
        self.statement = Some(Statement::Insert(EntityValues {
            entity: entity.into(),
            values,
        }));
        Ok(self)
    }

    pub fn update(&mut self, entity: impl Into<String>) -> &mut Self {
        self.statement = Some(Statement::Update(EntityValues {
            entity: entity.into(),
            values: IndexMap::new(),
        }));
        self
    }

    /// Values of a pending update
    pub fn set<T>(&mut self, values: &T) -> QueryResult<&mut Self>
    where
        T: Serialize + ?Sized,
    {
        let values = object_values(values, "update")?;
        match &mut self.statement {
            Some(Statement::Update(update)) => {
                update.values = values;
                Ok(self)
            }
            _ => Err(QueryError::InvalidOperation(
                "update entity cannot be empty at this context".to_string(),
            )),
        }
    }

    pub fn delete_from(&mut self, entity: impl Into<String>) -> &mut Self {
        self.statement = Some(Statement::Delete(entity.into()));
        self
    }

    /// Starts a new filter, discarding the current `$where`
    pub fn where_(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.filter = None;
        self.pend(None, field.into())
    }

    pub fn and(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.pend(Some(LogicalOp::And), field.into())
    }

    pub fn or(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.pend(Some(LogicalOp::Or), field.into())
    }

    fn pend(&mut self, connector: Option<LogicalOp>, field: FieldRef) -> &mut Self {
        self.pending.field = field.expression();
        if self.pending.field.is_none() {
            tracing::warn!(?field, "field cannot be used as a filter key");
        }
        self.pending.connector = connector;
        self
    }

    fn append(&mut self, build: impl FnOnce(String) -> Filter) -> &mut Self {
        let Some(field) = self.pending.field.take() else {
            return self;
        };
        let connector = self.pending.connector.take().unwrap_or(LogicalOp::And);
        let expr = build(field);
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.combine(connector, expr),
            None => expr,
        });
        self
    }

    fn compare(&mut self, op: ComparisonOp, operand: Operand) -> &mut Self {
        self.append(|field| Filter::compare(field, op, operand))
    }

    fn call(&mut self, name: &str, args: Vec<Operand>, result: Operand) -> &mut Self {
        self.append(|field| Filter::function(field, name, args, vec![Comparison::eq(result)]))
    }

    pub fn equal(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.compare(ComparisonOp::Eq, value.into())
    }

    pub fn not_equal(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.compare(ComparisonOp::Ne, value.into())
    }

    pub fn greater_than(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.compare(ComparisonOp::Gt, value.into())
    }

    pub fn gt(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.greater_than(value)
    }

    pub fn greater_or_equal(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.compare(ComparisonOp::Gte, value.into())
    }

    pub fn gte(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.greater_or_equal(value)
    }

    pub fn lower_than(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.compare(ComparisonOp::Lt, value.into())
    }

    pub fn lt(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.lower_than(value)
    }

    pub fn lower_or_equal(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.compare(ComparisonOp::Lte, value.into())
    }

    pub fn lte(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.lower_or_equal(value)
    }

    /// `values` is a list or a select sub-query
    pub fn is_in(&mut self, values: impl Into<Operand>) -> &mut Self {
        self.compare(ComparisonOp::In, values.into())
    }

    pub fn not_in(&mut self, values: impl Into<Operand>) -> &mut Self {
        self.compare(ComparisonOp::Nin, values.into())
    }

    pub fn starts_with(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.call("startswith", vec![value.into()], true.into())
    }

    pub fn ends_with(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.call("endswith", vec![value.into()], true.into())
    }

    pub fn contains(&mut self, value: impl Into<Operand>) -> &mut Self {
        self.call("contains", vec![value.into()], true.into())
    }

    /// `field % value = result`
    pub fn modulo(&mut self, value: impl Into<Operand>, result: impl Into<Operand>) -> &mut Self {
        self.call("mod", vec![value.into()], result.into())
    }

    /// `field & value = result`; the result defaults to `value`
    pub fn bit<V: Into<Operand>>(&mut self, value: V, result: Option<V>) -> &mut Self {
        let value = value.into();
        let result = result.map(Into::into).unwrap_or_else(|| value.clone());
        self.call("bit", vec![value], result)
    }

    /// Freezes `$where` into `$prepared`, combining with an earlier phase
    pub fn prepare(&mut self, use_or: bool) -> &mut Self {
        if let Some(filter) = self.filter.take() {
            let op = if use_or { LogicalOp::Or } else { LogicalOp::And };
            self.prepared = Some(match self.prepared.take() {
                Some(prepared) => Filter::Logical {
                    op,
                    operands: vec![prepared, filter],
                },
                None => filter,
            });
        }
        self
    }

    /// Stages a join; [`with`](Self::with) commits it
    pub fn join(&mut self, target: impl Into<JoinTarget>) -> QueryResult<&mut Self> {
        if self.select_clause().is_none() {
            return Err(QueryError::InvalidOperation(
                "query entity cannot be empty when adding a join entity".to_string(),
            ));
        }
        self.pending.join = Some(target.into());
        Ok(self)
    }

    /// Sets the ON clause of the staged join and appends it to `$expand`
    pub fn with(&mut self, condition: impl Into<JoinCondition>) -> QueryResult<&mut Self> {
        let target = self.pending.join.take().ok_or_else(|| {
            QueryError::InvalidOperation(
                "join entity cannot be empty when adding a join expression".to_string(),
            )
        })?;
        self.expand.push(JoinExpression {
            target,
            on: condition.into(),
            alias: None,
        });
        Ok(self)
    }

    pub fn order_by(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.order.push(OrderBy::asc(field));
        self
    }

    pub fn order_by_descending(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.order.push(OrderBy::desc(field));
        self
    }

    pub fn then_by(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.then(SortDirection::Asc, field.into())
    }

    pub fn then_by_descending(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.then(SortDirection::Desc, field.into())
    }

    fn then(&mut self, direction: SortDirection, field: FieldRef) -> &mut Self {
        if !self.order.is_empty() {
            self.order.push(OrderBy {
                direction,
                fields: vec![field],
            });
        }
        self
    }

    pub fn group_by<I, F>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldRef>,
    {
        self.group.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn skip(&mut self, n: u64) -> &mut Self {
        self.skip = Some(n);
        self
    }

    pub fn take(&mut self, n: u64) -> &mut Self {
        self.take = Some(n);
        self
    }

    pub fn distinct(&mut self, value: bool) -> &mut Self {
        self.distinct = value;
        self
    }

    /// Fixed selects render as `SELECT * FROM (SELECT ...) entity`
    pub fn fixed(&mut self, value: bool) -> &mut Self {
        self.fixed = value;
        self
    }

    pub fn alias(&mut self, name: impl Into<String>) -> &mut Self {
        self.alias = Some(name.into());
        self
    }
}

impl From<QueryExpression> for JoinCondition {
    fn from(query: QueryExpression) -> Self {
        JoinCondition::from(&query)
    }
}

impl From<&QueryExpression> for JoinCondition {
    fn from(query: &QueryExpression) -> Self {
        JoinCondition::Filter(query.combined_filter().unwrap_or_else(|| Filter::and(vec![])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JoinSide, QueryEntity, Value};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_filter_accumulation() {
        let mut q = QueryExpression::new();
        q.where_("a").equal(1).and("b").equal(2);
        assert_eq!(
            q.filter,
            Some(Filter::and(vec![Filter::eq("a", 1), Filter::eq("b", 2)]))
        );
    }

    #[test]
    fn test_mixed_connectors_wrap() {
        let mut q = QueryExpression::new();
        q.where_("a").equal(1).or("b").equal(2).and("c").equal(3);
        assert_eq!(
            q.filter,
            Some(Filter::and(vec![
                Filter::or(vec![Filter::eq("a", 1), Filter::eq("b", 2)]),
                Filter::eq("c", 3),
            ]))
        );
    }

    #[test]
    fn test_where_discards_previous_filter() {
        let mut q = QueryExpression::new();
        q.where_("a").equal(1).where_("b").equal(2);
        assert_eq!(q.filter, Some(Filter::eq("b", 2)));
    }

    #[test]
    fn test_terminal_without_field_is_noop() {
        let mut q = query("users");
        q.equal(5);
        assert_eq!(q.filter, None);

        q.where_("id").equal(1).gt(4);
        assert_eq!(q.filter, Some(Filter::eq("id", 1)));
    }

    #[test]
    fn test_statement_kinds_are_exclusive() {
        let mut q = query("users");
        q.select(["id"]);
        q.insert_into("users", &json!({"name": "ann", "age": 31}))
            .unwrap();

        match &q.statement {
            Some(Statement::Insert(values)) => {
                assert_eq!(values.entity, "users");
                let keys: Vec<&str> = values.values.keys().map(String::as_str).collect();
                assert_eq!(keys, vec!["name", "age"]);
            }
            other => panic!("expected insert, got {:?}", other),
        }

        q.delete_from("users");
        assert_eq!(q.statement, Some(Statement::Delete("users".into())));
    }

    #[test]
    fn test_select_waits_for_from() {
        let mut q = QueryExpression::new();
        q.select(["id", "name"]);
        assert!(q.statement.is_none());
        q.from("users");
        assert_eq!(
            q.select_clause().map(|s| s.fields.len()),
            Some(2)
        );
    }

    #[test]
    fn test_insert_rejects_non_object() {
        let err = QueryExpression::new()
            .insert_into("users", &vec![1, 2])
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn test_set_requires_update() {
        let err = query("users").set(&json!({"name": "x"})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidOperation(_)));

        let mut q = QueryExpression::new();
        q.update("users").set(&json!({"name": "x"})).unwrap();
        assert!(matches!(q.statement, Some(Statement::Update(_))));
    }

    #[test]
    fn test_prepare_multiple_phases() {
        let mut q = query("orders");
        q.where_("a").equal(1).prepare(false);
        assert_eq!(q.prepared, Some(Filter::eq("a", 1)));
        assert_eq!(q.filter, None);

        q.where_("b").equal(2).prepare(true);
        q.where_("c").equal(3).prepare(false);
        assert_eq!(
            q.prepared,
            Some(Filter::and(vec![
                Filter::or(vec![Filter::eq("a", 1), Filter::eq("b", 2)]),
                Filter::eq("c", 3),
            ]))
        );

        // nothing to freeze
        q.prepare(true);
        assert!(matches!(q.prepared, Some(Filter::Logical { op: LogicalOp::And, .. })));
    }

    #[test]
    fn test_join_requires_select_and_with_requires_join() {
        let mut q = QueryExpression::new();
        assert!(matches!(
            q.join("departments"),
            Err(QueryError::InvalidOperation(_))
        ));

        let mut q = query("employees");
        assert!(matches!(
            q.with(Filter::eq("a", 1)),
            Err(QueryError::InvalidOperation(_))
        ));

        q.join(QueryEntity::new("departments").alias("d"))
            .unwrap()
            .with([
                JoinSide::new("employees", ["department"]),
                JoinSide::new("d", ["id"]),
            ])
            .unwrap();
        assert_eq!(q.expand.len(), 1);
        assert_eq!(q.expand[0].effective_alias(), Some("d"));
    }

    #[test]
    fn test_with_query_uses_combined_filter() {
        let mut cond = where_("a");
        cond.equal(Operand::field("b")).prepare(false);
        cond.where_("c").equal(1);

        let mut q = query("t1");
        q.join("t2").unwrap().with(&cond).unwrap();
        assert_eq!(
            q.expand[0].on,
            JoinCondition::Filter(Filter::and(vec![
                Filter::eq("a", Operand::field("b")),
                Filter::eq("c", 1),
            ]))
        );
    }

    #[test]
    fn test_then_by_needs_order() {
        let mut q = query("t");
        q.then_by("a");
        assert!(q.order.is_empty());
        q.order_by("a").then_by_descending("b");
        assert_eq!(q.order, vec![OrderBy::asc("a"), OrderBy::desc("b")]);
    }

    #[test]
    fn test_bit_result_defaults_to_value() {
        let mut q = where_("flags");
        q.bit(4, None);
        assert_eq!(
            q.filter,
            Some(Filter::function(
                "flags",
                "bit",
                vec![Value::Int(4).into()],
                vec![Comparison::eq(4)]
            ))
        );
    }
}
