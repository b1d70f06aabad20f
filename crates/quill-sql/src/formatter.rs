//! Core SQL formatter

use quill_ir::{
    is_identifier, Comparison, ComparisonOp, EntityValues, FieldRef, Filter, JoinCondition,
    JoinExpression, JoinTarget, Operand, OrderBy, QueryError, QueryExpression, SelectClause,
    Statement, Value,
};
use quill_registry::{FunctionArg, FunctionRegistry, RegistryError};

use crate::escape::{LiteralEscaper, MySqlEscaper};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormatError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl From<RegistryError> for FormatError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::FunctionNotFound(name) => FormatError::UnknownOperator(name),
            other => FormatError::InvalidArgument(other.to_string()),
        }
    }
}

pub type FormatResult<T> = Result<T, FormatError>;

/// Field rendering directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    /// Select list: computed fields carry ` AS alias`
    Projection,
    /// ORDER BY / GROUP BY / operands: never aliased
    Filter,
}

/// Formatter for Quill IR → SQL text
pub struct SqlFormatter<'a> {
    escaper: &'a dyn LiteralEscaper,
    functions: FunctionRegistry,
}

impl Default for SqlFormatter<'static> {
    fn default() -> Self {
        SqlFormatter::new(&MySqlEscaper)
    }
}

impl<'a> SqlFormatter<'a> {
    pub fn new(escaper: &'a dyn LiteralEscaper) -> Self {
        Self::with_registry(escaper, FunctionRegistry::default())
    }

    pub fn with_registry(escaper: &'a dyn LiteralEscaper, functions: FunctionRegistry) -> Self {
        Self { escaper, functions }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Render a query expression, choosing the statement form from the IR
    #[tracing::instrument(level = "debug", skip_all, fields(statement = query.statement.as_ref().map(Statement::kind)))]
    pub fn format(&self, query: &QueryExpression) -> FormatResult<String> {
        let sql = match &query.statement {
            Some(Statement::Select(select)) => self.format_select(query, select)?,
            Some(Statement::Insert(values)) => self.format_insert(values)?,
            Some(Statement::Update(values)) => self.format_update(query, values)?,
            Some(Statement::Delete(entity)) => format!("DELETE FROM {}{}", entity, self.where_clause(query)?),
            None => match query.where_filter() {
                Some(filter) => self.format_where(&filter)?,
                None => {
                    return Err(FormatError::InvalidArgument(
                        "query expression cannot be empty".to_string(),
                    ))
                }
            },
        };
        tracing::debug!(%sql, "formatted query");
        Ok(sql)
    }

    fn format_select(&self, query: &QueryExpression, select: &SelectClause) -> FormatResult<String> {
        let joined = query.expand.iter().filter_map(|join| match &join.target {
            JoinTarget::Entity(entity) => Some(entity.fields.iter()),
            JoinTarget::Query(_) => None,
        });
        let fields: Vec<&FieldRef> = select.fields.iter().chain(joined.flatten()).collect();
        if fields.is_empty() {
            return Err(FormatError::InvalidArgument(format!(
                "select expression over '{}' does not contain any fields",
                select.entity
            )));
        }
        let projection = fields
            .into_iter()
            .map(|field| self.format_field(field, FieldFormat::Projection))
            .collect::<FormatResult<Vec<_>>>()?
            .join(", ");

        let mut sql = if query.fixed {
            format!("SELECT * FROM (SELECT {}) {}", projection, select.entity)
        } else {
            format!(
                "SELECT {}{} FROM {}",
                if query.distinct { "DISTINCT " } else { "" },
                projection,
                select.entity
            )
        };
        for join in &query.expand {
            sql.push_str(&self.format_join(&select.entity, join)?);
        }
        sql.push_str(&self.where_clause(query)?);
        sql.push_str(&self.format_group_by(&query.group)?);
        sql.push_str(&self.format_order(&query.order)?);

        if let Some(take) = query.take {
            match query.skip {
                Some(skip) if skip > 0 => sql.push_str(&format!(" LIMIT {}, {}", skip, take)),
                _ => sql.push_str(&format!(" LIMIT {}", take)),
            }
        }
        Ok(sql)
    }

    fn format_join(&self, entity: &str, join: &JoinExpression) -> FormatResult<String> {
        let mut sql = match &join.target {
            JoinTarget::Query(sub) => format!(" INNER JOIN ({})", self.format(sub)?),
            JoinTarget::Entity(target) => format!(" INNER JOIN {}", target.name),
        };
        if let Some(alias) = join.effective_alias() {
            sql.push_str(" AS ");
            sql.push_str(alias);
        }
        match &join.on {
            JoinCondition::Columns(sides) => {
                let [left, right] = sides.as_slice() else {
                    return Err(FormatError::InvalidOperation(format!(
                        "invalid join comparison expression: expected 2 sides, got {}",
                        sides.len()
                    )));
                };
                if left.fields.len() != right.fields.len() || left.fields.is_empty() {
                    return Err(FormatError::InvalidOperation(format!(
                        "invalid join comparison expression between {} and {}",
                        left.entity, right.entity
                    )));
                }
                for (i, (l, r)) in left.fields.iter().zip(&right.fields).enumerate() {
                    sql.push_str(if i == 0 { " ON " } else { " AND " });
                    sql.push_str(&qualify(&left.entity, l));
                    sql.push('=');
                    sql.push_str(&qualify(&right.entity, r));
                }
            }
            JoinCondition::Filter(filter) => {
                let on = self.format_where(filter)?;
                if on.is_empty() {
                    return Err(FormatError::InvalidOperation(format!(
                        "join condition for {} cannot be empty",
                        entity
                    )));
                }
                sql.push_str(" ON ");
                sql.push_str(&on);
            }
        }
        Ok(sql)
    }

    fn format_insert(&self, insert: &EntityValues) -> FormatResult<String> {
        if insert.values.is_empty() {
            return Err(FormatError::InvalidArgument(format!(
                "insert expression for '{}' cannot be empty",
                insert.entity
            )));
        }
        let columns: Vec<&str> = insert.values.keys().map(String::as_str).collect();
        let values = insert
            .values
            .values()
            .map(|value| self.escape(value))
            .collect::<FormatResult<Vec<_>>>()?;
        Ok(format!(
            "INSERT INTO {}({}) VALUES ({})",
            insert.entity,
            columns.join(", "),
            values.join(", ")
        ))
    }

    fn format_update(&self, query: &QueryExpression, update: &EntityValues) -> FormatResult<String> {
        if update.values.is_empty() {
            return Err(FormatError::InvalidArgument(format!(
                "update expression for '{}' cannot be empty",
                update.entity
            )));
        }
        let assignments = update
            .values
            .iter()
            .map(|(column, value)| Ok(format!("{}={}", column, self.escape(value)?)))
            .collect::<FormatResult<Vec<_>>>()?;
        Ok(format!(
            "UPDATE {} SET {}{}",
            update.entity,
            assignments.join(", "),
            self.where_clause(query)?
        ))
    }

    /// ` WHERE ...` over `$where` and `$prepared`, or nothing
    fn where_clause(&self, query: &QueryExpression) -> FormatResult<String> {
        let Some(filter) = query.where_filter() else {
            return Ok(String::new());
        };
        let sql = self.format_where(&filter)?;
        Ok(if sql.is_empty() {
            sql
        } else {
            format!(" WHERE {}", sql)
        })
    }

    /// Render a filter; logical nodes with nothing left to render yield `""`
    pub fn format_where(&self, filter: &Filter) -> FormatResult<String> {
        match filter {
            Filter::Logical { op, operands } => {
                let mut parts = Vec::with_capacity(operands.len());
                for operand in operands {
                    let part = self.format_where(operand)?;
                    if !part.is_empty() {
                        parts.push(part);
                    }
                }
                if parts.is_empty() {
                    Ok(String::new())
                } else {
                    Ok(format!("({})", parts.join(op.separator())))
                }
            }
            Filter::Compare { field, comparison } => self.format_comparison(field, comparison),
            Filter::Function {
                field,
                name,
                args,
                tests,
            } => {
                let mut call = Vec::with_capacity(args.len() + 1);
                call.push(FunctionArg::raw(field.as_str()));
                for arg in args {
                    call.push(self.function_arg(arg)?);
                }
                let target = self.functions.render(name, &call)?;
                if target.is_empty() {
                    return Ok(String::new());
                }
                match tests.as_slice() {
                    [] => Ok(format!("({} IS NULL)", target)),
                    [test] => self.format_comparison(&target, test),
                    tests => {
                        let parts = tests
                            .iter()
                            .map(|test| self.format_comparison(&target, test))
                            .collect::<FormatResult<Vec<_>>>()?;
                        Ok(format!("({})", parts.join(" AND ")))
                    }
                }
            }
        }
    }

    fn format_comparison(&self, target: &str, comparison: &Comparison) -> FormatResult<String> {
        let operand = &comparison.operand;
        let sql = match comparison.op {
            ComparisonOp::Eq if operand.is_null() => format!("({} IS NULL)", target),
            ComparisonOp::Eq => format!("({}={})", target, self.escape(operand)?),
            ComparisonOp::Ne if operand.is_null() => format!("(NOT {} IS NULL)", target),
            ComparisonOp::Ne => format!("(NOT {}={})", target, self.escape(operand)?),
            ComparisonOp::Gt => format!("({}>{})", target, self.escape(operand)?),
            ComparisonOp::Gte => format!("({}>={})", target, self.escape(operand)?),
            ComparisonOp::Lt => format!("({}<{})", target, self.escape(operand)?),
            ComparisonOp::Lte => format!("({}<={})", target, self.escape(operand)?),
            ComparisonOp::In => format!("({} IN ({}))", target, self.format_in_list(operand)?),
            ComparisonOp::Nin => format!("(NOT {} IN ({}))", target, self.format_in_list(operand)?),
        };
        Ok(sql)
    }

    fn format_in_list(&self, operand: &Operand) -> FormatResult<String> {
        match operand {
            Operand::List(items) if items.is_empty() => Ok("NULL".to_string()),
            Operand::List(items) => Ok(items
                .iter()
                .map(|item| self.escape(item))
                .collect::<FormatResult<Vec<_>>>()?
                .join(", ")),
            Operand::Query(sub) if sub.select_clause().is_some() => self.format(sub),
            _ => Err(FormatError::InvalidArgument(
                "an in statement must contain one or more values or a select sub-query".to_string(),
            )),
        }
    }

    /// SQL for an operand: literals go through the escaper, fields stay
    /// identifiers and sub-queries are parenthesized
    pub fn escape(&self, operand: &Operand) -> FormatResult<String> {
        match operand {
            Operand::Value(value) => Ok(self.escaper.escape_literal(value)),
            Operand::Field(field) => self.format_field(field, FieldFormat::Filter),
            Operand::List(items) => Ok(items
                .iter()
                .map(|item| self.escape(item))
                .collect::<FormatResult<Vec<_>>>()?
                .join(", ")),
            Operand::Query(sub) => Ok(format!("({})", self.format(sub)?)),
        }
    }

    fn function_arg(&self, operand: &Operand) -> FormatResult<FunctionArg> {
        Ok(match operand {
            Operand::Value(Value::Null) => FunctionArg::null(),
            Operand::Value(value @ Value::Int(i)) => {
                let mut arg = FunctionArg::scalar(self.escaper.escape_literal(value));
                arg.int = Some(*i);
                arg
            }
            Operand::Value(value @ (Value::String(_) | Value::DateTime(_))) => {
                FunctionArg::quoted(self.escaper.escape_literal(value))
            }
            Operand::Value(value) => FunctionArg::scalar(self.escaper.escape_literal(value)),
            // fields, lists and sub-queries never become pattern text
            other => FunctionArg::raw(self.escape(other)?),
        })
    }

    /// Render a field for the select list or for ordering and grouping
    pub fn format_field(&self, field: &FieldRef, format: FieldFormat) -> FormatResult<String> {
        let (sql, alias) = match field {
            FieldRef::Name(name) => return Ok(name.clone()),
            FieldRef::Qualified { entity, name } => return Ok(format!("{}.{}", entity, name)),
            FieldRef::Aliased { alias, expr } => (expr.clone(), Some(alias.as_str())),
            FieldRef::Aggregate { alias, func, name } => {
                (format!("{}({})", func.sql_name(), name), Some(alias.as_str()))
            }
            FieldRef::Function { alias, func, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.function_arg(arg))
                    .collect::<FormatResult<Vec<_>>>()?;
                (self.functions.render(func, &args)?, Some(alias.as_str()))
            }
            FieldRef::Constant { value, alias } => {
                (self.escaper.escape_literal(value), alias.as_deref())
            }
        };
        Ok(match (format, alias) {
            (FieldFormat::Projection, Some(alias)) => format!("{} AS {}", sql, alias),
            _ => sql,
        })
    }

    /// ` ORDER BY ...`, or nothing when there is no ordering
    pub fn format_order(&self, order: &[OrderBy]) -> FormatResult<String> {
        let mut items = Vec::new();
        for entry in order {
            if entry.fields.is_empty() {
                return Err(FormatError::InvalidArgument(
                    "an order by object must name at least one field".to_string(),
                ));
            }
            for field in &entry.fields {
                items.push(format!(
                    "{} {}",
                    self.format_field(field, FieldFormat::Filter)?,
                    entry.direction.sql()
                ));
            }
        }
        Ok(if items.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", items.join(", "))
        })
    }

    pub fn format_group_by(&self, group: &[FieldRef]) -> FormatResult<String> {
        let items = group
            .iter()
            .map(|field| self.format_field(field, FieldFormat::Filter))
            .collect::<FormatResult<Vec<_>>>()?;
        Ok(if items.is_empty() {
            String::new()
        } else {
            format!(" GROUP BY {}", items.join(", "))
        })
    }
}

/// Bare column names in an equi-join are qualified with their side's table
fn qualify(table: &str, field: &str) -> String {
    if is_identifier(field) {
        format!("{}.{}", table, field)
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_ir::{query, where_, QueryEntity};

    fn sql(q: &QueryExpression) -> String {
        SqlFormatter::default().format(q).unwrap()
    }

    #[test]
    fn test_comparison_forms() {
        let f = SqlFormatter::default();
        let render = |filter: Filter| f.format_where(&filter).unwrap();

        assert_eq!(render(Filter::eq("a", 1)), "(a=1)");
        assert_eq!(render(Filter::eq("a", Operand::null())), "(a IS NULL)");
        assert_eq!(render(Filter::compare("a", ComparisonOp::Ne, "x")), "(NOT a='x')");
        assert_eq!(
            render(Filter::compare("a", ComparisonOp::Ne, Operand::null())),
            "(NOT a IS NULL)"
        );
        assert_eq!(render(Filter::compare("a", ComparisonOp::Gte, 5)), "(a>=5)");
        assert_eq!(render(Filter::compare("a", ComparisonOp::Lte, 5)), "(a<=5)");
        assert_eq!(render(Filter::compare("a", ComparisonOp::In, [1, 2])), "(a IN (1, 2))");
        assert_eq!(
            render(Filter::compare("a", ComparisonOp::Nin, Vec::<i64>::new())),
            "(NOT a IN (NULL))"
        );
    }

    #[test]
    fn test_in_rejects_scalar() {
        let err = SqlFormatter::default()
            .format_where(&Filter::compare("a", ComparisonOp::In, 4))
            .unwrap_err();
        assert!(matches!(err, FormatError::InvalidArgument(_)));
    }

    #[test]
    fn test_empty_logical_renders_nothing() {
        let mut q = query("users");
        q.select(["id"]);
        q.filter = Some(Filter::and(vec![Filter::or(vec![])]));
        assert_eq!(sql(&q), "SELECT id FROM users");
    }

    #[test]
    fn test_neutral_function_drops_comparison() {
        let filter = Filter::and(vec![
            Filter::eq("id", 1),
            Filter::function("name", "startswith", vec![Operand::null()], vec![Comparison::eq(true)]),
        ]);
        assert_eq!(SqlFormatter::default().format_where(&filter).unwrap(), "((id=1))");
    }

    #[test]
    fn test_projection_aliases_only_in_projection() {
        let f = SqlFormatter::default();
        let field = FieldRef::count("id").alias("total");
        assert_eq!(f.format_field(&field, FieldFormat::Projection).unwrap(), "COUNT(id) AS total");
        assert_eq!(f.format_field(&field, FieldFormat::Filter).unwrap(), "COUNT(id)");

        let field = FieldRef::month("orderDate").alias("m");
        assert_eq!(f.format_field(&field, FieldFormat::Projection).unwrap(), "MONTH(orderDate) AS m");
    }

    #[test]
    fn test_paging() {
        let mut q = query("users");
        q.select(["id"]).take(10);
        assert_eq!(sql(&q), "SELECT id FROM users LIMIT 10");
        q.skip(20);
        assert_eq!(sql(&q), "SELECT id FROM users LIMIT 20, 10");
        q.skip(0);
        assert_eq!(sql(&q), "SELECT id FROM users LIMIT 10");
    }

    #[test]
    fn test_fixed_select() {
        let mut q = query("users");
        q.select(["id", "name"]).fixed(true);
        assert_eq!(sql(&q), "SELECT * FROM (SELECT id, name) users");
    }

    #[test]
    fn test_bare_filter() {
        let mut q = where_("price");
        q.gt(5);
        assert_eq!(sql(&q), "(price>5)");
    }

    #[test]
    fn test_empty_query_is_invalid() {
        let err = SqlFormatter::default().format(&QueryExpression::new()).unwrap_err();
        assert!(matches!(err, FormatError::InvalidArgument(_)));
    }

    #[test]
    fn test_unknown_function_is_unknown_operator() {
        let filter = Filter::function("a", "soundex", vec![], vec![Comparison::eq(1)]);
        let err = SqlFormatter::default().format_where(&filter).unwrap_err();
        assert_eq!(err, FormatError::UnknownOperator("soundex".into()));
    }

    #[test]
    fn test_join_side_count_checked() {
        let mut q = query("a");
        q.select(["id"]);
        q.expand.push(JoinExpression {
            target: QueryEntity::new("b").into(),
            on: JoinCondition::Columns(vec![]),
            alias: None,
        });
        let err = SqlFormatter::default().format(&q).unwrap_err();
        assert!(matches!(err, FormatError::InvalidOperation(_)));
    }
}
