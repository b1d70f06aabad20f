//! `$`-keyed JSON wire form
//!
//! The IR is a set of closed enums; this module is the only place that inspects
//! reserved keys. Writing is infallible and deterministic. Reading rejects
//! unknown reserved keys and ambiguous statements.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use crate::{
    Aggregate, Comparison, ComparisonOp, EntityValues, FieldRef, Filter, JoinCondition,
    JoinExpression, JoinSide, JoinTarget, LogicalOp, Operand, OrderBy, QueryEntity, QueryError,
    QueryExpression, QueryResult, SelectClause, SortDirection, Statement, Value,
};

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";
const DATE_INPUT_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.fZ"];

const STATEMENT_KEYS: [&str; 4] = ["$select", "$insert", "$update", "$delete"];

fn invalid(msg: impl Into<String>) -> QueryError {
    QueryError::InvalidArgument(msg.into())
}

fn single(key: &str, value: JsonValue) -> JsonValue {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    JsonValue::Object(map)
}

/// The one own key of an object, as the wire form requires
fn single_entry<'a>(map: &'a Map<String, JsonValue>, what: &str) -> QueryResult<(&'a String, &'a JsonValue)> {
    let mut entries = map.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(invalid(format!(
            "{} must have exactly one key, found {}",
            what,
            map.len()
        ))),
    }
}

fn as_str<'a>(value: &'a JsonValue, what: &str) -> QueryResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| invalid(format!("{} must be a string, got {}", what, value)))
}

fn as_array<'a>(value: &'a JsonValue, what: &str) -> QueryResult<&'a Vec<JsonValue>> {
    value
        .as_array()
        .ok_or_else(|| invalid(format!("{} must be an array, got {}", what, value)))
}

fn as_object<'a>(value: &'a JsonValue, what: &str) -> QueryResult<&'a Map<String, JsonValue>> {
    value
        .as_object()
        .ok_or_else(|| invalid(format!("{} must be an object, got {}", what, value)))
}

fn write_all<T>(items: &[T], write: impl Fn(&T) -> JsonValue) -> JsonValue {
    JsonValue::Array(items.iter().map(write).collect())
}

fn read_all<T>(items: &[JsonValue], read: impl Fn(&JsonValue) -> QueryResult<T>) -> QueryResult<Vec<T>> {
    items.iter().map(read).collect()
}

/// A single item or an array of items
fn one_or_many(value: &JsonValue) -> &[JsonValue] {
    match value {
        JsonValue::Array(items) => items,
        other => std::slice::from_ref(other),
    }
}

fn parse_date(text: &str) -> QueryResult<NaiveDateTime> {
    DATE_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .ok_or_else(|| invalid(format!("invalid date-time literal '{}'", text)))
}

/// `{alias: "expr"}` or `{alias: {$op: ...}}`
fn is_field_definition(map: &Map<String, JsonValue>) -> bool {
    match single_entry(map, "field") {
        Ok((alias, JsonValue::String(_))) => !alias.starts_with('$'),
        Ok((alias, JsonValue::Object(inner))) => {
            !alias.starts_with('$') && inner.len() == 1 && inner.keys().all(|key| key.starts_with('$'))
        }
        _ => false,
    }
}

impl Value {
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::DateTime(dt) => single("$date", JsonValue::String(dt.format(DATE_FORMAT).to_string())),
        }
    }

    pub fn from_json(json: &JsonValue) -> QueryResult<Self> {
        match json {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| invalid(format!("unsupported number {}", n))),
            },
            JsonValue::String(s) => Ok(Value::String(s.clone())),
            JsonValue::Object(map) => match map.get("$date") {
                Some(date) if map.len() == 1 => Ok(Value::DateTime(parse_date(as_str(date, "$date")?)?)),
                _ => Err(invalid(format!("expected a literal value, got {}", json))),
            },
            JsonValue::Array(_) => Err(invalid(format!("expected a literal value, got {}", json))),
        }
    }
}

impl Operand {
    pub fn to_json(&self) -> JsonValue {
        match self {
            Operand::Value(value) => value.to_json(),
            Operand::Field(field) => field.to_json(),
            Operand::List(items) => write_all(items, Operand::to_json),
            Operand::Query(query) => query.to_json(),
        }
    }

    pub fn from_json(json: &JsonValue) -> QueryResult<Self> {
        match json {
            JsonValue::Array(items) => Ok(Operand::List(read_all(items, Operand::from_json)?)),
            JsonValue::Object(map) if map.contains_key("$date") => Ok(Operand::Value(Value::from_json(json)?)),
            JsonValue::Object(map) if map.contains_key("$name") || map.contains_key("$value") => {
                Ok(Operand::Field(FieldRef::from_json(json)?))
            }
            JsonValue::Object(map) if STATEMENT_KEYS.iter().any(|key| map.contains_key(*key)) => {
                Ok(Operand::Query(Box::new(QueryExpression::from_json(json)?)))
            }
            JsonValue::Object(map) if is_field_definition(map) => Ok(Operand::Field(FieldRef::from_json(json)?)),
            JsonValue::Object(_) => Err(invalid(format!("unrecognized operand {}", json))),
            scalar => Ok(Operand::Value(Value::from_json(scalar)?)),
        }
    }
}

impl FieldRef {
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldRef::Name(name) => single("$name", JsonValue::String(name.clone())),
            FieldRef::Qualified { entity, name } => {
                single("$name", JsonValue::String(format!("{}.{}", entity, name)))
            }
            FieldRef::Aliased { alias, expr } => single(alias, JsonValue::String(expr.clone())),
            FieldRef::Aggregate { alias, func, name } => {
                single(alias, single(func.key(), JsonValue::String(name.clone())))
            }
            FieldRef::Function { alias, func, args } => {
                single(alias, single(&format!("${}", func), write_all(args, Operand::to_json)))
            }
            FieldRef::Constant { value, alias: None } => single("$value", value.to_json()),
            FieldRef::Constant {
                value,
                alias: Some(alias),
            } => single(alias, single("$value", value.to_json())),
        }
    }

    /// Reads a field; a bare string is a field name
    pub fn from_json(json: &JsonValue) -> QueryResult<Self> {
        let map = match json {
            JsonValue::String(name) => return Ok(FieldRef::select(name.as_str())),
            JsonValue::Object(map) => map,
            other => return Err(invalid(format!("expected a field, got {}", other))),
        };
        let (key, value) = single_entry(map, "field")?;
        match key.as_str() {
            "$name" => Ok(FieldRef::select(as_str(value, "$name")?)),
            "$value" => Ok(FieldRef::Constant {
                value: Value::from_json(value)?,
                alias: None,
            }),
            reserved if reserved.starts_with('$') => Err(QueryError::UnknownOperator(reserved.to_string())),
            alias => match value {
                JsonValue::String(expr) => Ok(FieldRef::Aliased {
                    alias: alias.to_string(),
                    expr: expr.clone(),
                }),
                JsonValue::Object(inner) => {
                    let (func, arg) = single_entry(inner, "field expression")?;
                    Self::expression_from_json(alias, func, arg)
                }
                other => Err(invalid(format!("invalid definition for field '{}': {}", alias, other))),
            },
        }
    }

    fn expression_from_json(alias: &str, key: &str, arg: &JsonValue) -> QueryResult<Self> {
        if key == "$value" {
            return Ok(FieldRef::Constant {
                value: Value::from_json(arg)?,
                alias: Some(alias.to_string()),
            });
        }
        if let Some(func) = Aggregate::from_key(key) {
            return Ok(FieldRef::Aggregate {
                alias: alias.to_string(),
                func,
                name: as_str(arg, key)?.to_string(),
            });
        }
        match key.strip_prefix('$') {
            Some(func) if !func.is_empty() => Ok(FieldRef::Function {
                alias: alias.to_string(),
                func: func.to_string(),
                args: read_all(one_or_many(arg), Operand::from_json)?,
            }),
            _ => Err(QueryError::UnknownOperator(key.to_string())),
        }
    }
}

impl QueryEntity {
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert(
            self.name.clone(),
            write_all(&self.fields, FieldRef::to_json),
        );
        if let Some(alias) = &self.alias {
            map.insert("$as".to_string(), JsonValue::String(alias.clone()));
        }
        JsonValue::Object(map)
    }

    pub fn from_json(json: &JsonValue) -> QueryResult<Self> {
        if let JsonValue::String(name) = json {
            return Ok(QueryEntity::new(name.as_str()));
        }
        let map = as_object(json, "entity")?;
        let mut entity: Option<QueryEntity> = None;
        let mut alias = None;
        for (key, value) in map {
            if key == "$as" {
                alias = Some(as_str(value, "$as")?.to_string());
            } else if key.starts_with('$') {
                return Err(QueryError::UnknownOperator(key.clone()));
            } else if entity.is_some() {
                return Err(invalid("entity must name exactly one table"));
            } else {
                let fields = match value {
                    JsonValue::Null => Vec::new(),
                    other => read_all(one_or_many(other), FieldRef::from_json)?,
                };
                entity = Some(QueryEntity::new(key.as_str()).with_fields(fields));
            }
        }
        let mut entity = entity.ok_or_else(|| invalid("entity must name exactly one table"))?;
        entity.alias = alias;
        Ok(entity)
    }
}

impl Comparison {
    fn tests_to_json(tests: &[Comparison]) -> JsonValue {
        JsonValue::Object(
            tests
                .iter()
                .map(|test| (test.op.key().to_string(), test.operand.to_json()))
                .collect(),
        )
    }

    /// `{op: operand, ...}` when every key is a comparison operator
    fn tests_from_json(map: &Map<String, JsonValue>) -> Option<QueryResult<Vec<Comparison>>> {
        if !map.keys().all(|key| ComparisonOp::from_key(key).is_some()) {
            return None;
        }
        Some(
            map.iter()
                .filter_map(|(key, value)| {
                    ComparisonOp::from_key(key).map(|op| Ok(Comparison::new(op, Operand::from_json(value)?)))
                })
                .collect(),
        )
    }
}

impl Filter {
    pub fn to_json(&self) -> JsonValue {
        match self {
            Filter::Logical { op, operands } => single(op.key(), write_all(operands, Filter::to_json)),
            Filter::Compare { field, comparison } => single(
                field,
                single(comparison.op.key(), comparison.operand.to_json()),
            ),
            Filter::Function {
                field,
                name,
                args,
                tests,
            } => {
                let last = match tests.as_slice() {
                    [Comparison {
                        op: ComparisonOp::Eq,
                        operand: Operand::Value(value),
                    }] => value.to_json(),
                    _ => Comparison::tests_to_json(tests),
                };
                let mut items: Vec<JsonValue> = args.iter().map(Operand::to_json).collect();
                items.push(last);
                single(field, single(&format!("${}", name), JsonValue::Array(items)))
            }
        }
    }

    pub fn from_json(json: &JsonValue) -> QueryResult<Self> {
        let map = as_object(json, "filter")?;
        let (key, value) = single_entry(map, "filter")?;
        if let Some(op) = LogicalOp::from_key(key) {
            let operands = value.as_array().ok_or_else(|| {
                invalid("a logical expression must contain one or more comparison expressions")
            })?;
            return Ok(Filter::Logical {
                op,
                operands: read_all(operands, Filter::from_json)?,
            });
        }
        if key.starts_with('$') {
            return Err(QueryError::UnknownOperator(key.clone()));
        }
        Self::field_from_json(key, value)
    }

    fn field_from_json(field: &str, value: &JsonValue) -> QueryResult<Self> {
        let inner = match value {
            JsonValue::Object(inner) => inner,
            other => return Ok(Filter::eq(field, Operand::from_json(other)?)),
        };
        if inner.is_empty() {
            return Ok(Filter::eq(field, Operand::null()));
        }
        if let Some(tests) = Comparison::tests_from_json(inner) {
            let mut filters: Vec<Filter> = tests?
                .into_iter()
                .map(|comparison| Filter::Compare {
                    field: field.to_string(),
                    comparison,
                })
                .collect();
            return Ok(match filters.len() {
                1 => filters.remove(0),
                _ => Filter::and(filters),
            });
        }
        let (key, arg) = single_entry(inner, "comparison")?;
        if matches!(key.as_str(), "$name" | "$date" | "$value") || STATEMENT_KEYS.contains(&key.as_str()) {
            return Ok(Filter::eq(field, Operand::from_json(value)?));
        }
        let name = key
            .strip_prefix('$')
            .filter(|name| !name.is_empty())
            .ok_or_else(|| QueryError::UnknownOperator(key.clone()))?;

        let (args, tests) = match arg {
            JsonValue::Array(items) => match items.split_last() {
                Some((last, rest)) => {
                    let args = read_all(rest, Operand::from_json)?;
                    (args, Self::tests_from_last(last)?)
                }
                None => (Vec::new(), Vec::new()),
            },
            other => (Vec::new(), Self::tests_from_last(other)?),
        };
        Ok(Filter::function(field, name, args, tests))
    }

    fn tests_from_last(last: &JsonValue) -> QueryResult<Vec<Comparison>> {
        if let JsonValue::Object(map) = last {
            if let Some(tests) = Comparison::tests_from_json(map) {
                return tests;
            }
        }
        Ok(vec![Comparison::eq(Operand::from_json(last)?)])
    }
}

impl JoinSide {
    pub fn to_json(&self) -> JsonValue {
        single(
            &self.entity,
            JsonValue::Array(self.fields.iter().cloned().map(JsonValue::String).collect()),
        )
    }

    pub fn from_json(json: &JsonValue) -> QueryResult<Self> {
        let (entity, fields) = single_entry(as_object(json, "join side")?, "join side")?;
        let fields = one_or_many(fields)
            .iter()
            .map(|field| as_str(field, "join field").map(str::to_string))
            .collect::<QueryResult<_>>()?;
        Ok(JoinSide {
            entity: entity.clone(),
            fields,
        })
    }
}

impl JoinCondition {
    pub fn to_json(&self) -> JsonValue {
        match self {
            JoinCondition::Columns(sides) => write_all(sides, JoinSide::to_json),
            JoinCondition::Filter(filter) => filter.to_json(),
        }
    }

    pub fn from_json(json: &JsonValue) -> QueryResult<Self> {
        match json {
            JsonValue::Array(sides) => Ok(JoinCondition::Columns(read_all(sides, JoinSide::from_json)?)),
            other => Ok(JoinCondition::Filter(Filter::from_json(other)?)),
        }
    }
}

impl JoinExpression {
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        let target = match &self.target {
            JoinTarget::Entity(entity) => entity.to_json(),
            JoinTarget::Query(query) => query.to_json(),
        };
        map.insert("$entity".to_string(), target);
        map.insert("$with".to_string(), self.on.to_json());
        if let Some(alias) = &self.alias {
            map.insert("$as".to_string(), JsonValue::String(alias.clone()));
        }
        JsonValue::Object(map)
    }

    pub fn from_json(json: &JsonValue) -> QueryResult<Self> {
        let map = as_object(json, "join")?;
        if let Some(key) = map.keys().find(|key| !matches!(key.as_str(), "$entity" | "$with" | "$as")) {
            return Err(QueryError::UnknownOperator(key.clone()));
        }
        let target = map
            .get("$entity")
            .ok_or_else(|| invalid("join expression requires $entity"))?;
        let target = match target {
            JsonValue::Object(inner) if inner.contains_key("$select") => {
                JoinTarget::Query(Box::new(QueryExpression::from_json(target)?))
            }
            other => JoinTarget::Entity(QueryEntity::from_json(other)?),
        };
        let on = map
            .get("$with")
            .ok_or_else(|| invalid("join expression requires $with"))?;
        let alias = map
            .get("$as")
            .map(|alias| as_str(alias, "$as").map(str::to_string))
            .transpose()?;
        Ok(JoinExpression {
            target,
            on: JoinCondition::from_json(on)?,
            alias,
        })
    }
}

impl OrderBy {
    pub fn to_json(&self) -> JsonValue {
        let fields = match self.fields.as_slice() {
            [field] => field.to_json(),
            fields => write_all(fields, FieldRef::to_json),
        };
        single(self.direction.key(), fields)
    }

    pub fn from_json(json: &JsonValue) -> QueryResult<Self> {
        let (key, fields) = single_entry(as_object(json, "order")?, "order")?;
        let direction = match key.as_str() {
            "$asc" => SortDirection::Asc,
            "$desc" => SortDirection::Desc,
            _ => {
                return Err(invalid(
                    "an order by object must have either ascending or descending property",
                ))
            }
        };
        Ok(OrderBy {
            direction,
            fields: read_all(one_or_many(fields), FieldRef::from_json)?,
        })
    }
}

fn values_to_json(values: &EntityValues) -> JsonValue {
    single(
        &values.entity,
        JsonValue::Object(
            values
                .values
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        ),
    )
}

fn values_from_json(json: &JsonValue, what: &str) -> QueryResult<EntityValues> {
    let (entity, values) = single_entry(as_object(json, what)?, what)?;
    let values = as_object(values, what)?
        .iter()
        .map(|(key, value)| Ok((key.clone(), Operand::from_json(value)?)))
        .collect::<QueryResult<IndexMap<_, _>>>()?;
    Ok(EntityValues {
        entity: entity.clone(),
        values,
    })
}

impl Statement {
    fn key(&self) -> &'static str {
        match self {
            Statement::Select(_) => "$select",
            Statement::Insert(_) => "$insert",
            Statement::Update(_) => "$update",
            Statement::Delete(_) => "$delete",
        }
    }

    fn body_to_json(&self) -> JsonValue {
        match self {
            Statement::Select(select) => single(&select.entity, write_all(&select.fields, FieldRef::to_json)),
            Statement::Insert(values) | Statement::Update(values) => values_to_json(values),
            Statement::Delete(entity) => JsonValue::String(entity.clone()),
        }
    }

    fn from_json(key: &str, body: &JsonValue) -> QueryResult<Self> {
        match key {
            "$select" => {
                let entity = QueryEntity::from_json(body)?;
                Ok(Statement::Select(SelectClause {
                    entity: entity.name,
                    fields: entity.fields,
                }))
            }
            "$insert" => Ok(Statement::Insert(values_from_json(body, "$insert")?)),
            "$update" => Ok(Statement::Update(values_from_json(body, "$update")?)),
            "$delete" => Ok(Statement::Delete(as_str(body, "$delete")?.to_string())),
            other => Err(QueryError::UnknownOperator(other.to_string())),
        }
    }
}

fn optional_u64(value: &JsonValue, key: &str) -> QueryResult<Option<u64>> {
    match value {
        JsonValue::Null => Ok(None),
        other => other
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(format!("{} must be a non-negative integer", key))),
    }
}

fn optional_bool(value: &JsonValue, key: &str) -> QueryResult<bool> {
    match value {
        JsonValue::Null => Ok(false),
        other => other
            .as_bool()
            .ok_or_else(|| invalid(format!("{} must be a boolean", key))),
    }
}

impl QueryExpression {
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        if let Some(statement) = &self.statement {
            map.insert(statement.key().to_string(), statement.body_to_json());
        }
        match self.expand.as_slice() {
            [] => {}
            [join] => {
                map.insert("$expand".to_string(), join.to_json());
            }
            joins => {
                map.insert("$expand".to_string(), write_all(joins, JoinExpression::to_json));
            }
        }
        if let Some(filter) = &self.filter {
            map.insert("$where".to_string(), filter.to_json());
        }
        if let Some(prepared) = &self.prepared {
            map.insert("$prepared".to_string(), prepared.to_json());
        }
        if !self.order.is_empty() {
            map.insert("$order".to_string(), write_all(&self.order, OrderBy::to_json));
        }
        if !self.group.is_empty() {
            map.insert("$group".to_string(), write_all(&self.group, FieldRef::to_json));
        }
        if self.distinct {
            map.insert("$distinct".to_string(), JsonValue::Bool(true));
        }
        if self.fixed {
            map.insert("$fixed".to_string(), JsonValue::Bool(true));
        }
        if let Some(skip) = self.skip {
            map.insert("$skip".to_string(), JsonValue::from(skip));
        }
        if let Some(take) = self.take {
            map.insert("$take".to_string(), JsonValue::from(take));
        }
        if let Some(alias) = &self.alias {
            map.insert("$alias".to_string(), JsonValue::String(alias.clone()));
        }
        JsonValue::Object(map)
    }

    pub fn from_json(json: &JsonValue) -> QueryResult<Self> {
        let map = as_object(json, "query expression")?;
        let mut query = QueryExpression::new();
        for (key, value) in map {
            match key.as_str() {
                "$select" | "$insert" | "$update" | "$delete" => {
                    if let Some(existing) = &query.statement {
                        return Err(invalid(format!(
                            "query expression has both {} and {}",
                            existing.key(),
                            key
                        )));
                    }
                    query.statement = Some(Statement::from_json(key, value)?);
                }
                "$expand" => {
                    query.expand = read_all(one_or_many(value), JoinExpression::from_json)?;
                }
                "$where" if !value.is_null() => query.filter = Some(Filter::from_json(value)?),
                "$prepared" if !value.is_null() => query.prepared = Some(Filter::from_json(value)?),
                "$where" | "$prepared" => {}
                "$order" => {
                    query.order = read_all(as_array(value, "$order")?, OrderBy::from_json)?;
                }
                "$group" => {
                    query.group = read_all(one_or_many(value), FieldRef::from_json)?;
                }
                "$distinct" => query.distinct = optional_bool(value, key)?,
                "$fixed" => query.fixed = optional_bool(value, key)?,
                "$skip" => query.skip = optional_u64(value, key)?,
                "$take" => query.take = optional_u64(value, key)?,
                "$alias" => query.alias = Some(as_str(value, key)?.to_string()),
                other if other.starts_with('$') => {
                    return Err(QueryError::UnknownOperator(other.to_string()))
                }
                other => {
                    return Err(invalid(format!(
                        "unexpected key '{}' in query expression",
                        other
                    )))
                }
            }
        }
        Ok(query)
    }
}

macro_rules! json_codec {
    ($($ty:ty),* $(,)?) => {$(
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.to_json().serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let json = JsonValue::deserialize(deserializer)?;
                <$ty>::from_json(&json).map_err(serde::de::Error::custom)
            }
        }
    )*};
}

json_codec! {
    Value,
    Operand,
    FieldRef,
    QueryEntity,
    Filter,
    JoinSide,
    JoinCondition,
    JoinExpression,
    OrderBy,
    QueryExpression,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_select_wire_form() {
        let mut q = query("products");
        q.select(["id", "title"]).where_("price").gt(100).take(10);

        assert_eq!(
            q.to_json(),
            json!({
                "$select": {"products": [{"$name": "id"}, {"$name": "title"}]},
                "$where": {"price": {"$gt": 100}},
                "$take": 10
            })
        );
    }

    #[test]
    fn test_bare_literal_means_equality() {
        let filter = Filter::from_json(&json!({"$and": [{"a": 1}, {"b": null}, {"c": {}}]})).unwrap();
        assert_eq!(
            filter,
            Filter::and(vec![
                Filter::eq("a", 1),
                Filter::eq("b", Operand::null()),
                Filter::eq("c", Operand::null()),
            ])
        );
    }

    #[test]
    fn test_field_reference_operand() {
        let filter = Filter::from_json(&json!({"employeeNumber": {"$name": "p0.target"}})).unwrap();
        assert_eq!(filter, Filter::eq("employeeNumber", Operand::field("p0.target")));
    }

    #[test]
    fn test_computed_field_operands() {
        for operand in [
            FieldRef::sum("x"),
            FieldRef::select("unitPrice").alias("price"),
            FieldRef::month("orderDate").alias("m"),
            FieldRef::constant(1).alias("one"),
        ] {
            let filter = Filter::compare("total", ComparisonOp::Gt, Operand::Field(operand));
            assert_eq!(Filter::from_json(&filter.to_json()).unwrap(), filter);
        }

        let err = Operand::from_json(&json!({"x": 1})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn test_function_filter_forms() {
        let filter = Filter::from_json(&json!({"Price": {"$add": [5, {"$gt": 100}]}})).unwrap();
        assert_eq!(
            filter,
            Filter::function(
                "Price",
                "add",
                vec![5.into()],
                vec![Comparison::new(ComparisonOp::Gt, 100)]
            )
        );

        let filter = Filter::from_json(&json!({"lastName": {"$startswith": ["Mu", true]}})).unwrap();
        assert_eq!(filter.to_json(), json!({"lastName": {"$startswith": ["Mu", true]}}));

        let filter = Filter::from_json(&json!({"name": {"$length": 5}})).unwrap();
        assert_eq!(filter, Filter::function("name", "length", vec![], vec![Comparison::eq(5)]));
    }

    #[test]
    fn test_field_forms() {
        let fields: Vec<FieldRef> = serde_json::from_value(json!([
            "id",
            {"$name": "orders.total"},
            {"total": "orders.amount"},
            {"orders": {"$count": "id"}},
            {"orderMonth": {"$month": [{"$name": "orderDate"}]}},
            {"one": {"$value": 1}}
        ]))
        .unwrap();

        assert_eq!(
            fields,
            vec![
                FieldRef::select("id"),
                FieldRef::select("orders.total"),
                FieldRef::select("orders.amount").alias("total"),
                FieldRef::count("id").alias("orders"),
                FieldRef::month("orderDate").alias("orderMonth"),
                FieldRef::constant(1).alias("one"),
            ]
        );
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let err = QueryExpression::from_json(&json!({
            "$select": {"t": ["a"]},
            "$delete": "t"
        }))
        .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn test_unknown_reserved_key_rejected() {
        let err = QueryExpression::from_json(&json!({"$select": {"t": []}, "$limit": 4})).unwrap_err();
        assert_eq!(err, QueryError::UnknownOperator("$limit".into()));
    }

    #[test]
    fn test_logical_requires_array() {
        let err = Filter::from_json(&json!({"$or": {"a": 1}})).unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn test_date_literal_round_trip() {
        let dt = NaiveDate::from_ymd_opt(2015, 4, 12)
            .unwrap()
            .and_hms_milli_opt(10, 20, 30, 400)
            .unwrap();
        let value = Value::DateTime(dt);
        assert_eq!(value.to_json(), json!({"$date": "2015-04-12T10:20:30.400"}));
        assert_eq!(Value::from_json(&value.to_json()).unwrap(), value);
    }

    #[test]
    fn test_expand_single_and_many() {
        let json = json!({
            "$select": {"employees": ["employeeNumber"]},
            "$expand": {
                "$entity": {"PermissionBase": [], "$as": "p0"},
                "$with": {"employeeNumber": {"$name": "p0.target"}}
            }
        });
        let mut q = QueryExpression::from_json(&json).unwrap();
        assert_eq!(q.expand.len(), 1);
        assert_eq!(q.expand[0].effective_alias(), Some("p0"));
        assert!(q.to_json()["$expand"].is_object());
        assert_eq!(QueryExpression::from_json(&q.to_json()).unwrap(), q);

        q.expand.push(q.expand[0].clone());
        assert!(q.to_json()["$expand"].is_array());
        assert_eq!(QueryExpression::from_json(&q.to_json()).unwrap().expand.len(), 2);
    }

    #[test]
    fn test_serde_round_trip_preserves_fingerprint() {
        let mut q = query("orders");
        q.select([FieldRef::select("id"), FieldRef::sum("total").alias("amount")])
            .where_("status")
            .is_in(["open", "pending"])
            .prepare(false);
        q.group_by(["customer"]).order_by_descending("id").skip(20).take(10);

        let text = serde_json::to_string(&q).unwrap();
        let back: QueryExpression = serde_json::from_str(&text).unwrap();
        assert_eq!(back, q);
        assert_eq!(back.fingerprint(), q.fingerprint());
    }
}
