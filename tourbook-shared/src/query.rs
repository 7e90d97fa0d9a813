/// List query parsing and evaluation
///
/// Turns request query parameters into a typed [`ListQuery`]:
///
/// ```text
/// ?difficulty=easy&price[lte]=500&sort=-ratings_average,price&fields=name,price&page=2&limit=10
/// ```
///
/// - `field=value` / `field[op]=value` with `op` in `gt`, `gte`, `lt`, `lte`, `ne`
/// - `sort`: comma-separated fields, `-` prefix for descending
/// - `fields`: comma-separated fields to keep, or `-field` to drop
/// - `page` / `limit`: 1-based pagination, default limit 100
///
/// Filter and sort fields are checked against the entity's column table, so
/// every field name that reaches SQL comes from a `&'static` whitelist.
///
/// # Example
///
/// ```
/// use tourbook_shared::query::{Column, ColumnKind, ListQuery};
///
/// const COLUMNS: &[Column] = &[
///     Column::new("name", ColumnKind::Text),
///     Column::new("price", ColumnKind::Number),
///     Column::new("created_at", ColumnKind::Timestamp),
/// ];
///
/// let params = vec![
///     ("price[gte]".to_string(), "100".to_string()),
///     ("sort".to_string(), "-price".to_string()),
/// ];
/// let query = ListQuery::parse(COLUMNS, &params).unwrap();
/// assert_eq!(query.filters.len(), 1);
/// assert!(query.sort[0].descending);
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use uuid::Uuid;

/// Page size used when `limit` is not given
pub const DEFAULT_LIMIT: u32 = 100;

/// Largest page size a client may request
pub const MAX_LIMIT: u32 = 1000;

const RESERVED_PARAMS: &[&str] = &["page", "sort", "limit", "fields"];

/// Error type for query parameter parsing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// Field is not filterable/sortable for this resource
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Unsupported comparison operator
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    /// Value could not be parsed for the column type
    #[error("Invalid value '{value}' for field '{field}': expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: &'static str,
    },

    /// Malformed pagination parameter
    #[error("Invalid {param}: '{value}' must be a positive integer")]
    InvalidPagination { param: &'static str, value: String },
}

/// Storage type of a queryable column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Number,
    Bool,
    Uuid,
    Timestamp,
}

impl ColumnKind {
    fn describe(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Number => "a number",
            ColumnKind::Bool => "true or false",
            ColumnKind::Uuid => "a UUID",
            ColumnKind::Timestamp => "an RFC 3339 timestamp or YYYY-MM-DD date",
        }
    }
}

/// A filterable/sortable column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    /// Parses the bracketed operator of `field[op]`
    pub fn parse(op: &str) -> Result<Self, QueryError> {
        match op {
            "eq" => Ok(FilterOp::Eq),
            "ne" => Ok(FilterOp::Ne),
            "gt" => Ok(FilterOp::Gt),
            "gte" => Ok(FilterOp::Gte),
            "lt" => Ok(FilterOp::Lt),
            "lte" => Ok(FilterOp::Lte),
            other => Err(QueryError::UnknownOperator(other.to_string())),
        }
    }

    /// SQL operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Ne => ordering != Ordering::Equal,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Gte => ordering != Ordering::Less,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Lte => ordering != Ordering::Greater,
        }
    }
}

/// Typed filter operand
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl FilterValue {
    /// Parses a raw query-string value for a column kind
    pub fn parse(column: &Column, raw: &str) -> Result<Self, QueryError> {
        let invalid = || QueryError::InvalidValue {
            field: column.name.to_string(),
            value: raw.to_string(),
            expected: column.kind.describe(),
        };

        match column.kind {
            ColumnKind::Text => Ok(FilterValue::Text(raw.to_string())),
            ColumnKind::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(FilterValue::Number)
                .ok_or_else(invalid),
            ColumnKind::Bool => match raw {
                "true" => Ok(FilterValue::Bool(true)),
                "false" => Ok(FilterValue::Bool(false)),
                _ => Err(invalid()),
            },
            ColumnKind::Uuid => Uuid::parse_str(raw)
                .map(FilterValue::Uuid)
                .map_err(|_| invalid()),
            ColumnKind::Timestamp => parse_timestamp(raw)
                .map(FilterValue::Timestamp)
                .ok_or_else(invalid),
        }
    }

    /// Compares this operand with a serialized field value
    ///
    /// Returns `None` when the value is null or of a different shape; such
    /// values never match a filter.
    fn compare_to(&self, value: &Value) -> Option<Ordering> {
        match (self, value) {
            (FilterValue::Text(expected), Value::String(actual)) => {
                Some(actual.as_str().cmp(expected.as_str()))
            }
            (FilterValue::Number(expected), Value::Number(actual)) => {
                actual.as_f64()?.partial_cmp(expected)
            }
            (FilterValue::Bool(expected), Value::Bool(actual)) => Some(actual.cmp(expected)),
            (FilterValue::Uuid(expected), Value::String(actual)) => {
                Uuid::parse_str(actual).ok().map(|id| id.cmp(expected))
            }
            (FilterValue::Timestamp(expected), Value::String(actual)) => {
                parse_timestamp(actual).map(|ts| ts.cmp(expected))
            }
            _ => None,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// A single `field op value` condition
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: &'static str,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(field: &'static str, op: FilterOp, value: FilterValue) -> Self {
        Self { field, op, value }
    }

    /// Equality filter
    pub fn eq(field: &'static str, value: FilterValue) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    /// Evaluates the filter against a serialized document
    pub fn matches(&self, document: &Value) -> bool {
        let Some(value) = document.get(self.field) else {
            return false;
        };

        self.value
            .compare_to(value)
            .map(|ordering| self.op.holds(ordering))
            .unwrap_or(false)
    }
}

/// Sort key, `descending` for a `-field` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static str,
    pub descending: bool,
}

impl SortKey {
    pub const fn asc(field: &'static str) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub const fn desc(field: &'static str) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

/// Field selection applied to response documents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    /// Parses the `fields` parameter
    ///
    /// A list mixing inclusions and exclusions keeps only the inclusions.
    pub fn parse(raw: &str) -> Self {
        let fields: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect();

        if fields.is_empty() {
            return Projection::All;
        }

        let included: Vec<String> = fields
            .iter()
            .filter(|f| !f.starts_with('-'))
            .map(|f| f.to_string())
            .collect();

        if !included.is_empty() {
            return Projection::Include(included);
        }

        Projection::Exclude(
            fields
                .iter()
                .map(|f| f.trim_start_matches('-').to_string())
                .collect(),
        )
    }

    /// Applies the projection to a serialized document
    ///
    /// `id` is always kept by inclusion lists.
    pub fn apply(&self, document: Value) -> Value {
        match (self, document) {
            (Projection::All, document) => document,
            (Projection::Include(fields), Value::Object(map)) => Value::Object(
                map.into_iter()
                    .filter(|(key, _)| key == "id" || fields.iter().any(|f| f == key))
                    .collect::<Map<String, Value>>(),
            ),
            (Projection::Exclude(fields), Value::Object(map)) => Value::Object(
                map.into_iter()
                    .filter(|(key, _)| !fields.iter().any(|f| f == key))
                    .collect::<Map<String, Value>>(),
            ),
            (_, other) => other,
        }
    }
}

/// Parsed list request
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    /// 1-based page number
    pub page: u32,
    /// `None` returns every match
    pub limit: Option<u32>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            sort: Vec::new(),
            projection: Projection::All,
            page: 1,
            limit: None,
        }
    }
}

impl ListQuery {
    /// Unpaginated query matching everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Parses request query parameters against a column table
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] for unknown fields or operators, values that
    /// don't fit the column type, and non-positive pagination values.
    pub fn parse(columns: &'static [Column], params: &[(String, String)]) -> Result<Self, QueryError> {
        let mut query = ListQuery {
            limit: Some(DEFAULT_LIMIT),
            ..Default::default()
        };

        for (key, raw) in params {
            match key.as_str() {
                "page" => query.page = parse_positive("page", raw)?,
                "limit" => query.limit = Some(parse_positive("limit", raw)?.min(MAX_LIMIT)),
                "fields" => query.projection = Projection::parse(raw),
                "sort" => {
                    query.sort = raw
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| {
                            let (name, descending) = match s.strip_prefix('-') {
                                Some(name) => (name, true),
                                None => (s, false),
                            };
                            let column = lookup(columns, name)?;
                            Ok(SortKey {
                                field: column.name,
                                descending,
                            })
                        })
                        .collect::<Result<Vec<_>, QueryError>>()?;
                }
                _ => {
                    let (name, op) = split_operator(key)?;
                    let column = lookup(columns, name)?;
                    let value = FilterValue::parse(column, raw)?;
                    query.filters.push(Filter::new(column.name, op, value));
                }
            }
        }

        Ok(query)
    }

    /// Adds a filter, builder style
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds several filters (resource scopes), builder style
    pub fn scoped(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Number of rows to skip
    pub fn offset(&self) -> u64 {
        match self.limit {
            Some(limit) => u64::from(self.page.saturating_sub(1)) * u64::from(limit),
            None => 0,
        }
    }

    /// Evaluates all filters against a serialized document
    pub fn matches(&self, document: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(document))
    }
}

fn split_operator(key: &str) -> Result<(&str, FilterOp), QueryError> {
    match key.split_once('[') {
        Some((name, rest)) => {
            let op = rest
                .strip_suffix(']')
                .ok_or_else(|| QueryError::UnknownOperator(rest.to_string()))?;
            Ok((name, FilterOp::parse(op)?))
        }
        None => Ok((key, FilterOp::Eq)),
    }
}

fn lookup(columns: &'static [Column], name: &str) -> Result<&'static Column, QueryError> {
    if RESERVED_PARAMS.contains(&name) {
        return Err(QueryError::UnknownField(name.to_string()));
    }

    columns
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| QueryError::UnknownField(name.to_string()))
}

fn parse_positive(param: &'static str, raw: &str) -> Result<u32, QueryError> {
    raw.parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| QueryError::InvalidPagination {
            param,
            value: raw.to_string(),
        })
}

/// Total order over serialized field values used by in-memory sorting
///
/// Nulls sort after every other value, matching PostgreSQL's default
/// `NULLS LAST` for ascending order.
pub fn compare_json(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
