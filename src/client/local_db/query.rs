//! Record query predicates
//!
//! Supports exactly what the sync core needs: equality, `>=` ranges, set
//! membership and conjunction. Payload fields are addressed with
//! `json_extract`; every value is bound, never interpolated.

use crate::client::sync::sync_state::SyncState;
use crate::shared::protocol::Millis;
use sqlx::{QueryBuilder, Sqlite};

/// Column a predicate applies to
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    LocalId,
    ServerId,
    SyncState,
    UpdatedAt,
    /// Top-level payload field
    Payload(String),
}

impl Field {
    pub fn payload(name: impl Into<String>) -> Self {
        Field::Payload(name.into())
    }

    fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Field::LocalId => {
                qb.push("local_id");
            }
            Field::ServerId => {
                qb.push("server_id");
            }
            Field::SyncState => {
                qb.push("sync_state");
            }
            Field::UpdatedAt => {
                qb.push("updated_at");
            }
            Field::Payload(name) => {
                qb.push("json_extract(payload, ");
                qb.push_bind(format!("$.{name}"));
                qb.push(")");
            }
        }
    }
}

/// A bindable SQL value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<bool> for SqlValue {
    // json_extract yields 1/0 for JSON booleans
    fn from(value: bool) -> Self {
        SqlValue::Integer(value as i64)
    }
}

impl From<SyncState> for SqlValue {
    fn from(value: SyncState) -> Self {
        SqlValue::Text(value.as_str().to_string())
    }
}

impl SqlValue {
    fn push_bind(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            SqlValue::Null => {
                qb.push("NULL");
            }
            SqlValue::Integer(v) => {
                qb.push_bind(*v);
            }
            SqlValue::Real(v) => {
                qb.push_bind(*v);
            }
            SqlValue::Text(v) => {
                qb.push_bind(v.clone());
            }
        }
    }
}

/// Filter over the rows of one table
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Every row
    All,
    Eq(Field, SqlValue),
    Gte(Field, SqlValue),
    In(Field, Vec<SqlValue>),
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: Field, value: impl Into<SqlValue>) -> Self {
        Predicate::Eq(field, value.into())
    }

    pub fn gte(field: Field, value: impl Into<SqlValue>) -> Self {
        Predicate::Gte(field, value.into())
    }

    pub fn one_of<V: Into<SqlValue>>(field: Field, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(field, values.into_iter().map(Into::into).collect())
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::All => other,
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// Rows in the given state
    pub fn state(state: SyncState) -> Self {
        Self::eq(Field::SyncState, state)
    }

    /// Rows waiting for the next push
    pub fn needs_push() -> Self {
        Self::one_of(Field::SyncState, [SyncState::Pending, SyncState::Deleted])
    }

    /// Rows modified at or after `since`
    pub fn updated_since(since: Millis) -> Self {
        Self::gte(Field::UpdatedAt, since)
    }

    /// Payload field equality
    pub fn field_eq(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::eq(Field::payload(name), value)
    }

    pub(crate) fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Predicate::All => {
                qb.push("1 = 1");
            }
            Predicate::Eq(field, SqlValue::Null) => {
                field.push_sql(qb);
                qb.push(" IS NULL");
            }
            Predicate::Eq(field, value) => {
                field.push_sql(qb);
                qb.push(" = ");
                value.push_bind(qb);
            }
            Predicate::Gte(field, value) => {
                field.push_sql(qb);
                qb.push(" >= ");
                value.push_bind(qb);
            }
            Predicate::In(_, values) if values.is_empty() => {
                qb.push("1 = 0");
            }
            Predicate::In(field, values) => {
                field.push_sql(qb);
                qb.push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        qb.push(", ");
                    }
                    value.push_bind(qb);
                }
                qb.push(")");
            }
            Predicate::And(parts) if parts.is_empty() => {
                qb.push("1 = 1");
            }
            Predicate::And(parts) => {
                qb.push("(");
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        qb.push(" AND ");
                    }
                    part.push_sql(qb);
                }
                qb.push(")");
            }
        }
    }
}
