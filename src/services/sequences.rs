use crate::{db::DbPool, errors::ServiceError};
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement, Value};
use std::sync::Arc;

/// Counter backing invoice numbers.
pub const INVOICE_SEQUENCE: &str = "invoice";
/// Counter backing warranty numbers.
pub const WARRANTY_SEQUENCE: &str = "warranty";

/// Monotonic named counters, unique under concurrent callers.
#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    async fn next_value(&self, name: &str) -> Result<i64, ServiceError>;
}

/// Atomically increments a counter row and returns the new value.
///
/// One statement claims the value, so concurrent callers never observe the same number.
pub async fn next_in<C>(conn: &C, name: &str) -> Result<i64, ServiceError>
where
    C: ConnectionTrait,
{
    let backend = conn.get_database_backend();
    let sql = match backend {
        DatabaseBackend::Postgres => {
            "INSERT INTO sequence_counters (name, value) VALUES ($1, 1) \
             ON CONFLICT (name) DO UPDATE SET value = sequence_counters.value + 1 \
             RETURNING value"
        }
        DatabaseBackend::Sqlite => {
            "INSERT INTO sequence_counters (name, value) VALUES (?, 1) \
             ON CONFLICT (name) DO UPDATE SET value = sequence_counters.value + 1 \
             RETURNING value"
        }
        _ => {
            return Err(ServiceError::InternalError(
                "sequence counters are not supported on MySQL".to_string(),
            ))
        }
    };
    let row = conn
        .query_one(Statement::from_sql_and_values(backend, sql, [Value::from(name)]))
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| {
            ServiceError::db_error(DbErr::Custom(format!(
                "sequence {} returned no value",
                name
            )))
        })?;
    row.try_get::<i64>("", "value")
        .map_err(ServiceError::db_error)
}

/// Human-readable document number, e.g. `INV-000042`.
pub fn format_number(prefix: &str, value: i64) -> String {
    format!("{}-{:06}", prefix, value)
}

/// Store-backed generator over the `sequence_counters` table.
#[derive(Clone)]
pub struct DbSequenceGenerator {
    db_pool: Arc<DbPool>,
}

impl DbSequenceGenerator {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SequenceGenerator for DbSequenceGenerator {
    async fn next_value(&self, name: &str) -> Result<i64, ServiceError> {
        next_in(self.db_pool.as_ref(), name).await
    }
}
