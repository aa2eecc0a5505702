//! SQLite-backed implementation of the deferred-call queue port.
//!
//! The claim step runs a scan+flip inside one immediate transaction, which
//! is acquired, used, and released before any network I/O happens. That
//! transaction is the mutual-exclusion point the whole delivery guarantee
//! rests on: two racing claims serialize on it, so no record is ever
//! observed as non-submitting by both.

use std::sync::Arc;

use async_trait::async_trait;
use lifeline_core::DeferredCallQueue;
use lifeline_domain::{DeferredCall, QueueError};
use rusqlite::types::Type;
use rusqlite::{params, Row, TransactionBehavior};
use tokio::task;

use super::manager::{map_sql_error, DbConnection, DbManager};

const INSERT_SQL: &str =
    "INSERT INTO deferred_calls (endpoint, method, params_json, submitting) VALUES (?1, ?2, ?3, 0)";

const SELECT_PENDING_SQL: &str =
    "SELECT id, endpoint, method, params_json, submitting FROM deferred_calls
     WHERE submitting = 0 ORDER BY id ASC";

const SELECT_SUBMITTING_SQL: &str =
    "SELECT id, endpoint, method, params_json, submitting FROM deferred_calls
     WHERE submitting = 1 ORDER BY id ASC";

const CLAIM_SQL: &str = "UPDATE deferred_calls SET submitting = 1 WHERE submitting = 0";

const UPDATE_SQL: &str =
    "UPDATE deferred_calls SET endpoint = ?2, method = ?3, params_json = ?4, submitting = ?5
     WHERE id = ?1";

const DELETE_SQL: &str = "DELETE FROM deferred_calls WHERE id = ?1";

const COUNT_SQL: &str = "SELECT COUNT(*) FROM deferred_calls";

/// SQLite-backed deferred-call queue.
pub struct SqliteCallQueue {
    db: Arc<DbManager>,
}

impl SqliteCallQueue {
    /// Construct a queue backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn insert_call(conn: &DbConnection, call: &DeferredCall) -> Result<i64, QueueError> {
        let params_json = encode_params(call)?;
        conn.execute(INSERT_SQL, params![call.endpoint, call.method, params_json])
            .map_err(map_sql_error)?;
        Ok(conn.last_insert_rowid())
    }

    fn claim_pending_tx(conn: &mut DbConnection) -> Result<Vec<DeferredCall>, QueueError> {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql_error)?;

        let mut claimed = {
            let mut stmt = tx.prepare(SELECT_PENDING_SQL).map_err(map_sql_error)?;
            let rows = stmt.query_map([], map_call_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
        };

        if !claimed.is_empty() {
            tx.execute(CLAIM_SQL, []).map_err(map_sql_error)?;
        }
        tx.commit().map_err(map_sql_error)?;

        for call in &mut claimed {
            call.submitting = true;
        }
        Ok(claimed)
    }

    fn list_submitting_sync(conn: &DbConnection) -> Result<Vec<DeferredCall>, QueueError> {
        let mut stmt = conn.prepare(SELECT_SUBMITTING_SQL).map_err(map_sql_error)?;
        let rows = stmt.query_map([], map_call_row).map_err(map_sql_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
    }
}

#[async_trait]
impl DeferredCallQueue for SqliteCallQueue {
    async fn enqueue(&self, call: DeferredCall) -> Result<DeferredCall, QueueError> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<DeferredCall, QueueError> {
            let conn = db.get_connection()?;
            let id = Self::insert_call(&conn, &call)?;
            Ok(DeferredCall { id: Some(id), submitting: false, ..call })
        })
        .await
        .map_err(map_join_error)?
    }

    async fn claim_pending(&self) -> Result<Vec<DeferredCall>, QueueError> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<DeferredCall>, QueueError> {
            let mut conn = db.get_connection()?;
            Self::claim_pending_tx(&mut conn)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_submitting(&self) -> Result<Vec<DeferredCall>, QueueError> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<DeferredCall>, QueueError> {
            let conn = db.get_connection()?;
            Self::list_submitting_sync(&conn)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn update(&self, call: &DeferredCall) -> Result<(), QueueError> {
        let Some(id) = call.id else {
            return Err(QueueError::Storage("cannot update an unpersisted call".into()));
        };
        let db = Arc::clone(&self.db);
        let call = call.clone();

        task::spawn_blocking(move || -> Result<(), QueueError> {
            let conn = db.get_connection()?;
            let params_json = encode_params(&call)?;
            conn.execute(
                UPDATE_SQL,
                params![id, call.endpoint, call.method, params_json, call.submitting],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn delete(&self, id: i64) -> Result<(), QueueError> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<(), QueueError> {
            let conn = db.get_connection()?;
            // Affects zero rows for an absent id; that is the contract.
            conn.execute(DELETE_SQL, params![id]).map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn count(&self) -> Result<usize, QueueError> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<usize, QueueError> {
            let conn = db.get_connection()?;
            let count: i64 =
                conn.query_row(COUNT_SQL, [], |row| row.get(0)).map_err(map_sql_error)?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_call_row(row: &Row<'_>) -> rusqlite::Result<DeferredCall> {
    let params_json: Option<String> = row.get(3)?;
    let params = match params_json {
        Some(text) => Some(serde_json::from_str(&text).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(err))
        })?),
        None => None,
    };

    Ok(DeferredCall {
        id: Some(row.get(0)?),
        endpoint: row.get(1)?,
        method: row.get(2)?,
        params,
        submitting: row.get::<_, i64>(4)? != 0,
    })
}

fn encode_params(call: &DeferredCall) -> Result<Option<String>, QueueError> {
    call.params
        .as_ref()
        .map(|value| {
            serde_json::to_string(value).map_err(|err| QueueError::Serialization(err.to_string()))
        })
        .transpose()
}

fn map_join_error(err: task::JoinError) -> QueueError {
    if err.is_cancelled() {
        QueueError::Task("queue task cancelled".into())
    } else {
        QueueError::Task(format!("queue task panic: {err}"))
    }
}
