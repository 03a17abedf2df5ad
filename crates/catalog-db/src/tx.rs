//! # Write Transactions
//!
//! SQLite read-modify-write under `BEGIN IMMEDIATE`.
//!
//! ## Why Not `pool.begin()`?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN (deferred)              BEGIN IMMEDIATE                          │
//! │                                                                         │
//! │  T1: SELECT status → SYNCED    T1: takes RESERVED lock                 │
//! │  T2: SELECT status → SYNCED    T2: waits (busy_timeout)                │
//! │  T1: UPDATE ... DIRTY          T1: SELECT / UPDATE / COMMIT            │
//! │  T2: UPDATE ... SYNCED ✗       T2: SELECT sees DIRTY ✓                 │
//! │      (lost update)                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A writer takes the database write lock before its first read, so the
//! status it reads is still the status when it writes.

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::warn;

use crate::error::DbResult;

/// A connection holding an open `BEGIN IMMEDIATE` transaction.
///
/// Every statement of the unit of work must go through [`WriteTx::conn`];
/// touching the pool from inside would wait on this very connection when
/// the pool has a single slot.
///
/// If dropped while still open the connection is closed instead of being
/// returned to the pool, which makes SQLite roll back.
pub(crate) struct WriteTx {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

impl WriteTx {
    pub(crate) async fn begin(pool: &SqlitePool) -> DbResult<Self> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(WriteTx { conn, open: true })
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub(crate) async fn commit(mut self) -> DbResult<()> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.open = false;
        Ok(())
    }

    pub(crate) async fn rollback(mut self) -> DbResult<()> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.open = false;
        Ok(())
    }

    /// Commits on `Ok`, rolls back on `Err`, and hands the result through.
    pub(crate) async fn finish<T>(self, result: DbResult<T>) -> DbResult<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        if self.open {
            self.conn.close_on_drop();
        }
    }
}
