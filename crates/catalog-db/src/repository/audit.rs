//! # Audit Repository
//!
//! Append-only trail of who changed what.
//!
//! Rows are written by the other repositories through [`record_in`], on the
//! same connection as the change they describe, so a rolled-back mutation
//! leaves no audit row behind.

use catalog_core::validation::clamp_limit;
use catalog_core::{Actor, AuditEntry, MAX_PAGE_SIZE};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;

/// Writes one audit row inside the caller's transaction.
///
/// ## Arguments
/// * `conn` - The connection holding the open write transaction
/// * `actor` - Who performed the mutation
/// * `action` - Dotted action name, e.g. `variant.update_price`
/// * `entity` / `entity_id` - What was changed
/// * `detail` - Action-specific JSON (omitted when `null`)
pub(crate) async fn record_in(
    conn: &mut SqliteConnection,
    actor: &Actor,
    action: &str,
    entity: &str,
    entity_id: impl ToString,
    detail: serde_json::Value,
) -> DbResult<()> {
    let id = Uuid::new_v4().to_string();
    let entity_id = entity_id.to_string();
    let detail = (!detail.is_null()).then(|| detail.to_string());

    sqlx::query(
        r#"
        INSERT INTO audit_log (id, actor_id, actor_role, action, entity, entity_id, detail, occurred_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&actor.user_id)
    .bind(actor.role)
    .bind(action)
    .bind(entity)
    .bind(&entity_id)
    .bind(detail)
    .bind(Utc::now())
    .execute(conn)
    .await?;

    debug!(action = %action, entity = %entity, entity_id = %entity_id, actor = %actor.user_id, "Audit recorded");
    Ok(())
}

/// Read access to the audit trail.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    /// Creates a new AuditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Most recent entries first.
    pub async fn recent(&self, limit: i64) -> DbResult<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, actor_id, actor_role, action, entity, entity_id, detail, occurred_at
            FROM audit_log
            ORDER BY rowid DESC
            LIMIT ?
            "#,
        )
        .bind(clamp_limit(limit, MAX_PAGE_SIZE))
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Full history of one entity, oldest first.
    pub async fn for_entity(&self, entity: &str, entity_id: impl ToString) -> DbResult<Vec<AuditEntry>> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, actor_id, actor_role, action, entity, entity_id, detail, occurred_at
            FROM audit_log
            WHERE entity = ? AND entity_id = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(entity)
        .bind(entity_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Number of rows recorded for an action; used by diagnostics and tests.
    pub async fn count_action(&self, action: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log WHERE action = ?")
            .bind(action)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
