//! # Variant Repository
//!
//! The Variant Registry: sellable configurations of an identity.
//!
//! ## Dirty-on-Edit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 update_price / update_details                           │
//! │                                                                         │
//! │  BEGIN IMMEDIATE                                                       │
//! │    1. SELECT variant                        (status S, version v)      │
//! │    2. UPDATE variant SET price, status = S.after_edit(), version v+1   │
//! │    3. UPDATE listings SET PENDING WHERE status = SYNCED                │
//! │    4. INSERT audit_log                                                 │
//! │  COMMIT                                                                │
//! │                                                                         │
//! │  SYNCED → DIRTY      PENDING / ERROR / DIRTY → unchanged               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The write lock is held from step 1, so a worker's `mark_synced` either
//! commits before the edit (and is then overwritten to DIRTY) or runs after
//! it and sees the bumped version (and is treated as stale).

use catalog_core::sku::{full_sku, normalize_sku};
use catalog_core::validation::{normalize_optional, validate_amount_cents, validate_color_code};
use catalog_core::{
    Actor, ListingSyncStatus, Money, NewVariant, Platform, SyncStatus, ValidationError, Variant,
    DEFAULT_SYNC_BATCH, MAX_PAGE_SIZE,
};
use chrono::Utc;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::audit;
use crate::repository::identity::fetch_identity;
use crate::tx::WriteTx;

pub(crate) const VARIANT_COLUMNS: &str = r#"
    id, identity_id, color_code, condition_code, full_sku, description, price_cents,
    sync_status, sync_version, external_item_id, sync_error, last_synced_at, is_active,
    created_at, updated_at
"#;

/// Repository for variant operations.
#[derive(Debug, Clone)]
pub struct VariantRepository {
    pool: SqlitePool,
}

impl VariantRepository {
    /// Creates a new VariantRepository.
    pub fn new(pool: SqlitePool) -> Self {
        VariantRepository { pool }
    }

    /// Creates a variant in PENDING with its derived full SKU.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - Unknown identity
    /// * `Err(DbError::Validation)` - Malformed or unregistered color code, negative price
    /// * `Err(DbError::UniqueViolation)` - Full SKU already taken
    ///
    /// ## Example
    /// ```rust,ignore
    /// let variant = db.variants().create(&actor, &NewVariant {
    ///     identity_id: part.id,
    ///     color_code: Some("WY".into()),
    ///     condition_code: Some(ConditionCode::New),
    ///     ..Default::default()
    /// }).await?;
    /// assert_eq!(variant.full_sku, "00845-P-1-WY-N");
    /// ```
    pub async fn create(&self, actor: &Actor, input: &NewVariant) -> DbResult<Variant> {
        let color = input
            .color_code
            .as_deref()
            .map(validate_color_code)
            .transpose()?;
        if let Some(price) = input.price {
            validate_amount_cents("price", price.cents())?;
        }

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = insert_variant(tx.conn(), actor, input, color.as_deref()).await;
        let variant = tx.finish(result).await?;

        debug!(sku = %variant.full_sku, variant_id = variant.id, "Variant created");
        Ok(variant)
    }

    /// Gets a variant by row id.
    pub async fn get(&self, id: i64) -> DbResult<Variant> {
        let mut conn = self.pool.acquire().await?;
        fetch_variant(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Variant", id))
    }

    /// Gets a variant by full SKU (case-insensitive input).
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Variant> {
        let sku = normalize_sku(sku);
        let mut conn = self.pool.acquire().await?;
        fetch_variant_by_sku(&mut conn, &sku)
            .await?
            .ok_or_else(|| DbError::not_found("Variant", &sku))
    }

    /// Variants of an identity in creation order.
    pub async fn list_by_identity(&self, identity_id: i64, include_inactive: bool) -> DbResult<Vec<Variant>> {
        let sql = format!(
            r#"
            SELECT {VARIANT_COLUMNS}
            FROM product_variants
            WHERE identity_id = ? AND (? OR is_active = 1)
            ORDER BY id
            "#
        );
        let variants = sqlx::query_as::<_, Variant>(&sql)
            .bind(identity_id)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;
        Ok(variants)
    }

    /// Sets the price, applying dirty-on-edit.
    ///
    /// The returned variant already carries the new status; there is no
    /// window in which a caller could read the edit as SYNCED.
    pub async fn update_price(&self, actor: &Actor, id: i64, price: Option<Money>) -> DbResult<Variant> {
        if let Some(price) = price {
            validate_amount_cents("price", price.cents())?;
        }

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = edit_variant(tx.conn(), actor, id, VariantEdit::Price(price.map(|p| p.cents()))).await;
        tx.finish(result).await
    }

    /// Sets the description, applying dirty-on-edit.
    pub async fn update_details(&self, actor: &Actor, id: i64, description: Option<&str>) -> DbResult<Variant> {
        let description = normalize_optional(description);

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = edit_variant(tx.conn(), actor, id, VariantEdit::Description(description)).await;
        tx.finish(result).await
    }

    /// Soft-deletes a variant. It drops out of the pending-sync sequence.
    pub async fn deactivate(&self, actor: &Actor, id: i64) -> DbResult<Variant> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = deactivate_variant(tx.conn(), actor, id).await;
        tx.finish(result).await
    }

    /// Lazy, restartable sequence of active variants in PENDING or DIRTY.
    ///
    /// With a platform, only variants with an unsynced listing on that
    /// platform are produced.
    ///
    /// Without one, variants that have no listings are included: a new
    /// variant is PENDING and a variant whose last listing was deleted is
    /// DIRTY. Neither has a listing to confirm, so they stay in this
    /// sequence until a listing is created and synced or the variant is
    /// deactivated.
    pub fn pending_sync(&self, platform: Option<Platform>) -> PendingSyncPager {
        PendingSyncPager::new(self.pool.clone(), platform, DEFAULT_SYNC_BATCH)
    }
}

// =============================================================================
// Edits
// =============================================================================

enum VariantEdit {
    Price(Option<i64>),
    Description(Option<String>),
}

impl VariantEdit {
    fn action(&self) -> &'static str {
        match self {
            VariantEdit::Price(_) => "variant.update_price",
            VariantEdit::Description(_) => "variant.update_details",
        }
    }

    fn is_noop(&self, current: &Variant) -> bool {
        match self {
            VariantEdit::Price(cents) => current.price_cents == *cents,
            VariantEdit::Description(text) => current.description == *text,
        }
    }
}

async fn insert_variant(
    conn: &mut SqliteConnection,
    actor: &Actor,
    input: &NewVariant,
    color: Option<&str>,
) -> DbResult<Variant> {
    let identity = fetch_identity(&mut *conn, input.identity_id)
        .await?
        .ok_or_else(|| DbError::not_found("Identity", input.identity_id))?;

    if let Some(code) = color {
        let known: Option<String> = sqlx::query_scalar("SELECT code FROM colors WHERE code = ?")
            .bind(code)
            .fetch_optional(&mut *conn)
            .await?;
        if known.is_none() {
            return Err(ValidationError::NotAllowed {
                field: "color_code".to_string(),
                reason: format!("'{}' is not a registered color", code),
            }
            .into());
        }
    }

    let sku = full_sku(&identity.generated_code, color, input.condition_code)?;
    let now = Utc::now();

    let inserted = sqlx::query(
        r#"
        INSERT INTO product_variants (
            identity_id, color_code, condition_code, full_sku, description, price_cents,
            sync_status, sync_version, is_active, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, 1, 1, ?, ?)
        "#,
    )
    .bind(identity.id)
    .bind(color)
    .bind(input.condition_code)
    .bind(&sku)
    .bind(normalize_optional(input.description.as_deref()))
    .bind(input.price.map(|p| p.cents()))
    .bind(SyncStatus::Pending)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| DbError::from(e).on_unique("full_sku", &sku))?;
    let id = inserted.last_insert_rowid();

    audit::record_in(
        &mut *conn,
        actor,
        "variant.create",
        "variant",
        id,
        json!({ "full_sku": sku, "price_cents": input.price.map(|p| p.cents()) }),
    )
    .await?;

    fetch_variant(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Variant", id))
}

async fn edit_variant(
    conn: &mut SqliteConnection,
    actor: &Actor,
    id: i64,
    edit: VariantEdit,
) -> DbResult<Variant> {
    let current = fetch_variant(&mut *conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Variant", id))?;

    if edit.is_noop(&current) {
        debug!(variant_id = id, action = edit.action(), "Edit leaves variant unchanged");
        return Ok(current);
    }

    let next_status = current.sync_status.after_edit();
    let now = Utc::now();

    let query = match &edit {
        VariantEdit::Price(cents) => sqlx::query(
            r#"
            UPDATE product_variants
            SET price_cents = ?, sync_status = ?, sync_version = sync_version + 1, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(*cents),
        VariantEdit::Description(text) => sqlx::query(
            r#"
            UPDATE product_variants
            SET description = ?, sync_status = ?, sync_version = sync_version + 1, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(text.clone()),
    };
    query
        .bind(next_status)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let requeued = requeue_listings(&mut *conn, id).await?;

    let detail = match &edit {
        VariantEdit::Price(cents) => json!({
            "from": current.price_cents,
            "to": cents,
            "status_from": current.sync_status,
            "status_to": next_status,
            "listings_requeued": requeued,
        }),
        VariantEdit::Description(text) => json!({
            "to": text,
            "status_from": current.sync_status,
            "status_to": next_status,
            "listings_requeued": requeued,
        }),
    };
    audit::record_in(&mut *conn, actor, edit.action(), "variant", id, detail).await?;

    if next_status != current.sync_status {
        info!(
            variant_id = id,
            sku = %current.full_sku,
            from = %current.sync_status,
            to = %next_status,
            "Variant marked dirty after edit"
        );
    }

    fetch_variant(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Variant", id))
}

/// Puts every SYNCED listing of a variant back to PENDING.
pub(crate) async fn requeue_listings(conn: &mut SqliteConnection, variant_id: i64) -> DbResult<u64> {
    let result = sqlx::query(
        "UPDATE platform_listings SET sync_status = ?, updated_at = ? WHERE variant_id = ? AND sync_status = ?",
    )
    .bind(ListingSyncStatus::Synced.after_variant_edit())
    .bind(Utc::now())
    .bind(variant_id)
    .bind(ListingSyncStatus::Synced)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

async fn deactivate_variant(conn: &mut SqliteConnection, actor: &Actor, id: i64) -> DbResult<Variant> {
    let current = fetch_variant(&mut *conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Variant", id))?;
    if !current.is_active {
        return Ok(current);
    }

    sqlx::query("UPDATE product_variants SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    audit::record_in(
        &mut *conn,
        actor,
        "variant.deactivate",
        "variant",
        id,
        json!({ "full_sku": current.full_sku }),
    )
    .await?;

    debug!(variant_id = id, sku = %current.full_sku, "Variant deactivated");
    fetch_variant(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Variant", id))
}

pub(crate) async fn fetch_variant(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Variant>> {
    let sql = format!("SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = ?");
    let variant = sqlx::query_as::<_, Variant>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(variant)
}

pub(crate) async fn fetch_variant_by_sku(conn: &mut SqliteConnection, sku: &str) -> DbResult<Option<Variant>> {
    let sql = format!("SELECT {VARIANT_COLUMNS} FROM product_variants WHERE full_sku = ?");
    let variant = sqlx::query_as::<_, Variant>(&sql)
        .bind(sku)
        .fetch_optional(conn)
        .await?;
    Ok(variant)
}

// =============================================================================
// Pending Sync Pager
// =============================================================================

/// Keyset pager over variants awaiting sync.
///
/// Each batch is a fresh query for ids above the cursor, so the sequence
/// is finite and tolerates concurrent edits: a variant that becomes
/// pending behind the cursor is picked up after [`restart`](Self::restart).
///
/// ## Usage
/// ```rust,ignore
/// let mut pager = db.variants().pending_sync(Some(Platform::Ebay));
/// loop {
///     let batch = pager.next_batch().await?;
///     if batch.is_empty() { break; }
///     for variant in batch { dispatch(variant).await?; }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PendingSyncPager {
    pool: SqlitePool,
    platform: Option<Platform>,
    batch_size: i64,
    cursor: i64,
    exhausted: bool,
}

impl PendingSyncPager {
    fn new(pool: SqlitePool, platform: Option<Platform>, batch_size: i64) -> Self {
        PendingSyncPager {
            pool,
            platform,
            batch_size,
            cursor: 0,
            exhausted: false,
        }
    }

    /// Sets the page size (clamped to 1..=1000).
    pub fn batch_size(mut self, size: i64) -> Self {
        self.batch_size = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Last id handed out; `resume_after(cursor)` continues from here.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Starts over from the lowest id.
    pub fn restart(&mut self) {
        self.cursor = 0;
        self.exhausted = false;
    }

    /// Continues after `id`, e.g. from a cursor persisted by a worker.
    pub fn resume_after(&mut self, id: i64) {
        self.cursor = id.max(0);
        self.exhausted = false;
    }

    /// Fetches the next batch; empty once the sequence is exhausted.
    pub async fn next_batch(&mut self) -> DbResult<Vec<Variant>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {VARIANT_COLUMNS}
            FROM product_variants v
            WHERE v.is_active = 1
              AND v.sync_status IN ('PENDING', 'DIRTY')
              AND v.id > ?
              AND (? IS NULL OR EXISTS (
                    SELECT 1 FROM platform_listings l
                    WHERE l.variant_id = v.id AND l.platform = ? AND l.sync_status <> 'SYNCED'
              ))
            ORDER BY v.id
            LIMIT ?
            "#
        );
        let batch = sqlx::query_as::<_, Variant>(&sql)
            .bind(self.cursor)
            .bind(self.platform)
            .bind(self.platform)
            .bind(self.batch_size)
            .fetch_all(&self.pool)
            .await?;

        match batch.last() {
            Some(last) => self.cursor = last.id,
            None => self.exhausted = true,
        }
        if (batch.len() as i64) < self.batch_size {
            self.exhausted = true;
        }

        debug!(
            platform = ?self.platform,
            count = batch.len(),
            cursor = self.cursor,
            "Pending sync batch fetched"
        );
        Ok(batch)
    }

    /// Drains the remaining sequence into one vector.
    pub async fn collect_all(&mut self) -> DbResult<Vec<Variant>> {
        let mut all = Vec::new();
        loop {
            let batch = self.next_batch().await?;
            if batch.is_empty() {
                return Ok(all);
            }
            all.extend(batch);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use catalog_core::{ConditionCode, ErrorKind, IdentityType, NewFamily, NewIdentity};

    async fn setup() -> (Database, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let actor = Actor::system();
        let family = NewFamily {
            product_id: 845,
            base_name: "Dock Pro".to_string(),
            ..Default::default()
        };
        db.families().create(&actor, &family).await.unwrap();
        let part = NewIdentity {
            product_id: 845,
            identity_type: IdentityType::Part,
            lci: Some(1),
            physical_class: None,
        };
        let identity = db.identities().create(&actor, &part).await.unwrap();
        (db, identity.id)
    }

    fn variant(identity_id: i64, color: Option<&str>, condition: Option<ConditionCode>) -> NewVariant {
        NewVariant {
            identity_id,
            color_code: color.map(String::from),
            condition_code: condition,
            price: Some(Money::from_cents(1999)),
            description: None,
        }
    }

    async fn force_status(db: &Database, id: i64, status: SyncStatus) {
        sqlx::query("UPDATE product_variants SET sync_status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sku_composition() {
        let (db, identity_id) = setup().await;
        let actor = Actor::system();

        let full = db
            .variants()
            .create(&actor, &variant(identity_id, Some("wy"), Some(ConditionCode::New)))
            .await
            .unwrap();
        assert_eq!(full.full_sku, "00845-P-1-WY-N");
        assert_eq!(full.sync_status, SyncStatus::Pending);
        assert_eq!(full.sync_version, 1);

        let bare = db.variants().create(&actor, &variant(identity_id, None, None)).await.unwrap();
        assert_eq!(bare.full_sku, "00845-P-1");

        assert_eq!(db.variants().get_by_sku("00845-p-1-wy-n").await.unwrap(), full);
    }

    #[tokio::test]
    async fn test_create_failures() {
        let (db, identity_id) = setup().await;
        let actor = Actor::system();

        let err = db.variants().create(&actor, &variant(999, None, None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = db
            .variants()
            .create(&actor, &variant(identity_id, Some("ZZ"), None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);

        let err = db
            .variants()
            .create(&actor, &variant(identity_id, Some("W"), None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);

        db.variants().create(&actor, &variant(identity_id, Some("BK"), None)).await.unwrap();
        let err = db
            .variants()
            .create(&actor, &variant(identity_id, Some("BK"), None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        assert_eq!(err.to_string(), "Duplicate full_sku: '00845-P-1-BK' already exists");
    }

    #[tokio::test]
    async fn test_dirty_on_edit() {
        let (db, identity_id) = setup().await;
        let actor = Actor::system();
        let v = db.variants().create(&actor, &variant(identity_id, None, None)).await.unwrap();

        let pending = db
            .variants()
            .update_price(&actor, v.id, Some(Money::from_cents(2499)))
            .await
            .unwrap();
        assert_eq!(pending.sync_status, SyncStatus::Pending);
        assert_eq!(pending.sync_version, 2);

        force_status(&db, v.id, SyncStatus::Synced).await;
        let dirty = db
            .variants()
            .update_price(&actor, v.id, Some(Money::from_cents(2599)))
            .await
            .unwrap();
        assert_eq!(dirty.sync_status, SyncStatus::Dirty);
        assert_eq!(dirty.price(), Some(Money::from_cents(2599)));

        force_status(&db, v.id, SyncStatus::Synced).await;
        let dirty = db.variants().update_details(&actor, v.id, Some("Matte finish")).await.unwrap();
        assert_eq!(dirty.sync_status, SyncStatus::Dirty);
        assert_eq!(dirty.description.as_deref(), Some("Matte finish"));
    }

    #[tokio::test]
    async fn test_same_price_is_not_an_edit() {
        let (db, identity_id) = setup().await;
        let actor = Actor::system();
        let v = db.variants().create(&actor, &variant(identity_id, None, None)).await.unwrap();
        force_status(&db, v.id, SyncStatus::Synced).await;

        let same = db
            .variants()
            .update_price(&actor, v.id, Some(Money::from_cents(1999)))
            .await
            .unwrap();
        assert_eq!(same.sync_status, SyncStatus::Synced);
        assert_eq!(same.sync_version, 1);
    }

    #[tokio::test]
    async fn test_pending_pager_is_restartable() {
        let (db, identity_id) = setup().await;
        let actor = Actor::system();
        let mut ids = Vec::new();
        for color in ["BK", "WY", "SV", "RD", "BL"] {
            let v = db
                .variants()
                .create(&actor, &variant(identity_id, Some(color), None))
                .await
                .unwrap();
            ids.push(v.id);
        }
        force_status(&db, ids[1], SyncStatus::Synced).await;
        db.variants().deactivate(&actor, ids[4]).await.unwrap();

        let mut pager = db.variants().pending_sync(None).batch_size(2);
        let first = pager.next_batch().await.unwrap();
        assert_eq!(first.iter().map(|v| v.id).collect::<Vec<_>>(), vec![ids[0], ids[2]]);
        let second = pager.next_batch().await.unwrap();
        assert_eq!(second.iter().map(|v| v.id).collect::<Vec<_>>(), vec![ids[3]]);
        assert!(pager.is_exhausted());
        assert!(pager.next_batch().await.unwrap().is_empty());

        pager.restart();
        assert_eq!(pager.collect_all().await.unwrap().len(), 3);

        pager.resume_after(ids[2]);
        assert_eq!(pager.collect_all().await.unwrap()[0].id, ids[3]);
    }

    #[tokio::test]
    async fn test_list_by_identity_hides_inactive() {
        let (db, identity_id) = setup().await;
        let actor = Actor::system();
        let v = db.variants().create(&actor, &variant(identity_id, None, None)).await.unwrap();
        db.variants().deactivate(&actor, v.id).await.unwrap();

        assert!(db.variants().list_by_identity(identity_id, false).await.unwrap().is_empty());
        assert_eq!(db.variants().list_by_identity(identity_id, true).await.unwrap().len(), 1);
    }
}
