//! # Listing Repository
//!
//! Per-platform listings and the sync state machine the worker drives.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Listing:   PENDING ──mark_synced──► SYNCED                            │
//! │                │  ▲                    │                                │
//! │       mark_error  └──variant edit──────┘                                │
//! │                ▼                                                        │
//! │              ERROR ──mark_synced──► SYNCED   (any state → any state)   │
//! │                                                                         │
//! │  Variant (after every listing write, same transaction):                │
//! │     any ERROR listing     → ERROR   (sync_error = first message)       │
//! │     any PENDING listing   → DIRTY if it was SYNCED/DIRTY, else PENDING │
//! │     all SYNCED            → SYNCED  (last_synced_at = now)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stale Confirmations
//! `mark_dispatched` records the variant's `sync_version`. A later
//! `mark_synced` for that dispatch, arriving after the variant was edited
//! again, stores the reference but leaves the listing PENDING so the new
//! values still get pushed.
//!
//! Each recorded dispatch guards one confirmation. Applying a confirmation
//! clears `dispatched_version` and stores the variant version it was applied
//! at in `confirmed_version`; repeating it before anything changes is a no-op.

use catalog_core::sync::{
    aggregate, clip_error_message, mark_error_changes, plan_mark_synced, ConfirmationState, SyncedOutcome,
};
use catalog_core::validation::{clamp_limit, normalize_optional, validate_amount_cents, validate_external_ref, validate_name};
use catalog_core::{
    Actor, ListingOverrides, ListingSyncStatus, NewListing, Platform, PlatformListing, PlatformMetadata,
    SyncStatus, MAX_PAGE_SIZE,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::audit;
use crate::repository::variant::fetch_variant;
use crate::tx::WriteTx;

const LISTING_COLUMNS: &str = r#"
    id, variant_id, platform, external_ref_id, listed_name, listed_description,
    listing_price_cents, sync_status, last_synced_at, sync_error_message,
    dispatched_at, dispatched_version, confirmed_version, metadata, created_at, updated_at
"#;

/// Row shape of `platform_listings`; `metadata` is JSON text.
#[derive(Debug, FromRow)]
struct ListingRow {
    id: i64,
    variant_id: i64,
    platform: Platform,
    external_ref_id: Option<String>,
    listed_name: Option<String>,
    listed_description: Option<String>,
    listing_price_cents: Option<i64>,
    sync_status: ListingSyncStatus,
    last_synced_at: Option<DateTime<Utc>>,
    sync_error_message: Option<String>,
    dispatched_at: Option<DateTime<Utc>>,
    dispatched_version: Option<i64>,
    confirmed_version: Option<i64>,
    metadata: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ListingRow> for PlatformListing {
    type Error = DbError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        let metadata = row
            .metadata
            .as_deref()
            .map(|json| PlatformMetadata::from_json(row.platform, json))
            .transpose()
            .map_err(|e| DbError::CorruptRow {
                entity: format!("listing {}", row.id),
                reason: e.to_string(),
            })?;

        Ok(PlatformListing {
            id: row.id,
            variant_id: row.variant_id,
            platform: row.platform,
            external_ref_id: row.external_ref_id,
            listed_name: row.listed_name,
            listed_description: row.listed_description,
            listing_price_cents: row.listing_price_cents,
            sync_status: row.sync_status,
            last_synced_at: row.last_synced_at,
            sync_error_message: row.sync_error_message,
            dispatched_at: row.dispatched_at,
            dispatched_version: row.dispatched_version,
            confirmed_version: row.confirmed_version,
            metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_listings(rows: Vec<ListingRow>) -> DbResult<Vec<PlatformListing>> {
    rows.into_iter().map(PlatformListing::try_from).collect()
}

/// Repository for listings and sync transitions.
#[derive(Debug, Clone)]
pub struct ListingRepository {
    pool: SqlitePool,
}

impl ListingRepository {
    /// Creates a new ListingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ListingRepository { pool }
    }

    // =========================================================================
    // Listing CRUD
    // =========================================================================

    /// Lists a variant on a platform. The listing starts PENDING.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - Unknown variant
    /// * `Err(DbError::UniqueViolation)` - Variant already listed on this platform
    /// * `Err(DbError::Validation)` - Metadata for another platform or malformed
    pub async fn create(&self, actor: &Actor, input: &NewListing) -> DbResult<PlatformListing> {
        check_overrides(&input.overrides)?;
        if let Some(metadata) = &input.metadata {
            metadata.validate_for(input.platform)?;
        }
        let metadata = input
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DbError::Internal(e.to_string()))?;

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = insert_listing(tx.conn(), actor, input, metadata.as_deref()).await;
        let listing = tx.finish(result).await?;

        debug!(listing_id = listing.id, variant_id = listing.variant_id, platform = %listing.platform, "Listing created");
        Ok(listing)
    }

    /// Gets a listing by id.
    pub async fn get(&self, id: i64) -> DbResult<PlatformListing> {
        let mut conn = self.pool.acquire().await?;
        fetch_listing(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Listing", id))
    }

    /// All listings of a variant, one per platform.
    pub async fn for_variant(&self, variant_id: i64) -> DbResult<Vec<PlatformListing>> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM platform_listings WHERE variant_id = ? ORDER BY id");
        let rows = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(variant_id)
            .fetch_all(&self.pool)
            .await?;
        into_listings(rows)
    }

    /// Reverse lookup from a marketplace id.
    pub async fn get_by_external_ref(&self, platform: Platform, external_ref: &str) -> DbResult<PlatformListing> {
        let external_ref = external_ref.trim();
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM platform_listings WHERE platform = ? AND external_ref_id = ? ORDER BY id LIMIT 1"
        );
        let row = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(platform)
            .bind(external_ref)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Listing", format!("{platform}/{external_ref}")))?;
        row.try_into()
    }

    /// Replaces the per-platform overrides and requeues the listing.
    pub async fn update_overrides(
        &self,
        actor: &Actor,
        id: i64,
        overrides: &ListingOverrides,
    ) -> DbResult<PlatformListing> {
        check_overrides(overrides)?;

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = update_listing_overrides(tx.conn(), actor, id, overrides).await;
        tx.finish(result).await
    }

    /// Deletes a listing and recomputes the variant aggregate.
    pub async fn delete(&self, actor: &Actor, id: i64) -> DbResult<()> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = delete_listing(tx.conn(), actor, id).await;
        tx.finish(result).await
    }

    /// PENDING listings of active variants, oldest first.
    pub async fn pending(&self, platform: Option<Platform>, limit: i64) -> DbResult<Vec<PlatformListing>> {
        self.by_status(ListingSyncStatus::Pending, platform, limit).await
    }

    /// ERROR listings of active variants, oldest first.
    pub async fn failed(&self, platform: Option<Platform>, limit: i64) -> DbResult<Vec<PlatformListing>> {
        self.by_status(ListingSyncStatus::Error, platform, limit).await
    }

    async fn by_status(
        &self,
        status: ListingSyncStatus,
        platform: Option<Platform>,
        limit: i64,
    ) -> DbResult<Vec<PlatformListing>> {
        let sql = format!(
            r#"
            SELECT {LISTING_COLUMNS}
            FROM platform_listings
            WHERE sync_status = ?
              AND (? IS NULL OR platform = ?)
              AND variant_id IN (SELECT id FROM product_variants WHERE is_active = 1)
            ORDER BY id
            LIMIT ?
            "#
        );
        let rows = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(status)
            .bind(platform)
            .bind(platform)
            .bind(clamp_limit(limit, MAX_PAGE_SIZE))
            .fetch_all(&self.pool)
            .await?;
        into_listings(rows)
    }

    // =========================================================================
    // Worker Transitions
    // =========================================================================

    /// Records that the worker pushed this listing. Status is unchanged.
    pub async fn mark_dispatched(&self, actor: &Actor, id: i64) -> DbResult<PlatformListing> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = dispatch_listing(tx.conn(), actor, id).await;
        tx.finish(result).await
    }

    /// The marketplace accepted the listing under `external_ref`.
    ///
    /// Idempotent: repeating the call with the same reference writes nothing.
    pub async fn mark_synced(&self, actor: &Actor, id: i64, external_ref: &str) -> DbResult<PlatformListing> {
        let external_ref = validate_external_ref(external_ref)?;

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = confirm_listing(tx.conn(), actor, id, &external_ref).await;
        tx.finish(result).await
    }

    /// The marketplace rejected the listing.
    ///
    /// Idempotent for a repeated message.
    pub async fn mark_error(&self, actor: &Actor, id: i64, message: &str) -> DbResult<PlatformListing> {
        let message = clip_error_message(message);

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = fail_listing(tx.conn(), actor, id, &message).await;
        tx.finish(result).await
    }
}

// =============================================================================
// Unit of Work Bodies
// =============================================================================

fn check_overrides(overrides: &ListingOverrides) -> DbResult<()> {
    if let Some(name) = &overrides.listed_name {
        validate_name("listed_name", name)?;
    }
    if let Some(price) = overrides.listing_price {
        validate_amount_cents("listing_price", price.cents())?;
    }
    Ok(())
}

async fn insert_listing(
    conn: &mut SqliteConnection,
    actor: &Actor,
    input: &NewListing,
    metadata: Option<&str>,
) -> DbResult<PlatformListing> {
    let variant = fetch_variant(&mut *conn, input.variant_id)
        .await?
        .ok_or_else(|| DbError::not_found("Variant", input.variant_id))?;

    let now = Utc::now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO platform_listings (
            variant_id, platform, listed_name, listed_description, listing_price_cents,
            sync_status, metadata, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(variant.id)
    .bind(input.platform)
    .bind(normalize_optional(input.overrides.listed_name.as_deref()))
    .bind(normalize_optional(input.overrides.listed_description.as_deref()))
    .bind(input.overrides.listing_price.map(|p| p.cents()))
    .bind(ListingSyncStatus::Pending)
    .bind(metadata)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| DbError::from(e).on_unique("listing", format!("{} on {}", variant.full_sku, input.platform)))?;
    let id = inserted.last_insert_rowid();

    refresh_variant_status(&mut *conn, variant.id).await?;
    audit::record_in(
        &mut *conn,
        actor,
        "listing.create",
        "listing",
        id,
        json!({ "variant_id": variant.id, "platform": input.platform }),
    )
    .await?;

    load_listing(conn, id).await
}

async fn update_listing_overrides(
    conn: &mut SqliteConnection,
    actor: &Actor,
    id: i64,
    overrides: &ListingOverrides,
) -> DbResult<PlatformListing> {
    let current = load_listing(&mut *conn, id).await?;

    sqlx::query(
        r#"
        UPDATE platform_listings
        SET listed_name = ?, listed_description = ?, listing_price_cents = ?,
            sync_status = CASE WHEN sync_status = 'SYNCED' THEN 'PENDING' ELSE sync_status END,
            confirmed_version = NULL,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(normalize_optional(overrides.listed_name.as_deref()))
    .bind(normalize_optional(overrides.listed_description.as_deref()))
    .bind(overrides.listing_price.map(|p| p.cents()))
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    refresh_variant_status(&mut *conn, current.variant_id).await?;
    let detail = serde_json::to_value(overrides).map_err(|e| DbError::Internal(e.to_string()))?;
    audit::record_in(&mut *conn, actor, "listing.update_overrides", "listing", id, detail).await?;

    debug!(listing_id = id, "Listing overrides updated");
    load_listing(conn, id).await
}

async fn delete_listing(conn: &mut SqliteConnection, actor: &Actor, id: i64) -> DbResult<()> {
    let current = load_listing(&mut *conn, id).await?;

    sqlx::query("DELETE FROM platform_listings WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    refresh_variant_status(&mut *conn, current.variant_id).await?;
    audit::record_in(
        &mut *conn,
        actor,
        "listing.delete",
        "listing",
        id,
        json!({ "variant_id": current.variant_id, "platform": current.platform }),
    )
    .await?;

    info!(listing_id = id, platform = %current.platform, "Listing deleted");
    Ok(())
}

async fn dispatch_listing(conn: &mut SqliteConnection, actor: &Actor, id: i64) -> DbResult<PlatformListing> {
    let listing = load_listing(&mut *conn, id).await?;
    let variant = fetch_variant(&mut *conn, listing.variant_id)
        .await?
        .ok_or_else(|| DbError::not_found("Variant", listing.variant_id))?;

    sqlx::query("UPDATE platform_listings SET dispatched_at = ?, dispatched_version = ?, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(variant.sync_version)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    audit::record_in(
        &mut *conn,
        actor,
        "listing.mark_dispatched",
        "listing",
        id,
        json!({ "sync_version": variant.sync_version }),
    )
    .await?;

    debug!(listing_id = id, sync_version = variant.sync_version, "Listing dispatched");
    load_listing(conn, id).await
}

async fn confirm_listing(
    conn: &mut SqliteConnection,
    actor: &Actor,
    id: i64,
    external_ref: &str,
) -> DbResult<PlatformListing> {
    let listing = load_listing(&mut *conn, id).await?;
    let variant = fetch_variant(&mut *conn, listing.variant_id)
        .await?
        .ok_or_else(|| DbError::not_found("Variant", listing.variant_id))?;

    let state = ConfirmationState {
        status: listing.sync_status,
        current_ref: listing.external_ref_id.as_deref(),
        dispatched_version: listing.dispatched_version,
        confirmed_version: listing.confirmed_version,
    };
    let outcome = plan_mark_synced(state, external_ref, variant.sync_version);

    let now = Utc::now();
    match outcome {
        SyncedOutcome::Unchanged => {
            debug!(listing_id = id, "Repeated sync confirmation, nothing to apply");
            return Ok(listing);
        }
        SyncedOutcome::Stale => {
            sqlx::query(
                r#"
                UPDATE platform_listings
                SET external_ref_id = ?, sync_error_message = NULL,
                    dispatched_version = NULL, confirmed_version = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(external_ref)
            .bind(variant.sync_version)
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
            warn!(
                listing_id = id,
                dispatched_version = ?listing.dispatched_version,
                sync_version = variant.sync_version,
                "Stale sync confirmation, listing stays pending"
            );
        }
        SyncedOutcome::Synced => {
            sqlx::query(
                r#"
                UPDATE platform_listings
                SET sync_status = ?, external_ref_id = ?, sync_error_message = NULL,
                    dispatched_version = NULL, confirmed_version = ?,
                    last_synced_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(ListingSyncStatus::Synced)
            .bind(external_ref)
            .bind(variant.sync_version)
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
            info!(listing_id = id, platform = %listing.platform, external_ref = %external_ref, "Listing synced");
        }
    }

    if listing.platform.anchors_variant() {
        sqlx::query("UPDATE product_variants SET external_item_id = ? WHERE id = ?")
            .bind(external_ref)
            .bind(variant.id)
            .execute(&mut *conn)
            .await?;
    }

    refresh_variant_status(&mut *conn, variant.id).await?;
    audit::record_in(
        &mut *conn,
        actor,
        "listing.mark_synced",
        "listing",
        id,
        json!({
            "external_ref_id": external_ref,
            "stale": outcome == SyncedOutcome::Stale,
        }),
    )
    .await?;

    load_listing(conn, id).await
}

async fn fail_listing(
    conn: &mut SqliteConnection,
    actor: &Actor,
    id: i64,
    message: &str,
) -> DbResult<PlatformListing> {
    let listing = load_listing(&mut *conn, id).await?;
    if !mark_error_changes(listing.sync_status, listing.sync_error_message.as_deref(), message) {
        debug!(listing_id = id, "Listing already in error with this message");
        return Ok(listing);
    }

    sqlx::query("UPDATE platform_listings SET sync_status = ?, sync_error_message = ?, updated_at = ? WHERE id = ?")
        .bind(ListingSyncStatus::Error)
        .bind(message)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;

    refresh_variant_status(&mut *conn, listing.variant_id).await?;
    audit::record_in(
        &mut *conn,
        actor,
        "listing.mark_error",
        "listing",
        id,
        json!({ "message": message }),
    )
    .await?;

    info!(listing_id = id, platform = %listing.platform, error = %message, "Listing sync failed");
    load_listing(conn, id).await
}

// =============================================================================
// Variant Aggregate
// =============================================================================

/// Recomputes a variant's status from its listings and writes it back.
///
/// Also mirrors the first ERROR listing's message into `sync_error` and
/// stamps `last_synced_at` on the transition into SYNCED.
pub(crate) async fn refresh_variant_status(conn: &mut SqliteConnection, variant_id: i64) -> DbResult<SyncStatus> {
    let variant = fetch_variant(&mut *conn, variant_id)
        .await?
        .ok_or_else(|| DbError::not_found("Variant", variant_id))?;

    let listings: Vec<(ListingSyncStatus, Option<String>)> = sqlx::query_as(
        "SELECT sync_status, sync_error_message FROM platform_listings WHERE variant_id = ? ORDER BY id",
    )
    .bind(variant_id)
    .fetch_all(&mut *conn)
    .await?;

    let next = aggregate(variant.sync_status, listings.iter().map(|(status, _)| *status));
    let sync_error = listings
        .iter()
        .find(|(status, _)| *status == ListingSyncStatus::Error)
        .and_then(|(_, message)| message.clone());
    let synced_at = (next == SyncStatus::Synced && variant.sync_status != SyncStatus::Synced).then(Utc::now);

    if next == variant.sync_status && sync_error == variant.sync_error && synced_at.is_none() {
        return Ok(next);
    }

    sqlx::query(
        r#"
        UPDATE product_variants
        SET sync_status = ?, sync_error = ?, last_synced_at = COALESCE(?, last_synced_at), updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(next)
    .bind(&sync_error)
    .bind(synced_at)
    .bind(Utc::now())
    .bind(variant_id)
    .execute(&mut *conn)
    .await?;

    if next != variant.sync_status {
        info!(
            variant_id,
            sku = %variant.full_sku,
            from = %variant.sync_status,
            to = %next,
            "Variant sync status changed"
        );
    }
    Ok(next)
}

async fn fetch_listing(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<PlatformListing>> {
    let sql = format!("SELECT {LISTING_COLUMNS} FROM platform_listings WHERE id = ?");
    sqlx::query_as::<_, ListingRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(PlatformListing::try_from)
        .transpose()
}

async fn load_listing(conn: &mut SqliteConnection, id: i64) -> DbResult<PlatformListing> {
    fetch_listing(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Listing", id))
}

// =============================================================================
// Unit Tests
// =============================================================================
