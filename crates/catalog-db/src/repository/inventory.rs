//! # Inventory Repository
//!
//! Serialized physical units on the warehouse floor.
//!
//! ## Status Lifecycle
//! ```text
//!               reserve              sell
//!  AVAILABLE ──────────► RESERVED ─────────► SOLD
//!      ▲  │   ◄──────────   │                 ▲
//!      │  │    release      │                 │
//!      │  └─────────────────┼─────────────────┘ sell
//!      │                    │
//!      │ restock            ▼ mark_damaged / mark_rma
//!      └──────────── DAMAGED / RMA
//! ```
//!
//! Transitions are checked by [`InventoryStatus::transition`]; anything
//! outside the diagram fails with `InvalidTransition` and writes nothing.

use catalog_core::sku::normalize_sku;
use catalog_core::validation::{
    normalize_optional, validate_amount_cents, validate_location_code, validate_serial_number,
};
use catalog_core::{
    Actor, InventoryItem, InventoryStatus, InventorySummary, LocatedItem, Money, MoveResult,
    ReceiveItem, ValidationError,
};
use chrono::Utc;
use serde_json::json;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::audit;
use crate::repository::variant::{fetch_variant, fetch_variant_by_sku};
use crate::tx::WriteTx;

const INVENTORY_COLUMNS: &str = r#"
    id, serial_number, variant_id, location_code, status, cost_basis_cents,
    notes, received_at, sold_at, created_at, updated_at
"#;

const LOCATED_COLUMNS: &str = r#"
    ii.id, ii.serial_number, ii.variant_id, ii.location_code, ii.status, ii.cost_basis_cents,
    ii.notes, ii.received_at, ii.sold_at, ii.created_at, ii.updated_at, v.full_sku
"#;

#[derive(Debug, FromRow)]
struct LocatedRow {
    #[sqlx(flatten)]
    item: InventoryItem,
    full_sku: String,
}

impl From<LocatedRow> for LocatedItem {
    fn from(row: LocatedRow) -> Self {
        LocatedItem {
            item: row.item,
            full_sku: row.full_sku,
        }
    }
}

/// Repository for the inventory ledger.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Receives a unit against a SKU. The item starts AVAILABLE.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - No variant has this SKU
    /// * `Err(DbError::UniqueViolation)` - Serial number already received
    pub async fn receive(&self, actor: &Actor, input: &ReceiveItem) -> DbResult<InventoryItem> {
        let serial = input
            .serial_number
            .as_deref()
            .map(validate_serial_number)
            .transpose()?;
        let location = input
            .location_code
            .as_deref()
            .map(validate_location_code)
            .transpose()?;
        if let Some(cost) = input.cost_basis {
            validate_amount_cents("cost_basis", cost.cents())?;
        }
        let sku = normalize_sku(&input.sku);
        let notes = normalize_optional(input.notes.as_deref());

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = insert_item(
            tx.conn(),
            actor,
            &sku,
            serial.as_deref(),
            location.as_deref(),
            input.cost_basis,
            notes.as_deref(),
        )
        .await;
        let item = tx.finish(result).await?;

        debug!(sku = %sku, serial = ?item.serial_number, location = ?item.location_code, "Item received");
        Ok(item)
    }

    /// Gets an item by serial number.
    pub async fn get_by_serial(&self, serial: &str) -> DbResult<InventoryItem> {
        let mut conn = self.pool.acquire().await?;
        load_by_serial(&mut conn, serial.trim()).await
    }

    /// Moves a serialized unit to a new location.
    pub async fn move_item(&self, actor: &Actor, serial: &str, new_location: &str) -> DbResult<MoveResult> {
        let new_location = validate_location_code(new_location)?;

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = relocate(tx.conn(), actor, serial.trim(), &new_location).await;
        let moved = tx.finish(result).await?;

        debug!(
            serial = %moved.serial_number,
            from = ?moved.previous_location,
            to = %moved.new_location,
            "Item moved"
        );
        Ok(moved)
    }

    /// AVAILABLE → RESERVED.
    pub async fn reserve(&self, actor: &Actor, serial: &str) -> DbResult<InventoryItem> {
        self.change_status(actor, serial, InventoryStatus::Reserved, "inventory.reserve", &[])
            .await
    }

    /// AVAILABLE | RESERVED → SOLD. Stamps `sold_at`.
    pub async fn sell(&self, actor: &Actor, serial: &str) -> DbResult<InventoryItem> {
        self.change_status(actor, serial, InventoryStatus::Sold, "inventory.sell", &[])
            .await
    }

    /// RESERVED → AVAILABLE.
    pub async fn release(&self, actor: &Actor, serial: &str) -> DbResult<InventoryItem> {
        self.change_status(
            actor,
            serial,
            InventoryStatus::Available,
            "inventory.release",
            &[InventoryStatus::Reserved],
        )
        .await
    }

    pub async fn mark_damaged(&self, actor: &Actor, serial: &str) -> DbResult<InventoryItem> {
        self.change_status(actor, serial, InventoryStatus::Damaged, "inventory.mark_damaged", &[])
            .await
    }

    pub async fn mark_rma(&self, actor: &Actor, serial: &str) -> DbResult<InventoryItem> {
        self.change_status(actor, serial, InventoryStatus::Rma, "inventory.mark_rma", &[])
            .await
    }

    /// DAMAGED | RMA → AVAILABLE.
    pub async fn restock(&self, actor: &Actor, serial: &str) -> DbResult<InventoryItem> {
        self.change_status(
            actor,
            serial,
            InventoryStatus::Available,
            "inventory.restock",
            &[InventoryStatus::Damaged, InventoryStatus::Rma],
        )
        .await
    }

    async fn change_status(
        &self,
        actor: &Actor,
        serial: &str,
        next: InventoryStatus,
        action: &str,
        only_from: &[InventoryStatus],
    ) -> DbResult<InventoryItem> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = transition_item(tx.conn(), actor, serial.trim(), next, action, only_from).await;
        tx.finish(result).await
    }

    /// Unit counts per status for one variant.
    pub async fn summary(&self, variant_id: i64) -> DbResult<InventorySummary> {
        let mut conn = self.pool.acquire().await?;
        let variant = fetch_variant(&mut conn, variant_id)
            .await?
            .ok_or_else(|| DbError::not_found("Variant", variant_id))?;

        let counts: Vec<(InventoryStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM inventory_items WHERE variant_id = ? GROUP BY status",
        )
        .bind(variant_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut summary = InventorySummary {
            variant_id,
            full_sku: variant.full_sku,
            ..Default::default()
        };
        for (status, count) in counts {
            summary.record(status, count);
        }
        Ok(summary)
    }

    /// Resolves a scan: a serial number wins, otherwise every unit of the SKU.
    ///
    /// ## Returns
    /// * `Ok(vec)` - One item for a serial, all items for a SKU (possibly none)
    /// * `Err(DbError::NotFound)` - Neither a serial nor a SKU
    pub async fn lookup(&self, sku_or_serial: &str) -> DbResult<Vec<LocatedItem>> {
        let scanned = sku_or_serial.trim();
        let mut conn = self.pool.acquire().await?;

        let sql = format!(
            r#"
            SELECT {LOCATED_COLUMNS}
            FROM inventory_items ii
            JOIN product_variants v ON v.id = ii.variant_id
            WHERE ii.serial_number = ?
            "#
        );
        if let Some(row) = sqlx::query_as::<_, LocatedRow>(&sql)
            .bind(scanned)
            .fetch_optional(&mut *conn)
            .await?
        {
            return Ok(vec![row.into()]);
        }

        let sku = normalize_sku(scanned);
        let variant = fetch_variant_by_sku(&mut conn, &sku)
            .await?
            .ok_or_else(|| DbError::not_found("SKU or serial", scanned))?;

        let sql = format!(
            r#"
            SELECT {LOCATED_COLUMNS}
            FROM inventory_items ii
            JOIN product_variants v ON v.id = ii.variant_id
            WHERE ii.variant_id = ?
            ORDER BY ii.id
            "#
        );
        let rows = sqlx::query_as::<_, LocatedRow>(&sql)
            .bind(variant.id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(LocatedItem::from).collect())
    }

    /// Sum of cost basis, optionally narrowed by variant and status.
    /// Items without a cost basis count as zero.
    pub async fn total_value(&self, variant_id: Option<i64>, status: Option<InventoryStatus>) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(cost_basis_cents), 0)
            FROM inventory_items
            WHERE (?1 IS NULL OR variant_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            "#,
        )
        .bind(variant_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(Money::from_cents(cents))
    }

    /// Items at a location, optionally filtered by status.
    pub async fn list_by_location(
        &self,
        location: &str,
        status: Option<InventoryStatus>,
    ) -> DbResult<Vec<LocatedItem>> {
        let location = validate_location_code(location)?;
        let sql = format!(
            r#"
            SELECT {LOCATED_COLUMNS}
            FROM inventory_items ii
            JOIN product_variants v ON v.id = ii.variant_id
            WHERE ii.location_code = ?1
              AND (?2 IS NULL OR ii.status = ?2)
            ORDER BY v.full_sku, ii.id
            "#
        );
        let rows = sqlx::query_as::<_, LocatedRow>(&sql)
            .bind(location)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(LocatedItem::from).collect())
    }
}

async fn insert_item(
    conn: &mut SqliteConnection,
    actor: &Actor,
    sku: &str,
    serial: Option<&str>,
    location: Option<&str>,
    cost_basis: Option<Money>,
    notes: Option<&str>,
) -> DbResult<InventoryItem> {
    let variant = fetch_variant_by_sku(&mut *conn, sku)
        .await?
        .ok_or_else(|| DbError::not_found("Variant", sku))?;

    let now = Utc::now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO inventory_items (
            serial_number, variant_id, location_code, status, cost_basis_cents,
            notes, received_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(serial)
    .bind(variant.id)
    .bind(location)
    .bind(InventoryStatus::Available)
    .bind(cost_basis.map(|m| m.cents()))
    .bind(notes)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| DbError::from(e).on_unique("serial_number", serial.unwrap_or_default()))?;
    let id = inserted.last_insert_rowid();

    audit::record_in(
        &mut *conn,
        actor,
        "inventory.receive",
        "inventory_item",
        id,
        json!({ "sku": sku, "serial_number": serial, "location_code": location }),
    )
    .await?;

    load_by_id(conn, id).await
}

async fn relocate(
    conn: &mut SqliteConnection,
    actor: &Actor,
    serial: &str,
    new_location: &str,
) -> DbResult<MoveResult> {
    let item = load_by_serial(&mut *conn, serial).await?;
    let now = Utc::now();

    sqlx::query("UPDATE inventory_items SET location_code = ?, updated_at = ? WHERE id = ?")
        .bind(new_location)
        .bind(now)
        .bind(item.id)
        .execute(&mut *conn)
        .await?;
    audit::record_in(
        &mut *conn,
        actor,
        "inventory.move",
        "inventory_item",
        item.id,
        json!({ "from": item.location_code, "to": new_location }),
    )
    .await?;

    Ok(MoveResult {
        serial_number: serial.to_string(),
        previous_location: item.location_code,
        new_location: new_location.to_string(),
        moved_at: now,
    })
}

async fn transition_item(
    conn: &mut SqliteConnection,
    actor: &Actor,
    serial: &str,
    next: InventoryStatus,
    action: &str,
    only_from: &[InventoryStatus],
) -> DbResult<InventoryItem> {
    let item = load_by_serial(&mut *conn, serial).await?;
    if !only_from.is_empty() && !only_from.contains(&item.status) {
        return Err(ValidationError::InvalidTransition {
            entity: item.label(),
            from: item.status.to_string(),
            to: next.to_string(),
        }
        .into());
    }
    let next = item.status.transition(next, &item.label())?;

    let now = Utc::now();
    let sold_at = if next == InventoryStatus::Sold { Some(now) } else { item.sold_at };
    sqlx::query("UPDATE inventory_items SET status = ?, sold_at = ?, updated_at = ? WHERE id = ?")
        .bind(next)
        .bind(sold_at)
        .bind(now)
        .bind(item.id)
        .execute(&mut *conn)
        .await?;
    audit::record_in(
        &mut *conn,
        actor,
        action,
        "inventory_item",
        item.id,
        json!({ "from": item.status, "to": next }),
    )
    .await?;

    debug!(serial, from = %item.status, to = %next, "Inventory status changed");
    load_by_id(conn, item.id).await
}

async fn load_by_serial(conn: &mut SqliteConnection, serial: &str) -> DbResult<InventoryItem> {
    let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory_items WHERE serial_number = ?");
    sqlx::query_as::<_, InventoryItem>(&sql)
        .bind(serial)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("InventoryItem", serial))
}

async fn load_by_id(conn: &mut SqliteConnection, id: i64) -> DbResult<InventoryItem> {
    let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory_items WHERE id = ?");
    sqlx::query_as::<_, InventoryItem>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("InventoryItem", id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use catalog_core::{ErrorKind, IdentityType, NewFamily, NewIdentity, NewVariant};

    async fn setup() -> (Database, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let actor = Actor::system();
        let family = NewFamily {
            product_id: 845,
            base_name: "Dock Pro".to_string(),
            ..Default::default()
        };
        db.families().create(&actor, &family).await.unwrap();
        let identity = NewIdentity {
            product_id: 845,
            identity_type: IdentityType::Product,
            lci: None,
            physical_class: None,
        };
        let identity = db.identities().create(&actor, &identity).await.unwrap();
        let variant = NewVariant {
            identity_id: identity.id,
            color_code: Some("BK".to_string()),
            ..Default::default()
        };
        let variant = db.variants().create(&actor, &variant).await.unwrap();
        (db, variant.id)
    }

    fn scan(serial: &str, cents: i64) -> ReceiveItem {
        ReceiveItem {
            sku: "00845-bk".to_string(),
            serial_number: Some(serial.to_string()),
            location_code: Some("a1-s3".to_string()),
            cost_basis: Some(Money::from_cents(cents)),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_receive() {
        let (db, variant_id) = setup().await;
        let actor = Actor::system();

        let item = db.inventory().receive(&actor, &scan("SN-001", 4500)).await.unwrap();
        assert_eq!(item.variant_id, variant_id);
        assert_eq!(item.status, InventoryStatus::Available);
        assert_eq!(item.location_code.as_deref(), Some("A1-S3"));
        assert!(item.received_at.is_some());

        let err = db.inventory().receive(&actor, &scan("SN-001", 4500)).await.unwrap_err();
        assert_eq!(err.to_string(), "Duplicate serial_number: 'SN-001' already exists");

        let unknown = ReceiveItem {
            sku: "99999-ZZ".to_string(),
            ..Default::default()
        };
        let err = db.inventory().receive(&actor, &unknown).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let (db, _) = setup().await;
        let actor = Actor::system();
        db.inventory().receive(&actor, &scan("SN-001", 4500)).await.unwrap();

        let item = db.inventory().reserve(&actor, "SN-001").await.unwrap();
        assert_eq!(item.status, InventoryStatus::Reserved);
        let item = db.inventory().release(&actor, "SN-001").await.unwrap();
        assert_eq!(item.status, InventoryStatus::Available);

        let err = db.inventory().restock(&actor, "SN-001").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);

        let item = db.inventory().sell(&actor, "SN-001").await.unwrap();
        assert_eq!(item.status, InventoryStatus::Sold);
        assert!(item.sold_at.is_some());

        let err = db.inventory().mark_damaged(&actor, "SN-001").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);
        let err = db.inventory().release(&actor, "SN-001").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);

        let err = db.inventory().sell(&actor, "NOPE").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_damage_and_restock() {
        let (db, _) = setup().await;
        let actor = Actor::system();
        db.inventory().receive(&actor, &scan("SN-002", 4500)).await.unwrap();

        let item = db.inventory().mark_rma(&actor, "SN-002").await.unwrap();
        assert_eq!(item.status, InventoryStatus::Rma);
        let item = db.inventory().restock(&actor, "SN-002").await.unwrap();
        assert_eq!(item.status, InventoryStatus::Available);
    }

    #[tokio::test]
    async fn test_move() {
        let (db, _) = setup().await;
        let actor = Actor::system();
        db.inventory().receive(&actor, &scan("SN-001", 4500)).await.unwrap();

        let moved = db.inventory().move_item(&actor, "SN-001", "b2-s1").await.unwrap();
        assert_eq!(moved.previous_location.as_deref(), Some("A1-S3"));
        assert_eq!(moved.new_location, "B2-S1");

        let at_b2 = db.inventory().list_by_location("B2-S1", None).await.unwrap();
        assert_eq!(at_b2.len(), 1);
        assert_eq!(at_b2[0].full_sku, "00845-BK");
        assert!(db.inventory().list_by_location("A1-S3", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_summary_lookup_and_value() {
        let (db, variant_id) = setup().await;
        let actor = Actor::system();
        db.inventory().receive(&actor, &scan("SN-001", 4500)).await.unwrap();
        db.inventory().receive(&actor, &scan("SN-002", 5000)).await.unwrap();
        db.inventory().receive(&actor, &scan("SN-003", 5500)).await.unwrap();
        db.inventory().reserve(&actor, "SN-002").await.unwrap();
        db.inventory().sell(&actor, "SN-003").await.unwrap();

        let summary = db.inventory().summary(variant_id).await.unwrap();
        assert_eq!(summary.full_sku, "00845-BK");
        assert_eq!((summary.available, summary.reserved, summary.sold), (1, 1, 1));
        assert_eq!(summary.total, 3);
        assert_eq!(summary.on_hand(), 2);

        let by_serial = db.inventory().lookup("SN-002").await.unwrap();
        assert_eq!(by_serial.len(), 1);
        assert_eq!(by_serial[0].item.status, InventoryStatus::Reserved);

        let by_sku = db.inventory().lookup("00845-bk").await.unwrap();
        assert_eq!(by_sku.len(), 3);

        let err = db.inventory().lookup("nothing-here").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let all = db.inventory().total_value(None, None).await.unwrap();
        assert_eq!(all.cents(), 15_000);
        let available = db
            .inventory()
            .total_value(Some(variant_id), Some(InventoryStatus::Available))
            .await
            .unwrap();
        assert_eq!(available.cents(), 4500);
    }
}
