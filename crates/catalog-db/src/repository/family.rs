//! # Family Repository
//!
//! Product families: the five-digit namespaces every generated code lives in.
//!
//! `product_id` is caller-assigned and never editable; everything else on a
//! family (name, brand, dimensions, weight, kit manifest) may change freely
//! because none of it feeds an identity signature.

use catalog_core::validation::{
    clamp_limit, normalize_optional, validate_measurement, validate_name, validate_product_id,
    validate_search_query,
};
use catalog_core::types::{Dimensions, Weight};
use catalog_core::{Actor, FamilyUpdate, NewFamily, ProductFamily, MAX_PAGE_SIZE};
use chrono::Utc;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::{audit, like_pattern};
use crate::tx::WriteTx;

const FAMILY_COLUMNS: &str = r#"
    product_id, base_name, description, brand_id,
    dimension_length, dimension_width, dimension_height, dimension_unit,
    weight, weight_unit, kit_included_products, created_at, updated_at
"#;

/// Repository for product family operations.
#[derive(Debug, Clone)]
pub struct FamilyRepository {
    pool: SqlitePool,
}

impl FamilyRepository {
    /// Creates a new FamilyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FamilyRepository { pool }
    }

    /// Creates a family.
    ///
    /// ## Returns
    /// * `Ok(ProductFamily)` - The stored row
    /// * `Err(DbError::UniqueViolation)` - `product_id` already exists
    /// * `Err(DbError::NotFound)` - `brand_id` does not exist
    /// * `Err(DbError::Validation)` - Bad id range, empty name, non-positive measurement
    pub async fn create(&self, actor: &Actor, input: &NewFamily) -> DbResult<ProductFamily> {
        validate_product_id(input.product_id)?;
        let base_name = validate_name("base_name", &input.base_name)?;
        check_measurements(input.dimensions.as_ref(), input.weight.as_ref())?;

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = insert_family(tx.conn(), actor, input, &base_name).await;
        let family = tx.finish(result).await?;

        debug!(product_id = family.product_id, name = %family.base_name, "Family created");
        Ok(family)
    }

    /// Gets a family by its namespace id.
    pub async fn get(&self, product_id: i64) -> DbResult<ProductFamily> {
        let mut conn = self.pool.acquire().await?;
        fetch_family(&mut conn, product_id)
            .await?
            .ok_or_else(|| DbError::not_found("ProductFamily", product_id))
    }

    /// Applies the `Some` fields of `update`.
    ///
    /// An empty update is a read. `product_id` cannot be changed.
    pub async fn update(
        &self,
        actor: &Actor,
        product_id: i64,
        update: &FamilyUpdate,
    ) -> DbResult<ProductFamily> {
        if update.is_empty() {
            return self.get(product_id).await;
        }

        let base_name = update
            .base_name
            .as_deref()
            .map(|name| validate_name("base_name", name))
            .transpose()?;
        check_measurements(update.dimensions.as_ref(), update.weight.as_ref())?;

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = update_family(tx.conn(), actor, product_id, update, base_name.as_deref()).await;
        let family = tx.finish(result).await?;

        debug!(product_id, "Family updated");
        Ok(family)
    }

    /// Deletes a family that no identity lives in.
    ///
    /// Its component definitions go with it.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - Unknown `product_id`
    /// * `Err(DbError::StillReferenced)` - Identities exist in the family
    pub async fn delete(&self, actor: &Actor, product_id: i64) -> DbResult<()> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = delete_family(tx.conn(), actor, product_id).await;
        tx.finish(result).await?;

        info!(product_id, "Family deleted");
        Ok(())
    }

    /// Searches by name fragment or by (zero-padded) id prefix.
    pub async fn search(&self, query: &str, limit: i64) -> DbResult<Vec<ProductFamily>> {
        let query = validate_search_query(query)?;
        let pattern = like_pattern(&query);
        let id_prefix = format!("{}%", query.replace(['%', '_', '\\'], ""));

        let sql = format!(
            r#"
            SELECT {FAMILY_COLUMNS}
            FROM product_families
            WHERE base_name LIKE ? ESCAPE '\'
               OR printf('%05d', product_id) LIKE ?
            ORDER BY product_id
            LIMIT ?
            "#
        );
        let families = sqlx::query_as::<_, ProductFamily>(&sql)
            .bind(&pattern)
            .bind(&id_prefix)
            .bind(clamp_limit(limit, MAX_PAGE_SIZE))
            .fetch_all(&self.pool)
            .await?;

        debug!(query = %query, count = families.len(), "Family search completed");
        Ok(families)
    }

    /// Lists families in id order.
    pub async fn list(&self, limit: i64, offset: i64) -> DbResult<Vec<ProductFamily>> {
        let sql = format!(
            "SELECT {FAMILY_COLUMNS} FROM product_families ORDER BY product_id LIMIT ? OFFSET ?"
        );
        let families = sqlx::query_as::<_, ProductFamily>(&sql)
            .bind(clamp_limit(limit, MAX_PAGE_SIZE))
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await?;
        Ok(families)
    }

    /// Counts all families.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_families")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn check_measurements(dimensions: Option<&Dimensions>, weight: Option<&Weight>) -> DbResult<()> {
    if let Some(dims) = dimensions {
        validate_measurement("dimensions.length", dims.length)?;
        validate_measurement("dimensions.width", dims.width)?;
        validate_measurement("dimensions.height", dims.height)?;
    }
    if let Some(weight) = weight {
        validate_measurement("weight", weight.value)?;
    }
    Ok(())
}

async fn insert_family(
    conn: &mut SqliteConnection,
    actor: &Actor,
    input: &NewFamily,
    base_name: &str,
) -> DbResult<ProductFamily> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO product_families (
            product_id, base_name, description, brand_id,
            dimension_length, dimension_width, dimension_height, dimension_unit,
            weight, weight_unit, kit_included_products, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(input.product_id)
    .bind(base_name)
    .bind(normalize_optional(input.description.as_deref()))
    .bind(input.brand_id)
    .bind(input.dimensions.map(|d| d.length))
    .bind(input.dimensions.map(|d| d.width))
    .bind(input.dimensions.map(|d| d.height))
    .bind(input.dimensions.map(|d| d.unit))
    .bind(input.weight.map(|w| w.value))
    .bind(input.weight.map(|w| w.unit))
    .bind(normalize_optional(input.kit_included_products.as_deref()))
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        DbError::from(e)
            .on_unique("product_id", input.product_id)
            .on_foreign_key("Brand", input.brand_id.unwrap_or_default())
    })?;

    audit::record_in(
        &mut *conn,
        actor,
        "family.create",
        "family",
        input.product_id,
        json!({ "base_name": base_name }),
    )
    .await?;

    fetch_family(conn, input.product_id)
        .await?
        .ok_or_else(|| DbError::not_found("ProductFamily", input.product_id))
}

async fn update_family(
    conn: &mut SqliteConnection,
    actor: &Actor,
    product_id: i64,
    update: &FamilyUpdate,
    base_name: Option<&str>,
) -> DbResult<ProductFamily> {
    let updated = sqlx::query(
        r#"
        UPDATE product_families SET
            base_name = COALESCE(?, base_name),
            description = COALESCE(?, description),
            brand_id = COALESCE(?, brand_id),
            dimension_length = COALESCE(?, dimension_length),
            dimension_width = COALESCE(?, dimension_width),
            dimension_height = COALESCE(?, dimension_height),
            dimension_unit = COALESCE(?, dimension_unit),
            weight = COALESCE(?, weight),
            weight_unit = COALESCE(?, weight_unit),
            kit_included_products = COALESCE(?, kit_included_products),
            updated_at = ?
        WHERE product_id = ?
        "#,
    )
    .bind(base_name)
    .bind(normalize_optional(update.description.as_deref()))
    .bind(update.brand_id)
    .bind(update.dimensions.map(|d| d.length))
    .bind(update.dimensions.map(|d| d.width))
    .bind(update.dimensions.map(|d| d.height))
    .bind(update.dimensions.map(|d| d.unit))
    .bind(update.weight.map(|w| w.value))
    .bind(update.weight.map(|w| w.unit))
    .bind(normalize_optional(update.kit_included_products.as_deref()))
    .bind(Utc::now())
    .bind(product_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| DbError::from(e).on_foreign_key("Brand", update.brand_id.unwrap_or_default()))?;

    if updated.rows_affected() == 0 {
        return Err(DbError::not_found("ProductFamily", product_id));
    }

    let detail = serde_json::to_value(update).map_err(|e| DbError::Internal(e.to_string()))?;
    audit::record_in(&mut *conn, actor, "family.update", "family", product_id, detail).await?;

    fetch_family(conn, product_id)
        .await?
        .ok_or_else(|| DbError::not_found("ProductFamily", product_id))
}

async fn delete_family(conn: &mut SqliteConnection, actor: &Actor, product_id: i64) -> DbResult<()> {
    let family = fetch_family(&mut *conn, product_id)
        .await?
        .ok_or_else(|| DbError::not_found("ProductFamily", product_id))?;

    sqlx::query("DELETE FROM product_families WHERE product_id = ?")
        .bind(product_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::from(e).on_restrict("ProductFamily", product_id, "identities"))?;

    audit::record_in(
        &mut *conn,
        actor,
        "family.delete",
        "family",
        product_id,
        json!({ "base_name": family.base_name }),
    )
    .await
}

pub(crate) async fn fetch_family(
    conn: &mut SqliteConnection,
    product_id: i64,
) -> DbResult<Option<ProductFamily>> {
    let sql = format!("SELECT {FAMILY_COLUMNS} FROM product_families WHERE product_id = ?");
    let family = sqlx::query_as::<_, ProductFamily>(&sql)
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(family)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use catalog_core::types::{Dimensions, LengthUnit};
    use catalog_core::ErrorKind;

    fn dock(product_id: i64) -> NewFamily {
        NewFamily {
            product_id,
            base_name: "  Dock Pro ".to_string(),
            dimensions: Some(Dimensions {
                length: 10.0,
                width: 4.0,
                height: 2.0,
                unit: LengthUnit::Cm,
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let created = db.families().create(&Actor::system(), &dock(845)).await.unwrap();

        assert_eq!(created.base_name, "Dock Pro");
        assert_eq!(created.dimensions().unwrap().unit, LengthUnit::Cm);
        assert_eq!(db.families().get(845).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_duplicate_product_id() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.families().create(&Actor::system(), &dock(845)).await.unwrap();

        let err = db.families().create(&Actor::system(), &dock(845)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        assert_eq!(err.to_string(), "Duplicate product_id: '845' already exists");
    }

    #[tokio::test]
    async fn test_delete_unreferenced_family() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let actor = Actor::system();
        db.families().create(&actor, &dock(845)).await.unwrap();
        db.lookups().define_component(&actor, 845, None, "Power Supply").await.unwrap();

        db.families().delete(&actor, 845).await.unwrap();
        assert_eq!(db.families().get(845).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(db.audit().count_action("family.delete").await.unwrap(), 1);

        let err = db.families().delete(&actor, 845).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { ref entity, .. } if entity == "ProductFamily"));
    }

    #[tokio::test]
    async fn test_delete_family_with_identities_is_refused() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let actor = Actor::system();
        db.families().create(&actor, &dock(845)).await.unwrap();
        let part = catalog_core::NewIdentity {
            product_id: 845,
            identity_type: catalog_core::IdentityType::Part,
            lci: Some(1),
            physical_class: None,
        };
        db.identities().create(&actor, &part).await.unwrap();

        let err = db.families().delete(&actor, 845).await.unwrap_err();
        assert!(matches!(err, DbError::StillReferenced { ref referenced_by, .. } if referenced_by == "identities"));
        assert_eq!(err.kind(), ErrorKind::InvalidField);
        assert!(db.families().get(845).await.is_ok());
        assert_eq!(db.audit().count_action("family.delete").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_brand_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut input = dock(1);
        input.brand_id = Some(42);

        let err = db.families().create(&Actor::system(), &input).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { ref entity, .. } if entity == "Brand"));
    }

    #[tokio::test]
    async fn test_update_leaves_unset_fields() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.families().create(&Actor::system(), &dock(845)).await.unwrap();

        let update = FamilyUpdate {
            base_name: Some("Dock Pro 2".to_string()),
            ..Default::default()
        };
        let updated = db.families().update(&Actor::system(), 845, &update).await.unwrap();
        assert_eq!(updated.base_name, "Dock Pro 2");
        assert_eq!(updated.dimension_length, Some(10.0));

        let err = db.families().update(&Actor::system(), 9, &update).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_search_by_name_and_id() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.families().create(&Actor::system(), &dock(845)).await.unwrap();
        let mut hub = dock(1200);
        hub.base_name = "USB Hub".to_string();
        db.families().create(&Actor::system(), &hub).await.unwrap();

        let by_name = db.families().search("hub", 10).await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].product_id, 1200);

        let by_id = db.families().search("0084", 10).await.unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].product_id, 845);

        assert_eq!(db.families().count().await.unwrap(), 2);
        assert_eq!(db.families().list(1, 1).await.unwrap()[0].product_id, 1200);
    }
}
