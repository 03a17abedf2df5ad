//! # Lookup Repository
//!
//! Small reference tables: brands, the color index and the human names of
//! local component indexes.

use catalog_core::validation::{validate_color_code, validate_lci, validate_name, validate_product_id};
use catalog_core::{Actor, Brand, Color, ComponentDefinition, ValidationError, MAX_LCI, MIN_LCI};
use chrono::Utc;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::audit;
use crate::repository::family::fetch_family;
use crate::tx::WriteTx;

/// Repository for brands, colors and component definitions.
#[derive(Debug, Clone)]
pub struct LookupRepository {
    pool: SqlitePool,
}

impl LookupRepository {
    /// Creates a new LookupRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LookupRepository { pool }
    }

    // =========================================================================
    // Brands
    // =========================================================================

    /// Registers a brand. Names are unique case-insensitively.
    pub async fn create_brand(&self, actor: &Actor, name: &str) -> DbResult<Brand> {
        let name = validate_name("brand_name", name)?;

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = insert_brand(tx.conn(), actor, &name).await;
        let brand = tx.finish(result).await?;

        debug!(brand_id = brand.id, name = %brand.name, "Brand created");
        Ok(brand)
    }

    pub async fn list_brands(&self) -> DbResult<Vec<Brand>> {
        let brands = sqlx::query_as::<_, Brand>("SELECT id, name, created_at FROM brands ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(brands)
    }

    // =========================================================================
    // Colors
    // =========================================================================

    /// Adds a color to the index variants may reference.
    pub async fn create_color(&self, actor: &Actor, code: &str, name: &str) -> DbResult<Color> {
        let code = validate_color_code(code)?;
        let name = validate_name("color_name", name)?;

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = insert_color(tx.conn(), actor, &code, &name).await;
        let color = tx.finish(result).await?;

        debug!(code = %color.code, name = %color.name, "Color created");
        Ok(color)
    }

    pub async fn list_colors(&self) -> DbResult<Vec<Color>> {
        let colors = sqlx::query_as::<_, Color>("SELECT code, name FROM colors ORDER BY code")
            .fetch_all(&self.pool)
            .await?;
        Ok(colors)
    }

    // =========================================================================
    // Component definitions
    // =========================================================================

    /// Names a local component index within a family.
    ///
    /// When `lci` is `None` the next free index is taken: one past the
    /// highest index used by either a definition or a Part identity.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - Family does not exist
    /// * `Err(DbError::UniqueViolation)` - Index already named
    /// * `Err(DbError::Validation)` - Index out of 1..=99, or none left
    pub async fn define_component(
        &self,
        actor: &Actor,
        product_id: i64,
        lci: Option<i64>,
        component_name: &str,
    ) -> DbResult<ComponentDefinition> {
        validate_product_id(product_id)?;
        if let Some(lci) = lci {
            validate_lci(lci)?;
        }
        let component_name = validate_name("component_name", component_name)?;

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = insert_definition(tx.conn(), actor, product_id, lci, &component_name).await;
        let definition = tx.finish(result).await?;

        debug!(
            product_id,
            lci = definition.lci,
            name = %definition.component_name,
            "Component defined"
        );
        Ok(definition)
    }

    pub async fn list_component_definitions(&self, product_id: i64) -> DbResult<Vec<ComponentDefinition>> {
        let definitions = sqlx::query_as::<_, ComponentDefinition>(
            r#"
            SELECT id, product_id, lci, component_name, created_at
            FROM lci_definitions
            WHERE product_id = ?
            ORDER BY lci
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(definitions)
    }
}

async fn insert_brand(conn: &mut SqliteConnection, actor: &Actor, name: &str) -> DbResult<Brand> {
    let brand = sqlx::query_as::<_, Brand>(
        "INSERT INTO brands (name, created_at) VALUES (?, ?) RETURNING id, name, created_at",
    )
    .bind(name)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| DbError::from(e).on_unique("brand", name))?;

    audit::record_in(conn, actor, "brand.create", "brand", brand.id, json!({ "name": name })).await?;
    Ok(brand)
}

async fn insert_color(conn: &mut SqliteConnection, actor: &Actor, code: &str, name: &str) -> DbResult<Color> {
    sqlx::query("INSERT INTO colors (code, name) VALUES (?, ?)")
        .bind(code)
        .bind(name)
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::from(e).on_unique("color", format!("{code} ({name})")))?;

    audit::record_in(conn, actor, "color.create", "color", code, json!({ "name": name })).await?;
    Ok(Color {
        code: code.to_string(),
        name: name.to_string(),
    })
}

async fn insert_definition(
    conn: &mut SqliteConnection,
    actor: &Actor,
    product_id: i64,
    lci: Option<i64>,
    component_name: &str,
) -> DbResult<ComponentDefinition> {
    if fetch_family(&mut *conn, product_id).await?.is_none() {
        return Err(DbError::not_found("ProductFamily", product_id));
    }

    let lci = match lci {
        Some(lci) => lci,
        None => next_free_lci(&mut *conn, product_id).await?,
    };

    let definition = sqlx::query_as::<_, ComponentDefinition>(
        r#"
        INSERT INTO lci_definitions (product_id, lci, component_name, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id, product_id, lci, component_name, created_at
        "#,
    )
    .bind(product_id)
    .bind(lci)
    .bind(component_name)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| DbError::from(e).on_unique("component definition", format!("{product_id:05}-P-{lci}")))?;

    audit::record_in(
        conn,
        actor,
        "component.define",
        "lci_definition",
        definition.id,
        json!({ "product_id": product_id, "lci": lci, "name": component_name }),
    )
    .await?;
    Ok(definition)
}

async fn next_free_lci(conn: &mut SqliteConnection, product_id: i64) -> DbResult<i64> {
    let highest: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(lci) FROM (
            SELECT lci FROM lci_definitions WHERE product_id = ?1
            UNION ALL
            SELECT lci FROM product_identities WHERE product_id = ?1 AND identity_type = 'Part'
        )
        "#,
    )
    .bind(product_id)
    .fetch_one(conn)
    .await?;

    let next = highest.unwrap_or(0) + 1;
    if next > MAX_LCI {
        return Err(ValidationError::OutOfRange {
            field: "local_component_index".to_string(),
            min: MIN_LCI,
            max: MAX_LCI,
        }
        .into());
    }
    Ok(next)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use catalog_core::{ErrorKind, IdentityType, NewFamily, NewIdentity};

    #[tokio::test]
    async fn test_brands() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let actor = Actor::system();

        db.lookups().create_brand(&actor, "Zebra").await.unwrap();
        db.lookups().create_brand(&actor, "  Anker ").await.unwrap();

        let err = db.lookups().create_brand(&actor, "anker").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);

        let names: Vec<String> = db.lookups().list_brands().await.unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["Anker", "Zebra"]);
    }

    #[tokio::test]
    async fn test_colors_are_seeded() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let actor = Actor::system();

        let colors = db.lookups().list_colors().await.unwrap();
        assert!(colors.iter().any(|c| c.code == "BK" && c.name == "Black"));

        let teal = db.lookups().create_color(&actor, "TL", "Teal").await.unwrap();
        assert_eq!(teal.code, "TL");

        let err = db.lookups().create_color(&actor, "BK", "Onyx").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        let err = db.lookups().create_color(&actor, "B", "Onyx").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);
    }

    #[tokio::test]
    async fn test_define_component_auto_assigns() {
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
            lci: Some(3),
            physical_class: None,
        };
        db.identities().create(&actor, &part).await.unwrap();

        let named = db.lookups().define_component(&actor, 845, Some(3), "Power Brick").await.unwrap();
        assert_eq!(named.lci, 3);

        let next = db.lookups().define_component(&actor, 845, None, "USB-C Cable").await.unwrap();
        assert_eq!(next.lci, 4);

        let err = db.lookups().define_component(&actor, 845, Some(3), "Other").await.unwrap_err();
        assert_eq!(err.to_string(), "Duplicate component definition: '00845-P-3' already exists");

        let err = db.lookups().define_component(&actor, 1, None, "Orphan").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let listed = db.lookups().list_component_definitions(845).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|d| d.component_name.as_str()).collect();
        assert_eq!(names, vec!["Power Brick", "USB-C Cable"]);
    }
}
