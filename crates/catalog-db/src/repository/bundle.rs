//! # Bundle Repository
//!
//! Bill-of-materials edges between identities.
//!
//! Cycle detection loads the edge set inside the write transaction and
//! walks it with a visited set ([`ComponentGraph`]), so the graph it checks
//! is the graph the insert lands in and the walk always terminates.

use catalog_core::bundle::{check_new_edge, ComponentGraph};
use catalog_core::validation::validate_quantity_required;
use catalog_core::{Actor, BundleComponent, BundleRole, Identity, ResolvedComponent};
use chrono::Utc;
use serde_json::json;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::audit;
use crate::repository::identity::fetch_identity;
use crate::tx::WriteTx;

const COMPONENT_COLUMNS: &str =
    "id, parent_identity_id, child_identity_id, quantity_required, role, created_at, updated_at";

#[derive(Debug, FromRow)]
struct ResolvedRow {
    component_id: i64,
    quantity_required: i64,
    role: BundleRole,
    #[sqlx(flatten)]
    identity: Identity,
}

/// Repository for bundle/kit composition.
#[derive(Debug, Clone)]
pub struct BundleRepository {
    pool: SqlitePool,
}

impl BundleRepository {
    /// Creates a new BundleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BundleRepository { pool }
    }

    /// Adds `child` to the bill of materials of `parent`.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - Either identity is missing
    /// * `Err(DbError::Validation)` - Parent is not a Bundle/Kit, quantity ≤ 0
    /// * `Err(DbError::CycleDetected)` - `child` already contains `parent`, or they are the same
    /// * `Err(DbError::UniqueViolation)` - The edge already exists
    pub async fn add_component(
        &self,
        actor: &Actor,
        parent_id: i64,
        child_id: i64,
        quantity_required: i64,
        role: BundleRole,
    ) -> DbResult<BundleComponent> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = insert_component(tx.conn(), actor, parent_id, child_id, quantity_required, role).await;
        let component = tx.finish(result).await?;

        debug!(
            parent_id,
            child_id,
            quantity = component.quantity_required,
            role = %component.role,
            "Bundle component added"
        );
        Ok(component)
    }

    /// Direct components of an identity (one level, not recursive).
    ///
    /// A non-composite identity resolves to an empty list.
    pub async fn resolve_components(&self, identity_id: i64) -> DbResult<Vec<ResolvedComponent>> {
        let mut conn = self.pool.acquire().await?;
        if fetch_identity(&mut conn, identity_id).await?.is_none() {
            return Err(DbError::not_found("Identity", identity_id));
        }

        let rows = sqlx::query_as::<_, ResolvedRow>(
            r#"
            SELECT bc.id AS component_id, bc.quantity_required, bc.role,
                   i.id, i.product_id, i.identity_type, i.lci, i.physical_class,
                   i.generated_code, i.signature, i.created_at, i.updated_at
            FROM bundle_components bc
            JOIN product_identities i ON i.id = bc.child_identity_id
            WHERE bc.parent_identity_id = ?
            ORDER BY bc.id
            "#,
        )
        .bind(identity_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ResolvedComponent {
                component_id: row.component_id,
                identity: row.identity,
                quantity_required: row.quantity_required,
                role: row.role,
            })
            .collect())
    }

    /// Gets one edge by id.
    pub async fn get_component(&self, component_id: i64) -> DbResult<BundleComponent> {
        let mut conn = self.pool.acquire().await?;
        load_component(&mut conn, component_id).await
    }

    /// Changes quantity and/or role of an edge.
    pub async fn update_component(
        &self,
        actor: &Actor,
        component_id: i64,
        quantity_required: Option<i64>,
        role: Option<BundleRole>,
    ) -> DbResult<BundleComponent> {
        if let Some(quantity) = quantity_required {
            validate_quantity_required(quantity)?;
        }

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = modify_component(tx.conn(), actor, component_id, quantity_required, role).await;
        tx.finish(result).await
    }

    /// Removes an edge.
    pub async fn remove_component(&self, actor: &Actor, component_id: i64) -> DbResult<()> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = delete_component(tx.conn(), actor, component_id).await;
        tx.finish(result).await
    }

    /// Bundles and kits that list `child_id` directly.
    pub async fn bundles_containing(&self, child_id: i64) -> DbResult<Vec<Identity>> {
        let parents = sqlx::query_as::<_, Identity>(
            r#"
            SELECT i.id, i.product_id, i.identity_type, i.lci, i.physical_class,
                   i.generated_code, i.signature, i.created_at, i.updated_at
            FROM bundle_components bc
            JOIN product_identities i ON i.id = bc.parent_identity_id
            WHERE bc.child_identity_id = ?
            ORDER BY i.generated_code
            "#,
        )
        .bind(child_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(parents)
    }
}

async fn insert_component(
    conn: &mut SqliteConnection,
    actor: &Actor,
    parent_id: i64,
    child_id: i64,
    quantity_required: i64,
    role: BundleRole,
) -> DbResult<BundleComponent> {
    let parent = fetch_identity(&mut *conn, parent_id)
        .await?
        .ok_or_else(|| DbError::not_found("Identity", parent_id))?;
    let child = fetch_identity(&mut *conn, child_id)
        .await?
        .ok_or_else(|| DbError::not_found("Identity", child_id))?;

    check_new_edge(parent.id, parent.identity_type, child.id, quantity_required)?;

    let edges: Vec<(i64, i64)> =
        sqlx::query_as("SELECT parent_identity_id, child_identity_id FROM bundle_components")
            .fetch_all(&mut *conn)
            .await?;
    let graph: ComponentGraph = edges.into_iter().collect();
    graph.check_acyclic(parent.id, child.id)?;

    let now = Utc::now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO bundle_components (
            parent_identity_id, child_identity_id, quantity_required, role, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(parent.id)
    .bind(child.id)
    .bind(quantity_required)
    .bind(role)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        DbError::from(e).on_unique(
            "bundle_component",
            format!("{} in {}", child.generated_code, parent.generated_code),
        )
    })?;
    let id = inserted.last_insert_rowid();

    audit::record_in(
        &mut *conn,
        actor,
        "bundle.add_component",
        "bundle_component",
        id,
        json!({
            "parent": parent.generated_code,
            "child": child.generated_code,
            "quantity_required": quantity_required,
            "role": role,
        }),
    )
    .await?;

    load_component(conn, id).await
}

async fn modify_component(
    conn: &mut SqliteConnection,
    actor: &Actor,
    component_id: i64,
    quantity_required: Option<i64>,
    role: Option<BundleRole>,
) -> DbResult<BundleComponent> {
    let current = load_component(&mut *conn, component_id).await?;
    let quantity = quantity_required.unwrap_or(current.quantity_required);
    let role = role.unwrap_or(current.role);
    if quantity == current.quantity_required && role == current.role {
        return Ok(current);
    }

    sqlx::query("UPDATE bundle_components SET quantity_required = ?, role = ?, updated_at = ? WHERE id = ?")
        .bind(quantity)
        .bind(role)
        .bind(Utc::now())
        .bind(component_id)
        .execute(&mut *conn)
        .await?;
    audit::record_in(
        &mut *conn,
        actor,
        "bundle.update_component",
        "bundle_component",
        component_id,
        json!({ "quantity_required": quantity, "role": role }),
    )
    .await?;

    load_component(conn, component_id).await
}

async fn delete_component(conn: &mut SqliteConnection, actor: &Actor, component_id: i64) -> DbResult<()> {
    let current = load_component(&mut *conn, component_id).await?;

    sqlx::query("DELETE FROM bundle_components WHERE id = ?")
        .bind(component_id)
        .execute(&mut *conn)
        .await?;
    audit::record_in(
        &mut *conn,
        actor,
        "bundle.remove_component",
        "bundle_component",
        component_id,
        json!({
            "parent_identity_id": current.parent_identity_id,
            "child_identity_id": current.child_identity_id,
        }),
    )
    .await?;

    debug!(component_id, "Bundle component removed");
    Ok(())
}

async fn load_component(conn: &mut SqliteConnection, component_id: i64) -> DbResult<BundleComponent> {
    let sql = format!("SELECT {COMPONENT_COLUMNS} FROM bundle_components WHERE id = ?");
    sqlx::query_as::<_, BundleComponent>(&sql)
        .bind(component_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DbError::not_found("BundleComponent", component_id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use catalog_core::{ErrorKind, IdentityType, NewFamily, NewIdentity};

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for product_id in [100, 200, 300] {
            let family = NewFamily {
                product_id,
                base_name: format!("Family {product_id}"),
                ..Default::default()
            };
            db.families().create(&Actor::system(), &family).await.unwrap();
        }
        db
    }

    async fn identity(db: &Database, product_id: i64, identity_type: IdentityType, lci: Option<i64>) -> Identity {
        let input = NewIdentity {
            product_id,
            identity_type,
            lci,
            physical_class: None,
        };
        db.identities().create(&Actor::system(), &input).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_and_resolve() {
        let db = setup().await;
        let actor = Actor::system();
        let bundle = identity(&db, 100, IdentityType::Bundle, None).await;
        let dock = identity(&db, 100, IdentityType::Product, None).await;
        let cable = identity(&db, 100, IdentityType::Part, Some(1)).await;

        db.bundles().add_component(&actor, bundle.id, dock.id, 1, BundleRole::Primary).await.unwrap();
        db.bundles().add_component(&actor, bundle.id, cable.id, 2, BundleRole::Accessory).await.unwrap();

        let resolved = db.bundles().resolve_components(bundle.id).await.unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].identity, dock);
        assert_eq!(resolved[1].quantity_required, 2);
        assert_eq!(resolved[1].role, BundleRole::Accessory);

        assert!(db.bundles().resolve_components(dock.id).await.unwrap().is_empty());
        let err = db.bundles().resolve_components(9999).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let parents = db.bundles().bundles_containing(cable.id).await.unwrap();
        assert_eq!(parents, vec![bundle]);
    }

    #[tokio::test]
    async fn test_structural_rejections() {
        let db = setup().await;
        let actor = Actor::system();
        let bundle = identity(&db, 100, IdentityType::Bundle, None).await;
        let part = identity(&db, 100, IdentityType::Part, Some(1)).await;

        let err = db
            .bundles()
            .add_component(&actor, part.id, bundle.id, 1, BundleRole::Primary)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);

        let err = db
            .bundles()
            .add_component(&actor, bundle.id, part.id, 0, BundleRole::Primary)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);

        let err = db
            .bundles()
            .add_component(&actor, bundle.id, bundle.id, 1, BundleRole::Primary)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CycleDetected);

        db.bundles().add_component(&actor, bundle.id, part.id, 1, BundleRole::Primary).await.unwrap();
        let err = db
            .bundles()
            .add_component(&actor, bundle.id, part.id, 3, BundleRole::Primary)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
    }

    #[tokio::test]
    async fn test_transitive_cycle_is_rejected() {
        let db = setup().await;
        let actor = Actor::system();
        let a = identity(&db, 100, IdentityType::Bundle, None).await;
        let b = identity(&db, 200, IdentityType::Kit, None).await;
        let c = identity(&db, 300, IdentityType::Bundle, None).await;

        db.bundles().add_component(&actor, a.id, b.id, 1, BundleRole::Primary).await.unwrap();
        db.bundles().add_component(&actor, b.id, c.id, 1, BundleRole::Primary).await.unwrap();

        let err = db
            .bundles()
            .add_component(&actor, c.id, a.id, 1, BundleRole::Satellite)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::CycleDetected { parent_id, child_id } if parent_id == c.id && child_id == a.id));
        assert!(db.bundles().resolve_components(c.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let db = setup().await;
        let actor = Actor::system();
        let kit = identity(&db, 100, IdentityType::Kit, None).await;
        let part = identity(&db, 100, IdentityType::Part, Some(1)).await;
        let edge = db.bundles().add_component(&actor, kit.id, part.id, 1, BundleRole::Primary).await.unwrap();

        let updated = db
            .bundles()
            .update_component(&actor, edge.id, Some(4), Some(BundleRole::Satellite))
            .await
            .unwrap();
        assert_eq!(updated.quantity_required, 4);
        assert_eq!(updated.role, BundleRole::Satellite);

        let err = db.bundles().update_component(&actor, edge.id, Some(-1), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);

        db.bundles().remove_component(&actor, edge.id).await.unwrap();
        let err = db.bundles().get_component(edge.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
