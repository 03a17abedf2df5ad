//! # Identity Repository
//!
//! The Identity Registry: immutable engineering definitions under a family.
//!
//! ## Uniqueness
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  (product_id, type, lci)  ──►  uq_identity_tuple (COALESCE(lci, 0))     │
//! │  generated_code           ──►  UNIQUE column                           │
//! │                                                                         │
//! │  Two concurrent creates with the same key:                             │
//! │    A: INSERT ✓  COMMIT                                                 │
//! │    B: INSERT ✗  UNIQUE constraint failed → DbError::UniqueViolation    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no update operation. The `trg_identity_immutable` trigger
//! rejects writes to signature-bearing columns from any other path.

use catalog_core::identity::{generated_code, parse_generated_code, DerivedIdentity, IdentityKey};
use catalog_core::validation::{clamp_limit, validate_product_id};
use catalog_core::{
    Actor, Identity, IdentityType, NewIdentity, ValidationError, MAX_LCI, MAX_PAGE_SIZE, MIN_LCI,
};
use chrono::Utc;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::audit;
use crate::repository::family::fetch_family;
use crate::tx::WriteTx;

const IDENTITY_COLUMNS: &str = r#"
    id, product_id, identity_type, lci, physical_class,
    generated_code, signature, created_at, updated_at
"#;

/// Repository for identity operations.
#[derive(Debug, Clone)]
pub struct IdentityRepository {
    pool: SqlitePool,
}

impl IdentityRepository {
    /// Creates a new IdentityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        IdentityRepository { pool }
    }

    /// Creates an identity with its derived code and signature.
    ///
    /// ## Validation Order
    /// 1. LCI/type coupling and ranges (no I/O)
    /// 2. Owning family exists (FK)
    /// 3. Tuple / code uniqueness (unique index)
    ///
    /// ## Returns
    /// * `Ok(Identity)` - Stored row with `generated_code` and `signature`
    /// * `Err(DbError::Validation)` - LCI present on a non-Part, missing on a Part, out of range
    /// * `Err(DbError::NotFound)` - No such family
    /// * `Err(DbError::UniqueViolation)` - Same (product_id, type, lci) exists
    pub async fn create(&self, actor: &Actor, input: &NewIdentity) -> DbResult<Identity> {
        let key = IdentityKey::from(*input);
        let derived = key.derive()?;

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = insert_identity(tx.conn(), actor, &key, &derived).await;
        let identity = tx.finish(result).await?;

        debug!(
            code = %identity.generated_code,
            signature = %identity.signature,
            "Identity created"
        );
        Ok(identity)
    }

    /// Gets an identity by row id.
    pub async fn get(&self, id: i64) -> DbResult<Identity> {
        let mut conn = self.pool.acquire().await?;
        fetch_identity(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Identity", id))
    }

    /// Exact lookup by generated code.
    ///
    /// Input is normalized first, so `00845-p-1` finds `00845-P-1`.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Identity> {
        let normalized = match parse_generated_code(code) {
            Some((product_id, identity_type, lci)) => generated_code(product_id, identity_type, lci),
            None => code.trim().to_ascii_uppercase(),
        };

        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM product_identities WHERE generated_code = ?");
        sqlx::query_as::<_, Identity>(&sql)
            .bind(&normalized)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Identity", &normalized))
    }

    /// All identities of a family: Product first, then by type and LCI.
    pub async fn list_by_family(&self, product_id: i64) -> DbResult<Vec<Identity>> {
        let sql = format!(
            r#"
            SELECT {IDENTITY_COLUMNS}
            FROM product_identities
            WHERE product_id = ?
            ORDER BY identity_type = 'Product' DESC, identity_type, COALESCE(lci, 0)
            "#
        );
        let identities = sqlx::query_as::<_, Identity>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(identities)
    }

    /// Identities of one type across all families.
    pub async fn list_by_type(&self, identity_type: IdentityType, limit: i64) -> DbResult<Vec<Identity>> {
        let sql = format!(
            r#"
            SELECT {IDENTITY_COLUMNS}
            FROM product_identities
            WHERE identity_type = ?
            ORDER BY product_id, COALESCE(lci, 0)
            LIMIT ?
            "#
        );
        let identities = sqlx::query_as::<_, Identity>(&sql)
            .bind(identity_type)
            .bind(clamp_limit(limit, MAX_PAGE_SIZE))
            .fetch_all(&self.pool)
            .await?;
        Ok(identities)
    }

    /// The LCI after the highest Part in the family (1 for none).
    ///
    /// `create` never assigns an LCI itself; this is for callers that want
    /// a suggestion.
    pub async fn next_lci(&self, product_id: i64) -> DbResult<i64> {
        validate_product_id(product_id)?;
        let mut conn = self.pool.acquire().await?;
        if fetch_family(&mut conn, product_id).await?.is_none() {
            return Err(DbError::not_found("ProductFamily", product_id));
        }

        let highest: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(lci) FROM product_identities WHERE product_id = ? AND identity_type = 'Part'",
        )
        .bind(product_id)
        .fetch_one(&mut *conn)
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
}

async fn insert_identity(
    conn: &mut SqliteConnection,
    actor: &Actor,
    key: &IdentityKey,
    derived: &DerivedIdentity,
) -> DbResult<Identity> {
    let now = Utc::now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO product_identities (
            product_id, identity_type, lci, physical_class,
            generated_code, signature, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(key.product_id)
    .bind(key.identity_type)
    .bind(key.lci)
    .bind(key.physical_class)
    .bind(&derived.generated_code)
    .bind(&derived.signature)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        DbError::from(e)
            .on_unique("identity", &derived.generated_code)
            .on_foreign_key("ProductFamily", key.product_id)
    })?;
    let id = inserted.last_insert_rowid();

    audit::record_in(
        &mut *conn,
        actor,
        "identity.create",
        "identity",
        id,
        json!({
            "generated_code": derived.generated_code,
            "signature": derived.signature,
        }),
    )
    .await?;

    fetch_identity(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Identity", id))
}

pub(crate) async fn fetch_identity(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Identity>> {
    let sql = format!("SELECT {IDENTITY_COLUMNS} FROM product_identities WHERE id = ?");
    let identity = sqlx::query_as::<_, Identity>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(identity)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use catalog_core::{ErrorKind, NewFamily, PhysicalClass};

    async fn db_with_family(product_id: i64) -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let family = NewFamily {
            product_id,
            base_name: "Dock Pro".to_string(),
            ..Default::default()
        };
        db.families().create(&Actor::system(), &family).await.unwrap();
        db
    }

    fn part(product_id: i64, lci: i64) -> NewIdentity {
        NewIdentity {
            product_id,
            identity_type: IdentityType::Part,
            lci: Some(lci),
            physical_class: None,
        }
    }

    #[tokio::test]
    async fn test_create_derives_code_and_signature() {
        let db = db_with_family(845).await;
        let identity = db.identities().create(&Actor::system(), &part(845, 1)).await.unwrap();

        assert_eq!(identity.generated_code, "00845-P-1");
        assert_eq!(identity.signature.len(), 8);
        assert_eq!(identity.key().derive().unwrap().signature, identity.signature);
    }

    #[tokio::test]
    async fn test_duplicate_tuple() {
        let db = db_with_family(845).await;
        db.identities().create(&Actor::system(), &part(845, 1)).await.unwrap();

        let mut again = part(845, 1);
        again.physical_class = Some(PhysicalClass::Electronics);
        let err = db.identities().create(&Actor::system(), &again).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
        assert_eq!(err.to_string(), "Duplicate identity: '00845-P-1' already exists");
    }

    #[tokio::test]
    async fn test_missing_family_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.identities().create(&Actor::system(), &part(845, 1)).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { ref entity, .. } if entity == "ProductFamily"));
    }

    #[tokio::test]
    async fn test_lci_type_coupling() {
        let db = db_with_family(1).await;
        let product_with_lci = NewIdentity {
            product_id: 1,
            identity_type: IdentityType::Product,
            lci: Some(5),
            physical_class: None,
        };
        let err = db.identities().create(&Actor::system(), &product_with_lci).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);

        let part_without_lci = NewIdentity {
            lci: None,
            ..part(1, 1)
        };
        let err = db.identities().create(&Actor::system(), &part_without_lci).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);
    }

    #[tokio::test]
    async fn test_get_by_code_round_trip() {
        let db = db_with_family(845).await;
        let created = db.identities().create(&Actor::system(), &part(845, 12)).await.unwrap();

        assert_eq!(db.identities().get_by_code("00845-P-12").await.unwrap(), created);
        assert_eq!(db.identities().get_by_code(" 00845-p-12 ").await.unwrap(), created);

        let err = db.identities().get_by_code("00845-P-13").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_signature_columns_are_immutable() {
        let db = db_with_family(845).await;
        let identity = db.identities().create(&Actor::system(), &part(845, 1)).await.unwrap();

        let err = sqlx::query("UPDATE product_identities SET lci = 2 WHERE id = ?")
            .bind(identity.id)
            .execute(db.pool())
            .await
            .map_err(DbError::from)
            .unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation { .. }));
        assert_eq!(db.identities().get(identity.id).await.unwrap(), identity);
    }

    #[tokio::test]
    async fn test_next_lci_and_listing() {
        let db = db_with_family(845).await;
        assert_eq!(db.identities().next_lci(845).await.unwrap(), 1);

        let base = NewIdentity {
            product_id: 845,
            identity_type: IdentityType::Product,
            lci: None,
            physical_class: None,
        };
        db.identities().create(&Actor::system(), &base).await.unwrap();
        db.identities().create(&Actor::system(), &part(845, 3)).await.unwrap();
        assert_eq!(db.identities().next_lci(845).await.unwrap(), 4);

        let codes: Vec<String> = db
            .identities()
            .list_by_family(845)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.generated_code)
            .collect();
        assert_eq!(codes, vec!["00845", "00845-P-3"]);

        let parts = db.identities().list_by_type(IdentityType::Part, 10).await.unwrap();
        assert_eq!(parts.len(), 1);

        let err = db.identities().next_lci(846).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
