//! # Actors and Roles
//!
//! The caller of every mutating operation is passed explicitly as an
//! [`Actor`]; there is no ambient session. Registries record the actor in the
//! audit trail, and the boundary layer gates calls with [`Role::permits`].
//!
//! ```text
//!               read   identity  variant/listing  inventory  admin
//!   Admin        ✅       ✅           ✅             ✅        ✅
//!   Sales        ✅       ❌           ✅             ❌        ❌
//!   Warehouse    ✅       ❌           ❌             ✅        ❌
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum Role {
    Admin,
    Sales,
    Warehouse,
}

/// Operation classes the role contract distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Operation {
    /// Any read of families, identities, variants, listings.
    ReadCatalog,
    /// Families, identities, lookups, bundle components.
    DefineIdentity,
    /// Variant creation/edits and listing management.
    EditVariant,
    /// Receive, move, reserve, sell.
    ManageInventory,
    /// Delete listings, read the audit trail.
    Administer,
}

impl Role {
    pub fn permits(&self, operation: Operation) -> bool {
        match (self, operation) {
            (Role::Admin, _) => true,
            (_, Operation::ReadCatalog) => true,
            (Role::Sales, Operation::EditVariant) => true,
            (Role::Warehouse, Operation::ManageInventory) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Sales => "SALES",
            Role::Warehouse => "WAREHOUSE",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "SALES" => Ok(Role::Sales),
            "WAREHOUSE" => Ok(Role::Warehouse),
            other => Err(ValidationError::InvalidFormat {
                field: "role".to_string(),
                reason: format!("unknown role '{}'", other),
            }),
        }
    }
}

/// Who is performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Actor for migrations, seeding and other unattended jobs.
    pub fn system() -> Self {
        Self::new("system", Role::Admin)
    }

    /// Boundary guard: `NotAllowed` unless the role permits `operation`.
    pub fn authorize(&self, operation: Operation) -> Result<(), ValidationError> {
        if self.role.permits(operation) {
            Ok(())
        } else {
            Err(ValidationError::NotAllowed {
                field: "role".to_string(),
                reason: format!("{} may not perform {:?}", self.role, operation),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_may_do_everything() {
        for op in [
            Operation::ReadCatalog,
            Operation::DefineIdentity,
            Operation::EditVariant,
            Operation::ManageInventory,
            Operation::Administer,
        ] {
            assert!(Role::Admin.permits(op));
        }
    }

    #[test]
    fn test_sales_edits_variants_not_identities() {
        assert!(Role::Sales.permits(Operation::EditVariant));
        assert!(!Role::Sales.permits(Operation::DefineIdentity));
        assert!(!Role::Sales.permits(Operation::ManageInventory));
    }

    #[test]
    fn test_warehouse_reads_catalog_and_moves_stock() {
        assert!(Role::Warehouse.permits(Operation::ReadCatalog));
        assert!(Role::Warehouse.permits(Operation::ManageInventory));
        assert!(!Role::Warehouse.permits(Operation::EditVariant));
        assert!(!Role::Warehouse.permits(Operation::DefineIdentity));
    }

    #[test]
    fn test_authorize() {
        let picker = Actor::new("u-17", Role::Warehouse);
        assert!(picker.authorize(Operation::ManageInventory).is_ok());
        assert!(matches!(
            picker.authorize(Operation::Administer),
            Err(ValidationError::NotAllowed { .. })
        ));
        assert_eq!(Actor::system().role, Role::Admin);
        assert_eq!("sales".parse::<Role>().unwrap(), Role::Sales);
    }
}
