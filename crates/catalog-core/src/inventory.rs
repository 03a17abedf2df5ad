//! # Inventory Status Rules
//!
//! Physical serialized units move through a small lifecycle:
//!
//! ```text
//!              reserve             sell
//!   AVAILABLE ─────────► RESERVED ─────► SOLD
//!       │  ▲   release      │
//!       │  └────────────────┘
//!       │        sell
//!       └──────────────────────────────► SOLD
//!
//!   any status except SOLD ──► DAMAGED | RMA ──► AVAILABLE (restock)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::validation::ValidationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum InventoryStatus {
    #[default]
    #[serde(alias = "IN_STOCK")]
    Available,
    Sold,
    Reserved,
    Damaged,
    Rma,
}

impl InventoryStatus {
    pub const ALL: [InventoryStatus; 5] = [
        InventoryStatus::Available,
        InventoryStatus::Sold,
        InventoryStatus::Reserved,
        InventoryStatus::Damaged,
        InventoryStatus::Rma,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryStatus::Available => "AVAILABLE",
            InventoryStatus::Sold => "SOLD",
            InventoryStatus::Reserved => "RESERVED",
            InventoryStatus::Damaged => "DAMAGED",
            InventoryStatus::Rma => "RMA",
        }
    }

    pub fn can_transition_to(&self, next: InventoryStatus) -> bool {
        use InventoryStatus::*;
        match (self, next) {
            (Available, Reserved) => true,
            (Available | Reserved, Sold) => true,
            (Reserved, Available) => true,
            (Sold, Damaged | Rma) => false,
            (current, Damaged | Rma) => *current != next,
            (Damaged | Rma, Available) => true,
            _ => false,
        }
    }

    /// Validates a status change for the item identified by `entity`.
    pub fn transition(&self, next: InventoryStatus, entity: &str) -> ValidationResult<InventoryStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ValidationError::InvalidTransition {
                entity: entity.to_string(),
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Counted as sellable stock.
    pub fn is_on_hand(&self) -> bool {
        matches!(self, InventoryStatus::Available | InventoryStatus::Reserved)
    }
}

impl fmt::Display for InventoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InventoryStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        if wanted == "IN_STOCK" {
            return Ok(InventoryStatus::Available);
        }
        InventoryStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == wanted)
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown inventory status '{}'", s.trim()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::InventoryStatus::*;
    use super::*;

    #[test]
    fn test_sales_flow() {
        assert!(Available.can_transition_to(Reserved));
        assert!(Reserved.can_transition_to(Sold));
        assert!(Available.can_transition_to(Sold));
        assert!(Reserved.can_transition_to(Available));
    }

    #[test]
    fn test_sold_is_final_for_damage() {
        assert!(!Sold.can_transition_to(Damaged));
        assert!(!Sold.can_transition_to(Rma));
        assert!(!Sold.can_transition_to(Available));
        assert!(!Sold.can_transition_to(Reserved));
    }

    #[test]
    fn test_damage_and_restock() {
        assert!(Available.can_transition_to(Damaged));
        assert!(Reserved.can_transition_to(Rma));
        assert!(Damaged.can_transition_to(Rma));
        assert!(!Damaged.can_transition_to(Damaged));
        assert!(Rma.can_transition_to(Available));
        assert!(!Rma.can_transition_to(Sold));
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = Sold.transition(Reserved, "SN-1").unwrap_err();
        assert_eq!(err.to_string(), "Cannot move SN-1 from SOLD to RESERVED");
        assert_eq!(Available.transition(Reserved, "SN-1").unwrap(), Reserved);
    }

    #[test]
    fn test_legacy_in_stock_label() {
        assert_eq!("in_stock".parse::<InventoryStatus>().unwrap(), Available);
        let json: InventoryStatus = serde_json::from_str("\"IN_STOCK\"").unwrap();
        assert_eq!(json, Available);
        assert_eq!(serde_json::to_string(&Rma).unwrap(), "\"RMA\"");
    }
}
