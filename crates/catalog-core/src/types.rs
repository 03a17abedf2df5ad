//! # Domain Types
//!
//! Entity records and the inputs that create or edit them.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ProductFamily (product_id 00845)                                      │
//! │     │ 1:N                                                               │
//! │     ▼                                                                   │
//! │  Identity  ──── immutable: type, lci, class, code, signature           │
//! │     │ 1:N            ▲                                                  │
//! │     │                │ BundleComponent (parent Bundle/Kit → child)     │
//! │     ▼                                                                   │
//! │  Variant   ──── mutable: color, condition, price, sync status          │
//! │     │ 1:N                  │ 1:N                                        │
//! │     ▼                      ▼                                            │
//! │  PlatformListing       InventoryItem                                   │
//! │  (one per platform)    (one per physical unit)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: integer row id, used for relations
//! - Business key: generated code, full SKU, serial, (variant, platform)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::access::Role;
use crate::bundle::BundleRole;
use crate::identity::{IdentityKey, IdentityType, PhysicalClass};
use crate::inventory::InventoryStatus;
use crate::money::Money;
use crate::platform::{Platform, PlatformMetadata};
use crate::sku::ConditionCode;
use crate::sync::{ListingSyncStatus, SyncStatus};

// =============================================================================
// Units
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum LengthUnit {
    #[default]
    In,
    Cm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum WeightUnit {
    #[default]
    Lb,
    Kg,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub unit: LengthUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Weight {
    pub value: f64,
    #[serde(default)]
    pub unit: WeightUnit,
}

// =============================================================================
// Product Family
// =============================================================================

/// A namespace grouping related identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductFamily {
    /// Caller-assigned five-digit namespace root.
    pub product_id: i64,
    pub base_name: String,
    pub description: Option<String>,
    pub brand_id: Option<i64>,
    pub dimension_length: Option<f64>,
    pub dimension_width: Option<f64>,
    pub dimension_height: Option<f64>,
    pub dimension_unit: Option<LengthUnit>,
    pub weight: Option<f64>,
    pub weight_unit: Option<WeightUnit>,
    /// Free-text manifest of what ships in a kit.
    pub kit_included_products: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ProductFamily {
    pub fn dimensions(&self) -> Option<Dimensions> {
        Some(Dimensions {
            length: self.dimension_length?,
            width: self.dimension_width?,
            height: self.dimension_height?,
            unit: self.dimension_unit.unwrap_or_default(),
        })
    }

    pub fn weight(&self) -> Option<Weight> {
        Some(Weight {
            value: self.weight?,
            unit: self.weight_unit.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewFamily {
    pub product_id: i64,
    pub base_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand_id: Option<i64>,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub weight: Option<Weight>,
    #[serde(default)]
    pub kit_included_products: Option<String>,
}

/// Editable family fields. `None` leaves a field untouched.
///
/// `product_id` is deliberately absent: it is the namespace of every
/// generated code under the family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FamilyUpdate {
    pub base_name: Option<String>,
    pub description: Option<String>,
    pub brand_id: Option<i64>,
    pub dimensions: Option<Dimensions>,
    pub weight: Option<Weight>,
    pub kit_included_products: Option<String>,
}

impl FamilyUpdate {
    pub fn is_empty(&self) -> bool {
        self == &FamilyUpdate::default()
    }
}

// =============================================================================
// Identity
// =============================================================================

/// The immutable engineering definition of what an item is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Identity {
    pub id: i64,
    pub product_id: i64,
    #[serde(rename = "type")]
    pub identity_type: IdentityType,
    /// Local component index; present iff `identity_type` is Part.
    pub lci: Option<i64>,
    pub physical_class: Option<PhysicalClass>,
    pub generated_code: String,
    pub signature: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn key(&self) -> IdentityKey {
        IdentityKey {
            product_id: self.product_id,
            identity_type: self.identity_type,
            lci: self.lci,
            physical_class: self.physical_class,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewIdentity {
    pub product_id: i64,
    #[serde(rename = "type")]
    pub identity_type: IdentityType,
    #[serde(default)]
    pub lci: Option<i64>,
    #[serde(default)]
    pub physical_class: Option<PhysicalClass>,
}

impl From<NewIdentity> for IdentityKey {
    fn from(input: NewIdentity) -> Self {
        IdentityKey {
            product_id: input.product_id,
            identity_type: input.identity_type,
            lci: input.lci,
            physical_class: input.physical_class,
        }
    }
}

// =============================================================================
// Variant
// =============================================================================

/// A sellable configuration of an Identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Variant {
    pub id: i64,
    pub identity_id: i64,
    pub color_code: Option<String>,
    pub condition_code: Option<ConditionCode>,
    pub full_sku: String,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub sync_status: SyncStatus,
    /// Bumped on every user edit; lets the worker detect stale dispatches.
    pub sync_version: i64,
    pub external_item_id: Option<String>,
    pub sync_error: Option<String>,
    #[ts(as = "Option<String>")]
    pub last_synced_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    #[inline]
    pub fn price(&self) -> Option<Money> {
        self.price_cents.map(Money::from_cents)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewVariant {
    pub identity_id: i64,
    #[serde(default)]
    pub color_code: Option<String>,
    #[serde(default)]
    pub condition_code: Option<ConditionCode>,
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default)]
    pub description: Option<String>,
}

// =============================================================================
// Bundle Component
// =============================================================================

/// A bill-of-materials edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BundleComponent {
    pub id: i64,
    pub parent_identity_id: i64,
    pub child_identity_id: i64,
    pub quantity_required: i64,
    pub role: BundleRole,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One line of a resolved bill of materials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ResolvedComponent {
    pub component_id: i64,
    pub identity: Identity,
    pub quantity_required: i64,
    pub role: BundleRole,
}

// =============================================================================
// Platform Listing
// =============================================================================

/// Per-platform sync record for a Variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlatformListing {
    pub id: i64,
    pub variant_id: i64,
    pub platform: Platform,
    pub external_ref_id: Option<String>,
    pub listed_name: Option<String>,
    pub listed_description: Option<String>,
    pub listing_price_cents: Option<i64>,
    pub sync_status: ListingSyncStatus,
    #[ts(as = "Option<String>")]
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_error_message: Option<String>,
    #[ts(as = "Option<String>")]
    pub dispatched_at: Option<DateTime<Utc>>,
    /// Variant `sync_version` at the last dispatch.
    pub dispatched_version: Option<i64>,
    /// Variant `sync_version` when the last `markSynced` was applied.
    pub confirmed_version: Option<i64>,
    pub metadata: Option<PlatformMetadata>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl PlatformListing {
    #[inline]
    pub fn listing_price(&self) -> Option<Money> {
        self.listing_price_cents.map(Money::from_cents)
    }
}

/// Optional per-platform overrides of the variant's name/description/price.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ListingOverrides {
    pub listed_name: Option<String>,
    pub listed_description: Option<String>,
    pub listing_price: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewListing {
    pub variant_id: i64,
    pub platform: Platform,
    #[serde(default)]
    pub overrides: ListingOverrides,
    #[serde(default)]
    pub metadata: Option<PlatformMetadata>,
}

// =============================================================================
// Inventory
// =============================================================================

/// A physical serialized unit of a Variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryItem {
    pub id: i64,
    pub serial_number: Option<String>,
    pub variant_id: i64,
    pub location_code: Option<String>,
    pub status: InventoryStatus,
    pub cost_basis_cents: Option<i64>,
    pub notes: Option<String>,
    #[ts(as = "Option<String>")]
    pub received_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub sold_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    #[inline]
    pub fn cost_basis(&self) -> Option<Money> {
        self.cost_basis_cents.map(Money::from_cents)
    }

    /// Name used in error messages: the serial if there is one.
    pub fn label(&self) -> String {
        self.serial_number
            .clone()
            .unwrap_or_else(|| format!("item #{}", self.id))
    }
}

/// A receiving-dock scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiveItem {
    pub sku: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub location_code: Option<String>,
    #[serde(default)]
    pub cost_basis: Option<Money>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MoveResult {
    pub serial_number: String,
    pub previous_location: Option<String>,
    pub new_location: String,
    #[ts(as = "String")]
    pub moved_at: DateTime<Utc>,
}

/// An inventory item together with its variant's SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LocatedItem {
    pub item: InventoryItem,
    pub full_sku: String,
}

/// Unit counts per status for one variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventorySummary {
    pub variant_id: i64,
    pub full_sku: String,
    pub available: i64,
    pub reserved: i64,
    pub sold: i64,
    pub damaged: i64,
    pub rma: i64,
    pub total: i64,
}

impl InventorySummary {
    /// Adds `count` units in `status` to the tally.
    pub fn record(&mut self, status: InventoryStatus, count: i64) {
        match status {
            InventoryStatus::Available => self.available += count,
            InventoryStatus::Reserved => self.reserved += count,
            InventoryStatus::Sold => self.sold += count,
            InventoryStatus::Damaged => self.damaged += count,
            InventoryStatus::Rma => self.rma += count,
        }
        self.total += count;
    }

    pub fn on_hand(&self) -> i64 {
        self.available + self.reserved
    }
}

// =============================================================================
// Lookups
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Brand {
    pub id: i64,
    pub name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Two-character color code used in SKUs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Color {
    pub code: String,
    pub name: String,
}

/// Human name for a Part's local component index within a family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ComponentDefinition {
    pub id: i64,
    pub product_id: i64,
    pub lci: i64,
    pub component_name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Audit
// =============================================================================

/// One row of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AuditEntry {
    /// UUID v4.
    pub id: String,
    pub actor_id: String,
    pub actor_role: Role,
    /// e.g. `identity.create`, `variant.update_price`, `listing.mark_synced`.
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    /// JSON object with action-specific detail.
    pub detail: Option<String>,
    #[ts(as = "String")]
    pub occurred_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn family() -> ProductFamily {
        let now = Utc::now();
        ProductFamily {
            product_id: 845,
            base_name: "Dock Pro".to_string(),
            description: None,
            brand_id: None,
            dimension_length: Some(10.0),
            dimension_width: Some(4.0),
            dimension_height: None,
            dimension_unit: None,
            weight: Some(2.5),
            weight_unit: Some(WeightUnit::Kg),
            kit_included_products: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_family_partial_dimensions_are_absent() {
        let mut f = family();
        assert_eq!(f.dimensions(), None);
        f.dimension_height = Some(1.0);
        let dims = f.dimensions().unwrap();
        assert_eq!(dims.unit, LengthUnit::In);
        assert_eq!(f.weight().unwrap().unit, WeightUnit::Kg);
    }

    #[test]
    fn test_family_update_is_empty() {
        assert!(FamilyUpdate::default().is_empty());
        let update = FamilyUpdate {
            base_name: Some("Dock Pro 2".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_identity_serializes_type_field() {
        let input: NewIdentity =
            serde_json::from_str(r#"{"product_id":845,"type":"Base"}"#).unwrap();
        assert_eq!(input.identity_type, IdentityType::Product);
        assert_eq!(input.lci, None);
        let key: IdentityKey = input.into();
        assert_eq!(key.derive().unwrap().generated_code, "00845");
    }

    #[test]
    fn test_inventory_summary_tally() {
        let mut summary = InventorySummary::default();
        summary.record(InventoryStatus::Available, 3);
        summary.record(InventoryStatus::Reserved, 1);
        summary.record(InventoryStatus::Sold, 4);
        assert_eq!(summary.total, 8);
        assert_eq!(summary.on_hand(), 4);
    }
}
