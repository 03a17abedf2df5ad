//! # catalog-core: Identity & Sync Engine Rules
//!
//! This crate holds every derivation and state rule of the warehouse catalog
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Warehouse Catalog Architecture                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Dashboard / REST boundary / catalogctl / sync worker     │   │
//! │  │   role check ──► registry call ──► render returned entity       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               catalog-db (Registries)                           │   │
//! │  │   families, identities, variants, listings, bundles, stock      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ calls                                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ catalog-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌────────┐ │   │
//! │  │   │ identity │ │   sku   │ │  sync   │ │ bundle  │ │ access │ │   │
//! │  │   │ code+sig │ │ fullSku │ │aggregate│ │ cycles  │ │ roles  │ │   │
//! │  │   └──────────┘ └─────────┘ └─────────┘ └─────────┘ └────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entity records and their create/edit inputs
//! - [`identity`] - Identity types, generated code and signature derivation
//! - [`sku`] - Condition codes and full SKU composition
//! - [`sync`] - Sync statuses, aggregate rule, worker transition planning
//! - [`platform`] - Marketplaces and typed listing metadata
//! - [`bundle`] - Bundle roles and cycle detection
//! - [`inventory`] - Physical item status transitions
//! - [`access`] - Actor, roles and the role contract
//! - [`money`] - Integer-cent money
//! - [`validation`] - Field-level rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use catalog_core::identity::{IdentityKey, IdentityType};
//! use catalog_core::sku::{full_sku, ConditionCode};
//!
//! let derived = IdentityKey {
//!     product_id: 845,
//!     identity_type: IdentityType::Part,
//!     lci: Some(1),
//!     physical_class: None,
//! }
//! .derive()
//! .unwrap();
//!
//! let sku = full_sku(&derived.generated_code, Some("WY"), Some(ConditionCode::New)).unwrap();
//! assert_eq!(sku, "00845-P-1-WY-N");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod access;
pub mod bundle;
pub mod error;
pub mod identity;
pub mod inventory;
pub mod money;
pub mod platform;
pub mod sku;
pub mod sync;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use access::{Actor, Operation, Role};
pub use bundle::BundleRole;
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use identity::{IdentityType, PhysicalClass};
pub use inventory::InventoryStatus;
pub use money::Money;
pub use platform::{Platform, PlatformMetadata};
pub use sku::ConditionCode;
pub use sync::{ListingSyncStatus, SyncStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest family namespace id (five digits).
pub const MAX_PRODUCT_ID: i64 = 99_999;

/// Local component indexes run 1..=99 within a family.
pub const MIN_LCI: i64 = 1;
pub const MAX_LCI: i64 = 99;

/// Separator between segments of generated codes and full SKUs.
pub const SKU_DELIMITER: char = '-';

/// Default page size for worker-facing queues.
pub const DEFAULT_SYNC_BATCH: i64 = 100;

/// Upper bound for any caller-supplied page size.
pub const MAX_PAGE_SIZE: i64 = 1000;
