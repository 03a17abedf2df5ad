//! # catalog-db: Persistence for the Catalog Identity & Sync Engine
//!
//! SQLite storage for families, identities, variants, bundle edges, platform
//! listings, inventory and the audit trail, using sqlx for async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Catalog Data Flow                                │
//! │                                                                         │
//! │  catalogctl / sync worker / dashboard backend                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    catalog-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ Identity       │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ Variant        │   │ 001_initial  │  │   │
//! │  │   │ WriteTx       │    │ Listing (sync) │   │ 002_audit    │  │   │
//! │  │   │ (tx.rs)       │    │ Bundle, ...    │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                              ▲                                  │
//! │       ▼                              │ pure rules                       │
//! │  ┌──────────────────┐       ┌──────────────────┐                       │
//! │  │  SQLite database │       │   catalog-core   │                       │
//! │  └──────────────────┘       └──────────────────┘                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and repository accessors
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per registry
//! - [`seed`] - Deterministic demo catalog
//!
//! ## Usage
//!
//! ```rust,ignore
//! use catalog_core::{Actor, IdentityType, NewIdentity};
//! use catalog_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("catalog.db")).await?;
//! let actor = Actor::system();
//!
//! let identity = db
//!     .identities()
//!     .create(&actor, &NewIdentity { product_id: 845, identity_type: IdentityType::Part, lci: Some(1), physical_class: None })
//!     .await?;
//! assert_eq!(identity.generated_code, "00845-P-1");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod seed;
mod tx;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::audit::AuditRepository;
pub use repository::bundle::BundleRepository;
pub use repository::family::FamilyRepository;
pub use repository::identity::IdentityRepository;
pub use repository::inventory::InventoryRepository;
pub use repository::listing::ListingRepository;
pub use repository::lookup::LookupRepository;
pub use repository::variant::{PendingSyncPager, VariantRepository};
