//! # Repository Module
//!
//! One repository per registry, all sharing the same pool.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database                                                               │
//! │    ├── families()    FamilyRepository     product_families             │
//! │    ├── identities()  IdentityRepository   product_identities           │
//! │    ├── variants()    VariantRepository    product_variants             │
//! │    ├── listings()    ListingRepository    platform_listings            │
//! │    ├── bundles()     BundleRepository     bundle_components            │
//! │    ├── inventory()   InventoryRepository  inventory_items              │
//! │    ├── lookups()     LookupRepository     brands / colors / lci_defs   │
//! │    └── audit()       AuditRepository      audit_log                    │
//! │                                                                         │
//! │  Every mutation: BEGIN IMMEDIATE → write → audit row → COMMIT          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Row helpers shared across repositories (`fetch_identity`, `fetch_variant`,
//! `refresh_variant_status`, ...) take a `&mut SqliteConnection` so they can
//! run inside another repository's transaction.

pub mod audit;
pub mod bundle;
pub mod family;
pub mod identity;
pub mod inventory;
pub mod listing;
pub mod lookup;
pub mod variant;

/// Turns free text into a `LIKE` pattern matching it anywhere.
///
/// `%`, `_` and `\` are escaped; queries must use `ESCAPE '\'`.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("dock"), "%dock%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern(""), "%%");
    }
}
