//! # Demo Catalog Seeding
//!
//! Populates an empty database with a deterministic demo catalog for
//! development and dashboard work.
//!
//! ## Generated Data (per family)
//! ```text
//! ProductFamily  {pid}            "<name>"
//!   ├── Product  {pid}            variants: BK-N, WY-N, BK (used)
//!   ├── Part     {pid}-P-1        "Power Supply"    variant: bare
//!   ├── Part     {pid}-P-2        "Mounting Kit"    variant: bare
//!   └── Bundle   {pid}-B          = Product ×1 + P-1 ×2 (Accessory)
//!
//! Every Product variant is listed on ZOHO and EBAY (PENDING).
//! ```
//!
//! Seeding is skipped when any family already exists.

use catalog_core::platform::PlatformMetadata;
use catalog_core::{
    Actor, BundleRole, ConditionCode, IdentityType, ListingOverrides, Money, NewFamily,
    NewIdentity, NewListing, NewVariant, Platform,
};
use serde::Serialize;
use tracing::info;

use crate::error::DbResult;
use crate::pool::Database;

/// First product id handed out by the seeder.
pub const SEED_BASE_PRODUCT_ID: i64 = 1000;

const FAMILY_NAMES: &[&str] = &[
    "Thunderbolt Dock Pro",
    "USB-C Travel Hub",
    "27in Monitor Arm",
    "Mechanical Keyboard",
    "Wireless Presenter",
    "Label Printer",
    "Barcode Scanner",
    "Rugged Tablet Case",
    "Conference Speakerphone",
    "KVM Switch",
];

const BRANDS: &[&str] = &["Northwind", "Contoso", "Fabrikam"];

const PRODUCT_VARIANTS: &[(&str, Option<ConditionCode>)] = &[
    ("BK", Some(ConditionCode::New)),
    ("WY", Some(ConditionCode::New)),
    ("BK", None),
];

/// Counts of what [`seed_demo`] created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub brands: usize,
    pub families: usize,
    pub identities: usize,
    pub variants: usize,
    pub listings: usize,
    pub components: usize,
}

/// Seeds `family_count` demo families.
///
/// ## Returns
/// * `Ok(Some(report))` - Catalog was empty and has been populated
/// * `Ok(None)` - Families already exist; nothing was written
pub async fn seed_demo(db: &Database, actor: &Actor, family_count: usize) -> DbResult<Option<SeedReport>> {
    let existing = db.families().count().await?;
    if existing > 0 {
        info!(existing, "Catalog already has families, skipping seed");
        return Ok(None);
    }

    let mut report = SeedReport::default();

    let mut brand_ids = Vec::with_capacity(BRANDS.len());
    for name in BRANDS {
        brand_ids.push(db.lookups().create_brand(actor, name).await?.id);
        report.brands += 1;
    }

    for index in 0..family_count {
        let product_id = SEED_BASE_PRODUCT_ID + index as i64;
        let name = FAMILY_NAMES[index % FAMILY_NAMES.len()];
        let base_name = if index < FAMILY_NAMES.len() {
            name.to_string()
        } else {
            format!("{name} Gen {}", index / FAMILY_NAMES.len() + 1)
        };

        let family = NewFamily {
            product_id,
            base_name,
            brand_id: Some(brand_ids[index % brand_ids.len()]),
            ..Default::default()
        };
        db.families().create(actor, &family).await?;
        report.families += 1;

        db.lookups().define_component(actor, product_id, Some(1), "Power Supply").await?;
        db.lookups().define_component(actor, product_id, Some(2), "Mounting Kit").await?;

        let product = create_identity(db, actor, product_id, IdentityType::Product, None).await?;
        let supply = create_identity(db, actor, product_id, IdentityType::Part, Some(1)).await?;
        let mount = create_identity(db, actor, product_id, IdentityType::Part, Some(2)).await?;
        let bundle = create_identity(db, actor, product_id, IdentityType::Bundle, None).await?;
        report.identities += 4;

        db.bundles()
            .add_component(actor, bundle, product, 1, BundleRole::Primary)
            .await?;
        db.bundles()
            .add_component(actor, bundle, supply, 2, BundleRole::Accessory)
            .await?;
        report.components += 2;

        let base_cents = 4_999 + (index as i64 % 7) * 1_000;
        for (color, condition) in PRODUCT_VARIANTS {
            let price = match condition {
                Some(_) => base_cents,
                None => base_cents * 6 / 10,
            };
            let variant = NewVariant {
                identity_id: product,
                color_code: Some(color.to_string()),
                condition_code: *condition,
                price: Some(Money::from_cents(price)),
                description: None,
            };
            let variant = db.variants().create(actor, &variant).await?;
            report.variants += 1;

            for listing in demo_listings(variant.id, *condition) {
                db.listings().create(actor, &listing).await?;
                report.listings += 1;
            }
        }

        for part in [supply, mount] {
            let variant = NewVariant {
                identity_id: part,
                price: Some(Money::from_cents(1_499)),
                ..Default::default()
            };
            db.variants().create(actor, &variant).await?;
            report.variants += 1;
        }
    }

    info!(
        families = report.families,
        variants = report.variants,
        listings = report.listings,
        "Demo catalog seeded"
    );
    Ok(Some(report))
}

async fn create_identity(
    db: &Database,
    actor: &Actor,
    product_id: i64,
    identity_type: IdentityType,
    lci: Option<i64>,
) -> DbResult<i64> {
    let input = NewIdentity {
        product_id,
        identity_type,
        lci,
        physical_class: None,
    };
    Ok(db.identities().create(actor, &input).await?.id)
}

fn demo_listings(variant_id: i64, condition: Option<ConditionCode>) -> [NewListing; 2] {
    let ebay_condition = match condition {
        Some(ConditionCode::New) => 1000,
        Some(ConditionCode::Refurbished) => 2500,
        None => 3000,
    };
    [
        NewListing {
            variant_id,
            platform: Platform::Zoho,
            overrides: ListingOverrides::default(),
            metadata: None,
        },
        NewListing {
            variant_id,
            platform: Platform::Ebay,
            overrides: ListingOverrides::default(),
            metadata: Some(PlatformMetadata::Ebay {
                category_id: "58058".to_string(),
                condition_id: Some(ebay_condition),
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    #[tokio::test]
    async fn test_seed_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let actor = Actor::system();

        let report = seed_demo(&db, &actor, 2).await.unwrap().unwrap();
        assert_eq!(report.families, 2);
        assert_eq!(report.identities, 8);
        assert_eq!(report.variants, 10);
        assert_eq!(report.listings, 12);
        assert_eq!(report.components, 4);

        let bundle = db.identities().get_by_code("01000-B").await.unwrap();
        assert_eq!(db.bundles().resolve_components(bundle.id).await.unwrap().len(), 2);

        assert!(seed_demo(&db, &actor, 2).await.unwrap().is_none());
    }
}
