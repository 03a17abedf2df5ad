//! # Command Handlers
//!
//! Each handler authorizes the configured actor, calls one or two
//! repository operations and returns a JSON value for stdout.

use catalog_core::platform::PlatformMetadata;
use catalog_core::{
    Actor, BundleRole, ConditionCode, IdentityType, ListingOverrides, Money, NewFamily,
    NewIdentity, NewListing, NewVariant, Operation, PhysicalClass, Platform,
};
use catalog_db::migrations::migration_status;
use catalog_db::seed::seed_demo;
use catalog_db::Database;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::CliResult;

/// Shared context for every command.
pub struct Context {
    pub db: Database,
    pub actor: Actor,
    pub batch_size: i64,
}

fn to_json<T: Serialize>(value: &T) -> CliResult<Value> {
    Ok(serde_json::to_value(value)?)
}

// =============================================================================
// Maintenance
// =============================================================================

pub async fn migrate(ctx: &Context) -> CliResult<Value> {
    ctx.actor.authorize(Operation::Administer)?;
    ctx.db.run_migrations().await?;
    let (embedded, applied) = migration_status(ctx.db.pool()).await?;
    Ok(json!({ "embedded": embedded, "applied": applied }))
}

pub async fn seed(ctx: &Context, families: usize) -> CliResult<Value> {
    ctx.actor.authorize(Operation::Administer)?;
    match seed_demo(&ctx.db, &ctx.actor, families).await? {
        Some(report) => to_json(&report),
        None => Ok(json!({ "skipped": "catalog already has families" })),
    }
}

pub async fn audit(ctx: &Context, limit: i64) -> CliResult<Value> {
    ctx.actor.authorize(Operation::Administer)?;
    to_json(&ctx.db.audit().recent(limit).await?)
}

// =============================================================================
// Families & identities
// =============================================================================

pub async fn family_create(ctx: &Context, input: NewFamily) -> CliResult<Value> {
    ctx.actor.authorize(Operation::DefineIdentity)?;
    let family = ctx.db.families().create(&ctx.actor, &input).await?;
    info!(product_id = family.product_id, "Family created");
    to_json(&family)
}

pub async fn family_show(ctx: &Context, product_id: i64) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ReadCatalog)?;
    let family = ctx.db.families().get(product_id).await?;
    let identities = ctx.db.identities().list_by_family(product_id).await?;
    let components = ctx.db.lookups().list_component_definitions(product_id).await?;
    Ok(json!({ "family": family, "identities": identities, "components": components }))
}

pub async fn family_search(ctx: &Context, query: &str, limit: i64) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ReadCatalog)?;
    to_json(&ctx.db.families().search(query, limit).await?)
}

pub async fn family_delete(ctx: &Context, product_id: i64) -> CliResult<Value> {
    ctx.actor.authorize(Operation::DefineIdentity)?;
    ctx.db.families().delete(&ctx.actor, product_id).await?;
    Ok(json!({ "deleted": product_id }))
}

pub async fn identity_create(
    ctx: &Context,
    product_id: i64,
    identity_type: IdentityType,
    lci: Option<i64>,
    physical_class: Option<PhysicalClass>,
) -> CliResult<Value> {
    ctx.actor.authorize(Operation::DefineIdentity)?;
    let input = NewIdentity {
        product_id,
        identity_type,
        lci,
        physical_class,
    };
    let identity = ctx.db.identities().create(&ctx.actor, &input).await?;
    info!(code = %identity.generated_code, signature = %identity.signature, "Identity created");
    to_json(&identity)
}

pub async fn identity_show(ctx: &Context, code: &str) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ReadCatalog)?;
    let identity = ctx.db.identities().get_by_code(code).await?;
    let variants = ctx.db.variants().list_by_identity(identity.id, true).await?;
    Ok(json!({ "identity": identity, "variants": variants }))
}

pub async fn identity_list(ctx: &Context, identity_type: IdentityType, limit: i64) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ReadCatalog)?;
    to_json(&ctx.db.identities().list_by_type(identity_type, limit).await?)
}

// =============================================================================
// Variants & listings
// =============================================================================

pub async fn variant_create(
    ctx: &Context,
    identity_code: &str,
    color_code: Option<String>,
    condition_code: Option<ConditionCode>,
    price: Option<Money>,
) -> CliResult<Value> {
    ctx.actor.authorize(Operation::EditVariant)?;
    let identity = ctx.db.identities().get_by_code(identity_code).await?;
    let input = NewVariant {
        identity_id: identity.id,
        color_code,
        condition_code,
        price,
        description: None,
    };
    let variant = ctx.db.variants().create(&ctx.actor, &input).await?;
    info!(sku = %variant.full_sku, "Variant created");
    to_json(&variant)
}

pub async fn variant_show(ctx: &Context, sku: &str) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ReadCatalog)?;
    let variant = ctx.db.variants().get_by_sku(sku).await?;
    let listings = ctx.db.listings().for_variant(variant.id).await?;
    Ok(json!({ "variant": variant, "listings": listings }))
}

pub async fn variant_price(ctx: &Context, sku: &str, price: Option<Money>) -> CliResult<Value> {
    ctx.actor.authorize(Operation::EditVariant)?;
    let variant = ctx.db.variants().get_by_sku(sku).await?;
    to_json(&ctx.db.variants().update_price(&ctx.actor, variant.id, price).await?)
}

pub async fn listing_create(
    ctx: &Context,
    sku: &str,
    platform: Platform,
    overrides: ListingOverrides,
    metadata: Option<&str>,
) -> CliResult<Value> {
    ctx.actor.authorize(Operation::EditVariant)?;
    let metadata = metadata
        .map(|json| PlatformMetadata::from_json(platform, json))
        .transpose()?;
    let variant = ctx.db.variants().get_by_sku(sku).await?;
    let input = NewListing {
        variant_id: variant.id,
        platform,
        overrides,
        metadata,
    };
    to_json(&ctx.db.listings().create(&ctx.actor, &input).await?)
}

pub async fn listing_list(ctx: &Context, sku: &str) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ReadCatalog)?;
    let variant = ctx.db.variants().get_by_sku(sku).await?;
    to_json(&ctx.db.listings().for_variant(variant.id).await?)
}

/// Listings in `ERROR`, oldest first.
pub async fn listing_failed(ctx: &Context, platform: Option<Platform>, limit: i64) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ReadCatalog)?;
    to_json(&ctx.db.listings().failed(platform, limit).await?)
}

// =============================================================================
// Bundles
// =============================================================================

pub async fn bundle_add(
    ctx: &Context,
    parent_code: &str,
    child_code: &str,
    quantity: i64,
    role: BundleRole,
) -> CliResult<Value> {
    ctx.actor.authorize(Operation::DefineIdentity)?;
    let parent = ctx.db.identities().get_by_code(parent_code).await?;
    let child = ctx.db.identities().get_by_code(child_code).await?;
    let component = ctx
        .db
        .bundles()
        .add_component(&ctx.actor, parent.id, child.id, quantity, role)
        .await?;
    to_json(&component)
}

pub async fn bundle_show(ctx: &Context, code: &str) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ReadCatalog)?;
    let identity = ctx.db.identities().get_by_code(code).await?;
    to_json(&ctx.db.bundles().resolve_components(identity.id).await?)
}

// =============================================================================
// Sync worker
// =============================================================================

/// One page of the pending-sync sequence. Resume with the returned cursor.
pub async fn sync_pending(
    ctx: &Context,
    platform: Option<Platform>,
    after: Option<i64>,
    limit: Option<i64>,
) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ReadCatalog)?;
    let mut pager = ctx
        .db
        .variants()
        .pending_sync(platform)
        .batch_size(limit.unwrap_or(ctx.batch_size));
    if let Some(id) = after {
        pager.resume_after(id);
    }
    let variants = pager.next_batch().await?;
    Ok(json!({
        "variants": variants,
        "cursor": pager.cursor(),
        "exhausted": pager.is_exhausted(),
    }))
}

pub async fn sync_dispatched(ctx: &Context, listing_id: i64) -> CliResult<Value> {
    ctx.actor.authorize(Operation::EditVariant)?;
    to_json(&ctx.db.listings().mark_dispatched(&ctx.actor, listing_id).await?)
}

pub async fn sync_synced(ctx: &Context, listing_id: i64, external_ref: &str) -> CliResult<Value> {
    ctx.actor.authorize(Operation::EditVariant)?;
    to_json(&ctx.db.listings().mark_synced(&ctx.actor, listing_id, external_ref).await?)
}

pub async fn sync_error(ctx: &Context, listing_id: i64, message: &str) -> CliResult<Value> {
    ctx.actor.authorize(Operation::EditVariant)?;
    to_json(&ctx.db.listings().mark_error(&ctx.actor, listing_id, message).await?)
}

// =============================================================================
// Inventory
// =============================================================================

pub async fn inventory_receive(ctx: &Context, input: catalog_core::ReceiveItem) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ManageInventory)?;
    to_json(&ctx.db.inventory().receive(&ctx.actor, &input).await?)
}

pub async fn inventory_move(ctx: &Context, serial: &str, location: &str) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ManageInventory)?;
    to_json(&ctx.db.inventory().move_item(&ctx.actor, serial, location).await?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InventoryAction {
    Reserve,
    Sell,
    Release,
    Damage,
    Rma,
    Restock,
}

pub async fn inventory_status(ctx: &Context, serial: &str, action: InventoryAction) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ManageInventory)?;
    let inventory = ctx.db.inventory();
    let item = match action {
        InventoryAction::Reserve => inventory.reserve(&ctx.actor, serial).await?,
        InventoryAction::Sell => inventory.sell(&ctx.actor, serial).await?,
        InventoryAction::Release => inventory.release(&ctx.actor, serial).await?,
        InventoryAction::Damage => inventory.mark_damaged(&ctx.actor, serial).await?,
        InventoryAction::Rma => inventory.mark_rma(&ctx.actor, serial).await?,
        InventoryAction::Restock => inventory.restock(&ctx.actor, serial).await?,
    };
    to_json(&item)
}

pub async fn inventory_summary(ctx: &Context, sku: &str) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ReadCatalog)?;
    let variant = ctx.db.variants().get_by_sku(sku).await?;
    let summary = ctx.db.inventory().summary(variant.id).await?;
    let value = ctx.db.inventory().total_value(Some(variant.id), None).await?;
    Ok(json!({ "sku": variant.full_sku, "summary": summary, "total_value": value }))
}

pub async fn inventory_lookup(ctx: &Context, sku_or_serial: &str) -> CliResult<Value> {
    ctx.actor.authorize(Operation::ReadCatalog)?;
    to_json(&ctx.db.inventory().lookup(sku_or_serial).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::{ErrorKind, Role};
    use catalog_db::DbConfig;

    async fn context(role: Role) -> Context {
        Context {
            db: Database::new(DbConfig::in_memory()).await.unwrap(),
            actor: Actor::new("tester", role),
            batch_size: 2,
        }
    }

    fn family(product_id: i64) -> NewFamily {
        NewFamily {
            product_id,
            base_name: "Dock Pro".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_worker_flow() {
        let ctx = context(Role::Admin).await;
        family_create(&ctx, family(845)).await.unwrap();
        identity_create(&ctx, 845, IdentityType::Part, Some(1), None).await.unwrap();
        variant_create(&ctx, "00845-p-1", Some("BK".into()), None, Some(Money::from_cents(999)))
            .await
            .unwrap();
        let listing = listing_create(
            &ctx,
            "00845-P-1-BK",
            Platform::Ebay,
            ListingOverrides::default(),
            Some(r#"{"platform":"EBAY","category_id":"58058"}"#),
        )
        .await
        .unwrap();
        let listing_id = listing["id"].as_i64().unwrap();

        let page = sync_pending(&ctx, Some(Platform::Ebay), None, None).await.unwrap();
        assert_eq!(page["variants"].as_array().unwrap().len(), 1);
        assert_eq!(page["exhausted"], true);

        sync_dispatched(&ctx, listing_id).await.unwrap();
        let synced = sync_synced(&ctx, listing_id, "EB-42").await.unwrap();
        assert_eq!(synced["sync_status"], "SYNCED");

        let shown = variant_show(&ctx, "00845-P-1-BK").await.unwrap();
        assert_eq!(shown["variant"]["sync_status"], "SYNCED");
    }

    #[tokio::test]
    async fn test_inventory_commands() {
        let ctx = context(Role::Admin).await;
        family_create(&ctx, family(845)).await.unwrap();
        identity_create(&ctx, 845, IdentityType::Product, None, None).await.unwrap();
        variant_create(&ctx, "00845", Some("BK".into()), None, None).await.unwrap();

        let scan = catalog_core::ReceiveItem {
            sku: "00845-BK".to_string(),
            serial_number: Some("SN-1".to_string()),
            location_code: Some("a1-02".to_string()),
            cost_basis: Some(Money::from_cents(4_000)),
            notes: None,
        };
        inventory_receive(&ctx, scan).await.unwrap();

        let sold = inventory_status(&ctx, "SN-1", InventoryAction::Sell).await.unwrap();
        assert_eq!(sold["status"], "SOLD");
        let err = inventory_status(&ctx, "SN-1", InventoryAction::Release).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);

        let found = inventory_lookup(&ctx, "SN-1").await.unwrap();
        assert_eq!(found.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_roles_are_enforced() {
        let ctx = context(Role::Sales).await;
        let err = family_create(&ctx, family(845)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);

        let ctx = context(Role::Warehouse).await;
        let err = variant_price(&ctx, "00845", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidField);
        let err = inventory_lookup(&ctx, "nothing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
