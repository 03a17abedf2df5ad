//! # catalogctl
//!
//! Operator and sync-worker command line for the catalog store.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          catalogctl Startup                             │
//! │                                                                         │
//! │  1. Initialize Logging (stderr, RUST_LOG or default filter)             │
//! │  2. Parse arguments                                                     │
//! │  3. Load CatalogConfig (file → env → --db)                              │
//! │  4. Open Database (runs migrations unless disabled)                     │
//! │  5. Run one command, print JSON to stdout                               │
//! │                                                                         │
//! │  On failure: JSON error report on stderr, exit status by error kind    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sync worker loop
//! ```text
//! catalogctl sync pending --platform EBAY            # page of variants + cursor
//! catalogctl sync dispatched 17                      # before calling eBay
//! catalogctl sync synced 17 EB-2231                  # on success
//! catalogctl sync error 17 "category retired"        # on failure
//! ```

mod commands;
mod config;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use catalog_core::{
    BundleRole, ConditionCode, IdentityType, ListingOverrides, Money, NewFamily, PhysicalClass,
    Platform, ReceiveItem,
};
use catalog_db::Database;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::commands::{Context, InventoryAction};
use crate::config::CatalogConfig;
use crate::error::CliResult;

#[derive(Debug, Parser)]
#[command(name = "catalogctl", version, about = "Warehouse catalog identity and sync engine")]
struct Cli {
    /// TOML config file. Defaults to catalog.toml in the platform config dir.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding config and CATALOG_DB_PATH.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// Populate an empty catalog with demo families.
    Seed {
        #[arg(long, default_value_t = 3)]
        families: usize,
    },
    #[command(subcommand)]
    Family(FamilyCommand),
    #[command(subcommand)]
    Identity(IdentityCommand),
    #[command(subcommand)]
    Variant(VariantCommand),
    #[command(subcommand)]
    Listing(ListingCommand),
    #[command(subcommand)]
    Bundle(BundleCommand),
    #[command(subcommand)]
    Sync(SyncCommand),
    #[command(subcommand)]
    Inventory(InventoryCommand),
    /// Most recent audit entries.
    Audit {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[derive(Debug, Subcommand)]
enum FamilyCommand {
    Create {
        product_id: i64,
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        brand_id: Option<i64>,
        /// Free-text list of what ships in the box.
        #[arg(long)]
        kit: Option<String>,
    },
    Show {
        product_id: i64,
    },
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Refused while any identity still lives in the family.
    Delete {
        product_id: i64,
    },
}

#[derive(Debug, Subcommand)]
enum IdentityCommand {
    Create {
        product_id: i64,
        /// Type name (PART, BUNDLE, ...) or single letter.
        identity_type: IdentityType,
        #[arg(long)]
        lci: Option<i64>,
        /// Physical class letter (E, C, P, S, W, A).
        #[arg(long = "class")]
        physical_class: Option<PhysicalClass>,
    },
    Show {
        code: String,
    },
    List {
        identity_type: IdentityType,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
}

#[derive(Debug, Subcommand)]
enum VariantCommand {
    Create {
        /// Generated code of the owning identity, e.g. 00845-P-1.
        identity: String,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        condition: Option<ConditionCode>,
        #[arg(long, value_parser = Money::parse)]
        price: Option<Money>,
    },
    Show {
        sku: String,
    },
    /// Set the price; omit it to clear.
    Price {
        sku: String,
        #[arg(value_parser = Money::parse)]
        price: Option<Money>,
    },
}

#[derive(Debug, Subcommand)]
enum ListingCommand {
    Create {
        sku: String,
        platform: Platform,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = Money::parse)]
        price: Option<Money>,
        /// Platform metadata as JSON, tagged with "platform".
        #[arg(long)]
        metadata: Option<String>,
    },
    List {
        sku: String,
    },
    Failed {
        #[arg(long)]
        platform: Option<Platform>,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
}

#[derive(Debug, Subcommand)]
enum BundleCommand {
    Add {
        parent: String,
        child: String,
        #[arg(long, default_value_t = 1)]
        quantity: i64,
        #[arg(long, default_value = "PRIMARY")]
        role: BundleRole,
    },
    Show {
        code: String,
    },
}

#[derive(Debug, Subcommand)]
enum SyncCommand {
    /// One page of variants awaiting sync.
    Pending {
        #[arg(long)]
        platform: Option<Platform>,
        /// Cursor returned by the previous page.
        #[arg(long)]
        after: Option<i64>,
        #[arg(long)]
        limit: Option<i64>,
    },
    Dispatched {
        listing_id: i64,
    },
    Synced {
        listing_id: i64,
        external_ref: String,
    },
    Error {
        listing_id: i64,
        message: String,
    },
}

#[derive(Debug, Subcommand)]
enum InventoryCommand {
    Receive {
        sku: String,
        #[arg(long)]
        serial: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, value_parser = Money::parse)]
        cost: Option<Money>,
        #[arg(long)]
        notes: Option<String>,
    },
    Move {
        serial: String,
        location: String,
    },
    Status {
        serial: String,
        #[arg(value_enum)]
        action: InventoryAction,
    },
    Summary {
        sku: String,
    },
    Lookup {
        sku_or_serial: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,catalog=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "Command failed");
            let report = serde_json::to_string_pretty(&err.report())
                .unwrap_or_else(|_| err.to_string());
            eprintln!("{report}");
            err.exit_code()
        }
    }
}

async fn run(cli: Cli) -> CliResult<String> {
    let mut config = CatalogConfig::load(cli.config.as_deref())?;
    if let Some(path) = cli.db {
        config.database.path = path;
    }

    info!(path = ?config.database.path, actor = %config.audit.actor_id, "Opening catalog");
    let ctx = Context {
        db: Database::new(config.db_config()).await?,
        actor: config.actor(),
        batch_size: config.sync.batch_size,
    };

    let result = dispatch(&ctx, cli.command).await;
    ctx.db.close().await;
    Ok(serde_json::to_string_pretty(&result?)?)
}

async fn dispatch(ctx: &Context, command: Command) -> CliResult<Value> {
    match command {
        Command::Migrate => commands::migrate(ctx).await,
        Command::Seed { families } => commands::seed(ctx, families).await,
        Command::Audit { limit } => commands::audit(ctx, limit).await,

        Command::Family(cmd) => match cmd {
            FamilyCommand::Create {
                product_id,
                name,
                description,
                brand_id,
                kit,
            } => {
                let input = NewFamily {
                    product_id,
                    base_name: name,
                    description,
                    brand_id,
                    kit_included_products: kit,
                    ..Default::default()
                };
                commands::family_create(ctx, input).await
            }
            FamilyCommand::Show { product_id } => commands::family_show(ctx, product_id).await,
            FamilyCommand::Search { query, limit } => commands::family_search(ctx, &query, limit).await,
            FamilyCommand::Delete { product_id } => commands::family_delete(ctx, product_id).await,
        },

        Command::Identity(cmd) => match cmd {
            IdentityCommand::Create {
                product_id,
                identity_type,
                lci,
                physical_class,
            } => commands::identity_create(ctx, product_id, identity_type, lci, physical_class).await,
            IdentityCommand::Show { code } => commands::identity_show(ctx, &code).await,
            IdentityCommand::List { identity_type, limit } => {
                commands::identity_list(ctx, identity_type, limit).await
            }
        },

        Command::Variant(cmd) => match cmd {
            VariantCommand::Create {
                identity,
                color,
                condition,
                price,
            } => commands::variant_create(ctx, &identity, color, condition, price).await,
            VariantCommand::Show { sku } => commands::variant_show(ctx, &sku).await,
            VariantCommand::Price { sku, price } => commands::variant_price(ctx, &sku, price).await,
        },

        Command::Listing(cmd) => match cmd {
            ListingCommand::Create {
                sku,
                platform,
                name,
                description,
                price,
                metadata,
            } => {
                let overrides = ListingOverrides {
                    listed_name: name,
                    listed_description: description,
                    listing_price: price,
                };
                commands::listing_create(ctx, &sku, platform, overrides, metadata.as_deref()).await
            }
            ListingCommand::List { sku } => commands::listing_list(ctx, &sku).await,
            ListingCommand::Failed { platform, limit } => {
                commands::listing_failed(ctx, platform, limit).await
            }
        },

        Command::Bundle(cmd) => match cmd {
            BundleCommand::Add {
                parent,
                child,
                quantity,
                role,
            } => commands::bundle_add(ctx, &parent, &child, quantity, role).await,
            BundleCommand::Show { code } => commands::bundle_show(ctx, &code).await,
        },

        Command::Sync(cmd) => match cmd {
            SyncCommand::Pending {
                platform,
                after,
                limit,
            } => commands::sync_pending(ctx, platform, after, limit).await,
            SyncCommand::Dispatched { listing_id } => commands::sync_dispatched(ctx, listing_id).await,
            SyncCommand::Synced {
                listing_id,
                external_ref,
            } => commands::sync_synced(ctx, listing_id, &external_ref).await,
            SyncCommand::Error { listing_id, message } => {
                commands::sync_error(ctx, listing_id, &message).await
            }
        },

        Command::Inventory(cmd) => match cmd {
            InventoryCommand::Receive {
                sku,
                serial,
                location,
                cost,
                notes,
            } => {
                let input = ReceiveItem {
                    sku,
                    serial_number: serial,
                    location_code: location,
                    cost_basis: cost,
                    notes,
                };
                commands::inventory_receive(ctx, input).await
            }
            InventoryCommand::Move { serial, location } => {
                commands::inventory_move(ctx, &serial, &location).await
            }
            InventoryCommand::Status { serial, action } => {
                commands::inventory_status(ctx, &serial, action).await
            }
            InventoryCommand::Summary { sku } => commands::inventory_summary(ctx, &sku).await,
            InventoryCommand::Lookup { sku_or_serial } => {
                commands::inventory_lookup(ctx, &sku_or_serial).await
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_domain_values() {
        let cli = Cli::try_parse_from([
            "catalogctl", "identity", "create", "845", "p", "--lci", "2", "--class", "c",
        ])
        .unwrap();
        match cli.command {
            Command::Identity(IdentityCommand::Create {
                product_id,
                identity_type,
                lci,
                physical_class,
            }) => {
                assert_eq!(product_id, 845);
                assert_eq!(identity_type, IdentityType::Part);
                assert_eq!(lci, Some(2));
                assert_eq!(physical_class, Some(PhysicalClass::CoverCase));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["catalogctl", "variant", "price", "00845-BK", "129.99"]).unwrap();
        match cli.command {
            Command::Variant(VariantCommand::Price { price, .. }) => {
                assert_eq!(price, Some(Money::from_cents(12_999)));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["catalogctl", "family", "delete", "845"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Family(FamilyCommand::Delete { product_id: 845 })
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Cli::try_parse_from(["catalogctl", "listing", "create", "00845", "MYSPACE"]).is_err());
        assert!(Cli::try_parse_from(["catalogctl", "variant", "price", "00845", "12.345"]).is_err());
    }
}
