//! Parts Sync - component catalog & pricing CLI
//!
//! Prices purchases against the active expense profile, looks parts up at
//! the aggregator and keeps the local catalog in sync with the distributor.

use clap::{Args as ClapArgs, Parser, Subcommand};
use parts_common::{PartLookup, ProfitTarget};
use parts_sync::calculator::{self, CalculationRequest};
use parts_sync::config::{
    NexarConfig, TmeConfig, IMPORT_CHUNK_SIZE, IMPORT_REQUEST_INTERVAL, QUEUE_BATCH_SIZE,
    QUEUE_REQUESTS_PER_MINUTE,
};
use parts_sync::database::{self, calculations::display_amount, Db};
use parts_sync::sync::{self, queue, SyncOutcome};
use parts_sync::{NexarClient, RateLimiter, Result, RetryPolicy, SyncError, TmeClient};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;

/// Component catalog sync and price calculator
#[derive(Parser, Debug)]
#[command(name = "parts_sync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, global = true, default_value_t = default_db_path())]
    database: String,

    #[command(flatten)]
    credentials: Credentials,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct Credentials {
    /// Nexar OAuth client id
    #[arg(long, global = true, env = "NEXAR_CLIENT_ID", hide_env_values = true)]
    nexar_client_id: Option<String>,

    /// Nexar OAuth client secret
    #[arg(long, global = true, env = "NEXAR_CLIENT_SECRET", hide_env_values = true)]
    nexar_client_secret: Option<String>,

    /// TME API token
    #[arg(long, global = true, env = "TME_API_TOKEN", hide_env_values = true)]
    tme_token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calculate a sale price with the active expense profile
    Calculate {
        /// Purchase price in EUR
        #[arg(long)]
        price: f64,
        /// Desired profit in RUB
        #[arg(long, conflicts_with = "profit_percent", required_unless_present = "profit_percent")]
        profit: Option<f64>,
        /// Desired profit as a percent of revenue
        #[arg(long)]
        profit_percent: Option<f64>,
        /// Invoice delivery fee in EUR, used above the small-shipment threshold
        #[arg(long, default_value_t = 0.0)]
        invoice_delivery: f64,
        /// Store the calculation in the history
        #[arg(long, default_value_t = false)]
        save: bool,
        #[arg(long, requires = "save")]
        user_id: Option<i64>,
        /// Article number; attaches aggregator data when Nexar credentials are set
        #[arg(long)]
        article: Option<String>,
    },
    /// Look a part up at the aggregator (cached for 24h)
    Lookup {
        mpn: String,
        /// Ignore and replace the cached entry
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },
    /// Sync one part from the distributor right away
    Sync {
        mpn: String,
        /// Distributor symbol, if known
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Queue a part for background sync
    Enqueue {
        mpn: String,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },
    /// Process one batch of the sync queue
    Queue {
        #[arg(long, default_value_t = QUEUE_BATCH_SIZE)]
        batch: usize,
        /// Re-queue failed items with attempts left before processing
        #[arg(long, default_value_t = false)]
        retry_failed: bool,
    },
    /// Bulk import distributor symbols, one per line
    Import {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = IMPORT_CHUNK_SIZE)]
        chunk: usize,
    },
    /// Show saved calculations, newest first
    History {
        #[arg(long)]
        user_id: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Manage expense profiles
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    /// Print the active profile
    Show,
    /// Load a profile from a camelCase JSON file
    Import {
        #[arg(long)]
        file: PathBuf,
        /// Make the imported profile the active one
        #[arg(long, default_value_t = false)]
        default: bool,
    },
}

/// Returns the default database path: ~/.local/share/parts_sync/parts.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parts_sync")
        .join("parts.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);
    log::debug!("Database path: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let conn = match database::open(&db_path) {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("Failed to open database {}: {}", db_path.display(), e);
            std::process::exit(1);
        }
    };
    let db = database::shared(conn);

    if let Err(e) = run(&db, args.command, &args.credentials).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(db: &Db, command: Command, credentials: &Credentials) -> Result<()> {
    match command {
        Command::Calculate {
            price,
            profit,
            profit_percent,
            invoice_delivery,
            save,
            user_id,
            article,
        } => {
            let target = match (profit, profit_percent) {
                (Some(amount), _) => ProfitTarget::Absolute(amount),
                (None, Some(percent)) => ProfitTarget::Percent(percent),
                (None, None) => {
                    return Err(SyncError::InvalidInput(
                        "either --profit or --profit-percent is required".to_string(),
                    ))
                }
            };

            let mut request = CalculationRequest::new(price, target);
            request.invoice_delivery_fee = invoice_delivery;
            request.user_id = user_id;
            if let Some(article) = article {
                request.part = aggregator_part(db, credentials, &article).await;
                request.article_number = Some(article);
            }

            let quote = if save {
                calculator::calculate_and_save(db, &request)?
            } else {
                calculator::calculate(db, &request)?
            };
            print_json(&quote)
        }
        Command::Lookup { mpn, refresh } => {
            let mut nexar = nexar_client(credentials)?;
            if refresh {
                let conn = database::lock(db);
                database::invalidate_cache_entry(&conn, mpn.trim())?;
            }
            let result = parts_sync::search_or_cache_lookup(db, &mut nexar, &mpn, refresh).await?;
            print_json(&result)
        }
        Command::Sync { mpn, symbol } => {
            let tme = tme_client(credentials, RateLimiter::per_minute(QUEUE_REQUESTS_PER_MINUTE))?;
            match sync::sync_part(db, &tme, &mpn, symbol.as_deref()).await? {
                SyncOutcome::Saved { record, save } => {
                    println!("{} {} ({}) as part {}", save.action, record.mpn, record.manufacturer, save.part_id);
                }
                SyncOutcome::NotFound => println!("{} not found at distributor", mpn),
            }
            Ok(())
        }
        Command::Enqueue { mpn, symbol, priority } => {
            let id = queue::enqueue_sync(db, &mpn, symbol.as_deref(), priority)?;
            println!("queued {} as item {}", mpn.trim(), id);
            Ok(())
        }
        Command::Queue { batch, retry_failed } => {
            if retry_failed {
                queue::retry_failed(db)?;
            }
            let tme = tme_client(credentials, RateLimiter::per_minute(QUEUE_REQUESTS_PER_MINUTE))?;
            let report = sync::process_queue_batch(db, &tme, batch).await?;
            for error in &report.errors {
                log::warn!("{}: {}", error.mpn, error.error);
            }
            let counts = {
                let conn = database::lock(db);
                database::queue_counts(&conn)?
            };
            println!(
                "processed {} ({} ok, {} failed, {} skipped); queue: {} pending, {} processing, {} completed, {} failed",
                report.processed,
                report.success,
                report.failed,
                report.skipped,
                counts.pending,
                counts.processing,
                counts.completed,
                counts.failed
            );
            Ok(())
        }
        Command::Import { file, chunk } => {
            let tme = tme_client(credentials, RateLimiter::new(IMPORT_REQUEST_INTERVAL))?;
            let stats = sync::import_from_file(db, &tme, &file, chunk).await?;
            println!(
                "imported {}/{} ({} ok, {} failed, {} skipped) in {}",
                stats.processed,
                stats.total,
                stats.success,
                stats.failed,
                stats.skipped,
                sync::format_duration(stats.elapsed)
            );
            Ok(())
        }
        Command::History { user_id, limit } => {
            for row in calculator::get_history(db, user_id, limit)? {
                println!(
                    "#{} {} {} purchase {} -> {} (breakeven {}, {}) [{}]",
                    row.id,
                    row.created_at,
                    row.article_number.as_deref().unwrap_or("-"),
                    display_amount(row.purchase_price_eur),
                    display_amount(row.price_with_vat),
                    display_amount(row.breakeven_point),
                    row.calculation_type,
                    row.profile_name.as_deref().unwrap_or("?")
                );
            }
            Ok(())
        }
        Command::Profile(ProfileCommand::Show) => print_json(&calculator::get_active_profile(db)?),
        Command::Profile(ProfileCommand::Import { file, default }) => {
            let id = calculator::import_profile(db, File::open(&file)?, default)?;
            println!("imported profile {}", id);
            Ok(())
        }
    }
}

/// Aggregator data for a calculation; failures only cost the extra detail
async fn aggregator_part(db: &Db, credentials: &Credentials, article: &str) -> Option<parts_common::AggregatorPart> {
    let mut nexar = match nexar_client(credentials) {
        Ok(client) => client,
        Err(e) => {
            log::debug!("Skipping aggregator lookup: {}", e);
            return None;
        }
    };
    match parts_sync::search_or_cache_lookup(db, &mut nexar, article, false).await {
        Ok(result) => match result.lookup {
            PartLookup::Found(part) => Some(part),
            PartLookup::NotFound => None,
        },
        Err(e) => {
            log::warn!("Aggregator lookup for {} failed: {}", article, e);
            None
        }
    }
}

fn nexar_client(credentials: &Credentials) -> Result<NexarClient> {
    match (&credentials.nexar_client_id, &credentials.nexar_client_secret) {
        (Some(id), Some(secret)) => NexarClient::new(NexarConfig::new(id.as_str(), secret.as_str())),
        _ => Err(SyncError::Auth(
            "Nexar credentials missing (set NEXAR_CLIENT_ID and NEXAR_CLIENT_SECRET)".to_string(),
        )),
    }
}

fn tme_client(credentials: &Credentials, limiter: RateLimiter) -> Result<TmeClient> {
    let token = credentials
        .tme_token
        .as_deref()
        .ok_or_else(|| SyncError::Auth("TME token missing (set TME_API_TOKEN)".to_string()))?;
    TmeClient::new(TmeConfig::new(token), limiter, RetryPolicy::default())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
