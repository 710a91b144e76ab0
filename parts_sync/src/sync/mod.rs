//! Distributor sync: single part, queue batches and bulk import
//!
//! Every driver writes one transaction per item; the queue driver commits the
//! item's `completed` status in the same transaction as the part. The
//! database lock is never held across a network call.

pub mod import;
pub mod queue;

use crate::database::{self, Db, MatchStrategy, SaveResult};
use crate::error::{Result, SyncError};
use crate::tme::TmeClient;
use chrono::Utc;
use parts_common::tme::normalize_product;
use parts_common::PartRecord;

pub use import::{format_duration, import_from_file, import_from_reader, ImportStats};
pub use queue::{enqueue_sync, process_queue_batch, BatchReport, ItemError};

/// Result of syncing one part
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Saved { record: PartRecord, save: SaveResult },
    NotFound,
}

/// Resolve the distributor symbol for `mpn` and fetch its normalized record
///
/// Without a known symbol the first free-text search hit is used. `None`
/// means the distributor has no such part.
pub async fn fetch_part(
    client: &TmeClient,
    mpn: &str,
    symbol: Option<&str>,
) -> Result<Option<PartRecord>> {
    let symbol = match symbol {
        Some(symbol) => symbol.to_string(),
        None => match client.search_by_symbol(mpn).await?.into_iter().next() {
            Some(hit) => hit.product.symbol,
            None => return Ok(None),
        },
    };

    let symbols = [symbol.clone()];
    let products = client.get_products(&symbols).await?;
    let Some(fetched) = products
        .iter()
        .find(|p| p.product.symbol == symbol)
        .or_else(|| products.first())
    else {
        return Ok(None);
    };

    let parameters = client.get_parameters(&symbols).await?;
    Ok(Some(normalize_product(
        &fetched.product,
        parameters.get(&fetched.product.symbol),
        fetched.raw.clone(),
    )))
}

/// Fetch one part and upsert it under the requested MPN
pub async fn sync_part(
    db: &Db,
    client: &TmeClient,
    mpn: &str,
    symbol: Option<&str>,
) -> Result<SyncOutcome> {
    let mpn = mpn.trim();
    if mpn.is_empty() {
        return Err(SyncError::InvalidInput("MPN is required".to_string()));
    }

    let Some(mut record) = fetch_part(client, mpn, symbol).await? else {
        log::info!("{} not found at distributor", mpn);
        return Ok(SyncOutcome::NotFound);
    };
    record.mpn = mpn.to_string();

    let save = {
        let mut conn = database::lock(db);
        database::save_part(&mut conn, &record, MatchStrategy::NaturalKey, Utc::now())?
    };
    log::info!("Synced {} ({}): {} as part {}", mpn, record.symbol, save.action, save.part_id);

    Ok(SyncOutcome::Saved { record, save })
}
