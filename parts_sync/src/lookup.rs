//! Cached aggregator lookups
//!
//! Found parts are kept for [`CACHE_TTL_HOURS`]; not-found answers are never
//! cached, so a part that appears upstream later is picked up on the next
//! lookup.

use crate::config::CACHE_TTL_HOURS;
use crate::database::{self, Db};
use crate::error::{Result, SyncError};
use crate::nexar::NexarClient;
use chrono::Utc;
use parts_common::PartLookup;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupResult {
    pub lookup: PartLookup,
    /// True when served from the cache without calling the aggregator
    pub cached: bool,
}

/// Look up `mpn`, serving a fresh cache entry when there is one
///
/// With `refresh` set the cache is bypassed and overwritten.
pub async fn search_or_cache_lookup(
    db: &Db,
    client: &mut NexarClient,
    mpn: &str,
    refresh: bool,
) -> Result<LookupResult> {
    let mpn = mpn.trim();
    if mpn.is_empty() {
        return Err(SyncError::InvalidInput("MPN is required".to_string()));
    }

    if !refresh {
        let entry = {
            let conn = database::lock(db);
            database::get_cache_entry(&conn, mpn, Utc::now())?
        };
        if let Some(entry) = entry {
            log::debug!("Cache hit for {} (expires {})", mpn, entry.expires_at);
            return Ok(LookupResult {
                lookup: PartLookup::Found(entry.part),
                cached: true,
            });
        }
    }

    let lookup = client.search_by_mpn(mpn).await?;
    if let PartLookup::Found(part) = &lookup {
        let conn = database::lock(db);
        database::put_cache_entry(&conn, mpn, part, Utc::now(), chrono::Duration::hours(CACHE_TTL_HOURS))?;
    } else {
        log::info!("{} not found at aggregator", mpn);
    }

    Ok(LookupResult {
        lookup,
        cached: false,
    })
}
