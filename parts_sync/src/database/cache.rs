//! Aggregator lookup cache

use super::{format_timestamp, DbResult};
use chrono::{DateTime, Duration, Utc};
use parts_common::AggregatorPart;
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub article_number: String,
    pub part: AggregatorPart,
    pub cached_at: String,
    pub expires_at: String,
}

/// Valid, unexpired entry for `article_number`
///
/// Both conditions must hold: a valid flag on an expired row is a miss.
pub fn get_cache_entry(
    conn: &Connection,
    article_number: &str,
    now: DateTime<Utc>,
) -> DbResult<Option<CacheEntry>> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT full_response_json, cached_at, expires_at
             FROM aggregator_cache
             WHERE article_number = ?1 AND cache_valid = 1 AND expires_at > ?2",
            params![article_number, format_timestamp(now)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((json, cached_at, expires_at)) = row else {
        return Ok(None);
    };

    match serde_json::from_str::<AggregatorPart>(&json) {
        Ok(part) => Ok(Some(CacheEntry {
            article_number: article_number.to_string(),
            part,
            cached_at,
            expires_at,
        })),
        Err(e) => {
            log::warn!("Ignoring unreadable cache entry for {}: {}", article_number, e);
            Ok(None)
        }
    }
}

/// Insert or refresh the entry for `article_number`
pub fn put_cache_entry(
    conn: &Connection,
    article_number: &str,
    part: &AggregatorPart,
    now: DateTime<Utc>,
    ttl: Duration,
) -> DbResult<()> {
    let json = serde_json::to_string(part)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let availability = i64::try_from(part.availability).unwrap_or(i64::MAX);

    conn.prepare_cached(
        "INSERT INTO aggregator_cache
         (article_number, manufacturer, part_name, availability, delivery_days, min_price,
          currency, full_response_json, cache_valid, cached_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10)
         ON CONFLICT(article_number) DO UPDATE SET
            manufacturer = excluded.manufacturer,
            part_name = excluded.part_name,
            availability = excluded.availability,
            delivery_days = excluded.delivery_days,
            min_price = excluded.min_price,
            currency = excluded.currency,
            full_response_json = excluded.full_response_json,
            cache_valid = 1,
            cached_at = excluded.cached_at,
            expires_at = excluded.expires_at",
    )?
    .execute(params![
        article_number,
        &part.manufacturer,
        &part.description,
        availability,
        part.delivery_days,
        part.min_price,
        &part.currency,
        &json,
        format_timestamp(now),
        format_timestamp(now + ttl),
    ])?;
    Ok(())
}

/// Mark the entry stale; true if there was one
pub fn invalidate_cache_entry(conn: &Connection, article_number: &str) -> DbResult<bool> {
    let changed = conn.execute(
        "UPDATE aggregator_cache SET cache_valid = 0 WHERE article_number = ?1",
        params![article_number],
    )?;
    Ok(changed > 0)
}


#[cfg(test)]
pub use tests::make_test_part;
