//! Parts catalog: manufacturers, part upserts and price history

use super::{format_timestamp, DbResult};
use chrono::{DateTime, Utc};
use parts_common::{Category, PartRecord};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Source tag written to price history rows
pub const SOURCE_TME: &str = "tme";

/// How an incoming record is matched against existing catalog rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// MPN + manufacturer
    NaturalKey,
    /// Distributor symbol first, then MPN + manufacturer
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveAction {
    Created,
    Updated,
}

impl fmt::Display for SaveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveAction::Created => write!(f, "created"),
            SaveAction::Updated => write!(f, "updated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveResult {
    pub part_id: i64,
    pub action: SaveAction,
}

/// Catalog row as read back from the database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPart {
    pub id: i64,
    pub mpn: String,
    pub manufacturer: String,
    pub description: String,
    pub category: Category,
    pub subcategory: Option<String>,
    pub specifications: BTreeMap<String, String>,
    pub tme_symbol: Option<String>,
    pub price_eur: Option<f64>,
    pub availability: Option<i64>,
    pub delivery_days: Option<i64>,
    pub moq: Option<i64>,
    pub last_sync: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceHistoryRecord {
    pub id: i64,
    pub part_id: i64,
    pub mpn: String,
    pub source: String,
    pub price: f64,
    pub availability: i64,
    pub delivery_days: i64,
    pub recorded_at: String,
}

pub fn get_manufacturer_id(conn: &Connection, name: &str) -> DbResult<Option<i64>> {
    conn.query_row(
        "SELECT id FROM manufacturers WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
}

/// Id of the manufacturer with this exact name, inserting it if new
pub fn get_or_create_manufacturer(conn: &Connection, name: &str) -> DbResult<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO manufacturers (name) VALUES (?1)",
        params![name],
    )?;
    conn.query_row(
        "SELECT id FROM manufacturers WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
}

fn find_by_natural_key(conn: &Connection, mpn: &str, manufacturer_id: i64) -> DbResult<Option<i64>> {
    conn.query_row(
        "SELECT id FROM parts WHERE mpn = ?1 AND manufacturer_id = ?2 LIMIT 1",
        params![mpn, manufacturer_id],
        |row| row.get(0),
    )
    .optional()
}

fn find_by_symbol(conn: &Connection, symbol: &str) -> DbResult<Option<i64>> {
    conn.query_row(
        "SELECT id FROM parts WHERE tme_symbol = ?1 ORDER BY id LIMIT 1",
        params![symbol],
        |row| row.get(0),
    )
    .optional()
}

fn to_json<T: Serialize>(value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Upsert a distributor record and append its price history row
///
/// Manufacturer, part and history are written in one transaction: either
/// all of them land or none do.
pub fn save_part(
    conn: &mut Connection,
    record: &PartRecord,
    strategy: MatchStrategy,
    now: DateTime<Utc>,
) -> DbResult<SaveResult> {
    let tx = conn.transaction()?;
    let result = write_part(&tx, record, strategy, now)?;
    tx.commit()?;

    log::debug!(
        "{} part {} ({}) as id {}",
        result.action,
        record.mpn,
        record.manufacturer,
        result.part_id
    );
    Ok(result)
}

/// The writes behind [`save_part`], for callers that own the transaction
pub(crate) fn write_part(
    tx: &Transaction<'_>,
    record: &PartRecord,
    strategy: MatchStrategy,
    now: DateTime<Utc>,
) -> DbResult<SaveResult> {
    let now = format_timestamp(now);
    let manufacturer_id = get_or_create_manufacturer(&tx, &record.manufacturer)?;
    let existing = match strategy {
        MatchStrategy::NaturalKey => find_by_natural_key(&tx, &record.mpn, manufacturer_id)?,
        MatchStrategy::Symbol => match find_by_symbol(&tx, &record.symbol)? {
            Some(id) => Some(id),
            None => find_by_natural_key(&tx, &record.mpn, manufacturer_id)?,
        },
    };

    let specifications = to_json(&record.specifications)?;
    let raw = record.raw.to_string();
    let availability = i64::try_from(record.availability).unwrap_or(i64::MAX);

    let result = match existing {
        Some(part_id) => {
            tx.prepare_cached(
                "UPDATE parts SET
                    mpn = ?1, manufacturer_id = ?2, description = ?3, category = ?4,
                    subcategory = ?5, specifications = ?6, tme_symbol = ?7, tme_price_eur = ?8,
                    tme_availability = ?9, tme_delivery_days = ?10, tme_moq = ?11,
                    datasheet_url = COALESCE(?12, datasheet_url),
                    photo_url = COALESCE(?13, photo_url),
                    tme_data = ?14, tme_last_sync = ?15, updated_at = ?15
                 WHERE id = ?16",
            )?
            .execute(params![
                &record.mpn,
                manufacturer_id,
                &record.description,
                record.category.as_str(),
                &record.subcategory,
                &specifications,
                &record.symbol,
                record.price,
                availability,
                record.lead_time_days,
                record.moq,
                &record.datasheet_url,
                &record.photo_url,
                &raw,
                &now,
                part_id,
            ])?;
            SaveResult {
                part_id,
                action: SaveAction::Updated,
            }
        }
        None => {
            tx.prepare_cached(
                "INSERT INTO parts
                 (mpn, manufacturer_id, description, category, subcategory, specifications,
                  tme_symbol, tme_price_eur, tme_availability, tme_delivery_days, tme_moq,
                  datasheet_url, photo_url, tme_data, tme_last_sync, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15, ?15)",
            )?
            .execute(params![
                &record.mpn,
                manufacturer_id,
                &record.description,
                record.category.as_str(),
                &record.subcategory,
                &specifications,
                &record.symbol,
                record.price,
                availability,
                record.lead_time_days,
                record.moq,
                &record.datasheet_url,
                &record.photo_url,
                &raw,
                &now,
            ])?;
            SaveResult {
                part_id: tx.last_insert_rowid(),
                action: SaveAction::Created,
            }
        }
    };

    tx.prepare_cached(
        "INSERT INTO price_history
         (part_id, mpn, source, price, availability, delivery_days, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?
    .execute(params![
        result.part_id,
        &record.mpn,
        SOURCE_TME,
        record.price,
        availability,
        record.lead_time_days,
        &now,
    ])?;

    Ok(result)
}

/// Most recently synced part with this MPN
pub fn get_part_by_mpn(conn: &Connection, mpn: &str) -> DbResult<Option<StoredPart>> {
    let row = conn
        .query_row(
            "SELECT p.id, p.mpn, m.name, p.description, p.category, p.subcategory,
                    p.specifications, p.tme_symbol, p.tme_price_eur, p.tme_availability,
                    p.tme_delivery_days, p.tme_moq, p.tme_last_sync
             FROM parts p
             JOIN manufacturers m ON m.id = p.manufacturer_id
             WHERE p.mpn = ?1
             ORDER BY p.updated_at DESC, p.id DESC
             LIMIT 1",
            params![mpn],
            |row| {
                let category: String = row.get(4)?;
                let specifications: String = row.get(6)?;
                Ok((
                    StoredPart {
                        id: row.get(0)?,
                        mpn: row.get(1)?,
                        manufacturer: row.get(2)?,
                        description: row.get(3)?,
                        category: Category::from_db(&category),
                        subcategory: row.get(5)?,
                        specifications: BTreeMap::new(),
                        tme_symbol: row.get(7)?,
                        price_eur: row.get(8)?,
                        availability: row.get(9)?,
                        delivery_days: row.get(10)?,
                        moq: row.get(11)?,
                        last_sync: row.get(12)?,
                    },
                    specifications,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(mut part, specifications)| {
        part.specifications = serde_json::from_str(&specifications).unwrap_or_default();
        part
    }))
}

/// Price history of one part, oldest first
pub fn price_history_for(conn: &Connection, part_id: i64) -> DbResult<Vec<PriceHistoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, part_id, mpn, source, price, availability, delivery_days, recorded_at
         FROM price_history
         WHERE part_id = ?1
         ORDER BY recorded_at ASC, id ASC",
    )?;

    let results: DbResult<Vec<PriceHistoryRecord>> = stmt
        .query_map(params![part_id], |row| {
            Ok(PriceHistoryRecord {
                id: row.get(0)?,
                part_id: row.get(1)?,
                mpn: row.get(2)?,
                source: row.get(3)?,
                price: row.get(4)?,
                availability: row.get(5)?,
                delivery_days: row.get(6)?,
                recorded_at: row.get(7)?,
            })
        })?
        .collect();
    results
}


#[cfg(test)]
pub use tests::make_test_record;
