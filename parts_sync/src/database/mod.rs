//! SQLite persistence for the parts catalog
//!
//! Uses parameterized queries exclusively. Every write that touches more
//! than one row runs in its own transaction so a failure never leaves
//! partial rows behind.

pub mod cache;
pub mod calculations;
pub mod catalog;
pub mod profiles;
pub mod queue;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};

pub use cache::{get_cache_entry, invalidate_cache_entry, put_cache_entry, CacheEntry};
pub use calculations::{get_history, save_calculation, CalculationRecord, NewCalculation};
pub use catalog::{
    get_manufacturer_id, get_or_create_manufacturer, get_part_by_mpn, price_history_for,
    save_part, MatchStrategy, PriceHistoryRecord, SaveAction, SaveResult, StoredPart,
};
pub use profiles::{get_default_profile, get_profile, insert_profile, set_default_profile};
pub use queue::{
    claim, complete, complete_with_part, enqueue, fail, get_queue_item, queue_counts, retry_failed,
    select_pending, QueueCounts, QueueItem, QueueStatus, INTERRUPTED_MESSAGE,
};

/// Result type for database operations
pub type DbResult<T> = rusqlite::Result<T>;

/// Connection shared between the services of one process
pub type Db = Arc<Mutex<Connection>>;

/// Timestamp layout stored in every `*_at` column (UTC, sorts lexicographically)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Wrap a connection for sharing
pub fn shared(conn: Connection) -> Db {
    Arc::new(Mutex::new(conn))
}

/// Lock the shared connection, recovering it if a previous holder panicked
///
/// SQLite rolls back any open transaction of the panicking holder, so the
/// connection itself is still consistent.
pub fn lock(db: &Db) -> MutexGuard<'_, Connection> {
    db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Open (or create) a database file and bring its schema up to date
pub fn open(path: &std::path::Path) -> DbResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `manufacturers`: unique manufacturer names
/// - `expense_profiles`: markup configuration, at most one default
/// - `parts`: catalog keyed by (mpn, manufacturer)
/// - `price_history`: append-only price snapshots, one per successful sync
/// - `sync_queue`: durable work queue, one row per MPN
/// - `aggregator_cache`: normalized Nexar lookups with expiry
/// - `calculations`: saved price calculations
pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS manufacturers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS expense_profiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            low_weight_delivery_fee REAL NOT NULL,
            transfer_method TEXT NOT NULL,
            eur_rub_rate REAL NOT NULL,
            eur_usdt_rate REAL NOT NULL,
            usdt_rub_rate REAL NOT NULL,
            commission_ip REAL NOT NULL,
            commission_crypto REAL NOT NULL,
            commission_agent REAL NOT NULL,
            domestic_delivery_fee REAL NOT NULL,
            vat_percent REAL NOT NULL,
            profit_tax_percent REAL NOT NULL,
            document_cost_percent REAL NOT NULL,
            target_official_profit REAL NOT NULL,
            competitor_price_min REAL NOT NULL DEFAULT 0,
            competitor_price_max REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- At most one default profile
        CREATE UNIQUE INDEX IF NOT EXISTS idx_expense_profiles_default
            ON expense_profiles(is_default) WHERE is_default = 1;

        CREATE TABLE IF NOT EXISTS parts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            mpn TEXT NOT NULL,
            manufacturer_id INTEGER NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            subcategory TEXT,
            specifications TEXT NOT NULL DEFAULT '{}',
            tme_symbol TEXT,
            tme_price_eur REAL,
            tme_availability INTEGER,
            tme_delivery_days INTEGER,
            tme_moq INTEGER,
            datasheet_url TEXT,
            photo_url TEXT,
            tme_data TEXT,
            tme_last_sync TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (mpn, manufacturer_id),
            FOREIGN KEY (manufacturer_id) REFERENCES manufacturers(id)
        );

        CREATE INDEX IF NOT EXISTS idx_parts_tme_symbol ON parts(tme_symbol);

        CREATE TABLE IF NOT EXISTS price_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            part_id INTEGER NOT NULL,
            mpn TEXT NOT NULL,
            source TEXT NOT NULL,
            price REAL NOT NULL,
            availability INTEGER NOT NULL,
            delivery_days INTEGER NOT NULL,
            recorded_at TEXT NOT NULL,
            FOREIGN KEY (part_id) REFERENCES parts(id)
        );

        CREATE INDEX IF NOT EXISTS idx_price_history_part ON price_history(part_id);

        CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            mpn TEXT NOT NULL UNIQUE,
            tme_symbol TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 3,
            scheduled_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            error_message TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sync_queue_pick
            ON sync_queue(status, priority DESC, scheduled_at ASC);

        CREATE TABLE IF NOT EXISTS aggregator_cache (
            article_number TEXT PRIMARY KEY,
            manufacturer TEXT NOT NULL,
            part_name TEXT NOT NULL,
            availability INTEGER NOT NULL,
            delivery_days INTEGER NOT NULL,
            min_price REAL,
            currency TEXT NOT NULL,
            full_response_json TEXT NOT NULL,
            cache_valid INTEGER NOT NULL DEFAULT 1,
            cached_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS calculations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_id INTEGER NOT NULL,
            user_id INTEGER,
            article_number TEXT,
            purchase_price_eur REAL NOT NULL,
            delivery_invoice_eur REAL NOT NULL,
            aggregator_manufacturer TEXT,
            aggregator_part_name TEXT,
            aggregator_availability INTEGER,
            aggregator_delivery_days INTEGER,
            aggregator_min_price REAL,
            aggregator_data_json TEXT,
            desired_profit_rub REAL,
            desired_profit_percent REAL,
            price_with_vat REAL NOT NULL,
            price_without_vat REAL NOT NULL,
            breakeven_point REAL NOT NULL,
            margin_percent REAL NOT NULL,
            competitor_avg_price REAL NOT NULL,
            price_difference REAL NOT NULL,
            expense_purchase REAL NOT NULL,
            expense_delivery_europe REAL NOT NULL,
            expense_commission REAL NOT NULL,
            expense_delivery_domestic REAL NOT NULL,
            expense_documents REAL NOT NULL,
            expense_vat REAL NOT NULL,
            expense_profit_tax REAL NOT NULL,
            expense_total REAL NOT NULL,
            calculation_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'calculated',
            created_at TEXT NOT NULL,
            FOREIGN KEY (profile_id) REFERENCES expense_profiles(id)
        );

        CREATE INDEX IF NOT EXISTS idx_calculations_user ON calculations(user_id, created_at);
        ",
    )?;

    log::debug!("Database schema initialized");
    Ok(())
}
