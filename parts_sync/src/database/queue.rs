//! Durable sync queue
//!
//! Items move `pending -> processing -> completed | failed`. Claiming is a
//! single conditional UPDATE, so two workers can never both own an item, and
//! the attempt counter is bumped before any network call is made.

use super::catalog::{write_part, MatchStrategy, SaveResult};
use super::{format_timestamp, DbResult};
use crate::config::{DEFAULT_MAX_ATTEMPTS, STALE_PROCESSING_MINUTES};
use chrono::{DateTime, Duration, Utc};
use parts_common::PartRecord;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::fmt;

/// Error stored on an item whose worker never reported back
pub const INTERRUPTED_MESSAGE: &str = "interrupted while processing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    fn from_db(value: &str) -> rusqlite::Result<Self> {
        match value {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(rusqlite::Error::InvalidColumnType(
                5,
                format!("status '{}'", other),
                rusqlite::types::Type::Text,
            )),
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    pub id: i64,
    pub mpn: String,
    pub tme_symbol: Option<String>,
    pub priority: i64,
    pub status: QueueStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub scheduled_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl QueueCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.failed
    }
}

const ITEM_COLUMNS: &str = "id, mpn, tme_symbol, priority, attempts, status, max_attempts,
     scheduled_at, started_at, completed_at, error_message";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    let status: String = row.get(5)?;
    Ok(QueueItem {
        id: row.get(0)?,
        mpn: row.get(1)?,
        tme_symbol: row.get(2)?,
        priority: row.get(3)?,
        attempts: row.get(4)?,
        status: QueueStatus::from_db(&status)?,
        max_attempts: row.get(6)?,
        scheduled_at: row.get(7)?,
        started_at: row.get(8)?,
        completed_at: row.get(9)?,
        error_message: row.get(10)?,
    })
}

/// Add an MPN to the queue, or merge into its existing row
///
/// Merging never lowers the priority and never duplicates the MPN. The
/// schedule moves to `now` and the item goes back to `pending`. Finished
/// items get a fresh attempt budget; an item left `processing` keeps the
/// attempts it already spent, and fails once none are left.
pub fn enqueue(
    conn: &Connection,
    mpn: &str,
    tme_symbol: Option<&str>,
    priority: i64,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    conn.prepare_cached(
        "INSERT INTO sync_queue (mpn, tme_symbol, priority, status, attempts, max_attempts, scheduled_at)
         VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?5)
         ON CONFLICT(mpn) DO UPDATE SET
            priority = MAX(sync_queue.priority, excluded.priority),
            tme_symbol = COALESCE(excluded.tme_symbol, sync_queue.tme_symbol),
            scheduled_at = excluded.scheduled_at,
            attempts = CASE WHEN sync_queue.status IN ('failed', 'completed')
                            THEN 0 ELSE sync_queue.attempts END,
            error_message = CASE
                WHEN sync_queue.status IN ('failed', 'completed') THEN NULL
                WHEN sync_queue.status = 'processing' AND sync_queue.attempts >= sync_queue.max_attempts
                    THEN ?6
                ELSE sync_queue.error_message END,
            completed_at = CASE WHEN sync_queue.status IN ('failed', 'completed')
                                THEN NULL ELSE sync_queue.completed_at END,
            status = CASE
                WHEN sync_queue.status = 'processing' AND sync_queue.attempts >= sync_queue.max_attempts
                    THEN 'failed'
                ELSE 'pending' END
         RETURNING id",
    )?
    .query_row(
        params![
            mpn,
            tme_symbol,
            priority,
            DEFAULT_MAX_ATTEMPTS,
            format_timestamp(now),
            INTERRUPTED_MESSAGE
        ],
        |row| row.get(0),
    )
}

/// Claimable items, highest priority first, oldest schedule first
pub fn select_pending(conn: &Connection, limit: usize) -> DbResult<Vec<QueueItem>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM sync_queue
         WHERE status = 'pending' AND attempts < max_attempts
         ORDER BY priority DESC, scheduled_at ASC, id ASC
         LIMIT ?1",
        ITEM_COLUMNS
    ))?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let results: DbResult<Vec<QueueItem>> = stmt.query_map(params![limit], item_from_row)?.collect();
    results
}

/// Atomically move a pending item to `processing` and count the attempt
///
/// Returns false when another worker got there first or the item has no
/// attempts left.
pub fn claim(conn: &Connection, id: i64, now: DateTime<Utc>) -> DbResult<bool> {
    let changed = conn.execute(
        "UPDATE sync_queue
         SET status = 'processing', attempts = attempts + 1, started_at = ?2
         WHERE id = ?1 AND status = 'pending' AND attempts < max_attempts",
        params![id, format_timestamp(now)],
    )?;
    Ok(changed == 1)
}

pub fn complete(conn: &Connection, id: i64, now: DateTime<Utc>) -> DbResult<()> {
    conn.execute(
        "UPDATE sync_queue
         SET status = 'completed', completed_at = ?2, error_message = NULL
         WHERE id = ?1",
        params![id, format_timestamp(now)],
    )?;
    Ok(())
}

/// Upsert the synced part and mark its queue item completed as one unit
pub fn complete_with_part(
    conn: &mut Connection,
    id: i64,
    record: &PartRecord,
    now: DateTime<Utc>,
) -> DbResult<SaveResult> {
    let tx = conn.transaction()?;
    let result = write_part(&tx, record, MatchStrategy::NaturalKey, now)?;
    complete(&tx, id, now)?;
    tx.commit()?;
    Ok(result)
}

pub fn fail(conn: &Connection, id: i64, message: &str) -> DbResult<()> {
    conn.execute(
        "UPDATE sync_queue SET status = 'failed', error_message = ?2 WHERE id = ?1",
        params![id, message],
    )?;
    Ok(())
}

/// Put failed items with attempts left back into the queue
///
/// Items stuck in `processing` for longer than [`STALE_PROCESSING_MINUTES`]
/// are treated as failed: re-queued while attempts remain, failed for good
/// otherwise. Returns the number of re-queued items.
pub fn retry_failed(conn: &Connection, now: DateTime<Utc>) -> DbResult<usize> {
    let stale_before = format_timestamp(now - Duration::minutes(STALE_PROCESSING_MINUTES));
    let tx = conn.unchecked_transaction()?;

    let requeued = tx.execute(
        "UPDATE sync_queue
         SET status = 'pending', scheduled_at = ?1
         WHERE attempts < max_attempts
           AND (status = 'failed' OR (status = 'processing' AND started_at < ?2))",
        params![format_timestamp(now), &stale_before],
    )?;
    let abandoned = tx.execute(
        "UPDATE sync_queue
         SET status = 'failed', error_message = ?2
         WHERE status = 'processing' AND started_at < ?1",
        params![&stale_before, INTERRUPTED_MESSAGE],
    )?;
    tx.commit()?;

    if abandoned > 0 {
        log::warn!("{} interrupted queue item(s) have no attempts left", abandoned);
    }
    Ok(requeued)
}

pub fn queue_counts(conn: &Connection) -> DbResult<QueueCounts> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")?;
    let mut rows = stmt.query([])?;

    let mut counts = QueueCounts::default();
    while let Some(row) = rows.next()? {
        let status: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        match status.as_str() {
            "pending" => counts.pending = count,
            "processing" => counts.processing = count,
            "completed" => counts.completed = count,
            "failed" => counts.failed = count,
            _ => {}
        }
    }
    Ok(counts)
}

pub fn get_queue_item(conn: &Connection, mpn: &str) -> DbResult<Option<QueueItem>> {
    conn.query_row(
        &format!("SELECT {} FROM sync_queue WHERE mpn = ?1", ITEM_COLUMNS),
        params![mpn],
        item_from_row,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::catalog::{get_part_by_mpn, make_test_record, price_history_for, SaveAction};
    use crate::database::test_support::{at, test_db};

    fn item(conn: &Connection, mpn: &str) -> QueueItem {
        get_queue_item(conn, mpn).unwrap().unwrap()
    }

    #[test]
    fn enqueue_creates_pending_item() {
        let conn = test_db();
        enqueue(&conn, "NE555P", Some("NE555P-TI"), 5, at("2026-03-01 10:00:00")).unwrap();

        let queued = item(&conn, "NE555P");
        assert_eq!(queued.status, QueueStatus::Pending);
        assert_eq!(queued.priority, 5);
        assert_eq!(queued.attempts, 0);
        assert_eq!(queued.max_attempts, 3);
        assert_eq!(queued.tme_symbol.as_deref(), Some("NE555P-TI"));
        assert_eq!(queued.scheduled_at, "2026-03-01 10:00:00");
    }

    #[test]
    fn reenqueue_never_lowers_priority() {
        let conn = test_db();
        let first = enqueue(&conn, "NE555P", None, 10, at("2026-03-01 10:00:00")).unwrap();
        let second = enqueue(&conn, "NE555P", None, 2, at("2026-03-01 11:00:00")).unwrap();

        assert_eq!(first, second);
        let queued = item(&conn, "NE555P");
        assert_eq!(queued.priority, 10);
        assert_eq!(queued.scheduled_at, "2026-03-01 11:00:00");
        assert_eq!(queue_counts(&conn).unwrap().total(), 1);
    }

    #[test]
    fn reenqueue_raises_priority_and_keeps_symbol() {
        let conn = test_db();
        enqueue(&conn, "NE555P", Some("NE555P-TI"), 1, at("2026-03-01 10:00:00")).unwrap();
        enqueue(&conn, "NE555P", None, 7, at("2026-03-01 10:05:00")).unwrap();

        let queued = item(&conn, "NE555P");
        assert_eq!(queued.priority, 7);
        assert_eq!(queued.tme_symbol.as_deref(), Some("NE555P-TI"));

        enqueue(&conn, "NE555P", Some("NE555P-TEX"), 0, at("2026-03-01 10:06:00")).unwrap();
        assert_eq!(item(&conn, "NE555P").tme_symbol.as_deref(), Some("NE555P-TEX"));
    }

    #[test]
    fn reenqueue_failed_item_resets_budget() {
        let conn = test_db();
        let id = enqueue(&conn, "NE555P", None, 0, at("2026-03-01 10:00:00")).unwrap();
        assert!(claim(&conn, id, at("2026-03-01 10:01:00")).unwrap());
        fail(&conn, id, "HTTP error: 500").unwrap();

        enqueue(&conn, "NE555P", None, 0, at("2026-03-01 12:00:00")).unwrap();

        let queued = item(&conn, "NE555P");
        assert_eq!(queued.status, QueueStatus::Pending);
        assert_eq!(queued.attempts, 0);
        assert!(queued.error_message.is_none());
    }

    #[test]
    fn reenqueue_pending_item_keeps_attempts() {
        let conn = test_db();
        let id = enqueue(&conn, "NE555P", None, 0, at("2026-03-01 10:00:00")).unwrap();
        conn.execute("UPDATE sync_queue SET attempts = 2 WHERE id = ?1", [id]).unwrap();

        enqueue(&conn, "NE555P", None, 0, at("2026-03-01 11:00:00")).unwrap();
        assert_eq!(item(&conn, "NE555P").attempts, 2);
    }

    #[test]
    fn reenqueue_releases_interrupted_item_with_spent_attempts() {
        let conn = test_db();
        let id = enqueue(&conn, "NE555P", None, 0, at("2026-03-01 10:00:00")).unwrap();
        assert!(claim(&conn, id, at("2026-03-01 10:01:00")).unwrap());

        enqueue(&conn, "NE555P", None, 9, at("2026-03-01 10:02:00")).unwrap();

        let queued = item(&conn, "NE555P");
        assert_eq!(queued.status, QueueStatus::Pending);
        assert_eq!(queued.priority, 9);
        assert_eq!(queued.attempts, 1);
        assert!(claim(&conn, id, at("2026-03-01 10:03:00")).unwrap());
        assert_eq!(item(&conn, "NE555P").attempts, 2);
    }

    #[test]
    fn reenqueue_cannot_outrun_attempt_budget() {
        let conn = test_db();
        let id = enqueue(&conn, "NE555P", None, 0, at("2026-03-01 10:00:00")).unwrap();
        for minute in 1..=3 {
            let now = at(&format!("2026-03-01 10:0{}:00", minute));
            assert!(claim(&conn, id, now).unwrap());
            enqueue(&conn, "NE555P", None, 0, now).unwrap();
        }

        let queued = item(&conn, "NE555P");
        assert_eq!(queued.status, QueueStatus::Failed);
        assert_eq!(queued.attempts, 3);
        assert_eq!(queued.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
        assert!(!claim(&conn, id, at("2026-03-01 10:05:00")).unwrap());
        assert!(select_pending(&conn, 10).unwrap().is_empty());
    }

    #[test]
    fn select_orders_by_priority_then_schedule() {
        let conn = test_db();
        enqueue(&conn, "LOW-OLD", None, 0, at("2026-03-01 08:00:00")).unwrap();
        enqueue(&conn, "HIGH-NEW", None, 5, at("2026-03-01 10:00:00")).unwrap();
        enqueue(&conn, "HIGH-OLD", None, 5, at("2026-03-01 09:00:00")).unwrap();
        enqueue(&conn, "LOW-NEW", None, 0, at("2026-03-01 11:00:00")).unwrap();

        let mpns: Vec<String> = select_pending(&conn, 10)
            .unwrap()
            .into_iter()
            .map(|i| i.mpn)
            .collect();
        assert_eq!(mpns, vec!["HIGH-OLD", "HIGH-NEW", "LOW-OLD", "LOW-NEW"]);

        assert_eq!(select_pending(&conn, 2).unwrap().len(), 2);
    }

    #[test]
    fn select_skips_exhausted_and_non_pending() {
        let conn = test_db();
        let done = enqueue(&conn, "DONE", None, 0, at("2026-03-01 08:00:00")).unwrap();
        enqueue(&conn, "EXHAUSTED", None, 0, at("2026-03-01 08:00:00")).unwrap();
        enqueue(&conn, "READY", None, 0, at("2026-03-01 08:00:00")).unwrap();

        claim(&conn, done, at("2026-03-01 08:01:00")).unwrap();
        complete(&conn, done, at("2026-03-01 08:02:00")).unwrap();
        conn.execute("UPDATE sync_queue SET attempts = 3 WHERE mpn = 'EXHAUSTED'", [])
            .unwrap();

        let pending = select_pending(&conn, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].mpn, "READY");
    }

    #[test]
    fn claim_counts_attempt_and_is_single_use() {
        let conn = test_db();
        let id = enqueue(&conn, "NE555P", None, 0, at("2026-03-01 10:00:00")).unwrap();

        assert!(claim(&conn, id, at("2026-03-01 10:01:00")).unwrap());
        assert!(!claim(&conn, id, at("2026-03-01 10:01:01")).unwrap());

        let queued = item(&conn, "NE555P");
        assert_eq!(queued.status, QueueStatus::Processing);
        assert_eq!(queued.attempts, 1);
        assert_eq!(queued.started_at.as_deref(), Some("2026-03-01 10:01:00"));
    }

    #[test]
    fn claim_is_exclusive_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let first = crate::database::open(&path).unwrap();
        let id = enqueue(&first, "NE555P", None, 0, at("2026-03-01 10:00:00")).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let conn = crate::database::open(&path).unwrap();
                    claim(&conn, id, at("2026-03-01 10:01:00")).unwrap()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(item(&first, "NE555P").attempts, 1);
    }

    #[test]
    fn complete_and_fail_record_outcome() {
        let conn = test_db();
        let ok = enqueue(&conn, "OK", None, 0, at("2026-03-01 10:00:00")).unwrap();
        let bad = enqueue(&conn, "BAD", None, 0, at("2026-03-01 10:00:00")).unwrap();
        claim(&conn, ok, at("2026-03-01 10:01:00")).unwrap();
        claim(&conn, bad, at("2026-03-01 10:01:00")).unwrap();

        complete(&conn, ok, at("2026-03-01 10:02:00")).unwrap();
        fail(&conn, bad, "part not found at distributor").unwrap();

        let done = item(&conn, "OK");
        assert_eq!(done.status, QueueStatus::Completed);
        assert_eq!(done.completed_at.as_deref(), Some("2026-03-01 10:02:00"));

        let failed = item(&conn, "BAD");
        assert_eq!(failed.status, QueueStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("part not found at distributor"));
    }

    #[test]
    fn retry_failed_only_with_attempts_left() {
        let conn = test_db();
        let retryable = enqueue(&conn, "RETRY", None, 0, at("2026-03-01 10:00:00")).unwrap();
        let exhausted = enqueue(&conn, "GIVE-UP", None, 0, at("2026-03-01 10:00:00")).unwrap();
        for id in [retryable, exhausted] {
            claim(&conn, id, at("2026-03-01 10:01:00")).unwrap();
            fail(&conn, id, "HTTP error: 503").unwrap();
        }
        conn.execute("UPDATE sync_queue SET attempts = 3 WHERE id = ?1", [exhausted])
            .unwrap();

        assert_eq!(retry_failed(&conn, at("2026-03-01 11:00:00")).unwrap(), 1);
        assert_eq!(item(&conn, "RETRY").status, QueueStatus::Pending);
        assert_eq!(item(&conn, "RETRY").attempts, 1);
        assert_eq!(item(&conn, "GIVE-UP").status, QueueStatus::Failed);
    }

    #[test]
    fn retry_failed_reclaims_stale_processing_items() {
        let conn = test_db();
        let stale = enqueue(&conn, "STALE", None, 0, at("2026-03-01 10:00:00")).unwrap();
        let busy = enqueue(&conn, "BUSY", None, 0, at("2026-03-01 10:00:00")).unwrap();
        let spent = enqueue(&conn, "SPENT", None, 0, at("2026-03-01 10:00:00")).unwrap();
        claim(&conn, stale, at("2026-03-01 10:01:00")).unwrap();
        claim(&conn, spent, at("2026-03-01 10:01:00")).unwrap();
        claim(&conn, busy, at("2026-03-01 10:50:00")).unwrap();
        conn.execute("UPDATE sync_queue SET attempts = 3 WHERE id = ?1", [spent])
            .unwrap();

        assert_eq!(retry_failed(&conn, at("2026-03-01 11:00:00")).unwrap(), 1);

        let requeued = item(&conn, "STALE");
        assert_eq!(requeued.status, QueueStatus::Pending);
        assert_eq!(requeued.attempts, 1);
        assert_eq!(item(&conn, "BUSY").status, QueueStatus::Processing);
        let abandoned = item(&conn, "SPENT");
        assert_eq!(abandoned.status, QueueStatus::Failed);
        assert_eq!(abandoned.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    }

    #[test]
    fn complete_with_part_saves_part_and_status_together() {
        let mut conn = test_db();
        let id = enqueue(&conn, "NE555P", None, 0, at("2026-03-01 10:00:00")).unwrap();
        claim(&conn, id, at("2026-03-01 10:01:00")).unwrap();

        let record = make_test_record("NE555P", "Texas Instruments", "NE555P-TI", 0.42);
        let saved = complete_with_part(&mut conn, id, &record, at("2026-03-01 10:02:00")).unwrap();

        assert_eq!(saved.action, SaveAction::Created);
        assert_eq!(item(&conn, "NE555P").status, QueueStatus::Completed);
        assert_eq!(price_history_for(&conn, saved.part_id).unwrap().len(), 1);
    }

    #[test]
    fn complete_with_part_rolls_back_part_when_status_write_fails() {
        let mut conn = test_db();
        let id = enqueue(&conn, "NE555P", None, 0, at("2026-03-01 10:00:00")).unwrap();
        claim(&conn, id, at("2026-03-01 10:01:00")).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER refuse_completion BEFORE UPDATE ON sync_queue
             WHEN NEW.status = 'completed'
             BEGIN SELECT RAISE(ABORT, 'completion refused'); END;",
        )
        .unwrap();

        let record = make_test_record("NE555P", "Texas Instruments", "NE555P-TI", 0.42);
        assert!(complete_with_part(&mut conn, id, &record, at("2026-03-01 10:02:00")).is_err());

        assert!(get_part_by_mpn(&conn, "NE555P").unwrap().is_none());
        let history_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM price_history", [], |row| row.get(0))
            .unwrap();
        assert_eq!(history_rows, 0);
        assert_eq!(item(&conn, "NE555P").status, QueueStatus::Processing);
    }

    #[test]
    fn counts_per_status() {
        let conn = test_db();
        let a = enqueue(&conn, "A", None, 0, at("2026-03-01 10:00:00")).unwrap();
        let b = enqueue(&conn, "B", None, 0, at("2026-03-01 10:00:00")).unwrap();
        enqueue(&conn, "C", None, 0, at("2026-03-01 10:00:00")).unwrap();
        claim(&conn, a, at("2026-03-01 10:01:00")).unwrap();
        claim(&conn, b, at("2026-03-01 10:01:00")).unwrap();
        complete(&conn, a, at("2026-03-01 10:02:00")).unwrap();

        let counts = queue_counts(&conn).unwrap();
        assert_eq!(
            counts,
            QueueCounts {
                pending: 1,
                processing: 1,
                completed: 1,
                failed: 0
            }
        );
    }
}
