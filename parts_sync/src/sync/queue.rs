//! Queue driver: claims pending items and syncs them one by one

use super::fetch_part;
use crate::database::{self, Db};
use crate::error::{Result, SyncError};
use crate::tme::TmeClient;
use chrono::Utc;
use serde::Serialize;

/// Error message stored for parts the distributor does not carry
pub const NOT_FOUND_MESSAGE: &str = "part not found at distributor";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemError {
    pub mpn: String,
    pub error: String,
}

/// Outcome of one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Items this worker claimed
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
    /// Items another worker claimed first
    pub skipped: usize,
    pub errors: Vec<ItemError>,
}

/// Add or merge a queue entry for `mpn`
pub fn enqueue_sync(db: &Db, mpn: &str, tme_symbol: Option<&str>, priority: i64) -> Result<i64> {
    let mpn = mpn.trim();
    if mpn.is_empty() {
        return Err(SyncError::InvalidInput("MPN is required".to_string()));
    }
    let tme_symbol = tme_symbol.map(str::trim).filter(|s| !s.is_empty());

    let conn = database::lock(db);
    let id = database::enqueue(&conn, mpn, tme_symbol, priority, Utc::now())?;
    log::info!("Queued {} (priority {}) as item {}", mpn, priority, id);
    Ok(id)
}

/// Put failed items that still have attempts left back into the queue
pub fn retry_failed(db: &Db) -> Result<usize> {
    let conn = database::lock(db);
    let count = database::retry_failed(&conn, Utc::now())?;
    log::info!("Re-queued {} failed item(s)", count);
    Ok(count)
}

/// Process up to `batch_size` pending items
///
/// A failing item is marked failed and the batch moves on; only a failure
/// to read the queue itself aborts the run. A found part and its
/// `completed` status are committed together.
pub async fn process_queue_batch(db: &Db, client: &TmeClient, batch_size: usize) -> Result<BatchReport> {
    let items = {
        let conn = database::lock(db);
        database::select_pending(&conn, batch_size)?
    };
    log::info!("Processing {} queued item(s)", items.len());

    let mut report = BatchReport::default();
    for item in items {
        let claimed = {
            let conn = database::lock(db);
            database::claim(&conn, item.id, Utc::now())
        };
        match claimed {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("{} already claimed, skipping", item.mpn);
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                log::error!("Failed to claim {}: {}", item.mpn, e);
                report.errors.push(ItemError {
                    mpn: item.mpn,
                    error: e.to_string(),
                });
                report.failed += 1;
                continue;
            }
        }
        report.processed += 1;

        let fetched = fetch_part(client, &item.mpn, item.tme_symbol.as_deref()).await;
        let failure = match fetched {
            Ok(Some(mut record)) => {
                record.mpn = item.mpn.clone();
                let saved = {
                    let mut conn = database::lock(db);
                    database::complete_with_part(&mut conn, item.id, &record, Utc::now())
                };
                match saved {
                    Ok(save) => {
                        log::info!("Synced {} ({}): {} as part {}", item.mpn, record.symbol, save.action, save.part_id);
                        None
                    }
                    Err(e) => Some(SyncError::from(e).to_string()),
                }
            }
            Ok(None) => Some(NOT_FOUND_MESSAGE.to_string()),
            Err(e) => Some(e.to_string()),
        };

        if let Some(message) = &failure {
            let recorded = {
                let conn = database::lock(db);
                database::fail(&conn, item.id, message)
            };
            if let Err(e) = recorded {
                log::error!("Failed to record queue result for {}: {}", item.mpn, e);
            }
        }

        match failure {
            None => report.success += 1,
            Some(error) => {
                log::warn!("Sync of {} failed (attempt {}): {}", item.mpn, item.attempts + 1, error);
                report.failed += 1;
                report.errors.push(ItemError { mpn: item.mpn, error });
            }
        }
    }

    log::info!(
        "Queue batch done: {} processed, {} ok, {} failed, {} skipped",
        report.processed,
        report.success,
        report.failed,
        report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{get_queue_item, QueueStatus};
    use crate::sync::test_support::{memory_db, product_list, tme_product, tme_with_mock};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn status_of(db: &Db, mpn: &str) -> QueueStatus {
        get_queue_item(&database::lock(db), mpn).unwrap().unwrap().status
    }

    async fn mount_part(server: &MockServer, symbol: &str, mpn: &str) {
        Mock::given(method("POST"))
            .and(path("/Products/GetProducts.json"))
            .and(body_partial_json(json!({ "SymbolList": [symbol] })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(product_list(vec![tme_product(symbol, mpn, "TI", 0.5)])),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/Products/GetParameters.json"))
            .and(body_partial_json(json!({ "SymbolList": [symbol] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Data": { "ProductList": [] } })))
            .mount(server)
            .await;
    }

    #[test]
    fn enqueue_rejects_blank_mpn() {
        let db = memory_db();
        assert!(matches!(enqueue_sync(&db, "  ", None, 0), Err(SyncError::InvalidInput(_))));
    }

    #[test]
    fn enqueue_ignores_blank_symbol() {
        let db = memory_db();
        enqueue_sync(&db, " NE555P ", Some("  "), 1).unwrap();
        let item = get_queue_item(&database::lock(&db), "NE555P").unwrap().unwrap();
        assert!(item.tme_symbol.is_none());
    }

    #[tokio::test]
    async fn batch_completes_found_and_fails_missing() {
        let server = MockServer::start().await;
        mount_part(&server, "NE555P-TI", "NE555P").await;
        Mock::given(method("POST"))
            .and(path("/Products/Search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(product_list(vec![])))
            .mount(&server)
            .await;

        let db = memory_db();
        enqueue_sync(&db, "NE555P", Some("NE555P-TI"), 5).unwrap();
        enqueue_sync(&db, "GHOST-1", None, 1).unwrap();

        let client = tme_with_mock(&server);
        let report = process_queue_batch(&db, &client, 10).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.success, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(
            report.errors,
            vec![ItemError {
                mpn: "GHOST-1".to_string(),
                error: NOT_FOUND_MESSAGE.to_string()
            }]
        );
        assert_eq!(status_of(&db, "NE555P"), QueueStatus::Completed);
        assert_eq!(status_of(&db, "GHOST-1"), QueueStatus::Failed);
    }

    #[tokio::test]
    async fn upstream_error_fails_item_and_batch_continues() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Products/GetProducts.json"))
            .and(body_partial_json(json!({ "SymbolList": ["BROKEN-SYM"] })))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        mount_part(&server, "LM358-ST", "LM358").await;

        let db = memory_db();
        enqueue_sync(&db, "BROKEN", Some("BROKEN-SYM"), 9).unwrap();
        enqueue_sync(&db, "LM358", Some("LM358-ST"), 1).unwrap();

        let client = tme_with_mock(&server);
        let report = process_queue_batch(&db, &client, 10).await.unwrap();

        assert_eq!(report.success, 1);
        assert_eq!(report.failed, 1);
        assert!(report.errors[0].error.contains("500"));

        let conn = database::lock(&db);
        let broken = get_queue_item(&conn, "BROKEN").unwrap().unwrap();
        assert_eq!(broken.status, QueueStatus::Failed);
        assert_eq!(broken.attempts, 1);
        assert!(broken.error_message.unwrap().contains("boom"));
        assert_eq!(get_queue_item(&conn, "LM358").unwrap().unwrap().status, QueueStatus::Completed);
    }

    #[tokio::test]
    async fn rejected_search_is_recorded_as_error_not_missing_part() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Products/Search.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "Status": "E_INVALID_TOKEN", "Data": { "ProductList": [] } })),
            )
            .mount(&server)
            .await;

        let db = memory_db();
        enqueue_sync(&db, "NE555P", None, 0).unwrap();
        let client = tme_with_mock(&server);
        let report = process_queue_batch(&db, &client, 10).await.unwrap();

        assert_eq!(report.failed, 1);
        let item = get_queue_item(&database::lock(&db), "NE555P").unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Failed);
        let message = item.error_message.unwrap();
        assert!(message.contains("E_INVALID_TOKEN"));
        assert_ne!(message, NOT_FOUND_MESSAGE);
    }

    #[tokio::test]
    async fn failed_item_is_retried_until_budget_is_spent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Products/GetProducts.json"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let db = memory_db();
        enqueue_sync(&db, "FLAKY", Some("FLAKY-SYM"), 0).unwrap();
        let client = tme_with_mock(&server);

        for _ in 0..3 {
            let report = process_queue_batch(&db, &client, 10).await.unwrap();
            assert_eq!(report.failed, 1);
            retry_failed(&db).unwrap();
        }

        // Budget exhausted: stays failed and is no longer picked up
        assert_eq!(status_of(&db, "FLAKY"), QueueStatus::Failed);
        let report = process_queue_batch(&db, &client, 10).await.unwrap();
        assert_eq!(report, BatchReport::default());
    }

    #[tokio::test]
    async fn batch_size_limits_work() {
        let server = MockServer::start().await;
        mount_part(&server, "A-SYM", "A").await;
        mount_part(&server, "B-SYM", "B").await;

        let db = memory_db();
        enqueue_sync(&db, "A", Some("A-SYM"), 5).unwrap();
        enqueue_sync(&db, "B", Some("B-SYM"), 1).unwrap();

        let client = tme_with_mock(&server);
        let report = process_queue_batch(&db, &client, 1).await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(status_of(&db, "A"), QueueStatus::Completed);
        assert_eq!(status_of(&db, "B"), QueueStatus::Pending);
    }

    #[tokio::test]
    async fn interrupted_item_is_picked_up_again_after_reenqueue() {
        let server = MockServer::start().await;
        mount_part(&server, "NE555P-TI", "NE555P").await;

        let db = memory_db();
        let id = enqueue_sync(&db, "NE555P", Some("NE555P-TI"), 0).unwrap();
        {
            // A worker claimed the item and never reported back
            let conn = database::lock(&db);
            assert!(database::claim(&conn, id, Utc::now()).unwrap());
        }

        enqueue_sync(&db, "NE555P", None, 10).unwrap();
        retry_failed(&db).unwrap();

        let client = tme_with_mock(&server);
        let report = process_queue_batch(&db, &client, 10).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.success, 1);

        let item = get_queue_item(&database::lock(&db), "NE555P").unwrap().unwrap();
        assert_eq!(item.status, QueueStatus::Completed);
        assert_eq!(item.attempts, 2);
        assert_eq!(item.priority, 10);
    }

    #[tokio::test]
    async fn completed_item_has_its_part_in_the_catalog() {
        let server = MockServer::start().await;
        mount_part(&server, "NE555P-TI", "NE555P-TI-ORIG").await;

        let db = memory_db();
        enqueue_sync(&db, "NE555P", Some("NE555P-TI"), 0).unwrap();
        let client = tme_with_mock(&server);
        process_queue_batch(&db, &client, 10).await.unwrap();

        let conn = database::lock(&db);
        assert_eq!(get_queue_item(&conn, "NE555P").unwrap().unwrap().status, QueueStatus::Completed);
        let part = database::get_part_by_mpn(&conn, "NE555P").unwrap().unwrap();
        assert_eq!(database::price_history_for(&conn, part.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let server = MockServer::start().await;
        let db = memory_db();
        let client = tme_with_mock(&server);
        let report = process_queue_batch(&db, &client, 50).await.unwrap();
        assert_eq!(report, BatchReport::default());
    }
}
