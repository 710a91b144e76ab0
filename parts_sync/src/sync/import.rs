//! Bulk import of distributor symbols
//!
//! Symbols are requested in chunks, one product request per chunk. The
//! parameters endpoint is not called here, which halves the request count.
//! A chunk that fails in transport is counted as failed and the import
//! carries on with the next one.

use crate::database::{self, Db, MatchStrategy};
use crate::error::Result;
use crate::tme::{FetchedProduct, TmeClient};
use chrono::Utc;
use parts_common::tme::normalize_product;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportStats {
    pub total: usize,
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
    /// Symbols the distributor did not return
    pub skipped: usize,
    pub elapsed: Duration,
}

impl ImportStats {
    /// Symbols per second
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Human readable duration: `45 s`, `12 min`, `2 h 5 min`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{} s", secs)
    } else if secs < 3600 {
        format!("{} min", secs / 60)
    } else {
        format!("{} h {} min", secs / 3600, (secs % 3600) / 60)
    }
}

/// One symbol per line; surrounding whitespace and blank lines are ignored
pub fn read_identifiers<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut identifiers = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            identifiers.push(trimmed.to_string());
        }
    }
    Ok(identifiers)
}

pub async fn import_from_file(db: &Db, client: &TmeClient, path: &Path, chunk_size: usize) -> Result<ImportStats> {
    let file = File::open(path)?;
    log::info!("Importing symbols from {}", path.display());
    import_from_reader(db, client, BufReader::new(file), chunk_size).await
}

pub async fn import_from_reader<R: BufRead>(
    db: &Db,
    client: &TmeClient,
    reader: R,
    chunk_size: usize,
) -> Result<ImportStats> {
    let identifiers = read_identifiers(reader)?;
    Ok(import_identifiers(db, client, &identifiers, chunk_size).await)
}

/// Import every symbol, chunk by chunk
pub async fn import_identifiers(db: &Db, client: &TmeClient, identifiers: &[String], chunk_size: usize) -> ImportStats {
    let started = Instant::now();
    let chunk_size = chunk_size.max(1);
    let chunk_count = identifiers.len().div_ceil(chunk_size);
    let mut stats = ImportStats {
        total: identifiers.len(),
        ..ImportStats::default()
    };
    log::info!("Importing {} symbol(s) in {} chunk(s)", stats.total, chunk_count);

    for (index, chunk) in identifiers.chunks(chunk_size).enumerate() {
        log::debug!("Chunk {}/{} ({} symbols)", index + 1, chunk_count, chunk.len());

        match client.get_products(chunk).await {
            Ok(products) if products.is_empty() => {
                log::warn!("Chunk {}/{}: distributor returned no products", index + 1, chunk_count);
                stats.skipped += chunk.len();
            }
            Ok(products) => {
                save_chunk(db, &products, &mut stats);
                stats.skipped += missing_count(chunk, &products);
            }
            Err(e) => {
                log::error!("Chunk {}/{} failed: {}", index + 1, chunk_count, e);
                stats.failed += chunk.len();
            }
        }

        stats.processed = stats.success + stats.failed + stats.skipped;
        stats.elapsed = started.elapsed();
        log_progress(&stats);
    }

    stats.elapsed = started.elapsed();
    log_report(&stats);
    stats
}

fn save_chunk(db: &Db, products: &[FetchedProduct], stats: &mut ImportStats) {
    let mut conn = database::lock(db);
    for fetched in products {
        let record = normalize_product(&fetched.product, None, fetched.raw.clone());
        match database::save_part(&mut conn, &record, MatchStrategy::Symbol, Utc::now()) {
            Ok(saved) => {
                log::debug!("{} {} ({})", saved.action, record.symbol, record.mpn);
                stats.success += 1;
            }
            Err(e) => {
                log::warn!("Failed to save {}: {}", record.symbol, e);
                stats.failed += 1;
            }
        }
    }
}

/// Requested symbols that no returned product answers to
fn missing_count(requested: &[String], products: &[FetchedProduct]) -> usize {
    requested
        .iter()
        .filter(|symbol| {
            !products.iter().any(|p| {
                p.product.symbol.eq_ignore_ascii_case(symbol)
                    || p.product
                        .original_symbol
                        .as_deref()
                        .is_some_and(|original| original.eq_ignore_ascii_case(symbol))
            })
        })
        .count()
}

fn log_progress(stats: &ImportStats) {
    let percent = if stats.total > 0 {
        stats.processed as f64 * 100.0 / stats.total as f64
    } else {
        100.0
    };
    let rate = stats.rate();
    let remaining = stats.total.saturating_sub(stats.processed);
    let eta = if rate > 0.0 {
        format_duration(Duration::from_secs_f64(remaining as f64 / rate))
    } else {
        "unknown".to_string()
    };
    log::info!(
        "Progress {:.1}% ({}/{}) | {:.1}/s | ETA {}",
        percent,
        stats.processed,
        stats.total,
        rate,
        eta
    );
}

fn log_report(stats: &ImportStats) {
    log::info!("Import finished in {}", format_duration(stats.elapsed));
    log::info!("  total:   {}", stats.total);
    log::info!("  success: {}", stats.success);
    log::info!("  failed:  {}", stats.failed);
    log::info!("  skipped: {}", stats.skipped);
    log::info!("  rate:    {:.2}/s", stats.rate());
}
