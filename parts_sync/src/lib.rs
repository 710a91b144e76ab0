//! Parts Sync - component catalog, distributor sync and price quotes
//!
//! Looks parts up at the Nexar aggregator (cached for a day), keeps a SQLite
//! catalog in sync with the TME distributor through a durable queue or a
//! bulk import, and prices purchases against the active expense profile.

pub mod calculator;
pub mod config;
pub mod database;
pub mod error;
pub mod lookup;
pub mod nexar;
pub mod rate_limiter;
pub mod retry;
pub mod sync;
pub mod tme;

pub use calculator::{calculate, calculate_and_save, get_active_profile, CalculationRequest, Quote};
pub use error::{Error, Result, SyncError};
pub use lookup::{search_or_cache_lookup, LookupResult};
pub use nexar::NexarClient;
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use sync::{process_queue_batch, sync_part, BatchReport, ImportStats, SyncOutcome};
pub use tme::TmeClient;
