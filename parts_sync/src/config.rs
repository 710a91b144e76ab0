//! Endpoints, credentials and tunables for the upstream clients

use std::time::Duration;

pub const NEXAR_TOKEN_URL: &str = "https://identity.nexar.com/connect/token";
pub const NEXAR_GRAPHQL_URL: &str = "https://api.nexar.com/graphql";
pub const TME_BASE_URL: &str = "https://api.tme.eu";

/// Queue mode request budget
pub const QUEUE_REQUESTS_PER_MINUTE: u32 = 60;
/// Bulk import spacing between distributor calls
pub const IMPORT_REQUEST_INTERVAL: Duration = Duration::from_secs(1);
/// Identifiers per multi-symbol request during bulk import
pub const IMPORT_CHUNK_SIZE: usize = 20;
/// Queue items handled per batch
pub const QUEUE_BATCH_SIZE: usize = 50;
/// Lifetime of an aggregator cache entry
pub const CACHE_TTL_HOURS: i64 = 24;
/// Tokens are treated as expired this many seconds early
pub const TOKEN_EXPIRY_SKEW_SECS: u64 = 300;
/// Attempts a queue item gets before it stays failed
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// A `processing` item older than this belongs to a worker that died
pub const STALE_PROCESSING_MINUTES: i64 = 30;
/// Per-request timeout for both upstreams
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Nexar client credentials and endpoints
#[derive(Debug, Clone)]
pub struct NexarConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub graphql_url: String,
}

impl NexarConfig {
    /// Production endpoints with the given credentials
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: NEXAR_TOKEN_URL.to_string(),
            graphql_url: NEXAR_GRAPHQL_URL.to_string(),
        }
    }

    /// Point both endpoints at one host (mock servers)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.token_url = format!("{}/connect/token", base);
        self.graphql_url = format!("{}/graphql", base);
        self
    }
}

/// TME API token and request locale
#[derive(Debug, Clone)]
pub struct TmeConfig {
    pub token: String,
    pub base_url: String,
    pub country: String,
    pub language: String,
}

impl TmeConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: TME_BASE_URL.to_string(),
            country: "RU".to_string(),
            language: "RU".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}
