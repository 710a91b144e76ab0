//! TME REST client
//!
//! Every call passes through the client's rate limiter and retry policy.
//! Requests are JSON POSTs carrying the API token and locale in the body.

use crate::config::{TmeConfig, HTTP_TIMEOUT};
use crate::error::{Result, SyncError};
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use parts_common::tme::{ParameterMap, ParametersResponse, Product, ProductsResponse};
use serde_json::{json, Value};

const GET_PRODUCTS: &str = "/Products/GetProducts.json";
const GET_PARAMETERS: &str = "/Products/GetParameters.json";
const SEARCH: &str = "/Products/Search.json";

/// Product entry together with the JSON it was parsed from
#[derive(Debug, Clone)]
pub struct FetchedProduct {
    pub product: Product,
    pub raw: Value,
}

pub struct TmeClient {
    config: TmeConfig,
    http: reqwest::Client,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl TmeClient {
    pub fn new(config: TmeConfig, limiter: RateLimiter, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            config,
            http,
            limiter,
            retry,
        })
    }

    /// Product details for up to one chunk of symbols
    pub async fn get_products(&self, symbols: &[String]) -> Result<Vec<FetchedProduct>> {
        let body = self.request_body("SymbolList", json!(symbols));
        let response: ProductsResponse = serde_json::from_value(self.post(GET_PRODUCTS, &body).await?)?;
        Ok(collect_products(response))
    }

    /// Technical parameters per symbol
    pub async fn get_parameters(&self, symbols: &[String]) -> Result<ParameterMap> {
        let body = self.request_body("SymbolList", json!(symbols));
        let response: ParametersResponse =
            serde_json::from_value(self.post(GET_PARAMETERS, &body).await?)?;
        Ok(response.into_map())
    }

    /// Free-text search, typically by MPN
    pub async fn search_by_symbol(&self, text: &str) -> Result<Vec<FetchedProduct>> {
        let body = self.request_body("SearchPlain", json!(text));
        let response: ProductsResponse = serde_json::from_value(self.post(SEARCH, &body).await?)?;
        Ok(collect_products(response))
    }

    fn request_body(&self, key: &str, value: Value) -> Value {
        let mut body = json!({
            "Token": self.config.token,
            "Country": self.config.country,
            "Language": self.config.language,
        });
        body[key] = value;
        body
    }

    async fn post(&self, endpoint: &'static str, body: &Value) -> Result<Value> {
        self.retry
            .run(endpoint, move || self.post_once(endpoint, body))
            .await
    }

    async fn post_once(&self, endpoint: &str, body: &Value) -> Result<Value> {
        self.limiter.wait().await;

        let url = format!("{}{}", self.config.base_url, endpoint);
        log::debug!("POST {}", url);

        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SyncError::HttpStatus { status, body: text });
        }

        let value: Value = serde_json::from_str(&text)?;
        if let Some(api_status) = value.get("Status").and_then(Value::as_str) {
            if api_status != "OK" {
                return Err(SyncError::Api {
                    endpoint: endpoint.to_string(),
                    status: api_status.to_string(),
                });
            }
        }
        Ok(value)
    }
}

fn collect_products(response: ProductsResponse) -> Vec<FetchedProduct> {
    response
        .into_products()
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<Product>(raw.clone()) {
            Ok(product) => Some(FetchedProduct { product, raw }),
            Err(e) => {
                log::warn!("Skipping unreadable TME product entry: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "tme_tests.rs"]
mod tests;
