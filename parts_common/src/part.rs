//! Canonical part shapes produced by the upstream normalizers

use crate::category::Category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fallback manufacturer name when the upstream omits it
pub const UNKNOWN_MANUFACTURER: &str = "Unknown";

/// Catalog record for a distributor part, ready to be upserted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    pub mpn: String,
    pub manufacturer: String,
    pub description: String,
    pub category: Category,
    pub subcategory: Option<String>,
    /// Parameter name -> value
    pub specifications: BTreeMap<String, String>,
    /// Distributor symbol (SKU)
    pub symbol: String,
    /// Unit price in EUR
    pub price: f64,
    pub availability: u64,
    pub lead_time_days: u32,
    pub moq: u32,
    pub datasheet_url: Option<String>,
    pub photo_url: Option<String>,
    /// Upstream payload kept for audit
    pub raw: serde_json::Value,
}

/// Single price break of an aggregator offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPrice {
    pub quantity: u64,
    pub price: f64,
    pub currency: String,
}

/// Seller offer as returned by the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub seller: Option<String>,
    pub sku: Option<String>,
    pub inventory_level: Option<u64>,
    pub moq: Option<u64>,
    pub packaging: Option<String>,
    pub lead_time: Option<String>,
    pub click_url: Option<String>,
    pub prices: Vec<OfferPrice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    pub name: String,
    pub value: String,
}

/// Normalized aggregator search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorPart {
    pub mpn: String,
    pub manufacturer: String,
    pub description: String,
    /// Sum of inventory over all offers
    pub availability: u64,
    /// Shortest parsed lead time over all offers
    pub delivery_days: u32,
    /// Lowest first priced break over all offers
    pub min_price: Option<f64>,
    pub currency: String,
    pub specs: Vec<Spec>,
    /// First five offers in upstream order
    pub offers: Vec<Offer>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Outcome of an upstream lookup; not finding a part is not an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartLookup {
    Found(AggregatorPart),
    NotFound,
}

impl PartLookup {
    pub fn found(&self) -> bool {
        matches!(self, PartLookup::Found(_))
    }

    pub fn part(&self) -> Option<&AggregatorPart> {
        match self {
            PartLookup::Found(part) => Some(part),
            PartLookup::NotFound => None,
        }
    }
}

/// Pick the first non-blank text, trimming nothing else
pub(crate) fn first_present(candidates: &[Option<&str>]) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .find(|text| !text.trim().is_empty())
        .map(|text| text.to_string())
}
