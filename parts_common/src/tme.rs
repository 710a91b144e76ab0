//! TME REST wire types and normalization into catalog records

use crate::category::map_category;
use crate::parsing::{parse_delivery_days, parse_price_text, DEFAULT_LEAD_TIME_DAYS};
use crate::part::{first_present, PartRecord, UNKNOWN_MANUFACTURER};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Product list response; TME wraps it in `Data`, older payloads do not
#[derive(Debug, Default, Deserialize)]
pub struct ProductsResponse {
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
    #[serde(rename = "Data", default)]
    pub data: Option<ProductsData>,
    #[serde(rename = "ProductList", default)]
    pub product_list: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductsData {
    #[serde(rename = "ProductList", default)]
    pub product_list: Option<Vec<serde_json::Value>>,
}

impl ProductsResponse {
    /// Raw product entries, wherever the envelope put them
    pub fn into_products(self) -> Vec<serde_json::Value> {
        self.data
            .and_then(|d| d.product_list)
            .or(self.product_list)
            .unwrap_or_default()
    }
}

/// Single product entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    pub symbol: String,
    #[serde(default)]
    pub original_symbol: Option<String>,
    #[serde(default)]
    pub producer: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_tree: Option<Vec<CategoryNode>>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub price_list: Option<Vec<PriceBreak>>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub delivery_date: Option<serde_json::Value>,
    #[serde(default)]
    pub min_amount: Option<i64>,
    #[serde(default)]
    pub document_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CategoryNode {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PriceBreak {
    #[serde(default)]
    pub amount: Option<i64>,
    /// Number or text, depending on the endpoint
    #[serde(default)]
    pub price_value: Option<serde_json::Value>,
}

/// Parameters response for a list of symbols
#[derive(Debug, Default, Deserialize)]
pub struct ParametersResponse {
    #[serde(rename = "Data", default)]
    pub data: Option<ParametersData>,
    #[serde(rename = "ProductList", default)]
    pub product_list: Option<Vec<ProductParameters>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ParametersData {
    #[serde(rename = "ProductList", default)]
    pub product_list: Option<Vec<ProductParameters>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductParameters {
    pub symbol: String,
    #[serde(default)]
    pub parameter_list: Option<Vec<Parameter>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    pub parameter_name: String,
    #[serde(default)]
    pub parameter_value: Option<String>,
}

/// Parameters per symbol
pub type ParameterMap = HashMap<String, BTreeMap<String, String>>;

impl ParametersResponse {
    pub fn into_map(self) -> ParameterMap {
        let list = self
            .data
            .and_then(|d| d.product_list)
            .or(self.product_list)
            .unwrap_or_default();

        list.into_iter()
            .map(|product| {
                let params = product
                    .parameter_list
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| (p.parameter_name, p.parameter_value.unwrap_or_default()))
                    .collect();
                (product.symbol, params)
            })
            .collect()
    }
}

fn price_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_price_text(s),
        _ => None,
    }
}

fn delivery_days(value: Option<&serde_json::Value>) -> u32 {
    match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|days| u32::try_from(days).ok())
            .unwrap_or(DEFAULT_LEAD_TIME_DAYS),
        Some(serde_json::Value::String(s)) => parse_delivery_days(s),
        _ => DEFAULT_LEAD_TIME_DAYS,
    }
}

impl Product {
    /// Unit price of the first price break, 0 when missing
    pub fn price(&self) -> f64 {
        self.price_list
            .as_ref()
            .and_then(|list| list.first())
            .and_then(|first| first.price_value.as_ref())
            .and_then(price_value)
            .unwrap_or(0.0)
    }

    fn category_name(&self, depth: usize) -> Option<&str> {
        self.category_tree
            .as_ref()
            .and_then(|tree| tree.get(depth))
            .and_then(|node| node.name.as_deref())
    }
}

/// Normalize a product (and its parameters, if fetched) into a catalog record
pub fn normalize_product(
    product: &Product,
    parameters: Option<&BTreeMap<String, String>>,
    raw: serde_json::Value,
) -> PartRecord {
    let mpn = first_present(&[product.original_symbol.as_deref()])
        .unwrap_or_else(|| product.symbol.clone());

    PartRecord {
        mpn,
        manufacturer: first_present(&[product.producer.as_deref()])
            .unwrap_or_else(|| UNKNOWN_MANUFACTURER.to_string()),
        description: product.description.clone().unwrap_or_default(),
        category: map_category(product.category_name(0)),
        subcategory: product.category_name(1).map(str::to_string),
        specifications: parameters.cloned().unwrap_or_default(),
        symbol: product.symbol.clone(),
        price: product.price(),
        availability: product.amount.map_or(0, |a| a.max(0) as u64),
        lead_time_days: delivery_days(product.delivery_date.as_ref()),
        moq: product
            .min_amount
            .and_then(|m| u32::try_from(m).ok())
            .filter(|m| *m > 0)
            .unwrap_or(1),
        datasheet_url: product.document_url.clone(),
        photo_url: product.photo.clone(),
        raw,
    }
}

#[cfg(test)]
#[path = "tme_tests.rs"]
mod tests;
