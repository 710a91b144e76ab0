//! Nexar (Octopart) GraphQL wire types and normalization

use crate::part::{
    first_present, AggregatorPart, Offer, OfferPrice, PartLookup, Spec, UNKNOWN_MANUFACTURER,
};
use crate::parsing::{parse_lead_time, DEFAULT_LEAD_TIME_DAYS};
use serde::Deserialize;

/// Offers kept on a normalized result
pub const MAX_OFFERS: usize = 5;

/// Currency assumed when an offer price carries none
pub const DEFAULT_CURRENCY: &str = "EUR";

/// Query sent to the Nexar GraphQL endpoint
pub const SEARCH_MPN_QUERY: &str = r#"query SearchPart($mpn: String!) {
  supSearchMpn(q: $mpn, limit: 1) {
    results {
      part {
        mpn
        manufacturer { name }
        shortDescription
        descriptions { text }
        specs { attribute { name } displayValue }
      }
      offers {
        clickUrl
        inventoryLevel
        moq
        prices { quantity price currency }
        seller { name }
        sku
        packaging
        leadTime
      }
    }
  }
}"#;

/// Top-level GraphQL response
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Option<SearchData>,
    #[serde(default)]
    pub errors: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchData {
    #[serde(default)]
    pub sup_search_mpn: Option<SearchMpn>,
}

#[derive(Debug, Deserialize)]
pub struct SearchMpn {
    #[serde(default)]
    pub results: Option<Vec<SearchResult>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    pub part: RawPart,
    #[serde(default)]
    pub offers: Option<Vec<RawOffer>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPart {
    pub mpn: String,
    #[serde(default)]
    pub manufacturer: Option<NamedEntity>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub descriptions: Option<Vec<RawDescription>>,
    #[serde(default)]
    pub specs: Option<Vec<RawSpec>>,
}

#[derive(Debug, Deserialize)]
pub struct NamedEntity {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawDescription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSpec {
    #[serde(default)]
    pub attribute: Option<NamedEntity>,
    #[serde(default)]
    pub display_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOffer {
    #[serde(default)]
    pub click_url: Option<String>,
    #[serde(default)]
    pub inventory_level: Option<i64>,
    #[serde(default)]
    pub moq: Option<i64>,
    #[serde(default)]
    pub prices: Option<Vec<RawPrice>>,
    #[serde(default)]
    pub seller: Option<NamedEntity>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub packaging: Option<String>,
    #[serde(default)]
    pub lead_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawPrice {
    #[serde(default)]
    pub quantity: Option<i64>,
    /// Null for breaks the seller lists without a price
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl SearchResponse {
    /// GraphQL error payload, if the response carries a non-empty `errors` array
    pub fn error_payload(&self) -> Option<String> {
        match &self.errors {
            Some(errors) if !errors.is_empty() => {
                Some(serde_json::Value::Array(errors.clone()).to_string())
            }
            _ => None,
        }
    }

    fn first_result(self) -> Option<SearchResult> {
        self.data?
            .sup_search_mpn?
            .results?
            .into_iter()
            .next()
    }
}

fn non_negative(value: Option<i64>) -> Option<u64> {
    value.map(|v| v.max(0) as u64)
}

impl From<&RawOffer> for Offer {
    fn from(raw: &RawOffer) -> Self {
        Offer {
            seller: raw.seller.as_ref().and_then(|s| s.name.clone()),
            sku: raw.sku.clone(),
            inventory_level: non_negative(raw.inventory_level),
            moq: non_negative(raw.moq),
            packaging: raw.packaging.clone(),
            lead_time: raw.lead_time.clone(),
            click_url: raw.click_url.clone(),
            prices: raw
                .prices
                .iter()
                .flatten()
                .filter_map(|p| {
                    Some(OfferPrice {
                        quantity: non_negative(p.quantity).unwrap_or(1),
                        price: p.price?,
                        currency: p
                            .currency
                            .clone()
                            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                    })
                })
                .collect(),
        }
    }
}

/// Normalize a search response into a lookup outcome
///
/// `raw` is the untouched response body, retained on the result for audit.
pub fn normalize_search(response: SearchResponse, raw: serde_json::Value) -> PartLookup {
    let Some(result) = response.first_result() else {
        return PartLookup::NotFound;
    };
    let part = result.part;
    let raw_offers = result.offers.unwrap_or_default();

    let mut availability: u64 = 0;
    let mut delivery_days: Option<u32> = None;
    let mut min_price: Option<f64> = None;
    let mut currency = DEFAULT_CURRENCY.to_string();

    for offer in &raw_offers {
        if let Some(level) = non_negative(offer.inventory_level) {
            availability = availability.saturating_add(level);
        }

        if let Some(lead_time) = &offer.lead_time {
            let days = parse_lead_time(lead_time);
            if delivery_days.map_or(true, |current| days < current) {
                delivery_days = Some(days);
            }
        }

        let first_break = offer
            .prices
            .iter()
            .flatten()
            .find_map(|p| p.price.map(|price| (price, p)));
        if let Some((price, first_break)) = first_break {
            if min_price.map_or(true, |current| price < current) {
                min_price = Some(price);
                currency = first_break
                    .currency
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
            }
        }
    }

    let manufacturer = part
        .manufacturer
        .as_ref()
        .and_then(|m| m.name.clone())
        .unwrap_or_else(|| UNKNOWN_MANUFACTURER.to_string());

    let first_long = part
        .descriptions
        .as_ref()
        .and_then(|d| d.first())
        .and_then(|d| d.text.as_deref());
    let description =
        first_present(&[part.short_description.as_deref(), first_long]).unwrap_or_default();

    let specs = part
        .specs
        .iter()
        .flatten()
        .filter_map(|spec| {
            let name = spec.attribute.as_ref()?.name.clone()?;
            Some(Spec {
                name,
                value: spec.display_value.clone().unwrap_or_default(),
            })
        })
        .collect();

    let offers = raw_offers.iter().take(MAX_OFFERS).map(Offer::from).collect();

    log::debug!(
        "Normalized {} ({} offers, availability {})",
        part.mpn,
        raw_offers.len(),
        availability
    );

    PartLookup::Found(AggregatorPart {
        mpn: part.mpn,
        manufacturer,
        description,
        availability,
        delivery_days: delivery_days.unwrap_or(DEFAULT_LEAD_TIME_DAYS),
        min_price,
        currency,
        specs,
        offers,
        raw,
    })
}

#[cfg(test)]
#[path = "nexar_tests.rs"]
mod tests;
