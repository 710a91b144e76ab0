//! Tests for Nexar response normalization

use crate::nexar::{normalize_search, SearchResponse};
use crate::part::PartLookup;
use serde_json::json;

fn normalize(body: serde_json::Value) -> PartLookup {
    let response: SearchResponse = serde_json::from_value(body.clone()).unwrap();
    normalize_search(response, body)
}

fn offer(inventory: i64, price: f64, currency: &str, lead_time: Option<&str>) -> serde_json::Value {
    json!({
        "clickUrl": "https://octopart.com/click/1",
        "inventoryLevel": inventory,
        "moq": 1,
        "prices": [
            { "quantity": 1, "price": price, "currency": currency },
            { "quantity": 100, "price": price / 2.0, "currency": currency }
        ],
        "seller": { "name": "Seller" },
        "sku": "SKU-1",
        "packaging": "Tape",
        "leadTime": lead_time
    })
}

fn response_with(part: serde_json::Value, offers: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "data": {
            "supSearchMpn": {
                "results": [ { "part": part, "offers": offers } ]
            }
        }
    })
}

#[test]
fn aggregates_offers() {
    let body = response_with(
        json!({
            "mpn": "ATMEGA328P-PU",
            "manufacturer": { "name": "Microchip" },
            "shortDescription": "8-bit MCU",
            "descriptions": [ { "text": "Long description" } ],
            "specs": [
                { "attribute": { "name": "Package" }, "displayValue": "DIP-28" },
                { "attribute": { "name": "Flash" }, "displayValue": "32 KB" }
            ]
        }),
        vec![
            offer(100, 2.5, "USD", Some("3 weeks")),
            offer(40, 1.9, "EUR", Some("5 days")),
            offer(0, 3.0, "GBP", None),
        ],
    );

    let lookup = normalize(body);
    let part = lookup.part().expect("part should be found");

    assert_eq!(part.mpn, "ATMEGA328P-PU");
    assert_eq!(part.manufacturer, "Microchip");
    assert_eq!(part.description, "8-bit MCU");
    assert_eq!(part.availability, 140);
    assert_eq!(part.delivery_days, 5);
    assert_eq!(part.min_price, Some(1.9));
    assert_eq!(part.currency, "EUR");
    assert_eq!(part.specs.len(), 2);
    assert_eq!(part.specs[0].name, "Package");
    assert_eq!(part.specs[0].value, "DIP-28");
    assert_eq!(part.offers.len(), 3);
    assert_eq!(part.offers[0].prices.len(), 2);
    assert!(part.raw.get("data").is_some());
}

#[test]
fn offers_truncated_to_five_in_upstream_order() {
    let offers = (1..=7)
        .map(|i| offer(i, 10.0 - i as f64, "EUR", None))
        .collect();
    let body = response_with(json!({ "mpn": "X" }), offers);

    let lookup = normalize(body);
    let part = lookup.part().unwrap();

    assert_eq!(part.offers.len(), 5);
    let levels: Vec<u64> = part.offers.iter().filter_map(|o| o.inventory_level).collect();
    assert_eq!(levels, vec![1, 2, 3, 4, 5]);
    // Aggregates still consider every offer
    assert_eq!(part.availability, 28);
    assert_eq!(part.min_price, Some(3.0));
}

#[test]
fn unpriced_breaks_are_skipped() {
    let body = response_with(
        json!({ "mpn": "BC547B", "manufacturer": { "name": "onsemi" } }),
        vec![
            json!({
                "inventoryLevel": 250,
                "prices": [
                    { "quantity": 1, "price": null, "currency": "USD" },
                    { "quantity": 10, "price": 0.12, "currency": "USD" }
                ]
            }),
            json!({
                "inventoryLevel": 10,
                "prices": [ { "quantity": 1, "price": null } ]
            }),
        ],
    );

    let lookup = normalize(body);
    let part = lookup.part().expect("null prices must not reject the part");

    assert_eq!(part.availability, 260);
    assert_eq!(part.min_price, Some(0.12));
    assert_eq!(part.currency, "USD");
    assert_eq!(part.offers[0].prices.len(), 1);
    assert_eq!(part.offers[0].prices[0].quantity, 10);
    assert!(part.offers[1].prices.is_empty());
}

#[test]
fn falls_back_for_missing_fields() {
    let body = response_with(
        json!({
            "mpn": "NE555P",
            "manufacturer": null,
            "shortDescription": null,
            "descriptions": [ { "text": "Timer IC" } ]
        }),
        vec![],
    );

    let lookup = normalize(body);
    let part = lookup.part().unwrap();

    assert_eq!(part.manufacturer, "Unknown");
    assert_eq!(part.description, "Timer IC");
    assert_eq!(part.availability, 0);
    assert_eq!(part.delivery_days, 14);
    assert_eq!(part.min_price, None);
    assert_eq!(part.currency, "EUR");
}

#[test]
fn blank_short_description_uses_long_one() {
    let body = response_with(
        json!({
            "mpn": "LM317",
            "shortDescription": "  ",
            "descriptions": [ { "text": "Adjustable regulator" }, { "text": "Second" } ]
        }),
        vec![],
    );

    let lookup = normalize(body);
    assert_eq!(lookup.part().unwrap().description, "Adjustable regulator");
}

#[test]
fn description_empty_when_nothing_available() {
    let body = response_with(json!({ "mpn": "LM317" }), vec![]);
    let lookup = normalize(body);
    assert_eq!(lookup.part().unwrap().description, "");
}

#[test]
fn unparseable_lead_times_count_as_default() {
    let body = response_with(
        json!({ "mpn": "X" }),
        vec![
            offer(1, 1.0, "EUR", Some("ASAP")),
            offer(1, 1.0, "EUR", Some("4 weeks")),
        ],
    );

    let lookup = normalize(body);
    // "ASAP" parses as 14, which beats 28
    assert_eq!(lookup.part().unwrap().delivery_days, 14);
}

#[test]
fn empty_results_are_not_found() {
    let body = json!({ "data": { "supSearchMpn": { "results": [] } } });
    assert_eq!(normalize(body), PartLookup::NotFound);

    let body = json!({ "data": { "supSearchMpn": null } });
    assert_eq!(normalize(body), PartLookup::NotFound);

    let body = json!({ "data": null });
    assert!(!normalize(body).found());
}

#[test]
fn error_payload_detected() {
    let response: SearchResponse = serde_json::from_value(json!({
        "errors": [ { "message": "Query too complex" } ]
    }))
    .unwrap();
    let payload = response.error_payload().unwrap();
    assert!(payload.contains("Query too complex"));

    let response: SearchResponse = serde_json::from_value(json!({ "data": null, "errors": [] })).unwrap();
    assert!(response.error_payload().is_none());
}

#[test]
fn lookup_serializes_with_status_tag() {
    let json = serde_json::to_value(PartLookup::NotFound).unwrap();
    assert_eq!(json, json!({ "status": "not_found" }));

    let body = response_with(json!({ "mpn": "X" }), vec![]);
    let lookup = normalize(body);
    let json = serde_json::to_value(&lookup).unwrap();
    assert_eq!(json["status"], "found");
    assert_eq!(json["mpn"], "X");

    let restored: PartLookup = serde_json::from_value(json).unwrap();
    assert_eq!(restored, lookup);
}
