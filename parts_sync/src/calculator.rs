//! Price calculation against the active expense profile

use crate::database::{self, CalculationRecord, Db, NewCalculation};
use crate::error::{Result, SyncError};
use chrono::Utc;
use parts_common::{calculate_price, AggregatorPart, ExpenseProfile, PriceBreakdown, PricingError, ProfitTarget};
use serde::Serialize;
use std::io::Read;

/// One quote request
#[derive(Debug, Clone)]
pub struct CalculationRequest {
    pub purchase_price: f64,
    pub target: ProfitTarget,
    pub invoice_delivery_fee: f64,
    pub user_id: Option<i64>,
    pub article_number: Option<String>,
    pub part: Option<AggregatorPart>,
}

impl CalculationRequest {
    pub fn new(purchase_price: f64, target: ProfitTarget) -> Self {
        Self {
            purchase_price,
            target,
            invoice_delivery_fee: 0.0,
            user_id: None,
            article_number: None,
            part: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub profile_id: i64,
    pub profile_name: String,
    pub breakdown: PriceBreakdown,
    /// Id of the stored calculation, once saved
    pub calculation_id: Option<i64>,
}

/// The default expense profile; pricing is impossible without one
pub fn get_active_profile(db: &Db) -> Result<ExpenseProfile> {
    let conn = database::lock(db);
    database::get_default_profile(&conn)?
        .ok_or_else(|| PricingError::profile("no default expense profile configured").into())
}

/// Price a request under the active profile without storing it
pub fn calculate(db: &Db, request: &CalculationRequest) -> Result<Quote> {
    let profile = get_active_profile(db)?;
    let profile_id = profile
        .id
        .ok_or_else(|| SyncError::from(PricingError::profile("stored profile has no id")))?;
    let breakdown = calculate_price(
        request.purchase_price,
        request.target,
        &profile,
        request.invoice_delivery_fee,
    )?;

    Ok(Quote {
        profile_id,
        profile_name: profile.name,
        breakdown: breakdown.rounded(),
        calculation_id: None,
    })
}

/// Price a request and record it in the calculation history
pub fn calculate_and_save(db: &Db, request: &CalculationRequest) -> Result<Quote> {
    let mut quote = calculate(db, request)?;
    let calculation = NewCalculation {
        profile_id: quote.profile_id,
        user_id: request.user_id,
        article_number: request.article_number.clone(),
        purchase_price: request.purchase_price,
        invoice_delivery_fee: request.invoice_delivery_fee,
        target: request.target,
        part: request.part.clone(),
        breakdown: quote.breakdown,
    };

    let conn = database::lock(db);
    let id = database::save_calculation(&conn, &calculation, Utc::now())?;
    log::info!(
        "Saved calculation {}: {:.2} with VAT for purchase {:.2}",
        id,
        quote.breakdown.price.with_vat,
        request.purchase_price
    );
    quote.calculation_id = Some(id);
    Ok(quote)
}

pub fn get_history(db: &Db, user_id: Option<i64>, limit: usize) -> Result<Vec<CalculationRecord>> {
    let conn = database::lock(db);
    Ok(database::get_history(&conn, user_id, limit)?)
}

/// Read a camelCase JSON profile, validate it and store it
pub fn import_profile<R: Read>(db: &Db, reader: R, make_default: bool) -> Result<i64> {
    let mut profile: ExpenseProfile = serde_json::from_reader(reader)?;
    profile.validate()?;
    profile.id = None;
    if make_default {
        profile.is_default = true;
    }
    if profile.name.trim().is_empty() {
        profile.name = "Imported".to_string();
    }

    let mut conn = database::lock(db);
    let id = database::insert_profile(&mut conn, &profile)?;
    log::info!("Imported expense profile '{}' as {}", profile.name, id);
    Ok(id)
}
