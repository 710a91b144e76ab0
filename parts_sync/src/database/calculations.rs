//! Saved price calculations

use super::{format_timestamp, DbResult};
use chrono::{DateTime, Utc};
use parts_common::{round2, AggregatorPart, PriceBreakdown, ProfitTarget};
use rusqlite::{params, Connection};
use serde::Serialize;

/// Inputs and result of one calculation, as handed to [`save_calculation`]
#[derive(Debug, Clone)]
pub struct NewCalculation {
    pub profile_id: i64,
    pub user_id: Option<i64>,
    pub article_number: Option<String>,
    pub purchase_price: f64,
    pub invoice_delivery_fee: f64,
    pub target: ProfitTarget,
    /// Aggregator data shown next to the quote, if any
    pub part: Option<AggregatorPart>,
    pub breakdown: PriceBreakdown,
}

/// History row, joined with its profile name
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationRecord {
    pub id: i64,
    pub profile_id: i64,
    pub profile_name: Option<String>,
    pub user_id: Option<i64>,
    pub article_number: Option<String>,
    pub purchase_price_eur: f64,
    pub delivery_invoice_eur: f64,
    pub aggregator_manufacturer: Option<String>,
    pub desired_profit_rub: Option<f64>,
    pub desired_profit_percent: Option<f64>,
    pub price_with_vat: f64,
    pub price_without_vat: f64,
    pub breakeven_point: f64,
    pub margin_percent: f64,
    pub competitor_avg_price: f64,
    pub price_difference: f64,
    pub expense_total: f64,
    pub calculation_type: String,
    pub status: String,
    pub created_at: String,
}

/// Persist a calculation with every figure rounded to 2 decimals; returns its id
pub fn save_calculation(conn: &Connection, calc: &NewCalculation, now: DateTime<Utc>) -> DbResult<i64> {
    let b = calc.breakdown.rounded();
    let (profit_abs, profit_pct) = match calc.target {
        ProfitTarget::Absolute(amount) => (Some(amount), None),
        ProfitTarget::Percent(percent) => (None, Some(percent)),
    };
    let part = calc.part.as_ref();
    let part_json = part
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    conn.execute(
        "INSERT INTO calculations (
            profile_id, user_id, article_number, purchase_price_eur, delivery_invoice_eur,
            aggregator_manufacturer, aggregator_part_name, aggregator_availability,
            aggregator_delivery_days, aggregator_min_price, aggregator_data_json,
            desired_profit_rub, desired_profit_percent, price_with_vat, price_without_vat,
            breakeven_point, margin_percent, competitor_avg_price, price_difference,
            expense_purchase, expense_delivery_europe, expense_commission,
            expense_delivery_domestic, expense_documents, expense_vat, expense_profit_tax,
            expense_total, calculation_type, status, created_at
         ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
            ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, 'calculated', ?29
         )",
        params![
            calc.profile_id,
            calc.user_id,
            &calc.article_number,
            calc.purchase_price,
            calc.invoice_delivery_fee,
            part.map(|p| p.manufacturer.as_str()),
            part.map(|p| p.description.as_str()),
            part.map(|p| i64::try_from(p.availability).unwrap_or(i64::MAX)),
            part.map(|p| p.delivery_days),
            part.and_then(|p| p.min_price),
            part_json,
            profit_abs,
            profit_pct,
            b.price.with_vat,
            b.price.without_vat,
            b.price.breakeven,
            b.profit.percent,
            b.competitors.average,
            b.competitors.difference,
            b.expenses.purchase,
            b.expenses.delivery_europe,
            b.expenses.commission,
            b.expenses.delivery_domestic,
            b.expenses.documents,
            b.expenses.vat,
            b.expenses.profit_tax,
            b.expenses.total,
            calc.target.kind(),
            format_timestamp(now),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Saved calculations, newest first, optionally for one user only
pub fn get_history(conn: &Connection, user_id: Option<i64>, limit: usize) -> DbResult<Vec<CalculationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.profile_id, p.name, c.user_id, c.article_number, c.purchase_price_eur,
                c.delivery_invoice_eur, c.aggregator_manufacturer, c.desired_profit_rub,
                c.desired_profit_percent, c.price_with_vat, c.price_without_vat,
                c.breakeven_point, c.margin_percent, c.competitor_avg_price,
                c.price_difference, c.expense_total, c.calculation_type, c.status, c.created_at
         FROM calculations c
         LEFT JOIN expense_profiles p ON p.id = c.profile_id
         WHERE ?1 IS NULL OR c.user_id = ?1
         ORDER BY c.created_at DESC, c.id DESC
         LIMIT ?2",
    )?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let results: DbResult<Vec<CalculationRecord>> = stmt
        .query_map(params![user_id, limit], |row| {
            Ok(CalculationRecord {
                id: row.get(0)?,
                profile_id: row.get(1)?,
                profile_name: row.get(2)?,
                user_id: row.get(3)?,
                article_number: row.get(4)?,
                purchase_price_eur: row.get(5)?,
                delivery_invoice_eur: row.get(6)?,
                aggregator_manufacturer: row.get(7)?,
                desired_profit_rub: row.get(8)?,
                desired_profit_percent: row.get(9)?,
                price_with_vat: row.get(10)?,
                price_without_vat: row.get(11)?,
                breakeven_point: row.get(12)?,
                margin_percent: row.get(13)?,
                competitor_avg_price: row.get(14)?,
                price_difference: row.get(15)?,
                expense_total: row.get(16)?,
                calculation_type: row.get(17)?,
                status: row.get(18)?,
                created_at: row.get(19)?,
            })
        })?
        .collect();
    results
}

/// Presentation rounding used by callers that print history rows
pub fn display_amount(value: f64) -> String {
    format!("{:.2}", round2(value))
}
