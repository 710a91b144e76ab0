//! Price derivation engine
//!
//! Turns a purchase price and a desired profit into a sale price, working
//! backwards through currency conversion, transfer commission, domestic
//! delivery, document cost, profit tax and VAT.
//!
//! All intermediate values keep full `f64` precision. Call
//! [`PriceBreakdown::rounded`] to get the two-decimal presentation form.

use crate::error::{PricingError, PricingResult};
use crate::profile::ExpenseProfile;
use serde::{Deserialize, Serialize};

/// Purchases at or below this amount (after the 10% margin) ship at the flat fee
const SMALL_SHIPMENT_THRESHOLD: f64 = 2.0;
const SMALL_SHIPMENT_MARGIN: f64 = 1.1;

/// Share of the purchase booked as the first receipt
const FIRST_RECEIPT_SHARE: f64 = 0.10;

/// Desired profit, either in local currency or as a percent of revenue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum ProfitTarget {
    Absolute(f64),
    Percent(f64),
}

impl ProfitTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            ProfitTarget::Absolute(_) => "absolute",
            ProfitTarget::Percent(_) => "percent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSummary {
    pub with_vat: f64,
    pub without_vat: f64,
    pub vat: f64,
    pub breakeven: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitSummary {
    pub amount: f64,
    pub percent: f64,
}

/// Itemized expenses in local currency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expenses {
    pub purchase: f64,
    pub delivery_europe: f64,
    pub commission: f64,
    pub delivery_domestic: f64,
    pub documents: f64,
    pub vat: f64,
    pub profit_tax: f64,
    pub total: f64,
}

/// Itemized expenses as percent of the final price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseShares {
    pub purchase: f64,
    pub delivery_europe: f64,
    pub commission: f64,
    pub delivery_domestic: f64,
    pub documents: f64,
    pub vat: f64,
    pub profit_tax: f64,
}

impl ExpenseShares {
    pub fn sum(&self) -> f64 {
        self.purchase
            + self.delivery_europe
            + self.commission
            + self.delivery_domestic
            + self.documents
            + self.vat
            + self.profit_tax
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorComparison {
    pub average: f64,
    pub difference: f64,
    pub difference_percent: f64,
    pub cheaper: bool,
}

/// Fully itemized result of a price calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub price: PriceSummary,
    pub profit: ProfitSummary,
    pub expenses: Expenses,
    pub expenses_percent: ExpenseShares,
    pub competitors: CompetitorComparison,
}

/// Round to two decimals, half away from zero
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl PriceBreakdown {
    /// Presentation copy with every amount and percent rounded to 2 decimals
    pub fn rounded(&self) -> PriceBreakdown {
        let e = &self.expenses;
        let s = &self.expenses_percent;
        let c = &self.competitors;
        PriceBreakdown {
            price: PriceSummary {
                with_vat: round2(self.price.with_vat),
                without_vat: round2(self.price.without_vat),
                vat: round2(self.price.vat),
                breakeven: round2(self.price.breakeven),
            },
            profit: ProfitSummary {
                amount: round2(self.profit.amount),
                percent: round2(self.profit.percent),
            },
            expenses: Expenses {
                purchase: round2(e.purchase),
                delivery_europe: round2(e.delivery_europe),
                commission: round2(e.commission),
                delivery_domestic: round2(e.delivery_domestic),
                documents: round2(e.documents),
                vat: round2(e.vat),
                profit_tax: round2(e.profit_tax),
                total: round2(e.total),
            },
            expenses_percent: ExpenseShares {
                purchase: round2(s.purchase),
                delivery_europe: round2(s.delivery_europe),
                commission: round2(s.commission),
                delivery_domestic: round2(s.delivery_domestic),
                documents: round2(s.documents),
                vat: round2(s.vat),
                profit_tax: round2(s.profit_tax),
            },
            competitors: CompetitorComparison {
                average: round2(c.average),
                difference: round2(c.difference),
                difference_percent: round2(c.difference_percent),
                cheaper: c.cheaper,
            },
        }
    }
}

/// Calculate the sale price for a purchase under the given profile
///
/// A percent target is first converted into an absolute profit, then the
/// absolute formula runs. The two-step chain is kept as is so results match
/// previously stored calculations.
///
/// `invoice_delivery_fee` is only used when the purchase is above the
/// small-shipment threshold.
pub fn calculate_price(
    purchase_price: f64,
    target: ProfitTarget,
    profile: &ExpenseProfile,
    invoice_delivery_fee: f64,
) -> PricingResult<PriceBreakdown> {
    ensure_amount("purchase price", purchase_price)?;
    ensure_amount("invoice delivery fee", invoice_delivery_fee)?;
    profile.validate()?;

    // European delivery
    let delivery_fee = if purchase_price * SMALL_SHIPMENT_MARGIN <= SMALL_SHIPMENT_THRESHOLD {
        profile.low_weight_delivery_fee
    } else {
        invoice_delivery_fee
    };
    let total_foreign_cost = purchase_price + delivery_fee;

    // Conversion and transfer commission
    let terms = profile.transfer_terms();
    let amount_to_withdraw =
        total_foreign_cost * terms.rate * (1.0 + terms.commission) + terms.agent_fee;

    let direct_costs = amount_to_withdraw + profile.domestic_delivery_fee;

    let vat = profile.vat_percent / 100.0;
    let profit_tax = profile.profit_tax_percent / 100.0;
    let doc_cost = profile.document_cost_percent / 100.0;
    let target_profit_frac = profile.target_official_profit / 100.0;

    let allocation = doc_cost * (1.0 - target_profit_frac) + target_profit_frac * profit_tax;

    let profit_abs = match target {
        ProfitTarget::Absolute(amount) => {
            if !amount.is_finite() {
                return Err(PricingError::input("profit amount must be a finite number"));
            }
            amount
        }
        ProfitTarget::Percent(percent) => {
            if !percent.is_finite() {
                return Err(PricingError::input("profit percent must be a finite number"));
            }
            let denominator = 1.0 - percent / 100.0 - allocation;
            if denominator <= 0.0 {
                return Err(PricingError::profile(format!(
                    "profit percent {} plus document cost and profit tax allocation reach 100%",
                    percent
                )));
            }
            let revenue_ex_vat = direct_costs / denominator;
            revenue_ex_vat * (percent / 100.0)
        }
    };

    let denominator = 1.0 - allocation;
    if denominator <= 0.0 {
        return Err(PricingError::profile(
            "document cost and profit tax allocation reach 100% of revenue",
        ));
    }
    let revenue_ex_vat = (profit_abs + direct_costs) / denominator;

    let vat_amount = revenue_ex_vat * vat;
    let final_price = revenue_ex_vat + vat_amount;
    if !final_price.is_finite() || final_price <= 0.0 {
        return Err(PricingError::profile(format!(
            "derived sale price {} is not positive",
            final_price
        )));
    }

    // Itemization
    let purchase_local = purchase_price * terms.rate;
    let delivery_local = delivery_fee * terms.rate;
    let commission_local = amount_to_withdraw - purchase_local - delivery_local;

    let first_receipt = purchase_local * FIRST_RECEIPT_SHARE;
    let target_profit_amount = revenue_ex_vat * target_profit_frac;
    let additional_receipt = revenue_ex_vat - first_receipt - target_profit_amount;
    let document_cost = (first_receipt + additional_receipt) * doc_cost;
    let profit_tax_amount = target_profit_amount * profit_tax;

    let breakeven = direct_costs + document_cost + profit_tax_amount + vat_amount;

    let share = |amount: f64| amount / final_price * 100.0;

    let expenses = Expenses {
        purchase: purchase_local,
        delivery_europe: delivery_local,
        commission: commission_local,
        delivery_domestic: profile.domestic_delivery_fee,
        documents: document_cost,
        vat: vat_amount,
        profit_tax: profit_tax_amount,
        total: purchase_local
            + delivery_local
            + commission_local
            + profile.domestic_delivery_fee
            + document_cost
            + vat_amount
            + profit_tax_amount,
    };

    let expenses_percent = ExpenseShares {
        purchase: share(purchase_local),
        delivery_europe: share(delivery_local),
        commission: share(commission_local),
        delivery_domestic: share(profile.domestic_delivery_fee),
        documents: share(document_cost),
        vat: share(vat_amount),
        profit_tax: share(profit_tax_amount),
    };

    Ok(PriceBreakdown {
        price: PriceSummary {
            with_vat: final_price,
            without_vat: revenue_ex_vat,
            vat: vat_amount,
            breakeven,
        },
        profit: ProfitSummary {
            amount: profit_abs,
            percent: share(profit_abs),
        },
        expenses,
        expenses_percent,
        competitors: compare_competitors(profile, final_price),
    })
}

fn compare_competitors(profile: &ExpenseProfile, final_price: f64) -> CompetitorComparison {
    if profile.competitor_price_min <= 0.0 && profile.competitor_price_max <= 0.0 {
        return CompetitorComparison {
            average: 0.0,
            difference: 0.0,
            difference_percent: 0.0,
            cheaper: false,
        };
    }

    let average = (profile.competitor_price_min + profile.competitor_price_max) / 2.0;
    let difference = final_price - average;
    CompetitorComparison {
        average,
        difference,
        difference_percent: if average > 0.0 {
            difference / average * 100.0
        } else {
            0.0
        },
        cheaper: difference < 0.0,
    }
}

fn ensure_amount(name: &str, value: f64) -> PricingResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(PricingError::input(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "pricing_tests.rs"]
mod tests;
