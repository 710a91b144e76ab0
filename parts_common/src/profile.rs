//! Expense profile: the markup and cost configuration a price is derived from

use crate::error::{PricingError, PricingResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the purchase money is transferred to the foreign supplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    /// Bank transfer through the sole-proprietor account (EUR/RUB rate)
    Cash,
    /// Transfer through USDT with an agent (EUR/USDT * USDT/RUB rate)
    Crypto,
}

impl TransferMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMethod::Cash => "cash",
            TransferMethod::Crypto => "crypto",
        }
    }

    /// Anything other than `cash` is treated as a crypto transfer
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("cash") {
            TransferMethod::Cash
        } else {
            TransferMethod::Crypto
        }
    }
}

impl fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversion rate and commission schedule selected by the transfer method
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferTerms {
    /// Local currency per unit of purchase currency
    pub rate: f64,
    /// Transfer commission as a fraction (2% = 0.02)
    pub commission: f64,
    /// Flat agent fee in local currency
    pub agent_fee: f64,
}

/// Expense profile as stored in `expense_profiles`
///
/// Percent fields hold whole percents (20.0 means 20%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseProfile {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    /// Flat European delivery fee for small shipments (purchase currency)
    pub low_weight_delivery_fee: f64,
    pub transfer_method: TransferMethod,
    #[serde(default)]
    pub eur_rub_rate: f64,
    #[serde(default)]
    pub eur_usdt_rate: f64,
    #[serde(default)]
    pub usdt_rub_rate: f64,
    #[serde(default)]
    pub commission_ip: f64,
    #[serde(default)]
    pub commission_crypto: f64,
    #[serde(default)]
    pub commission_agent: f64,
    /// Delivery inside the destination country (local currency)
    pub domestic_delivery_fee: f64,
    pub vat_percent: f64,
    pub profit_tax_percent: f64,
    pub document_cost_percent: f64,
    /// Share of revenue declared as official profit
    pub target_official_profit: f64,
    #[serde(default)]
    pub competitor_price_min: f64,
    #[serde(default)]
    pub competitor_price_max: f64,
}

impl ExpenseProfile {
    pub fn transfer_terms(&self) -> TransferTerms {
        match self.transfer_method {
            TransferMethod::Cash => TransferTerms {
                rate: self.eur_rub_rate,
                commission: self.commission_ip / 100.0,
                agent_fee: 0.0,
            },
            TransferMethod::Crypto => TransferTerms {
                rate: self.eur_usdt_rate * self.usdt_rub_rate,
                commission: self.commission_crypto / 100.0,
                agent_fee: self.commission_agent,
            },
        }
    }

    /// Reject profiles whose figures cannot produce a meaningful price
    pub fn validate(&self) -> PricingResult<()> {
        let fields = [
            ("low_weight_delivery_fee", self.low_weight_delivery_fee),
            ("eur_rub_rate", self.eur_rub_rate),
            ("eur_usdt_rate", self.eur_usdt_rate),
            ("usdt_rub_rate", self.usdt_rub_rate),
            ("commission_ip", self.commission_ip),
            ("commission_crypto", self.commission_crypto),
            ("commission_agent", self.commission_agent),
            ("domestic_delivery_fee", self.domestic_delivery_fee),
            ("vat_percent", self.vat_percent),
            ("profit_tax_percent", self.profit_tax_percent),
            ("document_cost_percent", self.document_cost_percent),
            ("target_official_profit", self.target_official_profit),
            ("competitor_price_min", self.competitor_price_min),
            ("competitor_price_max", self.competitor_price_max),
        ];

        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(PricingError::profile(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        let terms = self.transfer_terms();
        if terms.rate <= 0.0 {
            return Err(PricingError::profile(format!(
                "conversion rate for {} transfer must be positive",
                self.transfer_method
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
pub use tests::make_test_profile;
