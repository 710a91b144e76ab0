//! Error types for the pricing engine

use thiserror::Error;

/// Failure of a single price calculation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingError {
    /// The expense profile produces a degenerate formula (zero or negative
    /// denominator, non-finite figures) or no active profile exists
    #[error("Invalid profile configuration: {reason}")]
    InvalidProfileConfiguration { reason: String },

    /// A caller-supplied amount is negative or not a finite number
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl PricingError {
    pub fn profile(reason: impl Into<String>) -> Self {
        PricingError::InvalidProfileConfiguration {
            reason: reason.into(),
        }
    }

    pub fn input(reason: impl Into<String>) -> Self {
        PricingError::InvalidInput {
            reason: reason.into(),
        }
    }
}

/// Result alias for pricing operations
pub type PricingResult<T> = std::result::Result<T, PricingError>;
