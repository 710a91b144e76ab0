//! Shared types for component pricing
//!
//! Expense profiles and the price engine, plus the wire types and
//! normalizers for the Nexar aggregator and the TME distributor. Nothing in
//! this crate performs I/O.

pub mod category;
pub mod error;
pub mod nexar;
pub mod parsing;
pub mod part;
pub mod pricing;
pub mod profile;
pub mod tme;

pub use category::{map_category, Category};
pub use error::{PricingError, PricingResult};
pub use part::{AggregatorPart, Offer, OfferPrice, PartLookup, PartRecord, Spec};
pub use pricing::{calculate_price, round2, PriceBreakdown, ProfitTarget};
pub use profile::{ExpenseProfile, TransferMethod, TransferTerms};
