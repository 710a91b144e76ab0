//! Free-text parsing helpers for upstream fields (lead time, prices)

use lazy_static::lazy_static;
use regex::Regex;

/// Lead time assumed when the upstream gives nothing usable
pub const DEFAULT_LEAD_TIME_DAYS: u32 = 14;

lazy_static! {
    static ref WEEKS_RE: Regex = Regex::new(r"(?i)(\d+)\s*week").unwrap();
    static ref DAYS_RE: Regex = Regex::new(r"(?i)(\d+)\s*day").unwrap();
    static ref FIRST_NUMBER_RE: Regex = Regex::new(r"(\d+)").unwrap();
    static ref NON_PRICE_CHARS_RE: Regex = Regex::new(r"[^0-9.]").unwrap();
}

fn capture_number(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse a lead-time string into days, if it follows `<N> week(s)` or `<N> day(s)`
///
/// Weeks are checked first, so "2-3 weeks" yields 21.
pub fn try_parse_lead_time(text: &str) -> Option<u32> {
    if let Some(weeks) = capture_number(&WEEKS_RE, text) {
        return Some(weeks.saturating_mul(7));
    }
    capture_number(&DAYS_RE, text)
}

/// Parse a lead-time string into days, defaulting to 14
pub fn parse_lead_time(text: &str) -> u32 {
    try_parse_lead_time(text).unwrap_or(DEFAULT_LEAD_TIME_DAYS)
}

/// Parse a distributor delivery field: lead-time patterns first, then the
/// first integer in the text, then the default
pub fn parse_delivery_days(text: &str) -> u32 {
    try_parse_lead_time(text)
        .or_else(|| capture_number(&FIRST_NUMBER_RE, text))
        .unwrap_or(DEFAULT_LEAD_TIME_DAYS)
}

/// Parse a price string by dropping everything except digits and dots
///
/// Returns `None` when nothing parseable remains.
pub fn parse_price_text(text: &str) -> Option<f64> {
    let cleaned = NON_PRICE_CHARS_RE.replace_all(text, "");
    cleaned.parse::<f64>().ok().filter(|price| price.is_finite())
}
