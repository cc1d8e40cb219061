//! Monetary amount handling
//!
//! All balances and transfer amounts are `rust_decimal::Decimal`. Floats never
//! touch money. This module owns the input side: [`DecimalInput`] accepts the
//! JSON shapes clients actually send (string or number) without going through
//! `f64`, and [`check_scale`] bounds fractional and integer digits to what
//! the storage column holds.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fractional digits stored by the `NUMERIC(20,8)` balance and amount columns.
pub const MONEY_SCALE: u32 = 8;

/// Exclusive magnitude bound of `NUMERIC(20,8)`: 12 integer digits, i.e. 10^12.
pub const MONEY_LIMIT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Decimal parsed from a JSON string or JSON number.
///
/// Format is validated here; range (positive, non-negative) is a business rule
/// and is checked by the engine so that it surfaces as a field-level
/// validation failure rather than a decoding error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalInput(Decimal);

impl DecimalInput {
    /// Get the inner Decimal value
    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl From<Decimal> for DecimalInput {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl std::ops::Deref for DecimalInput {
    type Target = Decimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Parse a decimal literal, rejecting the sloppy forms `.5`, `5.` and `+5`.
pub fn parse_decimal(s: &str) -> Result<Decimal, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Amount cannot be empty".to_string());
    }
    if s.starts_with('.') || s.starts_with("-.") {
        return Err("Invalid format: use 0.5 not .5".to_string());
    }
    if s.ends_with('.') {
        return Err("Invalid format: use 5.0 not 5.".to_string());
    }
    if s.starts_with('+') {
        return Err("Invalid format: + prefix not allowed".to_string());
    }
    if s.contains(['e', 'E']) {
        return Decimal::from_scientific(s).map_err(|e| format!("Invalid decimal: {}", e));
    }
    Decimal::from_str(s).map_err(|e| format!("Invalid decimal: {}", e))
}

impl<'de> Deserialize<'de> for DecimalInput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        // serde_json::Number keeps the literal's shortest textual form, so
        // `150.25` arrives as "150.25" and not as a binary float.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum DecimalOrNumber {
            String(String),
            Number(serde_json::Number),
        }

        let text = match DecimalOrNumber::deserialize(deserializer)? {
            DecimalOrNumber::String(s) => s,
            DecimalOrNumber::Number(n) => n.to_string(),
        };

        parse_decimal(&text).map(DecimalInput).map_err(D::Error::custom)
    }
}

impl Serialize for DecimalInput {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

/// Reject values the ledger columns cannot hold: more than [`MONEY_SCALE`]
/// fractional digits, or a magnitude of [`MONEY_LIMIT`] or more.
pub fn check_scale(value: Decimal) -> Result<(), String> {
    if value.normalize().scale() > MONEY_SCALE {
        return Err(format!(
            "at most {} decimal places are supported",
            MONEY_SCALE
        ));
    }
    if !fits_column(value) {
        return Err(format!("must be less than {} in magnitude", MONEY_LIMIT));
    }
    Ok(())
}

/// Whether a balance stays inside the column range.
pub fn fits_column(value: Decimal) -> bool {
    value.abs() < MONEY_LIMIT
}
