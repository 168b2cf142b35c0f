pub mod availability;
pub mod bookings;
pub mod health;
pub mod metrics;
pub mod units;
pub mod users;

use std::str::FromStr;

use serde::Deserialize;
use store::Money;

use crate::error::ApiError;

/// Parses a path identifier, rejecting malformed values with 400.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what}: {e}")))
}

/// A monetary amount given either as a JSON number or a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(serde_json::Number),
    Text(String),
}

impl AmountInput {
    pub(crate) fn to_money(&self, field: &str) -> Result<Money, ApiError> {
        let raw = match self {
            AmountInput::Number(n) => n.to_string(),
            AmountInput::Text(s) => s.clone(),
        };
        parse_money(&raw, field)
    }
}

pub(crate) fn parse_money(raw: &str, field: &str) -> Result<Money, ApiError> {
    raw.trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
