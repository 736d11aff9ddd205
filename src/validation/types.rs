//! Validation Types
//!
//! Structured rejection reasons so callers can inspect why a candidate
//! was dropped without relying on log output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Field of an activity candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityField {
    Type,
    Date,
    Datetime,
    Shares,
    Price,
    Amount,
    Fee,
    Tax,
}

impl ActivityField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Shares => "shares",
            Self::Price => "price",
            Self::Amount => "amount",
            Self::Fee => "fee",
            Self::Tax => "tax",
        }
    }
}

/// Why a candidate was rejected, in check order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum RejectionReason {
    /// A mandatory field is missing
    EmptyField { field: ActivityField },
    /// Date or datetime outside the accepted window
    DateOutOfRange { field: ActivityField, value: String },
    /// Shares must be a number greater than 0
    InvalidShares { value: f64 },
    /// Price must be a number of at least 0
    InvalidPrice { value: f64 },
    /// Amount must be a number of at least 0
    InvalidAmount { value: f64 },
    /// Fee must be a finite number
    InvalidFee { value: f64 },
    /// Tax must be a finite number
    InvalidTax { value: f64 },
    /// Neither ISIN, WKN nor (when allowed) company present
    MissingIdentifier { company_allowed: bool },
    InvalidIsin { value: String },
    InvalidWkn { value: String },
    /// Kind does not map onto Buy, Sell or Dividend
    UnknownType,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyField { field } => write!(f, "field '{}' is empty", field.as_str()),
            Self::DateOutOfRange { field, value } => {
                write!(f, "{} {} is outside the accepted range", field.as_str(), value)
            }
            Self::InvalidShares { value } => {
                write!(f, "shares must be a number greater than 0, got {}", value)
            }
            Self::InvalidPrice { value } => {
                write!(f, "price must be a number of at least 0, got {}", value)
            }
            Self::InvalidAmount { value } => {
                write!(f, "amount must be a number of at least 0, got {}", value)
            }
            Self::InvalidFee { value } => write!(f, "fee must be a finite number, got {}", value),
            Self::InvalidTax { value } => write!(f, "tax must be a finite number, got {}", value),
            Self::MissingIdentifier { company_allowed } => {
                if *company_allowed {
                    write!(f, "at least a company, ISIN or WKN is required")
                } else {
                    write!(f, "at least an ISIN or WKN is required")
                }
            }
            Self::InvalidIsin { value } => write!(f, "ISIN '{}' has an invalid scheme", value),
            Self::InvalidWkn { value } => write!(f, "WKN '{}' has an invalid scheme", value),
            Self::UnknownType => write!(f, "unknown activity type"),
        }
    }
}

/// A dropped candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub broker: String,
    #[serde(flatten)]
    pub reason: RejectionReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "The activity for {} was rejected: {}", self.broker, self.reason)
    }
}

impl std::error::Error for Rejection {}
