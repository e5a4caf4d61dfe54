//! Account model: ownership, classification, currency, and balance.
//!
//! The balance field is mutated exclusively by the transaction engine; every
//! other attribute is either immutable after creation (number, currency) or
//! updated through the engine's account operations (name, kind, soft close).

use crate::decimal::Money;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length of an account display name.
pub const NAME_MAX_LEN: usize = 255;

/// Account classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    Personal,
    Business,
}

impl FromStr for AccountKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Personal" => Ok(AccountKind::Personal),
            "Business" => Ok(AccountKind::Business),
            other => Err(LedgerError::InvalidAccountKind(other.to_string())),
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountKind::Personal => write!(f, "Personal"),
            AccountKind::Business => write!(f, "Business"),
        }
    }
}

/// Supported currencies. Fixed at account creation, never changed afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "GBP")]
    Gbp,
    #[serde(rename = "JPY")]
    Jpy,
    #[serde(rename = "AUD")]
    Aud,
}

impl FromStr for Currency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "JPY" => Ok(Currency::Jpy),
            "AUD" => Ok(Currency::Aud),
            other => Err(LedgerError::UnsupportedCurrency(other.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Aud => "AUD",
        };
        write!(f, "{}", code)
    }
}

/// A financial account.
///
/// Identified internally by an opaque `id` (never exposed to clients) and
/// externally by a 12-digit Luhn-valid `number`, unique across all accounts
/// and immutable after creation.
///
/// Closing an account is a soft operation: `closed_at` is set and the account
/// stops resolving for transactions and views, but the row and its ledger
/// history are preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Opaque internal key.
    pub id: Uuid,

    /// Owning principal.
    pub owner_id: Uuid,

    /// Unique display name.
    pub name: String,

    /// Public-facing 12-digit Luhn-valid account number.
    pub number: String,

    /// Personal or Business classification.
    pub kind: AccountKind,

    /// Denomination, fixed at creation.
    pub currency: Currency,

    /// Current balance. Mutated only by the transaction engine.
    pub balance: Money,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Soft-close marker. A closed account rejects all further operations
    /// but keeps its history.
    pub closed_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Creates a new open account with a zero balance.
    pub fn new(
        owner_id: Uuid,
        name: String,
        number: String,
        kind: AccountKind,
        currency: Currency,
    ) -> Self {
        Account {
            id: Uuid::new_v4(),
            owner_id,
            name,
            number,
            kind,
            currency,
            balance: Money::ZERO,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    /// Returns `true` if the account has been soft-closed.
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

/// Validates an account display name: trimmed, non-empty, bounded length.
///
/// Returns the trimmed name on success.
pub fn validate_name(name: &str) -> Result<String, LedgerError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidAccountName("empty name".to_string()));
    }
    if trimmed.len() > NAME_MAX_LEN {
        return Err(LedgerError::InvalidAccountName(format!(
            "longer than {} characters",
            NAME_MAX_LEN
        )));
    }
    Ok(trimmed.to_string())
}
