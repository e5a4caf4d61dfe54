//! Ledger entry model: one immutable record of a monetary movement.
//!
//! Entries are append-only. For any account, replaying every entry in
//! creation order from a starting balance of zero must reproduce each
//! entry's `balance_after` and the account's current balance exactly.
//! A soft-deleted entry is an audit marker only; it still represents a real
//! historical movement and is never excluded from replay.

use crate::decimal::Money;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length of an entry description.
pub const DESCRIPTION_MAX_LEN: usize = 500;

/// Direction of a monetary movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Credit,
    Debit,
}

impl FromStr for EntryKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Credit" => Ok(EntryKind::Credit),
            "Debit" => Ok(EntryKind::Debit),
            other => Err(LedgerError::InvalidType(other.to_string())),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Credit => write!(f, "Credit"),
            EntryKind::Debit => write!(f, "Debit"),
        }
    }
}

/// One committed credit or debit against an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry id.
    pub id: Uuid,

    /// Owning account. Non-owning back-reference, used for lookups only.
    pub account_id: Uuid,

    /// Credit or Debit.
    pub kind: EntryKind,

    /// Movement amount, strictly positive.
    pub amount: Money,

    /// Optional memo, bounded at [`DESCRIPTION_MAX_LEN`] characters.
    pub description: Option<String>,

    /// Snapshot of the account balance immediately after this entry.
    pub balance_after: Money,

    /// Client-supplied idempotency key, when the request carried one.
    pub request_id: Option<Uuid>,

    /// Commit timestamp.
    pub created_at: DateTime<Utc>,

    /// Audit marker. A marked entry still counts toward replay.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// Creates a new entry ready for commit.
    pub fn new(
        account_id: Uuid,
        kind: EntryKind,
        amount: Money,
        description: Option<String>,
        balance_after: Money,
        request_id: Option<Uuid>,
    ) -> Self {
        LedgerEntry {
            id: Uuid::new_v4(),
            account_id,
            kind,
            amount,
            description,
            balance_after,
            request_id,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    /// The movement as a signed value: `+amount` for Credit, `-amount` for Debit.
    pub fn signed(&self) -> Money {
        match self.kind {
            EntryKind::Credit => self.amount,
            EntryKind::Debit => -self.amount,
        }
    }
}

/// Replays entries in order from a zero balance, returning the final balance.
///
/// Soft-deleted entries are included: they are historical movements.
pub fn replay<'a, I>(entries: I) -> Money
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    entries
        .into_iter()
        .fold(Money::ZERO, |balance, entry| balance + entry.signed())
}
