//! # Bank Ledger
//!
//! A banking ledger core: Luhn-checksummed account numbers, an atomic
//! credit/debit transaction engine, and account statement export.
//!
//! ## Design Principles
//!
//! - **Fixed-point arithmetic**: balances and amounts carry exactly 2
//!   decimal places via `rust_decimal`
//! - **Replay invariant**: summing an account's entries in commit order
//!   from zero always reproduces its current balance
//! - **Atomic commits**: a balance update and its ledger entry land
//!   together or not at all
//! - **Per-account serialization**: concurrent transactions on one account
//!   observe each other's effects; different accounts never contend
//! - **Explicit principals**: every owner-scoped operation takes the
//!   caller's id as an argument, no ambient authenticated-user state
//!
//! ## Example
//!
//! ```
//! use std::str::FromStr;
//! use std::sync::Arc;
//! use bank_ledger::{
//!     AccountKind, Currency, EntryKind, MemoryStore, Money, TransactionEngine,
//! };
//!
//! let engine = TransactionEngine::new(Arc::new(MemoryStore::new()));
//! let owner = uuid::Uuid::new_v4();
//!
//! let account = engine
//!     .open_account(owner, "Checking", AccountKind::Personal, Currency::Usd, None)
//!     .unwrap();
//! let entry = engine
//!     .apply(
//!         account.id,
//!         owner,
//!         EntryKind::Credit,
//!         Money::from_str("100.00").unwrap(),
//!         Some("first deposit"),
//!         None,
//!     )
//!     .unwrap();
//! assert_eq!(entry.balance_after, Money::from_str("100.00").unwrap());
//! ```

pub mod account;
pub mod allocator;
pub mod batch;
pub mod decimal;
pub mod engine;
pub mod entry;
pub mod error;
pub mod luhn;
pub mod statement;
pub mod store;

pub use account::{Account, AccountKind, Currency};
pub use batch::{BatchProcessor, Command, CommandRecord};
pub use decimal::Money;
pub use engine::TransactionEngine;
pub use entry::{EntryKind, LedgerEntry};
pub use error::{LedgerError, Result};
pub use store::{
    AccountStore, BalanceUpdate, EntryFilter, LedgerStore, MemoryStore, Page, Store, StoreError,
};
