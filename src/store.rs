//! Persistence seam: store traits and the in-memory reference implementation.
//!
//! The engine only ever talks to these traits. The one non-negotiable
//! contract is [`Store::commit`]: balance updates and ledger appends handed
//! to a single call are persisted as one atomic unit — both succeed or
//! neither does, even across a crash between the writes.

use crate::account::Account;
use crate::decimal::Money;
use crate::entry::LedgerEntry;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// Default page size for entry listings.
pub const DEFAULT_PAGE_SIZE: usize = 15;

/// Storage-layer failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No account with the given id or number
    #[error("account not found")]
    NotFound,

    /// Unique constraint violation on the account number
    #[error("account number already taken")]
    DuplicateNumber,

    /// Unique constraint violation on the account name
    #[error("account name already taken")]
    DuplicateName,

    /// An entry with this request id was already committed
    #[error("request id already committed")]
    DuplicateRequest,

    /// Transient I/O failure; the operation may be retried
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => LedgerError::AccountNotFound,
            StoreError::DuplicateNumber => LedgerError::DuplicateAccountNumber,
            StoreError::DuplicateName => LedgerError::DuplicateAccountName,
            // The engine intercepts this variant; reaching here means a
            // resubmitted request raced its original, which is transient
            // from the caller's point of view.
            StoreError::DuplicateRequest => {
                LedgerError::TransientStorage("request id already committed".to_string())
            }
            StoreError::Unavailable(msg) => LedgerError::TransientStorage(msg),
        }
    }
}

/// A balance mutation to persist inside a commit.
#[derive(Debug, Clone, Copy)]
pub struct BalanceUpdate {
    pub account_id: Uuid,
    pub new_balance: Money,
}

/// Filters for entry listings.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,

    /// Inclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,

    /// 1-based page index.
    pub page: usize,

    /// Page size.
    pub per_page: usize,
}

impl Default for EntryFilter {
    fn default() -> Self {
        EntryFilter {
            from: None,
            to: None,
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl EntryFilter {
    fn matches(&self, entry: &LedgerEntry) -> bool {
        if let Some(from) = self.from {
            if entry.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.created_at > to {
                return false;
            }
        }
        true
    }
}

/// One page of listed entries, in commit order.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

/// Account lookup and mutation operations.
pub trait AccountStore {
    fn find(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    fn find_by_number(&self, number: &str) -> Result<Option<Account>, StoreError>;

    fn exists_by_number(&self, number: &str) -> Result<bool, StoreError>;

    /// Inserts a new account, enforcing number and name uniqueness.
    fn insert(&self, account: Account) -> Result<(), StoreError>;

    /// Persists non-balance attribute changes (name, kind, soft close).
    /// Balance changes go through [`Store::commit`] exclusively.
    fn update(&self, account: &Account) -> Result<(), StoreError>;
}

/// Ledger entry read operations.
pub trait LedgerStore {
    /// Lists an account's entries in commit order, filtered and paginated.
    fn list_by_account(
        &self,
        account_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Page<LedgerEntry>, StoreError>;

    /// Looks up a previously committed entry by its idempotency key.
    fn find_by_request(&self, request_id: Uuid) -> Result<Option<LedgerEntry>, StoreError>;
}

/// The full persistence contract consumed by the transaction engine.
pub trait Store: AccountStore + LedgerStore + Send + Sync {
    /// Atomically persists the balance updates and appends the entries.
    ///
    /// All updates and appends land together or not at all. Fails with
    /// `DuplicateRequest` if any entry carries a request id that is already
    /// committed, without applying anything.
    fn commit(&self, updates: &[BalanceUpdate], entries: &[LedgerEntry])
        -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    accounts: HashMap<Uuid, Account>,
    id_by_number: HashMap<String, Uuid>,
    id_by_name: HashMap<String, Uuid>,
    entries: Vec<LedgerEntry>,
    entry_by_request: HashMap<Uuid, usize>,
}

/// In-process store backing the CLI and the test suites.
///
/// A single `RwLock` over the whole book of record makes every commit
/// trivially atomic: the write lock is held across all balance updates and
/// appends of one call.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total number of committed entries across all accounts (for tests).
    pub fn entry_count(&self) -> usize {
        self.read().entries.len()
    }

    /// All entries for one account in commit order, unfiltered (for tests
    /// and statement export).
    pub fn all_entries(&self, account_id: Uuid) -> Vec<LedgerEntry> {
        self.read()
            .entries
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect()
    }
}

impl AccountStore for MemoryStore {
    fn find(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.read().accounts.get(&id).cloned())
    }

    fn find_by_number(&self, number: &str) -> Result<Option<Account>, StoreError> {
        let inner = self.read();
        Ok(inner
            .id_by_number
            .get(number)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    fn exists_by_number(&self, number: &str) -> Result<bool, StoreError> {
        Ok(self.read().id_by_number.contains_key(number))
    }

    fn insert(&self, account: Account) -> Result<(), StoreError> {
        let mut inner = self.write();

        if inner.id_by_number.contains_key(&account.number) {
            return Err(StoreError::DuplicateNumber);
        }
        if inner.id_by_name.contains_key(&account.name) {
            return Err(StoreError::DuplicateName);
        }

        inner.id_by_number.insert(account.number.clone(), account.id);
        inner.id_by_name.insert(account.name.clone(), account.id);
        inner.accounts.insert(account.id, account);
        Ok(())
    }

    fn update(&self, account: &Account) -> Result<(), StoreError> {
        let mut inner = self.write();

        let current = inner
            .accounts
            .get(&account.id)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        if account.name != current.name {
            if inner.id_by_name.contains_key(&account.name) {
                return Err(StoreError::DuplicateName);
            }
            inner.id_by_name.remove(&current.name);
            inner.id_by_name.insert(account.name.clone(), account.id);
        }

        // Number, currency, and balance are not updatable through this path.
        let stored = inner.accounts.get_mut(&account.id).expect("checked above");
        stored.name = account.name.clone();
        stored.kind = account.kind;
        stored.closed_at = account.closed_at;
        Ok(())
    }
}

impl LedgerStore for MemoryStore {
    fn list_by_account(
        &self,
        account_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Page<LedgerEntry>, StoreError> {
        let inner = self.read();

        let matching: Vec<&LedgerEntry> = inner
            .entries
            .iter()
            .filter(|e| e.account_id == account_id && filter.matches(e))
            .collect();

        let total = matching.len();
        let page = filter.page.max(1);
        let per_page = filter.per_page.max(1);
        let start = (page - 1).saturating_mul(per_page);

        let items = matching
            .into_iter()
            .skip(start)
            .take(per_page)
            .cloned()
            .collect();

        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    fn find_by_request(&self, request_id: Uuid) -> Result<Option<LedgerEntry>, StoreError> {
        let inner = self.read();
        Ok(inner
            .entry_by_request
            .get(&request_id)
            .and_then(|&idx| inner.entries.get(idx))
            .cloned())
    }
}

impl Store for MemoryStore {
    fn commit(
        &self,
        updates: &[BalanceUpdate],
        entries: &[LedgerEntry],
    ) -> Result<(), StoreError> {
        let mut inner = self.write();

        // Validate everything before touching anything, so a failed commit
        // leaves no partial write behind.
        for update in updates {
            if !inner.accounts.contains_key(&update.account_id) {
                return Err(StoreError::NotFound);
            }
        }
        for entry in entries {
            if let Some(request_id) = entry.request_id {
                if inner.entry_by_request.contains_key(&request_id) {
                    return Err(StoreError::DuplicateRequest);
                }
            }
        }

        for update in updates {
            let account = inner
                .accounts
                .get_mut(&update.account_id)
                .expect("validated above");
            account.balance = update.new_balance;
        }
        for entry in entries {
            let idx = inner.entries.len();
            if let Some(request_id) = entry.request_id {
                inner.entry_by_request.insert(request_id, idx);
            }
            inner.entries.push(entry.clone());
        }

        Ok(())
    }
}
