//! Core transaction engine.
//!
//! The sole authority for mutating account balances and appending ledger
//! entries. Every successful call leaves the replay invariant intact: for
//! any account, summing its entries in commit order from zero reproduces
//! each entry's `balance_after` and the current balance. Failed calls leave
//! state untouched.
//!
//! # Concurrency
//!
//! Calls against different accounts are fully independent. Calls against
//! the same account are serialized through a per-account lock held for the
//! validate-compute-commit path only; there is no global lock. Transfers
//! take both account locks in ascending id order so that two opposing
//! transfers cannot deadlock.

use crate::account::{self, Account, AccountKind, Currency};
use crate::allocator;
use crate::decimal::Money;
use crate::entry::{EntryKind, LedgerEntry, DESCRIPTION_MAX_LEN};
use crate::error::{LedgerError, Result};
use crate::luhn;
use crate::store::{
    AccountStore, BalanceUpdate, EntryFilter, LedgerStore, Page, Store, StoreError,
};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// The transaction engine over an abstract store.
///
/// Cheap to share: all methods take `&self`, so one engine can be wrapped in
/// an `Arc` and used from many threads at once.
pub struct TransactionEngine<S: Store> {
    store: Arc<S>,

    /// Per-account exclusion scopes, created lazily on first use.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<S: Store> TransactionEngine<S> {
    /// Creates an engine over the given store.
    pub fn new(store: Arc<S>) -> Self {
        TransactionEngine {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates a candidate account number against the Luhn checksum.
    pub fn validate_checksum(&self, number: &str) -> Result<bool> {
        luhn::validate(number)
    }

    /// Allocates a free, Luhn-valid 12-digit account number. Reads only;
    /// nothing is reserved until an account is persisted with it.
    pub fn allocate_account_number(&self) -> Result<String> {
        allocator::allocate_account_number(&*self.store)
    }

    /// Opens a new account for `owner_id`.
    ///
    /// The display name must be unique, the currency and number are fixed
    /// for the account's lifetime, and a non-zero `initial_balance` is
    /// recorded as an opening Credit entry so that replay from zero holds
    /// for every account.
    ///
    /// The allocator's uniqueness pre-check can race a concurrent open; the
    /// store's unique constraint is authoritative, and a number collision
    /// on insert earns exactly one re-allocation before giving up.
    pub fn open_account(
        &self,
        owner_id: Uuid,
        name: &str,
        kind: AccountKind,
        currency: Currency,
        initial_balance: Option<Money>,
    ) -> Result<Account> {
        let name = account::validate_name(name)?;

        let initial = initial_balance.unwrap_or(Money::ZERO);
        if initial.is_negative() {
            return Err(LedgerError::InvalidAmount(format!(
                "initial balance {} is negative",
                initial
            )));
        }

        let mut reallocated = false;
        let opened = loop {
            let number = self.allocate_account_number()?;
            let candidate = Account::new(owner_id, name.clone(), number, kind, currency);

            match self.store.insert(candidate.clone()) {
                Ok(()) => break candidate,
                Err(StoreError::DuplicateNumber) if !reallocated => {
                    warn!(
                        "Account number {} lost an allocation race, re-allocating",
                        candidate.number
                    );
                    reallocated = true;
                }
                Err(e) => return Err(e.into()),
            }
        };

        debug!(
            "Opened {} account {} ({}) for owner {}",
            opened.kind, opened.name, opened.number, owner_id
        );

        if initial.is_zero() {
            return Ok(opened);
        }

        self.apply(
            opened.id,
            owner_id,
            EntryKind::Credit,
            initial,
            Some("Opening balance"),
            None,
        )?;

        self.store
            .find(opened.id)?
            .ok_or(LedgerError::AccountNotFound)
    }

    /// Looks up an open account by its public number, scoped to `owner_id`.
    ///
    /// Missing, closed, and not-owned all answer `AccountNotFound`.
    pub fn account(&self, owner_id: Uuid, number: &str) -> Result<Account> {
        self.store
            .find_by_number(number)?
            .filter(|a| a.owner_id == owner_id && !a.is_closed())
            .ok_or(LedgerError::AccountNotFound)
    }

    /// Updates an account's mutable attributes: display name and
    /// classification. Number, currency, and balance are immutable here.
    pub fn update_account(
        &self,
        owner_id: Uuid,
        number: &str,
        new_name: Option<&str>,
        new_kind: Option<AccountKind>,
    ) -> Result<Account> {
        let mut account = self.account(owner_id, number)?;

        if let Some(name) = new_name {
            account.name = account::validate_name(name)?;
        }
        if let Some(kind) = new_kind {
            account.kind = kind;
        }

        self.store.update(&account)?;
        debug!("Updated account {}", account.number);
        Ok(account)
    }

    /// Soft-closes an account. The row and its ledger history are kept;
    /// the account stops resolving for views and transactions.
    pub fn close_account(&self, owner_id: Uuid, number: &str) -> Result<()> {
        let mut account = self.account(owner_id, number)?;

        account.closed_at = Some(chrono::Utc::now());
        self.store.update(&account)?;
        debug!("Closed account {}", account.number);
        Ok(())
    }

    /// Applies a credit or debit to an account and returns the committed
    /// ledger entry.
    ///
    /// Lifecycle per call: inputs are checked first (positive amount,
    /// bounded description, account resolves for the owner and is open);
    /// the balance is then read under the account's exclusion scope, the
    /// new balance computed, and balance + entry committed as one atomic
    /// unit. A transient commit failure is retried exactly once against a
    /// freshly re-read balance; validation failures are deterministic and
    /// mutate nothing.
    ///
    /// `request_id` is an optional idempotency key: a resubmission carrying
    /// the id of an already committed entry returns that entry instead of
    /// applying again.
    pub fn apply(
        &self,
        account_id: Uuid,
        owner_id: Uuid,
        kind: EntryKind,
        amount: Money,
        description: Option<&str>,
        request_id: Option<Uuid>,
    ) -> Result<LedgerEntry> {
        let description = validate_amount_and_description(amount, description)?;

        if let Some(rid) = request_id {
            if let Some(existing) = self.store.find_by_request(rid)? {
                debug!("Request {} already committed, returning prior entry", rid);
                return Ok(existing);
            }
        }

        let lock = self.account_lock(account_id);
        let _scope = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut retried = false;
        loop {
            // Fresh read under the exclusion scope; a retry after a failed
            // commit must not reuse a balance another call may have moved.
            let current = self
                .store
                .find(account_id)?
                .filter(|a| a.owner_id == owner_id && !a.is_closed())
                .ok_or(LedgerError::AccountNotFound)?;

            let new_balance = match kind {
                EntryKind::Credit => current.balance + amount,
                EntryKind::Debit => {
                    if amount > current.balance {
                        debug!(
                            "Debit {} rejected on account {}: balance {}",
                            amount, current.number, current.balance
                        );
                        return Err(LedgerError::InsufficientFunds);
                    }
                    current.balance - amount
                }
            };

            let entry = LedgerEntry::new(
                account_id,
                kind,
                amount,
                description.clone(),
                new_balance,
                request_id,
            );

            match self.store.commit(
                &[BalanceUpdate {
                    account_id,
                    new_balance,
                }],
                std::slice::from_ref(&entry),
            ) {
                Ok(()) => {
                    debug!(
                        "{} {} on account {}: balance {} -> {}",
                        kind, amount, current.number, current.balance, new_balance
                    );
                    return Ok(entry);
                }
                Err(StoreError::DuplicateRequest) => {
                    // A resubmission of an ambiguous earlier attempt; the
                    // original entry is the single source of truth.
                    let rid = request_id.ok_or_else(|| {
                        LedgerError::TransientStorage(
                            "store reported duplicate request without a request id".to_string(),
                        )
                    })?;
                    return self
                        .store
                        .find_by_request(rid)?
                        .ok_or_else(|| {
                            LedgerError::TransientStorage(
                                "duplicate request vanished from store".to_string(),
                            )
                        });
                }
                Err(StoreError::Unavailable(msg)) if !retried => {
                    warn!("Commit failed transiently ({}), retrying once", msg);
                    retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Moves funds between two accounts as one atomic unit: a Debit entry
    /// on the source and a Credit entry on the destination, both committed
    /// together.
    ///
    /// The caller must own the source; the destination only needs to exist
    /// and be open. Both account locks are taken in ascending id order.
    pub fn transfer(
        &self,
        source_id: Uuid,
        dest_id: Uuid,
        owner_id: Uuid,
        amount: Money,
        description: Option<&str>,
    ) -> Result<(LedgerEntry, LedgerEntry)> {
        if source_id == dest_id {
            return Err(LedgerError::SameAccount);
        }
        let description = validate_amount_and_description(amount, description)?;

        let (first, second) = if source_id < dest_id {
            (source_id, dest_id)
        } else {
            (dest_id, source_id)
        };
        let first_lock = self.account_lock(first);
        let second_lock = self.account_lock(second);
        let _outer = first_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _inner = second_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut retried = false;
        loop {
            let source = self
                .store
                .find(source_id)?
                .filter(|a| a.owner_id == owner_id && !a.is_closed())
                .ok_or(LedgerError::AccountNotFound)?;
            let dest = self
                .store
                .find(dest_id)?
                .filter(|a| !a.is_closed())
                .ok_or(LedgerError::AccountNotFound)?;

            if amount > source.balance {
                debug!(
                    "Transfer {} rejected: source {} holds {}",
                    amount, source.number, source.balance
                );
                return Err(LedgerError::InsufficientFunds);
            }

            let source_balance = source.balance - amount;
            let dest_balance = dest.balance + amount;

            let debit = LedgerEntry::new(
                source_id,
                EntryKind::Debit,
                amount,
                description.clone(),
                source_balance,
                None,
            );
            let credit = LedgerEntry::new(
                dest_id,
                EntryKind::Credit,
                amount,
                description.clone(),
                dest_balance,
                None,
            );

            match self.store.commit(
                &[
                    BalanceUpdate {
                        account_id: source_id,
                        new_balance: source_balance,
                    },
                    BalanceUpdate {
                        account_id: dest_id,
                        new_balance: dest_balance,
                    },
                ],
                &[debit.clone(), credit.clone()],
            ) {
                Ok(()) => {
                    debug!(
                        "Transferred {} from {} to {}",
                        amount, source.number, dest.number
                    );
                    return Ok((debit, credit));
                }
                Err(StoreError::Unavailable(msg)) if !retried => {
                    warn!("Transfer commit failed transiently ({}), retrying once", msg);
                    retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Lists an account's ledger entries in commit order, with optional
    /// date-range bounds and pagination.
    ///
    /// Closed accounts remain listable by their owner: soft close preserves
    /// history, and a statement for a closed account is still meaningful.
    pub fn list_entries(
        &self,
        account_id: Uuid,
        owner_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Page<LedgerEntry>> {
        let account = self
            .store
            .find(account_id)?
            .filter(|a| a.owner_id == owner_id)
            .ok_or(LedgerError::AccountNotFound)?;

        Ok(self.store.list_by_account(account.id, filter)?)
    }

    /// Returns the exclusion scope for one account, creating it on first use.
    fn account_lock(&self, account_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(account_id).or_default().clone()
    }
}

/// Shared input checks for apply and transfer: strictly positive amount,
/// description within bounds. Returns the owned description.
fn validate_amount_and_description(
    amount: Money,
    description: Option<&str>,
) -> Result<Option<String>> {
    if amount.is_zero() || amount.is_negative() {
        return Err(LedgerError::InvalidAmount(format!(
            "{} is not strictly positive",
            amount
        )));
    }

    match description {
        Some(d) if d.chars().count() > DESCRIPTION_MAX_LEN => {
            Err(LedgerError::DescriptionTooLong(DESCRIPTION_MAX_LEN))
        }
        Some(d) => Ok(Some(d.to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::replay;
    use crate::store::MemoryStore;
    use std::str::FromStr;

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn engine() -> TransactionEngine<MemoryStore> {
        TransactionEngine::new(Arc::new(MemoryStore::new()))
    }

    fn open(
        engine: &TransactionEngine<MemoryStore>,
        owner: Uuid,
        name: &str,
        initial: Option<&str>,
    ) -> Account {
        engine
            .open_account(
                owner,
                name,
                AccountKind::Personal,
                Currency::Usd,
                initial.map(money),
            )
            .unwrap()
    }

    #[test]
    fn test_open_account_allocates_luhn_number() {
        let engine = engine();
        let account = open(&engine, Uuid::new_v4(), "Checking", None);

        assert_eq!(account.number.len(), 12);
        assert!(engine.validate_checksum(&account.number).unwrap());
        assert_eq!(account.balance, Money::ZERO);
    }

    #[test]
    fn test_open_account_with_initial_balance_writes_opening_entry() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let account = open(&engine, owner, "Checking", Some("100.00"));

        assert_eq!(account.balance, money("100.00"));

        let page = engine
            .list_entries(account.id, owner, &EntryFilter::default())
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].kind, EntryKind::Credit);
        assert_eq!(page.items[0].balance_after, money("100.00"));
        assert_eq!(page.items[0].description.as_deref(), Some("Opening balance"));
    }

    #[test]
    fn test_open_account_rejects_negative_initial_balance() {
        let engine = engine();
        let result = engine.open_account(
            Uuid::new_v4(),
            "Checking",
            AccountKind::Personal,
            Currency::Usd,
            Some(money("-1.00")),
        );
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn test_open_account_rejects_duplicate_name() {
        let engine = engine();
        let owner = Uuid::new_v4();
        open(&engine, owner, "Checking", None);

        let result = engine.open_account(
            owner,
            "Checking",
            AccountKind::Business,
            Currency::Eur,
            None,
        );
        assert!(matches!(result, Err(LedgerError::DuplicateAccountName)));
    }

    #[test]
    fn test_credit_overdraft_then_exact_debit_sequence() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let account = open(&engine, owner, "Checking", Some("100.00"));

        let credit = engine
            .apply(account.id, owner, EntryKind::Credit, money("50.00"), None, None)
            .unwrap();
        assert_eq!(credit.balance_after, money("150.00"));

        let rejected = engine.apply(
            account.id,
            owner,
            EntryKind::Debit,
            money("200.00"),
            None,
            None,
        );
        assert!(matches!(rejected, Err(LedgerError::InsufficientFunds)));
        assert_eq!(
            engine.account(owner, &account.number).unwrap().balance,
            money("150.00")
        );

        let debit = engine
            .apply(account.id, owner, EntryKind::Debit, money("150.00"), None, None)
            .unwrap();
        assert_eq!(debit.balance_after, money("0.00"));
        assert_eq!(
            engine.account(owner, &account.number).unwrap().balance,
            Money::ZERO
        );
    }

    #[test]
    fn test_rejected_debit_leaves_ledger_unchanged() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let account = open(&engine, owner, "Checking", Some("10.00"));

        let result = engine.apply(
            account.id,
            owner,
            EntryKind::Debit,
            money("10.01"),
            None,
            None,
        );
        assert!(matches!(result, Err(LedgerError::InsufficientFunds)));

        let page = engine
            .list_entries(account.id, owner, &EntryFilter::default())
            .unwrap();
        assert_eq!(page.total, 1); // only the opening entry
    }

    #[test]
    fn test_apply_rejects_non_positive_amounts() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let account = open(&engine, owner, "Checking", None);

        for bad in ["0.00", "-5.00"] {
            let result = engine.apply(
                account.id,
                owner,
                EntryKind::Credit,
                money(bad),
                None,
                None,
            );
            assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
        }
        assert_eq!(engine.store().entry_count(), 0);
    }

    #[test]
    fn test_apply_rejects_oversized_description() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let account = open(&engine, owner, "Checking", None);

        let long = "x".repeat(DESCRIPTION_MAX_LEN + 1);
        let result = engine.apply(
            account.id,
            owner,
            EntryKind::Credit,
            money("1.00"),
            Some(&long),
            None,
        );
        assert!(matches!(result, Err(LedgerError::DescriptionTooLong(_))));
    }

    #[test]
    fn test_wrong_owner_is_indistinguishable_from_missing() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let account = open(&engine, owner, "Checking", Some("10.00"));

        let as_stranger = engine.apply(
            account.id,
            stranger,
            EntryKind::Credit,
            money("1.00"),
            None,
            None,
        );
        let missing = engine.apply(
            Uuid::new_v4(),
            owner,
            EntryKind::Credit,
            money("1.00"),
            None,
            None,
        );

        assert!(matches!(as_stranger, Err(LedgerError::AccountNotFound)));
        assert!(matches!(missing, Err(LedgerError::AccountNotFound)));
    }

    #[test]
    fn test_closed_account_rejects_transactions_but_keeps_history() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let account = open(&engine, owner, "Checking", Some("25.00"));

        engine.close_account(owner, &account.number).unwrap();

        let result = engine.apply(
            account.id,
            owner,
            EntryKind::Credit,
            money("1.00"),
            None,
            None,
        );
        assert!(matches!(result, Err(LedgerError::AccountNotFound)));
        assert!(matches!(
            engine.account(owner, &account.number),
            Err(LedgerError::AccountNotFound)
        ));

        // History remains listable after close
        let page = engine
            .list_entries(account.id, owner, &EntryFilter::default())
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn test_update_account_renames_and_reclassifies() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let account = open(&engine, owner, "Checking", None);

        let updated = engine
            .update_account(
                owner,
                &account.number,
                Some("Household"),
                Some(AccountKind::Business),
            )
            .unwrap();

        assert_eq!(updated.name, "Household");
        assert_eq!(updated.kind, AccountKind::Business);
        assert_eq!(updated.number, account.number);
        assert_eq!(updated.currency, Currency::Usd);
    }

    #[test]
    fn test_idempotent_apply_returns_original_entry() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let account = open(&engine, owner, "Checking", None);
        let request_id = Uuid::new_v4();

        let first = engine
            .apply(
                account.id,
                owner,
                EntryKind::Credit,
                money("10.00"),
                Some("top-up"),
                Some(request_id),
            )
            .unwrap();
        let second = engine
            .apply(
                account.id,
                owner,
                EntryKind::Credit,
                money("10.00"),
                Some("top-up"),
                Some(request_id),
            )
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(
            engine.account(owner, &account.number).unwrap().balance,
            money("10.00")
        );
        assert_eq!(engine.store().entry_count(), 1);
    }

    #[test]
    fn test_transfer_moves_funds_atomically() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let source = open(&engine, owner, "Checking", Some("100.00"));
        let dest = open(&engine, owner, "Savings", None);

        let (debit, credit) = engine
            .transfer(source.id, dest.id, owner, money("40.00"), Some("rent"))
            .unwrap();

        assert_eq!(debit.kind, EntryKind::Debit);
        assert_eq!(debit.balance_after, money("60.00"));
        assert_eq!(credit.kind, EntryKind::Credit);
        assert_eq!(credit.balance_after, money("40.00"));

        assert_eq!(
            engine.account(owner, &source.number).unwrap().balance,
            money("60.00")
        );
        assert_eq!(
            engine.account(owner, &dest.number).unwrap().balance,
            money("40.00")
        );
    }

    #[test]
    fn test_transfer_rejects_same_account_and_overdraft() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let source = open(&engine, owner, "Checking", Some("10.00"));
        let dest = open(&engine, owner, "Savings", None);

        assert!(matches!(
            engine.transfer(source.id, source.id, owner, money("1.00"), None),
            Err(LedgerError::SameAccount)
        ));
        assert!(matches!(
            engine.transfer(source.id, dest.id, owner, money("10.01"), None),
            Err(LedgerError::InsufficientFunds)
        ));
        assert_eq!(
            engine.account(owner, &source.number).unwrap().balance,
            money("10.00")
        );
    }

    #[test]
    fn test_replay_invariant_over_mixed_history() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let account = open(&engine, owner, "Checking", Some("100.00"));

        engine
            .apply(account.id, owner, EntryKind::Credit, money("7.50"), None, None)
            .unwrap();
        engine
            .apply(account.id, owner, EntryKind::Debit, money("32.25"), None, None)
            .unwrap();
        engine
            .apply(account.id, owner, EntryKind::Credit, money("0.01"), None, None)
            .unwrap();

        let entries = engine.store().all_entries(account.id);
        let balance = engine.account(owner, &account.number).unwrap().balance;

        assert_eq!(replay(&entries), balance);

        // Every prefix reproduces its entry's balance_after
        let mut running = Money::ZERO;
        for entry in &entries {
            running += entry.signed();
            assert_eq!(running, entry.balance_after);
        }
    }

    #[test]
    fn test_date_filtered_listing() {
        let engine = engine();
        let owner = Uuid::new_v4();
        let account = open(&engine, owner, "Checking", Some("5.00"));

        let all = engine
            .list_entries(
                account.id,
                owner,
                &EntryFilter {
                    from: Some(chrono::Utc::now() - chrono::Duration::minutes(5)),
                    to: Some(chrono::Utc::now() + chrono::Duration::minutes(5)),
                    ..EntryFilter::default()
                },
            )
            .unwrap();
        assert_eq!(all.total, 1);

        let none = engine
            .list_entries(
                account.id,
                owner,
                &EntryFilter {
                    to: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
                    ..EntryFilter::default()
                },
            )
            .unwrap();
        assert_eq!(none.total, 0);
    }
}
