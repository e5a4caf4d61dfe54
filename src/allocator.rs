//! Account number allocation.
//!
//! Produces a 12-digit Luhn-valid number not yet assigned to any account.
//! The existence pre-check here is an optimization only; the storage-level
//! unique constraint on insert remains the authoritative guard against a
//! concurrent allocation racing this loop.

use crate::error::{LedgerError, Result};
use crate::luhn;
use crate::store::AccountStore;
use log::debug;

/// Length of every public account number.
pub const ACCOUNT_NUMBER_LEN: usize = 12;

/// Attempt cap before allocation gives up.
///
/// The number space is 10^12 with one in ten candidates checksum-valid, so
/// hitting this cap means something is badly wrong with the store, not bad
/// luck.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 1000;

/// Allocates a free, Luhn-valid 12-digit account number.
///
/// Loops generate-and-check until the store reports the candidate unused,
/// failing with `AllocationExhausted` once the attempt cap is hit. Reads
/// only; nothing is reserved until the caller persists the account.
pub fn allocate_account_number<S: AccountStore + ?Sized>(store: &S) -> Result<String> {
    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
        let number = luhn::generate(ACCOUNT_NUMBER_LEN)?;

        if !store.exists_by_number(&number)? {
            return Ok(number);
        }

        debug!(
            "Account number {} already taken (attempt {}), retrying",
            number, attempt
        );
    }

    Err(LedgerError::AllocationExhausted(MAX_ALLOCATION_ATTEMPTS))
}
