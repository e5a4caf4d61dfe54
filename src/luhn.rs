//! Luhn checksum generation and validation for account numbers.
//!
//! Account numbers carry a Luhn check digit so that single-digit typos and
//! most transpositions made by a human presenting the number are caught
//! before any account lookup happens.

use crate::error::{LedgerError, Result};
use rand::Rng;

/// Attempt cap for the rejection-sampling loop in [`generate`].
///
/// Roughly one in ten random digit strings passes the check, so the loop
/// terminates after a handful of draws in practice; the cap turns the
/// astronomically unlikely worst case into a typed error instead of a hang.
pub const GENERATE_ATTEMPTS: u32 = 1000;

/// Validates a digit string against the Luhn checksum.
///
/// Digits are processed right to left; every second digit (starting from the
/// first digit left of the rightmost) is doubled, doubled values above 9 have
/// 9 subtracted, and the total must be divisible by 10.
///
/// Returns an `InvalidFormat` error for empty input or any non-digit
/// character.
///
/// # Examples
///
/// ```
/// assert!(bank_ledger::luhn::validate("79927398713").unwrap());
/// assert!(!bank_ledger::luhn::validate("79927398710").unwrap());
/// ```
pub fn validate(number: &str) -> Result<bool> {
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LedgerError::InvalidFormat(number.to_string()));
    }

    let mut sum = 0u32;
    let mut double = false;

    for b in number.bytes().rev() {
        let mut n = u32::from(b - b'0');
        if double {
            n *= 2;
            if n > 9 {
                n -= 9;
            }
        }
        sum += n;
        double = !double;
    }

    Ok(sum % 10 == 0)
}

/// Generates a uniformly random `length`-digit string that passes [`validate`].
///
/// Implemented as rejection sampling: draw a random digit string, keep it if
/// the checksum holds, retry otherwise. Leading zeros are legitimate; the
/// result always has exactly `length` characters.
pub fn generate(length: usize) -> Result<String> {
    if length == 0 {
        return Err(LedgerError::InvalidFormat(String::new()));
    }

    let mut rng = rand::thread_rng();

    for _ in 0..GENERATE_ATTEMPTS {
        let candidate: String = (0..length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();

        if validate(&candidate)? {
            return Ok(candidate);
        }
    }

    Err(LedgerError::AllocationExhausted(GENERATE_ATTEMPTS))
}
