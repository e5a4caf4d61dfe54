//! Error types for the ledger core.

use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in the ledger core.
///
/// Validation errors are detected before any mutation and carry no partial
/// effect. `TransientStorage` is the only retryable variant; the caller may
/// resubmit with the same request id without risking a double-apply.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Malformed checksum input (empty or non-digit characters)
    #[error("invalid checksum input: {0:?}")]
    InvalidFormat(String),

    /// Transaction amount is not a positive value with at most 2 fractional digits
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Transaction type is not Credit or Debit
    #[error("invalid transaction type: {0:?}")]
    InvalidType(String),

    /// Debit amount exceeds the current account balance
    #[error("insufficient funds for this transaction")]
    InsufficientFunds,

    /// Account does not exist, is closed, or is not owned by the caller.
    /// The three cases are deliberately indistinguishable so that callers
    /// cannot probe for the existence of other users' accounts.
    #[error("account not found or you do not have permission to access it")]
    AccountNotFound,

    /// Account-number allocation gave up after the attempt cap
    #[error("account number allocation exhausted after {0} attempts")]
    AllocationExhausted(u32),

    /// Commit I/O failed twice; the request may be resubmitted
    #[error("transient storage failure: {0}")]
    TransientStorage(String),

    /// Storage-level uniqueness violation on the account number
    #[error("account number already in use")]
    DuplicateAccountNumber,

    /// Display name collides with an existing account
    #[error("account name already in use")]
    DuplicateAccountName,

    /// Display name is empty or longer than the allowed maximum
    #[error("invalid account name: {0}")]
    InvalidAccountName(String),

    /// Account classification is not Personal or Business
    #[error("invalid account type: {0:?}")]
    InvalidAccountKind(String),

    /// Currency is outside the supported set
    #[error("unsupported currency: {0:?}")]
    UnsupportedCurrency(String),

    /// Transaction description exceeds the allowed length
    #[error("description exceeds {0} characters")]
    DescriptionTooLong(usize),

    /// Source and destination of a transfer are the same account
    #[error("cannot transfer funds within the same account")]
    SameAccount,

    /// Failed to open or read an input file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing or writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Missing input file argument
    #[error("Missing input file argument. Usage: bank-ledger <input.csv> [--statement <account-name>]")]
    MissingArgument,

    /// Statement requested for an account name absent from the input
    #[error("no account named {0:?} in the processed input")]
    UnknownStatementAccount(String),
}
