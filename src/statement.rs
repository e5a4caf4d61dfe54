//! Account statement rendering.
//!
//! Writes a tabular CSV statement: an account header record, one record per
//! ledger entry in commit order, and a closing balance record. Presentation
//! beyond the table (PDF, HTML) is a caller concern.

use crate::account::Account;
use crate::entry::LedgerEntry;
use crate::error::Result;
use std::io::Write;

/// Writes a statement for `account` covering `entries` (commit order).
pub fn write_statement<W: Write>(
    account: &Account,
    entries: &[LedgerEntry],
    writer: W,
) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(writer);

    csv_writer.write_record([
        "account".to_string(),
        account.name.clone(),
        account.number.clone(),
        account.currency.to_string(),
        account.kind.to_string(),
    ])?;

    csv_writer.write_record(["date", "type", "amount", "description", "balance_after"])?;

    for entry in entries {
        csv_writer.write_record([
            entry.created_at.to_rfc3339(),
            entry.kind.to_string(),
            entry.amount.to_string(),
            entry.description.clone().unwrap_or_default(),
            entry.balance_after.to_string(),
        ])?;
    }

    csv_writer.write_record(["closing_balance".to_string(), account.balance.to_string()])?;

    csv_writer.flush()?;
    Ok(())
}
