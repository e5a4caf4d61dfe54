//! CSV command processing for the CLI.
//!
//! Reads banking commands one row at a time and drives the engine with
//! them. Invalid rows are logged at warn level and skipped; a bad row never
//! aborts the batch. All commands run as a single principal, passed in
//! explicitly at construction.
//!
//! Input columns: `op,account,to,kind,currency,amount,description`
//!
//! - `open,<name>,,Personal|Business,<currency>,[initial],` — open an account
//! - `credit,<name>,,,,<amount>,[description]` — credit funds
//! - `debit,<name>,,,,<amount>,[description]` — debit funds
//! - `transfer,<source>,<dest>,,,<amount>,[description]` — move funds

use crate::account::{Account, AccountKind, Currency};
use crate::decimal::Money;
use crate::engine::TransactionEngine;
use crate::entry::EntryKind;
use crate::error::{LedgerError, Result};
use crate::statement;
use crate::store::{AccountStore, EntryFilter, Store};
use csv::{ReaderBuilder, Trim};
use log::warn;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::str::FromStr;
use uuid::Uuid;

/// Raw command row as read from CSV.
///
/// Columns beyond `op` and `account` are optional; which ones are required
/// depends on the operation.
#[derive(Debug, serde::Deserialize)]
pub struct CommandRecord {
    /// Operation: open, credit, debit, transfer
    pub op: String,

    /// Account display name (source account for transfers)
    pub account: String,

    /// Destination account name (transfers only)
    #[serde(default)]
    pub to: Option<String>,

    /// Personal or Business (open only)
    #[serde(default)]
    pub kind: Option<String>,

    /// Currency code (open only)
    #[serde(default)]
    pub currency: Option<String>,

    /// Monetary amount (initial balance for open, movement otherwise)
    #[serde(default)]
    pub amount: Option<String>,

    /// Optional memo
    #[serde(default)]
    pub description: Option<String>,
}

/// A parsed command ready to run.
#[derive(Debug, Clone)]
pub enum Command {
    Open {
        name: String,
        kind: AccountKind,
        currency: Currency,
        initial: Option<Money>,
    },
    Credit {
        name: String,
        amount: Money,
        description: Option<String>,
    },
    Debit {
        name: String,
        amount: Money,
        description: Option<String>,
    },
    Transfer {
        from: String,
        to: String,
        amount: Money,
        description: Option<String>,
    },
}

impl CommandRecord {
    /// Parses the raw row into a typed command.
    pub fn parse(&self) -> Result<Command> {
        let op = self.op.trim().to_lowercase();
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        match op.as_str() {
            "open" => {
                let kind = self
                    .kind
                    .as_deref()
                    .ok_or_else(|| LedgerError::InvalidAccountKind("missing".to_string()))?
                    .parse::<AccountKind>()?;
                let currency = self
                    .currency
                    .as_deref()
                    .ok_or_else(|| LedgerError::UnsupportedCurrency("missing".to_string()))?
                    .parse::<Currency>()?;
                let initial = match self.amount_str() {
                    Some(s) => Some(Money::from_str(s)?),
                    None => None,
                };
                Ok(Command::Open {
                    name: self.account.clone(),
                    kind,
                    currency,
                    initial,
                })
            }
            "credit" => Ok(Command::Credit {
                name: self.account.clone(),
                amount: self.required_amount()?,
                description,
            }),
            "debit" => Ok(Command::Debit {
                name: self.account.clone(),
                amount: self.required_amount()?,
                description,
            }),
            "transfer" => {
                let to = self
                    .to
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        LedgerError::InvalidAccountName("missing transfer destination".to_string())
                    })?;
                Ok(Command::Transfer {
                    from: self.account.clone(),
                    to: to.to_string(),
                    amount: self.required_amount()?,
                    description,
                })
            }
            other => Err(LedgerError::InvalidType(other.to_string())),
        }
    }

    fn amount_str(&self) -> Option<&str> {
        self.amount
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn required_amount(&self) -> Result<Money> {
        let s = self
            .amount_str()
            .ok_or_else(|| LedgerError::InvalidAmount("missing amount".to_string()))?;
        Money::from_str(s)
    }
}

/// Runs CSV command batches against a transaction engine.
///
/// Tracks the accounts opened by this batch under their display names so
/// later rows can reference them.
pub struct BatchProcessor<S: Store> {
    engine: TransactionEngine<S>,
    owner_id: Uuid,
    accounts: HashMap<String, Uuid>,
}

impl<S: Store> BatchProcessor<S> {
    pub fn new(engine: TransactionEngine<S>, owner_id: Uuid) -> Self {
        BatchProcessor {
            engine,
            owner_id,
            accounts: HashMap::new(),
        }
    }

    /// The engine driven by this batch.
    pub fn engine(&self) -> &TransactionEngine<S> {
        &self.engine
    }

    /// Processes commands from a CSV reader in streaming fashion.
    ///
    /// Records are read one at a time; invalid records are logged at warn
    /// level and skipped.
    pub fn process_csv<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        for (row_idx, result) in csv_reader.deserialize::<CommandRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            match result {
                Ok(record) => match record.parse() {
                    Ok(command) => {
                        if let Err(e) = self.run(command) {
                            warn!("Row {}: {}", row_num, e);
                        }
                    }
                    Err(e) => warn!("Row {}: {}", row_num, e),
                },
                Err(e) => warn!("Row {}: CSV parse error: {}", row_num, e),
            }
        }

        Ok(())
    }

    /// Runs a single command against the engine.
    pub fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Open {
                name,
                kind,
                currency,
                initial,
            } => {
                let account =
                    self.engine
                        .open_account(self.owner_id, &name, kind, currency, initial)?;
                self.accounts.insert(account.name.clone(), account.id);
            }
            Command::Credit {
                name,
                amount,
                description,
            } => {
                let id = self.resolve(&name)?;
                self.engine.apply(
                    id,
                    self.owner_id,
                    EntryKind::Credit,
                    amount,
                    description.as_deref(),
                    None,
                )?;
            }
            Command::Debit {
                name,
                amount,
                description,
            } => {
                let id = self.resolve(&name)?;
                self.engine.apply(
                    id,
                    self.owner_id,
                    EntryKind::Debit,
                    amount,
                    description.as_deref(),
                    None,
                )?;
            }
            Command::Transfer {
                from,
                to,
                amount,
                description,
            } => {
                let source = self.resolve(&from)?;
                let dest = self.resolve(&to)?;
                self.engine
                    .transfer(source, dest, self.owner_id, amount, description.as_deref())?;
            }
        }

        Ok(())
    }

    /// Writes final account states to CSV, sorted by name for deterministic
    /// output.
    pub fn write_accounts<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["account", "number", "kind", "currency", "balance"])?;

        let mut names: Vec<&String> = self.accounts.keys().collect();
        names.sort();

        for name in names {
            let account = self.fetch(self.accounts[name])?;
            csv_writer.write_record([
                account.name.clone(),
                account.number.clone(),
                account.kind.to_string(),
                account.currency.to_string(),
                account.balance.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Writes a full statement for the named account.
    pub fn write_statement<W: Write>(&self, name: &str, writer: W) -> Result<()> {
        let id = *self
            .accounts
            .get(name)
            .ok_or_else(|| LedgerError::UnknownStatementAccount(name.to_string()))?;
        let account = self.fetch(id)?;

        let mut entries = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.engine.list_entries(
                id,
                self.owner_id,
                &EntryFilter {
                    page,
                    per_page: 100,
                    ..EntryFilter::default()
                },
            )?;
            let done = entries.len() + batch.items.len() >= batch.total;
            entries.extend(batch.items);
            if done {
                break;
            }
            page += 1;
        }

        statement::write_statement(&account, &entries, writer)
    }

    fn resolve(&self, name: &str) -> Result<Uuid> {
        self.accounts
            .get(name)
            .copied()
            .ok_or(LedgerError::AccountNotFound)
    }

    fn fetch(&self, id: Uuid) -> Result<Account> {
        Ok(self
            .engine
            .store()
            .find(id)?
            .ok_or(LedgerError::AccountNotFound)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::io::Cursor;
    use std::sync::Arc;

    fn process(csv: &str) -> BatchProcessor<MemoryStore> {
        let engine = TransactionEngine::new(Arc::new(MemoryStore::new()));
        let mut batch = BatchProcessor::new(engine, Uuid::new_v4());
        batch.process_csv(Cursor::new(csv)).unwrap();
        batch
    }

    fn output(batch: &BatchProcessor<MemoryStore>) -> String {
        let mut out = Vec::new();
        batch.write_accounts(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_open_credit_debit_flow() {
        let csv = "\
op,account,to,kind,currency,amount,description
open,Checking,,Personal,USD,100.00,
credit,Checking,,,,50.00,salary
debit,Checking,,,,25.50,groceries";

        let batch = process(csv);
        let out = output(&batch);

        assert!(out.starts_with("account,number,kind,currency,balance"));
        assert!(out.contains("Checking,"));
        assert!(out.contains(",Personal,USD,124.50"));
    }

    #[test]
    fn test_transfer_between_accounts() {
        let csv = "\
op,account,to,kind,currency,amount,description
open,Checking,,Personal,USD,100.00,
open,Savings,,Personal,USD,,
transfer,Checking,Savings,,,40.00,stash";

        let batch = process(csv);
        let out = output(&batch);

        assert!(out.contains(",Personal,USD,60.00"));
        assert!(out.contains(",Personal,USD,40.00"));
    }

    #[test]
    fn test_bad_rows_are_skipped_not_fatal() {
        let csv = "\
op,account,to,kind,currency,amount,description
open,Checking,,Personal,USD,10.00,
frobnicate,Checking,,,,1.00,
credit,Missing,,,,1.00,
debit,Checking,,,,99.00,
credit,Checking,,,,not-a-number,
credit,Checking,,,,5.00,";

        let batch = process(csv);
        let out = output(&batch);

        // Only the valid open and final credit take effect
        assert!(out.contains(",Personal,USD,15.00"));
    }

    #[test]
    fn test_statement_output() {
        let csv = "\
op,account,to,kind,currency,amount,description
open,Checking,,Personal,USD,100.00,
debit,Checking,,,,30.00,rent";

        let batch = process(csv);
        let mut out = Vec::new();
        batch.write_statement("Checking", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("account,Checking,"));
        assert!(text.contains("Credit,100.00,Opening balance,100.00"));
        assert!(text.contains("Debit,30.00,rent,70.00"));
        assert!(text.ends_with("closing_balance,70.00\n"));
    }

    #[test]
    fn test_statement_for_unknown_account() {
        let batch = process("op,account,to,kind,currency,amount,description\n");
        let mut out = Vec::new();
        assert!(matches!(
            batch.write_statement("Nowhere", &mut out),
            Err(LedgerError::UnknownStatementAccount(_))
        ));
    }
}
