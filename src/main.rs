//! Bank Ledger CLI
//!
//! Processes a CSV of banking commands (open/credit/debit/transfer) and
//! outputs either final account states or a single account's statement.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv > accounts.csv
//! cargo run -- commands.csv --statement Checking > statement.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity

use bank_ledger::{BatchProcessor, LedgerError, MemoryStore, Result, TransactionEngine};
use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;
use std::sync::Arc;
use uuid::Uuid;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(LedgerError::MissingArgument);
    }

    let input_path = &args[1];
    let statement_account = match args.get(2).map(String::as_str) {
        Some("--statement") => {
            Some(args.get(3).cloned().ok_or(LedgerError::MissingArgument)?)
        }
        Some(_) => return Err(LedgerError::MissingArgument),
        None => None,
    };

    let file = File::open(input_path)?;
    let reader = BufReader::new(file);

    let engine = TransactionEngine::new(Arc::new(MemoryStore::new()));
    let mut batch = BatchProcessor::new(engine, Uuid::new_v4());
    batch.process_csv(reader)?;

    let stdout = io::stdout();
    let handle = stdout.lock();
    match statement_account {
        Some(name) => batch.write_statement(&name, handle)?,
        None => batch.write_accounts(handle)?,
    }

    Ok(())
}
