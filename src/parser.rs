// 📑 Raw Record Extractor - Revision CSVs into typed records
// One Snapshot and one TransactionBatch per revision, at most. Revisions
// whose files fail to parse are skipped with a warning; the run only fails
// when the entire history yields nothing usable.

use chrono::{DateTime, NaiveDate, Utc};
use csv::{ReaderBuilder, StringRecord};
use log::warn;
use std::collections::HashSet;

use crate::error::{ReconError, Result};
use crate::history::{RawRevision, RevisionSource};
use crate::records::{Account, Snapshot, Transaction, TransactionBatch};

// ============================================================================
// EXTRACTED HISTORY
// ============================================================================

/// Everything the history yielded, ready for the two filters
#[derive(Debug, Clone)]
pub struct ExtractedHistory {
    /// Unique snapshots, oldest first. Revisions that re-exported identical
    /// account data collapse into the earliest occurrence.
    pub snapshots: Vec<Snapshot>,

    /// Transaction batches, oldest revision first, rows in file order
    pub batches: Vec<TransactionBatch>,

    /// Revision batches dropped because a row failed to parse
    pub skipped_batches: usize,
}

/// Walk the whole history and extract every snapshot and transaction batch.
///
/// Skip-and-continue policy: a malformed revision batch is logged and
/// dropped, but the run keeps going as long as at least one revision is
/// usable. If nothing is usable the first parse error (or `MissingSource`)
/// propagates to the caller.
pub fn extract_history(source: &impl RevisionSource) -> Result<ExtractedHistory> {
    let revisions = source.revisions()?;

    let mut snapshots: Vec<Snapshot> = Vec::new();
    let mut batches: Vec<TransactionBatch> = Vec::new();
    let mut skipped_batches = 0usize;
    let mut first_error: Option<ReconError> = None;

    for rev in &revisions {
        match snapshot_from_revision(rev) {
            Ok(Some(snapshot)) => snapshots.push(snapshot),
            Ok(None) => {}
            Err(err) => {
                warn!("skipping balances from revision at {}: {}", rev.at, err);
                skipped_batches += 1;
                first_error.get_or_insert(err);
            }
        }
        match batch_from_revision(rev) {
            Ok(Some(batch)) => batches.push(batch),
            Ok(None) => {}
            Err(err) => {
                warn!("skipping transactions from revision at {}: {}", rev.at, err);
                skipped_batches += 1;
                first_error.get_or_insert(err);
            }
        }
    }

    if snapshots.is_empty() && batches.is_empty() {
        return Err(first_error.unwrap_or(ReconError::MissingSource));
    }

    Ok(ExtractedHistory {
        snapshots: unique_snapshots(snapshots),
        batches,
        skipped_batches,
    })
}

/// Remove snapshots which have the same account data but at different times.
/// Input is sorted (stably) by timestamp first, so the earliest export of
/// each distinct reading survives.
pub fn unique_snapshots(mut snapshots: Vec<Snapshot>) -> Vec<Snapshot> {
    snapshots.sort_by_key(|s| s.at);
    let mut emitted: HashSet<[u8; 32]> = HashSet::new();
    snapshots.retain(|s| emitted.insert(s.signature()));
    snapshots
}

// ============================================================================
// BALANCES
// ============================================================================

/// Build the snapshot for one revision from its balances file plus any
/// manually logged balances. `None` when the revision has no balance rows.
pub fn snapshot_from_revision(rev: &RawRevision) -> Result<Option<Snapshot>> {
    let mut accounts: Vec<Account> = Vec::new();
    for contents in [rev.balances.as_deref(), rev.manual_balances.as_deref()]
        .into_iter()
        .flatten()
    {
        parse_balance_rows(contents, rev.at, &mut accounts)?;
    }
    if accounts.is_empty() {
        return Ok(None);
    }
    Ok(Some(Snapshot {
        accounts,
        at: rev.at,
    }))
}

fn parse_balance_rows(contents: &str, at: DateTime<Utc>, out: &mut Vec<Account>) -> Result<()> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(contents.as_bytes());
    for record in reader.records() {
        let record = record?;
        out.push(parse_account_row(&record, at)?);
    }
    Ok(())
}

/// Columns: institution, sub-account, account_type, current, available,
/// limit, currency
fn parse_account_row(record: &StringRecord, at: DateTime<Utc>) -> Result<Account> {
    let current_raw = field(record, 3, "current", at)?;
    let current: f64 = current_raw
        .trim()
        .parse()
        .map_err(|_| ReconError::malformed(at, "current", current_raw))?;

    Ok(Account {
        institution: field(record, 0, "institution", at)?.to_string(),
        account: none_if_empty(field(record, 1, "account", at)?),
        account_type: field(record, 2, "account_type", at)?.to_string(),
        current,
        // available/limit are frequently blank or junk in real exports;
        // anything non-numeric is treated as absent
        available: lenient_float(field(record, 4, "available", at)?),
        limit: lenient_float(field(record, 5, "limit", at)?),
        currency: match field(record, 6, "currency", at)?.trim() {
            "" => "USD".to_string(),
            c => c.to_string(),
        },
    })
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Build the transaction batch for one revision: the main transactions file
/// followed by the legacy old_transactions file, both with a header row.
/// `None` when the revision has no transaction rows.
pub fn batch_from_revision(rev: &RawRevision) -> Result<Option<TransactionBatch>> {
    let mut rows: Vec<Transaction> = Vec::new();
    for contents in [rev.transactions.as_deref(), rev.old_transactions.as_deref()]
        .into_iter()
        .flatten()
    {
        parse_transaction_rows(contents, rev.at, &mut rows)?;
    }
    if rows.is_empty() {
        return Ok(None);
    }
    Ok(Some(TransactionBatch { at: rev.at, rows }))
}

fn parse_transaction_rows(
    contents: &str,
    at: DateTime<Utc>,
    out: &mut Vec<Transaction>,
) -> Result<()> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(contents.as_bytes());
    for record in reader.records() {
        let record = record?;
        out.push(parse_transaction_row(&record, at)?);
    }
    Ok(())
}

/// Columns: date (YYYY-M-D), amount, name, account, category
fn parse_transaction_row(record: &StringRecord, at: DateTime<Utc>) -> Result<Transaction> {
    let date_raw = field(record, 0, "date", at)?;
    let on: NaiveDate = NaiveDate::parse_from_str(date_raw.trim(), "%Y-%m-%d")
        .map_err(|_| ReconError::malformed(at, "date", date_raw))?;

    let amount_raw = field(record, 1, "amount", at)?;
    let amount: f64 = amount_raw
        .trim()
        .parse()
        .map_err(|_| ReconError::malformed(at, "amount", amount_raw))?;

    Ok(Transaction {
        on,
        amount,
        name: field(record, 2, "name", at)?.to_string(),
        account: field(record, 3, "account", at)?.to_string(),
        category: field(record, 4, "category", at)?.to_string(),
        meta_category: None,
    })
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

fn field<'r>(
    record: &'r StringRecord,
    idx: usize,
    name: &'static str,
    at: DateTime<Utc>,
) -> Result<&'r str> {
    record
        .get(idx)
        .ok_or_else(|| ReconError::malformed(at, name, "<missing column>"))
}

fn none_if_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn lenient_float(s: &str) -> Option<f64> {
    s.trim().parse().ok()
}

// ============================================================================
// TESTS
// ============================================================================
