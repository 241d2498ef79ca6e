// 🏦 Account Cleanup - Fix messy account metadata from the exports
// Aggregators rename institutions and sub-accounts between exports; the
// rename table maps each observed (institution, account, account_type)
// triple to the labels the rest of the pipeline should see.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::records::{Account, Snapshot, TransactionBatch};

/// Label given to transactions whose account can't be resolved against any
/// retained snapshot, so downstream aggregation is never silently missing
/// rows
pub const DEFAULT_ACCOUNT: &str = "<NO ACCOUNT>";

// ============================================================================
// RENAME TABLE
// ============================================================================

/// One rename: replace the from-triple's labels wherever it appears
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRename {
    pub from_institution: String,
    pub from_account: String,
    pub from_account_type: String,
    pub to_institution: String,
    pub to_account: String,
    pub to_account_type: String,
}

/// Apply the rename table to snapshot account rows (matched on the full
/// triple) and to transaction account references (matched on the account
/// label alone). Balance figures are untouched.
pub fn apply_renames(
    snapshots: &mut [Snapshot],
    batches: &mut [TransactionBatch],
    renames: &[AccountRename],
) {
    if renames.is_empty() {
        return;
    }

    // O(1) lookup on the non-nullable fields
    let by_triple: HashMap<(&str, &str, &str), &AccountRename> = renames
        .iter()
        .map(|r| {
            (
                (
                    r.from_institution.as_str(),
                    r.from_account.as_str(),
                    r.from_account_type.as_str(),
                ),
                r,
            )
        })
        .collect();
    let by_account: HashMap<&str, &str> = renames
        .iter()
        .map(|r| (r.from_account.as_str(), r.to_account.as_str()))
        .collect();

    for snapshot in snapshots.iter_mut() {
        for acc in snapshot.accounts.iter_mut() {
            let key = (
                acc.institution.as_str(),
                acc.account.as_deref().unwrap_or(""),
                acc.account_type.as_str(),
            );
            if let Some(rename) = by_triple.get(&key) {
                *acc = Account {
                    institution: rename.to_institution.clone(),
                    account: Some(rename.to_account.clone()),
                    account_type: rename.to_account_type.clone(),
                    ..acc.clone()
                };
            }
        }
    }

    for batch in batches.iter_mut() {
        for tr in batch.rows.iter_mut() {
            if let Some(to) = by_account.get(tr.account.as_str()) {
                tr.account = to.to_string();
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Transaction;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn rename() -> AccountRename {
        AccountRename {
            from_institution: "BANK OF WHATEVER NA".to_string(),
            from_account: "CHK 1234".to_string(),
            from_account_type: "checking".to_string(),
            to_institution: "Bank of Whatever".to_string(),
            to_account: "Checking".to_string(),
            to_account_type: "checking".to_string(),
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            accounts: vec![Account {
                institution: "BANK OF WHATEVER NA".to_string(),
                account: Some("CHK 1234".to_string()),
                account_type: "checking".to_string(),
                current: 500.0,
                available: None,
                limit: None,
                currency: "USD".to_string(),
            }],
            at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn batch() -> TransactionBatch {
        TransactionBatch {
            at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            rows: vec![Transaction {
                on: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                amount: 5.0,
                name: "Coffee".to_string(),
                account: "CHK 1234".to_string(),
                category: "Coffee Shops".to_string(),
                meta_category: None,
            }],
        }
    }

    #[test]
    fn test_snapshot_account_renamed() {
        let mut snapshots = vec![snapshot()];
        let mut batches = vec![];
        apply_renames(&mut snapshots, &mut batches, &[rename()]);

        let acc = &snapshots[0].accounts[0];
        assert_eq!(acc.institution, "Bank of Whatever");
        assert_eq!(acc.account.as_deref(), Some("Checking"));
        // balance figures are untouched
        assert_eq!(acc.current, 500.0);
    }

    #[test]
    fn test_transaction_account_renamed() {
        let mut snapshots = vec![];
        let mut batches = vec![batch()];
        apply_renames(&mut snapshots, &mut batches, &[rename()]);

        assert_eq!(batches[0].rows[0].account, "Checking");
    }

    #[test]
    fn test_non_matching_triple_untouched() {
        let mut snapshots = vec![snapshot()];
        snapshots[0].accounts[0].account_type = "savings".to_string();
        let mut batches = vec![];
        apply_renames(&mut snapshots, &mut batches, &[rename()]);

        // triple didn't match (type differs), labels stay as exported
        assert_eq!(snapshots[0].accounts[0].institution, "BANK OF WHATEVER NA");
    }
}
