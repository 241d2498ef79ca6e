// 🧾 Core Records - Accounts, Snapshots, Transactions
// The value types that flow through extraction, filtering and reconciliation

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// ACCOUNT
// ============================================================================

/// One balance reading for a single account, as exported in a balances file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Institution/company holding the account
    pub institution: String,

    /// Sub-account label within the institution, if any
    pub account: Option<String>,

    /// checking/savings/brokerage/credit card/...
    pub account_type: String,

    /// Current balance
    pub current: f64,

    /// How much is available on the limit, if reported
    pub available: Option<f64>,

    /// Limit on the card, if reported
    pub limit: Option<f64>,

    /// Probably USD
    pub currency: String,
}

/// Account type label used for credit cards in the exports
pub const CREDIT_CARD: &str = "credit card";

impl Account {
    /// Whether this account is a liability (credit card) rather than an asset
    pub fn is_credit_card(&self) -> bool {
        self.account_type == CREDIT_CARD
    }

    /// Contribution of this account to the net total: credit card balances
    /// are owed money, so they subtract instead of add
    pub fn signed_balance(&self) -> f64 {
        if self.is_credit_card() {
            -self.current
        } else {
            self.current
        }
    }

    /// Coarse identity key: (institution, account_type, current).
    /// Only used to detect byte-identical repeated snapshots, never to
    /// distinguish accounts within one snapshot.
    pub fn coarse_key(&self) -> String {
        format!("{}|{}|{}", self.institution, self.account_type, self.current)
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// One point-in-time reading of all account balances, from one revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Ordered account rows as they appeared in the balances file(s)
    pub accounts: Vec<Account>,

    /// Authorship timestamp of the revision this snapshot came from
    pub at: DateTime<Utc>,
}

impl Snapshot {
    /// Signed total of all balances, with credit cards inverted
    pub fn net_total(&self) -> f64 {
        self.accounts.iter().map(Account::signed_balance).sum()
    }

    /// SHA-256 over the ordered coarse account keys. Two snapshots with the
    /// same signature carry the same account data, just exported again at a
    /// different time.
    pub fn signature(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for acc in &self.accounts {
            hasher.update(acc.coarse_key().as_bytes());
            hasher.update([0u8]);
        }
        hasher.finalize().into()
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// One transaction row. Positive amounts are spending, negative amounts are
/// income/deposits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Calendar date the transaction settled on
    pub on: NaiveDate,

    /// Signed amount: positive = spending, negative = income/deposit
    pub amount: f64,

    /// Merchant/description string
    pub name: String,

    /// Name of the account this transaction belongs to (matches the
    /// `account` label of some balance row, not an owning reference)
    pub account: String,

    /// Category assigned by the export (food, transfer, insurance, ...)
    pub category: String,

    /// Coarser grouping assigned from the meta-category table
    #[serde(default)]
    pub meta_category: Option<String>,
}

/// All transaction rows extracted from a single revision, in file order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionBatch {
    /// Authorship timestamp of the revision this batch came from
    pub at: DateTime<Utc>,

    /// Rows in their original intra-file order
    pub rows: Vec<Transaction>,
}

// ============================================================================
// TESTS
// ============================================================================
