// Mint Recon - Core Library
// Rebuilds a clean, de-duplicated ledger from the git history of
// periodically exported balance/transaction CSVs.

pub mod records;
pub mod error;
pub mod history;
pub mod parser;
pub mod accounts;
pub mod rules;
pub mod outliers;
pub mod deduplication;
pub mod reconciliation;

// Re-export commonly used types
pub use records::{Account, Snapshot, Transaction, TransactionBatch, CREDIT_CARD};
pub use error::{ReconError, Result};
pub use history::{
    GitHistory, RawRevision, RevisionSource,
    BALANCES, MANUAL_BALANCES, OLD_TRANSACTIONS, TRANSACTIONS,
};
pub use parser::{
    batch_from_revision, extract_history, snapshot_from_revision, unique_snapshots,
    ExtractedHistory,
};
pub use accounts::{apply_renames, AccountRename, DEFAULT_ACCOUNT};
pub use rules::{apply_meta_categories, meta_categories, RewriteRule, RuleChain};
pub use outliers::{FilterOutcome, OutlierFilter};
pub use deduplication::{DedupOutcome, DeduplicationEngine};
pub use reconciliation::{reconcile, reconcile_with, Ledger, ReconcileConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
