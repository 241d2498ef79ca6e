// 🕰️ Revision History - The export directory as it looked over time
// Walks the git history of the version-controlled export directory and
// yields the raw file contents of each revision, oldest first.

use chrono::{DateTime, Utc};
use git2::{Repository, Tree};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Balances exported from the aggregator
pub const BALANCES: &str = "balances.csv";
/// Manually logged accounts/cash on hand, same row shape as balances
pub const MANUAL_BALANCES: &str = "manual_balances.csv";
/// Transactions exported from the aggregator
pub const TRANSACTIONS: &str = "transactions.csv";
/// Transactions from before the aggregator existed, same row shape
pub const OLD_TRANSACTIONS: &str = "old_transactions.csv";

// ============================================================================
// RAW REVISION
// ============================================================================

/// Raw file contents of one revision of the export directory. A file that
/// did not exist in that revision is `None` (not an error).
#[derive(Debug, Clone, Default)]
pub struct RawRevision {
    /// Authorship timestamp of the revision
    pub at: DateTime<Utc>,

    pub balances: Option<String>,
    pub manual_balances: Option<String>,
    pub transactions: Option<String>,
    pub old_transactions: Option<String>,
}

impl RawRevision {
    /// Whether this revision carries no usable files at all
    pub fn is_empty(&self) -> bool {
        self.balances.is_none()
            && self.manual_balances.is_none()
            && self.transactions.is_none()
            && self.old_transactions.is_none()
    }
}

// ============================================================================
// REVISION SOURCE
// ============================================================================

/// Anything that can produce the full ordered revision history. The one
/// production implementation is [`GitHistory`]; a plain `Vec<RawRevision>`
/// also implements this, for manual one-off data and for tests.
pub trait RevisionSource {
    /// Every revision, sorted oldest first by authorship timestamp.
    /// The sort must be stable so same-timestamp revisions keep their order.
    fn revisions(&self) -> Result<Vec<RawRevision>>;
}

impl RevisionSource for Vec<RawRevision> {
    fn revisions(&self) -> Result<Vec<RawRevision>> {
        let mut revisions = self.clone();
        revisions.sort_by_key(|r| r.at);
        Ok(revisions)
    }
}

// ============================================================================
// GIT HISTORY
// ============================================================================

/// Reads revisions out of the git repository that the exports are
/// committed into.
pub struct GitHistory {
    repo_path: PathBuf,
}

impl GitHistory {
    /// Point at the export repository. The repository is opened lazily on
    /// each [`RevisionSource::revisions`] call.
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Self {
        GitHistory {
            repo_path: repo_path.as_ref().to_path_buf(),
        }
    }
}

impl RevisionSource for GitHistory {
    fn revisions(&self) -> Result<Vec<RawRevision>> {
        let repo = Repository::open(&self.repo_path)?;
        let mut walk = repo.revwalk()?;
        walk.push_head()?;

        let mut revisions = Vec::new();
        for oid in walk {
            let commit = repo.find_commit(oid?)?;
            let tree = commit.tree()?;
            let seconds = commit.author().when().seconds();
            let at = DateTime::<Utc>::from_timestamp(seconds, 0).unwrap_or_default();
            revisions.push(RawRevision {
                at,
                balances: read_tree_file(&repo, &tree, BALANCES),
                manual_balances: read_tree_file(&repo, &tree, MANUAL_BALANCES),
                transactions: read_tree_file(&repo, &tree, TRANSACTIONS),
                old_transactions: read_tree_file(&repo, &tree, OLD_TRANSACTIONS),
            });
        }

        // revwalk yields newest first; reconciliation needs oldest first
        revisions.sort_by_key(|r| r.at);
        Ok(revisions)
    }
}

/// Contents of a top-level file in the commit tree, if present
fn read_tree_file(repo: &Repository, tree: &Tree, name: &str) -> Option<String> {
    let entry = tree.get_name(name)?;
    let blob = repo.find_blob(entry.id()).ok()?;
    Some(String::from_utf8_lossy(blob.content()).into_owned())
}

// ============================================================================
// TESTS
// ============================================================================
