// 🔍 Deduplication Engine - One transaction per real-world event
// Each export commit may re-export overlapping or corrected rows, so the
// same purchase shows up many times with drifting metadata. This engine
// folds the whole revision history, oldest first, into an accepted set:
// a new row that matches an already-accepted row within a ±3 day window
// is a re-export and gets dropped, otherwise it is accepted.

use chrono::{Duration, NaiveDate};
use log::debug;
use std::collections::{BTreeMap, HashSet};

use crate::records::{Transaction, TransactionBatch};

// ============================================================================
// DEDUP OUTCOME
// ============================================================================

/// Deduplicated transactions plus the removal count for diagnostics
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    /// One transaction per real-world event, sorted by date; same-date rows
    /// keep their acceptance order
    pub transactions: Vec<Transaction>,

    /// How many rows were dropped as re-exports of an accepted row
    pub removed: usize,
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

pub struct DeduplicationEngine {
    /// Settlement dates drift between exports; candidates are searched
    /// within ±window_days of the new row's date (default: 3)
    pub window_days: i64,

    /// Amounts above this merge on amount+account alone, no name evidence
    /// needed (default: 100.0)
    pub large_amount_threshold: f64,

    /// A common subsequence longer than this fraction of the shorter name
    /// confirms a match (default: 0.8)
    pub lcs_ratio: f64,

    /// A common subsequence longer than this many characters confirms a
    /// match outright (default: 8)
    pub lcs_min_len: usize,

    /// Case-folded placeholder labels some exports use when no merchant is
    /// known; amount+account match alone is enough evidence for these
    /// (default: "credit", "debit")
    pub generic_names: HashSet<String>,

    /// Case-folded names that only ever collapse same-day rows. Recurring
    /// same-day charges (daily parking, vending) look like re-exports
    /// across nearby days but are genuinely distinct events.
    pub force_exact: HashSet<String>,
}

impl DeduplicationEngine {
    /// Create engine with default thresholds and an empty force-exact set
    pub fn new() -> Self {
        DeduplicationEngine {
            window_days: 3,
            large_amount_threshold: 100.0,
            lcs_ratio: 0.8,
            lcs_min_len: 8,
            generic_names: ["credit", "debit"].iter().map(|s| s.to_string()).collect(),
            force_exact: HashSet::new(),
        }
    }

    /// Engine with the given force-exact names (any case)
    pub fn with_force_exact<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut engine = Self::new();
        engine.force_exact = names
            .into_iter()
            .map(|n| n.as_ref().to_lowercase())
            .collect();
        engine
    }

    /// Collapse the full multi-revision history into one transaction per
    /// real-world event.
    ///
    /// Batches must arrive oldest revision first: later revisions' edits are
    /// checked against (and absorbed by) earlier entries, never the other
    /// way around. Given the same batches in the same order the output is
    /// identical, row for row.
    pub fn deduplicate(&self, batches: &[TransactionBatch]) -> DedupOutcome {
        let mut accepted: BTreeMap<NaiveDate, Vec<Transaction>> = BTreeMap::new();
        let mut removed = 0usize;

        for batch in batches {
            for tr in &batch.rows {
                if self.find_duplicate(&accepted, tr) {
                    removed += 1;
                } else {
                    accepted.entry(tr.on).or_default().push(tr.clone());
                }
            }
        }

        let transactions: Vec<Transaction> = accepted.into_values().flatten().collect();
        DedupOutcome {
            transactions,
            removed,
        }
    }

    /// Scan the accepted set around `tr.on` for a row describing the same
    /// real-world event. Stops at the first confirmed duplicate.
    fn find_duplicate(&self, accepted: &BTreeMap<NaiveDate, Vec<Transaction>>, tr: &Transaction) -> bool {
        // recurring same-day charges must not be fuzz-matched away
        let window = if self.is_force_exact(&tr.name) {
            0
        } else {
            self.window_days
        };
        let lo = tr.on - Duration::days(window);
        let hi = tr.on + Duration::days(window);

        for candidates in accepted.range(lo..=hi).map(|(_, c)| c) {
            for candidate in candidates {
                if self.is_duplicate(candidate, tr) {
                    debug!(
                        "dropping duplicate {} {} {:.2} (matches accepted row on {})",
                        tr.on, tr.name, tr.amount, candidate.on
                    );
                    return true;
                }
            }
        }
        false
    }

    /// Decide whether accepted row `c` and new row `t` are the same
    /// real-world event: exact match, then fuzzy base gate, then three
    /// escalating heuristics. A near-miss is NOT a duplicate; the policy
    /// errs toward over-counting rather than silently losing a row.
    fn is_duplicate(&self, c: &Transaction, t: &Transaction) -> bool {
        // exact: every field equal
        if c.on == t.on
            && c.amount == t.amount
            && c.name == t.name
            && c.account == t.account
            && c.category == t.category
        {
            return true;
        }

        // force-exact names never merge across different days, in either
        // direction; keeps the outcome stable when re-run on its own output
        if c.on != t.on && (self.is_force_exact(&c.name) || self.is_force_exact(&t.name)) {
            return false;
        }

        // fuzzy base: same amount on the same account, or nothing
        if c.amount != t.amount || !c.account.eq_ignore_ascii_case(&t.account) {
            return false;
        }

        let c_name = c.name.to_lowercase();
        let t_name = t.name.to_lowercase();

        // (a) placeholder labels carry no merchant information
        if self.generic_names.contains(&c_name) || self.generic_names.contains(&t_name) {
            return true;
        }

        // (b) name similarity
        if self.names_similar(&c_name, &t_name) {
            return true;
        }

        // (c) a large one-off amount recurring within the window is a
        // re-export, not a coincidence
        t.amount.abs() > self.large_amount_threshold
    }

    /// Compare two case-folded names, both as-is and with whitespace
    /// stripped: total set containment, or a long common subsequence,
    /// confirms the names describe the same merchant.
    fn names_similar(&self, a: &str, b: &str) -> bool {
        let (a_stripped, b_stripped) = (strip_whitespace(a), strip_whitespace(b));
        let pairings = [(a, b), (a_stripped.as_str(), b_stripped.as_str())];

        for (x, y) in pairings {
            if overlap_coefficient(x, y) >= 1.0 {
                return true;
            }
            let lcs = lcs_len(x, y);
            let shorter = x.chars().count().min(y.chars().count());
            if (lcs as f64) > self.lcs_ratio * (shorter as f64) || lcs > self.lcs_min_len {
                return true;
            }
        }
        false
    }

    fn is_force_exact(&self, name: &str) -> bool {
        !self.force_exact.is_empty() && self.force_exact.contains(&name.to_lowercase())
    }
}

impl Default for DeduplicationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TEXT SIMILARITY
// ============================================================================

/// Overlap coefficient on character sets: |A ∩ B| / min(|A|, |B|).
/// 1.0 means the smaller set is entirely contained in the larger one.
/// Defined as 0.0 when either string is empty.
fn overlap_coefficient(a: &str, b: &str) -> f64 {
    let sa: HashSet<char> = a.chars().collect();
    let sb: HashSet<char> = b.chars().collect();
    let min_len = sa.len().min(sb.len());
    if min_len == 0 {
        return 0.0;
    }
    let intersection = sa.intersection(&sb).count();
    intersection as f64 / min_len as f64
}

/// Longest common subsequence length, the classic dynamic program with a
/// rolling row
fn lcs_len(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

// ============================================================================
// TESTS
// ============================================================================
