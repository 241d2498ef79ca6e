// 📉 Balance Outlier Filter - Drop snapshots taken mid-transfer
// A transfer in flight between two accounts shows the same money in both
// places, so the observed total transiently overshoots the trend. Fit a
// line through total-vs-time, standardize the residuals, and drop snapshots
// whose residual z-score overshoots the threshold on the positive side.

use crate::records::Snapshot;

// ============================================================================
// FILTER OUTCOME
// ============================================================================

/// Filtered snapshots plus the removal count for diagnostics
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// Retained snapshots, ordered by timestamp
    pub retained: Vec<Snapshot>,

    /// How many snapshots were discarded as outliers
    pub removed: usize,
}

// ============================================================================
// OUTLIER FILTER
// ============================================================================

pub struct OutlierFilter {
    /// Residual z-score above which a snapshot is discarded (default: 1.5).
    /// Only positive excursions count: an undershoot is not a double-count
    /// artifact and is kept.
    pub zscore_threshold: f64,

    /// Below this many snapshots the regression is underdetermined and the
    /// input is returned unchanged (default: 3)
    pub min_snapshots: usize,
}

impl OutlierFilter {
    /// Create filter with default thresholds
    pub fn new() -> Self {
        OutlierFilter {
            zscore_threshold: 1.5,
            min_snapshots: 3,
        }
    }

    /// Remove outlier snapshots (ones that might have been captured while
    /// transfers were happening between different accounts).
    ///
    /// Snapshots are stably sorted by timestamp before fitting, so retained
    /// snapshots always come back in chronological order.
    pub fn filter(&self, snapshots: Vec<Snapshot>) -> FilterOutcome {
        if snapshots.len() < self.min_snapshots {
            return FilterOutcome {
                retained: snapshots,
                removed: 0,
            };
        }

        let mut sorted = snapshots;
        sorted.sort_by_key(|s| s.at);

        // x: seconds since epoch, y: net total balance
        let xs: Vec<f64> = sorted.iter().map(|s| s.at.timestamp() as f64).collect();
        let ys: Vec<f64> = sorted.iter().map(Snapshot::net_total).collect();

        let Some((slope, intercept)) = least_squares(&xs, &ys) else {
            // all snapshots at the same instant; no trend to test against
            return FilterOutcome {
                retained: sorted,
                removed: 0,
            };
        };

        let residuals: Vec<f64> = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| y - (intercept + slope * x))
            .collect();

        // residual spread at floating-point noise level relative to the
        // totals means the snapshots already sit on the trend line
        let scale = ys.iter().map(|y| y.abs()).fold(1.0f64, f64::max);
        let Some(zscores) = zscores(&residuals, scale * 1e-9) else {
            // identical residuals, z-score undefined; nothing is removed
            return FilterOutcome {
                retained: sorted,
                removed: 0,
            };
        };

        let before = sorted.len();
        let retained: Vec<Snapshot> = sorted
            .into_iter()
            .zip(&zscores)
            .filter(|(_, z)| **z <= self.zscore_threshold)
            .map(|(s, _)| s)
            .collect();
        let removed = before - retained.len();

        FilterOutcome { retained, removed }
    }
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Ordinary least-squares fit of y against x. Returns (slope, intercept),
/// or `None` when x has no variance.
fn least_squares(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let var_x: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    if var_x == 0.0 {
        return None;
    }
    let cov_xy: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();

    let slope = cov_xy / var_x;
    let intercept = mean_y - slope * mean_x;
    Some((slope, intercept))
}

/// Standardize values to zero mean and unit variance (population variance).
/// Returns `None` when the values have no variance beyond `std_floor`.
fn zscores(values: &[f64], std_floor: f64) -> Option<Vec<f64>> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std <= std_floor || !std.is_finite() {
        return None;
    }
    Some(values.iter().map(|v| (v - mean) / std).collect())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Account;
    use chrono::{TimeZone, Utc};

    fn snapshot(day: u32, total: f64) -> Snapshot {
        Snapshot {
            accounts: vec![Account {
                institution: "Test Bank".to_string(),
                account: Some("Checking".to_string()),
                account_type: "checking".to_string(),
                current: total,
                available: None,
                limit: None,
                currency: "USD".to_string(),
            }],
            at: Utc.with_ymd_and_hms(2020, 1, day, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_removes_mid_transfer_spike() {
        // evenly spaced totals with a transient double-count in the middle
        let snapshots = vec![
            snapshot(1, 1000.0),
            snapshot(2, 1010.0),
            snapshot(3, 1500.0),
            snapshot(4, 1020.0),
            snapshot(5, 1030.0),
        ];

        let outcome = OutlierFilter::new().filter(snapshots);

        assert_eq!(outcome.removed, 1);
        let totals: Vec<f64> = outcome.retained.iter().map(Snapshot::net_total).collect();
        assert_eq!(totals, vec![1000.0, 1010.0, 1020.0, 1030.0]);
    }

    #[test]
    fn test_undershoot_is_kept() {
        // mirror image of the spike test; negative excursions stay
        let snapshots = vec![
            snapshot(1, 1000.0),
            snapshot(2, 1010.0),
            snapshot(3, 500.0),
            snapshot(4, 1020.0),
            snapshot(5, 1030.0),
        ];

        let outcome = OutlierFilter::new().filter(snapshots);

        assert_eq!(outcome.removed, 0);
        assert_eq!(outcome.retained.len(), 5);
    }

    #[test]
    fn test_fewer_than_three_unchanged() {
        let snapshots = vec![snapshot(2, 9999.0), snapshot(1, 1.0)];
        let outcome = OutlierFilter::new().filter(snapshots.clone());

        assert_eq!(outcome.removed, 0);
        // input comes back as-is, untouched and unsorted
        assert_eq!(outcome.retained, snapshots);
    }

    #[test]
    fn test_zero_variance_removes_nothing() {
        // perfectly linear totals leave identical (zero) residuals
        let snapshots = vec![
            snapshot(1, 1000.0),
            snapshot(2, 1010.0),
            snapshot(3, 1020.0),
            snapshot(4, 1030.0),
        ];

        let outcome = OutlierFilter::new().filter(snapshots);

        assert_eq!(outcome.removed, 0);
        assert_eq!(outcome.retained.len(), 4);
    }

    #[test]
    fn test_output_is_chronological() {
        let snapshots = vec![
            snapshot(5, 1030.0),
            snapshot(1, 1000.0),
            snapshot(4, 1020.0),
            snapshot(2, 1010.0),
            snapshot(3, 1500.0),
        ];

        let outcome = OutlierFilter::new().filter(snapshots);

        let days: Vec<u32> = outcome
            .retained
            .iter()
            .map(|s| {
                use chrono::Datelike;
                s.at.day()
            })
            .collect();
        assert_eq!(days, vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_same_instant_snapshots_kept() {
        let snapshots = vec![snapshot(1, 1000.0), snapshot(1, 2000.0), snapshot(1, 3000.0)];
        let outcome = OutlierFilter::new().filter(snapshots);
        assert_eq!(outcome.removed, 0);
        assert_eq!(outcome.retained.len(), 3);
    }

    #[test]
    fn test_least_squares_fit() {
        // y = 2x + 1
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let (slope, intercept) = least_squares(&xs, &ys).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
    }
}
