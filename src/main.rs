use anyhow::{Context, Result};
use std::env;

use mint_recon::{GitHistory, Ledger, ReconcileConfig, Snapshot};
use mint_recon::reconcile;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    // data directory from argv, falling back to the environment
    let data_dir = match args.get(1) {
        Some(dir) => dir.clone(),
        None => env::var("MINT_DATA")
            .context("pass the export repository path or set MINT_DATA")?,
    };

    // optional config file as the second argument
    let config = match args.get(2) {
        Some(path) => ReconcileConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => ReconcileConfig::default(),
    };

    println!("📂 Reconciling export history in {}...", data_dir);

    let history = GitHistory::new(&data_dir);
    let ledger = reconcile(&history, &config)?;

    print_summary(&ledger);

    Ok(())
}

fn print_summary(ledger: &Ledger) {
    println!(
        "✓ {} snapshots retained ({} outliers removed)",
        ledger.snapshots.len(),
        ledger.snapshots_removed
    );
    println!(
        "✓ {} transactions ({} duplicates removed, {} dropped by rules)",
        ledger.transactions.len(),
        ledger.duplicates_removed,
        ledger.dropped_by_rules
    );
    if ledger.skipped_batches > 0 {
        println!("⚠️  {} revision batches skipped as malformed", ledger.skipped_batches);
    }
    if ledger.defaulted_accounts > 0 {
        println!(
            "⚠️  {} transactions tagged with the default account",
            ledger.defaulted_accounts
        );
    }

    let Some(snapshot) = ledger.latest_snapshot() else {
        return;
    };
    print_accounts(snapshot);
}

fn print_accounts(snapshot: &Snapshot) {
    println!("\n💰 Accounts as of {}", snapshot.at);

    let mut assets: Vec<_> = snapshot
        .accounts
        .iter()
        .filter(|a| !a.is_credit_card())
        .collect();
    assets.sort_by(|a, b| b.current.total_cmp(&a.current));
    for acc in &assets {
        println!(
            "  {:30} {:>12.2} {}",
            acc.account.as_deref().unwrap_or(&acc.institution),
            acc.current,
            acc.currency
        );
    }
    let total: f64 = assets.iter().map(|a| a.current).sum();
    println!("  Total Balance: {:.2}", total);

    let cards: Vec<_> = snapshot
        .accounts
        .iter()
        .filter(|a| a.is_credit_card())
        .collect();
    if !cards.is_empty() {
        println!("\n💳 Credit Cards");
        for acc in &cards {
            println!(
                "  {:30} {:>12.2} {}",
                acc.account.as_deref().unwrap_or(&acc.institution),
                acc.current,
                acc.currency
            );
        }
        let usage: f64 = cards.iter().map(|a| a.current).sum();
        println!("  Credit Card Usage: {:.2}", usage);
    }
}
