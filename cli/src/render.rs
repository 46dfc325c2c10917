//! Plain-text rendering of pages and reports. Hashes are shortened here and
//! only here; the engine always deals in full digests.

use tamperlog_contracts::{block::truncate_hash, IntegrityReport, Page};

const LIST_HASH_LEN: usize = 15;
const REPORT_HASH_LEN: usize = 30;

pub fn print_page(page: &Page) {
    println!(
        "Page {}/{} ({} blocks total)",
        page.page_number,
        page.total_pages.max(1),
        page.total_count
    );
    println!(
        "{:>6}  {:<30}  {:<17}  {:<17}  DATA",
        "INDEX", "TIMESTAMP", "HASH", "PREVIOUS"
    );
    for block in &page.items {
        println!(
            "{:>6}  {:<30}  {:<17}  {:<17}  {}",
            block.index,
            block.timestamp.format("%Y-%m-%d %H:%M:%S%.3f UTC"),
            format!("{}...", truncate_hash(&block.hash, LIST_HASH_LEN)),
            format!("{}...", truncate_hash(&block.previous_hash, LIST_HASH_LEN)),
            block.data
        );
    }
    if page.items.is_empty() {
        println!("  (no blocks on this page)");
    }
}

pub fn print_report(report: &IntegrityReport) {
    println!("{} — {} blocks scanned", report.message, report.total_blocks);
    if report.valid {
        return;
    }

    println!("Tampered blocks ({}):", report.tampered_count);
    for anomaly in &report.tampered_blocks {
        println!();
        println!("  Block #{}  [{}]", anomaly.index, anomaly.kind);
        println!("    {}", anomaly.description);
        println!("    data:         {}", anomaly.data);
        if let Some(timestamp) = anomaly.timestamp {
            println!("    timestamp:    {timestamp}");
        }
        println!(
            "    stored:       {}...",
            truncate_hash(&anomaly.stored_hash, REPORT_HASH_LEN)
        );
        println!(
            "    recalculated: {}...",
            truncate_hash(&anomaly.recalculated_hash, REPORT_HASH_LEN)
        );
    }
}
