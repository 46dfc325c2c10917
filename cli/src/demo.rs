//! In-memory walkthrough: collaborators record actions, an out-of-band edit
//! alters one entry, verification pinpoints it, and a repair truncates the
//! chain back to a consistent state.

use std::sync::Arc;

use tamperlog_contracts::LedgerResult;
use tamperlog_core::{ChainEngine, ChainOptions};
use tamperlog_store::InMemoryBlockStore;
use tamperlog_verify::ChainVerifier;

use crate::render;

/// A stand-in for the services that emit audit entries. Recording is best
/// effort: the business action succeeds whether or not the entry lands.
struct FileService<'a> {
    audit: &'a ChainEngine,
}

impl FileService<'_> {
    fn upload(&self, user: &str, file: &str) {
        self.audit.record(&format!("Upload file {file} by {user}"));
    }

    fn share(&self, file: &str, with: &str) {
        self.audit.record(&format!("Share file {file} with {with}"));
    }
}

pub fn run_scenario() -> LedgerResult<()> {
    let store = Arc::new(InMemoryBlockStore::new());
    let engine = ChainEngine::new(
        Box::new(Arc::clone(&store)),
        Box::new(ChainVerifier::new()),
        ChainOptions { difficulty: 2 },
    );
    let files = FileService { audit: &engine };

    println!("[1] Initialize and record three actions");
    engine.initialize()?;
    engine.record("Login user A");
    files.upload("A", "X");
    files.share("X", "B");
    render::print_page(&engine.page(1, 10)?);

    println!();
    println!("[2] Verify the untouched chain");
    render::print_report(&engine.verify()?);

    println!();
    println!("[3] Edit block #2 directly in storage");
    store.tamper(2, |block| block.data = "Upload file Y by A".to_string())?;
    let report = engine.verify()?;
    render::print_report(&report);

    if let Some(index) = report.first_tampered_index() {
        println!();
        println!("[4] Repair from block #{index}");
        let outcome = engine.repair(index)?;
        println!("{}", outcome.message);
        render::print_report(&engine.verify()?);
    }

    println!();
    println!("[5] Rebuild from scratch");
    println!("{}", engine.rebuild()?.message);
    render::print_page(&engine.page(1, 10)?);
    Ok(())
}
