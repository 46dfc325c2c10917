//! tamperlog — operator CLI for the tamper-evident audit chain.
//!
//! Usage:
//!   tamperlog init
//!   tamperlog record "User alice logged in"
//!   tamperlog list --page 2
//!   tamperlog verify
//!   tamperlog repair 5
//!   tamperlog rebuild --yes
//!   tamperlog export chain.json
//!   tamperlog check-export chain.json
//!   tamperlog demo
//!
//! The store is taken from `--config` (TOML), or from `--store` (a JSON Lines
//! file, default `tamperlog.jsonl`).

mod demo;
mod render;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tamperlog_config::LedgerConfig;
use tamperlog_contracts::{ChainExport, LedgerError, LedgerResult};
use tamperlog_core::{suggests_rebuild, ChainEngine};
use tamperlog_verify::ChainVerifier;

/// Default chain file when neither `--config` nor `--store` is given.
const DEFAULT_STORE: &str = "tamperlog.jsonl";

// ── CLI definition ────────────────────────────────────────────────────────────

/// tamperlog — append-only, hash-chained audit log.
///
/// Records security-relevant actions, proves whether the history was altered,
/// and recovers a consistent log after tampering is found.
#[derive(Parser)]
#[command(
    name = "tamperlog",
    about = "Tamper-evident audit chain",
    long_about = "Operator tooling for the tamperlog audit chain: list entries,\n\
                  verify integrity, and repair or rebuild after tampering."
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON Lines chain file. Overrides the configured storage.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the genesis block if the chain is empty.
    Init,
    /// Append an entry describing an audited action.
    Record {
        /// Free-text description of the action.
        text: String,
    },
    /// List entries page by page.
    List {
        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: u64,
        /// Entries per page. Defaults to the configured page size.
        #[arg(long)]
        size: Option<u64>,
    },
    /// Re-walk the whole chain and report every anomaly.
    Verify {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
        /// Stop at the first anomaly and only print VALID / INVALID.
        #[arg(long, conflicts_with = "json")]
        quick: bool,
    },
    /// Delete the block at INDEX and every block after it.
    Repair {
        index: u64,
    },
    /// Delete the whole chain and start over from a fresh genesis block.
    Rebuild {
        /// Confirm the irreversible deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Write a sealed JSON export of the chain.
    Export {
        file: PathBuf,
    },
    /// Verify a previously exported chain offline.
    CheckExport {
        file: PathBuf,
    },
    /// Run the record / tamper / detect / repair walkthrough in memory.
    Demo,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=info (or debug) for engine logs.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

/// Run one command and return the process exit code.
fn run(cli: Cli) -> LedgerResult<i32> {
    let open = || -> LedgerResult<(LedgerConfig, ChainEngine)> {
        let config = load_config(cli.config.as_deref(), cli.store.clone())?;
        let engine = config.build_engine()?;
        Ok((config, engine))
    };

    match cli.command {
        Command::Init => {
            let (_, engine) = open()?;
            match engine.initialize()? {
                Some(genesis) => println!("Created genesis block {}", genesis.short_hash(16)),
                None => println!("Chain already initialized ({} blocks)", engine.len()?),
            }
            Ok(0)
        }
        Command::Record { text } => {
            let (_, engine) = open()?;
            let block = engine.append(&text)?;
            println!("Recorded block #{} {}", block.index, block.short_hash(16));
            Ok(0)
        }
        Command::List { page, size } => {
            let (config, engine) = open()?;
            let size = size.unwrap_or(config.operator.page_size);
            render::print_page(&engine.page(page, size)?);
            Ok(0)
        }
        Command::Verify { json, quick } => {
            let (config, engine) = open()?;
            verify(&engine, &config, json, quick)
        }
        Command::Repair { index } => {
            let (_, engine) = open()?;
            let outcome = engine.repair(index)?;
            println!("{}", outcome.message);
            println!("Remaining blocks: {}", outcome.remaining_blocks);
            Ok(0)
        }
        Command::Rebuild { yes } => {
            if !yes {
                eprintln!("Rebuild permanently deletes every block. Re-run with --yes to confirm.");
                return Ok(1);
            }
            let (_, engine) = open()?;
            let outcome = engine.rebuild()?;
            println!("{}", outcome.message);
            Ok(0)
        }
        Command::Export { file } => {
            let (_, engine) = open()?;
            let export = engine.export()?;
            let json = serde_json::to_string_pretty(&export)
                .map_err(|e| LedgerError::store(format!("failed to encode export: {e}")))?;
            std::fs::write(&file, json)
                .map_err(|e| LedgerError::store(format!("{}: {e}", file.display())))?;
            println!(
                "Exported {} blocks to {} (terminal hash {})",
                export.blocks.len(),
                file.display(),
                export.terminal_hash
            );
            Ok(0)
        }
        Command::CheckExport { file } => check_export(&file),
        Command::Demo => {
            demo::run_scenario()?;
            Ok(0)
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn load_config(config: Option<&Path>, store: Option<PathBuf>) -> LedgerResult<LedgerConfig> {
    let mut config = match config {
        Some(path) => LedgerConfig::from_file(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(path) = store {
        config.storage.backend = None;
        config.storage.path = Some(path);
    } else if config.storage.path.is_none() && config.storage.backend.is_none() {
        config.storage.path = Some(PathBuf::from(DEFAULT_STORE));
    }
    config.validate()?;
    debug!(storage = ?config.storage, "resolved configuration");
    Ok(config)
}

fn verify(engine: &ChainEngine, config: &LedgerConfig, json: bool, quick: bool) -> LedgerResult<i32> {
    if quick {
        let valid = ChainVerifier::new().is_intact(engine.snapshot()?)?;
        println!("{}", if valid { "VALID" } else { "INVALID" });
        return Ok(if valid { 0 } else { 2 });
    }

    let report = engine.verify()?;
    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| LedgerError::store(format!("failed to encode report: {e}")))?;
        println!("{out}");
    } else {
        render::print_report(&report);
        if suggests_rebuild(&report, config.operator.rebuild_threshold) {
            println!();
            println!(
                "More than {} anomalies found: consider `tamperlog rebuild --yes`.",
                config.operator.rebuild_threshold
            );
        } else if let Some(index) = report.first_tampered_index() {
            println!();
            println!("Suggested recovery: `tamperlog repair {index}`.");
        }
    }
    Ok(if report.valid { 0 } else { 2 })
}

fn check_export(file: &Path) -> LedgerResult<i32> {
    let contents = std::fs::read_to_string(file)
        .map_err(|e| LedgerError::store(format!("{}: {e}", file.display())))?;
    let export: ChainExport = serde_json::from_str(&contents).map_err(|e| {
        LedgerError::CorruptRecord {
            line: e.line() as u64,
            reason: e.to_string(),
        }
    })?;

    let report = ChainVerifier::new().verify_blocks(&export.blocks);
    render::print_report(&report);

    let terminal = export.blocks.last().map(|b| b.hash.as_str()).unwrap_or("");
    let sealed = terminal == export.terminal_hash;
    if !sealed {
        println!();
        println!(
            "Terminal hash mismatch: export claims {}, last block carries {}.",
            export.terminal_hash, terminal
        );
    }
    Ok(if report.valid && sealed { 0 } else { 2 })
}
