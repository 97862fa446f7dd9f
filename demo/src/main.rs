//! Evidentia evidentiary integrity core — Demo CLI
//!
//! Wires the audit trail, reseal, retention and archive engines over
//! in-memory stores and a manual clock, then walks through the concrete
//! scenarios end to end.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- audit-trail
//!   cargo run -p demo -- reseal
//!   cargo run -p demo -- archive
//!   cargo run -p demo -- policy
//!   cargo run -p demo -- sweep
//!   cargo run -p demo -- --config config/evidentia.toml --policies config/policies.toml run-all

mod runtime;
mod scenarios;

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use evidentia_contracts::error::EvResult;
use evidentia_core::{traits::PolicySource, EngineConfig};
use evidentia_retention::TomlPolicySource;

use crate::scenarios::Setup;

const DEFAULT_POLICIES: &str = include_str!("../../config/policies.toml");

// ── CLI definition ────────────────────────────────────────────────────────────

/// Evidentia — tamper-evident audit trails and long-term archival.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Evidentia evidentiary integrity core demo",
    long_about = "Runs Evidentia scenarios showing hash-chained audit trails, TSA\n\
                  reseal chains, retention policy resolution and tiered archival."
)]
struct Cli {
    /// Engine configuration (TOML).  Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Retention policies (TOML).  The bundled `config/policies.toml` when
    /// omitted.
    #[arg(long, global = true)]
    policies: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll,
    /// Scenarios 1-2: record a trail, then detect a tampered entry.
    AuditTrail,
    /// Scenarios 3-4: reseal a chain, then detect a sequence gap.
    Reseal,
    /// Scenario 5: archive documents and find the ones due for reseal.
    Archive,
    /// Scenario 6: resolve the retention policy for a tenant's document.
    Policy,
    /// Background sweeps: reseal due chains and migrate tiers.
    Sweep,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = load_setup(&cli).and_then(|setup| match cli.command {
        Command::RunAll => run_all(&setup),
        Command::AuditTrail => scenarios::run_audit_trail(&setup),
        Command::Reseal => scenarios::run_reseal(&setup),
        Command::Archive => scenarios::run_archive(&setup),
        Command::Policy => scenarios::run_policy(&setup),
        Command::Sweep => scenarios::run_sweep(&setup),
    });

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_setup(cli: &Cli) -> EvResult<Setup> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let policies = match &cli.policies {
        Some(path) => TomlPolicySource::from_file(path)?,
        None => TomlPolicySource::from_toml_str(DEFAULT_POLICIES)?,
    };
    let policies: Arc<dyn PolicySource> = Arc::new(policies);
    Ok(Setup { config, policies })
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

fn run_all(setup: &Setup) -> EvResult<()> {
    scenarios::run_audit_trail(setup)?;
    scenarios::run_reseal(setup)?;
    scenarios::run_archive(setup)?;
    scenarios::run_policy(setup)?;
    scenarios::run_sweep(setup)?;
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Evidentia — Evidentiary Integrity Core");
    println!("Reference Demo");
    println!("======================================");
    println!();
    println!("Integrity guarantees exercised:");
    println!("  [1] Audit entries are SHA-256 chained from a genesis hash, per entity");
    println!("  [2] Critical events carry an RFC 3161-style TSA token");
    println!("  [3] TSA chains are resealed before the previous token weakens");
    println!("  [4] Retention policy resolves tenant -> tenant default -> global default");
    println!("  [5] Archived bytes are verified against hash, chain and TSA");
    println!();
}
