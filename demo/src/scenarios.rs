//! Demo scenarios.  Each one builds a fresh runtime so clock moves in one
//! scenario never leak into the next.

use std::sync::Arc;

use chrono::{Duration, SecondsFormat};
use serde_json::json;

use evidentia_contracts::{
    audit::{Actor, RequestMeta},
    chain::{ChainSubject, ChainType, ResealReason},
    entity::{DocumentId, EntityRef, TenantId},
    error::{EvResult, EvidentiaError},
    retention::PolicySubject,
};
use evidentia_core::{
    hashing,
    traits::{Clock, PolicySource},
    EngineConfig, TenantContext,
};
use evidentia_scheduler::{ResealSweep, RetryPolicy, SweepReport, TierMigrationSweep};

use crate::runtime::{self, Runtime};

/// Everything loaded from the command line, shared by every scenario.
pub struct Setup {
    pub config: EngineConfig,
    pub policies: Arc<dyn PolicySource>,
}

impl Setup {
    fn runtime(&self) -> EvResult<Runtime> {
        Runtime::build(self.config.clone(), self.policies.clone())
    }
}

// ── Scenarios 1-2: audit trail ────────────────────────────────────────────────

pub fn run_audit_trail(setup: &Setup) -> EvResult<()> {
    println!("=== Scenario 1: Hash-chained audit trail ===");
    println!();

    let rt = setup.runtime()?;
    let ctx = runtime::acme();
    let contract = EntityRef::document(DocumentId(1001));
    let meta = RequestMeta {
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("evidentia-demo".to_string()),
    };

    for (event_type, actor) in [
        ("document.uploaded", Actor::user("alice")),
        ("document.viewed", Actor::user("bob")),
        ("document.signed", Actor::signer("carol")),
    ] {
        let entry = rt.audit.record(
            Some(&ctx),
            &contract,
            event_type,
            json!({ "document_id": 1001 }),
            actor,
            meta.clone(),
        )?;
        println!(
            "  #{}  {:<20} hash={}…  tsa={}",
            entry.sequence,
            entry.event_type,
            &entry.hash[..16],
            if entry.tsa_token_id.is_some() { "yes" } else { "no" }
        );
        rt.clock.advance(Duration::minutes(5));
    }

    let result = rt.audit.verify_chain(Some(&ctx), &contract)?;
    println!();
    println!("  Chain valid:       {}", result.valid);
    println!("  Entries verified:  {}", result.entries_verified);
    println!();

    println!("=== Scenario 2: Tampered audit entry ===");
    println!();

    let export = rt.audit.export(Some(&ctx), &contract)?;
    let mut entries = export.entries;
    entries[1].hash = hashing::hash_string("forged");
    println!("  Rewrote the stored hash of entry #{}.", entries[1].sequence);

    let result = evidentia_audit::verify_entries(&entries, |_| None);
    println!("  Chain valid:       {}", result.valid);
    for error in &result.errors {
        println!("  Detected:          {}", error);
    }
    println!();
    Ok(())
}

// ── Scenarios 3-4: TSA reseal chain ───────────────────────────────────────────

pub fn run_reseal(setup: &Setup) -> EvResult<()> {
    println!("=== Scenario 3: Scheduled reseal ===");
    println!();

    let rt = setup.runtime()?;
    let ctx = runtime::acme();
    let subject = ChainSubject {
        document_id: DocumentId(2001),
        content_hash: hashing::hash_bytes(b"%PDF-1.7 master services agreement"),
        chain_type: ChainType::LongTermArchive,
    };

    let chain = rt.reseal.initialize_chain(&ctx, &subject, 365)?;
    println!("  Chain:             {}", chain.id);
    println!("  Next seal due:     {}", day(chain.next_seal_due_at));

    rt.clock.advance(Duration::days(365));
    let outcome = rt.reseal.reseal(&ctx, chain.id, ResealReason::Scheduled)?;
    let chain = rt.reseal.chain(&ctx, chain.id)?;
    let entries = rt.reseal.entries(&ctx, chain.id)?;

    println!("  Resealed:          {}", outcome.is_new_seal());
    println!("  Seal count:        {}", chain.seal_count);
    for entry in &entries {
        println!(
            "  seq {}  {:<9} cumulative={}…",
            entry.sequence,
            entry.reason.as_str(),
            &entry.cumulative_hash[..16]
        );
    }
    let linked = entries[1].previous_entry_hash.as_deref() == Some(entries[0].cumulative_hash.as_str());
    println!("  Entry 1 links to entry 0: {}", linked);

    let verified = rt.reseal.verify_chain(&ctx, chain.id)?;
    println!("  Chain valid:       {}", verified.valid);
    println!();

    println!("=== Scenario 4: Sequence gap in a TSA chain ===");
    println!();

    rt.clock.advance(Duration::days(2));
    rt.reseal.reseal(&ctx, chain.id, ResealReason::Manual)?;
    let chain = rt.reseal.chain(&ctx, chain.id)?;
    let mut entries = rt.reseal.entries(&ctx, chain.id)?;
    entries.remove(1);
    let sequences: Vec<String> = entries.iter().map(|e| e.sequence.to_string()).collect();
    println!("  Entries presented: seq {}", sequences.join(", "));

    let result = evidentia_reseal::verify_chain_entries(&chain, &entries, |_, _| None);
    println!("  Chain valid:       {}", result.valid);
    for error in &result.errors {
        println!("  Detected:          {}", error);
    }
    println!();
    Ok(())
}

// ── Scenario 5: archive and reseal due dates ──────────────────────────────────

pub fn run_archive(setup: &Setup) -> EvResult<()> {
    println!("=== Scenario 5: Archived documents due for reseal ===");
    println!();

    let rt = setup.runtime()?;
    let ctx = TenantContext::new(TenantId::new());

    let lease_bytes: &[u8] = b"%PDF-1.7 office lease";
    let lease = rt.upload(&ctx, 3001, None, lease_bytes)?;
    let lease = rt.archive.archive(&ctx, &lease)?;

    rt.clock.advance(Duration::days(370));

    let invoice = rt.upload(&ctx, 3002, Some("invoice"), b"%PDF-1.7 invoice 2024-117")?;
    let invoice = rt.archive.archive(&ctx, &invoice)?;

    let now = rt.clock.now();
    for record in [&lease, &invoice] {
        println!(
            "  Document {}  tier={}  next reseal {} ({:+} days)",
            record.document_id,
            record.tier.as_str(),
            day(record.next_reseal_at),
            (record.next_reseal_at - now).num_days()
        );
    }

    let due = rt.archive.documents_due_for_reseal(0)?;
    let ids: Vec<String> = due.iter().map(|d| d.document_id.to_string()).collect();
    println!("  Due for reseal:    [{}]", ids.join(", "));
    println!();

    let report = rt.archive.verify_integrity(&ctx, lease.id)?;
    println!("  Integrity of {}:  valid={}", lease.document_id, report.is_valid);

    let genuine = rt.archive.verify_document(&ctx, lease.id, lease_bytes)?;
    println!(
        "  Genuine copy:      hash={} chain={} tsa={} confidence={:?}",
        genuine.document_hash_matches, genuine.chain_valid, genuine.tsa_valid, genuine.confidence
    );
    let forged = rt.archive.verify_document(&ctx, lease.id, b"%PDF-1.7 office lease (amended)")?;
    println!(
        "  Altered copy:      hash={} chain={} tsa={} confidence={:?}",
        forged.document_hash_matches, forged.chain_valid, forged.tsa_valid, forged.confidence
    );

    let trail = rt.audit.trail_for(Some(&ctx), &lease)?;
    let events: Vec<&str> = trail.iter().map(|e| e.event_type.as_str()).collect();
    println!("  Audit events:      {}", events.join(", "));
    println!();
    Ok(())
}

// ── Scenario 6: retention policy resolution ───────────────────────────────────

pub fn run_policy(setup: &Setup) -> EvResult<()> {
    println!("=== Scenario 6: Retention policy resolution ===");
    println!();

    let rt = setup.runtime()?;
    let acme = runtime::acme();
    let other = TenantId::new();

    let cases = [
        ("ACME contract", acme.tenant_id, None),
        ("Other tenant contract", other, None),
        ("Other tenant invoice", other, Some("invoice")),
    ];
    for (label, tenant_id, document_type) in cases {
        let subject = PolicySubject {
            tenant_id,
            document_type: document_type.map(String::from),
        };
        match rt.resolver.policy_for_document(&subject) {
            Ok(policy) => println!(
                "  {:<22} -> {} ({} years, reseal every {} days)",
                label, policy.name, policy.retention_years, policy.reseal_interval_days
            ),
            Err(EvidentiaError::NoPolicyFound { .. }) => {
                println!("  {:<22} -> no policy applies", label)
            }
            Err(e) => return Err(e),
        }
    }
    println!();
    Ok(())
}

// ── Background sweeps ─────────────────────────────────────────────────────────

pub fn run_sweep(setup: &Setup) -> EvResult<()> {
    println!("=== Background sweeps ===");
    println!();

    let rt = setup.runtime()?;
    let ctx = runtime::acme();
    let mut archived = Vec::new();
    for id in 4001..=4003 {
        let doc = rt.upload(&ctx, id, None, format!("%PDF-1.7 board minutes {id}").as_bytes())?;
        archived.push(rt.archive.archive(&ctx, &doc)?);
    }

    rt.clock.advance(Duration::days(366));
    println!("  Clock advanced to  {}", day(rt.clock.now()));

    let retry = RetryPolicy::from_settings(&rt.config.jobs);
    let reseal = ResealSweep::new(rt.reseal.clone(), retry.clone())
        .with_archive(rt.archive.clone())
        .run(rt.config.reseal.grace_days)?;
    print_report("Reseal sweep", &reseal);

    let tiers = TierMigrationSweep::new(rt.archive.clone(), retry).run()?;
    print_report("Tier migration", &tiers);

    for record in &archived {
        let current = rt.archive.archived(&ctx, record.id)?;
        let chain = rt.reseal.chain(&ctx, current.chain_id)?;
        println!(
            "  Document {}  tier={}  seals={}  next reseal {}",
            current.document_id,
            current.tier.as_str(),
            chain.seal_count,
            day(current.next_reseal_at)
        );
    }
    println!();
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn print_report(label: &str, report: &SweepReport) {
    println!(
        "  {:<18} processed={} succeeded={} skipped={} failed={}",
        label,
        report.processed,
        report.succeeded,
        report.skipped,
        report.failed.len()
    );
    for (unit, reason) in &report.failed {
        println!("    {}: {}", unit, reason);
    }
}

fn day(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)[..10].to_string()
}
