//! pulse-runner: headless runner for the ad-performance engine.
//!
//! Usage:
//!   pulse-runner --client demo --date 2026-05-20 --db pulse.db
//!   pulse-runner --client demo --synthetic --seed 7 --days 30
//!   pulse-runner --client demo --config thresholds.json --workers 4 --timeout-ms 5000

use adpulse_core::{
    alert_rules::Severity,
    bundle::BundleKind,
    config::EngineConfig,
    engine::{parse_reference_date, ComputationOutput, PulseEngine, RunOptions},
    error::EngineError,
    notify::{dispatch_alerts, LogNotifier, NotifyRoute},
    record::RETENTION_DAYS,
    store::PulseStore,
    synthetic::{generate_client, SyntheticSpec},
};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::{env, time::Instant};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let client = arg_str(&args, "--client").unwrap_or("demo");
    let db = arg_str(&args, "--db").unwrap_or(":memory:");
    let seed = parse_arg(&args, "--seed", 42u64);
    let days = parse_arg(&args, "--days", 30u32);
    let workers = parse_arg(&args, "--workers", 0usize);
    let timeout_ms = parse_arg(&args, "--timeout-ms", 0u64);
    let synthetic = args.iter().any(|a| a == "--synthetic");
    let reference_date = match arg_str(&args, "--date") {
        Some(d) => parse_reference_date(d)?,
        None => Utc::now().date_naive(),
    };

    println!("adpulse pulse-runner");
    println!("  client:    {client}");
    println!("  date:      {reference_date}");
    println!("  db:        {db}");
    if synthetic {
        println!("  synthetic: seed {seed}, {days} days");
    }
    println!();

    let store = PulseStore::open(db)?;
    store.migrate()?;

    if synthetic {
        let spec = SyntheticSpec { days, ..SyntheticSpec::new(client, reference_date) };
        let data = generate_client(seed, &spec);
        store.save_client_profile(&data.profile)?;
        let n = store.insert_daily_records(&data.records)?;
        log::info!("client={client}: seeded {n} synthetic records");
    }

    let profile = store
        .load_client_profile(client)?
        .ok_or_else(|| EngineError::ClientNotFound { client_id: client.to_string() })?;

    let config = match arg_str(&args, "--config") {
        Some(path) => {
            let cfg = EngineConfig::load(path)?;
            store.save_engine_config(client, &cfg)?;
            cfg
        }
        None => EngineConfig::or_default(store.load_engine_config(client)?, client),
    };

    let window_start = reference_date - Duration::days(RETENTION_DAYS - 1);
    let raw = store.records_for_client(client, window_start, reference_date)?;

    let options = RunOptions {
        computed_at: Utc::now(),
        deadline:    (timeout_ms > 0).then(|| Instant::now() + std::time::Duration::from_millis(timeout_ms)),
        workers:     (workers > 0).then_some(workers),
    };
    let engine = PulseEngine::new(profile, config);
    let output = engine
        .compute_raw(raw, reference_date, &options)
        .with_context(|| format!("computation failed for client {client}"))?;

    store.save_bundle(client, reference_date, BundleKind::Main, &output.main.to_json()?, output.main_meta.serialized_bytes)?;
    store.save_bundle(client, reference_date, BundleKind::Ads, &output.ads.to_json()?, output.ads_meta.serialized_bytes)?;
    store.replace_alerts(client, &output.main.alerts)?;
    let run_id = store.record_run(client, reference_date, options.computed_at, &output.stats)?;
    store.purge_records_before(client, window_start)?;

    let routes = vec![NotifyRoute::new(Severity::Warning, Box::new(LogNotifier))];
    let report = dispatch_alerts(&output.main.alerts, &routes);
    if !report.failures.is_empty() {
        log::warn!("{} notification batches failed", report.failures.len());
    }

    print_summary(&output, &run_id);
    Ok(())
}

fn print_summary(output: &ComputationOutput, run_id: &str) {
    let s = &output.stats;
    println!("=== RUN SUMMARY ===");
    println!("  run_id:           {run_id}");
    println!("  records seen:     {}", s.records_seen);
    println!("  rejected:         {}", s.records_rejected);
    println!("  out of window:    {}", s.records_out_of_window);
    println!("  entities:         {} ({} active)", s.entities, s.active_entities);
    println!("  concepts:         {}", s.concepts);
    println!("  main bundle:      {} bytes", output.main_meta.serialized_bytes);
    println!("  ads bundle:       {} bytes", output.ads_meta.serialized_bytes);

    println!();
    println!("=== DECISIONS ===");
    let mut counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    for c in &output.main.classifications {
        *counts.entry(c.decision.to_string()).or_insert(0) += 1;
    }
    for (decision, n) in &counts {
        println!("  {decision:<24} {n}");
    }

    println!();
    println!("=== ALERTS ({}) ===", output.main.alerts.len());
    for a in output.main.alerts.iter().take(20) {
        println!("  [{:<8}] {:>6.2}  {}", a.severity.to_string(), a.impact_score, a.title);
    }
    if output.main.alerts.len() > 20 {
        println!("  … {} more", output.main.alerts.len() - 20);
    }
}

fn arg_str<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
