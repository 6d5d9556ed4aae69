// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::engine::AuditEngine;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use neural_ledger_node::load::{run_load, LoadProfile, LoadStats};
use neural_ledger_node::signer::LocalKeyCustody;
use neural_ledger_node::LedgerRuntime;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Drive the append path into the archive and report caller-side latency.
pub fn run(archive: &Path, profile: LoadProfile) -> anyhow::Result<LoadStats> {
    let engine = AuditEngine::open(archive)?;
    let custody = Arc::new(LocalKeyCustody::new().with_key(engine.config.signing_key_id.clone()));

    let stats = engine.block_on(async {
        let rt = LedgerRuntime::start(&engine.config, custody, engine.ports().clone()).await?;
        let stats = run_load(&rt.ledger, profile).await;
        if !rt.drain(Duration::from_secs(30)).await {
            eprintln!("warning: not every event reached the archive");
        }
        rt.shutdown(Duration::from_secs(5)).await;
        Ok::<_, anyhow::Error>(stats)
    })?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Requests".to_string(), stats.requests.to_string()]);
    table.add_row(vec!["Errors".to_string(), stats.errors.to_string()]);
    table.add_row(vec!["Error rate".to_string(), format!("{:.2}%", stats.error_rate() * 100.0)]);
    table.add_row(vec!["Mean latency".to_string(), format!("{:.2} ms", ms(stats.mean))]);
    table.add_row(vec!["p99 latency".to_string(), format!("{:.2} ms", ms(stats.p99))]);
    table.add_row(vec!["Max latency".to_string(), format!("{:.2} ms", ms(stats.max))]);
    table.add_row(vec!["Throughput".to_string(), format!("{:.0} events/s", stats.throughput())]);

    println!("\nLoad Test ({} x every {:?} for {:?})\n", profile.batch_size, profile.interval, profile.duration);
    println!("{table}\n");

    Ok(stats)
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
