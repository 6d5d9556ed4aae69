// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::engine::{resolve_window, AuditEngine};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use std::path::Path;

/// Re-hash every archived event in the window and check the links.
/// Fails when any violation is found.
pub fn run(archive: &Path, from: Option<&str>, to: Option<&str>, json: bool) -> anyhow::Result<()> {
    let engine = AuditEngine::open(archive)?;
    let window = resolve_window(from, to)?;
    let report = engine.block_on(engine.query().verify_integrity(window))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let range = match (report.first_sequence, report.last_sequence) {
            (Some(first), Some(last)) => format!("{} .. {}", first, last),
            _ => "-".to_string(),
        };
        println!("\nWindow:    {} .. {}", window.start.to_rfc3339(), window.end.to_rfc3339());
        println!("Events:    {}", report.events_checked);
        println!("Sequences: {}", range);

        if report.is_intact() {
            println!("\n✅ CHAIN INTACT\n");
        } else {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["Code", "Seq", "Detail"]);
            for v in &report.violations {
                table.add_row(vec![
                    v.code().to_string(),
                    v.sequence().map(|s| s.to_string()).unwrap_or_default(),
                    v.to_string(),
                ]);
            }
            println!("\n❌ {} VIOLATION(S)\n", report.violations.len());
            println!("{table}\n");
        }
    }

    if report.is_intact() {
        Ok(())
    } else {
        anyhow::bail!("integrity check failed with {} violation(s)", report.violations.len())
    }
}
