// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::engine::{resolve_window, AuditEngine};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use neural_ledger_core::EventFilter;
use std::path::Path;

pub struct TimelineArgs<'a> {
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub session: Option<&'a str>,
    pub user: Option<&'a str>,
    pub limit: usize,
}

pub fn run(archive: &Path, args: TimelineArgs<'_>) -> anyhow::Result<()> {
    let engine = AuditEngine::open(archive)?;
    let window = resolve_window(args.from, args.to)?;

    let mut filter = EventFilter::all();
    if let Some(session) = args.session {
        filter = filter.session(session);
    }
    if let Some(user) = args.user {
        filter = filter.user(user);
    }
    let events = engine.block_on(engine.query().get_events_in_range(window.start, window.end, &filter))?;
    let total = events.len();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Seq", "Timestamp", "Type", "Session", "User", "Hash", "Signed"]);

    // Most recent `limit` events, still in chain order.
    for event in events.iter().skip(total.saturating_sub(args.limit)) {
        let hash = event.event_hash.to_hex();
        table.add_row(vec![
            event.sequence.to_string(),
            event
                .timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event.event_type.to_string(),
            event.session_id.clone().unwrap_or_default(),
            event.user_id.clone().unwrap_or_default(),
            hash[..12].to_string(),
            if event.is_signed() { "yes" } else { "" }.to_string(),
        ]);
    }

    println!("\nEvent Timeline ({} of {} events)\n", total.min(args.limit), total);
    println!("{table}\n");

    Ok(())
}
