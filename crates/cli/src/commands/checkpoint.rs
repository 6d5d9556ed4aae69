// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::engine::{resolve_window, AuditEngine};
use anyhow::Context;
use neural_ledger_core::Checkpoint;
use std::fs;
use std::path::Path;

/// Compute a checkpoint for the window and print it, optionally saving it.
pub fn create(archive: &Path, from: Option<&str>, to: Option<&str>, out: Option<&Path>) -> anyhow::Result<Checkpoint> {
    let engine = AuditEngine::open(archive)?;
    let window = resolve_window(from, to)?;
    let checkpoint = engine.block_on(engine.checkpoints().create_checkpoint(window))?;

    let json = serde_json::to_string_pretty(&checkpoint)?;
    if let Some(path) = out {
        fs::write(path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Checkpoint {} written to {}", checkpoint.id(), path.display());
    }
    println!("{json}");
    Ok(checkpoint)
}

/// Recompute a saved checkpoint from the archive. Fails on mismatch.
pub fn verify(archive: &Path, checkpoint_path: &Path) -> anyhow::Result<()> {
    let raw = fs::read_to_string(checkpoint_path)
        .with_context(|| format!("Failed to read {}", checkpoint_path.display()))?;
    let checkpoint: Checkpoint = serde_json::from_str(&raw).context("Not a checkpoint file")?;

    let engine = AuditEngine::open(archive)?;
    if engine.block_on(engine.query().verify_checkpoint(&checkpoint))? {
        println!("\n✅ CHECKPOINT {} MATCHES\n", checkpoint.id());
        println!("Merkle root: {}", checkpoint.merkle_root);
        println!("Events:      {}\n", checkpoint.event_count);
        Ok(())
    } else {
        println!("\n❌ CHECKPOINT {} DOES NOT MATCH ARCHIVE\n", checkpoint.id());
        anyhow::bail!("checkpoint {} does not match the archive", checkpoint.id())
    }
}
