// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use neural_ledger_core::TimeWindow;
use neural_ledger_node::checkpoint::CheckpointService;
use neural_ledger_node::storage::ArchiveStore;
use neural_ledger_node::{LedgerConfig, QueryService, StoragePorts};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Tail file kept next to the archive so repeated runs extend one chain.
pub const TAIL_FILE: &str = "chain.tail";

/// Read side of an on-disk archive plus the runtime to drive it.
pub struct AuditEngine {
    pub archive_root: PathBuf,
    pub config: LedgerConfig,
    ports: StoragePorts,
    runtime: tokio::runtime::Runtime,
}

impl AuditEngine {
    pub fn open(archive_root: &Path) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;
        let archive = ArchiveStore::filesystem(archive_root)
            .with_context(|| format!("Failed to open archive at {}", archive_root.display()))?;
        let mut config = LedgerConfig::from_env().context("Invalid NEURAL_LEDGER_* environment")?;
        if config.tail_path.is_none() {
            config.tail_path = Some(archive_root.join(TAIL_FILE));
        }

        Ok(Self {
            archive_root: archive_root.to_path_buf(),
            config,
            ports: StoragePorts::with_archive(Arc::new(archive)),
            runtime,
        })
    }

    pub fn ports(&self) -> &StoragePorts {
        &self.ports
    }

    pub fn query(&self) -> QueryService {
        QueryService::new(&self.ports, &self.config)
    }

    pub fn checkpoints(&self) -> CheckpointService {
        CheckpointService::new(&self.ports)
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Expected RFC 3339 time or YYYY-MM-DD, got {:?}", value))?;
    let midnight = day.and_hms_opt(0, 0, 0).context("Invalid date")?;
    Ok(Utc.from_utc_datetime(&midnight))
}

/// `[from, to)`; defaults to the last seven days up to now.
pub fn resolve_window(from: Option<&str>, to: Option<&str>) -> Result<TimeWindow> {
    let end = match to {
        Some(t) => parse_time(t)?,
        None => Utc::now() + Duration::seconds(1),
    };
    let start = match from {
        Some(f) => parse_time(f)?,
        None => end - Duration::days(7),
    };
    Ok(TimeWindow::new(start, end)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_forms() {
        let day = parse_time("2025-04-02").unwrap();
        assert_eq!(day.to_rfc3339(), "2025-04-02T00:00:00+00:00");
        let ts = parse_time("2025-04-02T10:30:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-04-02T08:30:00+00:00");
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_resolve_window_rejects_inverted_range() {
        assert!(resolve_window(Some("2025-04-03"), Some("2025-04-02")).is_err());
        let w = resolve_window(Some("2025-04-01"), Some("2025-04-02")).unwrap();
        assert_eq!(w.end - w.start, Duration::days(1));
    }
}
