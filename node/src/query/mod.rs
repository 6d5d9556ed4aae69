// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Query Service
//!
//! Read-only access to the archive (the system of record) and the document
//! store. Nothing here touches the append path or the chain tail.

pub mod reports;

pub use reports::{
    build_report, CategoryCounts, ComplianceReport, ComplianceStatus, Framework, IntegritySummary,
    MultiFrameworkReport, Violation,
};

use crate::config::{LedgerConfig, ARCHIVE_TABLE};
use crate::errors::{Result, SigningError};
use crate::processor::StoragePorts;
use crate::signer::EventSigner;
use crate::storage::{
    AnalyticsSink, ArchiveQuery, Document, DocumentFilter, DocumentStore, EVENTS_COLLECTION,
    SESSIONS_COLLECTION,
};
use chrono::{DateTime, Utc};
use neural_ledger_core::{
    verify_chain, ChainAnchor, Checkpoint, CriticalEventPolicy, EventFilter, EventType, IntegrityViolation,
    LedgerEvent, TimeWindow,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of verifying every event in a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub window: TimeWindow,
    pub events_checked: usize,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    pub signatures_checked: usize,
    pub violations: Vec<IntegrityViolation>,
}

impl IntegrityReport {
    /// No violation of any kind.
    pub fn is_intact(&self) -> bool {
        self.violations.is_empty()
    }

    /// Hashes and links hold; signature findings are ignored.
    pub fn chain_intact(&self) -> bool {
        !self.violations.iter().any(|v| {
            !matches!(
                v,
                IntegrityViolation::MissingSignature { .. } | IntegrityViolation::InvalidSignature { .. }
            )
        })
    }
}

pub struct QueryService {
    archive: Arc<dyn AnalyticsSink>,
    documents: Arc<dyn DocumentStore>,
    signer: Option<EventSigner>,
    policy: CriticalEventPolicy,
    table: String,
}

impl QueryService {
    pub fn new(ports: &StoragePorts, config: &LedgerConfig) -> Self {
        Self {
            archive: ports.archive.clone(),
            documents: ports.documents.clone(),
            signer: None,
            policy: config.critical_policy(),
            table: ARCHIVE_TABLE.to_string(),
        }
    }

    /// Enable signature verification in integrity checks.
    pub fn with_signer(mut self, signer: EventSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn policy(&self) -> &CriticalEventPolicy {
        &self.policy
    }

    /// Archived events in `[start, end)` matching `filter`, by sequence.
    pub async fn get_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: &EventFilter,
    ) -> Result<Vec<LedgerEvent>> {
        let window = TimeWindow::new(start, end)?;
        self.events(window, filter).await
    }

    async fn events(&self, window: TimeWindow, filter: &EventFilter) -> Result<Vec<LedgerEvent>> {
        let query = ArchiveQuery::new(window).with_filter(filter.clone());
        Ok(self.archive.query(&self.table, &query).await?)
    }

    pub async fn count_by_type(&self, window: TimeWindow) -> Result<BTreeMap<EventType, u64>> {
        Ok(self
            .archive
            .count_by_type(&self.table, &ArchiveQuery::new(window))
            .await?)
    }

    /// Recompute hashes, check links and verify signatures for a window.
    pub async fn verify_integrity(&self, window: TimeWindow) -> Result<IntegrityReport> {
        let events = self.events(window, &EventFilter::all()).await?;
        self.verify_events(window, &events).await
    }

    async fn verify_events(&self, window: TimeWindow, events: &[LedgerEvent]) -> Result<IntegrityReport> {
        let anchor = match events.first() {
            Some(first) if first.sequence == 0 => ChainAnchor::Genesis,
            _ => ChainAnchor::Unanchored,
        };
        let mut violations = verify_chain(events, anchor, &self.policy).violations;

        let mut signatures_checked = 0;
        if let Some(signer) = &self.signer {
            for event in events.iter().filter(|e| e.is_signed()) {
                signatures_checked += 1;
                let valid = match signer.verify_event(event).await {
                    Ok(valid) => valid,
                    // Unknown key or unparseable signature: the signature cannot be trusted.
                    Err(SigningError::Rejected { .. } | SigningError::MalformedSignature { .. }) => false,
                    Err(e) => return Err(e.into()),
                };
                if !valid {
                    violations.push(IntegrityViolation::InvalidSignature {
                        event_id: event.event_id.clone(),
                    });
                }
            }
        }

        if violations.is_empty() {
            tracing::debug!("Window {} .. {}: {} events intact", window.start, window.end, events.len());
        } else {
            tracing::warn!(
                "Window {} .. {}: {} integrity violations",
                window.start,
                window.end,
                violations.len()
            );
        }

        Ok(IntegrityReport {
            window,
            events_checked: events.len(),
            first_sequence: events.first().map(|e| e.sequence),
            last_sequence: events.last().map(|e| e.sequence),
            signatures_checked,
            violations,
        })
    }

    /// Live state of one session.
    pub async fn session_state(&self, session_id: &str) -> Result<Option<Document>> {
        Ok(self.documents.get(SESSIONS_COLLECTION, session_id).await?)
    }

    /// Latest event documents, newest first.
    pub async fn recent_activity(&self, limit: usize) -> Result<Vec<Document>> {
        let filter = DocumentFilter::all().newest_first("sequence").limit(limit);
        Ok(self.documents.query(EVENTS_COLLECTION, &filter).await?)
    }

    /// Recompute a checkpoint from the archive and compare.
    pub async fn verify_checkpoint(&self, checkpoint: &Checkpoint) -> Result<bool> {
        let events = self.events(checkpoint.window, &EventFilter::all()).await?;
        let recomputed = Checkpoint::from_events(checkpoint.window, &events, checkpoint.created_at);
        let matches = recomputed.matches(checkpoint);
        if !matches {
            tracing::warn!(
                "Checkpoint {} does not match archive (root {} vs {})",
                checkpoint.id(),
                checkpoint.merkle_root,
                recomputed.merkle_root
            );
        }
        Ok(matches)
    }

    pub async fn generate_hipaa_audit_report(&self, window: TimeWindow) -> Result<ComplianceReport> {
        self.report(Framework::Hipaa, window, None).await
    }

    /// Everything recorded about one data subject, judged under GDPR.
    pub async fn generate_gdpr_subject_access_log(
        &self,
        window: TimeWindow,
        subject: &str,
    ) -> Result<ComplianceReport> {
        self.report(Framework::Gdpr, window, Some(subject)).await
    }

    pub async fn generate_fda_compliance_report(&self, window: TimeWindow) -> Result<ComplianceReport> {
        self.report(Framework::Fda21Cfr11, window, None).await
    }

    /// One report per framework over a single read of the window.
    pub async fn generate_compliance_report(
        &self,
        window: TimeWindow,
        frameworks: &[Framework],
        subject: Option<&str>,
    ) -> Result<MultiFrameworkReport> {
        let events = self.events(window, &EventFilter::all()).await?;
        let integrity = self.verify_events(window, &events).await?;
        let scoped = scope(&events, subject);

        let reports = frameworks
            .iter()
            .map(|f| build_report(*f, window, subject, &scoped, &integrity, &self.policy))
            .collect();
        Ok(MultiFrameworkReport::new(window, reports))
    }

    async fn report(
        &self,
        framework: Framework,
        window: TimeWindow,
        subject: Option<&str>,
    ) -> Result<ComplianceReport> {
        let events = self.events(window, &EventFilter::all()).await?;
        let integrity = self.verify_events(window, &events).await?;
        let scoped = scope(&events, subject);
        let report = build_report(framework, window, subject, &scoped, &integrity, &self.policy);
        tracing::info!(
            "{} report {}: {} events, {}",
            framework,
            report.report_id,
            report.event_count,
            report.compliance_status
        );
        Ok(report)
    }
}

fn scope(events: &[LedgerEvent], subject: Option<&str>) -> Vec<LedgerEvent> {
    match subject {
        Some(user) => events
            .iter()
            .filter(|e| e.user_id.as_deref() == Some(user))
            .cloned()
            .collect(),
        None => events.to_vec(),
    }
}
