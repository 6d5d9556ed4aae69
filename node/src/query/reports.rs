// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Compliance Reports
//!
//! Pure builders over events already read from the archive. Every report
//! cites its exact window and event count so an auditor can rerun it.
//!
//! Rules per framework (all inherit chain integrity violations):
//! - HIPAA: PHI disclosure (export, access grant) must name a user
//! - GDPR: no processing for a user after they withdrew consent
//! - FDA 21 CFR Part 11: signatures verify; critical records name a user

use super::IntegrityReport;
use chrono::{DateTime, Utc};
use neural_ledger_core::{CriticalEventPolicy, EventType, IntegrityViolation, LedgerEvent, TimeWindow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Framework {
    #[serde(rename = "HIPAA")]
    Hipaa,
    #[serde(rename = "GDPR")]
    Gdpr,
    #[serde(rename = "FDA_21_CFR_11")]
    Fda21Cfr11,
}

impl Framework {
    pub const ALL: [Framework; 3] = [Framework::Hipaa, Framework::Gdpr, Framework::Fda21Cfr11];

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Hipaa => "HIPAA",
            Framework::Gdpr => "GDPR",
            Framework::Fda21Cfr11 => "FDA_21_CFR_11",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hipaa" => Ok(Framework::Hipaa),
            "gdpr" => Ok(Framework::Gdpr),
            "fda" | "fda_21_cfr_11" | "part11" => Ok(Framework::Fda21Cfr11),
            other => Err(format!("unknown framework: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceStatus::Compliant => f.write_str("COMPLIANT"),
            ComplianceStatus::NonCompliant => f.write_str("NON_COMPLIANT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl Violation {
    fn on_event(rule: &str, event: &LedgerEvent, description: String) -> Self {
        Self {
            rule: rule.to_string(),
            description,
            event_id: Some(event.event_id.clone()),
            sequence: Some(event.sequence),
        }
    }
}

impl From<&IntegrityViolation> for Violation {
    fn from(v: &IntegrityViolation) -> Self {
        Self {
            rule: v.code().to_string(),
            description: v.to_string(),
            event_id: v.event_id().map(str::to_string),
            sequence: v.sequence(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub phi_access_events: u64,
    pub consent_events: u64,
    pub signed_events: u64,
    pub critical_events: u64,
    pub access_denied_events: u64,
    pub auth_failures: u64,
}

impl CategoryCounts {
    pub fn tally(events: &[LedgerEvent], policy: &CriticalEventPolicy) -> Self {
        let mut c = Self::default();
        for e in events {
            let t = e.event_type;
            c.phi_access_events += t.is_phi_access() as u64;
            c.consent_events += t.is_consent() as u64;
            c.signed_events += e.is_signed() as u64;
            c.critical_events += policy.requires_signature(t) as u64;
            c.access_denied_events += (t == EventType::AccessDenied) as u64;
            c.auth_failures += (t == EventType::AuthFailure) as u64;
        }
        c
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub events_checked: usize,
    pub hash_chain_intact: bool,
    pub signatures_checked: usize,
    pub violation_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub report_id: String,
    pub framework: Framework,
    pub window: TimeWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub event_count: u64,
    pub events_by_type: BTreeMap<EventType, u64>,
    pub categories: CategoryCounts,
    pub integrity: IntegritySummary,
    pub violations: Vec<Violation>,
    pub compliance_status: ComplianceStatus,
}

/// One report per requested framework plus the combined verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiFrameworkReport {
    pub window: TimeWindow,
    pub generated_at: DateTime<Utc>,
    pub reports: Vec<ComplianceReport>,
    pub overall_status: ComplianceStatus,
}

impl MultiFrameworkReport {
    pub fn new(window: TimeWindow, reports: Vec<ComplianceReport>) -> Self {
        let overall_status = if reports
            .iter()
            .all(|r| r.compliance_status == ComplianceStatus::Compliant)
        {
            ComplianceStatus::Compliant
        } else {
            ComplianceStatus::NonCompliant
        };
        Self {
            window,
            generated_at: Utc::now(),
            reports,
            overall_status,
        }
    }
}

/// Build a report. `events` are the events in scope (all events, or one
/// subject's); `integrity` always covers the whole window.
pub fn build_report(
    framework: Framework,
    window: TimeWindow,
    subject: Option<&str>,
    events: &[LedgerEvent],
    integrity: &IntegrityReport,
    policy: &CriticalEventPolicy,
) -> ComplianceReport {
    let mut events_by_type = BTreeMap::new();
    for e in events {
        *events_by_type.entry(e.event_type).or_insert(0u64) += 1;
    }

    let mut violations: Vec<Violation> = integrity.violations.iter().map(Violation::from).collect();
    violations.extend(match framework {
        Framework::Hipaa => hipaa_violations(events),
        Framework::Gdpr => gdpr_violations(events),
        Framework::Fda21Cfr11 => fda_violations(events, policy),
    });

    let compliance_status = if violations.is_empty() {
        ComplianceStatus::Compliant
    } else {
        ComplianceStatus::NonCompliant
    };

    ComplianceReport {
        report_id: Uuid::new_v4().to_string(),
        framework,
        window,
        subject: subject.map(str::to_string),
        generated_at: Utc::now(),
        event_count: events.len() as u64,
        events_by_type,
        categories: CategoryCounts::tally(events, policy),
        integrity: IntegritySummary {
            events_checked: integrity.events_checked,
            hash_chain_intact: integrity.chain_intact(),
            signatures_checked: integrity.signatures_checked,
            violation_count: integrity.violations.len(),
        },
        violations,
        compliance_status,
    }
}

fn hipaa_violations(events: &[LedgerEvent]) -> Vec<Violation> {
    events
        .iter()
        .filter(|e| matches!(e.event_type, EventType::DataExported | EventType::AccessGranted))
        .filter(|e| e.user_id.is_none())
        .map(|e| {
            Violation::on_event(
                "PHI_DISCLOSURE_WITHOUT_USER",
                e,
                format!("{} at seq {} has no accountable user", e.event_type, e.sequence),
            )
        })
        .collect()
}

fn gdpr_violations(events: &[LedgerEvent]) -> Vec<Violation> {
    let mut ordered: Vec<&LedgerEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.sequence);

    let mut withdrawn: HashMap<&str, bool> = HashMap::new();
    let mut violations = Vec::new();
    for e in ordered {
        let Some(user) = e.user_id.as_deref() else {
            continue;
        };
        match e.event_type {
            EventType::ConsentWithdrawn => {
                withdrawn.insert(user, true);
            }
            EventType::ConsentGranted => {
                withdrawn.insert(user, false);
            }
            t if t.is_processing() && withdrawn.get(user).copied().unwrap_or(false) => {
                violations.push(Violation::on_event(
                    "PROCESSING_AFTER_CONSENT_WITHDRAWN",
                    e,
                    format!("{} for user {} after consent was withdrawn", t, user),
                ));
            }
            _ => {}
        }
    }
    violations
}

fn fda_violations(events: &[LedgerEvent], policy: &CriticalEventPolicy) -> Vec<Violation> {
    events
        .iter()
        .filter(|e| policy.requires_signature(e.event_type) && e.user_id.is_none())
        .map(|e| {
            Violation::on_event(
                "CRITICAL_RECORD_WITHOUT_USER",
                e,
                format!("critical {} at seq {} has no user attribution", e.event_type, e.sequence),
            )
        })
        .collect()
}
