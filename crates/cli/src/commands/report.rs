// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::engine::{resolve_window, AuditEngine};
use anyhow::anyhow;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use neural_ledger_node::query::{ComplianceReport, Framework};
use std::path::Path;

/// `hipaa`, `gdpr`, `fda` or `all`.
pub fn parse_frameworks(value: &str) -> anyhow::Result<Vec<Framework>> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(Framework::ALL.to_vec());
    }
    value
        .split(',')
        .map(|f| f.parse::<Framework>().map_err(|e| anyhow!(e)))
        .collect()
}

pub fn run(
    archive: &Path,
    framework: &str,
    subject: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let frameworks = parse_frameworks(framework)?;
    let engine = AuditEngine::open(archive)?;
    let window = resolve_window(from, to)?;
    let summary = engine.block_on(engine.query().generate_compliance_report(window, &frameworks, subject))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("\nCompliance Report");
    println!("Window:  {} .. {}", window.start.to_rfc3339(), window.end.to_rfc3339());
    if let Some(subject) = subject {
        println!("Subject: {}", subject);
    }

    for report in &summary.reports {
        print_report(report);
    }
    println!("Overall: {}\n", summary.overall_status);
    Ok(())
}

fn print_report(report: &ComplianceReport) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Metric", "Value"]);

    let c = &report.categories;
    let rows: [(&str, String); 9] = [
        ("Events", report.event_count.to_string()),
        ("PHI access", c.phi_access_events.to_string()),
        ("Consent", c.consent_events.to_string()),
        ("Signed", c.signed_events.to_string()),
        ("Critical", c.critical_events.to_string()),
        ("Access denied", c.access_denied_events.to_string()),
        ("Auth failures", c.auth_failures.to_string()),
        ("Chain intact", report.integrity.hash_chain_intact.to_string()),
        ("Status", report.compliance_status.to_string()),
    ];
    for (k, v) in rows {
        table.add_row(vec![k.to_string(), v]);
    }

    println!("\n[{}] report {}\n", report.framework, report.report_id);
    println!("{table}");

    if !report.violations.is_empty() {
        let mut violations = Table::new();
        violations
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Rule", "Seq", "Description"]);
        for v in &report.violations {
            violations.add_row(vec![
                v.rule.clone(),
                v.sequence.map(|s| s.to_string()).unwrap_or_default(),
                v.description.clone(),
            ]);
        }
        println!("{violations}");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frameworks() {
        assert_eq!(parse_frameworks("all").unwrap().len(), 3);
        assert_eq!(
            parse_frameworks("hipaa,fda").unwrap(),
            vec![Framework::Hipaa, Framework::Fda21Cfr11]
        );
        assert!(parse_frameworks("sox").is_err());
    }
}
