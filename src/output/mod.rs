//! Output formatting module.
//!
//! Renders a finished run as a JSON document, a styled text listing, a
//! triage report or CSV rows.

mod csv_format;
mod json_format;
mod plain;
mod report;

pub use csv_format::write_csv;
pub use json_format::write_json;
pub use plain::{print_error, print_info, print_success, print_warning, write_text};
pub use report::write_report;

use crate::pipeline::RunReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};

/// Output format for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The whole run as one JSON document.
    Json,
    /// Styled listing of findings per stage.
    #[default]
    #[value(alias = "plain")]
    Text,
    /// Analysis with recommendations and stage diagnostics.
    Report,
    /// One row per finding.
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Text => write!(f, "text"),
            Self::Report => write!(f, "report"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

impl OutputFormat {
    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text | Self::Report => "txt",
            Self::Csv => "csv",
        }
    }
}

/// Render `report` in `format` to `out`.
pub fn render(report: &RunReport, format: OutputFormat, out: &mut dyn Write) -> io::Result<()> {
    match format {
        OutputFormat::Json => write_json(report, out),
        OutputFormat::Text => write_text(report, out),
        OutputFormat::Report => write_report(report, out),
        OutputFormat::Csv => write_csv(report, out),
    }
}

/// Render `report` to stdout.
pub fn print_report(report: &RunReport, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    render(report, format, &mut out)?;
    out.flush()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::error::ProbeFailure;
    use crate::pipeline::{RunReport, RunStatus};
    use crate::scheduler::{ProberOutcome, StageReport, StageStatus};
    use crate::store::Finding;
    use crate::types::{RunId, StageKind, Target};
    use chrono::Utc;
    use std::collections::BTreeMap;

    pub fn sample_report() -> RunReport {
        let mut findings = BTreeMap::new();
        findings.insert(
            StageKind::Subdomain,
            vec![
                Finding::new(StageKind::Subdomain, "www.example.com", "subfinder"),
                Finding::new(StageKind::Subdomain, "admin.example.com", "crtsh"),
            ],
        );
        findings.insert(
            StageKind::PortScan,
            vec![Finding::new(StageKind::PortScan, "www.example.com:22", "naabu")
                .with_attribute("service", "ssh")],
        );

        let outcome = |prober: &str, failure: Option<ProbeFailure>| ProberOutcome {
            prober: prober.to_string(),
            emitted: 1,
            new_findings: 1,
            failure,
            abandoned: false,
            elapsed_ms: 5,
        };
        let stage = |stage, status, probers| StageReport {
            stage,
            status,
            policy: None,
            targets: 1,
            unavailable: Vec::new(),
            probers,
            findings: 1,
            note: None,
            elapsed_ms: 10,
        };

        RunReport {
            id: RunId::new(),
            target: Target::classify("example.com"),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            status: RunStatus::CompletedWithWarnings,
            aborted: false,
            stages: vec![
                stage(
                    StageKind::Subdomain,
                    StageStatus::Done,
                    vec![
                        outcome("subfinder", None),
                        outcome("amass", Some(ProbeFailure::tool("amass exited with 1"))),
                    ],
                ),
                stage(StageKind::PortScan, StageStatus::Done, vec![outcome("naabu", None)]),
            ],
            findings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_format_renders() {
        let report = fixtures::sample_report();
        for format in [
            OutputFormat::Json,
            OutputFormat::Text,
            OutputFormat::Report,
            OutputFormat::Csv,
        ] {
            let mut buf = Vec::new();
            render(&report, format, &mut buf).unwrap();
            let text = String::from_utf8(buf).unwrap();
            assert!(text.contains("www.example.com"), "{} output lacks findings", format);
        }
    }
}
