//! Plain text output formatting.
//!
//! Produces human-readable output with colors and formatting.

use crate::pipeline::{RunReport, RunStatus};
use crate::scheduler::StageStatus;
use crate::store::Finding;
use console::{style, Style};
use std::io::{self, Write};

const RULE: &str = "═══════════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────────";

/// Write the run header shared by the text and report formats.
pub(crate) fn write_header(report: &RunReport, title: &str, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out, "                    {} {}", style("BountyX").cyan().bold(), title)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;

    writeln!(
        out,
        "  {} {} ({})",
        style("Target:").bold(),
        report.target,
        report.target.kind()
    )?;
    writeln!(out, "  {} {}", style("Run ID:").bold(), style(report.id.short()).dim())?;
    let status_style = match report.status {
        RunStatus::Completed => Style::new().green().bold(),
        RunStatus::CompletedWithWarnings => Style::new().yellow().bold(),
    };
    writeln!(
        out,
        "  {} {}{}",
        style("Status:").bold(),
        status_style.apply_to(report.status.to_string()),
        if report.aborted { " (aborted)" } else { "" }
    )?;
    writeln!(
        out,
        "  {} {} findings in {:.2}s",
        style("Statistics:").bold(),
        report.total_findings(),
        report.duration().num_milliseconds() as f64 / 1000.0
    )?;
    writeln!(out)
}

/// Write findings grouped by stage.
pub fn write_text(report: &RunReport, out: &mut dyn Write) -> io::Result<()> {
    write_header(report, "Recon Results", out)?;

    for stage in &report.stages {
        let status_style = match stage.status {
            StageStatus::Done => Style::new().green(),
            StageStatus::PartiallyFailed => Style::new().yellow(),
            StageStatus::Skipped => Style::new().dim(),
        };
        writeln!(out, "  {}", style(THIN_RULE).dim())?;
        writeln!(
            out,
            "  {} [{}] {} findings",
            style(stage.stage.to_string()).bold(),
            status_style.apply_to(stage.status.to_string()),
            report.findings(stage.stage).len()
        )?;
        writeln!(out, "  {}", style(THIN_RULE).dim())?;

        let findings = report.findings(stage.stage);
        if findings.is_empty() {
            let note = stage.note.as_deref().unwrap_or("nothing found");
            writeln!(out, "    {}", style(note).dim())?;
        }
        for finding in findings {
            writeln!(out, "    {}  {}", finding.subject, style(attribute_summary(finding)).dim())?;
        }
        writeln!(out)?;
    }

    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)
}

/// Attributes and discoverers of a finding as one short line.
fn attribute_summary(finding: &Finding) -> String {
    let mut parts: Vec<String> = finding
        .attributes
        .iter()
        .map(|(k, v)| format!("{}={}", k, truncate_string(v, 40)))
        .collect();
    parts.push(format!("via {}", finding.discovered_by.join(",")));
    parts.join(" ")
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), msg);
}

/// Print a success message.
pub fn print_success(msg: &str) {
    eprintln!("{} {}", style("✓").green().bold(), msg);
}

/// Print an info message.
pub fn print_info(msg: &str) {
    eprintln!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Truncate a string to a maximum number of characters, adding an ellipsis.
pub(crate) fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::sample_report;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_text_lists_findings_per_stage() {
        let mut buf = Vec::new();
        write_text(&sample_report(), &mut buf).unwrap();
        let text = console::strip_ansi_codes(&String::from_utf8(buf).unwrap()).to_string();
        assert!(text.contains("Subdomain Enumeration [done] 2 findings"));
        assert!(text.contains("www.example.com:22  service=ssh via naabu"));
    }
}
