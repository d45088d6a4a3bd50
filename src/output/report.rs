//! Triage report formatting.

use crate::analysis::{Priority, RunAnalysis};
use crate::output::plain::write_header;
use crate::pipeline::RunReport;
use console::style;
use std::io::{self, Write};

/// Write the analysis document followed by per-stage diagnostics.
pub fn write_report(report: &RunReport, out: &mut dyn Write) -> io::Result<()> {
    let analysis = RunAnalysis::from_report(report);
    write_header(report, "Analysis Report", out)?;

    let summary = &analysis.summary;
    writeln!(out, "  {}", style("Summary").bold().underlined())?;
    writeln!(out, "    Subdomains:   {}", summary.subdomain_count)?;
    writeln!(out, "    Live hosts:   {}", summary.live_host_count)?;
    writeln!(out, "    Open ports:   {}", summary.open_port_count)?;
    writeln!(out, "    Directories:  {}", summary.directory_count)?;
    writeln!(out, "    Screenshots:  {}", summary.screenshot_count)?;
    let counts = &summary.vulnerability_count;
    writeln!(
        out,
        "    Vulnerabilities: {} critical, {} high, {} medium, {} low, {} info",
        style(counts.critical).red().bold(),
        style(counts.high).red(),
        style(counts.medium).yellow(),
        counts.low,
        counts.info
    )?;
    writeln!(out)?;

    if !analysis.interesting_subdomains.is_empty() {
        writeln!(out, "  {}", style("Interesting subdomains").bold().underlined())?;
        for subdomain in &analysis.interesting_subdomains {
            writeln!(out, "    - {}", subdomain)?;
        }
        writeln!(out)?;
    }

    if !analysis.interesting_directories.is_empty() {
        writeln!(out, "  {}", style("Interesting directories").bold().underlined())?;
        for directory in &analysis.interesting_directories {
            writeln!(out, "    - {}", directory)?;
        }
        writeln!(out)?;
    }

    if !analysis.vulnerabilities.is_empty() {
        writeln!(out, "  {}", style("Vulnerabilities").bold().underlined())?;
        for vuln in &analysis.vulnerabilities {
            writeln!(
                out,
                "    - {} [{}] {}",
                vuln.title,
                vuln.severity.to_string().to_uppercase(),
                style(&vuln.url).dim()
            )?;
        }
        writeln!(out)?;
    }

    for priority in Priority::ALL {
        let items: Vec<_> = analysis.recommendations_for(priority).collect();
        if items.is_empty() {
            continue;
        }
        writeln!(
            out,
            "  {} ({})",
            style(priority.heading()).bold().underlined(),
            priority.timeframe()
        )?;
        for item in items {
            writeln!(out, "    - {}", item.title)?;
            writeln!(out, "      {}", item.description)?;
            writeln!(out, "      {}", style(&item.recommendation).dim())?;
            for step in &item.steps {
                writeln!(out, "        * {}", step)?;
            }
        }
        writeln!(out)?;
    }

    writeln!(out, "  {}", style("Stage diagnostics").bold().underlined())?;
    for stage in &report.stages {
        writeln!(
            out,
            "    {}: {} ({} findings, {} ms)",
            stage.stage, stage.status, stage.findings, stage.elapsed_ms
        )?;
        if let Some(note) = &stage.note {
            writeln!(out, "      note: {}", note)?;
        }
        for outcome in &stage.probers {
            match &outcome.failure {
                Some(failure) => writeln!(
                    out,
                    "      {} {}: {} ({} emitted)",
                    style("✗").red(),
                    outcome.prober,
                    failure,
                    outcome.emitted
                )?,
                None => writeln!(
                    out,
                    "      {} {}: {} emitted, {} new",
                    style("✓").green(),
                    outcome.prober,
                    outcome.emitted,
                    outcome.new_findings
                )?,
            }
        }
        if !stage.unavailable.is_empty() {
            writeln!(out, "      unavailable: {}", stage.unavailable.join(", "))?;
        }
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::sample_report;

    #[test]
    fn test_report_sections() {
        let mut buf = Vec::new();
        write_report(&sample_report(), &mut buf).unwrap();
        let text = console::strip_ansi_codes(&String::from_utf8(buf).unwrap()).to_string();

        assert!(text.contains("Subdomains:   2"));
        assert!(text.contains("- admin.example.com"));
        assert!(text.contains("Remote Access Service on Port 22"));
        assert!(text.contains("Within 1-2 weeks"));
        assert!(text.contains("amass: external tool error: amass exited with 1"));
    }
}
