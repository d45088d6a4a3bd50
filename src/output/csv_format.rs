//! CSV output formatting.

use crate::pipeline::RunReport;
use std::io::{self, Write};

/// Write one row per finding.
///
/// Attributes are flattened to `key=value` pairs joined by `;`.
pub fn write_csv(report: &RunReport, out: &mut dyn Write) -> io::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record(["stage", "subject", "discovered_by", "timestamp", "attributes"])?;

    for (stage, findings) in &report.findings {
        for finding in findings {
            let attributes = finding
                .attributes
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(";");
            wtr.write_record([
                stage.slug(),
                &finding.subject,
                &finding.discovered_by.join(";"),
                &finding.timestamp.to_rfc3339(),
                &attributes,
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::sample_report;

    #[test]
    fn test_csv_rows() {
        let mut buf = Vec::new();
        write_csv(&sample_report(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "stage,subject,discovered_by,timestamp,attributes");
        assert_eq!(lines.len(), 4);
        assert!(lines[3].starts_with("ports,www.example.com:22,naabu,"));
        assert!(lines[3].ends_with(",service=ssh"));
    }
}
