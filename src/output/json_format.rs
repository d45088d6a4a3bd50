//! JSON output formatting.

use crate::pipeline::RunReport;
use std::io::{self, Write};

/// Write the whole run as pretty-printed JSON.
pub fn write_json(report: &RunReport, out: &mut dyn Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
    writeln!(out, "{}", json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::sample_report;

    #[test]
    fn test_json_roundtrips() {
        let report = sample_report();
        let mut buf = Vec::new();
        write_json(&report, &mut buf).unwrap();
        let parsed: RunReport = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed, report);
    }
}
