//! Export subcommand implementation.
//!
//! Handles `bountyx export <run>`: loads a stored run and renders it in
//! any output format.

use crate::error::CliResult;
use crate::output::{self, OutputFormat};
use crate::pipeline::RunReport;
use crate::storage::RunStore;
use crate::types::StageKind;
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Export a stored run.
#[derive(Parser, Debug)]
pub struct ExportCommand {
    /// Run directory name, name prefix, or run id prefix
    #[arg(value_name = "RUN")]
    pub run: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Output file path (prints to stdout if not specified)
    #[arg(short = 'o', long = "output")]
    pub output_file: Option<PathBuf>,

    /// Only export findings of these stages
    #[arg(short = 's', long = "stage", value_enum, value_delimiter = ',')]
    pub stages: Vec<StageKind>,
}

impl ExportCommand {
    /// Drop findings of stages that were not asked for.
    fn filter(&self, report: &mut RunReport) {
        if !self.stages.is_empty() {
            report.findings.retain(|stage, _| self.stages.contains(stage));
        }
    }

    /// Execute the export command.
    pub fn execute(&self, quiet: bool) -> CliResult<()> {
        let store = RunStore::new()?;
        let mut report = store.find(&self.run)?;
        self.filter(&mut report);

        match &self.output_file {
            Some(path) => {
                let mut out = BufWriter::new(File::create(path)?);
                output::render(&report, self.format, &mut out)?;
                out.flush()?;
                if !quiet {
                    output::print_success(&format!(
                        "Exported run {} to {}",
                        report.id.short(),
                        path.display()
                    ));
                }
            }
            None => output::print_report(&report, self.format)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::sample_report;

    #[test]
    fn test_stage_filter() {
        let cmd = ExportCommand::parse_from(["export", "abc", "-s", "ports"]);
        let mut report = sample_report();
        cmd.filter(&mut report);
        assert!(report.findings(StageKind::Subdomain).is_empty());
        assert_eq!(report.findings(StageKind::PortScan).len(), 1);
    }

    #[test]
    fn test_default_format_is_json() {
        let cmd = ExportCommand::parse_from(["export", "abc"]);
        assert_eq!(cmd.format, OutputFormat::Json);
        assert!(cmd.stages.is_empty());
    }
}
