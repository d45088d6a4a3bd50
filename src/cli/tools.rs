//! Tools subcommand implementation.
//!
//! Lists every registered prober per stage with its priority, the stage's
//! fan-out policy and whether the prober can run on this machine.

use crate::config::AppSettings;
use crate::error::CliResult;
use crate::prober::{ProbeOptions, ProberRegistry};
use crate::types::StageKind;
use clap::Parser;
use console::style;

/// Show registered probers and their availability.
#[derive(Parser, Debug)]
pub struct ToolsCommand {
    /// Only show this stage
    #[arg(short = 's', long = "stage", value_enum)]
    pub stage: Option<StageKind>,

    /// Check availability as if the anonymizing proxy were enabled
    #[arg(long)]
    pub proxy: bool,
}

/// One row of the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRow {
    pub stage: StageKind,
    pub id: String,
    pub priority: u8,
    pub available: bool,
}

/// Collect rows for `stages` in pipeline then priority order.
pub async fn rows(
    registry: &ProberRegistry,
    stages: &[StageKind],
    options: &ProbeOptions,
) -> Vec<ToolRow> {
    let mut rows = Vec::new();
    for &stage in stages {
        for prober in registry.for_stage(stage) {
            let descriptor = prober.descriptor();
            rows.push(ToolRow {
                stage,
                id: descriptor.id.clone(),
                priority: descriptor.priority,
                available: prober.is_available(options).await,
            });
        }
    }
    rows
}

impl ToolsCommand {
    /// Execute the tools command.
    pub async fn execute(&self, settings: &AppSettings, quiet: bool) -> CliResult<()> {
        let registry = settings.registry();
        let options = settings
            .run_options()
            .with_anonymizing_proxy(self.proxy || settings.use_anonymizing_proxy)
            .probe_options();
        let stages: Vec<StageKind> = match self.stage {
            Some(stage) => vec![stage],
            None => StageKind::ALL.to_vec(),
        };

        let rows = rows(&registry, &stages, &options).await;

        if !quiet {
            println!("\n{:<16} {:<16} {:>8}  {:<16} {}", "STAGE", "PROBER", "PRIORITY", "POLICY", "STATUS");
            println!("{}", "-".repeat(70));
        }

        for row in &rows {
            let status = if row.available {
                style("available").green()
            } else {
                style("missing").red()
            };
            println!(
                "{:<16} {:<16} {:>8}  {:<16} {}",
                row.stage.to_string(),
                row.id,
                row.priority,
                registry.policy(row.stage).to_string(),
                status
            );
        }

        if !quiet {
            let ready = rows.iter().filter(|r| r.available).count();
            println!("\n{} of {} probers available\n", ready, rows.len());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prober::native::TcpConnectProber;
    use crate::prober::ToolSpec;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_rows_report_availability() {
        let mut registry = ProberRegistry::new();
        registry.register(Arc::new(TcpConnectProber::new()));
        registry.register_tool(ToolSpec {
            id: "ghost-scan".to_string(),
            stage: StageKind::PortScan,
            priority: 95,
            binary: "bountyx-no-such-binary".to_string(),
            args: Vec::new(),
            input: Default::default(),
            endpoints: Default::default(),
            format: Default::default(),
        });

        let rows = rows(&registry, &[StageKind::PortScan], &ProbeOptions::default()).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "ghost-scan");
        assert!(!rows[0].available);
        assert_eq!(rows[1].id, "tcp-connect");
        assert!(rows[1].available);
    }
}
