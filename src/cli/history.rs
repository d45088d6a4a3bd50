//! History subcommand implementation.

use crate::error::CliResult;
use crate::storage::RunStore;
use clap::Parser;

/// List stored runs, newest first.
#[derive(Parser, Debug)]
pub struct HistoryCommand {
    /// Number of recent runs to show
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Show per-stage status for each run
    #[arg(short, long)]
    pub detailed: bool,
}

impl HistoryCommand {
    /// Execute the history command.
    pub fn execute(&self, quiet: bool) -> CliResult<()> {
        let store = RunStore::new()?;
        let runs = store.list_recent(self.count)?;

        if runs.is_empty() {
            if !quiet {
                println!("No stored runs found in {}.", store.runs_dir().display());
            }
            return Ok(());
        }

        if !quiet {
            println!();
        }
        for run in &runs {
            println!("{:<40} {}", run.name, run.line());
            if self.detailed {
                let report = store.load(&run.name)?;
                for stage in &report.stages {
                    println!(
                        "    {:<16} {:<18} {} findings",
                        stage.stage.to_string(),
                        stage.status.to_string(),
                        stage.findings
                    );
                }
            }
        }
        if !quiet {
            println!();
        }

        Ok(())
    }
}
