//! CLI subcommand definitions and handlers.
//!
//! Implements a git-like subcommand architecture:
//! - `bountyx run <target>` - Run the recon pipeline against a target
//! - `bountyx tools` - Show registered probers and their availability
//! - `bountyx history` - List stored runs
//! - `bountyx export <run>` - Re-render a stored run

mod export;
mod history;
mod progress;
mod run;
mod tools;

pub use export::ExportCommand;
pub use history::HistoryCommand;
pub use run::RunCommand;
pub use tools::ToolsCommand;

use crate::config::AppSettings;
use crate::error::CliResult;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// BountyX - a concurrent multi-stage recon pipeline.
///
/// Runs subdomain enumeration, live host detection, port scanning,
/// directory enumeration, vulnerability scanning and screenshots against
/// a domain, IPv4 address or IPv4 CIDR range, driving external tools when
/// they are installed and built-in probers otherwise.
#[derive(Parser, Debug)]
#[command(name = "bountyx")]
#[command(author = "HueCodes <huecodes@proton.me>")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A concurrent multi-stage recon pipeline", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to an alternate settings file
    #[arg(long, global = true, value_name = "PATH", env = "BOUNTYX_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the recon pipeline against a target
    #[command(alias = "r")]
    Run(RunCommand),

    /// Show registered probers and whether they can run here
    #[command(alias = "t")]
    Tools(ToolsCommand),

    /// List stored runs
    #[command(alias = "h")]
    History(HistoryCommand),

    /// Export a stored run
    #[command(alias = "e")]
    Export(ExportCommand),
}

impl Cli {
    /// Settings from `--config`, or the default settings file.
    pub fn settings(&self) -> CliResult<AppSettings> {
        let settings = match &self.config {
            Some(path) => AppSettings::load_from(path)?,
            None => AppSettings::load()?,
        };
        Ok(settings)
    }

    /// Dispatch to the selected subcommand.
    pub async fn execute(&self) -> CliResult<()> {
        let settings = self.settings()?;
        match &self.command {
            Commands::Run(cmd) => cmd.execute(&settings, self.quiet).await,
            Commands::Tools(cmd) => cmd.execute(&settings, self.quiet).await,
            Commands::History(cmd) => cmd.execute(self.quiet),
            Commands::Export(cmd) => cmd.execute(self.quiet),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use crate::types::StageKind;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_stages() {
        let cli = Cli::parse_from([
            "bountyx", "run", "example.com", "--stage", "subdomain", "--stage", "ports", "-f", "json",
        ]);
        match cli.command {
            Commands::Run(cmd) => {
                assert_eq!(cmd.target, "example.com");
                assert_eq!(cmd.stages, vec![StageKind::Subdomain, StageKind::PortScan]);
                assert_eq!(cmd.format, Some(OutputFormat::Json));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_stage_list_is_comma_separated() {
        let cli = Cli::parse_from(["bountyx", "run", "example.com", "-s", "livehost,dirs"]);
        let Commands::Run(cmd) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(cmd.stages, vec![StageKind::LiveHost, StageKind::DirectoryEnum]);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["bountyx", "history", "-n", "3", "--verbose"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::History(ref h) if h.count == 3));
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["bountyx", "-v", "-q", "tools"]).is_err());
    }
}
