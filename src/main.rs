use anyhow::Result;
use bountyx::cli::Cli;
use bountyx::error::{CliError, ReconError};
use bountyx::{logging, output};
use clap::Parser;
use std::process::ExitCode;

/// Exit code for targets that are neither a domain, IPv4 address nor CIDR range.
const EXIT_INVALID_TARGET: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::print_error(&format!("{:#}", err));
            match err.downcast_ref::<CliError>() {
                Some(CliError::Recon(ReconError::InvalidTarget(_))) => {
                    ExitCode::from(EXIT_INVALID_TARGET)
                }
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    cli.execute().await?;
    Ok(())
}
