//! Run subcommand implementation.
//!
//! Handles `bountyx run <target>`: merges flags over the settings file,
//! runs the pipeline with a progress display, stores the run and prints
//! the result.

use crate::cli::progress;
use crate::config::AppSettings;
use crate::error::{CliError, CliResult};
use crate::events;
use crate::output::{self, OutputFormat};
use crate::pipeline::{Pipeline, RunOptions, StageSelection};
use crate::storage::RunStore;
use crate::types::{StageKind, Target};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the recon pipeline against a target.
#[derive(Parser, Debug)]
pub struct RunCommand {
    /// Target to investigate (domain, IPv4 address or IPv4 CIDR range)
    ///
    /// Examples:
    ///   example.com        Domain, all stages
    ///   192.168.1.10       Single host, subdomain stage skipped
    ///   10.0.0.0/24        CIDR range, subdomain stage skipped
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Only run these stages (repeat or comma-separate; default: all)
    #[arg(short = 's', long = "stage", value_enum, value_delimiter = ',')]
    pub stages: Vec<StageKind>,

    /// Output format for results
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Maximum number of prober calls running at once
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Per-prober timeout in seconds
    #[arg(short = 't', long = "timeout", value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Whole-stage timeout in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub stage_timeout: Option<u64>,

    /// Worker threads handed to each tool and native prober
    #[arg(long)]
    pub threads: Option<usize>,

    /// Route traffic through the anonymizing proxy
    #[arg(long, visible_alias = "anon")]
    pub proxy: bool,

    /// Proxy URL used with --proxy
    #[arg(long, value_name = "URL", requires = "proxy")]
    pub proxy_url: Option<String>,

    /// Requests per second for native probers (0 = unlimited)
    #[arg(short = 'r', long = "rate")]
    pub rate_limit: Option<u32>,

    /// Wordlist for DNS brute forcing
    #[arg(long, value_name = "PATH")]
    pub dns_wordlist: Option<PathBuf>,

    /// Wordlist for directory enumeration
    #[arg(long, value_name = "PATH")]
    pub dir_wordlist: Option<PathBuf>,

    /// Ports for native port scanning (e.g. "22,80,443")
    #[arg(short = 'p', long, value_delimiter = ',')]
    pub ports: Vec<u16>,

    /// Start from the findings of a stored run (name or id prefix)
    #[arg(long, value_name = "RUN")]
    pub resume: Option<String>,

    /// Don't save the run
    #[arg(long)]
    pub no_save: bool,

    /// Write the rendered result to a file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output_file: Option<PathBuf>,
}

impl RunCommand {
    /// Merge flags over `settings` into immutable run options.
    pub fn options(&self, settings: &AppSettings) -> CliResult<RunOptions> {
        let mut options = settings.run_options();
        if let Some(format) = self.format {
            options = options.with_output_format(format);
        }
        if let Some(concurrency) = self.concurrency {
            options = options.with_concurrency(concurrency);
        }
        if let Some(secs) = self.timeout {
            options = options.with_per_probe_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.stage_timeout {
            options = options.with_stage_timeout(Some(Duration::from_secs(secs)));
        }
        if let Some(threads) = self.threads {
            options.threads = threads.max(1);
        }
        if self.proxy {
            options = options.with_anonymizing_proxy(true);
        }
        if let Some(url) = &self.proxy_url {
            options.proxy_url = url.clone();
        }
        if let Some(rate) = self.rate_limit {
            options.rate_limit = rate;
        }
        if self.dns_wordlist.is_some() {
            options.dns_wordlist = self.dns_wordlist.clone();
        }
        if self.dir_wordlist.is_some() {
            options.dir_wordlist = self.dir_wordlist.clone();
        }
        if !self.ports.is_empty() {
            options.ports = self.ports.clone();
        }
        options.validate()?;
        Ok(options)
    }

    fn selection(&self) -> StageSelection {
        if self.stages.is_empty() {
            StageSelection::All
        } else {
            StageSelection::only(self.stages.iter().copied())
        }
    }

    /// Execute the run command.
    pub async fn execute(&self, settings: &AppSettings, quiet: bool) -> CliResult<()> {
        let options = self.options(settings)?;
        let format = options.output_format;
        let (tx, rx) = events::channel();

        let mut pipeline = Pipeline::new(settings.registry(), options).with_events(tx);
        if let Some(reference) = &self.resume {
            let (previous, store) = RunStore::new()?.load_store(reference)?;
            if previous.target != Target::classify(&self.target) {
                warn!(
                    previous = %previous.target,
                    target = %self.target,
                    "resuming from a run against a different target"
                );
            }
            if !quiet {
                output::print_info(&format!(
                    "Resuming from run {} ({} findings)",
                    previous.id.short(),
                    store.total()
                ));
            }
            pipeline = pipeline.with_store(store);
        }

        let cancel = CancellationToken::new();
        let interrupt = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping the current stage");
                    cancel.cancel();
                }
            }
        });
        let display = tokio::spawn(progress::follow(rx, quiet));

        let result = pipeline.run(&self.target, &self.selection(), &cancel).await;
        interrupt.abort();
        // Dropping the pipeline closes the event channel so the display ends.
        drop(pipeline);
        let _ = display.await;
        let report = result?;

        if !self.no_save && settings.auto_save_runs {
            let dir = RunStore::new()?.save(&report)?;
            info!(path = %dir.display(), "run saved");
            if !quiet {
                output::print_info(&format!("Run saved to {}", dir.display()));
            }
        }

        match &self.output_file {
            Some(path) => {
                let file = File::create(path)?;
                let mut out = BufWriter::new(file);
                output::render(&report, format, &mut out)?;
                out.flush()?;
                if !quiet {
                    output::print_success(&format!(
                        "Wrote {} output to {}",
                        format,
                        path.display()
                    ));
                }
            }
            None => output::print_report(&report, format)?,
        }

        if report.aborted {
            return Err(CliError::Other("run aborted by operator".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    fn parse(args: &[&str]) -> RunCommand {
        let mut full = vec!["run"];
        full.extend_from_slice(args);
        RunCommand::parse_from(full)
    }

    #[test]
    fn test_flags_override_settings() {
        let settings = AppSettings::default();
        let cmd = parse(&["example.com", "-c", "3", "-t", "1", "--proxy", "--rate", "20", "-p", "22,80"]);
        let options = cmd.options(&settings).unwrap();

        assert_eq!(options.concurrency, 3);
        assert_eq!(options.per_probe_timeout, Duration::from_secs(1));
        assert!(options.use_anonymizing_proxy);
        assert_eq!(options.rate_limit, 20);
        assert_eq!(options.ports, vec![22, 80]);
    }

    #[test]
    fn test_settings_kept_without_flags() {
        let settings = AppSettings {
            concurrency: 4,
            rate_limit: 7,
            ..AppSettings::default()
        };
        let options = parse(&["example.com"]).options(&settings).unwrap();
        assert_eq!(options.concurrency, 4);
        assert_eq!(options.rate_limit, 7);
        assert!(!options.use_anonymizing_proxy);
    }

    #[test]
    fn test_empty_stage_list_selects_all() {
        assert_eq!(parse(&["example.com"]).selection(), StageSelection::All);
        assert_eq!(
            parse(&["example.com", "-s", "vuln"]).selection(),
            StageSelection::only([StageKind::VulnScan])
        );
    }

    #[test]
    fn test_zero_timeouts_rejected_at_parse() {
        assert!(RunCommand::try_parse_from(["run", "example.com", "-t", "0"]).is_err());
        assert!(RunCommand::try_parse_from(["run", "example.com", "--stage-timeout", "0"]).is_err());
    }

    #[test]
    fn test_oversized_timeout_is_a_config_error() {
        let max = u64::MAX.to_string();
        let cmd = parse(&["example.com", "-t", &max]);
        let err = cmd.options(&AppSettings::default()).unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::InvalidValue(_))));

        let cmd = parse(&["example.com", "--stage-timeout", &max]);
        assert!(cmd.options(&AppSettings::default()).is_err());
    }

    #[test]
    fn test_proxy_url_requires_proxy() {
        assert!(RunCommand::try_parse_from(["run", "example.com", "--proxy-url", "socks5h://x:1"]).is_err());
    }
}
