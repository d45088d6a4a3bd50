//! Terminal progress display driven by pipeline events.

use crate::events::{EventReceiver, PipelineEvent};
use crate::scheduler::{StageState, StageStatus};
use crate::types::StageKind;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn spinner(stage: StageKind) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {prefix:.bold} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_prefix(stage.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Consume `events` until the channel closes, drawing one spinner per
/// stage on stderr. With `quiet` the events are drained silently.
pub async fn follow(mut events: EventReceiver, quiet: bool) {
    let mut current: Option<(ProgressBar, usize)> = None;

    while let Some(event) = events.recv().await {
        if quiet {
            continue;
        }
        match event {
            PipelineEvent::StageState { stage, state } => match state {
                StageState::Pending => current = Some((spinner(stage), 0)),
                StageState::Dispatching | StageState::Collecting | StageState::Merging => {
                    if let Some((pb, _)) = &current {
                        pb.set_message(state.to_string());
                    }
                }
                StageState::Done | StageState::PartiallyFailed => {}
            },
            PipelineEvent::StageSkipped { stage, reason } => {
                eprintln!("  {} {} {}", style("-").dim(), stage, style(format!("skipped: {}", reason)).dim());
            }
            PipelineEvent::ProberStarted { prober, .. } => {
                if let Some((pb, _)) = &current {
                    pb.set_message(format!("running {}", prober));
                }
            }
            PipelineEvent::FindingAdded { subject, .. } => {
                if let Some((pb, count)) = &mut current {
                    *count += 1;
                    pb.set_message(format!("{} found, latest {}", count, subject));
                }
            }
            PipelineEvent::ProberFinished { outcome, .. } => {
                if let (Some((pb, _)), Some(failure)) = (&current, &outcome.failure) {
                    pb.println(format!(
                        "  {} {} {}",
                        style("!").yellow().bold(),
                        outcome.prober,
                        style(failure).yellow()
                    ));
                }
            }
            PipelineEvent::StageFinished { report } => {
                if let Some((pb, _)) = current.take() {
                    let mark = match report.status {
                        StageStatus::Done => style("✓").green().bold(),
                        StageStatus::PartiallyFailed => style("!").yellow().bold(),
                        StageStatus::Skipped => style("-").dim(),
                    };
                    pb.finish_with_message(format!(
                        "{} {} findings ({})",
                        mark, report.findings, report.status
                    ));
                }
            }
        }
    }

    if let Some((pb, _)) = current {
        pb.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use crate::scheduler::StageReport;

    #[tokio::test]
    async fn test_follow_ends_when_channel_closes() {
        let (tx, rx) = events::channel();
        tx.send(PipelineEvent::StageState {
            stage: StageKind::Subdomain,
            state: StageState::Pending,
        })
        .unwrap();
        tx.send(PipelineEvent::StageFinished {
            report: StageReport::skipped(StageKind::Subdomain, "test"),
        })
        .unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), follow(rx, true))
            .await
            .expect("display should stop once the sender is gone");
    }
}
