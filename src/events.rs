//! Progress events emitted while a run executes.
//!
//! The pipeline and scheduler publish these on an unbounded channel so a
//! front end (the CLI spinner, a test) can follow a run without touching
//! the store. Sending never blocks and a dropped receiver is ignored.

use crate::scheduler::{ProberOutcome, StageReport, StageState};
use crate::types::StageKind;
use tokio::sync::mpsc;

/// A single progress notification.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A stage moved to a new scheduler state.
    StageState { stage: StageKind, state: StageState },
    /// A stage was not run.
    StageSkipped { stage: StageKind, reason: String },
    /// A prober call began.
    ProberStarted { stage: StageKind, prober: String },
    /// A prober call ended, successfully or not.
    ProberFinished { stage: StageKind, outcome: ProberOutcome },
    /// A subject was seen for the first time in a stage.
    FindingAdded {
        stage: StageKind,
        subject: String,
        prober: String,
    },
    /// A stage reached a terminal state.
    StageFinished { report: StageReport },
}

pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Create an event channel.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Publish an event if anyone is listening.
pub(crate) fn emit(events: &Option<EventSender>, event: PipelineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}
