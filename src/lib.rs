//! # BountyX - A Concurrent Multi-Stage Recon Pipeline
//!
//! BountyX runs a fixed sequence of reconnaissance stages against a single
//! target: subdomain enumeration, live host detection, port scanning,
//! directory enumeration, vulnerability scanning and screenshots. Each
//! stage fans out to one or more probers (external tools when installed,
//! built-in native probers otherwise) and merges their results into a
//! deduplicating finding store that feeds the next stage.
//!
//! ## Features
//!
//! - **Prober Registry**: Priority-ordered adapters with per-stage fan-out policies
//! - **Bounded Concurrency**: One run-wide budget, per-prober and per-stage timeouts
//! - **Failure Isolation**: A failing prober never stops its siblings
//! - **Flexible Targeting**: Domains, IPv4 addresses and IPv4 CIDR ranges
//! - **Run History**: Every run is stored and can be exported or resumed
//! - **Multiple Output Formats**: JSON, text, an analysis report, and CSV
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use bountyx::pipeline::{self, RunOptions, StageSelection};
//! use bountyx::types::StageKind;
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = RunOptions::default().with_concurrency(4);
//!     let selection = StageSelection::only([StageKind::Subdomain, StageKind::LiveHost]);
//!     let report = pipeline::run("example.com", &selection, options).await.unwrap();
//!
//!     for finding in report.findings(StageKind::LiveHost) {
//!         println!("{}", finding.subject);
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`types`] - Targets, target sets, stages and run ids
//! - [`store`] - The concurrent, deduplicating finding store
//! - [`prober`] - The `Prober` trait, registry, external tool and native adapters
//! - [`scheduler`] - Runs one stage's probers under the concurrency budget
//! - [`pipeline`] - Sequences stages and produces the run report
//! - [`analysis`] - Severity counts, interesting assets and recommendations
//! - [`output`] - JSON, text, report and CSV renderers
//! - [`config`] - Settings file and application paths
//! - [`storage`] - Run persistence and history
//! - [`error`] - Error types

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod prober;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use error::{CliError, ProbeFailure, ProbeFailureKind, ReconError};
pub use events::PipelineEvent;
pub use pipeline::{Pipeline, RunOptions, RunReport, RunStatus, StageSelection};
pub use prober::{FanOutPolicy, Prober, ProberRegistry};
pub use store::{Finding, FindingStore};
pub use types::{RunId, StageKind, Target, TargetKind, TargetSet};
