//! Prober trait abstraction.
//!
//! Defines a common interface for every prober, external tool adapters and
//! native implementations alike, so the scheduler can dispatch them
//! interchangeably.

use crate::error::ProbeFailure;
use crate::prober::rate_limiter::RateLimiter;
use crate::store::Finding;
use crate::types::{StageKind, TargetSet};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lazy, finite stream of findings produced by one `enumerate` call.
///
/// An `Err` item ends the call; findings yielded before it are kept.
pub type FindingStream = BoxStream<'static, Result<Finding, ProbeFailure>>;

/// How the scheduler picks among the available probers of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutPolicy {
    /// Run every available prober and union their findings.
    FanOutAll,
    /// Run only the highest-priority available prober.
    FirstAvailable,
}

impl fmt::Display for FanOutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FanOutAll => write!(f, "fan-out-all"),
            Self::FirstAvailable => write!(f, "first-available"),
        }
    }
}

/// Static description of a prober.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProberDescriptor {
    /// Unique prober identifier, recorded as `discovered_by` on findings.
    pub id: String,
    /// Stage this prober serves.
    pub stage: StageKind,
    /// Higher runs first under [`FanOutPolicy::FirstAvailable`].
    pub priority: u8,
}

impl ProberDescriptor {
    pub fn new(id: impl Into<String>, stage: StageKind, priority: u8) -> Self {
        Self {
            id: id.into(),
            stage,
            priority,
        }
    }
}

/// Options threaded from the run configuration into every prober call.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Worker count a prober may use internally (the thread-count setting).
    pub concurrency: usize,
    /// Timeout for a single network request made by native probers.
    pub request_timeout: Duration,
    /// Proxy URL to route traffic through, set when anonymizing.
    pub proxy: Option<String>,
    /// Run-wide request pacing for native probers, `None` for unlimited.
    pub limiter: Option<RateLimiter>,
    /// Wordlist for DNS brute forcing.
    pub dns_wordlist: Option<PathBuf>,
    /// Wordlist for directory enumeration.
    pub dir_wordlist: Option<PathBuf>,
    /// Ports checked by native port scanning.
    pub ports: Vec<u16>,
}

impl ProbeOptions {
    /// Whether traffic must go through the anonymizing proxy.
    pub fn anonymize(&self) -> bool {
        self.proxy.is_some()
    }
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            concurrency: 50,
            request_timeout: Duration::from_secs(10),
            proxy: None,
            limiter: None,
            dns_wordlist: None,
            dir_wordlist: None,
            ports: crate::prober::native::TOP_PORTS.to_vec(),
        }
    }
}

/// Per-call context handed to [`Prober::enumerate`].
#[derive(Debug, Clone)]
pub struct ProbeContext {
    pub options: Arc<ProbeOptions>,
    /// Cancelled on per-call timeout, stage timeout or operator abort.
    pub cancel: CancellationToken,
}

impl ProbeContext {
    pub fn new(options: Arc<ProbeOptions>, cancel: CancellationToken) -> Self {
        Self { options, cancel }
    }
}

/// Trait for prober implementations.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
///
/// async fn first_finding(prober: &dyn Prober, targets: TargetSet, ctx: ProbeContext) {
///     let mut stream = prober.enumerate(targets, ctx);
///     if let Some(Ok(finding)) = stream.next().await {
///         println!("{} found {}", prober.descriptor().id, finding.subject);
///     }
/// }
/// ```
#[async_trait]
pub trait Prober: Send + Sync {
    /// Identity, stage and priority of this prober.
    fn descriptor(&self) -> &ProberDescriptor;

    /// Cheap, side-effect-free availability check, queried once per stage.
    async fn is_available(&self, options: &ProbeOptions) -> bool;

    /// Start an enumeration over `targets`.
    ///
    /// Nothing runs until the returned stream is polled. Each call re-executes
    /// the underlying scan. Implementations stop producing findings soon after
    /// `ctx.cancel` fires.
    fn enumerate(&self, targets: TargetSet, ctx: ProbeContext) -> FindingStream;

    /// Convenience accessor for the prober id.
    fn id(&self) -> &str {
        &self.descriptor().id
    }
}

/// A shared prober for dynamic dispatch.
pub type BoxedProber = Arc<dyn Prober>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_policy_display() {
        assert_eq!(FanOutPolicy::FanOutAll.to_string(), "fan-out-all");
        assert_eq!(FanOutPolicy::FirstAvailable.to_string(), "first-available");
    }

    #[test]
    fn test_anonymize_follows_proxy() {
        let mut options = ProbeOptions::default();
        assert!(!options.anonymize());
        options.proxy = Some("socks5h://127.0.0.1:9050".into());
        assert!(options.anonymize());
    }
}
