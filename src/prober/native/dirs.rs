//! Wordlist directory prober.
//!
//! Requests `<base>/<word>` for every base URL and word. A request for a
//! random path is made first to learn how the server answers unknown paths;
//! responses matching that baseline are treated as not found.

use crate::error::ProbeFailure;
use crate::prober::native::{build_client, failed, load_wordlist, Wordlist, DEFAULT_DIRECTORIES};
use crate::prober::rate_limiter::{pace, RateLimiter};
use crate::prober::traits::{FindingStream, ProbeContext, ProbeOptions, Prober, ProberDescriptor};
use crate::store::Finding;
use crate::types::{StageKind, TargetSet};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// How a server answers a path that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub status: u16,
    pub length: usize,
}

impl Baseline {
    /// Whether a response looks like a real hit rather than a not-found page.
    pub fn is_hit(&self, status: u16, length: usize) -> bool {
        if status == StatusCode::NOT_FOUND.as_u16() {
            return false;
        }
        !(status == self.status && length == self.length)
    }
}

/// Directory prober driven by the directory wordlist.
pub struct WordlistDirProber {
    descriptor: ProberDescriptor,
}

impl WordlistDirProber {
    pub fn new() -> Self {
        Self {
            descriptor: ProberDescriptor::new("wordlist-dir", StageKind::DirectoryEnum, 10),
        }
    }
}

impl Default for WordlistDirProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for WordlistDirProber {
    fn descriptor(&self) -> &ProberDescriptor {
        &self.descriptor
    }

    async fn is_available(&self, _options: &ProbeOptions) -> bool {
        true
    }

    fn enumerate(&self, targets: TargetSet, ctx: ProbeContext) -> FindingStream {
        let bases = targets.urls();
        if bases.is_empty() {
            return failed(ProbeFailure::invalid_input("empty target set"));
        }
        let client = match build_client(&ctx.options) {
            Ok(client) => client,
            Err(failure) => return failed(failure),
        };

        let id = self.descriptor.id.clone();
        let ProbeContext { options, cancel } = ctx;
        let concurrency = options.concurrency.max(1);

        stream::once(prepare(client, bases, options))
            .flat_map(move |prepared| match prepared {
                Ok(scan) => scan.run(id.clone(), concurrency),
                Err(failure) => failed(failure),
            })
            .take_until(cancel.cancelled_owned())
            .boxed()
    }
}

struct DirScan {
    client: reqwest::Client,
    words: Wordlist,
    bases: Vec<(String, Baseline)>,
    limiter: Option<RateLimiter>,
}

async fn prepare(
    client: reqwest::Client,
    urls: Vec<String>,
    options: Arc<ProbeOptions>,
) -> Result<DirScan, ProbeFailure> {
    let words = load_wordlist(options.dir_wordlist.as_deref(), DEFAULT_DIRECTORIES).await?;

    let mut bases = Vec::new();
    for base in urls {
        let probe = format!("{}/{}", base, Uuid::new_v4().simple());
        match fetch(&client, &probe).await {
            Some((status, length)) => bases.push((base, Baseline { status, length })),
            None => debug!(base = %base, "base URL unreachable, skipping"),
        }
    }

    Ok(DirScan {
        client,
        words,
        bases,
        limiter: options.limiter.clone(),
    })
}

impl DirScan {
    fn run(self, id: String, concurrency: usize) -> FindingStream {
        let DirScan {
            client,
            words,
            bases,
            limiter,
        } = self;

        let requests: Vec<(String, Baseline)> = bases
            .iter()
            .flat_map(|(base, baseline)| {
                words
                    .iter()
                    .map(move |w| (format!("{}/{}", base, w.trim_start_matches('/')), *baseline))
            })
            .collect();

        stream::iter(requests)
            .map(move |(url, baseline)| {
                let client = client.clone();
                let limiter = limiter.clone();
                let id = id.clone();
                async move {
                    pace(&limiter).await;
                    let (status, length) = fetch(&client, &url).await?;
                    if !baseline.is_hit(status, length) {
                        return None;
                    }
                    Some(
                        Finding::new(StageKind::DirectoryEnum, url, id)
                            .with_attribute("status", status.to_string())
                            .with_attribute("length", length.to_string()),
                    )
                }
            })
            .buffer_unordered(concurrency)
            .filter_map(|found| async move { found })
            .map(Ok)
            .boxed()
    }
}

async fn fetch(client: &reqwest::Client, url: &str) -> Option<(u16, usize)> {
    let response = client.get(url).send().await.ok()?;
    let status = response.status().as_u16();
    let length = response.bytes().await.map(|b| b.len()).unwrap_or(0);
    Some((status, length))
}
