//! Certificate transparency subdomain prober backed by crt.sh.

use crate::error::ProbeFailure;
use crate::prober::native::dns::domains_of;
use crate::prober::native::{build_client, failed};
use crate::prober::traits::{FindingStream, ProbeContext, ProbeOptions, Prober, ProberDescriptor};
use crate::store::Finding;
use crate::types::{StageKind, TargetSet};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;
use url::Url;

const CRTSH_URL: &str = "https://crt.sh/";

#[derive(Debug, Deserialize)]
struct CertEntry {
    name_value: String,
}

/// Subdomain prober querying the crt.sh certificate log search.
pub struct CrtShProber {
    descriptor: ProberDescriptor,
}

impl CrtShProber {
    pub fn new() -> Self {
        Self {
            descriptor: ProberDescriptor::new("crtsh", StageKind::Subdomain, 40),
        }
    }
}

impl Default for CrtShProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for CrtShProber {
    fn descriptor(&self) -> &ProberDescriptor {
        &self.descriptor
    }

    async fn is_available(&self, _options: &ProbeOptions) -> bool {
        true
    }

    fn enumerate(&self, targets: TargetSet, ctx: ProbeContext) -> FindingStream {
        let domains = domains_of(&targets);
        if domains.is_empty() {
            return failed(ProbeFailure::invalid_input("no domain in target set"));
        }
        let client = match build_client(&ctx.options) {
            Ok(client) => client,
            Err(failure) => return failed(failure),
        };
        let id = self.descriptor.id.clone();

        stream::iter(domains)
            .then(move |domain| {
                let client = client.clone();
                let id = id.clone();
                async move {
                    let names = query(&client, &domain).await?;
                    Ok::<_, ProbeFailure>(
                        names
                            .into_iter()
                            .map(|name| {
                                Finding::new(StageKind::Subdomain, name, id.clone())
                                    .with_attribute("source", "crt.sh")
                            })
                            .collect::<Vec<_>>(),
                    )
                }
            })
            .flat_map(|batch| match batch {
                Ok(findings) => stream::iter(findings.into_iter().map(Ok)).boxed(),
                Err(failure) => failed(failure),
            })
            .take_until(ctx.cancel.cancelled_owned())
            .boxed()
    }
}

async fn query(client: &reqwest::Client, domain: &str) -> Result<Vec<String>, ProbeFailure> {
    let url = Url::parse_with_params(
        CRTSH_URL,
        &[("q", format!("%.{}", domain)), ("output", "json".to_string())],
    )
    .map_err(|e| ProbeFailure::invalid_input(e.to_string()))?;

    debug!(url = %url, "querying certificate transparency log");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProbeFailure::tool(format!("crt.sh request failed: {}", e)))?;
    if !response.status().is_success() {
        return Err(ProbeFailure::tool(format!("crt.sh returned {}", response.status())));
    }
    let entries: Vec<CertEntry> = response
        .json()
        .await
        .map_err(|e| ProbeFailure::tool(format!("crt.sh returned malformed JSON: {}", e)))?;

    Ok(names_in_scope(entries.iter().map(|e| e.name_value.as_str()), domain))
}

/// Split certificate names, strip wildcards and keep in-scope names once.
fn names_in_scope<'a>(values: impl Iterator<Item = &'a str>, domain: &str) -> Vec<String> {
    let suffix = format!(".{}", domain);
    let mut seen = HashSet::new();
    values
        .flat_map(|v| v.split('\n'))
        .map(|n| n.trim().trim_start_matches("*.").to_ascii_lowercase())
        .filter(|n| n == domain || n.ends_with(&suffix))
        .filter(|n| seen.insert(n.clone()))
        .collect()
}
