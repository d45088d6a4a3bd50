//! DNS brute-force subdomain prober.
//!
//! Resolves `<word>.<domain>` for every word of the DNS wordlist. A random
//! label is resolved first; names that only resolve to the wildcard
//! addresses it returns are discarded.

use crate::error::ProbeFailure;
use crate::prober::native::{failed, load_wordlist, Wordlist, DEFAULT_SUBDOMAINS};
use crate::prober::rate_limiter::{pace, RateLimiter};
use crate::prober::traits::{FindingStream, ProbeContext, ProbeOptions, Prober, ProberDescriptor};
use crate::store::Finding;
use crate::types::{StageKind, Target, TargetSet};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;
use uuid::Uuid;

/// Subdomain prober resolving wordlist candidates.
///
/// Unavailable when traffic must go through the anonymizing proxy, since
/// lookups would leave the host directly.
pub struct DnsBruteProber {
    descriptor: ProberDescriptor,
}

impl DnsBruteProber {
    pub fn new() -> Self {
        Self {
            descriptor: ProberDescriptor::new("dns-brute", StageKind::Subdomain, 50),
        }
    }
}

impl Default for DnsBruteProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for DnsBruteProber {
    fn descriptor(&self) -> &ProberDescriptor {
        &self.descriptor
    }

    async fn is_available(&self, options: &ProbeOptions) -> bool {
        !options.anonymize()
    }

    fn enumerate(&self, targets: TargetSet, ctx: ProbeContext) -> FindingStream {
        let domains = domains_of(&targets);
        if domains.is_empty() {
            return failed(ProbeFailure::invalid_input("no domain in target set"));
        }

        let id = self.descriptor.id.clone();
        let ProbeContext { options, cancel } = ctx;
        let concurrency = options.concurrency.max(1);

        stream::once(prepare(domains, options))
            .flat_map(move |prepared| match prepared {
                Ok(brute) => brute.run(id.clone(), concurrency),
                Err(failure) => failed(failure),
            })
            .take_until(cancel.cancelled_owned())
            .boxed()
    }
}

/// Domains among the target set's hosts.
pub(crate) fn domains_of(targets: &TargetSet) -> Vec<String> {
    targets
        .hosts()
        .into_iter()
        .filter(|h| Target::classify(h).is_domain())
        .map(|h| h.to_ascii_lowercase())
        .collect()
}

struct BruteForce {
    resolver: TokioAsyncResolver,
    words: Wordlist,
    domains: Vec<String>,
    wildcards: Arc<HashMap<String, HashSet<IpAddr>>>,
    limiter: Option<RateLimiter>,
}

async fn prepare(domains: Vec<String>, options: Arc<ProbeOptions>) -> Result<BruteForce, ProbeFailure> {
    let words = load_wordlist(options.dns_wordlist.as_deref(), DEFAULT_SUBDOMAINS).await?;

    let mut opts = ResolverOpts::default();
    opts.timeout = options.request_timeout;
    opts.attempts = 1;
    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);

    let mut wildcards = HashMap::new();
    for domain in &domains {
        let probe = format!("{}.{}", Uuid::new_v4().simple(), domain);
        let addrs = resolve(&resolver, &probe).await;
        if !addrs.is_empty() {
            info!(domain = %domain, addrs = addrs.len(), "wildcard DNS detected");
        }
        wildcards.insert(domain.clone(), addrs.into_iter().collect());
    }

    Ok(BruteForce {
        resolver,
        words,
        domains,
        wildcards: Arc::new(wildcards),
        limiter: options.limiter.clone(),
    })
}

impl BruteForce {
    fn run(self, id: String, concurrency: usize) -> FindingStream {
        let BruteForce {
            resolver,
            words,
            domains,
            wildcards,
            limiter,
        } = self;

        let candidates: Vec<(String, String)> = domains
            .iter()
            .flat_map(|d| words.iter().map(move |w| (d.clone(), format!("{}.{}", w, d))))
            .collect();

        stream::iter(candidates)
            .map(move |(domain, name)| {
                let resolver = resolver.clone();
                let wildcards = Arc::clone(&wildcards);
                let limiter = limiter.clone();
                let id = id.clone();
                async move {
                    pace(&limiter).await;
                    let addrs = resolve(&resolver, &name).await;
                    if addrs.is_empty() {
                        return None;
                    }
                    if let Some(wild) = wildcards.get(&domain) {
                        if !wild.is_empty() && addrs.iter().all(|a| wild.contains(a)) {
                            debug!(name = %name, "dropping wildcard answer");
                            return None;
                        }
                    }
                    let ips: BTreeSet<String> = addrs.iter().map(IpAddr::to_string).collect();
                    Some(
                        Finding::new(StageKind::Subdomain, name, id)
                            .with_attribute("ips", ips.into_iter().collect::<Vec<_>>().join(",")),
                    )
                }
            })
            .buffer_unordered(concurrency)
            .filter_map(|found| async move { found })
            .map(Ok)
            .boxed()
    }
}

async fn resolve(resolver: &TokioAsyncResolver, name: &str) -> Vec<IpAddr> {
    match resolver.lookup_ip(name).await {
        Ok(response) => response.iter().collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains_of_skips_ips() {
        let targets = TargetSet::new(vec![
            "Example.com".into(),
            "10.0.0.1".into(),
            "https://api.example.com/login".into(),
        ]);
        assert_eq!(domains_of(&targets), vec!["example.com", "api.example.com"]);
    }

    #[tokio::test]
    async fn test_unavailable_when_proxied() {
        let prober = DnsBruteProber::new();
        let options = ProbeOptions {
            proxy: Some("socks5h://127.0.0.1:9050".into()),
            ..ProbeOptions::default()
        };
        assert!(!prober.is_available(&options).await);
        assert!(prober.is_available(&ProbeOptions::default()).await);
    }

    #[tokio::test]
    async fn test_ip_only_targets_are_invalid_input() {
        let prober = DnsBruteProber::new();
        let ctx = ProbeContext::new(Arc::new(ProbeOptions::default()), Default::default());
        let mut stream = prober.enumerate(TargetSet::single("10.0.0.1"), ctx);
        let first = stream.next().await.unwrap().unwrap_err();
        assert_eq!(first.kind, crate::error::ProbeFailureKind::InvalidInput);
    }
}
