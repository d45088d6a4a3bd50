//! Target classification and per-stage target set derivation.
//!
//! Classification is total: anything that is not a dotted-quad IPv4
//! address, an IPv4 CIDR range or a plausible hostname becomes
//! [`TargetKind::Unknown`], which the pipeline rejects before any stage runs.

use crate::store::Finding;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use url::Url;

/// Kind of scan target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Domain,
    Ipv4,
    Cidr,
    Unknown,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain => write!(f, "domain"),
            Self::Ipv4 => write!(f, "IPv4"),
            Self::Cidr => write!(f, "CIDR"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified scan target. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    raw: String,
    kind: TargetKind,
}

impl Target {
    /// Classify a raw target string.
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();

        let kind = if is_dotted_quad(trimmed) {
            TargetKind::Ipv4
        } else if is_ipv4_cidr(trimmed) {
            TargetKind::Cidr
        } else if is_valid_hostname(trimmed) {
            TargetKind::Domain
        } else {
            TargetKind::Unknown
        };

        let raw = match kind {
            TargetKind::Domain => trimmed.trim_end_matches('.').to_ascii_lowercase(),
            _ => trimmed.to_string(),
        };

        Self { raw, kind }
    }

    /// The normalized target string.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn is_domain(&self) -> bool {
        self.kind == TargetKind::Domain
    }

    /// Endpoints used when the stage feeding a stage produced nothing.
    pub fn default_endpoints(&self) -> TargetSet {
        match self.kind {
            TargetKind::Domain => TargetSet::new(vec![
                format!("http://{}", self.raw),
                format!("https://{}", self.raw),
            ]),
            TargetKind::Ipv4 | TargetKind::Cidr | TargetKind::Unknown => {
                TargetSet::new(vec![self.raw.clone()])
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.raw, self.kind)
    }
}

/// Classify a raw target string.
pub fn classify(raw: &str) -> Target {
    Target::classify(raw)
}

/// Derive the target set for a stage from the findings of the stage it depends on.
///
/// Non-empty prior findings are used verbatim in first-seen order; otherwise
/// the target kind's default endpoints apply.
pub fn derive_target_set(target: &Target, prior: &[Finding]) -> TargetSet {
    if prior.is_empty() {
        return target.default_endpoints();
    }
    TargetSet::new(prior.iter().map(|f| f.subject.clone()).collect())
}

/// Ordered sequence of endpoints (bare hosts, `host:port` pairs or URLs)
/// handed to a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetSet {
    endpoints: Vec<String>,
}

impl TargetSet {
    /// Maximum number of hosts a CIDR endpoint expands to.
    pub const MAX_CIDR_HOSTS: usize = 65536;

    pub fn new(endpoints: Vec<String>) -> Self {
        Self { endpoints }
    }

    pub fn single(endpoint: impl Into<String>) -> Self {
        Self::new(vec![endpoint.into()])
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.endpoints
    }

    /// Bare hosts (scheme, port and path stripped), deduplicated in order.
    ///
    /// CIDR endpoints are kept as-is for tools that understand ranges.
    pub fn hosts(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.endpoints
            .iter()
            .filter_map(|e| host_of(e))
            .filter(|h| seen.insert(h.clone()))
            .collect()
    }

    /// Like [`hosts`](Self::hosts) but with CIDR ranges expanded to their
    /// usable addresses, capped at [`MAX_CIDR_HOSTS`](Self::MAX_CIDR_HOSTS).
    pub fn expanded_hosts(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for host in self.hosts() {
            match host.parse::<Ipv4Network>() {
                Ok(network) if host.contains('/') => {
                    for ip in network.iter().filter(|ip| is_usable_host(&network, ip)) {
                        if out.len() >= Self::MAX_CIDR_HOSTS {
                            return out;
                        }
                        let ip = ip.to_string();
                        if seen.insert(ip.clone()) {
                            out.push(ip);
                        }
                    }
                }
                _ => {
                    if seen.insert(host.clone()) {
                        out.push(host);
                    }
                }
            }
        }

        out
    }

    /// Endpoints as URLs. Scheme-less endpoints yield both an `http://` and
    /// an `https://` variant. Trailing slashes are removed.
    pub fn urls(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for endpoint in &self.endpoints {
            let candidates = if endpoint.contains("://") {
                vec![endpoint.trim_end_matches('/').to_string()]
            } else {
                let bare = endpoint.trim_end_matches('/');
                vec![format!("http://{}", bare), format!("https://{}", bare)]
            };
            for url in candidates {
                if seen.insert(url.clone()) {
                    out.push(url);
                }
            }
        }

        out
    }
}

impl From<Vec<String>> for TargetSet {
    fn from(endpoints: Vec<String>) -> Self {
        Self::new(endpoints)
    }
}

impl<'a> IntoIterator for &'a TargetSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.endpoints.iter()
    }
}

/// Extract the host part of an endpoint.
fn host_of(endpoint: &str) -> Option<String> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return None;
    }

    if endpoint.contains("://") {
        let url = Url::parse(endpoint).ok()?;
        return url.host_str().map(|h| h.to_ascii_lowercase());
    }

    if is_ipv4_cidr(endpoint) {
        return Some(endpoint.to_string());
    }

    let without_path = endpoint.split('/').next().unwrap_or(endpoint);
    let host = match without_path.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => without_path,
    };
    Some(host.to_ascii_lowercase())
}

fn is_usable_host(network: &Ipv4Network, ip: &Ipv4Addr) -> bool {
    // Network and broadcast addresses are not scannable below /31.
    if network.prefix() < 31 {
        return *ip != network.network() && *ip != network.broadcast();
    }
    true
}

/// Dotted-quad IPv4 with every octet in 0..=255.
fn is_dotted_quad(s: &str) -> bool {
    let octets: Vec<&str> = s.split('.').collect();
    if octets.len() != 4 {
        return false;
    }
    let structurally_valid = octets.iter().all(|o| {
        !o.is_empty() && o.len() <= 3 && o.chars().all(|c| c.is_ascii_digit())
    });
    structurally_valid && octets.iter().all(|o| o.parse::<u16>().map_or(false, |v| v <= 255))
}

/// `a.b.c.d/prefix` with a valid dotted quad and a prefix of at most 32.
fn is_ipv4_cidr(s: &str) -> bool {
    let Some((addr, prefix)) = s.split_once('/') else {
        return false;
    };
    if !is_dotted_quad(addr) || prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    prefix.parse::<u8>().map_or(false, |p| p <= 32)
        && matches!(addr.parse::<IpAddr>(), Ok(IpAddr::V4(_)))
}

/// RFC-1123-style hostname with at least two labels and a non-numeric TLD.
fn is_valid_hostname(s: &str) -> bool {
    let s = s.trim_end_matches('.');
    if s.is_empty() || s.len() > 253 || !s.contains('.') {
        return false;
    }

    for label in s.split('.') {
        if label.is_empty() || label.len() > 63 {
            return false;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return false;
        }
    }

    s.rsplit('.')
        .next()
        .map_or(false, |tld| !tld.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageKind;

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(classify("256.1.1.1").kind(), TargetKind::Unknown);
        assert_eq!(classify("10.0.0.0/24").kind(), TargetKind::Cidr);
        assert_eq!(classify("example.com").kind(), TargetKind::Domain);
        assert_eq!(classify("192.168.1.1").kind(), TargetKind::Ipv4);
    }

    #[test]
    fn test_classification_rejects_garbage() {
        assert_eq!(classify("").kind(), TargetKind::Unknown);
        assert_eq!(classify("localhost").kind(), TargetKind::Unknown);
        assert_eq!(classify("-bad.example.com").kind(), TargetKind::Unknown);
        assert_eq!(classify("10.0.0.0/33").kind(), TargetKind::Unknown);
        assert_eq!(classify("10.0.0/24").kind(), TargetKind::Unknown);
        assert_eq!(classify("exa mple.com").kind(), TargetKind::Unknown);
        assert_eq!(classify("http://example.com").kind(), TargetKind::Unknown);
    }

    #[test]
    fn test_domain_is_normalized() {
        let target = classify("  Example.COM. ");
        assert_eq!(target.kind(), TargetKind::Domain);
        assert_eq!(target.raw(), "example.com");
    }

    #[test]
    fn test_domain_fallback_is_http_then_https() {
        let target = classify("example.com");
        let set = derive_target_set(&target, &[]);
        assert_eq!(
            set.as_slice(),
            &["http://example.com".to_string(), "https://example.com".to_string()]
        );
    }

    #[test]
    fn test_ip_and_cidr_fallback_is_raw() {
        let ip = classify("10.1.2.3");
        assert_eq!(derive_target_set(&ip, &[]).as_slice(), &["10.1.2.3".to_string()]);

        let cidr = classify("10.0.0.0/30");
        assert_eq!(
            derive_target_set(&cidr, &[]).as_slice(),
            &["10.0.0.0/30".to_string()]
        );
    }

    #[test]
    fn test_prior_findings_used_verbatim() {
        let target = classify("example.com");
        let prior = vec![
            Finding::new(StageKind::LiveHost, "https://api.example.com", "httpx"),
            Finding::new(StageKind::LiveHost, "http://www.example.com", "httpx"),
        ];
        let set = derive_target_set(&target, &prior);
        assert_eq!(
            set.as_slice(),
            &[
                "https://api.example.com".to_string(),
                "http://www.example.com".to_string()
            ]
        );
    }

    #[test]
    fn test_hosts_strip_scheme_port_and_path() {
        let set = TargetSet::new(vec![
            "https://www.example.com/login".into(),
            "http://www.example.com".into(),
            "api.example.com:8443".into(),
            "10.0.0.0/24".into(),
        ]);
        assert_eq!(
            set.hosts(),
            vec!["www.example.com", "api.example.com", "10.0.0.0/24"]
        );
    }

    #[test]
    fn test_expanded_hosts_skip_network_and_broadcast() {
        let set = TargetSet::single("192.168.1.0/30");
        assert_eq!(set.expanded_hosts(), vec!["192.168.1.1", "192.168.1.2"]);
    }

    #[test]
    fn test_urls_expand_bare_hosts() {
        let set = TargetSet::new(vec!["10.0.0.1".into(), "https://example.com/".into()]);
        assert_eq!(
            set.urls(),
            vec!["http://10.0.0.1", "https://10.0.0.1", "https://example.com"]
        );
    }
}
