//! Native probers.
//!
//! In-process fallbacks that let most stages produce results when none of
//! the external tools are installed. They rank below every external adapter
//! in the catalog.

mod crtsh;
mod dirs;
mod dns;
mod http;
mod services;
mod tcp;
mod wordlists;

pub use crtsh::CrtShProber;
pub use dirs::WordlistDirProber;
pub use dns::DnsBruteProber;
pub use http::HttpProbeProber;
pub use services::{service_name, TOP_PORTS};
pub use tcp::TcpConnectProber;
pub use wordlists::{load_wordlist, Wordlist, DEFAULT_DIRECTORIES, DEFAULT_SUBDOMAINS};

use crate::error::ProbeFailure;
use crate::prober::traits::{BoxedProber, FindingStream, ProbeOptions};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// User agent sent by the HTTP-based native probers.
pub const USER_AGENT: &str = concat!("bountyx/", env!("CARGO_PKG_VERSION"));

/// Every native prober, ready to register.
pub fn natives() -> Vec<BoxedProber> {
    vec![
        Arc::new(DnsBruteProber::new()),
        Arc::new(CrtShProber::new()),
        Arc::new(HttpProbeProber::new()),
        Arc::new(TcpConnectProber::new()),
        Arc::new(WordlistDirProber::new()),
    ]
}

/// Build the HTTP client shared by one native enumeration.
///
/// Certificates are not verified; recon targets often serve self-signed or
/// mismatched certificates. Redirects are not followed so status codes are
/// reported as served.
pub(crate) fn build_client(options: &ProbeOptions) -> Result<reqwest::Client, ProbeFailure> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(options.request_timeout)
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::none());

    if let Some(proxy) = &options.proxy {
        let proxy = reqwest::Proxy::all(proxy.as_str())
            .map_err(|e| ProbeFailure::invalid_input(format!("invalid proxy {}: {}", proxy, e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ProbeFailure::tool(format!("failed to build HTTP client: {}", e)))
}

/// A stream that fails immediately.
pub(crate) fn failed(failure: ProbeFailure) -> FindingStream {
    stream::once(async move { Err(failure) }).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_native_ids_are_unique() {
        let natives = natives();
        let ids: HashSet<_> = natives.iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids.len(), natives.len());
    }

    #[test]
    fn test_natives_rank_below_external_tools() {
        assert!(natives().iter().all(|p| p.descriptor().priority <= 50));
    }

    #[test]
    fn test_build_client_rejects_bad_proxy() {
        let options = ProbeOptions {
            proxy: Some("not a proxy url".into()),
            ..ProbeOptions::default()
        };
        let err = build_client(&options).unwrap_err();
        assert_eq!(err.kind, crate::error::ProbeFailureKind::InvalidInput);
    }
}
