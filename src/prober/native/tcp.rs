//! TCP connect port prober.
//!
//! Performs plain connect() scans through the operating system's socket
//! API. Reliable and unprivileged, but every probe completes the handshake
//! and is easily logged by the target.

use crate::error::ProbeFailure;
use crate::prober::native::{failed, service_name};
use crate::prober::rate_limiter::pace;
use crate::prober::traits::{FindingStream, ProbeContext, ProbeOptions, Prober, ProberDescriptor};
use crate::store::Finding;
use crate::types::{StageKind, TargetSet};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// State of a probed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

/// Port prober connecting to each configured port of every host.
///
/// Unavailable when traffic must go through the anonymizing proxy.
pub struct TcpConnectProber {
    descriptor: ProberDescriptor,
}

impl TcpConnectProber {
    pub fn new() -> Self {
        Self {
            descriptor: ProberDescriptor::new("tcp-connect", StageKind::PortScan, 10),
        }
    }
}

impl Default for TcpConnectProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for TcpConnectProber {
    fn descriptor(&self) -> &ProberDescriptor {
        &self.descriptor
    }

    async fn is_available(&self, options: &ProbeOptions) -> bool {
        !options.anonymize()
    }

    fn enumerate(&self, targets: TargetSet, ctx: ProbeContext) -> FindingStream {
        let hosts = targets.expanded_hosts();
        if hosts.is_empty() {
            return failed(ProbeFailure::invalid_input("empty target set"));
        }
        if ctx.options.ports.is_empty() {
            return failed(ProbeFailure::invalid_input("no ports configured"));
        }

        let ports = ctx.options.ports.clone();
        let probes: Vec<(String, u16)> = hosts
            .into_iter()
            .flat_map(|host| ports.iter().map(move |&port| (host.clone(), port)))
            .collect();
        let limiter = ctx.options.limiter.clone();
        let connect_timeout = ctx.options.request_timeout;
        let id = self.descriptor.id.clone();

        stream::iter(probes)
            .map(move |(host, port)| {
                let limiter = limiter.clone();
                let id = id.clone();
                async move {
                    pace(&limiter).await;
                    match attempt_connect(&host, port, connect_timeout).await {
                        PortState::Open => Some(open_port(&id, &host, port)),
                        state => {
                            trace!(host = %host, port, state = ?state, "port not open");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(ctx.options.concurrency.max(1))
            .filter_map(|found| async move { found })
            .map(Ok)
            .take_until(ctx.cancel.cancelled_owned())
            .boxed()
    }
}

fn open_port(id: &str, host: &str, port: u16) -> Finding {
    let finding = Finding::new(StageKind::PortScan, format!("{}:{}", host, port), id)
        .with_attribute("host", host)
        .with_attribute("port", port.to_string());
    match service_name(port) {
        Some(service) => finding.with_attribute("service", service),
        None => finding,
    }
}

/// Attempt a connection and classify the outcome.
pub async fn attempt_connect(host: &str, port: u16, limit: Duration) -> PortState {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => PortState::Open,
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => PortState::Closed,
        Ok(Err(_)) | Err(_) => PortState::Filtered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        assert_eq!(
            attempt_connect("127.0.0.1", open, Duration::from_secs(1)).await,
            PortState::Open
        );

        drop(listener);
        assert_ne!(
            attempt_connect("127.0.0.1", open, Duration::from_secs(1)).await,
            PortState::Open
        );
    }

    #[tokio::test]
    async fn test_enumerate_reports_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let options = ProbeOptions {
            ports: vec![port],
            request_timeout: Duration::from_secs(1),
            ..ProbeOptions::default()
        };
        let ctx = ProbeContext::new(Arc::new(options), Default::default());

        let findings: Vec<_> = TcpConnectProber::new()
            .enumerate(TargetSet::single("127.0.0.1"), ctx)
            .collect()
            .await;
        assert_eq!(findings.len(), 1);
        let finding = findings[0].as_ref().unwrap();
        assert_eq!(finding.subject, format!("127.0.0.1:{}", port));
        assert_eq!(finding.attribute("port"), Some(port.to_string().as_str()));
    }

    #[test]
    fn test_open_port_service_attribute() {
        let finding = open_port("tcp-connect", "10.0.0.1", 22);
        assert_eq!(finding.attribute("service"), Some("ssh"));
        assert_eq!(finding.subject, "10.0.0.1:22");
    }
}
