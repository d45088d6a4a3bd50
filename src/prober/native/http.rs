//! HTTP live-host prober.

use crate::error::ProbeFailure;
use crate::prober::native::{build_client, failed};
use crate::prober::rate_limiter::pace;
use crate::prober::traits::{FindingStream, ProbeContext, ProbeOptions, Prober, ProberDescriptor};
use crate::store::Finding;
use crate::types::{StageKind, TargetSet};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::SERVER;
use tracing::debug;

/// Longest title kept, in characters.
const MAX_TITLE_LEN: usize = 120;

/// Live-host prober issuing one GET per URL variant of each endpoint.
///
/// Any HTTP response, redirects and errors included, marks the URL live.
pub struct HttpProbeProber {
    descriptor: ProberDescriptor,
}

impl HttpProbeProber {
    pub fn new() -> Self {
        Self {
            descriptor: ProberDescriptor::new("http-probe", StageKind::LiveHost, 10),
        }
    }
}

impl Default for HttpProbeProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for HttpProbeProber {
    fn descriptor(&self) -> &ProberDescriptor {
        &self.descriptor
    }

    async fn is_available(&self, _options: &ProbeOptions) -> bool {
        true
    }

    fn enumerate(&self, targets: TargetSet, ctx: ProbeContext) -> FindingStream {
        let urls = targets.urls();
        if urls.is_empty() {
            return failed(ProbeFailure::invalid_input("empty target set"));
        }
        let client = match build_client(&ctx.options) {
            Ok(client) => client,
            Err(failure) => return failed(failure),
        };
        let limiter = ctx.options.limiter.clone();
        let id = self.descriptor.id.clone();

        stream::iter(urls)
            .map(move |url| {
                let client = client.clone();
                let limiter = limiter.clone();
                let id = id.clone();
                async move {
                    pace(&limiter).await;
                    probe(&client, url, id).await
                }
            })
            .buffer_unordered(ctx.options.concurrency.max(1))
            .filter_map(|found| async move { found })
            .map(Ok)
            .take_until(ctx.cancel.cancelled_owned())
            .boxed()
    }
}

async fn probe(client: &reqwest::Client, url: String, id: String) -> Option<Finding> {
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(url = %url, error = %e, "no HTTP response");
            return None;
        }
    };

    let status = response.status().as_u16();
    let server = response
        .headers()
        .get(SERVER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let title = response.text().await.ok().and_then(|body| extract_title(&body));

    let mut finding =
        Finding::new(StageKind::LiveHost, url, id).with_attribute("status", status.to_string());
    if let Some(title) = title {
        finding = finding.with_attribute("title", title);
    }
    if let Some(server) = server {
        finding = finding.with_attribute("server", server);
    }
    Some(finding)
}

/// Contents of the first `<title>` element, whitespace collapsed.
pub(crate) fn extract_title(body: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;

    let title = body[start..end].split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        return None;
    }
    Some(title.chars().take(MAX_TITLE_LEN).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        let body = "<html><head><TITLE lang=\"en\">\n  Admin   Login </TITLE></head></html>";
        assert_eq!(extract_title(body).as_deref(), Some("Admin Login"));
    }

    #[test]
    fn test_extract_title_missing_or_empty() {
        assert_eq!(extract_title("<html><body>hi</body></html>"), None);
        assert_eq!(extract_title("<title>   </title>"), None);
        assert_eq!(extract_title("<title>unterminated"), None);
    }

    #[test]
    fn test_extract_title_truncates() {
        let body = format!("<title>{}</title>", "a".repeat(500));
        assert_eq!(extract_title(&body).unwrap().len(), MAX_TITLE_LEN);
    }
}
