//! External tool adapter.
//!
//! A [`CommandProber`] wraps one scanning binary described by a [`ToolSpec`]:
//! how to invoke it, how to feed it the target set, and how to turn its
//! output lines into findings. A tool is available when its binary resolves
//! on `PATH` and every wordlist its arguments reference is configured. The
//! child process is killed when the stream is cancelled or dropped.
//!
//! In argument mode each endpoint gets its own process. A failing process is
//! logged and the remaining endpoints still run; the call only fails when
//! every invocation failed.

use crate::error::ProbeFailure;
use crate::prober::traits::{
    FindingStream, ProbeContext, ProbeOptions, Prober, ProberDescriptor,
};
use crate::store::Finding;
use crate::types::{StageKind, TargetSet};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Wrapper used to route external tools through the anonymizing proxy.
pub const PROXY_WRAPPER: &str = "proxychains4";

/// Trailing stderr lines kept for the failure detail of a tool.
const STDERR_TAIL: usize = 5;

/// How long a failed tool's stderr reader gets to reach end of file.
const STDERR_WAIT: Duration = Duration::from_secs(1);

/// How the target set reaches the tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetInput {
    /// One invocation, endpoints written to stdin one per line.
    #[default]
    Stdin,
    /// One invocation per endpoint, substituted for `{target}`.
    Argument,
}

/// Which form of the target set the tool expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointForm {
    /// Endpoints exactly as derived.
    #[default]
    Raw,
    /// Bare hosts.
    Hosts,
    /// URLs.
    Urls,
}

/// How the tool's output lines map to findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineFormat {
    /// Whitespace-separated tokens. Indices may be negative to count from
    /// the end. Brackets, parentheses and commas around tokens are dropped.
    Tokens {
        #[serde(default)]
        subject: isize,
        #[serde(default)]
        attributes: BTreeMap<String, isize>,
        /// Prefix path-like subjects (`/admin`) with the current target.
        #[serde(default)]
        prefix_target: bool,
    },
    /// One JSON object per line. Subject and attributes are JSON pointers.
    Json {
        subject: Vec<String>,
        #[serde(default = "default_separator")]
        separator: String,
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
    /// nmap grepable output (`-oG -`), one finding per open port.
    NmapGrepable,
    /// Output is ignored; a successful invocation reports its target.
    Silent,
}

fn default_separator() -> String {
    ":".to_string()
}

impl Default for LineFormat {
    fn default() -> Self {
        Self::Tokens {
            subject: 0,
            attributes: BTreeMap::new(),
            prefix_target: false,
        }
    }
}

type Parsed = (String, BTreeMap<String, String>);

impl LineFormat {
    /// Parse one output line. `target` is the endpoint of the current
    /// invocation in argument mode.
    pub fn parse_line(&self, line: &str, target: Option<&str>) -> Vec<Parsed> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        match self {
            Self::Tokens {
                subject,
                attributes,
                prefix_target,
            } => {
                let tokens: Vec<&str> = line
                    .split_whitespace()
                    .map(|t| t.trim_matches(|c| matches!(c, '(' | ')' | '[' | ']' | ',')))
                    .filter(|t| !t.is_empty())
                    .collect();

                let Some(raw_subject) = token_at(&tokens, *subject) else {
                    return Vec::new();
                };
                let subject = match target {
                    Some(base) if *prefix_target && raw_subject.starts_with('/') => {
                        format!("{}{}", base.trim_end_matches('/'), raw_subject)
                    }
                    _ => raw_subject.to_string(),
                };

                let attrs = attributes
                    .iter()
                    .filter_map(|(key, idx)| token_at(&tokens, *idx).map(|v| (key.clone(), v.to_string())))
                    .collect();
                vec![(subject, attrs)]
            }
            Self::Json {
                subject,
                separator,
                attributes,
            } => {
                let Ok(value) = serde_json::from_str::<Value>(line) else {
                    return Vec::new();
                };

                let parts: Option<Vec<String>> = subject
                    .iter()
                    .map(|ptr| value.pointer(ptr).and_then(value_to_string))
                    .collect();
                let Some(parts) = parts else {
                    return Vec::new();
                };

                let attrs = attributes
                    .iter()
                    .filter_map(|(key, ptr)| {
                        value
                            .pointer(ptr)
                            .and_then(value_to_string)
                            .map(|v| (key.clone(), v))
                    })
                    .collect();
                vec![(parts.join(separator), attrs)]
            }
            Self::NmapGrepable => parse_nmap_grepable(line),
            Self::Silent => Vec::new(),
        }
    }
}

fn token_at<'a>(tokens: &[&'a str], idx: isize) -> Option<&'a str> {
    let idx = if idx < 0 {
        tokens.len().checked_sub(idx.unsigned_abs())?
    } else {
        idx as usize
    };
    tokens.get(idx).copied()
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let joined: Vec<String> = items.iter().filter_map(value_to_string).collect();
            (!joined.is_empty()).then(|| joined.join(","))
        }
        other => Some(other.to_string()),
    }
}

/// `Host: 10.0.0.1 ()\tPorts: 22/open/tcp//ssh//OpenSSH 8.9/, 80/closed/tcp//http///`
fn parse_nmap_grepable(line: &str) -> Vec<Parsed> {
    if !line.starts_with("Host:") {
        return Vec::new();
    }
    let Some(host) = line.split_whitespace().nth(1) else {
        return Vec::new();
    };
    let Some((_, ports)) = line.split_once("Ports:") else {
        return Vec::new();
    };
    let ports = ports.split('\t').next().unwrap_or_default();

    ports
        .split(',')
        .filter_map(|entry| {
            let fields: Vec<&str> = entry.trim().split('/').collect();
            if fields.len() < 3 || fields[1] != "open" {
                return None;
            }
            let mut attrs = BTreeMap::new();
            attrs.insert("protocol".to_string(), fields[2].to_string());
            if let Some(service) = fields.get(4).filter(|s| !s.is_empty()) {
                attrs.insert("service".to_string(), service.to_string());
            }
            if let Some(version) = fields.get(6).filter(|s| !s.is_empty()) {
                attrs.insert("version".to_string(), version.to_string());
            }
            Some((format!("{}:{}", host, fields[0]), attrs))
        })
        .collect()
}

/// Declarative description of an external tool adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub id: String,
    pub stage: StageKind,
    #[serde(default = "default_priority")]
    pub priority: u8,
    pub binary: String,
    /// Arguments; `{target}`, `{threads}`, `{dns_wordlist}` and
    /// `{dir_wordlist}` are substituted per call.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub input: TargetInput,
    #[serde(default)]
    pub endpoints: EndpointForm,
    #[serde(default)]
    pub format: LineFormat,
}

fn default_priority() -> u8 {
    60
}

impl ToolSpec {
    /// Resolve the argument template for one invocation.
    fn render_args(&self, target: Option<&str>, options: &ProbeOptions) -> Result<Vec<String>, ProbeFailure> {
        self.args
            .iter()
            .map(|arg| {
                let mut rendered = arg.replace("{threads}", &options.concurrency.to_string());
                if let Some(target) = target {
                    rendered = rendered.replace("{target}", target);
                }
                if rendered.contains("{dir_wordlist}") {
                    let path = wordlist(&options.dir_wordlist, "directory")?;
                    rendered = rendered.replace("{dir_wordlist}", &path);
                }
                if rendered.contains("{dns_wordlist}") {
                    let path = wordlist(&options.dns_wordlist, "DNS")?;
                    rendered = rendered.replace("{dns_wordlist}", &path);
                }
                Ok(rendered)
            })
            .collect()
    }

    /// The first wordlist the arguments need that `options` leaves unset.
    pub fn missing_wordlist(&self, options: &ProbeOptions) -> Option<&'static str> {
        let wants = |placeholder: &str| self.args.iter().any(|a| a.contains(placeholder));
        if wants("{dir_wordlist}") && options.dir_wordlist.is_none() {
            return Some("directory");
        }
        if wants("{dns_wordlist}") && options.dns_wordlist.is_none() {
            return Some("DNS");
        }
        None
    }

    fn endpoints(&self, targets: &TargetSet) -> Vec<String> {
        match self.endpoints {
            EndpointForm::Raw => targets.as_slice().to_vec(),
            EndpointForm::Hosts => targets.hosts(),
            EndpointForm::Urls => targets.urls(),
        }
    }
}

fn wordlist(path: &Option<PathBuf>, kind: &str) -> Result<String, ProbeFailure> {
    path.as_ref()
        .map(|p| p.display().to_string())
        .ok_or_else(|| ProbeFailure::invalid_input(format!("no {} wordlist configured", kind)))
}

/// Locate an executable on `PATH`.
pub fn find_binary(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| is_executable(p))
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.is_file() && meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        meta.is_file()
    }
}

/// One planned process launch.
#[derive(Debug, Clone)]
struct Invocation {
    args: Vec<String>,
    stdin: Option<String>,
    target: Option<String>,
}

/// Prober backed by an external binary.
pub struct CommandProber {
    descriptor: ProberDescriptor,
    spec: Arc<ToolSpec>,
}

impl CommandProber {
    pub fn new(spec: ToolSpec) -> Self {
        Self {
            descriptor: ProberDescriptor::new(spec.id.clone(), spec.stage, spec.priority),
            spec: Arc::new(spec),
        }
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn plan(&self, targets: &TargetSet, options: &ProbeOptions) -> Result<Vec<Invocation>, ProbeFailure> {
        let endpoints = self.spec.endpoints(targets);
        if endpoints.is_empty() {
            return Err(ProbeFailure::invalid_input("empty target set"));
        }

        match self.spec.input {
            TargetInput::Stdin => {
                let mut payload = endpoints.join("\n");
                payload.push('\n');
                Ok(vec![Invocation {
                    args: self.spec.render_args(None, options)?,
                    stdin: Some(payload),
                    target: None,
                }])
            }
            TargetInput::Argument => endpoints
                .into_iter()
                .map(|endpoint| {
                    Ok(Invocation {
                        args: self.spec.render_args(Some(&endpoint), options)?,
                        stdin: None,
                        target: Some(endpoint),
                    })
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Prober for CommandProber {
    fn descriptor(&self) -> &ProberDescriptor {
        &self.descriptor
    }

    async fn is_available(&self, options: &ProbeOptions) -> bool {
        if let Some(kind) = self.spec.missing_wordlist(options) {
            debug!(tool = %self.spec.id, wordlist = kind, "no wordlist configured");
            return false;
        }
        let tool = find_binary(&self.spec.binary).is_some();
        if options.anonymize() {
            tool && find_binary(PROXY_WRAPPER).is_some()
        } else {
            tool
        }
    }

    fn enumerate(&self, targets: TargetSet, ctx: ProbeContext) -> FindingStream {
        let invocations = match self.plan(&targets, &ctx.options) {
            Ok(invocations) => invocations,
            Err(failure) => return stream::once(async move { Err(failure) }).boxed(),
        };

        // Subdomain tools sometimes echo unrelated names; keep in-scope ones only.
        let scope = match self.spec.stage {
            StageKind::Subdomain => Some(Arc::new(targets.hosts())),
            _ => None,
        };
        Sweep {
            total: invocations.len(),
            spec: Arc::clone(&self.spec),
            queue: invocations.into(),
            current: None,
            scope,
            proxied: ctx.options.anonymize(),
            cancel: ctx.cancel,
            failed: 0,
            last_failure: None,
        }
        .into_stream()
    }
}

/// Runs the planned invocations of one call back to back.
struct Sweep {
    spec: Arc<ToolSpec>,
    queue: VecDeque<Invocation>,
    current: Option<(Option<String>, BoxStream<'static, Result<Finding, ProbeFailure>>)>,
    scope: Option<Arc<Vec<String>>>,
    proxied: bool,
    cancel: CancellationToken,
    total: usize,
    failed: usize,
    last_failure: Option<ProbeFailure>,
}

impl Sweep {
    fn record_failure(&mut self, target: Option<&str>, failure: ProbeFailure) {
        self.failed += 1;
        if self.total > 1 {
            warn!(
                tool = %self.spec.id,
                target = target.unwrap_or_default(),
                detail = %failure.detail,
                "invocation failed, continuing with the remaining endpoints"
            );
        }
        self.last_failure = Some(failure);
    }

    /// The failure that ends the call, if every invocation failed.
    fn verdict(&mut self) -> Option<ProbeFailure> {
        let last = self.last_failure.take()?;
        if self.failed < self.total {
            warn!(
                tool = %self.spec.id,
                failed = self.failed,
                total = self.total,
                "some invocations failed"
            );
            return None;
        }
        if self.total == 1 {
            return Some(last);
        }
        Some(ProbeFailure::new(
            last.kind,
            format!("all {} invocations failed, last: {}", self.total, last.detail),
        ))
    }

    fn into_stream(self) -> FindingStream {
        stream::unfold(Some(self), |state| async move {
            let mut sweep = state?;
            loop {
                if let Some((target, run)) = sweep.current.as_mut() {
                    match run.next().await {
                        Some(Ok(finding)) => return Some((Ok(finding), Some(sweep))),
                        Some(Err(failure)) => {
                            let target = target.take();
                            sweep.current = None;
                            sweep.record_failure(target.as_deref(), failure);
                        }
                        None => sweep.current = None,
                    }
                    continue;
                }

                if sweep.cancel.is_cancelled() {
                    return None;
                }
                let Some(invocation) = sweep.queue.pop_front() else {
                    return sweep.verdict().map(|failure| (Err(failure), None));
                };
                let target = invocation.target.clone();
                match launch(Arc::clone(&sweep.spec), invocation, sweep.proxied, sweep.cancel.clone()).await {
                    Ok(run) => sweep.current = Some((target, run.into_stream(sweep.scope.clone()))),
                    Err(failure) => sweep.record_failure(target.as_deref(), failure),
                }
            }
        })
        .boxed()
    }
}

async fn launch(
    spec: Arc<ToolSpec>,
    invocation: Invocation,
    proxied: bool,
    cancel: CancellationToken,
) -> Result<ToolRun, ProbeFailure> {
    if cancel.is_cancelled() {
        return Err(ProbeFailure::timeout("cancelled before launch"));
    }

    let mut cmd = if proxied {
        let mut cmd = Command::new(PROXY_WRAPPER);
        cmd.arg("-q").arg(&spec.binary);
        cmd
    } else {
        Command::new(&spec.binary)
    };
    cmd.args(&invocation.args)
        .stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(tool = %spec.id, args = ?invocation.args, "launching external tool");
    let mut child = cmd
        .spawn()
        .map_err(|e| ProbeFailure::tool(format!("failed to start {}: {}", spec.binary, e)))?;

    if let (Some(payload), Some(mut stdin)) = (invocation.stdin, child.stdin.take()) {
        // Feed stdin from its own task so a tool that streams output before
        // reading all input cannot deadlock against us.
        let tool = spec.id.clone();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                warn!(tool = %tool, error = %e, "failed to write targets to stdin");
            }
            let _ = stdin.shutdown().await;
        });
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ProbeFailure::tool(format!("{}: stdout not captured", spec.binary)))?;

    let stderr = child.stderr.take().map(|pipe| tokio::spawn(stderr_tail(pipe)));

    Ok(ToolRun {
        spec,
        child,
        lines: BufReader::new(stdout).lines(),
        stderr,
        target: invocation.target,
        cancel,
        pending: VecDeque::new(),
    })
}

/// Read a tool's stderr to the end, keeping the last few lines.
async fn stderr_tail(pipe: impl AsyncRead + Unpin) -> Vec<String> {
    let mut lines = BufReader::new(pipe).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

/// A running tool process whose output is being converted into findings.
struct ToolRun {
    spec: Arc<ToolSpec>,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<Vec<String>>>,
    target: Option<String>,
    cancel: CancellationToken,
    pending: VecDeque<Finding>,
}

impl ToolRun {
    fn finding(&self, subject: String, attributes: BTreeMap<String, String>) -> Finding {
        let mut finding = Finding::new(self.spec.stage, subject, self.spec.id.clone());
        finding.attributes = attributes;
        finding
    }

    fn absorb(&mut self, line: &str, scope: Option<&Vec<String>>) {
        for (subject, attrs) in self.spec.format.parse_line(line, self.target.as_deref()) {
            let subject = match scope {
                Some(domains) => {
                    let subject = subject.trim_end_matches('.').to_ascii_lowercase();
                    let in_scope = domains
                        .iter()
                        .any(|d| subject == *d || subject.ends_with(&format!(".{}", d)));
                    if !in_scope {
                        continue;
                    }
                    subject
                }
                None => subject,
            };
            let finding = self.finding(subject, attrs);
            self.pending.push_back(finding);
        }
    }

    async fn finish(mut self) -> Option<Result<Finding, ProbeFailure>> {
        match self.child.wait().await {
            Ok(status) if status.success() => match (&self.spec.format, self.target.take()) {
                (LineFormat::Silent, Some(target)) => Some(Ok(self.finding(target, BTreeMap::new()))),
                _ => None,
            },
            Ok(status) => {
                let mut detail = format!("{} exited with {}", self.spec.binary, status);
                let tail = self.stderr_tail().await;
                if !tail.is_empty() {
                    detail.push_str(": ");
                    detail.push_str(&tail.join(" | "));
                }
                Some(Err(ProbeFailure::tool(detail)))
            }
            Err(e) => Some(Err(ProbeFailure::tool(format!(
                "failed waiting for {}: {}",
                self.spec.binary, e
            )))),
        }
    }

    async fn stderr_tail(&mut self) -> Vec<String> {
        let Some(reader) = self.stderr.take() else {
            return Vec::new();
        };
        match tokio::time::timeout(STDERR_WAIT, reader).await {
            Ok(Ok(tail)) => tail,
            _ => Vec::new(),
        }
    }

    fn into_stream(self, scope: Option<Arc<Vec<String>>>) -> BoxStream<'static, Result<Finding, ProbeFailure>> {
        stream::unfold(Some(self), move |state| {
            let scope = scope.clone();
            async move {
                let mut run = state?;
                loop {
                    if let Some(finding) = run.pending.pop_front() {
                        return Some((Ok(finding), Some(run)));
                    }

                    let next = tokio::select! {
                        _ = run.cancel.cancelled() => {
                            let _ = run.child.kill().await;
                            return None;
                        }
                        line = run.lines.next_line() => line,
                    };

                    match next {
                        Ok(Some(line)) => run.absorb(&line, scope.as_deref()),
                        Ok(None) => return run.finish().await.map(|item| (item, None)),
                        Err(e) => {
                            let failure = ProbeFailure::tool(format!(
                                "failed reading {} output: {}",
                                run.spec.binary, e
                            ));
                            return Some((Err(failure), None));
                        }
                    }
                }
            }
        })
        .boxed()
    }
}
