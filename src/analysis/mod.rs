//! Post-run analysis.
//!
//! Turns the findings of a run into a triage document: summary counts,
//! subdomains and paths worth a closer look, and remediation
//! recommendations bucketed by priority.

pub mod remediation;

use crate::pipeline::RunReport;
use crate::prober::native::service_name;
use crate::store::Finding;
use crate::types::StageKind;
use chrono::{DateTime, Utc};
use remediation::Remediation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subdomain keywords that usually point at non-public surface.
pub const INTERESTING_SUBDOMAIN_KEYWORDS: &[&str] = &[
    "admin", "dev", "staging", "test", "beta", "api", "internal", "vpn", "mail", "remote",
    "portal", "intranet", "secure", "login", "db", "database", "auth", "jenkins", "git", "svn",
    "jira", "confluence",
];

/// Path keywords that usually point at sensitive content.
pub const INTERESTING_DIRECTORY_KEYWORDS: &[&str] = &[
    ".git", ".env", "wp-admin", "admin", "backup", "db", "config", "dashboard", "login", "api",
    "test", "dev", "staging", "beta", "phpinfo", "phpmyadmin", "jenkins", "jira", "confluence",
    "password", "credentials", "sql", "database",
];

const REMOTE_ACCESS_PORTS: [u16; 4] = [22, 23, 3389, 5900];
const WEB_PORTS: [u16; 2] = [80, 443];
const FTP_PORTS: [u16; 2] = [20, 21];

/// Vulnerability severity as reported by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Parse a severity label. Anything unrecognised counts as info.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Info,
        }
    }

    fn priority(self) -> Priority {
        match self {
            Self::Critical | Self::High => Priority::High,
            Self::Medium => Priority::Medium,
            Self::Low | Self::Info => Priority::Low,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// Remediation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Self::High, Self::Medium, Self::Low];

    /// Suggested time to act.
    pub fn timeframe(self) -> &'static str {
        match self {
            Self::High => "As soon as possible (24-48 hours)",
            Self::Medium => "Within 1-2 weeks",
            Self::Low => "Within 1-3 months",
        }
    }

    /// Heading used in reports.
    pub fn heading(self) -> &'static str {
        match self {
            Self::High => "Immediate action",
            Self::Medium => "Short term",
            Self::Low => "Long term",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Vulnerability counts by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeverityCounts {
    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Info => self.info += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }
}

/// Headline numbers for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub subdomain_count: usize,
    pub live_host_count: usize,
    pub open_port_count: usize,
    pub directory_count: usize,
    pub screenshot_count: usize,
    pub vulnerability_count: SeverityCounts,
}

/// An open port pulled from the port scan findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPort {
    pub host: String,
    pub port: u16,
    pub service: String,
}

/// A vulnerability pulled from the vulnerability scan findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub title: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub url: String,
    /// Scanner template or matcher that produced the finding.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template: String,
}

/// One remediation item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub timeframe: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code_example: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl Recommendation {
    fn new(
        priority: Priority,
        title: impl Into<String>,
        description: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            priority,
            title: title.into(),
            description: description.into(),
            recommendation: recommendation.into(),
            timeframe: priority.timeframe().to_string(),
            steps: Vec::new(),
            code_example: String::new(),
            references: Vec::new(),
        }
    }

    fn with_guidance(mut self, guidance: &Remediation) -> Self {
        self.steps = guidance.steps.iter().map(|s| s.to_string()).collect();
        self.code_example = guidance.code_example.to_string();
        self.references = guidance.references.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Triage document derived from a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAnalysis {
    pub generated_at: DateTime<Utc>,
    pub target: String,
    pub summary: Summary,
    pub interesting_subdomains: Vec<String>,
    pub interesting_directories: Vec<String>,
    pub open_ports: Vec<OpenPort>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub recommendations: Vec<Recommendation>,
}

impl RunAnalysis {
    /// Analyze the findings of `report`.
    pub fn from_report(report: &RunReport) -> Self {
        let subdomains = report.findings(StageKind::Subdomain);
        let directories = report.findings(StageKind::DirectoryEnum);

        let open_ports: Vec<OpenPort> = report
            .findings(StageKind::PortScan)
            .iter()
            .filter_map(open_port)
            .collect();
        let vulnerabilities: Vec<Vulnerability> = report
            .findings(StageKind::VulnScan)
            .iter()
            .map(vulnerability)
            .collect();

        let mut vulnerability_count = SeverityCounts::default();
        for vuln in &vulnerabilities {
            vulnerability_count.add(vuln.severity);
        }

        let summary = Summary {
            subdomain_count: subdomains.len(),
            live_host_count: report.findings(StageKind::LiveHost).len(),
            open_port_count: open_ports.len(),
            directory_count: directories.len(),
            screenshot_count: report.findings(StageKind::Screenshot).len(),
            vulnerability_count,
        };

        let interesting_subdomains =
            matching(subdomains.iter().map(|f| f.subject.as_str()), INTERESTING_SUBDOMAIN_KEYWORDS);
        let interesting_directories =
            matching(directories.iter().map(|f| f.subject.as_str()), INTERESTING_DIRECTORY_KEYWORDS);

        let mut analysis = Self {
            generated_at: Utc::now(),
            target: report.target.raw().to_string(),
            summary,
            interesting_subdomains,
            interesting_directories,
            open_ports,
            vulnerabilities,
            recommendations: Vec::new(),
        };
        analysis.recommendations = analysis.recommend();
        analysis
    }

    fn recommend(&self) -> Vec<Recommendation> {
        let mut out = Vec::new();

        for vuln in &self.vulnerabilities {
            let guidance = remediation::lookup(&vuln.title, &vuln.template);
            out.push(
                Recommendation::new(
                    vuln.severity.priority(),
                    vuln.title.clone(),
                    if vuln.description.is_empty() {
                        format!("Reported at {}", vuln.url)
                    } else {
                        vuln.description.clone()
                    },
                    guidance.summary,
                )
                .with_guidance(guidance),
            );
        }

        for port in &self.open_ports {
            let description = format!("Found {} running on port {} of {}", port.service, port.port, port.host);
            if REMOTE_ACCESS_PORTS.contains(&port.port) {
                out.push(Recommendation::new(
                    Priority::Medium,
                    format!("Remote Access Service on Port {}", port.port),
                    description,
                    format!(
                        "Restrict access to port {} to trusted IPs only and ensure strong authentication is in place.",
                        port.port
                    ),
                ));
            } else if WEB_PORTS.contains(&port.port) {
                out.push(Recommendation::new(
                    Priority::Low,
                    format!("Web Service on Port {}", port.port),
                    description,
                    "Ensure the web server is properly configured with secure headers and up-to-date.",
                ));
            } else if FTP_PORTS.contains(&port.port) {
                out.push(Recommendation::new(
                    Priority::Medium,
                    format!("FTP Service on Port {}", port.port),
                    description,
                    "Consider replacing FTP with SFTP or FTPS for secure file transfers.",
                ));
            }
        }

        for url in &self.interesting_directories {
            let lower = url.to_ascii_lowercase();
            if lower.contains(".git") || lower.contains(".env") {
                out.push(Recommendation::new(
                    Priority::High,
                    "Sensitive Information Exposure",
                    format!("Found {} which may expose sensitive information", url),
                    format!("Remove or restrict access to {} immediately.", url),
                ));
            } else if lower.contains("admin") {
                out.push(Recommendation::new(
                    Priority::Medium,
                    "Admin Interface Exposed",
                    format!("Found potential admin interface at {}", url),
                    "Restrict access to admin interfaces and use strong passwords and 2FA.",
                ));
            }
        }

        // Stable sort keeps discovery order inside each bucket.
        out.sort_by_key(|r| r.priority);
        out
    }

    /// Recommendations of one priority.
    pub fn recommendations_for(&self, priority: Priority) -> impl Iterator<Item = &Recommendation> {
        self.recommendations
            .iter()
            .filter(move |r| r.priority == priority)
    }
}

fn matching<'a>(subjects: impl Iterator<Item = &'a str>, keywords: &[&str]) -> Vec<String> {
    subjects
        .filter(|s| {
            let lower = s.to_ascii_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        })
        .map(String::from)
        .collect()
}

fn open_port(finding: &Finding) -> Option<OpenPort> {
    let (host, port_part) = finding.subject.rsplit_once(':')?;
    let port: u16 = finding
        .attribute("port")
        .unwrap_or(port_part)
        .parse()
        .ok()?;
    let host = finding.attribute("host").unwrap_or(host).to_string();
    let service = finding
        .attribute("service")
        .or_else(|| service_name(port))
        .unwrap_or("unknown")
        .to_string();
    Some(OpenPort { host, port, service })
}

fn vulnerability(finding: &Finding) -> Vulnerability {
    let (template, location) = finding
        .subject
        .split_once('@')
        .unwrap_or((finding.subject.as_str(), ""));
    Vulnerability {
        title: finding
            .attribute("name")
            .unwrap_or(template)
            .to_string(),
        severity: Severity::parse(finding.attribute("severity").unwrap_or("info")),
        description: finding.attribute("description").unwrap_or_default().to_string(),
        url: finding.attribute("url").unwrap_or(location).to_string(),
        template: template.to_string(),
    }
}
