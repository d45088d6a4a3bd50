//! Pipeline stage identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One phase of the reconnaissance pipeline.
///
/// Variants are declared in execution order, so the derived `Ord` matches
/// the order the coordinator runs them in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Subdomain enumeration.
    #[value(alias = "subdomains")]
    Subdomain,
    /// Live host detection.
    #[value(name = "livehost", alias = "live-host")]
    LiveHost,
    /// Port scanning.
    #[value(name = "ports", alias = "portscan")]
    PortScan,
    /// Directory enumeration.
    #[value(name = "dirs", alias = "directories")]
    DirectoryEnum,
    /// Vulnerability scanning.
    #[value(name = "vuln", alias = "vulnscan")]
    VulnScan,
    /// Screenshot capture.
    #[value(alias = "screenshots")]
    Screenshot,
}

impl StageKind {
    /// Number of stages.
    pub const COUNT: usize = 6;

    /// All stages in pipeline order.
    pub const ALL: [StageKind; Self::COUNT] = [
        Self::Subdomain,
        Self::LiveHost,
        Self::PortScan,
        Self::DirectoryEnum,
        Self::VulnScan,
        Self::Screenshot,
    ];

    /// Position of this stage in the pipeline.
    pub fn index(self) -> usize {
        match self {
            Self::Subdomain => 0,
            Self::LiveHost => 1,
            Self::PortScan => 2,
            Self::DirectoryEnum => 3,
            Self::VulnScan => 4,
            Self::Screenshot => 5,
        }
    }

    /// The stage whose findings become this stage's target set.
    ///
    /// `None` means the stage works directly on the raw target.
    pub fn dependency(self) -> Option<StageKind> {
        match self {
            Self::Subdomain => None,
            Self::LiveHost => Some(Self::Subdomain),
            Self::PortScan | Self::DirectoryEnum | Self::VulnScan | Self::Screenshot => {
                Some(Self::LiveHost)
            }
        }
    }

    /// Directory-friendly name used for persisted snapshots.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Subdomain => "subdomains",
            Self::LiveHost => "livehosts",
            Self::PortScan => "ports",
            Self::DirectoryEnum => "directories",
            Self::VulnScan => "vulnerabilities",
            Self::Screenshot => "screenshots",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subdomain => write!(f, "Subdomain Enumeration"),
            Self::LiveHost => write!(f, "Live Host Detection"),
            Self::PortScan => write!(f, "Port Scan"),
            Self::DirectoryEnum => write!(f, "Directory Enumeration"),
            Self::VulnScan => write!(f, "Vulnerability Scan"),
            Self::Screenshot => write!(f, "Screenshots"),
        }
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|stage| stage.slug() == s)
            .or_else(|| match s.as_str() {
                "subdomain" => Some(Self::Subdomain),
                "livehost" | "live-host" | "live_host" => Some(Self::LiveHost),
                "portscan" | "port_scan" => Some(Self::PortScan),
                "dirs" | "directory_enum" => Some(Self::DirectoryEnum),
                "vuln" | "vuln_scan" => Some(Self::VulnScan),
                "screenshot" => Some(Self::Screenshot),
                _ => None,
            })
            .ok_or_else(|| format!("unknown stage: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_matches_index() {
        for (i, stage) in StageKind::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
        assert!(StageKind::Subdomain < StageKind::Screenshot);
    }

    #[test]
    fn test_dependencies_point_backwards() {
        for stage in StageKind::ALL {
            if let Some(dep) = stage.dependency() {
                assert!(dep < stage, "{:?} depends on later stage {:?}", stage, dep);
            }
        }
        assert_eq!(StageKind::DirectoryEnum.dependency(), Some(StageKind::LiveHost));
    }

    #[test]
    fn test_stage_from_str() {
        assert_eq!("ports".parse::<StageKind>().unwrap(), StageKind::PortScan);
        assert_eq!("livehost".parse::<StageKind>().unwrap(), StageKind::LiveHost);
        assert_eq!(
            "vulnerabilities".parse::<StageKind>().unwrap(),
            StageKind::VulnScan
        );
        assert!("fuzz".parse::<StageKind>().is_err());
    }
}
