//! JSON-based run storage.
//!
//! Each run gets its own directory named `<target>_<YYYYmmddHHMMSS>`
//! holding one `<stage>.json` snapshot per stage that found something and
//! a `report.json` with the run status and stage diagnostics.

use crate::config::Paths;
use crate::error::{StorageError, StorageResult};
use crate::pipeline::{RunReport, RunStatus};
use crate::store::{Finding, FindingStore};
use crate::types::{RunId, StageKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const REPORT_FILE: &str = "report.json";

/// Listing entry for a stored run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Directory name, usable as a run reference.
    pub name: String,
    pub id: RunId,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    pub findings: usize,
}

impl RunSummary {
    /// Get a short one-line summary of the run.
    pub fn line(&self) -> String {
        format!(
            "{} ({}) - {} findings, {}",
            self.target,
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.findings,
            self.status
        )
    }
}

/// Directory-per-run JSON storage.
pub struct RunStore {
    runs_dir: PathBuf,
}

impl RunStore {
    /// Open the store under the application data directory.
    pub fn new() -> StorageResult<Self> {
        Self::with_dir(Paths::get()?.runs_dir())
    }

    /// Open a store rooted at `runs_dir`.
    pub fn with_dir(runs_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let runs_dir = runs_dir.into();
        fs::create_dir_all(&runs_dir).map_err(|e| StorageError::DirectoryError(e.to_string()))?;
        Ok(Self { runs_dir })
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    /// Persist a finished run and return its directory.
    pub fn save(&self, report: &RunReport) -> StorageResult<PathBuf> {
        let base = run_dir_name(report);
        let mut dir = self.runs_dir.join(&base);
        if dir.exists() {
            dir = self.runs_dir.join(format!("{}-{}", base, report.id.short()));
        }
        fs::create_dir_all(&dir).map_err(|e| StorageError::SaveFailed(e.to_string()))?;

        for (stage, findings) in &report.findings {
            write_json(&dir.join(format!("{}.json", stage.slug())), findings)?;
        }

        let mut summary = report.clone();
        summary.findings = BTreeMap::new();
        write_json(&dir.join(REPORT_FILE), &summary)?;

        debug!(path = %dir.display(), "run saved");
        Ok(dir)
    }

    /// Load a run by its directory name.
    pub fn load(&self, name: &str) -> StorageResult<RunReport> {
        let dir = self.runs_dir.join(name);
        let report_file = dir.join(REPORT_FILE);
        if !report_file.exists() {
            return Err(StorageError::RunNotFound(name.to_string()));
        }

        let mut report: RunReport = read_json(&report_file)?;
        for stage in StageKind::ALL {
            let file = dir.join(format!("{}.json", stage.slug()));
            if file.exists() {
                let findings: Vec<Finding> = read_json(&file)?;
                report.findings.insert(stage, findings);
            }
        }
        Ok(report)
    }

    /// Resolve a reference (directory name, name prefix or run id prefix).
    pub fn find(&self, reference: &str) -> StorageResult<RunReport> {
        let names = self.list_names()?;
        if names.iter().any(|n| n == reference) {
            return self.load(reference);
        }

        let mut matches: Vec<String> = names
            .iter()
            .filter(|n| n.starts_with(reference))
            .cloned()
            .collect();
        if matches.is_empty() {
            matches = self
                .list()?
                .into_iter()
                .filter(|s| s.id.to_string().starts_with(reference))
                .map(|s| s.name)
                .collect();
        }

        match matches.len() {
            0 => Err(StorageError::RunNotFound(reference.to_string())),
            1 => self.load(&matches[0]),
            n => Err(StorageError::Ambiguous(reference.to_string(), n)),
        }
    }

    /// Findings of a stored run as a store, for resuming.
    pub fn load_store(&self, reference: &str) -> StorageResult<(RunReport, FindingStore)> {
        let report = self.find(reference)?;
        let store = FindingStore::from_snapshots(report.findings.clone());
        Ok((report, store))
    }

    /// Names of every stored run directory.
    fn list_names(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in
            fs::read_dir(&self.runs_dir).map_err(|e| StorageError::DirectoryError(e.to_string()))?
        {
            let entry = entry.map_err(|e| StorageError::DirectoryError(e.to_string()))?;
            let path = entry.path();
            if path.join(REPORT_FILE).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    /// Summaries of every stored run, most recent first.
    pub fn list(&self) -> StorageResult<Vec<RunSummary>> {
        let mut summaries = Vec::new();

        for name in self.list_names()? {
            match read_json::<RunReport>(&self.runs_dir.join(&name).join(REPORT_FILE)) {
                Ok(report) => summaries.push(RunSummary {
                    findings: report.stages.iter().map(|s| s.findings).sum(),
                    id: report.id,
                    target: report.target.raw().to_string(),
                    started_at: report.started_at,
                    status: report.status,
                    name,
                }),
                Err(e) => warn!(run = %name, error = %e, "skipping unreadable run"),
            }
        }

        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(summaries)
    }

    /// List recent runs (last n).
    pub fn list_recent(&self, count: usize) -> StorageResult<Vec<RunSummary>> {
        let mut summaries = self.list()?;
        summaries.truncate(count);
        Ok(summaries)
    }
}

/// `<target>_<YYYYmmddHHMMSS>` with path separators made safe.
fn run_dir_name(report: &RunReport) -> String {
    let target: String = report
        .target
        .raw()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{}_{}", target, report.started_at.format("%Y%m%d%H%M%S"))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).map_err(|e| StorageError::SaveFailed(format!("{}: {}", path.display(), e)))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let content =
        fs::read_to_string(path).map_err(|e| StorageError::LoadFailed(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&content).map_err(|e| StorageError::LoadFailed(format!("{}: {}", path.display(), e)))
}
