//! Deduplicating, concurrency-safe finding store.
//!
//! Each stage owns one bucket guarded by its own mutex. `insert` performs
//! the read-check-merge-write for a `(stage, subject)` pair inside that
//! bucket's critical section and does no I/O while holding the lock.
//! Snapshots come back in first-seen order.

mod finding;

pub use finding::{AttributeConflict, Finding};

use crate::types::StageKind;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Outcome of a single insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertResult {
    /// `true` if the subject had not been seen in this stage before.
    pub is_new: bool,
    /// Attribute conflicts recorded by this insert.
    pub conflicts: usize,
}

#[derive(Debug, Default)]
struct Bucket {
    findings: Vec<Finding>,
    index: HashMap<String, usize>,
}

impl Bucket {
    fn insert(&mut self, finding: Finding) -> InsertResult {
        match self.index.get(&finding.subject) {
            Some(&pos) => {
                let conflicts = self.findings[pos].merge(finding);
                InsertResult {
                    is_new: false,
                    conflicts,
                }
            }
            None => {
                self.index
                    .insert(finding.subject.clone(), self.findings.len());
                self.findings.push(finding);
                InsertResult {
                    is_new: true,
                    conflicts: 0,
                }
            }
        }
    }
}

/// Stage-keyed repository of findings shared by all probers of a run.
#[derive(Debug)]
pub struct FindingStore {
    buckets: [Mutex<Bucket>; StageKind::COUNT],
}

impl FindingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
        }
    }

    /// Build a store from previously persisted snapshots.
    pub fn from_snapshots(snapshots: impl IntoIterator<Item = (StageKind, Vec<Finding>)>) -> Self {
        let store = Self::new();
        for (stage, findings) in snapshots {
            for mut finding in findings {
                finding.stage = stage;
                store.insert(finding);
            }
        }
        store
    }

    fn bucket(&self, stage: StageKind) -> MutexGuard<'_, Bucket> {
        // A panicking writer cannot leave a bucket half-merged: every
        // mutation is a single push or an in-place merge.
        self.buckets[stage.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a finding, merging it into an existing one with the same subject.
    pub fn insert(&self, finding: Finding) -> InsertResult {
        let stage = finding.stage;
        let subject = finding.subject.clone();

        let result = self.bucket(stage).insert(finding);

        if result.is_new {
            debug!(stage = ?stage, subject = %subject, "new finding");
        }
        if result.conflicts > 0 {
            warn!(
                stage = ?stage,
                subject = %subject,
                conflicts = result.conflicts,
                "attribute conflict while merging finding"
            );
        }
        result
    }

    /// Findings of one stage in first-seen order.
    pub fn snapshot(&self, stage: StageKind) -> Vec<Finding> {
        self.bucket(stage).findings.clone()
    }

    /// Snapshots of every stage that holds at least one finding.
    pub fn snapshots(&self) -> BTreeMap<StageKind, Vec<Finding>> {
        StageKind::ALL
            .into_iter()
            .map(|stage| (stage, self.snapshot(stage)))
            .filter(|(_, findings)| !findings.is_empty())
            .collect()
    }

    /// Number of unique findings in a stage.
    pub fn len(&self, stage: StageKind) -> usize {
        self.bucket(stage).findings.len()
    }

    /// Total number of unique findings across all stages.
    pub fn total(&self) -> usize {
        StageKind::ALL.into_iter().map(|s| self.len(s)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl Default for FindingStore {
    fn default() -> Self {
        Self::new()
    }
}
