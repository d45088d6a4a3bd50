//! The canonical finding record produced by every prober.

use crate::types::StageKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single discovered artifact with provenance.
///
/// `(stage, subject)` is the identity of a finding: a subdomain name, a
/// `host:port` pair, a URL, or a template/CVE match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub stage: StageKind,
    pub subject: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Probers that reported this finding, first discoverer first.
    pub discovered_by: Vec<String>,
    /// When the finding was first seen.
    pub timestamp: DateTime<Utc>,
    /// Attribute values that disagreed with the kept value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<AttributeConflict>,
}

/// A rejected attribute value recorded during a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeConflict {
    pub key: String,
    pub kept: String,
    pub rejected: String,
    /// Prober that supplied the rejected value.
    pub prober: String,
}

impl Finding {
    /// Create a new finding discovered by `prober`.
    pub fn new(stage: StageKind, subject: impl Into<String>, prober: impl Into<String>) -> Self {
        Self {
            stage,
            subject: subject.into(),
            attributes: BTreeMap::new(),
            discovered_by: vec![prober.into()],
            timestamp: Utc::now(),
            conflicts: Vec::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute value.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The prober that first reported this finding.
    pub fn first_discoverer(&self) -> &str {
        self.discovered_by.first().map(String::as_str).unwrap_or("")
    }

    /// Merge a later report of the same finding into this one.
    ///
    /// New keys are added, conflicting keys keep the original value and the
    /// rejected value is recorded. Returns the number of new conflicts.
    pub(crate) fn merge(&mut self, other: Finding) -> usize {
        let source = other.first_discoverer().to_string();
        let mut conflicts = 0;

        for (key, value) in other.attributes {
            match self.attributes.get(&key) {
                None => {
                    self.attributes.insert(key, value);
                }
                Some(kept) if *kept == value => {}
                Some(kept) => {
                    let conflict = AttributeConflict {
                        key,
                        kept: kept.clone(),
                        rejected: value,
                        prober: source.clone(),
                    };
                    if !self.conflicts.contains(&conflict) {
                        self.conflicts.push(conflict);
                        conflicts += 1;
                    }
                }
            }
        }

        for prober in other.discovered_by {
            if !self.discovered_by.contains(&prober) {
                self.discovered_by.push(prober);
            }
        }

        conflicts
    }
}
