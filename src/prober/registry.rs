//! Priority-ordered prober registry.
//!
//! Holds every prober known to a run together with the per-stage fan-out
//! policy the scheduler applies when choosing among them.

use crate::prober::catalog::builtin_tools;
use crate::prober::command::{CommandProber, ToolSpec};
use crate::prober::native::natives;
use crate::prober::traits::{BoxedProber, FanOutPolicy};
use crate::types::StageKind;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of probers and stage policies.
#[derive(Clone)]
pub struct ProberRegistry {
    probers: Vec<BoxedProber>,
    policies: BTreeMap<StageKind, FanOutPolicy>,
}

impl ProberRegistry {
    /// An empty registry with the default policies.
    pub fn new() -> Self {
        Self {
            probers: Vec::new(),
            policies: StageKind::ALL
                .into_iter()
                .map(|stage| (stage, default_policy(stage)))
                .collect(),
        }
    }

    /// Registry holding the built-in tool adapters and the native probers.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for spec in builtin_tools() {
            registry.register_tool(spec);
        }
        for prober in natives() {
            registry.register(prober);
        }
        registry
    }

    /// Add a prober. A prober with the same id is replaced.
    pub fn register(&mut self, prober: BoxedProber) {
        if let Some(pos) = self.probers.iter().position(|p| p.id() == prober.id()) {
            debug!(prober = %prober.id(), "replacing registered prober");
            self.probers[pos] = prober;
        } else {
            self.probers.push(prober);
        }
    }

    /// Add an external tool adapter.
    pub fn register_tool(&mut self, spec: ToolSpec) {
        self.register(Arc::new(CommandProber::new(spec)));
    }

    /// Remove a prober by id. Returns whether one was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.probers.len();
        self.probers.retain(|p| p.id() != id);
        self.probers.len() != before
    }

    /// Probers serving `stage`, highest priority first.
    ///
    /// Ties keep registration order.
    pub fn for_stage(&self, stage: StageKind) -> Vec<BoxedProber> {
        let mut probers: Vec<_> = self
            .probers
            .iter()
            .filter(|p| p.descriptor().stage == stage)
            .cloned()
            .collect();
        probers.sort_by(|a, b| b.descriptor().priority.cmp(&a.descriptor().priority));
        probers
    }

    pub fn policy(&self, stage: StageKind) -> FanOutPolicy {
        self.policies
            .get(&stage)
            .copied()
            .unwrap_or_else(|| default_policy(stage))
    }

    pub fn set_policy(&mut self, stage: StageKind, policy: FanOutPolicy) {
        self.policies.insert(stage, policy);
    }

    /// Look up a prober by id.
    pub fn get(&self, id: &str) -> Option<&BoxedProber> {
        self.probers.iter().find(|p| p.id() == id)
    }

    /// Every registered prober in registration order.
    pub fn all(&self) -> &[BoxedProber] {
        &self.probers
    }

    pub fn len(&self) -> usize {
        self.probers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probers.is_empty()
    }
}

impl Default for ProberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Default fan-out policy per stage.
///
/// Subdomain and vulnerability results are unions over tools; for the
/// other stages one tool is enough.
pub fn default_policy(stage: StageKind) -> FanOutPolicy {
    match stage {
        StageKind::Subdomain | StageKind::VulnScan => FanOutPolicy::FanOutAll,
        StageKind::LiveHost
        | StageKind::PortScan
        | StageKind::DirectoryEnum
        | StageKind::Screenshot => FanOutPolicy::FirstAvailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prober::command::{EndpointForm, LineFormat, TargetInput};

    fn tool(id: &str, stage: StageKind, priority: u8) -> ToolSpec {
        ToolSpec {
            id: id.to_string(),
            stage,
            priority,
            binary: id.to_string(),
            args: vec![],
            input: TargetInput::Stdin,
            endpoints: EndpointForm::Raw,
            format: LineFormat::default(),
        }
    }

    #[test]
    fn test_for_stage_sorted_by_priority() {
        let mut registry = ProberRegistry::new();
        registry.register_tool(tool("low", StageKind::PortScan, 10));
        registry.register_tool(tool("high", StageKind::PortScan, 90));
        registry.register_tool(tool("mid", StageKind::PortScan, 50));
        registry.register_tool(tool("other", StageKind::LiveHost, 99));

        let ids: Vec<_> = registry
            .for_stage(StageKind::PortScan)
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = ProberRegistry::new();
        registry.register_tool(tool("ffuf", StageKind::DirectoryEnum, 90));
        registry.register_tool(tool("ffuf", StageKind::DirectoryEnum, 20));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("ffuf").unwrap().descriptor().priority, 20);
    }

    #[test]
    fn test_default_policies() {
        let registry = ProberRegistry::new();
        assert_eq!(registry.policy(StageKind::Subdomain), FanOutPolicy::FanOutAll);
        assert_eq!(registry.policy(StageKind::VulnScan), FanOutPolicy::FanOutAll);
        assert_eq!(
            registry.policy(StageKind::DirectoryEnum),
            FanOutPolicy::FirstAvailable
        );
    }

    #[test]
    fn test_builtin_covers_every_stage() {
        let mut registry = ProberRegistry::builtin();
        for stage in StageKind::ALL {
            assert!(!registry.for_stage(stage).is_empty(), "{:?}", stage);
        }
        assert!(registry.remove("crtsh"));
        assert!(!registry.remove("crtsh"));
    }
}
