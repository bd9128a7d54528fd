use serde::{Deserialize, Serialize};
use std::fmt;

/// Test lifecycle event protocol - defines only the wire shape, not aggregation
/// Shared by engine adapters (producers) and the grading worker (consumer)
/// so the two never drift.

/// Opaque, engine-assigned key for one node of a discovery tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(pub String);

impl TestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Container,
    Test,
    ContainerAndTest,
}

/// Where the engine found a node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestSource {
    Class {
        class_name: String,
    },
    Method {
        class_name: String,
        method_name: String,
    },
    #[default]
    Other,
}

/// Structured per-test override carried over from older suites
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyInfo {
    #[serde(default = "default_legacy_points")]
    pub points: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

fn default_legacy_points() -> f64 {
    1.0
}

impl Default for LegacyInfo {
    fn default() -> Self {
        Self {
            points: default_legacy_points(),
            name: String::new(),
            description: String::new(),
        }
    }
}

/// One node of the discovery tree as reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestNode {
    pub id: TestId,
    #[serde(default)]
    pub parent: Option<TestId>,
    pub display_name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub source: TestSource,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub legacy: Option<LegacyInfo>,
}

impl TestNode {
    /// Executable leaf (possibly also a container)
    pub fn is_test(&self) -> bool {
        matches!(self.kind, NodeKind::Test | NodeKind::ContainerAndTest)
    }

    /// Class-like container: its source maps to a class
    pub fn is_class(&self) -> bool {
        matches!(self.source, TestSource::Class { .. })
    }

    pub fn class_name(&self) -> Option<&str> {
        match &self.source {
            TestSource::Class { class_name } => Some(class_name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Successful,
    Failed,
    Aborted,
}

/// Result of one execution as captured by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    #[serde(default)]
    pub detail: Option<String>,
}

impl Outcome {
    pub fn successful() -> Self {
        Self {
            status: OutcomeStatus::Successful,
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            detail: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Successful
    }
}

/// Key used by the engine when a reporting entry carries only a value
pub const VALUE_ONLY_KEY: &str = "value";

/// Typed lifecycle events, one JSON object per line on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Full discovery tree in discovery order; roots have no parent
    PlanStarted {
        nodes: Vec<TestNode>,
    },
    DynamicTestRegistered {
        node: TestNode,
    },
    ExecutionStarted {
        id: TestId,
    },
    ExecutionSkipped {
        id: TestId,
        #[serde(default)]
        reason: String,
    },
    ReportingEntry {
        id: TestId,
        entries: Vec<(String, String)>,
    },
    ExecutionFinished {
        id: TestId,
        outcome: Outcome,
    },
    PlanFinished,
}

impl LifecycleEvent {
    /// Identifier the event refers to, if any
    pub fn test_id(&self) -> Option<&TestId> {
        match self {
            LifecycleEvent::DynamicTestRegistered { node } => Some(&node.id),
            LifecycleEvent::ExecutionStarted { id }
            | LifecycleEvent::ExecutionSkipped { id, .. }
            | LifecycleEvent::ReportingEntry { id, .. }
            | LifecycleEvent::ExecutionFinished { id, .. } => Some(id),
            LifecycleEvent::PlanStarted { .. } | LifecycleEvent::PlanFinished => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_finished_event() {
        let line = r#"{"event":"execution_finished","id":"[method:a()]","outcome":{"status":"failed","detail":"expected 3"}}"#;
        let event: LifecycleEvent = serde_json::from_str(line).unwrap();

        assert_eq!(
            event,
            LifecycleEvent::ExecutionFinished {
                id: TestId::from("[method:a()]"),
                outcome: Outcome::failed("expected 3"),
            }
        );
    }

    #[test]
    fn test_node_defaults() {
        let line = r#"{"id":"t1","display_name":"adds()","kind":"test"}"#;
        let node: TestNode = serde_json::from_str(line).unwrap();

        assert!(node.is_test());
        assert!(!node.is_class());
        assert_eq!(node.parent, None);
        assert!(node.tags.is_empty());
        assert_eq!(node.source, TestSource::Other);
    }

    #[test]
    fn test_legacy_defaults() {
        let legacy: LegacyInfo = serde_json::from_str(r#"{"name":"Adds"}"#).unwrap();
        assert_eq!(legacy.points, 1.0);
        assert_eq!(legacy.name, "Adds");
        assert_eq!(legacy.description, "");
    }

    #[test]
    fn test_class_source() {
        let line = r#"{"id":"c","display_name":"CalcTest","kind":"container","source":{"type":"class","class_name":"calc.CalcTest"}}"#;
        let node: TestNode = serde_json::from_str(line).unwrap();

        assert!(node.is_class());
        assert!(!node.is_test());
        assert_eq!(node.class_name(), Some("calc.CalcTest"));
    }

    #[test]
    fn test_reporting_entry_pairs() {
        let line = r#"{"event":"reporting_entry","id":"t","entries":[["value","hello"],["k","v"]]}"#;
        let event: LifecycleEvent = serde_json::from_str(line).unwrap();

        match event {
            LifecycleEvent::ReportingEntry { entries, .. } => {
                assert_eq!(entries[0], ("value".to_string(), "hello".to_string()));
                assert_eq!(entries[1], ("k".to_string(), "v".to_string()));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_plan_finished_has_no_id() {
        let event: LifecycleEvent = serde_json::from_str(r#"{"event":"plan_finished"}"#).unwrap();
        assert_eq!(event.test_id(), None);
    }
}
