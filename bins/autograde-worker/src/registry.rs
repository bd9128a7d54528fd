/// Provisional Registry - Every Test Accounted For Before It Runs
///
/// **Core Responsibility:**
/// Record every discovered node the moment it is known, so that a crash on
/// the very first test still leaves a complete skeleton to report against.
///
/// **Layout:**
/// - `records` is an arena of test records; indices are stable for the run
/// - `classes` holds one total per class-like container, plus one bucket
///   for tests that have no class ancestor
/// - Both are looked up through id → index maps
///
/// Seeding is idempotent: a node that is already known is never counted twice.

use crate::policy::{self, MalformedTag};
use autograde_common::events::{TestId, TestNode};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Message a test keeps until its finish event arrives
pub const CRASH_PLACEHOLDER_MESSAGE: &str =
    "This test was not executed because the grader crashed before \nthe results could be obtained";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Provisional,
    Finished,
}

/// Score entry for one executable test
#[derive(Debug, Clone, PartialEq)]
pub struct TestRecord {
    pub id: TestId,
    pub name: String,
    pub description: String,
    pub achieved_points: f64,
    pub max_points: f64,
    pub message: String,
    pub output: String,
    pub state: RecordState,
}

impl TestRecord {
    fn provisional(node: &TestNode, policy: policy::TestPolicy) -> Self {
        Self {
            id: node.id.clone(),
            name: policy.name.unwrap_or_else(|| node.display_name.clone()),
            description: policy.description.unwrap_or_default(),
            achieved_points: 0.0,
            max_points: policy.max_points,
            message: CRASH_PLACEHOLDER_MESSAGE.to_string(),
            output: String::new(),
            state: RecordState::Provisional,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == RecordState::Finished
    }

    /// Append one line to the free-form output
    pub fn append_output(&mut self, line: &str) {
        self.output.push_str(line);
        self.output.push('\n');
    }
}

/// Which bucket a test's weight accumulates into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClassKey {
    Class(TestId),
    /// Tests with no class-like ancestor
    Unattributed,
}

/// Accumulated and declared points of one class-like container
#[derive(Debug, Clone, PartialEq)]
pub struct ClassTotal {
    pub key: ClassKey,
    pub accumulated: f64,
    pub ceiling: Option<f64>,
}

impl ClassTotal {
    /// Declared ceiling when present, otherwise the sum of test weights
    pub fn resolved(&self) -> f64 {
        self.ceiling.unwrap_or(self.accumulated)
    }
}

#[derive(Debug, Default)]
pub struct ProvisionalRegistry {
    nodes: HashMap<TestId, TestNode>,
    records: Vec<TestRecord>,
    record_index: HashMap<TestId, usize>,
    classes: Vec<ClassTotal>,
    class_index: HashMap<ClassKey, usize>,
}

impl ProvisionalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision the whole discovery tree
    ///
    /// All nodes are indexed first so ancestor lookups work regardless of the
    /// order the engine listed them in. Records are then created in list order.
    pub fn seed(&mut self, nodes: &[TestNode]) -> Vec<MalformedTag> {
        for node in nodes {
            self.nodes
                .entry(node.id.clone())
                .or_insert_with(|| node.clone());
        }

        let mut malformed = Vec::new();
        for node in nodes {
            malformed.extend(self.provision(&node.id));
        }

        debug!(
            nodes = nodes.len(),
            tests = self.records.len(),
            classes = self.classes.len(),
            "Discovery tree provisioned"
        );

        malformed
    }

    /// Provision a node discovered mid-run
    pub fn register_dynamic(&mut self, node: &TestNode) -> Vec<MalformedTag> {
        self.nodes
            .entry(node.id.clone())
            .or_insert_with(|| node.clone());
        self.provision(&node.id)
    }

    fn provision(&mut self, id: &TestId) -> Vec<MalformedTag> {
        let mut malformed = Vec::new();
        let Some(node) = self.nodes.get(id).cloned() else {
            return malformed;
        };

        if node.is_class() {
            let (_, class_malformed) = self.ensure_class(ClassKey::Class(node.id.clone()));
            malformed.extend(class_malformed);
        }

        if node.is_test() && !self.record_index.contains_key(&node.id) {
            let test_policy = policy::resolve_test(&node);
            malformed.extend(test_policy.malformed.iter().cloned());

            let record = TestRecord::provisional(&node, test_policy);
            let max_points = record.max_points;
            self.record_index.insert(node.id.clone(), self.records.len());
            self.records.push(record);

            let key = self.enclosing_class(&node);
            let (idx, class_malformed) = self.ensure_class(key);
            malformed.extend(class_malformed);
            self.classes[idx].accumulated += max_points;
        }

        malformed
    }

    /// First-seen wins: an existing total is returned untouched
    fn ensure_class(&mut self, key: ClassKey) -> (usize, Vec<MalformedTag>) {
        if let Some(&idx) = self.class_index.get(&key) {
            return (idx, Vec::new());
        }

        let class_policy = match &key {
            ClassKey::Class(id) => self
                .nodes
                .get(id)
                .map(policy::resolve_class)
                .unwrap_or_default(),
            ClassKey::Unattributed => policy::ClassPolicy::default(),
        };

        let idx = self.classes.len();
        self.classes.push(ClassTotal {
            key: key.clone(),
            accumulated: 0.0,
            ceiling: class_policy.ceiling,
        });
        self.class_index.insert(key, idx);

        (idx, class_policy.malformed)
    }

    /// Nearest class-like ancestor, skipping any other intermediate nodes
    fn enclosing_class(&self, node: &TestNode) -> ClassKey {
        let mut parent = node.parent.as_ref();
        // bounded walk: a malformed tree with a cycle must not hang the grader
        let mut remaining = self.nodes.len();

        while let Some(parent_id) = parent {
            if remaining == 0 {
                warn!(test_id = %node.id, "Ancestor chain does not terminate");
                break;
            }
            remaining -= 1;

            match self.nodes.get(parent_id) {
                Some(ancestor) if ancestor.is_class() => {
                    return ClassKey::Class(ancestor.id.clone());
                }
                Some(ancestor) => parent = ancestor.parent.as_ref(),
                None => {
                    warn!(test_id = %node.id, parent_id = %parent_id, "Parent missing from discovery tree");
                    break;
                }
            }
        }

        ClassKey::Unattributed
    }

    /// Test records beneath a container, in discovery order
    pub fn descendant_records(&self, ancestor: &TestId) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| self.has_ancestor(&record.id, ancestor))
            .map(|(idx, _)| idx)
            .collect()
    }

    fn has_ancestor(&self, id: &TestId, ancestor: &TestId) -> bool {
        let mut parent = self.nodes.get(id).and_then(|node| node.parent.as_ref());
        let mut remaining = self.nodes.len();

        while let Some(parent_id) = parent {
            if parent_id == ancestor {
                return true;
            }
            if remaining == 0 {
                return false;
            }
            remaining -= 1;
            parent = self.nodes.get(parent_id).and_then(|node| node.parent.as_ref());
        }

        false
    }

    pub fn node(&self, id: &TestId) -> Option<&TestNode> {
        self.nodes.get(id)
    }

    pub fn record_index(&self, id: &TestId) -> Option<usize> {
        self.record_index.get(id).copied()
    }

    #[cfg(test)]
    pub fn record(&self, idx: usize) -> &TestRecord {
        &self.records[idx]
    }

    pub fn record_mut(&mut self, idx: usize) -> &mut TestRecord {
        &mut self.records[idx]
    }

    /// Records in discovery order
    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    pub fn classes(&self) -> &[ClassTotal] {
        &self.classes
    }

    #[cfg(test)]
    pub fn class_total(&self, id: &TestId) -> Option<&ClassTotal> {
        self.class_index
            .get(&ClassKey::Class(id.clone()))
            .map(|&idx| &self.classes[idx])
    }

    pub fn into_parts(self) -> (Vec<ClassTotal>, Vec<TestRecord>) {
        (self.classes, self.records)
    }
}
