/// Score Aggregator - Lifecycle Event State Machine
///
/// **Core Responsibility:**
/// Consume lifecycle events in arrival order and keep per-test records and
/// run-wide totals up to date.
///
/// **Record states:** `Provisional → Finished`. Finished is terminal; a
/// second finish for the same test is logged and ignored.
///
/// **Run-wide failures** (all folded into `RunState`, never returned as errors):
/// - a selected class missing from the discovery tree
/// - a malformed weight tag
/// - a container (test factory, value source) failing outright
/// - a finish event for an identifier that was never provisioned
///
/// The aggregator is owned by a single consumer task; engine threads reach
/// it only through the event channel, so handlers take `&mut self` and never
/// block.

use crate::policy::MalformedTag;
use crate::registry::{ClassTotal, ProvisionalRegistry, RecordState, TestRecord};
use autograde_common::events::{LifecycleEvent, Outcome, TestId, TestNode, VALUE_ONLY_KEY};
use std::ops::ControlFlow;
use tracing::{debug, error, info, warn};

pub const CONTAINER_FAILURE_MESSAGE: &str =
    "A test factory or value source failed to produce tests. Consult your instructor.";

pub const UNKNOWN_TEST_MESSAGE: &str = "Unable to parse the results. Test execution completed for a test that was not part of the test plan. Consult your instructor.";

/// Why a run can no longer be graded
#[derive(Debug, Clone, PartialEq)]
pub enum UngradableReason {
    ClassNotFound { class_name: String },
    MalformedTag(MalformedTag),
    ContainerFailed { id: TestId, detail: Option<String> },
    UnknownTest { id: TestId },
    EventSourceUnavailable { detail: String },
}

/// Process-wide aggregate for one grading run
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub total_achieved: f64,
    pub gradable: bool,
    pub message: String,
    pub output: String,
    /// Set once achieved points were discarded; later passes add nothing
    pub forfeited: bool,
    pub reasons: Vec<UngradableReason>,
}

impl RunState {
    pub fn new(message: Option<String>) -> Self {
        Self {
            total_achieved: 0.0,
            gradable: true,
            message: message.unwrap_or_default(),
            output: String::new(),
            forfeited: false,
            reasons: Vec::new(),
        }
    }

    /// Append one line to the global output
    pub fn push_output(&mut self, line: &str) {
        if !self.output.is_empty() && !self.output.ends_with('\n') {
            self.output.push('\n');
        }
        self.output.push_str(line);
    }

    /// Mark the run non-gradable while keeping achieved points
    fn mark_ungradable(&mut self, reason: UngradableReason) {
        self.gradable = false;
        self.reasons.push(reason);
    }

    /// Mark the run non-gradable and discard every achieved point
    fn forfeit(&mut self, reason: UngradableReason, message: &str) {
        self.mark_ungradable(reason);
        self.total_achieved = 0.0;
        self.forfeited = true;
        self.message = message.to_string();
    }
}

/// Aggregated state handed to the report builder
#[derive(Debug, Clone)]
pub struct FinalState {
    pub run: RunState,
    pub classes: Vec<ClassTotal>,
    /// Finished tests in completion order, then unfinished in discovery order
    pub records: Vec<TestRecord>,
}

pub struct ScoreAggregator {
    registry: ProvisionalRegistry,
    state: RunState,
    /// Record indices in the order their finish events arrived
    finish_order: Vec<usize>,
    selected_classes: Vec<String>,
}

impl ScoreAggregator {
    pub fn new(selected_classes: Vec<String>, message: Option<String>) -> Self {
        Self {
            registry: ProvisionalRegistry::new(),
            state: RunState::new(message),
            finish_order: Vec::new(),
            selected_classes,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    #[cfg(test)]
    pub fn registry(&self) -> &ProvisionalRegistry {
        &self.registry
    }

    /// Dispatch one lifecycle event; `Break` means stop consuming
    pub fn handle(&mut self, event: LifecycleEvent) -> ControlFlow<()> {
        match event {
            LifecycleEvent::PlanStarted { nodes } => return self.on_plan_started(&nodes),
            LifecycleEvent::DynamicTestRegistered { node } => self.on_dynamic_registered(&node),
            LifecycleEvent::ExecutionStarted { id } => {
                debug!(test_id = %id, "Execution started");
            }
            LifecycleEvent::ExecutionSkipped { id, reason } => self.on_skipped(&id, &reason),
            LifecycleEvent::ReportingEntry { id, entries } => self.on_reporting_entry(&id, &entries),
            LifecycleEvent::ExecutionFinished { id, outcome } => self.on_finished(&id, &outcome),
            LifecycleEvent::PlanFinished => {
                info!("Test plan finished");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Validate the selected classes, then provision the whole tree
    pub fn on_plan_started(&mut self, nodes: &[TestNode]) -> ControlFlow<()> {
        let missing = self
            .selected_classes
            .iter()
            .find(|class_name| {
                !nodes
                    .iter()
                    .any(|node| node.class_name() == Some(class_name.as_str()))
            })
            .cloned();
        if let Some(class_name) = missing {
            self.abort_on_missing_class(&class_name);
            return ControlFlow::Break(());
        }

        let malformed = self.registry.seed(nodes);
        self.record_malformed(malformed);

        info!(
            tests = self.registry.records().len(),
            classes = self.registry.classes().len(),
            "Test plan provisioned"
        );
        ControlFlow::Continue(())
    }

    /// A declared test class is not part of the discovery tree
    pub fn abort_on_missing_class(&mut self, class_name: &str) {
        error!(class_name = %class_name, "Could not load test class");
        let message = format!("Could not load test class {}", class_name);
        self.state.forfeit(
            UngradableReason::ClassNotFound {
                class_name: class_name.to_string(),
            },
            &message,
        );
    }

    pub fn on_dynamic_registered(&mut self, node: &TestNode) {
        debug!(test_id = %node.id, "Dynamic test registered");
        let malformed = self.registry.register_dynamic(node);
        self.record_malformed(malformed);
    }

    fn record_malformed(&mut self, malformed: Vec<MalformedTag>) {
        for tag in malformed {
            let message = tag.message();
            warn!(tag = %tag.tag, "{}", message);
            self.state.push_output(&message);
            self.state.mark_ungradable(UngradableReason::MalformedTag(tag));
        }
    }

    /// Append published key/value pairs to a pending test's output
    pub fn on_reporting_entry(&mut self, id: &TestId, entries: &[(String, String)]) {
        let Some(idx) = self.registry.record_index(id) else {
            debug!(test_id = %id, "Reporting entry for a non-test node ignored");
            return;
        };

        let record = self.registry.record_mut(idx);
        if record.is_finished() {
            warn!(test_id = %id, "Reporting entry after finish ignored");
            return;
        }

        for (key, value) in entries {
            if key == VALUE_ONLY_KEY {
                record.append_output(value);
            } else {
                record.append_output(&format!("{}: {}", key, value));
            }
        }
    }

    /// A skipped container skips every test beneath it
    pub fn on_skipped(&mut self, id: &TestId, reason: &str) {
        if let Some(idx) = self.registry.record_index(id) {
            self.skip_record(idx, reason);
            return;
        }

        if self.registry.node(id).is_none() {
            debug!(test_id = %id, reason = %reason, "Skip for an identifier outside the test plan ignored");
            return;
        }

        let descendants = self.registry.descendant_records(id);
        info!(container_id = %id, reason = %reason, tests = descendants.len(), "Container skipped");
        for idx in descendants {
            self.skip_record(idx, reason);
        }
    }

    fn skip_record(&mut self, idx: usize, reason: &str) {
        let record = self.registry.record_mut(idx);
        if record.is_finished() {
            warn!(test_id = %record.id, "Skip after finish ignored");
            return;
        }

        record.achieved_points = 0.0;
        record.message = format!("This test was skipped: {}", reason);
        record.state = RecordState::Finished;
        info!(test_id = %record.id, reason = %reason, "Test skipped");

        self.finish_order.push(idx);
    }

    pub fn on_finished(&mut self, id: &TestId, outcome: &Outcome) {
        let Some(node) = self.registry.node(id) else {
            self.on_unknown_identifier_finished(id);
            return;
        };

        if !node.is_test() {
            self.on_container_finished(id, outcome);
            return;
        }

        match self.registry.record_index(id) {
            Some(idx) => self.finish_test(idx, outcome),
            None => self.on_unknown_identifier_finished(id),
        }
    }

    fn finish_test(&mut self, idx: usize, outcome: &Outcome) {
        let record = self.registry.record_mut(idx);
        if record.is_finished() {
            warn!(test_id = %record.id, "Duplicate finish event ignored");
            return;
        }

        if outcome.is_success() {
            record.achieved_points = record.max_points;
            record.message = String::new();
        } else {
            record.achieved_points = 0.0;
            record.message = outcome.detail.clone().unwrap_or_default();
        }
        record.state = RecordState::Finished;

        let achieved = record.achieved_points;
        info!(
            test_id = %record.id,
            status = ?outcome.status,
            points = achieved,
            max_points = record.max_points,
            "Test finished"
        );

        if !self.state.forfeited {
            self.state.total_achieved += achieved;
        }
        self.finish_order.push(idx);
    }

    /// Containers carry no score; only an outright failure matters
    pub fn on_container_finished(&mut self, id: &TestId, outcome: &Outcome) {
        if outcome.is_success() {
            debug!(container_id = %id, "Container finished");
            return;
        }

        error!(
            container_id = %id,
            status = ?outcome.status,
            detail = outcome.detail.as_deref().unwrap_or(""),
            "Container failed; run is not gradable"
        );
        self.state.forfeit(
            UngradableReason::ContainerFailed {
                id: id.clone(),
                detail: outcome.detail.clone(),
            },
            CONTAINER_FAILURE_MESSAGE,
        );
    }

    /// Should not happen with correct discovery ordering
    pub fn on_unknown_identifier_finished(&mut self, id: &TestId) {
        error!(test_id = %id, "Finish event for an identifier outside the test plan");
        self.state
            .forfeit(UngradableReason::UnknownTest { id: id.clone() }, UNKNOWN_TEST_MESSAGE);
        self.state.push_output(id.as_str());
    }

    /// The event source could not be opened at all
    pub fn on_source_unavailable(&mut self, detail: &str) {
        error!(error = %detail, "Event source unavailable");
        let message = format!("Could not read test results: {}", detail);
        self.state.forfeit(
            UngradableReason::EventSourceUnavailable {
                detail: detail.to_string(),
            },
            &message,
        );
    }

    /// Record that aggregation stopped at the deadline
    pub fn note_deadline_exceeded(&mut self, deadline_secs: u64) {
        let pending = self
            .registry
            .records()
            .iter()
            .filter(|record| !record.is_finished())
            .count();
        warn!(deadline_secs, pending, "Grading deadline exceeded");
        self.state
            .push_output(&format!("Grading deadline exceeded after {}s", deadline_secs));
    }

    /// Record that an external shutdown cut aggregation short
    pub fn note_interrupted(&mut self) {
        warn!("Grading interrupted");
        self.state
            .push_output("Grading interrupted before all results were collected");
    }

    /// Finished tests in completion order, then pending tests in discovery order
    pub fn ordered_records(&self) -> Vec<TestRecord> {
        let records = self.registry.records();
        let mut ordered: Vec<TestRecord> = self
            .finish_order
            .iter()
            .map(|&idx| records[idx].clone())
            .collect();
        ordered.extend(records.iter().filter(|record| !record.is_finished()).cloned());
        ordered
    }

    pub fn finish(self) -> FinalState {
        let records = self.ordered_records();
        let (classes, _) = self.registry.into_parts();

        FinalState {
            run: self.state,
            classes,
            records,
        }
    }
}
