/// Report Builder - Final Totals From Aggregated State
///
/// **Scoring Rules:**
/// - max_points = sum of every class total, nested classes included
///   (declared ceiling, else the sum of its tests' weights)
/// - a ceiling above the sum of concrete test weights produces one extra
///   "Incomplete tests" entry worth the shortfall, at 0 points
/// - points = min(achieved, max_points)
/// - score = points / max_points clamped to [0, 1], or 0 when max_points is 0
///
/// Pure function: (final state, signature) → report.

use crate::aggregator::FinalState;
use crate::registry::TestRecord;
use autograde_common::types::{Report, TestEntry};
use tracing::{debug, info, warn};

pub const INCOMPLETE_TESTS_NAME: &str = "Incomplete tests";

pub const INCOMPLETE_TESTS_MESSAGE: &str = concat!(
    "The number of points achieved by the autograder tests was not enough to reach \n",
    "the full amount of tests required for full marks. This is typically caused by \n",
    "failing early tests, or by an early autograder crash.",
);

/// Shortfalls at or below this are rounding noise
pub const SHORTFALL_EPSILON: f64 = 0.01;

impl From<&TestRecord> for TestEntry {
    fn from(record: &TestRecord) -> Self {
        TestEntry {
            name: record.name.clone(),
            description: record.description.clone(),
            points: record.achieved_points,
            max_points: record.max_points,
            output: record.output.clone(),
            message: record.message.clone(),
        }
    }
}

fn incomplete_tests_entry(shortfall: f64) -> TestEntry {
    TestEntry {
        name: INCOMPLETE_TESTS_NAME.to_string(),
        description: String::new(),
        points: 0.0,
        max_points: shortfall,
        output: String::new(),
        message: INCOMPLETE_TESTS_MESSAGE.to_string(),
    }
}

/// Clamp achieved points and derive the score
pub fn final_score(achieved: f64, max_points: f64) -> (f64, f64) {
    let points = achieved.min(max_points);
    let score = if max_points > 0.0 {
        (points / max_points).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (score, points)
}

pub fn build(state: &FinalState, signature: Option<String>) -> Report {
    for class in &state.classes {
        debug!(
            class = ?class.key,
            accumulated = class.accumulated,
            ceiling = ?class.ceiling,
            "Class total"
        );
    }
    for reason in &state.run.reasons {
        warn!(reason = ?reason, "Run is not gradable");
    }

    let max_points: f64 = state.classes.iter().map(|class| class.resolved()).sum();
    let test_max_points: f64 = state.records.iter().map(|record| record.max_points).sum();

    let mut tests: Vec<TestEntry> = state.records.iter().map(TestEntry::from).collect();

    let shortfall = max_points - test_max_points;
    if shortfall > SHORTFALL_EPSILON {
        info!(shortfall, "Declared ceiling exceeds concrete tests; adding incomplete tests entry");
        tests.push(incomplete_tests_entry(shortfall));
    }

    let (score, points) = final_score(state.run.total_achieved, max_points);

    info!(
        score,
        points,
        max_points,
        gradable = state.run.gradable,
        tests = tests.len(),
        "Report built"
    );

    Report {
        score,
        points,
        max_points,
        output: state.run.output.clone(),
        message: state.run.message.clone(),
        gradable: state.run.gradable,
        tests,
        signature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::RunState;
    use crate::registry::{ClassKey, ClassTotal, RecordState};
    use autograde_common::events::TestId;

    fn record(name: &str, achieved: f64, max: f64) -> TestRecord {
        TestRecord {
            id: TestId::from(name),
            name: name.to_string(),
            description: String::new(),
            achieved_points: achieved,
            max_points: max,
            message: String::new(),
            output: String::new(),
            state: RecordState::Finished,
        }
    }

    fn class_total(id: &str, accumulated: f64, ceiling: Option<f64>) -> ClassTotal {
        ClassTotal {
            key: ClassKey::Class(TestId::from(id)),
            accumulated,
            ceiling,
        }
    }

    fn final_state(achieved: f64, classes: Vec<ClassTotal>, records: Vec<TestRecord>) -> FinalState {
        let mut run = RunState::new(None);
        run.total_achieved = achieved;
        FinalState {
            run,
            classes,
            records,
        }
    }

    #[test]
    fn test_final_score_clamps() {
        assert_eq!(final_score(5.0, 4.0), (1.0, 4.0));
        assert_eq!(final_score(1.0, 4.0), (0.25, 1.0));
        assert_eq!(final_score(3.0, 0.0), (0.0, 0.0));
        assert_eq!(final_score(-1.0, 4.0), (0.0, -1.0));
    }

    #[test]
    fn test_max_points_from_accumulated_sum() {
        let state = final_state(
            3.0,
            vec![class_total("A", 3.0, None), class_total("B", 2.0, None)],
            vec![record("a", 3.0, 3.0), record("b", 0.0, 2.0)],
        );

        let report = build(&state, None);

        assert_eq!(report.max_points, 5.0);
        assert_eq!(report.points, 3.0);
        assert_eq!(report.score, 0.6);
        assert_eq!(report.tests.len(), 2);
    }

    #[test]
    fn test_shortfall_synthesis() {
        let state = final_state(
            10.0,
            vec![class_total("A", 10.0, Some(16.0))],
            vec![record("a", 4.0, 4.0), record("b", 6.0, 6.0)],
        );

        let report = build(&state, None);

        assert_eq!(report.max_points, 16.0);
        assert_eq!(report.tests.len(), 3);
        let incomplete = &report.tests[2];
        assert_eq!(incomplete.name, INCOMPLETE_TESTS_NAME);
        assert_eq!(incomplete.max_points, 6.0);
        assert_eq!(incomplete.points, 0.0);
        assert_eq!(incomplete.message, INCOMPLETE_TESTS_MESSAGE);
        assert_eq!(report.points, 10.0);
        assert_eq!(report.score, 10.0 / 16.0);
    }

    #[test]
    fn test_ceiling_below_sum_caps_points() {
        let state = final_state(
            10.0,
            vec![class_total("A", 10.0, Some(8.0))],
            vec![record("a", 10.0, 10.0)],
        );

        let report = build(&state, None);

        assert_eq!(report.max_points, 8.0);
        assert_eq!(report.points, 8.0);
        assert_eq!(report.score, 1.0);
        assert_eq!(report.tests.len(), 1);
    }

    #[test]
    fn test_negligible_shortfall_ignored() {
        let state = final_state(
            0.0,
            vec![class_total("A", 1.0, Some(1.005))],
            vec![record("a", 0.0, 1.0)],
        );

        let report = build(&state, None);
        assert_eq!(report.tests.len(), 1);
    }

    #[test]
    fn test_empty_run() {
        let report = build(&final_state(0.0, vec![], vec![]), Some("sig".to_string()));

        assert_eq!(report.max_points, 0.0);
        assert_eq!(report.points, 0.0);
        assert_eq!(report.score, 0.0);
        assert!(report.tests.is_empty());
        assert!(report.gradable);
        assert_eq!(report.signature.as_deref(), Some("sig"));
    }

    #[test]
    fn test_incomplete_message_keeps_line_breaks() {
        let lines: Vec<&str> = INCOMPLETE_TESTS_MESSAGE.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("to reach "));
        assert!(lines[2].starts_with("failing early tests"));
    }

    #[test]
    fn test_global_fields_copied() {
        let mut state = final_state(0.0, vec![], vec![]);
        state.run.gradable = false;
        state.run.message = "Could not load test class X".to_string();
        state.run.output = "diag".to_string();

        let report = build(&state, None);

        assert!(!report.gradable);
        assert_eq!(report.message, "Could not load test class X");
        assert_eq!(report.output, "diag");
    }
}
