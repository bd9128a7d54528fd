use serde::{Deserialize, Serialize};

/// One line item of the results file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEntry {
    pub name: String,
    pub description: String,
    pub points: f64,
    pub max_points: f64,
    pub output: String,
    pub message: String,
}

/// Final grading report, written once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub score: f64,
    pub points: f64,
    pub max_points: f64,
    pub output: String,
    pub message: String,
    pub gradable: bool,
    pub tests: Vec<TestEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}
