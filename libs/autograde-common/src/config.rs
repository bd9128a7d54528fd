// Grading input bundle (params.json)
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default location of the bundle inside the grading container
pub const DEFAULT_PARAMS_PATH: &str = "/grade/params/params.json";

/// Default prefix stripped from `test_files` entries to get class names
pub const DEFAULT_TESTS_ROOT: &str = "/grade/tests/junit/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingParams {
    pub results_file: String,
    /// Whitespace-separated list of test class source paths
    pub test_files: String,
    #[serde(default)]
    pub compile_output: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl GradingParams {
    /// Parse the bundle from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let params: GradingParams =
            serde_json::from_str(content).context("Failed to parse params bundle")?;

        if params.results_file.trim().is_empty() {
            bail!("Params bundle has an empty results_file");
        }

        Ok(params)
    }

    /// Load the bundle from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Params file not found: {}", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read params file {}", path.display()))?;

        Self::from_json(&content)
    }

    /// Load the bundle and remove it from disk so the code under test cannot
    /// read the signature. The file is removed even if parsing fails.
    pub fn load_and_remove(path: &Path) -> Result<Self> {
        let loaded = Self::load(path);

        if path.exists() {
            if let Err(e) = fs::remove_file(path) {
                tracing::error!(path = %path.display(), error = %e, "Failed to delete params file");
            }
        }
        if path.exists() {
            bail!("Error deleting the params file: {}", path.display());
        }

        loaded
    }

    pub fn test_file_list(&self) -> Vec<&str> {
        self.test_files.split_whitespace().collect()
    }

    /// Global message prefix carrying compiler warnings, if any
    pub fn compile_warnings_message(&self) -> Option<String> {
        match self.compile_output.as_deref() {
            Some(warnings) if !warnings.is_empty() => {
                Some(format!("Compilation warnings:\n\n{}", warnings))
            }
            _ => None,
        }
    }
}

/// Map a test source path to the fully qualified class name it declares
///
/// `/grade/tests/junit/calc/CalcTest.java` → `calc.CalcTest`
pub fn class_name_from_source(source: &str, tests_root: &str) -> String {
    let relative = source.strip_prefix(tests_root).unwrap_or(source);
    let relative = relative.strip_suffix(".java").unwrap_or(relative);
    relative.replace('/', ".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_bundle() {
        let params = GradingParams::from_json(
            r#"{"results_file":"/grade/results/results.json","test_files":"/grade/tests/junit/A.java /grade/tests/junit/p/B.java"}"#,
        )
        .unwrap();

        assert_eq!(params.results_file, "/grade/results/results.json");
        assert_eq!(params.test_file_list().len(), 2);
        assert_eq!(params.signature, None);
        assert_eq!(params.compile_warnings_message(), None);
    }

    #[test]
    fn test_missing_results_file_is_error() {
        assert!(GradingParams::from_json(r#"{"test_files":"A.java"}"#).is_err());
        assert!(GradingParams::from_json(r#"{"results_file":" ","test_files":""}"#).is_err());
    }

    #[test]
    fn test_compile_warnings_prefix() {
        let params = GradingParams::from_json(
            r#"{"results_file":"r.json","test_files":"","compile_output":"Note: unchecked"}"#,
        )
        .unwrap();

        assert_eq!(
            params.compile_warnings_message().as_deref(),
            Some("Compilation warnings:\n\nNote: unchecked")
        );
    }

    #[test]
    fn test_empty_compile_output_ignored() {
        let params = GradingParams::from_json(
            r#"{"results_file":"r.json","test_files":"","compile_output":""}"#,
        )
        .unwrap();
        assert_eq!(params.compile_warnings_message(), None);
    }

    #[test]
    fn test_class_name_from_source() {
        assert_eq!(
            class_name_from_source("/grade/tests/junit/calc/CalcTest.java", DEFAULT_TESTS_ROOT),
            "calc.CalcTest"
        );
        assert_eq!(class_name_from_source("CalcTest.java", DEFAULT_TESTS_ROOT), "CalcTest");
        assert_eq!(class_name_from_source("a/b/C", DEFAULT_TESTS_ROOT), "a.b.C");
    }

    #[test]
    fn test_load_and_remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"results_file":"r.json","test_files":"A.java","signature":"abc"}}"#
        )
        .unwrap();
        drop(file);

        let params = GradingParams::load_and_remove(&path).unwrap();

        assert_eq!(params.signature.as_deref(), Some("abc"));
        assert!(!path.exists());
    }

    #[test]
    fn test_load_and_remove_deletes_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(GradingParams::load_and_remove(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GradingParams::load(&dir.path().join("absent.json")).is_err());
    }
}
