/// Tag Policy Resolver - Point Weights From Declarations
///
/// **Core Responsibility:**
/// Turn the tags and legacy annotation a test or class declares into the
/// point values the aggregator works with.
///
/// **Grammar:**
/// - Test level: `points=<float>`, last valid occurrence wins, default 1
/// - Class level: `maxpoints=<float>`, last valid occurrence wins, no default
/// - Legacy override: `points` wins when strictly positive, `name` and
///   `description` win when non-empty
///
/// Malformed numbers are never dropped silently: they are returned as
/// `MalformedTag` values so the caller can mark the run non-gradable.
/// Resolution itself is pure and runs once per node at discovery time.

use autograde_common::events::{LegacyInfo, TestNode};

pub const POINTS_TAG_PREFIX: &str = "points=";
pub const MAX_POINTS_TAG_PREFIX: &str = "maxpoints=";
pub const DEFAULT_MAX_POINTS: f64 = 1.0;

/// Anything that can declare a point weight
pub trait DeclaresWeight {
    fn weight_tags(&self) -> &[String];

    fn legacy_info(&self) -> Option<&LegacyInfo> {
        None
    }
}

impl DeclaresWeight for TestNode {
    fn weight_tags(&self) -> &[String] {
        &self.tags
    }

    fn legacy_info(&self) -> Option<&LegacyInfo> {
        self.legacy.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Points,
    MaxPoints,
}

impl TagKind {
    fn prefix(self) -> &'static str {
        match self {
            TagKind::Points => POINTS_TAG_PREFIX,
            TagKind::MaxPoints => MAX_POINTS_TAG_PREFIX,
        }
    }

    fn label(self) -> &'static str {
        match self {
            TagKind::Points => "points",
            TagKind::MaxPoints => "maxpoints",
        }
    }
}

/// A weight tag whose value could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedTag {
    pub kind: TagKind,
    pub tag: String,
}

impl MalformedTag {
    pub fn message(&self) -> String {
        format!("Could not parse {} tag: {}", self.kind.label(), self.tag)
    }
}

/// Resolved policy for an executable test
#[derive(Debug, Clone, PartialEq)]
pub struct TestPolicy {
    pub max_points: f64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub malformed: Vec<MalformedTag>,
}

/// Resolved policy for a class-like container
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassPolicy {
    pub ceiling: Option<f64>,
    pub malformed: Vec<MalformedTag>,
}

/// Parse a weight value; only finite numbers are accepted
fn parse_weight(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Scan tags for one marker kind, returning the last valid value
fn scan_tags(tags: &[String], kind: TagKind, malformed: &mut Vec<MalformedTag>) -> Option<f64> {
    let mut resolved = None;

    for tag in tags {
        let Some(value) = tag.strip_prefix(kind.prefix()) else {
            continue;
        };
        match parse_weight(value) {
            Some(weight) => resolved = Some(weight),
            None => malformed.push(MalformedTag {
                kind,
                tag: tag.clone(),
            }),
        }
    }

    resolved
}

/// Resolve the weight, name and description overrides of a test
pub fn resolve_test<D: DeclaresWeight + ?Sized>(declared: &D) -> TestPolicy {
    let mut malformed = Vec::new();
    let mut max_points =
        scan_tags(declared.weight_tags(), TagKind::Points, &mut malformed).unwrap_or(DEFAULT_MAX_POINTS);
    let mut name = None;
    let mut description = None;

    if let Some(legacy) = declared.legacy_info() {
        if legacy.points > 0.0 {
            max_points = legacy.points;
        }
        if !legacy.name.is_empty() {
            name = Some(legacy.name.clone());
        }
        if !legacy.description.is_empty() {
            description = Some(legacy.description.clone());
        }
    }

    TestPolicy {
        max_points,
        name,
        description,
        malformed,
    }
}

/// Resolve the explicit ceiling of a class-like container
pub fn resolve_class<D: DeclaresWeight + ?Sized>(declared: &D) -> ClassPolicy {
    let mut malformed = Vec::new();
    let ceiling = scan_tags(declared.weight_tags(), TagKind::MaxPoints, &mut malformed);

    ClassPolicy { ceiling, malformed }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Declared {
        tags: Vec<String>,
        legacy: Option<LegacyInfo>,
    }

    impl DeclaresWeight for Declared {
        fn weight_tags(&self) -> &[String] {
            &self.tags
        }

        fn legacy_info(&self) -> Option<&LegacyInfo> {
            self.legacy.as_ref()
        }
    }

    fn declared(tags: &[&str]) -> Declared {
        Declared {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            legacy: None,
        }
    }

    fn legacy(points: f64, name: &str, description: &str) -> LegacyInfo {
        LegacyInfo {
            points,
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_default_weight() {
        let policy = resolve_test(&declared(&[]));
        assert_eq!(policy.max_points, 1.0);
        assert_eq!(policy.name, None);
        assert_eq!(policy.description, None);
        assert!(policy.malformed.is_empty());
    }

    #[test]
    fn test_points_tag() {
        let policy = resolve_test(&declared(&["slow", "points=2.5"]));
        assert_eq!(policy.max_points, 2.5);
    }

    #[test]
    fn test_last_valid_points_tag_wins() {
        let policy = resolve_test(&declared(&["points=2", "points=3", "points=x"]));
        assert_eq!(policy.max_points, 3.0);
        assert_eq!(policy.malformed.len(), 1);
    }

    #[test]
    fn test_malformed_points_tag_reported() {
        let policy = resolve_test(&declared(&["points=abc"]));

        assert_eq!(policy.max_points, DEFAULT_MAX_POINTS);
        assert_eq!(
            policy.malformed,
            vec![MalformedTag {
                kind: TagKind::Points,
                tag: "points=abc".to_string(),
            }]
        );
        assert_eq!(policy.malformed[0].message(), "Could not parse points tag: points=abc");
    }

    #[test]
    fn test_non_finite_points_rejected() {
        let policy = resolve_test(&declared(&["points=NaN", "points=inf"]));
        assert_eq!(policy.max_points, DEFAULT_MAX_POINTS);
        assert_eq!(policy.malformed.len(), 2);
    }

    #[test]
    fn test_maxpoints_tag_ignored_for_tests() {
        let policy = resolve_test(&declared(&["maxpoints=16"]));
        assert_eq!(policy.max_points, DEFAULT_MAX_POINTS);
        assert!(policy.malformed.is_empty());
    }

    #[test]
    fn test_legacy_override_wins() {
        let mut d = declared(&["points=2"]);
        d.legacy = Some(legacy(5.0, "Adds numbers", "Checks 1 + 1"));

        let policy = resolve_test(&d);

        assert_eq!(policy.max_points, 5.0);
        assert_eq!(policy.name.as_deref(), Some("Adds numbers"));
        assert_eq!(policy.description.as_deref(), Some("Checks 1 + 1"));
    }

    #[test]
    fn test_legacy_non_positive_points_ignored() {
        let mut d = declared(&["points=2"]);
        d.legacy = Some(legacy(0.0, "", ""));

        let policy = resolve_test(&d);

        assert_eq!(policy.max_points, 2.0);
        assert_eq!(policy.name, None);
        assert_eq!(policy.description, None);
    }

    #[test]
    fn test_class_ceiling() {
        let policy = resolve_class(&declared(&["maxpoints=16"]));
        assert_eq!(policy.ceiling, Some(16.0));
        assert!(policy.malformed.is_empty());
    }

    #[test]
    fn test_class_without_ceiling() {
        let policy = resolve_class(&declared(&["points=3"]));
        assert_eq!(policy.ceiling, None);
    }

    #[test]
    fn test_malformed_class_ceiling() {
        let policy = resolve_class(&declared(&["maxpoints=abc"]));

        assert_eq!(policy.ceiling, None);
        assert_eq!(policy.malformed[0].message(), "Could not parse maxpoints tag: maxpoints=abc");
    }

    #[test]
    fn test_resolve_from_test_node() {
        let node: TestNode = serde_json::from_str(
            r#"{"id":"t","display_name":"t()","kind":"test","tags":["points=4"],"legacy":{"name":"Named"}}"#,
        )
        .unwrap();

        let policy = resolve_test(&node);

        // legacy points default to 1, which is positive, so it wins
        assert_eq!(policy.max_points, 1.0);
        assert_eq!(policy.name.as_deref(), Some("Named"));
    }
}
