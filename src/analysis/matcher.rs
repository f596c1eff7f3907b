//! Matchers - classifiers for known causes of mismatch

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::finding::Finding;

/// Recognizes one known behavior difference.
///
/// Implementations should be narrow: a record claimed by two matchers is a
/// hard error during identification.
pub trait Matcher: Send + Sync {
    /// Name the matcher is tallied under.
    fn name(&self) -> &str;

    /// Whether `finding` is an instance of this known difference.
    fn is_match(&self, finding: &Finding) -> bool;

    /// Human-readable explanation of `finding`.
    ///
    /// `None` falls back to the default rendering.
    fn readable(&self, finding: &Finding) -> Option<String> {
        let _ = finding;
        None
    }
}

type Predicate = Box<dyn Fn(&Finding) -> bool + Send + Sync>;
type Renderer = Box<dyn Fn(&Finding) -> String + Send + Sync>;

/// Matcher built from closures.
///
/// # Example
///
/// ```rust
/// use labcoat::analysis::{Finding, Matcher, PredicateMatcher};
/// use serde_json::json;
///
/// let timeouts = PredicateMatcher::new("candidate-timeout", |finding| {
///     finding.candidate().and_then(|c| c.pointer("/exception/message"))
///         == Some(&json!("timed out"))
/// });
///
/// let finding = Finding::new(json!({"candidate": {"exception": {"message": "timed out"}}}));
/// assert!(timeouts.is_match(&finding));
/// ```
pub struct PredicateMatcher {
    name: String,
    predicate: Predicate,
    readable: Option<Renderer>,
}

impl PredicateMatcher {
    /// Create a matcher from a predicate.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&Finding) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            readable: None,
        }
    }

    /// Supply a custom rendering for matched records.
    #[must_use]
    pub fn with_readable(
        mut self,
        renderer: impl Fn(&Finding) -> String + Send + Sync + 'static,
    ) -> Self {
        self.readable = Some(Box::new(renderer));
        self
    }
}

impl Matcher for PredicateMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_match(&self, finding: &Finding) -> bool {
        (self.predicate)(finding)
    }

    fn readable(&self, finding: &Finding) -> Option<String> {
        self.readable.as_ref().map(|render| render(finding))
    }
}

impl fmt::Debug for PredicateMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateMatcher")
            .field("name", &self.name)
            .field("readable", &self.readable.is_some())
            .finish_non_exhaustive()
    }
}

/// One test against a JSON pointer into the record.
///
/// Every test that is set must hold. An empty pointer addresses the whole
/// record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    pointer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    equals: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    present: Option<bool>,
}

impl Condition {
    /// Create a condition on `pointer` with no tests yet.
    #[must_use]
    pub fn at(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
            ..Self::default()
        }
    }

    /// Require the addressed value to equal `value`.
    #[must_use]
    pub fn equals(mut self, value: impl Into<Value>) -> Self {
        self.equals = Some(value.into());
        self
    }

    /// Require the addressed value to be a string starting with `prefix`.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Require the addressed value to be a string containing `needle`.
    #[must_use]
    pub fn contains(mut self, needle: impl Into<String>) -> Self {
        self.contains = Some(needle.into());
        self
    }

    /// Require the addressed value to exist (or not).
    #[must_use]
    pub const fn present(mut self, present: bool) -> Self {
        self.present = Some(present);
        self
    }

    /// Get the JSON pointer.
    #[must_use]
    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    /// Whether no test is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.equals.is_none()
            && self.prefix.is_none()
            && self.contains.is_none()
            && self.present.is_none()
    }

    /// Evaluate against a record.
    #[must_use]
    pub fn holds(&self, record: &Value) -> bool {
        let target = record.pointer(&self.pointer);
        let text = target.and_then(Value::as_str);

        self.present.map_or(true, |present| target.is_some() == present)
            && self.equals.as_ref().map_or(true, |expected| target == Some(expected))
            && self
                .prefix
                .as_deref()
                .map_or(true, |prefix| text.is_some_and(|t| t.starts_with(prefix)))
            && self
                .contains
                .as_deref()
                .map_or(true, |needle| text.is_some_and(|t| t.contains(needle)))
    }
}

/// Matcher that claims records satisfying every one of its conditions.
///
/// This is the shape loaded from definition files.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatcher {
    name: String,
    conditions: Vec<Condition>,
    readable: Option<String>,
}

impl PatternMatcher {
    /// Create a pattern matcher.
    #[must_use]
    pub fn new(name: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self {
            name: name.into(),
            conditions,
            readable: None,
        }
    }

    /// Fixed explanation rendered for matched records.
    #[must_use]
    pub fn with_readable(mut self, readable: impl Into<String>) -> Self {
        self.readable = Some(readable.into());
        self
    }

    /// Get the conditions.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

impl Matcher for PatternMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_match(&self, finding: &Finding) -> bool {
        !self.conditions.is_empty()
            && self
                .conditions
                .iter()
                .all(|condition| condition.holds(finding.record()))
    }

    fn readable(&self, _finding: &Finding) -> Option<String> {
        self.readable.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finding() -> Finding {
        Finding::new(json!({
            "experiment": "widgets",
            "candidate": {"exception": {"class": "Timeout", "message": "timed out after 5s"}},
            "login": "hubot"
        }))
    }

    #[test]
    fn test_predicate_matcher() {
        let matcher = PredicateMatcher::new("hubot", |f| f.get("login") == Some(&json!("hubot")));
        assert_eq!(matcher.name(), "hubot");
        assert!(matcher.is_match(&finding()));
        assert!(matcher.readable(&finding()).is_none());

        let matcher = matcher.with_readable(|f| format!("login {}", f.get("login").unwrap()));
        assert_eq!(matcher.readable(&finding()).unwrap(), "login \"hubot\"");
    }

    #[test]
    fn test_condition_tests() {
        let record = finding().record().clone();

        assert!(Condition::at("/login").equals("hubot").holds(&record));
        assert!(!Condition::at("/login").equals("octocat").holds(&record));
        assert!(Condition::at("/candidate/exception/class").prefix("Time").holds(&record));
        assert!(Condition::at("/candidate/exception/message").contains("after").holds(&record));
        assert!(Condition::at("/control").present(false).holds(&record));
        assert!(!Condition::at("/control").present(true).holds(&record));
        assert!(!Condition::at("/missing").prefix("x").holds(&record));
        assert!(Condition::at("/login").is_empty());
    }

    #[test]
    fn test_whole_record_pointer() {
        let record = json!("known-1");
        assert!(Condition::at("").prefix("known-").holds(&record));
        assert!(!Condition::at("").prefix("known-").holds(&json!("unknown-1")));
    }

    #[test]
    fn test_pattern_matcher_requires_all_conditions() {
        let matcher = PatternMatcher::new(
            "candidate-timeout",
            vec![
                Condition::at("/experiment").equals("widgets"),
                Condition::at("/candidate/exception/class").equals("Timeout"),
            ],
        )
        .with_readable("candidate timed out");

        assert!(matcher.is_match(&finding()));
        assert_eq!(matcher.readable(&finding()).as_deref(), Some("candidate timed out"));

        let strict = PatternMatcher::new(
            "strict",
            vec![
                Condition::at("/experiment").equals("widgets"),
                Condition::at("/login").equals("octocat"),
            ],
        );
        assert!(!strict.is_match(&finding()));
    }

    #[test]
    fn test_pattern_matcher_without_conditions_never_matches() {
        assert!(!PatternMatcher::new("empty", Vec::new()).is_match(&finding()));
    }

    #[test]
    fn test_condition_deserializes() {
        let condition: Condition =
            serde_json::from_value(json!({"pointer": "/login", "prefix": "hu"})).unwrap();
        assert_eq!(condition, Condition::at("/login").prefix("hu"));
        assert!(serde_json::from_value::<Condition>(json!({"pointer": "/x", "bogus": 1})).is_err());
    }
}
