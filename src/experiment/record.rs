//! Mismatch Record - the published payload of one experiment run

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys owned by the payload itself; context entries with these names are
/// dropped when a record is built.
pub const RESERVED_KEYS: [&str; 5] = ["experiment", "timestamp", "first", "control", "candidate"];

/// Which side of an experiment a behavior belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Path {
    /// The trusted, pre-existing behavior.
    Control,
    /// The replacement being validated.
    Candidate,
}

impl Path {
    /// Get the wire name of the path.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Candidate => "candidate",
        }
    }

    /// Parse a wire name back into a path.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "control" => Some(Self::Control),
            "candidate" => Some(Self::Candidate),
            _ => None,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome classification of one experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    /// Both observations were equivalent.
    Match,
    /// The observations disagreed.
    Mismatch,
}

impl Event {
    /// Get the event name handed to publishers.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Mismatch => "mismatch",
        }
    }

    /// Whether this event records a disagreement.
    #[must_use]
    pub const fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured failure as it appears in a payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExceptionRecord {
    class: String,
    message: String,
}

impl ExceptionRecord {
    /// Create a new exception record.
    #[must_use]
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Get the concrete failure type name.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Get the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ExceptionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

/// One side of a payload: timing plus either a value or an exception.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationRecord {
    duration: f64,
    exception: Option<ExceptionRecord>,
    value: Value,
}

impl ObservationRecord {
    /// Create a new observation record.
    ///
    /// # Arguments
    ///
    /// * `duration` - Elapsed wall time in milliseconds
    /// * `exception` - Captured failure, if the behavior failed
    /// * `value` - Serialized value (`null` when the behavior failed)
    #[must_use]
    pub const fn new(duration: f64, exception: Option<ExceptionRecord>, value: Value) -> Self {
        Self {
            duration,
            exception,
            value,
        }
    }

    /// Get the elapsed time in milliseconds.
    #[must_use]
    pub const fn duration(&self) -> f64 {
        self.duration
    }

    /// Get the captured failure, if any.
    #[must_use]
    pub const fn exception(&self) -> Option<&ExceptionRecord> {
        self.exception.as_ref()
    }

    /// Get the serialized value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }
}

/// Mismatch Record is the durable payload of one experiment run.
///
/// Published for both `match` and `mismatch` events; sinks usually persist
/// only the latter, and the analysis session consumes them later.
///
/// ## Wire Shape
///
/// ```text
/// { experiment, timestamp, first, control: {..}, candidate: {..}, ...context }
/// ```
///
/// Context entries are flattened next to the fixed keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MismatchRecord {
    experiment: String,
    timestamp: DateTime<Utc>,
    first: Path,
    control: ObservationRecord,
    candidate: ObservationRecord,
    #[serde(flatten)]
    context: Map<String, Value>,
}

impl MismatchRecord {
    /// Create a builder for a record of the named experiment.
    #[must_use]
    pub fn builder(
        experiment: impl Into<String>,
        control: ObservationRecord,
        candidate: ObservationRecord,
    ) -> MismatchRecordBuilder {
        MismatchRecordBuilder::new(experiment, control, candidate)
    }

    /// Get the experiment name.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Get the time the record was built.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get the path that ran first.
    #[must_use]
    pub const fn first(&self) -> Path {
        self.first
    }

    /// Get the control observation.
    #[must_use]
    pub const fn control(&self) -> &ObservationRecord {
        &self.control
    }

    /// Get the candidate observation.
    #[must_use]
    pub const fn candidate(&self) -> &ObservationRecord {
        &self.candidate
    }

    /// Get the observation for the given path.
    #[must_use]
    pub const fn observation(&self, path: Path) -> &ObservationRecord {
        match path {
            Path::Control => &self.control,
            Path::Candidate => &self.candidate,
        }
    }

    /// Get the context entries (without the fixed keys).
    #[must_use]
    pub const fn context(&self) -> &Map<String, Value> {
        &self.context
    }
}

/// Builder for `MismatchRecord`.
#[derive(Debug)]
pub struct MismatchRecordBuilder {
    experiment: String,
    timestamp: DateTime<Utc>,
    first: Path,
    control: ObservationRecord,
    candidate: ObservationRecord,
    context: Map<String, Value>,
}

impl MismatchRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(
        experiment: impl Into<String>,
        control: ObservationRecord,
        candidate: ObservationRecord,
    ) -> Self {
        Self {
            experiment: experiment.into(),
            timestamp: Utc::now(),
            first: Path::Control,
            control,
            candidate,
            context: Map::new(),
        }
    }

    /// Set which path ran first.
    #[must_use]
    pub const fn first(mut self, first: Path) -> Self {
        self.first = first;
        self
    }

    /// Set a custom timestamp (useful for deserialization/testing).
    #[must_use]
    pub const fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Merge context entries. Reserved keys are dropped.
    #[must_use]
    pub fn context(mut self, context: &Map<String, Value>) -> Self {
        for (key, value) in context {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                self.context.insert(key.clone(), value.clone());
            }
        }
        self
    }

    /// Build the `MismatchRecord`.
    #[must_use]
    pub fn build(self) -> MismatchRecord {
        MismatchRecord {
            experiment: self.experiment,
            timestamp: self.timestamp,
            first: self.first,
            control: self.control,
            candidate: self.candidate,
            context: self.context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sides() -> (ObservationRecord, ObservationRecord) {
        (
            ObservationRecord::new(1.5, None, json!(42)),
            ObservationRecord::new(
                2.0,
                Some(ExceptionRecord::new("io::Error", "disk full")),
                Value::Null,
            ),
        )
    }

    #[test]
    fn test_wire_shape() {
        let (control, candidate) = sides();
        let mut context = Map::new();
        context.insert("user".into(), json!("hubot"));
        let record = MismatchRecord::builder("widgets", control, candidate)
            .first(Path::Candidate)
            .context(&context)
            .build();

        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["experiment"], "widgets");
        assert_eq!(wire["first"], "candidate");
        assert_eq!(wire["user"], "hubot");
        assert_eq!(wire["control"]["value"], 42);
        assert_eq!(wire["control"]["exception"], Value::Null);
        assert_eq!(wire["candidate"]["exception"]["class"], "io::Error");
        assert_eq!(wire["candidate"]["exception"]["message"], "disk full");
        assert!(wire["timestamp"].is_string());
    }

    #[test]
    fn test_fixed_keys_win_over_context() {
        let (control, candidate) = sides();
        let mut context = Map::new();
        context.insert("experiment".into(), json!("impostor"));
        context.insert("first".into(), json!("nobody"));
        let record = MismatchRecord::builder("widgets", control, candidate)
            .context(&context)
            .build();

        assert!(record.context().is_empty());
        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["experiment"], "widgets");
        assert_eq!(wire["first"], "control");
    }

    #[test]
    fn test_context_survives_deserialization() {
        let (control, candidate) = sides();
        let mut context = Map::new();
        context.insert("id".into(), json!(7));
        let record = MismatchRecord::builder("widgets", control, candidate)
            .context(&context)
            .build();

        let json = serde_json::to_string(&record).unwrap();
        let back: MismatchRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.context().get("id"), Some(&json!(7)));
        assert_eq!(back.observation(Path::Candidate).exception().unwrap().message(), "disk full");
    }

    #[test]
    fn test_path_and_event_names() {
        assert_eq!(Path::parse("control"), Some(Path::Control));
        assert_eq!(Path::parse("candidate"), Some(Path::Candidate));
        assert_eq!(Path::parse("other"), None);
        assert_eq!(Event::Match.to_string(), "match");
        assert_eq!(Event::Mismatch.to_string(), "mismatch");
        assert!(Event::Mismatch.is_mismatch());
    }
}
