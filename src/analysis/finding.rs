//! Finding - a prepared mismatch record plus the session's wrappers

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::experiment::{MismatchRecord, Path};
use crate::{Error, Result};

/// Query method contributed by a wrapper.
pub type WrapperMethod = Arc<dyn Fn(&Finding) -> anyhow::Result<Value> + Send + Sync>;

/// Named set of query methods attached to every prepared record.
///
/// A wrapper never changes the record; it only adds lookups, such as turning
/// a raw login string in the context into something richer.
///
/// # Example
///
/// ```rust
/// use labcoat::analysis::{Finding, Wrapper};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let shout = Wrapper::new("shout").method("loud_login", |finding| {
///     let login = finding.call("login")?;
///     Ok(json!(login.as_str().unwrap_or_default().to_uppercase()))
/// });
///
/// let finding = Finding::with_wrappers(json!({"login": "hubot"}), Arc::from(vec![Arc::new(shout)]));
/// assert_eq!(finding.call("loud_login")?, json!("HUBOT"));
/// # Ok::<(), labcoat::Error>(())
/// ```
pub struct Wrapper {
    name: String,
    methods: FxHashMap<String, WrapperMethod>,
}

impl Wrapper {
    /// Create a wrapper with no methods.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: FxHashMap::default(),
        }
    }

    /// Add a query method. A later method with the same name replaces it.
    #[must_use]
    pub fn method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&Finding) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Get the wrapper name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this wrapper defines `method`.
    #[must_use]
    pub fn responds_to(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Names of every method this wrapper defines, sorted.
    #[must_use]
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn lookup(&self, method: &str) -> Option<&WrapperMethod> {
        self.methods.get(method)
    }
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// A prepared record as the analyst sees it.
///
/// Fixed accessors cover the payload keys every mismatch record carries.
/// [`Finding::call`] resolves anything else: fields already on the record
/// come first, then each wrapper's methods in registration order.
#[derive(Clone)]
pub struct Finding {
    record: Value,
    wrappers: Arc<[Arc<Wrapper>]>,
}

impl Finding {
    /// Create a finding with no wrappers attached.
    #[must_use]
    pub fn new(record: Value) -> Self {
        Self::with_wrappers(record, Arc::from(Vec::new()))
    }

    /// Create a finding with the given wrappers, first-registered first.
    #[must_use]
    pub const fn with_wrappers(record: Value, wrappers: Arc<[Arc<Wrapper>]>) -> Self {
        Self { record, wrappers }
    }

    /// Get the prepared record.
    #[must_use]
    pub const fn record(&self) -> &Value {
        &self.record
    }

    /// Get a top-level field of the record.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.record.as_object().and_then(|fields| fields.get(key))
    }

    /// Get the experiment name.
    #[must_use]
    pub fn experiment(&self) -> Option<&str> {
        self.get("experiment").and_then(Value::as_str)
    }

    /// Get the path that ran first.
    #[must_use]
    pub fn first(&self) -> Option<Path> {
        self.get("first").and_then(Value::as_str).and_then(Path::parse)
    }

    /// Get the control observation.
    #[must_use]
    pub fn control(&self) -> Option<&Value> {
        self.get("control")
    }

    /// Get the candidate observation.
    #[must_use]
    pub fn candidate(&self) -> Option<&Value> {
        self.get("candidate")
    }

    /// Get the observation for `path`.
    #[must_use]
    pub fn observation(&self, path: Path) -> Option<&Value> {
        self.get(path.as_str())
    }

    /// Get the timestamp, parsed from RFC 3339.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.get("timestamp")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Decode the record into the typed payload.
    ///
    /// # Errors
    ///
    /// Returns error if the record does not have the mismatch payload shape.
    pub fn to_mismatch(&self) -> Result<MismatchRecord> {
        Ok(serde_json::from_value(self.record.clone())?)
    }

    /// Names of the wrappers attached to this finding.
    #[must_use]
    pub fn wrappers(&self) -> Vec<&str> {
        self.wrappers.iter().map(|w| w.name()).collect()
    }

    /// Whether `method` resolves to a record field or a wrapper method.
    #[must_use]
    pub fn responds_to(&self, method: &str) -> bool {
        self.get(method).is_some() || self.wrappers.iter().any(|w| w.responds_to(method))
    }

    /// Resolve `method` against the record, then the wrappers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMethod`] if nothing provides `method`, or
    /// [`Error::WrapperFailed`] if the wrapper method fails.
    pub fn call(&self, method: &str) -> Result<Value> {
        if let Some(value) = self.get(method) {
            return Ok(value.clone());
        }
        let found = self.wrappers.iter().find_map(|w| w.lookup(method));
        let Some(found) = found else {
            return Err(Error::UnknownMethod(method.to_owned()));
        };
        found(self).map_err(|error| Error::WrapperFailed {
            method: method.to_owned(),
            message: format!("{error:#}"),
        })
    }
}

impl fmt::Debug for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finding")
            .field("record", &self.record)
            .field("wrappers", &self.wrappers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "experiment": "widgets",
            "timestamp": "2024-05-01T12:00:00Z",
            "first": "candidate",
            "control": {"duration": 1.0, "exception": null, "value": 1},
            "candidate": {"duration": 2.0, "exception": null, "value": 2},
            "login": "hubot"
        })
    }

    fn wrapped(wrappers: Vec<Wrapper>) -> Finding {
        let wrappers: Vec<Arc<Wrapper>> = wrappers.into_iter().map(Arc::new).collect();
        Finding::with_wrappers(payload(), Arc::from(wrappers))
    }

    #[test]
    fn test_fixed_accessors() {
        let finding = Finding::new(payload());
        assert_eq!(finding.experiment(), Some("widgets"));
        assert_eq!(finding.first(), Some(Path::Candidate));
        assert_eq!(finding.control().unwrap()["value"], 1);
        assert_eq!(finding.observation(Path::Candidate).unwrap()["value"], 2);
        assert_eq!(
            finding.timestamp().unwrap().to_rfc3339(),
            "2024-05-01T12:00:00+00:00"
        );
        assert_eq!(finding.to_mismatch().unwrap().experiment(), "widgets");
    }

    #[test]
    fn test_accessors_on_non_payload_record() {
        let finding = Finding::new(json!("known-1"));
        assert!(finding.experiment().is_none());
        assert!(finding.timestamp().is_none());
        assert!(finding.to_mismatch().is_err());
    }

    #[test]
    fn test_first_registered_wrapper_wins() {
        let finding = wrapped(vec![
            Wrapper::new("a").method("x", |_| Ok(json!("from a"))),
            Wrapper::new("b")
                .method("x", |_| Ok(json!("from b")))
                .method("y", |_| Ok(json!("only b"))),
        ]);

        assert_eq!(finding.call("x").unwrap(), json!("from a"));
        assert_eq!(finding.call("y").unwrap(), json!("only b"));
        assert_eq!(finding.wrappers(), vec!["a", "b"]);
    }

    #[test]
    fn test_record_fields_are_not_hidden() {
        let finding = wrapped(vec![Wrapper::new("a").method("login", |_| Ok(json!("shadow")))]);
        assert_eq!(finding.call("login").unwrap(), json!("hubot"));
        assert_eq!(finding.call("experiment").unwrap(), json!("widgets"));
    }

    #[test]
    fn test_wrapper_method_sees_finding() {
        let finding = wrapped(vec![Wrapper::new("a").method("greeting", |f| {
            Ok(json!(format!("hello {}", f.call("login")?.as_str().unwrap_or_default())))
        })]);
        assert_eq!(finding.call("greeting").unwrap(), json!("hello hubot"));
    }

    #[test]
    fn test_unknown_and_failing_methods() {
        let finding = wrapped(vec![
            Wrapper::new("a").method("broken", |_| anyhow::bail!("lookup failed")),
        ]);

        assert!(matches!(finding.call("missing"), Err(Error::UnknownMethod(m)) if m == "missing"));
        assert!(matches!(
            finding.call("broken"),
            Err(Error::WrapperFailed { message, .. }) if message.contains("lookup failed")
        ));
        assert!(finding.responds_to("broken"));
        assert!(finding.responds_to("login"));
        assert!(!finding.responds_to("missing"));
    }

    #[test]
    fn test_wrapper_method_names() {
        let wrapper = Wrapper::new("a")
            .method("zeta", |_| Ok(Value::Null))
            .method("alpha", |_| Ok(Value::Null));
        assert_eq!(wrapper.method_names(), vec!["alpha", "zeta"]);
        assert!(format!("{wrapper:?}").contains("alpha"));
    }
}
