//! Lab - process-wide factory for experiments
//!
//! The lab decides which experiments are enabled, where their results are
//! published, and what context every payload carries. Install one at start-up;
//! [`crate::science`] reads it on every call.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::debug;

use super::engine::Experiment;
use super::publish::{NoopPublisher, Publisher};

/// Enable policy shared by every experiment a lab builds.
pub type EnablePolicy = dyn Fn(&str) -> bool + Send + Sync;

static INSTALLED: RwLock<Option<Arc<Lab>>> = parking_lot::const_rwlock(None);

/// Install `lab` as the process-wide default, replacing any previous one.
///
/// Meant to be called once during start-up; experiments already built keep
/// the lab they were built from.
pub fn install(lab: Lab) {
    debug!(?lab, "installing lab");
    *INSTALLED.write() = Some(Arc::new(lab));
}

/// Remove the installed lab; [`current`] falls back to the default lab.
pub fn reset() {
    INSTALLED.write().take();
}

/// Get the installed lab, or a default one (always enabled, no-op publisher).
#[must_use]
pub fn current() -> Arc<Lab> {
    INSTALLED
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(Lab::default()))
}

/// Factory holding the defaults applied to new experiments.
#[derive(Clone)]
pub struct Lab {
    enabled: Arc<EnablePolicy>,
    publisher: Arc<dyn Publisher>,
    context: Map<String, Value>,
}

impl Default for Lab {
    fn default() -> Self {
        Self {
            enabled: Arc::new(|_: &str| true),
            publisher: Arc::new(NoopPublisher),
            context: Map::new(),
        }
    }
}

impl fmt::Debug for Lab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lab")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Lab {
    /// Create a builder for a lab.
    #[must_use]
    pub fn builder() -> LabBuilder {
        LabBuilder::default()
    }

    /// Whether the named experiment should run its candidate.
    #[must_use]
    pub fn is_enabled(&self, experiment: &str) -> bool {
        (self.enabled)(experiment)
    }

    /// Get the publisher handed to new experiments.
    #[must_use]
    pub fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::clone(&self.publisher)
    }

    /// Get the context merged into every new experiment.
    #[must_use]
    pub const fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Build an experiment carrying this lab's defaults.
    pub fn experiment<'a, T, E, F>(
        &self,
        name: impl Into<String>,
        control: F,
    ) -> Experiment<'a, T, E>
    where
        F: FnOnce() -> Result<T, E> + 'a,
    {
        let enabled = Arc::clone(&self.enabled);
        let mut experiment = Experiment::new(name, control);
        experiment
            .enabled_by(move |name| enabled(name))
            .publisher(self.publisher())
            .merge_context(&self.context);
        experiment
    }
}

/// Builder for `Lab`.
#[derive(Default)]
pub struct LabBuilder {
    lab: Lab,
}

impl LabBuilder {
    /// Set the enable policy, called with the experiment name on every run.
    #[must_use]
    pub fn enabled(mut self, policy: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.lab.enabled = Arc::new(policy);
        self
    }

    /// Set the publisher.
    #[must_use]
    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.lab.publisher = publisher;
        self
    }

    /// Add a context entry to every experiment.
    #[must_use]
    pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.lab.context.insert(key.into(), value.into());
        self
    }

    /// Build the `Lab`.
    #[must_use]
    pub fn build(self) -> Lab {
        self.lab
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lab_enables_everything() {
        let lab = Lab::default();
        assert!(lab.is_enabled("anything"));
        assert!(lab.context().is_empty());
    }

    #[test]
    fn test_builder() {
        let lab = Lab::builder()
            .enabled(|name| name.starts_with("on-"))
            .context("host", "web-1")
            .build();

        assert!(lab.is_enabled("on-widgets"));
        assert!(!lab.is_enabled("widgets"));
        assert_eq!(lab.context().get("host"), Some(&Value::from("web-1")));
    }

    #[test]
    fn test_experiment_inherits_lab_defaults() {
        let lab = Lab::builder().context("host", "web-1").build();
        let experiment = lab.experiment("widgets", || Ok::<_, String>(1));

        assert_eq!(experiment.name(), "widgets");
        assert_eq!(experiment.context().get("host"), Some(&Value::from("web-1")));
        assert_eq!(experiment.context().get("experiment"), Some(&Value::from("widgets")));
    }
}
