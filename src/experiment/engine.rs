//! Experiment - randomized two-path execution with publication

use std::fmt;
use std::panic;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::comparator::Comparator;
use super::observation::{Classifier, Cleaner, Failure, Observation};
use super::publish::{NoopPublisher, Publisher};
use super::record::{Event, MismatchRecord, Path};

type Behavior<'a, T, E> = Box<dyn FnOnce() -> Result<T, E> + 'a>;

/// One named comparison between a control and a candidate behavior.
///
/// Built fresh per invocation, configured, then consumed by [`Experiment::run`].
/// The caller always gets the control's outcome back; everything learned
/// about the candidate goes to the publisher.
///
/// # Example
///
/// ```rust
/// use labcoat::experiment::Experiment;
///
/// let mut experiment = Experiment::new("widget-count", || Ok::<_, String>(3));
/// experiment.candidate(|| Ok(3)).add_context("user", "hubot");
/// assert_eq!(experiment.run(), Ok(3));
/// ```
pub struct Experiment<'a, T, E> {
    name: String,
    control: Behavior<'a, T, E>,
    candidate: Option<Behavior<'a, T, E>>,
    context: Map<String, Value>,
    cleaner: Option<Box<Cleaner<'a, T>>>,
    classifier: Option<Box<Classifier<'a, E>>>,
    comparator: Comparator<'a, T>,
    enabled: Box<dyn Fn(&str) -> bool + 'a>,
    publisher: Arc<dyn Publisher>,
    seed: Option<u64>,
}

impl<T, E> fmt::Debug for Experiment<'_, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("name", &self.name)
            .field("has_candidate", &self.candidate.is_some())
            .field("context", &self.context)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl<'a, T, E> Experiment<'a, T, E> {
    /// Create an experiment around its control behavior.
    ///
    /// The experiment starts enabled, with no candidate, default equality and
    /// a no-op publisher. The context holds `experiment: name`.
    pub fn new<F>(name: impl Into<String>, control: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + 'a,
    {
        let name = name.into();
        let mut context = Map::new();
        context.insert("experiment".to_owned(), Value::String(name.clone()));
        Self {
            name,
            control: Box::new(control),
            candidate: None,
            context,
            cleaner: None,
            classifier: None,
            comparator: Comparator::new(),
            enabled: Box::new(|_: &str| true),
            publisher: Arc::new(NoopPublisher),
            seed: None,
        }
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the context merged into published payloads.
    #[must_use]
    pub const fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Whether a candidate behavior is registered.
    #[must_use]
    pub const fn has_candidate(&self) -> bool {
        self.candidate.is_some()
    }

    /// Register the candidate behavior.
    pub fn candidate<F>(&mut self, candidate: F) -> &mut Self
    where
        F: FnOnce() -> Result<T, E> + 'a,
    {
        self.candidate = Some(Box::new(candidate));
        self
    }

    /// Add one context entry.
    pub fn add_context(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Merge several context entries.
    pub fn merge_context(&mut self, entries: &Map<String, Value>) -> &mut Self {
        for (key, value) in entries {
            self.context.insert(key.clone(), value.clone());
        }
        self
    }

    /// Normalize successful values before comparison, publication and return.
    ///
    /// If the cleaner fails the original value is used.
    pub fn clean(&mut self, cleaner: impl Fn(&T) -> anyhow::Result<T> + 'a) -> &mut Self {
        self.cleaner = Some(Box::new(cleaner));
        self
    }

    /// Name the concrete type behind an error.
    ///
    /// Failures compare by class and message, and the class is published as
    /// `exception.class`. The default class is the type name of `E`, which
    /// cannot tell apart errors behind `Box<dyn Error>`, `anyhow::Error` or an
    /// enum. A panicking classifier falls back to the default.
    pub fn classify(&mut self, classifier: impl Fn(&E) -> String + 'a) -> &mut Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    /// Replace `PartialEq` with a custom value equality.
    pub fn compare(&mut self, compare: impl Fn(&T, &T) -> bool + 'a) -> &mut Self {
        self.comparator = Comparator::with(compare);
        self
    }

    /// Decide whether the candidate runs at all.
    pub fn enabled(&mut self, enabled: impl Fn() -> bool + 'a) -> &mut Self {
        self.enabled = Box::new(move |_: &str| enabled());
        self
    }

    /// Decide whether the candidate runs, given the experiment name.
    pub fn enabled_by(&mut self, enabled: impl Fn(&str) -> bool + 'a) -> &mut Self {
        self.enabled = Box::new(enabled);
        self
    }

    /// Set where results are published.
    pub fn publisher(&mut self, publisher: Arc<dyn Publisher>) -> &mut Self {
        self.publisher = publisher;
        self
    }

    /// Pin the run-order coin for reproducible runs.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }
}

impl<T, E> Experiment<'_, T, E>
where
    T: PartialEq + Serialize,
    E: fmt::Display,
{
    /// Run the experiment and return the control's outcome.
    ///
    /// Without a candidate, or when disabled, only the control runs and
    /// nothing is published. Otherwise both run sequentially in random order,
    /// are compared, and the result is published as `match` or `mismatch`.
    ///
    /// # Errors
    ///
    /// Returns the control's own error. A control panic is resumed after
    /// publication. Candidate, cleaner and comparator failures never escape.
    pub fn run(self) -> Result<T, E> {
        let Self {
            name,
            control,
            candidate,
            context,
            cleaner,
            classifier,
            comparator,
            enabled,
            publisher,
            seed,
        } = self;
        let cleaner = cleaner.as_deref();
        let classifier = classifier.as_deref();

        let candidate = match candidate {
            Some(candidate) if enabled(&name) => candidate,
            _ => {
                debug!(experiment = %name, "running control only");
                return settle(Observation::observe(Path::Control, control, cleaner, classifier));
            }
        };

        let (first, control, candidate) = if flip(seed) {
            let candidate = Observation::observe(Path::Candidate, candidate, cleaner, classifier);
            let control = Observation::observe(Path::Control, control, cleaner, classifier);
            (Path::Candidate, control, candidate)
        } else {
            let control = Observation::observe(Path::Control, control, cleaner, classifier);
            let candidate = Observation::observe(Path::Candidate, candidate, cleaner, classifier);
            (Path::Control, control, candidate)
        };

        let event = if comparator.matches(&control, &candidate) {
            Event::Match
        } else {
            Event::Mismatch
        };
        let payload = MismatchRecord::builder(&name, control.to_record(), candidate.to_record())
            .first(first)
            .context(&context)
            .build();
        debug!(experiment = %name, %event, %first, "publishing experiment result");
        publisher.publish(event, &payload);

        settle(control)
    }
}

/// Unbiased coin deciding whether the candidate runs first.
fn flip(seed: Option<u64>) -> bool {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed).gen_bool(0.5),
        None => rand::thread_rng().gen_bool(0.5),
    }
}

fn settle<T, E>(control: Observation<T, E>) -> Result<T, E> {
    match control.into_outcome() {
        Ok(value) => Ok(value),
        Err(Failure::Error { error, .. }) => Err(error),
        Err(Failure::Panic(payload)) => panic::resume_unwind(payload),
    }
}
