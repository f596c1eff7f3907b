//! Observation - one timed, failure-capturing run of a behavior

use std::any::{type_name, Any};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::record::{ExceptionRecord, ObservationRecord, Path};

/// Failure class reported for a behavior that panicked.
pub const PANIC_CLASS: &str = "panic";

/// Value-normalizing hook applied to successful results.
pub type Cleaner<'a, T> = dyn Fn(&T) -> anyhow::Result<T> + 'a;

/// Names the concrete type behind an error value.
///
/// Needed when `E` is type-erased (`Box<dyn Error>`, `anyhow::Error`) or an
/// enum, where the static type name says nothing about the actual failure.
pub type Classifier<'a, E> = dyn Fn(&E) -> String + 'a;

/// A failure captured while running a behavior.
pub enum Failure<E> {
    /// The behavior returned `Err`.
    Error {
        /// The returned error.
        error: E,
        /// Class resolved when the failure was captured.
        class: String,
    },
    /// The behavior panicked; holds the unwind payload.
    Panic(Box<dyn Any + Send + 'static>),
}

impl<E> Failure<E> {
    /// Capture an error, resolving its class.
    ///
    /// Without a classifier, or when the classifier panics, the class is the
    /// type name of `E`.
    #[must_use]
    pub fn error(error: E, classifier: Option<&Classifier<'_, E>>) -> Self {
        let class = classifier
            .and_then(|classify| {
                panic::catch_unwind(AssertUnwindSafe(|| classify(&error)))
                    .map_err(|payload| {
                        warn!(
                            panic = %panic_message(payload.as_ref()),
                            "classifier panicked, using static type name"
                        );
                    })
                    .ok()
            })
            .unwrap_or_else(|| type_name::<E>().to_owned());
        Self::Error { error, class }
    }

    /// Concrete failure class.
    ///
    /// Errors report the class resolved at capture; panics report
    /// [`PANIC_CLASS`].
    #[must_use]
    pub fn class(&self) -> &str {
        match self {
            Self::Error { class, .. } => class,
            Self::Panic(_) => PANIC_CLASS,
        }
    }
}

impl<E: fmt::Display> Failure<E> {
    /// Failure message text.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Error { error, .. } => error.to_string(),
            Self::Panic(payload) => panic_message(payload.as_ref()),
        }
    }

    /// Two failures are equivalent when class and message both agree.
    #[must_use]
    pub fn equivalent(&self, other: &Self) -> bool {
        self.class() == other.class() && self.message() == other.message()
    }

    /// Render the failure for a payload.
    #[must_use]
    pub fn to_record(&self) -> ExceptionRecord {
        ExceptionRecord::new(self.class(), self.message())
    }
}

impl<E: fmt::Display> fmt::Debug for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class(), self.message())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

/// Observation captures one behavior's outcome.
///
/// Exactly one of value or failure is present. Building an observation never
/// propagates the behavior's failure; it becomes data.
pub struct Observation<T, E> {
    path: Path,
    outcome: Result<T, Failure<E>>,
    duration: f64,
}

impl<T, E> Observation<T, E> {
    /// Run `behavior` once and capture its outcome.
    ///
    /// # Arguments
    ///
    /// * `path` - Which side of the experiment is being observed
    /// * `behavior` - The behavior to run
    /// * `cleaner` - Optional normalization of a successful value; if it
    ///   fails or panics the original value is kept
    /// * `classifier` - Optional class resolution for a returned error
    ///
    /// The duration covers the cleaning step and is reported in milliseconds.
    pub fn observe<F>(
        path: Path,
        behavior: F,
        cleaner: Option<&Cleaner<'_, T>>,
        classifier: Option<&Classifier<'_, E>>,
    ) -> Self
    where
        F: FnOnce() -> Result<T, E>,
    {
        let start = Instant::now();
        let outcome = match panic::catch_unwind(AssertUnwindSafe(behavior)) {
            Ok(Ok(value)) => Ok(match cleaner {
                Some(cleaner) => clean(path, cleaner, value),
                None => value,
            }),
            Ok(Err(error)) => Err(Failure::error(error, classifier)),
            Err(payload) => Err(Failure::Panic(payload)),
        };
        let duration = start.elapsed().as_secs_f64() * 1000.0;

        Self {
            path,
            outcome,
            duration,
        }
    }

    /// Get the observed path.
    #[must_use]
    pub const fn path(&self) -> Path {
        self.path
    }

    /// Get the elapsed time in milliseconds.
    #[must_use]
    pub const fn duration(&self) -> f64 {
        self.duration
    }

    /// Get the value, if the behavior succeeded.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    /// Get the captured failure, if the behavior failed.
    #[must_use]
    pub fn failure(&self) -> Option<&Failure<E>> {
        self.outcome.as_ref().err()
    }

    /// Whether the behavior failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    /// Consume the observation, yielding the captured outcome.
    pub fn into_outcome(self) -> Result<T, Failure<E>> {
        self.outcome
    }
}

impl<T: Serialize, E: fmt::Display> Observation<T, E> {
    /// Render the observation for a payload.
    #[must_use]
    pub fn to_record(&self) -> ObservationRecord {
        match &self.outcome {
            Ok(value) => {
                let value = serde_json::to_value(value).unwrap_or_else(|error| {
                    warn!(path = %self.path, %error, "observed value is not serializable");
                    Value::Null
                });
                ObservationRecord::new(self.duration, None, value)
            }
            Err(failure) => {
                ObservationRecord::new(self.duration, Some(failure.to_record()), Value::Null)
            }
        }
    }
}

fn clean<T>(path: Path, cleaner: &Cleaner<'_, T>, value: T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(|| cleaner(&value))) {
        Ok(Ok(cleaned)) => cleaned,
        Ok(Err(error)) => {
            warn!(%path, error = %format!("{error:#}"), "cleaner failed, keeping original value");
            value
        }
        Err(payload) => {
            warn!(
                %path,
                panic = %panic_message(payload.as_ref()),
                "cleaner panicked, keeping original value"
            );
            value
        }
    }
}
