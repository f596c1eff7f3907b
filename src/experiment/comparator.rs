//! Comparator policy - decides whether two observations are the same

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use super::observation::Observation;

/// Caller-supplied value equality.
pub type CompareFn<'a, T> = dyn Fn(&T, &T) -> bool + 'a;

/// Comparator policy for one experiment.
///
/// Values are compared with the custom function when one is set, otherwise
/// with `PartialEq`. Failures are compared by class and message only; the
/// custom function is never consulted for them.
pub struct Comparator<'a, T> {
    compare: Option<Box<CompareFn<'a, T>>>,
}

impl<T> Default for Comparator<'_, T> {
    fn default() -> Self {
        Self { compare: None }
    }
}

impl<'a, T> Comparator<'a, T> {
    /// Create a comparator that uses `PartialEq`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a comparator with a custom value equality.
    #[must_use]
    pub fn with(compare: impl Fn(&T, &T) -> bool + 'a) -> Self {
        Self {
            compare: Some(Box::new(compare)),
        }
    }

    /// Whether a custom value equality is set.
    #[must_use]
    pub const fn is_custom(&self) -> bool {
        self.compare.is_some()
    }
}

impl<T: PartialEq> Comparator<'_, T> {
    /// Decide whether two observations match.
    ///
    /// Both succeeded: values must be equal. Both failed: failures must be
    /// equivalent. Anything else is a mismatch. A panicking custom comparator
    /// counts as not equal.
    #[must_use]
    pub fn matches<E: fmt::Display>(
        &self,
        control: &Observation<T, E>,
        candidate: &Observation<T, E>,
    ) -> bool {
        match (control.value(), candidate.value()) {
            (Some(a), Some(b)) => self.values_equal(a, b),
            (None, None) => match (control.failure(), candidate.failure()) {
                (Some(a), Some(b)) => a.equivalent(b),
                _ => false,
            },
            _ => false,
        }
    }

    fn values_equal(&self, a: &T, b: &T) -> bool {
        let Some(compare) = &self.compare else {
            return a == b;
        };
        panic::catch_unwind(AssertUnwindSafe(|| compare(a, b))).unwrap_or_else(|_| {
            warn!("comparator panicked, treating values as unequal");
            false
        })
    }
}
