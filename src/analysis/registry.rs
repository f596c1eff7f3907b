//! Registry of matchers and wrappers for one analysis session

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::finding::{Finding, Wrapper};
use super::matcher::{Matcher, PatternMatcher, PredicateMatcher};
use crate::{Error, Result};

/// Something that can be registered with a session.
#[derive(Clone)]
pub enum Extension {
    /// Classifier: decides whether a record is a known difference.
    Matcher(Arc<dyn Matcher>),
    /// Extender: adds query methods to prepared records.
    Wrapper(Arc<Wrapper>),
}

impl Extension {
    /// Wrap any matcher implementation.
    pub fn matcher(matcher: impl Matcher + 'static) -> Self {
        Self::Matcher(Arc::new(matcher))
    }

    /// Get the extension name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Matcher(matcher) => matcher.name(),
            Self::Wrapper(wrapper) => wrapper.name(),
        }
    }

    /// Role name, for logs.
    #[must_use]
    pub const fn role(&self) -> &'static str {
        match self {
            Self::Matcher(_) => "matcher",
            Self::Wrapper(_) => "wrapper",
        }
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.role(), self.name())
    }
}

impl From<Wrapper> for Extension {
    fn from(wrapper: Wrapper) -> Self {
        Self::Wrapper(Arc::new(wrapper))
    }
}

impl From<Arc<Wrapper>> for Extension {
    fn from(wrapper: Arc<Wrapper>) -> Self {
        Self::Wrapper(wrapper)
    }
}

impl From<PredicateMatcher> for Extension {
    fn from(matcher: PredicateMatcher) -> Self {
        Self::matcher(matcher)
    }
}

impl From<PatternMatcher> for Extension {
    fn from(matcher: PatternMatcher) -> Self {
        Self::matcher(matcher)
    }
}

impl From<Arc<dyn Matcher>> for Extension {
    fn from(matcher: Arc<dyn Matcher>) -> Self {
        Self::Matcher(matcher)
    }
}

/// Known matchers and wrappers, in registration order.
///
/// Names are unique per role; registering a second extension under a name
/// already taken is ignored.
#[derive(Clone, Default)]
pub struct Registry {
    matchers: Vec<Arc<dyn Matcher>>,
    wrappers: Vec<Arc<Wrapper>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a matcher or wrapper.
    ///
    /// Returns `false` if an extension with the same role and name was
    /// already registered.
    pub fn add(&mut self, extension: impl Into<Extension>) -> bool {
        let extension = extension.into();
        let taken = match &extension {
            Extension::Matcher(m) => self.matchers.iter().any(|k| k.name() == m.name()),
            Extension::Wrapper(w) => self.wrappers.iter().any(|k| k.name() == w.name()),
        };
        if taken {
            debug!(role = extension.role(), name = extension.name(), "already registered");
            return false;
        }
        debug!(role = extension.role(), name = extension.name(), "registered");
        match extension {
            Extension::Matcher(matcher) => self.matchers.push(matcher),
            Extension::Wrapper(wrapper) => self.wrappers.push(wrapper),
        }
        true
    }

    /// Get the registered matchers.
    #[must_use]
    pub fn matchers(&self) -> &[Arc<dyn Matcher>] {
        &self.matchers
    }

    /// Get the registered wrappers.
    #[must_use]
    pub fn wrappers(&self) -> &[Arc<Wrapper>] {
        &self.wrappers
    }

    /// Total number of registered extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.matchers.len() + self.wrappers.len()
    }

    /// Check if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty() && self.wrappers.is_empty()
    }

    /// Attach the registered wrappers to a prepared record.
    #[must_use]
    pub fn wrap(&self, record: Value) -> Finding {
        Finding::with_wrappers(record, Arc::from(self.wrappers.clone()))
    }

    /// Find the one matcher that claims `finding`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmbiguousMatch`] if more than one matcher claims it.
    pub fn identify(&self, finding: &Finding) -> Result<Option<Arc<dyn Matcher>>> {
        let claimed: Vec<&Arc<dyn Matcher>> = self
            .matchers
            .iter()
            .filter(|matcher| matcher.is_match(finding))
            .collect();

        match claimed.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(Arc::clone(only))),
            many => Err(Error::AmbiguousMatch {
                matchers: many.iter().map(|m| m.name().to_owned()).collect(),
            }),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("matchers", &self.matchers.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("wrappers", &self.wrappers.iter().map(|w| w.name()).collect::<Vec<_>>())
            .finish()
    }
}
