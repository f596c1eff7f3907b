//! Analysis session - a cursor over recorded mismatches
//!
//! The session pulls raw records from a [`MismatchStore`], cooks each one
//! into JSON, wraps it into a [`Finding`], and classifies it against the
//! registered matchers. [`Session::analyze`] walks past every record a
//! matcher explains and stops at the first one nobody does.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::finding::{Finding, Wrapper};
use super::loader::load_definitions;
use super::matcher::Matcher;
use super::registry::{Extension, Registry};
use super::render;
use super::store::MismatchStore;
use super::tally::Tally;
use crate::{Error, Result};

type Cook<R> = Box<dyn Fn(&R) -> anyhow::Result<Value>>;

/// Stateful triage of one experiment's mismatches.
///
/// Single-threaded: every operation takes `&mut self`.
///
/// # Example
///
/// ```rust
/// use labcoat::analysis::{MemoryStore, PredicateMatcher, Session};
///
/// let store = MemoryStore::from(vec!["unknown-1", "known-2", "known-3"]);
/// let mut session = Session::builder("widgets").store(store).output(std::io::sink()).build()?;
/// session.add(PredicateMatcher::new("known", |f| {
///     f.record().as_str().is_some_and(|s| s.starts_with("known-"))
/// }));
///
/// assert_eq!(session.analyze()?, Some(0));
/// assert_eq!(session.tally().get("known"), 2);
/// assert_eq!(session.current().unwrap().record(), "unknown-1");
/// # Ok::<(), labcoat::Error>(())
/// ```
pub struct Session<S: MismatchStore> {
    experiment: String,
    store: S,
    cook: Cook<S::Raw>,
    registry: Registry,
    current: Option<Finding>,
    raw: Option<S::Raw>,
    // Outer `None`: not classified since the last fetch.
    identified: Option<Option<Arc<dyn Matcher>>>,
    tally: Tally,
    out: Box<dyn Write>,
}

impl<S: MismatchStore> Session<S> {
    /// Start configuring a session for `experiment`.
    #[must_use]
    pub fn builder(experiment: impl Into<String>) -> SessionBuilder<S> {
        SessionBuilder {
            experiment: experiment.into(),
            store: None,
            cook: None,
            path: None,
            output: None,
        }
    }

    /// Get the experiment name.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Get the store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Number of records still pending in the store.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    pub fn count(&self) -> Result<usize> {
        self.store.count()
    }

    /// Whether any record is pending.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    pub fn more(&self) -> Result<bool> {
        self.store.more()
    }

    /// Get the current prepared record.
    #[must_use]
    pub const fn current(&self) -> Option<&Finding> {
        self.current.as_ref()
    }

    /// Get the raw form of the current record.
    #[must_use]
    pub const fn raw(&self) -> Option<&S::Raw> {
        self.raw.as_ref()
    }

    /// Get the tally of the last `analyze` run.
    #[must_use]
    pub const fn tally(&self) -> &Tally {
        &self.tally
    }

    /// Get the registry.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get the registered matchers.
    #[must_use]
    pub fn matchers(&self) -> &[Arc<dyn Matcher>] {
        self.registry.matchers()
    }

    /// Get the registered wrappers.
    #[must_use]
    pub fn wrappers(&self) -> &[Arc<Wrapper>] {
        self.registry.wrappers()
    }

    /// Register a matcher or wrapper.
    ///
    /// Returns `false` if the name was already taken. Wrappers apply from
    /// the next fetch on.
    pub fn add(&mut self, extension: impl Into<Extension>) -> bool {
        self.registry.add(extension)
    }

    /// Load definitions from `base/<experiment>/`.
    ///
    /// # Errors
    ///
    /// Returns error if a definition file cannot be read or understood.
    pub fn load(&mut self, base: &Path) -> Result<usize> {
        load_definitions(&mut self.registry, base, &self.experiment)
    }

    /// Read, cook and wrap the next record.
    ///
    /// Returns `None` and clears the current record when the store is empty.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails, or [`Error::Decode`] if the record
    /// cannot be cooked. A record that fails to cook stays available through
    /// [`Session::raw`].
    pub fn fetch(&mut self) -> Result<Option<&Finding>> {
        self.identified = None;
        self.current = None;
        self.raw = None;
        self.raw = self.store.read()?;

        let Some(raw) = &self.raw else {
            debug!(experiment = %self.experiment, "store exhausted");
            return Ok(None);
        };
        let cooked = (self.cook)(raw).map_err(|error| Error::Decode(format!("{error:#}")))?;
        debug!(experiment = %self.experiment, "fetched record");

        self.current = Some(self.registry.wrap(cooked));
        Ok(self.current.as_ref())
    }

    /// Fetch until `predicate` holds for the current record.
    ///
    /// Returns the pending count at that point, or `None` once the store is
    /// exhausted or yields nothing while reporting pending records.
    ///
    /// # Errors
    ///
    /// Returns error if a fetch fails.
    pub fn skip(&mut self, mut predicate: impl FnMut(&Finding) -> bool) -> Result<Option<usize>> {
        while self.store.more()? {
            match self.fetch()? {
                Some(finding) if predicate(finding) => return self.store.count().map(Some),
                Some(_) => {}
                None => {
                    warn!(
                        experiment = %self.experiment,
                        "store reported pending records but returned none"
                    );
                    break;
                }
            }
        }
        self.current = None;
        self.raw = None;
        self.identified = None;
        Ok(None)
    }

    /// The one matcher that claims the current record, memoized per fetch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmbiguousMatch`] if more than one matcher claims it.
    pub fn identify(&mut self) -> Result<Option<Arc<dyn Matcher>>> {
        if let Some(known) = &self.identified {
            return Ok(known.clone());
        }
        let Some(current) = &self.current else {
            return Ok(None);
        };
        let matcher = self.registry.identify(current)?;
        self.identified = Some(matcher.clone());
        Ok(matcher)
    }

    /// Whether no matcher claims the current record; `None` without one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmbiguousMatch`] if more than one matcher claims it.
    pub fn is_unknown(&mut self) -> Result<Option<bool>> {
        if self.current.is_none() {
            return Ok(None);
        }
        Ok(Some(self.identify()?.is_none()))
    }

    /// Readable rendering of the current record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmbiguousMatch`] if more than one matcher claims it.
    pub fn summary(&mut self) -> Result<Option<String>> {
        if self.current.is_none() {
            return Ok(None);
        }
        let matcher = self.identify()?;
        Ok(self
            .current
            .as_ref()
            .map(|finding| render::summary(finding, matcher.as_deref())))
    }

    /// Write the tally report.
    ///
    /// # Errors
    ///
    /// Returns error if the output cannot be written.
    pub fn summarize(&mut self) -> Result<()> {
        writeln!(self.out, "{}", self.tally)?;
        Ok(())
    }

    /// Walk past every identifiable record, stopping at the first unknown.
    ///
    /// Each explained record prints its short summary and is counted in a
    /// fresh tally. Returns the number of records still pending when an
    /// unknown one is reached (it becomes the current record), or `None`
    /// when the store runs dry. A store that reports pending records but
    /// yields none is treated as dry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmbiguousMatch`] after writing the tally report, or
    /// any store, cook or output error.
    pub fn analyze(&mut self) -> Result<Option<usize>> {
        self.tally = Tally::new();

        loop {
            if !self.store.more()? {
                self.fetch()?;
                return self.exhausted();
            }

            if self.fetch()?.is_none() {
                warn!(
                    experiment = %self.experiment,
                    "store reported pending records but returned none"
                );
                return self.exhausted();
            }

            let matcher = match self.identify() {
                Ok(matcher) => matcher,
                Err(error) => {
                    self.summarize()?;
                    return Err(error);
                }
            };

            let Some(matcher) = matcher else {
                self.summarize()?;
                let detail = self.summary()?.unwrap_or_default();
                writeln!(self.out, "\n{detail}")?;
                let pending = self.store.count()?;
                info!(
                    experiment = %self.experiment,
                    identified = self.tally.total(),
                    pending,
                    "stopped at unidentified result"
                );
                return Ok(Some(pending));
            };

            if let Some(finding) = &self.current {
                let line = matcher
                    .readable(finding)
                    .unwrap_or_else(|| matcher.name().to_owned());
                writeln!(self.out, "{line}")?;
            }
            self.tally.count(matcher.name());
        }
    }

    fn exhausted(&mut self) -> Result<Option<usize>> {
        self.summarize()?;
        writeln!(self.out, "\nNo unidentifiable results.")?;
        info!(
            experiment = %self.experiment,
            identified = self.tally.total(),
            "no unidentifiable results"
        );
        Ok(None)
    }
}

impl<S: MismatchStore> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("experiment", &self.experiment)
            .field("registry", &self.registry)
            .field("current", &self.current)
            .field("tally", &self.tally)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder<S: MismatchStore> {
    experiment: String,
    store: Option<S>,
    cook: Option<Cook<S::Raw>>,
    path: Option<PathBuf>,
    output: Option<Box<dyn Write>>,
}

impl<S: MismatchStore> SessionBuilder<S> {
    /// Set the store records are read from. Required.
    #[must_use]
    pub fn store(mut self, store: S) -> Self {
        self.store = Some(store);
        self
    }

    /// Set how a raw record becomes JSON.
    ///
    /// Defaults to serializing the raw record.
    #[must_use]
    pub fn cook(mut self, cook: impl Fn(&S::Raw) -> anyhow::Result<Value> + 'static) -> Self {
        self.cook = Some(Box::new(cook));
        self
    }

    /// Set the base directory definitions are loaded from at build time.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set where reports are written. Defaults to stdout.
    #[must_use]
    pub fn output(mut self, output: impl Write + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }
}

impl<S> SessionBuilder<S>
where
    S: MismatchStore,
    S::Raw: Serialize + 'static,
{
    /// Build the session, loading definitions if a path was set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCollaborator`] without a store, or any
    /// definition loading error.
    pub fn build(self) -> Result<Session<S>> {
        let store = self.store.ok_or(Error::MissingCollaborator("store"))?;
        let cook = self.cook.unwrap_or_else(|| Box::new(cook_default::<S::Raw>));

        let mut session = Session {
            experiment: self.experiment,
            store,
            cook,
            registry: Registry::new(),
            current: None,
            raw: None,
            identified: None,
            tally: Tally::new(),
            out: self.output.unwrap_or_else(|| Box::new(io::stdout())),
        };
        if let Some(path) = self.path {
            session.load(&path)?;
        }
        debug!(experiment = %session.experiment, "session ready");
        Ok(session)
    }
}

fn cook_default<R: Serialize>(raw: &R) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{MemoryStore, PredicateMatcher};
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn prefix(name: &str, prefix: &'static str) -> PredicateMatcher {
        PredicateMatcher::new(name, move |f| {
            f.record().as_str().is_some_and(|s| s.starts_with(prefix))
        })
    }

    fn session(records: Vec<&'static str>) -> (Session<MemoryStore<&'static str>>, Captured) {
        let out = Captured::default();
        let session = Session::builder("widgets")
            .store(MemoryStore::from(records))
            .output(out.clone())
            .build()
            .unwrap();
        (session, out)
    }

    #[test]
    fn test_missing_store() {
        let error = Session::<MemoryStore<String>>::builder("widgets").build().unwrap_err();
        assert!(matches!(error, Error::MissingCollaborator("store")));
    }

    #[test]
    fn test_fetch_cooks_and_clears() {
        let (mut session, _) = session(vec!["a"]);
        assert_eq!(session.fetch().unwrap().unwrap().record(), &json!("a"));
        assert_eq!(session.raw(), Some(&"a"));

        assert!(session.fetch().unwrap().is_none());
        assert!(session.current().is_none());
        assert!(session.raw().is_none());
    }

    #[test]
    fn test_cook_failure_keeps_raw() {
        let mut session = Session::builder("widgets")
            .store(MemoryStore::from(vec!["bad"]))
            .cook(|_: &&str| anyhow::bail!("unparseable"))
            .output(io::sink())
            .build()
            .unwrap();

        let error = session.fetch().unwrap_err();
        assert!(matches!(error, Error::Decode(ref m) if m.contains("unparseable")));
        assert_eq!(session.raw(), Some(&"bad"));
        assert!(session.current().is_none());
    }

    /// Store that serves `records` once, then fails or keeps claiming more.
    struct Faulty {
        records: Mutex<Vec<&'static str>>,
        fail_when_empty: bool,
    }

    impl Faulty {
        fn new(records: Vec<&'static str>, fail_when_empty: bool) -> Self {
            Self {
                records: Mutex::new(records),
                fail_when_empty,
            }
        }
    }

    impl MismatchStore for Faulty {
        type Raw = &'static str;

        fn read(&self) -> Result<Option<Self::Raw>> {
            match self.records.lock().pop() {
                Some(record) => Ok(Some(record)),
                None if self.fail_when_empty => Err(Error::Store("connection lost".into())),
                None => Ok(None),
            }
        }

        fn count(&self) -> Result<usize> {
            Ok(self.records.lock().len().max(1))
        }
    }

    fn faulty(records: Vec<&'static str>, fail_when_empty: bool) -> (Session<Faulty>, Captured) {
        let out = Captured::default();
        let session = Session::builder("widgets")
            .store(Faulty::new(records, fail_when_empty))
            .output(out.clone())
            .build()
            .unwrap();
        (session, out)
    }

    #[test]
    fn test_failed_read_clears_raw() {
        let (mut session, _) = faulty(vec!["a"], true);
        session.fetch().unwrap();
        assert_eq!(session.raw(), Some(&"a"));

        let error = session.fetch().unwrap_err();
        assert!(matches!(error, Error::Store(_)));
        assert!(session.raw().is_none());
        assert!(session.current().is_none());
    }

    #[test]
    fn test_analyze_stops_when_store_yields_nothing() {
        let (mut session, out) = faulty(vec!["known-1"], false);
        session.add(prefix("known", "known-"));

        assert_eq!(session.analyze().unwrap(), None);
        assert_eq!(session.tally().get("known"), 1);
        assert!(out.text().ends_with("No unidentifiable results.\n"));
    }

    #[test]
    fn test_skip_stops_when_store_yields_nothing() {
        let (mut session, _) = faulty(vec!["a"], false);
        assert_eq!(session.skip(|f| f.record() == "z").unwrap(), None);
        assert!(session.current().is_none());
    }

    #[test]
    fn test_skip_returns_pending_count() {
        let (mut session, _) = session(vec!["a", "b", "c"]);
        assert_eq!(session.skip(|f| f.record() == "a").unwrap(), Some(0));
        assert_eq!(session.current().unwrap().record(), "a");
    }

    #[test]
    fn test_skip_exhausted_clears_state() {
        let (mut session, _) = session(vec!["a", "b"]);
        assert_eq!(session.skip(|f| f.record() == "z").unwrap(), None);
        assert!(session.current().is_none());
        assert!(session.raw().is_none());
    }

    #[test]
    fn test_identify_is_memoized_per_fetch() {
        let (mut session, _) = session(vec!["known-1"]);
        assert_eq!(session.is_unknown().unwrap(), None);

        session.fetch().unwrap();
        assert_eq!(session.is_unknown().unwrap(), Some(true));

        // Matchers added after classification do not change the memo.
        session.add(prefix("known", "known-"));
        assert_eq!(session.is_unknown().unwrap(), Some(true));
    }

    #[test]
    fn test_analyze_stops_at_unknown() {
        let (mut session, out) = session(vec!["known-1", "unknown-1", "known-2", "known-3"]);
        session.add(prefix("known", "known-"));

        assert_eq!(session.analyze().unwrap(), Some(1));
        assert_eq!(session.current().unwrap().record(), "unknown-1");
        assert_eq!(session.tally().get("known"), 2);

        let text = out.text();
        assert!(text.contains("Summary of identified results:"));
        assert!(text.ends_with("unknown-1\n"));

        // Resumes with a fresh tally.
        assert_eq!(session.analyze().unwrap(), None);
        assert_eq!(session.tally().get("known"), 1);
        assert!(session.current().is_none());
        assert!(out.text().ends_with("No unidentifiable results.\n"));
    }

    #[test]
    fn test_analyze_empty_store() {
        let (mut session, out) = session(Vec::new());
        assert_eq!(session.analyze().unwrap(), None);
        assert_eq!(out.text(), "No results identified.\n\nNo unidentifiable results.\n");
    }

    #[test]
    fn test_analyze_ambiguous_reports_then_fails() {
        let (mut session, out) = session(vec!["known-1", "known-2"]);
        session.add(prefix("known", "known-"));
        session.add(prefix("one", "known-1"));

        let error = session.analyze().unwrap_err();
        assert!(matches!(error, Error::AmbiguousMatch { ref matchers } if matchers.len() == 2));
        assert_eq!(session.tally().get("known"), 1);
        assert!(out.text().contains("TOTAL"));
    }

    #[test]
    fn test_summary_uses_matcher_rendering() {
        let (mut session, _) = session(vec!["known-1"]);
        session.add(prefix("known", "known-").with_readable(|_| "a known one".into()));
        assert_eq!(session.summary().unwrap(), None);

        session.fetch().unwrap();
        assert_eq!(session.summary().unwrap().as_deref(), Some("a known one"));
    }
}
