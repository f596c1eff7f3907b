//! # Labcoat: Production Experiments and Mismatch Triage
//!
//! **Version**: 0.1.0
//!
//! Labcoat runs a known-good code path (the **control**) next to a
//! replacement (the **candidate**) in production, compares what they did,
//! and publishes disagreements without changing what the caller sees. A
//! companion analysis session walks the recorded disagreements, groups them
//! by known causes, and stops at the first one nobody can explain.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: The control's outcome is always what the caller gets; the
//!   candidate can fail, panic or disagree without reaching them
//! - **Genchi Genbutsu**: Compare real production behavior, timed per path,
//!   in randomized order
//! - **Poka-Yoke**: A record claimed by two matchers is an error, never a
//!   silent guess
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use labcoat::analysis::{MemoryStore, PredicateMatcher, Session};
//! use labcoat::experiment::{lab, Lab, MismatchRecord};
//!
//! let store = Arc::new(MemoryStore::<MismatchRecord>::new());
//! lab::install(Lab::builder().publisher(store.clone()).build());
//!
//! let total = labcoat::science("sum", || Ok::<_, String>(2 + 2), |e| {
//!     e.candidate(|| Ok(2 * 3));
//! });
//! assert_eq!(total, Ok(4));
//! lab::reset();
//!
//! let mut session = Session::builder("sum").store(store).output(std::io::sink()).build()?;
//! session.add(PredicateMatcher::new("off-by-two", |f| {
//!     f.candidate().and_then(|c| c.get("value")) == Some(&serde_json::json!(6))
//! }));
//! assert_eq!(session.analyze()?, None);
//! assert_eq!(session.tally().get("off-by-two"), 1);
//! # Ok::<(), labcoat::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod analysis;
pub mod error;
pub mod experiment;

pub use error::{Error, Result};

use std::fmt::Display;

use serde::Serialize;

use experiment::{lab, Experiment};

/// Run an experiment built from the installed lab.
///
/// `configure` registers the candidate and anything else the experiment
/// needs. Returns the control's outcome.
///
/// # Errors
///
/// Returns the control's own error.
pub fn science<'a, T, E, C, F>(
    name: impl Into<String>,
    control: C,
    configure: F,
) -> std::result::Result<T, E>
where
    T: PartialEq + Serialize,
    E: Display,
    C: FnOnce() -> std::result::Result<T, E> + 'a,
    F: FnOnce(&mut Experiment<'a, T, E>),
{
    let mut experiment = lab::current().experiment(name, control);
    configure(&mut experiment);
    experiment.run()
}
