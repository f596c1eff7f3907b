//! Experiment execution engine
//!
//! Runs a trusted **control** behavior and a **candidate** replacement side
//! by side, compares what they did, and publishes the comparison without
//! changing what the caller sees.
//!
//! ## Flow
//!
//! ```text
//! Experiment::run ──> Observation (control) ──┐
//!        │                                    ├──> Comparator ──> Publisher
//!        └──────────> Observation (candidate) ┘       (match | mismatch, MismatchRecord)
//! ```
//!
//! The order of the two observations is chosen by a fair coin on every run
//! so that cache warming does not favour one side's timings.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use labcoat::analysis::MemoryStore;
//! use labcoat::experiment::{Experiment, MismatchRecord};
//!
//! let store = Arc::new(MemoryStore::<MismatchRecord>::new());
//!
//! let mut experiment = Experiment::new("slug-format", || Ok::<_, String>("Hello World".to_lowercase()));
//! experiment
//!     .candidate(|| Ok("hello-world".to_owned()))
//!     .publisher(store.clone());
//!
//! // The control's value comes back; the disagreement lands in the store.
//! assert_eq!(experiment.run(), Ok("hello world".to_owned()));
//! assert_eq!(store.len(), 1);
//! ```

mod comparator;
mod engine;
pub mod lab;
mod observation;
mod publish;
mod record;

pub use comparator::{CompareFn, Comparator};
pub use engine::Experiment;
pub use lab::{Lab, LabBuilder};
pub use observation::{Classifier, Cleaner, Failure, Observation, PANIC_CLASS};
pub use publish::{NoopPublisher, Publisher, TracingPublisher};
pub use record::{
    Event, ExceptionRecord, MismatchRecord, MismatchRecordBuilder, ObservationRecord, Path,
    RESERVED_KEYS,
};
