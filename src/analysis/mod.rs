//! Offline triage of recorded mismatches
//!
//! ## Architecture
//!
//! ```text
//! MismatchStore ──read──> cook ──> Registry::wrap ──> Finding
//!                                                       │
//!                        Tally <── Session::analyze <── Registry::identify (Matcher)
//! ```
//!
//! Matchers name known causes of difference; wrappers add lookups to
//! records. Both are registered per session, directly or from definition
//! files (see [`load_definitions`]).

mod finding;
mod loader;
mod matcher;
mod registry;
mod render;
mod session;
mod store;
mod tally;

pub use finding::{Finding, Wrapper, WrapperMethod};
pub use loader::load_definitions;
pub use matcher::{Condition, Matcher, PatternMatcher, PredicateMatcher};
pub use registry::{Extension, Registry};
pub use render::{readable, summary, PREFERRED_FIELDS};
pub use session::{Session, SessionBuilder};
pub use store::{MemoryStore, MismatchStore};
pub use tally::Tally;
