//! Error types for labcoat
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Only the analysis half of the crate reports through [`Error`]. The
//! experiment half never fails on its own: `Experiment::run` hands back the
//! control's own outcome untouched.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Labcoat error types
#[derive(Error, Debug)]
pub enum Error {
    /// More than one registered matcher claimed the same record
    #[error(
        "Ambiguous classification: {} matchers claim this result ({})\nNarrow the matcher definitions so at most one applies.",
        .matchers.len(),
        .matchers.join(", ")
    )]
    AmbiguousMatch {
        /// Names of every matcher that claimed the record, in registration order
        matchers: Vec<String>,
    },

    /// A collaborator the session cannot run without was never supplied
    #[error("Missing required collaborator: {0}\nSupply it on the session builder before use.")]
    MissingCollaborator(&'static str),

    /// The cook step could not turn a raw record into a prepared one
    #[error("Failed to decode mismatch record: {0}")]
    Decode(String),

    /// A matcher or wrapper definition file could not be understood
    #[error("Invalid definition in {}: {message}", .path.display())]
    Definition {
        /// File the definition was read from
        path: PathBuf,
        /// What was wrong with it
        message: String,
    },

    /// Neither the record nor any wrapper provides the requested method
    #[error("No field or wrapper method named `{0}` on this result")]
    UnknownMethod(String),

    /// A wrapper method returned an error
    #[error("Wrapper method `{method}` failed: {message}")]
    WrapperFailed {
        /// Method that was called
        method: String,
        /// Rendered error chain
        message: String,
    },

    /// The mismatch store failed to read or count records
    #[error("Mismatch store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
