//! Bulk-loading matcher and wrapper definitions from a directory
//!
//! Layout: `<base>/<experiment>/*.json`, one definition per file, read in
//! file-name order. Two shapes are understood:
//!
//! ```json
//! {"matcher": "candidate-timeout",
//!  "when": [{"pointer": "/candidate/exception/class", "equals": "Timeout"}],
//!  "readable": "candidate timed out"}
//! ```
//!
//! ```json
//! {"wrapper": "users", "methods": {"user_login": "/user/login"}}
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::finding::Wrapper;
use super::matcher::{Condition, PatternMatcher};
use super::registry::Registry;
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Definition {
    Matcher {
        matcher: String,
        when: Vec<Condition>,
        #[serde(default)]
        readable: Option<String>,
    },
    Wrapper {
        wrapper: String,
        methods: BTreeMap<String, String>,
    },
}

/// Load every definition under `base/experiment` into `registry`.
///
/// Returns how many definitions were newly registered. A missing directory
/// loads nothing.
///
/// # Errors
///
/// Returns error if a file cannot be read or holds an invalid definition.
/// Definitions loaded before the failing file stay registered.
pub fn load_definitions(registry: &mut Registry, base: &Path, experiment: &str) -> Result<usize> {
    let dir = base.join(experiment);
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "no definitions directory");
        return Ok(0);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    files.retain(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"));
    files.sort();

    let mut loaded = 0;
    for file in &files {
        if load_file(registry, file)? {
            loaded += 1;
        }
    }

    info!(experiment, loaded, dir = %dir.display(), "loaded definitions");
    Ok(loaded)
}

fn load_file(registry: &mut Registry, file: &Path) -> Result<bool> {
    let invalid = |message: String| Error::Definition {
        path: file.to_path_buf(),
        message,
    };

    let contents = fs::read_to_string(file)?;
    let definition: Definition =
        serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;

    let added = match definition {
        Definition::Matcher {
            matcher,
            when,
            readable,
        } => {
            if when.is_empty() {
                return Err(invalid(format!("matcher `{matcher}` has no conditions")));
            }
            if let Some(empty) = when.iter().find(|condition| condition.is_empty()) {
                return Err(invalid(format!(
                    "matcher `{matcher}` has a condition on `{}` with no test",
                    empty.pointer()
                )));
            }
            let mut pattern = PatternMatcher::new(matcher, when);
            if let Some(readable) = readable {
                pattern = pattern.with_readable(readable);
            }
            registry.add(pattern)
        }
        Definition::Wrapper { wrapper, methods } => {
            let wrapper = methods
                .into_iter()
                .fold(Wrapper::new(wrapper), |wrapper, (method, pointer)| {
                    wrapper.method(method, move |finding| {
                        Ok(finding.record().pointer(&pointer).cloned().unwrap_or(Value::Null))
                    })
                });
            registry.add(wrapper)
        }
    };

    debug!(file = %file.display(), added, "read definition");
    Ok(added)
}
