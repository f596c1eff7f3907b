//! Human-readable rendering of findings

use std::fmt::Write as _;

use serde_json::Value;

use super::finding::Finding;
use super::matcher::Matcher;
use crate::experiment::{Path, RESERVED_KEYS};

/// Context fields surfaced ahead of the rest, in this order.
pub const PREFERRED_FIELDS: [&str; 7] =
    ["id", "name", "title", "owner", "description", "login", "username"];

/// Render `finding` through `matcher` when it supplies a rendering, else the
/// default layout.
#[must_use]
pub fn summary(finding: &Finding, matcher: Option<&dyn Matcher>) -> String {
    matcher
        .and_then(|matcher| matcher.readable(finding))
        .unwrap_or_else(|| readable(finding))
}

/// Default structured rendering of a finding.
///
/// ```text
/// Experiment [widgets]            first:    control @ 2024-05-01T12:00:00+00:00
/// Duration:  control (  1.00) | candidate (  2.00)
///
/// Control value:   [1]
/// Candidate value: [2]
///
/// login: hubot
/// ```
///
/// Records that are not payload objects render as their bare value.
#[must_use]
pub fn readable(finding: &Finding) -> String {
    let Some(fields) = finding.record().as_object() else {
        return text(finding.record());
    };

    let mut out = String::new();
    let experiment = format!("[{}]", finding.experiment().unwrap_or("unknown"));
    let first = finding.first().as_ref().map_or("?", Path::as_str);
    let timestamp = finding
        .timestamp()
        .map_or_else(|| "?".to_owned(), |ts| ts.to_rfc3339());
    let _ = writeln!(out, "Experiment {experiment:<20} first: {first:>10} @ {timestamp}");
    let _ = writeln!(
        out,
        "Duration:  control ({:6.2}) | candidate ({:6.2})",
        duration(finding.control()),
        duration(finding.candidate())
    );
    out.push('\n');

    outcome(&mut out, "Control", finding.control());
    outcome(&mut out, "Candidate", finding.candidate());
    out.push('\n');

    let mut rest: Vec<&String> = fields
        .keys()
        .filter(|key| !RESERVED_KEYS.contains(&key.as_str()))
        .collect();
    rest.sort_by(|a, b| (rank(a), a).cmp(&(rank(b), b)));
    for key in rest {
        let _ = writeln!(out, "{key}: {}", text(&fields[key.as_str()]));
    }

    out
}

fn rank(key: &str) -> usize {
    PREFERRED_FIELDS
        .iter()
        .position(|preferred| *preferred == key)
        .unwrap_or(PREFERRED_FIELDS.len())
}

fn duration(observation: Option<&Value>) -> f64 {
    observation
        .and_then(|o| o.get("duration"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

fn outcome(out: &mut String, label: &str, observation: Option<&Value>) {
    let exception = observation
        .and_then(|o| o.get("exception"))
        .filter(|e| !e.is_null());
    if let Some(exception) = exception {
        let class = exception.get("class").map_or_else(String::new, text);
        let message = exception.get("message").map_or_else(String::new, text);
        let _ = writeln!(out, "{label} raised exception:\n\t{class}: {message}");
    } else {
        let value = observation
            .and_then(|o| o.get("value"))
            .unwrap_or(&Value::Null);
        let label = format!("{label} value:");
        let _ = writeln!(out, "{label:<16} [{}]", text(value));
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
