//! Dark Launch Example
//!
//! Runs a rewritten slug formatter beside the old one, records every
//! disagreement in memory, then triages the recorded mismatches.
//!
//! Run with: cargo run --example dark_launch
//! Verbose:  RUST_LOG=labcoat=debug cargo run --example dark_launch

use std::sync::Arc;

use labcoat::analysis::{Condition, MemoryStore, PatternMatcher, PredicateMatcher, Session, Wrapper};
use labcoat::experiment::{lab, Lab, MismatchRecord};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Trusted implementation.
fn old_slug(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Replacement under test: drops punctuation, chokes on empty titles.
fn new_slug(title: &str) -> Result<String, String> {
    if title.trim().is_empty() {
        return Err("empty title".to_owned());
    }
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    Ok(old_slug(&kept))
}

fn main() -> labcoat::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Labcoat Dark Launch ===\n");

    // -------------------------------------------------------------------------
    // 1. Install a lab publishing mismatches into memory
    // -------------------------------------------------------------------------
    let store = Arc::new(MemoryStore::<MismatchRecord>::new());
    lab::install(
        Lab::builder()
            .publisher(store.clone())
            .context("host", "web-1")
            .build(),
    );

    // -------------------------------------------------------------------------
    // 2. Serve traffic through the experiment
    // -------------------------------------------------------------------------
    let titles = ["Hello World", "Rust 2021!", "   ", "Ship it", "What's new?"];
    println!("1. Serving {} requests...", titles.len());
    for (id, title) in titles.iter().enumerate() {
        let slug = labcoat::science("slug", || Ok::<_, String>(old_slug(title)), |e| {
            e.candidate(|| new_slug(title))
                .add_context("id", id)
                .add_context("title", *title);
        });
        println!("   {title:?} -> {slug:?}");
    }
    lab::reset();
    println!("   Recorded {} mismatches\n", store.len());

    // -------------------------------------------------------------------------
    // 3. Triage
    // -------------------------------------------------------------------------
    println!("2. Triage:\n");
    let mut session = Session::builder("slug").store(store).build()?;
    session.add(
        PatternMatcher::new(
            "empty-title",
            vec![Condition::at("/candidate/exception/message").equals("empty title")],
        )
        .with_readable("candidate rejects blank titles"),
    );
    session.add(
        PredicateMatcher::new("punctuation", |finding| {
            finding
                .call("title")
                .ok()
                .and_then(|title| title.as_str().map(|t| t.contains('!')))
                .unwrap_or(false)
        })
        .with_readable(|finding| {
            let id = finding.call("id").unwrap_or_default();
            format!("punctuation dropped in request {id}")
        }),
    );
    session.add(Wrapper::new("slugs").method("slug_pair", |finding| {
        Ok(json!([
            finding.control().and_then(|c| c.get("value")),
            finding.candidate().and_then(|c| c.get("value")),
        ]))
    }));

    if let Some(pending) = session.analyze()? {
        let pair = session
            .current()
            .map(|finding| finding.call("slug_pair"))
            .transpose()?;
        println!("\nStopped with {pending} pending; slugs {}", pair.unwrap_or_default());
    }

    Ok(())
}
