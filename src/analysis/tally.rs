//! Per-matcher counts of identified results

use std::fmt;

use rustc_hash::FxHashMap;

/// Running count of identified results, keyed by matcher name.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    counts: FxHashMap<String, usize>,
    order: Vec<String>,
}

impl Tally {
    /// Create an empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more result for `name`.
    pub fn count(&mut self, name: &str) {
        if let Some(count) = self.counts.get_mut(name) {
            *count += 1;
        } else {
            self.counts.insert(name.to_owned(), 1);
            self.order.push(name.to_owned());
        }
    }

    /// Get the count for `name`; zero if never counted.
    #[must_use]
    pub fn get(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Number of distinct names counted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if nothing was counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries by count, highest first. Ties keep first-seen order.
    #[must_use]
    pub fn entries(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> = self
            .order
            .iter()
            .map(|name| (name.as_str(), self.get(name)))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No results identified.");
        }
        writeln!(f, "Summary of identified results:")?;
        for (name, count) in self.entries() {
            writeln!(f, "{name:>30}: {count}")?;
        }
        write!(f, "{:>30}: {}", "TOTAL", self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_total() {
        let mut tally = Tally::new();
        tally.count("a");
        tally.count("b");
        tally.count("a");

        assert_eq!(tally.get("a"), 2);
        assert_eq!(tally.get("b"), 1);
        assert_eq!(tally.get("missing"), 0);
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.len(), 2);
    }

    #[test]
    fn test_entries_sorted_with_stable_ties() {
        let mut tally = Tally::new();
        for name in ["x", "y", "z", "z", "y"] {
            tally.count(name);
        }
        assert_eq!(tally.entries(), vec![("y", 2), ("z", 2), ("x", 1)]);
    }

    #[test]
    fn test_display_empty() {
        assert_eq!(Tally::new().to_string(), "No results identified.");
    }

    #[test]
    fn test_display_table() {
        let mut tally = Tally::new();
        tally.count("timeouts");
        tally.count("timeouts");
        tally.count("nil-login");

        let rendered = tally.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Summary of identified results:");
        assert_eq!(lines[1], format!("{:>30}: 2", "timeouts"));
        assert_eq!(lines[2], format!("{:>30}: 1", "nil-login"));
        assert_eq!(lines[3], format!("{:>30}: 3", "TOTAL"));
    }
}
