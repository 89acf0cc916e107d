//! Types for standardized reports to the user about merge and annotation runs.
//!
//! Most record-level problems (unresolvable coordinates, malformed ClinVar
//! names, variants the scorer could not use) degrade rows instead of failing.
//! Commands collect counts of these into a [`Report`] so the user learns how
//! many rows were affected.
//!

use std::fmt;

/// The [`CommandOutput<U>`] type output is generic over some data output
/// from a command, and a [`Report`] that reports information to the user.
pub struct CommandOutput<U> {
    value: U,
    report: Report,
}

impl<U> CommandOutput<U> {
    pub fn new(value: U, report: Report) -> Self {
        Self { value, report }
    }

    pub fn value(&self) -> &U {
        &self.value
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn into_parts(self) -> (U, Report) {
        (self.value, self.report)
    }
}

/// A type to (semi) standardize reporting to the user.
#[derive(Clone, Debug, Default)]
pub struct Report {
    entries: Vec<String>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_issue(&mut self, message: String) {
        self.entries.push(message)
    }

    /// Add an issue only when `count` is non-zero.
    pub fn add_count(&mut self, count: usize, what: &str) {
        if count > 0 {
            self.add_issue(format!("{} {}", count, what));
        }
    }

    pub fn issues(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, " - {}", entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_count_skips_zero() {
        let mut report = Report::new();
        report.add_count(0, "rows skipped");
        assert!(report.is_empty());
        report.add_count(3, "rows skipped");
        assert_eq!(report.issues(), ["3 rows skipped"]);
        assert_eq!(report.to_string(), " - 3 rows skipped\n");
    }
}
