//! Diagnostic collection for the preprocessor and visitor.
//!
//! The resolver never formats or prints anything itself: it records
//! `Diagnostic` values into a `DiagnosticSink` and the driver decides how to
//! render them. Sub-resolvers share the sink of their parent, so nested
//! failures accumulate into the same counters; the driver exits non-zero iff
//! the error count is non-zero once the top-level resolver returns.

use crate::location::Location;

/// How severe a diagnostic is. Warnings never affect the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic record.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Option<Location>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match &self.location {
            Some(loc) => write!(f, "{}: {}: {}", loc, label, self.message),
            None => write!(f, "{}: {}", label, self.message),
        }
    }
}

/// Accumulates diagnostics for one compilation.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    count_error: usize,
    count_warning: usize,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn error(&mut self, message: impl Into<String>, location: Option<Location>) {
        self.count_error += 1;
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            message: message.into(),
            location,
        });
    }

    pub fn warning(&mut self, message: impl Into<String>, location: Option<Location>) {
        self.count_warning += 1;
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
            location,
        });
    }

    pub fn error_count(&self) -> usize {
        self.count_error
    }

    pub fn warning_count(&self) -> usize {
        self.count_warning
    }

    pub fn has_errors(&self) -> bool {
        self.count_error > 0
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_severity() {
        let mut sink = DiagnosticSink::new();
        sink.warning("unknown pragma", None);
        sink.warning("deprecated macro", None);
        sink.error("include not found", None);

        assert_eq!(sink.warning_count(), 2);
        assert_eq!(sink.error_count(), 1);
        assert!(sink.has_errors());
        assert_eq!(sink.diagnostics().len(), 3);
    }

    #[test]
    fn test_warnings_alone_are_not_errors() {
        let mut sink = DiagnosticSink::new();
        sink.warning("something", None);
        assert!(!sink.has_errors());
    }
}
