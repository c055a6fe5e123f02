//! Analysis diagnostics.
//!
//! Analysis and specialization problems do not abort the run: in strict
//! mode they are recorded as categorized errors (and fail the process at
//! the end), otherwise they are logged as warnings and the offending API or
//! field is omitted.

use log::{error, warn};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Configuration,
    Loading,
    Analysis,
    Specialization,
    Emission,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::Configuration => "configuration",
            DiagnosticKind::Loading => "loading",
            DiagnosticKind::Analysis => "analysis",
            DiagnosticKind::Specialization => "specialization",
            DiagnosticKind::Emission => "emission",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Collector shared by everything that can fail mid-analysis.
#[derive(Debug, Default)]
pub struct Diagnostics {
    strict: bool,
    errors: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            errors: Vec::new(),
        }
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Reports a problem. Strict mode records it as an error; otherwise it
    /// is a warning and the caller degrades.
    pub fn report(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        if self.strict {
            error!("[{}] {}", kind, message);
            self.errors.push(Diagnostic { kind, message });
        } else {
            warn!("[{}] {}", kind, message);
        }
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_mode_records_errors() {
        let mut diags = Diagnostics::new(true);
        diags.report(DiagnosticKind::Analysis, "handler not found");
        assert!(diags.has_errors());
        assert_eq!(diags.errors().len(), 1);
        assert_eq!(diags.errors()[0].kind, DiagnosticKind::Analysis);
    }

    #[test]
    fn test_non_strict_mode_only_warns() {
        let mut diags = Diagnostics::new(false);
        diags.report(DiagnosticKind::Specialization, "missing type argument");
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_display() {
        let diag = Diagnostic {
            kind: DiagnosticKind::Loading,
            message: "Cargo.toml not found".to_string(),
        };
        assert_eq!(diag.to_string(), "[loading] Cargo.toml not found");
    }
}
