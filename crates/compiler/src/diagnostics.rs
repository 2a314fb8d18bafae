//! Diagnostics for the C-Next transpiler
//!
//! Every user-visible error and warning is carried as a [`Diagnostic`] record
//! so that callers (CLI, tests, future tooling) can render or filter them
//! uniformly. Errors abort according to the recovery policy of the stage that
//! produced them; warnings never affect the exit code.

use std::path::{Path, PathBuf};

/// Severity level of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single reported problem with source position information
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable code such as "E0424" or "M3.1", when one applies
    pub code: Option<String>,
    pub message: String,
    pub file: PathBuf,
    /// 1-indexed line, 0 when unknown
    pub line: usize,
    /// 1-indexed column, 0 when unknown
    pub column: usize,
    /// Deterministic fix suggestion, when one exists
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(file: &Path, line: usize, column: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            file: file.to_path_buf(),
            line,
            column,
            suggestion: None,
        }
    }

    pub fn warning(file: &Path, line: usize, column: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            code: None,
            message: message.into(),
            file: file.to_path_buf(),
            line,
            column,
            suggestion: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match &self.code {
            Some(code) => write!(f, "{}[{}]: {}", label, code, self.message)?,
            None => write!(f, "{}: {}", label, self.message)?,
        }
        if self.line > 0 {
            write!(
                f,
                "\n  --> {}:{}:{}",
                self.file.display(),
                self.line,
                self.column
            )?;
        } else {
            write!(f, "\n  --> {}", self.file.display())?;
        }
        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  help: {}", suggestion)?;
        }
        Ok(())
    }
}

/// Ordered collection of diagnostics for a run
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink {
            diagnostics: Vec::new(),
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(other);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Render every diagnostic to stderr
    pub fn report(&self) {
        for diagnostic in &self.diagnostics {
            eprintln!("{}", diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_with_code_and_suggestion() {
        let d = Diagnostic::error(Path::new("main.cnx"), 3, 7, "'RED' is not defined")
            .with_code("E0424")
            .with_suggestion("did you mean 'Color.RED'?");
        let rendered = d.to_string();
        assert!(rendered.starts_with("error[E0424]: 'RED' is not defined"));
        assert!(rendered.contains("main.cnx:3:7"));
        assert!(rendered.contains("help: did you mean 'Color.RED'?"));
    }

    #[test]
    fn test_warning_display_without_code() {
        let d = Diagnostic::warning(Path::new("a.cnx"), 1, 1, "include not found");
        assert!(d.to_string().starts_with("warning: include not found"));
    }

    #[test]
    fn test_position_omitted_when_unknown() {
        let d = Diagnostic::error(Path::new("a.cnx"), 0, 0, "read failed");
        let rendered = d.to_string();
        assert!(rendered.contains("--> a.cnx"));
        assert!(!rendered.contains("a.cnx:0"));
    }

    #[test]
    fn test_sink_error_detection() {
        let mut sink = DiagnosticSink::new();
        assert!(!sink.has_errors());
        sink.push(Diagnostic::warning(Path::new("a.cnx"), 1, 1, "w"));
        assert!(!sink.has_errors());
        sink.push(Diagnostic::error(Path::new("a.cnx"), 2, 1, "e"));
        assert!(sink.has_errors());
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn test_sink_preserves_order() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::error(Path::new("a.cnx"), 1, 1, "first"));
        sink.extend(vec![
            Diagnostic::error(Path::new("a.cnx"), 2, 1, "second"),
            Diagnostic::warning(Path::new("a.cnx"), 3, 1, "third"),
        ]);
        let messages: Vec<String> = sink.into_vec().into_iter().map(|d| d.message).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }
}
