//! Diagnostics produced during instantiation.
//!
//! The engine never formats or prints diagnostics itself. It hands each one
//! to a [`DiagnosticSink`] supplied by the caller; [`Diagnostics`] is the
//! stock collecting sink.

use std::fmt;

use crate::{CompilationError, Fault, IrLocation};

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Info,
    Hint,
    Warning,
    Error,
    /// An engine fault surfaced at the instantiate boundary.
    InternalError,
}

impl Level {
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Info => "info",
            Level::Hint => "hint",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::InternalError => "internal error",
        }
    }

    /// Whether diagnostics of this level fail the build.
    pub const fn is_error(self) -> bool {
        matches!(self, Level::Error | Level::InternalError)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single diagnostic message.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    pub location: Option<IrLocation>,
}

impl Diagnostic {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: IrLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, message)
    }

    pub fn trace(message: impl Into<String>) -> Self {
        Self::new(Level::Trace, message)
    }
}

impl From<&CompilationError> for Diagnostic {
    fn from(error: &CompilationError) -> Self {
        Diagnostic::new(Level::Error, error.to_string()).at(error.location())
    }
}

impl From<&Fault> for Diagnostic {
    fn from(fault: &Fault) -> Self {
        let diagnostic = Diagnostic::new(Level::InternalError, fault.to_string());
        match fault {
            Fault::Shape(shape) => diagnostic.at(shape.location),
            Fault::Internal(_) => diagnostic,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {}: {}", location, self.level, self.message),
            None => write!(f, "{}: {}", self.level, self.message),
        }
    }
}

/// Receiver of diagnostics.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// A collecting sink.
///
/// # Examples
///
/// ```
/// use sable_core::{Diagnostic, DiagnosticSink, Diagnostics, Level};
///
/// let mut diagnostics = Diagnostics::new();
/// diagnostics.report(Diagnostic::warning("unused variable 'x'"));
/// assert!(!diagnostics.has_errors());
/// assert_eq!(diagnostics.count_at(Level::Warning), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    diagnostics: Vec<Diagnostic>,
    has_errors: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any `Error` or `InternalError` diagnostic was collected.
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.level.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.at_level(Level::Warning)
    }

    pub fn at_level(&self, level: Level) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.level == level)
    }

    pub fn count_at(&self, level: Level) -> usize {
        self.at_level(level).count()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Drop every diagnostic and reset the error flag.
    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.has_errors = false;
    }

    /// Move every diagnostic into another sink.
    pub fn drain_into(&mut self, sink: &mut dyn DiagnosticSink) {
        for diagnostic in self.diagnostics.drain(..) {
            sink.report(diagnostic);
        }
        self.has_errors = false;
    }
}

impl DiagnosticSink for Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.level.is_error() {
            self.has_errors = true;
        }
        self.diagnostics.push(diagnostic);
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}
