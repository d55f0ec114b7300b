//! Instantiation options.

/// Knobs for one instantiation session.
///
/// ```
/// use sable_compiler::InstantiationOptions;
///
/// let options = InstantiationOptions::new()
///     .warn_unused_variables(false)
///     .max_suggestions(1);
/// assert!(!options.warns_unused_variables());
/// assert_eq!(options.suggestion_limit(), 1);
/// assert!(options.probes_ambiguous_overloads());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstantiationOptions {
    warn_unused_variables: bool,
    max_suggestions: usize,
    probe_ambiguous_overloads: bool,
    emit_trace_diagnostics: bool,
}

impl Default for InstantiationOptions {
    fn default() -> Self {
        Self {
            warn_unused_variables: true,
            max_suggestions: 3,
            probe_ambiguous_overloads: true,
            emit_trace_diagnostics: false,
        }
    }
}

impl InstantiationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Warn about named locals that are never read.
    pub fn warn_unused_variables(mut self, enabled: bool) -> Self {
        self.warn_unused_variables = enabled;
        self
    }

    /// Upper bound on "did you mean" suggestions per diagnostic.
    pub fn max_suggestions(mut self, limit: usize) -> Self {
        self.max_suggestions = limit;
        self
    }

    /// Break overload ties by speculatively instantiating the tied candidates.
    /// When disabled, a tie is reported as ambiguous straight away.
    pub fn probe_ambiguous_overloads(mut self, enabled: bool) -> Self {
        self.probe_ambiguous_overloads = enabled;
        self
    }

    /// Report every processed opcode as a `Trace` diagnostic.
    pub fn emit_trace_diagnostics(mut self, enabled: bool) -> Self {
        self.emit_trace_diagnostics = enabled;
        self
    }

    pub fn warns_unused_variables(&self) -> bool {
        self.warn_unused_variables
    }

    pub fn suggestion_limit(&self) -> usize {
        self.max_suggestions
    }

    pub fn probes_ambiguous_overloads(&self) -> bool {
        self.probe_ambiguous_overloads
    }

    pub fn emits_trace_diagnostics(&self) -> bool {
        self.emit_trace_diagnostics
    }
}
