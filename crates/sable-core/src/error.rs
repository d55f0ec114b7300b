//! Error types for the instantiation engine.
//!
//! ## Error Hierarchy
//!
//! ```text
//! CompilationError   - user type errors; reported once as Error diagnostics
//! Fault              - aborts the current instantiation
//! ├── InternalError  - broken engine invariants (stale ids, missing slots)
//! └── ShapeError     - malformed generic IR
//! RegistrationError  - build-phase errors
//! ```
//!
//! Compilation errors poison a register and let the walk continue. Faults
//! propagate with `?` up to the instantiate boundary, where they are reported
//! at `InternalError` level.

use std::fmt;

use thiserror::Error;

use crate::{DeclId, InstanceId, ModuleId, SlotId};

/// Position of an instruction: the declaration whose body holds it and its
/// offset in the generic IR module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IrLocation {
    pub decl: DeclId,
    pub offset: u32,
}

impl IrLocation {
    pub const fn new(decl: DeclId, offset: u32) -> Self {
        Self { decl, offset }
    }
}

impl fmt::Display for IrLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.decl, self.offset)
    }
}

// ============================================================================
// Compilation Errors
// ============================================================================

/// User-facing type errors found while instantiating a body.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
    /// A value's type is not usable where it is expected.
    #[error("at {location}: type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch {
        expected: String,
        found: String,
        location: IrLocation,
    },

    /// A name resolved to nothing.
    #[error("at {location}: '{name}' is not declared{hint}")]
    NotDeclared {
        name: String,
        /// Pre-rendered suggestion suffix, empty when there is none.
        hint: String,
        location: IrLocation,
    },

    /// Every overload candidate was rejected.
    #[error(
        "at {location}: no matching overload for '{name}'{}",
        render_list(rejected)
    )]
    NoMatchingOverload {
        name: String,
        /// One line per rejected candidate with the reason.
        rejected: Vec<String>,
        location: IrLocation,
    },

    /// More than one overload candidate fits equally well.
    #[error(
        "at {location}: ambiguous call to '{name}'{}",
        render_list(candidates)
    )]
    AmbiguousOverload {
        name: String,
        candidates: Vec<String>,
        location: IrLocation,
    },

    /// No operator overload and no builtin operation for the operands.
    #[error("at {location}: no operator '{op}' for '{lhs}' and '{rhs}'")]
    NoOperator {
        op: String,
        lhs: String,
        rhs: String,
        location: IrLocation,
    },

    /// The callee register does not hold anything callable.
    #[error("at {location}: '{what}' is not callable")]
    NotCallable { what: String, location: IrLocation },

    /// A return statement disagrees with the declared or inferred return type.
    #[error("at {location}: {message}")]
    InvalidReturn { message: String, location: IrLocation },

    /// A recursive call reached a function whose signature is still open.
    #[error("at {location}: recursive function '{name}' must be fully defined")]
    RecursiveNotDefined { name: String, location: IrLocation },

    /// A manual ownership operation on a compile-time-only value.
    #[error("at {location}: '{op}' applied to a value that is not a runtime instance")]
    OwnershipOnSynthetic {
        op: &'static str,
        location: IrLocation,
    },

    /// Assignment to a const-qualified destination.
    #[error("at {location}: cannot modify const '{target}'")]
    CannotModifyConst { target: String, location: IrLocation },

    /// A captured name has no local to bind to at the construction site.
    #[error("at {location}: captured name '{name}' is not a local at this construction site")]
    UnboundCapture { name: String, location: IrLocation },

    /// Malformed argument list (too many, duplicates, unknown names).
    #[error("at {location}: {message}")]
    ArgumentMismatch { message: String, location: IrLocation },

    /// A named local was never given a concrete type.
    #[error("at {location}: type of '{name}' could not be inferred")]
    UnresolvedType { name: String, location: IrLocation },

    /// A callee failed earlier while its diagnostics were suppressed.
    #[error("at {location}: '{name}' cannot be instantiated for these argument types")]
    FailedInstantiation { name: String, location: IrLocation },
}

fn render_list(items: &[String]) -> String {
    items.iter().map(|item| format!("\n  {item}")).collect()
}

impl CompilationError {
    /// Where the error occurred.
    pub fn location(&self) -> IrLocation {
        match self {
            CompilationError::TypeMismatch { location, .. } => *location,
            CompilationError::NotDeclared { location, .. } => *location,
            CompilationError::NoMatchingOverload { location, .. } => *location,
            CompilationError::AmbiguousOverload { location, .. } => *location,
            CompilationError::NoOperator { location, .. } => *location,
            CompilationError::NotCallable { location, .. } => *location,
            CompilationError::InvalidReturn { location, .. } => *location,
            CompilationError::RecursiveNotDefined { location, .. } => *location,
            CompilationError::OwnershipOnSynthetic { location, .. } => *location,
            CompilationError::CannotModifyConst { location, .. } => *location,
            CompilationError::UnboundCapture { location, .. } => *location,
            CompilationError::ArgumentMismatch { location, .. } => *location,
            CompilationError::UnresolvedType { location, .. } => *location,
            CompilationError::FailedInstantiation { location, .. } => *location,
        }
    }
}

// ============================================================================
// Faults
// ============================================================================

/// A broken engine invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("type slot {0} does not exist")]
    MissingSlot(SlotId),

    #[error("{0} is not a valid declaration")]
    InvalidDeclaration(DeclId),

    #[error("{0} is not a valid instance")]
    InvalidInstance(InstanceId),

    #[error("scope stack underflow in {0}")]
    ScopeUnderflow(DeclId),

    #[error("frame stack underflow")]
    FrameUnderflow,

    #[error("layer for {0} is not the active layer")]
    LayerMismatch(DeclId),

    #[error("{0} has no body")]
    MissingBody(DeclId),

    #[error("{0} is not loaded")]
    MissingModule(ModuleId),
}

/// Generic IR that violates the opcode shape rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("at {location}: malformed '{op}': {message}")]
pub struct ShapeError {
    /// Rendering of the offending instruction.
    pub op: String,
    pub message: String,
    pub location: IrLocation,
}

impl ShapeError {
    pub fn new(op: impl Into<String>, message: impl Into<String>, location: IrLocation) -> Self {
        Self {
            op: op.into(),
            message: message.into(),
            location,
        }
    }
}

/// Anything that aborts an instantiation outright.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

// ============================================================================
// Registration Errors
// ============================================================================

/// Errors raised while the symbol graph is being built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// `bulk_create` was called twice for one declaration.
    #[error("type slots for {0} were already allocated")]
    DuplicateSlots(DeclId),

    /// The parent id does not name a live declaration.
    #[error("invalid parent {0}")]
    InvalidParent(DeclId),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

// ============================================================================
// Tests
// ============================================================================
