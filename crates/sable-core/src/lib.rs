//! Sable core types.
//!
//! Shared vocabulary of the instantiation engine: ids, type records,
//! signatures, the generic and typed IR, errors and diagnostics.
//!
//! ## Modules
//!
//! - [`ids`]: Declaration, slot, instance, module and string ids
//! - [`types`]: Type records, type keys, qualifiers and builtin kinds
//! - [`signature`]: Instance cache keys and symbol names
//! - [`ir`]: Generic IR (`Op`) and typed IR (`TypedOp`)
//! - [`error`]: Compilation errors and faults
//! - [`diagnostics`]: Diagnostic levels, the sink trait and a collecting sink

pub mod diagnostics;
pub mod error;
pub mod ids;
pub mod ir;
pub mod signature;
pub mod types;

pub use diagnostics::{Diagnostic, DiagnosticSink, Diagnostics, Level};
pub use error::{
    CompilationError, Fault, InternalError, IrLocation, RegistrationError, ShapeError,
};
pub use ids::{DeclId, InstanceId, ModuleId, SlotId, StringId};
pub use ir::{
    BinaryOp, DeclType, InstanceRef, IrModule, Literal, ModuleBuilder, Op, Pragma, TypedChunk,
    TypedOp,
};
pub use signature::Signature;
pub use types::{BuiltinKind, CallInterface, Qualifiers, TypeKey, TypeKind, TypeRecord};
