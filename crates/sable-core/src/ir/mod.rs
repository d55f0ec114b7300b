//! Generic and typed IR.

mod module;
mod op;
mod typed;

pub use module::{IrModule, ModuleBuilder};
pub use op::{BinaryOp, DeclType, Literal, Op, Pragma};
pub use typed::{InstanceRef, TypedChunk, TypedOp};
