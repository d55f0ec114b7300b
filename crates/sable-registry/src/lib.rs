//! Sable registry crate.
//!
//! Owns everything the instantiation engine reads and writes about
//! declarations:
//!
//! - [`DeclarationGraph`]: every declaration, its children and its instances
//! - [`TypeTable`]: per-slot type records with one speculative layer
//! - [`InstanceCache`]: signature-keyed specializations of one declaration
//! - [`SymbolGraphBuilder`]: thread-safe front used while the graph is built

pub mod builder;
pub mod declaration;
pub mod graph;
pub mod instances;
pub mod type_table;

pub use builder::SymbolGraphBuilder;
pub use declaration::{
    BodyRef, CAPTURED_PREFIX, CLONE_NAME, CTOR_NAME, DTOR_NAME, DeclFlags, DeclKind, Declaration,
    GenericParam, NameCategory, OPERATOR_PREFIX, Param,
};
pub use graph::{DeclEdge, DeclarationGraph};
pub use instances::{Instance, InstanceCache, Probe, Validity};
pub use type_table::{LayerScope, TypeTable};
