//! Sable
//!
//! An instantiation engine for a generic intermediate representation.
//!
//! The build runs in two phases. The symbol-graph pass fills a
//! [`SymbolGraphBuilder`] from as many workers as it likes. The builder is
//! then finished into a [`Session`], which owns the declaration graph, the
//! type table and the generic IR modules, and instantiates declarations for
//! concrete argument types one request at a time.
//!
//! ```
//! use sable::prelude::*;
//!
//! let builder = SymbolGraphBuilder::new();
//! let main = builder.create(None, "main", DeclKind::Function).unwrap();
//! builder.bulk_create(main, 1).unwrap();
//!
//! let mut module = ModuleBuilder::new(ModuleId::new(0));
//! let offset = module.begin_body();
//! module.ret(None).end();
//! builder.set_body(main, BodyRef::new(ModuleId::new(0), offset)).unwrap();
//!
//! let options = InstantiationOptions::default();
//! let mut session = Session::from_builder(builder, [module.finish()], options);
//! let mut diagnostics = Diagnostics::new();
//! let result = session.instantiate(main, &[], &mut diagnostics);
//! assert!(result.success);
//! assert!(session.succeeded());
//! ```

use rustc_hash::FxHashMap;
use sable_compiler::overload::type_name;
use sable_compiler::{
    InstantiationOptions, InstantiationState, InstantiationStats, Instantiator, Outcome,
    SpecialMember, TypeRef, is_similar,
};
use sable_core::{
    CompilationError, DeclId, Diagnostic, DiagnosticSink, Fault, InstanceId, InstanceRef,
    IrLocation, IrModule, ModuleId, Signature, TypeKey,
};
use sable_registry::{DeclarationGraph, Instance, SymbolGraphBuilder, TypeTable};
use tracing::{debug, warn};

pub mod prelude {
    pub use crate::{Instantiation, Session};
    pub use sable_compiler::{InstantiationOptions, InstantiationStats, SpecialMember};
    pub use sable_core::{
        BinaryOp, BuiltinKind, CompilationError, DeclId, DeclType, Diagnostic, DiagnosticSink,
        Diagnostics, Fault, InstanceId, InstanceRef, InternalError, IrModule, Level, Literal,
        ModuleBuilder, ModuleId, Op, Qualifiers, Signature, SlotId, TypeKey, TypeKind, TypeRecord,
        TypedOp,
    };
    pub use sable_registry::{
        BodyRef, DeclFlags, DeclKind, DeclarationGraph, GenericParam, Param, SymbolGraphBuilder,
        TypeTable,
    };
}

/// Result of [`Session::instantiate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instantiation {
    pub success: bool,
    pub instance: Option<InstanceId>,
}

impl Instantiation {
    const FAILED: Instantiation = Instantiation {
        success: false,
        instance: None,
    };
}

/// Everything one build instantiates against.
#[derive(Debug)]
pub struct Session {
    graph: DeclarationGraph,
    types: TypeTable,
    modules: FxHashMap<ModuleId, IrModule>,
    options: InstantiationOptions,
    state: InstantiationState,
    succeeded: bool,
}

impl Session {
    pub fn new(
        graph: DeclarationGraph,
        types: TypeTable,
        modules: impl IntoIterator<Item = IrModule>,
        options: InstantiationOptions,
    ) -> Self {
        Self {
            graph,
            types,
            modules: modules
                .into_iter()
                .map(|module| (module.id(), module))
                .collect(),
            options,
            state: InstantiationState::new(),
            succeeded: true,
        }
    }

    /// Finish the build phase. A failed symbol-graph unit fails the session.
    pub fn from_builder(
        builder: SymbolGraphBuilder,
        modules: impl IntoIterator<Item = IrModule>,
        options: InstantiationOptions,
    ) -> Self {
        let (graph, types, succeeded) = builder.finish();
        let mut session = Self::new(graph, types, modules, options);
        session.succeeded = succeeded;
        session
    }

    /// Instantiate `decl` for the given argument types.
    ///
    /// `args` lists one type per parameter followed by one per generic
    /// parameter. Arguments are checked against concretely declared
    /// parameters and replaced by the declared type, so every caller of the
    /// same declaration shares one instance per distinct signature.
    ///
    /// Faults never escape: they are reported as internal errors.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn instantiate(
        &mut self,
        decl: DeclId,
        args: &[TypeKey],
        sink: &mut dyn DiagnosticSink,
    ) -> Instantiation {
        let result = match self.signature(decl, args) {
            Ok(Ok(signature)) => self.run(decl, signature, sink),
            Ok(Err(error)) => {
                sink.report(Diagnostic::from(&error));
                Ok(Outcome::Failed)
            }
            Err(fault) => Err(fault),
        };

        let instantiation = match result {
            Ok(Outcome::Compiled { instance, .. }) => Instantiation {
                success: true,
                instance: Some(instance),
            },
            Ok(Outcome::Failed) => Instantiation::FAILED,
            Err(fault) => {
                warn!(target: "sable::session", decl = %decl, %fault, "internal fault");
                sink.report(Diagnostic::from(&fault));
                Instantiation::FAILED
            }
        };
        self.succeeded &= instantiation.success;
        debug!(
            target: "sable::session",
            decl = %decl,
            success = instantiation.success,
            "instantiate"
        );
        instantiation
    }

    /// Instance of a class's constructor, destructor or clone, synthesized
    /// when the class does not declare one.
    pub fn special_member(
        &mut self,
        class: DeclId,
        member: SpecialMember,
        sink: &mut dyn DiagnosticSink,
    ) -> Option<InstanceRef> {
        let mut driver = Instantiator::new(
            &mut self.graph,
            &mut self.types,
            &self.modules,
            self.options,
            sink,
            &mut self.state,
        );
        match driver.special_member(class, member) {
            Ok(found) => {
                self.succeeded &= found.is_some();
                found
            }
            Err(fault) => {
                warn!(target: "sable::session", class = %class, %fault, "internal fault");
                sink.report(Diagnostic::from(&fault));
                self.succeeded = false;
                None
            }
        }
    }

    fn run(
        &mut self,
        decl: DeclId,
        signature: Signature,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Outcome, Fault> {
        let mut driver = Instantiator::new(
            &mut self.graph,
            &mut self.types,
            &self.modules,
            self.options,
            sink,
            &mut self.state,
        );
        driver.instantiate(decl, signature)
    }

    /// Build the signature requested by `args`.
    fn signature(
        &self,
        decl: DeclId,
        args: &[TypeKey],
    ) -> Result<Result<Signature, CompilationError>, Fault> {
        let declaration = self.graph.get(decl)?;
        let location = IrLocation::new(decl, declaration.body.map_or(0, |body| body.offset));
        let expected = declaration.params.len() + declaration.generics.len();
        if args.len() != expected {
            return Ok(Err(CompilationError::ArgumentMismatch {
                message: format!(
                    "'{}' takes {expected} argument types, {} given",
                    self.graph.qualified_name(decl),
                    args.len()
                ),
                location,
            }));
        }

        let mut entries = args.to_vec();
        for (param, entry) in declaration.params.iter().zip(entries.iter_mut()) {
            let declared = self.types.resolve(param.slot)?;
            if !declared.is_concrete() {
                continue;
            }
            let declared = declared.key();
            let similarity = is_similar(
                &self.graph,
                &self.types,
                TypeRef::Key(*entry),
                TypeRef::Slot(param.slot),
            )?;
            if !similarity.is_match() {
                return Ok(Err(CompilationError::ArgumentMismatch {
                    message: format!(
                        "parameter '{}' of '{}' expects {}, got {}",
                        param.name,
                        self.graph.qualified_name(decl),
                        type_name(&self.graph, declared),
                        type_name(&self.graph, *entry),
                    ),
                    location,
                }));
            }
            *entry = declared;
        }
        Ok(Ok(Signature::new(entries)))
    }

    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.graph.instance(id)
    }

    pub fn graph(&self) -> &DeclarationGraph {
        &self.graph
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn module(&self, id: ModuleId) -> Option<&IrModule> {
        self.modules.get(&id)
    }

    /// Whether the build phase and every request so far succeeded.
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn stats(&self) -> InstantiationStats {
        self.state.stats()
    }

    pub fn options(&self) -> &InstantiationOptions {
        &self.options
    }
}
