//! Build-phase front of the graph and type table.
//!
//! The symbol-graph pass may run one worker per source unit. Every mutating
//! call takes the one lock once, so calls from different workers interleave
//! but never tear. A failing unit flips the shared success flag; the others
//! keep going. [`SymbolGraphBuilder::finish`] hands the graph and table over
//! to the single-threaded instantiation phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sable_core::{DeclId, RegistrationError, SlotId, TypeRecord};

use crate::declaration::{BodyRef, DeclFlags, DeclKind, GenericParam, Param};
use crate::graph::DeclarationGraph;
use crate::type_table::TypeTable;

#[derive(Debug, Default)]
struct Shared {
    graph: DeclarationGraph,
    types: TypeTable,
}

/// Thread-safe builder for the declaration graph and type table.
#[derive(Debug)]
pub struct SymbolGraphBuilder {
    shared: Mutex<Shared>,
    succeeded: AtomicBool,
}

impl Default for SymbolGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolGraphBuilder {
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(Shared::default()),
            succeeded: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(
        &self,
        parent: Option<DeclId>,
        name: &str,
        kind: DeclKind,
    ) -> Result<DeclId, RegistrationError> {
        self.lock().graph.create(parent, name, kind)
    }

    pub fn bulk_create(&self, decl: DeclId, count: u32) -> Result<(), RegistrationError> {
        self.lock().types.bulk_create(decl, count)
    }

    pub fn bulk_append(&self, decl: DeclId, count: u32) -> u32 {
        self.lock().types.bulk_append(decl, count)
    }

    pub fn set_slot(&self, slot: SlotId, record: TypeRecord) -> Result<(), RegistrationError> {
        Ok(self.lock().types.set(slot, record)?)
    }

    pub fn set_params(&self, decl: DeclId, params: Vec<Param>) -> Result<(), RegistrationError> {
        self.lock().graph.get_mut(decl)?.params = params;
        Ok(())
    }

    pub fn set_generics(
        &self,
        decl: DeclId,
        generics: Vec<GenericParam>,
    ) -> Result<(), RegistrationError> {
        self.lock().graph.get_mut(decl)?.generics = generics;
        Ok(())
    }

    pub fn set_body(&self, decl: DeclId, body: BodyRef) -> Result<(), RegistrationError> {
        self.lock().graph.get_mut(decl)?.body = Some(body);
        Ok(())
    }

    pub fn add_flags(&self, decl: DeclId, flags: DeclFlags) -> Result<(), RegistrationError> {
        Ok(self.lock().graph.add_flags(decl, flags)?)
    }

    pub fn set_pending_captures(
        &self,
        decl: DeclId,
        names: Vec<String>,
    ) -> Result<(), RegistrationError> {
        self.lock().graph.get_mut(decl)?.pending_captures = names;
        Ok(())
    }

    /// Record that some unit failed to build.
    pub fn report_failure(&self) {
        self.succeeded.store(false, Ordering::Release);
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded.load(Ordering::Acquire)
    }

    /// End the build phase.
    pub fn finish(self) -> (DeclarationGraph, TypeTable, bool) {
        let succeeded = self.succeeded.load(Ordering::Acquire);
        let Shared { graph, types } = self
            .shared
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (graph, types, succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use sable_core::{BuiltinKind, InternalError, ModuleId, TypeKind};

    #[test]
    fn builds_from_many_workers() {
        let builder = Arc::new(SymbolGraphBuilder::new());
        let root = builder.create(None, "app", DeclKind::Namespace).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|unit| {
                let builder = Arc::clone(&builder);
                thread::spawn(move || {
                    for index in 0..8 {
                        let name = format!("f{unit}_{index}");
                        let decl = builder
                            .create(Some(root), &name, DeclKind::Function)
                            .unwrap();
                        builder.bulk_create(decl, 2).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let builder = Arc::into_inner(builder).unwrap();
        let (graph, types, succeeded) = builder.finish();
        assert!(succeeded);
        assert_eq!(graph.children(root).len(), 32);
        for child in graph.children(root) {
            assert_eq!(types.slot_count(child), 2);
        }
    }

    #[test]
    fn failure_flag_is_shared() {
        let builder = SymbolGraphBuilder::new();
        assert!(builder.succeeded());
        builder.report_failure();
        let (_, _, succeeded) = builder.finish();
        assert!(!succeeded);
    }

    #[test]
    fn setters_reach_the_graph() {
        let builder = SymbolGraphBuilder::new();
        let f = builder.create(None, "f", DeclKind::Function).unwrap();
        builder.bulk_create(f, 2).unwrap();
        builder
            .set_slot(f.slot(2), TypeRecord::builtin(BuiltinKind::I32))
            .unwrap();
        builder.set_params(f, vec![Param::new("x", f.slot(2))]).unwrap();
        builder.set_body(f, BodyRef::new(ModuleId::new(0), 4)).unwrap();
        builder.add_flags(f, DeclFlags::INTRINSIC).unwrap();
        builder
            .set_pending_captures(f, vec!["count".to_string()])
            .unwrap();

        assert_eq!(
            builder.set_body(DeclId::new(40), BodyRef::new(ModuleId::new(0), 0)),
            Err(RegistrationError::Internal(InternalError::InvalidDeclaration(
                DeclId::new(40)
            )))
        );

        let (graph, types, _) = builder.finish();
        let decl = graph.get(f).unwrap();
        assert_eq!(decl.params.len(), 1);
        assert_eq!(decl.body, Some(BodyRef::new(ModuleId::new(0), 4)));
        assert!(decl.has_flag(DeclFlags::INTRINSIC));
        assert_eq!(decl.pending_captures, vec!["count"]);
        assert_eq!(
            types.read(f.slot(2)).unwrap().kind,
            TypeKind::Builtin(BuiltinKind::I32)
        );
    }
}
