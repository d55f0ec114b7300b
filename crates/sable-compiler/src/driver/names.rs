//! Name resolution: bare identifiers and member access.
//!
//! A bare name is looked up innermost first: locals of the walk, generic
//! parameters of the declaration, children of the declaration, then the
//! enclosing scopes. Inside a closure class a name that was promoted to a
//! hidden member resolves through the receiver.

use sable_core::{
    BuiltinKind, CallInterface, CompilationError, DeclId, Fault, TypeKey, TypeKind, TypeRecord,
    TypedOp,
};
use sable_registry::{CAPTURED_PREFIX, DeclFlags, DeclKind, Declaration, OPERATOR_PREFIX};

use super::Instantiator;
use crate::suggest::{format_suggestions, suggest_similar};

type Result<T> = std::result::Result<T, Fault>;

/// Type named by a keyword.
fn keyword_type(name: &str) -> Option<TypeKind> {
    match name {
        "void" => Some(TypeKind::Void),
        "any" => Some(TypeKind::Any),
        _ => BuiltinKind::from_keyword(name).map(TypeKind::Builtin),
    }
}

impl Instantiator<'_> {
    pub(super) fn identify(&mut self, dst: u32, name: &str) -> Result<()> {
        if let Some(kind) = keyword_type(name) {
            return self.set_type(dst, TypeRecord::from_key(TypeKey::new(kind)).synthetic());
        }

        let frame = self.frame()?;
        let decl = frame.decl;
        if let Some(local) = frame.scopes.lookup(name) {
            if frame.is_poisoned(local) {
                self.poison(dst);
                return Ok(());
            }
            self.frame_mut()?.scopes.mark_used(local);
            self.types.make_hardlink(decl.slot(local), decl.slot(dst))?;
            return Ok(());
        }

        let generic = self
            .graph
            .get(decl)?
            .generics
            .iter()
            .find(|generic| generic.name == name)
            .map(|generic| generic.slot);
        if let Some(slot) = generic {
            let record = self.types.read(slot)?.clone().synthetic();
            return self.set_type(dst, record);
        }

        let mut found = self.graph.lookup_children(decl, name);
        if found.is_empty() {
            found = self.graph.lookup_from_enclosing(decl, name);
        }
        if !found.is_empty() {
            let receiver = self.implicit_receiver(decl, &found)?;
            return self.bind(dst, name, &found, receiver);
        }

        if let Some(class) = self.graph.enclosing_class(decl) {
            let hidden = format!("{CAPTURED_PREFIX}{name}");
            let promoted = self.graph.lookup_children(class, &hidden);
            let receiver = self.frame()?.self_reg;
            if let (Some(&member), Some(object)) = (promoted.first(), receiver) {
                return self.load_variable(dst, member, Some(object));
            }
            let class_decl = self.graph.get(class)?;
            if class_decl.has_flag(DeclFlags::CAPTURES)
                && class_decl.pending_captures.iter().any(|pending| pending == name)
            {
                let location = self.location();
                self.fail(
                    dst,
                    CompilationError::UnboundCapture {
                        name: name.to_string(),
                        location,
                    },
                );
                return Ok(());
            }
        }

        self.not_declared(dst, name, decl)
    }

    /// `self` of the current method when every match is a member of its class.
    fn implicit_receiver(&self, decl: DeclId, found: &[DeclId]) -> Result<Option<u32>> {
        let Some(class) = self.graph.enclosing_class(decl) else {
            return Ok(None);
        };
        let members = found
            .iter()
            .all(|&candidate| self.graph.parent(candidate) == Some(class));
        Ok(if members {
            self.frame()?.self_reg
        } else {
            None
        })
    }

    pub(super) fn member(&mut self, dst: u32, object: u32, name: &str) -> Result<()> {
        if self.is_poisoned(object) {
            self.poison(dst);
            return Ok(());
        }
        let object = self.target(object)?;
        let record = self.record(object)?;
        let location = self.location();

        let Some(scope) = self.types.resolve_decl(&record) else {
            let owner = self.type_name(record.key());
            self.fail(
                dst,
                CompilationError::NotDeclared {
                    name: format!("{owner}.{name}"),
                    hint: String::new(),
                    location,
                },
            );
            return Ok(());
        };

        let found = self.graph.lookup_children(scope, name);
        if found.is_empty() {
            let names: Vec<String> = self
                .graph
                .children(scope)
                .into_iter()
                .filter_map(|child| self.graph.get(child).ok())
                .filter(|child| !child.has_flag(DeclFlags::SYNTHESIZED))
                .map(|child| child.name.clone())
                .filter(|child| !child.starts_with(CAPTURED_PREFIX))
                .collect();
            let hint = format_suggestions(&suggest_similar(
                name,
                names.iter().map(String::as_str),
                self.options.suggestion_limit(),
            ));
            let owner = self.graph.qualified_name(scope);
            self.fail(
                dst,
                CompilationError::NotDeclared {
                    name: format!("{owner}.{name}"),
                    hint,
                    location,
                },
            );
            return Ok(());
        }

        let receiver = record.instance.then_some(object);
        self.bind(dst, name, &found, receiver)
    }

    /// Give `dst` the meaning of the declarations a name resolved to.
    ///
    /// Functions become a call interface over every match; otherwise the
    /// first match decides.
    fn bind(&mut self, dst: u32, name: &str, found: &[DeclId], object: Option<u32>) -> Result<()> {
        let functions: Vec<DeclId> = found
            .iter()
            .copied()
            .filter(|&decl| self.graph.get(decl).is_ok_and(Declaration::is_function))
            .collect();
        if !functions.is_empty() {
            let mut call = CallInterface::new(name, functions);
            if let Some(receiver) = object {
                call = call.with_receiver(receiver);
            }
            return self.set_type(dst, TypeRecord::any().synthetic().with_call(call));
        }

        let first = found[0];
        match self.graph.get(first)?.kind {
            DeclKind::Class | DeclKind::Namespace => {
                self.set_type(dst, TypeRecord::linked(first).synthetic())
            }
            DeclKind::Typedef => {
                let mut record = self.types.raw_read(first.return_slot())?.clone().synthetic();
                record.alias = None;
                self.set_type(dst, record)
            }
            DeclKind::Variable => self.load_variable(dst, first, object),
            DeclKind::Function | DeclKind::Unit => {
                let decl = self.decl()?;
                self.not_declared(dst, name, decl)
            }
        }
    }

    /// Load a global, or a member through `object`.
    fn load_variable(&mut self, dst: u32, variable: DeclId, object: Option<u32>) -> Result<()> {
        let parent = self.graph.parent(variable);
        let is_member = parent.is_some_and(|parent| self.is_class(parent));
        let mut record = self.types.raw_read(variable.return_slot())?.clone();
        record.instance = true;
        record.alias = None;
        record.call = None;

        if is_member {
            let Some(object) = object else {
                let location = self.location();
                let name = self.graph.qualified_name(variable);
                self.fail(
                    dst,
                    CompilationError::NotDeclared {
                        name,
                        hint: "; members are only reachable through an object".to_string(),
                        location,
                    },
                );
                return Ok(());
            };
            self.emit(TypedOp::Member {
                dst,
                object,
                member: variable,
            })?;
        } else {
            self.emit(TypedOp::Global {
                dst,
                decl: variable,
            })?;
        }
        self.set_type(dst, record)
    }

    fn not_declared(&mut self, dst: u32, name: &str, decl: DeclId) -> Result<()> {
        let frame = self.frame()?;
        let mut names: Vec<String> = frame
            .scopes
            .local_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        names.extend(
            self.graph
                .get(decl)?
                .generics
                .iter()
                .map(|generic| generic.name.clone()),
        );
        names.extend(self.graph.visible_names(decl));
        names.retain(|candidate| {
            !candidate.starts_with(CAPTURED_PREFIX) && !candidate.starts_with(OPERATOR_PREFIX)
        });
        let hint = format_suggestions(&suggest_similar(
            name,
            names.iter().map(String::as_str),
            self.options.suggestion_limit(),
        ));
        let location = self.location();
        self.fail(
            dst,
            CompilationError::NotDeclared {
                name: name.to_string(),
                hint,
                location,
            },
        );
        Ok(())
    }
}
