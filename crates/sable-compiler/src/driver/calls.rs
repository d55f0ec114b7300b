//! Calls, operators and construction.

use sable_core::{
    BinaryOp, BuiltinKind, CompilationError, DeclId, Fault, InstanceRef, TypeKey, TypeKind,
    TypeRecord, TypedOp,
};
use sable_registry::{CTOR_NAME, DeclFlags, Declaration};

use super::Instantiator;
use crate::overload::{
    CallArg, CandidateMatch, OverloadResolver, Selection, describe_candidate, select,
};
use crate::similarity::{TypeRef, wider};
use crate::synthesis::SpecialMember;

type Result<T> = std::result::Result<T, Fault>;

/// A resolved and instantiated callee.
pub(crate) struct ResolvedCall {
    pub chosen: CandidateMatch,
    pub target: InstanceRef,
    pub return_type: TypeKey,
}

/// Operand and result kinds of a builtin binary operation.
fn builtin_operator(op: BinaryOp, a: BuiltinKind, b: BuiltinKind) -> Option<(BuiltinKind, BuiltinKind)> {
    let operand = wider(a, b)?;
    match op {
        BinaryOp::Eq | BinaryOp::Ne => Some((operand, BuiltinKind::Bool)),
        _ if !operand.is_numeric() => None,
        _ if op.is_comparison() => Some((operand, BuiltinKind::Bool)),
        _ => Some((operand, operand)),
    }
}

impl Instantiator<'_> {
    fn take_args(&mut self) -> Result<Vec<CallArg>> {
        Ok(std::mem::take(&mut self.frame_mut()?.args))
    }

    fn any_poisoned(&self, args: &[CallArg]) -> bool {
        args.iter().any(|arg| self.is_poisoned(arg.reg))
    }

    pub(super) fn call(&mut self, dst: u32, callee: u32, expected: Option<u32>) -> Result<()> {
        let args = self.take_args()?;
        if self.is_poisoned(callee)
            || self.any_poisoned(&args)
            || expected.is_some_and(|reg| self.is_poisoned(reg))
        {
            self.poison(dst);
            return Ok(());
        }

        let record = self.record(callee)?;
        let Some(interface) = record.call else {
            let what = self.type_name(record.key());
            let location = self.location();
            self.fail(dst, CompilationError::NotCallable { what, location });
            return Ok(());
        };

        let mut call_args = Vec::with_capacity(args.len() + 1);
        if let Some(receiver) = interface.receiver {
            call_args.push(CallArg::positional(receiver, self.slot(receiver)?));
        }
        call_args.extend(args);
        let expected = match expected {
            Some(reg) => Some(TypeRef::Slot(self.slot(self.target(reg)?)?)),
            None => None,
        };

        match self.resolve_call(&interface.name, &interface.candidates, &call_args, expected)? {
            Some(resolved) => self.emit_call(dst, resolved),
            None => {
                self.poison(dst);
                Ok(())
            }
        }
    }

    /// Pick one candidate for a call and instantiate it.
    ///
    /// `None` means an error has been reported and the current body failed.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub(crate) fn resolve_call(
        &mut self,
        name: &str,
        candidates: &[DeclId],
        args: &[CallArg],
        expected: Option<TypeRef>,
    ) -> Result<Option<ResolvedCall>> {
        let (survivors, rejected) =
            OverloadResolver::new(self.graph, self.types).validate_all(candidates, args, expected)?;
        tracing::trace!(
            target: "sable::overload",
            name,
            candidates = candidates.len(),
            survivors = survivors.len(),
            "validated"
        );

        let probe_ties = self.options.probes_ambiguous_overloads();
        let selection = select(survivors, probe_ties, |candidate| self.probe(candidate))?;
        let location = self.location();
        let chosen = match selection {
            Selection::Chosen(chosen) => chosen,
            Selection::NoMatch => {
                let rejected = rejected
                    .iter()
                    .map(|(decl, why)| {
                        format!("{}: {why}", describe_candidate(self.graph, self.types, *decl))
                    })
                    .collect();
                self.report_error(CompilationError::NoMatchingOverload {
                    name: name.to_string(),
                    rejected,
                    location,
                });
                return Ok(None);
            }
            Selection::Ambiguous(tied) => {
                let candidates = tied
                    .iter()
                    .map(|decl| describe_candidate(self.graph, self.types, *decl))
                    .collect();
                self.report_error(CompilationError::AmbiguousOverload {
                    name: name.to_string(),
                    candidates,
                    location,
                });
                return Ok(None);
            }
            Selection::NoneInstantiated(tied) => {
                let rejected = tied
                    .iter()
                    .map(|decl| {
                        format!(
                            "{}: cannot be instantiated for these argument types",
                            describe_candidate(self.graph, self.types, *decl)
                        )
                    })
                    .collect();
                self.report_error(CompilationError::NoMatchingOverload {
                    name: name.to_string(),
                    rejected,
                    location,
                });
                return Ok(None);
            }
        };

        Ok(self
            .call_instance(chosen.decl, chosen.signature.clone())?
            .map(|(instance, return_type)| ResolvedCall {
                target: InstanceRef::new(chosen.decl, instance),
                chosen,
                return_type,
            }))
    }

    fn emit_call(&mut self, dst: u32, resolved: ResolvedCall) -> Result<()> {
        let ResolvedCall {
            chosen,
            target,
            return_type,
        } = resolved;
        let callee = self.graph.get(target.decl)?;
        let intrinsic = if callee.has_flag(DeclFlags::INTRINSIC) {
            callee.body.and_then(|body| {
                let module = self.modules.get(&body.module)?;
                module.intrinsic_name(body.offset).map(str::to_string)
            })
        } else {
            None
        };

        let args = chosen.args;
        self.emit(match intrinsic {
            Some(name) => TypedOp::Intrinsic { dst, name, args },
            None => TypedOp::Call { dst, target, args },
        })?;
        self.set_type(dst, TypeRecord::from_key(return_type))?;
        if self.is_managed(dst)? {
            self.frame_mut()?.scopes.add_temporary(dst);
        }
        Ok(())
    }

    /// A binary operator: a user overload when one is visible, a builtin
    /// operation on scalars otherwise.
    pub(super) fn operator(&mut self, dst: u32, op: BinaryOp, lhs: u32, rhs: u32) -> Result<()> {
        if self.is_poisoned(lhs) || self.is_poisoned(rhs) {
            self.poison(dst);
            return Ok(());
        }
        let (lhs, rhs) = (self.target(lhs)?, self.target(rhs)?);
        let (left, right) = (self.record(lhs)?, self.record(rhs)?);
        let name = op.operator_name();
        let decl = self.decl()?;

        let mut candidates = Vec::new();
        if let Some(class) = left.kind.linked().filter(|&class| left.instance && self.is_class(class)) {
            candidates.extend(self.graph.lookup_children(class, &name));
        }
        for found in self.graph.lookup_from_enclosing(decl, &name) {
            if !candidates.contains(&found) {
                candidates.push(found);
            }
        }
        candidates.retain(|&candidate| self.graph.get(candidate).is_ok_and(Declaration::is_function));

        if !candidates.is_empty() {
            let args = [
                CallArg::positional(lhs, self.slot(lhs)?),
                CallArg::positional(rhs, self.slot(rhs)?),
            ];
            return match self.resolve_call(&name, &candidates, &args, None)? {
                Some(resolved) => self.emit_call(dst, resolved),
                None => {
                    self.poison(dst);
                    Ok(())
                }
            };
        }

        let builtin = match (left.kind, right.kind) {
            (TypeKind::Builtin(a), TypeKind::Builtin(b)) if left.instance && right.instance => {
                builtin_operator(op, a, b)
            }
            _ => None,
        };
        match builtin {
            Some((operand, result)) => {
                self.emit(TypedOp::Primitive {
                    dst,
                    op,
                    ty: operand,
                    lhs,
                    rhs,
                })?;
                self.set_type(dst, TypeRecord::builtin(result))
            }
            None => {
                let location = self.location();
                let error = CompilationError::NoOperator {
                    op: op.symbol().to_string(),
                    lhs: self.type_name(left.key()),
                    rhs: self.type_name(right.key()),
                    location,
                };
                self.fail(dst, error);
                Ok(())
            }
        }
    }

    /// Construct a class instance into `dst`.
    ///
    /// User constructors go through overload resolution with the new object
    /// as receiver; a class without one gets a synthesized constructor. The
    /// destructor is ensured up front so the release of `dst` is resolvable.
    pub(super) fn construct(&mut self, dst: u32, class: u32) -> Result<()> {
        let args = self.take_args()?;
        if self.is_poisoned(class) || self.any_poisoned(&args) {
            self.poison(dst);
            return Ok(());
        }
        let record = self.record(class)?;
        let location = self.location();
        let class = match record.kind.linked() {
            Some(decl) if !record.instance && self.is_class(decl) => decl,
            _ => {
                let what = self.type_name(record.key());
                self.fail(dst, CompilationError::NotCallable { what, location });
                return Ok(());
            }
        };

        let (class, captured) = if self.graph.get(class)?.has_flag(DeclFlags::CAPTURES) {
            match self.capture_site(class)? {
                Some(site) => site,
                None => {
                    self.poison(dst);
                    return Ok(());
                }
            }
        } else {
            (class, Vec::new())
        };
        self.set_type(dst, TypeRecord::linked(class))?;

        let ctors: Vec<DeclId> = self
            .graph
            .lookup_children(class, CTOR_NAME)
            .into_iter()
            .filter(|&ctor| {
                self.graph
                    .get(ctor)
                    .is_ok_and(|decl| !decl.has_flag(DeclFlags::SYNTHESIZED))
            })
            .collect();

        let (ctor, ctor_args) = if ctors.is_empty() {
            if !args.is_empty() {
                let message = format!(
                    "'{}' has no constructor taking arguments",
                    self.graph.qualified_name(class)
                );
                self.fail(dst, CompilationError::ArgumentMismatch { message, location });
                return Ok(());
            }
            match self.ensure_special(class, SpecialMember::Constructor)? {
                Some(ctor) => {
                    let params = self.graph.get(ctor.decl)?.params.clone();
                    let hidden = params
                        .iter()
                        .skip(1)
                        .filter_map(|param| {
                            captured
                                .iter()
                                .find(|arg| arg.name.as_deref() == Some(param.name.as_str()))
                                .map(|arg| arg.reg)
                        })
                        .collect();
                    (ctor, hidden)
                }
                None => {
                    self.poison(dst);
                    return Ok(());
                }
            }
        } else {
            let mut call_args = Vec::with_capacity(args.len() + captured.len() + 1);
            call_args.push(CallArg::positional(dst, self.slot(dst)?));
            call_args.extend(args);
            call_args.extend(captured);
            let name = format!("{}::{CTOR_NAME}", self.graph.qualified_name(class));
            match self.resolve_call(&name, &ctors, &call_args, None)? {
                Some(resolved) => (
                    resolved.target,
                    resolved.chosen.args.into_iter().skip(1).collect(),
                ),
                None => {
                    self.poison(dst);
                    return Ok(());
                }
            }
        };

        if self
            .ensure_special(class, SpecialMember::Destructor)?
            .is_none()
        {
            self.poison(dst);
            return Ok(());
        }

        self.emit(TypedOp::New {
            dst,
            class,
            ctor,
            args: ctor_args,
        })?;
        self.frame_mut()?.scopes.add_temporary(dst);
        Ok(())
    }
}
