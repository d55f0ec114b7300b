//! Special members generated on demand.
//!
//! Constructing a class needs a constructor and a destructor instance. When
//! the class declares one, that declaration is instantiated for the class
//! type. Otherwise a member function is added to the class the first time
//! it is needed and given a typed body that initializes, releases or clones
//! every member variable in turn, recursing into members of class type.
//! Later requests hit the synthesized member's instance cache.

use sable_core::{
    CompilationError, DeclId, Fault, InstanceRef, InternalError, Signature, TypeKey, TypeKind,
    TypeRecord, TypedChunk, TypedOp,
};
use sable_registry::{
    CAPTURED_PREFIX, CLONE_NAME, CTOR_NAME, DTOR_NAME, DeclFlags, DeclKind, Param, Probe,
};
use tracing::debug;

use crate::driver::Instantiator;

type Result<T> = std::result::Result<T, Fault>;

/// The engine-synthesizable members of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialMember {
    Constructor,
    Destructor,
    Clone,
}

impl SpecialMember {
    /// Declaration name of the member.
    pub const fn name(self) -> &'static str {
        match self {
            SpecialMember::Constructor => CTOR_NAME,
            SpecialMember::Destructor => DTOR_NAME,
            SpecialMember::Clone => CLONE_NAME,
        }
    }

    fn return_type(self, class: DeclId) -> TypeKey {
        match self {
            SpecialMember::Clone => TypeKey::linked(class),
            SpecialMember::Constructor | SpecialMember::Destructor => TypeKey::VOID,
        }
    }
}

impl Instantiator<'_> {
    /// Instance of a special member requested outside a body walk.
    pub fn special_member(
        &mut self,
        class: DeclId,
        member: SpecialMember,
    ) -> Result<Option<InstanceRef>> {
        if !self.is_class(class) {
            return Err(InternalError::InvalidDeclaration(class).into());
        }
        self.ensure_special(class, member)
    }

    /// Instance of `member` for `class`, synthesizing it when the class
    /// does not declare one.
    ///
    /// `None` means an error was reported and the current body failed.
    pub(crate) fn ensure_special(
        &mut self,
        class: DeclId,
        member: SpecialMember,
    ) -> Result<Option<InstanceRef>> {
        let signature = Signature::new(vec![TypeKey::linked(class)]);
        let declared: Vec<DeclId> = self
            .graph
            .lookup_children(class, member.name())
            .into_iter()
            .filter(|&decl| {
                self.graph
                    .get(decl)
                    .is_ok_and(|decl| !decl.has_flag(DeclFlags::SYNTHESIZED))
            })
            .collect();

        if !declared.is_empty() {
            let receiver_only = declared.iter().copied().find(|&decl| {
                self.graph.get(decl).is_ok_and(|decl| {
                    !decl.params.is_empty() && decl.params.iter().skip(1).all(|param| param.has_default)
                })
            });
            let Some(decl) = receiver_only else {
                let message = format!(
                    "'{}' has no {} taking only the receiver",
                    self.graph.qualified_name(class),
                    member.name()
                );
                let location = self.location();
                self.report_error(CompilationError::ArgumentMismatch { message, location });
                return Ok(None);
            };
            let params = self.graph.get(decl)?.params.len();
            let mut entries = signature.entries().to_vec();
            entries.resize(params, TypeKey::ANY);
            return Ok(self
                .call_instance(decl, Signature::new(entries))?
                .map(|(instance, _)| InstanceRef::new(decl, instance)));
        }

        let synthesized = self.synthesized_member(class, member)?;
        let params = self.graph.get(synthesized)?.params.clone();
        let signature = Signature::new(
            params
                .iter()
                .map(|param| Ok(self.types.raw_read(param.slot)?.key()))
                .collect::<std::result::Result<Vec<_>, InternalError>>()?,
        );
        match self.graph.probe_instance(synthesized, &signature)? {
            Probe::Valid { id, .. } => {
                self.state.stats.cache_hits += 1;
                return Ok(Some(InstanceRef::new(synthesized, id)));
            }
            Probe::Pending(id) => return Ok(Some(InstanceRef::new(synthesized, id))),
            Probe::Failed => {
                self.fail_current();
                return Ok(None);
            }
            Probe::Indeterminate => {}
        }

        let instance = self.graph.create_instance(synthesized, signature.clone())?;
        self.state.stats.synthesized += 1;

        let members: Vec<(DeclId, TypeKey, Option<u32>)> = self
            .graph
            .children(class)
            .into_iter()
            .filter_map(|child| self.graph.get(child).ok().filter(|decl| decl.is_variable()))
            .map(|field| {
                let src = params
                    .iter()
                    .skip(1)
                    .find(|param| param.name == field.name)
                    .map(|param| param.slot.local);
                Ok((field.id, self.types.raw_read(field.id.return_slot())?.key(), src))
            })
            .collect::<std::result::Result<_, InternalError>>()?;
        let ordered: Vec<(DeclId, TypeKey, Option<u32>)> = match member {
            SpecialMember::Destructor => members.into_iter().rev().collect(),
            SpecialMember::Constructor | SpecialMember::Clone => members,
        };

        let mut chunk = TypedChunk::new();
        let mut complete = true;
        for (field, ty, src) in ordered {
            let nested = match ty.kind {
                TypeKind::Linked(inner) if src.is_none() && self.is_class(inner) => {
                    let nested = self.ensure_special(inner, member)?;
                    complete &= nested.is_some();
                    nested
                }
                _ => None,
            };
            chunk.push(match member {
                SpecialMember::Constructor => TypedOp::InitMember {
                    member: field,
                    ty,
                    src,
                    ctor: nested,
                },
                SpecialMember::Destructor => TypedOp::ReleaseMember {
                    member: field,
                    dtor: nested,
                },
                SpecialMember::Clone => TypedOp::CloneMember {
                    member: field,
                    clone: nested,
                },
            });
        }
        chunk.push(TypedOp::Return { src: None });

        if !complete {
            self.graph.invalidate_instance(instance)?;
            self.fail_current();
            return Ok(None);
        }
        let symbol = signature.symbol_name(&self.graph.qualified_name(synthesized));
        debug!(
            target: "sable::synthesis",
            class = %class,
            member = member.name(),
            instance = %instance,
            ops = chunk.len(),
            "synthesized"
        );
        self.graph
            .update_instance(instance, symbol, member.return_type(class), chunk)?;
        Ok(Some(InstanceRef::new(synthesized, instance)))
    }

    /// The engine-owned declaration of `member` under `class`, created on
    /// first use.
    fn synthesized_member(&mut self, class: DeclId, member: SpecialMember) -> Result<DeclId> {
        let existing = self
            .graph
            .lookup_children(class, member.name())
            .into_iter()
            .find(|&decl| {
                self.graph
                    .get(decl)
                    .is_ok_and(|decl| decl.has_flag(DeclFlags::SYNTHESIZED))
            });
        if let Some(decl) = existing {
            return Ok(decl);
        }

        // A constructor takes every captured value as a hidden parameter.
        let hidden: Vec<(String, TypeKey)> = match member {
            SpecialMember::Constructor => self
                .graph
                .children(class)
                .into_iter()
                .filter_map(|child| self.graph.get(child).ok())
                .filter(|decl| decl.is_variable() && decl.name.starts_with(CAPTURED_PREFIX))
                .map(|decl| {
                    let key = self.types.raw_read(decl.id.return_slot())?.key();
                    Ok((decl.name.clone(), key))
                })
                .collect::<std::result::Result<_, InternalError>>()?,
            SpecialMember::Destructor | SpecialMember::Clone => Vec::new(),
        };

        let decl = self
            .graph
            .create(Some(class), member.name(), DeclKind::Function)
            .map_err(|_| InternalError::InvalidDeclaration(class))?;
        self.types
            .bulk_create(decl, 2 + hidden.len() as u32)
            .map_err(|_| InternalError::InvalidDeclaration(decl))?;
        self.types
            .set(decl.return_slot(), TypeRecord::from_key(member.return_type(class)))?;
        let receiver = decl.slot(2);
        self.types.set(receiver, TypeRecord::linked(class))?;
        let mut params = vec![Param::new("self", receiver)];
        for (local, (name, key)) in (3..).zip(hidden) {
            let slot = decl.slot(local);
            self.types.set(slot, TypeRecord::from_key(key))?;
            params.push(Param::new(name, slot));
        }
        self.graph.get_mut(decl)?.params = params;
        self.graph.add_flags(decl, DeclFlags::SYNTHESIZED)?;
        debug!(target: "sable::synthesis", class = %class, member = member.name(), decl = %decl, "declared");
        Ok(decl)
    }

    fn fail_current(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.failed = true;
        }
    }
}
