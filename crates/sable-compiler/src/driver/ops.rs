//! Opcode dispatch, declarations, assignment, returns and scopes.

use sable_core::{
    CompilationError, DeclId, DeclType, Diagnostic, Fault, InternalError, IrLocation, IrModule, Literal,
    Op, Pragma, Qualifiers, ShapeError, SlotId, StringId, TypeKey, TypeKind, TypeRecord, TypedOp,
};
use sable_registry::DeclFlags;

use super::frame::PendingDeclare;
use super::Instantiator;
use crate::overload::CallArg;
use crate::ownership::{EntryKind, ScopeEntry, release_order};
use crate::similarity::{TypeRef, is_similar};

type Result<T> = std::result::Result<T, Fault>;

impl Instantiator<'_> {
    /// Process one generic instruction.
    pub(super) fn step(&mut self, module: &IrModule, op: &Op) -> Result<()> {
        match *op {
            Op::Declare {
                reg,
                ty,
                name,
                qualifiers,
            } => self.declare(module, reg, ty, name, qualifiers),
            Op::Literal { dst, value } => self.literal(dst, value),
            Op::Identify { dst, name } => {
                let name = self.string(module, name)?;
                self.identify(dst, &name)
            }
            Op::Member { dst, object, name } => {
                let name = self.string(module, name)?;
                self.member(dst, object, &name)
            }
            Op::Push { src } => self.push_arg(src, None),
            Op::PushNamed { src, name } => {
                let name = self.string(module, name)?;
                self.push_arg(src, Some(name))
            }
            Op::Call {
                dst,
                callee,
                expected,
            } => self.call(dst, callee, expected),
            Op::Operator { dst, op, lhs, rhs } => self.operator(dst, op, lhs, rhs),
            Op::New { dst, class } => self.construct(dst, class),
            Op::Assign { dst, src } => self.assign(dst, src),
            Op::Return { src } => self.ret(src),
            Op::ScopeBegin => {
                self.frame_mut()?.scopes.push();
                self.emit(TypedOp::ScopeBegin)
            }
            Op::ScopeEnd => self.scope_end(),
            Op::Ref { reg } => self.ownership(reg, true),
            Op::Unref { reg } => self.ownership(reg, false),
            Op::Pragma(Pragma::Intrinsic(name)) => {
                let name = self.string(module, name)?;
                let decl = self.decl()?;
                self.graph.add_flags(decl, DeclFlags::INTRINSIC)?;
                self.frame_mut()?.intrinsic = Some(name);
                Ok(())
            }
            Op::End => self.end(),
        }
    }

    fn declare(
        &mut self,
        module: &IrModule,
        reg: u32,
        ty: DeclType,
        name: Option<StringId>,
        qualifiers: Qualifiers,
    ) -> Result<()> {
        let name = name.map(|id| self.string(module, id)).transpose()?;
        let kind = match ty {
            DeclType::Builtin(kind) => Some(TypeKind::Builtin(kind)),
            DeclType::Any => Some(TypeKind::Any),
            DeclType::Void => Some(TypeKind::Void),
            DeclType::Of(source) => self.type_value(source)?,
        };

        let mut record = TypeRecord::fresh().with_qualifiers(qualifiers);
        if let Some(kind) = kind {
            record.set_kind(kind);
        }
        let key = record.key();
        self.set_type(reg, record)?;

        let frame = self.frame_mut()?;
        if kind.is_none() {
            frame.poison(reg);
        }
        frame.declares.push(PendingDeclare {
            index: frame.chunk.len(),
            pc: frame.pc,
            reg,
            name: name.clone(),
        });
        frame.chunk.push(TypedOp::Declare { reg, ty: key });
        if let Some(name) = name {
            frame.scopes.declare_local(reg, name);
        }
        Ok(())
    }

    /// Kind named by a type-value register.
    fn type_value(&mut self, reg: u32) -> Result<Option<TypeKind>> {
        if self.is_poisoned(reg) {
            return Ok(None);
        }
        let record = self.record(reg)?;
        if record.instance || record.call.is_some() {
            let found = if record.call.is_some() {
                "function".to_string()
            } else {
                format!("value of type '{}'", self.type_name(record.key()))
            };
            let location = self.location();
            self.report_error(CompilationError::TypeMismatch {
                expected: "a type".to_string(),
                found,
                location,
            });
            return Ok(None);
        }
        Ok(Some(record.kind))
    }

    fn literal(&mut self, dst: u32, value: Literal) -> Result<()> {
        self.set_type(dst, TypeRecord::builtin(value.kind()))?;
        self.emit(TypedOp::Literal { dst, value })
    }

    fn push_arg(&mut self, src: u32, name: Option<String>) -> Result<()> {
        let reg = if self.is_poisoned(src) {
            src
        } else {
            self.target(src)?
        };
        let slot = self.slot(reg)?;
        let frame = self.frame_mut()?;
        if frame.is_poisoned(src) {
            frame.poison(reg);
        }
        frame.args.push(CallArg { reg, slot, name });
        Ok(())
    }

    fn local_name(&self, reg: u32) -> String {
        let entry = self.frames.last().and_then(|frame| frame.scopes.entry(reg));
        match entry {
            Some(ScopeEntry {
                kind: EntryKind::Local { name, .. },
                ..
            }) => name.clone(),
            _ => format!("r{reg}"),
        }
    }

    fn assign(&mut self, dst: u32, src: u32) -> Result<()> {
        if self.is_poisoned(dst) {
            return Ok(());
        }
        let dst = self.target(dst)?;
        if self.is_poisoned(src) {
            let frame = self.frame_mut()?;
            frame.poison(dst);
            frame.scopes.mark_initialized(dst);
            return Ok(());
        }
        let src = self.target(src)?;
        let target = self.record(dst)?;
        let source = self.record(src)?;
        let location = self.location();

        let scopes = &self.frame()?.scopes;
        let initialized = scopes.is_initialized(dst);
        if target.is_const() && (initialized || !scopes.is_local(dst)) {
            let name = self.local_name(dst);
            self.report_error(CompilationError::CannotModifyConst {
                target: name,
                location,
            });
            return Ok(());
        }
        if !source.instance {
            let expected = self.type_name(target.key());
            self.fail(
                dst,
                CompilationError::TypeMismatch {
                    expected,
                    found: "a compile-time value".to_string(),
                    location,
                },
            );
            return Ok(());
        }

        if target.is_any() {
            let mut inferred = target;
            inferred.set_kind(source.kind);
            inferred.instance = true;
            inferred.call = None;
            inferred.alias = None;
            self.set_type(dst, inferred)?;
        } else {
            let similarity = is_similar(
                self.graph,
                self.types,
                TypeRef::Slot(self.slot(src)?),
                TypeRef::Slot(self.slot(dst)?),
            )?;
            if !similarity.is_match() {
                let expected = self.type_name(target.key());
                let found = self.type_name(source.key());
                self.fail(
                    dst,
                    CompilationError::TypeMismatch {
                        expected,
                        found,
                        location,
                    },
                );
                return Ok(());
            }
        }

        let managed = self.is_managed(dst)?;
        if managed && initialized {
            self.emit(TypedOp::Unref { reg: dst })?;
        }
        self.emit(TypedOp::Copy { dst, src })?;
        if managed {
            let frame = self.frame_mut()?;
            if frame.scopes.is_live_temporary(src) {
                frame.scopes.forget(src);
            } else {
                frame.chunk.push(TypedOp::Ref { reg: dst });
            }
        }
        self.frame_mut()?.scopes.mark_initialized(dst);
        Ok(())
    }

    fn ret(&mut self, src: Option<u32>) -> Result<()> {
        let location = self.location();
        let (value, key) = match src {
            None => (None, TypeKey::VOID),
            Some(reg) if self.is_poisoned(reg) => {
                self.frame_mut()?.returned = true;
                return Ok(());
            }
            Some(reg) => {
                let reg = self.target(reg)?;
                let record = self.record(reg)?;
                if !record.instance {
                    let found = self.type_name(record.key());
                    self.report_error(CompilationError::TypeMismatch {
                        expected: "a value".to_string(),
                        found,
                        location,
                    });
                    self.frame_mut()?.returned = true;
                    return Ok(());
                }
                // Returns are copies; qualifiers do not flow out.
                (Some(reg), TypeKey::new(record.kind))
            }
        };

        let frame = self.frame()?;
        match (frame.return_type, frame.return_declared) {
            (Some(declared), true) => {
                let accepted = match value {
                    None => declared.kind.is_void(),
                    Some(_) if declared.kind.is_void() => false,
                    Some(_) => is_similar(
                        self.graph,
                        self.types,
                        TypeRef::Key(key),
                        TypeRef::Key(declared),
                    )?
                    .is_match(),
                };
                if !accepted {
                    let message = format!(
                        "expected return type '{}', found '{}'",
                        self.type_name(declared),
                        self.type_name(key)
                    );
                    self.report_error(CompilationError::InvalidReturn { message, location });
                }
            }
            (Some(inferred), false) => {
                if inferred.kind != key.kind {
                    let message = format!(
                        "return of '{}' disagrees with earlier return of '{}'",
                        self.type_name(key),
                        self.type_name(inferred)
                    );
                    self.report_error(CompilationError::InvalidReturn { message, location });
                }
            }
            (None, _) => {
                self.frame_mut()?.return_type = Some(key);
                *self.types.substitute_mut(SlotId::RETURN)? = TypeRecord::from_key(key);
            }
        }

        let mut releases = Vec::new();
        for reg in self.frame()?.scopes.owned() {
            if Some(reg) != value && self.is_managed(reg)? {
                releases.push(reg);
            }
        }
        for reg in releases {
            self.emit(TypedOp::Unref { reg })?;
        }
        if let Some(reg) = value {
            if self.is_managed(reg)? {
                let frame = self.frame_mut()?;
                if frame.scopes.owns(reg) {
                    frame.scopes.forget(reg);
                } else {
                    frame.chunk.push(TypedOp::Ref { reg });
                }
            }
        }
        self.emit(TypedOp::Return { src: value })?;
        self.frame_mut()?.returned = true;
        Ok(())
    }

    fn scope_end(&mut self) -> Result<()> {
        let decl = self.decl()?;
        let entries = self
            .frame_mut()?
            .scopes
            .pop()
            .ok_or(InternalError::ScopeUnderflow(decl))?;
        self.close_scope(&entries)?;
        self.emit(TypedOp::ScopeEnd)
    }

    /// Release what a closing scope still owns and warn about unused locals.
    fn close_scope(&mut self, entries: &[ScopeEntry]) -> Result<()> {
        if !self.frame()?.returned {
            let order = release_order(entries, |reg| self.is_managed(reg))?;
            for reg in order {
                self.emit(TypedOp::Unref { reg })?;
            }
        }
        if self.options.warns_unused_variables() {
            let location = self.location();
            for name in entries.iter().filter_map(ScopeEntry::unused_name) {
                self.report(Diagnostic::warning(format!("unused variable '{name}'")).at(location));
            }
        }
        Ok(())
    }

    fn ownership(&mut self, reg: u32, acquire: bool) -> Result<()> {
        if self.is_poisoned(reg) {
            return Ok(());
        }
        let reg = self.target(reg)?;
        if !self.record(reg)?.instance {
            let location = self.location();
            self.report_error(CompilationError::OwnershipOnSynthetic {
                op: if acquire { "ref" } else { "unref" },
                location,
            });
            return Ok(());
        }
        self.emit(if acquire {
            TypedOp::Ref { reg }
        } else {
            TypedOp::Unref { reg }
        })
    }

    fn end(&mut self) -> Result<()> {
        let decl = self.decl()?;
        let depth = self.frame()?.scopes.depth();
        if depth != 1 {
            return Err(ShapeError::new(
                "end",
                format!("{} scope(s) still open", depth.saturating_sub(1)),
                self.location(),
            )
            .into());
        }
        let entries = self
            .frame_mut()?
            .scopes
            .close_function()
            .ok_or(InternalError::ScopeUnderflow(decl))?;

        let frame = self.frame()?;
        let returned = frame.returned;
        if !returned && frame.intrinsic.is_none() {
            if let Some(declared) = frame.return_type.filter(|key| !key.kind.is_void()) {
                let message = format!("missing return of '{}'", self.type_name(declared));
                let location = self.location();
                self.report_error(CompilationError::InvalidReturn { message, location });
            }
        }
        self.close_scope(&entries)?;
        if !returned {
            self.emit(TypedOp::Return { src: None })?;
            if self.frame()?.return_type.is_none() {
                self.frame_mut()?.return_type = Some(TypeKey::VOID);
                *self.types.substitute_mut(SlotId::RETURN)? = TypeRecord::void();
            }
        }

        self.patch_declares(decl)?;
        self.frame_mut()?.done = true;
        Ok(())
    }

    /// Rewrite emitted `Declare`s with the types inferred during the walk.
    fn patch_declares(&mut self, decl: DeclId) -> Result<()> {
        let declares = std::mem::take(&mut self.frame_mut()?.declares);
        for pending in declares {
            let record = self.record(pending.reg)?;
            if record.is_any() && !self.is_poisoned(pending.reg) {
                if let Some(name) = pending.name {
                    self.report_error(CompilationError::UnresolvedType {
                        name,
                        location: IrLocation::new(decl, pending.pc),
                    });
                }
            }
            if let Some(TypedOp::Declare { ty, .. }) = self.frame_mut()?.chunk.get_mut(pending.index) {
                *ty = record.key();
            }
        }
        Ok(())
    }
}
