//! Generic IR modules.
//!
//! An [`IrModule`] holds the generic IR of one source unit as a flat,
//! offset-addressable instruction sequence plus a string table. A declaration
//! body starts at some offset and runs up to and including the next
//! [`Op::End`].

use rustc_hash::FxHashMap;

use super::op::{BinaryOp, DeclType, Literal, Op, Pragma};
use crate::{ModuleId, Qualifiers, StringId};

/// Generic IR of one source unit.
#[derive(Debug, Clone, Default)]
pub struct IrModule {
    id: ModuleId,
    ops: Vec<Op>,
    strings: Vec<String>,
    string_index: FxHashMap<String, StringId>,
}

impl IrModule {
    pub fn new(id: ModuleId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Intern a string, returning its id.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(id) = self.string_index.get(s) {
            return *id;
        }
        let id = StringId::new(self.strings.len() as u32);
        self.strings.push(s.to_string());
        self.string_index.insert(s.to_string(), id);
        id
    }

    pub fn string(&self, id: StringId) -> Option<&str> {
        self.strings.get(id.index() as usize).map(String::as_str)
    }

    /// Append an instruction, returning its offset.
    pub fn push(&mut self, op: Op) -> u32 {
        let offset = self.ops.len() as u32;
        self.ops.push(op);
        offset
    }

    pub fn op_at(&self, offset: u32) -> Option<&Op> {
        self.ops.get(offset as usize)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Offset of the `End` that closes the body starting at `offset`.
    pub fn body_end(&self, offset: u32) -> Option<u32> {
        self.ops
            .iter()
            .enumerate()
            .skip(offset as usize)
            .find(|(_, op)| matches!(op, Op::End))
            .map(|(i, _)| i as u32)
    }

    /// Name of the intrinsic if the body at `offset` opens with an intrinsic pragma.
    pub fn intrinsic_name(&self, offset: u32) -> Option<&str> {
        let end = self.body_end(offset)?;
        (offset..end).find_map(|at| match self.op_at(at)? {
            Op::Pragma(Pragma::Intrinsic(name)) => self.string(*name),
            _ => None,
        })
    }
}

/// Convenience writer for generic IR bodies.
///
/// Interns names on the fly and tracks body start offsets.
///
/// ```
/// use sable_core::{BuiltinKind, DeclType, ModuleBuilder, ModuleId};
///
/// let mut builder = ModuleBuilder::new(ModuleId::new(0));
/// let body = builder.begin_body();
/// builder.declare(2, DeclType::Builtin(BuiltinKind::I32));
/// builder.ret(Some(2));
/// builder.end();
/// let module = builder.finish();
/// assert_eq!(module.body_end(body), Some(2));
/// ```
pub struct ModuleBuilder {
    module: IrModule,
}

impl ModuleBuilder {
    pub fn new(id: ModuleId) -> Self {
        Self {
            module: IrModule::new(id),
        }
    }

    /// Offset where the next body starts.
    pub fn begin_body(&self) -> u32 {
        self.module.len() as u32
    }

    pub fn intern(&mut self, s: &str) -> StringId {
        self.module.intern(s)
    }

    pub fn op(&mut self, op: Op) -> &mut Self {
        self.module.push(op);
        self
    }

    pub fn declare(&mut self, reg: u32, ty: DeclType) -> &mut Self {
        self.op(Op::Declare {
            reg,
            ty,
            name: None,
            qualifiers: Qualifiers::empty(),
        })
    }

    /// Declare a named local.
    pub fn local(&mut self, reg: u32, ty: DeclType, name: &str) -> &mut Self {
        let name = self.intern(name);
        self.op(Op::Declare {
            reg,
            ty,
            name: Some(name),
            qualifiers: Qualifiers::empty(),
        })
    }

    /// Declare a named local with qualifiers.
    pub fn local_with(
        &mut self,
        reg: u32,
        ty: DeclType,
        name: &str,
        qualifiers: Qualifiers,
    ) -> &mut Self {
        let name = self.intern(name);
        self.op(Op::Declare {
            reg,
            ty,
            name: Some(name),
            qualifiers,
        })
    }

    pub fn literal(&mut self, dst: u32, value: Literal) -> &mut Self {
        self.op(Op::Literal { dst, value })
    }

    pub fn identify(&mut self, dst: u32, name: &str) -> &mut Self {
        let name = self.intern(name);
        self.op(Op::Identify { dst, name })
    }

    pub fn member(&mut self, dst: u32, object: u32, name: &str) -> &mut Self {
        let name = self.intern(name);
        self.op(Op::Member { dst, object, name })
    }

    pub fn push_arg(&mut self, src: u32) -> &mut Self {
        self.op(Op::Push { src })
    }

    pub fn push_named(&mut self, src: u32, name: &str) -> &mut Self {
        let name = self.intern(name);
        self.op(Op::PushNamed { src, name })
    }

    pub fn call(&mut self, dst: u32, callee: u32) -> &mut Self {
        self.op(Op::Call {
            dst,
            callee,
            expected: None,
        })
    }

    pub fn call_expecting(&mut self, dst: u32, callee: u32, expected: u32) -> &mut Self {
        self.op(Op::Call {
            dst,
            callee,
            expected: Some(expected),
        })
    }

    pub fn binary(&mut self, dst: u32, op: BinaryOp, lhs: u32, rhs: u32) -> &mut Self {
        self.op(Op::Operator { dst, op, lhs, rhs })
    }

    pub fn new_object(&mut self, dst: u32, class: u32) -> &mut Self {
        self.op(Op::New { dst, class })
    }

    pub fn assign(&mut self, dst: u32, src: u32) -> &mut Self {
        self.op(Op::Assign { dst, src })
    }

    pub fn ret(&mut self, src: Option<u32>) -> &mut Self {
        self.op(Op::Return { src })
    }

    pub fn scope_begin(&mut self) -> &mut Self {
        self.op(Op::ScopeBegin)
    }

    pub fn scope_end(&mut self) -> &mut Self {
        self.op(Op::ScopeEnd)
    }

    pub fn add_ref(&mut self, reg: u32) -> &mut Self {
        self.op(Op::Ref { reg })
    }

    pub fn unref(&mut self, reg: u32) -> &mut Self {
        self.op(Op::Unref { reg })
    }

    pub fn intrinsic(&mut self, name: &str) -> &mut Self {
        let name = self.intern(name);
        self.op(Op::Pragma(Pragma::Intrinsic(name)))
    }

    pub fn end(&mut self) -> &mut Self {
        self.op(Op::End)
    }

    pub fn finish(self) -> IrModule {
        self.module
    }
}
