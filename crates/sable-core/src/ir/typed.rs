//! Typed IR - the concrete output of instantiation.
//!
//! Structurally similar to the generic IR, but every register carries a
//! concrete [`TypeKey`], calls name a concrete (declaration, instance) pair
//! and ownership operations have been inserted.

use std::fmt;

use crate::{BinaryOp, BuiltinKind, DeclId, InstanceId, Literal, TypeKey};

/// A concrete callee: one instance of one declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceRef {
    pub decl: DeclId,
    pub instance: InstanceId,
}

impl InstanceRef {
    pub const fn new(decl: DeclId, instance: InstanceId) -> Self {
        Self { decl, instance }
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.decl, self.instance)
    }
}

/// One typed IR instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedOp {
    Declare {
        reg: u32,
        ty: TypeKey,
    },
    Literal {
        dst: u32,
        value: Literal,
    },
    Copy {
        dst: u32,
        src: u32,
    },
    /// Load a global variable.
    Global {
        dst: u32,
        decl: DeclId,
    },
    Member {
        dst: u32,
        object: u32,
        member: DeclId,
    },
    Call {
        dst: u32,
        target: InstanceRef,
        args: Vec<u32>,
    },
    /// A call resolved to a compiler intrinsic.
    Intrinsic {
        dst: u32,
        name: String,
        args: Vec<u32>,
    },
    /// Builtin arithmetic or comparison on scalars.
    Primitive {
        dst: u32,
        op: BinaryOp,
        ty: BuiltinKind,
        lhs: u32,
        rhs: u32,
    },
    New {
        dst: u32,
        class: DeclId,
        ctor: InstanceRef,
        args: Vec<u32>,
    },
    /// Synthesized constructor step for one member. `src` is the
    /// constructor parameter holding a captured value.
    InitMember {
        member: DeclId,
        ty: TypeKey,
        src: Option<u32>,
        ctor: Option<InstanceRef>,
    },
    /// Synthesized destructor step for one member.
    ReleaseMember {
        member: DeclId,
        dtor: Option<InstanceRef>,
    },
    /// Synthesized clone step for one member.
    CloneMember {
        member: DeclId,
        clone: Option<InstanceRef>,
    },
    Ref {
        reg: u32,
    },
    Unref {
        reg: u32,
    },
    ScopeBegin,
    ScopeEnd,
    Return {
        src: Option<u32>,
    },
}

impl TypedOp {
    /// Whether this is an ownership operation.
    pub const fn is_ownership(&self) -> bool {
        matches!(self, TypedOp::Ref { .. } | TypedOp::Unref { .. })
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[u32]) -> fmt::Result {
    f.write_str("(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "r{arg}")?;
    }
    f.write_str(")")
}

impl fmt::Display for TypedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedOp::Declare { reg, ty } => write!(f, "declare r{reg} {ty}"),
            TypedOp::Literal { dst, value } => write!(f, "literal r{dst} {value}"),
            TypedOp::Copy { dst, src } => write!(f, "copy r{dst} r{src}"),
            TypedOp::Global { dst, decl } => write!(f, "global r{dst} {decl}"),
            TypedOp::Member {
                dst,
                object,
                member,
            } => write!(f, "member r{dst} r{object}.{member}"),
            TypedOp::Call { dst, target, args } => {
                write!(f, "call r{dst} {target}")?;
                write_args(f, args)
            }
            TypedOp::Intrinsic { dst, name, args } => {
                write!(f, "intrinsic r{dst} {name}")?;
                write_args(f, args)
            }
            TypedOp::Primitive {
                dst,
                op,
                ty,
                lhs,
                rhs,
            } => write!(f, "{ty}.{op} r{dst} r{lhs} r{rhs}"),
            TypedOp::New {
                dst,
                class,
                ctor,
                args,
            } => {
                write!(f, "new r{dst} {class} via {ctor}")?;
                write_args(f, args)
            }
            TypedOp::InitMember {
                member,
                ty,
                src,
                ctor,
            } => {
                write!(f, "init {member} {ty}")?;
                if let Some(src) = src {
                    write!(f, " from r{src}")?;
                }
                if let Some(ctor) = ctor {
                    write!(f, " via {ctor}")?;
                }
                Ok(())
            }
            TypedOp::ReleaseMember { member, dtor } => {
                write!(f, "release {member}")?;
                if let Some(dtor) = dtor {
                    write!(f, " via {dtor}")?;
                }
                Ok(())
            }
            TypedOp::CloneMember { member, clone } => {
                write!(f, "clone {member}")?;
                if let Some(clone) = clone {
                    write!(f, " via {clone}")?;
                }
                Ok(())
            }
            TypedOp::Ref { reg } => write!(f, "ref r{reg}"),
            TypedOp::Unref { reg } => write!(f, "unref r{reg}"),
            TypedOp::ScopeBegin => f.write_str("scope.begin"),
            TypedOp::ScopeEnd => f.write_str("scope.end"),
            TypedOp::Return { src: Some(src) } => write!(f, "return r{src}"),
            TypedOp::Return { src: None } => f.write_str("return"),
        }
    }
}

/// The compiled body of one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypedChunk {
    ops: Vec<TypedOp>,
}

impl TypedChunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: TypedOp) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[TypedOp] {
        &self.ops
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut TypedOp> {
        self.ops.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypedOp> {
        self.ops.iter()
    }

    /// Registers released by `Unref`, in emission order.
    pub fn released_registers(&self) -> Vec<u32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                TypedOp::Unref { reg } => Some(*reg),
                _ => None,
            })
            .collect()
    }

    /// Number of ownership operations.
    pub fn ownership_ops(&self) -> usize {
        self.ops.iter().filter(|op| op.is_ownership()).count()
    }
}

impl fmt::Display for TypedChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (offset, op) in self.ops.iter().enumerate() {
            writeln!(f, "{offset:04} {op}")?;
        }
        Ok(())
    }
}
