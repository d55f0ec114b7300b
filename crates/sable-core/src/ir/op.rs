//! Generic IR instruction set.
//!
//! This is the untyped, generic form produced once from parsed source. Every
//! instruction is a fixed-shape tagged variant with small integer operands:
//! register ids (locals of the enclosing declaration), string-table ids and
//! literal constants. Consumers match exhaustively, so a new opcode cannot be
//! silently ignored.

use std::fmt;

use ordered_float::OrderedFloat;

use crate::{BuiltinKind, Qualifiers, StringId};

/// Type annotation of a `Declare` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclType {
    Builtin(BuiltinKind),
    Any,
    Void,
    /// The type held by a type-value register (e.g. an identified class).
    Of(u32),
}

/// Literal constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Literal {
    Bool(bool),
    Int(i64, BuiltinKind),
    Float(OrderedFloat<f64>, BuiltinKind),
    Null,
}

impl Literal {
    /// Builtin type of the literal.
    pub fn kind(&self) -> BuiltinKind {
        match self {
            Literal::Bool(_) => BuiltinKind::Bool,
            Literal::Int(_, kind) | Literal::Float(_, kind) => *kind,
            Literal::Null => BuiltinKind::Pointer,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(value) => write!(f, "{value}"),
            Literal::Int(value, kind) => write!(f, "{value}{kind}"),
            Literal::Float(value, kind) => write!(f, "{}{kind}", value.0),
            Literal::Null => f.write_str("null"),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    /// Declaration name of a user-defined overload of this operator.
    pub fn operator_name(self) -> String {
        format!("operator{}", self.symbol())
    }

    /// Whether the operator yields `bool`.
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Compiler directives embedded in a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pragma {
    /// The body is a compiler intrinsic with the given name.
    Intrinsic(StringId),
}

/// One generic IR instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    /// Declare a register; named declarations are scope-tracked locals.
    Declare {
        reg: u32,
        ty: DeclType,
        name: Option<StringId>,
        qualifiers: Qualifiers,
    },
    Literal {
        dst: u32,
        value: Literal,
    },
    /// Resolve a bare name.
    Identify {
        dst: u32,
        name: StringId,
    },
    /// Resolve `object.name`.
    Member {
        dst: u32,
        object: u32,
        name: StringId,
    },
    /// Queue a positional call argument.
    Push {
        src: u32,
    },
    /// Queue a named call argument.
    PushNamed {
        src: u32,
        name: StringId,
    },
    /// Call the callable held in `callee` with the queued arguments.
    Call {
        dst: u32,
        callee: u32,
        /// Register whose type constrains the call's return type.
        expected: Option<u32>,
    },
    Operator {
        dst: u32,
        op: BinaryOp,
        lhs: u32,
        rhs: u32,
    },
    /// Construct the class held in `class` with the queued arguments.
    New {
        dst: u32,
        class: u32,
    },
    Assign {
        dst: u32,
        src: u32,
    },
    Return {
        src: Option<u32>,
    },
    ScopeBegin,
    ScopeEnd,
    Ref {
        reg: u32,
    },
    Unref {
        reg: u32,
    },
    Pragma(Pragma),
    /// End of a declaration body.
    End,
}

impl Op {
    /// Short mnemonic, used in trace output and shape errors.
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Op::Declare { .. } => "declare",
            Op::Literal { .. } => "literal",
            Op::Identify { .. } => "identify",
            Op::Member { .. } => "member",
            Op::Push { .. } => "push",
            Op::PushNamed { .. } => "push.named",
            Op::Call { .. } => "call",
            Op::Operator { .. } => "operator",
            Op::New { .. } => "new",
            Op::Assign { .. } => "assign",
            Op::Return { .. } => "return",
            Op::ScopeBegin => "scope.begin",
            Op::ScopeEnd => "scope.end",
            Op::Ref { .. } => "ref",
            Op::Unref { .. } => "unref",
            Op::Pragma(_) => "pragma",
            Op::End => "end",
        }
    }

    /// Destination register written by this instruction, if any.
    pub const fn destination(&self) -> Option<u32> {
        match self {
            Op::Declare { reg, .. } => Some(*reg),
            Op::Literal { dst, .. }
            | Op::Identify { dst, .. }
            | Op::Member { dst, .. }
            | Op::Call { dst, .. }
            | Op::Operator { dst, .. }
            | Op::New { dst, .. }
            | Op::Assign { dst, .. } => Some(*dst),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.mnemonic();
        match self {
            Op::Declare {
                reg,
                ty,
                name,
                qualifiers,
            } => {
                write!(f, "{m} r{reg} {qualifiers}{ty:?}")?;
                if let Some(name) = name {
                    write!(f, " ${}", name.index())?;
                }
                Ok(())
            }
            Op::Literal { dst, value } => write!(f, "{m} r{dst} {value}"),
            Op::Identify { dst, name } => write!(f, "{m} r{dst} ${}", name.index()),
            Op::Member { dst, object, name } => {
                write!(f, "{m} r{dst} r{object}.${}", name.index())
            }
            Op::Push { src } => write!(f, "{m} r{src}"),
            Op::PushNamed { src, name } => write!(f, "{m} ${}=r{src}", name.index()),
            Op::Call {
                dst,
                callee,
                expected,
            } => {
                write!(f, "{m} r{dst} r{callee}")?;
                if let Some(expected) = expected {
                    write!(f, " : r{expected}")?;
                }
                Ok(())
            }
            Op::Operator { dst, op, lhs, rhs } => write!(f, "{m} r{dst} r{lhs} {op} r{rhs}"),
            Op::New { dst, class } => write!(f, "{m} r{dst} r{class}"),
            Op::Assign { dst, src } => write!(f, "{m} r{dst} r{src}"),
            Op::Return { src: Some(src) } => write!(f, "{m} r{src}"),
            Op::Return { src: None } => f.write_str(m),
            Op::Ref { reg } | Op::Unref { reg } => write!(f, "{m} r{reg}"),
            Op::Pragma(Pragma::Intrinsic(name)) => write!(f, "{m} intrinsic ${}", name.index()),
            Op::ScopeBegin | Op::ScopeEnd | Op::End => f.write_str(m),
        }
    }
}
