//! Type records - the per-slot type information of the type table.
//!
//! A [`TypeRecord`] is the resolved or partially resolved type at one slot.
//! Exactly one [`TypeKind`] holds at a time; qualifiers are stripped when the
//! kind is `Void`. [`TypeKey`] is the concrete, hashable projection of a
//! record used by signatures and typed IR.
//!
//! # Example
//!
//! ```
//! use sable_core::{BuiltinKind, Qualifiers, TypeKind, TypeRecord};
//!
//! let record = TypeRecord::builtin(BuiltinKind::I32).with_qualifiers(Qualifiers::CONST);
//! assert!(record.is_const());
//! assert_eq!(record.key().kind, TypeKind::Builtin(BuiltinKind::I32));
//!
//! let void = TypeRecord::void().with_qualifiers(Qualifiers::CONST);
//! assert!(void.qualifiers.is_empty());
//! ```

use std::fmt;

use bitflags::bitflags;

use crate::{DeclId, SlotId};

/// Builtin scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuiltinKind {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Pointer,
}

impl BuiltinKind {
    /// All builtin kinds, in declaration order.
    pub const ALL: [BuiltinKind; 12] = [
        BuiltinKind::Bool,
        BuiltinKind::U8,
        BuiltinKind::U16,
        BuiltinKind::U32,
        BuiltinKind::U64,
        BuiltinKind::I8,
        BuiltinKind::I16,
        BuiltinKind::I32,
        BuiltinKind::I64,
        BuiltinKind::F32,
        BuiltinKind::F64,
        BuiltinKind::Pointer,
    ];

    /// Source keyword for this kind.
    pub const fn keyword(self) -> &'static str {
        match self {
            BuiltinKind::Bool => "bool",
            BuiltinKind::U8 => "u8",
            BuiltinKind::U16 => "u16",
            BuiltinKind::U32 => "u32",
            BuiltinKind::U64 => "u64",
            BuiltinKind::I8 => "i8",
            BuiltinKind::I16 => "i16",
            BuiltinKind::I32 => "i32",
            BuiltinKind::I64 => "i64",
            BuiltinKind::F32 => "f32",
            BuiltinKind::F64 => "f64",
            BuiltinKind::Pointer => "ptr",
        }
    }

    /// Look up a builtin kind by its keyword.
    pub fn from_keyword(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.keyword() == word)
    }

    pub const fn is_unsigned(self) -> bool {
        matches!(
            self,
            BuiltinKind::U8 | BuiltinKind::U16 | BuiltinKind::U32 | BuiltinKind::U64
        )
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            BuiltinKind::I8 | BuiltinKind::I16 | BuiltinKind::I32 | BuiltinKind::I64
        )
    }

    pub const fn is_float(self) -> bool {
        matches!(self, BuiltinKind::F32 | BuiltinKind::F64)
    }

    /// Whether arithmetic operators apply to this kind.
    pub const fn is_numeric(self) -> bool {
        self.is_unsigned() || self.is_signed() || self.is_float()
    }

    /// Size in bytes.
    pub const fn size(self) -> u32 {
        match self {
            BuiltinKind::Bool | BuiltinKind::U8 | BuiltinKind::I8 => 1,
            BuiltinKind::U16 | BuiltinKind::I16 => 2,
            BuiltinKind::U32 | BuiltinKind::I32 | BuiltinKind::F32 => 4,
            BuiltinKind::U64 | BuiltinKind::I64 | BuiltinKind::F64 | BuiltinKind::Pointer => 8,
        }
    }
}

impl fmt::Display for BuiltinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// The kind of a type record. Exactly one holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Any,
    Builtin(BuiltinKind),
    /// Linked to a declaration (class, function, namespace or typedef).
    Linked(DeclId),
}

impl TypeKind {
    pub const fn is_void(self) -> bool {
        matches!(self, TypeKind::Void)
    }

    pub const fn is_any(self) -> bool {
        matches!(self, TypeKind::Any)
    }

    pub const fn builtin(self) -> Option<BuiltinKind> {
        match self {
            TypeKind::Builtin(kind) => Some(kind),
            _ => None,
        }
    }

    pub const fn linked(self) -> Option<DeclId> {
        match self {
            TypeKind::Linked(decl) => Some(decl),
            _ => None,
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Void => f.write_str("void"),
            TypeKind::Any => f.write_str("any"),
            TypeKind::Builtin(kind) => write!(f, "{kind}"),
            TypeKind::Linked(decl) => write!(f, "{decl}"),
        }
    }
}

bitflags! {
    /// Type qualifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Qualifiers: u8 {
        /// Passed or held by reference.
        const REF = 1 << 0;
        /// Immutable.
        const CONST = 1 << 1;
        /// May hold null.
        const NULLABLE = 1 << 2;
    }
}

impl fmt::Display for Qualifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Qualifiers::CONST) {
            f.write_str("const ")?;
        }
        if self.contains(Qualifiers::REF) {
            f.write_str("ref ")?;
        }
        if self.contains(Qualifiers::NULLABLE) {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// Call-interface metadata for a symbol not yet bound to a concrete callee.
///
/// Produced by identifier resolution when a name matches one or more
/// callable declarations; consumed by the next call opcode that supplies
/// argument types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInterface {
    /// Name the candidates were found under.
    pub name: String,
    /// Candidate declarations, in lookup order.
    pub candidates: Vec<DeclId>,
    /// Receiver register for bound method calls.
    pub receiver: Option<u32>,
}

impl CallInterface {
    pub fn new(name: impl Into<String>, candidates: Vec<DeclId>) -> Self {
        Self {
            name: name.into(),
            candidates,
            receiver: None,
        }
    }

    pub fn with_receiver(mut self, receiver: u32) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// Whether the overload set still needs argument types to resolve.
    pub fn is_pending(&self) -> bool {
        self.candidates.len() > 1
    }
}

/// Resolved or partially resolved type information at one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    /// The type kind.
    pub kind: TypeKind,
    /// Qualifiers; always empty on `Void`.
    pub qualifiers: Qualifiers,
    /// Other slots this type must unify with.
    pub extends: Vec<SlotId>,
    /// Pending call interface, for unbound callable symbols.
    pub call: Option<CallInterface>,
    /// Whether this is a real runtime value (false for compile-time-only values).
    pub instance: bool,
    /// Hard-link alias: reads of this record land on the aliased slot.
    pub alias: Option<SlotId>,
}

impl TypeRecord {
    fn of_kind(kind: TypeKind) -> Self {
        Self {
            kind,
            qualifiers: Qualifiers::empty(),
            extends: Vec::new(),
            call: None,
            instance: true,
            alias: None,
        }
    }

    /// A fresh, not yet typed record.
    pub fn fresh() -> Self {
        Self::of_kind(TypeKind::Any)
    }

    pub fn void() -> Self {
        Self::of_kind(TypeKind::Void)
    }

    pub fn any() -> Self {
        Self::of_kind(TypeKind::Any)
    }

    pub fn builtin(kind: BuiltinKind) -> Self {
        Self::of_kind(TypeKind::Builtin(kind))
    }

    pub fn linked(decl: DeclId) -> Self {
        Self::of_kind(TypeKind::Linked(decl))
    }

    /// A hard-link alias to another slot.
    pub fn alias_of(target: SlotId) -> Self {
        let mut record = Self::fresh();
        record.alias = Some(target);
        record
    }

    /// Build a record from a concrete key.
    pub fn from_key(key: TypeKey) -> Self {
        Self::of_kind(key.kind).with_qualifiers(key.qualifiers)
    }

    pub fn with_qualifiers(mut self, qualifiers: Qualifiers) -> Self {
        self.qualifiers = qualifiers;
        self.normalize();
        self
    }

    pub fn with_extends(mut self, extends: Vec<SlotId>) -> Self {
        self.extends = extends;
        self
    }

    pub fn with_call(mut self, call: CallInterface) -> Self {
        self.call = Some(call);
        self
    }

    /// Mark as a compile-time-only value.
    pub fn synthetic(mut self) -> Self {
        self.instance = false;
        self
    }

    /// Replace the kind, keeping qualifiers where meaningful.
    pub fn set_kind(&mut self, kind: TypeKind) {
        self.kind = kind;
        self.normalize();
    }

    fn normalize(&mut self) {
        if self.kind.is_void() {
            self.qualifiers = Qualifiers::empty();
        }
    }

    pub fn is_const(&self) -> bool {
        self.qualifiers.contains(Qualifiers::CONST)
    }

    pub fn is_void(&self) -> bool {
        self.kind.is_void()
    }

    pub fn is_any(&self) -> bool {
        self.kind.is_any()
    }

    /// Whether the record is a concrete (non-`Any`) type.
    pub fn is_concrete(&self) -> bool {
        !self.kind.is_any()
    }

    /// Concrete projection of this record.
    pub fn key(&self) -> TypeKey {
        TypeKey {
            kind: self.kind,
            qualifiers: self.qualifiers,
        }
    }

    /// Overwrite type information from another record, keeping identity fields.
    pub fn assign_from(&mut self, other: &TypeRecord) {
        self.kind = other.kind;
        self.qualifiers = other.qualifiers;
        self.extends = other.extends.clone();
        self.call = other.call.clone();
        self.alias = None;
        self.normalize();
    }
}

impl Default for TypeRecord {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Concrete (kind, qualifiers) pair: a signature entry and typed-IR annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    pub kind: TypeKind,
    pub qualifiers: Qualifiers,
}

impl TypeKey {
    pub const VOID: TypeKey = TypeKey::new(TypeKind::Void);
    pub const ANY: TypeKey = TypeKey::new(TypeKind::Any);

    pub const fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            qualifiers: Qualifiers::empty(),
        }
    }

    pub const fn builtin(kind: BuiltinKind) -> Self {
        Self::new(TypeKind::Builtin(kind))
    }

    pub const fn linked(decl: DeclId) -> Self {
        Self::new(TypeKind::Linked(decl))
    }

    pub fn with_qualifiers(mut self, qualifiers: Qualifiers) -> Self {
        if !self.kind.is_void() {
            self.qualifiers = qualifiers;
        }
        self
    }

    /// The declaration this key links to, if any.
    pub const fn decl(&self) -> Option<DeclId> {
        self.kind.linked()
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.qualifiers, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_keywords_round_trip() {
        for kind in BuiltinKind::ALL {
            assert_eq!(BuiltinKind::from_keyword(kind.keyword()), Some(kind));
        }
        assert_eq!(BuiltinKind::from_keyword("string"), None);
    }

    #[test]
    fn builtin_classification() {
        assert!(BuiltinKind::U16.is_unsigned());
        assert!(BuiltinKind::I64.is_signed());
        assert!(BuiltinKind::F32.is_float());
        assert!(!BuiltinKind::Bool.is_numeric());
        assert!(!BuiltinKind::Pointer.is_numeric());
        assert_eq!(BuiltinKind::Pointer.size(), 8);
    }

    #[test]
    fn void_strips_qualifiers() {
        let mut record = TypeRecord::builtin(BuiltinKind::I32).with_qualifiers(Qualifiers::CONST);
        assert!(record.is_const());
        record.set_kind(TypeKind::Void);
        assert!(record.qualifiers.is_empty());

        let key = TypeKey::VOID.with_qualifiers(Qualifiers::REF);
        assert!(key.qualifiers.is_empty());
    }

    #[test]
    fn fresh_records_are_runtime_any() {
        let record = TypeRecord::fresh();
        assert!(record.is_any());
        assert!(record.instance);
        assert!(!TypeRecord::fresh().synthetic().instance);
    }

    #[test]
    fn assign_from_keeps_instance_flag() {
        let mut target = TypeRecord::fresh().synthetic();
        target.alias = Some(DeclId::new(1).slot(2));
        target.assign_from(&TypeRecord::linked(DeclId::new(5)));
        assert_eq!(target.kind, TypeKind::Linked(DeclId::new(5)));
        assert!(!target.instance);
        assert!(target.alias.is_none());
    }

    #[test]
    fn key_display() {
        let key = TypeKey::builtin(BuiltinKind::U8).with_qualifiers(Qualifiers::CONST);
        assert_eq!(key.to_string(), "const u8");
        assert_eq!(TypeKey::linked(DeclId::new(3)).to_string(), "decl#3");
    }

    #[test]
    fn call_interface_pending() {
        let single = CallInterface::new("f", vec![DeclId::new(1)]);
        assert!(!single.is_pending());
        let set = CallInterface::new("f", vec![DeclId::new(1), DeclId::new(2)]).with_receiver(2);
        assert!(set.is_pending());
        assert_eq!(set.receiver, Some(2));
    }
}
